use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use tracing::warn;

use super::remote::{RemoteError, RemoteStore};

/// Ancestors deeper than this are not followed.
pub const MAX_CHAIN_DEPTH: usize = 64;

#[derive(Debug, Error)]
#[error("failed to fetch {id}: {source}")]
pub struct ExamineError {
    pub id: String,
    #[source]
    pub source: RemoteError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLine {
    pub depth: usize,
    pub id: String,
    pub name: String,
}

impl fmt::Display for ChainLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}({})", "  ".repeat(self.depth), self.name, self.id)
    }
}

/// Walks from `id` up through every parent, depth first, one line per
/// object.
///
/// An ancestor reachable through several parents is listed once, under the
/// first path that reaches it. Later paths stop at that ancestor and do not
/// repeat it or its own parents. This also keeps parent cycles finite.
pub async fn parent_chain<S: RemoteStore + ?Sized>(
    store: &S,
    id: &str,
) -> Result<Vec<ChainLine>, ExamineError> {
    let mut lines = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(id.to_string(), 0usize)];

    while let Some((id, depth)) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let object = store
            .get_object(&id)
            .await
            .map_err(|source| ExamineError {
                id: id.clone(),
                source,
            })?;
        if depth >= MAX_CHAIN_DEPTH && !object.parent_ids.is_empty() {
            warn!(object_id = %id, "parent chain too deep, stopping");
        } else {
            for parent in object.parent_ids.iter().rev() {
                stack.push((parent.clone(), depth + 1));
            }
        }
        lines.push(ChainLine {
            depth,
            id: object.id,
            name: object.name,
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::fake::FakeStore;
    use crate::migrate::remote::RemoteObject;

    fn folder(id: &str, parents: &[&str]) -> RemoteObject {
        RemoteObject {
            id: id.into(),
            name: id.to_lowercase(),
            is_folder: true,
            parent_ids: parents.iter().map(|p| p.to_string()).collect(),
            can_share: true,
            can_copy: false,
        }
    }

    #[tokio::test]
    async fn lists_ancestors_with_indentation() {
        let store = FakeStore::new();
        store.insert_object(folder("X", &["F1", "F2"]));
        store.insert_object(folder("F1", &["R"]));
        store.insert_object(folder("F2", &[]));
        store.insert_object(folder("R", &[]));

        let lines = parent_chain(&store, "X").await.unwrap();
        let rendered: Vec<String> = lines.iter().map(ToString::to_string).collect();

        assert_eq!(rendered, vec!["x(X)", "  f1(F1)", "    r(R)", "  f2(F2)"]);
    }

    #[tokio::test]
    async fn cycle_terminates() {
        let store = FakeStore::new();
        store.insert_object(folder("A", &["B"]));
        store.insert_object(folder("B", &["A"]));

        let lines = parent_chain(&store, "A").await.unwrap();

        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn missing_ancestor_is_an_error() {
        let store = FakeStore::new();
        store.insert_object(folder("X", &["gone"]));

        let err = parent_chain(&store, "X").await.unwrap_err();

        assert_eq!(err.id, "gone");
    }
}
