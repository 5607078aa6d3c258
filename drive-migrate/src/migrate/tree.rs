//! Folder forest derived from the catalog.
//!
//! The source store lets an object live under several parents. The forest
//! keeps only the first one, so every folder has at most one place in the
//! mirrored tree. Parents that are referenced but were never cataloged are
//! collected separately and mirrored as placeholder roots.

use std::collections::HashMap;

use super::catalog::CatalogEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub name: String,
    pub parent: Option<String>,
    pub destination_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct Forest {
    nodes: HashMap<String, FolderNode>,
    children: HashMap<String, Vec<String>>,
    roots: Vec<String>,
    missing_parents: Vec<String>,
    duplicates: usize,
}

impl Forest {
    /// Builds the forest from folder entries in iteration order. Non-folder
    /// entries are ignored. A re-seen id replaces the earlier entry.
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a CatalogEntry>,
    {
        let mut forest = Forest::default();
        let mut parent_order: Vec<String> = Vec::new();

        for entry in entries.into_iter().filter(|e| e.is_folder) {
            if let Some(previous) = forest.nodes.get(&entry.id) {
                forest.duplicates += 1;
                let previous_parent = previous.parent.clone();
                forest.detach(&entry.id, previous_parent.as_deref());
            }

            let parent = entry.parent_ids.first().cloned();
            match &parent {
                None => forest.roots.push(entry.id.clone()),
                Some(parent_id) => forest
                    .children
                    .entry(parent_id.clone())
                    .or_insert_with(|| {
                        parent_order.push(parent_id.clone());
                        Vec::new()
                    })
                    .push(entry.id.clone()),
            }

            forest.nodes.insert(
                entry.id.clone(),
                FolderNode {
                    name: entry.name.clone(),
                    parent,
                    destination_id: entry.destination_id.clone(),
                },
            );
        }

        forest.missing_parents = parent_order
            .into_iter()
            .filter(|parent_id| {
                !forest.nodes.contains_key(parent_id)
                    && forest
                        .children
                        .get(parent_id)
                        .is_some_and(|children| !children.is_empty())
            })
            .collect();
        forest
    }

    fn detach(&mut self, id: &str, parent: Option<&str>) {
        let siblings = match parent {
            None => &mut self.roots,
            Some(parent_id) => match self.children.get_mut(parent_id) {
                Some(children) => children,
                None => return,
            },
        };
        if let Some(pos) = siblings.iter().position(|sibling| sibling == id) {
            siblings.remove(pos);
        }
    }

    pub fn node(&self, id: &str) -> Option<&FolderNode> {
        self.nodes.get(id)
    }

    pub fn children_of(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn missing_parents(&self) -> &[String] {
        &self.missing_parents
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn folder_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

pub fn placeholder_name(parent_id: &str) -> String {
    format!("MISSING {parent_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: &str, parents: &[&str]) -> CatalogEntry {
        CatalogEntry {
            id: id.into(),
            name: format!("name-{id}"),
            is_folder: true,
            parent_ids: parents.iter().map(|p| p.to_string()).collect(),
            can_share: true,
            can_copy: true,
            destination_id: None,
        }
    }

    #[test]
    fn missing_parent_becomes_placeholder_root() {
        let entries = vec![folder("A", &[]), folder("B", &["A"]), folder("C", &["Z"])];
        let forest = Forest::build(&entries);

        assert_eq!(forest.roots(), ["A"]);
        assert_eq!(forest.missing_parents(), ["Z"]);
        assert_eq!(forest.children_of("A"), ["B"]);
        assert_eq!(forest.children_of("Z"), ["C"]);
        assert_eq!(forest.duplicates(), 0);
        assert_eq!(forest.len(), 3);
    }

    #[test]
    fn only_first_parent_is_structural() {
        let entries = vec![
            folder("P1", &[]),
            folder("P2", &[]),
            folder("C", &["P1", "P2"]),
        ];
        let forest = Forest::build(&entries);

        assert_eq!(forest.children_of("P1"), ["C"]);
        assert!(forest.children_of("P2").is_empty());
        assert_eq!(forest.node("C").unwrap().parent.as_deref(), Some("P1"));
    }

    #[test]
    fn children_keep_iteration_order() {
        let entries = vec![
            folder("R", &[]),
            folder("c3", &["R"]),
            folder("c1", &["R"]),
            folder("c2", &["R"]),
        ];
        let forest = Forest::build(&entries);

        assert_eq!(forest.children_of("R"), ["c3", "c1", "c2"]);
    }

    #[test]
    fn duplicates_are_counted_once_per_reseen_id() {
        let mut renamed = folder("B", &["A"]);
        renamed.name = "renamed".into();
        let entries = vec![
            folder("A", &[]),
            folder("B", &["A"]),
            renamed,
            folder("A", &[]),
        ];
        let forest = Forest::build(&entries);

        assert_eq!(forest.duplicates(), 2);
        assert_eq!(forest.roots(), ["A"]);
        assert_eq!(forest.children_of("A"), ["B"]);
        assert_eq!(forest.node("B").unwrap().name, "renamed");
    }

    #[test]
    fn duplicate_with_new_parent_moves_under_it() {
        let entries = vec![
            folder("A", &[]),
            folder("D", &[]),
            folder("B", &["A"]),
            folder("B", &["D"]),
        ];
        let forest = Forest::build(&entries);

        assert_eq!(forest.duplicates(), 1);
        assert!(forest.children_of("A").is_empty());
        assert_eq!(forest.children_of("D"), ["B"]);
    }

    #[test]
    fn missing_parents_follow_first_reference_order() {
        let entries = vec![
            folder("c1", &["Y"]),
            folder("c2", &["X"]),
            folder("c3", &["Y"]),
        ];
        let forest = Forest::build(&entries);

        assert_eq!(forest.missing_parents(), ["Y", "X"]);
        assert!(forest.roots().is_empty());
    }

    #[test]
    fn files_are_ignored_and_destinations_carried() {
        let mut mapped = folder("A", &[]);
        mapped.destination_id = Some("dst-A".into());
        let mut file = folder("x", &["A"]);
        file.is_folder = false;
        let forest = Forest::build(&[mapped, file]);

        assert_eq!(forest.len(), 1);
        assert!(forest.children_of("A").is_empty());
        assert_eq!(
            forest.node("A").unwrap().destination_id.as_deref(),
            Some("dst-A")
        );
    }

    #[test]
    fn placeholder_name_is_labeled() {
        assert_eq!(placeholder_name("Z"), "MISSING Z");
    }
}
