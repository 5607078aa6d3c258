use std::collections::HashSet;

use thiserror::Error;
use tracing::{info, warn};

use super::catalog::{CatalogError, CatalogStore};
use super::remote::{RemoteError, RemoteStore};
use super::tree::{Forest, placeholder_name};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("failed to create folder for {id} under {parent_id}: {source}")]
    CreateFolder {
        id: String,
        parent_id: String,
        #[source]
        source: RemoteError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Ids re-seen by the latest ingestion plus any the forest itself saw.
    pub duplicates: usize,
    pub roots: usize,
    pub missing: usize,
    pub created: usize,
    pub reused: usize,
    /// Folders no entry point leads to, e.g. a parent cycle.
    pub unreachable: usize,
}

/// Recreates the cataloged folder tree under `destination_root`.
///
/// Each new folder's id is persisted before any of its children are
/// visited, so an interrupted run can be repeated and only creates what is
/// still missing.
pub struct FolderMirror<'a, D: RemoteStore + ?Sized> {
    catalog: &'a CatalogStore,
    destination: &'a D,
    destination_root: &'a str,
}

impl<'a, D: RemoteStore + ?Sized> FolderMirror<'a, D> {
    pub fn new(catalog: &'a CatalogStore, destination: &'a D, destination_root: &'a str) -> Self {
        Self {
            catalog,
            destination,
            destination_root,
        }
    }

    pub async fn run(&self) -> Result<MirrorReport, MirrorError> {
        let folders = self.catalog.list_folders().await?;
        let forest = Forest::build(&folders);
        let mut report = self.mirror(&forest).await?;
        let ingested = self.catalog.ingest_duplicates().await?;
        report.duplicates += usize::try_from(ingested).unwrap_or(0);
        Ok(report)
    }

    pub async fn mirror(&self, forest: &Forest) -> Result<MirrorReport, MirrorError> {
        let mut report = MirrorReport {
            duplicates: forest.duplicates(),
            roots: forest.roots().len(),
            missing: forest.missing_parents().len(),
            ..MirrorReport::default()
        };
        let placeholders = self.catalog.placeholders().await?;
        let mut visited = HashSet::new();

        for missing in forest.missing_parents() {
            let name = placeholder_name(missing);
            let destination_id = match placeholders.get(missing) {
                Some(existing) => {
                    report.reused += 1;
                    existing.clone()
                }
                None => {
                    let created = self
                        .create_folder(missing, self.destination_root, &name)
                        .await?;
                    self.catalog.set_placeholder(missing, &created).await?;
                    report.created += 1;
                    created
                }
            };
            info!(folder_id = %missing, placeholder = true, "{name}");
            for child in forest.children_of(missing) {
                self.walk(forest, child, &destination_id, 1, &mut visited, &mut report)
                    .await?;
            }
        }

        for root in forest.roots() {
            self.walk(
                forest,
                root,
                self.destination_root,
                0,
                &mut visited,
                &mut report,
            )
            .await?;
        }

        report.unreachable = forest
            .folder_ids()
            .filter(|id| !visited.contains(*id))
            .count();
        if report.unreachable > 0 {
            warn!(
                unreachable = report.unreachable,
                "some folders are not reachable from any root and were not mirrored"
            );
        }
        Ok(report)
    }

    async fn walk(
        &self,
        forest: &Forest,
        start: &str,
        start_parent: &str,
        start_depth: usize,
        visited: &mut HashSet<String>,
        report: &mut MirrorReport,
    ) -> Result<(), MirrorError> {
        let mut stack = vec![(start.to_string(), start_parent.to_string(), start_depth)];
        while let Some((id, parent_id, depth)) = stack.pop() {
            if !visited.insert(id.clone()) {
                warn!(folder_id = %id, "folder reached twice, skipping");
                continue;
            }
            let Some(node) = forest.node(&id) else {
                continue;
            };

            let (destination_id, created) = match &node.destination_id {
                Some(existing) => {
                    report.reused += 1;
                    (existing.clone(), false)
                }
                None => {
                    let created = self.create_folder(&id, &parent_id, &node.name).await?;
                    self.catalog.set_destination(&id, &created).await?;
                    report.created += 1;
                    (created, true)
                }
            };
            info!(
                folder_id = %id,
                created,
                "{}{}{}",
                "  ".repeat(depth),
                node.name,
                if created { " *" } else { "" }
            );

            for child in forest.children_of(&id).iter().rev() {
                stack.push((child.clone(), destination_id.clone(), depth + 1));
            }
        }
        Ok(())
    }

    async fn create_folder(
        &self,
        id: &str,
        parent_id: &str,
        name: &str,
    ) -> Result<String, MirrorError> {
        self.destination
            .create_folder(parent_id, name)
            .await
            .map_err(|source| MirrorError::CreateFolder {
                id: id.to_string(),
                parent_id: parent_id.to_string(),
                source,
            })
    }
}
