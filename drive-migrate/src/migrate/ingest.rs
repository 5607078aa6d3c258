use std::collections::HashSet;

use thiserror::Error;
use tracing::{info, warn};

use super::catalog::{CatalogError, CatalogStore, EntryInput};
use super::remote::{RemoteError, RemoteObject, RemoteStore};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("listing source objects failed: {0}")]
    List(#[source] RemoteError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: usize,
    pub objects: usize,
    pub folders: usize,
    /// Ids listed more than once during this run.
    pub duplicates: usize,
}

impl From<RemoteObject> for EntryInput {
    fn from(object: RemoteObject) -> Self {
        Self {
            id: object.id,
            name: object.name,
            is_folder: object.is_folder,
            parent_ids: object.parent_ids,
            can_share: object.can_share,
            can_copy: object.can_copy,
        }
    }
}

/// Pages through every object visible to `source` and upserts it into the
/// catalog, one transaction per page.
pub async fn ingest<S: RemoteStore + ?Sized>(
    source: &S,
    catalog: &CatalogStore,
) -> Result<IngestReport, IngestError> {
    let mut report = IngestReport::default();
    let mut seen = HashSet::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = source
            .list_objects(page_token.as_deref())
            .await
            .map_err(IngestError::List)?;
        report.pages += 1;

        let mut entries = Vec::with_capacity(page.objects.len());
        for object in page.objects {
            if !seen.insert(object.id.clone()) {
                warn!(object_id = %object.id, "object listed twice");
                report.duplicates += 1;
            }
            if object.is_folder {
                report.folders += 1;
            }
            entries.push(EntryInput::from(object));
        }
        report.objects += entries.len();
        catalog.insert_batch(&entries).await?;
        info!(page = report.pages, stored = entries.len(), "stored page");

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    catalog
        .set_ingest_duplicates(i64::try_from(report.duplicates).unwrap_or(i64::MAX))
        .await?;
    Ok(report)
}
