//! Share, copy, revoke.
//!
//! The destination account cannot read source files, so each file is shared
//! with it for the duration of a single copy. Once a grant succeeds the
//! grant is always revoked, whatever happened to the copy. A failed revoke
//! leaves the file readable by the destination account and stops the batch.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::catalog::{CatalogError, CatalogStore, PendingFile};
use super::remote::{PermissionRole, RemoteError, RemoteStore};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("failed to revoke permission {permission_id} on {id}: {source}")]
    Revoke {
        id: String,
        permission_id: String,
        #[source]
        source: RemoteError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    Shared,
    Copied,
    Revoked,
    RevokedAfterFailure,
}

/// How one file left the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Copied { destination_id: String },
    CopyFailed,
    ShareFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub total: usize,
    pub copied: usize,
    pub copy_failed: usize,
    pub share_failed: usize,
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub destination_root: String,
    /// Account the source files are temporarily shared with.
    pub identity: String,
    pub require_can_copy: bool,
}

/// Destination folder for a file: the first parent that has already been
/// mirrored, otherwise the destination root.
pub fn resolve_parent<'a>(
    parent_ids: &[String],
    destinations: &'a HashMap<String, String>,
    destination_root: &'a str,
) -> &'a str {
    parent_ids
        .iter()
        .find_map(|parent| destinations.get(parent))
        .map(String::as_str)
        .unwrap_or(destination_root)
}

pub struct TransferEngine<'a, S: RemoteStore + ?Sized, D: RemoteStore + ?Sized> {
    catalog: &'a CatalogStore,
    source: &'a S,
    destination: &'a D,
    options: &'a TransferOptions,
}

impl<'a, S, D> TransferEngine<'a, S, D>
where
    S: RemoteStore + ?Sized,
    D: RemoteStore + ?Sized,
{
    pub fn new(
        catalog: &'a CatalogStore,
        source: &'a S,
        destination: &'a D,
        options: &'a TransferOptions,
    ) -> Self {
        Self {
            catalog,
            source,
            destination,
            options,
        }
    }

    pub async fn run(&self) -> Result<TransferReport, TransferError> {
        let destinations = self.catalog.folder_destinations().await?;
        let files = self
            .catalog
            .list_pending_files(self.options.require_can_copy)
            .await?;
        let mut report = TransferReport {
            total: files.len(),
            ..TransferReport::default()
        };

        for (n, file) in files.iter().enumerate() {
            info!(file_id = %file.id, "{}/{} {}", n + 1, report.total, file.name);
            let parent =
                resolve_parent(&file.parent_ids, &destinations, &self.options.destination_root);
            match self.transfer_file(file, parent).await? {
                FileOutcome::Copied { .. } => report.copied += 1,
                FileOutcome::CopyFailed => report.copy_failed += 1,
                FileOutcome::ShareFailed => report.share_failed += 1,
            }
        }
        Ok(report)
    }

    pub async fn transfer_file(
        &self,
        file: &PendingFile,
        parent_id: &str,
    ) -> Result<FileOutcome, TransferError> {
        let permission_id = match self
            .source
            .grant_permission(&file.id, &self.options.identity, PermissionRole::Reader)
            .await
        {
            Ok(permission_id) => permission_id,
            Err(err) => {
                warn!(file_id = %file.id, error = %err, "share failed, skipping file");
                return Ok(FileOutcome::ShareFailed);
            }
        };
        transition(&file.id, TransferState::Pending, TransferState::Shared);

        let copied = match self
            .destination
            .copy_object(&file.id, &file.name, parent_id)
            .await
        {
            Ok(destination_id) => {
                transition(&file.id, TransferState::Shared, TransferState::Copied);
                match self.catalog.set_destination(&file.id, &destination_id).await {
                    Ok(()) => Ok(Some(destination_id)),
                    Err(err) => {
                        error!(file_id = %file.id, error = %err, "copied but failed to record destination");
                        Err(err)
                    }
                }
            }
            Err(err) => {
                warn!(file_id = %file.id, error = %err, "copy failed");
                Ok(None)
            }
        };

        if let Err(source) = self
            .source
            .revoke_permission(&file.id, &permission_id)
            .await
        {
            error!(
                file_id = %file.id,
                permission_id = %permission_id,
                error = %source,
                "failed to revoke temporary permission"
            );
            return Err(TransferError::Revoke {
                id: file.id.clone(),
                permission_id,
                source,
            });
        }

        match copied? {
            Some(destination_id) => {
                transition(&file.id, TransferState::Copied, TransferState::Revoked);
                Ok(FileOutcome::Copied { destination_id })
            }
            None => {
                transition(
                    &file.id,
                    TransferState::Shared,
                    TransferState::RevokedAfterFailure,
                );
                Ok(FileOutcome::CopyFailed)
            }
        }
    }
}

fn transition(file_id: &str, from: TransferState, to: TransferState) {
    debug!(file_id, ?from, ?to, "transfer state");
}
