use std::{collections::HashMap, path::Path};

use sqlx::{
    Row, SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteRow},
};
use thiserror::Error;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const PARENT_DELIMITER: char = ',';

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("no catalog entry with id {0}")]
    UnknownEntry(String),
}

/// One source object as it is written during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInput {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub parent_ids: Vec<String>,
    pub can_share: bool,
    pub can_copy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub parent_ids: Vec<String>,
    pub can_share: bool,
    pub can_copy: bool,
    /// Set once the object exists in the destination store; never cleared.
    pub destination_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub id: String,
    pub name: String,
    pub parent_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub folders: i64,
    pub files: i64,
    pub mapped_folders: i64,
    pub mapped_files: i64,
}

pub fn join_parents(parent_ids: &[String]) -> String {
    parent_ids.join(&PARENT_DELIMITER.to_string())
}

pub fn split_parents(value: &str) -> Vec<String> {
    value
        .split(PARENT_DELIMITER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, CatalogError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn open_path(path: &Path) -> Result<Self, CatalogError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), CatalogError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Stores one listing page in a single transaction. Re-seen ids take the
    /// newer metadata but keep their destination mapping.
    pub async fn insert_batch(&self, entries: &[EntryInput]) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO src (id, name, is_folder, parents, can_share, can_copy)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    is_folder = excluded.is_folder,
                    parents = excluded.parents,
                    can_share = excluded.can_share,
                    can_copy = excluded.can_copy",
            )
            .bind(&entry.id)
            .bind(&entry.name)
            .bind(entry.is_folder)
            .bind(join_parents(&entry.parent_ids))
            .bind(entry.can_share)
            .bind(entry.can_copy)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_entry(&self, id: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let row = sqlx::query(
            "SELECT id, name, is_folder, parents, can_share, can_copy, dst_id FROM src WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    /// Folder entries in catalog order.
    pub async fn list_folders(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let rows = sqlx::query(
            "SELECT id, name, is_folder, parents, can_share, can_copy, dst_id
             FROM src
             WHERE is_folder
             ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Shareable files that have not been copied yet, in catalog order.
    pub async fn list_pending_files(
        &self,
        require_can_copy: bool,
    ) -> Result<Vec<PendingFile>, CatalogError> {
        let rows = sqlx::query(
            "SELECT id, name, parents
             FROM src
             WHERE can_share AND NOT is_folder AND dst_id IS NULL AND (can_copy OR NOT ?1)
             ORDER BY rowid ASC",
        )
        .bind(require_can_copy)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let parents: String = row.try_get("parents")?;
            out.push(PendingFile {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                parent_ids: split_parents(&parents),
            });
        }
        Ok(out)
    }

    pub async fn folder_destinations(&self) -> Result<HashMap<String, String>, CatalogError> {
        let rows = sqlx::query("SELECT id, dst_id FROM src WHERE is_folder AND dst_id IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| -> Result<(String, String), CatalogError> {
                Ok((row.try_get("id")?, row.try_get("dst_id")?))
            })
            .collect()
    }

    /// Records the destination id for `id`. The write is its own transaction
    /// and is rolled back if it does not commit.
    pub async fn set_destination(&self, id: &str, destination_id: &str) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE src SET dst_id = ?1 WHERE id = ?2")
            .bind(destination_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::UnknownEntry(id.to_string()));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn placeholders(&self) -> Result<HashMap<String, String>, CatalogError> {
        let rows = sqlx::query("SELECT parent_id, dst_id FROM placeholders")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| -> Result<(String, String), CatalogError> {
                Ok((row.try_get("parent_id")?, row.try_get("dst_id")?))
            })
            .collect()
    }

    pub async fn set_placeholder(
        &self,
        parent_id: &str,
        destination_id: &str,
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO placeholders (parent_id, dst_id) VALUES (?1, ?2)
             ON CONFLICT(parent_id) DO UPDATE SET dst_id = excluded.dst_id",
        )
        .bind(parent_id)
        .bind(destination_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Stores how many re-seen ids the latest ingestion run found, so later
    /// phases can report it.
    pub async fn set_ingest_duplicates(&self, duplicates: i64) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO ingest_stats (name, value) VALUES ('duplicates', ?1)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(duplicates)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Zero until an ingestion run has completed.
    pub async fn ingest_duplicates(&self) -> Result<i64, CatalogError> {
        let row = sqlx::query("SELECT value FROM ingest_stats WHERE name = 'duplicates'")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("value")?),
            None => Ok(0),
        }
    }

    pub async fn counts(&self) -> Result<CatalogCounts, CatalogError> {
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN is_folder THEN 1 ELSE 0 END), 0) AS folders,
                COALESCE(SUM(CASE WHEN is_folder THEN 0 ELSE 1 END), 0) AS files,
                COALESCE(SUM(CASE WHEN is_folder AND dst_id IS NOT NULL THEN 1 ELSE 0 END), 0) AS mapped_folders,
                COALESCE(SUM(CASE WHEN NOT is_folder AND dst_id IS NOT NULL THEN 1 ELSE 0 END), 0) AS mapped_files
             FROM src",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(CatalogCounts {
            folders: row.try_get("folders")?,
            files: row.try_get("files")?,
            mapped_folders: row.try_get("mapped_folders")?,
            mapped_files: row.try_get("mapped_files")?,
        })
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<CatalogEntry, CatalogError> {
    let parents: String = row.try_get("parents")?;
    Ok(CatalogEntry {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_folder: row.try_get("is_folder")?,
        parent_ids: split_parents(&parents),
        can_share: row.try_get("can_share")?,
        can_copy: row.try_get("can_copy")?,
        destination_id: row.try_get("dst_id")?,
    })
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
