use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::migrate::backoff::RetryPolicy;

const DEFAULT_DB_PATH: &str = "files.db";
const DEFAULT_API_BASE: &str = "https://www.googleapis.com";
const DEFAULT_PAGE_SIZE: u64 = 1000;
const DEFAULT_RETRY_ATTEMPTS: u64 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 250;
const DEFAULT_RETRY_MAX_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub db_path: PathBuf,
    pub destination_root: Option<String>,
    pub destination_user: Option<String>,
    pub source_token: Option<String>,
    pub destination_token: Option<String>,
    pub api_base: String,
    pub page_size: u32,
    pub retry_attempts: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub require_can_copy: bool,
}

impl MigrateConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            db_path: text("DRIVE_MIGRATE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            destination_root: text("DRIVE_MIGRATE_DST_ROOT"),
            destination_user: text("DRIVE_MIGRATE_DST_USER"),
            source_token: text("DRIVE_MIGRATE_SRC_TOKEN"),
            destination_token: text("DRIVE_MIGRATE_DST_TOKEN"),
            api_base: text("DRIVE_MIGRATE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            page_size: read_u64(&lookup, "DRIVE_MIGRATE_PAGE_SIZE", DEFAULT_PAGE_SIZE)
                .min(u64::from(u32::MAX)) as u32,
            retry_attempts: read_u64(&lookup, "DRIVE_MIGRATE_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)
                .min(u64::from(u32::MAX)) as u32,
            retry_base: Duration::from_millis(read_u64(
                &lookup,
                "DRIVE_MIGRATE_RETRY_BASE_MS",
                DEFAULT_RETRY_BASE_MS,
            )),
            retry_max: Duration::from_millis(read_u64(
                &lookup,
                "DRIVE_MIGRATE_RETRY_MAX_MS",
                DEFAULT_RETRY_MAX_MS,
            )),
            require_can_copy: read_bool(&lookup, "DRIVE_MIGRATE_REQUIRE_CAN_COPY", false),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_base, self.retry_max, self.retry_attempts)
    }

    pub fn require_destination_root(&self) -> anyhow::Result<&str> {
        self.destination_root
            .as_deref()
            .context("DRIVE_MIGRATE_DST_ROOT is not set")
    }

    pub fn require_destination_user(&self) -> anyhow::Result<&str> {
        self.destination_user
            .as_deref()
            .context("DRIVE_MIGRATE_DST_USER is not set")
    }

    pub fn require_source_token(&self) -> anyhow::Result<&str> {
        self.source_token
            .as_deref()
            .context("DRIVE_MIGRATE_SRC_TOKEN is not set")
    }

    pub fn require_destination_token(&self) -> anyhow::Result<&str> {
        self.destination_token
            .as_deref()
            .context("DRIVE_MIGRATE_DST_TOKEN is not set")
    }
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
