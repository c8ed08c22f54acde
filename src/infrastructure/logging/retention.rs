//! Retention cleanup for rolling log files

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{info, warn};

/// Deletes log files older than the retention window.
#[derive(Debug, Clone, Copy)]
pub struct LogRetention {
    retention_days: u32,
}

impl LogRetention {
    /// Keep files for `retention_days` days.
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// Remove `pilot.log*` files last modified before the cutoff.
    ///
    /// # Returns
    /// Number of files deleted
    pub async fn prune(&self, log_dir: impl AsRef<Path>) -> Result<usize> {
        self.prune_before(log_dir, Utc::now() - Duration::days(i64::from(self.retention_days)))
            .await
    }

    async fn prune_before(&self, log_dir: impl AsRef<Path>, cutoff: DateTime<Utc>) -> Result<usize> {
        let log_dir = log_dir.as_ref();
        if !log_dir.exists() {
            warn!(path = %log_dir.display(), "log directory does not exist");
            return Ok(0);
        }

        let mut entries = tokio::fs::read_dir(log_dir)
            .await
            .context("failed to read log directory")?;
        let mut deleted = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to read directory entry")?
        {
            let path = entry.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(super::logger::LOG_FILE_PREFIX));
            if !is_log {
                continue;
            }

            let modified: DateTime<Utc> = entry
                .metadata()
                .await
                .context("failed to get file metadata")?
                .modified()
                .context("failed to get file modification time")?
                .into();

            if modified < cutoff {
                tokio::fs::remove_file(&path)
                    .await
                    .context("failed to delete old log file")?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(count = deleted, "cleaned up old log files");
        }
        Ok(deleted)
    }
}
