//! Archives passing verdicts as JSON files.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ChallengeVerdict;

/// Directory of archived passing verdicts.
#[derive(Debug, Clone)]
pub struct VerdictArchive {
    dir: PathBuf,
}

impl VerdictArchive {
    /// Archive rooted at `dir`; created lazily on first store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Archive root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `verdict` to `<dir>/<session_id>.json` and return the path.
    pub async fn store(&self, session_id: Uuid, verdict: &ChallengeVerdict) -> DomainResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{session_id}.json"));
        let body = serde_json::to_vec_pretty(verdict)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
