// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Write-ahead commit staging
//!
//! A multi-store commit (blob + version + lineage edge + optional alias) has
//! no single-engine transaction, so each commit first writes a staging record
//! describing its intent. The record is removed only after every write has
//! landed. A recovery pass at store open treats any surviving record as an
//! unfinalized commit and discards its writes from every store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

use crate::errors::ArtiflowError;
use crate::manifest::{ArtifactRef, ContentHash};

/// Intent record for one in-flight commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedCommit {
    /// Commit id; store records written by this commit carry it
    pub id: Uuid,
    /// Producing task, if the commit comes from a pipeline run
    pub task_id: Option<String>,
    /// Output artifact name being registered
    pub output_name: String,
    /// Content hash of the output blob
    pub hash: ContentHash,
    /// Input versions consumed to produce the output
    pub inputs: Vec<ArtifactRef>,
    /// Alias to repoint at the new version, if any
    pub publish: Option<String>,
    /// When the commit was staged
    pub staged_at: SystemTime,
}

/// Staging records, one JSON file per in-flight commit
pub struct CommitLog {
    dir: PathBuf,
}

impl CommitLog {
    /// Open (creating if needed) the staging directory
    pub fn open(dir: PathBuf) -> Result<Self, ArtiflowError> {
        std::fs::create_dir_all(&dir).map_err(|e| ArtiflowError::Io {
            message: format!("Failed to create staging directory: {}", e),
        })?;

        Ok(Self { dir })
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// List unfinalized commits left behind by a crash
    pub fn pending(&self) -> Result<Vec<StagedCommit>, ArtiflowError> {
        let mut staged = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<StagedCommit>(&content) {
                Ok(commit) => staged.push(commit),
                Err(e) => {
                    // A torn staging file means the commit never reached the
                    // stores; safe to drop.
                    tracing::warn!(path = %path.display(), error = %e, "dropping unreadable staging record");
                    std::fs::remove_file(&path)?;
                }
            }
        }

        Ok(staged)
    }

    /// Write the staging record for a new commit
    pub async fn begin(&self, staged: &StagedCommit) -> Result<(), ArtiflowError> {
        let json = serde_json::to_string_pretty(staged)?;
        let path = self.path(staged.id);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to write staging record: {}", e),
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to commit staging record: {}", e),
        })?;

        Ok(())
    }

    /// Mark a commit finalized by removing its staging record
    pub async fn finalize(&self, id: Uuid) -> Result<(), ArtiflowError> {
        let path = self.path(id);
        if path.exists() {
            tokio::fs::remove_file(&path).await.map_err(|e| ArtiflowError::Io {
                message: format!("Failed to remove staging record: {}", e),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged(id: Uuid) -> StagedCommit {
        StagedCommit {
            id,
            task_id: Some("t1".into()),
            output_name: "out".into(),
            hash: ContentHash::of(b"x"),
            inputs: vec![ArtifactRef::new("in", 1)],
            publish: None,
            staged_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_begin_finalize_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = CommitLog::open(dir.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();

        log.begin(&staged(id)).await.unwrap();
        assert_eq!(log.pending().unwrap().len(), 1);

        log.finalize(id).await.unwrap();
        assert!(log.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        {
            let log = CommitLog::open(dir.path().to_path_buf()).unwrap();
            log.begin(&staged(id)).await.unwrap();
        }

        let log = CommitLog::open(dir.path().to_path_buf()).unwrap();
        let pending = log.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn test_torn_staging_record_dropped() {
        let dir = TempDir::new().unwrap();
        let log = CommitLog::open(dir.path().to_path_buf()).unwrap();

        std::fs::write(dir.path().join("torn.json"), b"{not json").unwrap();
        assert!(log.pending().unwrap().is_empty());
        assert!(!dir.path().join("torn.json").exists());
    }
}
