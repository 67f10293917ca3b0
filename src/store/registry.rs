// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Alias registry
//!
//! Mutable layer mapping a human-meaningful alias to its current version
//! reference. Every update is appended to a per-alias audit trail; the
//! current pointer is always the last record, so replacement is atomic
//! with respect to readers. Updates to a single alias serialize behind
//! the registry lock; different aliases live in different files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ArtiflowError;
use crate::manifest::{validate_name, AliasRecord, ArtifactRef};

/// Alias → current version pointer with retained history
pub struct Registry {
    /// Directory holding one JSON file per alias
    dir: PathBuf,
    /// In-memory audit trails, oldest first; current = last
    inner: RwLock<HashMap<String, Vec<AliasRecord>>>,
}

impl Registry {
    /// Open the registry, loading all persisted alias files
    pub fn open(dir: PathBuf) -> Result<Self, ArtiflowError> {
        std::fs::create_dir_all(&dir).map_err(|e| ArtiflowError::Io {
            message: format!("Failed to create registry directory: {}", e),
        })?;

        let mut inner = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(alias) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            let records: Vec<AliasRecord> = serde_json::from_str(&content)?;
            if !records.is_empty() {
                inner.insert(alias.to_string(), records);
            }
        }

        Ok(Self { dir, inner: RwLock::new(inner) })
    }

    fn file_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{}.json", alias))
    }

    async fn persist(&self, alias: &str, records: &[AliasRecord]) -> Result<(), ArtiflowError> {
        let path = self.file_path(alias);

        if records.is_empty() {
            if path.exists() {
                tokio::fs::remove_file(&path).await.map_err(|e| ArtiflowError::Io {
                    message: format!("Failed to remove alias file: {}", e),
                })?;
            }
            return Ok(());
        }

        let json = serde_json::to_string_pretty(records)?;
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to write alias file: {}", e),
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to commit alias file: {}", e),
        })?;

        Ok(())
    }

    /// Atomically point `alias` at a version, retaining the prior pointer
    /// in the audit trail
    pub async fn set_alias(
        &self,
        alias: &str,
        target: ArtifactRef,
        commit: Option<Uuid>,
    ) -> Result<(), ArtiflowError> {
        validate_name(alias)?;

        let mut inner = self.inner.write().await;
        let records = inner.entry(alias.to_string()).or_default();
        records.push(AliasRecord {
            target: target.clone(),
            set_at: SystemTime::now(),
            commit,
        });
        self.persist(alias, records).await?;

        tracing::debug!(alias, target = %target, "alias updated");
        Ok(())
    }

    /// Resolve an alias to its current version reference
    pub async fn resolve(&self, alias: &str) -> Result<ArtifactRef, ArtiflowError> {
        let inner = self.inner.read().await;
        inner
            .get(alias)
            .and_then(|records| records.last())
            .map(|r| r.target.clone())
            .ok_or_else(|| ArtiflowError::AliasNotFound { alias: alias.to_string() })
    }

    /// Full audit trail for an alias, oldest first
    pub async fn history(&self, alias: &str) -> Result<Vec<AliasRecord>, ArtiflowError> {
        let inner = self.inner.read().await;
        inner
            .get(alias)
            .filter(|r| !r.is_empty())
            .cloned()
            .ok_or_else(|| ArtiflowError::AliasNotFound { alias: alias.to_string() })
    }

    /// All known aliases, sorted
    pub async fn list_aliases(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut aliases: Vec<String> = inner
            .iter()
            .filter(|(_, r)| !r.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        aliases.sort();
        aliases
    }

    /// Drop every audit record written by `commit`
    ///
    /// The current pointer falls back to the previous surviving record, so
    /// an aborted commit restores the alias it moved.
    pub async fn purge_commit(&self, commit: Uuid) -> Result<(), ArtiflowError> {
        let mut inner = self.inner.write().await;
        let mut emptied = Vec::new();

        for (alias, records) in inner.iter_mut() {
            let before = records.len();
            records.retain(|r| r.commit != Some(commit));
            if records.len() != before {
                tracing::warn!(alias, commit = %commit, "discarding unfinalized alias update");
                self.persist(alias, records).await?;
                if records.is_empty() {
                    emptied.push(alias.clone());
                }
            }
        }

        for alias in emptied {
            inner.remove(&alias);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_registry(dir: &TempDir) -> Registry {
        Registry::open(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_set_and_resolve() {
        let dir = TempDir::new().unwrap();
        let registry = open_registry(&dir);

        registry
            .set_alias("prod", ArtifactRef::new("model", 3), None)
            .await
            .unwrap();

        let target = registry.resolve("prod").await.unwrap();
        assert_eq!(target, ArtifactRef::new("model", 3));
    }

    #[tokio::test]
    async fn test_resolve_unknown_alias() {
        let dir = TempDir::new().unwrap();
        let registry = open_registry(&dir);

        assert!(matches!(
            registry.resolve("nope").await.unwrap_err(),
            ArtiflowError::AliasNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_retains_history() {
        let dir = TempDir::new().unwrap();
        let registry = open_registry(&dir);

        registry.set_alias("prod", ArtifactRef::new("model", 1), None).await.unwrap();
        registry.set_alias("prod", ArtifactRef::new("model", 2), None).await.unwrap();

        // Current pointer is the newest, prior value only in history
        assert_eq!(registry.resolve("prod").await.unwrap(), ArtifactRef::new("model", 2));

        let history = registry.history("prod").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].target, ArtifactRef::new("model", 1));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let registry = open_registry(&dir);
            registry.set_alias("prod", ArtifactRef::new("model", 1), None).await.unwrap();
        }

        let registry = open_registry(&dir);
        assert_eq!(registry.resolve("prod").await.unwrap(), ArtifactRef::new("model", 1));
    }

    #[tokio::test]
    async fn test_purge_commit_restores_previous_pointer() {
        let dir = TempDir::new().unwrap();
        let registry = open_registry(&dir);
        let commit = Uuid::new_v4();

        registry.set_alias("prod", ArtifactRef::new("model", 1), None).await.unwrap();
        registry
            .set_alias("prod", ArtifactRef::new("model", 2), Some(commit))
            .await
            .unwrap();

        registry.purge_commit(commit).await.unwrap();

        assert_eq!(registry.resolve("prod").await.unwrap(), ArtifactRef::new("model", 1));
    }
}
