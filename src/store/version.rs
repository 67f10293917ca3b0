// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Append-only version index
//!
//! Maps a logical artifact name to its ordered sequence of versions. Version
//! numbers are allocated monotonically per name starting at 1 and are never
//! reused or deleted; corrections are made by registering a new version.
//! Allocation for a given name is serialized behind the index lock; different
//! names do not contend beyond it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ArtiflowError;
use crate::manifest::{validate_name, ContentHash, Metadata, Version};

/// Which version of a name to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionQuery {
    /// The highest registered version number
    Latest,
    /// A specific version number
    Number(u64),
}

impl std::str::FromStr for VersionQuery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        s.trim_start_matches('v')
            .parse::<u64>()
            .map(Self::Number)
            .map_err(|_| format!("Expected 'latest' or a version number, got '{}'", s))
    }
}

/// Append-only mapping from artifact name to version records
pub struct VersionIndex {
    /// Directory holding one JSON file per name
    dir: PathBuf,
    /// In-memory records, oldest first per name
    inner: RwLock<HashMap<String, Vec<Version>>>,
}

impl VersionIndex {
    /// Open the index, loading all persisted version files
    pub fn open(dir: PathBuf) -> Result<Self, ArtiflowError> {
        std::fs::create_dir_all(&dir).map_err(|e| ArtiflowError::Io {
            message: format!("Failed to create version directory: {}", e),
        })?;

        let mut inner = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let versions: Vec<Version> = serde_json::from_str(&content)?;
            if let Some(first) = versions.first() {
                inner.insert(first.name.clone(), versions);
            }
        }

        Ok(Self { dir, inner: RwLock::new(inner) })
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    async fn persist(&self, name: &str, versions: &[Version]) -> Result<(), ArtiflowError> {
        let json = serde_json::to_string_pretty(versions)?;
        let path = self.file_path(name);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to write version file: {}", e),
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to commit version file: {}", e),
        })?;

        Ok(())
    }

    /// Register a new version for `name`, allocating the next number
    pub async fn register(
        &self,
        name: &str,
        hash: ContentHash,
        size_bytes: u64,
        metadata: Metadata,
        produced_by: Option<String>,
        commit: Option<Uuid>,
    ) -> Result<Version, ArtiflowError> {
        validate_name(name)?;

        let mut inner = self.inner.write().await;
        let versions = inner.entry(name.to_string()).or_default();
        let number = versions.last().map(|v| v.number + 1).unwrap_or(1);

        let version = Version {
            name: name.to_string(),
            number,
            hash,
            size_bytes,
            metadata,
            created_at: SystemTime::now(),
            produced_by,
            commit,
        };

        versions.push(version.clone());
        self.persist(name, versions).await?;

        tracing::debug!(name, number, hash = %version.hash, "version registered");
        Ok(version)
    }

    /// Fetch a specific version or the latest one
    pub async fn get(&self, name: &str, query: VersionQuery) -> Result<Version, ArtiflowError> {
        let inner = self.inner.read().await;
        let versions = inner
            .get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ArtiflowError::ArtifactNotFound { name: name.to_string() })?;

        match query {
            VersionQuery::Latest => versions
                .last()
                .cloned()
                .ok_or_else(|| ArtiflowError::ArtifactNotFound { name: name.to_string() }),
            VersionQuery::Number(n) => versions
                .iter()
                .find(|v| v.number == n)
                .cloned()
                .ok_or(ArtiflowError::VersionNotFound { name: name.to_string(), version: n }),
        }
    }

    /// All versions of a name, newest first
    pub async fn list_versions(&self, name: &str) -> Result<Vec<Version>, ArtiflowError> {
        let inner = self.inner.read().await;
        let mut versions = inner
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| ArtiflowError::ArtifactNotFound { name: name.to_string() })?;
        versions.reverse();
        Ok(versions)
    }

    /// All registered artifact names, sorted
    pub async fn list_names(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        names.sort();
        names
    }

    /// Whether a specific version exists
    pub async fn exists(&self, name: &str, number: u64) -> bool {
        let inner = self.inner.read().await;
        inner
            .get(name)
            .map(|v| v.iter().any(|ver| ver.number == number))
            .unwrap_or(false)
    }

    /// Drop every record registered by `commit` and rewrite affected files
    ///
    /// Used by crash recovery and commit abort. Only the newest entries of a
    /// name can carry an unfinalized commit, so monotonicity is preserved:
    /// the discarded numbers are re-allocated by the retried commit.
    pub async fn purge_commit(&self, commit: Uuid) -> Result<(), ArtiflowError> {
        let mut inner = self.inner.write().await;
        let mut emptied = Vec::new();

        for (name, versions) in inner.iter_mut() {
            let before = versions.len();
            versions.retain(|v| v.commit != Some(commit));
            if versions.len() != before {
                tracing::warn!(name, commit = %commit, "discarding unfinalized version records");
                if versions.is_empty() {
                    emptied.push(name.clone());
                } else {
                    self.persist(name, versions).await?;
                }
            }
        }

        for name in emptied {
            inner.remove(&name);
            let path = self.file_path(&name);
            if path.exists() {
                tokio::fs::remove_file(&path).await.map_err(|e| ArtiflowError::Io {
                    message: format!("Failed to remove version file: {}", e),
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_index(dir: &TempDir) -> VersionIndex {
        VersionIndex::open(dir.path().to_path_buf()).unwrap()
    }

    fn hash(s: &str) -> ContentHash {
        ContentHash::of(s.as_bytes())
    }

    #[tokio::test]
    async fn test_numbers_start_at_one_and_increase() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir).await;

        let v1 = index
            .register("model", hash("a"), 1, Metadata::new(), None, None)
            .await
            .unwrap();
        let v2 = index
            .register("model", hash("b"), 1, Metadata::new(), None, None)
            .await
            .unwrap();

        assert_eq!(v1.number, 1);
        assert_eq!(v2.number, 2);
    }

    #[tokio::test]
    async fn test_list_versions_newest_first() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir).await;

        index.register("n", hash("a"), 1, Metadata::new(), None, None).await.unwrap();
        index.register("n", hash("b"), 1, Metadata::new(), None, None).await.unwrap();

        let versions = index.list_versions("n").await.unwrap();
        assert_eq!(versions[0].number, 2);
        assert_eq!(versions[1].number, 1);

        // Earlier versions are unchanged after later registrations
        let v1 = index.get("n", VersionQuery::Number(1)).await.unwrap();
        assert_eq!(v1.hash, hash("a"));
    }

    #[tokio::test]
    async fn test_get_latest_and_missing() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir).await;

        index.register("n", hash("a"), 1, Metadata::new(), None, None).await.unwrap();

        let latest = index.get("n", VersionQuery::Latest).await.unwrap();
        assert_eq!(latest.number, 1);

        assert!(matches!(
            index.get("n", VersionQuery::Number(9)).await.unwrap_err(),
            ArtiflowError::VersionNotFound { .. }
        ));
        assert!(matches!(
            index.get("other", VersionQuery::Latest).await.unwrap_err(),
            ArtiflowError::ArtifactNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let index = open_index(&dir).await;
            index.register("n", hash("a"), 1, Metadata::new(), Some("t1".into()), None)
                .await
                .unwrap();
        }

        let index = open_index(&dir).await;
        let v = index.get("n", VersionQuery::Latest).await.unwrap();
        assert_eq!(v.number, 1);
        assert_eq!(v.produced_by.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_purge_commit_discards_tagged_records() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir).await;
        let commit = Uuid::new_v4();

        index.register("n", hash("a"), 1, Metadata::new(), None, None).await.unwrap();
        index.register("n", hash("b"), 1, Metadata::new(), None, Some(commit)).await.unwrap();

        index.purge_commit(commit).await.unwrap();

        let versions = index.list_versions("n").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].number, 1);

        // The next registration re-allocates the discarded number
        let v = index.register("n", hash("c"), 1, Metadata::new(), None, None).await.unwrap();
        assert_eq!(v.number, 2);
    }

    #[test]
    fn test_version_query_parsing() {
        assert_eq!("latest".parse::<VersionQuery>().unwrap(), VersionQuery::Latest);
        assert_eq!("3".parse::<VersionQuery>().unwrap(), VersionQuery::Number(3));
        assert_eq!("v3".parse::<VersionQuery>().unwrap(), VersionQuery::Number(3));
        assert!("nope".parse::<VersionQuery>().is_err());
    }
}
