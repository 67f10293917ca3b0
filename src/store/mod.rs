// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Artifact store
//!
//! Layered storage for versioned artifacts: content-addressed blobs, an
//! append-only version index, a mutable alias registry, and write-ahead
//! commit staging. The [`ArtifactStore`] facade wires the layers together
//! with the lineage graph and exposes the atomic commit path used by the
//! orchestrator.

mod commit;
mod content;
mod registry;
mod version;

pub use commit::{CommitLog, StagedCommit};
pub use content::ContentStore;
pub use registry::Registry;
pub use version::{VersionIndex, VersionQuery};

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

use crate::errors::ArtiflowError;
use crate::lineage::LineageGraph;
use crate::manifest::{validate_name, ArtifactRef, Metadata, Version};

/// Default store root, relative to the working directory
pub const DEFAULT_STORE_DIR: &str = ".artiflow/store";

/// A task output to commit through every store layer at once
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Producing task id; lineage is recorded only for task outputs
    pub task_id: Option<String>,
    /// Output artifact name
    pub name: String,
    /// Output bytes
    pub bytes: Vec<u8>,
    /// Metadata for the new version
    pub metadata: Metadata,
    /// Input versions the output was derived from
    pub inputs: Vec<ArtifactRef>,
    /// Alias to repoint at the new version, if any
    pub publish: Option<String>,
}

/// Facade over the store layers and the lineage graph
pub struct ArtifactStore {
    root: PathBuf,
    pub content: ContentStore,
    pub versions: VersionIndex,
    pub registry: Registry,
    pub lineage: LineageGraph,
    commits: CommitLog,
}

impl ArtifactStore {
    /// Open a store rooted at `root`, running crash recovery first
    pub async fn open(root: &Path) -> Result<Self, ArtiflowError> {
        let store = Self {
            root: root.to_path_buf(),
            content: ContentStore::open(root.join("blobs"))?,
            versions: VersionIndex::open(root.join("versions"))?,
            registry: Registry::open(root.join("registry"))?,
            lineage: LineageGraph::open(root.join("lineage"))?,
            commits: CommitLog::open(root.join("staging"))?,
        };

        store.recover().await?;
        Ok(store)
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discard the writes of every unfinalized commit
    ///
    /// Orphaned blobs are left in place: content addressing makes them
    /// harmless and the retried commit will deduplicate against them.
    async fn recover(&self) -> Result<(), ArtiflowError> {
        let pending = self.commits.pending()?;

        for staged in pending {
            tracing::warn!(
                commit = %staged.id,
                output = staged.output_name,
                "recovering unfinalized commit"
            );
            self.discard(staged.id).await?;
        }

        Ok(())
    }

    /// Purge a commit's records from every layer and drop its staging record
    async fn discard(&self, id: Uuid) -> Result<(), ArtiflowError> {
        self.versions.purge_commit(id).await?;
        self.lineage.purge_commit(id).await?;
        self.registry.purge_commit(id).await?;
        self.commits.finalize(id).await
    }

    /// Commit a task output atomically across blob, version, lineage, and
    /// (optionally) alias layers
    ///
    /// Either all writes become visible or none: on any failure the staged
    /// records are discarded, so no partial version, edge, or alias pointer
    /// survives.
    pub async fn commit_output(&self, req: CommitRequest) -> Result<Version, ArtiflowError> {
        validate_name(&req.name)?;
        if let Some(ref alias) = req.publish {
            validate_name(alias)?;
        }

        // Blob first: idempotent, and an orphan is harmless on failure.
        let hash = self.content.put(&req.bytes).await?;

        let id = Uuid::new_v4();
        self.commits
            .begin(&StagedCommit {
                id,
                task_id: req.task_id.clone(),
                output_name: req.name.clone(),
                hash: hash.clone(),
                inputs: req.inputs.clone(),
                publish: req.publish.clone(),
                staged_at: SystemTime::now(),
            })
            .await?;

        let result = self.apply_commit(id, &req, hash).await;

        match result {
            Ok(version) => {
                self.commits.finalize(id).await?;
                Ok(version)
            }
            Err(e) => {
                self.discard(id).await?;
                Err(e)
            }
        }
    }

    async fn apply_commit(
        &self,
        id: Uuid,
        req: &CommitRequest,
        hash: crate::manifest::ContentHash,
    ) -> Result<Version, ArtiflowError> {
        let version = self
            .versions
            .register(
                &req.name,
                hash,
                req.bytes.len() as u64,
                req.metadata.clone(),
                req.task_id.clone(),
                Some(id),
            )
            .await?;

        let output_ref = version.artifact_ref();

        if let Some(ref task_id) = req.task_id {
            self.lineage
                .record_edge(task_id, &req.inputs, &output_ref, Some(id))
                .await?;
        }

        if let Some(ref alias) = req.publish {
            self.registry.set_alias(alias, output_ref, Some(id)).await?;
        }

        Ok(version)
    }

    /// Resolve an alias to the version record it points at
    ///
    /// Fails `VersionNotFound` if the alias target no longer exists in the
    /// version index.
    pub async fn resolve_alias(&self, alias: &str) -> Result<Version, ArtiflowError> {
        let target = self.registry.resolve(alias).await?;
        self.versions
            .get(&target.name, VersionQuery::Number(target.version))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(name: &str, bytes: &[u8]) -> CommitRequest {
        CommitRequest {
            task_id: Some("task-a".into()),
            name: name.into(),
            bytes: bytes.to_vec(),
            metadata: Metadata::new(),
            inputs: vec![],
            publish: None,
        }
    }

    #[tokio::test]
    async fn test_commit_registers_all_layers() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).await.unwrap();

        let mut req = request("features", b"bytes");
        req.publish = Some("prod".into());

        let version = store.commit_output(req).await.unwrap();
        assert_eq!(version.number, 1);

        // Blob readable and hash-verified
        let bytes = store.content.get(&version.hash).await.unwrap();
        assert_eq!(bytes, b"bytes");

        // Lineage edge recorded for the producing task
        let edge = store.lineage.producing_edge(&version.artifact_ref()).await.unwrap();
        assert_eq!(edge.task_id, "task-a");

        // Alias repointed
        let resolved = store.resolve_alias("prod").await.unwrap();
        assert_eq!(resolved.number, 1);

        // Commit finalized: reopening recovers nothing
        drop(store);
        let store = ArtifactStore::open(dir.path()).await.unwrap();
        assert!(store.versions.exists("features", 1).await);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_partial_state() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).await.unwrap();

        // Pre-claim out@v1 in the lineage graph so the commit's edge write
        // fails after the version write has already happened.
        store
            .lineage
            .record_edge("squatter", &[], &ArtifactRef::new("out", 1), None)
            .await
            .unwrap();

        let mut req = request("out", b"bytes");
        req.publish = Some("prod".into());

        let err = store.commit_output(req).await.unwrap_err();
        assert!(matches!(err, ArtiflowError::Conflict { .. }));

        // The half-applied version and alias were discarded
        assert!(matches!(
            store.versions.get("out", VersionQuery::Latest).await.unwrap_err(),
            ArtiflowError::ArtifactNotFound { .. }
        ));
        assert!(matches!(
            store.registry.resolve("prod").await.unwrap_err(),
            ArtiflowError::AliasNotFound { .. }
        ));
        assert!(store.commits.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_discards_unfinalized_commit() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();

        {
            let store = ArtifactStore::open(dir.path()).await.unwrap();

            // Simulate a crash mid-commit: staged record exists, version and
            // alias written, finalize never ran.
            store
                .commits
                .begin(&StagedCommit {
                    id,
                    task_id: Some("t1".into()),
                    output_name: "out".into(),
                    hash: crate::manifest::ContentHash::of(b"x"),
                    inputs: vec![],
                    publish: Some("prod".into()),
                    staged_at: SystemTime::now(),
                })
                .await
                .unwrap();
            store
                .versions
                .register("out", crate::manifest::ContentHash::of(b"x"), 1, Metadata::new(), Some("t1".into()), Some(id))
                .await
                .unwrap();
            store
                .registry
                .set_alias("prod", ArtifactRef::new("out", 1), Some(id))
                .await
                .unwrap();
        }

        let store = ArtifactStore::open(dir.path()).await.unwrap();

        // The half-committed version and alias are gone
        assert!(matches!(
            store.versions.get("out", VersionQuery::Latest).await.unwrap_err(),
            ArtiflowError::ArtifactNotFound { .. }
        ));
        assert!(matches!(
            store.registry.resolve("prod").await.unwrap_err(),
            ArtiflowError::AliasNotFound { .. }
        ));
        assert!(store.commits.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_without_task_records_no_lineage() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).await.unwrap();

        let mut req = request("adhoc", b"manual upload");
        req.task_id = None;

        let version = store.commit_output(req).await.unwrap();
        assert!(store.lineage.producing_edge(&version.artifact_ref()).await.is_none());
    }
}
