// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Content-addressed blob storage
//!
//! Blobs are keyed by their BLAKE3 hash and stored under a sharded
//! directory layout. Writes go through a temp file and an atomic rename,
//! so a crash mid-write never leaves a partially visible blob. Content is
//! immutable once committed; there is no update or delete.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::errors::ArtiflowError;
use crate::manifest::ContentHash;

/// Filesystem blob store keyed by content hash
pub struct ContentStore {
    /// Root directory for blob files
    blob_dir: PathBuf,
}

impl ContentStore {
    /// Open (creating if needed) a content store rooted at `blob_dir`
    pub fn open(blob_dir: PathBuf) -> Result<Self, ArtiflowError> {
        std::fs::create_dir_all(&blob_dir).map_err(|e| ArtiflowError::Io {
            message: format!("Failed to create blob directory: {}", e),
        })?;

        Ok(Self { blob_dir })
    }

    /// Path for a blob, sharded by the first 2 hex chars of its hash
    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        let (prefix, rest) = hash.as_str().split_at(2.min(hash.as_str().len()));
        self.blob_dir.join(prefix).join(rest)
    }

    /// Store bytes, returning their content hash
    ///
    /// Identical bytes always yield the same hash; if the blob already
    /// exists the call is a no-op. Concurrent writers of the same content
    /// race benignly: both produce the same file.
    pub async fn put(&self, bytes: &[u8]) -> Result<ContentHash, ArtiflowError> {
        let hash = ContentHash::of(bytes);
        let path = self.blob_path(&hash);

        if path.exists() {
            tracing::debug!(hash = %hash, "blob already present, deduplicated");
            return Ok(hash);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ArtiflowError::Io {
                message: format!("Failed to create blob shard directory: {}", e),
            })?;
        }

        // Write-then-commit: the blob becomes visible only via the rename.
        // Each caller gets its own temp file, so concurrent writers of the
        // same content never touch each other's in-flight write.
        let tmp = path.with_extension(format!("tmp.{}.{}", std::process::id(), Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to write blob: {}", e),
        })?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            // Another writer of the same bytes may have committed first.
            let _ = tokio::fs::remove_file(&tmp).await;
            if !path.exists() {
                return Err(ArtiflowError::Io {
                    message: format!("Failed to commit blob: {}", e),
                });
            }
        }

        tracing::debug!(hash = %hash, size = bytes.len(), "blob stored");
        Ok(hash)
    }

    /// Read a blob back, verifying its hash
    pub async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, ArtiflowError> {
        let path = self.blob_path(hash);

        if !path.exists() {
            return Err(ArtiflowError::BlobNotFound { hash: hash.to_string() });
        }

        let bytes = tokio::fs::read(&path).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to read blob: {}", e),
        })?;

        let actual = ContentHash::of(&bytes);
        if actual != *hash {
            return Err(ArtiflowError::Corrupt {
                hash: hash.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(bytes)
    }

    /// Whether a blob with this hash is present
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.blob_path(hash).exists()
    }

    /// Number of blobs and their total size on disk
    pub fn stats(&self) -> Result<(usize, u64), ArtiflowError> {
        let mut count = 0;
        let mut size = 0;

        if !self.blob_dir.exists() {
            return Ok((0, 0));
        }

        for shard in std::fs::read_dir(&self.blob_dir)? {
            let shard = shard?.path();
            if !shard.is_dir() {
                continue;
            }
            for blob in std::fs::read_dir(&shard)? {
                let blob = blob?;
                if Self::is_temp(&blob.path()) {
                    continue;
                }
                count += 1;
                size += blob.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        Ok((count, size))
    }

    fn is_temp(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.starts_with("tmp"))
            .unwrap_or(false)
            || path
                .to_str()
                .map(|s| s.contains(".tmp."))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::open(dir.path().to_path_buf()).unwrap();

        let hash = store.put(b"some artifact bytes").await.unwrap();
        let bytes = store.get(&hash).await.unwrap();
        assert_eq!(bytes, b"some artifact bytes");
    }

    #[tokio::test]
    async fn test_identical_content_deduplicates() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::open(dir.path().to_path_buf()).unwrap();

        let h1 = store.put(b"same bytes").await.unwrap();
        let h2 = store.put(b"same bytes").await.unwrap();
        assert_eq!(h1, h2);
        assert!(store.contains(&h1));

        // Exactly one physical copy
        let (count, _) = store.stats().unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_same_content_puts() {
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(ContentStore::open(dir.path().to_path_buf()).unwrap());

        let mut writers = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            writers.push(tokio::spawn(async move { store.put(b"contended bytes").await }));
        }

        // Every writer succeeds and agrees on the hash
        let expected = ContentHash::of(b"contended bytes");
        for writer in writers {
            assert_eq!(writer.await.unwrap().unwrap(), expected);
        }

        let bytes = store.get(&expected).await.unwrap();
        assert_eq!(bytes, b"contended bytes");

        let (count, _) = store.stats().unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_get_missing_blob() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::open(dir.path().to_path_buf()).unwrap();

        let missing = ContentHash::of(b"never stored");
        let err = store.get(&missing).await.unwrap_err();
        assert!(matches!(err, ArtiflowError::BlobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::open(dir.path().to_path_buf()).unwrap();

        let hash = store.put(b"original").await.unwrap();

        // Tamper with the blob file behind the store's back
        let path = store.blob_path(&hash);
        std::fs::write(&path, b"tampered").unwrap();

        let err = store.get(&hash).await.unwrap_err();
        assert!(matches!(err, ArtiflowError::Corrupt { .. }));
    }
}
