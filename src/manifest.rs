// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Shared store types
//!
//! Content hashes, artifact references, version records, and lineage edges.
//! These are the records the store layers persist; everything here is plain
//! data with no behavior beyond parsing and display.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

use crate::errors::ArtiflowError;

/// Arbitrary key-value metadata attached to a version
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// BLAKE3 content hash, hex-encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Hash a byte slice
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one registered version of a named artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Logical artifact name
    pub name: String,
    /// Version number (monotonic per name, starts at 1)
    pub version: u64,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self { name: name.into(), version }
    }

    /// Parse a `name@v3` / `name@3` reference
    pub fn parse(s: &str) -> Result<Self, ArtiflowError> {
        let (name, version) = s.split_once('@').ok_or_else(|| ArtiflowError::InvalidName {
            name: s.to_string(),
            reason: "expected '<name>@<version>'".to_string(),
        })?;
        let version = version
            .trim_start_matches('v')
            .parse::<u64>()
            .map_err(|_| ArtiflowError::InvalidName {
                name: s.to_string(),
                reason: format!("'{}' is not a version number", version),
            })?;
        validate_name(name)?;
        Ok(Self::new(name, version))
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

/// One immutable registration of an artifact under a logical name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// Logical artifact name
    pub name: String,
    /// Version number, allocated monotonically per name
    pub number: u64,
    /// Content hash of the stored blob
    pub hash: ContentHash,
    /// Byte length of the blob
    pub size_bytes: u64,
    /// Arbitrary metadata supplied at registration
    #[serde(default)]
    pub metadata: Metadata,
    /// When the version was registered
    pub created_at: SystemTime,
    /// Task id that produced this version, if any
    #[serde(default)]
    pub produced_by: Option<String>,
    /// Commit that registered this version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Uuid>,
}

impl Version {
    /// Reference to this version
    pub fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::new(self.name.clone(), self.number)
    }
}

/// One entry in an alias's audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasRecord {
    /// Version the alias pointed at
    pub target: ArtifactRef,
    /// When the pointer was set
    pub set_at: SystemTime,
    /// Commit that set the pointer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Uuid>,
}

/// A recorded production relation: task consumed inputs, produced output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEdge {
    /// Producing task id
    pub task_id: String,
    /// Input artifact versions, in declaration order
    pub inputs: Vec<ArtifactRef>,
    /// The produced artifact version
    pub output: ArtifactRef,
    /// When the edge was recorded
    pub recorded_at: SystemTime,
    /// Commit that recorded this edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Uuid>,
}

/// Validate an artifact name or alias
///
/// Names double as filenames in the store layout, so the character set
/// is restricted.
pub fn validate_name(name: &str) -> Result<(), ArtiflowError> {
    if name.is_empty() {
        return Err(ArtiflowError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(ArtiflowError::InvalidName {
            name: name.to_string(),
            reason: "contains characters outside [A-Za-z0-9._-]".to_string(),
        });
    }

    if name.starts_with('.') {
        return Err(ArtiflowError::InvalidName {
            name: name.to_string(),
            reason: "may not start with '.'".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(ContentHash::of(b"hello"), ContentHash::of(b"hello"));
        assert_ne!(ContentHash::of(b"hello"), ContentHash::of(b"world"));
    }

    #[test]
    fn test_artifact_ref_display_parse() {
        let r = ArtifactRef::new("features", 3);
        assert_eq!(r.to_string(), "features@v3");
        assert_eq!(ArtifactRef::parse("features@v3").unwrap(), r);
        assert_eq!(ArtifactRef::parse("features@3").unwrap(), r);
    }

    #[test]
    fn test_artifact_ref_parse_rejects_garbage() {
        assert!(ArtifactRef::parse("no-version").is_err());
        assert!(ArtifactRef::parse("name@vx").is_err());
        assert!(ArtifactRef::parse("bad/name@v1").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("features.daily_v2-final").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("sp ace").is_err());
    }
}
