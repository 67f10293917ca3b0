// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Task runners
//!
//! This module provides the runner trait and implementations. A runner
//! computes a task's output bytes from its resolved input versions; the
//! orchestrator owns committing those bytes to the store.

mod shell;

pub use shell::ShellRunner;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ArtiflowError;
use crate::manifest::{ArtifactRef, Metadata};
use crate::pipeline::Task;

/// An input version with its content, materialized for one attempt
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    /// Artifact name
    pub name: String,

    /// The exact version being consumed
    pub artifact: ArtifactRef,

    /// Blob content
    pub bytes: Vec<u8>,
}

/// Everything a runner needs for one task attempt
///
/// Secret material lives only in this in-memory context; it is resolved
/// from handles just before the attempt and never written to the store.
pub struct TaskContext {
    /// The task definition
    pub task: Task,

    /// Resolved and fetched inputs
    pub inputs: Vec<ResolvedArtifact>,

    /// Merged environment (pipeline env overridden by task env)
    pub env: HashMap<String, String>,

    /// Resolved credentials, keyed by handle
    pub secrets: HashMap<String, String>,
}

/// Output bytes produced by a runner for one declared artifact name
#[derive(Debug, Clone)]
pub struct TaskOutput {
    /// Declared output name this content belongs to
    pub name: String,

    /// Content to commit
    pub bytes: Vec<u8>,

    /// Metadata to attach to the new version
    pub metadata: Metadata,
}

impl TaskOutput {
    /// Output with no metadata
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            metadata: Metadata::new(),
        }
    }
}

/// Trait for task runners
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Execute one attempt of a task
    ///
    /// Returns one [`TaskOutput`] per declared output name. Failures that
    /// may succeed on retry should be flagged retryable so the task's
    /// retry budget applies.
    async fn run(&self, ctx: &TaskContext) -> Result<Vec<TaskOutput>, ArtiflowError>;

    /// Check if the runner can execute on this host
    async fn check_available(&self) -> Result<bool, ArtiflowError>;
}

/// Source of credential material for secret handles
pub trait CredentialSource: Send + Sync {
    /// Resolve a handle to its secret material
    fn resolve(&self, handle: &str) -> Result<String, ArtiflowError>;
}

/// Resolves credential handles from process environment variables
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn resolve(&self, handle: &str) -> Result<String, ArtiflowError> {
        std::env::var(handle).map_err(|_| ArtiflowError::CredentialNotFound {
            handle: handle.to_string(),
        })
    }
}

/// Create a standard runner setup with all built-in runners
pub fn create_default_runners() -> HashMap<String, Arc<dyn TaskRunner>> {
    let mut runners: HashMap<String, Arc<dyn TaskRunner>> = HashMap::new();

    // Shell runner always available
    runners.insert("shell".to_string(), Arc::new(ShellRunner::new()));

    runners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_credentials_resolve() {
        std::env::set_var("ARTIFLOW_TEST_TOKEN", "s3cret");
        let source = EnvCredentials;
        assert_eq!(source.resolve("ARTIFLOW_TEST_TOKEN").unwrap(), "s3cret");
    }

    #[test]
    fn test_env_credentials_missing_handle() {
        let source = EnvCredentials;
        let err = source.resolve("ARTIFLOW_TEST_NO_SUCH_HANDLE").unwrap_err();
        assert!(matches!(err, ArtiflowError::CredentialNotFound { .. }));
    }

    #[test]
    fn test_default_runners_include_shell() {
        let runners = create_default_runners();
        assert!(runners.contains_key("shell"));
    }
}
