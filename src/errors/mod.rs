// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Error types for the artifact store and orchestrator
//!
//! Errors carry diagnostic codes and help text so a failed pipeline run
//! points at the store entry or task that caused it.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for artiflow operations
pub type ArtiflowResult<T> = Result<T, ArtiflowError>;

/// Main error type for artiflow
#[derive(Error, Debug, Diagnostic)]
pub enum ArtiflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Blob not found: {hash}")]
    #[diagnostic(
        code(artiflow::blob_not_found),
        help("The content hash is not present in the store. It may belong to a different store root.")
    )]
    BlobNotFound { hash: String },

    #[error("Blob {hash} is corrupt: content hashes to {actual}")]
    #[diagnostic(
        code(artiflow::corrupt_blob),
        help("The stored bytes no longer match their content hash. The blob file was modified or truncated on disk.")
    )]
    Corrupt { hash: String, actual: String },

    #[error("No versions registered under name '{name}'")]
    #[diagnostic(code(artiflow::artifact_not_found))]
    ArtifactNotFound { name: String },

    #[error("Version {version} of '{name}' not found")]
    #[diagnostic(
        code(artiflow::version_not_found),
        help("List registered versions with 'artiflow store versions {name}'")
    )]
    VersionNotFound { name: String, version: u64 },

    #[error("Alias '{alias}' is not set")]
    #[diagnostic(
        code(artiflow::alias_not_found),
        help("Set it with 'artiflow alias set {alias} <name>@<version>'")
    )]
    AliasNotFound { alias: String },

    #[error("Conflict: {message}")]
    #[diagnostic(code(artiflow::conflict))]
    Conflict { message: String },

    #[error("Invalid name '{name}': {reason}")]
    #[diagnostic(
        code(artiflow::invalid_name),
        help("Artifact names and aliases may contain letters, digits, '.', '_' and '-'")
    )]
    InvalidName { name: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Lineage Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Recording edge for '{output}' would create a lineage cycle")]
    #[diagnostic(
        code(artiflow::lineage_cycle),
        help("The output artifact is already an ancestor of one of the inputs. The edge was not recorded.")
    )]
    LineageCycle { output: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(artiflow::pipeline_not_found),
        help("Create a pipeline with 'artiflow init' or create .artiflow.yaml manually")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(artiflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Circular dependency detected")]
    #[diagnostic(
        code(artiflow::circular_dependency),
        help("Review your task dependencies to remove the cycle")
    )]
    CircularDependency { tasks: Vec<String> },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    #[diagnostic(
        code(artiflow::unknown_dependency),
        help("Check that '{dependency}' is defined in your pipeline")
    )]
    UnknownDependency { task: String, dependency: String },

    #[error("Duplicate task id '{task}'")]
    #[diagnostic(code(artiflow::duplicate_task))]
    DuplicateTask { task: String },

    #[error("Task '{task}' not found in pipeline")]
    #[diagnostic(code(artiflow::task_not_found))]
    TaskNotFound { task: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Task '{task}' failed: {message}")]
    #[diagnostic(code(artiflow::task_failed))]
    TaskFailed {
        task: String,
        message: String,
        retryable: bool,
    },

    #[error("Task '{task}' timed out after {seconds}s")]
    #[diagnostic(
        code(artiflow::task_timeout),
        help("Raise 'timeout_secs' on the task, or check for a hung command")
    )]
    TaskTimeout { task: String, seconds: u64 },

    #[error("No runner registered for '{runner}'")]
    #[diagnostic(
        code(artiflow::runner_not_found),
        help("Available runners: shell")
    )]
    RunnerNotFound { runner: String },

    #[error("Credential handle '{handle}' could not be resolved")]
    #[diagnostic(
        code(artiflow::credential_not_found),
        help("Credential handles resolve through the configured credential source, e.g. environment variables")
    )]
    CredentialNotFound { handle: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(artiflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(artiflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(artiflow::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for ArtiflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for ArtiflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for ArtiflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl ArtiflowError {
    /// Whether this error may consume retry budget.
    ///
    /// Cycle and corruption errors are always fatal; a task failure is
    /// retryable only when the runner explicitly flagged it as such.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TaskTimeout { .. } => true,
            Self::TaskFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Short machine-readable kind for run reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlobNotFound { .. }
            | Self::ArtifactNotFound { .. }
            | Self::VersionNotFound { .. }
            | Self::AliasNotFound { .. }
            | Self::TaskNotFound { .. }
            | Self::PipelineNotFound { .. } => "not_found",
            Self::Corrupt { .. } => "corrupt",
            Self::LineageCycle { .. } | Self::CircularDependency { .. } => "cycle_detected",
            Self::Conflict { .. } => "conflict",
            Self::TaskFailed { .. } => "task_failure",
            Self::TaskTimeout { .. } => "timeout",
            Self::UnknownDependency { .. }
            | Self::DuplicateTask { .. }
            | Self::InvalidPipeline { .. }
            | Self::InvalidName { .. } => "invalid_pipeline",
            Self::RunnerNotFound { .. } => "runner_not_found",
            Self::CredentialNotFound { .. } => "credential_not_found",
            Self::Io { .. } => "io",
            Self::Yaml { .. } | Self::Json { .. } => "parse",
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Create a retryable task failure
    pub fn transient(task: &str, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            task: task.to_string(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a fatal task failure
    pub fn fatal(task: &str, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            task: task.to_string(),
            message: message.into(),
            retryable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ArtiflowError::TaskTimeout { task: "t".into(), seconds: 5 }.is_retryable());
        assert!(ArtiflowError::transient("t", "flaky upstream").is_retryable());
        assert!(!ArtiflowError::fatal("t", "bad input").is_retryable());
        assert!(!ArtiflowError::LineageCycle { output: "a@v1".into() }.is_retryable());
        assert!(!ArtiflowError::Corrupt { hash: "x".into(), actual: "y".into() }.is_retryable());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ArtiflowError::AliasNotFound { alias: "prod".into() }.kind(),
            "not_found"
        );
        assert_eq!(
            ArtiflowError::CircularDependency { tasks: vec![] }.kind(),
            "cycle_detected"
        );
        assert_eq!(ArtiflowError::conflict("x").kind(), "conflict");
    }
}
