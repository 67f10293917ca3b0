// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for .artiflow.yaml files. A pipeline is a DAG of
//! tasks; each task declares the artifact versions it consumes, the
//! artifact names it produces, and how to run it. Task definitions are
//! immutable; their fingerprint keys the orchestrator's memoization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::ArtiflowError;
use crate::manifest::ArtifactRef;
use crate::store::VersionQuery;

/// Pipeline definition from .artiflow.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Schema version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Tasks forming the DAG
    pub tasks: Vec<Task>,

    /// Global environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_version() -> String {
    "1".to_string()
}

impl Pipeline {
    /// Load pipeline from a YAML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ArtiflowError> {
        if !path.exists() {
            return Err(ArtiflowError::PipelineNotFound { path: path.to_path_buf() });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ArtiflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize pipeline to YAML
    pub fn to_yaml(&self) -> Result<String, ArtiflowError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a task by id
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// All task ids
    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    /// The task (if any) that declares `artifact` as an output
    pub fn producer_of(&self, artifact: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.outputs.iter().any(|o| o.name() == artifact))
    }

    /// The task (if any) that repoints `alias` on success
    pub fn publisher_of(&self, alias: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.outputs.iter().any(|o| o.publish() == Some(alias)))
    }
}

/// A single pipeline task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task id (must be unique within the pipeline)
    pub id: String,

    /// Task description
    #[serde(default)]
    pub description: Option<String>,

    /// Runner that computes the task's outputs
    pub runner: RunnerSpec,

    /// Artifact versions the task consumes
    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    /// Artifact names the task produces
    pub outputs: Vec<OutputSpec>,

    /// Task dependencies (other task ids)
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Timeout for one attempt; unlimited when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Environment variables for this task
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Credential handle ids resolved at execution time; the secret
    /// material itself is never persisted
    #[serde(default)]
    pub secrets: Vec<String>,
}

impl Task {
    /// Deterministic fingerprint of the task definition
    ///
    /// Identical definitions hash identically, so the fingerprint combined
    /// with a resolved input version set keys idempotent re-run detection.
    pub fn fingerprint(&self) -> String {
        // serde_json writes struct fields in declaration order, making the
        // encoding canonical for a given definition.
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&encoded).to_hex().to_string()
    }

    /// Name of the runner this task requires
    pub fn runner_name(&self) -> &str {
        match &self.runner {
            RunnerSpec::Shell { .. } => "shell",
        }
    }

    /// Timeout as a duration, if set
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Runner specification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunnerSpec {
    /// Run a shell command in a scratch directory
    Shell {
        /// Command to run
        command: String,

        /// Shell to use (bash, sh, etc.)
        #[serde(default = "default_shell")]
        shell: String,
    },
}

fn default_shell() -> String {
    "bash".to_string()
}

/// Input specification for a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    /// Direct reference: `name`, `name@latest`, or `name@v3`
    Reference(String),

    /// Resolve through a registry alias
    Alias {
        /// Alias to resolve at execution time
        alias: String,
    },
}

impl InputSpec {
    /// The artifact name a direct reference points at, for implicit
    /// dependency wiring (aliases resolve through the registry instead)
    pub fn artifact_name(&self) -> Option<&str> {
        match self {
            Self::Reference(s) => Some(s.split('@').next().unwrap_or(s)),
            Self::Alias { .. } => None,
        }
    }

    /// Split a direct reference into name and version query
    pub fn parse_reference(&self) -> Result<Option<(String, VersionQuery)>, ArtiflowError> {
        let Self::Reference(s) = self else {
            return Ok(None);
        };

        let (name, query) = match s.split_once('@') {
            None => (s.as_str(), VersionQuery::Latest),
            Some((name, version)) => {
                let query = version
                    .parse::<VersionQuery>()
                    .map_err(|reason| ArtiflowError::InvalidName { name: s.clone(), reason })?;
                (name, query)
            }
        };

        crate::manifest::validate_name(name)?;
        Ok(Some((name.to_string(), query)))
    }
}

impl std::fmt::Display for InputSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference(s) => write!(f, "{}", s),
            Self::Alias { alias } => write!(f, "alias:{}", alias),
        }
    }
}

/// Output specification for a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputSpec {
    /// Artifact name only
    Name(String),

    /// Artifact name plus an alias to repoint on success
    Published {
        /// Artifact name
        name: String,
        /// Alias updated to the new version when the task commits
        publish: String,
    },
}

impl OutputSpec {
    /// The declared artifact name
    pub fn name(&self) -> &str {
        match self {
            Self::Name(n) => n,
            Self::Published { name, .. } => name,
        }
    }

    /// The alias to update, if declared
    pub fn publish(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Published { publish, .. } => Some(publish),
        }
    }
}

/// Retry policy for a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts including the first (1 = no retries)
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,

    /// Base backoff in milliseconds; doubles each retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the attempt following `failed_attempt`
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(failed_attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// A resolved input: the declared spec plus the version it resolved to
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// The declared input
    pub spec: InputSpec,
    /// The version it resolved to
    pub artifact: ArtifactRef,
}
