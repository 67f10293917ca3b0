// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Pipeline orchestration
//!
//! This module contains the pipeline definition structures, DAG building,
//! validation, run state tracking, and the orchestrator.

mod dag;
mod definition;
mod scheduler;
mod state;
mod validation;

pub use dag::DagBuilder;
pub use definition::{
    InputSpec, OutputSpec, Pipeline, ResolvedInput, RetryPolicy, RunnerSpec, Task,
};
pub use scheduler::{Orchestrator, RunOptions};
pub use state::{PipelineRun, RunReport, RunStatus, TaskReport, TaskState, TaskStatus};
pub use validation::{PipelineValidator, ValidationResult};

/// Default pipeline file name
pub const DEFAULT_PIPELINE_FILE: &str = ".artiflow.yaml";
