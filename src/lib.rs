// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! # artiflow - Versioned Artifact Store and Pipeline Orchestrator
//!
//! `artiflow` tracks data artifacts as immutable, content-addressed
//! versions; records the lineage of how each version was produced; and runs
//! pipelines of tasks in dependency order with retries, timeouts, and
//! memoization.
//!
//! ## Features
//!
//! - **Content-addressed storage** - Identical bytes are stored once
//! - **Append-only versioning** - Every write is a new immutable version
//! - **Alias registry** - Mutable pointers like `features-prod` with history
//! - **Lineage tracking** - Trace any version to its inputs, transitively
//! - **Pipeline orchestration** - Concurrent DAG execution with retries and
//!   cooperative cancellation
//!
//! ## Quick Start
//!
//! ```bash
//! # Initialize a new project
//! artiflow init
//!
//! # Run the pipeline
//! artiflow run
//!
//! # Inspect what got produced
//! artiflow store versions features
//! artiflow trace features@v1
//! ```

pub mod cli;
pub mod errors;
pub mod lineage;
pub mod manifest;
pub mod notify;
pub mod pipeline;
pub mod runner;
pub mod store;

// Re-export commonly used types
pub use errors::{ArtiflowError, ArtiflowResult};
pub use manifest::{ArtifactRef, ContentHash, Version};
pub use pipeline::{Orchestrator, Pipeline, RunOptions, RunReport};
pub use store::ArtifactStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
