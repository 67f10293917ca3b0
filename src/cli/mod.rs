// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for artiflow.

pub mod alias;
pub mod graph;
pub mod init;
pub mod run;
pub mod store;
pub mod trace;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Versioned artifact store and pipeline orchestrator
///
/// Track artifact versions, their lineage, and the pipelines that produce
/// them.
#[derive(Parser, Debug)]
#[clap(
    name = "artiflow",
    version,
    about = "Versioned artifact store with lineage tracking and pipeline orchestration",
    long_about = None,
    after_help = "Examples:\n\
        artiflow init                     Initialize a new project\n\
        artiflow run                      Execute the pipeline\n\
        artiflow store put data.csv raw   Register a file as an artifact\n\
        artiflow alias set prod raw@v3    Point an alias at a version\n\
        artiflow trace features@v2        Show what a version was built from\n\n\
        See 'artiflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new artiflow project
    Init {
        /// Project name (defaults to current directory name)
        name: Option<String>,
    },

    /// Run the pipeline
    Run {
        /// Pipeline file
        #[clap(short, long, default_value = ".artiflow.yaml")]
        pipeline: PathBuf,

        /// Run only specific tasks
        #[clap(short, long)]
        task: Vec<String>,

        /// Skip memoization (force re-execution)
        #[clap(long)]
        no_memo: bool,

        /// Dry run (show what would be done)
        #[clap(long)]
        dry_run: bool,

        /// Maximum concurrent tasks
        #[clap(long, default_value = "4")]
        max_workers: usize,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = ".artiflow.yaml")]
        pipeline: PathBuf,
    },

    /// Show pipeline as a graph
    Graph {
        /// Pipeline file
        #[clap(default_value = ".artiflow.yaml")]
        pipeline: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "text", value_parser = ["text", "dot", "mermaid"])]
        format: String,
    },

    /// Artifact store management
    Store {
        #[clap(subcommand)]
        action: StoreAction,
    },

    /// Registry alias management
    Alias {
        #[clap(subcommand)]
        action: AliasAction,
    },

    /// Trace artifact lineage
    Trace {
        /// Artifact version, e.g. features@v2
        artifact: String,

        /// Trace direction
        #[clap(short, long, default_value = "ancestors", value_parser = ["ancestors", "descendants"])]
        direction: String,
    },
}

/// Store management actions
#[derive(Subcommand, Debug, Clone)]
pub enum StoreAction {
    /// Register a file as a new artifact version
    Put {
        /// File to store
        file: PathBuf,

        /// Artifact name
        name: String,

        /// Metadata entries as key=value pairs
        #[clap(short, long)]
        meta: Vec<String>,
    },

    /// Fetch an artifact version's content
    Get {
        /// Artifact reference, e.g. raw@latest or raw@v3
        artifact: String,

        /// Write to file instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// List versions of an artifact
    Versions {
        /// Artifact name
        name: String,
    },

    /// List all artifact names
    List,
}

/// Alias management actions
#[derive(Subcommand, Debug, Clone)]
pub enum AliasAction {
    /// Point an alias at an artifact version
    Set {
        /// Alias name
        alias: String,

        /// Target version, e.g. features@v3
        artifact: String,
    },

    /// Resolve an alias to its current target
    Resolve {
        /// Alias name
        alias: String,
    },

    /// Show the full pointer history of an alias
    History {
        /// Alias name
        alias: String,
    },
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Open the store under the working directory's default location
pub(crate) async fn open_store() -> miette::Result<crate::store::ArtifactStore> {
    let root = std::path::Path::new(crate::store::DEFAULT_STORE_DIR);
    crate::store::ArtifactStore::open(root)
        .await
        .map_err(Into::into)
}
