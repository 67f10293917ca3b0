// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! artiflow - Versioned Artifact Store and Pipeline Orchestrator
//!
//! Track artifact versions, their lineage, and the pipelines that produce
//! them.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use artiflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artiflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Init { name } => artiflow::cli::init::run(name, cli.verbose).await,
        Commands::Run {
            pipeline,
            task,
            no_memo,
            dry_run,
            max_workers,
        } => {
            artiflow::cli::run::run(pipeline, task, no_memo, dry_run, max_workers, cli.verbose)
                .await
        }
        Commands::Validate { pipeline } => artiflow::cli::validate::run(pipeline, cli.verbose).await,
        Commands::Graph { pipeline, format } => {
            artiflow::cli::graph::run(pipeline, format, cli.verbose).await
        }
        Commands::Store { action } => artiflow::cli::store::run(action, cli.verbose).await,
        Commands::Alias { action } => artiflow::cli::alias::run(action, cli.verbose).await,
        Commands::Trace { artifact, direction } => {
            artiflow::cli::trace::run(artifact, direction, cli.verbose).await
        }
    }
}
