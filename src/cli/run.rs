// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Run command - execute the pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::pipeline::{Orchestrator, Pipeline, PipelineValidator, RunOptions, RunStatus};

/// Run the pipeline
pub async fn run(
    pipeline_path: PathBuf,
    tasks: Vec<String>,
    no_memo: bool,
    dry_run: bool,
    max_workers: usize,
    verbose: bool,
) -> Result<()> {
    if !pipeline_path.exists() {
        return Err(miette::miette!(
            "Pipeline file not found: {}\n\n\
             Run 'artiflow init' to create a new project.",
            pipeline_path.display()
        ));
    }

    let pipeline = Pipeline::from_file(&pipeline_path)
        .map_err(|e| miette::miette!("Failed to load pipeline: {}", e))?;

    let validation = PipelineValidator::validate(&pipeline)?;

    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let store = Arc::new(super::open_store().await?);
    let orchestrator = Orchestrator::new(store);

    // Ctrl-C requests cooperative cancellation: running tasks finish and
    // commit, everything not yet started is cancelled.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "Cancellation requested, letting running tasks finish...".yellow());
            let _ = cancel_tx.send(true);
        }
    });

    let options = RunOptions {
        no_memo,
        dry_run,
        tasks,
        max_workers,
        cancel: Some(cancel_rx),
    };

    let report = orchestrator.run(&pipeline, &options).await?;

    if verbose {
        for task in &report.tasks {
            if let Some(ref message) = task.error_message {
                eprintln!("{}", format!("Task '{}': {}", task.task_id, message).dimmed());
            }
        }
    }

    match report.status {
        RunStatus::Failed => Err(miette::miette!("Pipeline execution failed")),
        RunStatus::Cancelled => Err(miette::miette!("Pipeline execution was cancelled")),
        _ => {
            let outputs: Vec<String> = report
                .tasks
                .iter()
                .filter(|t| !t.outputs.is_empty())
                .flat_map(|t| t.outputs.iter().map(ToString::to_string))
                .collect();

            if !outputs.is_empty() {
                println!();
                println!("{}:", "Outputs".bold());
                for output in outputs {
                    println!("  - {}", output);
                }
            }

            Ok(())
        }
    }
}
