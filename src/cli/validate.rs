// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Validate command - check pipeline configuration

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{Pipeline, PipelineValidator};

/// Validate the pipeline configuration
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    if !pipeline_path.exists() {
        return Err(miette::miette!(
            "Pipeline file not found: {}",
            pipeline_path.display()
        ));
    }

    let pipeline = Pipeline::from_file(&pipeline_path)
        .map_err(|e| miette::miette!("Failed to parse pipeline: {}", e))?;

    println!("Validating {}...", pipeline_path.display());
    println!();

    let result = PipelineValidator::validate(&pipeline)?;

    if !result.errors.is_empty() {
        println!("{}", "Errors:".red().bold());
        for error in &result.errors {
            println!("  {} {}", "✗".red(), error);
        }
        println!();
    }

    if !result.warnings.is_empty() {
        println!("{}", "Warnings:".yellow().bold());
        for warning in &result.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
        println!();
    }

    if result.is_valid() {
        println!(
            "{} Pipeline '{}' is valid ({} task{})",
            "✓".green(),
            pipeline.name,
            pipeline.tasks.len(),
            if pipeline.tasks.len() == 1 { "" } else { "s" }
        );

        if verbose {
            for task in &pipeline.tasks {
                println!(
                    "  - {} ({}, {} input{}, {} output{})",
                    task.id,
                    task.runner_name(),
                    task.inputs.len(),
                    if task.inputs.len() == 1 { "" } else { "s" },
                    task.outputs.len(),
                    if task.outputs.len() == 1 { "" } else { "s" },
                );
            }
        }

        Ok(())
    } else {
        Err(miette::miette!("Pipeline configuration is invalid"))
    }
}
