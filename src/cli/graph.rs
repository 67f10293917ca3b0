// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Graph command - show the pipeline DAG

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::GraphFormat;
use crate::pipeline::{DagBuilder, Pipeline};

/// Show the pipeline as a graph
pub async fn run(pipeline_path: PathBuf, format: String, _verbose: bool) -> Result<()> {
    let format: GraphFormat = format.parse().map_err(|e: String| miette::miette!("{}", e))?;

    let pipeline = Pipeline::from_file(&pipeline_path)
        .map_err(|e| miette::miette!("Failed to load pipeline: {}", e))?;

    let dag = DagBuilder::build(&pipeline)?;

    match format {
        GraphFormat::Text => {
            println!("{}: {}", "Pipeline".bold(), pipeline.name);
            println!();
            print!("{}", dag.to_text(&pipeline)?);
        }
        GraphFormat::Dot => print!("{}", dag.to_dot()),
        GraphFormat::Mermaid => print!("{}", dag.to_mermaid()),
    }

    Ok(())
}
