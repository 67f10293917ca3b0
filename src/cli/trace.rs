// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Trace command - walk artifact lineage

use colored::Colorize;
use miette::Result;

use crate::lineage::TraceDirection;

/// Trace the lineage of an artifact version
pub async fn run(artifact: String, direction: String, verbose: bool) -> Result<()> {
    let direction: TraceDirection = direction
        .parse()
        .map_err(|e: String| miette::miette!("{}", e))?;

    let store = super::open_store().await?;

    // Pin "name" / "name@latest" to the concrete version being traced
    let (name, query) = super::store::parse_reference(&artifact)?;
    let version = store.versions.get(&name, query).await?;
    let start = version.artifact_ref();

    let related = store.lineage.trace(&start, direction).await;

    let label = match direction {
        TraceDirection::Ancestors => "ancestors",
        TraceDirection::Descendants => "descendants",
    };
    println!("{} of {}:", label, start.to_string().bold());

    if related.is_empty() {
        println!("  (none recorded)");
        return Ok(());
    }

    for artifact in &related {
        match store.lineage.producing_edge(artifact).await {
            Some(edge) => {
                println!("  {} {}", artifact, format!("(by task '{}')", edge.task_id).dimmed());
                if verbose && !edge.inputs.is_empty() {
                    let inputs: Vec<String> =
                        edge.inputs.iter().map(ToString::to_string).collect();
                    println!("      from: {}", inputs.join(", ").dimmed());
                }
            }
            None => println!("  {} {}", artifact, "(external)".dimmed()),
        }
    }

    Ok(())
}
