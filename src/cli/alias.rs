// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Alias command - manage registry pointers

use colored::Colorize;
use miette::Result;

use super::AliasAction;

/// Run an alias management action
pub async fn run(action: AliasAction, verbose: bool) -> Result<()> {
    let store = super::open_store().await?;

    match action {
        AliasAction::Set { alias, artifact } => {
            let (name, query) = super::store::parse_reference(&artifact)?;

            // Repointing at a version that doesn't exist would leave a
            // dangling alias; resolve through the index first.
            let version = store.versions.get(&name, query).await?;
            store
                .registry
                .set_alias(&alias, version.artifact_ref(), None)
                .await?;

            println!(
                "{} {} {} {}",
                "✓".green(),
                alias.bold(),
                "→".dimmed(),
                version.artifact_ref()
            );
        }

        AliasAction::Resolve { alias } => {
            let version = store.resolve_alias(&alias).await?;

            println!("{} {} {}", alias.bold(), "→".dimmed(), version.artifact_ref());
            if verbose {
                println!("  hash: {}", version.hash);
                println!("  size: {} bytes", version.size_bytes);
                if let Some(ref task) = version.produced_by {
                    println!("  produced by: {}", task);
                }
            }
        }

        AliasAction::History { alias } => {
            let records = store.registry.history(&alias).await?;

            println!("{}: {} update(s)", alias.bold(), records.len());
            for (i, record) in records.iter().enumerate() {
                let marker = if i + 1 == records.len() { "→" } else { " " };
                println!("  {} {}", marker, record.target);
            }
        }
    }

    Ok(())
}
