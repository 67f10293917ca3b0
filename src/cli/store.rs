// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Store command - register and inspect artifact versions

use colored::Colorize;
use miette::Result;
use std::io::Write;
use std::time::SystemTime;

use super::StoreAction;
use crate::manifest::Metadata;
use crate::pipeline::InputSpec;
use crate::store::{CommitRequest, VersionQuery};

/// Run a store management action
pub async fn run(action: StoreAction, verbose: bool) -> Result<()> {
    let store = super::open_store().await?;

    match action {
        StoreAction::Put { file, name, meta } => {
            let bytes = std::fs::read(&file)
                .map_err(|e| miette::miette!("Failed to read {}: {}", file.display(), e))?;

            let mut metadata = Metadata::new();
            for entry in &meta {
                let Some((key, value)) = entry.split_once('=') else {
                    return Err(miette::miette!(
                        "Invalid metadata entry '{}': expected key=value",
                        entry
                    ));
                };
                metadata.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }

            let version = store
                .commit_output(CommitRequest {
                    task_id: None,
                    name,
                    bytes,
                    metadata,
                    inputs: vec![],
                    publish: None,
                })
                .await?;

            println!(
                "{} Stored {} ({} bytes)",
                "✓".green(),
                version.artifact_ref().to_string().bold(),
                version.size_bytes
            );
            if verbose {
                println!("  hash: {}", version.hash);
            }
        }

        StoreAction::Get { artifact, output } => {
            let (name, query) = parse_reference(&artifact)?;
            let version = store.versions.get(&name, query).await?;
            let bytes = store.content.get(&version.hash).await?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .map_err(|e| miette::miette!("Failed to write {}: {}", path.display(), e))?;
                    eprintln!(
                        "{} Wrote {} to {}",
                        "✓".green(),
                        version.artifact_ref(),
                        path.display()
                    );
                }
                None => {
                    std::io::stdout()
                        .write_all(&bytes)
                        .map_err(|e| miette::miette!("Failed to write to stdout: {}", e))?;
                }
            }
        }

        StoreAction::Versions { name } => {
            let versions = store.versions.list_versions(&name).await?;

            println!("{}: {} version(s)", name.bold(), versions.len());
            for version in versions {
                let mut line = format!(
                    "  v{}  {}  {} bytes",
                    version.number,
                    &version.hash.0[..12],
                    version.size_bytes
                );
                if let Some(ref task) = version.produced_by {
                    line.push_str(&format!("  by {}", task));
                }
                line.push_str(&format!("  {}", format_age(version.created_at).dimmed()));
                println!("{}", line);
            }
        }

        StoreAction::List => {
            let mut names = store.versions.list_names().await;
            names.sort();

            if names.is_empty() {
                println!("No artifacts stored yet.");
            }
            for name in names {
                let versions = store.versions.list_versions(&name).await?;
                println!("  {} ({} version{})", name.bold(), versions.len(),
                    if versions.len() == 1 { "" } else { "s" });
            }

            if verbose {
                let (blobs, bytes) = store.content.stats()?;
                println!();
                println!("{}", format!("{} blob(s), {} bytes on disk", blobs, bytes).dimmed());
            }
        }
    }

    Ok(())
}

/// Parse `name`, `name@latest`, or `name@v3` into a store query
pub(crate) fn parse_reference(s: &str) -> Result<(String, VersionQuery)> {
    InputSpec::Reference(s.to_string())
        .parse_reference()?
        .ok_or_else(|| miette::miette!("Invalid artifact reference: {}", s))
}

fn format_age(created_at: SystemTime) -> String {
    match created_at.elapsed() {
        Ok(age) => {
            let secs = age.as_secs();
            if secs < 60 {
                format!("{}s ago", secs)
            } else if secs < 3600 {
                format!("{}m ago", secs / 60)
            } else if secs < 86400 {
                format!("{}h ago", secs / 3600)
            } else {
                format!("{}d ago", secs / 86400)
            }
        }
        Err(_) => "in the future".to_string(),
    }
}
