// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Init command - create a new artiflow project

use colored::Colorize;
use miette::Result;
use std::path::Path;

/// Run the init command
pub async fn run(name: Option<String>, verbose: bool) -> Result<()> {
    let project_name = name.unwrap_or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.file_name().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| "my-project".to_string())
    });

    println!("{}", "Initializing artiflow project...".bold());
    println!();

    if Path::new(".artiflow.yaml").exists() {
        return Err(miette::miette!(".artiflow.yaml already exists."));
    }

    let pipeline_content = generate_default_template(&project_name);

    std::fs::write(".artiflow.yaml", &pipeline_content)
        .map_err(|e| miette::miette!("Failed to write .artiflow.yaml: {}", e))?;
    println!("  {} Created .artiflow.yaml", "✓".green());

    std::fs::create_dir_all(crate::store::DEFAULT_STORE_DIR)
        .map_err(|e| miette::miette!("Failed to create store directory: {}", e))?;
    println!("  {} Created {}/", "✓".green(), crate::store::DEFAULT_STORE_DIR);

    println!();
    println!("{}", "Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to define your pipeline", ".artiflow.yaml".cyan());
    println!("  2. Run {} to execute it", "artiflow run".cyan());
    println!(
        "  3. Inspect results with {} and {}",
        "artiflow store versions <name>".cyan(),
        "artiflow trace <name>@v1".cyan()
    );
    println!();

    if verbose {
        println!("{}", "Generated pipeline:".dimmed());
        println!("{}", "─".repeat(50).dimmed());
        println!("{}", pipeline_content.dimmed());
    }

    Ok(())
}

fn generate_default_template(name: &str) -> String {
    format!(
        r#"# artiflow pipeline configuration

version: "1"
name: "{name}"

tasks:
  - id: "ingest"
    description: "Produce the raw dataset"
    runner:
      type: shell
      command: "date > \"$ARTIFLOW_OUTPUT_DIR/raw-data\""
    outputs:
      - "raw-data"

  - id: "transform"
    description: "Derive features from the raw dataset"
    runner:
      type: shell
      command: "tr a-z A-Z < \"$ARTIFLOW_INPUT_DIR/raw-data\" > \"$ARTIFLOW_OUTPUT_DIR/features\""
    inputs:
      - "raw-data@latest"
    outputs:
      - name: "features"
        publish: "features-prod"
    retry:
      max_attempts: 2
      backoff_ms: 500

# Tasks may also declare:
#   depends_on:      explicit task ordering
#   timeout_secs:    per-attempt timeout
#   secrets:         credential handles exported as env vars
#   inputs:          "name@v3" for pinned versions, or {{alias: some-alias}}
"#
    )
}
