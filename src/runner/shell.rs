// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Shell runner
//!
//! Executes a shell command in a scratch directory. Inputs are materialized
//! as files under `$ARTIFLOW_INPUT_DIR`; the command writes one file per
//! declared output name under `$ARTIFLOW_OUTPUT_DIR`.

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use super::{TaskContext, TaskOutput, TaskRunner};
use crate::errors::ArtiflowError;
use crate::pipeline::RunnerSpec;

/// Shell runner
pub struct ShellRunner;

impl ShellRunner {
    /// Create a new shell runner
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunner for ShellRunner {
    async fn run(&self, ctx: &TaskContext) -> Result<Vec<TaskOutput>, ArtiflowError> {
        let RunnerSpec::Shell { command, shell } = &ctx.task.runner;

        let scratch = TempDir::new().map_err(|e| ArtiflowError::Io {
            message: format!("Failed to create scratch directory: {}", e),
        })?;
        let input_dir = scratch.path().join("inputs");
        let output_dir = scratch.path().join("outputs");
        tokio::fs::create_dir(&input_dir).await?;
        tokio::fs::create_dir(&output_dir).await?;

        for input in &ctx.inputs {
            tokio::fs::write(input_dir.join(&input.name), &input.bytes).await?;
        }

        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(command);
        // A timed-out attempt drops this future; the child must die with it
        cmd.kill_on_drop(true);
        cmd.current_dir(scratch.path());
        cmd.envs(&ctx.env);
        cmd.envs(&ctx.secrets);
        cmd.env("ARTIFLOW_TASK_ID", &ctx.task.id);
        cmd.env("ARTIFLOW_INPUT_DIR", &input_dir);
        cmd.env("ARTIFLOW_OUTPUT_DIR", &output_dir);

        let output = cmd.output().await.map_err(|e| {
            // Spawn failure means the shell itself is missing; no retry
            // will change that.
            ArtiflowError::TaskFailed {
                task: ctx.task.id.clone(),
                message: format!("Failed to spawn shell '{}': {}", shell, e),
                retryable: false,
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");

            return Err(ArtiflowError::TaskFailed {
                task: ctx.task.id.clone(),
                message: format!(
                    "Command exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    tail
                ),
                retryable: true,
            });
        }

        // Every declared output must exist; a missing file is a definition
        // bug, not a transient failure.
        let mut outputs = Vec::with_capacity(ctx.task.outputs.len());
        for spec in &ctx.task.outputs {
            let path = output_dir.join(spec.name());
            let bytes = tokio::fs::read(&path).await.map_err(|_| ArtiflowError::TaskFailed {
                task: ctx.task.id.clone(),
                message: format!(
                    "Command succeeded but did not write declared output '{}'",
                    spec.name()
                ),
                retryable: false,
            })?;

            outputs.push(TaskOutput::new(spec.name(), bytes));
        }

        Ok(outputs)
    }

    async fn check_available(&self) -> Result<bool, ArtiflowError> {
        // A basic shell is assumed present
        Ok(true)
    }
}
