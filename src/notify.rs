// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Run event notifications
//!
//! The orchestrator emits an event at each terminal task transition and at
//! run boundaries. The default sink logs through tracing; alternative sinks
//! (chat hooks, test probes) implement [`Notifier`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::manifest::ArtifactRef;
use crate::pipeline::RunStatus;

/// A run lifecycle event
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        pipeline: String,
    },
    TaskStarted {
        task_id: String,
        attempt: u32,
    },
    TaskSucceeded {
        task_id: String,
        outputs: Vec<ArtifactRef>,
        memoized: bool,
    },
    TaskFailed {
        task_id: String,
        error_kind: String,
        message: String,
        will_retry: bool,
    },
    TaskCancelled {
        task_id: String,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Sink for run lifecycle events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &RunEvent);
}

/// Notifier that logs events through tracing
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted { run_id, pipeline } => {
                tracing::info!(run = %run_id, pipeline, "run started");
            }
            RunEvent::TaskStarted { task_id, attempt } => {
                tracing::info!(task = task_id, attempt, "task started");
            }
            RunEvent::TaskSucceeded { task_id, outputs, memoized } => {
                let outputs: Vec<String> = outputs.iter().map(ToString::to_string).collect();
                tracing::info!(task = task_id, ?outputs, memoized, "task succeeded");
            }
            RunEvent::TaskFailed { task_id, error_kind, message, will_retry } => {
                tracing::warn!(task = task_id, kind = error_kind, message, will_retry, "task failed");
            }
            RunEvent::TaskCancelled { task_id } => {
                tracing::info!(task = task_id, "task cancelled");
            }
            RunEvent::RunFinished { run_id, status } => {
                tracing::info!(run = %run_id, %status, "run finished");
            }
        }
    }
}
