// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Run and task state machines
//!
//! Statuses only move forward: PENDING → RUNNING → {SUCCESS, FAILED}, with
//! FAILED looping through RETRY_PENDING while budget remains, and CANCELLED
//! reachable from any non-terminal state. The scheduler loop is the only
//! writer; [`PipelineRun::transition`] rejects regressions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;
use uuid::Uuid;

use crate::manifest::ArtifactRef;
use crate::pipeline::Pipeline;

/// Status of a single task within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    RetryPending,
    Success,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task can never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is a legal forward transition from this status
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (*self, next) {
            (Pending, Running) | (Pending, Cancelled) => true,
            (Running, Success) | (Running, Failed) | (Running, RetryPending) => true,
            (RetryPending, Running) | (RetryPending, Cancelled) | (RetryPending, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::RetryPending => "retry_pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Overall status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Mutable per-task execution state, owned by the scheduler loop
#[derive(Debug, Clone)]
pub struct TaskState {
    pub status: TaskStatus,
    /// Attempts started so far
    pub attempts: u32,
    /// Error kind and message from the last failure
    pub error: Option<(String, String)>,
    /// Output versions committed on success
    pub outputs: Vec<ArtifactRef>,
    /// Whether the result came from memoization
    pub memoized: bool,
}

impl TaskState {
    fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            attempts: 0,
            error: None,
            outputs: Vec::new(),
            memoized: false,
        }
    }

    /// Retries consumed: attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// One execution of a pipeline DAG
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub started_at: SystemTime,
    tasks: HashMap<String, TaskState>,
    cancelled: bool,
}

impl PipelineRun {
    /// Fresh run state with every task pending
    pub fn new(pipeline: &Pipeline) -> Self {
        Self::for_tasks(pipeline, pipeline.tasks.iter().map(|t| t.id.as_str()))
    }

    /// Fresh run state covering only a subset of the pipeline's tasks
    pub fn for_tasks<'a>(pipeline: &Pipeline, ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline.name.clone(),
            started_at: SystemTime::now(),
            tasks: ids
                .into_iter()
                .map(|id| (id.to_string(), TaskState::new()))
                .collect(),
            cancelled: false,
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskState> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut TaskState> {
        self.tasks.get_mut(id)
    }

    /// Move a task to a new status, refusing regressions
    ///
    /// Returns whether the transition was applied. Illegal transitions are
    /// logged and ignored rather than panicking: the scheduler is the only
    /// writer, so one indicates a scheduler bug, not corrupt state.
    pub fn transition(&mut self, id: &str, next: TaskStatus) -> bool {
        let Some(state) = self.tasks.get_mut(id) else {
            return false;
        };

        if !state.status.can_transition(next) {
            tracing::warn!(
                task = id,
                from = %state.status,
                to = %next,
                "refusing status regression"
            );
            return false;
        }

        tracing::debug!(task = id, from = %state.status, to = %next, "task transition");
        state.status = next;
        true
    }

    /// Mark the run cancelled; no new work will be scheduled
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Task ids currently in the given status
    pub fn tasks_in(&self, status: TaskStatus) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, s)| s.status == status)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether every task has reached a terminal status
    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|s| s.status.is_terminal())
    }

    /// Overall status: failure dominates, then cancellation
    pub fn status(&self) -> RunStatus {
        if !self.is_complete() {
            return RunStatus::Running;
        }
        if self.tasks.values().any(|s| s.status == TaskStatus::Failed) {
            RunStatus::Failed
        } else if self.cancelled || self.tasks.values().any(|s| s.status == TaskStatus::Cancelled) {
            RunStatus::Cancelled
        } else {
            RunStatus::Success
        }
    }

    /// Final report for this run
    pub fn report(&self) -> RunReport {
        let mut tasks: Vec<TaskReport> = self
            .tasks
            .iter()
            .map(|(id, state)| TaskReport {
                task_id: id.clone(),
                status: state.status,
                retries: state.retries(),
                error_kind: state.error.as_ref().map(|(kind, _)| kind.clone()),
                error_message: state.error.as_ref().map(|(_, msg)| msg.clone()),
                outputs: state.outputs.clone(),
                memoized: state.memoized,
            })
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        RunReport {
            run_id: self.run_id,
            pipeline: self.pipeline_name.clone(),
            status: self.status(),
            started_at: self.started_at,
            finished_at: SystemTime::now(),
            tasks,
        }
    }
}

/// Terminal status of one task, as reported to the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub status: TaskStatus,
    pub retries: u32,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub outputs: Vec<ArtifactRef>,
    pub memoized: bool,
}

/// User-visible summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline: String,
    pub status: RunStatus,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    /// Report entry for a task id
    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{OutputSpec, RunnerSpec, Task};

    fn pipeline_of(ids: &[&str]) -> Pipeline {
        Pipeline {
            version: "1".into(),
            name: "p".into(),
            description: None,
            tasks: ids
                .iter()
                .map(|id| Task {
                    id: (*id).into(),
                    description: None,
                    runner: RunnerSpec::Shell { command: "true".into(), shell: "bash".into() },
                    inputs: vec![],
                    outputs: vec![OutputSpec::Name(format!("{}-out", id))],
                    depends_on: vec![],
                    retry: Default::default(),
                    timeout_secs: None,
                    env: Default::default(),
                    secrets: vec![],
                })
                .collect(),
            env: Default::default(),
        }
    }

    #[test]
    fn test_forward_transitions_only() {
        let mut run = PipelineRun::new(&pipeline_of(&["a"]));

        assert!(run.transition("a", TaskStatus::Running));
        assert!(run.transition("a", TaskStatus::Success));

        // Terminal: nothing moves it
        assert!(!run.transition("a", TaskStatus::Running));
        assert!(!run.transition("a", TaskStatus::Failed));
        assert_eq!(run.task("a").unwrap().status, TaskStatus::Success);
    }

    #[test]
    fn test_retry_loop_transitions() {
        let mut run = PipelineRun::new(&pipeline_of(&["a"]));

        assert!(run.transition("a", TaskStatus::Running));
        assert!(run.transition("a", TaskStatus::RetryPending));
        assert!(run.transition("a", TaskStatus::Running));
        assert!(run.transition("a", TaskStatus::Failed));
    }

    #[test]
    fn test_pending_cannot_jump_to_success() {
        let mut run = PipelineRun::new(&pipeline_of(&["a"]));
        assert!(!run.transition("a", TaskStatus::Success));
    }

    #[test]
    fn test_run_status_precedence() {
        let mut run = PipelineRun::new(&pipeline_of(&["a", "b"]));
        assert_eq!(run.status(), RunStatus::Running);

        run.transition("a", TaskStatus::Running);
        run.transition("a", TaskStatus::Success);
        run.transition("b", TaskStatus::Running);
        run.transition("b", TaskStatus::Failed);

        // Failure dominates even when the run was also cancelled
        run.cancel();
        assert_eq!(run.status(), RunStatus::Failed);
    }

    #[test]
    fn test_cancelled_run_status() {
        let mut run = PipelineRun::new(&pipeline_of(&["a", "b"]));
        run.transition("a", TaskStatus::Running);
        run.transition("a", TaskStatus::Success);
        run.cancel();
        run.transition("b", TaskStatus::Cancelled);

        assert_eq!(run.status(), RunStatus::Cancelled);
    }

    #[test]
    fn test_report_retry_count() {
        let mut run = PipelineRun::new(&pipeline_of(&["a"]));
        run.task_mut("a").unwrap().attempts = 3;
        run.transition("a", TaskStatus::Running);
        run.transition("a", TaskStatus::Success);

        let report = run.report();
        assert_eq!(report.task("a").unwrap().retries, 2);
        assert_eq!(report.status, RunStatus::Success);
    }
}
