// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Pipeline orchestrator
//!
//! Drives tasks through the run state machine in dependency order. Workers
//! execute attempts concurrently and report back over a channel; the
//! scheduler loop is the sole writer of run state, so no status update ever
//! races. Successful attempts commit their outputs through the store's
//! atomic commit path before the completion event is sent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use tokio::sync::{mpsc, watch, Mutex};

use crate::errors::ArtiflowError;
use crate::manifest::ArtifactRef;
use crate::notify::{Notifier, RunEvent, TracingNotifier};
use crate::pipeline::{
    DagBuilder, InputSpec, Pipeline, PipelineRun, PipelineValidator, RunReport, Task, TaskStatus,
};
use crate::runner::{
    create_default_runners, CredentialSource, EnvCredentials, ResolvedArtifact, TaskContext,
    TaskRunner,
};
use crate::store::{ArtifactStore, CommitRequest};

/// Memoization key: task definition fingerprint plus the exact input
/// versions the attempt consumed
type MemoKey = (String, Vec<ArtifactRef>);

/// Pipeline run options
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Skip memoization lookups and stores
    pub no_memo: bool,
    /// Only show what would be done
    pub dry_run: bool,
    /// Only run specific tasks
    pub tasks: Vec<String>,
    /// Maximum concurrent task attempts (0 means the default of 4)
    pub max_workers: usize,
    /// Cooperative cancellation signal
    pub cancel: Option<watch::Receiver<bool>>,
}

const DEFAULT_WORKERS: usize = 4;

/// What woke the scheduler loop
enum LoopStep {
    /// A worker event (or channel close)
    Event(Option<SchedulerEvent>),
    /// The cancellation watch changed; payload is the current value
    Cancelled(bool),
    /// The cancellation sender was dropped
    CancelClosed,
}

/// Events sent from workers back to the scheduler loop
enum SchedulerEvent {
    Finished {
        task_id: String,
        memo_key: MemoKey,
        result: Result<Vec<ArtifactRef>, ArtiflowError>,
    },
    RetryReady {
        task_id: String,
    },
}

/// Pipeline orchestrator
pub struct Orchestrator {
    store: Arc<ArtifactStore>,
    /// Registered runners by name
    runners: HashMap<String, Arc<dyn TaskRunner>>,
    credentials: Arc<dyn CredentialSource>,
    notifier: Arc<dyn Notifier>,
    /// Completed attempts from earlier runs of this orchestrator
    memo: Mutex<HashMap<MemoKey, Vec<ArtifactRef>>>,
}

impl Orchestrator {
    /// Create an orchestrator with the built-in runners
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            store,
            runners: create_default_runners(),
            credentials: Arc::new(EnvCredentials),
            notifier: Arc::new(TracingNotifier),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) a runner
    pub fn register_runner(&mut self, name: &str, runner: Arc<dyn TaskRunner>) {
        self.runners.insert(name.to_string(), runner);
    }

    /// Set the credential source
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the event notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Execute a pipeline
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        options: &RunOptions,
    ) -> Result<RunReport, ArtiflowError> {
        let start = Instant::now();

        let validation = PipelineValidator::validate(pipeline)?;
        if !validation.is_valid() {
            return Err(ArtiflowError::InvalidPipeline {
                reason: validation.errors.join("; "),
                help: None,
            });
        }
        for warning in &validation.warnings {
            tracing::warn!("{}", warning);
        }

        let dag = DagBuilder::build(pipeline)?;
        let order = dag.topological_order_ids()?;

        // Resolve the task selection
        let selected: HashSet<String> = if options.tasks.is_empty() {
            order.iter().cloned().collect()
        } else {
            for id in &options.tasks {
                if pipeline.get_task(id).is_none() {
                    return Err(ArtiflowError::TaskNotFound { task: id.clone() });
                }
            }
            options.tasks.iter().cloned().collect()
        };

        // Every selected task needs a registered runner
        for id in &selected {
            let task = pipeline.get_task(id).ok_or_else(|| ArtiflowError::TaskNotFound {
                task: id.clone(),
            })?;
            if !self.runners.contains_key(task.runner_name()) {
                return Err(ArtiflowError::RunnerNotFound {
                    runner: task.runner_name().to_string(),
                });
            }
        }

        // Inputs not produced inside this run must already exist; verifying
        // them up front fails the run before any task executes.
        self.verify_external_inputs(pipeline, &selected).await?;

        self.print_execution_plan(pipeline, &order, &selected, &dag);

        let mut run = PipelineRun::for_tasks(pipeline, selected.iter().map(String::as_str));
        if options.dry_run {
            return Ok(run.report());
        }

        self.notifier
            .notify(&RunEvent::RunStarted {
                run_id: run.run_id,
                pipeline: pipeline.name.clone(),
            })
            .await;

        let max_workers = if options.max_workers == 0 {
            DEFAULT_WORKERS
        } else {
            options.max_workers
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<SchedulerEvent>();
        let mut cancel = options.cancel.clone();
        let mut in_flight = 0usize;
        let mut retry_ready: HashSet<String> = HashSet::new();
        let mut started_at: HashMap<String, Instant> = HashMap::new();

        in_flight += self
            .schedule_ready(
                pipeline, &dag, &order, &mut run, &mut retry_ready, options, &tx,
                max_workers.saturating_sub(in_flight), &mut started_at,
            )
            .await;

        while !run.is_complete() {
            let step = if let Some(ref mut rx_cancel) = cancel {
                tokio::select! {
                    ev = rx.recv() => LoopStep::Event(ev),
                    changed = rx_cancel.changed() => match changed {
                        Ok(()) => LoopStep::Cancelled(*rx_cancel.borrow()),
                        Err(_) => LoopStep::CancelClosed,
                    },
                }
            } else {
                LoopStep::Event(rx.recv().await)
            };

            let event = match step {
                LoopStep::Event(ev) => ev,
                LoopStep::Cancelled(requested) => {
                    if requested {
                        self.cancel_pending(&mut run).await;
                    }
                    continue;
                }
                LoopStep::CancelClosed => {
                    cancel = None;
                    continue;
                }
            };

            // The loop holds a sender, so the channel cannot close early
            let Some(event) = event else { break };

            match event {
                SchedulerEvent::Finished { task_id, memo_key, result } => {
                    in_flight -= 1;
                    self.handle_finished(
                        pipeline, &dag, &mut run, &tx, options,
                        &task_id, memo_key, result, &started_at,
                    )
                    .await;
                }
                SchedulerEvent::RetryReady { task_id } => {
                    if run.is_cancelled() {
                        if run.transition(&task_id, TaskStatus::Cancelled) {
                            self.notifier
                                .notify(&RunEvent::TaskCancelled { task_id: task_id.clone() })
                                .await;
                        }
                    } else {
                        retry_ready.insert(task_id);
                    }
                }
            }

            in_flight += self
                .schedule_ready(
                    pipeline, &dag, &order, &mut run, &mut retry_ready, options, &tx,
                    max_workers.saturating_sub(in_flight), &mut started_at,
                )
                .await;
        }

        let report = run.report();
        self.notifier
            .notify(&RunEvent::RunFinished {
                run_id: report.run_id,
                status: report.status,
            })
            .await;

        self.print_summary(&report, start.elapsed());
        Ok(report)
    }

    /// Verify that inputs coming from outside the run resolve in the store
    async fn verify_external_inputs(
        &self,
        pipeline: &Pipeline,
        selected: &HashSet<String>,
    ) -> Result<(), ArtiflowError> {
        for task in pipeline.tasks.iter().filter(|t| selected.contains(&t.id)) {
            for input in &task.inputs {
                match input {
                    InputSpec::Reference(_) => {
                        let Some((name, query)) = input.parse_reference()? else {
                            continue;
                        };

                        // Produced by another selected task during this run
                        let internal = pipeline
                            .producer_of(&name)
                            .map(|p| p.id != task.id && selected.contains(&p.id))
                            .unwrap_or(false);
                        if internal {
                            continue;
                        }

                        self.store.versions.get(&name, query).await?;
                    }
                    InputSpec::Alias { alias } => {
                        // Repointed by another selected task during this run
                        let internal = pipeline
                            .publisher_of(alias)
                            .map(|p| p.id != task.id && selected.contains(&p.id))
                            .unwrap_or(false);
                        if internal {
                            continue;
                        }

                        self.store.resolve_alias(alias).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Start every runnable task up to the remaining worker capacity
    ///
    /// Returns how many workers were spawned. Memoized completions resolve
    /// inline without consuming capacity, which can unlock dependents, so
    /// the scan repeats until it makes no progress.
    #[allow(clippy::too_many_arguments)]
    async fn schedule_ready(
        &self,
        pipeline: &Pipeline,
        dag: &DagBuilder,
        order: &[String],
        run: &mut PipelineRun,
        retry_ready: &mut HashSet<String>,
        options: &RunOptions,
        tx: &mpsc::UnboundedSender<SchedulerEvent>,
        mut capacity: usize,
        started_at: &mut HashMap<String, Instant>,
    ) -> usize {
        let mut spawned = 0;

        loop {
            let mut progressed = false;

            for id in order {
                if capacity == 0 {
                    return spawned;
                }
                let Some(state) = run.task(id) else { continue };

                let runnable = match state.status {
                    TaskStatus::Pending => true,
                    TaskStatus::RetryPending => retry_ready.contains(id),
                    _ => false,
                };
                if !runnable || !self.dependencies_satisfied(dag, run, id) {
                    continue;
                }

                retry_ready.remove(id);
                let task = match pipeline.get_task(id) {
                    Some(t) => t,
                    None => continue,
                };

                match self.start_task(pipeline, task, run, options, tx, started_at).await {
                    StartOutcome::Spawned => {
                        capacity -= 1;
                        spawned += 1;
                        progressed = true;
                    }
                    StartOutcome::Memoized => {
                        progressed = true;
                    }
                    StartOutcome::Failed(err) => {
                        self.fail_task(dag, run, id, &err).await;
                        progressed = true;
                    }
                }
            }

            if !progressed {
                return spawned;
            }
        }
    }

    /// Whether every in-run dependency of a task has succeeded
    fn dependencies_satisfied(&self, dag: &DagBuilder, run: &PipelineRun, id: &str) -> bool {
        dag.dependencies(id)
            .unwrap_or_default()
            .iter()
            .all(|dep| match run.task(dep) {
                // Dependencies outside the selection are satisfied by the store
                None => true,
                Some(state) => state.status == TaskStatus::Success,
            })
    }

    /// Resolve inputs, consult the memo, and spawn a worker for one attempt
    async fn start_task(
        &self,
        pipeline: &Pipeline,
        task: &Task,
        run: &mut PipelineRun,
        options: &RunOptions,
        tx: &mpsc::UnboundedSender<SchedulerEvent>,
        started_at: &mut HashMap<String, Instant>,
    ) -> StartOutcome {
        let (input_refs, inputs) = match self.resolve_inputs(task).await {
            Ok(resolved) => resolved,
            Err(e) => return StartOutcome::Failed(e),
        };

        let memo_key: MemoKey = (task.fingerprint(), input_refs.clone());

        if !options.no_memo {
            let memo = self.memo.lock().await;
            if let Some(outputs) = memo.get(&memo_key) {
                let outputs = outputs.clone();
                drop(memo);

                run.transition(&task.id, TaskStatus::Running);
                run.transition(&task.id, TaskStatus::Success);
                if let Some(state) = run.task_mut(&task.id) {
                    state.outputs = outputs.clone();
                    state.memoized = true;
                }
                self.notifier
                    .notify(&RunEvent::TaskSucceeded {
                        task_id: task.id.clone(),
                        outputs,
                        memoized: true,
                    })
                    .await;
                println!("  {} {} {}", "✓".green(), task.id.bold(), "(memoized)".dimmed());
                return StartOutcome::Memoized;
            }
        }

        let mut secrets = HashMap::new();
        for handle in &task.secrets {
            match self.credentials.resolve(handle) {
                Ok(material) => {
                    secrets.insert(handle.clone(), material);
                }
                Err(e) => return StartOutcome::Failed(e),
            }
        }

        let mut env = pipeline.env.clone();
        env.extend(task.env.clone());

        if let Some(state) = run.task_mut(&task.id) {
            state.attempts += 1;
        }
        let attempt = run.task(&task.id).map(|s| s.attempts).unwrap_or(1);
        run.transition(&task.id, TaskStatus::Running);
        started_at.insert(task.id.clone(), Instant::now());
        self.notifier
            .notify(&RunEvent::TaskStarted { task_id: task.id.clone(), attempt })
            .await;
        println!("  {} {}...", "→".blue(), task.id);

        let runner = Arc::clone(&self.runners[task.runner_name()]);
        let store = Arc::clone(&self.store);
        let ctx = TaskContext {
            task: task.clone(),
            inputs,
            env,
            secrets,
        };
        let worker_refs = input_refs;
        let worker_tx = tx.clone();
        let task_id = task.id.clone();

        tokio::spawn(async move {
            let result = Self::attempt(runner, store, &ctx, &worker_refs).await;
            let _ = worker_tx.send(SchedulerEvent::Finished {
                task_id,
                memo_key,
                result,
            });
        });

        StartOutcome::Spawned
    }

    /// Resolve a task's declared inputs to exact versions and fetch content
    async fn resolve_inputs(
        &self,
        task: &Task,
    ) -> Result<(Vec<ArtifactRef>, Vec<ResolvedArtifact>), ArtiflowError> {
        let mut refs = Vec::with_capacity(task.inputs.len());
        let mut resolved = Vec::with_capacity(task.inputs.len());

        for input in &task.inputs {
            let version = match input {
                InputSpec::Reference(_) => {
                    let Some((name, query)) = input.parse_reference()? else {
                        continue;
                    };
                    self.store.versions.get(&name, query).await?
                }
                InputSpec::Alias { alias } => self.store.resolve_alias(alias).await?,
            };

            let bytes = self.store.content.get(&version.hash).await?;
            refs.push(version.artifact_ref());
            resolved.push(ResolvedArtifact {
                name: version.name.clone(),
                artifact: version.artifact_ref(),
                bytes,
            });
        }

        Ok((refs, resolved))
    }

    /// Run one attempt and commit its outputs
    async fn attempt(
        runner: Arc<dyn TaskRunner>,
        store: Arc<ArtifactStore>,
        ctx: &TaskContext,
        input_refs: &[ArtifactRef],
    ) -> Result<Vec<ArtifactRef>, ArtiflowError> {
        let task = &ctx.task;

        let outputs = match task.timeout() {
            Some(limit) => tokio::time::timeout(limit, runner.run(ctx))
                .await
                .map_err(|_| ArtiflowError::TaskTimeout {
                    task: task.id.clone(),
                    seconds: limit.as_secs(),
                })??,
            None => runner.run(ctx).await?,
        };

        let mut refs = Vec::with_capacity(task.outputs.len());
        for spec in &task.outputs {
            let produced = outputs
                .iter()
                .find(|o| o.name == spec.name())
                .ok_or_else(|| ArtiflowError::TaskFailed {
                    task: task.id.clone(),
                    message: format!("Runner returned no content for output '{}'", spec.name()),
                    retryable: false,
                })?;

            let version = store
                .commit_output(CommitRequest {
                    task_id: Some(task.id.clone()),
                    name: spec.name().to_string(),
                    bytes: produced.bytes.clone(),
                    metadata: produced.metadata.clone(),
                    inputs: input_refs.to_vec(),
                    publish: spec.publish().map(str::to_string),
                })
                .await?;

            refs.push(version.artifact_ref());
        }

        Ok(refs)
    }

    /// Apply a worker's completion event to run state
    #[allow(clippy::too_many_arguments)]
    async fn handle_finished(
        &self,
        pipeline: &Pipeline,
        dag: &DagBuilder,
        run: &mut PipelineRun,
        tx: &mpsc::UnboundedSender<SchedulerEvent>,
        options: &RunOptions,
        task_id: &str,
        memo_key: MemoKey,
        result: Result<Vec<ArtifactRef>, ArtiflowError>,
        started_at: &HashMap<String, Instant>,
    ) {
        match result {
            Ok(outputs) => {
                run.transition(task_id, TaskStatus::Success);
                if let Some(state) = run.task_mut(task_id) {
                    state.outputs = outputs.clone();
                }

                if !options.no_memo {
                    self.memo.lock().await.insert(memo_key, outputs.clone());
                }

                let elapsed = started_at
                    .get(task_id)
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or_default();
                println!(
                    "  {} {} ({:.2}s)",
                    "✓".green(),
                    task_id.bold(),
                    elapsed
                );

                self.notifier
                    .notify(&RunEvent::TaskSucceeded {
                        task_id: task_id.to_string(),
                        outputs,
                        memoized: false,
                    })
                    .await;
            }
            Err(err) => {
                let attempts = run.task(task_id).map(|s| s.attempts).unwrap_or(0);
                let budget = pipeline
                    .get_task(task_id)
                    .map(|t| t.retry)
                    .unwrap_or_default();

                let retry = err.is_retryable()
                    && attempts < budget.max_attempts
                    && !run.is_cancelled();

                if let Some(state) = run.task_mut(task_id) {
                    state.error = Some((err.kind().to_string(), err.to_string()));
                }

                self.notifier
                    .notify(&RunEvent::TaskFailed {
                        task_id: task_id.to_string(),
                        error_kind: err.kind().to_string(),
                        message: err.to_string(),
                        will_retry: retry,
                    })
                    .await;

                if retry {
                    run.transition(task_id, TaskStatus::RetryPending);

                    let delay = budget.backoff(attempts);
                    println!(
                        "  {} {} {}",
                        "↻".yellow(),
                        task_id,
                        format!(
                            "retrying in {}ms (attempt {}/{})",
                            delay.as_millis(),
                            attempts + 1,
                            budget.max_attempts
                        )
                        .dimmed()
                    );

                    let retry_tx = tx.clone();
                    let retry_id = task_id.to_string();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = retry_tx.send(SchedulerEvent::RetryReady { task_id: retry_id });
                    });
                } else {
                    self.fail_task(dag, run, task_id, &err).await;
                }
            }
        }
    }

    /// Mark a task failed and cancel everything downstream of it
    async fn fail_task(
        &self,
        dag: &DagBuilder,
        run: &mut PipelineRun,
        task_id: &str,
        err: &ArtiflowError,
    ) {
        if let Some(state) = run.task_mut(task_id) {
            if state.error.is_none() {
                state.error = Some((err.kind().to_string(), err.to_string()));
            }
        }

        // Failures found before an attempt starts arrive while still pending
        if run.task(task_id).map(|s| s.status) == Some(TaskStatus::Pending) {
            run.transition(task_id, TaskStatus::Running);
        }
        run.transition(task_id, TaskStatus::Failed);
        println!("  {} {} failed: {}", "✗".red(), task_id.bold(), err);

        for dependent in dag.transitive_dependents(task_id) {
            let cancellable = matches!(
                run.task(&dependent).map(|s| s.status),
                Some(TaskStatus::Pending) | Some(TaskStatus::RetryPending)
            );
            if cancellable && run.transition(&dependent, TaskStatus::Cancelled) {
                println!("  {} {} {}", "-".dimmed(), dependent, "cancelled".dimmed());
                self.notifier
                    .notify(&RunEvent::TaskCancelled { task_id: dependent })
                    .await;
            }
        }
    }

    /// Cancel every task that has not started; running tasks finish and
    /// commit normally
    async fn cancel_pending(&self, run: &mut PipelineRun) {
        run.cancel();
        tracing::info!(run = %run.run_id, "cancellation requested");

        let waiting: Vec<String> = run
            .tasks_in(TaskStatus::Pending)
            .into_iter()
            .chain(run.tasks_in(TaskStatus::RetryPending))
            .collect();

        for id in waiting {
            if run.transition(&id, TaskStatus::Cancelled) {
                println!("  {} {} {}", "-".dimmed(), id, "cancelled".dimmed());
                self.notifier.notify(&RunEvent::TaskCancelled { task_id: id }).await;
            }
        }
    }

    /// Print the execution plan
    fn print_execution_plan(
        &self,
        pipeline: &Pipeline,
        order: &[String],
        selected: &HashSet<String>,
        dag: &DagBuilder,
    ) {
        let planned: Vec<&String> = order.iter().filter(|id| selected.contains(*id)).collect();

        println!();
        println!("{}: {}", "Pipeline".bold(), pipeline.name);
        println!("{}", "═".repeat(50));
        println!(
            "Execution plan ({} task{}):",
            planned.len(),
            if planned.len() == 1 { "" } else { "s" }
        );
        println!();

        for (i, id) in planned.iter().enumerate() {
            let runner = pipeline.get_task(id).map(|t| t.runner_name()).unwrap_or("?");
            let deps = dag.dependencies(id).unwrap_or_default();

            print!("  {}. {} ({})", i + 1, id.bold(), runner);
            if !deps.is_empty() {
                print!(" {}", format!("[depends: {}]", deps.join(", ")).dimmed());
            }
            println!();
        }

        println!();
    }

    /// Print the run summary
    fn print_summary(&self, report: &RunReport, elapsed: std::time::Duration) {
        println!();
        let line = format!(
            "Run {} {} in {:.2}s",
            report.run_id,
            report.status,
            elapsed.as_secs_f64()
        );
        match report.status {
            crate::pipeline::RunStatus::Success => println!("{}", line.green()),
            crate::pipeline::RunStatus::Cancelled => println!("{}", line.yellow()),
            _ => println!("{}", line.red()),
        }
    }
}

/// Outcome of trying to start one task
enum StartOutcome {
    /// A worker was spawned for the attempt
    Spawned,
    /// Resolved from the memo without running
    Memoized,
    /// Could not start (input or credential resolution failed)
    Failed(ArtiflowError),
}
