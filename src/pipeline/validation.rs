// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Pipeline validation
//!
//! Validates pipeline configuration before execution.

use std::collections::HashSet;

use crate::errors::ArtiflowError;
use crate::manifest::validate_name;
use crate::pipeline::{DagBuilder, InputSpec, Pipeline, RunnerSpec, Task};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline configuration
    pub fn validate(pipeline: &Pipeline) -> Result<ValidationResult, ArtiflowError> {
        let mut result = ValidationResult::new();

        // Check for empty pipeline
        if pipeline.tasks.is_empty() {
            result.add_error("Pipeline has no tasks defined");
        }

        // Check for duplicate task ids
        let mut seen_ids = HashSet::new();
        for task in &pipeline.tasks {
            if !seen_ids.insert(&task.id) {
                result.add_error(&format!("Duplicate task id: '{}'", task.id));
            }
        }

        // Two tasks producing the same artifact name would race in the store
        let mut seen_outputs: HashSet<&str> = HashSet::new();
        for task in &pipeline.tasks {
            for output in &task.outputs {
                if !seen_outputs.insert(output.name()) {
                    result.add_error(&format!(
                        "Artifact '{}' is declared as an output by more than one task",
                        output.name()
                    ));
                }
            }
        }

        // Validate DAG structure (checks for cycles and unknown dependencies)
        match DagBuilder::build(pipeline) {
            Ok(_) => {}
            Err(ArtiflowError::CircularDependency { tasks }) => {
                result.add_error(&format!("Circular dependency: {}", tasks.join(" -> ")));
            }
            Err(ArtiflowError::UnknownDependency { task, dependency }) => {
                result.add_error(&format!(
                    "Task '{}' depends on unknown task '{}'",
                    task, dependency
                ));
            }
            Err(e) => {
                result.add_error(&format!("DAG validation error: {}", e));
            }
        }

        // Validate each task
        for task in &pipeline.tasks {
            Self::validate_task(task, pipeline, &mut result);
        }

        Ok(result)
    }

    /// Validate a single task
    fn validate_task(task: &Task, pipeline: &Pipeline, result: &mut ValidationResult) {
        // Validate runner configuration
        match &task.runner {
            RunnerSpec::Shell { command, .. } => {
                if command.is_empty() {
                    result.add_error(&format!("Task '{}': Shell command is empty", task.id));
                }
            }
        }

        // Every task must declare at least one output
        if task.outputs.is_empty() {
            result.add_error(&format!("Task '{}': No outputs declared", task.id));
        }

        for output in &task.outputs {
            if let Err(e) = validate_name(output.name()) {
                result.add_error(&format!("Task '{}': {}", task.id, e));
            }
            if let Some(alias) = output.publish() {
                if let Err(e) = validate_name(alias) {
                    result.add_error(&format!("Task '{}': {}", task.id, e));
                }
            }
        }

        if task.retry.max_attempts == 0 {
            result.add_error(&format!(
                "Task '{}': retry.max_attempts must be at least 1",
                task.id
            ));
        }

        // Validate input references
        for input in &task.inputs {
            match input {
                InputSpec::Reference(_) => {
                    if let Err(e) = input.parse_reference() {
                        result.add_error(&format!("Task '{}': {}", task.id, e));
                        continue;
                    }

                    // Warn when an input comes from another task's output but
                    // the dependency isn't declared; the DAG adds it implicitly.
                    if let Some(name) = input.artifact_name() {
                        if let Some(producer) = pipeline.producer_of(name) {
                            if producer.id != task.id && !task.depends_on.contains(&producer.id) {
                                result.add_warning(&format!(
                                    "Task '{}': Consumes '{}' produced by task '{}' but doesn't \
                                     declare the dependency. This will be added implicitly.",
                                    task.id, name, producer.id
                                ));
                            }
                        }
                    }
                }
                InputSpec::Alias { alias } => {
                    if let Err(e) = validate_name(alias) {
                        result.add_error(&format!("Task '{}': {}", task.id, e));
                    }
                }
            }
        }

        // Secret handles are environment variable names at execution time
        for secret in &task.secrets {
            if secret.is_empty() {
                result.add_error(&format!("Task '{}': Empty secret handle", task.id));
            }
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn shell_task(id: &str, outputs: &[&str]) -> Task {
        Task {
            id: id.into(),
            description: None,
            runner: RunnerSpec::Shell { command: "echo hi".into(), shell: "bash".into() },
            inputs: vec![],
            outputs: outputs.iter().map(|o| crate::pipeline::OutputSpec::Name((*o).into())).collect(),
            depends_on: vec![],
            retry: Default::default(),
            timeout_secs: None,
            env: HashMap::new(),
            secrets: vec![],
        }
    }

    fn pipeline_with(tasks: Vec<Task>) -> Pipeline {
        Pipeline {
            version: "1".into(),
            name: "test".into(),
            description: None,
            tasks,
            env: HashMap::new(),
        }
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let result = PipelineValidator::validate(&pipeline_with(vec![])).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no tasks"));
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let pipeline = pipeline_with(vec![shell_task("dup", &["a"]), shell_task("dup", &["b"])]);
        let result = PipelineValidator::validate(&pipeline).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn test_validate_duplicate_output() {
        let pipeline = pipeline_with(vec![shell_task("a", &["out"]), shell_task("b", &["out"])]);
        let result = PipelineValidator::validate(&pipeline).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("more than one task")));
    }

    #[test]
    fn test_validate_empty_command() {
        let mut task = shell_task("t", &["out"]);
        task.runner = RunnerSpec::Shell { command: "".into(), shell: "bash".into() };
        let result = PipelineValidator::validate(&pipeline_with(vec![task])).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("command is empty")));
    }

    #[test]
    fn test_validate_missing_outputs() {
        let task = shell_task("t", &[]);
        let result = PipelineValidator::validate(&pipeline_with(vec![task])).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("No outputs")));
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut task = shell_task("t", &["out"]);
        task.retry.max_attempts = 0;
        let result = PipelineValidator::validate(&pipeline_with(vec![task])).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("max_attempts")));
    }

    #[test]
    fn test_validate_undeclared_dependency_warns() {
        let producer = shell_task("producer", &["data"]);
        let mut consumer = shell_task("consumer", &["report"]);
        consumer.inputs = vec![InputSpec::Reference("data@latest".into())];
        // depends_on left empty on purpose

        let result =
            PipelineValidator::validate(&pipeline_with(vec![producer, consumer])).unwrap();
        assert!(result.is_valid());
        assert!(result.has_warnings());
        assert!(result.warnings.iter().any(|w| w.contains("implicitly")));
    }

    #[test]
    fn test_validate_bad_input_reference() {
        let mut task = shell_task("t", &["out"]);
        task.inputs = vec![InputSpec::Reference("data@nonsense".into())];
        let result = PipelineValidator::validate(&pipeline_with(vec![task])).unwrap();
        assert!(!result.is_valid());
    }

    #[test]
    fn test_validate_cycle_reported() {
        let mut a = shell_task("a", &["a-out"]);
        a.depends_on = vec!["b".into()];
        let mut b = shell_task("b", &["b-out"]);
        b.depends_on = vec!["a".into()];

        let result = PipelineValidator::validate(&pipeline_with(vec![a, b])).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Circular")));
    }
}
