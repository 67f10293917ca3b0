// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! DAG (Directed Acyclic Graph) builder for task dependencies
//!
//! Builds and validates dependency graphs for pipeline tasks, ensuring
//! proper execution order and detecting cycles. Inputs naming an artifact
//! another task produces add an implicit dependency edge.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::errors::ArtiflowError;
use crate::pipeline::{InputSpec, Pipeline};

/// Builder for task dependency DAGs
pub struct DagBuilder {
    graph: DiGraph<usize, ()>,
    id_to_index: HashMap<String, NodeIndex>,
    index_to_id: HashMap<NodeIndex, String>,
}

impl DagBuilder {
    /// Create a new DAG builder
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            id_to_index: HashMap::new(),
            index_to_id: HashMap::new(),
        }
    }

    /// Build a DAG from a pipeline
    pub fn build(pipeline: &Pipeline) -> Result<Self, ArtiflowError> {
        let mut builder = Self::new();

        // Add all tasks as nodes
        for (idx, task) in pipeline.tasks.iter().enumerate() {
            if builder.id_to_index.contains_key(&task.id) {
                return Err(ArtiflowError::DuplicateTask { task: task.id.clone() });
            }
            let node = builder.graph.add_node(idx);
            builder.id_to_index.insert(task.id.clone(), node);
            builder.index_to_id.insert(node, task.id.clone());
        }

        // Add dependency edges
        for task in &pipeline.tasks {
            let task_node = builder.id_to_index[&task.id];

            // Explicit dependencies from depends_on
            for dep_id in &task.depends_on {
                let dep_node = builder.id_to_index.get(dep_id).ok_or_else(|| {
                    ArtiflowError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep_id.clone(),
                    }
                })?;

                builder.graph.add_edge(*dep_node, task_node, ());
            }

            // Implicit dependencies from inputs produced inside the
            // pipeline, either directly or through a published alias
            for input in &task.inputs {
                let producer = match input {
                    InputSpec::Reference(_) => {
                        input.artifact_name().and_then(|a| pipeline.producer_of(a))
                    }
                    InputSpec::Alias { alias } => pipeline.publisher_of(alias),
                };
                let Some(producer) = producer else {
                    continue;
                };
                if producer.id == task.id {
                    continue;
                }
                let dep_node = builder.id_to_index[&producer.id];
                if !builder.graph.contains_edge(dep_node, task_node) {
                    builder.graph.add_edge(dep_node, task_node, ());
                }
            }
        }

        // Validate no cycles
        builder.validate_acyclic()?;

        Ok(builder)
    }

    /// Validate that the graph is acyclic
    fn validate_acyclic(&self) -> Result<(), ArtiflowError> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let tasks = self.find_cycle_members(cycle.node_id());
                Err(ArtiflowError::CircularDependency { tasks })
            }
        }
    }

    /// Find all tasks involved in a cycle
    fn find_cycle_members(&self, start: NodeIndex) -> Vec<String> {
        use petgraph::visit::{depth_first_search, DfsEvent};

        let mut in_cycle = vec![self.index_to_id[&start].clone()];
        let mut visited = std::collections::HashSet::new();

        depth_first_search(&self.graph, Some(start), |event| {
            if let DfsEvent::Discover(node, _) = event {
                let id = &self.index_to_id[&node];
                if visited.contains(id) {
                    in_cycle.push(id.clone());
                    return petgraph::visit::Control::Break(());
                }
                visited.insert(id.clone());
                in_cycle.push(id.clone());
            }
            petgraph::visit::Control::Continue
        });

        in_cycle
    }

    /// Get topologically sorted task indices
    pub fn topological_order(&self) -> Result<Vec<usize>, ArtiflowError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n]).collect())
            .map_err(|cycle| {
                let tasks = self.find_cycle_members(cycle.node_id());
                ArtiflowError::CircularDependency { tasks }
            })
    }

    /// Get topologically sorted task ids
    pub fn topological_order_ids(&self) -> Result<Vec<String>, ArtiflowError> {
        toposort(&self.graph, None)
            .map(|nodes| {
                nodes
                    .into_iter()
                    .map(|n| self.index_to_id[&n].clone())
                    .collect()
            })
            .map_err(|cycle| {
                let tasks = self.find_cycle_members(cycle.node_id());
                ArtiflowError::CircularDependency { tasks }
            })
    }

    /// Get dependencies for a task (tasks that must run before it)
    pub fn dependencies(&self, task_id: &str) -> Option<Vec<String>> {
        let node = self.id_to_index.get(task_id)?;
        let deps: Vec<String> = self
            .graph
            .neighbors_directed(*node, petgraph::Direction::Incoming)
            .map(|n| self.index_to_id[&n].clone())
            .collect();
        Some(deps)
    }

    /// Get direct dependents for a task (tasks that depend on it)
    pub fn dependents(&self, task_id: &str) -> Option<Vec<String>> {
        let node = self.id_to_index.get(task_id)?;
        let deps: Vec<String> = self
            .graph
            .neighbors_directed(*node, petgraph::Direction::Outgoing)
            .map(|n| self.index_to_id[&n].clone())
            .collect();
        Some(deps)
    }

    /// All transitive dependents of a task, for failure propagation
    pub fn transitive_dependents(&self, task_id: &str) -> Vec<String> {
        use petgraph::visit::Bfs;

        let Some(&start) = self.id_to_index.get(task_id) else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                result.push(self.index_to_id[&node].clone());
            }
        }
        result
    }

    /// Check if task A depends (directly or transitively) on task B
    pub fn depends_on(&self, task_a: &str, task_b: &str) -> bool {
        let Some(node_a) = self.id_to_index.get(task_a) else {
            return false;
        };
        let Some(node_b) = self.id_to_index.get(task_b) else {
            return false;
        };

        petgraph::algo::has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for (id, _) in &self.id_to_index {
            out.push_str(&format!("    {}[{}]\n", id, id));
        }

        for edge in self.graph.edge_indices() {
            if let Some((from, to)) = self.graph.edge_endpoints(edge) {
                let from_id = &self.index_to_id[&from];
                let to_id = &self.index_to_id[&to];
                out.push_str(&format!("    {} --> {}\n", from_id, to_id));
            }
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for edge in self.graph.edge_indices() {
            if let Some((from, to)) = self.graph.edge_endpoints(edge) {
                let from_id = &self.index_to_id[&from];
                let to_id = &self.index_to_id[&to];
                out.push_str(&format!("    \"{}\" -> \"{}\";\n", from_id, to_id));
            }
        }

        // Add isolated nodes (no edges)
        for (id, node) in &self.id_to_index {
            if self.graph.neighbors_undirected(*node).count() == 0 {
                out.push_str(&format!("    \"{}\";\n", id));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self, pipeline: &Pipeline) -> Result<String, ArtiflowError> {
        let order = self.topological_order()?;
        let mut out = String::new();

        for (i, idx) in order.iter().enumerate() {
            let task = &pipeline.tasks[*idx];
            let deps = self.dependencies(&task.id).unwrap_or_default();

            out.push_str(&format!("{}. {} ({})", i + 1, task.id, task.runner_name()));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        Ok(out)
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{InputSpec, OutputSpec, RunnerSpec, Task};

    fn make_task(id: &str, deps: Vec<&str>) -> Task {
        Task {
            id: id.into(),
            description: None,
            runner: RunnerSpec::Shell {
                command: "true".into(),
                shell: "bash".into(),
            },
            inputs: vec![],
            outputs: vec![OutputSpec::Name(format!("{}-out", id))],
            depends_on: deps.into_iter().map(String::from).collect(),
            retry: Default::default(),
            timeout_secs: None,
            env: std::collections::HashMap::new(),
            secrets: vec![],
        }
    }

    fn make_pipeline(tasks: Vec<Task>) -> Pipeline {
        Pipeline {
            version: "1".into(),
            name: "test".into(),
            description: None,
            tasks,
            env: std::collections::HashMap::new(),
        }
    }

    #[test]
    fn test_linear_dag() {
        let pipeline = make_pipeline(vec![
            make_task("a", vec![]),
            make_task("b", vec!["a"]),
            make_task("c", vec!["b"]),
        ]);

        let dag = DagBuilder::build(&pipeline).unwrap();
        let order = dag.topological_order_ids().unwrap();

        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond_dag() {
        let pipeline = make_pipeline(vec![
            make_task("a", vec![]),
            make_task("b", vec!["a"]),
            make_task("c", vec!["a"]),
            make_task("d", vec!["b", "c"]),
        ]);

        let dag = DagBuilder::build(&pipeline).unwrap();
        let order = dag.topological_order_ids().unwrap();

        // a must come first, d must come last
        assert_eq!(order[0], "a");
        assert_eq!(order[3], "d");
        assert!(order[1] == "b" || order[1] == "c");
        assert!(order[2] == "b" || order[2] == "c");
    }

    #[test]
    fn test_circular_dependency_detection() {
        let pipeline = make_pipeline(vec![
            make_task("a", vec!["b"]),
            make_task("b", vec!["a"]),
        ]);

        let result = DagBuilder::build(&pipeline);
        assert!(matches!(result, Err(ArtiflowError::CircularDependency { .. })));
    }

    #[test]
    fn test_unknown_dependency() {
        let pipeline = make_pipeline(vec![make_task("a", vec!["nonexistent"])]);

        let result = DagBuilder::build(&pipeline);
        assert!(matches!(result, Err(ArtiflowError::UnknownDependency { .. })));
    }

    #[test]
    fn test_duplicate_task_id() {
        let pipeline = make_pipeline(vec![make_task("a", vec![]), make_task("a", vec![])]);

        let result = DagBuilder::build(&pipeline);
        assert!(matches!(result, Err(ArtiflowError::DuplicateTask { .. })));
    }

    #[test]
    fn test_implicit_dependency_from_input() {
        let mut consumer = make_task("consumer", vec![]);
        consumer.inputs = vec![InputSpec::Reference("producer-out@latest".into())];

        let pipeline = make_pipeline(vec![consumer, make_task("producer", vec![])]);

        let dag = DagBuilder::build(&pipeline).unwrap();
        assert!(dag.depends_on("consumer", "producer"));
    }

    #[test]
    fn test_implicit_dependency_from_published_alias() {
        let mut producer = make_task("producer", vec![]);
        producer.outputs = vec![OutputSpec::Published {
            name: "data".into(),
            publish: "data-prod".into(),
        }];

        let mut consumer = make_task("consumer", vec![]);
        consumer.inputs = vec![InputSpec::Alias { alias: "data-prod".into() }];

        let pipeline = make_pipeline(vec![consumer, producer]);

        let dag = DagBuilder::build(&pipeline).unwrap();
        assert!(dag.depends_on("consumer", "producer"));
    }

    #[test]
    fn test_transitive_dependents() {
        let pipeline = make_pipeline(vec![
            make_task("a", vec![]),
            make_task("b", vec!["a"]),
            make_task("c", vec!["b"]),
            make_task("d", vec![]),
        ]);

        let dag = DagBuilder::build(&pipeline).unwrap();
        let mut dependents = dag.transitive_dependents("a");
        dependents.sort();

        assert_eq!(dependents, vec!["b", "c"]);
    }

    #[test]
    fn test_depends_on_check() {
        let pipeline = make_pipeline(vec![
            make_task("a", vec![]),
            make_task("b", vec!["a"]),
            make_task("c", vec!["b"]),
        ]);

        let dag = DagBuilder::build(&pipeline).unwrap();

        assert!(dag.depends_on("c", "a")); // transitive
        assert!(dag.depends_on("c", "b")); // direct
        assert!(!dag.depends_on("a", "c")); // reverse
    }

    #[test]
    fn test_mermaid_output() {
        let pipeline = make_pipeline(vec![make_task("a", vec![]), make_task("b", vec!["a"])]);

        let dag = DagBuilder::build(&pipeline).unwrap();
        let mermaid = dag.to_mermaid();

        assert!(mermaid.contains("graph TD"));
        assert!(mermaid.contains("a --> b"));
    }
}
