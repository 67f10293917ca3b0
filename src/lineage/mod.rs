// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 artiflow contributors

//! Lineage graph
//!
//! Records which task consumed which artifact versions to produce which new
//! artifact. Nodes are artifact references held in a petgraph arena with
//! explicit index maps; edges run input → output. The graph is acyclic at
//! all times: an insertion that would create a cycle is rejected before
//! anything is committed. Each output has at most one producing task.

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ArtiflowError;
use crate::manifest::{ArtifactRef, LineageEdge};

/// Traversal direction for [`LineageGraph::trace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    /// Versions this artifact was derived from, transitively
    Ancestors,
    /// Versions derived from this artifact, transitively
    Descendants,
}

impl std::str::FromStr for TraceDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ancestors" | "up" => Ok(Self::Ancestors),
            "descendants" | "down" => Ok(Self::Descendants),
            _ => Err(format!("Unknown direction: {} (expected ancestors|descendants)", s)),
        }
    }
}

struct GraphInner {
    graph: DiGraph<(), ()>,
    node_of: HashMap<ArtifactRef, NodeIndex>,
    ref_of: HashMap<NodeIndex, ArtifactRef>,
    /// Append-only edge log, insertion order
    edges: Vec<LineageEdge>,
    /// Output ref → producing task id
    producers: HashMap<ArtifactRef, String>,
}

impl GraphInner {
    fn empty() -> Self {
        Self {
            graph: DiGraph::new(),
            node_of: HashMap::new(),
            ref_of: HashMap::new(),
            edges: Vec::new(),
            producers: HashMap::new(),
        }
    }

    fn node(&mut self, r: &ArtifactRef) -> NodeIndex {
        if let Some(&idx) = self.node_of.get(r) {
            return idx;
        }
        let idx = self.graph.add_node(());
        self.node_of.insert(r.clone(), idx);
        self.ref_of.insert(idx, r.clone());
        idx
    }

    fn apply(&mut self, edge: &LineageEdge) {
        let out = self.node(&edge.output);
        for input in &edge.inputs {
            let inp = self.node(input);
            self.graph.add_edge(inp, out, ());
        }
        self.producers.insert(edge.output.clone(), edge.task_id.clone());
    }

    fn rebuild(edges: Vec<LineageEdge>) -> Self {
        let mut inner = Self::empty();
        for edge in &edges {
            inner.apply(edge);
        }
        inner.edges = edges;
        inner
    }
}

/// Acyclic graph of production relations between artifact versions
pub struct LineageGraph {
    /// Persisted edge log
    file: PathBuf,
    /// Graph state; edge insertion takes the write lock so two concurrent
    /// insertions cannot both pass the cycle check
    inner: RwLock<GraphInner>,
}

impl LineageGraph {
    /// Open the graph, replaying the persisted edge log
    pub fn open(dir: PathBuf) -> Result<Self, ArtiflowError> {
        std::fs::create_dir_all(&dir).map_err(|e| ArtiflowError::Io {
            message: format!("Failed to create lineage directory: {}", e),
        })?;

        let file = dir.join("edges.json");
        let edges: Vec<LineageEdge> = if file.exists() {
            let content = std::fs::read_to_string(&file)?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };

        Ok(Self {
            file,
            inner: RwLock::new(GraphInner::rebuild(edges)),
        })
    }

    async fn persist(&self, edges: &[LineageEdge]) -> Result<(), ArtiflowError> {
        let json = serde_json::to_string_pretty(edges)?;
        let tmp = self.file.with_extension("json.tmp");

        tokio::fs::write(&tmp, json).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to write lineage log: {}", e),
        })?;
        tokio::fs::rename(&tmp, &self.file).await.map_err(|e| ArtiflowError::Io {
            message: format!("Failed to commit lineage log: {}", e),
        })?;

        Ok(())
    }

    /// Record that `task_id` consumed `inputs` to produce `output`
    ///
    /// Fails with `LineageCycle` if the output is already a transitive
    /// ancestor of any input, and with `Conflict` if the output version
    /// already has a producing task. On failure the graph is unchanged.
    pub async fn record_edge(
        &self,
        task_id: &str,
        inputs: &[ArtifactRef],
        output: &ArtifactRef,
        commit: Option<Uuid>,
    ) -> Result<(), ArtiflowError> {
        let mut inner = self.inner.write().await;

        if let Some(producer) = inner.producers.get(output) {
            return Err(ArtiflowError::conflict(format!(
                "{} already has producing task '{}'",
                output, producer
            )));
        }

        // Cycle check before any mutation. A cycle requires the output to
        // already be reachable upstream of an input; if either node is
        // absent no such path can exist.
        if let Some(&out_node) = inner.node_of.get(output) {
            for input in inputs {
                if let Some(&in_node) = inner.node_of.get(input) {
                    if out_node == in_node
                        || has_path_connecting(&inner.graph, out_node, in_node, None)
                    {
                        return Err(ArtiflowError::LineageCycle { output: output.to_string() });
                    }
                }
            }
        }

        if inputs.iter().any(|i| i == output) {
            return Err(ArtiflowError::LineageCycle { output: output.to_string() });
        }

        let edge = LineageEdge {
            task_id: task_id.to_string(),
            inputs: inputs.to_vec(),
            output: output.clone(),
            recorded_at: SystemTime::now(),
            commit,
        };

        inner.apply(&edge);
        inner.edges.push(edge);

        let edges = inner.edges.clone();
        self.persist(&edges).await?;

        tracing::debug!(task = task_id, output = %output, "lineage edge recorded");
        Ok(())
    }

    /// Breadth-first traversal from an artifact reference
    ///
    /// Each call runs a fresh traversal and returns the visited references
    /// in BFS order, excluding the start. Unknown references yield an empty
    /// result. Never mutates the graph.
    pub async fn trace(&self, start: &ArtifactRef, direction: TraceDirection) -> Vec<ArtifactRef> {
        let inner = self.inner.read().await;

        let Some(&start_node) = inner.node_of.get(start) else {
            return Vec::new();
        };

        let mut order = Vec::new();
        match direction {
            TraceDirection::Descendants => {
                let mut bfs = Bfs::new(&inner.graph, start_node);
                while let Some(node) = bfs.next(&inner.graph) {
                    if node != start_node {
                        order.push(inner.ref_of[&node].clone());
                    }
                }
            }
            TraceDirection::Ancestors => {
                let reversed = Reversed(&inner.graph);
                let mut bfs = Bfs::new(reversed, start_node);
                while let Some(node) = bfs.next(reversed) {
                    if node != start_node {
                        order.push(inner.ref_of[&node].clone());
                    }
                }
            }
        }

        order
    }

    /// The edge that produced an artifact version, if recorded
    pub async fn producing_edge(&self, output: &ArtifactRef) -> Option<LineageEdge> {
        let inner = self.inner.read().await;
        inner.edges.iter().find(|e| e.output == *output).cloned()
    }

    /// Number of recorded edges
    pub async fn edge_count(&self) -> usize {
        self.inner.read().await.edges.len()
    }

    /// Drop every edge recorded by `commit` and rebuild the graph
    pub async fn purge_commit(&self, commit: Uuid) -> Result<(), ArtiflowError> {
        let mut inner = self.inner.write().await;
        let before = inner.edges.len();
        let edges: Vec<LineageEdge> = inner
            .edges
            .iter()
            .filter(|e| e.commit != Some(commit))
            .cloned()
            .collect();

        if edges.len() != before {
            tracing::warn!(commit = %commit, "discarding unfinalized lineage edges");
            self.persist(&edges).await?;
            *inner = GraphInner::rebuild(edges);
        }

        Ok(())
    }

    /// Render the graph in DOT format
    pub async fn to_dot(&self) -> String {
        let inner = self.inner.read().await;
        let mut out = String::from("digraph lineage {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for edge in &inner.edges {
            for input in &edge.inputs {
                out.push_str(&format!(
                    "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                    input, edge.output, edge.task_id
                ));
            }
        }

        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn r(name: &str, version: u64) -> ArtifactRef {
        ArtifactRef::new(name, version)
    }

    fn open_graph(dir: &TempDir) -> LineageGraph {
        LineageGraph::open(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_record_and_trace() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir);

        graph.record_edge("t1", &[r("raw", 1)], &r("clean", 1), None).await.unwrap();
        graph.record_edge("t2", &[r("clean", 1)], &r("model", 1), None).await.unwrap();

        let ancestors = graph.trace(&r("model", 1), TraceDirection::Ancestors).await;
        assert_eq!(ancestors, vec![r("clean", 1), r("raw", 1)]);

        let descendants = graph.trace(&r("raw", 1), TraceDirection::Descendants).await;
        assert_eq!(descendants, vec![r("clean", 1), r("model", 1)]);
    }

    #[tokio::test]
    async fn test_cycle_rejected_and_graph_unchanged() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir);

        graph.record_edge("t1", &[r("a", 1)], &r("b", 1), None).await.unwrap();

        let err = graph.record_edge("t2", &[r("b", 1)], &r("a", 1), None).await.unwrap_err();
        assert!(matches!(err, ArtiflowError::LineageCycle { .. }));

        assert_eq!(graph.edge_count().await, 1);
        assert!(graph.trace(&r("a", 1), TraceDirection::Ancestors).await.is_empty());
    }

    #[tokio::test]
    async fn test_self_edge_rejected() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir);

        let err = graph.record_edge("t", &[r("a", 1)], &r("a", 1), None).await.unwrap_err();
        assert!(matches!(err, ArtiflowError::LineageCycle { .. }));
    }

    #[tokio::test]
    async fn test_single_producer_per_version() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir);

        graph.record_edge("t1", &[r("a", 1)], &r("b", 1), None).await.unwrap();
        let err = graph.record_edge("t2", &[r("c", 1)], &r("b", 1), None).await.unwrap_err();
        assert!(matches!(err, ArtiflowError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_many_consumers_allowed() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir);

        graph.record_edge("t1", &[r("a", 1)], &r("b", 1), None).await.unwrap();
        graph.record_edge("t2", &[r("a", 1)], &r("c", 1), None).await.unwrap();

        let descendants = graph.trace(&r("a", 1), TraceDirection::Descendants).await;
        assert_eq!(descendants.len(), 2);
    }

    #[tokio::test]
    async fn test_trace_unknown_ref_is_empty() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir);

        assert!(graph.trace(&r("ghost", 1), TraceDirection::Ancestors).await.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let graph = open_graph(&dir);
            graph.record_edge("t1", &[r("a", 1)], &r("b", 1), None).await.unwrap();
        }

        let graph = open_graph(&dir);
        assert_eq!(graph.edge_count().await, 1);
        let edge = graph.producing_edge(&r("b", 1)).await.unwrap();
        assert_eq!(edge.task_id, "t1");
    }

    #[tokio::test]
    async fn test_purge_commit() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir);
        let commit = Uuid::new_v4();

        graph.record_edge("t1", &[r("a", 1)], &r("b", 1), None).await.unwrap();
        graph.record_edge("t2", &[r("b", 1)], &r("c", 1), Some(commit)).await.unwrap();

        graph.purge_commit(commit).await.unwrap();

        assert_eq!(graph.edge_count().await, 1);
        assert!(graph.producing_edge(&r("c", 1)).await.is_none());
        // The purged output can be produced again
        graph.record_edge("t3", &[r("b", 1)], &r("c", 1), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_dot_output() {
        let dir = TempDir::new().unwrap();
        let graph = open_graph(&dir);
        graph.record_edge("t1", &[r("a", 1)], &r("b", 1), None).await.unwrap();

        let dot = graph.to_dot().await;
        assert!(dot.contains("digraph lineage"));
        assert!(dot.contains("\"a@v1\" -> \"b@v1\""));
    }
}
