use stagecore::{InputBundle, RunError, Stage, StageId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Stage instance owned by the graph. Scheduled work holds a clone of the
/// `Arc`, never a reference into the graph itself.
pub(crate) type StageCell = Arc<Mutex<Box<dyn Stage>>>;

pub(crate) struct StageNode {
    pub(crate) id: StageId,
    pub(crate) stage_type: String,
    pub(crate) name: String,
    pub(crate) stage: StageCell,
    pub(crate) successors: Vec<usize>,
    pub(crate) in_degree: usize,
}

/// Immutable, executable stage graph produced by `GraphBuilder`.
///
/// Nodes live in an arena indexed by their position in the descriptor list;
/// adjacency, in-degrees and start nodes are precomputed at build time.
pub struct Graph {
    pub(crate) nodes: Vec<StageNode>,
    pub(crate) index: HashMap<StageId, usize>,
    pub(crate) start_nodes: Vec<usize>,
    pub(crate) input_stages: Vec<usize>,
    pub(crate) topo_order: Vec<usize>,
    pub(crate) branching: bool,
}

impl Graph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Stage ids in declaration order.
    pub fn stage_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    /// Stages with no incoming edge, in declaration order. This is the
    /// order in which a run triggers them.
    pub fn start_nodes(&self) -> Vec<&str> {
        self.start_nodes
            .iter()
            .map(|&i| self.nodes[i].id.as_str())
            .collect()
    }

    pub fn successors(&self, id: &str) -> Option<Vec<&str>> {
        let node = self.node(id)?;
        Some(
            node.successors
                .iter()
                .map(|&i| self.nodes[i].id.as_str())
                .collect(),
        )
    }

    pub fn in_degree(&self, id: &str) -> Option<usize> {
        self.node(id).map(|n| n.in_degree)
    }

    pub fn out_degree(&self, id: &str) -> Option<usize> {
        self.node(id).map(|n| n.successors.len())
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.successors.len()).sum()
    }

    pub fn stage_type(&self, id: &str) -> Option<&str> {
        self.node(id).map(|n| n.stage_type.as_str())
    }

    pub fn stage_name(&self, id: &str) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// True when some stage fans out or more than one stage starts a run.
    pub fn is_branching(&self) -> bool {
        self.branching
    }

    pub fn input_stage_ids(&self) -> Vec<&str> {
        self.input_stages
            .iter()
            .map(|&i| self.nodes[i].id.as_str())
            .collect()
    }

    pub fn topological_order(&self) -> Vec<&str> {
        self.topo_order
            .iter()
            .map(|&i| self.nodes[i].id.as_str())
            .collect()
    }

    fn node(&self, id: &str) -> Option<&StageNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Deliver `bundle` to every input-capable stage, one after another.
    pub async fn inject_input(&self, bundle: &InputBundle) -> Result<(), RunError> {
        for &idx in &self.input_stages {
            let node = &self.nodes[idx];
            let mut stage = node.stage.lock().await;
            let Some(sink) = stage.as_input_sink() else {
                continue;
            };
            tracing::debug!(stage = %node.id, values = bundle.len(), "Injecting input");
            sink.accept_input(bundle).map_err(|source| RunError::InputRejected {
                id: node.id.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("stages", &self.nodes.iter().map(|n| &n.id).collect::<Vec<_>>())
            .field("start_nodes", &self.start_nodes())
            .field("edges", &self.edge_count())
            .field("branching", &self.branching)
            .finish()
    }
}
