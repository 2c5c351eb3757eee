use crate::advisory::ParallelismAdvisory;
use crate::graph::{Graph, StageNode};
use crate::registry::StageRegistry;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use stagecore::{BuildError, RegistryError, StageDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Validates descriptors and turns them into an executable `Graph`
pub struct GraphBuilder<'a> {
    registry: &'a StageRegistry,
    advisory: Option<&'a ParallelismAdvisory>,
}

/// Validated topology, before any stage is instantiated
struct Topology {
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    start_nodes: Vec<usize>,
    topo_order: Vec<usize>,
}

impl<'a> GraphBuilder<'a> {
    /// Builder reporting to the process-wide parallelism advisory.
    pub fn new(registry: &'a StageRegistry) -> Self {
        Self {
            registry,
            advisory: Some(ParallelismAdvisory::global()),
        }
    }

    pub fn with_advisory(mut self, advisory: &'a ParallelismAdvisory) -> Self {
        self.advisory = Some(advisory);
        self
    }

    /// Never touch any advisory, whatever the topology.
    pub fn without_advisory(mut self) -> Self {
        self.advisory = None;
        self
    }

    /// Build the graph. Topology is checked first so that no stage is
    /// created or initialized for a graph that is going to be rejected.
    pub async fn build(&self, descriptors: &[StageDescriptor]) -> Result<Graph, BuildError> {
        let index = Self::index_ids(descriptors)?;
        let topology = Self::resolve_topology(descriptors, &index)?;

        let mut nodes = Vec::with_capacity(descriptors.len());
        let mut input_stages = Vec::new();

        for (idx, desc) in descriptors.iter().enumerate() {
            tracing::debug!("Registering stage id: {} type: {}", desc.id, desc.stage_type);

            let mut stage = self
                .registry
                .create(&desc.stage_type, &desc.parameters)
                .map_err(|e| match e {
                    RegistryError::UnknownType(stage_type) => BuildError::UnknownType {
                        id: desc.id.clone(),
                        stage_type,
                    },
                    RegistryError::Factory { stage_type, source } => {
                        BuildError::StageCreationFailed {
                            id: desc.id.clone(),
                            stage_type,
                            source,
                        }
                    }
                })?;

            stage
                .initialize(&desc.parameters)
                .await
                .map_err(|source| BuildError::StageCreationFailed {
                    id: desc.id.clone(),
                    stage_type: desc.stage_type.clone(),
                    source,
                })?;

            if stage.as_input_sink().is_some() {
                tracing::debug!("Stage '{}' accepts external input", desc.id);
                input_stages.push(idx);
            }

            nodes.push(StageNode {
                id: desc.id.clone(),
                stage_type: desc.stage_type.clone(),
                name: stage.name().to_string(),
                stage: Arc::new(Mutex::new(stage)),
                successors: topology.successors[idx].clone(),
                in_degree: topology.in_degree[idx],
            });
        }

        let branching = topology.start_nodes.len() > 1
            || topology.successors.iter().any(|s| s.len() > 1);

        tracing::debug!(
            "Built graph with {} stage(s), {} start node(s), branching: {}",
            nodes.len(),
            topology.start_nodes.len(),
            branching
        );

        if let Some(advisory) = self.advisory {
            advisory.observe(branching);
        } else {
            tracing::debug!("Parallelism advisory disabled for this build");
        }

        Ok(Graph {
            nodes,
            index,
            start_nodes: topology.start_nodes,
            input_stages,
            topo_order: topology.topo_order,
            branching,
        })
    }

    fn index_ids(descriptors: &[StageDescriptor]) -> Result<HashMap<String, usize>, BuildError> {
        if descriptors.is_empty() {
            return Err(BuildError::EmptyPipeline);
        }

        let mut index = HashMap::with_capacity(descriptors.len());
        for (position, desc) in descriptors.iter().enumerate() {
            if desc.id.is_empty() {
                return Err(BuildError::EmptyId { position });
            }
            if index.insert(desc.id.clone(), position).is_some() {
                return Err(BuildError::DuplicateId(desc.id.clone()));
            }
        }
        Ok(index)
    }

    fn resolve_topology(
        descriptors: &[StageDescriptor],
        index: &HashMap<String, usize>,
    ) -> Result<Topology, BuildError> {
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(descriptors.len(), 0);
        let handles: Vec<NodeIndex> = (0..descriptors.len()).map(|i| graph.add_node(i)).collect();

        let mut successors = vec![Vec::new(); descriptors.len()];
        let mut in_degree = vec![0usize; descriptors.len()];

        for (from, desc) in descriptors.iter().enumerate() {
            for next in &desc.next {
                let to = *index.get(next).ok_or_else(|| BuildError::DanglingEdge {
                    from: desc.id.clone(),
                    to: next.clone(),
                })?;
                tracing::trace!("Connecting {} -> {}", desc.id, next);
                successors[from].push(to);
                in_degree[to] += 1;
                graph.add_edge(handles[from], handles[to], ());
            }
        }

        let topo_order = toposort(&graph, None)
            .map_err(|cycle| BuildError::CyclicGraph(descriptors[graph[cycle.node_id()]].id.clone()))?
            .into_iter()
            .map(|handle| graph[handle])
            .collect();

        let start_nodes = (0..descriptors.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();

        Ok(Topology {
            successors,
            in_degree,
            start_nodes,
            topo_order,
        })
    }
}
