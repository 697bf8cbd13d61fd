//! Round-robin fixpoint solver over the inference graph

use super::node::{InferenceGraph, NodeId, SolveContext};
use super::InferError;
use crate::diag::ErrorSink;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

/// Order in which a solver pass visits the nodes.
///
/// The fixpoint does not depend on the order; only the number of passes
/// needed to reach it does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitOrder {
    /// Creation order
    Insertion,
    Reverse,
    /// Sources before the nodes they feed, cycles kept together
    #[default]
    Dependency,
    /// Caller-supplied permutation; nodes it omits are visited last in
    /// creation order
    #[serde(skip)]
    Explicit(Vec<NodeId>),
}

/// Result of fixpoint computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixpointResult {
    /// Passes run, including the final pass that changed nothing
    pub passes: usize,
    /// Node value changes over all passes
    pub changes: usize,
}

pub struct FixpointSolver<'a> {
    ctx: SolveContext<'a>,
    order: VisitOrder,
    max_passes: Option<usize>,
}

impl<'a> FixpointSolver<'a> {
    pub fn new(ctx: SolveContext<'a>) -> Self {
        Self {
            ctx,
            order: VisitOrder::default(),
            max_passes: None,
        }
    }

    pub fn with_order(mut self, order: VisitOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_passes(mut self, max_passes: Option<usize>) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Each node changes at most twice, so a graph of N nodes settles within
    /// 2N passes plus one quiet pass.
    pub fn pass_budget(&self, graph: &InferenceGraph) -> usize {
        self.max_passes.unwrap_or(2 * graph.len() + 2)
    }

    /// Recompute nodes pass after pass until a pass changes nothing
    #[instrument(level = "debug", skip_all, fields(nodes = graph.len(), edges = graph.edge_count()))]
    pub fn solve(&self, graph: &mut InferenceGraph) -> Result<FixpointResult, InferError> {
        let sequence = visit_sequence(graph, &self.order);
        let budget = self.pass_budget(graph);

        let mut changes = 0;
        for pass in 1..=budget {
            let mut changed = 0;
            for &id in &sequence {
                if graph.recompute(id, &self.ctx) {
                    trace!(node = %id, value = %graph.value(id), "node changed");
                    changed += 1;
                }
            }
            changes += changed;
            if changed == 0 {
                debug!(passes = pass, changes, "fixpoint reached");
                return Ok(FixpointResult { passes: pass, changes });
            }
        }

        Err(InferError::NoFixpoint { passes: budget })
    }

    /// Validate every node, reporting all errors; returns whether the graph
    /// is well typed
    pub fn validate(&self, graph: &InferenceGraph, sink: &mut dyn ErrorSink) -> bool {
        let mut ok = true;
        for id in graph.node_ids() {
            ok &= graph.validate_node(id, &self.ctx, sink);
        }
        ok
    }
}

/// Node visiting sequence for one solver pass
pub fn visit_sequence(graph: &InferenceGraph, order: &VisitOrder) -> Vec<NodeId> {
    match order {
        VisitOrder::Insertion => graph.node_ids().collect(),
        VisitOrder::Reverse => {
            let mut ids: Vec<NodeId> = graph.node_ids().collect();
            ids.reverse();
            ids
        }
        VisitOrder::Dependency => dependency_order(graph),
        VisitOrder::Explicit(ids) => {
            let mut seen = vec![false; graph.len()];
            let mut sequence = Vec::with_capacity(graph.len());
            for &id in ids {
                if let Some(flag) = seen.get_mut(id.index()) {
                    if !*flag {
                        *flag = true;
                        sequence.push(id);
                    }
                }
            }
            sequence.extend(graph.node_ids().filter(|id| !seen[id.index()]));
            sequence
        }
    }
}

fn dependency_order(graph: &InferenceGraph) -> Vec<NodeId> {
    let mut deps: DiGraph<NodeId, ()> = DiGraph::with_capacity(graph.len(), graph.edge_count());
    for id in graph.node_ids() {
        deps.add_node(id);
    }
    for id in graph.node_ids() {
        let Some(node) = graph.node(id) else { continue };
        for edge in node.inputs() {
            for source in &edge.sources {
                deps.add_edge(NodeIndex::new(source.index()), NodeIndex::new(id.index()), ());
            }
        }
    }

    // Tarjan yields components sinks first.
    tarjan_scc(&deps)
        .into_iter()
        .rev()
        .flat_map(|component| {
            let mut ids: Vec<NodeId> = component.into_iter().map(|ix| deps[ix]).collect();
            ids.sort();
            ids
        })
        .collect()
}
