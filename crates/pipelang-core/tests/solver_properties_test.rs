//! Property tests for the fixpoint solver
//!
//! Random constraint graphs are solved under different visiting orders; the
//! final values must not depend on the order, must only ever move up the
//! lattice, and must settle within the pass bound.

use pipelang_core::agg_types::AggregateTable;
use pipelang_core::ast::Span;
use pipelang_core::infer::node::SolveContext;
use pipelang_core::infer::{CastRules, FixpointSolver, InferenceGraph, InferredType, NodeId, VisitOrder};
use pipelang_core::types::ConcreteType;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone)]
enum EdgeSpec {
    Const { to: usize, width: u32 },
    Convey { from: usize, to: usize },
    Unify { a: usize, b: usize },
    Sum { lhs: usize, rhs: usize, to: usize },
    Port { port: usize, value: usize },
}

fn arb_edge(nodes: usize) -> impl Strategy<Value = EdgeSpec> {
    prop_oneof![
        (0..nodes, 1u32..4).prop_map(|(to, w)| EdgeSpec::Const { to, width: w * 8 }),
        (0..nodes, 0..nodes).prop_map(|(from, to)| EdgeSpec::Convey { from, to }),
        (0..nodes, 0..nodes).prop_map(|(a, b)| EdgeSpec::Unify { a, b }),
        (0..nodes, 0..nodes, 0..nodes).prop_map(|(lhs, rhs, to)| EdgeSpec::Sum { lhs, rhs, to }),
        (0..nodes, 0..nodes).prop_map(|(port, value)| EdgeSpec::Port { port, value }),
    ]
}

fn arb_graph() -> impl Strategy<Value = (usize, Vec<EdgeSpec>)> {
    (1usize..12).prop_flat_map(|nodes| (Just(nodes), prop::collection::vec(arb_edge(nodes), 0..24)))
}

fn build(nodes: usize, edges: &[EdgeSpec]) -> InferenceGraph {
    let mut g = InferenceGraph::new();
    let ids: Vec<NodeId> = (0..nodes).map(|_| g.add_node(Span::default())).collect();
    for edge in edges {
        match *edge {
            EdgeSpec::Const { to, width } => g.convey_const(ids[to], ConcreteType::bits(width)),
            EdgeSpec::Convey { from, to } => g.convey(ids[from], ids[to]),
            EdgeSpec::Unify { a, b } => g.unify(ids[a], ids[b]),
            EdgeSpec::Sum { lhs, rhs, to } => g.sum_widths(&[ids[lhs], ids[rhs]], ids[to]),
            EdgeSpec::Port { port, value } => g.convey_port(ids[port], ids[value]),
        }
    }
    g
}

fn values(g: &InferenceGraph) -> Vec<InferredType> {
    g.node_ids().map(|id| g.value(id).clone()).collect()
}

fn solve(g: &mut InferenceGraph, order: VisitOrder) -> usize {
    let aggs = AggregateTable::new();
    let ctx = SolveContext {
        aggs: &aggs,
        casts: &CastRules::Permissive,
    };
    FixpointSolver::new(ctx)
        .with_order(order)
        .solve(g)
        .expect("fixpoint within budget")
        .passes
}

proptest! {
    /// Any visiting order reaches the same assignment.
    #[test]
    fn solving_is_confluent((nodes, edges) in arb_graph(), seed in any::<u64>()) {
        let mut reference = build(nodes, &edges);
        solve(&mut reference, VisitOrder::Insertion);

        let mut permutation: Vec<NodeId> = reference.node_ids().collect();
        permutation.shuffle(&mut StdRng::seed_from_u64(seed));

        for order in [VisitOrder::Reverse, VisitOrder::Dependency, VisitOrder::Explicit(permutation)] {
            let mut g = build(nodes, &edges);
            solve(&mut g, order);
            prop_assert_eq!(values(&reference), values(&g));
        }
    }

    /// A recompute never moves a value down the lattice.
    #[test]
    fn recompute_is_monotone((nodes, edges) in arb_graph(), seed in any::<u64>()) {
        let aggs = AggregateTable::new();
        let ctx = SolveContext {
            aggs: &aggs,
            casts: &CastRules::Permissive,
        };
        let mut g = build(nodes, &edges);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ids: Vec<NodeId> = g.node_ids().collect();

        for _ in 0..(2 * nodes + 2) {
            ids.shuffle(&mut rng);
            for &id in &ids {
                let before = g.value(id).clone();
                g.recompute(id, &ctx);
                let after = g.value(id);
                prop_assert!(before.is_below(after), "{} moved down to {}", before, after);
                if before.is_conflict() {
                    prop_assert!(after.is_conflict());
                }
            }
        }
    }

    /// Every order settles within 2N + 1 passes.
    #[test]
    fn solving_terminates_within_bound((nodes, edges) in arb_graph()) {
        for order in [VisitOrder::Insertion, VisitOrder::Reverse, VisitOrder::Dependency] {
            let mut g = build(nodes, &edges);
            let passes = solve(&mut g, order);
            prop_assert!(passes <= 2 * nodes + 1, "{} passes for {} nodes", passes, nodes);
        }
    }
}

#[test]
fn test_sum_of_eight_and_sixteen() {
    let mut g = build(
        3,
        &[
            EdgeSpec::Const { to: 0, width: 8 },
            EdgeSpec::Const { to: 1, width: 16 },
            EdgeSpec::Sum { lhs: 0, rhs: 1, to: 2 },
        ],
    );
    solve(&mut g, VisitOrder::Dependency);
    assert_eq!(g.value(NodeId(2)), &InferredType::Resolved(ConcreteType::bits(24)));
}

#[test]
fn test_sum_with_conflicting_input() {
    let mut g = build(
        3,
        &[
            EdgeSpec::Const { to: 0, width: 8 },
            EdgeSpec::Const { to: 0, width: 16 },
            EdgeSpec::Const { to: 1, width: 16 },
            EdgeSpec::Sum { lhs: 0, rhs: 1, to: 2 },
        ],
    );
    solve(&mut g, VisitOrder::Dependency);
    assert!(g.value(NodeId(2)).is_conflict());
    assert!(!g.node(NodeId(2)).unwrap().is_conflict_origin());
}

#[test]
fn test_convey_copies_resolved_type() {
    let mut g = build(
        2,
        &[
            EdgeSpec::Const { to: 0, width: 24 },
            EdgeSpec::Convey { from: 0, to: 1 },
        ],
    );
    solve(&mut g, VisitOrder::Reverse);
    assert_eq!(g.value(NodeId(1)), &InferredType::Resolved(ConcreteType::bits(24)));
}
