//! Constraint-graph type inference
//!
//! The pass runs in three phases:
//! 1. walk the AST post-order, building one inference node per unification
//!    class and one edge per typing rule ([`builder`], [`edges`])
//! 2. solve the graph to a fixpoint over the [`lattice`] ([`solver`])
//! 3. validate every node, reporting all errors, and write each node's value
//!    back into the slots bound to it

pub mod builder;
pub mod cast;
pub mod edges;
pub mod lattice;
pub mod node;
pub mod solver;

pub use cast::{CastPolicy, CastRules};
pub use lattice::InferredType;
pub use node::{InferenceGraph, NodeId};
pub use solver::{FixpointResult, FixpointSolver, VisitOrder};

use crate::agg_types::AggregateResolver;
use crate::ast::{walk_program, AstVisitor, Expr, Program, SlotTable, Stmt, VisitFlow};
use crate::config::InferOptions;
use crate::diag::{Diagnostic, Diagnostics, ErrorSink};
use anyhow::Context;
use builder::GraphBuilder;
use node::SolveContext;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferError {
    #[error("type inference failed with {count} error(s)")]
    TypeErrors { count: usize },

    #[error("inference graph did not reach a fixpoint within {passes} passes")]
    NoFixpoint { passes: usize },

    #[error("inference pass was not run to completion")]
    Incomplete,
}

/// Size and effort figures of a successful run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferStats {
    pub nodes: usize,
    pub edges: usize,
    pub passes: usize,
    /// Slots written back
    pub slots: usize,
}

/// Sink wrapper counting what passes through it
struct Counting<'s> {
    inner: &'s mut dyn ErrorSink,
    count: usize,
}

impl ErrorSink for Counting<'_> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.count += 1;
        self.inner.report(diagnostic);
    }
}

/// The inference pass as an AST visitor.
///
/// Graph construction happens in the `*_post` hooks; solving, validation and
/// write-back happen in `finish`. One instance runs over one program.
pub struct TypeInferPass<'a> {
    aggs: &'a dyn AggregateResolver,
    casts: &'a dyn CastPolicy,
    options: &'a InferOptions,
    sink: &'a mut dyn ErrorSink,
    builder: Option<GraphBuilder<'a>>,
    outcome: Option<Result<InferStats, InferError>>,
}

impl<'a> TypeInferPass<'a> {
    pub fn new(aggs: &'a dyn AggregateResolver, options: &'a InferOptions, sink: &'a mut dyn ErrorSink) -> Self {
        Self {
            aggs,
            casts: &options.cast_rules,
            options,
            sink,
            builder: None,
            outcome: None,
        }
    }

    /// Replace the configured cast rules with a custom policy
    pub fn with_cast_policy(mut self, casts: &'a dyn CastPolicy) -> Self {
        self.casts = casts;
        self
    }

    /// Infer the types of a whole program, updating its slot table
    #[instrument(level = "debug", skip_all, fields(stmts = program.body.len(), slots = program.slots.len()))]
    pub fn run(&mut self, program: &mut Program) -> Result<InferStats, InferError> {
        self.outcome = None;
        // A break carries no payload; the failure is kept in `outcome`.
        if walk_program(program, self).is_break() {
            debug!(failed = self.outcome.is_some(), "inference stopped early");
        }
        self.outcome.take().unwrap_or(Err(InferError::Incomplete))
    }

    fn solve_and_write_back(&mut self, builder: GraphBuilder<'a>, slots: &mut SlotTable) -> Result<InferStats, InferError> {
        let (mut graph, structural) = builder.finish();
        let mut sink = Counting {
            inner: &mut *self.sink,
            count: 0,
        };
        for diagnostic in structural {
            sink.report(diagnostic);
        }

        let solver = FixpointSolver::new(SolveContext {
            aggs: self.aggs,
            casts: self.casts,
        })
        .with_order(self.options.visit_order.clone())
        .with_max_passes(self.options.max_passes);
        let fixpoint = solver.solve(&mut graph)?;
        solver.validate(&graph, &mut sink);
        graph.write_back(slots);

        let stats = InferStats {
            nodes: graph.len(),
            edges: graph.edge_count(),
            passes: fixpoint.passes,
            slots: graph.node_ids().filter_map(|id| graph.node(id)).map(|n| n.slots().len()).sum(),
        };
        debug!(?stats, errors = sink.count, "inference finished");

        match sink.count {
            0 => Ok(stats),
            count => Err(InferError::TypeErrors { count }),
        }
    }
}

impl<'a> AstVisitor for TypeInferPass<'a> {
    fn begin(&mut self, _program: &Program) {
        self.builder = Some(GraphBuilder::new(self.aggs, self.options));
    }

    fn visit_expr_post(&mut self, expr: &Expr, slots: &SlotTable) -> VisitFlow {
        if let Some(builder) = self.builder.as_mut() {
            builder.expr(expr, slots);
        }
        ControlFlow::Continue(())
    }

    fn visit_stmt_post(&mut self, stmt: &Stmt, slots: &SlotTable) -> VisitFlow {
        if let Some(builder) = self.builder.as_mut() {
            builder.stmt(stmt, slots);
        }
        ControlFlow::Continue(())
    }

    fn finish(&mut self, program: &mut Program) -> VisitFlow {
        let Some(builder) = self.builder.take() else {
            return ControlFlow::Break(());
        };
        let outcome = self.solve_and_write_back(builder, &mut program.slots);
        let flow = match outcome {
            Ok(_) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        };
        self.outcome = Some(outcome);
        flow
    }
}

/// Outcome of [`infer_program`]: the pass result plus every diagnostic
#[derive(Debug)]
pub struct InferReport {
    pub result: Result<InferStats, InferError>,
    pub diagnostics: Diagnostics,
}

impl InferReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Convert into an `anyhow` result carrying the rendered diagnostics
    pub fn into_result(self) -> anyhow::Result<InferStats> {
        let diagnostics = self.diagnostics;
        self.result
            .with_context(|| diagnostics.to_string().trim_end().to_string())
    }
}

/// Infer all types in `program` with default options
pub fn infer_program(program: &mut Program, aggs: &dyn AggregateResolver) -> InferReport {
    infer_program_with(program, aggs, &InferOptions::default())
}

pub fn infer_program_with(program: &mut Program, aggs: &dyn AggregateResolver, options: &InferOptions) -> InferReport {
    let mut diagnostics = Diagnostics::new();
    let result = TypeInferPass::new(aggs, options, &mut diagnostics).run(program);
    InferReport { result, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agg_types::AggregateTable;
    use crate::ast::ProgramBuilder;
    use crate::types::ConcreteType;

    #[test]
    fn test_pass_reports_stats() {
        let mut b = ProgramBuilder::new();
        let five = b.lit(5, Some(8));
        let a = b.let_("a", None, five);
        let use_a = b.var("a", a);
        b.let_("b", None, use_a);
        let mut program = b.finish();

        let mut sink: Vec<Diagnostic> = Vec::new();
        let options = InferOptions::default();
        let aggs = AggregateTable::new();
        let stats = TypeInferPass::new(&aggs, &options, &mut sink)
            .run(&mut program)
            .unwrap();
        assert!(sink.is_empty());
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.slots, 4);
        assert!(program.slots.iter().all(|(_, ty)| ty == &InferredType::Resolved(ConcreteType::bits(8))));
    }

    #[test]
    fn test_custom_cast_policy() {
        struct NoCasts;
        impl CastPolicy for NoCasts {
            fn allows(&self, from: &ConcreteType, to: &ConcreteType, _aggs: &dyn AggregateResolver) -> bool {
                from == to
            }
        }

        let mut b = ProgramBuilder::new();
        let v = b.lit(1, Some(8));
        let c = b.cast(crate::ast::TypeExpr::uint(4), v);
        b.let_("x", None, c);
        let mut program = b.finish();

        let mut sink: Vec<Diagnostic> = Vec::new();
        let options = InferOptions::default();
        let aggs = AggregateTable::new();
        let result = TypeInferPass::new(&aggs, &options, &mut sink)
            .with_cast_policy(&NoCasts)
            .run(&mut program);
        assert_eq!(result, Err(InferError::TypeErrors { count: 1 }));
        assert!(matches!(sink[0].kind, crate::diag::TypeErrorKind::IllegalCast { .. }));
    }

    #[test]
    fn test_report_into_result_renders_diagnostics() {
        let mut b = ProgramBuilder::new();
        let p = b.port_def("p");
        let stmt = b.stmt(crate::ast::StmtKind::Expr(p));
        b.push(stmt);
        let mut program = b.finish();

        let report = infer_program(&mut program, &AggregateTable::new());
        assert!(!report.is_ok());
        let err = report.into_result().unwrap_err();
        assert_eq!(err.to_string(), "1:1: error: unable to infer type");
    }
}
