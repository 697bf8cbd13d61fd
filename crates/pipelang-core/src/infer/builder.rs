//! Graph construction from the AST
//!
//! Fed one construct at a time in post-order, so the nodes of an
//! expression's children always exist when the expression itself is seen.
//! Exactly one typing rule applies per construct.

use super::node::{InferenceGraph, NodeId};
use crate::agg_types::AggregateResolver;
use crate::ast::{Expr, ExprKind, SlotTable, Span, Stmt, StmtKind};
use crate::config::InferOptions;
use crate::diag::{Diagnostic, TypeErrorKind};
use crate::types::ConcreteType;
use tracing::debug;

pub struct GraphBuilder<'a> {
    graph: InferenceGraph,
    aggs: &'a dyn AggregateResolver,
    options: &'a InferOptions,
    structural: Vec<Diagnostic>,
    halted: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(aggs: &'a dyn AggregateResolver, options: &'a InferOptions) -> Self {
        Self {
            graph: InferenceGraph::new(),
            aggs,
            options,
            structural: Vec::new(),
            halted: false,
        }
    }

    pub fn graph(&self) -> &InferenceGraph {
        &self.graph
    }

    /// Whether construction stopped at a structural error
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The finished graph plus the structural errors met while building it
    pub fn finish(self) -> (InferenceGraph, Vec<Diagnostic>) {
        (self.graph, self.structural)
    }

    fn node(&mut self, expr: &Expr, slots: &SlotTable) -> NodeId {
        self.graph.node_for_slot(expr.slot, expr.span, slots)
    }

    /// Record a structural error; `failed` is the node the construct would
    /// have typed
    fn structural(&mut self, span: Span, kind: TypeErrorKind, failed: NodeId) {
        debug!(%span, error = %kind, "structural error");
        self.graph.poison(failed);
        self.structural.push(Diagnostic::new(span, kind));
        if self.options.stop_on_structural_error {
            self.halted = true;
        }
    }

    fn check(&mut self, span: Span, result: Result<(), TypeErrorKind>, failed: NodeId) {
        if let Err(kind) = result {
            self.structural(span, kind, failed);
        }
    }

    pub fn expr(&mut self, expr: &Expr, slots: &SlotTable) {
        if self.halted {
            return;
        }
        // A variable use joins its binding's class instead of getting a node.
        if let ExprKind::Var { binding, .. } = &expr.kind {
            let decl = self.graph.node_for_slot(*binding, expr.span, slots);
            self.graph.bind_slot(decl, expr.slot, slots);
            return;
        }
        let result = self.node(expr, slots);

        match &expr.kind {
            ExprKind::Literal { width, signed, .. } => {
                let width = width.unwrap_or(self.options.default_literal_width);
                if width == 0 {
                    let kind = TypeErrorKind::InvalidType {
                        ty: "literal".to_string(),
                        reason: "zero-width values are not allowed".to_string(),
                    };
                    self.structural(expr.span, kind, result);
                } else {
                    self.graph.convey_const(result, ConcreteType::Bits { width, signed: *signed });
                }
            }
            ExprKind::Var { .. } => {}
            ExprKind::Unary { operand, .. } => {
                let operand = self.node(operand, slots);
                self.graph.unify(operand, result);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.node(lhs, slots);
                let rhs = self.node(rhs, slots);
                if op.is_comparison() {
                    self.graph.unify(lhs, rhs);
                    self.graph.convey_const(result, ConcreteType::bits(1));
                } else if op.is_shift() {
                    self.graph.unify(lhs, result);
                    self.graph.ensure_simple(rhs);
                } else {
                    self.graph.unify(lhs, result);
                    self.graph.unify(rhs, result);
                }
            }
            ExprKind::Select {
                cond,
                then_value,
                else_value,
            } => {
                let cond = self.node(cond, slots);
                let then_value = self.node(then_value, slots);
                let else_value = self.node(else_value, slots);
                self.graph.convey_const(cond, ConcreteType::bits(1));
                self.graph.unify(then_value, result);
                self.graph.unify(else_value, result);
            }
            ExprKind::BitSlice { value, hi, lo } => {
                let value = self.node(value, slots);
                self.graph.ensure_simple(value);
                if hi < lo {
                    self.structural(expr.span, TypeErrorKind::BadBitSlice { hi: *hi, lo: *lo }, result);
                } else {
                    self.graph.convey_const(result, ConcreteType::bits(hi - lo + 1));
                }
            }
            ExprKind::Concat(parts) => {
                let parts: Vec<NodeId> = parts.iter().map(|p| self.node(p, slots)).collect();
                self.graph.sum_widths(&parts, result);
            }
            ExprKind::Cast { target, arg } => {
                let arg = self.node(arg, slots);
                let outcome = self.graph.handle_cast(result, arg, target, self.aggs);
                self.check(expr.span, outcome, result);
            }
            ExprKind::FieldRef { base, field } => {
                let base = self.node(base, slots);
                let outcome = self.graph.convey_field_ref(result, base, field, self.aggs);
                self.check(expr.span, outcome, result);
            }
            ExprKind::AggLiteral { ty, fields } => {
                let nodes: Vec<(&str, NodeId)> = fields
                    .iter()
                    .map(|f| (f.name.as_str(), self.node(&f.value, slots)))
                    .collect();
                let outcome = self.graph.convey_agg_literal(result, ty, &nodes, self.aggs);
                self.check(expr.span, outcome, result);
            }
            ExprKind::ArrayDef => self.graph.ensure_array(result),
            ExprKind::ArrayRef { array, index } => {
                let array = self.node(array, slots);
                let index = self.node(index, slots);
                self.graph.convey_array_ref(result, array, index);
            }
            ExprKind::RegDef { init } => {
                self.graph.ensure_register(result);
                if let Some(init) = init {
                    let init = self.node(init, slots);
                    self.graph.convey_reg_ref(init, result);
                }
            }
            ExprKind::RegRef(reg) => {
                let reg = self.node(reg, slots);
                self.graph.convey_reg_ref(result, reg);
            }
            ExprKind::PortDef { .. } => self.graph.ensure_port(result),
            ExprKind::PortRead(port) => {
                let port = self.node(port, slots);
                self.graph.convey_port(port, result);
            }
            ExprKind::BypassDef => self.graph.ensure_bypass(result),
            ExprKind::BypassPresent { bypass, index } | ExprKind::BypassReady { bypass, index } => {
                let bypass = self.node(bypass, slots);
                let index = self.node(index, slots);
                self.graph.convey_const(result, ConcreteType::bits(1));
                self.graph.ensure_bypass(bypass);
                self.graph.ensure_simple(index);
            }
            ExprKind::BypassRead { bypass, index } => {
                let bypass = self.node(bypass, slots);
                let index = self.node(index, slots);
                self.graph.convey_bypass(bypass, result);
                self.graph.ensure_simple(index);
            }
        }
    }

    pub fn stmt(&mut self, stmt: &Stmt, slots: &SlotTable) {
        if self.halted {
            return;
        }

        match &stmt.kind {
            StmtKind::Let {
                slot, declared, value, ..
            } => {
                // The binding joins the value's class; a declared type makes
                // the class report at the binding.
                let value = self.node(value, slots);
                self.graph.bind_slot(value, *slot, slots);
                if let Some(declared) = declared {
                    self.graph.relocate(value, stmt.span);
                    match ConcreteType::from_type_expr(declared, self.aggs) {
                        Ok(ty) => self.graph.add_hint(value, &ty.into()),
                        Err(kind) => self.structural(stmt.span, kind, value),
                    }
                }
            }
            StmtKind::Assign { target, value } => {
                let target = self.node(target, slots);
                let value = self.node(value, slots);
                self.graph.convey(value, target);
            }
            StmtKind::Write { port, value } => {
                let port = self.node(port, slots);
                let value = self.node(value, slots);
                self.graph.convey_port(port, value);
            }
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => {
                let cond = self.node(cond, slots);
                self.graph.ensure_simple(cond);
            }
            StmtKind::BypassStart { bypass, index } => {
                let bypass = self.node(bypass, slots);
                let index = self.node(index, slots);
                self.graph.ensure_bypass(bypass);
                self.graph.ensure_simple(index);
            }
            StmtKind::BypassEnd { bypass } => {
                let bypass = self.node(bypass, slots);
                self.graph.ensure_bypass(bypass);
            }
            StmtKind::BypassWrite { bypass, value } => {
                let bypass = self.node(bypass, slots);
                let value = self.node(value, slots);
                self.graph.convey_bypass(bypass, value);
            }
            StmtKind::Expr(_) | StmtKind::Block(_) | StmtKind::Break => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agg_types::AggregateTable;
    use crate::ast::{walk_program, AstVisitor, ProgramBuilder, TypeExpr, VisitFlow};
    use crate::infer::node::Validator;
    use std::ops::ControlFlow;

    struct Feed<'a>(GraphBuilder<'a>);

    impl AstVisitor for Feed<'_> {
        fn visit_expr_post(&mut self, expr: &Expr, slots: &SlotTable) -> VisitFlow {
            self.0.expr(expr, slots);
            ControlFlow::Continue(())
        }

        fn visit_stmt_post(&mut self, stmt: &Stmt, slots: &SlotTable) -> VisitFlow {
            self.0.stmt(stmt, slots);
            ControlFlow::Continue(())
        }
    }

    fn build(b: ProgramBuilder, aggs: &AggregateTable, options: &InferOptions) -> (InferenceGraph, Vec<Diagnostic>) {
        let mut program = b.finish();
        let mut feed = Feed(GraphBuilder::new(aggs, options));
        let _ = walk_program(&mut program, &mut feed);
        feed.0.finish()
    }

    #[test]
    fn test_variable_uses_share_the_binding_node() {
        let aggs = AggregateTable::new();
        let options = InferOptions::default();
        let mut b = ProgramBuilder::new();
        let v = b.lit(1, Some(3));
        let x = b.let_("x", None, v);
        let use1 = b.var("x", x);
        let use2 = b.var("x", x);
        let (s1, s2) = (use1.slot, use2.slot);
        b.let_("y", None, use1);
        b.let_("z", None, use2);

        let (graph, errors) = build(b, &aggs, &options);
        assert!(errors.is_empty());
        let node = graph.node_of(x);
        assert!(node.is_some());
        assert_eq!(graph.node_of(s1), node);
        assert_eq!(graph.node_of(s2), node);
    }

    #[test]
    fn test_let_chain_is_one_node() {
        // let r = reg; let s = r; let t = s;
        let aggs = AggregateTable::new();
        let options = InferOptions::default();
        let mut b = ProgramBuilder::new();
        let def = b.reg_def(None);
        let r = b.let_("r", None, def);
        let use_r = b.var("r", r);
        let s = b.let_("s", None, use_r);
        let use_s = b.var("s", s);
        let t = b.let_("t", None, use_s);

        let (graph, errors) = build(b, &aggs, &options);
        assert!(errors.is_empty());
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node_of(t), graph.node_of(r));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_declared_type_moves_report_location() {
        let aggs = AggregateTable::new();
        let options = InferOptions::default();
        let mut b = ProgramBuilder::new();
        let wide = b.lit(300, Some(16));
        let v = b.let_("v", None, wide);
        b.at(2, 1);
        let use_v = b.var("v", v);
        let c = b.let_("c", Some(TypeExpr::uint(8)), use_v);

        let (graph, _) = build(b, &aggs, &options);
        let node = graph.node_of(c).and_then(|id| graph.node(id)).unwrap();
        assert_eq!(graph.node_of(c), graph.node_of(v));
        assert_eq!(node.loc(), Span::new(2, 1));
        assert_eq!(node.hint(), &crate::infer::InferredType::from(ConcreteType::bits(8)));
    }

    #[test]
    fn test_bad_bit_slice_is_structural() {
        let aggs = AggregateTable::new();
        let options = InferOptions::default();
        let mut b = ProgramBuilder::new();
        let v = b.lit(1, Some(8));
        b.at(4, 2);
        let s = b.slice(v, 2, 5);
        b.let_("x", None, s);

        let (_, errors) = build(b, &aggs, &options);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, Span::new(4, 2));
        assert_eq!(errors[0].kind, TypeErrorKind::BadBitSlice { hi: 2, lo: 5 });
    }

    #[test]
    fn test_stop_on_structural_error_halts_construction() {
        let aggs = AggregateTable::new();
        let options = InferOptions::default().with_stop_on_structural_error(true);
        let mut b = ProgramBuilder::new();
        let one = b.lit(1, Some(1));
        let bad = b.cast(TypeExpr::named("Missing"), one);
        b.let_("x", None, bad);
        let later = b.lit(2, Some(2));
        let later_slot = later.slot;
        b.let_("y", None, later);

        let (graph, errors) = build(b, &aggs, &options);
        assert_eq!(errors.len(), 1);
        assert!(graph.node_of(later_slot).is_none());
    }

    #[test]
    fn test_port_read_wires_port_validator() {
        let aggs = AggregateTable::new();
        let options = InferOptions::default();
        let mut b = ProgramBuilder::new();
        let p = b.port_def("in");
        let port = b.let_("p", None, p);
        let use_p = b.var("p", port);
        let read = b.port_read(use_p);
        b.let_("v", None, read);

        let (graph, _) = build(b, &aggs, &options);
        let port_node = graph.node_of(port).and_then(|id| graph.node(id)).unwrap();
        assert!(port_node.validators().contains(&Validator::Port));
    }
}
