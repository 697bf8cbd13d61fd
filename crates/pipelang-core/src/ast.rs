//! Pipelang abstract syntax tree
//!
//! The tree is a plain tagged union. Every type-bearing position (each
//! expression, each `let` binding) owns a [`SlotId`] into the program's
//! [`SlotTable`]; that table is the only type storage in the tree, so a pass can
//! hold slot ids without borrowing the tree.
//!
//! Names are resolved before type inference runs: a variable use carries the
//! slot of the binding it refers to.

use crate::infer::InferredType;
use crate::types::ConcreteType;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::ControlFlow;

/// Source location (1-based line and column)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Index of a type slot in the [`SlotTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Type storage for every type-bearing position of a program.
///
/// Before inference a slot may already hold a hint (a literal or declared type
/// set by an earlier pass); after inference every slot holds the value of its
/// unification class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTable {
    slots: Vec<InferredType>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> SlotId {
        self.fresh_with(InferredType::Unknown)
    }

    pub fn fresh_with(&mut self, ty: InferredType) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(ty);
        id
    }

    /// Current value of a slot; out-of-range ids read as `Unknown`
    pub fn get(&self, id: SlotId) -> &InferredType {
        static UNKNOWN: InferredType = InferredType::Unknown;
        self.slots.get(id.index()).unwrap_or(&UNKNOWN)
    }

    pub fn resolved(&self, id: SlotId) -> Option<&ConcreteType> {
        self.get(id).as_resolved()
    }

    pub fn set(&mut self, id: SlotId, ty: InferredType) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            *slot = ty;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &InferredType)> {
        self.slots.iter().enumerate().map(|(i, ty)| (SlotId(i as u32), ty))
    }
}

/// A type as written in source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeExpr {
    Bits { width: u32, signed: bool },
    Named(String),
    Array(Box<TypeExpr>, u32),
    Port(Box<TypeExpr>),
    Reg(Box<TypeExpr>),
    Bypass(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn uint(width: u32) -> Self {
        TypeExpr::Bits { width, signed: false }
    }

    pub fn sint(width: u32) -> Self {
        TypeExpr::Bits { width, signed: true }
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Bits { width, signed: false } => write!(f, "u{width}"),
            TypeExpr::Bits { width, signed: true } => write!(f, "s{width}"),
            TypeExpr::Named(name) => f.write_str(name),
            TypeExpr::Array(elem, size) => write!(f, "{elem}[{size}]"),
            TypeExpr::Port(inner) => write!(f, "port {inner}"),
            TypeExpr::Reg(inner) => write!(f, "reg {inner}"),
            TypeExpr::Bypass(inner) => write!(f, "bypass {inner}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer constant; unsized literals take the configured default width
    Literal { value: u64, width: Option<u32>, signed: bool },
    /// Use of a `let` binding
    Var { name: String, binding: SlotId },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// `cond ? then_value : else_value`
    Select {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    /// `value[hi:lo]`
    BitSlice { value: Box<Expr>, hi: u32, lo: u32 },
    /// `{a, b, ...}`, most significant part first
    Concat(Vec<Expr>),
    Cast { target: TypeExpr, arg: Box<Expr> },
    FieldRef { base: Box<Expr>, field: String },
    AggLiteral { ty: String, fields: Vec<FieldInit> },
    ArrayDef,
    ArrayRef { array: Box<Expr>, index: Box<Expr> },
    RegDef { init: Option<Box<Expr>> },
    RegRef(Box<Expr>),
    PortDef { name: String },
    PortRead(Box<Expr>),
    BypassDef,
    BypassPresent { bypass: Box<Expr>, index: Box<Expr> },
    BypassReady { bypass: Box<Expr>, index: Box<Expr> },
    BypassRead { bypass: Box<Expr>, index: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub slot: SlotId,
    pub span: Span,
}

impl Expr {
    /// Direct sub-expressions, in evaluation order
    pub fn children(&self) -> SmallVec<[&Expr; 4]> {
        let mut out = SmallVec::new();
        match &self.kind {
            ExprKind::Literal { .. }
            | ExprKind::Var { .. }
            | ExprKind::ArrayDef
            | ExprKind::PortDef { .. }
            | ExprKind::BypassDef => {}
            ExprKind::Unary { operand, .. } => out.push(operand.as_ref()),
            ExprKind::Binary { lhs, rhs, .. } => {
                out.push(lhs.as_ref());
                out.push(rhs.as_ref());
            }
            ExprKind::Select {
                cond,
                then_value,
                else_value,
            } => {
                out.push(cond.as_ref());
                out.push(then_value.as_ref());
                out.push(else_value.as_ref());
            }
            ExprKind::BitSlice { value, .. } => out.push(value.as_ref()),
            ExprKind::Concat(parts) => out.extend(parts.iter()),
            ExprKind::Cast { arg, .. } => out.push(arg.as_ref()),
            ExprKind::FieldRef { base, .. } => out.push(base.as_ref()),
            ExprKind::AggLiteral { fields, .. } => out.extend(fields.iter().map(|f| &f.value)),
            ExprKind::ArrayRef { array, index } => {
                out.push(array.as_ref());
                out.push(index.as_ref());
            }
            ExprKind::RegDef { init } => out.extend(init.as_deref()),
            ExprKind::RegRef(reg) => out.push(reg.as_ref()),
            ExprKind::PortRead(port) => out.push(port.as_ref()),
            ExprKind::BypassPresent { bypass, index }
            | ExprKind::BypassReady { bypass, index }
            | ExprKind::BypassRead { bypass, index } => {
                out.push(bypass.as_ref());
                out.push(index.as_ref());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Let {
        name: String,
        slot: SlotId,
        declared: Option<TypeExpr>,
        value: Expr,
    },
    Assign { target: Expr, value: Expr },
    /// `write port, value`
    Write { port: Expr, value: Expr },
    If {
        cond: Expr,
        then_body: Block,
        else_body: Option<Block>,
    },
    While { cond: Expr, body: Block },
    BypassStart { bypass: Expr, index: Expr },
    BypassEnd { bypass: Expr },
    BypassWrite { bypass: Expr, value: Expr },
    Expr(Expr),
    Block(Block),
    Break,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// One compilation unit after inlining
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub slots: SlotTable,
}

/// Result of a visitor callback; `Break` ends the traversal
pub type VisitFlow = ControlFlow<()>;

/// Post-order visitor over a [`Program`].
///
/// `begin` runs once before the traversal, the `*_post` hooks after each
/// expression or statement (children first), and `finish` once after the whole
/// body was visited. `finish` is the only hook with mutable access to the tree.
pub trait AstVisitor {
    fn begin(&mut self, _program: &Program) {}

    fn visit_expr_post(&mut self, _expr: &Expr, _slots: &SlotTable) -> VisitFlow {
        ControlFlow::Continue(())
    }

    fn visit_stmt_post(&mut self, _stmt: &Stmt, _slots: &SlotTable) -> VisitFlow {
        ControlFlow::Continue(())
    }

    fn finish(&mut self, _program: &mut Program) -> VisitFlow {
        ControlFlow::Continue(())
    }
}

/// Drive a visitor over a whole program
pub fn walk_program<V: AstVisitor + ?Sized>(program: &mut Program, visitor: &mut V) -> VisitFlow {
    visitor.begin(program);
    for stmt in &program.body {
        walk_stmt(stmt, &program.slots, visitor)?;
    }
    visitor.finish(program)
}

pub fn walk_stmt<V: AstVisitor + ?Sized>(stmt: &Stmt, slots: &SlotTable, visitor: &mut V) -> VisitFlow {
    match &stmt.kind {
        StmtKind::Let { value, .. } => walk_expr(value, slots, visitor)?,
        StmtKind::Assign { target, value } => {
            walk_expr(target, slots, visitor)?;
            walk_expr(value, slots, visitor)?;
        }
        StmtKind::Write { port, value } => {
            walk_expr(port, slots, visitor)?;
            walk_expr(value, slots, visitor)?;
        }
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            walk_expr(cond, slots, visitor)?;
            walk_block(then_body, slots, visitor)?;
            if let Some(else_body) = else_body {
                walk_block(else_body, slots, visitor)?;
            }
        }
        StmtKind::While { cond, body } => {
            walk_expr(cond, slots, visitor)?;
            walk_block(body, slots, visitor)?;
        }
        StmtKind::BypassStart { bypass, index } => {
            walk_expr(bypass, slots, visitor)?;
            walk_expr(index, slots, visitor)?;
        }
        StmtKind::BypassEnd { bypass } => walk_expr(bypass, slots, visitor)?,
        StmtKind::BypassWrite { bypass, value } => {
            walk_expr(bypass, slots, visitor)?;
            walk_expr(value, slots, visitor)?;
        }
        StmtKind::Expr(expr) => walk_expr(expr, slots, visitor)?,
        StmtKind::Block(block) => walk_block(block, slots, visitor)?,
        StmtKind::Break => {}
    }
    visitor.visit_stmt_post(stmt, slots)
}

fn walk_block<V: AstVisitor + ?Sized>(block: &Block, slots: &SlotTable, visitor: &mut V) -> VisitFlow {
    for stmt in &block.stmts {
        walk_stmt(stmt, slots, visitor)?;
    }
    ControlFlow::Continue(())
}

pub fn walk_expr<V: AstVisitor + ?Sized>(expr: &Expr, slots: &SlotTable, visitor: &mut V) -> VisitFlow {
    for child in expr.children() {
        walk_expr(child, slots, visitor)?;
    }
    visitor.visit_expr_post(expr, slots)
}

/// Incremental construction of a [`Program`], allocating one slot per
/// type-bearing position.
///
/// New nodes take the span set by [`ProgramBuilder::at`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    slots: SlotTable,
    body: Vec<Stmt>,
    cursor: Span,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            cursor: Span::new(1, 1),
            ..Self::default()
        }
    }

    /// Set the span used for subsequently created nodes
    pub fn at(&mut self, line: u32, col: u32) -> &mut Self {
        self.cursor = Span::new(line, col);
        self
    }

    pub fn span(&self) -> Span {
        self.cursor
    }

    /// Pre-set a slot's type, as an earlier pass would
    pub fn hint(&mut self, slot: SlotId, ty: ConcreteType) {
        self.slots.set(slot, InferredType::Resolved(ty));
    }

    pub fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr {
            kind,
            slot: self.slots.fresh(),
            span: self.cursor,
        }
    }

    pub fn lit(&mut self, value: u64, width: Option<u32>) -> Expr {
        self.expr(ExprKind::Literal {
            value,
            width,
            signed: false,
        })
    }

    pub fn signed_lit(&mut self, value: u64, width: Option<u32>) -> Expr {
        self.expr(ExprKind::Literal {
            value,
            width,
            signed: true,
        })
    }

    pub fn var(&mut self, name: impl Into<String>, binding: SlotId) -> Expr {
        self.expr(ExprKind::Var {
            name: name.into(),
            binding,
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: Expr) -> Expr {
        self.expr(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn binary(&mut self, op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn select(&mut self, cond: Expr, then_value: Expr, else_value: Expr) -> Expr {
        self.expr(ExprKind::Select {
            cond: Box::new(cond),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        })
    }

    pub fn slice(&mut self, value: Expr, hi: u32, lo: u32) -> Expr {
        self.expr(ExprKind::BitSlice {
            value: Box::new(value),
            hi,
            lo,
        })
    }

    pub fn concat(&mut self, parts: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Concat(parts))
    }

    pub fn cast(&mut self, target: TypeExpr, arg: Expr) -> Expr {
        self.expr(ExprKind::Cast {
            target,
            arg: Box::new(arg),
        })
    }

    pub fn field(&mut self, base: Expr, field: impl Into<String>) -> Expr {
        self.expr(ExprKind::FieldRef {
            base: Box::new(base),
            field: field.into(),
        })
    }

    pub fn agg_literal<N: Into<String>>(&mut self, ty: impl Into<String>, fields: Vec<(N, Expr)>) -> Expr {
        let fields = fields
            .into_iter()
            .map(|(name, value)| FieldInit {
                name: name.into(),
                value,
            })
            .collect();
        self.expr(ExprKind::AggLiteral { ty: ty.into(), fields })
    }

    pub fn array_def(&mut self) -> Expr {
        self.expr(ExprKind::ArrayDef)
    }

    pub fn array_ref(&mut self, array: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::ArrayRef {
            array: Box::new(array),
            index: Box::new(index),
        })
    }

    pub fn reg_def(&mut self, init: Option<Expr>) -> Expr {
        self.expr(ExprKind::RegDef { init: init.map(Box::new) })
    }

    pub fn reg_ref(&mut self, reg: Expr) -> Expr {
        self.expr(ExprKind::RegRef(Box::new(reg)))
    }

    pub fn port_def(&mut self, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::PortDef { name: name.into() })
    }

    pub fn port_read(&mut self, port: Expr) -> Expr {
        self.expr(ExprKind::PortRead(Box::new(port)))
    }

    pub fn bypass_def(&mut self) -> Expr {
        self.expr(ExprKind::BypassDef)
    }

    pub fn bypass_present(&mut self, bypass: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::BypassPresent {
            bypass: Box::new(bypass),
            index: Box::new(index),
        })
    }

    pub fn bypass_ready(&mut self, bypass: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::BypassReady {
            bypass: Box::new(bypass),
            index: Box::new(index),
        })
    }

    pub fn bypass_read(&mut self, bypass: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::BypassRead {
            bypass: Box::new(bypass),
            index: Box::new(index),
        })
    }

    pub fn stmt(&self, kind: StmtKind) -> Stmt {
        Stmt {
            kind,
            span: self.cursor,
        }
    }

    /// Build a `let` statement without appending it; returns the binding slot
    pub fn let_stmt(&mut self, name: impl Into<String>, declared: Option<TypeExpr>, value: Expr) -> (Stmt, SlotId) {
        let slot = self.slots.fresh();
        let stmt = self.stmt(StmtKind::Let {
            name: name.into(),
            slot,
            declared,
            value,
        });
        (stmt, slot)
    }

    /// Append a `let` statement to the program body; returns the binding slot
    pub fn let_(&mut self, name: impl Into<String>, declared: Option<TypeExpr>, value: Expr) -> SlotId {
        let (stmt, slot) = self.let_stmt(name, declared, value);
        self.body.push(stmt);
        slot
    }

    pub fn assign(&mut self, target: Expr, value: Expr) {
        let stmt = self.stmt(StmtKind::Assign { target, value });
        self.body.push(stmt);
    }

    pub fn write(&mut self, port: Expr, value: Expr) {
        let stmt = self.stmt(StmtKind::Write { port, value });
        self.body.push(stmt);
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.body.push(stmt);
    }

    pub fn finish(self) -> Program {
        Program {
            body: self.body,
            slots: self.slots,
        }
    }
}
