//! Inference nodes and the graph that owns them
//!
//! A node is one unification class: every AST slot bound to it must end up
//! with the same type. Nodes live in an arena inside [`InferenceGraph`] and
//! refer to each other (and to AST slots) by index only.
//!
//! Incoming edges carry a [`Transfer`] computing a contribution from the
//! values of their source nodes. Firing rule: a transfer runs only once every
//! source is `Resolved`; a `Conflict` source makes the edge contribute
//! `Conflict`, an `Unknown` source makes it contribute nothing. A field
//! projection out of a value lacking the field is treated like a `Conflict`
//! source.

use super::cast::CastPolicy;
use super::lattice::InferredType;
use crate::agg_types::AggregateResolver;
use crate::ast::{SlotId, SlotTable, Span};
use crate::diag::{Diagnostic, ErrorSink, TypeErrorKind};
use crate::types::ConcreteType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Index of a node in the [`InferenceGraph`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Read-only collaborators consulted while solving
#[derive(Clone, Copy)]
pub struct SolveContext<'a> {
    pub aggs: &'a dyn AggregateResolver,
    pub casts: &'a dyn CastPolicy,
}

impl fmt::Debug for SolveContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolveContext").finish_non_exhaustive()
    }
}

/// Transfer function of an edge, evaluated over the resolved source values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transfer {
    /// Identity on the single source
    Convey,
    /// Fixed type, no sources
    Const(ConcreteType),
    /// Unsigned bit vector as wide as all sources together
    SumWidths,
    WrapPort,
    UnwrapPort,
    WrapReg,
    UnwrapReg,
    WrapBypass,
    UnwrapBypass,
    /// Element type of an array source
    ArrayElement,
    /// Declared type of the named field of an aggregate source
    Field(String),
    /// Aggregate built from field values; each source must match its
    /// declared field type
    AggLiteral { aggregate: String, fields: Vec<ConcreteType> },
}

impl Transfer {
    pub fn eval(&self, inputs: &[&ConcreteType], aggs: &dyn AggregateResolver) -> InferredType {
        match (self, inputs) {
            (Transfer::Const(ty), _) => ty.clone().into(),
            (Transfer::Convey, [ty]) => (*ty).clone().into(),
            (Transfer::SumWidths, parts) => {
                let mut total: u32 = 0;
                for part in parts {
                    match part.flat_width(aggs).and_then(|w| total.checked_add(w)) {
                        Some(sum) => total = sum,
                        None => return InferredType::Conflict,
                    }
                }
                ConcreteType::bits(total).into()
            }
            (Transfer::WrapPort, [ty]) => ConcreteType::port((*ty).clone()).into(),
            (Transfer::WrapReg, [ty]) => ConcreteType::reg((*ty).clone()).into(),
            (Transfer::WrapBypass, [ty]) => ConcreteType::bypass((*ty).clone()).into(),
            // Unwrapping the wrong kind contributes nothing; the wrapped
            // node's validator reports it.
            (Transfer::UnwrapPort, [ty]) => unwrapped(ty.port_payload()),
            (Transfer::UnwrapReg, [ty]) => unwrapped(ty.reg_payload()),
            (Transfer::UnwrapBypass, [ty]) => unwrapped(ty.bypass_payload()),
            (Transfer::ArrayElement, [ty]) => unwrapped(ty.element()),
            (Transfer::Field(field), [ConcreteType::Aggregate(name)]) => {
                unwrapped(aggs.resolve(name).and_then(|def| def.field(field)).map(|f| &f.ty))
            }
            (Transfer::AggLiteral { aggregate, fields }, values) => {
                let matches = values.len() == fields.len() && values.iter().zip(fields).all(|(v, f)| *v == f);
                if matches {
                    ConcreteType::aggregate(aggregate.clone()).into()
                } else {
                    InferredType::Conflict
                }
            }
            _ => InferredType::Unknown,
        }
    }
}

fn unwrapped(ty: Option<&ConcreteType>) -> InferredType {
    ty.cloned().map_or(InferredType::Unknown, InferredType::Resolved)
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Convey => f.write_str("convey"),
            Transfer::Const(ty) => write!(f, "const({ty})"),
            Transfer::SumWidths => f.write_str("sum-widths"),
            Transfer::WrapPort => f.write_str("port"),
            Transfer::UnwrapPort => f.write_str("unport"),
            Transfer::WrapReg => f.write_str("reg"),
            Transfer::UnwrapReg => f.write_str("unreg"),
            Transfer::WrapBypass => f.write_str("bypass"),
            Transfer::UnwrapBypass => f.write_str("unbypass"),
            Transfer::ArrayElement => f.write_str("elem"),
            Transfer::Field(name) => write!(f, "field({name})"),
            Transfer::AggLiteral { aggregate, .. } => write!(f, "agg({aggregate})"),
        }
    }
}

/// Check run against a node's final resolved value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Validator {
    /// Scalar or aggregate
    Simple,
    Array,
    Register,
    Port,
    Bypass,
    /// The value may be cast to the given type
    CastTo(ConcreteType),
    /// The value is an aggregate declaring the field
    HasField(String),
}

impl Validator {
    pub fn check(&self, ty: &ConcreteType, ctx: &SolveContext<'_>) -> Result<(), TypeErrorKind> {
        let found = || ty.clone();
        match self {
            Validator::Simple if ty.is_simple() => Ok(()),
            Validator::Simple => Err(TypeErrorKind::NotSimple { found: found() }),
            Validator::Array if ty.element().is_some() => Ok(()),
            Validator::Array => Err(TypeErrorKind::NotArray { found: found() }),
            Validator::Register => match ty.reg_payload() {
                Some(inner) if inner.is_simple() => Ok(()),
                _ => Err(TypeErrorKind::NotRegister { found: found() }),
            },
            Validator::Port => match ty.port_payload() {
                Some(inner) if inner.is_simple() => Ok(()),
                _ => Err(TypeErrorKind::NotPort { found: found() }),
            },
            Validator::Bypass => match ty.bypass_payload() {
                Some(inner) if inner.is_simple() => Ok(()),
                _ => Err(TypeErrorKind::NotBypass { found: found() }),
            },
            Validator::CastTo(target) => {
                if ctx.casts.allows(ty, target, ctx.aggs) {
                    Ok(())
                } else {
                    Err(TypeErrorKind::IllegalCast {
                        from: found(),
                        to: target.clone(),
                    })
                }
            }
            Validator::HasField(field) => match ty {
                ConcreteType::Aggregate(name) => match ctx.aggs.resolve(name) {
                    Some(def) if def.field(field).is_some() => Ok(()),
                    _ => Err(TypeErrorKind::NoSuchField {
                        aggregate: name.clone(),
                        field: field.clone(),
                    }),
                },
                _ => Err(TypeErrorKind::NotAggregate {
                    found: found(),
                    field: field.clone(),
                }),
            },
        }
    }
}

/// An incoming edge: transfer function plus ordered source nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub transfer: Transfer,
    pub sources: SmallVec<[NodeId; 2]>,
}

enum Firing {
    Pending,
    Poisoned,
    Fired(InferredType),
}

#[derive(Debug, Clone)]
pub struct InferenceNode {
    loc: Span,
    slots: SmallVec<[SlotId; 2]>,
    hint: InferredType,
    value: InferredType,
    inputs: Vec<Edge>,
    validators: Vec<Validator>,
    conflict_origin: bool,
    conflict_candidates: Vec<ConcreteType>,
    poisoned: bool,
}

impl InferenceNode {
    fn new(loc: Span) -> Self {
        Self {
            loc,
            slots: SmallVec::new(),
            hint: InferredType::Unknown,
            value: InferredType::Unknown,
            inputs: Vec::new(),
            validators: Vec::new(),
            conflict_origin: false,
            conflict_candidates: Vec::new(),
            poisoned: false,
        }
    }

    pub fn loc(&self) -> Span {
        self.loc
    }

    pub fn slots(&self) -> &[SlotId] {
        &self.slots
    }

    /// Join of the pre-existing types of the bound slots
    pub fn hint(&self) -> &InferredType {
        &self.hint
    }

    pub fn value(&self) -> &InferredType {
        &self.value
    }

    pub fn inputs(&self) -> &[Edge] {
        &self.inputs
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Whether this node's conflict arose here rather than flowing in from a
    /// conflicting source node
    pub fn is_conflict_origin(&self) -> bool {
        self.conflict_origin
    }
}

/// Arena of inference nodes for one compilation unit
#[derive(Debug, Clone, Default)]
pub struct InferenceGraph {
    nodes: Vec<InferenceNode>,
    by_slot: IndexMap<SlotId, NodeId>,
}

impl InferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.inputs.len()).sum()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }

    pub fn node(&self, id: NodeId) -> Option<&InferenceNode> {
        self.nodes.get(id.index())
    }

    pub fn value(&self, id: NodeId) -> &InferredType {
        static UNKNOWN: InferredType = InferredType::Unknown;
        self.nodes.get(id.index()).map_or(&UNKNOWN, |n| &n.value)
    }

    /// Node currently owning a slot
    pub fn node_of(&self, slot: SlotId) -> Option<NodeId> {
        self.by_slot.get(&slot).copied()
    }

    /// Add a node bound to no slot
    pub fn add_node(&mut self, loc: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(InferenceNode::new(loc));
        id
    }

    /// Node for an AST position, created on first use
    pub fn node_for_slot(&mut self, slot: SlotId, loc: Span, slots: &SlotTable) -> NodeId {
        if let Some(id) = self.node_of(slot) {
            return id;
        }
        let id = self.add_node(loc);
        self.bind_slot(id, slot, slots);
        id
    }

    /// Route a slot into an existing node's unification class.
    ///
    /// A slot already owned by another node is tied to this one with
    /// conveyance in both directions.
    pub fn bind_slot(&mut self, id: NodeId, slot: SlotId, slots: &SlotTable) {
        match self.node_of(slot) {
            Some(existing) if existing == id => {}
            Some(existing) => {
                self.add_input(id, Transfer::Convey, &[existing]);
                self.add_input(existing, Transfer::Convey, &[id]);
            }
            None => {
                if let Some(node) = self.nodes.get_mut(id.index()) {
                    node.slots.push(slot);
                    node.hint = node.hint.join(slots.get(slot));
                    self.by_slot.insert(slot, id);
                }
            }
        }
    }

    /// Report a node's errors at `loc` from now on
    pub fn relocate(&mut self, id: NodeId, loc: Span) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.loc = loc;
        }
    }

    /// Join an externally known type into a node's hint
    pub fn add_hint(&mut self, id: NodeId, ty: &InferredType) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.hint = node.hint.join(ty);
        }
    }

    /// Add an incoming edge; an identical edge is only stored once
    pub fn add_input(&mut self, id: NodeId, transfer: Transfer, sources: &[NodeId]) {
        let edge = Edge {
            transfer,
            sources: sources.iter().copied().collect(),
        };
        if let Some(node) = self.nodes.get_mut(id.index()) {
            if !node.inputs.contains(&edge) {
                node.inputs.push(edge);
            }
        }
    }

    /// Mark a node whose construct already failed with a structural error.
    ///
    /// The node solves to `Conflict` without reporting it, so the failure does
    /// not cascade into further diagnostics.
    pub fn poison(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.poisoned = true;
        }
    }

    pub fn add_validator(&mut self, id: NodeId, validator: Validator) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            if !node.validators.contains(&validator) {
                node.validators.push(validator);
            }
        }
    }

    fn fire(&self, edge: &Edge, ctx: &SolveContext<'_>) -> Firing {
        let mut inputs: SmallVec<[&ConcreteType; 4]> = smallvec![];
        let mut pending = false;
        for &source in &edge.sources {
            match self.value(source) {
                InferredType::Conflict => return Firing::Poisoned,
                InferredType::Unknown => pending = true,
                InferredType::Resolved(ty) => inputs.push(ty),
            }
        }
        if pending {
            return Firing::Pending;
        }
        let contribution = edge.transfer.eval(&inputs, ctx.aggs);
        // A projection the source cannot satisfy is reported by the source's
        // `HasField` validator; the result stays silent.
        if matches!(edge.transfer, Transfer::Field(_)) && contribution.is_unknown() {
            return Firing::Poisoned;
        }
        Firing::Fired(contribution)
    }

    /// Recompute a node from its hint and incoming edges.
    ///
    /// The new value is joined into the old one, so it never moves down.
    /// Returns whether the value changed.
    pub fn recompute(&mut self, id: NodeId, ctx: &SolveContext<'_>) -> bool {
        let Some(node) = self.nodes.get(id.index()) else {
            return false;
        };

        let mut local = node.hint.clone();
        let mut candidates: Vec<ConcreteType> = node.hint.as_resolved().cloned().into_iter().collect();
        let mut inherited = node.poisoned;
        for edge in &node.inputs {
            match self.fire(edge, ctx) {
                Firing::Pending => {}
                Firing::Poisoned => inherited = true,
                Firing::Fired(ty) => {
                    if let Some(resolved) = ty.as_resolved() {
                        if !candidates.contains(resolved) {
                            candidates.push(resolved.clone());
                        }
                    }
                    local = local.join(&ty);
                }
            }
        }

        let computed = if inherited { InferredType::Conflict } else { local.clone() };
        let node = &mut self.nodes[id.index()];
        let changed = node.value.join_assign(&computed);
        // The first node to see two disagreeing contributions owns the error.
        if local.is_conflict() && !node.conflict_origin {
            node.conflict_origin = true;
            node.conflict_candidates = candidates;
        }
        changed
    }

    /// Report problems with a solved node; returns whether it is well typed
    pub fn validate_node(&self, id: NodeId, ctx: &SolveContext<'_>, sink: &mut dyn ErrorSink) -> bool {
        let Some(node) = self.nodes.get(id.index()) else {
            return true;
        };
        match &node.value {
            InferredType::Unknown => {
                sink.report(Diagnostic::new(node.loc, TypeErrorKind::Unresolved));
                false
            }
            InferredType::Conflict => {
                if node.conflict_origin {
                    sink.report(Diagnostic::new(
                        node.loc,
                        TypeErrorKind::Conflict {
                            candidates: node.conflict_candidates.clone(),
                        },
                    ));
                }
                false
            }
            InferredType::Resolved(ty) => {
                let mut ok = true;
                for validator in &node.validators {
                    if let Err(kind) = validator.check(ty, ctx) {
                        sink.report(Diagnostic::new(node.loc, kind));
                        ok = false;
                    }
                }
                ok
            }
        }
    }

    /// Copy every node's value into its bound slots
    pub fn write_back(&self, slots: &mut SlotTable) {
        for node in &self.nodes {
            for &slot in &node.slots {
                slots.set(slot, node.value.clone());
            }
        }
    }
}

impl fmt::Display for InferenceGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            write!(f, "{} @{} = {}", NodeId(i as u32), node.loc, node.value)?;
            for edge in &node.inputs {
                let sources: Vec<String> = edge.sources.iter().map(|s| s.to_string()).collect();
                write!(f, " <- {}({})", edge.transfer, sources.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
