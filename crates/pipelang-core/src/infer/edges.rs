//! Edge constructor library
//!
//! One method per typing rule. Constructors only add edges and validators;
//! repeated calls for the same nodes are absorbed by edge deduplication.

use super::node::{InferenceGraph, NodeId, Transfer, Validator};
use crate::agg_types::AggregateResolver;
use crate::ast::TypeExpr;
use crate::diag::TypeErrorKind;
use crate::types::ConcreteType;

impl InferenceGraph {
    /// `to` includes the value of `from` unchanged
    pub fn convey(&mut self, from: NodeId, to: NodeId) {
        if from != to {
            self.add_input(to, Transfer::Convey, &[from]);
        }
    }

    /// `to` includes the fixed type `ty`
    pub fn convey_const(&mut self, to: NodeId, ty: ConcreteType) {
        self.add_input(to, Transfer::Const(ty), &[]);
    }

    /// Convey in both directions, putting `a` and `b` in one class
    pub fn unify(&mut self, a: NodeId, b: NodeId) {
        self.convey(a, b);
        self.convey(b, a);
    }

    /// `sum` is an unsigned bit vector as wide as all `parts` together
    pub fn sum_widths(&mut self, parts: &[NodeId], sum: NodeId) {
        self.add_input(sum, Transfer::SumWidths, parts);
    }

    pub fn ensure_simple(&mut self, id: NodeId) {
        self.add_validator(id, Validator::Simple);
    }

    pub fn ensure_array(&mut self, id: NodeId) {
        self.add_validator(id, Validator::Array);
    }

    pub fn ensure_register(&mut self, id: NodeId) {
        self.add_validator(id, Validator::Register);
    }

    pub fn ensure_port(&mut self, id: NodeId) {
        self.add_validator(id, Validator::Port);
    }

    pub fn ensure_bypass(&mut self, id: NodeId) {
        self.add_validator(id, Validator::Bypass);
    }

    /// `port` carries `value`: each side is derived from the other
    pub fn convey_port(&mut self, port: NodeId, value: NodeId) {
        self.add_input(port, Transfer::WrapPort, &[value]);
        self.add_input(value, Transfer::UnwrapPort, &[port]);
        self.ensure_port(port);
    }

    /// `result` is an element of `array`, selected by `index`
    pub fn convey_array_ref(&mut self, result: NodeId, array: NodeId, index: NodeId) {
        self.add_input(result, Transfer::ArrayElement, &[array]);
        self.ensure_array(array);
        self.ensure_simple(index);
    }

    /// `value` is the content of register `reg`
    pub fn convey_reg_ref(&mut self, value: NodeId, reg: NodeId) {
        self.add_input(reg, Transfer::WrapReg, &[value]);
        self.add_input(value, Transfer::UnwrapReg, &[reg]);
        self.ensure_register(reg);
    }

    /// `value` is the payload of `bypass`
    pub fn convey_bypass(&mut self, bypass: NodeId, value: NodeId) {
        self.add_input(bypass, Transfer::WrapBypass, &[value]);
        self.add_input(value, Transfer::UnwrapBypass, &[bypass]);
        self.ensure_bypass(bypass);
    }

    /// `result` is field `field` of the aggregate `agg`.
    ///
    /// Fails at build time when the field cannot exist: if the aggregate's
    /// type is already known the field must be in its definition, otherwise
    /// some known aggregate must declare it. Nothing is wired on failure.
    ///
    /// The aggregate's type is known at build time when it was declared or
    /// when `agg` is the node of an aggregate literal.
    pub fn convey_field_ref(
        &mut self,
        result: NodeId,
        agg: NodeId,
        field: &str,
        aggs: &dyn AggregateResolver,
    ) -> Result<(), TypeErrorKind> {
        let known = self.node(agg).and_then(|n| n.hint().as_resolved()).cloned();
        if let Some(ConcreteType::Aggregate(name)) = known {
            let def = aggs
                .resolve(&name)
                .ok_or_else(|| TypeErrorKind::UnknownAggregate { name: name.clone() })?;
            if def.field(field).is_none() {
                return Err(TypeErrorKind::MissingField {
                    aggregate: name,
                    field: field.to_string(),
                });
            }
        } else if !aggs.declares_field(field) {
            return Err(TypeErrorKind::UndeclaredField {
                field: field.to_string(),
            });
        }
        // Anything else is left to the validator.

        self.add_input(result, Transfer::Field(field.to_string()), &[agg]);
        self.add_validator(agg, Validator::HasField(field.to_string()));
        Ok(())
    }

    /// `result` is the aggregate `name` built from `fields`, given as
    /// (field name, value node) in source order.
    ///
    /// The literal must name every field of the definition exactly once and
    /// in declaration order. Each value node receives its declared field type
    /// and `result` is hinted with the aggregate, so field references on it
    /// are checked while building.
    pub fn convey_agg_literal(
        &mut self,
        result: NodeId,
        name: &str,
        fields: &[(&str, NodeId)],
        aggs: &dyn AggregateResolver,
    ) -> Result<(), TypeErrorKind> {
        let def = aggs.resolve(name).ok_or_else(|| TypeErrorKind::UnknownAggregate {
            name: name.to_string(),
        })?;

        let matches = def.fields.len() == fields.len()
            && def.fields.iter().zip(fields).all(|(decl, (given, _))| decl.name == *given);
        if !matches {
            return Err(TypeErrorKind::FieldMismatch {
                aggregate: name.to_string(),
                expected: def.field_names().map(str::to_string).collect(),
                found: fields.iter().map(|(given, _)| given.to_string()).collect(),
            });
        }

        let declared: Vec<ConcreteType> = def.fields.iter().map(|f| f.ty.clone()).collect();
        let sources: Vec<NodeId> = fields.iter().map(|&(_, node)| node).collect();
        for (&node, ty) in sources.iter().zip(&declared) {
            self.convey_const(node, ty.clone());
        }
        self.add_hint(result, &ConcreteType::aggregate(name).into());
        self.add_input(
            result,
            Transfer::AggLiteral {
                aggregate: name.to_string(),
                fields: declared,
            },
            &sources,
        );
        Ok(())
    }

    /// `result` is `arg` cast to `target`; the cast itself is checked
    /// against the cast policy once `arg` is resolved
    pub fn handle_cast(
        &mut self,
        result: NodeId,
        arg: NodeId,
        target: &TypeExpr,
        aggs: &dyn AggregateResolver,
    ) -> Result<(), TypeErrorKind> {
        let target = ConcreteType::from_type_expr(target, aggs)?;
        self.convey_const(result, target.clone());
        self.add_validator(arg, Validator::CastTo(target));
        Ok(())
    }
}
