//! Concrete types for pipelang values
//!
//! A [`ConcreteType`] is what an inference node settles on. Scalars are plain
//! bit vectors; the pipeline constructs (ports, registers, bypasses) wrap an
//! underlying value type; aggregates are referenced by name and resolved
//! through an [`AggregateResolver`].

use crate::agg_types::AggregateResolver;
use crate::ast::TypeExpr;
use crate::diag::TypeErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully resolved type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcreteType {
    /// Scalar bit vector
    Bits { width: u32, signed: bool },
    /// Fixed-size array of elements
    Array { elem: Box<ConcreteType>, size: u32 },
    /// I/O port carrying values of the inner type
    Port(Box<ConcreteType>),
    /// Stateful register holding the inner type
    Reg(Box<ConcreteType>),
    /// Speculative-forwarding bypass carrying the inner type
    Bypass(Box<ConcreteType>),
    /// Named aggregate (record) type
    Aggregate(String),
}

impl ConcreteType {
    /// Unsigned bit vector of the given width
    pub fn bits(width: u32) -> Self {
        ConcreteType::Bits { width, signed: false }
    }

    /// Signed bit vector of the given width
    pub fn signed(width: u32) -> Self {
        ConcreteType::Bits { width, signed: true }
    }

    pub fn array(elem: ConcreteType, size: u32) -> Self {
        ConcreteType::Array {
            elem: Box::new(elem),
            size,
        }
    }

    pub fn port(inner: ConcreteType) -> Self {
        ConcreteType::Port(Box::new(inner))
    }

    pub fn reg(inner: ConcreteType) -> Self {
        ConcreteType::Reg(Box::new(inner))
    }

    pub fn bypass(inner: ConcreteType) -> Self {
        ConcreteType::Bypass(Box::new(inner))
    }

    pub fn aggregate(name: impl Into<String>) -> Self {
        ConcreteType::Aggregate(name.into())
    }

    /// Simple types can be used as plain values: scalars and aggregates
    /// (aggregates behave like wide concatenated words).
    pub fn is_simple(&self) -> bool {
        matches!(self, ConcreteType::Bits { .. } | ConcreteType::Aggregate(_))
    }

    pub fn element(&self) -> Option<&ConcreteType> {
        match self {
            ConcreteType::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    pub fn port_payload(&self) -> Option<&ConcreteType> {
        match self {
            ConcreteType::Port(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn reg_payload(&self) -> Option<&ConcreteType> {
        match self {
            ConcreteType::Reg(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn bypass_payload(&self) -> Option<&ConcreteType> {
        match self {
            ConcreteType::Bypass(inner) => Some(inner),
            _ => None,
        }
    }

    /// Width of the value when flattened into a bit vector.
    ///
    /// Defined for scalars and for aggregates whose fields all have a flat
    /// width. Returns `None` for ports, registers, bypasses, arrays, unknown
    /// aggregates and self-referential aggregate definitions.
    pub fn flat_width(&self, aggs: &dyn AggregateResolver) -> Option<u32> {
        let mut visiting = Vec::new();
        self.flat_width_inner(aggs, &mut visiting)
    }

    fn flat_width_inner<'t>(&'t self, aggs: &'t dyn AggregateResolver, visiting: &mut Vec<&'t str>) -> Option<u32> {
        match self {
            ConcreteType::Bits { width, .. } => Some(*width),
            ConcreteType::Aggregate(name) => {
                if visiting.contains(&name.as_str()) {
                    return None;
                }
                let def = aggs.resolve(name)?;
                visiting.push(name);
                let mut total: u32 = 0;
                for field in &def.fields {
                    total = total.checked_add(field.ty.flat_width_inner(aggs, visiting)?)?;
                }
                visiting.pop();
                Some(total)
            }
            _ => None,
        }
    }

    /// Resolve a syntactic type against the known aggregate definitions.
    pub fn from_type_expr(ty: &TypeExpr, aggs: &dyn AggregateResolver) -> Result<Self, TypeErrorKind> {
        match ty {
            TypeExpr::Bits { width: 0, .. } => Err(TypeErrorKind::InvalidType {
                ty: ty.to_string(),
                reason: "zero-width values are not allowed".to_string(),
            }),
            TypeExpr::Bits { width, signed } => Ok(ConcreteType::Bits {
                width: *width,
                signed: *signed,
            }),
            TypeExpr::Named(name) => {
                if aggs.resolve(name).is_some() {
                    Ok(ConcreteType::Aggregate(name.clone()))
                } else {
                    Err(TypeErrorKind::UnknownAggregate { name: name.clone() })
                }
            }
            TypeExpr::Array(_, 0) => Err(TypeErrorKind::InvalidType {
                ty: ty.to_string(),
                reason: "arrays must have at least one element".to_string(),
            }),
            TypeExpr::Array(elem, size) => Ok(ConcreteType::array(Self::from_type_expr(elem, aggs)?, *size)),
            TypeExpr::Port(inner) => Ok(ConcreteType::port(Self::from_type_expr(inner, aggs)?)),
            TypeExpr::Reg(inner) => Ok(ConcreteType::reg(Self::from_type_expr(inner, aggs)?)),
            TypeExpr::Bypass(inner) => Ok(ConcreteType::bypass(Self::from_type_expr(inner, aggs)?)),
        }
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteType::Bits { width, signed: false } => write!(f, "u{width}"),
            ConcreteType::Bits { width, signed: true } => write!(f, "s{width}"),
            ConcreteType::Array { elem, size } => write!(f, "{elem}[{size}]"),
            ConcreteType::Port(inner) => write!(f, "port {inner}"),
            ConcreteType::Reg(inner) => write!(f, "reg {inner}"),
            ConcreteType::Bypass(inner) => write!(f, "bypass {inner}"),
            ConcreteType::Aggregate(name) => f.write_str(name),
        }
    }
}
