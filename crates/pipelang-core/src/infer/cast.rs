//! Cast legality policies
//!
//! Which conversions a cast may perform is language policy, not inference
//! logic. The solver asks a [`CastPolicy`] once the argument's type is known.

use crate::agg_types::AggregateResolver;
use crate::types::ConcreteType;
use serde::{Deserialize, Serialize};

pub trait CastPolicy {
    /// Whether a value of type `from` may be cast to `to`
    fn allows(&self, from: &ConcreteType, to: &ConcreteType, aggs: &dyn AggregateResolver) -> bool;
}

/// Built-in cast rule sets, selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CastRules {
    /// Scalars convert freely (narrowing, widening, sign change); aggregates
    /// reinterpret to and from anything of the same flat width
    #[default]
    Permissive,
    /// Only conversions that keep the flat width
    WidthPreserving,
}

impl CastPolicy for CastRules {
    fn allows(&self, from: &ConcreteType, to: &ConcreteType, aggs: &dyn AggregateResolver) -> bool {
        if from == to {
            return true;
        }
        // Ports, registers, bypasses and arrays are never reinterpreted.
        if !from.is_simple() || !to.is_simple() {
            return false;
        }

        let same_width = match (from.flat_width(aggs), to.flat_width(aggs)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };

        match self {
            CastRules::Permissive => match (from, to) {
                (ConcreteType::Bits { .. }, ConcreteType::Bits { .. }) => true,
                _ => same_width,
            },
            CastRules::WidthPreserving => same_width,
        }
    }
}
