//! Three-valued type lattice for inference
//!
//! Implements a flat lattice over concrete types where:
//! - Bottom (⊥) = `Unknown`, nothing is known yet
//! - Top (⊤) = `Conflict`, incompatible types were forced together
//! - Every concrete type is its own middle element; two distinct ones join to ⊤
//!
//! The lattice has height 2, so a value can move up at most twice.

use crate::types::ConcreteType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A type in the lattice
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferredType {
    /// Bottom element - no constraint has resolved this position yet
    #[default]
    Unknown,
    /// A concrete type
    Resolved(ConcreteType),
    /// Top element - incompatible types were unified
    Conflict,
}

impl InferredType {
    /// Join operation (least upper bound)
    pub fn join(&self, other: &InferredType) -> InferredType {
        match (self, other) {
            // Bottom is identity for join
            (InferredType::Unknown, t) | (t, InferredType::Unknown) => t.clone(),
            // Top absorbs everything
            (InferredType::Conflict, _) | (_, InferredType::Conflict) => InferredType::Conflict,
            (InferredType::Resolved(a), InferredType::Resolved(b)) => {
                if a == b {
                    InferredType::Resolved(a.clone())
                } else {
                    InferredType::Conflict
                }
            }
        }
    }

    /// Join `other` into `self`, returning whether `self` changed
    pub fn join_assign(&mut self, other: &InferredType) -> bool {
        let joined = self.join(other);
        if joined == *self {
            false
        } else {
            *self = joined;
            true
        }
    }

    /// Lattice order: `self ⊑ other`
    pub fn is_below(&self, other: &InferredType) -> bool {
        match (self, other) {
            (InferredType::Unknown, _) | (_, InferredType::Conflict) => true,
            (InferredType::Resolved(a), InferredType::Resolved(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, InferredType::Unknown)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, InferredType::Resolved(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, InferredType::Conflict)
    }

    pub fn as_resolved(&self) -> Option<&ConcreteType> {
        match self {
            InferredType::Resolved(ty) => Some(ty),
            _ => None,
        }
    }

    /// Distance from bottom: 0, 1 or 2
    pub fn height(&self) -> u8 {
        match self {
            InferredType::Unknown => 0,
            InferredType::Resolved(_) => 1,
            InferredType::Conflict => 2,
        }
    }
}

impl From<ConcreteType> for InferredType {
    fn from(ty: ConcreteType) -> Self {
        InferredType::Resolved(ty)
    }
}

impl<'a> FromIterator<&'a InferredType> for InferredType {
    fn from_iter<I: IntoIterator<Item = &'a InferredType>>(iter: I) -> Self {
        iter.into_iter()
            .fold(InferredType::Unknown, |acc, ty| acc.join(ty))
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferredType::Unknown => f.write_str("?"),
            InferredType::Resolved(ty) => write!(f, "{ty}"),
            InferredType::Conflict => f.write_str("<conflict>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    fn u(width: u32) -> InferredType {
        InferredType::Resolved(ConcreteType::bits(width))
    }

    /// Small domain so that equal resolved values show up often
    #[derive(Debug, Clone)]
    struct Sample(InferredType);

    impl Arbitrary for Sample {
        fn arbitrary(g: &mut Gen) -> Self {
            let ty = match u8::arbitrary(g) % 6 {
                0 => InferredType::Unknown,
                1 => InferredType::Conflict,
                2 => u(8),
                3 => u(16),
                4 => InferredType::Resolved(ConcreteType::port(ConcreteType::bits(8))),
                _ => InferredType::Resolved(ConcreteType::aggregate("Pair")),
            };
            Sample(ty)
        }
    }

    #[test]
    fn test_lattice_join_bottom() {
        assert_eq!(InferredType::Unknown.join(&u(8)), u(8));
        assert_eq!(u(8).join(&InferredType::Unknown), u(8));
    }

    #[test]
    fn test_lattice_join_top() {
        assert_eq!(InferredType::Conflict.join(&u(8)), InferredType::Conflict);
        assert_eq!(u(8).join(&InferredType::Conflict), InferredType::Conflict);
    }

    #[test]
    fn test_lattice_join_same_type() {
        assert_eq!(u(8).join(&u(8)), u(8));
    }

    #[test]
    fn test_lattice_join_incompatible() {
        assert_eq!(u(8).join(&u(16)), InferredType::Conflict);
        let signed = InferredType::Resolved(ConcreteType::signed(8));
        assert_eq!(u(8).join(&signed), InferredType::Conflict);
    }

    #[test]
    fn test_join_assign_reports_change() {
        let mut ty = InferredType::Unknown;
        assert!(ty.join_assign(&u(4)));
        assert!(!ty.join_assign(&u(4)));
        assert!(!ty.join_assign(&InferredType::Unknown));
        assert!(ty.join_assign(&u(5)));
        assert_eq!(ty, InferredType::Conflict);
    }

    #[test]
    fn test_join_of_iterator() {
        let all = [InferredType::Unknown, u(8), u(8)];
        assert_eq!(all.iter().collect::<InferredType>(), u(8));
        let none: [InferredType; 0] = [];
        assert_eq!(none.iter().collect::<InferredType>(), InferredType::Unknown);
    }

    #[quickcheck]
    fn prop_join_commutative(a: Sample, b: Sample) -> bool {
        a.0.join(&b.0) == b.0.join(&a.0)
    }

    #[quickcheck]
    fn prop_join_associative(a: Sample, b: Sample, c: Sample) -> bool {
        a.0.join(&b.0).join(&c.0) == a.0.join(&b.0.join(&c.0))
    }

    #[quickcheck]
    fn prop_join_idempotent(a: Sample) -> bool {
        a.0.join(&a.0) == a.0
    }

    #[quickcheck]
    fn prop_join_is_upper_bound(a: Sample, b: Sample) -> bool {
        let j = a.0.join(&b.0);
        a.0.is_below(&j) && b.0.is_below(&j)
    }

    #[quickcheck]
    fn prop_conflict_absorbs(a: Sample) -> bool {
        a.0.join(&InferredType::Conflict) == InferredType::Conflict
    }
}
