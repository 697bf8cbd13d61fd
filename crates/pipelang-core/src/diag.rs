//! Located type errors and the error sink
//!
//! Every problem found by the inference pass is reported as a [`Diagnostic`]
//! (a source span plus a [`TypeErrorKind`]) through an [`ErrorSink`]. The sink
//! only accumulates; it never stops the pass, so a single run reports every
//! type error it can find.

use crate::ast::Span;
use crate::types::ConcreteType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broad classes of type errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Slots in one unification class were forced to incompatible types
    Conflict,
    /// A unification class never received a type
    Unresolved,
    /// A validator rejected an otherwise resolved type
    InvalidConstruct,
    /// Graph construction could not express a construct as constraints
    Structural,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TypeErrorKind {
    #[error("could not unify types{}", candidate_list(.candidates))]
    Conflict { candidates: Vec<ConcreteType> },

    #[error("unable to infer type")]
    Unresolved,

    #[error("expected a simple value (scalar or aggregate), found `{found}`")]
    NotSimple { found: ConcreteType },

    #[error("expected an array, found `{found}`")]
    NotArray { found: ConcreteType },

    #[error("expected a register of a simple value, found `{found}`")]
    NotRegister { found: ConcreteType },

    #[error("expected a port of a simple value, found `{found}`")]
    NotPort { found: ConcreteType },

    #[error("expected a bypass of a simple value, found `{found}`")]
    NotBypass { found: ConcreteType },

    #[error("cannot cast `{from}` to `{to}`")]
    IllegalCast { from: ConcreteType, to: ConcreteType },

    #[error("aggregate type `{aggregate}` has no field `{field}`")]
    NoSuchField { aggregate: String, field: String },

    #[error("field reference `.{field}` on non-aggregate type `{found}`")]
    NotAggregate { found: ConcreteType, field: String },

    #[error("unknown aggregate type `{name}`")]
    UnknownAggregate { name: String },

    #[error("aggregate type `{aggregate}` does not declare field `{field}`")]
    MissingField { aggregate: String, field: String },

    #[error("no aggregate type declares field `{field}`")]
    UndeclaredField { field: String },

    #[error(
        "aggregate literal of `{aggregate}` must list fields `{}` in declaration order, found `{}`",
        .expected.join(", "),
        .found.join(", ")
    )]
    FieldMismatch {
        aggregate: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid type `{ty}`: {reason}")]
    InvalidType { ty: String, reason: String },

    #[error("bit slice [{hi}:{lo}] has its high bit below its low bit")]
    BadBitSlice { hi: u32, lo: u32 },

    #[error("aggregate type `{name}` is defined more than once")]
    DuplicateAggregate { name: String },

    #[error("aggregate type `{aggregate}` declares field `{field}` more than once")]
    DuplicateField { aggregate: String, field: String },
}

fn candidate_list(candidates: &[ConcreteType]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    let names: Vec<String> = candidates.iter().map(|c| format!("`{c}`")).collect();
    format!(" ({})", names.join(" vs "))
}

impl TypeErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TypeErrorKind::Conflict { .. } => ErrorCategory::Conflict,
            TypeErrorKind::Unresolved => ErrorCategory::Unresolved,
            TypeErrorKind::NotSimple { .. }
            | TypeErrorKind::NotArray { .. }
            | TypeErrorKind::NotRegister { .. }
            | TypeErrorKind::NotPort { .. }
            | TypeErrorKind::NotBypass { .. }
            | TypeErrorKind::IllegalCast { .. }
            | TypeErrorKind::NoSuchField { .. }
            | TypeErrorKind::NotAggregate { .. } => ErrorCategory::InvalidConstruct,
            TypeErrorKind::UnknownAggregate { .. }
            | TypeErrorKind::MissingField { .. }
            | TypeErrorKind::UndeclaredField { .. }
            | TypeErrorKind::FieldMismatch { .. }
            | TypeErrorKind::InvalidType { .. }
            | TypeErrorKind::BadBitSlice { .. }
            | TypeErrorKind::DuplicateAggregate { .. }
            | TypeErrorKind::DuplicateField { .. } => ErrorCategory::Structural,
        }
    }
}

/// A type error at a source location
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{span}: error: {kind}")]
pub struct Diagnostic {
    pub span: Span,
    pub kind: TypeErrorKind,
}

impl Diagnostic {
    pub fn new(span: Span, kind: TypeErrorKind) -> Self {
        Self { span, kind }
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

/// Destination for diagnostics produced by the pass
pub trait ErrorSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl ErrorSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Accumulating error sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn count(&self, category: ErrorCategory) -> usize {
        self.items.iter().filter(|d| d.category() == category).count()
    }

    pub fn of_category(&self, category: ErrorCategory) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.category() == category)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl ErrorSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.items {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_lists_candidates() {
        let kind = TypeErrorKind::Conflict {
            candidates: vec![ConcreteType::bits(8), ConcreteType::bits(16)],
        };
        assert_eq!(kind.to_string(), "could not unify types (`u8` vs `u16`)");

        let bare = TypeErrorKind::Conflict { candidates: vec![] };
        assert_eq!(bare.to_string(), "could not unify types");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::new(Span::new(3, 9), TypeErrorKind::Unresolved);
        assert_eq!(diag.to_string(), "3:9: error: unable to infer type");
    }

    #[test]
    fn test_categories() {
        assert_eq!(TypeErrorKind::Unresolved.category(), ErrorCategory::Unresolved);
        assert_eq!(
            TypeErrorKind::UndeclaredField { field: "f".into() }.category(),
            ErrorCategory::Structural
        );
        assert_eq!(
            TypeErrorKind::NotSimple {
                found: ConcreteType::port(ConcreteType::bits(1))
            }
            .category(),
            ErrorCategory::InvalidConstruct
        );
    }

    #[test]
    fn test_sink_accumulates() {
        let mut sink = Diagnostics::new();
        sink.report(Diagnostic::new(Span::new(1, 1), TypeErrorKind::Unresolved));
        sink.report(Diagnostic::new(
            Span::new(2, 1),
            TypeErrorKind::Conflict { candidates: vec![] },
        ));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.count(ErrorCategory::Conflict), 1);
        assert_eq!(
            sink.to_string(),
            "1:1: error: unable to infer type\n2:1: error: could not unify types\n"
        );
    }
}
