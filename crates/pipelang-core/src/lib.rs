//! # Pipelang Core
//!
//! Frontend type inference for the pipelang hardware-pipeline description
//! language.
//!
//! The inference pass walks a fully inlined AST, builds a constraint graph whose
//! nodes are unification classes of type slots and whose edges carry transfer
//! functions (plain conveyance, sum-of-widths, port/register/bypass
//! wrapping, field projection, aggregate literals, casts), solves the graph to
//! a fixpoint over a three-valued lattice and writes the resolved types back
//! into the AST.
//!
//! ## Modules
//!
//! - **[`ast`]** - Tagged-union AST, slot table and the post-order walker
//! - **[`types`]** - Concrete types and type-expression resolution
//! - **[`agg_types`]** - Aggregate (record) definitions and the resolver oracle
//! - **[`diag`]** - Located diagnostics and the error sink
//! - **[`config`]** - Pass options
//! - **[`infer`]** - Lattice, inference graph, edge library, builder and solver
//!
//! ## Quick Start
//!
//! ```rust
//! use pipelang_core::ast::ProgramBuilder;
//! use pipelang_core::agg_types::AggregateTable;
//! use pipelang_core::infer::infer_program;
//! use pipelang_core::types::ConcreteType;
//!
//! let mut b = ProgramBuilder::new();
//! let five = b.lit(5, Some(8));
//! let a = b.let_("a", None, five);
//! let use_a = b.var("a", a);
//! let bb = b.let_("b", None, use_a);
//! let mut program = b.finish();
//!
//! let report = infer_program(&mut program, &AggregateTable::new());
//! assert!(report.is_ok());
//! assert_eq!(program.slots.resolved(bb), Some(&ConcreteType::bits(8)));
//! ```

pub mod agg_types;
pub mod ast;
pub mod config;
pub mod diag;
pub mod infer;
pub mod types;

pub use agg_types::{AggregateDef, AggregateResolver, AggregateTable, FieldDef};
pub use config::InferOptions;
pub use diag::{Diagnostic, Diagnostics, ErrorSink, TypeErrorKind};
pub use infer::{infer_program, InferError, InferReport, InferStats, InferredType, TypeInferPass};
pub use types::ConcreteType;
