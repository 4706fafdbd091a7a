//! A symbolic optimizer for stack-machine expression bytecode.
//!
//! Lifts a linear bytecode program back into a canonical expression tree,
//! folds constants, narrows value ranges, regroups additive/multiplicative
//! terms, rewrites via compiled pattern grammars, decomposes integer
//! exponents into addition chains, and re-emits a deduplicated bytecode
//! stream. The surrounding text parser and stack evaluator that would
//! produce and run that bytecode are out of scope for this crate — see
//! [`bytecode::vm`] for the minimal evaluator kept around to test semantic
//! preservation end to end.
//!
//! # Pipeline
//!
//! ```text
//! Snapshot.bytecode -> lift -> Tree -> grammar::optimize -> lower::recreate -> emit -> bytecode::optimizer
//! ```
//!
//! [`optimize::optimize`] drives the whole thing; the individual stages
//! are public so callers that already have a [`tree::Tree`] (say, a
//! from-scratch builder rather than a bytecode snapshot) can skip the
//! lift step.
//!
//! # Example
//!
//! ```
//! use exprfold::bytecode::chunk::BytecodeBuilder;
//! use exprfold::bytecode::vm;
//! use exprfold::data::Snapshot;
//! use exprfold::op::Op;
//! use exprfold::optimize::{optimize, OptimizeConfig};
//!
//! // x*x*x*x, the way a naive front end would emit it.
//! let mut b = BytecodeBuilder::new();
//! b.push_var(0).push_var(0).push_op(Op::Mul)
//!     .push_var(0).push_op(Op::Mul)
//!     .push_var(0).push_op(Op::Mul);
//! let mut snapshot = Snapshot::new(b.finish(), vec!["x".into()], vec![]);
//!
//! optimize(&mut snapshot, &OptimizeConfig::default()).unwrap();
//! assert_eq!(vm::eval(&snapshot.bytecode, &[3.0], &[]).unwrap(), 81.0);
//! ```

pub mod bytecode;
pub mod data;
pub mod emit;
pub mod grammar;
pub mod lift;
pub mod lower;
pub mod op;
pub mod optimize;
pub mod tree;

pub use data::{CallbackDescriptor, CallbackKind, Snapshot};
pub use lift::{lift, LiftError};
pub use op::Op;
pub use optimize::{optimize, OptimizeConfig, OptimizeStats};
