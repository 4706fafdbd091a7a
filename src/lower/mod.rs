//! Pre-emission lowering: inversion/negation recreation (spec.md §4.6)
//! and the powi/integer-multiply sequence assembler (spec.md §4.7).

pub mod recreate;
pub mod sequence;

pub use recreate::recreate;
pub use sequence::{assemble, SeqStep, SequenceKind};
