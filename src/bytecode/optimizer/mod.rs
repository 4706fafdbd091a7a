//! Byte-level cleanup applied after [`crate::emit`] has produced a
//! bytecode stream.
//!
//! This is a deliberately minor complement to the symbolic optimizer
//! (`crate::optimize`), not a replacement for it — see the module
//! doc comments on `peephole` and `dce` for exactly what it catches
//! and why there is so little left for it to do by the time bytecode
//! reaches here.

mod dce;
mod helpers;
mod peephole;
mod types;


pub use dce::{eliminate_dead_code, DeadCodeEliminator};
pub use peephole::{optimize_bytecode, PeepholeOptimizer};
pub use types::{DceStats, OptimizationStats, PeepholeAction};

pub(crate) use helpers::instruction_size;

/// Peephole cleanup followed by dead-code elimination.
pub fn cleanup_bytecode(code: Vec<u8>) -> (Vec<u8>, OptimizationStats, DceStats) {
    let mut peephole = PeepholeOptimizer::new();
    let code = peephole.optimize(code);
    let peephole_stats = peephole.stats().clone();

    let mut dce = DeadCodeEliminator::new();
    let code = dce.eliminate(code);
    let dce_stats = dce.stats().clone();

    (code, peephole_stats, dce_stats)
}
