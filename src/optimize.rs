//! Top-level entry point (spec.md §6): lift a [`Snapshot`]'s bytecode to a
//! tree, run it through the grammar engine, recreate sugar forms, emit
//! fresh bytecode with CSE, and sweep the result with the byte-level
//! cleanup pass. Mirrors the teacher's top-level `optimize_bytecode_full`,
//! which runs the same lift/fold/emit/cleanup shape and hands back a
//! stats struct alongside the rewritten bytes.

use tracing::info;

use crate::bytecode::optimizer::{cleanup_bytecode, DceStats, OptimizationStats};
use crate::data::Snapshot;
use crate::emit::{self, EmitConfig};
use crate::grammar;
use crate::lift::{self, LiftError};
use crate::lower;

/// Tunables threaded down into [`emit::emit`]. A thin wrapper rather than
/// exposing `EmitConfig` directly so future pipeline-wide knobs (a grammar
/// iteration cap, say) have somewhere to live without breaking callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizeConfig {
    pub emit: EmitConfig,
}

/// What the pipeline did, for logging/benchmarking call sites.
#[derive(Debug, Clone, Default)]
pub struct OptimizeStats {
    pub original_bytes: usize,
    pub optimized_bytes: usize,
    pub peephole: OptimizationStats,
    pub dce: DceStats,
}

impl OptimizeStats {
    /// Bytes saved, or negative if the rewrite grew the program (rare, but
    /// possible when CSE hoisting adds `Dup`/`Fetch` overhead that the
    /// pattern grammar didn't have a chance to amortize).
    pub fn bytes_saved(&self) -> i64 {
        self.original_bytes as i64 - self.optimized_bytes as i64
    }
}

/// Run the full pipeline over `snapshot.bytecode` in place.
///
/// Fails only if the input bytecode doesn't decode or doesn't lift to a
/// single well-formed expression (spec.md §7: a malformed snapshot is the
/// one input shape this crate doesn't trust). Every later stage trusts the
/// tree completely and cannot itself fail.
pub fn optimize(snapshot: &mut Snapshot, config: &OptimizeConfig) -> Result<OptimizeStats, LiftError> {
    let original_bytes = snapshot.bytecode.code.len();
    let callback_arities = snapshot.callback_arities();

    let (mut tree, root) = lift::lift(&snapshot.bytecode, &callback_arities)?;
    info!(nodes = tree.len(), "lifted bytecode to tree");

    let root = grammar::optimize(&mut tree, root);
    let root = lower::recreate(&mut tree, root);

    let bytecode = emit::emit(&tree, root, &config.emit);
    let (code, peephole, dce) = cleanup_bytecode(bytecode.code);

    let optimized_bytes = code.len();
    snapshot.bytecode.code = code;
    snapshot.bytecode.immed = bytecode.immed;

    info!(original_bytes, optimized_bytes, "optimization pipeline finished");
    Ok(OptimizeStats {
        original_bytes,
        optimized_bytes,
        peephole,
        dce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::chunk::BytecodeBuilder;
    use crate::bytecode::vm;
    use crate::op::Op;

    #[test]
    fn constant_arithmetic_folds_to_a_single_immediate() {
        let mut b = BytecodeBuilder::new();
        b.push_immed(2.0).push_immed(3.0).push_op(Op::Add);
        let bc = b.finish();
        let mut snapshot = Snapshot::new(bc, vec![], vec![]);

        let stats = optimize(&mut snapshot, &OptimizeConfig::default()).unwrap();
        assert_eq!(vm::eval(&snapshot.bytecode, &[], &[]).unwrap(), 5.0);
        assert!(stats.optimized_bytes <= stats.original_bytes);
    }

    #[test]
    fn repeated_multiplication_becomes_a_power_and_evaluates_correctly() {
        // x*x*x*x -> Pow(x, 4), re-emitted via the powi addition chain.
        let mut b = BytecodeBuilder::new();
        b.push_var(0)
            .push_var(0)
            .push_op(Op::Mul)
            .push_var(0)
            .push_op(Op::Mul)
            .push_var(0)
            .push_op(Op::Mul);
        let bc = b.finish();
        let mut snapshot = Snapshot::new(bc, vec!["x".into()], vec![]);

        optimize(&mut snapshot, &OptimizeConfig::default()).unwrap();
        assert_eq!(vm::eval(&snapshot.bytecode, &[3.0], &[]).unwrap(), 81.0);
    }

    #[test]
    fn malformed_bytecode_is_rejected_before_any_rewrite() {
        let mut bc = crate::bytecode::chunk::Bytecode::default();
        bc.code = vec![0xFF];
        let mut snapshot = Snapshot::new(bc, vec![], vec![]);
        assert!(optimize(&mut snapshot, &OptimizeConfig::default()).is_err());
    }
}
