//! Types and statistics for the byte-level bytecode cleanup pass.

use crate::op::Op;

/// Result of a peephole scan at a given position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeepholeAction {
    /// Keep the instruction unchanged.
    Keep,
    /// Remove bytes `[start, end)`.
    Remove { start: usize, end: usize },
    /// Replace bytes `[start, end)` with a single zero-operand opcode.
    ReplaceWithOpcode { start: usize, end: usize, op: Op },
}

/// Statistics about peephole optimizations performed.
#[derive(Debug, Clone, Default)]
pub struct OptimizationStats {
    /// `Neg; Neg` pairs removed (double negation is identity).
    pub neg_neg_removed: usize,
    /// `Not; Not` pairs removed (double negation of a boolean).
    pub not_not_removed: usize,
    /// `Inv; Inv` pairs removed (double reciprocal is identity).
    pub inv_inv_removed: usize,
    /// Jumps redirected to point straight at their final target.
    pub jump_threaded: usize,
    /// Total bytes removed across all patterns.
    pub bytes_removed: usize,
}

impl OptimizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_optimizations(&self) -> usize {
        self.neg_neg_removed + self.not_not_removed + self.inv_inv_removed + self.jump_threaded
    }
}

/// Statistics for dead-code elimination.
#[derive(Debug, Clone, Default)]
pub struct DceStats {
    /// Bytes of unreachable instructions removed.
    pub bytes_removed: usize,
    /// Instruction offsets visited while computing reachability.
    pub offsets_scanned: usize,
    /// Offsets found reachable.
    pub offsets_reachable: usize,
}

impl DceStats {
    pub fn new() -> Self {
        Self::default()
    }
}
