//! Peephole cleanup for emitted bytecode.
//!
//! The symbolic optimizer (`crate::optimize`) never leaves these patterns
//! behind on its own — they exist only as a safety net for the mechanical
//! edges of emission (the `If`-lowering placeholder-jump patchup in
//! particular can chain a jump into another jump, and the
//! inversion/negation recreator can occasionally introduce back-to-back
//! `Neg`/`Not`/`Inv` when two independent rewrites both reach for the
//! same residual form). This pass is therefore deliberately small.
//!
//! # Patterns
//!
//! | Pattern | Replacement | Rationale |
//! |---------|-------------|-----------|
//! | `Neg; Neg` | (remove) | Double negation is identity |
//! | `Not; Not` | (remove) | Double negation of a boolean is identity |
//! | `Inv; Inv` | (remove) | Double reciprocal is identity |
//! | `Jump L1` where `L1` is itself `Jump L2` | `Jump L2` | Thread the chain |

use crate::op::Op;
use tracing::debug;

use super::helpers::instruction_size;
use super::types::OptimizationStats;

/// Peephole optimizer over a raw bytecode stream.
pub struct PeepholeOptimizer {
    stats: OptimizationStats,
}

impl Default for PeepholeOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PeepholeOptimizer {
    pub fn new() -> Self {
        Self {
            stats: OptimizationStats::new(),
        }
    }

    pub fn stats(&self) -> &OptimizationStats {
        &self.stats
    }

    /// Run the cleanup to a fixed point, then thread jump chains once.
    pub fn optimize(&mut self, code: Vec<u8>) -> Vec<u8> {
        let mut result = code;
        loop {
            let (optimized, changed) = self.remove_double_unary(&result);
            if !changed {
                result = optimized;
                break;
            }
            result = optimized;
        }
        self.thread_jumps(result)
    }

    /// Single pass removing adjacent self-cancelling unary pairs. Jump
    /// targets are absolute byte offsets in this crate's bytecode format,
    /// so splicing out a span shifts every later instruction; any
    /// surviving `Jump`/`JumpIfZero` whose target sits at or after a
    /// removed pair must be remapped, the same two-pass discipline
    /// `dce::eliminate` uses (build an old-offset-to-new-offset map over
    /// the surviving instructions first, then copy and remap operands).
    fn remove_double_unary(&mut self, code: &[u8]) -> (Vec<u8>, bool) {
        let removed_spans = self.find_cancelling_pairs(code);
        if removed_spans.is_empty() {
            return (code.to_vec(), false);
        }

        let old_to_new = offset_map_skipping(code, &removed_spans);
        let mut result = Vec::with_capacity(code.len());
        let mut offset = 0;
        let mut spans = removed_spans.iter().peekable();

        while offset < code.len() {
            if let Some(&&(start, end)) = spans.peek() {
                if offset == start {
                    offset = end;
                    spans.next();
                    continue;
                }
            }
            let size = instruction_size(code, offset);
            let start_out = result.len();
            result.extend_from_slice(&code[offset..offset + size]);
            if let Some(op) = Op::from_byte(code[offset]) {
                if matches!(op, Op::Jump | Op::JumpIfZero) {
                    let old_target = u32::from_le_bytes([
                        code[offset + 1],
                        code[offset + 2],
                        code[offset + 3],
                        code[offset + 4],
                    ]) as usize;
                    let new_target = *old_to_new
                        .get(&old_target)
                        .expect("a live jump never targets the interior of a cancelling pair");
                    result[start_out + 1..start_out + 5].copy_from_slice(&new_target.to_le_bytes());
                }
            }
            offset += size;
        }

        (result, true)
    }

    /// Scan left to right and collect the byte ranges of adjacent
    /// self-cancelling `Neg`/`Not`/`Inv` pairs, recording stats as it goes.
    /// Does not itself look past a removed pair for a newly-adjacent one
    /// spanning the gap — `optimize` re-runs this to a fixed point for that.
    fn find_cancelling_pairs(&mut self, code: &[u8]) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut offset = 0;

        while offset < code.len() {
            let size = instruction_size(code, offset);
            let next_offset = offset + size;
            let op = Op::from_byte(code[offset]);

            if let Some(op) = op {
                let cancels = matches!(op, Op::Neg | Op::Not | Op::Inv);
                if cancels && next_offset < code.len() && code[next_offset] == code[offset] {
                    match op {
                        Op::Neg => self.stats.neg_neg_removed += 1,
                        Op::Not => self.stats.not_not_removed += 1,
                        Op::Inv => self.stats.inv_inv_removed += 1,
                        _ => unreachable!(),
                    }
                    let pair_end = next_offset + instruction_size(code, next_offset);
                    self.stats.bytes_removed += pair_end - offset;
                    debug!(?op, offset, "peephole: removed self-cancelling pair");
                    spans.push((offset, pair_end));
                    offset = pair_end;
                    continue;
                }
            }

            offset = next_offset;
        }

        spans
    }

    /// Redirect `Jump L1` to `Jump L2` when `L1` is itself an
    /// unconditional jump to `L2`, bounded to avoid chasing a cycle.
    fn thread_jumps(&mut self, mut code: Vec<u8>) -> Vec<u8> {
        const MAX_HOPS: usize = 16;
        let mut offset = 0;
        while offset < code.len() {
            let Some(op) = Op::from_byte(code[offset]) else {
                offset += 1;
                continue;
            };
            if op == Op::Jump {
                let mut target = read_u32(&code, offset + 1);
                let mut hops = 0;
                let mut final_target = target;
                while hops < MAX_HOPS {
                    if (target as usize) + 5 > code.len()
                        || Op::from_byte(code[target as usize]) != Some(Op::Jump)
                    {
                        break;
                    }
                    let next = read_u32(&code, target as usize + 1);
                    if next == target as u32 {
                        break; // self-loop, stop chasing
                    }
                    final_target = next;
                    target = next;
                    hops += 1;
                }
                if final_target != read_u32(&code, offset + 1) {
                    write_u32(&mut code, offset + 1, final_target);
                    self.stats.jump_threaded += 1;
                    debug!(offset, final_target, "peephole: threaded jump chain");
                }
            }
            offset += instruction_size(&code, offset);
        }
        code
    }
}

/// Map every surviving instruction's old offset to its post-splice offset,
/// given the (sorted, non-overlapping) byte ranges being removed.
fn offset_map_skipping(code: &[u8], removed_spans: &[(usize, usize)]) -> std::collections::HashMap<usize, u32> {
    let mut map = std::collections::HashMap::new();
    let mut offset = 0;
    let mut new_offset = 0u32;
    let mut spans = removed_spans.iter().peekable();

    while offset < code.len() {
        if let Some(&&(start, end)) = spans.peek() {
            if offset == start {
                offset = end;
                spans.next();
                continue;
            }
        }
        let size = instruction_size(code, offset);
        map.insert(offset, new_offset);
        new_offset += size as u32;
        offset += size;
    }

    map
}

fn read_u32(code: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

fn write_u32(code: &mut [u8], at: usize, value: u32) {
    code[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Convenience wrapper: run the peephole pass once and return its stats.
pub fn optimize_bytecode(code: Vec<u8>) -> (Vec<u8>, OptimizationStats) {
    let mut opt = PeepholeOptimizer::new();
    let result = opt.optimize(code);
    (result, opt.stats().clone())
}
