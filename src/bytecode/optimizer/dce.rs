//! Dead-code elimination for the emitted bytecode stream.
//!
//! Walks the instruction graph from offset 0, following `Jump` (single
//! successor: its target) and `JumpIfZero` (two successors: fallthrough
//! and target), and deletes any instruction never reached. In practice
//! this only fires on bytecode assembled by hand or produced by an
//! upstream compiler pass that left a branch unreachable after its own
//! constant folding — the symbolic optimizer's own `If` folding
//! (spec.md §4.2) already drops a statically-known branch before this
//! stage ever sees it, so on optimizer output this pass is usually a
//! no-op; it stays as a final sweep the way the teacher's DCE pass runs
//! unconditionally after peephole regardless of how much peephole found.

use std::collections::{HashSet, VecDeque};

use crate::op::Op;

use super::helpers::instruction_size;
use super::types::DceStats;

pub struct DeadCodeEliminator {
    stats: DceStats,
}

impl Default for DeadCodeEliminator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadCodeEliminator {
    pub fn new() -> Self {
        Self {
            stats: DceStats::new(),
        }
    }

    pub fn stats(&self) -> &DceStats {
        &self.stats
    }

    pub fn eliminate(&mut self, code: Vec<u8>) -> Vec<u8> {
        if code.is_empty() {
            return code;
        }

        let reachable = self.reachable_offsets(&code);
        self.stats.offsets_scanned = reachable.len().max(1);
        self.stats.offsets_reachable = reachable.len();

        // Removing a dead span shifts every surviving instruction after
        // it, so a live `Jump`/`JumpIfZero` whose target sits past that
        // span would otherwise keep pointing at the old, now-wrong byte
        // offset. Map old offsets to their post-compaction position
        // first, then rewrite operands as they're copied.
        let mut old_to_new = std::collections::HashMap::new();
        let mut offset = 0;
        let mut new_offset = 0u32;
        while offset < code.len() {
            let size = instruction_size(&code, offset);
            if reachable.contains(&offset) {
                old_to_new.insert(offset, new_offset);
                new_offset += size as u32;
            }
            offset += size;
        }

        let mut result = Vec::with_capacity(code.len());
        let mut offset = 0;
        let mut removed = 0;
        while offset < code.len() {
            let size = instruction_size(&code, offset);
            if reachable.contains(&offset) {
                let start = result.len();
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
                            .expect("a live jump's target is always reachable");
                        result[start + 1..start + 5].copy_from_slice(&new_target.to_le_bytes());
                    }
                }
            } else {
                removed += size;
            }
            offset += size;
        }
        self.stats.bytes_removed = removed;
        result
    }

    fn reachable_offsets(&self, code: &[u8]) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(0usize);

        while let Some(offset) = queue.pop_front() {
            if offset >= code.len() || !seen.insert(offset) {
                continue;
            }
            let Some(op) = Op::from_byte(code[offset]) else {
                continue;
            };
            let size = instruction_size(code, offset);
            match op {
                Op::Jump => {
                    let target = u32::from_le_bytes([
                        code[offset + 1],
                        code[offset + 2],
                        code[offset + 3],
                        code[offset + 4],
                    ]) as usize;
                    queue.push_back(target);
                }
                Op::JumpIfZero => {
                    let target = u32::from_le_bytes([
                        code[offset + 1],
                        code[offset + 2],
                        code[offset + 3],
                        code[offset + 4],
                    ]) as usize;
                    queue.push_back(target);
                    queue.push_back(offset + size);
                }
                _ => {
                    queue.push_back(offset + size);
                }
            }
        }

        seen
    }
}

/// Convenience wrapper: run dead-code elimination once and return stats.
pub fn eliminate_dead_code(code: Vec<u8>) -> (Vec<u8>, DceStats) {
    let mut dce = DeadCodeEliminator::new();
    let result = dce.eliminate(code);
    (result, dce.stats().clone())
}
