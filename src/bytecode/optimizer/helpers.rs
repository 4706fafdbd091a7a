//! Helper functions for byte-level bytecode cleanup.

use crate::op::Op;
use crate::bytecode::chunk::Bytecode;

/// Size in bytes (opcode + inline operand) of the instruction starting
/// at `offset`, or `1` for an unrecognized byte so a scan never stalls.
pub fn instruction_size(code: &[u8], offset: usize) -> usize {
    if offset >= code.len() {
        return 1;
    }
    match Op::from_byte(code[offset]) {
        Some(op) => 1 + Bytecode::operand_len(op),
        None => 1,
    }
}
