//! Powi/integer-multiply sequence assembler (spec.md §4.7): expands
//! `T^n` or `n*T` into a near-optimal chain of stack operations using an
//! addition-chain heuristic, bounded by `MAX_BYTECODE_GROWTH`.
//!
//! The heuristic is the standard binary (square-and-multiply) addition
//! chain, not a search for the provably-shortest chain (that's NP-hard in
//! general) — the same practical tradeoff
//! `original_source/fpoptimizer/fpoptimizer_optimize.cc`'s
//! `AssembleSequence` makes, which documents itself as "close to optimal,
//! not optimal".

/// What kind of combine step the chain should use once translated to
/// bytecode: `Mul` for `T^n` (powi), `Add` for `n*T` (integer multiply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    MulSequence,
    AddSequence,
}

/// One step of the assembled chain. `emit` (see [`crate::emit`])
/// translates these into actual `Dup`/`Fetch`/combine-opcode bytecode
/// against a concrete stack layout; this module stays purely symbolic so
/// it can be unit-tested without a bytecode builder in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqStep {
    /// Square (powi) or double (integer-multiply) the running value.
    Double,
    /// Combine the running value with the original operand once more.
    CombineBase,
}

/// Bytecode-unit cost model: each step costs two units (`Dup`+combine or
/// `Fetch`+combine).
pub fn cost(steps: &[SeqStep]) -> usize {
    steps.len() * 2
}

/// Default budgets named in spec.md §4.7.
pub const MAX_BYTECODE_GROWTH_POWI: usize = 15;
pub const MAX_BYTECODE_GROWTH_INT_MUL: usize = 3;

pub fn default_budget(kind: SequenceKind) -> usize {
    match kind {
        SequenceKind::MulSequence => MAX_BYTECODE_GROWTH_POWI,
        SequenceKind::AddSequence => MAX_BYTECODE_GROWTH_INT_MUL,
    }
}

/// Assemble a binary addition chain computing `base^n` (or `n*base`,
/// depending on how the caller interprets `Double`/`CombineBase`) for
/// `n >= 2`. Returns `None` if the chain would exceed `max_growth`
/// bytecode units, in which case the caller falls back to the generic
/// `Pow`/repeated-`Mul` form (spec.md §4.7).
pub fn assemble(n: u64, max_growth: usize) -> Option<Vec<SeqStep>> {
    if n < 2 {
        return Some(Vec::new());
    }
    let bit_len = 64 - n.leading_zeros() as usize;
    let mut steps = Vec::with_capacity(2 * bit_len);
    for i in (0..bit_len - 1).rev() {
        steps.push(SeqStep::Double);
        if (n >> i) & 1 == 1 {
            steps.push(SeqStep::CombineBase);
        }
    }
    if cost(&steps) > max_growth {
        None
    } else {
        Some(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_is_pure_doubling() {
        let steps = assemble(8, MAX_BYTECODE_GROWTH_POWI).unwrap();
        assert_eq!(steps, vec![SeqStep::Double, SeqStep::Double, SeqStep::Double]);
    }

    #[test]
    fn seven_needs_combine_steps() {
        // 7 = 0b111: after the leading 1, two more bits, both set.
        let steps = assemble(7, MAX_BYTECODE_GROWTH_POWI).unwrap();
        assert_eq!(
            steps,
            vec![
                SeqStep::Double,
                SeqStep::CombineBase,
                SeqStep::Double,
                SeqStep::CombineBase,
            ]
        );
    }

    #[test]
    fn budget_overrun_returns_none() {
        // A large n needs a long chain; a budget of 2 can't afford it.
        assert!(assemble(1_000_003, 2).is_none());
    }

    #[test]
    fn trivial_exponents_need_no_steps() {
        assert_eq!(assemble(0, MAX_BYTECODE_GROWTH_POWI), Some(Vec::new()));
        assert_eq!(assemble(1, MAX_BYTECODE_GROWTH_POWI), Some(Vec::new()));
    }
}
