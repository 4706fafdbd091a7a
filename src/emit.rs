//! CSE + bytecode emitter (spec.md §4.7, last pipeline stage): counts
//! structurally-identical subtrees, hoists the most valuable ones first
//! with `Dup`/`Fetch` back-references, then emits the root expression.
//!
//! Variadic tree nodes (`Add`/`Mul`/`And`/`Or`/`Min`/`Max`) are flattened
//! into a left-associative chain of binary bytecode ops here — the vm's
//! `apply_algebraic` (see [`crate::bytecode::vm`]) only ever sees binary
//! arithmetic, matching the teacher's own bytecode shape.

use std::collections::HashMap;

use tracing::debug;

use crate::bytecode::chunk::{Bytecode, BytecodeBuilder};
use crate::lower;
use crate::op::Op;
use crate::tree::arena::Tree;
use crate::tree::fold::structurally_equal;
use crate::tree::hash::Hash128;
use crate::tree::node::NodeId;

/// Tunables for the CSE/sequence-assembly heuristics (spec.md §4.7,
/// §9's configuration note). Defaults match the values spec.md states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitConfig {
    pub max_growth_powi: usize,
    pub max_growth_int_mul: usize,
    pub cse_min_count: u32,
    pub cse_min_depth: u32,
}

impl Default for EmitConfig {
    fn default() -> Self {
        EmitConfig {
            max_growth_powi: lower::sequence::MAX_BYTECODE_GROWTH_POWI,
            max_growth_int_mul: lower::sequence::MAX_BYTECODE_GROWTH_INT_MUL,
            cse_min_count: 2,
            cse_min_depth: 2,
        }
    }
}

struct HoistCandidate {
    example: NodeId,
    count: u32,
    depth: u32,
}

/// Emit `root` as a standalone [`Bytecode`] program.
pub fn emit(tree: &Tree, root: NodeId, config: &EmitConfig) -> Bytecode {
    let mut builder = BytecodeBuilder::new();
    let mut resident: HashMap<Hash128, u16> = HashMap::new();
    let mut stack_depth: u16 = 0;

    for candidate in select_cse_candidates(tree, root, config) {
        debug!(count = candidate.count, depth = candidate.depth, "hoisting common subexpression");
        emit_node(tree, candidate.example, &mut builder, &mut resident, &mut stack_depth, config);
        resident.insert(tree.node(candidate.example).hash, stack_depth - 1);
    }

    emit_node(tree, root, &mut builder, &mut resident, &mut stack_depth, config);
    builder.finish()
}

/// Walk the whole tree counting occurrences of each distinct subtree
/// shape, and return the ones worth hoisting, most valuable first.
fn select_cse_candidates(tree: &Tree, root: NodeId, config: &EmitConfig) -> Vec<HoistCandidate> {
    let mut occurrences: HashMap<Hash128, Vec<NodeId>> = HashMap::new();
    collect_occurrences(tree, root, &mut occurrences);

    let mut candidates = Vec::new();
    for (_, ids) in occurrences {
        // A hash bucket can mix genuine collisions; only count ids that
        // are actually structurally equal to the bucket's first member.
        let mut groups: Vec<Vec<NodeId>> = Vec::new();
        for id in ids {
            if let Some(group) = groups
                .iter_mut()
                .find(|g| structurally_equal(tree, g[0], id))
            {
                group.push(id);
            } else {
                groups.push(vec![id]);
            }
        }
        for group in groups {
            let depth = tree.node(group[0]).depth;
            let count = group.len() as u32;
            if count >= config.cse_min_count && depth >= config.cse_min_depth {
                candidates.push(HoistCandidate { example: group[0], count, depth });
            }
        }
    }
    candidates.sort_by(|a, b| (b.count * b.depth).cmp(&(a.count * a.depth)));
    candidates
}

fn collect_occurrences(tree: &Tree, id: NodeId, occurrences: &mut HashMap<Hash128, Vec<NodeId>>) {
    occurrences.entry(tree.node(id).hash).or_default().push(id);
    let children = tree.node(id).children.clone();
    for c in children {
        collect_occurrences(tree, c, occurrences);
    }
}

fn bump(stack_depth: &mut u16, delta: i32) {
    *stack_depth = (*stack_depth as i32 + delta) as u16;
}

fn emit_node(
    tree: &Tree,
    id: NodeId,
    builder: &mut BytecodeBuilder,
    resident: &mut HashMap<Hash128, u16>,
    stack_depth: &mut u16,
    config: &EmitConfig,
) {
    let hash = tree.node(id).hash;
    if let Some(&slot) = resident.get(&hash) {
        builder.push_fetch(slot);
        bump(stack_depth, 1);
        return;
    }

    let node = tree.node(id);
    match node.op {
        Op::Immed => {
            builder.push_immed(node.payload.as_immed().expect("Immed carries a value"));
            bump(stack_depth, 1);
        }
        Op::Var => {
            let idx = match node.payload {
                crate::tree::node::Payload::Var(i) => i,
                _ => unreachable!(),
            };
            builder.push_var(idx);
            bump(stack_depth, 1);
        }
        Op::FCall | Op::PCall => {
            let callee = match node.payload {
                crate::tree::node::Payload::Callee(i) => i,
                _ => unreachable!(),
            };
            let children = node.children.clone();
            for &c in &children {
                emit_node(tree, c, builder, resident, stack_depth, config);
            }
            builder.push_callee(node.op, callee);
            bump(stack_depth, -(children.len() as i32) + 1);
        }
        Op::If => emit_if(tree, id, builder, resident, stack_depth, config),
        Op::Mul => emit_mul(tree, id, builder, resident, stack_depth, config),
        Op::Pow => emit_pow(tree, id, builder, resident, stack_depth, config),
        op if op.is_variadic() => {
            emit_variadic_chain(tree, id, op, builder, resident, stack_depth, config)
        }
        _ => emit_fixed_arity(tree, id, builder, resident, stack_depth, config),
    }
}

fn emit_fixed_arity(
    tree: &Tree,
    id: NodeId,
    builder: &mut BytecodeBuilder,
    resident: &mut HashMap<Hash128, u16>,
    stack_depth: &mut u16,
    config: &EmitConfig,
) {
    let op = tree.node(id).op;
    let children = tree.node(id).children.clone();
    for &c in &children {
        emit_node(tree, c, builder, resident, stack_depth, config);
    }
    builder.push_op(op);
    bump(stack_depth, -(children.len() as i32) + 1);
}

/// Flatten an `Add`/`And`/`Or`/`Min`/`Max` variadic node into a
/// left-associative chain of binary bytecode ops (the vm only knows
/// binary arithmetic for these).
fn emit_variadic_chain(
    tree: &Tree,
    id: NodeId,
    op: Op,
    builder: &mut BytecodeBuilder,
    resident: &mut HashMap<Hash128, u16>,
    stack_depth: &mut u16,
    config: &EmitConfig,
) {
    let children = tree.node(id).children.clone();
    debug_assert!(!children.is_empty(), "fold collapses empty variadic nodes before emission");
    emit_node(tree, children[0], builder, resident, stack_depth, config);
    for &c in &children[1..] {
        emit_node(tree, c, builder, resident, stack_depth, config);
        builder.push_op(op);
        bump(stack_depth, -1);
    }
}

/// `Pow(base, n)` with small positive integer `n` tries the powi
/// addition-chain assembler before falling back to the generic `Pow`
/// opcode (spec.md §4.7).
fn emit_pow(
    tree: &Tree,
    id: NodeId,
    builder: &mut BytecodeBuilder,
    resident: &mut HashMap<Hash128, u16>,
    stack_depth: &mut u16,
    config: &EmitConfig,
) {
    let base = tree.node(id).children[0];
    let exp = tree.node(id).children[1];
    if let Some(n) = positive_integer_exponent(tree, exp) {
        if n >= 2 {
            if let Some(steps) = lower::assemble(n, config.max_growth_powi) {
                emit_node(tree, base, builder, resident, stack_depth, config);
                emit_sequence(&steps, Op::Mul, builder, stack_depth);
                return;
            }
            tracing::warn!(n, "powi assembler exceeded budget, falling back to generic Pow");
        }
    }
    emit_node(tree, base, builder, resident, stack_depth, config);
    emit_node(tree, exp, builder, resident, stack_depth, config);
    builder.push_op(Op::Pow);
    bump(stack_depth, -1);
}

fn positive_integer_exponent(tree: &Tree, exp: NodeId) -> Option<u64> {
    let v = tree.node(exp).payload.as_immed()?;
    if v >= 0.0 && v.fract() == 0.0 {
        Some(v as u64)
    } else {
        None
    }
}

/// `Mul` with exactly one integer-immediate factor tries `AddSequence`
/// expansion of the remaining factor before falling back to a plain
/// binary `Mul` chain (spec.md §4.7). Only fires when a single non-immediate
/// child remains, since `AddSequence` operates on one value at a time and
/// combining the rest into a scratch node isn't worth it at this budget
/// (`MAX_BYTECODE_GROWTH_INT_MUL = 3`, so realistically only `n == 2`
/// ever pays for itself anyway).
fn emit_mul(
    tree: &Tree,
    id: NodeId,
    builder: &mut BytecodeBuilder,
    resident: &mut HashMap<Hash128, u16>,
    stack_depth: &mut u16,
    config: &EmitConfig,
) {
    let children = tree.node(id).children.clone();
    if children.len() == 2 {
        for (i, &c) in children.iter().enumerate() {
            let rest = children[1 - i];
            if let Some(n) = positive_integer_exponent(tree, c) {
                if n >= 2 {
                    if let Some(steps) = lower::assemble(n, config.max_growth_int_mul) {
                        emit_node(tree, rest, builder, resident, stack_depth, config);
                        emit_sequence(&steps, Op::Add, builder, stack_depth);
                        return;
                    }
                }
            }
        }
    }
    emit_variadic_chain(tree, id, Op::Mul, builder, resident, stack_depth, config);
}

/// Translate a symbolic [`lower::SeqStep`] chain into `Dup`/`Fetch`/
/// `combine_op` instructions against the value [`emit_node`] just left on
/// top of the stack. A second copy of that value is kept alive below the
/// running computation (for `CombineBase`'s `Fetch`es) and discarded with
/// a final `PopNMov` once the chain is done.
fn emit_sequence(
    steps: &[lower::SeqStep],
    combine_op: Op,
    builder: &mut BytecodeBuilder,
    stack_depth: &mut u16,
) {
    let cache_slot = *stack_depth - 1;
    builder.push_op(Op::Dup);
    bump(stack_depth, 1);

    for step in steps {
        match step {
            lower::SeqStep::Double => {
                builder.push_op(Op::Dup);
                bump(stack_depth, 1);
                builder.push_op(combine_op);
                bump(stack_depth, -1);
            }
            lower::SeqStep::CombineBase => {
                builder.push_fetch(cache_slot);
                bump(stack_depth, 1);
                builder.push_op(combine_op);
                bump(stack_depth, -1);
            }
        }
    }

    let running_slot = *stack_depth - 1;
    builder.push_pop_n_mov(cache_slot, running_slot);
    bump(stack_depth, -1);
}

/// Three-block `If` emission with placeholder jump offsets patched after
/// each branch is known (spec.md §4.7).
fn emit_if(
    tree: &Tree,
    id: NodeId,
    builder: &mut BytecodeBuilder,
    resident: &mut HashMap<Hash128, u16>,
    stack_depth: &mut u16,
    config: &EmitConfig,
) {
    let cond = tree.node(id).children[0];
    let then_branch = tree.node(id).children[1];
    let else_branch = tree.node(id).children[2];

    emit_node(tree, cond, builder, resident, stack_depth, config);
    bump(stack_depth, -1); // JumpIfZero consumes the condition
    let jz = builder.push_jump_placeholder(Op::JumpIfZero);

    let depth_before_branches = *stack_depth;
    emit_node(tree, then_branch, builder, resident, stack_depth, config);
    let jmp = builder.push_jump_placeholder(Op::Jump);

    builder.patch_jump(jz, builder.current_offset());
    *stack_depth = depth_before_branches;
    emit_node(tree, else_branch, builder, resident, stack_depth, config);

    builder.patch_jump(jmp, builder.current_offset());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::vm;
    use crate::tree::node::Payload;
    use smallvec::SmallVec;

    #[test]
    fn emits_simple_binary_multiplication() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let three = tree.alloc_leaf(Op::Immed, Payload::Immed(3.0));
        let three = tree.rehash(three);
        let mut kids = SmallVec::new();
        kids.push(x);
        kids.push(three);
        let mul = tree.alloc(Op::Mul, Payload::None, kids);
        let mul = tree.rehash(mul);

        let bc = emit(&tree, mul, &EmitConfig::default());
        assert_eq!(vm::eval(&bc, &[2.0], &[]).unwrap(), 6.0);
    }

    #[test]
    fn emits_if_with_correctly_patched_jumps() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let zero = tree.alloc_leaf(Op::Immed, Payload::Immed(0.0));
        let zero = tree.rehash(zero);
        let mut cmp_kids = SmallVec::new();
        cmp_kids.push(x);
        cmp_kids.push(zero);
        let cond = tree.alloc(Op::Less, Payload::None, cmp_kids);
        let cond = tree.rehash(cond);
        let neg_one = tree.alloc_leaf(Op::Immed, Payload::Immed(-1.0));
        let neg_one = tree.rehash(neg_one);
        let mut neg_kids = SmallVec::new();
        neg_kids.push(x);
        neg_kids.push(neg_one);
        let then_val = tree.alloc(Op::Mul, Payload::None, neg_kids);
        let then_val = tree.rehash(then_val);
        let mut if_kids = SmallVec::new();
        if_kids.push(cond);
        if_kids.push(then_val);
        if_kids.push(x);
        let if_node = tree.alloc(Op::If, Payload::None, if_kids);
        let if_node = tree.rehash(if_node);

        let bc = emit(&tree, if_node, &EmitConfig::default());
        assert_eq!(vm::eval(&bc, &[-3.0], &[]).unwrap(), 3.0);
        assert_eq!(vm::eval(&bc, &[3.0], &[]).unwrap(), 3.0);
    }

    #[test]
    fn powi_uses_an_addition_chain_not_a_generic_pow() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let eight = tree.alloc_leaf(Op::Immed, Payload::Immed(8.0));
        let eight = tree.rehash(eight);
        let mut kids = SmallVec::new();
        kids.push(x);
        kids.push(eight);
        let pow = tree.alloc(Op::Pow, Payload::None, kids);
        let pow = tree.rehash(pow);

        let bc = emit(&tree, pow, &EmitConfig::default());
        assert!(!bc.code.contains(&Op::Pow.to_byte()));
        assert_eq!(vm::eval(&bc, &[2.0], &[]).unwrap(), 256.0);
    }

    #[test]
    fn repeated_subtree_is_hoisted_and_fetched() {
        // (a+b)*c + (a+b)*d, with a+b shared structurally across both Muls.
        let mut tree = Tree::new();
        let a = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let a = tree.rehash(a);
        let b = tree.alloc_leaf(Op::Var, Payload::Var(1));
        let b = tree.rehash(b);
        let c = tree.alloc_leaf(Op::Var, Payload::Var(2));
        let c = tree.rehash(c);
        let d = tree.alloc_leaf(Op::Var, Payload::Var(3));
        let d = tree.rehash(d);

        let mut ab1 = SmallVec::new();
        ab1.push(a);
        ab1.push(b);
        let sum1 = tree.alloc(Op::Add, Payload::None, ab1);
        let sum1 = tree.rehash(sum1);
        let mut ab2 = SmallVec::new();
        ab2.push(a);
        ab2.push(b);
        let sum2 = tree.alloc(Op::Add, Payload::None, ab2);
        let sum2 = tree.rehash(sum2);

        let mut m1k = SmallVec::new();
        m1k.push(sum1);
        m1k.push(c);
        let m1 = tree.alloc(Op::Mul, Payload::None, m1k);
        let m1 = tree.rehash(m1);
        let mut m2k = SmallVec::new();
        m2k.push(sum2);
        m2k.push(d);
        let m2 = tree.alloc(Op::Mul, Payload::None, m2k);
        let m2 = tree.rehash(m2);

        let mut topk = SmallVec::new();
        topk.push(m1);
        topk.push(m2);
        let top = tree.alloc(Op::Add, Payload::None, topk);
        let top = tree.rehash(top);

        let bc = emit(&tree, top, &EmitConfig::default());
        let vars = [2.0, 3.0, 5.0, 7.0]; // a,b,c,d
        let expected = (vars[0] + vars[1]) * vars[2] + (vars[0] + vars[1]) * vars[3];
        assert_eq!(vm::eval(&bc, &vars, &[]).unwrap(), expected);
    }
}
