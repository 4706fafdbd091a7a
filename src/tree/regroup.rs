//! Algebraic regrouping (spec.md §4.4): mul/add factor collection and
//! logic-lattice combination for `And`/`Or`. Invoked from
//! [`crate::tree::fold`] after the opcode-local fold has run, mirroring
//! `original_source/fpoptimizer/fpoptimizer_grouping.cc`'s split between
//! "fold constants first" and "then try CollectMulGroup/CollectAddGroup".

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::op::Op;
use crate::tree::arena::Tree;
use crate::tree::node::{NodeId, Payload};

/// `base -> (hash, accumulated exponent node ids)`.
fn factor_base_exponent(tree: &mut Tree, factor: NodeId) -> (NodeId, NodeId) {
    match tree.node(factor).op {
        Op::Pow => {
            let base = tree.node(factor).children[0];
            let exp = tree.node(factor).children[1];
            (base, exp)
        }
        Op::Sqrt => {
            let base = tree.node(factor).children[0];
            let half = tree.alloc_leaf(Op::Immed, Payload::Immed(0.5));
            (base, tree.rehash(half))
        }
        Op::RSqrt => {
            let base = tree.node(factor).children[0];
            let neg_half = tree.alloc_leaf(Op::Immed, Payload::Immed(-0.5));
            (base, tree.rehash(neg_half))
        }
        Op::Inv => {
            let base = tree.node(factor).children[0];
            let neg_one = tree.alloc_leaf(Op::Immed, Payload::Immed(-1.0));
            (base, tree.rehash(neg_one))
        }
        _ => {
            let one = tree.alloc_leaf(Op::Immed, Payload::Immed(1.0));
            (factor, tree.rehash(one))
        }
    }
}

/// Walk `Mul`'s factors, accumulate exponents of repeated bases, and
/// regroup by shared exponent. Returns `true` if the node's children
/// changed.
pub fn group_mul(tree: &mut Tree, id: NodeId) -> bool {
    let factors: SmallVec<[NodeId; 4]> = tree.node(id).children.clone();
    if factors.len() < 2 {
        return false;
    }

    // base-hash -> (base id, Vec<exponent id>)
    let mut by_base: HashMap<crate::tree::hash::Hash128, (NodeId, Vec<NodeId>)> = HashMap::new();
    let mut order: Vec<crate::tree::hash::Hash128> = Vec::new();
    for &f in &factors {
        let (base, exp) = factor_base_exponent(tree, f);
        let key = tree.node(base).hash;
        let entry = by_base.entry(key).or_insert_with(|| {
            order.push(key);
            (base, Vec::new())
        });
        entry.1.push(exp);
    }

    // No base repeats and every factor had an implicit exponent of 1:
    // nothing to regroup.
    let any_multi = by_base.values().any(|(_, exps)| exps.len() > 1);
    if !any_multi {
        return false;
    }

    let mut new_terms: SmallVec<[NodeId; 4]> = SmallVec::new();
    for key in order {
        let (base, exps) = by_base.remove(&key).unwrap();
        let combined_exp = if exps.len() == 1 {
            exps[0]
        } else {
            let m = tree.alloc(Op::Add, Payload::None, exps.into());
            tree.rehash(m)
        };
        if let Some(1.0) = tree.node(combined_exp).payload.as_immed() {
            new_terms.push(base);
        } else {
            let mut kids = SmallVec::new();
            kids.push(base);
            kids.push(combined_exp);
            let pow = tree.alloc(Op::Pow, Payload::None, kids);
            new_terms.push(tree.rehash(pow));
        }
    }

    if new_terms.len() == factors.len() {
        return false;
    }
    tree.set_children(id, new_terms);
    true
}

/// `x + x*y + x*z -> x*(1+y+z)`: index `Mul` siblings by each non-immediate
/// factor, pull out any factor shared by >= 2 siblings. Also collapses
/// `c1*x + c2*x -> (c1+c2)*x`.
pub fn group_add(tree: &mut Tree, id: NodeId) -> bool {
    let terms: SmallVec<[NodeId; 4]> = tree.node(id).children.clone();
    if terms.len() < 2 {
        return false;
    }

    // hash(common factor) -> (factor id, Vec<(term index, residual factors)>)
    let mut by_factor: HashMap<crate::tree::hash::Hash128, (NodeId, Vec<(usize, SmallVec<[NodeId; 4]>)>)> =
        HashMap::new();
    let mut order: Vec<crate::tree::hash::Hash128> = Vec::new();

    for (i, &t) in terms.iter().enumerate() {
        if tree.node(t).op == Op::Mul {
            let mul_factors: SmallVec<[NodeId; 4]> = tree.node(t).children.clone();
            for (fi, &f) in mul_factors.iter().enumerate() {
                if tree.node(f).payload.as_immed().is_some() {
                    continue; // constants aren't "common factors" for this pass
                }
                let key = tree.node(f).hash;
                let residual: SmallVec<[NodeId; 4]> = mul_factors
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != fi)
                    .map(|(_, &x)| x)
                    .collect();
                let entry = by_factor.entry(key).or_insert_with(|| {
                    order.push(key);
                    (f, Vec::new())
                });
                entry.1.push((i, residual));
            }
        } else if tree.node(t).payload.as_immed().is_none() {
            // A bare addend is an implicit `Mul(t, 1)`: register it with
            // an empty residual so it can still combine with an explicit
            // `Mul` sibling that shares the same factor (e.g. `x + x*y`,
            // or `x + x*-1` canceling to 0).
            let key = tree.node(t).hash;
            let entry = by_factor.entry(key).or_insert_with(|| {
                order.push(key);
                (t, Vec::new())
            });
            entry.1.push((i, SmallVec::new()));
        }
    }

    let winner = order
        .into_iter()
        .filter_map(|key| by_factor.remove(&key))
        .find(|(_, occurrences)| occurrences.len() >= 2);

    if let Some((factor, occurrences)) = winner {
        let mut consumed: Vec<usize> = occurrences.iter().map(|(i, _)| *i).collect();
        consumed.sort_unstable();
        let mut residual_sum_terms: SmallVec<[NodeId; 4]> = SmallVec::new();
        for (_, residual) in &occurrences {
            let term = if residual.is_empty() {
                tree.alloc_leaf(Op::Immed, Payload::Immed(1.0))
            } else if residual.len() == 1 {
                residual[0]
            } else {
                tree.alloc(Op::Mul, Payload::None, residual.clone())
            };
            residual_sum_terms.push(tree.rehash(term));
        }
        let residual_sum = if residual_sum_terms.len() == 1 {
            residual_sum_terms[0]
        } else {
            let s = tree.alloc(Op::Add, Payload::None, residual_sum_terms);
            tree.rehash(s)
        };
        let mut kids = SmallVec::new();
        kids.push(factor);
        kids.push(residual_sum);
        let grouped = tree.alloc(Op::Mul, Payload::None, kids);
        let grouped = tree.rehash(grouped);

        let mut new_terms: SmallVec<[NodeId; 4]> = SmallVec::new();
        for (i, &t) in terms.iter().enumerate() {
            if !consumed.contains(&i) {
                new_terms.push(t);
            }
        }
        new_terms.push(grouped);
        tree.set_children(id, new_terms);
        return true;
    }

    false
}

/// Comparison operands on the same `(a, b)` pair under `And`/`Or`,
/// combined over the relation lattice `{<, =, >}` (spec.md §4.4).
/// Opposite presence of `x` and `Not(x)` collapses to the identity.
pub fn group_logic(tree: &mut Tree, id: NodeId) -> bool {
    let op = tree.node(id).op;
    let children: SmallVec<[NodeId; 4]> = tree.node(id).children.clone();

    // x and Not(x) both present -> identity.
    let mut not_hashes: Vec<crate::tree::hash::Hash128> = Vec::new();
    for &c in &children {
        if tree.node(c).op == Op::Not {
            let inner = tree.node(c).children[0];
            not_hashes.push(tree.node(inner).hash);
        }
    }
    for &c in &children {
        if tree.node(c).op != Op::Not && not_hashes.contains(&tree.node(c).hash) {
            let identity = if op == Op::And { 0.0 } else { 1.0 };
            let leaf = tree.alloc_leaf(Op::Immed, Payload::Immed(identity));
            let leaf = tree.rehash(leaf);
            tree.become_(id, leaf);
            return true;
        }
    }

    // Combine same-pair comparisons via the relation lattice.
    let mut by_pair: HashMap<(crate::tree::hash::Hash128, crate::tree::hash::Hash128), Vec<(usize, Op)>> =
        HashMap::new();
    for (i, &c) in children.iter().enumerate() {
        if tree.node(c).op.is_comparison() {
            let lhs = tree.node(c).children[0];
            let rhs = tree.node(c).children[1];
            let key = (tree.node(lhs).hash, tree.node(rhs).hash);
            by_pair.entry(key).or_default().push((i, tree.node(c).op));
        }
    }
    for (_, entries) in by_pair {
        if entries.len() < 2 {
            continue;
        }
        if let Some(combined) = combine_relation(op, entries.iter().map(|(_, o)| *o).collect()) {
            let mut idxs: Vec<usize> = entries.iter().map(|(i, _)| *i).collect();
            idxs.sort_unstable();
            let first = children[idxs[0]];
            let lhs = tree.node(first).children[0];
            let rhs = tree.node(first).children[1];
            let mut new_children: SmallVec<[NodeId; 4]> = SmallVec::new();
            for (i, &c) in children.iter().enumerate() {
                if i == idxs[0] {
                    let mut kids = SmallVec::new();
                    kids.push(lhs);
                    kids.push(rhs);
                    let replacement = tree.alloc(combined, Payload::None, kids);
                    new_children.push(tree.rehash(replacement));
                } else if !idxs.contains(&i) {
                    new_children.push(c);
                }
            }
            tree.set_children(id, new_children);
            return true;
        }
    }

    false
}

/// Mask bits: bit0 = `<`, bit1 = `=`, bit2 = `>`.
fn relation_mask(op: Op) -> Option<u8> {
    Some(match op {
        Op::Less => 0b001,
        Op::Equal => 0b010,
        Op::Greater => 0b100,
        Op::LessOrEq => 0b011,
        Op::GreaterOrEq => 0b110,
        Op::NEqual => 0b101,
        _ => return None,
    })
}

fn mask_to_op(mask: u8) -> Option<Op> {
    Some(match mask {
        0b001 => Op::Less,
        0b010 => Op::Equal,
        0b100 => Op::Greater,
        0b011 => Op::LessOrEq,
        0b110 => Op::GreaterOrEq,
        0b101 => Op::NEqual,
        _ => return None,
    })
}

fn combine_relation(logic_op: Op, ops: Vec<Op>) -> Option<Op> {
    let mut mask = if logic_op == Op::And { 0b111u8 } else { 0b000u8 };
    for op in ops {
        let m = relation_mask(op)?;
        mask = if logic_op == Op::And { mask & m } else { mask | m };
    }
    mask_to_op(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Payload;

    #[test]
    fn mul_same_base_combines_exponents() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        tree.rehash(x);
        let mut kids = SmallVec::new();
        kids.push(x);
        kids.push(x);
        let id = tree.alloc(Op::Mul, Payload::None, kids);
        let id = tree.rehash(id);
        // x*x should regroup to x^2.
        assert_eq!(tree.node(id).op, Op::Pow);
    }

    #[test]
    fn add_common_mul_factor_is_pulled_out() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let y = tree.alloc_leaf(Op::Var, Payload::Var(1));
        let z = tree.alloc_leaf(Op::Var, Payload::Var(2));
        tree.rehash(x);
        tree.rehash(y);
        tree.rehash(z);

        let mut xy_kids = SmallVec::new();
        xy_kids.push(x);
        xy_kids.push(y);
        let xy = tree.alloc(Op::Mul, Payload::None, xy_kids);
        let xy = tree.rehash(xy);

        let mut xz_kids = SmallVec::new();
        xz_kids.push(x);
        xz_kids.push(z);
        let xz = tree.alloc(Op::Mul, Payload::None, xz_kids);
        let xz = tree.rehash(xz);

        let mut add_kids = SmallVec::new();
        add_kids.push(xy);
        add_kids.push(xz);
        let sum = tree.alloc(Op::Add, Payload::None, add_kids);
        let sum = tree.rehash(sum);
        assert_eq!(tree.node(sum).op, Op::Mul);
    }

    #[test]
    fn add_bare_term_cancels_against_its_negation() {
        // x + x*-1 -> 0, the shape `x - x` lifts to once `Sub` is decomposed.
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let neg_one = tree.alloc_leaf(Op::Immed, Payload::Immed(-1.0));
        let neg_one = tree.rehash(neg_one);

        let mut neg_kids = SmallVec::new();
        neg_kids.push(x);
        neg_kids.push(neg_one);
        let neg_x = tree.alloc(Op::Mul, Payload::None, neg_kids);
        let neg_x = tree.rehash(neg_x);

        let mut add_kids = SmallVec::new();
        add_kids.push(x);
        add_kids.push(neg_x);
        let sum = tree.alloc(Op::Add, Payload::None, add_kids);
        let sum = tree.rehash(sum);

        assert_eq!(tree.node(sum).op, Op::Immed);
        assert_eq!(tree.node(sum).payload.as_immed(), Some(0.0));
    }
}
