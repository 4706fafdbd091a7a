//! Canonical ordering (I2, I3).

use crate::op::Op;
use crate::tree::arena::Tree;
use crate::tree::node::NodeId;

/// `(depth desc, hash asc)` — invariant I2. Commutative-opcode children
/// are sorted by this comparator before hashing (so the hash is stable
/// under permutation) and after any mutation.
pub fn commutative_key(tree: &Tree, id: NodeId) -> (std::cmp::Reverse<u32>, crate::tree::hash::Hash128) {
    let node = tree.node(id);
    (std::cmp::Reverse(node.depth), node.hash)
}

pub fn sort_commutative_children(tree: &Tree, children: &mut [NodeId]) {
    children.sort_by_key(|&id| commutative_key(tree, id));
}

/// I3: normalize `Less`/`Greater`/`LessOrEq`/`GreaterOrEq` so that, absent
/// a canonical reason to prefer the given order, `(lhs, rhs)` is in
/// `(depth desc, hash asc)` order; otherwise flip the operands and the
/// opcode to its mirror.
pub fn normalize_comparison(tree: &Tree, op: Op, lhs: NodeId, rhs: NodeId) -> (Op, NodeId, NodeId) {
    let lhs_key = commutative_key(tree, lhs);
    let rhs_key = commutative_key(tree, rhs);
    if lhs_key <= rhs_key {
        (op, lhs, rhs)
    } else {
        (mirror_comparison(op), rhs, lhs)
    }
}

fn mirror_comparison(op: Op) -> Op {
    match op {
        Op::Less => Op::Greater,
        Op::Greater => Op::Less,
        Op::LessOrEq => Op::GreaterOrEq,
        Op::GreaterOrEq => Op::LessOrEq,
        other => other,
    }
}

/// Logical inverse of a comparison opcode (used by `Not` normalization,
/// spec.md §4.2).
pub fn negate_comparison(op: Op) -> Option<Op> {
    Some(match op {
        Op::Equal => Op::NEqual,
        Op::NEqual => Op::Equal,
        Op::Less => Op::GreaterOrEq,
        Op::GreaterOrEq => Op::Less,
        Op::Greater => Op::LessOrEq,
        Op::LessOrEq => Op::Greater,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Payload;

    #[test]
    fn mirror_is_involutive() {
        for op in [Op::Less, Op::Greater, Op::LessOrEq, Op::GreaterOrEq] {
            assert_eq!(mirror_comparison(mirror_comparison(op)), op);
        }
    }

    #[test]
    fn negate_is_involutive() {
        for op in [Op::Equal, Op::NEqual, Op::Less, Op::GreaterOrEq] {
            let negated = negate_comparison(op).unwrap();
            assert_eq!(negate_comparison(negated).unwrap(), op);
        }
    }

    #[test]
    fn normalize_keeps_shallower_hash_lower_first() {
        let mut tree = Tree::new();
        let a = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let b = tree.alloc_leaf(Op::Var, Payload::Var(1));
        tree.rehash(a);
        tree.rehash(b);
        let (op, lhs, rhs) = normalize_comparison(&tree, Op::Less, a, b);
        assert!(op == Op::Less || op == Op::Greater);
        let _ = (lhs, rhs);
    }
}
