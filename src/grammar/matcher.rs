//! Backtracking pattern matcher (spec.md §4.5).
//!
//! Bucket-sorting rules by root opcode and binary-range lookup (the
//! reference implementation's main performance trick for a table with
//! hundreds of rules) is not reproduced here — this crate's hand-authored
//! tables (see [`crate::grammar::tables`]) are small enough that a linear
//! scan filtering on `rule.op` is the whole "bucket lookup", which is
//! still O(1) amortized against the table sizes this crate ships.

use crate::op::Op;
use crate::tree::arena::Tree;
use crate::tree::fold::structurally_equal;
use crate::tree::node::NodeId;
use crate::tree::range;

use super::pattern::{Bindings, Constraint, MatchType, PatternNode, Rule};

/// Try every rule in `rules` whose root opcode matches `id`'s, in table
/// order; return the first successful match's rule index and bindings.
pub fn find_match(tree: &Tree, rules: &[Rule], id: NodeId) -> Option<(usize, Bindings)> {
    let op = tree.node(id).op;
    let children_len = tree.node(id).children.len();
    for (i, rule) in rules.iter().enumerate() {
        if rule.op != op || children_len < rule.min_params {
            continue;
        }
        let mut bindings = Bindings::default();
        let children: Vec<NodeId> = tree.node(id).children.clone().into_iter().collect();
        if match_all(tree, &rule.match_type, &rule.params, &children, &mut bindings) {
            return Some((i, bindings));
        }
    }
    None
}

fn match_all(
    tree: &Tree,
    match_type: &MatchType,
    params: &[PatternNode],
    children: &[NodeId],
    bindings: &mut Bindings,
) -> bool {
    match match_type {
        MatchType::Positional => {
            if children.len() != params.len() {
                return false;
            }
            for (p, &c) in params.iter().zip(children.iter()) {
                if !match_pattern(tree, p, c, bindings) {
                    return false;
                }
            }
            true
        }
        MatchType::Selected => {
            if children.len() != params.len() {
                return false;
            }
            backtrack_permutation(tree, params, children, bindings, &mut vec![false; children.len()], None)
        }
        MatchType::AnyOrder { rest_holder } => {
            if children.len() < params.len() {
                return false;
            }
            let mut used = vec![false; children.len()];
            if !backtrack_permutation(tree, params, children, bindings, &mut used, None) {
                return false;
            }
            let leftover: Vec<NodeId> = children
                .iter()
                .zip(used.iter())
                .filter(|(_, &u)| !u)
                .map(|(&c, _)| c)
                .collect();
            bindings.rest.insert(*rest_holder, leftover);
            true
        }
    }
}

/// Recursive backtracking assignment of `params[depth..]` to unused
/// children. `used` is mutated in place and restored on backtrack.
fn backtrack_permutation(
    tree: &Tree,
    params: &[PatternNode],
    children: &[NodeId],
    bindings: &mut Bindings,
    used: &mut [bool],
    depth: Option<usize>,
) -> bool {
    let depth = depth.unwrap_or(0);
    if depth == params.len() {
        return true;
    }
    for (ci, &c) in children.iter().enumerate() {
        if used[ci] {
            continue;
        }
        let snapshot = bindings.clone();
        used[ci] = true;
        if match_pattern(tree, &params[depth], c, bindings)
            && backtrack_permutation(tree, params, children, bindings, used, Some(depth + 1))
        {
            return true;
        }
        used[ci] = false;
        *bindings = snapshot;
    }
    false
}

fn match_pattern(tree: &Tree, pattern: &PatternNode, node: NodeId, bindings: &mut Bindings) -> bool {
    match pattern {
        PatternNode::NumConstant(v) => tree
            .node(node)
            .payload
            .as_immed()
            .map(|actual| actual == *v)
            .unwrap_or(false),
        PatternNode::ParamHolder { id, constraint } => {
            if let Some(&existing) = bindings.holders.get(id) {
                return structurally_equal(tree, existing, node);
            }
            if !satisfies(tree, *constraint, node) {
                return false;
            }
            bindings.holders.insert(*id, node);
            true
        }
        PatternNode::SubFunction { op, params, match_type } => {
            if tree.node(node).op != *op {
                return false;
            }
            let children: Vec<NodeId> = tree.node(node).children.clone().into_iter().collect();
            match_all(tree, match_type, params, &children, bindings)
        }
        PatternNode::RestHolder(_) => false, // produce-side only
    }
}

fn satisfies(tree: &Tree, constraint: Constraint, node: NodeId) -> bool {
    match constraint {
        Constraint::None => true,
        Constraint::Integer => tree
            .node(node)
            .payload
            .as_immed()
            .map(|v| v.fract() == 0.0)
            .unwrap_or(false),
        Constraint::Positive => range::eval_range(tree, node).is_definitely_positive(),
        Constraint::Negative => range::eval_range(tree, node).is_definitely_negative(),
        Constraint::PlusMinusOne => tree
            .node(node)
            .payload
            .as_immed()
            .map(|v| v == 1.0 || v == -1.0)
            .unwrap_or(false),
        Constraint::Logical => {
            let op = tree.node(node).op;
            op.is_comparison() || matches!(op, Op::And | Op::Or | Op::Not | Op::NotNot)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Payload;
    use smallvec::SmallVec;

    #[test]
    fn positional_match_binds_params_in_order() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let two = tree.alloc_leaf(Op::Immed, Payload::Immed(2.0));
        tree.rehash(x);
        tree.rehash(two);
        let mut kids = SmallVec::new();
        kids.push(x);
        kids.push(two);
        let pow = tree.alloc(Op::Pow, Payload::None, kids);
        let pow = tree.rehash(pow);

        let rule = Rule {
            op: Op::Pow,
            min_params: 2,
            match_type: MatchType::Positional,
            params: vec![
                PatternNode::ParamHolder { id: 0, constraint: Constraint::None },
                PatternNode::NumConstant(2.0),
            ],
            produce: super::super::pattern::Produce::ProduceNewTree(PatternNode::ParamHolder {
                id: 0,
                constraint: Constraint::None,
            }),
        };
        let result = find_match(&tree, &[rule], pow);
        assert!(result.is_some());
        let (_, bindings) = result.unwrap();
        assert_eq!(bindings.holders.get(&0), Some(&x));
    }
}
