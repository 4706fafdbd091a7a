//! The grammar engine: three ordered rule-sets, each iterated to a fixed
//! point over the whole tree before the next begins (spec.md §4.5).

pub mod matcher;
pub mod pattern;
pub mod synth;
pub mod tables;

use tracing::debug;

use crate::tree::arena::Tree;
use crate::tree::node::{GrammarStage, NodeId};
use pattern::Rule;

/// Run all three grammars (intermediate, final1, final2) to a fixed
/// point, in order, starting from `root`. Returns the (possibly
/// relocated, via copy-on-write) new root id.
pub fn optimize(tree: &mut Tree, root: NodeId) -> NodeId {
    let root = apply_stage(tree, &tables::intermediate(), GrammarStage::Intermediate, root);
    let root = apply_stage(tree, &tables::final1(), GrammarStage::Final1, root);
    apply_stage(tree, &tables::final2(), GrammarStage::Final2, root)
}

fn apply_stage(tree: &mut Tree, rules: &[Rule], stage: GrammarStage, root: NodeId) -> NodeId {
    let mut root = root;
    let mut rounds = 0;
    loop {
        rounds += 1;
        let (new_root, changed) = sweep(tree, rules, stage, root);
        root = new_root;
        if !changed {
            break;
        }
        debug_assert!(rounds < 10_000, "grammar pass did not reach a fixed point");
    }
    debug!(?stage, rounds, "grammar pass reached fixed point");
    root
}

fn sweep(tree: &mut Tree, rules: &[Rule], stage: GrammarStage, id: NodeId) -> (NodeId, bool) {
    let children: Vec<NodeId> = tree.node(id).children.clone().into_iter().collect();
    let mut any_changed = false;
    for (i, &c) in children.iter().enumerate() {
        let (new_c, changed) = sweep(tree, rules, stage, c);
        any_changed |= changed;
        if new_c != c {
            tree.set_child(id, i, new_c);
        }
    }

    let id = tree.make_unique(id);
    if tree.node(id).optimized_by == Some(stage) {
        return (id, any_changed);
    }

    let mut local_changed = false;
    loop {
        match matcher::find_match(tree, rules, id) {
            Some((rule_index, bindings)) => {
                let produce = rules[rule_index].produce.clone();
                synth::apply(tree, id, &produce, &bindings);
                local_changed = true;
                debug!(rule_index, ?stage, "grammar rewrote node");
            }
            None => break,
        }
    }
    tree.mark_optimized(id, stage);
    (id, any_changed || local_changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;
    use crate::tree::node::Payload;
    use smallvec::SmallVec;

    #[test]
    fn log_of_exp_folds_to_operand() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let mut exp_kids = SmallVec::new();
        exp_kids.push(x);
        let exp = tree.alloc(Op::Exp, Payload::None, exp_kids);
        let exp = tree.rehash(exp);
        let mut log_kids = SmallVec::new();
        log_kids.push(exp);
        let log = tree.alloc(Op::Log, Payload::None, log_kids);
        let log = tree.rehash(log);

        let root = optimize(&mut tree, log);
        assert_eq!(tree.node(root).op, Op::Var);
    }

    #[test]
    fn pythagorean_identity_folds_to_one() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let two = tree.alloc_leaf(Op::Immed, Payload::Immed(2.0));
        let two = tree.rehash(two);

        let mut sin_kids = SmallVec::new();
        sin_kids.push(x);
        let sin = tree.alloc(Op::Sin, Payload::None, sin_kids);
        let sin = tree.rehash(sin);
        let mut sin_pow_kids = SmallVec::new();
        sin_pow_kids.push(sin);
        sin_pow_kids.push(two);
        let sin_sq = tree.alloc(Op::Pow, Payload::None, sin_pow_kids);
        let sin_sq = tree.rehash(sin_sq);

        let mut cos_kids = SmallVec::new();
        cos_kids.push(x);
        let cos = tree.alloc(Op::Cos, Payload::None, cos_kids);
        let cos = tree.rehash(cos);
        let mut cos_pow_kids = SmallVec::new();
        cos_pow_kids.push(cos);
        cos_pow_kids.push(two);
        let cos_sq = tree.alloc(Op::Pow, Payload::None, cos_pow_kids);
        let cos_sq = tree.rehash(cos_sq);

        let mut add_kids = SmallVec::new();
        add_kids.push(sin_sq);
        add_kids.push(cos_sq);
        let sum = tree.alloc(Op::Add, Payload::None, add_kids);
        let sum = tree.rehash(sum);

        let root = optimize(&mut tree, sum);
        assert_eq!(tree.node(root).op, Op::Immed);
        assert_eq!(tree.node(root).payload.as_immed(), Some(1.0));
    }

    #[test]
    fn if_negative_branch_folds_to_abs() {
        // if(x < 0, x * -1, x) -> Abs(x). Built as `Less(x, 0)`, but
        // `rehash` normalizes every `cmp(_, 0.0)` to put the zero-hash
        // constant first and mirror the operator (order.rs), so the live
        // condition node this rule actually has to match is `Greater(0, x)`.
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let zero = tree.alloc_leaf(Op::Immed, Payload::Immed(0.0));
        let zero = tree.rehash(zero);
        let neg_one = tree.alloc_leaf(Op::Immed, Payload::Immed(-1.0));
        let neg_one = tree.rehash(neg_one);

        let mut cond_kids = SmallVec::new();
        cond_kids.push(x);
        cond_kids.push(zero);
        let cond = tree.alloc(Op::Less, Payload::None, cond_kids);
        let cond = tree.rehash(cond);

        let mut then_kids = SmallVec::new();
        then_kids.push(x);
        then_kids.push(neg_one);
        let then_branch = tree.alloc(Op::Mul, Payload::None, then_kids);
        let then_branch = tree.rehash(then_branch);

        let mut if_kids = SmallVec::new();
        if_kids.push(cond);
        if_kids.push(then_branch);
        if_kids.push(x);
        let if_node = tree.alloc(Op::If, Payload::None, if_kids);
        let if_node = tree.rehash(if_node);

        let root = optimize(&mut tree, if_node);
        assert_eq!(tree.node(root).op, Op::Abs);
        assert_eq!(tree.node(root).children.len(), 1);
        assert_eq!(tree.node(root).children[0], x);
    }
}
