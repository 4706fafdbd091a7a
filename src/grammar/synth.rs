//! Rewrite synthesis (spec.md §4.5): once a rule matches, build the
//! replacement subtree from the bound [`Bindings`] and splice it in.

use smallvec::SmallVec;

use crate::tree::arena::Tree;
use crate::tree::node::{NodeId, Payload};

use super::pattern::{Bindings, PatternNode, Produce};

/// Apply `produce` to the already-matched node `id`, using `bindings`.
/// `id` must already be uniquely owned (the grammar driver calls
/// `Tree::make_unique` before invoking a rule, same contract as
/// [`crate::tree::fold::fold_node`]).
pub fn apply(tree: &mut Tree, id: NodeId, produce: &Produce, bindings: &Bindings) {
    match produce {
        Produce::ProduceNewTree(pattern) => {
            let built = synth_single(tree, pattern, bindings);
            tree.become_(id, built);
            tree.rehash(id);
        }
        Produce::ReplaceParams(params) => {
            let children = synth_children(tree, params, bindings);
            tree.set_children(id, children);
            tree.rehash(id);
        }
    }
}

fn synth_single(tree: &mut Tree, pattern: &PatternNode, bindings: &Bindings) -> NodeId {
    match pattern {
        PatternNode::NumConstant(v) => {
            let leaf = tree.alloc_leaf(crate::op::Op::Immed, Payload::Immed(*v));
            tree.rehash(leaf)
        }
        PatternNode::ParamHolder { id, .. } => *bindings
            .holders
            .get(id)
            .expect("matcher guarantees every referenced holder is bound"),
        PatternNode::SubFunction { op, params, .. } => {
            let children = synth_children(tree, params, bindings);
            let node = tree.alloc(*op, Payload::None, children);
            tree.rehash(node)
        }
        PatternNode::RestHolder(id) => {
            let group = bindings
                .rest
                .get(id)
                .cloned()
                .unwrap_or_default();
            match group.len() {
                0 => {
                    let leaf = tree.alloc_leaf(crate::op::Op::Immed, Payload::Immed(0.0));
                    tree.rehash(leaf)
                }
                1 => group[0],
                _ => {
                    let kids: SmallVec<[NodeId; 4]> = group.into_iter().collect();
                    let node = tree.alloc(crate::op::Op::Add, Payload::None, kids);
                    tree.rehash(node)
                }
            }
        }
    }
}

/// Build a children list, splicing `RestHolder` groups inline rather than
/// nesting them in a single slot.
fn synth_children(tree: &mut Tree, params: &[PatternNode], bindings: &Bindings) -> SmallVec<[NodeId; 4]> {
    let mut out = SmallVec::new();
    for p in params {
        if let PatternNode::RestHolder(id) = p {
            if let Some(group) = bindings.rest.get(id) {
                out.extend(group.iter().copied());
                continue;
            }
        }
        out.push(synth_single(tree, p, bindings));
    }
    out
}
