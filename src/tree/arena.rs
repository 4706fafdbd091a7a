//! The node arena (spec.md §9 ownership decision, see `SPEC_FULL.md` §4.x).
//!
//! A [`Tree`] owns every [`Node`] in a flat `Vec`; sharing is a duplicated
//! [`NodeId`], not a pointer. Reference counts live on the node itself and
//! gate mutation (I5): [`Tree::make_unique`] is the one chokepoint every
//! mutating operation goes through, cloning into a fresh slot when a node
//! is shared. There is no slot reuse/compaction — a single optimization
//! pass never runs long enough for that to matter, and the teacher's own
//! `BytecodeChunk` constant pool has the same "append-only, never GC'd
//! mid-compile" shape.

use smallvec::SmallVec;

use crate::op::Op;
use crate::tree::hash::{self, Hash128};
use crate::tree::node::{GrammarStage, Node, NodeId, Payload};

#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Tree { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut_raw(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Allocate a leaf (no children), dirty until [`Tree::rehash`] runs.
    pub fn alloc_leaf(&mut self, op: Op, payload: Payload) -> NodeId {
        self.alloc(op, payload, SmallVec::new())
    }

    /// Allocate an internal node, bumping each child's ref-count.
    pub fn alloc(&mut self, op: Op, payload: Payload, children: SmallVec<[NodeId; 4]>) -> NodeId {
        for &c in &children {
            self.node_mut_raw(c).ref_count += 1;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new_dirty(op, payload, children));
        id
    }

    /// Ensure `id` is uniquely owned (ref-count 1), cloning into a new
    /// slot if not. Children are shared (shallow clone) per spec.md §3;
    /// their ref-counts are bumped to reflect the new parent link.
    pub fn make_unique(&mut self, id: NodeId) -> NodeId {
        if self.nodes[id.0 as usize].ref_count <= 1 {
            return id;
        }
        let mut clone = self.nodes[id.0 as usize].clone();
        clone.ref_count = 1;
        for &c in &clone.children {
            self.node_mut_raw(c).ref_count += 1;
        }
        self.node_mut_raw(id).ref_count -= 1;
        let new_id = NodeId(self.nodes.len() as u32);
        self.nodes.push(clone);
        new_id
    }

    /// Release a reference to `id`; when its count reaches zero, release
    /// its children too (the slot itself is left behind, unreachable —
    /// see module doc comment on why this arena never compacts).
    pub fn drop_ref(&mut self, id: NodeId) {
        let node = self.node_mut_raw(id);
        if node.ref_count == 0 {
            return;
        }
        node.ref_count -= 1;
        if node.ref_count == 0 {
            let children: SmallVec<[NodeId; 4]> = node.children.clone();
            for c in children {
                self.drop_ref(c);
            }
        }
    }

    /// Replace the child at `index` of (unique-owned) `parent` with
    /// `new_child`, adjusting ref-counts and marking `parent` dirty.
    pub fn set_child(&mut self, parent: NodeId, index: usize, new_child: NodeId) {
        self.node_mut_raw(new_child).ref_count += 1;
        let old = self.node_mut_raw(parent).children[index];
        self.node_mut_raw(parent).children[index] = new_child;
        self.node_mut_raw(parent).mark_dirty();
        self.drop_ref(old);
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut_raw(child).ref_count += 1;
        self.node_mut_raw(parent).children.push(child);
        self.node_mut_raw(parent).mark_dirty();
    }

    pub fn remove_child_at(&mut self, parent: NodeId, index: usize) {
        let child = self.node_mut_raw(parent).children.remove(index);
        self.node_mut_raw(parent).mark_dirty();
        self.drop_ref(child);
    }

    pub fn set_children(&mut self, parent: NodeId, new_children: SmallVec<[NodeId; 4]>) {
        for &c in &new_children {
            self.node_mut_raw(c).ref_count += 1;
        }
        let old_children = std::mem::replace(&mut self.node_mut_raw(parent).children, new_children);
        self.node_mut_raw(parent).mark_dirty();
        for c in old_children {
            self.drop_ref(c);
        }
    }

    pub fn set_opcode(&mut self, id: NodeId, op: Op) {
        self.node_mut_raw(id).op = op;
        self.node_mut_raw(id).mark_dirty();
    }

    pub fn set_payload(&mut self, id: NodeId, payload: Payload) {
        self.node_mut_raw(id).payload = payload;
        self.node_mut_raw(id).mark_dirty();
    }

    /// `become(other)`: overwrite `id`'s opcode/payload/children with
    /// `other`'s, without changing `id`'s own identity (parents keep
    /// pointing at `id`). Used by the grammar synthesizer's
    /// `ProduceNewTree` and by local simplification's single-child
    /// collapse.
    pub fn become_(&mut self, id: NodeId, other: NodeId) {
        if id == other {
            return;
        }
        let other_node = self.nodes[other.0 as usize].clone();
        for &c in &other_node.children {
            self.node_mut_raw(c).ref_count += 1;
        }
        let old_children = std::mem::replace(&mut self.node_mut_raw(id).children, other_node.children);
        self.node_mut_raw(id).op = other_node.op;
        self.node_mut_raw(id).payload = other_node.payload;
        self.node_mut_raw(id).mark_dirty();
        for c in old_children {
            self.drop_ref(c);
        }
    }

    fn rehash_shallow(&mut self, id: NodeId) {
        let node = &self.nodes[id.0 as usize];
        if node.op.is_commutative() {
            let mut children = node.children.clone();
            crate::tree::order::sort_commutative_children(self, &mut children);
            self.node_mut_raw(id).children = children;
        }
        let node = &self.nodes[id.0 as usize];
        let child_hashes: Vec<Hash128> = node
            .children
            .iter()
            .map(|&c| self.nodes[c.0 as usize].hash)
            .collect();
        let new_hash = hash::hash_node(node.op, &node.payload, &child_hashes);
        let new_depth = 1 + node
            .children
            .iter()
            .map(|&c| self.nodes[c.0 as usize].depth)
            .max()
            .unwrap_or(0);
        let n = self.node_mut_raw(id);
        n.hash = new_hash;
        n.depth = new_depth;
    }

    /// Two-pass `fixIncompleteHashes` (I4): recurse into any dirty child
    /// first, then bring `id` itself up to date. Cheap no-op when nothing
    /// under `id` is dirty.
    pub fn fix_incomplete_hashes(&mut self, id: NodeId) {
        let children: SmallVec<[NodeId; 4]> = self.nodes[id.0 as usize].children.clone();
        for c in children {
            if self.nodes[c.0 as usize].is_dirty() {
                self.fix_incomplete_hashes(c);
            }
        }
        if self.nodes[id.0 as usize].is_dirty() {
            self.rehash_shallow(id);
        }
    }

    /// `rehash`: fold to a fixed point, re-sort, recompute hash. The one
    /// chokepoint every mutation path must run through before a caller
    /// relies on `id`'s hash/depth/children again (§9 design note).
    /// Returns the node id the caller should keep using — folding can
    /// collapse `id` into a different, already-existing node via
    /// `become`-style rewrites, but `id` itself is never invalidated (its
    /// slot just gets overwritten), so this always returns `id` back.
    pub fn rehash(&mut self, id: NodeId) -> NodeId {
        self.fix_incomplete_hashes(id);
        let mut guard = 0;
        loop {
            guard += 1;
            debug_assert!(guard < 10_000, "constant-folding fixed point did not converge");
            self.rehash_shallow(id);
            if !crate::tree::fold::fold_node(self, id) {
                break;
            }
        }
        id
    }

    pub fn mark_optimized(&mut self, id: NodeId, stage: GrammarStage) {
        self.node_mut_raw(id).optimized_by = Some(stage);
    }

    pub fn clear_optimized(&mut self, id: NodeId) {
        self.node_mut_raw(id).optimized_by = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_rehash_leaf_sets_depth_one() {
        let mut tree = Tree::new();
        let id = tree.alloc_leaf(Op::Var, Payload::Var(0));
        tree.rehash(id);
        assert_eq!(tree.node(id).depth, 1);
        assert_ne!(tree.node(id).hash, Hash128::ZERO);
    }

    #[test]
    fn make_unique_clones_shared_node() {
        let mut tree = Tree::new();
        let leaf = tree.alloc_leaf(Op::Var, Payload::Var(0));
        tree.rehash(leaf);
        let mut kids = SmallVec::new();
        kids.push(leaf);
        let parent_a = tree.alloc(Op::Neg, Payload::None, kids.clone());
        let parent_b = tree.alloc(Op::Not, Payload::None, kids);
        assert_eq!(tree.node(leaf).ref_count, 2);
        let unique_a = tree.make_unique(parent_a);
        assert_eq!(unique_a, parent_a); // parent_a itself was never shared
        let _ = parent_b;
    }

    #[test]
    fn set_child_drops_old_reference() {
        let mut tree = Tree::new();
        let a = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let b = tree.alloc_leaf(Op::Var, Payload::Var(1));
        tree.rehash(a);
        tree.rehash(b);
        let mut kids = SmallVec::new();
        kids.push(a);
        let parent = tree.alloc(Op::Neg, Payload::None, kids);
        assert_eq!(tree.node(a).ref_count, 1);
        tree.set_child(parent, 0, b);
        assert_eq!(tree.node(a).ref_count, 0);
        assert_eq!(tree.node(b).ref_count, 1);
    }
}
