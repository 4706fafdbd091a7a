//! The arena-resident node type (spec.md §3).

use smallvec::SmallVec;

use crate::op::Op;
use crate::tree::hash::Hash128;

/// Index into a [`crate::tree::arena::Tree`]'s node arena. Only meaningful
/// relative to the arena that produced it (spec.md §5: a `Tree` is not
/// `Sync`, its indices carry no identity outside their own arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// The union payload, spec.md §3 `{ double literal, variable index,
/// callee index, none }`, expressed as a sum type per the §9 design note
/// rather than a bit-packed union (memory density was never a constraint
/// here; clarity was).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    None,
    Immed(f64),
    Var(u16),
    Callee(u16),
}

impl Payload {
    pub fn as_immed(&self) -> Option<f64> {
        match self {
            Payload::Immed(v) => Some(*v),
            _ => None,
        }
    }
}

/// Marks which grammar pass a node was last declared fixed-point against
/// (spec.md §4.5: "the driver marks each node with the grammar it was
/// declared fixed-point against, so revisits short-circuit"). Cleared on
/// any mutation that changes opcode, payload, or children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarStage {
    Intermediate,
    Final1,
    Final2,
}

/// An arena-resident expression node.
///
/// Children live inline up to 4 before spilling to the heap — the
/// overwhelming majority of nodes in a typical expression tree are binary
/// or ternary (`Pow`, `If`, comparisons), and `Add`/`Mul` variadic fan-out
/// beyond 4 is uncommon enough that a `SmallVec` pays for itself, the same
/// tradeoff the teacher makes for its `CallFrame` locals.
#[derive(Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub payload: Payload,
    pub children: SmallVec<[NodeId; 4]>,
    pub hash: Hash128,
    /// `1 + max(child depth)`; `0` is the "incompletely hashed" sentinel
    /// (I4) — a node in this state must be rehashed before any structural
    /// query reads its `hash` or `depth`.
    pub depth: u32,
    pub optimized_by: Option<GrammarStage>,
    /// Count of parents (or root slots) referencing this arena slot.
    /// Mutation requires `ref_count == 1` (I5); callers go through
    /// `Tree::make_unique` to enforce copy-on-write.
    pub ref_count: u32,
}

impl Node {
    pub fn new_dirty(op: Op, payload: Payload, children: SmallVec<[NodeId; 4]>) -> Self {
        Node {
            op,
            payload,
            children,
            hash: Hash128::ZERO,
            depth: 0,
            optimized_by: None,
            ref_count: 1,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.depth == 0
    }

    pub fn mark_dirty(&mut self) {
        self.depth = 0;
        self.hash = Hash128::ZERO;
        self.optimized_by = None;
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
