//! The canonical expression tree: arena, node type, structural hashing,
//! constant folding, interval analysis, and algebraic regrouping
//! (spec.md §3, §4.1–§4.4).

pub mod arena;
pub mod fold;
pub mod hash;
pub mod node;
pub mod order;
pub mod range;
pub mod regroup;

pub use arena::Tree;
pub use hash::Hash128;
pub use node::{GrammarStage, Node, NodeId, Payload};
