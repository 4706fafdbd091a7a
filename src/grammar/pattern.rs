//! Pattern nodes and rule shape (spec.md §4.5), the runtime-facing half
//! of the "three-way tagged pattern node" the §9 design note calls out.
//! Grammar *authoring* (the offline table generator) is explicitly out of
//! core; these are hand-built in [`crate::grammar::tables`].

use crate::op::Op;
use crate::tree::NodeId;

/// Restricts what a [`PatternNode::ParamHolder`] may bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    None,
    /// Must be an integer-valued immediate.
    Integer,
    /// Must have a definitely-positive range.
    Positive,
    /// Must have a definitely-negative range.
    Negative,
    /// Must be the immediate `1` or `-1`.
    PlusMinusOne,
    /// Must be a comparison/`And`/`Or`/`Not`/`NotNot` node (logical context).
    Logical,
}

/// How a [`PatternNode::SubFunction`]'s parameter list is matched against
/// a tree node's actual children (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchType {
    /// Child *i* of the tree must match parameter *i*.
    Positional,
    /// Every parameter matches some distinct child, in any permutation;
    /// child count must equal parameter count.
    Selected,
    /// Every parameter matches some distinct child; children left over
    /// are bound to `rest_holder` as a group.
    AnyOrder { rest_holder: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternNode {
    NumConstant(f64),
    ParamHolder {
        id: u32,
        constraint: Constraint,
    },
    SubFunction {
        op: Op,
        params: Vec<PatternNode>,
        match_type: MatchType,
    },
    /// Produce-side only: splices the group bound to an `AnyOrder`
    /// rest-holder directly into the enclosing `SubFunction`'s children.
    RestHolder(u32),
}

/// Either rebuild the whole matched subtree (`become`) or substitute the
/// matched node's children in place while keeping its opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Produce {
    ProduceNewTree(PatternNode),
    ReplaceParams(Vec<PatternNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub op: Op,
    pub min_params: usize,
    pub match_type: MatchType,
    pub params: Vec<PatternNode>,
    pub produce: Produce,
}

/// Snapshot of what a match bound, passed from matcher to synthesizer.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub holders: std::collections::HashMap<u32, NodeId>,
    pub rest: std::collections::HashMap<u32, Vec<NodeId>>,
}
