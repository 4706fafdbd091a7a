//! Hand-authored rule tables (spec.md §4.5, §9: "grammar authoring is out
//! of core"). The original fparser ships a generated, bucket-sorted
//! static array (`fpoptimizer_grammar.dat` + its loader); this crate
//! supplies the same three ordered rule-sets as plain `Vec<Rule>` built
//! by hand, small enough to read in one sitting, per `SPEC_FULL.md` §11.

use crate::op::Op;

use super::pattern::{Constraint, MatchType, PatternNode, Produce, Rule};

const HOLDER_X: u32 = 0;
const REST: u32 = 1;

/// `sin(x)^2 + cos(x)^2 -> 1`, plus whatever else the `Add` was summing.
fn pythagorean_identity() -> Rule {
    let sin_sq = PatternNode::SubFunction {
        op: Op::Pow,
        params: vec![
            PatternNode::SubFunction {
                op: Op::Sin,
                params: vec![PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None }],
                match_type: MatchType::Positional,
            },
            PatternNode::NumConstant(2.0),
        ],
        match_type: MatchType::Positional,
    };
    let cos_sq = PatternNode::SubFunction {
        op: Op::Pow,
        params: vec![
            PatternNode::SubFunction {
                op: Op::Cos,
                params: vec![PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None }],
                match_type: MatchType::Positional,
            },
            PatternNode::NumConstant(2.0),
        ],
        match_type: MatchType::Positional,
    };
    Rule {
        op: Op::Add,
        min_params: 2,
        match_type: MatchType::AnyOrder { rest_holder: REST },
        params: vec![sin_sq, cos_sq],
        produce: Produce::ProduceNewTree(PatternNode::SubFunction {
            op: Op::Add,
            params: vec![PatternNode::NumConstant(1.0), PatternNode::RestHolder(REST)],
            match_type: MatchType::Positional,
        }),
    }
}

/// `x * x^-1 -> 1`, plus whatever else the `Mul` was multiplying.
fn reciprocal_cancellation() -> Rule {
    let x = PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None };
    let inv_x = PatternNode::SubFunction {
        op: Op::Pow,
        params: vec![
            PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None },
            PatternNode::NumConstant(-1.0),
        ],
        match_type: MatchType::Positional,
    };
    Rule {
        op: Op::Mul,
        min_params: 2,
        match_type: MatchType::AnyOrder { rest_holder: REST },
        params: vec![x, inv_x],
        produce: Produce::ProduceNewTree(PatternNode::SubFunction {
            op: Op::Mul,
            params: vec![PatternNode::NumConstant(1.0), PatternNode::RestHolder(REST)],
            match_type: MatchType::Positional,
        }),
    }
}

/// `log(exp(x)) -> x`.
fn log_of_exp() -> Rule {
    Rule {
        op: Op::Log,
        min_params: 1,
        match_type: MatchType::Positional,
        params: vec![PatternNode::SubFunction {
            op: Op::Exp,
            params: vec![PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None }],
            match_type: MatchType::Positional,
        }],
        produce: Produce::ProduceNewTree(PatternNode::ParamHolder {
            id: HOLDER_X,
            constraint: Constraint::None,
        }),
    }
}

/// `exp(log(x)) -> x`.
fn exp_of_log() -> Rule {
    Rule {
        op: Op::Exp,
        min_params: 1,
        match_type: MatchType::Positional,
        params: vec![PatternNode::SubFunction {
            op: Op::Log,
            params: vec![PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None }],
            match_type: MatchType::Positional,
        }],
        produce: Produce::ProduceNewTree(PatternNode::ParamHolder {
            id: HOLDER_X,
            constraint: Constraint::None,
        }),
    }
}

/// `min(a, a, rest...) -> min(a, rest...)` (and the `Max` mirror). Same
/// "`a` appears twice, dedupe" idea the CSE stage relies on elsewhere,
/// expressed here as a grammar rule because it needs to match across an
/// arbitrary number of siblings rather than a fixed-arity node.
fn duplicate_operand_collapse(op: Op) -> Rule {
    let a = PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None };
    Rule {
        op,
        min_params: 2,
        match_type: MatchType::AnyOrder { rest_holder: REST },
        params: vec![a.clone(), a],
        produce: Produce::ProduceNewTree(PatternNode::SubFunction {
            op,
            params: vec![
                PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None },
                PatternNode::RestHolder(REST),
            ],
            match_type: MatchType::Positional,
        }),
    }
}

/// `if(x<0, -x, x) -> abs(x)`. `-x` is still `x * -1` at this point in the
/// pipeline (`Neg` is sugar, only reintroduced post-grammar), so the
/// then-branch pattern matches that product directly. The condition is
/// written against its post-`normalize_comparison` shape: a leaf's minimum
/// possible hash belongs to `Immed(0.0)` (order.rs, `hash_leaf`), so
/// `cmp(x, 0.0)` always normalizes with the constant first and the
/// operator mirrored, i.e. `Greater(0.0, x)` rather than `Less(x, 0.0)`.
fn negative_branch_is_abs() -> Rule {
    let x = PatternNode::ParamHolder { id: HOLDER_X, constraint: Constraint::None };
    let cond = PatternNode::SubFunction {
        op: Op::Greater,
        params: vec![PatternNode::NumConstant(0.0), x.clone()],
        match_type: MatchType::Positional,
    };
    let negated_x = PatternNode::SubFunction {
        op: Op::Mul,
        params: vec![x.clone(), PatternNode::NumConstant(-1.0)],
        match_type: MatchType::Selected,
    };
    Rule {
        op: Op::If,
        min_params: 3,
        match_type: MatchType::Positional,
        params: vec![cond, negated_x, x.clone()],
        produce: Produce::ProduceNewTree(PatternNode::SubFunction {
            op: Op::Abs,
            params: vec![x],
            match_type: MatchType::Positional,
        }),
    }
}

/// First grammar pass: cheap algebraic cancellations applied before the
/// interval-driven final passes.
pub fn intermediate() -> Vec<Rule> {
    vec![reciprocal_cancellation(), pythagorean_identity(), negative_branch_is_abs()]
}

/// Second pass: transcendental inverse-pair cancellation.
pub fn final1() -> Vec<Rule> {
    vec![log_of_exp(), exp_of_log()]
}

/// Third pass: structural dedupe that only pays off once earlier passes
/// have normalized operands enough for hash-equality to find the dupes.
pub fn final2() -> Vec<Rule> {
    vec![
        duplicate_operand_collapse(Op::Min),
        duplicate_operand_collapse(Op::Max),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_non_empty_and_root_opcode_matches() {
        for rule in intermediate().into_iter().chain(final1()).chain(final2()) {
            assert!(!rule.params.is_empty() || rule.min_params == 0);
            let _ = rule.op;
        }
    }
}
