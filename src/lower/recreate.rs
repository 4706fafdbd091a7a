//! Inversion/negation recreation (spec.md §4.6): after the grammar has
//! reached its fixed point, re-introduce the sugar opcodes I1 forbids
//! inside the canonical tree, wherever doing so shortens the eventual
//! bytecode or reduces stack depth. This is the one stage in the
//! pipeline that is *expected* to leave `Div`/`Sub`/`RSub`/`RDiv`/`Inv`/
//! `Exp`/`Sqrt`/`RSqrt` behind (P4).

use smallvec::SmallVec;

use crate::op::Op;
use crate::tree::arena::Tree;
use crate::tree::node::{NodeId, Payload};
use crate::tree::range;

pub fn recreate(tree: &mut Tree, root: NodeId) -> NodeId {
    lower_node(tree, root)
}

fn lower_node(tree: &mut Tree, id: NodeId) -> NodeId {
    let children: SmallVec<[NodeId; 4]> = tree.node(id).children.clone();
    for (i, &c) in children.iter().enumerate() {
        let new_c = lower_node(tree, c);
        if new_c != c {
            tree.set_child(id, i, new_c);
        }
    }
    let id = tree.make_unique(id);
    match tree.node(id).op {
        Op::Mul => recreate_mul(tree, id),
        Op::Add => recreate_add(tree, id),
        Op::Pow => recreate_pow(tree, id),
        _ => id,
    }
}

fn build_group(tree: &mut Tree, op: Op, mut terms: SmallVec<[NodeId; 4]>, empty_value: f64) -> NodeId {
    match terms.len() {
        0 => {
            let leaf = tree.alloc_leaf(Op::Immed, Payload::Immed(empty_value));
            tree.rehash(leaf)
        }
        1 => terms.remove(0),
        _ => {
            let node = tree.alloc(op, Payload::None, terms);
            tree.rehash(node)
        }
    }
}

fn recreate_mul(tree: &mut Tree, id: NodeId) -> NodeId {
    let factors: SmallVec<[NodeId; 4]> = tree.node(id).children.clone();
    let mut numerator: SmallVec<[NodeId; 4]> = SmallVec::new();
    let mut divisor: SmallVec<[NodeId; 4]> = SmallVec::new();

    for &f in &factors {
        if tree.node(f).op == Op::Pow {
            let base = tree.node(f).children[0];
            let exp = tree.node(f).children[1];
            if let Some(e) = tree.node(exp).payload.as_immed() {
                if e < 0.0 {
                    if e == -1.0 {
                        divisor.push(base);
                    } else {
                        let pos_exp = tree.alloc_leaf(Op::Immed, Payload::Immed(-e));
                        let pos_exp = tree.rehash(pos_exp);
                        let mut kids = SmallVec::new();
                        kids.push(base);
                        kids.push(pos_exp);
                        let pow = tree.alloc(Op::Pow, Payload::None, kids);
                        divisor.push(tree.rehash(pow));
                    }
                    continue;
                }
            }
        }
        numerator.push(f);
    }

    if divisor.is_empty() {
        return id;
    }

    let numerator_node = build_group(tree, Op::Mul, numerator, 1.0);
    let divisor_node = build_group(tree, Op::Mul, divisor, 1.0);

    if let Some(1.0) = tree.node(numerator_node).payload.as_immed() {
        let mut kids = SmallVec::new();
        kids.push(divisor_node);
        let inv = tree.alloc(Op::Inv, Payload::None, kids);
        let inv = tree.rehash(inv);
        tree.become_(id, inv);
        return id;
    }

    let (op, a, b) = if tree.node(numerator_node).depth <= tree.node(divisor_node).depth {
        (Op::Div, numerator_node, divisor_node)
    } else {
        (Op::RDiv, divisor_node, numerator_node)
    };
    let mut kids = SmallVec::new();
    kids.push(a);
    kids.push(b);
    let div = tree.alloc(op, Payload::None, kids);
    let div = tree.rehash(div);
    tree.become_(id, div);
    id
}

fn recreate_add(tree: &mut Tree, id: NodeId) -> NodeId {
    let terms: SmallVec<[NodeId; 4]> = tree.node(id).children.clone();
    let mut minuend: SmallVec<[NodeId; 4]> = SmallVec::new();
    let mut subtrahend: SmallVec<[NodeId; 4]> = SmallVec::new();

    for &t in &terms {
        if tree.node(t).op == Op::Mul {
            let factors: SmallVec<[NodeId; 4]> = tree.node(t).children.clone();
            if let Some(pos) = factors
                .iter()
                .position(|&f| tree.node(f).payload.as_immed() == Some(-1.0))
            {
                let rest: SmallVec<[NodeId; 4]> = factors
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != pos)
                    .map(|(_, &f)| f)
                    .collect();
                subtrahend.push(build_group(tree, Op::Mul, rest, 1.0));
                continue;
            }
        }
        minuend.push(t);
    }

    if subtrahend.is_empty() {
        return id;
    }

    let minuend_node = build_group(tree, Op::Add, minuend, 0.0);
    let subtrahend_node = build_group(tree, Op::Add, subtrahend, 0.0);

    let (op, a, b) = if tree.node(minuend_node).depth == 1 {
        (Op::RSub, subtrahend_node, minuend_node)
    } else {
        (Op::Sub, minuend_node, subtrahend_node)
    };
    let mut kids = SmallVec::new();
    kids.push(a);
    kids.push(b);
    let sub = tree.alloc(op, Payload::None, kids);
    let sub = tree.rehash(sub);
    tree.become_(id, sub);
    id
}

fn recreate_pow(tree: &mut Tree, id: NodeId) -> NodeId {
    let base = tree.node(id).children[0];
    let exp = tree.node(id).children[1];

    if let Some(e) = tree.node(exp).payload.as_immed() {
        if e == 0.5 {
            let mut kids = SmallVec::new();
            kids.push(base);
            let sqrt = tree.alloc(Op::Sqrt, Payload::None, kids);
            let sqrt = tree.rehash(sqrt);
            tree.become_(id, sqrt);
            return id;
        }
        if e == -0.5 {
            let mut kids = SmallVec::new();
            kids.push(base);
            let rsqrt = tree.alloc(Op::RSqrt, Payload::None, kids);
            let rsqrt = tree.rehash(rsqrt);
            tree.become_(id, rsqrt);
            return id;
        }
    }

    if let Some(c) = tree.node(base).payload.as_immed() {
        if c > 0.0 {
            let log_c = c.ln();
            if log_c.is_finite() {
                let log_c_leaf = tree.alloc_leaf(Op::Immed, Payload::Immed(log_c));
                let log_c_leaf = tree.rehash(log_c_leaf);
                let mut mul_kids = SmallVec::new();
                mul_kids.push(log_c_leaf);
                mul_kids.push(exp);
                let mul = tree.alloc(Op::Mul, Payload::None, mul_kids);
                let mul = tree.rehash(mul);
                let mut exp_kids = SmallVec::new();
                exp_kids.push(mul);
                let exp_node = tree.alloc(Op::Exp, Payload::None, exp_kids);
                let exp_node = tree.rehash(exp_node);
                tree.become_(id, exp_node);
                return id;
            }
        }
    }

    if tree.node(exp).payload.as_immed().map(|e| e.fract() != 0.0).unwrap_or(false)
        && range::eval_range(tree, base).is_definitely_positive()
    {
        let mut log_kids = SmallVec::new();
        log_kids.push(base);
        let log_node = tree.alloc(Op::Log, Payload::None, log_kids);
        let log_node = tree.rehash(log_node);
        let mut mul_kids = SmallVec::new();
        mul_kids.push(exp);
        mul_kids.push(log_node);
        let mul = tree.alloc(Op::Mul, Payload::None, mul_kids);
        let mul = tree.rehash(mul);
        let mut exp_kids = SmallVec::new();
        exp_kids.push(mul);
        let exp_node = tree.alloc(Op::Exp, Payload::None, exp_kids);
        let exp_node = tree.rehash(exp_node);
        tree.become_(id, exp_node);
        return id;
    }

    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Payload;

    #[test]
    fn mul_with_negative_one_exponent_becomes_div() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let y = tree.alloc_leaf(Op::Var, Payload::Var(1));
        let y = tree.rehash(y);
        let neg_one = tree.alloc_leaf(Op::Immed, Payload::Immed(-1.0));
        let neg_one = tree.rehash(neg_one);
        let mut pow_kids = SmallVec::new();
        pow_kids.push(y);
        pow_kids.push(neg_one);
        let inv_y = tree.alloc(Op::Pow, Payload::None, pow_kids);
        let inv_y = tree.rehash(inv_y);
        let mut mul_kids = SmallVec::new();
        mul_kids.push(x);
        mul_kids.push(inv_y);
        let mul = tree.alloc(Op::Mul, Payload::None, mul_kids);
        let mul = tree.rehash(mul);

        let root = recreate(&mut tree, mul);
        assert_eq!(tree.node(root).op, Op::Div);
    }

    #[test]
    fn pow_positive_constant_base_becomes_exp() {
        let mut tree = Tree::new();
        let x = tree.alloc_leaf(Op::Var, Payload::Var(0));
        let x = tree.rehash(x);
        let base = tree.alloc_leaf(Op::Immed, Payload::Immed(2.0));
        let base = tree.rehash(base);
        let mut kids = SmallVec::new();
        kids.push(base);
        kids.push(x);
        let pow = tree.alloc(Op::Pow, Payload::None, kids);
        let pow = tree.rehash(pow);

        let root = recreate(&mut tree, pow);
        assert_eq!(tree.node(root).op, Op::Exp);
    }
}
