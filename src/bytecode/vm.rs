//! A trivial RPN stack evaluator.
//!
//! This is the out-of-scope "bytecode evaluator (the stack interpreter)"
//! from spec.md §1, included only because P1 (semantic preservation) has
//! no meaning without something to evaluate `before` and `after` bytecode
//! against. It is intentionally mechanical: no tiering, no caching, no
//! nondeterminism — a single pass over the stack the way the teacher's
//! own VM executes a single [`super::chunk::Bytecode`] frame, minus
//! everything MeTTa-specific (bindings, spaces, call frames).

use crate::op::Op;
use super::chunk::Bytecode;
use std::fmt;

/// Errors raised while executing a [`Bytecode`] program.
#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    StackUnderflow,
    InvalidOpcode(u8),
    InvalidImmediate(u16),
    InvalidVariable(u16),
    InvalidCallee(u16),
    IpOutOfBounds,
    DivisionByZero,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::InvalidOpcode(b) => write!(f, "invalid opcode byte 0x{b:02x}"),
            Self::InvalidImmediate(i) => write!(f, "invalid immediate index {i}"),
            Self::InvalidVariable(i) => write!(f, "invalid variable index {i}"),
            Self::InvalidCallee(i) => write!(f, "invalid callee index {i}"),
            Self::IpOutOfBounds => write!(f, "instruction pointer out of bounds"),
            Self::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for VmError {}

pub type VmResult<T> = Result<T, VmError>;

/// A host callback invoked by `FCall`/`PCall`. Takes its arguments off
/// the evaluator's stack (already popped, in call order) and returns one
/// result, matching spec.md §6 ("push args, emit call-opcode").
pub type Callback = dyn Fn(&[f64]) -> f64;

/// Evaluate `bc` against positional variable bindings `vars`, dispatching
/// `FCall`/`PCall` to `callbacks` by index. `arity` gives each callback's
/// argument count since the bytecode alone doesn't encode it.
pub fn eval(
    bc: &Bytecode,
    vars: &[f64],
    callbacks: &[(usize, &Callback)],
) -> VmResult<f64> {
    let mut stack: Vec<f64> = Vec::with_capacity(16);
    let mut ip = 0usize;

    while ip < bc.code.len() {
        let byte = bc.code[ip];
        let op = Op::from_byte(byte).ok_or(VmError::InvalidOpcode(byte))?;
        ip += 1;

        match op {
            Op::Immed => {
                let idx = read_u16(&bc.code, ip)?;
                ip += 2;
                let v = *bc
                    .immed
                    .get(idx as usize)
                    .ok_or(VmError::InvalidImmediate(idx))?;
                stack.push(v);
            }
            Op::Var => {
                let idx = read_u16(&bc.code, ip)?;
                ip += 2;
                let v = *vars.get(idx as usize).ok_or(VmError::InvalidVariable(idx))?;
                stack.push(v);
            }
            Op::Dup => {
                let top = *stack.last().ok_or(VmError::StackUnderflow)?;
                stack.push(top);
            }
            Op::Fetch => {
                let idx = read_u16(&bc.code, ip)? as usize;
                ip += 2;
                let v = *stack.get(idx).ok_or(VmError::StackUnderflow)?;
                stack.push(v);
            }
            Op::PopNMov => {
                let i = read_u16(&bc.code, ip)? as usize;
                let j = read_u16(&bc.code, ip + 2)? as usize;
                ip += 4;
                let v = *stack.get(j).ok_or(VmError::StackUnderflow)?;
                *stack.get_mut(i).ok_or(VmError::StackUnderflow)? = v;
                stack.truncate(i + 1);
            }
            Op::Jump => {
                ip = read_u32(&bc.code, ip)? as usize;
            }
            Op::JumpIfZero => {
                let target = read_u32(&bc.code, ip)? as usize;
                ip += 4;
                let cond = stack.pop().ok_or(VmError::StackUnderflow)?;
                if cond == 0.0 {
                    ip = target;
                }
            }
            Op::FCall | Op::PCall => {
                let idx = read_u16(&bc.code, ip)?;
                ip += 2;
                let (arity, f) = *callbacks
                    .get(idx as usize)
                    .ok_or(VmError::InvalidCallee(idx))?;
                if stack.len() < arity {
                    return Err(VmError::StackUnderflow);
                }
                let args_start = stack.len() - arity;
                let args: Vec<f64> = stack.drain(args_start..).collect();
                stack.push(f(&args));
            }
            _ => apply_algebraic(op, &mut stack)?,
        }
    }

    stack.pop().ok_or(VmError::StackUnderflow)
}

fn apply_algebraic(op: Op, stack: &mut Vec<f64>) -> VmResult<()> {
    // Every canonical and sugar opcode lowers, in bytecode form, to
    // either a unary or binary RPN instruction: the tree's variadic
    // Add/Mul arrive here only after the emitter has flattened them into
    // a left-to-right chain of binary ops (see `crate::emit`).
    let pop1 = |s: &mut Vec<f64>| s.pop().ok_or(VmError::StackUnderflow);
    let pop2 = |s: &mut Vec<f64>| -> VmResult<(f64, f64)> {
        let b = s.pop().ok_or(VmError::StackUnderflow)?;
        let a = s.pop().ok_or(VmError::StackUnderflow)?;
        Ok((a, b))
    };

    let result = match op {
        Op::Add => { let (a, b) = pop2(stack)?; a + b }
        Op::Mul => { let (a, b) = pop2(stack)?; a * b }
        Op::Sub => { let (a, b) = pop2(stack)?; a - b }
        Op::RSub => { let (a, b) = pop2(stack)?; b - a }
        Op::Div => {
            let (a, b) = pop2(stack)?;
            if b == 0.0 {
                return Err(VmError::DivisionByZero);
            }
            a / b
        }
        Op::RDiv => {
            let (a, b) = pop2(stack)?;
            if a == 0.0 {
                return Err(VmError::DivisionByZero);
            }
            b / a
        }
        Op::Mod => { let (a, b) = pop2(stack)?; a % b }
        Op::Pow => { let (a, b) = pop2(stack)?; a.powf(b) }
        Op::RPow => { let (a, b) = pop2(stack)?; b.powf(a) }
        Op::Atan2 => { let (a, b) = pop2(stack)?; a.atan2(b) }
        Op::Min => { let (a, b) = pop2(stack)?; a.min(b) }
        Op::Max => { let (a, b) = pop2(stack)?; a.max(b) }
        Op::Equal => { let (a, b) = pop2(stack)?; bool_to_f64(a == b) }
        Op::NEqual => { let (a, b) = pop2(stack)?; bool_to_f64(a != b) }
        Op::Less => { let (a, b) = pop2(stack)?; bool_to_f64(a < b) }
        Op::LessOrEq => { let (a, b) = pop2(stack)?; bool_to_f64(a <= b) }
        Op::Greater => { let (a, b) = pop2(stack)?; bool_to_f64(a > b) }
        Op::GreaterOrEq => { let (a, b) = pop2(stack)?; bool_to_f64(a >= b) }
        Op::And => { let (a, b) = pop2(stack)?; bool_to_f64(a != 0.0 && b != 0.0) }
        Op::Or => { let (a, b) = pop2(stack)?; bool_to_f64(a != 0.0 || b != 0.0) }
        Op::Not => bool_to_f64(pop1(stack)? == 0.0),
        Op::NotNot => bool_to_f64(pop1(stack)? != 0.0),
        Op::Neg => -pop1(stack)?,
        Op::Inv => 1.0 / pop1(stack)?,
        Op::Sqr => { let v = pop1(stack)?; v * v }
        Op::Sqrt => pop1(stack)?.sqrt(),
        Op::RSqrt => 1.0 / pop1(stack)?.sqrt(),
        Op::Sin => pop1(stack)?.sin(),
        Op::Cos => pop1(stack)?.cos(),
        Op::Tan => pop1(stack)?.tan(),
        Op::Sinh => pop1(stack)?.sinh(),
        Op::Cosh => pop1(stack)?.cosh(),
        Op::Tanh => pop1(stack)?.tanh(),
        Op::Asin => pop1(stack)?.asin(),
        Op::Acos => pop1(stack)?.acos(),
        Op::Atan => pop1(stack)?.atan(),
        Op::Asinh => pop1(stack)?.asinh(),
        Op::Acosh => pop1(stack)?.acosh(),
        Op::Atanh => pop1(stack)?.atanh(),
        Op::Log => pop1(stack)?.ln(),
        Op::Log2 => pop1(stack)?.log2(),
        Op::Log10 => pop1(stack)?.log10(),
        Op::Exp => pop1(stack)?.exp(),
        Op::Exp2 => pop1(stack)?.exp2(),
        Op::Ceil => pop1(stack)?.ceil(),
        Op::Floor => pop1(stack)?.floor(),
        Op::Int => pop1(stack)?.round(),
        Op::Abs => pop1(stack)?.abs(),
        Op::Cot => 1.0 / pop1(stack)?.tan(),
        Op::Sec => 1.0 / pop1(stack)?.cos(),
        Op::Csc => 1.0 / pop1(stack)?.sin(),
        Op::Deg => pop1(stack)?.to_degrees(),
        Op::Rad => pop1(stack)?.to_radians(),
        other => return Err(VmError::InvalidOpcode(other.to_byte())),
    };
    stack.push(result);
    Ok(())
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn read_u16(code: &[u8], at: usize) -> VmResult<u16> {
    let bytes = code.get(at..at + 2).ok_or(VmError::IpOutOfBounds)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(code: &[u8], at: usize) -> VmResult<u32> {
    let bytes = code.get(at..at + 4).ok_or(VmError::IpOutOfBounds)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::chunk::BytecodeBuilder;

    #[test]
    fn evaluates_simple_arithmetic() {
        let mut b = BytecodeBuilder::new();
        b.push_var(0).push_immed(3.0).push_op(Op::Mul);
        let bc = b.finish();
        let result = eval(&bc, &[2.0], &[]).unwrap();
        assert_eq!(result, 6.0);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let mut b = BytecodeBuilder::new();
        b.push_immed(1.0).push_immed(0.0).push_op(Op::Div);
        let bc = b.finish();
        assert_eq!(eval(&bc, &[], &[]), Err(VmError::DivisionByZero));
    }

    #[test]
    fn dup_and_fetch_reuse_stack_slots() {
        let mut b = BytecodeBuilder::new();
        // x*x via Dup instead of loading Var twice.
        b.push_var(0).push_op(Op::Dup).push_op(Op::Mul);
        let bc = b.finish();
        assert_eq!(eval(&bc, &[4.0], &[]).unwrap(), 16.0);
    }

    #[test]
    fn fcall_dispatches_to_callback() {
        let mut b = BytecodeBuilder::new();
        b.push_immed(5.0).push_callee(Op::FCall, 0);
        let bc = b.finish();
        let double = |args: &[f64]| args[0] * 2.0;
        let callbacks: Vec<(usize, &Callback)> = vec![(1, &double)];
        assert_eq!(eval(&bc, &[], &callbacks).unwrap(), 10.0);
    }
}
