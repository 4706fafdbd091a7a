//! The "Data" object handed to the optimizer (spec.md §6): bytecode plus
//! everything needed to interpret it — variable naming and the arity of
//! each external callback, since neither is recoverable from the byte
//! stream alone.

use crate::bytecode::chunk::Bytecode;

/// What kind of host collaborator a callback index refers to. Mirrors
/// spec.md §6's "function pointer or nested parser" distinction; this
/// crate never calls into either (that's the out-of-scope evaluator's
/// job) but the optimizer still needs to know each one's arity to lift
/// `FCall`/`PCall` sites into tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// A plain host function invoked via `Op::FCall`.
    Function,
    /// A nested sub-parser invoked via `Op::PCall`.
    NestedParser,
}

/// One entry of the callback table referenced by `FCall`/`PCall` payload
/// indices.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackDescriptor {
    pub name: String,
    pub arity: usize,
    pub kind: CallbackKind,
}

impl CallbackDescriptor {
    pub fn function(name: impl Into<String>, arity: usize) -> Self {
        CallbackDescriptor { name: name.into(), arity, kind: CallbackKind::Function }
    }

    pub fn nested_parser(name: impl Into<String>, arity: usize) -> Self {
        CallbackDescriptor { name: name.into(), arity, kind: CallbackKind::NestedParser }
    }
}

/// The optimizer's sole external interface (spec.md §6): owns the
/// bytecode plus variable/callback metadata. `optimize::optimize` takes
/// this by `&mut` and rewrites `bytecode` in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub bytecode: Bytecode,
    pub var_count: usize,
    pub var_names: Vec<String>,
    pub callbacks: Vec<CallbackDescriptor>,
}

impl Snapshot {
    pub fn new(bytecode: Bytecode, var_names: Vec<String>, callbacks: Vec<CallbackDescriptor>) -> Self {
        Snapshot { var_count: var_names.len(), bytecode, var_names, callbacks }
    }

    /// Arity of each callback, positionally indexed — the shape
    /// [`crate::lift::lift`] needs and bytecode itself can't supply.
    pub fn callback_arities(&self) -> Vec<usize> {
        self.callbacks.iter().map(|c| c.arity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_arities_projects_positionally() {
        let snap = Snapshot::new(
            Bytecode::default(),
            vec!["x".into(), "y".into()],
            vec![
                CallbackDescriptor::function("f", 1),
                CallbackDescriptor::nested_parser("g", 3),
            ],
        );
        assert_eq!(snap.callback_arities(), vec![1, 3]);
        assert_eq!(snap.var_count, 2);
    }
}
