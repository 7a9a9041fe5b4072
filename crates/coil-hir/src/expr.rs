//! Bound expressions.
//!
//! Every node is fully typed and name-resolved; operators and casts have
//! already been replaced by calls to fixed-name builtin callables.

#![allow(missing_docs)]

use coil_ir::PouId;
use smol_str::SmolStr;
use text_size::TextRange;

use crate::types::TypeId;

/// Identity of one declared local, assigned in declaration-discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

/// Short-circuiting boolean operators; everything else is a builtin call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuitOp {
    And,
    Or,
}

/// Bound expression with its resolved type and source span.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub span: Option<TextRange>,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, ty: TypeId) -> Self {
        Self {
            kind,
            ty,
            span: None,
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: TextRange) -> Self {
        self.span = Some(span);
        self
    }
}

/// Bound expression variants.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Raw bit pattern of a typed literal.
    Literal(u64),
    /// Reference to a parameter by its index in the signature.
    Param(usize),
    /// Reference to a declared local.
    Local(LocalId),
    /// The function's own return slot, written by assigning to the
    /// function name.
    ReturnValue,
    /// Reference to a global variable.
    Global { block: usize, var: usize },
    /// Field of the enclosing instance (function blocks and methods).
    InstanceVar(usize),
    /// Call with a return value (user function or builtin).
    Call(Box<CallExpr>),
    /// `AND`/`OR` with short-circuit evaluation.
    ShortCircuit {
        op: ShortCircuitOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Struct field access.
    Field { base: Box<Expr>, field: usize },
    /// Array element access (bounds-checked) or pointer indexing
    /// (unchecked), depending on the base type.
    Index { base: Box<Expr>, index: Box<Expr> },
    /// Pointer dereference (`p^`).
    Deref(Box<Expr>),
    /// Address-of (`ADR`, `REF`); operand must be addressable.
    AddressOf(Box<Expr>),
}

/// Callee of a bound call.
#[derive(Debug, Clone)]
pub enum Callee {
    /// Fixed-name builtin (operators, casts); all arguments are inputs and
    /// the single output is the expression value.
    Builtin(SmolStr),
    /// User function or program.
    Pou(PouId),
    /// Function-block body or method invoked on an instance lvalue.
    Instance { target: Expr, pou: PouId },
}

/// One bound argument, matched to a parameter index by the binder.
///
/// For `Out` parameters the value is the destination lvalue.
#[derive(Debug, Clone)]
pub struct CallArg {
    pub param: usize,
    pub value: Expr,
}

/// Bound call with resolved callee and matched arguments.
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Callee,
    pub args: Vec<CallArg>,
}
