//! Bound statements, declarations and initializers.

#![allow(missing_docs)]

use smol_str::SmolStr;
use text_size::TextRange;

use crate::expr::{CallExpr, Expr, LocalId};
use crate::types::TypeId;

/// Bound statement with its source span.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Option<TextRange>,
}

impl Stmt {
    #[must_use]
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, span: None }
    }

    #[must_use]
    pub fn with_span(mut self, span: TextRange) -> Self {
        self.span = Some(span);
        self
    }
}

/// Bound statement variants.
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Local declaration, optionally initialized.
    Local(LocalDecl),
    /// Assignment to an addressable target.
    Assign { target: Expr, value: Expr },
    /// Statement-position call; outputs are bound through `Out` arguments.
    Call(CallExpr),
    /// `IF`/`ELSIF` chain with optional `ELSE`.
    If {
        branches: Vec<IfBranch>,
        else_body: Vec<Stmt>,
    },
    /// `WHILE` loop.
    While { condition: Expr, body: Vec<Stmt> },
    /// `FOR` loop.
    For(Box<ForStmt>),
    /// Early return from the callable.
    Return,
}

/// One conditional branch of an `IF` chain.
#[derive(Debug, Clone)]
pub struct IfBranch {
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

/// Bound `FOR` loop. The control variable is a scalar lvalue; the binder
/// inserts casts so start/end/step all share the control type.
#[derive(Debug, Clone)]
pub struct ForStmt {
    pub control: Expr,
    pub start: Expr,
    pub end: Expr,
    /// Defaults to 1 when absent.
    pub step: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// One declared local variable.
#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub id: LocalId,
    pub name: SmolStr,
    pub ty: TypeId,
    pub init: Option<Initializer>,
}

/// Constant or computed initial value.
#[derive(Debug, Clone)]
pub enum Initializer {
    /// Single expression (scalars, pointers).
    Expr(Expr),
    /// Per-field values, by field index.
    Struct(Vec<(usize, Initializer)>),
    /// Per-element values, in index order.
    Array(Vec<Initializer>),
    /// One value repeated over every element; lowered as a pointer-walk
    /// loop rather than being unrolled.
    ArrayRepeat(Box<Expr>),
}
