//! `coil-hir` - Bound syntax tree and type layout for the coil backend.
//!
//! Everything in this crate is *input* to lowering: a binder (external to
//! this workspace) resolves names, checks types, inserts casts, picks
//! builtin callee names for operators, and pre-assigns global variables to
//! memory areas. The lowering pass in `coil-codegen` consumes these trees
//! read-only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Bound expressions.
pub mod expr;
/// Bound module: POUs, signatures and global layout.
pub mod module;
/// Byte-offset to line/column conversion.
pub mod source;
/// Bound statements, declarations and initializers.
pub mod stmt;
/// Parameter and callable signatures, global blocks.
pub mod symbols;
/// Type system with size and alignment layout.
pub mod types;

pub use expr::{CallArg, CallExpr, Callee, Expr, ExprKind, LocalId, ShortCircuitOp};
pub use module::{BoundModule, BoundPou};
pub use source::LineIndex;
pub use stmt::{ForStmt, IfBranch, Initializer, LocalDecl, Stmt, StmtKind};
pub use symbols::{GlobalBlock, GlobalVar, Param, ParamDirection, PouKind, Signature};
pub use types::{ScalarType, StructField, Type, TypeId, TypeRegistry};
