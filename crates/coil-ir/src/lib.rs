//! `coil-ir` - Flat stack-machine IR for compiled IEC 61131-3 POUs.
//!
//! The IR is untyped beyond byte sizes: every value is a run of 0, 1, 2, 4
//! or 8 bytes, and all type-specific behavior (signedness, float vs int)
//! lives in named builtin callables invoked through [`Statement::StaticCall`].
//! A compiled callable is a [`CompiledPou`]: a linear instruction list, the
//! calling-convention tables, the total frame size and an optional
//! [`BreakpointMap`] tying instruction ranges back to source ranges.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Breakpoint map and stepping queries.
pub mod breakpoints;
/// Compiled POU and module artifacts.
pub mod pou;
/// IR statements, expressions and memory locations.
pub mod stmt;
/// Canonical one-line textual form.
pub mod text;

pub use breakpoints::{
    BreakpointEntry, BreakpointId, BreakpointMap, InstructionRange, SourcePosition, SourceRange,
};
pub use pou::{
    CompiledArgument, CompiledModule, CompiledPou, GlobalArea, PouId, ShapeField, ValueShape,
    VariableDebugEntry,
};
pub use stmt::{
    AddressBase, AddressElement, Expression, IrType, LocalVarOffset, MemoryLocation, Statement,
    FIRST_GLOBAL_AREA, STACK_AREA,
};
pub use text::ParseError;
