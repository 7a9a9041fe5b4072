//! Errors reported while lowering a bound module to IR.

use coil_ir::PouId;
use smol_str::SmolStr;
use thiserror::Error;

/// A fatal problem encountered while lowering a POU.
///
/// These are compiler-side failures, not user diagnostics: the binder is
/// expected to have rejected ill-typed programs before lowering starts, so
/// most variants indicate either an unsupported construct or an internal
/// inconsistency in the bound tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// A value expression was used where a memory location is required,
    /// for example taking the address of a literal.
    #[error("expression is not addressable")]
    NotAddressable,

    /// A call referenced a POU that is not part of the module.
    #[error("unknown callee '{0}'")]
    UnknownCallee(PouId),

    /// An output or return value has a type that does not fit a stack slot.
    /// Aggregate results must be passed through an in-out parameter instead.
    #[error("output '{0}' does not fit a stack slot")]
    UnsupportedOutputType(SmolStr),

    /// The stack frame of a single POU grew past the 16-bit offset range.
    #[error("stack frame of '{0}' exceeds 64 KiB")]
    FrameOverflow(PouId),

    /// The bound tree violated an invariant the lowering relies on.
    #[error("unsupported bound tree: {0}")]
    Unsupported(&'static str),
}
