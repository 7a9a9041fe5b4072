//! `coil-runtime` - Interpreter and debugger runtime for the coil IR.
//!
//! A [`CompiledModule`](coil_ir::CompiledModule) is validated into a
//! [`Program`] once, then executed by an [`Interpreter`] one statement per
//! step. The interpreter owns a flat [`Memory`]: area 0 for call-stack
//! frames, one area per global block. Debugging hooks on the compiled
//! breakpoint maps: persistent and one-shot breakpoints, line stepping via
//! stepping successors, and stack traces. Failures at run time are
//! [`PanicReason`]s: terminal, but the whole machine state remains
//! readable afterwards.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod builtins;
/// Load-time and run-time failures.
pub mod error;
/// Flat byte-array memory, one array per area.
pub mod memory;
/// Program loading and the stepping interpreter.
pub mod program;

pub use error::{LoadError, PanicReason};
pub use memory::{Memory, STACK_BYTES};
pub use program::{ExecutionState, FrameInfo, Interpreter, Program};
