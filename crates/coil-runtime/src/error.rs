//! Load-time and run-time failures.

use coil_ir::PouId;
use smol_str::SmolStr;
use thiserror::Error;

/// A structural problem found while loading a compiled module.
///
/// Loading validates every POU up front so that execution never has to
/// re-check labels or call shapes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Two labels in one POU share a name.
    #[error("duplicate label '{label}' in '{pou}'")]
    DuplicateLabel { pou: PouId, label: SmolStr },

    /// A jump names a label the POU does not define.
    #[error("jump to undefined label '{label}' in '{pou}'")]
    UnresolvedJump { pou: PouId, label: SmolStr },

    /// A call names neither a compiled POU nor a builtin.
    #[error("'{pou}' calls unknown callable '{callee}'")]
    UnknownCallee { pou: PouId, callee: PouId },

    /// A call passes the wrong number of input slots.
    #[error("'{pou}' calls '{callee}' with {got} inputs, expected {expected}")]
    InputArity {
        pou: PouId,
        callee: PouId,
        expected: usize,
        got: usize,
    },

    /// A call binds the wrong number of output slots.
    #[error("'{pou}' calls '{callee}' with {got} outputs, expected {expected}")]
    OutputArity {
        pou: PouId,
        callee: PouId,
        expected: usize,
        got: usize,
    },

    /// An entry point or initializer names a POU the module lacks.
    #[error("unknown POU '{0}'")]
    UnknownPou(PouId),
}

/// Why execution stopped for good. Panics are terminal: the machine state
/// stays inspectable but no further instruction runs.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PanicReason {
    /// A checked array index fell outside its declared bounds.
    #[error("index {index} outside {lower}..{upper}")]
    IndexOutOfBounds { index: i32, lower: i32, upper: i32 },

    /// Integer division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A pointer resolved outside every memory area.
    #[error("invalid address: area {area}, offset {offset}")]
    InvalidAddress { area: u16, offset: u32 },

    /// A call would push the frame past the end of the stack area.
    #[error("call stack exhausted")]
    StackOverflow,

    /// Executed code referenced a label or callable that load validation
    /// should have rejected. Indicates a corrupted program image.
    #[error("malformed program image")]
    MalformedImage,
}
