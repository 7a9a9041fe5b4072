//! IR statements, expressions and memory locations.

#![allow(missing_docs)]

use smol_str::SmolStr;

use crate::pou::PouId;

/// Memory area holding the interpreter's call stack frames.
pub const STACK_AREA: u16 = 0;

/// First area id available to global-variable blocks.
///
/// Areas 0 and 1 are reserved for the call stack; every declared global
/// block gets its own area starting here, in name-sorted order.
pub const FIRST_GLOBAL_AREA: u16 = 2;

/// Absolute address of one byte run: a numbered area plus a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryLocation {
    pub area: u16,
    pub offset: u16,
}

impl MemoryLocation {
    #[must_use]
    pub const fn new(area: u16, offset: u16) -> Self {
        Self { area, offset }
    }

    /// Pack into the 32-bit pointer representation.
    ///
    /// The offset occupies the low half so that unchecked scaled indexing
    /// is plain 32-bit addition on the pointer value.
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        (self.offset as u32) | ((self.area as u32) << 16)
    }

    /// Unpack a 32-bit pointer value.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            area: (bits >> 16) as u16,
            offset: bits as u16,
        }
    }
}

/// Byte offset relative to the currently executing frame's base address.
///
/// Never a global address by itself; the interpreter adds the frame base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalVarOffset(pub u16);

impl std::fmt::Display for LocalVarOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stack{}", self.0)
    }
}

/// Value width in the IR: a byte size only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Zero bytes (placeholder slots).
    Void,
    /// One byte.
    Byte,
    /// Two bytes.
    Word,
    /// Four bytes.
    DWord,
    /// Eight bytes.
    LWord,
}

impl IrType {
    /// Width of a pointer value.
    pub const POINTER: IrType = IrType::DWord;

    #[must_use]
    pub const fn byte_size(self) -> u16 {
        match self {
            IrType::Void => 0,
            IrType::Byte => 1,
            IrType::Word => 2,
            IrType::DWord => 4,
            IrType::LWord => 8,
        }
    }

    #[must_use]
    pub const fn from_byte_size(size: u16) -> Option<Self> {
        match size {
            0 => Some(IrType::Void),
            1 => Some(IrType::Byte),
            2 => Some(IrType::Word),
            4 => Some(IrType::DWord),
            8 => Some(IrType::LWord),
            _ => None,
        }
    }
}

/// Start of an address computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressBase {
    /// Address of a slot in the current frame.
    Stack(LocalVarOffset),
    /// Pointer value stored in a slot of the current frame.
    Pointer(LocalVarOffset),
}

/// One step of an address chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressElement {
    /// Add a constant byte offset (struct field access).
    FieldOffset(u16),
    /// Scale a DINT index slot against declared bounds; panics outside
    /// `[lower, upper]`.
    CheckedIndex {
        index: LocalVarOffset,
        lower: i32,
        upper: i32,
        element_size: u16,
    },
    /// Scale a DINT index slot without any check (pointer arithmetic).
    UncheckedIndex {
        index: LocalVarOffset,
        element_size: u16,
    },
}

/// Expression evaluated by the interpreter to a run of bytes.
///
/// The byte count comes from the enclosing statement except for literals,
/// which carry their own width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Raw bit pattern.
    Literal { bits: u64, ty: IrType },
    /// Read bytes starting at a frame slot.
    LoadValue(LocalVarOffset),
    /// Treat the slot's value as a pointer and read through it.
    Deref(LocalVarOffset),
    /// Compute a pointer value from a base and an element chain.
    Address {
        base: AddressBase,
        elements: Vec<AddressElement>,
    },
}

/// One IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// No-op carrying text.
    Comment(SmolStr),
    /// Named marker for jump targets.
    Label(SmolStr),
    /// Unconditional jump to a label.
    Jump { target: SmolStr },
    /// Jump to a label when the condition byte is zero.
    JumpIfNot {
        condition: LocalVarOffset,
        target: SmolStr,
    },
    /// Return from the current callable.
    Return,
    /// Copy `ty` bytes of the evaluated value into a frame slot.
    WriteValue {
        value: Expression,
        dest: LocalVarOffset,
        ty: IrType,
    },
    /// Copy `ty` bytes of the evaluated value through the pointer held in
    /// `dest`.
    WriteDerefValue {
        value: Expression,
        dest: LocalVarOffset,
        ty: IrType,
    },
    /// Call a compiled or builtin callable with frame-slot arguments.
    StaticCall {
        callee: PouId,
        inputs: Vec<LocalVarOffset>,
        outputs: Vec<LocalVarOffset>,
    },
}

impl Statement {
    /// Label name defined by this statement, if any.
    #[must_use]
    pub fn defined_label(&self) -> Option<&SmolStr> {
        match self {
            Statement::Label(name) => Some(name),
            _ => None,
        }
    }

    /// Label name this statement jumps to, if any.
    #[must_use]
    pub fn jump_target(&self) -> Option<&SmolStr> {
        match self {
            Statement::Jump { target } | Statement::JumpIfNot { target, .. } => Some(target),
            _ => None,
        }
    }
}
