//! Compiled POU and module artifacts.

#![allow(missing_docs)]

use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::breakpoints::BreakpointMap;
use crate::stmt::{IrType, LocalVarOffset, Statement};

/// Globally unique, case-insensitive qualified name of a callable.
///
/// Also names generated initializers (`<block>$init`). Comparison and
/// hashing ignore ASCII case, matching IEC identifier semantics.
#[derive(Debug, Clone, Eq)]
pub struct PouId(SmolStr);

impl PouId {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for PouId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for PouId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.as_bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl std::fmt::Display for PouId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for PouId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One input or output slot of a callable's calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledArgument {
    pub offset: LocalVarOffset,
    pub ty: IrType,
}

impl CompiledArgument {
    #[must_use]
    pub const fn new(offset: LocalVarOffset, ty: IrType) -> Self {
        Self { offset, ty }
    }
}

/// Value-shape descriptor for external variable presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueShape {
    Bool,
    /// Fixed-width numeric value.
    Scalar {
        bytes: u8,
        signed: bool,
        float: bool,
    },
    Pointer,
    Array {
        element: Box<ValueShape>,
        lower: i32,
        upper: i32,
    },
    Struct {
        fields: Vec<ShapeField>,
    },
}

/// Named field inside a struct shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeField {
    pub name: SmolStr,
    pub offset: u16,
    pub shape: ValueShape,
}

/// Debug-table entry for one declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDebugEntry {
    pub name: SmolStr,
    pub offset: LocalVarOffset,
    pub shape: ValueShape,
}

/// One compiled callable. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPou {
    pub id: PouId,
    /// Originating file path, if known.
    pub file: Option<SmolStr>,
    pub code: Vec<Statement>,
    /// Ordered input slots (hidden self pointer first for instance POUs).
    pub inputs: Vec<CompiledArgument>,
    /// Ordered output slots (the return value is the output named after
    /// the callable).
    pub outputs: Vec<CompiledArgument>,
    /// Total frame byte size, including temporaries at their high-water
    /// mark.
    pub stack_size: u16,
    pub breakpoints: Option<BreakpointMap>,
    /// Debug entries for parameters and the self pointer.
    pub argument_vars: Vec<VariableDebugEntry>,
    /// Debug entries for declared locals.
    pub local_vars: Vec<VariableDebugEntry>,
}

/// One compiled global-variable block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalArea {
    pub area: u16,
    pub name: SmolStr,
    pub size: u16,
}

/// A set of compiled callables plus the global areas they address.
#[derive(Debug, Clone, Default)]
pub struct CompiledModule {
    pous: IndexMap<PouId, CompiledPou>,
    pub areas: Vec<GlobalArea>,
    /// Generated initializer POUs, in execution order.
    pub initializers: Vec<PouId>,
}

impl CompiledModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pou(&mut self, pou: CompiledPou) {
        self.pous.insert(pou.id.clone(), pou);
    }

    #[must_use]
    pub fn pou(&self, id: &PouId) -> Option<&CompiledPou> {
        self.pous.get(id)
    }

    #[must_use]
    pub fn pou_by_name(&self, name: &str) -> Option<&CompiledPou> {
        self.pous.get(&PouId::new(name))
    }

    #[must_use]
    pub fn pous(&self) -> &IndexMap<PouId, CompiledPou> {
        &self.pous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pou_ids_compare_case_insensitively() {
        let a = PouId::new("Motor.Start");
        let b = PouId::new("MOTOR.START");
        assert_eq!(a, b);

        let mut map = IndexMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
    }
}
