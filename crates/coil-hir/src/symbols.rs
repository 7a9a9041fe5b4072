//! Parameter and callable signatures, global blocks.

#![allow(missing_docs)]

use coil_ir::PouId;
use smol_str::SmolStr;

use crate::stmt::Initializer;
use crate::types::{TypeId, TypeRegistry};

/// Parameter passing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: SmolStr,
    pub ty: TypeId,
    pub direction: ParamDirection,
}

impl Param {
    pub fn new(name: impl Into<SmolStr>, ty: TypeId, direction: ParamDirection) -> Self {
        Self {
            name: name.into(),
            ty,
            direction,
        }
    }
}

/// Kind of a program organization unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PouKind {
    Program,
    Function,
    FunctionBlock,
    Method,
}

/// Statically known shape of one callable.
#[derive(Debug, Clone)]
pub struct Signature {
    pub id: PouId,
    pub kind: PouKind,
    pub params: Vec<Param>,
    /// Return type for functions/methods; modeled during lowering as an
    /// output parameter named after the callable.
    pub return_type: Option<TypeId>,
    /// Struct type describing the instance data of a function block or the
    /// owner of a method; callables with one receive a hidden self pointer.
    pub instance_type: Option<TypeId>,
}

impl Signature {
    #[must_use]
    pub fn new(id: PouId, kind: PouKind) -> Self {
        Self {
            id,
            kind,
            params: Vec::new(),
            return_type: None,
            instance_type: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_return_type(mut self, ty: TypeId) -> Self {
        self.return_type = Some(ty);
        self
    }

    #[must_use]
    pub fn with_instance_type(mut self, ty: TypeId) -> Self {
        self.instance_type = Some(ty);
        self
    }
}

/// One global variable, offset pre-assigned within its block's area.
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: SmolStr,
    pub ty: TypeId,
    pub offset: u16,
    pub init: Option<Initializer>,
}

/// One declared global-variable list, mapped to its own memory area.
#[derive(Debug, Clone)]
pub struct GlobalBlock {
    pub name: SmolStr,
    pub area: u16,
    pub vars: Vec<GlobalVar>,
    pub size: u16,
}

impl GlobalBlock {
    /// Lay out a block: largest alignment first, names breaking ties.
    ///
    /// The area id is assigned later, when the module sorts its blocks.
    #[must_use]
    pub fn layout(
        name: impl Into<SmolStr>,
        registry: &TypeRegistry,
        vars: Vec<(SmolStr, TypeId, Option<Initializer>)>,
    ) -> Self {
        let mut ordered = vars;
        ordered.sort_by(|a, b| {
            registry
                .align_of(b.1)
                .cmp(&registry.align_of(a.1))
                .then_with(|| a.0.cmp(&b.0))
        });
        let mut cursor: u16 = 0;
        let laid_out = ordered
            .into_iter()
            .map(|(var_name, ty, init)| {
                cursor = crate::types::align_up(cursor, registry.align_of(ty));
                let var = GlobalVar {
                    name: var_name,
                    ty,
                    offset: cursor,
                    init,
                };
                cursor += registry.size_of(ty);
                var
            })
            .collect();
        Self {
            name: name.into(),
            area: 0,
            vars: laid_out,
            size: cursor,
        }
    }

    #[must_use]
    pub fn var(&self, name: &str) -> Option<&GlobalVar> {
        self.vars
            .iter()
            .find(|var| var.name.eq_ignore_ascii_case(name))
    }
}
