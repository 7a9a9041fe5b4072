//! Bound module: POUs, signatures and global layout.

#![allow(missing_docs)]

use coil_ir::{PouId, FIRST_GLOBAL_AREA};
use indexmap::IndexMap;
use smol_str::SmolStr;
use text_size::TextSize;

use crate::stmt::Stmt;
use crate::symbols::{GlobalBlock, Signature};
use crate::types::TypeRegistry;

/// One bound callable ready for lowering.
#[derive(Debug, Clone)]
pub struct BoundPou {
    pub signature: Signature,
    pub body: Vec<Stmt>,
    /// Originating file path, if known.
    pub file: Option<SmolStr>,
    /// Position of the body end, for the trailing-return breakpoint.
    pub body_end: Option<TextSize>,
}

impl BoundPou {
    #[must_use]
    pub fn new(signature: Signature, body: Vec<Stmt>) -> Self {
        Self {
            signature,
            body,
            file: None,
            body_end: None,
        }
    }
}

/// The complete binder output for one compilation.
#[derive(Debug, Clone, Default)]
pub struct BoundModule {
    pub registry: TypeRegistry,
    globals: Vec<GlobalBlock>,
    pous: IndexMap<PouId, BoundPou>,
}

impl BoundModule {
    #[must_use]
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            globals: Vec::new(),
            pous: IndexMap::new(),
        }
    }

    /// Install global blocks, assigning area ids in name-sorted order
    /// starting at [`FIRST_GLOBAL_AREA`].
    pub fn set_globals(&mut self, mut blocks: Vec<GlobalBlock>) {
        blocks.sort_by(|a, b| a.name.cmp(&b.name));
        for (index, block) in blocks.iter_mut().enumerate() {
            block.area = FIRST_GLOBAL_AREA + index as u16;
        }
        self.globals = blocks;
    }

    #[must_use]
    pub fn globals(&self) -> &[GlobalBlock] {
        &self.globals
    }

    pub fn add_pou(&mut self, pou: BoundPou) {
        self.pous.insert(pou.signature.id.clone(), pou);
    }

    #[must_use]
    pub fn pou(&self, id: &PouId) -> Option<&BoundPou> {
        self.pous.get(id)
    }

    #[must_use]
    pub fn signature(&self, id: &PouId) -> Option<&Signature> {
        self.pous.get(id).map(|pou| &pou.signature)
    }

    #[must_use]
    pub fn pous(&self) -> &IndexMap<PouId, BoundPou> {
        &self.pous
    }
}
