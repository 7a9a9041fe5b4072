//! `coil-codegen` - Lowering from bound trees to the coil stack-machine IR.
//!
//! The input is a [`BoundModule`] from `coil-hir`; the output is a
//! [`CompiledModule`] of flat instruction lists plus calling-convention and
//! debug tables, as defined in `coil-ir`. Lowering is a single linear pass
//! per POU: no optimization, no register allocation, every intermediate
//! value in a frame slot. Alongside the instructions each POU gets a
//! breakpoint map recording which instruction range each source statement
//! produced and which statements can execute next, which is what the
//! debugger steps on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod access;
mod debug_map;
mod error;
mod expr;
mod frame;
mod generator;

use coil_hir::{BoundModule, BoundPou, LineIndex, PouKind, Signature};
use coil_ir::{CompiledModule, CompiledPou, GlobalArea, PouId};
use smol_str::format_smolstr;

pub use error::CodegenError;

use generator::Generator;

/// Lowers one POU. Pass a [`LineIndex`] for its source file to get a
/// breakpoint map; without one the POU compiles with no debug ranges.
pub fn compile_pou(
    module: &BoundModule,
    id: &PouId,
    line_index: Option<&LineIndex>,
) -> Result<CompiledPou, CodegenError> {
    let pou = module
        .pou(id)
        .ok_or_else(|| CodegenError::UnknownCallee(id.clone()))?;
    let mut generator = Generator::new(module, pou)?;
    generator.lower_body()?;
    Ok(generator.finish(line_index))
}

/// Lowers a whole module: every POU, the global-area table, and one
/// generated `<block>$init` initializer POU per global block that declares
/// initial values. Initializers are listed in execution order and are meant
/// to run once before the first cycle.
pub fn compile_module(
    module: &BoundModule,
    line_index: Option<&LineIndex>,
) -> Result<CompiledModule, CodegenError> {
    let mut compiled = CompiledModule::new();
    for block in module.globals() {
        compiled.areas.push(GlobalArea {
            area: block.area,
            name: block.name.clone(),
            size: block.size,
        });
    }
    for (index, block) in module.globals().iter().enumerate() {
        if block.vars.iter().any(|var| var.init.is_some()) {
            let pou = compile_global_init(module, index)?;
            compiled.initializers.push(pou.id.clone());
            compiled.add_pou(pou);
        }
    }
    for id in module.pous().keys() {
        compiled.add_pou(compile_pou(module, id, line_index)?);
    }
    Ok(compiled)
}

fn compile_global_init(
    module: &BoundModule,
    block_index: usize,
) -> Result<CompiledPou, CodegenError> {
    let block = &module.globals()[block_index];
    let id = PouId::new(format_smolstr!("{}$init", block.name));
    let synthetic = BoundPou::new(Signature::new(id, PouKind::Function), Vec::new());
    let mut generator = Generator::new(module, &synthetic)?;
    for (var_index, var) in block.vars.iter().enumerate() {
        let Some(init) = &var.init else {
            continue;
        };
        let (access, ty) = generator.global_access(block_index, var_index)?;
        generator.lower_initializer(&access, ty, init)?;
        generator.frame.reset_temporaries();
    }
    Ok(generator.finish(None))
}
