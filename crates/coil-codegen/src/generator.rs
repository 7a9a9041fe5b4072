//! Statement lowering: one [`Generator`] per POU.
//!
//! The generator owns the output instruction list, the stack frame and the
//! breakpoint builder. Statements append instructions linearly; structured
//! statements lower to labels and conditional jumps. Temporaries are
//! reclaimed between top-level statements only, so slots feeding a loop's
//! next-iteration code stay live across the body.

use coil_hir::{
    BoundModule, BoundPou, Expr, ForStmt, IfBranch, Initializer, LineIndex, LocalDecl, LocalId,
    ParamDirection, Stmt, StmtKind, Type, TypeId,
};
use coil_ir::{
    AddressElement, CompiledArgument, CompiledPou, Expression, IrType, LocalVarOffset,
    MemoryLocation, PouId, Statement, ValueShape,
};
use rustc_hash::FxHashMap;
use smol_str::{format_smolstr, SmolStr};
use text_size::TextRange;

use crate::access::Access;
use crate::debug_map::BreakpointMapBuilder;
use crate::error::CodegenError;
use crate::frame::StackFrameAllocator;

pub(crate) struct Generator<'a> {
    pub(crate) module: &'a BoundModule,
    pou: &'a BoundPou,
    pub(crate) frame: StackFrameAllocator,
    pub(crate) code: Vec<Statement>,
    debug: BreakpointMapBuilder,
    labels: u32,
    /// Statement nesting depth; temporaries are reclaimed at depth zero.
    depth: u32,
    pub(crate) self_slot: Option<LocalVarOffset>,
    pub(crate) param_slots: Vec<LocalVarOffset>,
    local_slots: FxHashMap<LocalId, LocalVarOffset>,
    inputs: Vec<CompiledArgument>,
    outputs: Vec<CompiledArgument>,
    pub(crate) return_slot: Option<LocalVarOffset>,
}

impl<'a> Generator<'a> {
    pub(crate) fn new(module: &'a BoundModule, pou: &'a BoundPou) -> Result<Self, CodegenError> {
        let mut gen = Self {
            module,
            pou,
            frame: StackFrameAllocator::new(pou.signature.id.clone()),
            code: Vec::new(),
            debug: BreakpointMapBuilder::new(),
            labels: 0,
            depth: 0,
            self_slot: None,
            param_slots: Vec::new(),
            local_slots: FxHashMap::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            return_slot: None,
        };
        gen.allocate_declared()?;
        Ok(gen)
    }

    /// Lays out the declared region of the frame: hidden self pointer,
    /// parameters in declaration order, the return slot, then locals.
    fn allocate_declared(&mut self) -> Result<(), CodegenError> {
        let registry = &self.module.registry;
        let sig = &self.pou.signature;

        if sig.instance_type.is_some() {
            let slot = self.frame.allocate_slot(IrType::POINTER)?;
            self.inputs.push(CompiledArgument::new(slot, IrType::POINTER));
            self.self_slot = Some(slot);
            self.frame
                .record_argument(SmolStr::new("THIS"), slot, ValueShape::Pointer);
        }

        for param in &sig.params {
            let by_ref = matches!(param.direction, ParamDirection::InOut)
                || !registry.is_slot_sized(param.ty);
            let (slot, ty, shape) = if by_ref {
                let slot = self.frame.allocate_slot(IrType::POINTER)?;
                (slot, IrType::POINTER, ValueShape::Pointer)
            } else {
                let ty = registry
                    .ir_type(param.ty)
                    .ok_or(CodegenError::Unsupported("parameter has no slot width"))?;
                let slot = self.frame.allocate_slot(ty)?;
                (slot, ty, registry.value_shape(param.ty))
            };
            match param.direction {
                ParamDirection::In | ParamDirection::InOut => {
                    self.inputs.push(CompiledArgument::new(slot, ty));
                }
                ParamDirection::Out => {
                    if by_ref {
                        return Err(CodegenError::UnsupportedOutputType(param.name.clone()));
                    }
                    self.outputs.push(CompiledArgument::new(slot, ty));
                }
            }
            self.param_slots.push(slot);
            self.frame.record_argument(param.name.clone(), slot, shape);
        }

        if let Some(return_ty) = sig.return_type {
            let ty = registry
                .ir_type(return_ty)
                .ok_or_else(|| CodegenError::UnsupportedOutputType(SmolStr::new(sig.id.as_str())))?;
            let slot = self.frame.allocate_slot(ty)?;
            self.outputs.push(CompiledArgument::new(slot, ty));
            self.return_slot = Some(slot);
            self.frame.record_argument(
                SmolStr::new(sig.id.as_str()),
                slot,
                registry.value_shape(return_ty),
            );
        }

        let mut decls = Vec::new();
        collect_locals(&self.pou.body, &mut decls);
        for decl in decls {
            let size = registry.size_of(decl.ty);
            let align = registry.align_of(decl.ty);
            let slot = self.frame.allocate(size, align)?;
            self.local_slots.insert(decl.id, slot);
            self.frame
                .record_local(decl.name.clone(), slot, registry.value_shape(decl.ty));
        }

        self.frame.seal();
        Ok(())
    }

    pub(crate) fn finish(mut self, line_index: Option<&LineIndex>) -> CompiledPou {
        // Implicit return with a zero-width breakpoint at the body end, so
        // stepping off the last statement has somewhere to land.
        let start = self.code.len();
        self.code.push(Statement::Return);
        let end_span = self.pou.body_end.map(|pos| TextRange::empty(pos));
        self.debug.register(end_span, start, self.code.len());

        let stack_size = self.frame.frame_size();
        let (argument_vars, local_vars) = self.frame.into_debug_vars();
        tracing::debug!(
            pou = %self.pou.signature.id,
            instructions = self.code.len(),
            stack_size,
            "lowered POU"
        );

        CompiledPou {
            id: self.pou.signature.id.clone(),
            file: self.pou.file.clone(),
            code: self.code,
            inputs: self.inputs,
            outputs: self.outputs,
            stack_size,
            breakpoints: self.debug.freeze(line_index),
            argument_vars,
            local_vars,
        }
    }

    pub(crate) fn lower_body(&mut self) -> Result<(), CodegenError> {
        let pou = self.pou;
        for stmt in &pou.body {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match &stmt.kind {
            StmtKind::If {
                branches,
                else_body,
            } => self.lower_if(branches, else_body)?,
            StmtKind::While { condition, body } => self.lower_while(condition, body)?,
            StmtKind::For(for_stmt) => self.lower_for(stmt.span, for_stmt)?,
            _ => {
                let start = self.code.len();
                self.lower_simple(stmt)?;
                self.debug.register(stmt.span, start, self.code.len());
            }
        }
        if self.depth == 0 {
            self.frame.reset_temporaries();
        }
        Ok(())
    }

    fn lower_simple(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match &stmt.kind {
            StmtKind::Local(decl) => self.lower_local(decl),
            StmtKind::Assign { target, value } => self.lower_assign(target, value),
            StmtKind::Call(call) => {
                self.lower_call(call, None, None)?;
                Ok(())
            }
            StmtKind::Return => {
                self.code.push(Statement::Return);
                Ok(())
            }
            StmtKind::If { .. } | StmtKind::While { .. } | StmtKind::For(_) => {
                Err(CodegenError::Unsupported("structured statement in simple position"))
            }
        }
    }

    fn lower_local(&mut self, decl: &LocalDecl) -> Result<(), CodegenError> {
        // Frames are zeroed on entry, so an uninitialized local needs no code.
        let Some(init) = &decl.init else {
            return Ok(());
        };
        let slot = self.local_slot(decl.id)?;
        self.lower_initializer(&Access::stack(slot), decl.ty, init)
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> Result<(), CodegenError> {
        let registry = &self.module.registry;
        if !registry.is_slot_sized(target.ty) {
            let dst = self.lower_access(target)?;
            let src = self.lower_access(value)?;
            return self.copy_aggregate(&dst, &src, target.ty);
        }
        if let coil_hir::ExprKind::Call(call) = &value.kind {
            let dst = self.lower_access(target)?;
            self.lower_call(call, Some(value.ty), Some(&dst))?;
            return Ok(());
        }
        let dst = self.lower_access(target)?;
        let ty = self.slot_ty(value.ty)?;
        let expr = self.lower_value(value)?;
        self.access_write(&dst, expr, ty)
    }

    /// Memberwise copy of a struct or array value between two accesses.
    fn copy_aggregate(
        &mut self,
        dst: &Access,
        src: &Access,
        ty: TypeId,
    ) -> Result<(), CodegenError> {
        match self.module.registry.get(ty).clone() {
            Type::Scalar(scalar) => {
                let ir = scalar.ir_type();
                let value = self.access_read(src)?;
                self.access_write(dst, value, ir)
            }
            Type::Pointer { .. } => {
                let value = self.access_read(src)?;
                self.access_write(dst, value, IrType::POINTER)
            }
            Type::Struct { fields, .. } => {
                for field in &fields {
                    let element = AddressElement::FieldOffset(field.offset);
                    self.copy_aggregate(
                        &dst.clone().with_element(element),
                        &src.clone().with_element(element),
                        field.ty,
                    )?;
                }
                Ok(())
            }
            Type::Array {
                element,
                lower,
                upper,
            } => {
                let size = self.module.registry.size_of(element);
                let count = (upper - lower + 1).max(0) as u16;
                for index in 0..count {
                    let offset = AddressElement::FieldOffset(index * size);
                    self.copy_aggregate(
                        &dst.clone().with_element(offset),
                        &src.clone().with_element(offset),
                        element,
                    )?;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn lower_initializer(
        &mut self,
        access: &Access,
        ty: TypeId,
        init: &Initializer,
    ) -> Result<(), CodegenError> {
        match init {
            Initializer::Expr(expr) => {
                let ir = self.slot_ty(ty)?;
                let value = self.lower_value(expr)?;
                self.access_write(access, value, ir)
            }
            Initializer::Struct(fields) => {
                for (index, field_init) in fields {
                    let (offset, field_ty) = self.struct_field(ty, *index)?;
                    let field_access = access.clone().with_element(AddressElement::FieldOffset(offset));
                    self.lower_initializer(&field_access, field_ty, field_init)?;
                }
                Ok(())
            }
            Initializer::Array(items) => {
                let (element, _, _) = self.array_info(ty)?;
                let size = self.module.registry.size_of(element);
                for (index, item) in items.iter().enumerate() {
                    let offset = AddressElement::FieldOffset(index as u16 * size);
                    let item_access = access.clone().with_element(offset);
                    self.lower_initializer(&item_access, element, item)?;
                }
                Ok(())
            }
            Initializer::ArrayRepeat(expr) => self.lower_array_repeat(access, ty, expr),
        }
    }

    /// Fills every element of an array with one value via a pointer walk,
    /// instead of unrolling one write per element.
    fn lower_array_repeat(
        &mut self,
        access: &Access,
        ty: TypeId,
        value: &Expr,
    ) -> Result<(), CodegenError> {
        let (element, lower, upper) = self.array_info(ty)?;
        let element_ir = self
            .module
            .registry
            .ir_type(element)
            .ok_or(CodegenError::Unsupported("repeated initializer on aggregate elements"))?;
        let element_size = self.module.registry.size_of(element);
        let count = i64::from(upper) - i64::from(lower) + 1;
        if count <= 0 {
            return Ok(());
        }

        let (value_slot, _) = self.lower_to_slot(value)?;
        let cursor = self.temp_slot(IrType::POINTER)?;
        self.code.push(Statement::WriteValue {
            value: access.address_expression(),
            dest: cursor,
            ty: IrType::POINTER,
        });
        let one = self.temp_slot(IrType::DWord)?;
        self.write_literal(one, 1, IrType::DWord);
        let count_slot = self.temp_slot(IrType::DWord)?;
        self.write_literal(count_slot, count as u64, IrType::DWord);
        let end = self.temp_slot(IrType::POINTER)?;
        self.code.push(Statement::WriteValue {
            value: Expression::Address {
                base: coil_ir::AddressBase::Pointer(cursor),
                elements: vec![AddressElement::UncheckedIndex {
                    index: count_slot,
                    element_size,
                }],
            },
            dest: end,
            ty: IrType::POINTER,
        });

        let top = self.new_label("fill");
        let done = self.new_label("fill_end");
        self.code.push(Statement::Label(top.clone()));
        let more = self.temp_slot(IrType::Byte)?;
        self.code.push(Statement::StaticCall {
            callee: PouId::new("NE_DWORD"),
            inputs: vec![cursor, end],
            outputs: vec![more],
        });
        self.code.push(Statement::JumpIfNot {
            condition: more,
            target: done.clone(),
        });
        self.code.push(Statement::WriteDerefValue {
            value: Expression::LoadValue(value_slot),
            dest: cursor,
            ty: element_ir,
        });
        self.code.push(Statement::WriteValue {
            value: Expression::Address {
                base: coil_ir::AddressBase::Pointer(cursor),
                elements: vec![AddressElement::UncheckedIndex {
                    index: one,
                    element_size,
                }],
            },
            dest: cursor,
            ty: IrType::POINTER,
        });
        self.code.push(Statement::Jump { target: top });
        self.code.push(Statement::Label(done));
        Ok(())
    }

    fn lower_if(
        &mut self,
        branches: &[IfBranch],
        else_body: &[Stmt],
    ) -> Result<(), CodegenError> {
        let end_label = self.new_label("if_end");
        let mut exits: Vec<Vec<u32>> = Vec::new();

        for branch in branches {
            let start = self.code.len();
            let condition = self.lower_condition(&branch.condition)?;
            let next_label = self.new_label("if_next");
            self.code.push(Statement::JumpIfNot {
                condition,
                target: next_label.clone(),
            });
            self.debug
                .register(branch.condition.span, start, self.code.len());
            let cond_frontier = self.debug.frontier();

            self.depth += 1;
            for stmt in &branch.body {
                self.lower_stmt(stmt)?;
            }
            self.depth -= 1;
            exits.push(self.debug.frontier());

            // Every conditional branch jumps to the end; only a trailing
            // ELSE falls through.
            self.code.push(Statement::Jump {
                target: end_label.clone(),
            });
            self.code.push(Statement::Label(next_label));
            self.debug.set_frontier(cond_frontier);
        }

        if else_body.is_empty() {
            // Without an ELSE, failing the last condition exits the chain.
            exits.push(self.debug.frontier());
        } else {
            self.depth += 1;
            for stmt in else_body {
                self.lower_stmt(stmt)?;
            }
            self.depth -= 1;
            exits.push(self.debug.frontier());
        }

        self.code.push(Statement::Label(end_label));
        self.debug.merge_frontiers(exits);
        Ok(())
    }

    fn lower_while(&mut self, condition: &Expr, body: &[Stmt]) -> Result<(), CodegenError> {
        let entry = self.debug.frontier();
        let top = self.new_label("while");
        let end = self.new_label("while_end");
        self.code.push(Statement::Label(top.clone()));

        let start = self.code.len();
        let cond_slot = self.lower_condition(condition)?;
        self.code.push(Statement::JumpIfNot {
            condition: cond_slot,
            target: end.clone(),
        });
        let check = self.debug.register(condition.span, start, self.code.len());

        self.depth += 1;
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        self.depth -= 1;
        if let Some(check) = check {
            let body_exit = self.debug.frontier();
            self.debug.connect(&body_exit, check);
        }

        self.code.push(Statement::Jump { target: top });
        self.code.push(Statement::Label(end));

        // After the loop, execution may be at the failed check or still at
        // one of the loop's predecessors when the check never registered a
        // span of its own.
        let mut after: Vec<Vec<u32>> = Vec::new();
        if let Some(check) = check {
            after.push(vec![check]);
        }
        after.push(entry);
        self.debug.merge_frontiers(after);
        Ok(())
    }

    fn lower_for(&mut self, span: Option<TextRange>, for_stmt: &ForStmt) -> Result<(), CodegenError> {
        let scalar = self
            .module
            .registry
            .as_scalar(for_stmt.control.ty)
            .ok_or(CodegenError::Unsupported("FOR control variable is not scalar"))?;
        let control_ir = scalar.ir_type();
        let header_span = cover_spans(&[
            for_stmt.control.span,
            for_stmt.start.span,
            for_stmt.end.span,
            for_stmt.step.as_ref().and_then(|step| step.span),
        ]);

        let start_index = self.code.len();
        let control = self.lower_access(&for_stmt.control)?;
        let address = self.access_pointer_slot(&control)?;
        // Bounds and step are captured once, before the first iteration.
        let start_slot = self.lower_to_temp(&for_stmt.start)?;
        let end_slot = self.lower_to_temp(&for_stmt.end)?;
        let step_slot = match &for_stmt.step {
            Some(step) => self.lower_to_temp(step)?,
            None => {
                let slot = self.temp_slot(control_ir)?;
                self.write_literal(slot, 1, control_ir);
                slot
            }
        };

        let end_label = self.new_label("for_end");
        let enter = self.temp_slot(IrType::Byte)?;
        self.code.push(Statement::StaticCall {
            callee: PouId::new(format_smolstr!("FOR_LOOP_INIT_{}", scalar.name())),
            inputs: vec![start_slot, step_slot, end_slot],
            outputs: vec![enter],
        });
        self.code.push(Statement::JumpIfNot {
            condition: enter,
            target: end_label.clone(),
        });
        self.code.push(Statement::WriteDerefValue {
            value: Expression::LoadValue(start_slot),
            dest: address,
            ty: control_ir,
        });
        let init = self.debug.register(header_span, start_index, self.code.len());

        let top = self.new_label("for");
        self.code.push(Statement::Label(top.clone()));
        let first_body_record = self.debug.next_id();
        self.depth += 1;
        for stmt in &for_stmt.body {
            self.lower_stmt(stmt)?;
        }
        self.depth -= 1;
        let has_body_records = self.debug.next_id() > first_body_record;

        let next_index = self.code.len();
        let more = self.temp_slot(IrType::Byte)?;
        self.code.push(Statement::StaticCall {
            callee: PouId::new(format_smolstr!("FOR_LOOP_NEXT_{}", scalar.name())),
            inputs: vec![address, step_slot, end_slot],
            outputs: vec![more],
        });
        self.code.push(Statement::JumpIfNot {
            condition: more,
            target: end_label.clone(),
        });
        self.code.push(Statement::Jump { target: top });
        // The advance gets its own zero-width record so stepping from the
        // last body statement visibly returns to the loop header line.
        let next_span = span.map(|range| TextRange::empty(range.end()));
        let next = self.debug.register(next_span, next_index, self.code.len());
        if let (Some(next), true) = (next, has_body_records) {
            self.debug.connect(&[next], first_body_record);
        }
        self.code.push(Statement::Label(end_label));

        let mut after: Vec<Vec<u32>> = Vec::new();
        if let Some(init) = init {
            after.push(vec![init]);
        }
        if let Some(next) = next {
            after.push(vec![next]);
        }
        self.debug.merge_frontiers(after);
        Ok(())
    }

    pub(crate) fn signature(&self) -> &coil_hir::Signature {
        &self.pou.signature
    }

    pub(crate) fn local_slot(&self, id: LocalId) -> Result<LocalVarOffset, CodegenError> {
        self.local_slots
            .get(&id)
            .copied()
            .ok_or(CodegenError::Unsupported("reference to an undeclared local"))
    }

    pub(crate) fn struct_field(&self, ty: TypeId, index: usize) -> Result<(u16, TypeId), CodegenError> {
        let Type::Struct { fields, .. } = self.module.registry.get(ty) else {
            return Err(CodegenError::Unsupported("field access on a non-struct"));
        };
        let field = fields
            .get(index)
            .ok_or(CodegenError::Unsupported("field index out of range"))?;
        Ok((field.offset, field.ty))
    }

    fn array_info(&self, ty: TypeId) -> Result<(TypeId, i32, i32), CodegenError> {
        let Type::Array {
            element,
            lower,
            upper,
        } = self.module.registry.get(ty)
        else {
            return Err(CodegenError::Unsupported("array initializer on a non-array"));
        };
        Ok((*element, *lower, *upper))
    }

    /// Pointer-slot access to a global variable: the area/offset pair packs
    /// into a literal pointer value loaded into a temporary.
    pub(crate) fn global_access(
        &mut self,
        block: usize,
        var: usize,
    ) -> Result<(Access, TypeId), CodegenError> {
        let block = self
            .module
            .globals()
            .get(block)
            .ok_or(CodegenError::Unsupported("reference to an unknown global block"))?;
        let var = block
            .vars
            .get(var)
            .ok_or(CodegenError::Unsupported("reference to an unknown global"))?;
        let location = MemoryLocation::new(block.area, var.offset);
        let slot = self.temp_slot(IrType::POINTER)?;
        self.write_literal(slot, u64::from(location.to_bits()), IrType::POINTER);
        Ok((Access::pointer(slot), var.ty))
    }

    pub(crate) fn slot_ty(&self, ty: TypeId) -> Result<IrType, CodegenError> {
        self.module
            .registry
            .ir_type(ty)
            .ok_or(CodegenError::Unsupported("value does not fit a stack slot"))
    }

    pub(crate) fn temp_slot(&mut self, ty: IrType) -> Result<LocalVarOffset, CodegenError> {
        self.frame.allocate_slot(ty)
    }

    pub(crate) fn write_literal(&mut self, dest: LocalVarOffset, bits: u64, ty: IrType) {
        self.code.push(Statement::WriteValue {
            value: Expression::Literal { bits, ty },
            dest,
            ty,
        });
    }

    pub(crate) fn new_label(&mut self, prefix: &str) -> SmolStr {
        let label = format_smolstr!("{prefix}{}", self.labels);
        self.labels += 1;
        label
    }
}

fn collect_locals<'a>(body: &'a [Stmt], out: &mut Vec<&'a LocalDecl>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Local(decl) => out.push(decl),
            StmtKind::If {
                branches,
                else_body,
            } => {
                for branch in branches {
                    collect_locals(&branch.body, out);
                }
                collect_locals(else_body, out);
            }
            StmtKind::While { body, .. } => collect_locals(body, out),
            StmtKind::For(for_stmt) => collect_locals(&for_stmt.body, out),
            _ => {}
        }
    }
}

fn cover_spans(spans: &[Option<TextRange>]) -> Option<TextRange> {
    let mut covered: Option<TextRange> = None;
    for span in spans.iter().flatten() {
        covered = Some(match covered {
            Some(range) => range.cover(*span),
            None => *span,
        });
    }
    covered
}
