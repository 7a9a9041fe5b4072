//! Expression lowering and the calling convention.
//!
//! Values lower to IR [`Expression`]s feeding `copy` statements; lvalues
//! lower to [`Access`] chains. Calls marshal every argument into a frame
//! slot first: inputs by value when they fit a slot, by address otherwise,
//! and outputs either bound directly to a plain destination slot or routed
//! through a temporary that is copied back right after the call.

use coil_hir::{CallExpr, Callee, Expr, ExprKind, ParamDirection, ShortCircuitOp, Type, TypeId};
use coil_ir::{AddressElement, Expression, IrType, LocalVarOffset, PouId, Statement};

use crate::access::Access;
use crate::error::CodegenError;
use crate::generator::Generator;

impl Generator<'_> {
    pub(crate) fn lower_value(&mut self, expr: &Expr) -> Result<Expression, CodegenError> {
        match &expr.kind {
            ExprKind::Literal(bits) => Ok(Expression::Literal {
                bits: *bits,
                ty: self.slot_ty(expr.ty)?,
            }),
            ExprKind::AddressOf(inner) => {
                let access = self.lower_access(inner)?;
                Ok(access.address_expression())
            }
            ExprKind::Call(call) => {
                let (slot, _) = self.lower_call_value(call, expr.ty)?;
                Ok(Expression::LoadValue(slot))
            }
            ExprKind::ShortCircuit { op, lhs, rhs } => {
                let slot = self.lower_short_circuit(*op, lhs, rhs)?;
                Ok(Expression::LoadValue(slot))
            }
            _ => {
                let access = self.lower_access(expr)?;
                self.access_read(&access)
            }
        }
    }

    /// Lowers an addressable expression to an access chain.
    pub(crate) fn lower_access(&mut self, expr: &Expr) -> Result<Access, CodegenError> {
        match &expr.kind {
            ExprKind::Param(index) => self.param_access(*index),
            ExprKind::Local(id) => Ok(Access::stack(self.local_slot(*id)?)),
            ExprKind::ReturnValue => Ok(Access::stack(self.return_slot.ok_or(
                CodegenError::Unsupported("return-value reference without a return type"),
            )?)),
            ExprKind::Global { block, var } => Ok(self.global_access(*block, *var)?.0),
            ExprKind::InstanceVar(field) => {
                let slot = self
                    .self_slot
                    .ok_or(CodegenError::Unsupported("instance variable without an instance"))?;
                let instance_ty = self
                    .signature()
                    .instance_type
                    .ok_or(CodegenError::Unsupported("instance variable without an instance"))?;
                let (offset, _) = self.struct_field(instance_ty, *field)?;
                Ok(Access::pointer(slot).with_element(AddressElement::FieldOffset(offset)))
            }
            ExprKind::Field { base, field } => {
                let access = self.lower_access(base)?;
                let (offset, _) = self.struct_field(base.ty, *field)?;
                Ok(access.with_element(AddressElement::FieldOffset(offset)))
            }
            ExprKind::Index { base, index } => match self.module.registry.get(base.ty).clone() {
                Type::Array {
                    element,
                    lower,
                    upper,
                } => {
                    let access = self.lower_access(base)?;
                    let index_slot = self.lower_index_slot(index)?;
                    let element_size = self.module.registry.size_of(element);
                    Ok(access.with_element(AddressElement::CheckedIndex {
                        index: index_slot,
                        lower,
                        upper,
                        element_size,
                    }))
                }
                Type::Pointer { target } => {
                    let (slot, _) = self.lower_to_slot(base)?;
                    let index_slot = self.lower_index_slot(index)?;
                    let element_size = self.module.registry.size_of(target);
                    Ok(Access::pointer(slot).with_element(AddressElement::UncheckedIndex {
                        index: index_slot,
                        element_size,
                    }))
                }
                _ => Err(CodegenError::Unsupported("indexing a non-array value")),
            },
            ExprKind::Deref(inner) => {
                let (slot, _) = self.lower_to_slot(inner)?;
                Ok(Access::pointer(slot))
            }
            ExprKind::Literal(_)
            | ExprKind::Call(_)
            | ExprKind::ShortCircuit { .. }
            | ExprKind::AddressOf(_) => Err(CodegenError::NotAddressable),
        }
    }

    /// Index operands feed 4-byte signed reads at runtime, so any other
    /// width must be cast before it reaches an index position.
    fn lower_index_slot(&mut self, index: &Expr) -> Result<LocalVarOffset, CodegenError> {
        let (slot, ty) = self.lower_to_slot(index)?;
        if ty != IrType::DWord {
            return Err(CodegenError::Unsupported("index value is not DINT-sized"));
        }
        Ok(slot)
    }

    fn param_access(&mut self, index: usize) -> Result<Access, CodegenError> {
        let param = self
            .signature()
            .params
            .get(index)
            .ok_or(CodegenError::Unsupported("parameter index out of range"))?;
        let by_ref = matches!(param.direction, ParamDirection::InOut)
            || !self.module.registry.is_slot_sized(param.ty);
        let slot = self.param_slots[index];
        Ok(if by_ref {
            Access::pointer(slot)
        } else {
            Access::stack(slot)
        })
    }

    /// Lowers a slot-sized value, reusing its slot when it already lives in
    /// one and copying into a temporary otherwise.
    pub(crate) fn lower_to_slot(
        &mut self,
        expr: &Expr,
    ) -> Result<(LocalVarOffset, IrType), CodegenError> {
        match &expr.kind {
            ExprKind::Call(call) => self.lower_call_value(call, expr.ty),
            ExprKind::ShortCircuit { op, lhs, rhs } => {
                Ok((self.lower_short_circuit(*op, lhs, rhs)?, IrType::Byte))
            }
            ExprKind::Param(_)
            | ExprKind::Local(_)
            | ExprKind::ReturnValue
            | ExprKind::Global { .. }
            | ExprKind::InstanceVar(_)
            | ExprKind::Field { .. }
            | ExprKind::Index { .. }
            | ExprKind::Deref(_) => {
                let ty = self.slot_ty(expr.ty)?;
                let access = self.lower_access(expr)?;
                if let Some(slot) = access.plain_slot() {
                    return Ok((slot, ty));
                }
                let value = self.access_read(&access)?;
                let slot = self.temp_slot(ty)?;
                self.code.push(Statement::WriteValue {
                    value,
                    dest: slot,
                    ty,
                });
                Ok((slot, ty))
            }
            ExprKind::Literal(_) | ExprKind::AddressOf(_) => {
                let ty = self.slot_ty(expr.ty)?;
                let value = self.lower_value(expr)?;
                let slot = self.temp_slot(ty)?;
                self.code.push(Statement::WriteValue {
                    value,
                    dest: slot,
                    ty,
                });
                Ok((slot, ty))
            }
        }
    }

    /// Lowers into a fresh temporary, even when the value already has a
    /// slot. Used where the caller must own a stable snapshot, such as
    /// `FOR` bounds that the body might overwrite.
    pub(crate) fn lower_to_temp(&mut self, expr: &Expr) -> Result<LocalVarOffset, CodegenError> {
        let ty = self.slot_ty(expr.ty)?;
        let value = self.lower_value(expr)?;
        let slot = self.temp_slot(ty)?;
        self.code.push(Statement::WriteValue {
            value,
            dest: slot,
            ty,
        });
        Ok(slot)
    }

    pub(crate) fn lower_condition(&mut self, expr: &Expr) -> Result<LocalVarOffset, CodegenError> {
        Ok(self.lower_to_slot(expr)?.0)
    }

    fn lower_short_circuit(
        &mut self,
        op: ShortCircuitOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<LocalVarOffset, CodegenError> {
        let result = self.temp_slot(IrType::Byte)?;
        let lhs_value = self.lower_value(lhs)?;
        self.code.push(Statement::WriteValue {
            value: lhs_value,
            dest: result,
            ty: IrType::Byte,
        });
        let skip = self.new_label("bool_skip");
        match op {
            // A false left side decides AND; skip straight past the right side.
            ShortCircuitOp::And => {
                self.code.push(Statement::JumpIfNot {
                    condition: result,
                    target: skip.clone(),
                });
            }
            // A true left side decides OR; invert so the skip jump fires on true.
            ShortCircuitOp::Or => {
                let inverted = self.temp_slot(IrType::Byte)?;
                self.code.push(Statement::StaticCall {
                    callee: PouId::new("NOT_BOOL"),
                    inputs: vec![result],
                    outputs: vec![inverted],
                });
                self.code.push(Statement::JumpIfNot {
                    condition: inverted,
                    target: skip.clone(),
                });
            }
        }
        let rhs_value = self.lower_value(rhs)?;
        self.code.push(Statement::WriteValue {
            value: rhs_value,
            dest: result,
            ty: IrType::Byte,
        });
        self.code.push(Statement::Label(skip));
        Ok(result)
    }

    pub(crate) fn access_read(&mut self, access: &Access) -> Result<Expression, CodegenError> {
        if let Some(slot) = access.plain_slot() {
            return Ok(Expression::LoadValue(slot));
        }
        let pointer = self.access_pointer_slot(access)?;
        Ok(Expression::Deref(pointer))
    }

    pub(crate) fn access_write(
        &mut self,
        access: &Access,
        value: Expression,
        ty: IrType,
    ) -> Result<(), CodegenError> {
        if let Some(dest) = access.plain_slot() {
            self.code.push(Statement::WriteValue { value, dest, ty });
            return Ok(());
        }
        let dest = self.access_pointer_slot(access)?;
        self.code.push(Statement::WriteDerefValue { value, dest, ty });
        Ok(())
    }

    /// Slot holding this access's address, materializing it when needed.
    pub(crate) fn access_pointer_slot(
        &mut self,
        access: &Access,
    ) -> Result<LocalVarOffset, CodegenError> {
        if let Some(slot) = access.pointer_slot() {
            return Ok(slot);
        }
        let slot = self.temp_slot(IrType::POINTER)?;
        self.code.push(Statement::WriteValue {
            value: access.address_expression(),
            dest: slot,
            ty: IrType::POINTER,
        });
        Ok(slot)
    }

    fn lower_call_value(
        &mut self,
        call: &CallExpr,
        result_ty: TypeId,
    ) -> Result<(LocalVarOffset, IrType), CodegenError> {
        self.lower_call(call, Some(result_ty), None)?
            .ok_or(CodegenError::Unsupported("call without a result used as a value"))
    }

    /// Lowers one call. `ret_dest`, when present, receives the return
    /// value; a plain destination slot is bound directly, anything else
    /// goes through a temporary with a copy-back after the call.
    pub(crate) fn lower_call(
        &mut self,
        call: &CallExpr,
        result_ty: Option<TypeId>,
        ret_dest: Option<&Access>,
    ) -> Result<Option<(LocalVarOffset, IrType)>, CodegenError> {
        match &call.callee {
            Callee::Builtin(name) => {
                let mut args: Vec<_> = call.args.iter().collect();
                args.sort_by_key(|arg| arg.param);
                let mut inputs = Vec::with_capacity(args.len());
                for arg in args {
                    inputs.push(self.lower_to_slot(&arg.value)?.0);
                }
                let result_ty = result_ty
                    .ok_or(CodegenError::Unsupported("builtin call with a discarded result"))?;
                let ty = self.slot_ty(result_ty)?;
                let (out_slot, copy_back) = self.output_binding(ret_dest, ty)?;
                self.code.push(Statement::StaticCall {
                    callee: PouId::new(name.clone()),
                    inputs,
                    outputs: vec![out_slot],
                });
                if let Some(dest) = copy_back {
                    self.access_write(&dest, Expression::LoadValue(out_slot), ty)?;
                }
                Ok(Some((out_slot, ty)))
            }
            Callee::Pou(id) | Callee::Instance { pou: id, .. } => {
                let module = self.module;
                let sig = module
                    .signature(id)
                    .ok_or_else(|| CodegenError::UnknownCallee(id.clone()))?;

                let mut inputs = Vec::new();
                if sig.instance_type.is_some() {
                    let Callee::Instance { target, .. } = &call.callee else {
                        return Err(CodegenError::Unsupported(
                            "instance callable invoked without a target",
                        ));
                    };
                    let access = self.lower_access(target)?;
                    inputs.push(self.access_pointer_slot(&access)?);
                }

                // (slot passed to the callee, copy-back destination, width)
                let mut output_binds: Vec<(LocalVarOffset, Option<Access>, IrType)> = Vec::new();
                for (index, param) in sig.params.iter().enumerate() {
                    let arg = call.args.iter().find(|arg| arg.param == index);
                    match param.direction {
                        ParamDirection::In => {
                            let by_ref = !module.registry.is_slot_sized(param.ty);
                            match (arg, by_ref) {
                                (Some(arg), false) => {
                                    inputs.push(self.lower_to_slot(&arg.value)?.0);
                                }
                                (Some(arg), true) => {
                                    let access = self.lower_access(&arg.value)?;
                                    inputs.push(self.access_pointer_slot(&access)?);
                                }
                                (None, false) => {
                                    // Unbound inputs keep their declared
                                    // default, which is all-zero here.
                                    let ty = self.slot_ty(param.ty)?;
                                    let slot = self.temp_slot(ty)?;
                                    self.write_literal(slot, 0, ty);
                                    inputs.push(slot);
                                }
                                (None, true) => {
                                    return Err(CodegenError::Unsupported(
                                        "aggregate input left unbound",
                                    ));
                                }
                            }
                        }
                        ParamDirection::InOut => {
                            let arg = arg.ok_or(CodegenError::Unsupported(
                                "in-out argument left unbound",
                            ))?;
                            let access = self.lower_access(&arg.value)?;
                            inputs.push(self.access_pointer_slot(&access)?);
                        }
                        ParamDirection::Out => {
                            let ty = self.slot_ty(param.ty)?;
                            let dest = match arg {
                                Some(arg) => Some(self.lower_access(&arg.value)?),
                                None => None,
                            };
                            let (slot, copy_back) = self.output_binding(dest.as_ref(), ty)?;
                            output_binds.push((slot, copy_back, ty));
                        }
                    }
                }

                let result = match sig.return_type {
                    Some(return_ty) => {
                        let ty = self.slot_ty(return_ty)?;
                        let (slot, copy_back) = self.output_binding(ret_dest, ty)?;
                        output_binds.push((slot, copy_back, ty));
                        Some((slot, ty))
                    }
                    None => None,
                };

                self.code.push(Statement::StaticCall {
                    callee: id.clone(),
                    inputs,
                    outputs: output_binds.iter().map(|bind| bind.0).collect(),
                });
                for (slot, copy_back, ty) in output_binds {
                    if let Some(dest) = copy_back {
                        self.access_write(&dest, Expression::LoadValue(slot), ty)?;
                    }
                }
                Ok(result)
            }
        }
    }

    /// Binds one output slot: a plain destination is written directly by
    /// the callee, anything else gets a temporary plus a copy-back.
    fn output_binding(
        &mut self,
        dest: Option<&Access>,
        ty: IrType,
    ) -> Result<(LocalVarOffset, Option<Access>), CodegenError> {
        match dest {
            None => Ok((self.temp_slot(ty)?, None)),
            Some(access) => match access.plain_slot() {
                Some(slot) => Ok((slot, None)),
                None => Ok((self.temp_slot(ty)?, Some(access.clone()))),
            },
        }
    }
}
