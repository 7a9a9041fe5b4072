//! Program loading and the stepping interpreter.
//!
//! [`Program::load`] validates a compiled module up front: labels must be
//! unique and every jump and call must resolve, so execution never checks
//! program structure again. [`Interpreter`] then runs it one IR statement
//! per [`Interpreter::step`]. Builtin calls complete within the caller's
//! step; a call to a compiled POU pushes a frame and its body runs on the
//! following steps. Panics are terminal but leave all memory and the frame
//! stack inspectable.

use coil_ir::{
    AddressBase, AddressElement, BreakpointId, BreakpointMap, CompiledArgument, CompiledModule,
    CompiledPou, Expression, IrType, LocalVarOffset, MemoryLocation, PouId, Statement, STACK_AREA,
};
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::builtins::{self, Builtin};
use crate::error::{LoadError, PanicReason};
use crate::memory::{Memory, STACK_BYTES};

/// A compiled module validated for execution.
#[derive(Debug, Clone)]
pub struct Program {
    module: CompiledModule,
    /// Per-POU label positions, resolved at load.
    labels: FxHashMap<PouId, FxHashMap<SmolStr, usize>>,
}

impl Program {
    /// Validates and loads a compiled module.
    pub fn load(module: CompiledModule) -> Result<Self, LoadError> {
        let mut labels = FxHashMap::default();
        for (id, pou) in module.pous() {
            labels.insert(id.clone(), collect_labels(pou)?);
        }
        for (id, pou) in module.pous() {
            validate_pou(&module, id, pou, &labels[id])?;
        }
        for init in &module.initializers {
            if module.pou(init).is_none() {
                return Err(LoadError::UnknownPou(init.clone()));
            }
        }
        Ok(Self { module, labels })
    }

    #[must_use]
    pub fn pou(&self, id: &PouId) -> Option<&CompiledPou> {
        self.module.pou(id)
    }

    #[must_use]
    pub fn breakpoint_map(&self, id: &PouId) -> Option<&BreakpointMap> {
        self.module.pou(id)?.breakpoints.as_ref()
    }

    fn label(&self, pou: &PouId, name: &str) -> Result<usize, PanicReason> {
        self.labels
            .get(pou)
            .and_then(|map| map.get(name))
            .copied()
            .ok_or(PanicReason::MalformedImage)
    }
}

fn collect_labels(pou: &CompiledPou) -> Result<FxHashMap<SmolStr, usize>, LoadError> {
    let mut labels = FxHashMap::default();
    for (index, statement) in pou.code.iter().enumerate() {
        if let Some(name) = statement.defined_label() {
            if labels.insert(name.clone(), index).is_some() {
                return Err(LoadError::DuplicateLabel {
                    pou: pou.id.clone(),
                    label: name.clone(),
                });
            }
        }
    }
    Ok(labels)
}

fn validate_pou(
    module: &CompiledModule,
    id: &PouId,
    pou: &CompiledPou,
    labels: &FxHashMap<SmolStr, usize>,
) -> Result<(), LoadError> {
    for statement in &pou.code {
        if let Some(target) = statement.jump_target() {
            if !labels.contains_key(target) {
                return Err(LoadError::UnresolvedJump {
                    pou: id.clone(),
                    label: target.clone(),
                });
            }
        }
        let Statement::StaticCall {
            callee,
            inputs,
            outputs,
        } = statement
        else {
            continue;
        };
        let (expected_in, expected_out) = if let Some(target) = module.pou(callee) {
            (target.inputs.len(), target.outputs.len())
        } else if let Some(builtin) = builtins::resolve(callee.as_str()) {
            (builtin.input_types().len(), 1)
        } else {
            return Err(LoadError::UnknownCallee {
                pou: id.clone(),
                callee: callee.clone(),
            });
        };
        if inputs.len() != expected_in {
            return Err(LoadError::InputArity {
                pou: id.clone(),
                callee: callee.clone(),
                expected: expected_in,
                got: inputs.len(),
            });
        }
        if outputs.len() != expected_out {
            return Err(LoadError::OutputArity {
                pou: id.clone(),
                callee: callee.clone(),
                expected: expected_out,
                got: outputs.len(),
            });
        }
    }
    Ok(())
}

/// Where execution currently stands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionState {
    /// More statements to run.
    Running,
    /// Stopped on a breakpoint; stepping resumes.
    Breakpoint,
    /// The outermost frame returned.
    EndOfProgram,
    /// Terminal failure; memory and frames stay inspectable.
    Panic(PanicReason),
}

#[derive(Debug, Clone)]
struct Frame {
    pou: PouId,
    base: u16,
    pc: usize,
    /// Output slots copied back to the caller on return.
    copy_out: Vec<(CompiledArgument, MemoryLocation)>,
}

/// One stack-trace entry, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// The POU executing in this frame.
    pub pou: PouId,
    /// Index of the next statement to execute.
    pub instruction: u32,
    /// Breakpoint record covering that statement, if the POU has a map.
    pub breakpoint: Option<BreakpointId>,
}

/// The stepping machine for one loaded program.
#[derive(Debug, Clone)]
pub struct Interpreter {
    program: Program,
    memory: Memory,
    frames: Vec<Frame>,
    state: ExecutionState,
    breakpoints: FxHashSet<(PouId, BreakpointId)>,
    /// One-shot overlay, cleared whenever any breakpoint is hit.
    temporary: FxHashSet<(PouId, BreakpointId)>,
}

impl Interpreter {
    #[must_use]
    pub fn new(program: Program) -> Self {
        let memory = Memory::new(&program.module.areas);
        Self {
            program,
            memory,
            frames: Vec::new(),
            state: ExecutionState::EndOfProgram,
            breakpoints: FxHashSet::default(),
            temporary: FxHashSet::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Runs every generated global initializer to completion.
    pub fn initialize(&mut self) -> ExecutionState {
        for init in self.program.module.initializers.clone() {
            if self.start(&init).is_err() {
                // Load validation guarantees initializers exist.
                self.state = ExecutionState::Panic(PanicReason::MalformedImage);
                return self.state;
            }
            match self.run() {
                ExecutionState::EndOfProgram => {}
                other => return other,
            }
        }
        self.state = ExecutionState::EndOfProgram;
        self.state
    }

    /// Resets the frame stack and enters a POU at its first statement.
    /// Global memory is untouched, so inputs written beforehand survive.
    pub fn start(&mut self, entry: &PouId) -> Result<(), LoadError> {
        let pou = self
            .program
            .pou(entry)
            .ok_or_else(|| LoadError::UnknownPou(entry.clone()))?;
        let stack_size = pou.stack_size;
        self.frames.clear();
        self.frames.push(Frame {
            pou: entry.clone(),
            base: 0,
            pc: 0,
            copy_out: Vec::new(),
        });
        // Frame offsets are 16-bit, so an entry frame at base 0 always fits
        // the stack area. A failure here would mean a corrupt image.
        if let Err(reason) = self.memory.zero_stack(0, stack_size) {
            self.state = ExecutionState::Panic(reason);
            return Ok(());
        }
        self.state = ExecutionState::Running;
        // A breakpoint on the very first statement stops before it runs.
        self.check_breakpoint();
        tracing::debug!(pou = %entry, "start");
        Ok(())
    }

    /// Executes exactly one IR statement of the innermost frame.
    pub fn step(&mut self) -> ExecutionState {
        match self.state {
            ExecutionState::Panic(_) => return self.state,
            ExecutionState::EndOfProgram if self.frames.is_empty() => return self.state,
            _ => self.state = ExecutionState::Running,
        }
        match self.execute_current() {
            Ok(()) => {
                if self.frames.is_empty() {
                    self.state = ExecutionState::EndOfProgram;
                } else {
                    self.check_breakpoint();
                }
            }
            Err(reason) => {
                tracing::debug!(%reason, "panic");
                self.state = ExecutionState::Panic(reason);
            }
        }
        self.state
    }

    /// Steps until execution stops for any reason.
    pub fn run(&mut self) -> ExecutionState {
        loop {
            match self.step() {
                ExecutionState::Running => {}
                other => return other,
            }
        }
    }

    /// Runs to the next breakpoint on a different source line, using the
    /// stepping successors of the current breakpoint as one-shot stops.
    pub fn step_line(&mut self) -> ExecutionState {
        if let Some((pou, id)) = self.current_breakpoint() {
            if let Some(map) = self.program.breakpoint_map(&pou) {
                for successor in map.next_line_successors(id) {
                    self.temporary.insert((pou.clone(), successor));
                }
            }
        }
        self.run()
    }

    pub fn add_breakpoint(&mut self, pou: &PouId, id: BreakpointId) {
        self.breakpoints.insert((pou.clone(), id));
    }

    pub fn remove_breakpoint(&mut self, pou: &PouId, id: BreakpointId) {
        self.breakpoints.remove(&(pou.clone(), id));
    }

    /// One-shot breakpoint; the whole overlay clears on the next hit.
    pub fn add_temporary_breakpoint(&mut self, pou: &PouId, id: BreakpointId) {
        self.temporary.insert((pou.clone(), id));
    }

    /// Breakpoint record covering the innermost frame's position.
    #[must_use]
    pub fn current_breakpoint(&self) -> Option<(PouId, BreakpointId)> {
        let frame = self.frames.last()?;
        let map = self.program.breakpoint_map(&frame.pou)?;
        let id = map.breakpoint_at_instruction(frame.pc as u32)?;
        Some((frame.pou.clone(), id))
    }

    /// Call stack, innermost frame first.
    #[must_use]
    pub fn stack_trace(&self) -> Vec<FrameInfo> {
        self.frames
            .iter()
            .rev()
            .map(|frame| FrameInfo {
                pou: frame.pou.clone(),
                instruction: frame.pc as u32,
                breakpoint: self
                    .program
                    .breakpoint_map(&frame.pou)
                    .and_then(|map| map.breakpoint_at_instruction(frame.pc as u32)),
            })
            .collect()
    }

    /// Reads from the stack area, absolute offset. The entry POU's frame
    /// starts at 0, so its slots are directly addressable here.
    pub fn read_stack(&self, offset: u16, ty: IrType) -> Result<u64, PanicReason> {
        self.memory.read(MemoryLocation::new(STACK_AREA, offset), ty)
    }

    /// Writes into the stack area, absolute offset. Used by a host to set
    /// entry-POU inputs before running.
    pub fn write_stack(&mut self, offset: u16, ty: IrType, bits: u64) -> Result<(), PanicReason> {
        self.memory
            .write(MemoryLocation::new(STACK_AREA, offset), ty, bits)
    }

    pub fn read_global(&self, area: u16, offset: u16, ty: IrType) -> Result<u64, PanicReason> {
        self.memory.read(MemoryLocation::new(area, offset), ty)
    }

    pub fn write_global(
        &mut self,
        area: u16,
        offset: u16,
        ty: IrType,
        bits: u64,
    ) -> Result<(), PanicReason> {
        self.memory.write(MemoryLocation::new(area, offset), ty, bits)
    }

    fn execute_current(&mut self) -> Result<(), PanicReason> {
        let index = self.frames.len() - 1;
        let (pou, base, pc) = {
            let frame = &self.frames[index];
            (frame.pou.clone(), frame.base, frame.pc)
        };
        let statement = self
            .program
            .pou(&pou)
            .and_then(|loaded| loaded.code.get(pc))
            .cloned();
        let Some(statement) = statement else {
            return self.do_return();
        };
        match statement {
            Statement::Comment(_) | Statement::Label(_) => {
                self.frames[index].pc = pc + 1;
            }
            Statement::Jump { target } => {
                self.frames[index].pc = self.program.label(&pou, &target)?;
            }
            Statement::JumpIfNot { condition, target } => {
                let value = self.memory.read(slot(base, condition), IrType::Byte)?;
                self.frames[index].pc = if value == 0 {
                    self.program.label(&pou, &target)?
                } else {
                    pc + 1
                };
            }
            Statement::Return => {
                self.do_return()?;
            }
            Statement::WriteValue { value, dest, ty } => {
                let bits = self.eval(base, &value, ty)?;
                self.memory.write(slot(base, dest), ty, bits)?;
                self.frames[index].pc = pc + 1;
            }
            Statement::WriteDerefValue { value, dest, ty } => {
                let bits = self.eval(base, &value, ty)?;
                let pointer = self.memory.read(slot(base, dest), IrType::POINTER)?;
                self.memory
                    .write(MemoryLocation::from_bits(pointer as u32), ty, bits)?;
                self.frames[index].pc = pc + 1;
            }
            Statement::StaticCall {
                callee,
                inputs,
                outputs,
            } => {
                self.frames[index].pc = pc + 1;
                self.do_call(base, &callee, &inputs, &outputs)?;
            }
        }
        Ok(())
    }

    fn eval(&self, base: u16, expression: &Expression, ty: IrType) -> Result<u64, PanicReason> {
        match expression {
            Expression::Literal { bits, .. } => Ok(*bits),
            Expression::LoadValue(offset) => self.memory.read(slot(base, *offset), ty),
            Expression::Deref(offset) => {
                let pointer = self.memory.read(slot(base, *offset), IrType::POINTER)?;
                self.memory.read(MemoryLocation::from_bits(pointer as u32), ty)
            }
            Expression::Address {
                base: address_base,
                elements,
            } => Ok(u64::from(self.address(base, address_base, elements)?)),
        }
    }

    fn address(
        &self,
        frame_base: u16,
        base: &AddressBase,
        elements: &[AddressElement],
    ) -> Result<u32, PanicReason> {
        let mut bits = match base {
            AddressBase::Stack(offset) => slot(frame_base, *offset).to_bits(),
            AddressBase::Pointer(offset) => {
                self.memory.read(slot(frame_base, *offset), IrType::POINTER)? as u32
            }
        };
        for element in elements {
            match element {
                AddressElement::FieldOffset(field) => {
                    bits = bits.wrapping_add(u32::from(*field));
                }
                AddressElement::CheckedIndex {
                    index,
                    lower,
                    upper,
                    element_size,
                } => {
                    let value =
                        self.memory.read(slot(frame_base, *index), IrType::DWord)? as u32 as i32;
                    if value < *lower || value > *upper {
                        return Err(PanicReason::IndexOutOfBounds {
                            index: value,
                            lower: *lower,
                            upper: *upper,
                        });
                    }
                    let relative = value.wrapping_sub(*lower) as u32;
                    bits = bits.wrapping_add(relative.wrapping_mul(u32::from(*element_size)));
                }
                AddressElement::UncheckedIndex {
                    index,
                    element_size,
                } => {
                    let value =
                        self.memory.read(slot(frame_base, *index), IrType::DWord)? as u32;
                    bits = bits.wrapping_add(value.wrapping_mul(u32::from(*element_size)));
                }
            }
        }
        Ok(bits)
    }

    fn do_call(
        &mut self,
        caller_base: u16,
        callee: &PouId,
        inputs: &[LocalVarOffset],
        outputs: &[LocalVarOffset],
    ) -> Result<(), PanicReason> {
        if let Some(target) = self.program.pou(callee) {
            let target_id = target.id.clone();
            let stack_size = target.stack_size;
            let in_args = target.inputs.clone();
            let out_args = target.outputs.clone();

            let caller_size = self
                .frames
                .last()
                .and_then(|frame| self.program.pou(&frame.pou))
                .map_or(0, |pou| pou.stack_size);
            let base = (u32::from(caller_base) + u32::from(caller_size)).next_multiple_of(8);
            if base as usize + usize::from(stack_size) > STACK_BYTES {
                return Err(PanicReason::StackOverflow);
            }
            let base = base as u16;

            self.memory.zero_stack(base, stack_size)?;
            for (arg, from) in in_args.iter().zip(inputs) {
                self.memory
                    .copy(slot(caller_base, *from), slot(base, arg.offset), arg.ty.byte_size())?;
            }
            let copy_out = out_args
                .iter()
                .zip(outputs)
                .map(|(arg, to)| (*arg, slot(caller_base, *to)))
                .collect();
            tracing::trace!(callee = %target_id, base, "call");
            self.frames.push(Frame {
                pou: target_id,
                base,
                pc: 0,
                copy_out,
            });
            return Ok(());
        }

        let Some(builtin) = builtins::resolve(callee.as_str()) else {
            return Err(PanicReason::MalformedImage);
        };
        if let Builtin::ForNext(ty) = builtin {
            let pointer =
                self.memory.read(slot(caller_base, inputs[0]), IrType::POINTER)? as u32;
            let control_loc = MemoryLocation::from_bits(pointer);
            let control = self.memory.read(control_loc, ty.ir_type())?;
            let step = self.memory.read(slot(caller_base, inputs[1]), ty.ir_type())?;
            let end = self.memory.read(slot(caller_base, inputs[2]), ty.ir_type())?;
            let (next, more) = builtins::for_next(ty, control, step, end);
            self.memory.write(control_loc, ty.ir_type(), next)?;
            self.memory
                .write(slot(caller_base, outputs[0]), IrType::Byte, more)?;
            return Ok(());
        }
        let widths = builtin.input_types();
        let mut values = Vec::with_capacity(widths.len());
        for (offset, ty) in inputs.iter().zip(widths) {
            values.push(self.memory.read(slot(caller_base, *offset), ty)?);
        }
        let result = builtin.eval(&values)?;
        self.memory
            .write(slot(caller_base, outputs[0]), builtin.output_type(), result)?;
        Ok(())
    }

    fn do_return(&mut self) -> Result<(), PanicReason> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        for (arg, to) in &frame.copy_out {
            self.memory
                .copy(slot(frame.base, arg.offset), *to, arg.ty.byte_size())?;
        }
        tracing::trace!(pou = %frame.pou, "return");
        Ok(())
    }

    fn check_breakpoint(&mut self) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        let Some(map) = self.program.breakpoint_map(&frame.pou) else {
            return;
        };
        let pc = frame.pc as u32;
        let Some(id) = map.breakpoint_at_instruction(pc) else {
            return;
        };
        if map.instruction_range(id).start != pc {
            return;
        }
        let key = (frame.pou.clone(), id);
        if self.breakpoints.contains(&key) || self.temporary.contains(&key) {
            self.temporary.clear();
            self.state = ExecutionState::Breakpoint;
        }
    }
}

fn slot(base: u16, offset: LocalVarOffset) -> MemoryLocation {
    MemoryLocation::new(STACK_AREA, base.wrapping_add(offset.0))
}
