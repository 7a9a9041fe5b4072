//! Stack frame layout for a single POU.
//!
//! Slots are handed out by a bump allocator. Declared variables (the hidden
//! instance pointer, parameters, the return slot and local variables) are
//! allocated first and keep their offsets for the lifetime of the frame.
//! Everything allocated after [`StackFrameAllocator::seal`] is a temporary:
//! calling [`StackFrameAllocator::reset_temporaries`] rewinds the cursor to
//! the end of the declared region so later statements reuse the same bytes.
//! The reported frame size is the high-water mark of the cursor, so reclaimed
//! temporaries never shrink the frame below what any statement needed.

use coil_ir::{IrType, LocalVarOffset, PouId, ValueShape, VariableDebugEntry};
use smol_str::SmolStr;

use crate::error::CodegenError;

#[derive(Debug)]
pub(crate) struct StackFrameAllocator {
    pou: PouId,
    cursor: u16,
    /// End of the declared region, set by `seal`.
    declared_end: u16,
    /// High-water mark of `cursor`.
    frame_size: u16,
    argument_vars: Vec<VariableDebugEntry>,
    local_vars: Vec<VariableDebugEntry>,
}

impl StackFrameAllocator {
    pub(crate) fn new(pou: PouId) -> Self {
        Self {
            pou,
            cursor: 0,
            declared_end: 0,
            frame_size: 0,
            argument_vars: Vec::new(),
            local_vars: Vec::new(),
        }
    }

    /// Reserves `size` bytes aligned to `align` and returns their offset.
    pub(crate) fn allocate(&mut self, size: u16, align: u16) -> Result<LocalVarOffset, CodegenError> {
        debug_assert!(align.is_power_of_two());
        let aligned = u32::from(self.cursor)
            .checked_next_multiple_of(u32::from(align))
            .unwrap_or(u32::MAX);
        let end = aligned + u32::from(size);
        let Ok(end) = u16::try_from(end) else {
            return Err(CodegenError::FrameOverflow(self.pou.clone()));
        };
        self.cursor = end;
        self.frame_size = self.frame_size.max(end);
        Ok(LocalVarOffset(aligned as u16))
    }

    /// Reserves a slot sized for `ty`.
    pub(crate) fn allocate_slot(&mut self, ty: IrType) -> Result<LocalVarOffset, CodegenError> {
        let size = ty.byte_size();
        self.allocate(size, size.max(1))
    }

    /// Marks the end of the declared region. Must be called exactly once,
    /// after all named variables have been allocated.
    pub(crate) fn seal(&mut self) {
        self.declared_end = self.cursor;
    }

    /// Releases every temporary allocated since the last reset. Offsets of
    /// declared variables are unaffected.
    pub(crate) fn reset_temporaries(&mut self) {
        self.cursor = self.declared_end;
    }

    /// Size in bytes the frame needs at its widest point.
    pub(crate) fn frame_size(&self) -> u16 {
        self.frame_size
    }

    pub(crate) fn record_argument(&mut self, name: SmolStr, offset: LocalVarOffset, shape: ValueShape) {
        self.argument_vars.push(VariableDebugEntry { name, offset, shape });
    }

    pub(crate) fn record_local(&mut self, name: SmolStr, offset: LocalVarOffset, shape: ValueShape) {
        self.local_vars.push(VariableDebugEntry { name, offset, shape });
    }

    pub(crate) fn into_debug_vars(self) -> (Vec<VariableDebugEntry>, Vec<VariableDebugEntry>) {
        (self.argument_vars, self.local_vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporaries_are_reclaimed_but_widen_the_frame() {
        let mut frame = StackFrameAllocator::new(PouId::from("Main"));
        let a = frame.allocate(4, 4).unwrap();
        let b = frame.allocate(1, 1).unwrap();
        frame.seal();
        assert_eq!((a, b), (LocalVarOffset(0), LocalVarOffset(4)));

        let t1 = frame.allocate(4, 4).unwrap();
        assert_eq!(t1, LocalVarOffset(8));
        frame.reset_temporaries();
        let t2 = frame.allocate(2, 2).unwrap();
        assert_eq!(t2, LocalVarOffset(6));
        frame.reset_temporaries();

        // The widest statement needed 12 bytes even though temporaries
        // were released afterwards.
        assert_eq!(frame.frame_size(), 12);
    }

    #[test]
    fn alignment_inserts_padding() {
        let mut frame = StackFrameAllocator::new(PouId::from("Main"));
        frame.allocate(1, 1).unwrap();
        let aligned = frame.allocate(8, 8).unwrap();
        assert_eq!(aligned, LocalVarOffset(8));
    }

    #[test]
    fn overflowing_the_offset_range_is_an_error() {
        let mut frame = StackFrameAllocator::new(PouId::from("Main"));
        frame.allocate(u16::MAX, 1).unwrap();
        assert!(matches!(
            frame.allocate(4, 4),
            Err(CodegenError::FrameOverflow(_))
        ));
    }
}
