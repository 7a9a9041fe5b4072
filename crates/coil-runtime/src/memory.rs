//! Flat byte-array memory, one array per area.
//!
//! Area 0 holds all call-stack frames; area 1 is reserved; declared global
//! blocks occupy the areas the compiler assigned them. All multi-byte
//! values are little-endian. Every access is bounds-checked against its
//! area and turns into a panic reason rather than an abort, so a wild
//! pointer leaves the machine inspectable.

use coil_ir::{GlobalArea, IrType, MemoryLocation};

use crate::error::PanicReason;

/// Size of the call-stack area.
pub const STACK_BYTES: usize = 64 * 1024;

/// All memory of one running program, indexed by area.
#[derive(Debug, Clone)]
pub struct Memory {
    areas: Vec<Vec<u8>>,
}

impl Memory {
    pub(crate) fn new(areas: &[GlobalArea]) -> Self {
        let top = areas.iter().map(|area| area.area).max().unwrap_or(1).max(1);
        let mut storage = vec![Vec::new(); usize::from(top) + 1];
        storage[0] = vec![0; STACK_BYTES];
        for area in areas {
            storage[usize::from(area.area)] = vec![0; usize::from(area.size)];
        }
        Self { areas: storage }
    }

    fn bytes(&self, location: MemoryLocation, len: u16) -> Result<&[u8], PanicReason> {
        let out_of_range = PanicReason::InvalidAddress {
            area: location.area,
            offset: u32::from(location.offset),
        };
        let area = self
            .areas
            .get(usize::from(location.area))
            .ok_or(out_of_range)?;
        area.get(usize::from(location.offset)..usize::from(location.offset) + usize::from(len))
            .ok_or(out_of_range)
    }

    fn bytes_mut(&mut self, location: MemoryLocation, len: u16) -> Result<&mut [u8], PanicReason> {
        let out_of_range = PanicReason::InvalidAddress {
            area: location.area,
            offset: u32::from(location.offset),
        };
        let area = self
            .areas
            .get_mut(usize::from(location.area))
            .ok_or(out_of_range)?;
        area.get_mut(usize::from(location.offset)..usize::from(location.offset) + usize::from(len))
            .ok_or(out_of_range)
    }

    /// Reads a value, zero-extended to 64 bits.
    pub fn read(&self, location: MemoryLocation, ty: IrType) -> Result<u64, PanicReason> {
        let bytes = self.bytes(location, ty.byte_size())?;
        let mut raw = [0u8; 8];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Writes the low `ty` bytes of a value.
    pub fn write(
        &mut self,
        location: MemoryLocation,
        ty: IrType,
        bits: u64,
    ) -> Result<(), PanicReason> {
        let raw = bits.to_le_bytes();
        let bytes = self.bytes_mut(location, ty.byte_size())?;
        let len = bytes.len();
        bytes.copy_from_slice(&raw[..len]);
        Ok(())
    }

    /// Byte-wise copy between two locations.
    pub(crate) fn copy(
        &mut self,
        from: MemoryLocation,
        to: MemoryLocation,
        len: u16,
    ) -> Result<(), PanicReason> {
        let source = self.bytes(from, len)?.to_vec();
        self.bytes_mut(to, len)?.copy_from_slice(&source);
        Ok(())
    }

    /// Zeroes a fresh stack frame.
    pub(crate) fn zero_stack(&mut self, base: u16, len: u16) -> Result<(), PanicReason> {
        let frame = self.bytes_mut(MemoryLocation::new(0, base), len)?;
        frame.fill(0);
        Ok(())
    }
}
