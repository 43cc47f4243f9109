//! Byte-addressed heap with allocation tracking.
//!
//! An address packs `(allocation index + 1) << 32 | offset`, so null is
//! zero and every allocation has its own 4 GiB window. Freed allocations
//! keep their slot, which turns any later access into a precise
//! use-after-free error instead of silently hitting reused memory.

use super::error::{ExecError, ExecResult};

const OFFSET_BITS: u32 = 32;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AllocKind {
    /// Runtime and host allocations; must be freed explicitly.
    Heap,
    /// Function-local slots, released when the frame returns.
    Stack,
    /// Module data and host-owned memory; never freed.
    Static,
}

struct Allocation {
    bytes: Vec<u8>,
    kind: AllocKind,
    live: bool,
}

#[derive(Default)]
pub struct Heap {
    allocs: Vec<Allocation>,
}

impl Heap {
    pub fn alloc(&mut self, size: u64, kind: AllocKind) -> u64 {
        let index = self.allocs.len() as u64;
        self.allocs.push(Allocation {
            bytes: vec![0; usize::try_from(size).unwrap_or(usize::MAX)],
            kind,
            live: true,
        });
        (index + 1) << OFFSET_BITS
    }

    fn decode(&self, addr: u64) -> ExecResult<(usize, usize)> {
        let slot = addr >> OFFSET_BITS;
        if slot == 0 {
            return Err(ExecError::NullDereference);
        }
        let index = usize::try_from(slot - 1).map_err(|_| ExecError::InvalidAddress { addr })?;
        if index >= self.allocs.len() {
            return Err(ExecError::InvalidAddress { addr });
        }
        let offset = usize::try_from(addr & OFFSET_MASK)
            .map_err(|_| ExecError::InvalidAddress { addr })?;
        Ok((index, offset))
    }

    fn live(&self, addr: u64) -> ExecResult<(&Allocation, usize)> {
        let (index, offset) = self.decode(addr)?;
        let alloc = &self.allocs[index];
        if !alloc.live {
            return Err(ExecError::UseAfterFree { addr });
        }
        Ok((alloc, offset))
    }

    pub fn free(&mut self, addr: u64) -> ExecResult<()> {
        let (index, offset) = self.decode(addr)?;
        let alloc = &mut self.allocs[index];
        if offset != 0 || alloc.kind != AllocKind::Heap {
            return Err(ExecError::InvalidFree { addr });
        }
        if !alloc.live {
            return Err(ExecError::DoubleFree { addr });
        }
        alloc.live = false;
        alloc.bytes = Vec::new();
        Ok(())
    }

    /// Release a stack slot. Not an error if already released.
    pub fn pop_stack(&mut self, addr: u64) {
        if let Ok((index, _)) = self.decode(addr) {
            let alloc = &mut self.allocs[index];
            if alloc.kind == AllocKind::Stack {
                alloc.live = false;
                alloc.bytes = Vec::new();
            }
        }
    }

    pub fn read(&self, addr: u64, len: u64) -> ExecResult<&[u8]> {
        let (alloc, offset) = self.live(addr)?;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| offset.checked_add(len))
            .filter(|&end| end <= alloc.bytes.len())
            .ok_or(ExecError::OutOfBounds { addr, len })?;
        Ok(&alloc.bytes[offset..end])
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> ExecResult<()> {
        let (index, offset) = self.decode(addr)?;
        let alloc = &mut self.allocs[index];
        if !alloc.live {
            return Err(ExecError::UseAfterFree { addr });
        }
        let len = data.len() as u64;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= alloc.bytes.len())
            .ok_or(ExecError::OutOfBounds { addr, len })?;
        alloc.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Number of heap allocations that have not been freed.
    pub fn live_heap(&self) -> usize {
        self.allocs
            .iter()
            .filter(|a| a.live && a.kind == AllocKind::Heap)
            .count()
    }

    /// Whether `addr` points into a live allocation.
    pub fn is_live(&self, addr: u64) -> bool {
        self.live(addr).is_ok()
    }
}
