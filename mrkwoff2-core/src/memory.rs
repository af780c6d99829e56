//! Regions of module linear memory and bounds-checked access to them.
//!
//! Linear memory is only ever handled as a borrowed `&[u8]` / `&mut [u8]`
//! view obtained from the module. A view must be re-acquired after every
//! native call, since the module may grow (and thereby move) its memory.

use crate::error::{Result, Woff2Error};
use std::ops::Range;

/// Size of the cell an export writes its output length into.
pub const OUTPUT_LENGTH_CELL_SIZE: u32 = 4;

/// A region within module linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleRegion {
    /// Offset within linear memory.
    pub offset: u32,
    /// Size of the region in bytes.
    pub len: u32,
}

impl ModuleRegion {
    /// Create a new region.
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// Check if the region starts at the null offset.
    pub const fn is_null(&self) -> bool {
        self.offset == 0
    }

    /// Get the end offset (offset + len), computed without overflow.
    pub const fn end(&self) -> u64 {
        self.offset as u64 + self.len as u64
    }

    /// Byte range of this region inside a memory view of `memory_size` bytes.
    pub fn range_in(&self, memory_size: usize) -> Result<Range<usize>> {
        let end = self.end();
        if end > memory_size as u64 {
            return Err(Woff2Error::out_of_bounds(
                self.offset,
                self.len as u64,
                memory_size,
            ));
        }
        Ok(self.offset as usize..end as usize)
    }
}

/// Borrow a region of linear memory.
pub fn slice(memory: &[u8], region: ModuleRegion) -> Result<&[u8]> {
    let range = region.range_in(memory.len())?;
    Ok(&memory[range])
}

/// Write bytes to a specific location in linear memory (without allocation).
pub fn write_at(memory: &mut [u8], offset: u32, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| {
        Woff2Error::out_of_bounds(offset, data.len() as u64, memory.len())
    })?;
    let range = ModuleRegion::new(offset, len).range_in(memory.len())?;
    memory[range].copy_from_slice(data);
    Ok(())
}
