//! Decoders for results left in module linear memory.
//!
//! Stateless functions over a memory view. Callers pass a view taken after
//! the native call returned, never one captured before it.

use crate::error::{Result, Woff2Error};
use crate::memory::{self, ModuleRegion};

/// Copy exactly `region.len` bytes out of linear memory.
pub fn read_fixed(memory: &[u8], region: ModuleRegion) -> Result<Vec<u8>> {
    Ok(memory::slice(memory, region)?.to_vec())
}

/// Read a little-endian `u32` (the wasm32 native layout).
pub fn read_u32_le(memory: &[u8], offset: u32) -> Result<u32> {
    let bytes = memory::slice(memory, ModuleRegion::new(offset, 4))?;
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(word))
}

/// Borrow the bytes of a NUL-terminated string, excluding the terminator.
///
/// The scan runs until the first zero byte; it only stops short when it
/// reaches the end of linear memory.
pub fn read_c_str(memory: &[u8], offset: u32) -> Result<&[u8]> {
    let start = offset as usize;
    let tail = memory
        .get(start..)
        .ok_or_else(|| Woff2Error::out_of_bounds(offset, 1, memory.len()))?;

    match tail.iter().position(|&b| b == 0) {
        Some(len) => Ok(&tail[..len]),
        None => Err(Woff2Error::UnterminatedString {
            offset,
            memory_size: memory.len(),
        }),
    }
}

/// Read a NUL-terminated string and decode it as strict UTF-8.
pub fn read_c_string(memory: &[u8], offset: u32) -> Result<String> {
    let bytes = read_c_str(memory, offset)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| Woff2Error::Decoding {
            cause: format!("Invalid UTF-8 string at offset {}: {}", offset, e),
        })
}
