//! The native codec module seam.
//!
//! [`CodecModule`] is everything the marshaling protocol needs from a module:
//! an allocator pair, byte-level access to linear memory and the three codec
//! exports. The Wasmtime-backed implementation lives in `mrkwoff2-host`; an
//! instrumented in-memory implementation lives in [`crate::testing`].

use crate::error::{Operation, Result};
use crate::memory::ModuleRegion;

/// Symbol names of the exports a codec module must provide.
///
/// Defaults match the Emscripten build of the codec (`EMSCRIPTEN_KEEPALIVE`
/// functions plus libc `malloc`/`free` and the exported memory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNames {
    /// `compress(in_ptr, in_len, out_len_ptr) -> out_ptr`
    pub compress: String,
    /// `decompress(in_ptr, in_len, out_len_ptr) -> out_ptr`
    pub decompress: String,
    /// `info(in_ptr, in_len) -> str_ptr`
    pub info: String,
    /// `allocate(size) -> ptr`
    pub allocate: String,
    /// `release(ptr)`
    pub release: String,
    /// Exported linear memory.
    pub memory: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            compress: "compress_woff2".to_string(),
            decompress: "decompress_woff2".to_string(),
            info: "info_woff2".to_string(),
            allocate: "malloc".to_string(),
            release: "free".to_string(),
            memory: "memory".to_string(),
        }
    }
}

impl ExportNames {
    /// Prefix every function symbol (not the memory), for toolchains that
    /// export C symbols with a leading underscore.
    pub fn with_prefix(prefix: &str) -> Self {
        let base = Self::default();
        Self {
            compress: format!("{}{}", prefix, base.compress),
            decompress: format!("{}{}", prefix, base.decompress),
            info: format!("{}{}", prefix, base.info),
            allocate: format!("{}{}", prefix, base.allocate),
            release: format!("{}{}", prefix, base.release),
            memory: base.memory,
        }
    }

    /// Symbol of the export backing an operation.
    pub fn for_operation(&self, operation: Operation) -> &str {
        match operation {
            Operation::Compress => &self.compress,
            Operation::Decompress => &self.decompress,
            Operation::Info => &self.info,
        }
    }

    /// All required symbols, in the order they are verified.
    pub fn required(&self) -> [&str; 6] {
        [
            &self.compress,
            &self.decompress,
            &self.info,
            &self.allocate,
            &self.release,
            &self.memory,
        ]
    }
}

/// A call into one of the codec exports, with already-marshaled arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCall {
    /// `compress(input.offset, input.len, out_len)`
    Compress {
        /// Marshaled input.
        input: ModuleRegion,
        /// Offset of the output length cell.
        out_len: u32,
    },
    /// `decompress(input.offset, input.len, out_len)`
    Decompress {
        /// Marshaled input.
        input: ModuleRegion,
        /// Offset of the output length cell.
        out_len: u32,
    },
    /// `info(input.offset, input.len)`
    Info {
        /// Marshaled input.
        input: ModuleRegion,
    },
}

impl NativeCall {
    /// The operation this call performs.
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Compress { .. } => Operation::Compress,
            Self::Decompress { .. } => Operation::Decompress,
            Self::Info { .. } => Operation::Info,
        }
    }

    /// The marshaled input region.
    pub const fn input(&self) -> ModuleRegion {
        match self {
            Self::Compress { input, .. }
            | Self::Decompress { input, .. }
            | Self::Info { input } => *input,
        }
    }
}

/// A loaded native codec module.
///
/// All offsets are raw positions in the module's 32-bit linear memory and
/// `0` is the failure sentinel for every routine that returns one.
/// Implementations report traps and host-side failures as `Err`; they never
/// translate a zero return into an error themselves.
pub trait CodecModule: Send {
    /// Verify that every required export is present.
    ///
    /// Fails with [`crate::Woff2Error::MissingExport`] naming the first
    /// missing symbol.
    fn check_exports(&self) -> Result<()>;

    /// Call the module allocator. Returns the raw offset (0 on failure).
    fn allocate(&mut self, size: u32) -> Result<u32>;

    /// Release an offset previously returned by [`Self::allocate`] or by a
    /// codec export.
    fn release(&mut self, offset: u32) -> Result<()>;

    /// Current view of linear memory.
    fn memory(&self) -> &[u8];

    /// Current mutable view of linear memory.
    fn memory_mut(&mut self) -> &mut [u8];

    /// Invoke a codec export. Returns the raw result offset (0 on failure).
    fn invoke(&mut self, call: NativeCall) -> Result<u32>;
}
