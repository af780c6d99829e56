//! Error types for mrkwoff2.
//!
//! Every failure that can occur while driving the native codec module is
//! represented here with a stable code. Errors carry the export, offset or
//! operation involved so a failed call can be diagnosed from the message
//! alone.

use std::fmt;
use thiserror::Error;

/// The operation a marshaling call was performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// TTF to WOFF2.
    Compress,
    /// WOFF2 to TTF.
    Decompress,
    /// WOFF2 metadata text.
    Info,
}

impl Operation {
    /// Short lowercase name used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Decompress => "decompress",
            Self::Info => "info",
        }
    }

    /// Whether the export returns a length-delimited buffer (as opposed to
    /// a NUL-terminated string).
    pub const fn produces_buffer(self) -> bool {
        matches!(self, Self::Compress | Self::Decompress)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The module could not be loaded or is missing something it must export.
    /// Fatal for the lifetime of the gate that produced it.
    Initialization,
    /// Linear memory could not satisfy an allocation.
    Allocation,
    /// The native codec rejected the input or aborted while processing it.
    CodecFailure,
    /// Bytes read back from the module could not be interpreted.
    Decoding,
}

/// The main error type for mrkwoff2 operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Woff2Error {
    // =========================================================================
    // Initialization Errors (E100-E199)
    // =========================================================================
    /// The native module could not be read, compiled or instantiated.
    #[error("E101: Failed to load codec module '{module}': {cause}")]
    ModuleLoad {
        /// Description of the module source (path or label).
        module: String,
        /// Reason for the load failure.
        cause: String,
    },

    /// A required export is absent from the module.
    #[error("E102: Required export '{export}' not found in codec module")]
    MissingExport {
        /// The export symbol that was not found.
        export: String,
    },

    /// An export exists but does not have the expected signature.
    #[error("E103: Export '{export}' has an unexpected signature: {cause}")]
    ExportSignature {
        /// The export symbol.
        export: String,
        /// Type mismatch details.
        cause: String,
    },

    /// A host import could not be registered.
    #[error("E104: Host function '{function}' could not be registered: {cause}")]
    HostFunction {
        /// The host function name.
        function: String,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Allocation Errors (E200-E299)
    // =========================================================================
    /// The module's allocator returned the null sentinel.
    #[error("E201: Codec module allocation failed: requested {requested} bytes")]
    Allocation {
        /// Number of bytes requested.
        requested: u32,
    },

    /// The input cannot be addressed by 32-bit linear memory.
    #[error("E202: Input of {len} bytes exceeds the 32-bit linear memory range")]
    InputTooLarge {
        /// Length of the rejected input.
        len: usize,
    },

    // =========================================================================
    // Codec Errors (E300-E399)
    // =========================================================================
    /// The export returned its failure sentinel.
    #[error("E301: {operation} failed: native codec returned NULL")]
    CodecFailure {
        /// The operation that was rejected.
        operation: Operation,
    },

    /// A native call trapped (abort, out of fuel, out-of-bounds access).
    #[error("E302: Native call '{export}' trapped: {cause}")]
    Trap {
        /// The export or host-side routine that trapped.
        export: String,
        /// Trap description.
        cause: String,
    },

    /// The blocking task running a native call panicked or was cancelled.
    #[error("E303: {operation} task failed: {cause}")]
    TaskFailed {
        /// The operation that was running.
        operation: Operation,
        /// Join error details.
        cause: String,
    },

    // =========================================================================
    // Decoding Errors (E400-E499)
    // =========================================================================
    /// A string result is not valid UTF-8.
    #[error("E401: Failed to decode codec output: {cause}")]
    Decoding {
        /// Decoder error details.
        cause: String,
    },

    /// A region lies outside the current linear memory.
    #[error(
        "E402: Invalid linear memory access: offset={offset}, len={len}, memory size={memory_size}"
    )]
    MemoryAccess {
        /// Start offset of the region.
        offset: u32,
        /// Length of the region.
        len: u64,
        /// Size of linear memory at the time of the access.
        memory_size: usize,
    },

    /// No NUL terminator before the end of linear memory.
    #[error("E403: Unterminated string at offset {offset} (memory size {memory_size})")]
    UnterminatedString {
        /// Offset where the scan started.
        offset: u32,
        /// Size of linear memory at the time of the scan.
        memory_size: usize,
    },

    // =========================================================================
    // Configuration Errors (E500-E599)
    // =========================================================================
    /// A configuration value is missing or malformed.
    #[error("E501: Invalid configuration for '{key}': {cause}")]
    Config {
        /// The configuration key.
        key: String,
        /// What is wrong with it.
        cause: String,
    },
}

impl Woff2Error {
    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModuleLoad { .. } => "E101",
            Self::MissingExport { .. } => "E102",
            Self::ExportSignature { .. } => "E103",
            Self::HostFunction { .. } => "E104",
            Self::Allocation { .. } => "E201",
            Self::InputTooLarge { .. } => "E202",
            Self::CodecFailure { .. } => "E301",
            Self::Trap { .. } => "E302",
            Self::TaskFailed { .. } => "E303",
            Self::Decoding { .. } => "E401",
            Self::MemoryAccess { .. } => "E402",
            Self::UnterminatedString { .. } => "E403",
            Self::Config { .. } => "E501",
        }
    }

    /// Get the error class.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ModuleLoad { .. }
            | Self::MissingExport { .. }
            | Self::ExportSignature { .. }
            | Self::HostFunction { .. }
            | Self::Config { .. } => ErrorClass::Initialization,
            Self::Allocation { .. } | Self::InputTooLarge { .. } => ErrorClass::Allocation,
            Self::CodecFailure { .. } | Self::Trap { .. } | Self::TaskFailed { .. } => {
                ErrorClass::CodecFailure
            }
            Self::Decoding { .. } | Self::MemoryAccess { .. } | Self::UnterminatedString { .. } => {
                ErrorClass::Decoding
            }
        }
    }

    /// Check if this error came from loading or verifying the module.
    #[must_use]
    pub fn is_initialization_error(&self) -> bool {
        self.class() == ErrorClass::Initialization
    }

    /// Check if the native codec rejected the input.
    #[must_use]
    pub fn is_codec_failure(&self) -> bool {
        self.class() == ErrorClass::CodecFailure
    }

    /// Build an out-of-bounds error for a region.
    pub(crate) fn out_of_bounds(offset: u32, len: u64, memory_size: usize) -> Self {
        Self::MemoryAccess {
            offset,
            len,
            memory_size,
        }
    }
}

/// Result type alias using `Woff2Error`.
pub type Result<T> = std::result::Result<T, Woff2Error>;
