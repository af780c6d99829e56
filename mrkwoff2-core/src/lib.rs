//! mrkwoff2 Core Library
//!
//! Drives a WOFF2 codec that lives inside a sandboxed native module with
//! its own linear memory and a C-style export table.
//!
//! # Overview
//!
//! The codec itself is opaque. This crate owns the boundary protocol:
//! copying caller bytes into module memory, invoking exports with raw
//! offsets, copying results back out and releasing every module allocation
//! on every exit path.
//!
//! # Key Components
//!
//! - **CodecModule**: The seam a native module implements (allocator, memory, exports)
//! - **AllocationScope**: Guard that owns the allocations of one operation
//! - **Marshal**: The compress/decompress/info protocol
//! - **Decode**: Fixed-length and NUL-terminated readers over a memory view
//! - **ReadinessGate**: One-time, memoized module load and export check
//! - **Woff2Codec**: Async facade over all of the above
//!
//! # Example
//!
//! ```ignore
//! use mrkwoff2_core::Woff2Codec;
//!
//! let codec = Woff2Codec::new(loader);
//! let woff2 = codec.compress(&ttf).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod decode;
pub mod error;
pub mod gate;
pub mod info;
pub mod marshal;
pub mod memory;
pub mod module;
pub mod scope;
pub mod testing;

pub use codec::Woff2Codec;
pub use error::{ErrorClass, Operation, Result, Woff2Error};
pub use gate::{LoadFuture, ModuleHandle, ModuleLoader, ReadinessGate};
pub use info::{InfoField, InfoReport};
pub use memory::{ModuleRegion, OUTPUT_LENGTH_CELL_SIZE};
pub use module::{CodecModule, ExportNames, NativeCall};
pub use scope::AllocationScope;
