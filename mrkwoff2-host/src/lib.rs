//! Wasmtime host for the WOFF2 codec module.
//!
//! Runs the Emscripten build of the codec in a Wasmtime sandbox and plugs it
//! into [`mrkwoff2_core::Woff2Codec`].
//!
//! # Architecture
//!
//! - **WasmRuntime**: Engine configuration, store limits and the compiled-module cache
//! - **HostState / create_linker**: The Emscripten and WASI imports the codec reaches
//! - **WasmCodecModule**: A live instance implementing `CodecModule`
//! - **WasmModuleLoader**: Reads, compiles and instantiates on first use
//! - **BridgeConfig**: Environment-driven configuration
//! - **global**: One codec per process behind free functions
//!
//! # Module ABI Contract
//!
//! ```text
//! memory: Memory
//! malloc(size: i32) -> i32
//! free(ptr: i32)
//! compress_woff2(in_ptr: i32, in_len: i32, out_len_ptr: i32) -> i32
//! decompress_woff2(in_ptr: i32, in_len: i32, out_len_ptr: i32) -> i32
//! info_woff2(in_ptr: i32, in_len: i32) -> i32    // NUL-terminated string
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mrkwoff2_host::{BridgeConfig, Woff2Codec};
//!
//! let loader = BridgeConfig::new().with_wasm_path("woff2.wasm").into_loader()?;
//! let codec = Woff2Codec::new(loader);
//! let woff2 = codec.compress(&std::fs::read("font.ttf")?).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod global;
pub mod host;
pub mod instance;
pub mod loader;
pub mod observability;
pub mod runtime;

pub use config::BridgeConfig;
pub use global::{compress_woff2, decompress_woff2, global_codec, info_woff2, set_global_config};
pub use host::{HostState, create_linker};
pub use instance::WasmCodecModule;
pub use loader::{ModuleSource, WasmModuleLoader};
pub use runtime::{CompiledModule, WasmRuntime, WasmRuntimeConfig};

pub use mrkwoff2_core::{ExportNames, InfoReport, Woff2Codec, Woff2Error};
