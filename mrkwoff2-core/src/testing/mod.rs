//! Test doubles for the native codec module.
//!
//! [`FakeModule`] implements [`crate::CodecModule`] over a plain byte vector
//! and records every allocator and export call, which makes leak and
//! release-order checks possible without a real WASM module.
//! [`FakeLoader`] feeds it through the readiness gate.

mod loader;
mod module;

pub use loader::FakeLoader;
pub use module::{FAKE_MAGIC, FakeEvent, FakeModule, FakeStats};
