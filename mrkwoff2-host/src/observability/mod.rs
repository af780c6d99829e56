//! Logging setup for processes embedding the codec.
//!
//! The library crates only emit `tracing` events; installing a subscriber
//! is left to the application. This module is the optional helper for that.
//!
//! # Configuration
//!
//! Logging format is controlled via `MRKWOFF2_LOG_FORMAT`:
//! - `json` - Structured JSON output
//! - `pretty` - Human-readable multi-line output (default for TTY)
//! - `compact` - Compact single-line format
//!
//! The filter comes from `MRKWOFF2_LOG_LEVEL`, then `RUST_LOG`, then `info`.
//!
//! # Example
//!
//! ```ignore
//! use mrkwoff2_host::observability::{TracingConfig, init_tracing};
//!
//! init_tracing(TracingConfig::from_env())?;
//!
//! // Or with explicit settings
//! let config = TracingConfig::builder()
//!     .json_format(true)
//!     .log_filter("info,mrkwoff2_core=debug")
//!     .build();
//! init_tracing(config)?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::init_tracing;
