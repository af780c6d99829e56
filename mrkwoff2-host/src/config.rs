//! Bridge configuration.
//!
//! Environment variables:
//! - `MRKWOFF2_WASM_PATH`: path to the codec `.wasm` file (required to build a loader)
//! - `MRKWOFF2_MAX_MEMORY_PAGES`: linear memory cap in 64 KB pages
//! - `MRKWOFF2_FUEL`: per-call fuel budget; `0` or `off` disables fuel
//! - `MRKWOFF2_EXPORT_PREFIX`: prefix applied to every exported function name

use crate::loader::{ModuleSource, WasmModuleLoader};
use crate::runtime::{WasmRuntime, WasmRuntimeConfig};
use mrkwoff2_core::error::{Result, Woff2Error};
use mrkwoff2_core::module::ExportNames;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Path to the codec module.
pub const ENV_WASM_PATH: &str = "MRKWOFF2_WASM_PATH";
/// Linear memory cap in pages.
pub const ENV_MAX_MEMORY_PAGES: &str = "MRKWOFF2_MAX_MEMORY_PAGES";
/// Per-call fuel budget.
pub const ENV_FUEL: &str = "MRKWOFF2_FUEL";
/// Export name prefix.
pub const ENV_EXPORT_PREFIX: &str = "MRKWOFF2_EXPORT_PREFIX";

/// Everything needed to build a codec loader.
///
/// Starts from [`WasmRuntimeConfig::production`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Codec module location.
    pub source: Option<ModuleSource>,
    /// Engine and store settings.
    pub runtime: WasmRuntimeConfig,
    /// Export names to resolve.
    pub exports: ExportNames,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            source: None,
            runtime: WasmRuntimeConfig::production(),
            exports: ExportNames::default(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with defaults and no module source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_WASM_PATH).filter(|p| !p.trim().is_empty()) {
            config.source = Some(ModuleSource::Path(PathBuf::from(path)));
        }

        if let Some(pages) = lookup(ENV_MAX_MEMORY_PAGES) {
            let pages = parse::<u32>(ENV_MAX_MEMORY_PAGES, &pages)?;
            if pages == 0 || pages > 65_536 {
                return Err(Woff2Error::Config {
                    key: ENV_MAX_MEMORY_PAGES.to_string(),
                    cause: format!("{} is outside 1..=65536", pages),
                });
            }
            config.runtime = config.runtime.with_max_memory_pages(pages);
        }

        if let Some(fuel) = lookup(ENV_FUEL) {
            let fuel = fuel.trim();
            config.runtime = if fuel.eq_ignore_ascii_case("off") {
                config.runtime.with_fuel(false, 0)
            } else {
                let amount = parse::<u64>(ENV_FUEL, fuel)?;
                config.runtime.with_fuel(amount > 0, amount)
            };
        }

        if let Some(prefix) = lookup(ENV_EXPORT_PREFIX) {
            config.exports = ExportNames::with_prefix(prefix.trim());
        }

        Ok(config)
    }

    /// Load the codec from a file.
    pub fn with_wasm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(ModuleSource::Path(path.into()));
        self
    }

    /// Load the codec from a source.
    pub fn with_source(mut self, source: ModuleSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the runtime configuration.
    pub fn with_runtime(mut self, runtime: WasmRuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Set the export names.
    pub fn with_exports(mut self, exports: ExportNames) -> Self {
        self.exports = exports;
        self
    }

    /// Build the runtime and a loader for the configured source.
    pub fn into_loader(self) -> Result<WasmModuleLoader> {
        let source = self.source.ok_or_else(|| Woff2Error::Config {
            key: ENV_WASM_PATH.to_string(),
            cause: "no codec module configured".to_string(),
        })?;
        let runtime = Arc::new(WasmRuntime::new(self.runtime)?);
        Ok(WasmModuleLoader::new(runtime, source).with_exports(self.exports))
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| Woff2Error::Config {
        key: key.to_string(),
        cause: format!("'{}': {}", value, e),
    })
}
