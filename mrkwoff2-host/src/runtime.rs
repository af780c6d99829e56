//! WASM runtime management using Wasmtime.
//!
//! Provides engine configuration, module compilation, and caching
//! for the codec module.

use dashmap::DashMap;
use mrkwoff2_core::error::{Result, Woff2Error};
use std::sync::Arc;
use wasmtime::{Config, Engine, Module, StoreLimits, StoreLimitsBuilder};

/// Size of a WASM linear memory page.
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;

/// Default maximum memory pages (64 KB per page).
const DEFAULT_MAX_MEMORY_PAGES: u32 = 32_768; // 2 GB

/// Memory cap for [`WasmRuntimeConfig::production`]; enough for the largest CJK fonts.
const PRODUCTION_MAX_MEMORY_PAGES: u32 = 16_384; // 1 GB

/// Default fuel amount per native call.
const DEFAULT_FUEL: u64 = 10_000_000_000;

/// Configuration for the WASM runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmRuntimeConfig {
    /// Maximum memory pages the module may grow to (64 KB per page).
    pub max_memory_pages: u32,
    /// Whether to enable fuel-based execution limiting.
    pub fuel_enabled: bool,
    /// Fuel granted to each native call when fuel is enabled.
    pub fuel_amount: u64,
    /// Whether to cache compiled modules.
    pub cache_modules: bool,
    /// Enable debug info in compiled modules.
    pub debug_info: bool,
}

impl Default for WasmRuntimeConfig {
    fn default() -> Self {
        Self {
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            fuel_enabled: false,
            fuel_amount: DEFAULT_FUEL,
            cache_modules: true,
            debug_info: false,
        }
    }
}

impl WasmRuntimeConfig {
    /// Create a configuration for serving untrusted fonts.
    ///
    /// Halves the memory cap and meters every call, so a malformed input
    /// traps instead of spinning or exhausting the host.
    pub fn production() -> Self {
        Self {
            max_memory_pages: PRODUCTION_MAX_MEMORY_PAGES,
            fuel_enabled: true,
            ..Self::default()
        }
    }

    /// Create a configuration for testing with stricter limits.
    pub fn testing() -> Self {
        Self {
            max_memory_pages: 256, // 16 MB
            fuel_enabled: true,
            fuel_amount: 100_000_000,
            cache_modules: false,
            debug_info: true,
        }
    }

    /// Set maximum memory pages.
    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    /// Enable or disable fuel-based limiting.
    pub fn with_fuel(mut self, enabled: bool, amount: u64) -> Self {
        self.fuel_enabled = enabled;
        self.fuel_amount = amount;
        self
    }

    /// Enable or disable module caching.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_modules = enabled;
        self
    }

    /// Enable or disable debug info.
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    /// Maximum linear memory size in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        usize::try_from(u64::from(self.max_memory_pages) * WASM_PAGE_SIZE).unwrap_or(usize::MAX)
    }

    /// Create a Wasmtime Config from this configuration.
    fn to_wasmtime_config(&self) -> Config {
        let mut config = Config::new();
        config
            .strategy(wasmtime::Strategy::Cranelift)
            .cranelift_opt_level(wasmtime::OptLevel::Speed)
            .consume_fuel(self.fuel_enabled)
            .debug_info(self.debug_info);
        config
    }
}

/// A compiled WASM module ready for instantiation.
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    module: Module,
    /// Name used in diagnostics.
    name: String,
    /// Hash of the original WASM bytes (for caching).
    hash: u64,
}

impl CompiledModule {
    /// Get the underlying Wasmtime module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Get the diagnostic name of this module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the hash of this module.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("name", &self.name)
            .field("hash", &format_args!("{:016x}", self.hash))
            .finish()
    }
}

/// WASM runtime managing the Wasmtime engine and compiled modules.
pub struct WasmRuntime {
    /// The Wasmtime engine (thread-safe, can be shared).
    engine: Engine,
    /// Configuration for this runtime.
    config: WasmRuntimeConfig,
    /// Cache of compiled modules by their content hash.
    module_cache: DashMap<u64, Arc<CompiledModule>>,
}

impl WasmRuntime {
    /// Create a new WASM runtime with the given configuration.
    pub fn new(config: WasmRuntimeConfig) -> Result<Self> {
        let wasmtime_config = config.to_wasmtime_config();
        let engine = Engine::new(&wasmtime_config).map_err(|e| Woff2Error::ModuleLoad {
            module: "engine".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            engine,
            config,
            module_cache: DashMap::new(),
        })
    }

    /// Create a new runtime with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(WasmRuntimeConfig::default())
    }

    /// Get the Wasmtime engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &WasmRuntimeConfig {
        &self.config
    }

    /// Compile WASM bytes into a module.
    ///
    /// If caching is enabled and the module was previously compiled,
    /// returns the cached version.
    pub fn compile(&self, name: &str, wasm_bytes: &[u8]) -> Result<Arc<CompiledModule>> {
        let hash = hash_bytes(wasm_bytes);

        if self.config.cache_modules {
            if let Some(cached) = self.module_cache.get(&hash) {
                tracing::debug!(module = name, hash, "compiled module cache hit");
                return Ok(Arc::clone(&cached));
            }
        }

        let module = Module::new(&self.engine, wasm_bytes).map_err(|e| Woff2Error::ModuleLoad {
            module: name.to_string(),
            cause: e.to_string(),
        })?;

        let compiled = Arc::new(CompiledModule {
            module,
            name: name.to_string(),
            hash,
        });

        if self.config.cache_modules {
            self.module_cache.insert(hash, Arc::clone(&compiled));
        }

        Ok(compiled)
    }

    /// Clear the module cache.
    pub fn clear_cache(&self) {
        self.module_cache.clear();
    }

    /// Get the number of cached modules.
    pub fn cache_size(&self) -> usize {
        self.module_cache.len()
    }

    /// Fuel granted to each native call, if fuel is enabled.
    pub fn initial_fuel(&self) -> Option<u64> {
        if self.config.fuel_enabled {
            Some(self.config.fuel_amount)
        } else {
            None
        }
    }

    /// Resource limits for a new store.
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory_bytes())
            .instances(1)
            .trap_on_grow_failure(false)
            .build()
    }
}

impl std::fmt::Debug for WasmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmRuntime")
            .field("config", &self.config)
            .field("cached_modules", &self.module_cache.len())
            .finish()
    }
}

/// Compute a hash of bytes (for cache key).
fn hash_bytes(bytes: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
