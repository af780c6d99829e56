//! Module handle and readiness gate.
//!
//! The gate loads the native module at most once, verifies its exports and
//! hands every caller the same [`ModuleHandle`]. The outcome is memoized,
//! failure included: a module that failed to load stays failed for the
//! lifetime of the gate.

use crate::error::{Result, Woff2Error};
use crate::marshal;
use crate::module::CodecModule;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;

/// Future returned by [`ModuleLoader::load`].
pub type LoadFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Box<dyn CodecModule>>> + Send + 'a>>;

/// Source of native codec modules.
pub trait ModuleLoader: Send + Sync {
    /// Human-readable description of where the module comes from.
    fn describe(&self) -> String;

    /// Load and instantiate the module.
    fn load(&self) -> LoadFuture<'_>;
}

/// The single live instance of a native codec module.
///
/// Every operation runs start to finish under the handle's lock, so the
/// module never sees interleaved allocations from two calls.
pub struct ModuleHandle {
    module: Mutex<Box<dyn CodecModule>>,
    source: String,
}

impl ModuleHandle {
    /// Wrap a loaded module.
    pub fn new(module: Box<dyn CodecModule>, source: impl Into<String>) -> Self {
        Self {
            module: Mutex::new(module),
            source: source.into(),
        }
    }

    /// Where the module was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compress a TTF font to WOFF2.
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut module = self.module.lock();
        marshal::compress(&mut **module, input)
    }

    /// Decompress a WOFF2 font to TTF.
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut module = self.module.lock();
        marshal::decompress(&mut **module, input)
    }

    /// Describe a WOFF2 font.
    pub fn info(&self, input: &[u8]) -> Result<String> {
        let mut module = self.module.lock();
        marshal::info(&mut **module, input)
    }

    /// Current size of the module's linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.module.lock().memory().len()
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Memoized one-time initialization of a [`ModuleHandle`].
pub struct ReadinessGate {
    loader: Box<dyn ModuleLoader>,
    cell: OnceCell<Result<Arc<ModuleHandle>>>,
    load_attempts: AtomicUsize,
}

impl ReadinessGate {
    /// Create a gate; nothing is loaded until the first [`Self::ensure_ready`].
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            cell: OnceCell::new(),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Resolve the module handle, loading the module on first use.
    ///
    /// Concurrent first callers wait on the same initialization; later
    /// callers return immediately with the memoized outcome.
    pub async fn ensure_ready(&self) -> Result<Arc<ModuleHandle>> {
        self.cell.get_or_init(|| self.initialize()).await.clone()
    }

    /// The handle, if initialization already succeeded.
    pub fn get(&self) -> Option<Arc<ModuleHandle>> {
        match self.cell.get() {
            Some(Ok(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Whether the module has been loaded and verified.
    pub fn is_ready(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }

    /// Number of times the loader has been run.
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::Acquire)
    }

    async fn initialize(&self) -> Result<Arc<ModuleHandle>> {
        self.load_attempts.fetch_add(1, Ordering::AcqRel);
        let source = self.loader.describe();
        tracing::info!(source = %source, "loading native codec module");

        let module = self.loader.load().await.inspect_err(|e| {
            tracing::error!(source = %source, error = %e, "codec module failed to load");
        })?;

        if let Err(e) = module.check_exports() {
            tracing::error!(source = %source, error = %e, "codec module failed export check");
            return Err(e);
        }

        tracing::info!(
            source = %source,
            memory_size = module.memory().len(),
            "native codec module ready"
        );
        Ok(Arc::new(ModuleHandle::new(module, source)))
    }
}

impl std::fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("source", &self.loader.describe())
            .field("ready", &self.is_ready())
            .field("load_attempts", &self.load_attempts())
            .finish()
    }
}

/// Wrap a loader error that is not already an initialization error.
pub fn load_error(module: impl Into<String>, cause: impl std::fmt::Display) -> Woff2Error {
    Woff2Error::ModuleLoad {
        module: module.into(),
        cause: cause.to_string(),
    }
}
