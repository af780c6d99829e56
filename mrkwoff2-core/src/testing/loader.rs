//! Loader that hands out a prepared [`FakeModule`].

use super::module::FakeModule;
use crate::error::Woff2Error;
use crate::gate::{LoadFuture, ModuleLoader};
use crate::module::CodecModule;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// [`ModuleLoader`] for tests.
///
/// Counts how often it is asked to load and can simulate a slow load so
/// concurrent first callers overlap. The prepared module is handed out
/// once; a second load fails loudly.
pub struct FakeLoader {
    module: Mutex<Option<FakeModule>>,
    failure: Option<String>,
    delay: Duration,
    loads: Arc<AtomicUsize>,
}

impl FakeLoader {
    /// Loader that yields `module`.
    pub fn new(module: FakeModule) -> Self {
        Self {
            module: Mutex::new(Some(module)),
            failure: None,
            delay: Duration::ZERO,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Loader whose load always fails with `cause`.
    pub fn failing(cause: impl Into<String>) -> Self {
        Self {
            module: Mutex::new(None),
            failure: Some(cause.into()),
            delay: Duration::ZERO,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep for `delay` before completing the load.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Counter of load calls, shared with the loader.
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }
}

impl ModuleLoader for FakeLoader {
    fn describe(&self) -> String {
        "fake codec module".to_string()
    }

    fn load(&self) -> LoadFuture<'_> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if let Some(cause) = &self.failure {
                return Err(Woff2Error::ModuleLoad {
                    module: self.describe(),
                    cause: cause.clone(),
                });
            }

            let module = self.module.lock().take().ok_or_else(|| Woff2Error::ModuleLoad {
                module: self.describe(),
                cause: "fake module already handed out".to_string(),
            })?;
            Ok(Box::new(module) as Box<dyn CodecModule>)
        })
    }
}
