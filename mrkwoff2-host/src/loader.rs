//! [`ModuleLoader`] that compiles and instantiates the codec with Wasmtime.

use crate::instance::WasmCodecModule;
use crate::runtime::WasmRuntime;
use mrkwoff2_core::error::Result;
use mrkwoff2_core::gate::{LoadFuture, ModuleLoader, load_error};
use mrkwoff2_core::module::{CodecModule, ExportNames};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the codec module bytes come from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// A `.wasm` file, read when the module is first needed.
    Path(PathBuf),
    /// Bytes already in memory (embedded or downloaded).
    Bytes {
        /// Name used in diagnostics.
        name: String,
        /// The module binary.
        bytes: Arc<[u8]>,
    },
}

impl ModuleSource {
    /// In-memory source.
    pub fn bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes { name, .. } => name.clone(),
        }
    }
}

/// Loads the codec from a [`ModuleSource`] into a [`WasmCodecModule`].
///
/// File reads go through `tokio::fs`; compilation and instantiation run on
/// the blocking pool.
#[derive(Debug, Clone)]
pub struct WasmModuleLoader {
    runtime: Arc<WasmRuntime>,
    source: ModuleSource,
    exports: ExportNames,
}

impl WasmModuleLoader {
    /// Create a loader with the default export names.
    pub fn new(runtime: Arc<WasmRuntime>, source: ModuleSource) -> Self {
        Self {
            runtime,
            source,
            exports: ExportNames::default(),
        }
    }

    /// Use different export names.
    pub fn with_exports(mut self, exports: ExportNames) -> Self {
        self.exports = exports;
        self
    }

    /// The runtime modules are compiled with.
    pub fn runtime(&self) -> &Arc<WasmRuntime> {
        &self.runtime
    }

    /// The module source.
    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    async fn read_bytes(&self) -> Result<Arc<[u8]>> {
        match &self.source {
            ModuleSource::Path(path) => tokio::fs::read(path)
                .await
                .map(Arc::from)
                .map_err(|e| load_error(self.describe(), e)),
            ModuleSource::Bytes { bytes, .. } => Ok(Arc::clone(bytes)),
        }
    }

    /// Compile and instantiate on the current thread.
    pub fn instantiate(&self, bytes: &[u8]) -> Result<WasmCodecModule> {
        let compiled = self.runtime.compile(&self.describe(), bytes)?;
        WasmCodecModule::instantiate(&self.runtime, &compiled, self.exports.clone())
    }
}

impl ModuleLoader for WasmModuleLoader {
    fn describe(&self) -> String {
        self.source.describe()
    }

    fn load(&self) -> LoadFuture<'_> {
        Box::pin(async move {
            let bytes = self.read_bytes().await?;
            tracing::debug!(module = %self.describe(), size = bytes.len(), "codec module read");

            let loader = self.clone();
            let module = tokio::task::spawn_blocking(move || loader.instantiate(&bytes))
                .await
                .map_err(|e| load_error(self.describe(), format!("Task join error: {}", e)))??;

            Ok(Box::new(module) as Box<dyn CodecModule>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrkwoff2_core::Woff2Error;

    #[test]
    fn describe_uses_path_or_name() {
        let runtime = Arc::new(WasmRuntime::with_defaults().unwrap());
        let from_path = WasmModuleLoader::new(
            Arc::clone(&runtime),
            ModuleSource::Path(PathBuf::from("/opt/fonts/woff2.wasm")),
        );
        assert_eq!(from_path.describe(), "/opt/fonts/woff2.wasm");

        let from_bytes =
            WasmModuleLoader::new(runtime, ModuleSource::bytes("embedded", vec![0u8; 4]));
        assert_eq!(from_bytes.describe(), "embedded");
    }

    #[tokio::test]
    async fn missing_file_is_load_error() {
        let runtime = Arc::new(WasmRuntime::with_defaults().unwrap());
        let loader = WasmModuleLoader::new(
            runtime,
            ModuleSource::Path(PathBuf::from("/nonexistent/woff2.wasm")),
        );
        let err = loader.load().await.map(|_| ()).unwrap_err();
        assert!(matches!(err, Woff2Error::ModuleLoad { ref module, .. } if module == "/nonexistent/woff2.wasm"));
    }

    #[tokio::test]
    async fn invalid_bytes_are_load_error() {
        let runtime = Arc::new(WasmRuntime::with_defaults().unwrap());
        let loader = WasmModuleLoader::new(runtime, ModuleSource::bytes("junk", b"\0asm junk".to_vec()));
        let err = loader.load().await.map(|_| ()).unwrap_err();
        assert!(err.is_initialization_error());
        assert_eq!(err.code(), "E101");
    }
}
