//! Wasmtime-backed [`CodecModule`].
//!
//! Instantiates the compiled codec, resolves the export table by name and
//! drives the exports with raw offsets. Nothing here interprets results;
//! the marshaling protocol in `mrkwoff2-core` does that.

use crate::host::{HostState, create_linker};
use crate::runtime::{CompiledModule, WasmRuntime};
use mrkwoff2_core::error::{Result, Woff2Error};
use mrkwoff2_core::module::{CodecModule, ExportNames, NativeCall};
use wasmtime::{Instance, Memory, Store, TypedFunc, Val, WasmParams, WasmResults};

/// Reactor initializers, tried in order after instantiation.
const INITIALIZERS: [&str; 2] = ["_initialize", "__wasm_call_ctors"];

type TranscodeFn = TypedFunc<(u32, u32, u32), u32>;
type InfoFn = TypedFunc<(u32, u32), u32>;

/// A live instance of the codec module.
///
/// Exports are resolved once at instantiation. A missing export is kept as
/// `None` and reported by [`CodecModule::check_exports`]; an export with the
/// wrong signature fails instantiation.
pub struct WasmCodecModule {
    store: Store<HostState>,
    instance: Instance,
    exports: ExportNames,
    memory: Option<Memory>,
    compress: Option<TranscodeFn>,
    decompress: Option<TranscodeFn>,
    info: Option<InfoFn>,
    malloc: Option<TypedFunc<u32, u32>>,
    free: Option<TypedFunc<u32, ()>>,
    fuel: Option<u64>,
}

impl WasmCodecModule {
    /// Instantiate `compiled` in a fresh store and resolve `exports`.
    pub fn instantiate(
        runtime: &WasmRuntime,
        compiled: &CompiledModule,
        exports: ExportNames,
    ) -> Result<Self> {
        let load_failed = |cause: String| Woff2Error::ModuleLoad {
            module: compiled.name().to_string(),
            cause,
        };

        let mut store = Store::new(
            runtime.engine(),
            HostState::new(runtime.store_limits(), exports.memory.clone()),
        );
        store.limiter(|state| &mut state.limits);

        let fuel = runtime.initial_fuel();
        if let Some(fuel) = fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| load_failed(format!("Failed to set fuel: {}", e)))?;
        }

        let linker = create_linker(runtime.engine(), compiled.module())?;
        let instance = linker
            .instantiate(&mut store, compiled.module())
            .map_err(|e| load_failed(format!("Failed to instantiate module: {:#}", e)))?;

        if let Some(init) = INITIALIZERS
            .iter()
            .find_map(|name| instance.get_typed_func::<(), ()>(&mut store, name).ok())
        {
            init.call(&mut store, ())
                .map_err(|e| load_failed(format!("Module initializer failed: {:#}", e)))?;
        }

        let memory = instance.get_memory(&mut store, &exports.memory);
        let compress = resolve(&instance, &mut store, &exports.compress)?;
        let decompress = resolve(&instance, &mut store, &exports.decompress)?;
        let info = resolve(&instance, &mut store, &exports.info)?;
        let malloc = resolve(&instance, &mut store, &exports.allocate)?;
        let free = resolve(&instance, &mut store, &exports.release)?;

        tracing::debug!(
            module = compiled.name(),
            memory_size = memory.map(|m| m.data_size(&store)).unwrap_or(0),
            "codec module instantiated"
        );

        Ok(Self {
            store,
            instance,
            exports,
            memory,
            compress,
            decompress,
            info,
            malloc,
            free,
            fuel,
        })
    }

    /// Export names this instance was resolved with.
    pub fn exports(&self) -> &ExportNames {
        &self.exports
    }

    /// Host-side state of the store.
    pub fn host_state(&self) -> &HostState {
        self.store.data()
    }

    /// Current value of an exported `i32` global, if there is one.
    pub fn global_i32(&mut self, name: &str) -> Option<i32> {
        match self.instance.get_global(&mut self.store, name)?.get(&mut self.store) {
            Val::I32(value) => Some(value),
            _ => None,
        }
    }

    fn refuel(&mut self) -> Result<()> {
        if let Some(fuel) = self.fuel {
            self.store.set_fuel(fuel).map_err(|e| Woff2Error::Trap {
                export: "<fuel>".to_string(),
                cause: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn call<P, R>(&mut self, func: Option<TypedFunc<P, R>>, export: &str, params: P) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = func.ok_or_else(|| Woff2Error::MissingExport {
            export: export.to_string(),
        })?;
        self.refuel()?;
        func.call(&mut self.store, params).map_err(|e| {
            tracing::debug!(export, error = %e, "codec export trapped");
            Woff2Error::Trap {
                export: export.to_string(),
                cause: format!("{:#}", e),
            }
        })
    }
}

fn resolve<P, R>(
    instance: &Instance,
    store: &mut Store<HostState>,
    name: &str,
) -> Result<Option<TypedFunc<P, R>>>
where
    P: WasmParams,
    R: WasmResults,
{
    let Some(func) = instance.get_func(&mut *store, name) else {
        return Ok(None);
    };
    func.typed::<P, R>(&*store)
        .map(Some)
        .map_err(|e| Woff2Error::ExportSignature {
            export: name.to_string(),
            cause: e.to_string(),
        })
}

impl CodecModule for WasmCodecModule {
    fn check_exports(&self) -> Result<()> {
        let present = [
            self.compress.is_some(),
            self.decompress.is_some(),
            self.info.is_some(),
            self.malloc.is_some(),
            self.free.is_some(),
            self.memory.is_some(),
        ];
        match self
            .exports
            .required()
            .into_iter()
            .zip(present)
            .find(|(_, present)| !present)
        {
            Some((export, _)) => Err(Woff2Error::MissingExport {
                export: export.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn allocate(&mut self, size: u32) -> Result<u32> {
        let export = self.exports.allocate.clone();
        self.call(self.malloc.clone(), &export, size)
    }

    fn release(&mut self, offset: u32) -> Result<()> {
        let export = self.exports.release.clone();
        self.call(self.free.clone(), &export, offset)
    }

    fn memory(&self) -> &[u8] {
        match self.memory {
            Some(memory) => memory.data(&self.store),
            None => &[],
        }
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        match self.memory {
            Some(memory) => memory.data_mut(&mut self.store),
            None => &mut [],
        }
    }

    fn invoke(&mut self, call: NativeCall) -> Result<u32> {
        let export = self.exports.for_operation(call.operation()).to_string();
        let input = call.input();
        match call {
            NativeCall::Compress { out_len, .. } => {
                self.call(self.compress.clone(), &export, (input.offset, input.len, out_len))
            }
            NativeCall::Decompress { out_len, .. } => {
                self.call(self.decompress.clone(), &export, (input.offset, input.len, out_len))
            }
            NativeCall::Info { .. } => self.call(self.info.clone(), &export, (input.offset, input.len)),
        }
    }
}

impl std::fmt::Debug for WasmCodecModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmCodecModule")
            .field("exports", &self.exports)
            .field("memory_size", &self.memory().len())
            .field("fuel", &self.fuel)
            .finish()
    }
}
