//! Host function bindings for the codec module.
//!
//! An Emscripten build of the codec imports a handful of runtime helpers
//! from `env` and `wasi_snapshot_preview1`. This module provides the ones
//! the codec can actually reach; every other import is linked as a trap so
//! the module still instantiates.

use super::runtime::WASM_PAGE_SIZE;
use mrkwoff2_core::error::{Result, Woff2Error};
use wasmtime::{Caller, Engine, Extern, Linker, Memory, Module, StoreLimits};

/// WASI `errno` for success.
const ERRNO_SUCCESS: i32 = 0;

/// WASI `errno` for a bad address.
const ERRNO_FAULT: i32 = 21;

/// Size of a WASI `ciovec` (`buf: u32`, `buf_len: u32`).
const IOVEC_SIZE: usize = 8;

/// State provided to host functions.
pub struct HostState {
    /// Resource limits enforced on the store.
    pub limits: StoreLimits,
    /// Name of the exported linear memory.
    memory_export: String,
    /// Successful heap resizes requested by the module.
    memory_growths: u32,
    /// Bytes the module wrote through `fd_write`.
    bytes_written: u64,
}

impl HostState {
    /// Create new host state.
    pub fn new(limits: StoreLimits, memory_export: impl Into<String>) -> Self {
        Self {
            limits,
            memory_export: memory_export.into(),
            memory_growths: 0,
            bytes_written: 0,
        }
    }

    /// Successful heap resizes requested by the module.
    pub fn memory_growths(&self) -> u32 {
        self.memory_growths
    }

    /// Bytes the module wrote through `fd_write`.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

fn exported_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    let name = caller.data().memory_export.clone();
    match caller.get_export(&name) {
        Some(Extern::Memory(memory)) => Some(memory),
        _ => None,
    }
}

fn host_function_error(function: &str, err: impl std::fmt::Display) -> Woff2Error {
    Woff2Error::HostFunction {
        function: function.to_string(),
        cause: err.to_string(),
    }
}

/// Register all host functions with a Wasmtime Linker.
pub fn register_host_functions(linker: &mut Linker<HostState>) -> Result<()> {
    register_heap_functions(linker)?;
    register_abort_functions(linker)?;
    register_wasi_functions(linker)?;
    Ok(())
}

/// Register heap management functions.
fn register_heap_functions(linker: &mut Linker<HostState>) -> Result<()> {
    // emscripten_notify_memory_growth(memory_index: u32)
    // Called after the module grew its own memory.
    linker
        .func_wrap(
            "env",
            "emscripten_notify_memory_growth",
            |mut caller: Caller<'_, HostState>, _index: u32| {
                caller.data_mut().memory_growths += 1;
                tracing::trace!("codec module grew its memory");
            },
        )
        .map_err(|e| host_function_error("emscripten_notify_memory_growth", e))?;

    // emscripten_resize_heap(requested_size: u32) -> i32
    // Grows memory to at least `requested_size` bytes. Returns 1 on success, 0 on failure.
    linker
        .func_wrap(
            "env",
            "emscripten_resize_heap",
            |mut caller: Caller<'_, HostState>, requested: u32| -> i32 {
                let Some(memory) = exported_memory(&mut caller) else {
                    return 0;
                };

                let current = memory.data_size(&caller) as u64;
                let requested = u64::from(requested);
                if requested <= current {
                    return 1;
                }

                let delta = (requested - current).div_ceil(WASM_PAGE_SIZE);
                match memory.grow(&mut caller, delta) {
                    Ok(_) => {
                        caller.data_mut().memory_growths += 1;
                        tracing::trace!(requested, pages = delta, "codec heap resized");
                        1
                    }
                    Err(e) => {
                        tracing::debug!(requested, error = %e, "codec heap resize refused");
                        0
                    }
                }
            },
        )
        .map_err(|e| host_function_error("emscripten_resize_heap", e))?;

    // emscripten_memcpy_js(dest: u32, src: u32, num: u32)
    // Large memcpy offloaded to the host. Older toolchains call it emscripten_memcpy_big.
    for name in ["emscripten_memcpy_js", "emscripten_memcpy_big"] {
        linker
            .func_wrap(
                "env",
                name,
                |mut caller: Caller<'_, HostState>,
                 dest: u32,
                 src: u32,
                 num: u32|
                 -> wasmtime::Result<()> {
                    let memory = exported_memory(&mut caller)
                        .ok_or_else(|| anyhow::anyhow!("codec module has no exported memory"))?;
                    let data = memory.data_mut(&mut caller);
                    let (dest, src, num) = (dest as usize, src as usize, num as usize);
                    let in_bounds = src
                        .checked_add(num)
                        .zip(dest.checked_add(num))
                        .is_some_and(|(s, d)| s <= data.len() && d <= data.len());
                    if !in_bounds {
                        anyhow::bail!("memcpy out of bounds: dest={dest} src={src} num={num}");
                    }
                    data.copy_within(src..src + num, dest);
                    Ok(())
                },
            )
            .map_err(|e| host_function_error(name, e))?;
    }

    Ok(())
}

/// Register functions that end execution.
fn register_abort_functions(linker: &mut Linker<HostState>) -> Result<()> {
    for name in ["abort", "_abort_js"] {
        linker
            .func_wrap(
                "env",
                name,
                |_caller: Caller<'_, HostState>| -> wasmtime::Result<()> {
                    anyhow::bail!("codec module aborted")
                },
            )
            .map_err(|e| host_function_error(name, e))?;
    }

    Ok(())
}

/// Register the WASI subset used by Emscripten's libc.
fn register_wasi_functions(linker: &mut Linker<HostState>) -> Result<()> {
    // fd_write(fd: u32, iovs: u32, iovs_len: u32, nwritten: u32) -> errno
    // stdout and stderr are routed to tracing.
    linker
        .func_wrap(
            "wasi_snapshot_preview1",
            "fd_write",
            |mut caller: Caller<'_, HostState>,
             fd: u32,
             iovs: u32,
             iovs_len: u32,
             nwritten: u32|
             -> i32 {
                let Some(memory) = exported_memory(&mut caller) else {
                    return ERRNO_FAULT;
                };

                let data = memory.data(&caller);
                let mut text = Vec::new();
                for i in 0..iovs_len as usize {
                    let at = iovs as usize + i * IOVEC_SIZE;
                    let Some(entry) = data.get(at..at + IOVEC_SIZE) else {
                        return ERRNO_FAULT;
                    };
                    let buf = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]) as usize;
                    let len = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]) as usize;
                    let Some(bytes) = buf.checked_add(len).and_then(|end| data.get(buf..end)) else {
                        return ERRNO_FAULT;
                    };
                    text.extend_from_slice(bytes);
                }

                let written = text.len() as u32;
                let message = String::from_utf8_lossy(&text);
                let message = message.trim_end();
                if !message.is_empty() {
                    if fd == 2 {
                        tracing::warn!(fd, "[WASM] {}", message);
                    } else {
                        tracing::debug!(fd, "[WASM] {}", message);
                    }
                }

                let out = nwritten as usize;
                let Some(cell) = memory.data_mut(&mut caller).get_mut(out..out + 4) else {
                    return ERRNO_FAULT;
                };
                cell.copy_from_slice(&written.to_le_bytes());
                caller.data_mut().bytes_written += u64::from(written);

                ERRNO_SUCCESS
            },
        )
        .map_err(|e| host_function_error("fd_write", e))?;

    // proc_exit(code: u32)
    linker
        .func_wrap(
            "wasi_snapshot_preview1",
            "proc_exit",
            |_caller: Caller<'_, HostState>, code: u32| -> wasmtime::Result<()> {
                anyhow::bail!("codec module exited with status {code}")
            },
        )
        .map_err(|e| host_function_error("proc_exit", e))?;

    Ok(())
}

/// Create a linker for `module` with all host functions registered.
///
/// Imports the codec declares but never reaches are linked as traps.
pub fn create_linker(engine: &Engine, module: &Module) -> Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);
    register_host_functions(&mut linker)?;
    linker
        .define_unknown_imports_as_traps(module)
        .map_err(|e| host_function_error("<unknown imports>", e))?;
    Ok(linker)
}
