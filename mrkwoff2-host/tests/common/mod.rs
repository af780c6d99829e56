//! WAT fixtures standing in for the Emscripten codec build.

#![allow(dead_code)]

use mrkwoff2_host::{ExportNames, WasmCodecModule, WasmRuntime, WasmRuntimeConfig};
use std::sync::Arc;

/// `"wOF2"` read as a little-endian `i32`.
pub const WOFF2_MAGIC: &[u8; 4] = b"wOF2";

/// Default info text returned by the fixture.
pub const INFO_TEXT: &str = "WOFF2 file\nflavor: 0x00010000\n";

/// A bump-allocating codec with the Emscripten export table.
///
/// `compress` prepends the WOFF2 magic, `decompress` strips it and `info`
/// returns a fixed NUL-terminated string for input carrying the magic.
/// `malloc` grows memory through `env.emscripten_resize_heap` and the
/// exported `live_allocations` global counts unreleased blocks.
const CODEC_WAT: &str = r#"
(module
    (import "env" "emscripten_resize_heap" (func $resize_heap (param i32) (result i32)))
    (import "env" "__syscall_openat" (func $openat (param i32 i32 i32 i32) (result i32)))
    (memory (export "memory") 1)
    (global $heap (mut i32) (i32.const 4096))
    (global $live (export "live_allocations") (mut i32) (i32.const 0))
    (data (i32.const 256) "%INFO_DATA%")

    (func $malloc (export "%PREFIX%malloc") (param $size i32) (result i32)
        (local $ptr i32)
        (local $end i32)
        (local.set $ptr (i32.and (i32.add (global.get $heap) (i32.const 7)) (i32.const -8)))
        (local.set $end (i32.add (local.get $ptr) (local.get $size)))
        (if (i32.lt_u (local.get $end) (local.get $ptr))
            (then (return (i32.const 0))))
        (if (i32.gt_u (local.get $end) (i32.shl (memory.size) (i32.const 16)))
            (then
                (if (i32.eqz (call $resize_heap (local.get $end)))
                    (then (return (i32.const 0))))))
        (global.set $heap (local.get $end))
        (global.set $live (i32.add (global.get $live) (i32.const 1)))
        (local.get $ptr))

    (func $free (export "%PREFIX%free") (param $ptr i32)
        (if (local.get $ptr)
            (then (global.set $live (i32.sub (global.get $live) (i32.const 1))))))

    (func (export "%PREFIX%compress_woff2") (param $in i32) (param $len i32) (param $out_len i32) (result i32)
        (local $out i32)
        (local $i i32)
        (if (i32.eqz (local.get $len))
            (then (return (i32.const 0))))
        (local.set $out (call $malloc (i32.add (local.get $len) (i32.const 4))))
        (if (i32.eqz (local.get $out))
            (then (return (i32.const 0))))
        (i32.store (local.get $out) (i32.const 0x32464F77))
        (block $done
            (loop $copy
                (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
                (i32.store8
                    (i32.add (i32.add (local.get $out) (i32.const 4)) (local.get $i))
                    (i32.load8_u (i32.add (local.get $in) (local.get $i))))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $copy)))
        (i32.store (local.get $out_len) (i32.add (local.get $len) (i32.const 4)))
        (local.get $out))

    (func (export "%PREFIX%decompress_woff2") (param $in i32) (param $len i32) (param $out_len i32) (result i32)
        (local $out i32)
        (local $n i32)
        (if (i32.lt_u (local.get $len) (i32.const 4))
            (then (return (i32.const 0))))
        (if (i32.ne (i32.load (local.get $in)) (i32.const 0x32464F77))
            (then (return (i32.const 0))))
        (local.set $n (i32.sub (local.get $len) (i32.const 4)))
        (local.set $out (call $malloc (local.get $n)))
        (if (i32.eqz (local.get $out))
            (then (return (i32.const 0))))
        (memory.copy (local.get $out) (i32.add (local.get $in) (i32.const 4)) (local.get $n))
        (i32.store (local.get $out_len) (local.get $n))
        (local.get $out))

    (func (export "%INFO_EXPORT%") (param $in i32) (param $len i32) (result i32)
        (local $out i32)
        (if (i32.lt_u (local.get $len) (i32.const 4))
            (then (return (i32.const 0))))
        (if (i32.ne (i32.load (local.get $in)) (i32.const 0x32464F77))
            (then (return (i32.const 0))))
        (local.set $out (call $malloc (i32.const %INFO_LEN%)))
        (if (i32.eqz (local.get $out))
            (then (return (i32.const 0))))
        (memory.copy (local.get $out) (i32.const 256) (i32.const %INFO_LEN%))
        (local.get $out))
)
"#;

/// Exports with the right names but C-style `(i32) -> i32` everywhere.
pub const WRONG_SIGNATURE_WAT: &str = r#"
(module
    (memory (export "memory") 1)
    (func (export "malloc") (param i32) (result i32) (i32.const 0))
    (func (export "free") (param i32))
    (func (export "compress_woff2") (param i32) (result i32) (i32.const 0))
    (func (export "decompress_woff2") (param i32 i32 i32) (result i32) (i32.const 0))
    (func (export "info_woff2") (param i32 i32) (result i32) (i32.const 0))
)
"#;

/// Builder for codec fixtures.
#[derive(Debug, Clone)]
pub struct CodecFixture {
    prefix: String,
    info: Vec<u8>,
    info_export: bool,
}

impl Default for CodecFixture {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            info: INFO_TEXT.as_bytes().to_vec(),
            info_export: true,
        }
    }
}

impl CodecFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every exported function.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Bytes returned by `info_woff2`, before the NUL terminator.
    pub fn with_info_bytes(mut self, info: &[u8]) -> Self {
        self.info = info.to_vec();
        self
    }

    /// Do not export `info_woff2`.
    pub fn without_info_export(mut self) -> Self {
        self.info_export = false;
        self
    }

    pub fn export_names(&self) -> ExportNames {
        ExportNames::with_prefix(&self.prefix)
    }

    pub fn wat(&self) -> String {
        let data: String = self
            .info
            .iter()
            .chain(std::iter::once(&0u8))
            .map(|b| format!("\\{:02x}", b))
            .collect();
        let info_export = if self.info_export {
            format!("{}info_woff2", self.prefix)
        } else {
            format!("{}info_woff2_disabled", self.prefix)
        };

        CODEC_WAT
            .replace("%PREFIX%", &self.prefix)
            .replace("%INFO_EXPORT%", &info_export)
            .replace("%INFO_DATA%", &data)
            .replace("%INFO_LEN%", &(self.info.len() + 1).to_string())
    }

    pub fn wasm(&self) -> Vec<u8> {
        wat::parse_str(self.wat()).expect("fixture WAT parses")
    }

    /// Compile and instantiate directly, bypassing the readiness gate.
    pub fn instantiate(&self, config: WasmRuntimeConfig) -> WasmCodecModule {
        let runtime = WasmRuntime::new(config).expect("runtime");
        let compiled = runtime.compile("fixture", &self.wasm()).expect("compile");
        WasmCodecModule::instantiate(&runtime, &compiled, self.export_names()).expect("instantiate")
    }
}

/// Allocations the module still considers live.
pub fn live_allocations(module: &mut WasmCodecModule) -> i32 {
    module
        .global_i32("live_allocations")
        .expect("fixture exports live_allocations")
}

/// Shared runtime with default limits.
pub fn runtime() -> Arc<WasmRuntime> {
    Arc::new(WasmRuntime::with_defaults().expect("runtime"))
}
