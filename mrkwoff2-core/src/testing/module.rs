//! Instrumented in-memory codec module.
//!
//! Behaves like the Emscripten codec at the ABI level (bump allocator,
//! NUL-terminated info text, out-length cell) while recording every
//! allocate, release and invoke so tests can check leak-freedom and
//! release order.

use crate::error::{Operation, Result, Woff2Error};
use crate::memory::{self, ModuleRegion};
use crate::module::{CodecModule, ExportNames, NativeCall};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Signature the fake codec prepends when "compressing".
pub const FAKE_MAGIC: &[u8; 4] = b"wOF2";

/// Size of one linear memory page.
const PAGE_SIZE: usize = 64 * 1024;

/// First offset handed out by the allocator; keeps 0 free as the sentinel.
const HEAP_BASE: u32 = 1024;

/// Allocation alignment.
const ALIGN: u32 = 8;

/// A call observed by the fake module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    /// A non-null allocation.
    Allocate {
        /// Returned offset.
        offset: u32,
        /// Requested size.
        size: u32,
    },
    /// A release call.
    Release {
        /// Released offset.
        offset: u32,
    },
    /// A codec export call.
    Invoke {
        /// Which export.
        operation: Operation,
    },
}

#[derive(Debug, Default)]
struct StatsInner {
    allocate_calls: usize,
    failed_allocations: usize,
    release_calls: usize,
    invalid_releases: usize,
    outstanding: usize,
    memory_size: usize,
    events: Vec<FakeEvent>,
}

/// Shared view of what a [`FakeModule`] has done.
///
/// Cloned out of the module before it is boxed or moved into a handle.
#[derive(Debug, Clone, Default)]
pub struct FakeStats {
    inner: Arc<Mutex<StatsInner>>,
}

impl FakeStats {
    /// Allocations that returned a non-null offset, including the ones the
    /// codec exports make internally for their results.
    pub fn allocate_calls(&self) -> usize {
        self.inner.lock().allocate_calls
    }

    /// Allocations that returned the null sentinel.
    pub fn failed_allocations(&self) -> usize {
        self.inner.lock().failed_allocations
    }

    /// Release calls with a live offset.
    pub fn release_calls(&self) -> usize {
        self.inner.lock().release_calls
    }

    /// Release calls with an offset that was not live (double free or a
    /// pointer the allocator never returned).
    pub fn invalid_releases(&self) -> usize {
        self.inner.lock().invalid_releases
    }

    /// Allocations not yet released.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Current linear memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.inner.lock().memory_size
    }

    /// Every recorded event, oldest first.
    pub fn events(&self) -> Vec<FakeEvent> {
        self.inner.lock().events.clone()
    }

    fn record(&self, event: FakeEvent) {
        let mut inner = self.inner.lock();
        match &event {
            FakeEvent::Allocate { .. } => {
                inner.allocate_calls += 1;
                inner.outstanding += 1;
            }
            FakeEvent::Release { .. } => {
                inner.release_calls += 1;
                inner.outstanding -= 1;
            }
            FakeEvent::Invoke { .. } => {}
        }
        inner.events.push(event);
    }
}

/// In-memory stand-in for the native codec module.
///
/// - compress: prepends [`FAKE_MAGIC`]; rejects empty input.
/// - decompress: strips [`FAKE_MAGIC`]; rejects input without it.
/// - info: rejects empty input, otherwise describes the 12-byte header the
///   way the real module does.
pub struct FakeModule {
    memory: Vec<u8>,
    heap_top: u32,
    live: HashMap<u32, u32>,
    allocation_attempts: usize,
    stats: FakeStats,
    exports: ExportNames,
    missing_export: Option<String>,
    fail_allocation_at: Option<usize>,
    grow_pages_on_call: usize,
    trap_on: Option<Operation>,
    info_bytes: Option<Vec<u8>>,
    bogus_output_length: Option<u32>,
    in_place_output: bool,
    call_delay: Duration,
}

impl Default for FakeModule {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeModule {
    /// Create a fake module with one page of memory.
    pub fn new() -> Self {
        let stats = FakeStats::default();
        stats.inner.lock().memory_size = PAGE_SIZE;
        Self {
            memory: vec![0; PAGE_SIZE],
            heap_top: HEAP_BASE,
            live: HashMap::new(),
            allocation_attempts: 0,
            stats,
            exports: ExportNames::default(),
            missing_export: None,
            fail_allocation_at: None,
            grow_pages_on_call: 0,
            trap_on: None,
            info_bytes: None,
            bogus_output_length: None,
            in_place_output: false,
            call_delay: Duration::ZERO,
        }
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> FakeStats {
        self.stats.clone()
    }

    /// Make `check_exports` report `symbol` as missing.
    pub fn without_export(mut self, symbol: impl Into<String>) -> Self {
        self.missing_export = Some(symbol.into());
        self
    }

    /// Make the allocation attempt with this 0-based index return NULL.
    pub fn fail_allocation_at(mut self, attempt: usize) -> Self {
        self.fail_allocation_at = Some(attempt);
        self
    }

    /// Grow linear memory by `pages` inside every codec call, before the
    /// result is allocated.
    pub fn grow_memory_on_call(mut self, pages: usize) -> Self {
        self.grow_pages_on_call = pages;
        self
    }

    /// Trap inside the export for `operation`.
    pub fn trap_on(mut self, operation: Operation) -> Self {
        self.trap_on = Some(operation);
        self
    }

    /// Return these bytes (NUL-terminated) from `info` for any non-empty input.
    pub fn with_info_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.info_bytes = Some(bytes);
        self
    }

    /// Write this value into the output length cell instead of the real length.
    pub fn with_bogus_output_length(mut self, len: u32) -> Self {
        self.bogus_output_length = Some(len);
        self
    }

    /// Transform in place: compress and decompress return the input offset
    /// and report the input length, as a codec working on its input buffer
    /// would.
    pub fn with_in_place_output(mut self) -> Self {
        self.in_place_output = true;
        self
    }

    /// Block the calling thread for `delay` inside every codec call.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    fn grow(&mut self, pages: usize) {
        let new_size = self.memory.len() + pages * PAGE_SIZE;
        self.memory.resize(new_size, 0);
        self.stats.inner.lock().memory_size = new_size;
    }

    fn bump(&mut self, size: u32) -> u32 {
        let attempt = self.allocation_attempts;
        self.allocation_attempts += 1;
        if self.fail_allocation_at == Some(attempt) {
            self.stats.inner.lock().failed_allocations += 1;
            return 0;
        }

        let offset = self.heap_top;
        let padded = size.max(1).div_ceil(ALIGN) * ALIGN;
        let end = offset as usize + padded as usize;
        if end > self.memory.len() {
            let missing = end - self.memory.len();
            self.grow(missing.div_ceil(PAGE_SIZE));
        }
        self.heap_top = end as u32;
        self.live.insert(offset, size);
        self.stats.record(FakeEvent::Allocate { offset, size });
        offset
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        memory::write_at(&mut self.memory, offset, data)
    }

    fn input_bytes(&self, input: ModuleRegion) -> Result<Vec<u8>> {
        Ok(memory::slice(&self.memory, input)?.to_vec())
    }

    fn transcode(&mut self, operation: Operation, input: ModuleRegion, out_len: u32) -> Result<u32> {
        if self.in_place_output && input.len > 0 {
            self.write(out_len, &input.len.to_le_bytes())?;
            return Ok(input.offset);
        }

        let data = self.input_bytes(input)?;
        let output = match operation {
            Operation::Compress if !data.is_empty() => {
                let mut out = FAKE_MAGIC.to_vec();
                out.extend_from_slice(&data);
                Some(out)
            }
            Operation::Decompress if data.starts_with(FAKE_MAGIC) => Some(data[4..].to_vec()),
            _ => None,
        };

        let Some(output) = output else {
            self.write(out_len, &0u32.to_le_bytes())?;
            return Ok(0);
        };

        let out_ptr = self.bump(output.len() as u32);
        if out_ptr == 0 {
            self.write(out_len, &0u32.to_le_bytes())?;
            return Ok(0);
        }
        self.write(out_ptr, &output)?;
        let reported = self.bogus_output_length.unwrap_or(output.len() as u32);
        self.write(out_len, &reported.to_le_bytes())?;
        Ok(out_ptr)
    }

    fn describe(&mut self, input: ModuleRegion) -> Result<u32> {
        let data = self.input_bytes(input)?;
        if data.is_empty() {
            return Ok(0);
        }

        let mut text = match &self.info_bytes {
            Some(bytes) => bytes.clone(),
            None => describe_header(&data).into_bytes(),
        };
        text.push(0);

        let ptr = self.bump(text.len() as u32);
        if ptr != 0 {
            self.write(ptr, &text)?;
        }
        Ok(ptr)
    }
}

fn describe_header(data: &[u8]) -> String {
    if data.len() < 12 {
        return "Not a valid WOFF2 (too short)".to_string();
    }
    let word = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    let signature = word(0);
    if signature != u32::from_be_bytes(*FAKE_MAGIC) {
        return format!("Not WOFF2 signature: 0x{:08X}", signature);
    }
    format!(
        "WOFF2 file\nflavor: 0x{:08X}\ndeclared total length: {} bytes\ninput buffer length: {} bytes\n",
        word(4),
        word(8),
        data.len()
    )
}

impl CodecModule for FakeModule {
    fn check_exports(&self) -> Result<()> {
        match &self.missing_export {
            Some(symbol) => Err(Woff2Error::MissingExport {
                export: symbol.clone(),
            }),
            None => Ok(()),
        }
    }

    fn allocate(&mut self, size: u32) -> Result<u32> {
        Ok(self.bump(size))
    }

    fn release(&mut self, offset: u32) -> Result<()> {
        if offset == 0 {
            return Ok(());
        }
        if self.live.remove(&offset).is_some() {
            self.stats.record(FakeEvent::Release { offset });
        } else {
            let mut inner = self.stats.inner.lock();
            inner.invalid_releases += 1;
            inner.events.push(FakeEvent::Release { offset });
        }
        Ok(())
    }

    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn invoke(&mut self, call: NativeCall) -> Result<u32> {
        let operation = call.operation();
        self.stats.record(FakeEvent::Invoke { operation });

        if self.trap_on == Some(operation) {
            return Err(Woff2Error::Trap {
                export: self.exports.for_operation(operation).to_string(),
                cause: "wasm trap: wasm `unreachable` instruction executed".to_string(),
            });
        }
        if !self.call_delay.is_zero() {
            std::thread::sleep(self.call_delay);
        }
        if self.grow_pages_on_call > 0 {
            self.grow(self.grow_pages_on_call);
        }

        match call {
            NativeCall::Compress { input, out_len } => {
                self.transcode(Operation::Compress, input, out_len)
            }
            NativeCall::Decompress { input, out_len } => {
                self.transcode(Operation::Decompress, input, out_len)
            }
            NativeCall::Info { input } => self.describe(input),
        }
    }
}
