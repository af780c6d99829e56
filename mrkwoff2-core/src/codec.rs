//! Async facade over the readiness gate and the marshaling protocol.

use crate::error::{Operation, Result, Woff2Error};
use crate::gate::{ModuleHandle, ModuleLoader, ReadinessGate};
use std::sync::Arc;

/// WOFF2 codec backed by a lazily loaded native module.
///
/// Cheap to share behind an `Arc` or a `static`; the module is loaded on
/// the first operation (or an explicit [`Woff2Codec::ready`]) and reused
/// afterwards. Native calls run on the blocking pool, so a long encode
/// never stalls the async executor and a dropped future cannot interrupt a
/// call before its allocations are released.
///
/// # Example
///
/// ```ignore
/// use mrkwoff2_core::Woff2Codec;
///
/// let codec = Woff2Codec::new(loader);
/// let woff2 = codec.compress(&ttf_bytes).await?;
/// let ttf = codec.decompress(&woff2).await?;
/// println!("{}", codec.info(&woff2).await?);
/// ```
#[derive(Debug)]
pub struct Woff2Codec {
    gate: ReadinessGate,
}

impl Woff2Codec {
    /// Create a codec that loads its module through `loader`.
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        Self {
            gate: ReadinessGate::new(loader),
        }
    }

    /// Load the module now instead of on first use.
    pub async fn ready(&self) -> Result<Arc<ModuleHandle>> {
        self.gate.ensure_ready().await
    }

    /// The readiness gate backing this codec.
    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Compress a TTF font to WOFF2.
    pub async fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.run(Operation::Compress, input, ModuleHandle::compress)
            .await
    }

    /// Decompress a WOFF2 font to TTF.
    pub async fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.run(Operation::Decompress, input, ModuleHandle::decompress)
            .await
    }

    /// Describe a WOFF2 font. The text comes from the module unchanged.
    pub async fn info(&self, input: &[u8]) -> Result<String> {
        self.run(Operation::Info, input, ModuleHandle::info).await
    }

    async fn run<T: Send + 'static>(
        &self,
        operation: Operation,
        input: &[u8],
        call: fn(&ModuleHandle, &[u8]) -> Result<T>,
    ) -> Result<T> {
        let handle = self.gate.ensure_ready().await?;
        let input = input.to_vec();

        // Execute in blocking task to avoid blocking async runtime
        tokio::task::spawn_blocking(move || call(&handle, &input))
            .await
            .map_err(|e| Woff2Error::TaskFailed {
                operation,
                cause: format!("Task join error: {}", e),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLoader, FakeModule};
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn round_trip_through_facade() {
        let module = FakeModule::new();
        let stats = module.stats();
        let codec = Woff2Codec::new(FakeLoader::new(module));

        let font = b"\x00\x01\x00\x00\x00\x0Ecmap glyf head".to_vec();
        let woff2 = codec.compress(&font).await.unwrap();
        let ttf = codec.decompress(&woff2).await.unwrap();
        assert_eq!(ttf, font);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.allocate_calls(), stats.release_calls());
        assert_eq!(stats.invalid_releases(), 0);
    }

    #[tokio::test]
    async fn concurrent_compress_before_ready_loads_once() {
        let loader = FakeLoader::new(FakeModule::new()).with_delay(Duration::from_millis(20));
        let loads = loader.load_counter();
        let codec = Woff2Codec::new(loader);

        let (a, b) = tokio::join!(codec.compress(b"first"), codec.compress(b"second"));
        assert_eq!(&a.unwrap()[4..], b"first");
        assert_eq!(&b.unwrap()[4..], b"second");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(codec.gate().load_attempts(), 1);
    }

    #[tokio::test]
    async fn empty_inputs_surface_codec_failure() {
        let module = FakeModule::new();
        let stats = module.stats();
        let codec = Woff2Codec::new(FakeLoader::new(module));

        assert_eq!(
            codec.compress(&[]).await.unwrap_err(),
            Woff2Error::CodecFailure {
                operation: Operation::Compress
            }
        );
        assert_eq!(
            codec.info(&[]).await.unwrap_err(),
            Woff2Error::CodecFailure {
                operation: Operation::Info
            }
        );
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.failed_allocations(), 0);
    }

    #[tokio::test]
    async fn info_on_woff2_header_is_non_empty() {
        let codec = Woff2Codec::new(FakeLoader::new(FakeModule::new()));
        let woff2 = codec.compress(b"\x00\x01\x00\x00\x00\x00\x00\x40").await.unwrap();
        let text = codec.info(&woff2).await.unwrap();
        assert!(!text.is_empty());
        assert!(text.contains("flavor: 0x00010000"));
    }

    #[tokio::test]
    async fn initialization_error_blocks_every_operation() {
        let codec = Woff2Codec::new(FakeLoader::new(
            FakeModule::new().without_export("compress_woff2"),
        ));

        for _ in 0..2 {
            let err = codec.compress(b"font").await.unwrap_err();
            assert!(err.is_initialization_error());
            assert!(err.to_string().contains("compress_woff2"));
        }
        assert!(codec.info(b"font").await.is_err());
        assert_eq!(codec.gate().load_attempts(), 1);
    }

    #[tokio::test]
    async fn slow_native_call_does_not_stall_the_executor() {
        let codec = Woff2Codec::new(FakeLoader::new(
            FakeModule::new().with_call_delay(Duration::from_millis(400)),
        ));
        codec.ready().await.unwrap();

        let timer = async {
            let start = Instant::now();
            tokio::time::sleep(Duration::from_millis(10)).await;
            start.elapsed()
        };
        let (woff2, timer_elapsed) = tokio::join!(codec.compress(b"font"), timer);

        assert_eq!(&woff2.unwrap()[4..], b"font");
        assert!(
            timer_elapsed < Duration::from_millis(250),
            "timer fired after {timer_elapsed:?}"
        );
    }

    #[tokio::test]
    async fn dropped_call_still_releases_its_allocations() {
        let module = FakeModule::new().with_call_delay(Duration::from_millis(50));
        let stats = module.stats();
        let codec = Woff2Codec::new(FakeLoader::new(module));
        codec.ready().await.unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(5), codec.compress(b"font")).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(stats.allocate_calls() > 0);
        assert_eq!(stats.allocate_calls(), stats.release_calls());
        assert_eq!(stats.outstanding(), 0);
    }
}
