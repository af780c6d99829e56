//! The marshaling protocol.
//!
//! Each operation copies the caller's bytes into module memory, invokes one
//! codec export with raw offsets, copies the result back out into
//! caller-owned memory and releases every module allocation it created or
//! adopted. Release is tied to an [`AllocationScope`], so it also happens on
//! every error path before the error reaches the caller.

use crate::decode;
use crate::error::{Operation, Result, Woff2Error};
use crate::memory::{ModuleRegion, OUTPUT_LENGTH_CELL_SIZE};
use crate::module::{CodecModule, NativeCall};
use crate::scope::AllocationScope;

/// Compress a TTF font to WOFF2.
pub fn compress<M: CodecModule + ?Sized>(module: &mut M, input: &[u8]) -> Result<Vec<u8>> {
    transcode(module, Operation::Compress, input, |input, out_len| {
        NativeCall::Compress { input, out_len }
    })
}

/// Decompress a WOFF2 font to TTF.
pub fn decompress<M: CodecModule + ?Sized>(module: &mut M, input: &[u8]) -> Result<Vec<u8>> {
    transcode(module, Operation::Decompress, input, |input, out_len| {
        NativeCall::Decompress { input, out_len }
    })
}

/// Describe a WOFF2 font. The text is passed through from the module as-is.
pub fn info<M: CodecModule + ?Sized>(module: &mut M, input: &[u8]) -> Result<String> {
    let mut scope = AllocationScope::new(module);
    let input_region = scope.copy_in(input)?;

    let call = NativeCall::Info {
        input: input_region,
    };
    let text_ptr = scope.invoke(call)?;
    if text_ptr == 0 {
        return Err(Woff2Error::CodecFailure {
            operation: Operation::Info,
        });
    }
    scope.adopt(text_ptr);

    let text = decode::read_c_string(scope.memory(), text_ptr)?;
    scope.close()?;

    tracing::debug!(
        operation = %Operation::Info,
        input_len = input.len(),
        output_len = text.len(),
        "codec call completed"
    );
    Ok(text)
}

fn transcode<M: CodecModule + ?Sized>(
    module: &mut M,
    operation: Operation,
    input: &[u8],
    make_call: fn(ModuleRegion, u32) -> NativeCall,
) -> Result<Vec<u8>> {
    let mut scope = AllocationScope::new(module);
    let input_region = scope.copy_in(input)?;
    let out_len_cell = scope.allocate(OUTPUT_LENGTH_CELL_SIZE)?;

    let out_ptr = scope.invoke(make_call(input_region, out_len_cell.offset))?;
    if out_ptr == 0 {
        return Err(Woff2Error::CodecFailure { operation });
    }
    scope.adopt(out_ptr);

    // The call may have grown linear memory; read through a fresh view.
    let output = {
        let memory = scope.memory();
        let out_len = decode::read_u32_le(memory, out_len_cell.offset)?;
        decode::read_fixed(memory, ModuleRegion::new(out_ptr, out_len))?
    };
    scope.close()?;

    tracing::debug!(
        operation = %operation,
        input_len = input.len(),
        output_len = output.len(),
        "codec call completed"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FAKE_MAGIC, FakeEvent, FakeModule};

    #[test]
    fn compress_then_decompress_restores_input() {
        let mut module = FakeModule::new();
        let stats = module.stats();
        let font = b"\x00\x01\x00\x00fake glyph tables".to_vec();

        let packed = compress(&mut module, &font).unwrap();
        assert_eq!(&packed[..4], FAKE_MAGIC);
        assert_eq!(&packed[4..], font.as_slice());

        let unpacked = decompress(&mut module, &packed).unwrap();
        assert_eq!(unpacked, font);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.allocate_calls(), stats.release_calls());
    }

    #[test]
    fn compress_empty_input_is_codec_failure() {
        let mut module = FakeModule::new();
        let stats = module.stats();

        let err = compress(&mut module, &[]).unwrap_err();
        assert_eq!(
            err,
            Woff2Error::CodecFailure {
                operation: Operation::Compress
            }
        );
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.allocate_calls(), 2);
        assert_eq!(stats.release_calls(), 2);
    }

    #[test]
    fn decompress_rejects_non_woff2() {
        let mut module = FakeModule::new();
        let stats = module.stats();

        let err = decompress(&mut module, b"OTTO not woff2").unwrap_err();
        assert!(err.is_codec_failure());
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn input_released_last() {
        let mut module = FakeModule::new();
        let stats = module.stats();
        compress(&mut module, b"glyf").unwrap();

        let events = stats.events();
        let first_alloc = events
            .iter()
            .find_map(|event| match event {
                FakeEvent::Allocate { offset, .. } => Some(*offset),
                _ => None,
            })
            .unwrap();
        let last_release = events
            .iter()
            .rev()
            .find_map(|event| match event {
                FakeEvent::Release { offset } => Some(*offset),
                _ => None,
            })
            .unwrap();
        assert_eq!(first_alloc, last_release);
    }

    #[test]
    fn output_length_zero_yields_empty_buffer() {
        let mut module = FakeModule::new();
        let stats = module.stats();

        let out = decompress(&mut module, FAKE_MAGIC).unwrap();
        assert!(out.is_empty());
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn allocation_failure_on_input() {
        let mut module = FakeModule::new().fail_allocation_at(0);
        let stats = module.stats();

        let err = compress(&mut module, b"font").unwrap_err();
        assert_eq!(err, Woff2Error::Allocation { requested: 4 });
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.release_calls(), 0);
    }

    #[test]
    fn allocation_failure_on_length_cell_releases_input() {
        let mut module = FakeModule::new().fail_allocation_at(1);
        let stats = module.stats();

        let err = decompress(&mut module, b"wOF2data").unwrap_err();
        assert_eq!(err, Woff2Error::Allocation { requested: 4 });
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.release_calls(), 1);
    }

    #[test]
    fn info_returns_text_and_releases_string() {
        let mut module = FakeModule::new();
        let stats = module.stats();

        let text = info(&mut module, b"wOF2\x00\x01\x00\x00\x00\x00\x00\x40").unwrap();
        assert!(text.starts_with("WOFF2 file"));
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.allocate_calls(), 2);
        assert_eq!(stats.release_calls(), 2);
    }

    #[test]
    fn info_empty_input_is_codec_failure() {
        let mut module = FakeModule::new();
        let stats = module.stats();

        let err = info(&mut module, &[]).unwrap_err();
        assert_eq!(
            err,
            Woff2Error::CodecFailure {
                operation: Operation::Info
            }
        );
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn info_invalid_utf8_releases_everything() {
        let mut module = FakeModule::new().with_info_bytes(vec![b'b', b'a', b'd', 0xC3, 0x28]);
        let stats = module.stats();

        let err = info(&mut module, b"wOF2 header").unwrap_err();
        assert_eq!(err.code(), "E401");
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.allocate_calls(), stats.release_calls());
    }

    #[test]
    fn output_read_after_memory_growth() {
        let mut module = FakeModule::new().grow_memory_on_call(4);
        let stats = module.stats();
        let before = module.memory().len();

        let font = vec![7u8; 1000];
        let packed = compress(&mut module, &font).unwrap();
        assert_eq!(packed.len(), font.len() + 4);
        assert!(stats.memory_size() > before);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn trap_in_export_releases_everything() {
        let mut module = FakeModule::new().trap_on(Operation::Compress);
        let stats = module.stats();

        let err = compress(&mut module, b"font").unwrap_err();
        assert!(matches!(err, Woff2Error::Trap { .. }));
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn out_of_bounds_output_length_releases_everything() {
        let mut module = FakeModule::new().with_bogus_output_length(u32::MAX);
        let stats = module.stats();

        let err = compress(&mut module, b"font").unwrap_err();
        assert_eq!(err.code(), "E402");
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn output_aliasing_input_is_released_once() {
        let mut module = FakeModule::new().with_in_place_output();
        let stats = module.stats();

        let output = compress(&mut module, b"font").unwrap();
        assert_eq!(output, b"font");
        assert_eq!(stats.invalid_releases(), 0);
        assert_eq!(stats.allocate_calls(), stats.release_calls());
        assert_eq!(stats.outstanding(), 0);
    }
}
