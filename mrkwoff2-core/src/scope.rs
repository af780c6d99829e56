//! Scoped ownership of module allocations.
//!
//! An [`AllocationScope`] borrows the module for the duration of one
//! operation and records every offset it hands out or adopts. Everything it
//! owns is released exactly once, most recent first, either by [`close`] on
//! the success path or by `Drop` when an error unwinds the operation.
//!
//! [`close`]: AllocationScope::close

use crate::error::{Result, Woff2Error};
use crate::memory::{self, ModuleRegion};
use crate::module::{CodecModule, NativeCall};

/// Owner of the module allocations made for a single operation.
pub struct AllocationScope<'m, M: CodecModule + ?Sized> {
    module: &'m mut M,
    /// Offsets owned by this scope, in acquisition order.
    owned: Vec<u32>,
}

impl<'m, M: CodecModule + ?Sized> AllocationScope<'m, M> {
    /// Open a scope over a module.
    pub fn new(module: &'m mut M) -> Self {
        Self {
            module,
            owned: Vec::with_capacity(3),
        }
    }

    /// Allocate `len` bytes in linear memory.
    ///
    /// At least one byte is always requested so that a zero-length buffer
    /// still gets a distinct, non-null offset. The returned region reports
    /// the caller's `len`.
    pub fn allocate(&mut self, len: u32) -> Result<ModuleRegion> {
        let requested = len.max(1);
        let offset = self.module.allocate(requested)?;
        if offset == 0 {
            tracing::debug!(requested, "codec module allocation returned NULL");
            return Err(Woff2Error::Allocation { requested: len });
        }

        tracing::trace!(offset, requested, "allocated module region");
        self.owned.push(offset);
        Ok(ModuleRegion::new(offset, len))
    }

    /// Allocate a region and copy `data` into it.
    pub fn copy_in(&mut self, data: &[u8]) -> Result<ModuleRegion> {
        let len = u32::try_from(data.len())
            .map_err(|_| Woff2Error::InputTooLarge { len: data.len() })?;
        let region = self.allocate(len)?;
        memory::write_at(self.module.memory_mut(), region.offset, data)?;
        Ok(region)
    }

    /// Take ownership of an offset the module allocated on its own (for
    /// example an export's output buffer).
    ///
    /// An export may hand back a region this scope already owns (an
    /// in-place transform returning its input); that offset stays owned
    /// once.
    pub fn adopt(&mut self, offset: u32) {
        if offset == 0 {
            return;
        }
        if self.owned.contains(&offset) {
            tracing::trace!(offset, "returned region aliases an owned allocation");
            return;
        }
        tracing::trace!(offset, "adopted module region");
        self.owned.push(offset);
    }

    /// Invoke a codec export through the borrowed module.
    pub fn invoke(&mut self, call: NativeCall) -> Result<u32> {
        self.module.invoke(call)
    }

    /// Current view of linear memory.
    pub fn memory(&self) -> &[u8] {
        self.module.memory()
    }

    /// Number of offsets still owned by this scope.
    pub fn owned(&self) -> usize {
        self.owned.len()
    }

    /// Release everything and report the first release failure, if any.
    pub fn close(mut self) -> Result<()> {
        self.release_all()
    }

    /// Release every owned offset, most recent first. Keeps going after a
    /// failure so one trapping `release` does not leak the rest.
    fn release_all(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(offset) = self.owned.pop() {
            match self.module.release(offset) {
                Ok(()) => tracing::trace!(offset, "released module region"),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<M: CodecModule + ?Sized> Drop for AllocationScope<'_, M> {
    fn drop(&mut self) {
        if self.owned.is_empty() {
            return;
        }
        if let Err(e) = self.release_all() {
            tracing::warn!(error = %e, "failed to release module region while unwinding");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEvent, FakeModule};

    #[test]
    fn releases_in_reverse_order_on_close() {
        let mut module = FakeModule::new();
        let stats = module.stats();

        let mut scope = AllocationScope::new(&mut module);
        let a = scope.allocate(16).unwrap();
        let b = scope.allocate(4).unwrap();
        scope.adopt(4096);
        assert_eq!(scope.owned(), 3);
        scope.close().unwrap();

        let releases: Vec<u32> = stats
            .events()
            .into_iter()
            .filter_map(|event| match event {
                FakeEvent::Release { offset } => Some(offset),
                _ => None,
            })
            .collect();
        assert_eq!(releases, vec![4096, b.offset, a.offset]);
    }

    #[test]
    fn releases_on_drop() {
        let mut module = FakeModule::new();
        let stats = module.stats();
        {
            let mut scope = AllocationScope::new(&mut module);
            scope.copy_in(b"abc").unwrap();
            scope.allocate(4).unwrap();
        }
        assert_eq!(stats.allocate_calls(), 2);
        assert_eq!(stats.release_calls(), 2);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn zero_length_allocation_gets_real_offset() {
        let mut module = FakeModule::new();
        let mut scope = AllocationScope::new(&mut module);
        let region = scope.copy_in(&[]).unwrap();
        assert!(!region.is_null());
        assert_eq!(region.len, 0);
        scope.close().unwrap();
    }

    #[test]
    fn null_allocation_is_an_error_and_not_owned() {
        let mut module = FakeModule::new().fail_allocation_at(1);
        let stats = module.stats();
        {
            let mut scope = AllocationScope::new(&mut module);
            scope.allocate(8).unwrap();
            let err = scope.allocate(4).unwrap_err();
            assert_eq!(err, Woff2Error::Allocation { requested: 4 });
            assert_eq!(scope.owned(), 1);
        }
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.invalid_releases(), 0);
    }

    #[test]
    fn adopting_null_is_ignored() {
        let mut module = FakeModule::new();
        let mut scope = AllocationScope::new(&mut module);
        scope.adopt(0);
        assert_eq!(scope.owned(), 0);
    }

    #[test]
    fn adopting_an_owned_offset_keeps_one_release() {
        let mut module = FakeModule::new();
        let stats = module.stats();

        let mut scope = AllocationScope::new(&mut module);
        let region = scope.allocate(32).unwrap();
        scope.adopt(region.offset);
        assert_eq!(scope.owned(), 1);
        scope.close().unwrap();

        assert_eq!(stats.release_calls(), 1);
        assert_eq!(stats.invalid_releases(), 0);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn copy_in_round_trips_bytes() {
        let mut module = FakeModule::new();
        let mut scope = AllocationScope::new(&mut module);
        let data: Vec<u8> = (0..=255).collect();
        let region = scope.copy_in(&data).unwrap();
        let back = crate::decode::read_fixed(scope.memory(), region).unwrap();
        assert_eq!(back, data);
        scope.close().unwrap();
    }
}
