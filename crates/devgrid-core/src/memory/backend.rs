//! Per-space memory backends.
//!
//! Each real [`MemorySpace`] is served by one backend: a byte-budgeted arena
//! with the capability set {allocate, free} selected at allocator
//! construction. Backends are a tagged value, not a trait object; the space
//! tag is the variant.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{GridError, GridResult};

use super::space::MemorySpace;

/// A byte-budgeted arena for one memory space.
///
/// Budget accounting is a CAS loop so concurrent allocations can never
/// jointly overshoot the budget.
#[derive(Debug)]
pub(crate) struct SpaceBackend {
    space: MemorySpace,
    budget_bytes: usize,
    used_bytes: AtomicUsize,
}

impl SpaceBackend {
    pub(crate) fn new(space: MemorySpace, budget_bytes: usize) -> Self {
        debug_assert!(space.index().is_some(), "backend for a real space only");
        Self {
            space,
            budget_bytes,
            used_bytes: AtomicUsize::new(0),
        }
    }

    /// Bytes still available under the budget at this instant.
    pub(crate) fn available(&self) -> usize {
        self.budget_bytes
            .saturating_sub(self.used_bytes.load(Ordering::Relaxed))
    }

    /// Reserve `bytes` against the budget and allocate zeroed storage.
    pub(crate) fn allocate(&self, layout: Layout) -> GridResult<NonNull<u8>> {
        let bytes = layout.size();
        let mut used = self.used_bytes.load(Ordering::Relaxed);
        loop {
            let available = self.budget_bytes.saturating_sub(used);
            if bytes > available {
                return Err(GridError::OutOfMemory {
                    space: self.space,
                    requested: bytes,
                    available,
                });
            }
            match self.used_bytes.compare_exchange_weak(
                used,
                used + bytes,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => used = observed,
            }
        }

        // SAFETY: layout has non-zero size, checked by the caller.
        let ptr = unsafe { alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(ptr),
            None => {
                // System allocator refused; release the reservation.
                self.used_bytes.fetch_sub(bytes, Ordering::Relaxed);
                Err(GridError::OutOfMemory {
                    space: self.space,
                    requested: bytes,
                    available: self.available(),
                })
            }
        }
    }

    /// Return storage to the arena and release its budget reservation.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this
    /// backend with the same `layout`, and must not be used afterwards.
    pub(crate) unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        dealloc(ptr.as_ptr(), layout);
        self.used_bytes.fetch_sub(layout.size(), Ordering::Relaxed);
    }
}
