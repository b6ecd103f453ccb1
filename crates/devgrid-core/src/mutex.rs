//! Per-index spin locks for compound updates.
//!
//! A [`MutexArray`] holds one spin lock per index. The locks are busy-wait
//! compare-and-swap loops with no sleeping, the only viable shape when the
//! callers are massively parallel workers with no blocking primitives.
//!
//! These locks exist for operations that must atomically update more than one
//! memory location (for example an in-place multi-field value update in the
//! hash map). Single-word transitions go through lone CAS instead; locking
//! those paths would serialize otherwise-parallel workloads.

use std::hint;
use std::sync::atomic::Ordering;

use crate::atomic::AtomicRef;
use crate::error::{GridError, GridResult};
use crate::memory::{DeviceAllocator, DeviceArray, MemorySpace};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// A fixed-size array of spin locks.
pub struct MutexArray {
    words: DeviceArray<u32>,
    len: usize,
}

impl MutexArray {
    /// Create `len` unlocked spin locks in `space`.
    pub fn create(
        allocator: &DeviceAllocator,
        space: MemorySpace,
        len: usize,
    ) -> GridResult<Self> {
        let words = allocator.create_array::<u32>(space, len)?;
        Ok(Self { words, len })
    }

    /// Destroy the lock array, returning its storage to `allocator`.
    pub fn destroy(self, allocator: &DeviceAllocator) -> GridResult<()> {
        allocator.destroy_array(self.words)
    }

    /// Number of locks, fixed at construction.
    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    /// Acquire lock `index`, spinning until it is free.
    ///
    /// The guard releases on drop.
    pub fn lock(&self, index: usize) -> GridResult<MutexArrayGuard<'_>> {
        let word = self.word(index)?;
        loop {
            match word.compare_exchange_weak_with(
                UNLOCKED,
                LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(MutexArrayGuard { word }),
                Err(_) => hint::spin_loop(),
            }
        }
    }

    /// Try to acquire lock `index` without spinning.
    pub fn try_lock(&self, index: usize) -> GridResult<Option<MutexArrayGuard<'_>>> {
        let word = self.word(index)?;
        match word.compare_exchange_strong_with(
            UNLOCKED,
            LOCKED,
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => Ok(Some(MutexArrayGuard { word })),
            Err(_) => Ok(None),
        }
    }

    #[inline]
    fn word(&self, index: usize) -> GridResult<AtomicRef<'_, u32>> {
        if index >= self.len {
            return Err(GridError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        // SAFETY: index is in bounds and all lock-word access is atomic.
        Ok(unsafe { AtomicRef::from_ptr(self.words.as_ptr().add(index)) })
    }
}

impl std::fmt::Debug for MutexArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexArray").field("len", &self.len).finish()
    }
}

/// RAII guard for one lock in a [`MutexArray`]; releases on drop.
#[derive(Debug)]
pub struct MutexArrayGuard<'a> {
    word: AtomicRef<'a, u32>,
}

impl Drop for MutexArrayGuard<'_> {
    fn drop(&mut self) {
        self.word.store_with(UNLOCKED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AllocatorConfig;

    #[test]
    fn test_lock_unlock_cycle() {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        let locks = MutexArray::create(&alloc, MemorySpace::Managed, 4).unwrap();

        {
            let _guard = locks.lock(2).unwrap();
            assert!(locks.try_lock(2).unwrap().is_none());
            // A different index is independent.
            assert!(locks.try_lock(3).unwrap().is_some());
        }
        // Released on drop.
        assert!(locks.try_lock(2).unwrap().is_some());

        locks.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_out_of_range_lock() {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        let locks = MutexArray::create(&alloc, MemorySpace::Host, 2).unwrap();
        assert_eq!(
            locks.lock(2).unwrap_err(),
            GridError::IndexOutOfRange { index: 2, len: 2 }
        );
        locks.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_lock_serializes_multi_word_update() {
        use std::thread;

        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        let locks = MutexArray::create(&alloc, MemorySpace::Managed, 1).unwrap();

        // Two plain (non-atomic) counters that must move in lockstep. The
        // address round-trips through usize so the closures are Send.
        let mut pair = alloc.create_array::<u64>(MemorySpace::Host, 2).unwrap();
        let addr = pair.as_ptr() as usize;

        thread::scope(|scope| {
            for _ in 0..8 {
                let locks = &locks;
                scope.spawn(move || {
                    let ptr = addr as *mut u64;
                    for _ in 0..1000 {
                        let _guard = locks.lock(0).unwrap();
                        // SAFETY: writes to both words happen only under lock 0.
                        unsafe {
                            *ptr += 1;
                            *ptr.add(1) += 1;
                        }
                    }
                });
            }
        });

        assert_eq!(pair.as_slice(), &[8000, 8000]);

        alloc.destroy_array(pair).unwrap();
        locks.destroy(&alloc).unwrap();
    }
}
