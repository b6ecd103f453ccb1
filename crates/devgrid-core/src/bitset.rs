//! Atomic occupancy bitset.
//!
//! A fixed-size, densely packed bit array whose `set`/`reset` are atomic
//! read-modify-writes returning the *previous* bit value. That previous value
//! is how callers detect "I am the thread that flipped this bit", which the
//! hash table uses as its insert/erase linearization point.
//!
//! The bitset is a device object: its word storage is created through the
//! [`DeviceAllocator`] in a chosen space and must be destroyed through the
//! matching [`destroy`](OccupancyBitset::destroy) call.

use std::sync::atomic::Ordering;

use rayon::prelude::*;

use crate::atomic::AtomicRef;
use crate::error::{GridError, GridResult};
use crate::memory::{DeviceAllocator, DeviceArray, MemorySpace};

const WORD_BITS: usize = u64::BITS as usize;

/// Word count cutoff below which `count()` stays on one thread.
const PAR_COUNT_THRESHOLD: usize = 4096;

/// A fixed-size bit array with atomic per-bit operations.
pub struct OccupancyBitset {
    words: DeviceArray<u64>,
    len: usize,
}

impl OccupancyBitset {
    /// Create a bitset of `len` bits, all clear, in `space`.
    pub fn create(
        allocator: &DeviceAllocator,
        space: MemorySpace,
        len: usize,
    ) -> GridResult<Self> {
        let words = allocator.create_array::<u64>(space, len.div_ceil(WORD_BITS))?;
        Ok(Self { words, len })
    }

    /// Destroy the bitset, returning its storage to `allocator`.
    pub fn destroy(self, allocator: &DeviceAllocator) -> GridResult<()> {
        allocator.destroy_array(self.words)
    }

    /// Number of bits, fixed at construction.
    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    /// Atomically set bit `index`, returning its previous value.
    ///
    /// A `false` return means this caller performed the clear-to-set
    /// transition.
    pub fn set(&self, index: usize) -> GridResult<bool> {
        let (word, mask) = self.locate(index)?;
        Ok(word.fetch_or(mask) & mask != 0)
    }

    /// Atomically clear bit `index`, returning its previous value.
    ///
    /// A `true` return means this caller performed the set-to-clear
    /// transition.
    pub fn reset(&self, index: usize) -> GridResult<bool> {
        let (word, mask) = self.locate(index)?;
        Ok(word.fetch_and(!mask) & mask != 0)
    }

    /// Atomically flip bit `index`, returning its previous value.
    pub fn flip(&self, index: usize) -> GridResult<bool> {
        let (word, mask) = self.locate(index)?;
        Ok(word.fetch_xor(mask) & mask != 0)
    }

    /// Read bit `index`.
    pub fn test(&self, index: usize) -> GridResult<bool> {
        let (word, mask) = self.locate(index)?;
        Ok(word.load() & mask != 0)
    }

    /// Number of set bits.
    ///
    /// Word-level popcount reduction, in parallel for large bitsets. The
    /// result is consistent only at a single point in time; under concurrent
    /// mutation it is a sample, not an invariant.
    pub fn count(&self) -> usize {
        let words = self.word_count();
        let popcount = |w: usize| {
            // SAFETY: w < word_count, storage outlives &self.
            let word = unsafe { AtomicRef::<u64>::from_ptr(self.words.as_ptr().add(w)) };
            word.load_with(Ordering::Relaxed).count_ones() as usize
        };
        if words >= PAR_COUNT_THRESHOLD {
            (0..words).into_par_iter().map(popcount).sum()
        } else {
            (0..words).map(popcount).sum()
        }
    }

    /// Whether every bit is set.
    pub fn all(&self) -> bool {
        self.count() == self.len
    }

    /// Whether any bit is set.
    pub fn any(&self) -> bool {
        self.count() > 0
    }

    /// Whether no bit is set.
    pub fn none(&self) -> bool {
        self.count() == 0
    }

    /// Set every bit. Host-exclusive: requires no concurrent access.
    pub fn set_all(&mut self) {
        let words = self.word_count();
        for w in 0..words {
            // Trailing bits past `len` stay clear so count()/all() stay exact.
            let mask = if w + 1 == words && self.len % WORD_BITS != 0 {
                (1u64 << (self.len % WORD_BITS)) - 1
            } else {
                u64::MAX
            };
            self.word(w).store(mask);
        }
    }

    /// Clear every bit. Host-exclusive: requires no concurrent access.
    pub fn reset_all(&mut self) {
        for w in 0..self.word_count() {
            self.word(w).store(0);
        }
    }

    #[inline]
    fn word_count(&self) -> usize {
        self.len.div_ceil(WORD_BITS)
    }

    #[inline]
    fn word(&self, w: usize) -> AtomicRef<'_, u64> {
        debug_assert!(w < self.word_count());
        // SAFETY: w is in bounds and all bitset access is atomic.
        unsafe { AtomicRef::from_ptr(self.words.as_ptr().add(w)) }
    }

    #[inline]
    fn locate(&self, index: usize) -> GridResult<(AtomicRef<'_, u64>, u64)> {
        if index >= self.len {
            return Err(GridError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        Ok((self.word(index / WORD_BITS), 1u64 << (index % WORD_BITS)))
    }
}

impl std::fmt::Debug for OccupancyBitset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OccupancyBitset")
            .field("len", &self.len)
            .field("set", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AllocatorConfig;

    fn bitset(len: usize) -> (DeviceAllocator, OccupancyBitset) {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        let bits = OccupancyBitset::create(&alloc, MemorySpace::Managed, len).unwrap();
        (alloc, bits)
    }

    #[test]
    fn test_set_reports_previous_value() {
        let (alloc, bits) = bitset(130);

        assert_eq!(bits.set(129).unwrap(), false);
        assert_eq!(bits.set(129).unwrap(), true);
        assert_eq!(bits.test(129).unwrap(), true);

        assert_eq!(bits.reset(129).unwrap(), true);
        assert_eq!(bits.reset(129).unwrap(), false);
        assert_eq!(bits.test(129).unwrap(), false);

        bits.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_out_of_range_index() {
        let (alloc, bits) = bitset(64);
        assert_eq!(
            bits.set(64).unwrap_err(),
            GridError::IndexOutOfRange { index: 64, len: 64 }
        );
        assert_eq!(
            bits.test(1000).unwrap_err(),
            GridError::IndexOutOfRange {
                index: 1000,
                len: 64
            }
        );
        bits.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_count_and_whole_set_operations() {
        let (alloc, mut bits) = bitset(100);

        assert!(bits.none());
        for i in (0..100).step_by(3) {
            bits.set(i).unwrap();
        }
        assert_eq!(bits.count(), 34);
        assert!(bits.any());
        assert!(!bits.all());

        bits.set_all();
        assert_eq!(bits.count(), 100);
        assert!(bits.all());

        bits.reset_all();
        assert!(bits.none());

        bits.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_flip() {
        let (alloc, bits) = bitset(8);
        assert_eq!(bits.flip(3).unwrap(), false);
        assert_eq!(bits.flip(3).unwrap(), true);
        assert!(bits.none());
        bits.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_exactly_one_winner_per_bit_under_contention() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::thread;

        let (alloc, bits) = bitset(512);
        let wins = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..512 {
                        if !bits.set(i).unwrap() {
                            wins.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        // Each bit has exactly one clear-to-set winner across all threads.
        assert_eq!(wins.load(Ordering::Relaxed), 512);
        assert_eq!(bits.count(), 512);

        bits.destroy(&alloc).unwrap();
    }
}
