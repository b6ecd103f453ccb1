//! Process-wide allocation ledger for leak detection.
//!
//! Every create/destroy performed through a [`DeviceAllocator`] updates the
//! per-space ledger atomically, so external tooling can query memory health
//! while host and worker threads are still running. The counters are atomics,
//! not a traversal-based count, because the query must be safe to run
//! concurrently with mutation and must not take any lock.
//!
//! The production surface is additive-only: counters are initialized at first
//! use and never reset.
//!
//! [`DeviceAllocator`]: crate::memory::DeviceAllocator

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use super::space::MemorySpace;

/// Atomic counters for one memory space.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    allocations: AtomicU64,
    deallocations: AtomicU64,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
}

/// Point-in-time copy of one space's ledger.
///
/// Consistent only at the instant it was taken; callers must not assume it is
/// stable under concurrent mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    /// Number of arrays ever created in this space.
    pub allocations: u64,
    /// Number of arrays destroyed in this space.
    pub deallocations: u64,
    /// Bytes currently live in this space.
    pub live_bytes: usize,
    /// High-water mark of live bytes.
    pub peak_bytes: usize,
}

impl LedgerSnapshot {
    /// Number of handles live at the snapshot instant.
    ///
    /// Invariant: equals the number of arrays created but not yet destroyed.
    #[inline]
    pub fn live_handles(&self) -> u64 {
        self.allocations - self.deallocations
    }
}

impl AllocationLedger {
    /// Record a successful allocation of `bytes`.
    pub(crate) fn record_create(&self, bytes: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        let live = self.live_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        // Peak update loses no bytes: retry until our observation is folded in.
        let mut peak = self.peak_bytes.load(Ordering::Relaxed);
        while live > peak {
            match self.peak_bytes.compare_exchange_weak(
                peak,
                live,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    /// Record a successful deallocation of `bytes`.
    pub(crate) fn record_destroy(&self, bytes: usize) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot. Lock-free; safe to call concurrently
    /// with mutation.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
        }
    }
}

/// One ledger per real memory space, process-wide.
static LEDGERS: [AllocationLedger; 3] = [
    AllocationLedger {
        allocations: AtomicU64::new(0),
        deallocations: AtomicU64::new(0),
        live_bytes: AtomicUsize::new(0),
        peak_bytes: AtomicUsize::new(0),
    },
    AllocationLedger {
        allocations: AtomicU64::new(0),
        deallocations: AtomicU64::new(0),
        live_bytes: AtomicUsize::new(0),
        peak_bytes: AtomicUsize::new(0),
    },
    AllocationLedger {
        allocations: AtomicU64::new(0),
        deallocations: AtomicU64::new(0),
        live_bytes: AtomicUsize::new(0),
        peak_bytes: AtomicUsize::new(0),
    },
];

/// The process-wide ledger for `space`.
///
/// # Panics
///
/// Panics if `space` is [`MemorySpace::Invalid`]; invalid handles are never
/// counted.
pub fn ledger(space: MemorySpace) -> &'static AllocationLedger {
    let idx = space
        .index()
        .unwrap_or_else(|| panic!("no ledger for the {space} space"));
    &LEDGERS[idx]
}

/// Snapshot of all real spaces, in [`MemorySpace::ALL`] order.
pub fn snapshot_all() -> [(MemorySpace, LedgerSnapshot); 3] {
    MemorySpace::ALL.map(|space| (space, ledger(space).snapshot()))
}
