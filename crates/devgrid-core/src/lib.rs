#![deny(deprecated)]

//! Host-constructed containers for massively parallel mutation.
//!
//! devgrid-core provides fixed-capacity data containers that are built once
//! on a host thread, then hammered concurrently by any number of unordered
//! worker threads with no central coordination:
//!
//! - [`table::DeviceHashMap`] / [`table::DeviceHashSet`] — open-addressing
//!   hash containers with lock-free insert/erase/find
//! - [`bitset::OccupancyBitset`] — packed atomic bit array whose
//!   previous-value `set`/`reset` doubles as a linearization primitive
//! - [`atomic::AtomicRef`] — atomic capability over a scalar location it
//!   does not own
//! - [`mutex::MutexArray`] — per-index spin locks for multi-word updates
//! - [`memory`] — the space-aware allocation layer (host / device / managed)
//!   with a process-wide leak-detection ledger
//!
//! # Consistency model
//!
//! Operations on different keys are unordered and interleave arbitrarily.
//! Operations on the same key serialize at a single atomic transition (the
//! occupancy bit flip); anything wider goes through the
//! [`MutexArray`](mutex::MutexArray). Reads and iteration are *weakly
//! consistent*: a concurrent mutation may or may not be visible, but a
//! reader never observes a torn entry and the containers are never
//! corrupted. Structural operations (create, destroy, rehash, clear) are
//! host-exclusive, which the API encodes as `&mut self`/`self` receivers.
//!
//! # Example
//!
//! ```
//! use devgrid_core::memory::{AllocatorConfig, DeviceAllocator, MemorySpace};
//! use devgrid_core::table::{DeviceHashMap, TableConfig};
//!
//! let alloc = DeviceAllocator::new(AllocatorConfig::default());
//! let map: DeviceHashMap<u64, u64> = DeviceHashMap::create_device_object(
//!     &alloc,
//!     TableConfig::with_capacity(1024),
//! )?;
//!
//! std::thread::scope(|scope| {
//!     for worker in 0..4u64 {
//!         let map = &map;
//!         scope.spawn(move || {
//!             for k in (worker * 100)..(worker * 100 + 100) {
//!                 map.insert(k, k * 2).expect("capacity suffices");
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(map.len(), 400);
//! map.destroy_device_object(&alloc)?;
//! # Ok::<(), devgrid_core::GridError>(())
//! ```

pub mod atomic;
pub mod bitset;
pub mod error;
pub mod memory;
pub mod mutex;
pub mod table;

pub use atomic::{AtomicInteger, AtomicRef, AtomicScalar};
pub use bitset::OccupancyBitset;
pub use error::{GridError, GridResult, HandleFault};
pub use memory::{
    AllocatorConfig, DeviceAllocator, DeviceArray, DevicePod, LedgerSnapshot, MemorySpace,
};
pub use mutex::{MutexArray, MutexArrayGuard};
pub use table::{DeviceHashMap, DeviceHashSet, ProbingScheme, TableConfig};
