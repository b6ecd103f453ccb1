//! The memory-space-aware allocator.
//!
//! # Design
//!
//! A [`DeviceAllocator`] owns one byte-budgeted backend per real
//! [`MemorySpace`] plus a registry of live handle ids. Every create/destroy
//! updates the process-wide [allocation ledger](crate::memory::ledger) for the
//! handle's space, so leak-detection tooling can diff allocations against
//! deallocations at any time without stopping the workers.
//!
//! # Usage
//!
//! ```rust
//! use devgrid_core::memory::{AllocatorConfig, DeviceAllocator, MemorySpace};
//!
//! let alloc = DeviceAllocator::new(AllocatorConfig::default());
//! let array = alloc.create_array::<u32>(MemorySpace::Device, 1024)?;
//! assert_eq!(array.len(), 1024);
//! alloc.destroy_array(array)?;
//! # Ok::<(), devgrid_core::GridError>(())
//! ```

use std::alloc::Layout;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult, HandleFault};

use super::array::{DeviceArray, DevicePod};
use super::backend::SpaceBackend;
use super::ledger;
use super::space::MemorySpace;

/// Byte budgets per space.
///
/// Defaults are unbounded; tests and embedded deployments tighten them to get
/// deterministic `OutOfMemory` behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Budget for the host space, in bytes.
    pub host_budget: usize,
    /// Budget for the device space, in bytes.
    pub device_budget: usize,
    /// Budget for the managed space, in bytes.
    pub managed_budget: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            host_budget: usize::MAX,
            device_budget: usize::MAX,
            managed_budget: usize::MAX,
        }
    }
}

impl AllocatorConfig {
    /// Uniform budget across all three spaces.
    pub fn with_uniform_budget(bytes: usize) -> Self {
        Self {
            host_budget: bytes,
            device_budget: bytes,
            managed_budget: bytes,
        }
    }

    /// Validate configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidConfig`] if any budget is zero.
    pub fn validate(&self) -> GridResult<()> {
        if self.host_budget == 0 || self.device_budget == 0 || self.managed_budget == 0 {
            return Err(GridError::InvalidConfig(
                "space budgets must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    fn budget_for(&self, space: MemorySpace) -> usize {
        match space {
            MemorySpace::Host => self.host_budget,
            MemorySpace::Device => self.device_budget,
            MemorySpace::Managed => self.managed_budget,
            MemorySpace::Invalid => 0,
        }
    }
}

/// A registered live allocation.
#[derive(Debug, Clone, Copy)]
struct HandleRecord {
    space: MemorySpace,
    bytes: usize,
}

/// Allocates and frees typed arrays in host, device, or managed memory.
#[derive(Debug)]
pub struct DeviceAllocator {
    backends: [SpaceBackend; 3],
    /// Live handle ids. Destroyed ids move to `retired` so double-free and
    /// never-created handles get distinct errors.
    live: Mutex<HashMap<u64, HandleRecord>>,
    retired: Mutex<HashSet<u64>>,
}

impl DeviceAllocator {
    /// Create an allocator with the given per-space budgets.
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            backends: MemorySpace::ALL
                .map(|space| SpaceBackend::new(space, config.budget_for(space))),
            live: Mutex::new(HashMap::new()),
            retired: Mutex::new(HashSet::new()),
        }
    }

    /// Allocate a zero-initialized array of `count` elements in `space`.
    ///
    /// # Errors
    ///
    /// - [`GridError::OutOfMemory`] if the space's budget cannot satisfy the
    ///   request
    /// - [`GridError::InvalidConfig`] if `space` is [`MemorySpace::Invalid`]
    ///   or the layout overflows
    pub fn create_array<T: DevicePod>(
        &self,
        space: MemorySpace,
        count: usize,
    ) -> GridResult<DeviceArray<T>> {
        let backend = self.backend(space)?;
        let layout = Layout::array::<T>(count)
            .map_err(|_| GridError::InvalidConfig(format!("array layout overflow: {count} elements")))?;

        let ptr = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            backend.allocate(layout)?.cast::<T>()
        };

        let array = DeviceArray::from_raw(ptr, count, layout.size(), space);
        self.live.lock().insert(
            array.id(),
            HandleRecord {
                space,
                bytes: layout.size(),
            },
        );
        ledger::ledger(space).record_create(layout.size());

        tracing::debug!(
            id = array.id(),
            space = %space,
            count,
            bytes = layout.size(),
            "created array"
        );
        Ok(array)
    }

    /// Destroy an array previously created by this allocator.
    ///
    /// # Errors
    ///
    /// [`GridError::InvalidHandle`] if the handle was already destroyed or was
    /// never created by this allocator. The handle is reclaimed (its storage
    /// freed, without ledger credit) even on error, so misuse cannot leak.
    pub fn destroy_array<T>(&self, array: DeviceArray<T>) -> GridResult<()> {
        let record = {
            let mut live = self.live.lock();
            match live.remove(&array.id()) {
                Some(record) => record,
                None => {
                    let fault = if self.retired.lock().contains(&array.id()) {
                        HandleFault::AlreadyDestroyed
                    } else {
                        HandleFault::UnknownHandle
                    };
                    let err = GridError::InvalidHandle {
                        id: array.id(),
                        space: array.space(),
                        reason: fault,
                    };
                    drop(array); // frees storage, leaves the ledger imbalanced
                    return Err(err);
                }
            }
        };

        let backend = self.backend(record.space)?;
        let (ptr, bytes, space, id) = array.into_raw();
        debug_assert_eq!(space, record.space);
        if bytes > 0 {
            // SAFETY: the registry proved this storage came from `backend`
            // with this layout, and removal from `live` makes us the sole
            // destroyer.
            unsafe {
                backend.free(
                    ptr.cast(),
                    Layout::from_size_align(bytes, std::mem::align_of::<T>())
                        .expect("layout validated at creation"),
                )
            };
        }
        self.retired.lock().insert(id);
        ledger::ledger(space).record_destroy(bytes);

        tracing::debug!(id, space = %space, bytes, "destroyed array");
        Ok(())
    }

    /// Destroy an array, insisting it lives in `space`.
    ///
    /// Mirrors space-specific destroy entry points: handing a device array to
    /// the host destroy path is a reportable [`GridError::InvalidHandle`],
    /// not a silent success.
    pub fn destroy_array_in<T>(&self, space: MemorySpace, array: DeviceArray<T>) -> GridResult<()> {
        if array.space() != space {
            let err = GridError::InvalidHandle {
                id: array.id(),
                space: array.space(),
                reason: HandleFault::SpaceMismatch,
            };
            // Still a live, valid handle; reclaim it properly.
            self.destroy_array(array)?;
            return Err(err);
        }
        self.destroy_array(array)
    }

    /// Copy `count` elements from `src` to `dst`, validating bounds against
    /// both handles' recorded element counts.
    ///
    /// Source and destination may live in different spaces; this is the
    /// host-to-device / device-to-host transfer primitive.
    ///
    /// # Errors
    ///
    /// [`GridError::RangeCheckFailure`] naming the handle that is too small.
    pub fn copy<T: DevicePod>(
        &self,
        src: &DeviceArray<T>,
        dst: &mut DeviceArray<T>,
        count: usize,
    ) -> GridResult<()> {
        if count > src.len() {
            return Err(GridError::RangeCheckFailure {
                count,
                side: "source",
                len: src.len(),
            });
        }
        if count > dst.len() {
            return Err(GridError::RangeCheckFailure {
                count,
                side: "destination",
                len: dst.len(),
            });
        }
        // SAFETY: bounds validated against both handles just above.
        unsafe { self.copy_unchecked(src, dst, count) };
        Ok(())
    }

    /// Copy without bounds validation.
    ///
    /// # Safety
    ///
    /// `count` must not exceed either handle's element count, and no other
    /// thread may access the copied ranges during the transfer.
    pub unsafe fn copy_unchecked<T: DevicePod>(
        &self,
        src: &DeviceArray<T>,
        dst: &mut DeviceArray<T>,
        count: usize,
    ) {
        debug_assert!(count <= src.len() && count <= dst.len());
        std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), count);
    }

    /// Number of handles currently live in this allocator.
    pub fn live_handles(&self) -> usize {
        self.live.lock().len()
    }

    /// Bytes still available under `space`'s budget.
    pub fn available(&self, space: MemorySpace) -> GridResult<usize> {
        Ok(self.backend(space)?.available())
    }

    fn backend(&self, space: MemorySpace) -> GridResult<&SpaceBackend> {
        let idx = space.index().ok_or_else(|| {
            GridError::InvalidConfig("the invalid space cannot back allocations".to_string())
        })?;
        Ok(&self.backends[idx])
    }
}
