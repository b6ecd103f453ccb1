//! Concurrent fixed-capacity hash set.
//!
//! A thin layer over the same engine as [`DeviceHashMap`], storing `()`
//! values (zero bytes of value storage).
//!
//! [`DeviceHashMap`]: super::DeviceHashMap

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

use crate::error::GridResult;
use crate::memory::{DeviceAllocator, DevicePod, MemorySpace};

use super::config::TableConfig;
use super::core::{SlotIter, SlotTable};

/// A fixed-capacity open-addressing hash set shared by concurrently mutating
/// worker threads.
pub struct DeviceHashSet<K, S = RandomState> {
    table: SlotTable<K, (), S>,
}

impl<K, S> DeviceHashSet<K, S>
where
    K: DevicePod + Hash + Eq,
    S: BuildHasher + Default,
{
    /// Create a set per `config` with the default hasher.
    pub fn create_device_object(
        allocator: &DeviceAllocator,
        config: TableConfig,
    ) -> GridResult<Self> {
        Self::create_device_object_with_hasher(allocator, config, S::default())
    }
}

impl<K, S> DeviceHashSet<K, S>
where
    K: DevicePod + Hash + Eq,
    S: BuildHasher,
{
    /// Create a set per `config` with an explicit hasher.
    pub fn create_device_object_with_hasher(
        allocator: &DeviceAllocator,
        config: TableConfig,
        hasher: S,
    ) -> GridResult<Self> {
        Ok(Self {
            table: SlotTable::create(allocator, config, hasher)?,
        })
    }

    /// Destroy the set, returning all storage to `allocator`.
    pub fn destroy_device_object(self, allocator: &DeviceAllocator) -> GridResult<()> {
        self.table.destroy(allocator)
    }

    /// Insert `key`. Returns whether it was newly added; inserting a present
    /// key is a no-op.
    ///
    /// # Errors
    ///
    /// [`Full`](crate::GridError::Full) if the probe bound was exhausted.
    pub fn insert(&self, key: K) -> GridResult<bool> {
        self.table.insert(key, ())
    }

    /// Remove `key`. Returns whether it was present.
    pub fn erase(&self, key: &K) -> GridResult<bool> {
        self.table.erase(key)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.table.find(key).is_some()
    }

    /// Number of members equal to `key`: 0 or 1, members are unique.
    pub fn count(&self, key: &K) -> usize {
        usize::from(self.contains(key))
    }

    /// Number of members. A point-in-time sample under concurrent mutation.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the set holds no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot capacity (a power of two), fixed until [`rehash`](Self::rehash).
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// The memory space the set lives in.
    pub fn space(&self) -> MemorySpace {
        self.table.space()
    }

    /// Fraction of slots holding live members.
    pub fn load_factor(&self) -> f64 {
        self.table.load_factor()
    }

    /// Whether a host-side [`rehash`](Self::rehash) is advisable.
    pub fn should_rehash(&self) -> bool {
        self.table.should_rehash()
    }

    /// Weakly consistent iteration over member copies in slot-index order.
    pub fn iter(&self) -> SetIter<'_, K, S> {
        SetIter {
            inner: self.table.iter(),
        }
    }

    /// Remove every member. Host-exclusive.
    pub fn clear(&mut self) {
        self.table.clear()
    }
}

impl<K, S> DeviceHashSet<K, S>
where
    K: DevicePod + Hash + Eq,
    S: BuildHasher + Clone,
{
    /// Rebuild the set with `new_capacity` slots, compacting tombstones.
    /// Host-exclusive.
    pub fn rehash(&mut self, allocator: &DeviceAllocator, new_capacity: usize) -> GridResult<()> {
        self.table.rehash(allocator, new_capacity)
    }
}

impl<K, S> std::fmt::Debug for DeviceHashSet<K, S>
where
    K: DevicePod + Hash + Eq,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHashSet")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("space", &self.space())
            .finish()
    }
}

/// Iterator over set members.
pub struct SetIter<'a, K, S> {
    inner: SlotIter<'a, K, (), S>,
}

impl<K, S> Iterator for SetIter<'_, K, S>
where
    K: DevicePod + Hash + Eq,
    S: BuildHasher,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        self.inner.next().map(|(k, ())| k)
    }
}
