//! Concurrent fixed-capacity hash map.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

use crate::error::GridResult;
use crate::memory::{DeviceAllocator, DevicePod, MemorySpace};

use super::config::TableConfig;
use super::core::{SlotIter, SlotTable};

/// A fixed-capacity open-addressing hash map built on the host and safely
/// shared by any number of concurrently mutating worker threads.
///
/// Values are returned by copy ([`DevicePod`] elements are trivially
/// copyable), so readers never hold references into slots that concurrent
/// writers may reclaim.
///
/// # Example
///
/// ```
/// use devgrid_core::memory::{AllocatorConfig, DeviceAllocator};
/// use devgrid_core::table::{DeviceHashMap, TableConfig};
///
/// let alloc = DeviceAllocator::new(AllocatorConfig::default());
/// let map: DeviceHashMap<u64, u64> =
///     DeviceHashMap::create_device_object(&alloc, TableConfig::with_capacity(128))?;
///
/// assert!(map.insert(1, 100)?);
/// assert_eq!(map.get(&1), Some(100));
///
/// map.destroy_device_object(&alloc)?;
/// # Ok::<(), devgrid_core::GridError>(())
/// ```
pub struct DeviceHashMap<K, V, S = RandomState> {
    table: SlotTable<K, V, S>,
}

impl<K, V, S> DeviceHashMap<K, V, S>
where
    K: DevicePod + Hash + Eq,
    V: DevicePod,
    S: BuildHasher + Default,
{
    /// Create a map per `config` with the default hasher.
    ///
    /// The map's storage comes from `allocator` and must be returned to the
    /// same allocator via [`destroy_device_object`](Self::destroy_device_object).
    pub fn create_device_object(
        allocator: &DeviceAllocator,
        config: TableConfig,
    ) -> GridResult<Self> {
        Self::create_device_object_with_hasher(allocator, config, S::default())
    }
}

impl<K, V, S> DeviceHashMap<K, V, S>
where
    K: DevicePod + Hash + Eq,
    V: DevicePod,
    S: BuildHasher,
{
    /// Create a map per `config` with an explicit hasher.
    pub fn create_device_object_with_hasher(
        allocator: &DeviceAllocator,
        config: TableConfig,
        hasher: S,
    ) -> GridResult<Self> {
        Ok(Self {
            table: SlotTable::create(allocator, config, hasher)?,
        })
    }

    /// Destroy the map, returning all storage to `allocator`.
    ///
    /// Symmetric with [`create_device_object`](Self::create_device_object):
    /// destroying through a different allocator is an
    /// [`InvalidHandle`](crate::GridError::InvalidHandle) error.
    pub fn destroy_device_object(self, allocator: &DeviceAllocator) -> GridResult<()> {
        self.table.destroy(allocator)
    }

    /// Insert a key-value pair. Returns whether a new entry was created;
    /// inserting an existing key keeps the existing value.
    ///
    /// # Errors
    ///
    /// [`Full`](crate::GridError::Full) if the probe bound was exhausted.
    pub fn insert(&self, key: K, value: V) -> GridResult<bool> {
        self.table.insert(key, value)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn erase(&self, key: &K) -> GridResult<bool> {
        self.table.erase(key)
    }

    /// Look up `key`, returning its value by copy.
    pub fn get(&self, key: &K) -> Option<V> {
        self.table.find(key)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.table.find(key).is_some()
    }

    /// Number of entries for `key`: 0 or 1, keys are unique.
    pub fn count(&self, key: &K) -> usize {
        usize::from(self.contains_key(key))
    }

    /// Apply `f` to `key`'s value in place, serialized against other updates
    /// of the same slot group through the table's lock array. Returns whether
    /// the key was present.
    pub fn update(&self, key: &K, f: impl FnOnce(&mut V)) -> GridResult<bool> {
        self.table.update(key, f)
    }

    /// Number of live entries. A point-in-time sample under concurrent
    /// mutation.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot capacity (a power of two), fixed until [`rehash`](Self::rehash).
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// The memory space the map lives in.
    pub fn space(&self) -> MemorySpace {
        self.table.space()
    }

    /// The configuration the map was created with (capacity as rounded).
    pub fn config(&self) -> &TableConfig {
        self.table.config()
    }

    /// Fraction of slots holding live entries.
    pub fn load_factor(&self) -> f64 {
        self.table.load_factor()
    }

    /// Whether live + tombstone pressure has crossed the configured
    /// threshold and a host-side [`rehash`](Self::rehash) is advisable.
    pub fn should_rehash(&self) -> bool {
        self.table.should_rehash()
    }

    /// Weakly consistent iteration over `(key, value)` copies in slot-index
    /// order. See the crate docs for the exact guarantee.
    pub fn iter(&self) -> SlotIter<'_, K, V, S> {
        self.table.iter()
    }
}

impl<K, V, S> DeviceHashMap<K, V, S>
where
    K: DevicePod + Hash + Eq,
    V: DevicePod,
    S: BuildHasher + Clone,
{
    /// Rebuild the map with `new_capacity` slots, compacting tombstones.
    ///
    /// Host-exclusive: requires `&mut self`, so no worker can hold the map
    /// during the rebuild.
    pub fn rehash(&mut self, allocator: &DeviceAllocator, new_capacity: usize) -> GridResult<()> {
        self.table.rehash(allocator, new_capacity)
    }

    /// Rehash into double the current capacity.
    pub fn grow(&mut self, allocator: &DeviceAllocator) -> GridResult<()> {
        let doubled = self.capacity() * 2;
        self.table.rehash(allocator, doubled)
    }
}

impl<K, V, S> DeviceHashMap<K, V, S>
where
    K: DevicePod + Hash + Eq,
    V: DevicePod,
    S: BuildHasher,
{
    /// Remove every entry, resetting tombstones to empty. Host-exclusive.
    pub fn clear(&mut self) {
        self.table.clear()
    }
}

impl<K, V, S> std::fmt::Debug for DeviceHashMap<K, V, S>
where
    K: DevicePod + Hash + Eq,
    V: DevicePod,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHashMap")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("space", &self.space())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::hash::{BuildHasherDefault, Hasher};

    use super::*;
    use crate::memory::AllocatorConfig;
    use crate::table::ProbingScheme;
    use crate::GridError;

    /// Hashes a `u64` key to itself, so tests can place keys in exact slots.
    #[derive(Default, Clone)]
    struct SlotPinningHasher(u64);

    impl Hasher for SlotPinningHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | u64::from(b);
            }
        }

        fn write_u64(&mut self, i: u64) {
            self.0 = i;
        }
    }

    #[test]
    fn test_map_round_trip() {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        let map: DeviceHashMap<u32, f32> =
            DeviceHashMap::create_device_object(&alloc, TableConfig::with_capacity(32)).unwrap();

        assert!(map.is_empty());
        assert!(map.insert(1, 1.5).unwrap());
        assert!(map.insert(2, 2.5).unwrap());
        assert!(!map.insert(1, 9.0).unwrap());

        assert_eq!(map.get(&1), Some(1.5));
        assert!(map.contains_key(&2));
        assert_eq!(map.count(&2), 1);
        assert_eq!(map.count(&99), 0);
        assert_eq!(map.len(), 2);

        assert!(map.erase(&1).unwrap());
        assert!(!map.contains_key(&1));

        map.destroy_device_object(&alloc).unwrap();
    }

    #[test]
    fn test_map_update_compound_value() {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        // A two-field value is exactly what the lock array exists for.
        let map: DeviceHashMap<u32, [u64; 2]> =
            DeviceHashMap::create_device_object(&alloc, TableConfig::with_capacity(16)).unwrap();

        map.insert(1, [0, 0]).unwrap();
        assert!(map
            .update(&1, |[sum, count]| {
                *sum += 10;
                *count += 1;
            })
            .unwrap());
        assert_eq!(map.get(&1), Some([10, 1]));

        map.destroy_device_object(&alloc).unwrap();
    }

    #[test]
    fn test_map_grow_preserves_entries() {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        let mut map: DeviceHashMap<u64, u64> =
            DeviceHashMap::create_device_object(&alloc, TableConfig::with_capacity(16)).unwrap();

        for k in 0..12 {
            map.insert(k, k * k).unwrap();
        }
        map.grow(&alloc).unwrap();
        assert_eq!(map.capacity(), 32);
        for k in 0..12 {
            assert_eq!(map.get(&k), Some(k * k));
        }

        map.destroy_device_object(&alloc).unwrap();
    }

    #[test]
    fn test_failed_rehash_releases_the_new_table() {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());

        // Pin keys 0 and 8 to distinct slots at capacity 16; shrinking to 8
        // aliases them, and a one-slot probe bound makes reinsertion fail.
        let mut config = TableConfig::with_capacity(16);
        config.probing = ProbingScheme::Linear;
        config.max_probes = Some(1);
        let mut map: DeviceHashMap<u64, u64, BuildHasherDefault<SlotPinningHasher>> =
            DeviceHashMap::create_device_object(&alloc, config).unwrap();
        assert_eq!(alloc.live_handles(), 5);

        map.insert(0, 10).unwrap();
        map.insert(8, 80).unwrap();

        let err = map.rehash(&alloc, 8).unwrap_err();
        assert!(matches!(err, GridError::Full { .. }));

        // The aborted rebuild must not strand its arrays in the allocator,
        // and the original table must survive untouched.
        assert_eq!(alloc.live_handles(), 5);
        assert_eq!(map.capacity(), 16);
        assert_eq!(map.get(&0), Some(10));
        assert_eq!(map.get(&8), Some(80));

        map.destroy_device_object(&alloc).unwrap();
        assert_eq!(alloc.live_handles(), 0);
    }

    #[test]
    fn test_excess_capacity_factor_reserves_slots() {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());

        let mut config = TableConfig::with_capacity(1000);
        config.excess_capacity_factor = 2.0;
        let map: DeviceHashMap<u64, u64> =
            DeviceHashMap::create_device_object(&alloc, config).unwrap();

        // 1000 requested * 2.0 reserve = 2000, rounded up to a power of two.
        assert_eq!(map.capacity(), 2048);

        map.destroy_device_object(&alloc).unwrap();
    }
}
