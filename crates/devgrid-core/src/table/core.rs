//! The shared open-addressing engine.
//!
//! `SlotTable` is the probing/insert/erase/lookup core used by both the map
//! and the set. Entries live directly in fixed-capacity slot arrays allocated
//! through the [`DeviceAllocator`]; collisions resolve along the configured
//! probe sequence and erased slots become tombstones so probe chains for
//! other keys keep terminating correctly until a host-side rehash compacts
//! them.
//!
//! # Concurrency protocol
//!
//! Writers take exclusive ownership of a slot's key/value bytes by moving its
//! [meta word](super::slot) to `Claimed` with a single CAS; the losing thread
//! moves on to its next probe offset, so no two threads ever write one slot.
//! The occupancy-bit `set`/`reset` previous value is the linearization point:
//! the thread that flips the bit is the one insert/erase that happened.
//! Readers copy slot bytes and validate them against the meta word's version
//! afterwards, discarding torn copies, which is why element types must be
//! [`DevicePod`].
//!
//! Structural operations (`rehash`, `clear`, `destroy`) take `&mut self` or
//! `self`: the borrow checker enforces the host-exclusive precondition
//! instead of documentation.

use std::hash::{BuildHasher, Hash};
use std::hint;
use std::mem::{self, MaybeUninit};
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::atomic::AtomicRef;
use crate::bitset::OccupancyBitset;
use crate::error::{GridError, GridResult};
use crate::memory::{DeviceAllocator, DeviceArray, DevicePod, MemorySpace};
use crate::mutex::MutexArray;

use super::config::TableConfig;
use super::slot::{advance, state, SlotState};

/// Spins waiting for a `Claimed` slot to resolve before giving up on it.
const CLAIM_SPIN: usize = 64;

/// Bounded re-reads of a churned occupied slot before skipping it.
const READ_RETRIES: usize = 16;

/// Lock stripes are capped; beyond this, slots share stripes.
const MAX_LOCK_STRIPES: usize = 256;

/// What a reader found at a probed slot.
enum Visit<K, V> {
    /// End of the probe chain for every key.
    Empty,
    /// Tombstone, in-flight writer, or unreadable churn; keep probing.
    Skip,
    /// A validated live entry.
    Entry(K, V),
}

/// Fixed-capacity open-addressing slot table.
pub(crate) struct SlotTable<K, V, S> {
    keys: DeviceArray<K>,
    values: DeviceArray<V>,
    meta: DeviceArray<u32>,
    occupancy: OccupancyBitset,
    locks: MutexArray,
    config: TableConfig,
    max_probes: usize,
    hasher: S,
}

impl<K, V, S> SlotTable<K, V, S>
where
    K: DevicePod + Hash + Eq,
    V: DevicePod,
    S: BuildHasher,
{
    /// Allocate a table per `config`. Capacity is scaled by the configured
    /// reserve multiplier, then rounded up to a power of two.
    pub(crate) fn create(
        allocator: &DeviceAllocator,
        config: TableConfig,
        hasher: S,
    ) -> GridResult<Self> {
        config.validate()?;
        let mut config = config;
        let reserved = (config.capacity as f64 * config.excess_capacity_factor).ceil() as usize;
        config.capacity = reserved.next_power_of_two();
        let capacity = config.capacity;
        let space = config.space;

        let keys = allocator.create_array::<K>(space, capacity)?;
        let values = match allocator.create_array::<V>(space, capacity) {
            Ok(a) => a,
            Err(e) => {
                let _ = allocator.destroy_array(keys);
                return Err(e);
            }
        };
        let meta = match allocator.create_array::<u32>(space, capacity) {
            Ok(a) => a,
            Err(e) => {
                let _ = allocator.destroy_array(keys);
                let _ = allocator.destroy_array(values);
                return Err(e);
            }
        };
        let occupancy = match OccupancyBitset::create(allocator, space, capacity) {
            Ok(b) => b,
            Err(e) => {
                let _ = allocator.destroy_array(keys);
                let _ = allocator.destroy_array(values);
                let _ = allocator.destroy_array(meta);
                return Err(e);
            }
        };
        let locks = match MutexArray::create(allocator, space, capacity.min(MAX_LOCK_STRIPES)) {
            Ok(l) => l,
            Err(e) => {
                let _ = allocator.destroy_array(keys);
                let _ = allocator.destroy_array(values);
                let _ = allocator.destroy_array(meta);
                let _ = occupancy.destroy(allocator);
                return Err(e);
            }
        };

        let max_probes = config.max_probes.unwrap_or(capacity).min(capacity);
        Ok(Self {
            keys,
            values,
            meta,
            occupancy,
            locks,
            config,
            max_probes,
            hasher,
        })
    }

    /// Free every backing array through `allocator`.
    pub(crate) fn destroy(self, allocator: &DeviceAllocator) -> GridResult<()> {
        let Self {
            keys,
            values,
            meta,
            occupancy,
            locks,
            ..
        } = self;
        let results = [
            allocator.destroy_array(keys),
            allocator.destroy_array(values),
            allocator.destroy_array(meta),
            occupancy.destroy(allocator),
            locks.destroy(allocator),
        ];
        results.into_iter().collect()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.config.capacity
    }

    #[inline]
    pub(crate) fn space(&self) -> MemorySpace {
        self.config.space
    }

    #[inline]
    pub(crate) fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Number of live entries: the occupancy bitset popcount. Point-in-time
    /// only under concurrent mutation.
    pub(crate) fn len(&self) -> usize {
        self.occupancy.count()
    }

    /// Insert `key`, returning `Ok(true)` if a new entry was created and
    /// `Ok(false)` if the key was already present (the existing value is
    /// kept).
    ///
    /// # Errors
    ///
    /// [`GridError::Full`] once the probe bound is exhausted with no free
    /// slot, or once every claim retry lost its race.
    pub(crate) fn insert(&self, key: K, value: V) -> GridResult<bool> {
        let hash = self.hasher.hash_one(&key);

        'retry: for _ in 0..self.config.max_claim_retries {
            // First reusable tombstone seen this pass, claimed only after the
            // whole chain has been checked for a live duplicate.
            let mut reusable: Option<(usize, u32)> = None;

            for i in self
                .config
                .probing
                .sequence(hash, self.capacity(), self.max_probes)
            {
                let mut m = self.load_meta(i);
                let mut reads = 0;
                loop {
                    m = self.resolve_claimed(i, m);
                    match state(m) {
                        SlotState::Empty => {
                            let (slot, observed) = reusable.unwrap_or((i, m));
                            if self.try_claim(slot, observed, key, value)? {
                                return Ok(true);
                            }
                            continue 'retry;
                        }
                        SlotState::Tombstone => {
                            if reusable.is_none() {
                                reusable = Some((i, m));
                            }
                            break;
                        }
                        // A writer that outlasted the spin budget may be
                        // publishing this very key; probing past it could
                        // claim a second slot for the key. Spend a retry and
                        // rescan once the slot has resolved.
                        SlotState::Claimed => continue 'retry,
                        SlotState::Occupied => match self.read_occupied(i, m) {
                            Ok((k, _)) => {
                                if k == key {
                                    return Ok(false);
                                }
                                break;
                            }
                            Err(m2) => {
                                reads += 1;
                                if reads >= READ_RETRIES {
                                    break;
                                }
                                m = m2;
                            }
                        },
                    }
                }
            }

            // Probe bound exhausted without an Empty terminator.
            if let Some((slot, observed)) = reusable {
                if self.try_claim(slot, observed, key, value)? {
                    return Ok(true);
                }
                continue 'retry;
            }
            return Err(GridError::Full {
                max_probes: self.max_probes,
                capacity: self.capacity(),
            });
        }

        Err(GridError::Full {
            max_probes: self.max_probes,
            capacity: self.capacity(),
        })
    }

    /// Erase `key`, returning whether this call removed it.
    ///
    /// Never blocks finds of other keys; an erase racing an insert of the
    /// same key leaves that key's final state unspecified but the table
    /// uncorrupted.
    pub(crate) fn erase(&self, key: &K) -> GridResult<bool> {
        let hash = self.hasher.hash_one(key);
        for i in self
            .config
            .probing
            .sequence(hash, self.capacity(), self.max_probes)
        {
            let mut m = self.load_meta(i);
            let mut reads = 0;
            loop {
                m = self.resolve_claimed(i, m);
                match state(m) {
                    SlotState::Empty => return Ok(false),
                    SlotState::Tombstone => break,
                    // Unresolved writer; this key either is not here or is
                    // concurrent with us, so not-found is a valid outcome.
                    SlotState::Claimed => break,
                    SlotState::Occupied => match self.read_occupied(i, m) {
                        Ok((k, _)) => {
                            if k != *key {
                                break;
                            }
                            // Claim the slot at the version the key was
                            // validated under, so the entry cannot be erased
                            // and the slot refilled with another key beneath
                            // us.
                            let claimed = advance(m, SlotState::Claimed);
                            match self.meta_ref(i).compare_exchange_strong(m, claimed) {
                                Ok(_) => {
                                    // Linearization point, under the claim:
                                    // the thread whose reset observed a set
                                    // bit performed the erasure.
                                    let was_set = self.occupancy.reset(i)?;
                                    debug_assert!(was_set, "occupied slot had a clear bit");
                                    self.meta_ref(i)
                                        .store(advance(claimed, SlotState::Tombstone));
                                    return Ok(true);
                                }
                                // The slot churned since validation; rejudge it.
                                Err(observed) => m = observed,
                            }
                        }
                        Err(m2) => {
                            reads += 1;
                            if reads >= READ_RETRIES {
                                break;
                            }
                            m = m2;
                        }
                    },
                }
            }
        }
        Ok(false)
    }

    /// Look up `key`. Returns the value by copy, or `None` — a bounded probe
    /// that finds nothing is "not found", never an error.
    pub(crate) fn find(&self, key: &K) -> Option<V> {
        let hash = self.hasher.hash_one(key);
        for i in self
            .config
            .probing
            .sequence(hash, self.capacity(), self.max_probes)
        {
            match self.visit(i) {
                Visit::Empty => return None,
                Visit::Skip => continue,
                Visit::Entry(k, v) => {
                    if k == *key {
                        return Some(v);
                    }
                }
            }
        }
        None
    }

    /// Apply `f` to `key`'s value in place.
    ///
    /// Serialized through the slot's lock stripe so multi-field updates from
    /// different workers never interleave; concurrent readers of the slot
    /// retry their validated copy instead of observing a half-written value.
    /// Returns whether the key was present and updated.
    pub(crate) fn update(&self, key: &K, f: impl FnOnce(&mut V)) -> GridResult<bool> {
        let hash = self.hasher.hash_one(key);
        for i in self
            .config
            .probing
            .sequence(hash, self.capacity(), self.max_probes)
        {
            match self.visit(i) {
                Visit::Empty => return Ok(false),
                Visit::Skip => continue,
                Visit::Entry(k, _) => {
                    if k != *key {
                        continue;
                    }
                    let _guard = self.locks.lock(self.stripe(i))?;

                    // Claim the slot's bytes. If it stopped being occupied
                    // while we took the lock, the entry is gone.
                    let mut m = self.load_meta(i);
                    let claimed = loop {
                        m = self.resolve_claimed(i, m);
                        if state(m) != SlotState::Occupied {
                            return Ok(false);
                        }
                        let claimed = advance(m, SlotState::Claimed);
                        match self.meta_ref(i).compare_exchange_strong(m, claimed) {
                            Ok(_) => break claimed,
                            Err(observed) => m = observed,
                        }
                    };

                    // The slot may have been erased and refilled with another
                    // key before the claim landed.
                    // SAFETY: we hold the Claimed state; no other thread
                    // reads-without-validation or writes these bytes.
                    let current = unsafe { self.read_key(i) };
                    if current != *key {
                        self.meta_ref(i).store(advance(claimed, SlotState::Occupied));
                        return Ok(false);
                    }

                    let mut value = unsafe { self.read_value(i) };
                    f(&mut value);
                    unsafe { self.write_value(i, value) };
                    self.meta_ref(i).store(advance(claimed, SlotState::Occupied));
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Lazy, non-restartable iteration in bit-index order.
    ///
    /// Weakly consistent: a slot is yielded iff its occupancy bit is set at
    /// the moment it is visited, so entries mutated concurrently may or may
    /// not appear. Never yields a torn entry.
    pub(crate) fn iter(&self) -> SlotIter<'_, K, V, S> {
        SlotIter {
            table: self,
            index: 0,
        }
    }

    /// Fraction of slots holding live entries.
    pub(crate) fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Whether the live + tombstone pressure has crossed the configured
    /// rehash threshold. Advisory only; nothing rehashes implicitly.
    pub(crate) fn should_rehash(&self) -> bool {
        let pressure = (self.len() + self.tombstones()) as f64 / self.capacity() as f64;
        pressure > self.config.rehash_load_factor
    }

    /// Number of tombstoned slots. Point-in-time sample.
    pub(crate) fn tombstones(&self) -> usize {
        (0..self.capacity())
            .filter(|&i| state(self.load_meta(i)) == SlotState::Tombstone)
            .count()
    }

    /// Rebuild into `new_capacity` slots, dropping tombstones.
    ///
    /// Host-orchestrated and globally synchronized by construction: `&mut
    /// self` proves no concurrent operation is in flight. New arrays are
    /// allocated through `allocator`, every live entry is reinserted, the
    /// active arrays swap, and the old ones are freed.
    pub(crate) fn rehash(
        &mut self,
        allocator: &DeviceAllocator,
        new_capacity: usize,
    ) -> GridResult<()>
    where
        S: Clone,
    {
        let live = self.len();
        if new_capacity.next_power_of_two() < live {
            return Err(GridError::InvalidConfig(format!(
                "rehash capacity {new_capacity} cannot hold {live} live entries"
            )));
        }

        let mut config = self.config;
        config.capacity = new_capacity;
        let new = Self::create(allocator, config, self.hasher.clone())?;

        for i in 0..self.capacity() {
            if let Visit::Entry(k, v) = self.visit(i) {
                // A tight configured probe bound can still exhaust in the new
                // table; release its arrays before reporting, leaving the
                // original table intact.
                if let Err(e) = new.insert(k, v) {
                    let _ = new.destroy(allocator);
                    return Err(e);
                }
            }
        }

        let old = std::mem::replace(self, new);
        old.destroy(allocator)
    }

    /// Remove every entry. Host-exclusive.
    pub(crate) fn clear(&mut self) {
        for i in 0..self.capacity() {
            let m = self.load_meta(i);
            self.meta_ref(i).store(advance(m, SlotState::Empty));
        }
        self.occupancy.reset_all();
    }

    // Slot access helpers.

    #[inline]
    fn meta_ref(&self, i: usize) -> AtomicRef<'_, u32> {
        debug_assert!(i < self.capacity());
        // SAFETY: i is in bounds; all meta access is atomic.
        unsafe { AtomicRef::from_ptr(self.meta.as_ptr().add(i)) }
    }

    #[inline]
    fn load_meta(&self, i: usize) -> u32 {
        self.meta_ref(i).load()
    }

    #[inline]
    fn stripe(&self, i: usize) -> usize {
        i & (self.locks.size() - 1)
    }

    /// Spin (bounded) while a writer holds the slot, returning the latest
    /// meta word.
    fn resolve_claimed(&self, i: usize, mut m: u32) -> u32 {
        let mut spins = 0;
        while state(m) == SlotState::Claimed && spins < CLAIM_SPIN {
            hint::spin_loop();
            m = self.load_meta(i);
            spins += 1;
        }
        m
    }

    /// Copy a slot the caller observed as `Occupied` with meta `m`,
    /// validating against the meta word afterwards. `Err` carries the newer
    /// meta word when the slot churned under the read.
    fn read_occupied(&self, i: usize, m: u32) -> Result<(K, V), u32> {
        debug_assert_eq!(state(m), SlotState::Occupied);
        // SAFETY: a torn copy is possible here; it is discarded below unless
        // the meta word proves no writer touched the slot in between, and
        // DevicePod types have no invalid bit patterns to make the transient
        // copy itself hazardous.
        let k = unsafe { self.read_key(i) };
        let v = unsafe { self.read_value(i) };
        let m2 = self.load_meta(i);
        if m2 == m {
            Ok((k, v))
        } else {
            Err(m2)
        }
    }

    /// Classify slot `i` for a reader.
    fn visit(&self, i: usize) -> Visit<K, V> {
        let mut m = self.load_meta(i);
        for _ in 0..READ_RETRIES {
            m = self.resolve_claimed(i, m);
            match state(m) {
                SlotState::Empty => return Visit::Empty,
                SlotState::Tombstone => return Visit::Skip,
                // Writer outlasted the spin budget: weakly consistent skip.
                SlotState::Claimed => return Visit::Skip,
                SlotState::Occupied => {
                    // The bitset is the source of truth for liveness; a set
                    // state with a clear bit is an erase mid-flight.
                    if !self.occupancy.test(i).unwrap_or(false) {
                        return Visit::Skip;
                    }
                    match self.read_occupied(i, m) {
                        Ok((k, v)) => return Visit::Entry(k, v),
                        Err(m2) => m = m2,
                    }
                }
            }
        }
        Visit::Skip
    }

    /// CAS `slot` from the observed free meta to `Claimed`, then write the
    /// entry and publish. Returns `Ok(false)` when the claim lost its race.
    fn try_claim(&self, slot: usize, observed: u32, key: K, value: V) -> GridResult<bool> {
        debug_assert!(matches!(
            state(observed),
            SlotState::Empty | SlotState::Tombstone
        ));
        let claimed = advance(observed, SlotState::Claimed);
        if self
            .meta_ref(slot)
            .compare_exchange_strong(observed, claimed)
            .is_err()
        {
            return Ok(false);
        }

        // SAFETY: the successful CAS above makes this thread the slot's sole
        // writer until the publish below.
        unsafe {
            self.write_key(slot, key);
            self.write_value(slot, value);
        }

        // Linearization point: the previously-unset bit says this thread's
        // insert is the one that happened.
        let was_set = self.occupancy.set(slot)?;
        debug_assert!(!was_set, "claimed slot had its occupancy bit set");

        self.meta_ref(slot).store(advance(claimed, SlotState::Occupied));
        Ok(true)
    }

    /// # Safety
    ///
    /// Caller must either hold the slot's `Claimed` state or validate the
    /// copy against the meta word afterwards.
    #[inline]
    unsafe fn read_key(&self, i: usize) -> K {
        atomic_read(self.keys.as_ptr().add(i))
    }

    /// # Safety
    ///
    /// As for [`read_key`](Self::read_key).
    #[inline]
    unsafe fn read_value(&self, i: usize) -> V {
        atomic_read(self.values.as_ptr().add(i))
    }

    /// # Safety
    ///
    /// Caller must hold the slot's `Claimed` state.
    #[inline]
    unsafe fn write_key(&self, i: usize, key: K) {
        atomic_write(self.keys.as_ptr().add(i), key);
    }

    /// # Safety
    ///
    /// Caller must hold the slot's `Claimed` state.
    #[inline]
    unsafe fn write_value(&self, i: usize, value: V) {
        atomic_write(self.values.as_ptr().add(i), value);
    }
}

/// Widest atomic chunk a `T` slot can be copied through: the alignment of
/// `T`, capped at eight bytes. `DevicePod` guarantees the size is a
/// multiple of the alignment, so every chunk stays in bounds and aligned.
#[inline]
fn chunk_size<T: DevicePod>() -> usize {
    mem::align_of::<T>().min(8).max(1)
}

/// Copy a slot out through relaxed atomic loads. Racing writers are seen
/// as torn values, which the caller's meta validation discards; the loads
/// themselves are race-free under the memory model.
///
/// # Safety
///
/// `src` must point to a live, `T`-aligned slot.
unsafe fn atomic_read<T: DevicePod>(src: *const T) -> T {
    let mut out = MaybeUninit::<T>::uninit();
    let s = src.cast::<u8>();
    let d = out.as_mut_ptr().cast::<u8>();
    let chunk = chunk_size::<T>();
    let mut off = 0;
    while off < mem::size_of::<T>() {
        match chunk {
            8 => {
                let v = (*s.add(off).cast::<AtomicU64>()).load(Ordering::Relaxed);
                d.add(off).cast::<u64>().write(v);
            }
            4 => {
                let v = (*s.add(off).cast::<AtomicU32>()).load(Ordering::Relaxed);
                d.add(off).cast::<u32>().write(v);
            }
            2 => {
                let v = (*s.add(off).cast::<AtomicU16>()).load(Ordering::Relaxed);
                d.add(off).cast::<u16>().write(v);
            }
            _ => {
                let v = (*s.add(off).cast::<AtomicU8>()).load(Ordering::Relaxed);
                d.add(off).write(v);
            }
        }
        off += chunk;
    }
    // `DevicePod` rules out padding, so every byte written above came from
    // a value of `T` at some point in the slot's history.
    out.assume_init()
}

/// Store a slot through relaxed atomic stores, chunked as in
/// [`atomic_read`].
///
/// # Safety
///
/// `dst` must point to a live, `T`-aligned slot this thread has claimed.
unsafe fn atomic_write<T: DevicePod>(dst: *mut T, value: T) {
    let src = MaybeUninit::new(value);
    let s = src.as_ptr().cast::<u8>();
    let d = dst.cast::<u8>();
    let chunk = chunk_size::<T>();
    let mut off = 0;
    while off < mem::size_of::<T>() {
        match chunk {
            8 => {
                let v = s.add(off).cast::<u64>().read();
                (*d.add(off).cast::<AtomicU64>()).store(v, Ordering::Relaxed);
            }
            4 => {
                let v = s.add(off).cast::<u32>().read();
                (*d.add(off).cast::<AtomicU32>()).store(v, Ordering::Relaxed);
            }
            2 => {
                let v = s.add(off).cast::<u16>().read();
                (*d.add(off).cast::<AtomicU16>()).store(v, Ordering::Relaxed);
            }
            _ => {
                let v = s.add(off).read();
                (*d.add(off).cast::<AtomicU8>()).store(v, Ordering::Relaxed);
            }
        }
        off += chunk;
    }
}

/// Lazy iterator over live entries in bit-index order. See
/// [`SlotTable::iter`] for the consistency contract.
pub struct SlotIter<'a, K, V, S> {
    table: &'a SlotTable<K, V, S>,
    index: usize,
}

impl<K, V, S> Iterator for SlotIter<'_, K, V, S>
where
    K: DevicePod + Hash + Eq,
    V: DevicePod,
    S: BuildHasher,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        while self.index < self.table.capacity() {
            let i = self.index;
            self.index += 1;
            if let Visit::Entry(k, v) = self.table.visit(i) {
                return Some((k, v));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AllocatorConfig;
    use crate::table::probing::ProbingScheme;
    use std::collections::hash_map::RandomState;

    fn table(capacity: usize) -> (DeviceAllocator, SlotTable<u64, u64, RandomState>) {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        let table = SlotTable::create(
            &alloc,
            TableConfig::with_capacity(capacity),
            RandomState::new(),
        )
        .unwrap();
        (alloc, table)
    }

    #[test]
    fn test_insert_find_erase_cycle() {
        let (alloc, table) = table(64);

        assert!(table.insert(1, 10).unwrap());
        assert!(table.insert(2, 20).unwrap());
        assert_eq!(table.find(&1), Some(10));
        assert_eq!(table.find(&2), Some(20));
        assert_eq!(table.find(&3), None);
        assert_eq!(table.len(), 2);

        assert!(table.erase(&1).unwrap());
        assert_eq!(table.find(&1), None);
        assert!(!table.erase(&1).unwrap());
        assert_eq!(table.len(), 1);

        table.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_duplicate_insert_is_a_no_op() {
        let (alloc, table) = table(16);

        assert!(table.insert(7, 70).unwrap());
        assert!(!table.insert(7, 71).unwrap());
        assert_eq!(table.len(), 1);
        // First value wins; insert never overwrites.
        assert_eq!(table.find(&7), Some(70));

        table.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_tombstone_preserves_probe_chains() {
        let alloc = DeviceAllocator::new(AllocatorConfig::default());
        // Linear probing with a tiny table forces every key into one chain.
        let mut config = TableConfig::with_capacity(8);
        config.probing = ProbingScheme::Linear;
        let table: SlotTable<u64, u64, RandomState> =
            SlotTable::create(&alloc, config, RandomState::new()).unwrap();

        for k in 0..6u64 {
            table.insert(k, k).unwrap();
        }
        // Erase keys in the middle of chains; the rest must stay reachable.
        table.erase(&1).unwrap();
        table.erase(&3).unwrap();
        for k in [0u64, 2, 4, 5] {
            assert_eq!(table.find(&k), Some(k), "key {k} lost after erasures");
        }
        assert_eq!(table.find(&1), None);
        assert_eq!(table.tombstones(), 2);

        // Tombstones are reusable without breaking the surviving chains.
        table.insert(100, 1000).unwrap();
        assert_eq!(table.find(&100), Some(1000));
        for k in [0u64, 2, 4, 5] {
            assert_eq!(table.find(&k), Some(k));
        }

        table.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_full_table_reports_full() {
        let (alloc, table) = table(8);
        let mut inserted = 0;
        let mut full = 0;
        for k in 0..16u64 {
            match table.insert(k, k) {
                Ok(true) => inserted += 1,
                Ok(false) => unreachable!("keys are distinct"),
                Err(GridError::Full { .. }) => full += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(inserted, 8);
        assert_eq!(full, 8);
        assert_eq!(table.len(), 8);
        table.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_update_in_place() {
        let (alloc, table) = table(16);
        table.insert(5, 50).unwrap();

        assert!(table.update(&5, |v| *v += 1).unwrap());
        assert_eq!(table.find(&5), Some(51));
        assert!(!table.update(&99, |v| *v += 1).unwrap());

        table.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_iteration_is_bit_index_ordered_and_complete() {
        let (alloc, table) = table(64);
        for k in 0..20u64 {
            table.insert(k, k * 2).unwrap();
        }

        let entries: Vec<_> = table.iter().collect();
        assert_eq!(entries.len(), 20);
        let mut keys: Vec<_> = entries.iter().map(|&(k, _)| k).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..20).collect::<Vec<_>>());
        for (k, v) in entries {
            assert_eq!(v, k * 2);
        }

        table.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_rehash_compacts_tombstones_and_grows() {
        let (alloc, mut table) = table(16);
        for k in 0..12u64 {
            table.insert(k, k).unwrap();
        }
        for k in 0..6u64 {
            table.erase(&k).unwrap();
        }
        assert_eq!(table.tombstones(), 6);

        table.rehash(&alloc, 64).unwrap();
        assert_eq!(table.capacity(), 64);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.len(), 6);
        for k in 6..12u64 {
            assert_eq!(table.find(&k), Some(k));
        }
        for k in 0..6u64 {
            assert_eq!(table.find(&k), None);
        }

        table.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_rehash_too_small_is_rejected() {
        let (alloc, mut table) = table(16);
        for k in 0..10u64 {
            table.insert(k, k).unwrap();
        }
        assert!(matches!(
            table.rehash(&alloc, 4),
            Err(GridError::InvalidConfig(_))
        ));
        table.destroy(&alloc).unwrap();
    }

    #[test]
    fn test_clear() {
        let (alloc, mut table) = table(16);
        for k in 0..10u64 {
            table.insert(k, k).unwrap();
        }
        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.find(&3), None);
        // Cleared slots are Empty again, not tombstones.
        assert_eq!(table.tombstones(), 0);
        table.insert(3, 33).unwrap();
        assert_eq!(table.find(&3), Some(33));
        table.destroy(&alloc).unwrap();
    }
}
