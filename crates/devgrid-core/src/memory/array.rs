//! Typed array handles.
//!
//! A [`DeviceArray`] is the handle produced by
//! [`DeviceAllocator::create_array`]: a pointer, an element count, the space
//! it was created in, and a process-unique id. The handle is owned by whoever
//! created it and is destroyed only through the matching
//! [`DeviceAllocator::destroy_array`] call.
//!
//! Dropping a handle without destroying it is a *leak* in ledger terms: the
//! backing storage is returned to the system (the process stays memory-safe)
//! but the allocation ledger keeps the handle counted as live and a
//! `tracing::warn!` is emitted, so leak tooling sees exactly what the
//! original create/destroy symmetry contract promises.
//!
//! [`DeviceAllocator::create_array`]: crate::memory::DeviceAllocator::create_array
//! [`DeviceAllocator::destroy_array`]: crate::memory::DeviceAllocator::destroy_array

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::atomic::{AtomicRef, AtomicScalar};
use crate::error::{GridError, GridResult};

use super::space::MemorySpace;

/// Process-wide handle id source. Ids are never reused, which is what makes
/// double-free detection in the allocator registry reliable.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_handle_id() -> u64 {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A typed, space-tagged array handle.
///
/// The element type must be [`DevicePod`]: trivially copyable, with all-zero
/// bytes a valid value, since arrays come back zero-initialized and workers
/// move elements around bitwise.
pub struct DeviceArray<T> {
    ptr: NonNull<T>,
    len: usize,
    bytes: usize,
    space: MemorySpace,
    id: u64,
    _marker: PhantomData<T>,
}

// SAFETY: the handle is a plain (pointer, len) pair over storage it owns;
// element access is governed by the unsafe accessors below.
unsafe impl<T: Send> Send for DeviceArray<T> {}
unsafe impl<T: Sync> Sync for DeviceArray<T> {}

/// Marker for element types that may live in any memory space.
///
/// # Safety
///
/// Implementors must guarantee that the type is trivially copyable, that
/// the all-zero bit pattern is a valid value (freshly created arrays are
/// zero-initialized), that it has no padding bytes, and that its size is a
/// multiple of its alignment. Table slots are copied through aligned
/// per-chunk atomics, so padding or a trailing partial chunk would leave
/// bytes unaccounted for. Tuples are excluded for that reason; use arrays
/// or `#[repr(C)]` types that satisfy the layout rules instead.
pub unsafe trait DevicePod: Copy + Send + Sync + 'static {}

macro_rules! impl_device_pod {
    ($($ty:ty),* $(,)?) => {
        $(unsafe impl DevicePod for $ty {})*
    };
}

impl_device_pod!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, ());

unsafe impl<T: DevicePod, const N: usize> DevicePod for [T; N] {}

impl<T> DeviceArray<T> {
    /// Assemble a handle from backend-provided storage. Allocator-internal.
    pub(crate) fn from_raw(ptr: NonNull<T>, len: usize, bytes: usize, space: MemorySpace) -> Self {
        Self {
            ptr,
            len,
            bytes,
            space,
            id: next_handle_id(),
            _marker: PhantomData,
        }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds zero elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total byte size of the backing storage.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.bytes
    }

    /// The space this array was created in.
    #[inline]
    pub fn space(&self) -> MemorySpace {
        self.space
    }

    /// Process-unique handle id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Raw element pointer.
    ///
    /// Reads and writes through this pointer are the caller's responsibility;
    /// in particular, plain (non-atomic) accesses must not race.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// View the array as a slice.
    ///
    /// Requires exclusive access, which is what rules out concurrent writers.
    ///
    /// # Panics
    ///
    /// Panics if the space is not host-accessible.
    pub fn as_slice(&mut self) -> &[T] {
        self.assert_host_accessible();
        // SAFETY: ptr/len describe an owned, initialized allocation and the
        // &mut receiver guarantees no concurrent access.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the array as a mutable slice.
    ///
    /// # Panics
    ///
    /// Panics if the space is not host-accessible.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.assert_host_accessible();
        // SAFETY: as for `as_slice`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// View the array as a slice without taking exclusive access.
    ///
    /// # Safety
    ///
    /// No thread may write (even atomically) to any element for the lifetime
    /// of the returned slice.
    pub unsafe fn as_slice_unchecked(&self) -> &[T] {
        std::slice::from_raw_parts(self.ptr.as_ptr(), self.len)
    }

    fn assert_host_accessible(&self) {
        assert!(
            self.space.host_accessible(),
            "cannot take a host slice of a {} array",
            self.space
        );
    }

    /// Layout of the backing storage, for the allocator's free path.
    pub(crate) fn layout(&self) -> Layout {
        // bytes was computed from a valid Layout at creation.
        Layout::from_size_align(self.bytes, std::mem::align_of::<T>())
            .expect("handle layout was validated at creation")
    }

    /// Disassemble the handle without running its leak-warning Drop.
    pub(crate) fn into_raw(self) -> (NonNull<T>, usize, MemorySpace, u64) {
        let parts = (self.ptr, self.bytes, self.space, self.id);
        std::mem::forget(self);
        parts
    }
}

impl<T: AtomicScalar> DeviceArray<T> {
    /// Atomic capability over element `index`.
    ///
    /// The returned [`AtomicRef`] does not own the location; it is a view
    /// other threads may hold concurrently. While any `AtomicRef` over an
    /// element is live, that element must only be accessed atomically.
    pub fn atomic_ref(&self, index: usize) -> GridResult<AtomicRef<'_, T>> {
        if index >= self.len {
            return Err(GridError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        // SAFETY: index is in bounds, the storage outlives &self, and the
        // atomic mirror type has the same size and alignment as T.
        Ok(unsafe { AtomicRef::from_ptr(self.ptr.as_ptr().add(index)) })
    }
}

impl<T> Drop for DeviceArray<T> {
    fn drop(&mut self) {
        // A handle that reaches Drop was never destroyed through the
        // allocator: free the storage but leave the ledger imbalanced so the
        // leak is observable.
        tracing::warn!(
            id = self.id,
            space = %self.space,
            bytes = self.bytes,
            "DeviceArray leaked: dropped without destroy_array"
        );
        if self.bytes > 0 {
            // SAFETY: ptr/layout come from the global allocator via the
            // backend; the handle owns the storage exclusively at Drop.
            unsafe { std::alloc::dealloc(self.ptr.as_ptr().cast(), self.layout()) };
        }
    }
}

impl<T> std::fmt::Debug for DeviceArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceArray")
            .field("id", &self.id)
            .field("space", &self.space)
            .field("len", &self.len)
            .field("bytes", &self.bytes)
            .finish()
    }
}
