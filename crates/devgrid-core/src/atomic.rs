//! Atomic references over memory the reference does not own.
//!
//! [`AtomicRef`] is a capability: given a scalar location that is accessible
//! from the calling context (typically an element of a
//! [`DeviceArray`](crate::memory::DeviceArray)), it provides atomic
//! load/store/exchange/compare-and-swap and, for integral types, fetch-ops.
//! It never owns the referenced memory.
//!
//! All operations default to sequential consistency; every operation has a
//! `_with` variant taking an explicit [`Ordering`] for call sites that can
//! justify something weaker.
//!
//! The weak/strong compare-exchange distinction follows the standard
//! contract: `compare_exchange_weak` may fail spuriously even when the
//! comparison would have succeeded and is meant for retry loops;
//! `compare_exchange_strong` never fails spuriously.

use std::marker::PhantomData;
use std::sync::atomic::{
    AtomicBool, AtomicI32, AtomicI64, AtomicIsize, AtomicU32, AtomicU64, AtomicU8, AtomicUsize,
    Ordering,
};

mod sealed {
    pub trait Sealed {}
}

/// Scalar types with a `std` atomic mirror of identical size.
///
/// Sealed: the set of supported scalars is fixed by the crate.
pub trait AtomicScalar: sealed::Sealed + Copy + Send + Sync + 'static {
    /// The `std` atomic type that shares this scalar's representation.
    type Atomic: Sync;

    #[doc(hidden)]
    fn atomic_load(atomic: &Self::Atomic, order: Ordering) -> Self;
    #[doc(hidden)]
    fn atomic_store(atomic: &Self::Atomic, value: Self, order: Ordering);
    #[doc(hidden)]
    fn atomic_exchange(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn atomic_compare_exchange(
        atomic: &Self::Atomic,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;
    #[doc(hidden)]
    fn atomic_compare_exchange_weak(
        atomic: &Self::Atomic,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;
}

/// Integral scalars supporting arithmetic and bitwise fetch-ops.
pub trait AtomicInteger: AtomicScalar {
    #[doc(hidden)]
    fn atomic_fetch_add(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn atomic_fetch_sub(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn atomic_fetch_and(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn atomic_fetch_or(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn atomic_fetch_xor(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
}

macro_rules! impl_atomic_scalar {
    ($($scalar:ty => $atomic:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $scalar {}

            impl AtomicScalar for $scalar {
                type Atomic = $atomic;

                #[inline]
                fn atomic_load(atomic: &Self::Atomic, order: Ordering) -> Self {
                    atomic.load(order)
                }
                #[inline]
                fn atomic_store(atomic: &Self::Atomic, value: Self, order: Ordering) {
                    atomic.store(value, order)
                }
                #[inline]
                fn atomic_exchange(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.swap(value, order)
                }
                #[inline]
                fn atomic_compare_exchange(
                    atomic: &Self::Atomic,
                    current: Self,
                    new: Self,
                    success: Ordering,
                    failure: Ordering,
                ) -> Result<Self, Self> {
                    atomic.compare_exchange(current, new, success, failure)
                }
                #[inline]
                fn atomic_compare_exchange_weak(
                    atomic: &Self::Atomic,
                    current: Self,
                    new: Self,
                    success: Ordering,
                    failure: Ordering,
                ) -> Result<Self, Self> {
                    atomic.compare_exchange_weak(current, new, success, failure)
                }
            }
        )*
    };
}

macro_rules! impl_atomic_integer {
    ($($scalar:ty),* $(,)?) => {
        $(
            impl AtomicInteger for $scalar {
                #[inline]
                fn atomic_fetch_add(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_add(value, order)
                }
                #[inline]
                fn atomic_fetch_sub(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_sub(value, order)
                }
                #[inline]
                fn atomic_fetch_and(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_and(value, order)
                }
                #[inline]
                fn atomic_fetch_or(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_or(value, order)
                }
                #[inline]
                fn atomic_fetch_xor(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_xor(value, order)
                }
            }
        )*
    };
}

impl_atomic_scalar!(
    u8 => AtomicU8,
    u32 => AtomicU32,
    u64 => AtomicU64,
    usize => AtomicUsize,
    i32 => AtomicI32,
    i64 => AtomicI64,
    isize => AtomicIsize,
    bool => AtomicBool,
);

impl_atomic_integer!(u8, u32, u64, usize, i32, i64, isize);

/// An atomic view of a single scalar location.
///
/// `AtomicRef` is `Copy`: it is a borrow, in ownership terms a weak
/// capability, and any number of threads may hold one over the same location
/// simultaneously.
pub struct AtomicRef<'a, T: AtomicScalar> {
    inner: &'a T::Atomic,
    _marker: PhantomData<T>,
}

impl<T: AtomicScalar> Clone for AtomicRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: AtomicScalar> Copy for AtomicRef<'_, T> {}

impl<'a, T: AtomicScalar> AtomicRef<'a, T> {
    /// Wrap an existing atomic.
    pub fn from_atomic(atomic: &'a T::Atomic) -> Self {
        Self {
            inner: atomic,
            _marker: PhantomData,
        }
    }

    /// Build an atomic view over a raw scalar location.
    ///
    /// # Safety
    ///
    /// - `ptr` must be valid, aligned for `T::Atomic`, and live for `'a`
    /// - for the lifetime of any `AtomicRef` over the location, all accesses
    ///   to it must go through atomics
    pub unsafe fn from_ptr(ptr: *mut T) -> Self {
        Self {
            inner: &*(ptr as *const T::Atomic),
            _marker: PhantomData,
        }
    }

    /// Atomic load (SeqCst).
    #[inline]
    pub fn load(self) -> T {
        self.load_with(Ordering::SeqCst)
    }

    /// Atomic load with an explicit ordering.
    #[inline]
    pub fn load_with(self, order: Ordering) -> T {
        T::atomic_load(self.inner, order)
    }

    /// Atomic store (SeqCst).
    #[inline]
    pub fn store(self, value: T) {
        self.store_with(value, Ordering::SeqCst)
    }

    /// Atomic store with an explicit ordering.
    #[inline]
    pub fn store_with(self, value: T, order: Ordering) {
        T::atomic_store(self.inner, value, order)
    }

    /// Atomic swap (SeqCst), returning the previous value.
    #[inline]
    pub fn exchange(self, value: T) -> T {
        self.exchange_with(value, Ordering::SeqCst)
    }

    /// Atomic swap with an explicit ordering.
    #[inline]
    pub fn exchange_with(self, value: T, order: Ordering) -> T {
        T::atomic_exchange(self.inner, value, order)
    }

    /// Compare-and-swap that never fails spuriously (SeqCst/SeqCst).
    #[inline]
    pub fn compare_exchange_strong(self, current: T, new: T) -> Result<T, T> {
        T::atomic_compare_exchange(self.inner, current, new, Ordering::SeqCst, Ordering::SeqCst)
    }

    /// `compare_exchange_strong` with explicit orderings.
    #[inline]
    pub fn compare_exchange_strong_with(
        self,
        current: T,
        new: T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<T, T> {
        T::atomic_compare_exchange(self.inner, current, new, success, failure)
    }

    /// Compare-and-swap that may fail spuriously; callers must retry
    /// (SeqCst/SeqCst).
    #[inline]
    pub fn compare_exchange_weak(self, current: T, new: T) -> Result<T, T> {
        T::atomic_compare_exchange_weak(self.inner, current, new, Ordering::SeqCst, Ordering::SeqCst)
    }

    /// `compare_exchange_weak` with explicit orderings.
    #[inline]
    pub fn compare_exchange_weak_with(
        self,
        current: T,
        new: T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<T, T> {
        T::atomic_compare_exchange_weak(self.inner, current, new, success, failure)
    }
}

impl<T: AtomicInteger> AtomicRef<'_, T> {
    /// Atomic add, returning the previous value (SeqCst).
    #[inline]
    pub fn fetch_add(self, value: T) -> T {
        T::atomic_fetch_add(self.inner, value, Ordering::SeqCst)
    }

    /// Atomic subtract, returning the previous value (SeqCst).
    #[inline]
    pub fn fetch_sub(self, value: T) -> T {
        T::atomic_fetch_sub(self.inner, value, Ordering::SeqCst)
    }

    /// Atomic bitwise and, returning the previous value (SeqCst).
    #[inline]
    pub fn fetch_and(self, value: T) -> T {
        T::atomic_fetch_and(self.inner, value, Ordering::SeqCst)
    }

    /// Atomic bitwise or, returning the previous value (SeqCst).
    #[inline]
    pub fn fetch_or(self, value: T) -> T {
        T::atomic_fetch_or(self.inner, value, Ordering::SeqCst)
    }

    /// Atomic bitwise xor, returning the previous value (SeqCst).
    #[inline]
    pub fn fetch_xor(self, value: T) -> T {
        T::atomic_fetch_xor(self.inner, value, Ordering::SeqCst)
    }
}

impl<T: AtomicScalar + std::fmt::Debug> std::fmt::Debug for AtomicRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicRef").field(&self.load()).finish()
    }
}
