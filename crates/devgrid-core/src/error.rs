//! Error types for devgrid-core.
//!
//! This module defines the central error type [`GridError`] used throughout
//! the crate, along with the [`GridResult<T>`] type alias.
//!
//! # Examples
//!
//! ```rust
//! use devgrid_core::GridError;
//!
//! let error = GridError::IndexOutOfRange { index: 9, len: 8 };
//! assert!(error.to_string().contains("9"));
//! ```

use thiserror::Error;

use crate::memory::MemorySpace;

/// Result alias used by every fallible operation in the crate.
pub type GridResult<T> = Result<T, GridError>;

/// Top-level error type for devgrid-core operations.
///
/// Allocator and handle errors are reported synchronously to the calling
/// (host) context. Per-operation errors hit inside a parallel phase (for
/// example [`GridError::Full`] during one worker's insert) are returned as
/// that call's status and never affect other workers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    /// The requested memory space cannot satisfy an allocation request.
    ///
    /// # When This Occurs
    ///
    /// - The space's byte budget is exhausted
    /// - The underlying system allocation fails
    #[error("Out of memory in {space} space: requested {requested} bytes, available {available} bytes")]
    OutOfMemory {
        /// Space the allocation was requested in.
        space: MemorySpace,
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes still available in the space's budget.
        available: usize,
    },

    /// An array handle was used with the wrong allocator or after being freed.
    ///
    /// Double-free and cross-space free are structural misuse and are always
    /// reported, never silently ignored.
    #[error("Invalid handle {id} ({space} space): {reason}")]
    InvalidHandle {
        /// Unique id of the offending handle.
        id: u64,
        /// Space recorded on the handle.
        space: MemorySpace,
        /// Human-readable cause (space mismatch, already destroyed, ...).
        reason: HandleFault,
    },

    /// A bitset, mutex-array, or slot index outside the fixed capacity.
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The container's fixed length.
        len: usize,
    },

    /// Insert exhausted its probe bound without finding a free slot.
    ///
    /// Reported per call; concurrent workers are unaffected.
    #[error("Table full: probe bound of {max_probes} exhausted (capacity {capacity})")]
    Full {
        /// Configured maximum probe count.
        max_probes: usize,
        /// Table capacity at the time of the failure.
        capacity: usize,
    },

    /// A validated copy exceeds a handle's recorded element count.
    #[error("Range check failed: copy of {count} elements exceeds {side} handle length {len}")]
    RangeCheckFailure {
        /// Number of elements the caller asked to copy.
        count: usize,
        /// Which handle was too small ("source" or "destination").
        side: &'static str,
        /// That handle's recorded element count.
        len: usize,
    },

    /// A configuration value failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why a handle was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleFault {
    /// The handle's space tag does not match the allocator that received it.
    SpaceMismatch,
    /// The handle was already destroyed (double free).
    AlreadyDestroyed,
    /// The handle was never created by this allocator.
    UnknownHandle,
}

impl std::fmt::Display for HandleFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleFault::SpaceMismatch => write!(f, "space tag does not match allocator"),
            HandleFault::AlreadyDestroyed => write!(f, "handle already destroyed"),
            HandleFault::UnknownHandle => write!(f, "handle not created by this allocator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_numbers() {
        let err = GridError::OutOfMemory {
            space: MemorySpace::Device,
            requested: 4096,
            available: 128,
        };
        let msg = err.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("128"));
        assert!(msg.contains("device"));
    }

    #[test]
    fn test_full_is_per_call_value() {
        let err = GridError::Full {
            max_probes: 1024,
            capacity: 1024,
        };
        assert_eq!(
            err,
            GridError::Full {
                max_probes: 1024,
                capacity: 1024
            }
        );
    }

    #[test]
    fn test_handle_fault_display() {
        assert!(HandleFault::AlreadyDestroyed.to_string().contains("already"));
        assert!(HandleFault::SpaceMismatch.to_string().contains("space"));
    }
}
