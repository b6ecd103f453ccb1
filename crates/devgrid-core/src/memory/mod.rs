//! Memory-space-aware allocation.
//!
//! # Design
//!
//! Three real memory spaces (host, device, managed), each served by a
//! byte-budgeted backend selected at allocator construction. Every array is
//! permanently bound to the space it was created in and must be destroyed
//! through the matching call; create/destroy symmetry is tracked by a
//! process-wide atomic [ledger] so leak tooling can observe
//! `allocations - deallocations` at any time.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`MemorySpace`] | space tag carried by every handle and container |
//! | [`DeviceAllocator`] | create/destroy/copy with budget + registry checks |
//! | [`DeviceArray`] | typed handle (pointer, count, space, byte size, id) |
//! | [`ledger`] | per-space atomic allocation counters |

mod allocator;
mod array;
mod backend;
pub mod ledger;
mod space;

pub use allocator::{AllocatorConfig, DeviceAllocator};
pub use array::{DeviceArray, DevicePod};
pub use ledger::{AllocationLedger, LedgerSnapshot};
pub use space::MemorySpace;
