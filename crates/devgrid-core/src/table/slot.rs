//! Per-slot metadata word.
//!
//! Each slot carries one `u32` meta word: the slot state in the low 2 bits
//! and a version counter in the high 30 bits. Every state transition bumps
//! the version, so a reader that sampled the word before copying the slot's
//! key/value can detect that the slot was reclaimed under it by re-reading
//! the word afterwards (seqlock validation). Versions wrap at 2^30
//! transitions of a single slot, far beyond any ABA window a bounded probe
//! can observe.
//!
//! State machine per slot:
//!
//! ```text
//! Empty ─claim→ Claimed ─publish→ Occupied ─erase→ Tombstone ─claim→ Claimed
//!                                     │  ▲
//!                                     └──┘ in-place update (version bumps)
//! ```
//!
//! `Claimed` means exactly one writer owns the slot's key/value bytes.
//! Tombstones are never reusable as chain terminators: probes skip them so
//! chains for other keys stay intact until a host-side rehash compacts.

/// Slot states, low 2 bits of the meta word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum SlotState {
    /// Never held an entry; terminates probe chains.
    Empty = 0,
    /// A writer owns the slot's bytes right now.
    Claimed = 1,
    /// Holds a live entry.
    Occupied = 2,
    /// Held an entry that was erased; skipped by probes, reusable by insert.
    Tombstone = 3,
}

const STATE_MASK: u32 = 0b11;

/// Decode the state bits of a meta word.
#[inline]
pub(crate) fn state(meta: u32) -> SlotState {
    match meta & STATE_MASK {
        0 => SlotState::Empty,
        1 => SlotState::Claimed,
        2 => SlotState::Occupied,
        _ => SlotState::Tombstone,
    }
}

/// Meta word for `new_state` with the version bumped past `meta`'s.
#[inline]
pub(crate) fn advance(meta: u32, new_state: SlotState) -> u32 {
    let version = (meta >> 2).wrapping_add(1);
    (version << 2) | new_state as u32
}
