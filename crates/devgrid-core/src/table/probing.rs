//! Probe sequence generation.
//!
//! The probing policy is a construction parameter, fixed for the table's
//! lifetime: every operation on a key recomputes the same sequence
//! `(h + f(i)) mod capacity`, so probe chains are a pure function of the key
//! and never stored.

use serde::{Deserialize, Serialize};

/// Collision-resolution policy, fixed at table construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbingScheme {
    /// `f(i) = i`. Best cache behavior, prone to clustering.
    Linear,
    /// `f(i) = i * h2` with `h2` odd, derived from the key's upper hash bits.
    /// Breaks up clusters; requires the power-of-two capacity the table
    /// guarantees.
    DoubleHash,
}

impl ProbingScheme {
    /// The bounded probe sequence for a key with 64-bit hash `hash`.
    ///
    /// `capacity` must be a power of two; an odd step is coprime with it, so
    /// double hashing visits `capacity` distinct slots before repeating.
    pub(crate) fn sequence(self, hash: u64, capacity: usize, max_probes: usize) -> ProbeSeq {
        debug_assert!(capacity.is_power_of_two());
        let step = match self {
            ProbingScheme::Linear => 1,
            ProbingScheme::DoubleHash => ((hash >> 32) as usize) | 1,
        };
        ProbeSeq {
            pos: (hash as usize) & (capacity - 1),
            step,
            mask: capacity - 1,
            remaining: max_probes,
        }
    }
}

/// Iterator over probed slot indices. At most `max_probes` items.
pub(crate) struct ProbeSeq {
    pos: usize,
    step: usize,
    mask: usize,
    remaining: usize,
}

impl Iterator for ProbeSeq {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let slot = self.pos;
        self.pos = self.pos.wrapping_add(self.step) & self.mask;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_sequence_wraps() {
        let seq: Vec<_> = ProbingScheme::Linear.sequence(14, 16, 5).collect();
        assert_eq!(seq, vec![14, 15, 0, 1, 2]);
    }

    #[test]
    fn test_probe_bound_is_respected() {
        assert_eq!(ProbingScheme::Linear.sequence(0, 8, 0).count(), 0);
        assert_eq!(ProbingScheme::DoubleHash.sequence(7, 8, 3).count(), 3);
    }

    #[test]
    fn test_double_hash_covers_all_slots() {
        // Odd step + power-of-two capacity: a full-length sequence is a
        // permutation of every slot.
        for hash in [0u64, 0x1234_5678_9abc_def0, u64::MAX] {
            let mut seen: Vec<_> = ProbingScheme::DoubleHash.sequence(hash, 64, 64).collect();
            seen.sort_unstable();
            let expected: Vec<_> = (0..64).collect();
            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn test_sequence_is_reproducible() {
        let a: Vec<_> = ProbingScheme::DoubleHash.sequence(99, 32, 10).collect();
        let b: Vec<_> = ProbingScheme::DoubleHash.sequence(99, 32, 10).collect();
        assert_eq!(a, b);
    }
}
