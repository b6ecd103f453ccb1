//! Memory space tags.

use serde::{Deserialize, Serialize};

/// The memory space an allocation or container is bound to.
///
/// Every allocation and every container instance is permanently bound to
/// exactly one space for its lifetime; an array created in space S must be
/// freed in space S.
///
/// On a build without a physical accelerator, [`Device`](MemorySpace::Device)
/// and [`Managed`](MemorySpace::Managed) are distinct budget-tracked arenas
/// backed by process memory. Space semantics (tagging, symmetric free,
/// per-space ledgers) are enforced identically either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemorySpace {
    /// Host-visible memory.
    Host,
    /// Device-only memory.
    Device,
    /// Unified / managed memory, visible to both host and device.
    Managed,
    /// Sentinel for handles that have been consumed or never initialized.
    Invalid,
}

impl MemorySpace {
    /// All real (allocatable) spaces, in ledger order.
    pub const ALL: [MemorySpace; 3] = [
        MemorySpace::Host,
        MemorySpace::Device,
        MemorySpace::Managed,
    ];

    /// Stable index into per-space tables. `None` for [`MemorySpace::Invalid`].
    #[inline]
    pub(crate) fn index(self) -> Option<usize> {
        match self {
            MemorySpace::Host => Some(0),
            MemorySpace::Device => Some(1),
            MemorySpace::Managed => Some(2),
            MemorySpace::Invalid => None,
        }
    }

    /// Whether the host can directly dereference memory in this space.
    #[inline]
    pub fn host_accessible(self) -> bool {
        matches!(self, MemorySpace::Host | MemorySpace::Managed)
    }
}

impl std::fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemorySpace::Host => write!(f, "host"),
            MemorySpace::Device => write!(f, "device"),
            MemorySpace::Managed => write!(f, "managed"),
            MemorySpace::Invalid => write!(f, "invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_indices_are_distinct() {
        let mut seen = [false; 3];
        for space in MemorySpace::ALL {
            let idx = space.index().expect("real space has an index");
            assert!(!seen[idx], "duplicate index for {space}");
            seen[idx] = true;
        }
        assert_eq!(MemorySpace::Invalid.index(), None);
    }

    #[test]
    fn test_host_accessibility() {
        assert!(MemorySpace::Host.host_accessible());
        assert!(MemorySpace::Managed.host_accessible());
        assert!(!MemorySpace::Device.host_accessible());
    }
}
