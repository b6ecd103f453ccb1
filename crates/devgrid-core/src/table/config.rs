//! Hash table configuration.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::memory::MemorySpace;

use super::probing::ProbingScheme;

/// Construction parameters for [`DeviceHashMap`] / [`DeviceHashSet`].
///
/// Capacity is rounded up to the next power of two at creation and is fixed
/// for the table's lifetime; only a host-side [`rehash`] changes it.
///
/// # Example
///
/// ```
/// use devgrid_core::table::TableConfig;
///
/// let config = TableConfig::with_capacity(1000);
/// assert!(config.validate().is_ok());
/// ```
///
/// [`DeviceHashMap`]: super::DeviceHashMap
/// [`DeviceHashSet`]: super::DeviceHashSet
/// [`rehash`]: super::DeviceHashMap::rehash
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TableConfig {
    /// Number of slots. Rounded up to a power of two at creation.
    pub capacity: usize,
    /// Memory space for the slot arrays, bitset, and lock array.
    pub space: MemorySpace,
    /// Collision-resolution policy, not runtime-switchable.
    pub probing: ProbingScheme,
    /// Maximum slots probed per operation. `None` means a full sweep of the
    /// table; insert reports [`GridError::Full`] once the bound is exhausted.
    pub max_probes: Option<usize>,
    /// Claim-retry bound for insert. A retry only happens when another
    /// thread won a slot between scan and claim, so exhausting this bound
    /// reports [`GridError::Full`] rather than spinning forever.
    pub max_claim_retries: usize,
    /// Load-factor threshold (live + tombstone slots over capacity) above
    /// which [`should_rehash`](super::DeviceHashMap::should_rehash) advises a
    /// host-side compaction. Never acted on implicitly.
    pub rehash_load_factor: f64,
    /// Slot-reserve multiplier applied to `capacity` at creation, before the
    /// power-of-two rounding. `1.0` allocates exactly the requested capacity;
    /// `1.0 / expected_load_factor` keeps probe chains short for a table
    /// expected to fill to that load.
    pub excess_capacity_factor: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            space: MemorySpace::Managed,
            probing: ProbingScheme::DoubleHash,
            max_probes: None,
            max_claim_retries: 128,
            rehash_load_factor: 0.75,
            excess_capacity_factor: 1.0,
        }
    }
}

impl TableConfig {
    /// Default configuration at a given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Validate configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidConfig`] if:
    /// - capacity is zero
    /// - the space is [`MemorySpace::Invalid`]
    /// - `max_probes` or `max_claim_retries` is zero
    /// - the rehash load factor is outside `(0, 1]`
    pub fn validate(&self) -> GridResult<()> {
        if self.capacity == 0 {
            return Err(GridError::InvalidConfig(
                "table capacity must be non-zero".to_string(),
            ));
        }
        if self.space == MemorySpace::Invalid {
            return Err(GridError::InvalidConfig(
                "table space must be a real memory space".to_string(),
            ));
        }
        if self.max_probes == Some(0) {
            return Err(GridError::InvalidConfig(
                "max_probes must be non-zero".to_string(),
            ));
        }
        if self.max_claim_retries == 0 {
            return Err(GridError::InvalidConfig(
                "max_claim_retries must be non-zero".to_string(),
            ));
        }
        if !(self.rehash_load_factor > 0.0 && self.rehash_load_factor <= 1.0) {
            return Err(GridError::InvalidConfig(format!(
                "rehash_load_factor {} outside (0, 1]",
                self.rehash_load_factor
            )));
        }
        if !(self.excess_capacity_factor >= 1.0 && self.excess_capacity_factor.is_finite()) {
            return Err(GridError::InvalidConfig(format!(
                "excess_capacity_factor {} must be a finite value >= 1.0",
                self.excess_capacity_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TableConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(TableConfig::with_capacity(0).validate().is_err());

        let mut config = TableConfig::default();
        config.space = MemorySpace::Invalid;
        assert!(config.validate().is_err());

        let mut config = TableConfig::default();
        config.max_probes = Some(0);
        assert!(config.validate().is_err());

        let mut config = TableConfig::default();
        config.rehash_load_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = TableConfig::default();
        config.rehash_load_factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = TableConfig::default();
        config.excess_capacity_factor = 0.5;
        assert!(config.validate().is_err());
    }
}
