//! Concurrent open-addressing hash containers.
//!
//! # Design
//!
//! One probing/insert/erase/lookup engine (the `core` module) parameterized by
//! key/value/hash/equality, surfaced as [`DeviceHashMap`] and
//! [`DeviceHashSet`]. Collision resolution, per-slot state machine, and
//! consistency guarantees are documented on the engine module.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`TableConfig`] | capacity, space, probing policy, probe/retry bounds |
//! | [`ProbingScheme`] | linear or double-hash probe sequences |
//! | [`DeviceHashMap`] | concurrent fixed-capacity map |
//! | [`DeviceHashSet`] | concurrent fixed-capacity set |

mod config;
mod core;
mod map;
mod probing;
mod set;
mod slot;

pub use config::TableConfig;
pub use self::core::SlotIter;
pub use map::DeviceHashMap;
pub use probing::ProbingScheme;
pub use set::{DeviceHashSet, SetIter};
