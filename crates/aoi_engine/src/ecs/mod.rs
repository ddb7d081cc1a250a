//! Entity storage for the interest engine
//!
//! Entity records, the id → record registry and the per-tick partition sets.

pub mod entity;
pub mod registry;
pub mod partition;

pub use entity::{EntityId, EntityKey, Mode, Object};
pub use registry::Registry;
pub use partition::{ObjectSet, Partitions};
