//! Interest tracking
//!
//! Directives and notifications exchanged with the host, and the tracker
//! that defers decisions for pairs sitting in the boundary zone.

pub mod event;
pub mod pair;

pub use event::{Directives, Event, Notification};
pub use pair::{PairTracker, Proximity, Thresholds, TrackedPair, Verdict};
