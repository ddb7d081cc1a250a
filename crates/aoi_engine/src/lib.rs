//! # AOI Engine
//!
//! Area-of-interest tracking for real-time simulations.
//!
//! Entities are tagged as *watchers* (they want to know what is around them)
//! and/or *markers* (they can be seen). Once per tick the engine reports
//! which watcher/marker pairs came within the interest radius
//! ([`Event::Move`]) and which drifted beyond the leave radius
//! ([`Event::Leave`]).
//!
//! ## Features
//!
//! - **Change-driven pairing**: only entities that moved or changed role are
//!   paired, never the whole population against itself
//! - **Hysteresis**: pairs between the two radii are tracked across ticks
//!   instead of flapping between events
//! - **Jitter filter**: sub-threshold movement does not re-trigger pairing
//! - **Injected allocation**: every engine carries its own [`Allocator`]
//!   for budgeting or instrumentation
//!
//! ## Quick Start
//!
//! ```rust
//! use aoi_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let mut engine = Engine::new()?;
//!
//!     engine.update(1, "wm", [0.0, 0.0, 0.0])?;
//!     engine.update(2, "m", [5.0, 0.0, 0.0])?;
//!
//!     engine.tick(|watcher, marker, event| {
//!         println!("{watcher} -> {marker}: {event}");
//!     })?;
//!
//!     // Remove entity 2 from the scene
//!     engine.update(2, "d", [0.0, 0.0, 0.0])?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;

pub mod foundation;
pub mod config;
pub mod ecs;
pub mod interest;

mod engine;


pub use engine::{Engine, EngineError};
pub use core::config::EngineConfig;
pub use ecs::{EntityId, Object};
pub use foundation::math::Vec3;
pub use foundation::memory::{AllocError, Allocator, BudgetAllocator, CountingAllocator, MemoryStats, SystemAllocator};
pub use interest::{Directives, Event, Notification};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        Engine, EngineConfig, EngineError,
        Event, Notification, Directives,
        EntityId, Vec3,
        foundation::memory::{Allocator, SystemAllocator, CountingAllocator, BudgetAllocator},
        config::Config,
    };
}
