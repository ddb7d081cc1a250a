//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and distance helpers
//! - Memory accounting (the injected allocation capability)
//! - Logging utilities

pub mod math;
pub mod memory;
pub mod logging;
