//! # Engine Configuration
//!
//! Tunables for a single [`Engine`](crate::Engine) instance. Every distance
//! threshold is derived from the interest radius and stored squared, since
//! the engine only ever compares squared distances.
//!
//! ## Thresholds
//!
//! - **Interest radius**: a watcher/marker pair closer than this is reported
//!   with [`Event::Move`](crate::Event::Move).
//! - **Leave scale**: multiplier applied to the squared radius; pairs beyond
//!   it are reported with [`Event::Leave`](crate::Event::Leave). The default
//!   of `4.0` places the leave boundary at twice the linear radius.
//! - **Near scale**: multiplier applied to the squared radius below which a
//!   position change is treated as jitter and does not re-trigger pairing.

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// Default interest radius
pub const DEFAULT_RADIUS: f32 = 10.0;
/// Default leave multiplier on the squared radius
pub const DEFAULT_LEAVE_SCALE: f32 = 4.0;
/// Default micro-movement multiplier on the squared radius
pub const DEFAULT_NEAR_SCALE: f32 = 0.25;
/// Default slot count for the registry and partition sets
pub const DEFAULT_CAPACITY: usize = 16;

/// # AOI Engine Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interest radius (linear)
    pub radius: f32,
    /// Outer boundary expressed as a multiple of `radius²`
    pub leave_scale: f32,
    /// Micro-movement threshold expressed as a multiple of `radius²`
    pub near_scale: f32,
    /// Initial registry slot count, must be a power of two
    pub registry_capacity: usize,
    /// Initial capacity of each partition set
    pub set_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            leave_scale: DEFAULT_LEAVE_SCALE,
            near_scale: DEFAULT_NEAR_SCALE,
            registry_capacity: DEFAULT_CAPACITY,
            set_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Configuration with a custom radius and default everything else
    pub fn with_radius(radius: f32) -> Self {
        Self {
            radius,
            ..Default::default()
        }
    }

    /// Squared interest radius
    #[inline]
    pub fn radius_squared(&self) -> f32 {
        self.radius * self.radius
    }

    /// Squared distance beyond which a pair is reported as left
    #[inline]
    pub fn leave_distance_squared(&self) -> f32 {
        self.radius_squared() * self.leave_scale
    }

    /// Squared distance below which movement is ignored
    #[inline]
    pub fn near_distance_squared(&self) -> f32 {
        self.radius_squared() * self.near_scale
    }

    /// Check every field is within its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "radius",
                reason: format!("must be finite and positive, got {}", self.radius),
            });
        }
        if !self.leave_scale.is_finite() || self.leave_scale < 1.0 {
            return Err(ConfigError::Invalid {
                field: "leave_scale",
                reason: format!("must be finite and at least 1.0, got {}", self.leave_scale),
            });
        }
        if !(0.0..=1.0).contains(&self.near_scale) {
            return Err(ConfigError::Invalid {
                field: "near_scale",
                reason: format!("must lie in [0, 1], got {}", self.near_scale),
            });
        }
        if !self.registry_capacity.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "registry_capacity",
                reason: format!("must be a non-zero power of two, got {}", self.registry_capacity),
            });
        }
        if self.set_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "set_capacity",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_thresholds() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.radius_squared(), 100.0);
        assert_relative_eq!(config.leave_distance_squared(), 400.0);
        assert_relative_eq!(config.near_distance_squared(), 25.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_radius = EngineConfig::with_radius(0.0);
        assert!(matches!(
            bad_radius.validate(),
            Err(ConfigError::Invalid { field: "radius", .. })
        ));

        let bad_leave = EngineConfig { leave_scale: 0.5, ..Default::default() };
        assert!(matches!(
            bad_leave.validate(),
            Err(ConfigError::Invalid { field: "leave_scale", .. })
        ));

        let bad_near = EngineConfig { near_scale: f32::NAN, ..Default::default() };
        assert!(matches!(
            bad_near.validate(),
            Err(ConfigError::Invalid { field: "near_scale", .. })
        ));

        let bad_capacity = EngineConfig { registry_capacity: 12, ..Default::default() };
        assert!(matches!(
            bad_capacity.validate(),
            Err(ConfigError::Invalid { field: "registry_capacity", .. })
        ));

        let empty_sets = EngineConfig { set_capacity: 0, ..Default::default() };
        assert!(matches!(
            empty_sets.validate(),
            Err(ConfigError::Invalid { field: "set_capacity", .. })
        ));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("radius = 25.0\n").unwrap();
        assert_relative_eq!(config.radius, 25.0);
        assert_relative_eq!(config.leave_scale, DEFAULT_LEAVE_SCALE);
        assert_eq!(config.registry_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir();
        let config = EngineConfig {
            radius: 42.0,
            leave_scale: 2.25,
            ..Default::default()
        };

        for name in ["aoi_engine_config_test.toml", "aoi_engine_config_test.ron"] {
            let path = dir.join(format!("{}-{}", std::process::id(), name));
            config.save_to_file(&path).unwrap();
            let loaded = EngineConfig::load_from_file(&path).unwrap();
            let _ = std::fs::remove_file(&path);
            assert_eq!(loaded, config);
        }
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let result = EngineConfig::default().save_to_file("settings.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
