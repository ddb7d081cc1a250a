//! Math utilities and types
//!
//! Positions are plain 3D vectors; all interest decisions are made on
//! squared distances so no square roots are taken on the hot path.

pub use nalgebra::Vector3;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Squared euclidean distance between two points
#[inline]
pub fn distance_squared(a: &Vec3, b: &Vec3) -> f32 {
    (a - b).norm_squared()
}
