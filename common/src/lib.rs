//! Device-free math shared by the scene crates: bounding boxes and affine
//! transforms in double precision.

mod bounding_box;
mod transform;

pub use bounding_box::BoundingBox;
pub use transform::{Orientation, Transform};

/// Tolerance used for floating point comparisons.
pub const EPSILON: f64 = 1e-9;
