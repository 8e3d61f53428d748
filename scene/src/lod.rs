//! Screen-coverage level of detail selection.
//!
//! Levels run from 0 (finest) to [`MAX_LOD`] (coarsest). A body whose
//! projected size falls under the viewport's pixel culling threshold gets
//! [`CULL_LOD`] instead, and must not be drawn.

use std::sync::atomic::{AtomicI32, Ordering};

use cgmath::MetricSpace;

use crate::common::{BoundingBox, Transform};
use crate::viewport::Viewport;

/// Coarsest drawable level.
pub const MAX_LOD: i32 = 100;

/// Returned for bodies too small on screen to draw.
pub const CULL_LOD: i32 = 110;

/// Level new instances start with unless told otherwise.
pub const DEFAULT_LOD: i32 = 10;

static GLOBAL_DEFAULT_LOD: AtomicI32 = AtomicI32::new(DEFAULT_LOD);

/// Sets the default level given to instances created from now on.
/// The value is clamped to `0..=MAX_LOD`.
pub fn set_global_default_lod(level: i32) {
    GLOBAL_DEFAULT_LOD.store(clamp_lod(level), Ordering::Relaxed);
}

pub fn global_default_lod() -> i32 {
    GLOBAL_DEFAULT_LOD.load(Ordering::Relaxed)
}

/// Clamps a level to the drawable range.
pub fn clamp_lod(level: i32) -> i32 {
    level.clamp(0, MAX_LOD)
}

/// True for levels that mean "skip this body".
pub fn is_culled(level: i32) -> bool {
    level > MAX_LOD
}

/// Picks a detail level for one body of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodSelector {
    /// The instance's configured level, used for static draws and as the
    /// finest level allowed while navigating.
    pub default_lod: i32,
    /// Whether pixel culling is active for this frame.
    pub pixel_culling: bool,
}

impl LodSelector {
    pub fn new(default_lod: i32, pixel_culling: bool) -> Self {
        Self {
            default_lod,
            pixel_culling,
        }
    }

    /// Level for a body with local bounds `bounds` placed by `matrix`.
    ///
    /// `use_lod` is set for frames drawn during navigation. Without a
    /// viewport the finest level is returned.
    pub fn select(
        &self,
        bounds: &BoundingBox,
        matrix: &Transform,
        viewport: Option<&dyn Viewport>,
        use_lod: bool,
    ) -> i32 {
        let Some(viewport) = viewport else {
            return 0;
        };

        let pixel_culling_ratio = if use_lod {
            viewport.minimum_dynamic_pixel_culling_ratio()
        } else {
            viewport.minimum_static_pixel_culling_ratio()
        };

        let diameter = bounds.bounding_sphere_radius() * 2.0 * matrix.max_scaling();
        let center = matrix.transform_point(bounds.center());
        let camera_cover = center.distance(viewport.eye()) * viewport.view_tangent();

        // Share of the view covered by the body, inverted so that large
        // bodies get small (fine) levels.
        let mut ratio = diameter / camera_cover * 100.0;
        if ratio > 100.0 {
            ratio = 100.0;
        }
        ratio = 100.0 - ratio;

        let default_lod = f64::from(self.default_lod);
        if self.pixel_culling && ratio > 100.0 - pixel_culling_ratio {
            ratio = f64::from(CULL_LOD);
        } else if use_lod && ratio > 50.0 {
            ratio = (ratio - 50.0) / 50.0 * 100.0;
            if ratio < default_lod {
                ratio = default_lod;
            }
        } else {
            ratio = default_lod;
        }

        ratio as i32
    }
}
