//! Camera state read by LOD selection.

use cgmath::{InnerSpace, MetricSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// What LOD selection needs to know about the view.
pub trait Viewport {
    /// Camera position in world space.
    fn eye(&self) -> Point3<f64>;

    /// Tangent of half the vertical field of view.
    fn view_tangent(&self) -> f64;

    /// Smallest on-screen size, as a percentage of the viewport, of a body
    /// drawn in a static frame.
    fn minimum_static_pixel_culling_ratio(&self) -> f64;

    /// Same as the static ratio, for frames drawn while navigating.
    fn minimum_dynamic_pixel_culling_ratio(&self) -> f64;
}

/// A perspective camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// The position of the camera in world space.
    pub eye: Point3<f64>,
    /// The point the camera is looking at in world space.
    pub target: Point3<f64>,
    /// The up direction vector (typically Y-up: `(0, 1, 0)`).
    pub up: Vector3<f64>,
    /// Vertical field of view in degrees.
    pub fovy: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Point3::new(0.0, 0.0, 1.0),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            fovy: 35.0,
        }
    }
}

impl Camera {
    /// Returns the camera's forward vector
    pub fn forward(&self) -> Vector3<f64> {
        (self.target - self.eye).normalize()
    }

    /// Distance from the eye to the target.
    pub fn length(&self) -> f64 {
        self.eye.distance(self.target)
    }

    pub fn view_tangent(&self) -> f64 {
        (self.fovy.to_radians() / 2.0).tan()
    }
}

/// Minimum on-screen body sizes, in pixels, below which bodies are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSettings {
    pub min_static_pixel_size: u32,
    pub min_dynamic_pixel_size: u32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            min_static_pixel_size: 10,
            min_dynamic_pixel_size: 10,
        }
    }
}

/// A [`Camera`] rendered into a window of `width` x `height` pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraViewport {
    pub camera: Camera,
    pub width: u32,
    pub height: u32,
    pub settings: ViewportSettings,
}

impl CameraViewport {
    pub fn new(camera: Camera, width: u32, height: u32) -> Self {
        Self {
            camera,
            width,
            height,
            settings: ViewportSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ViewportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn pixel_ratio(&self, pixels: u32) -> f64 {
        let largest = self.width.max(self.height);
        if largest == 0 {
            return 0.0;
        }
        f64::from(pixels) / f64::from(largest) * 100.0
    }
}

impl Viewport for CameraViewport {
    fn eye(&self) -> Point3<f64> {
        self.camera.eye
    }

    fn view_tangent(&self) -> f64 {
        self.camera.view_tangent()
    }

    fn minimum_static_pixel_culling_ratio(&self) -> f64 {
        self.pixel_ratio(self.settings.min_static_pixel_size)
    }

    fn minimum_dynamic_pixel_culling_ratio(&self) -> f64 {
        self.pixel_ratio(self.settings.min_dynamic_pixel_size)
    }
}
