//! Shared fixtures for unit tests: a backend that records every call, a
//! geometry with a fixed box, and a viewport with fixed camera values.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cgmath::Point3;

use crate::common::{BoundingBox, Transform};
use crate::geometry::{Geometry, GeometryId};
use crate::id::generate_id;
use crate::render::{DrawCall, RenderBackend, RenderProperties, Winding};
use crate::render_state::StateChange;
use crate::viewport::Viewport;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    PushMatrix(Transform),
    PopMatrix,
    FrontFace(Winding),
    ColorId([u8; 3]),
    State(StateChange),
    Draw(DrawCall),
}

#[derive(Default)]
pub struct RecordingBackend {
    pub events: Vec<BackendEvent>,
    state: Vec<StateChange>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the state kind `kind` belongs to.
    pub fn current(&self, kind: StateChange) -> StateChange {
        self.state
            .iter()
            .copied()
            .find(|c| c.same_kind(&kind))
            .unwrap_or_else(|| initial_state(kind))
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        self.events
            .iter()
            .filter_map(|event| match event {
                BackendEvent::Draw(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn color_ids(&self) -> Vec<[u8; 3]> {
        self.events
            .iter()
            .filter_map(|event| match event {
                BackendEvent::ColorId(rgb) => Some(*rgb),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&BackendEvent) -> bool) -> usize {
        self.events.iter().filter(|event| predicate(event)).count()
    }
}

/// Value a fresh backend holds for the state kind `kind` belongs to.
fn initial_state(kind: StateChange) -> StateChange {
    match kind {
        StateChange::DepthTest(_) => StateChange::DepthTest(true),
        StateChange::Blending(_) => StateChange::Blending(false),
        StateChange::FaceCulling(_) => StateChange::FaceCulling(false),
        StateChange::LineWidth(_) => StateChange::LineWidth(1.0),
        StateChange::PolygonOffset(_) => StateChange::PolygonOffset(None),
    }
}

impl RenderBackend for RecordingBackend {
    fn push_matrix(&mut self, matrix: &Transform) {
        self.events.push(BackendEvent::PushMatrix(*matrix));
    }

    fn pop_matrix(&mut self) {
        self.events.push(BackendEvent::PopMatrix);
    }

    fn set_front_face(&mut self, winding: Winding) {
        self.events.push(BackendEvent::FrontFace(winding));
    }

    fn set_color_id(&mut self, rgb: [u8; 3]) {
        self.events.push(BackendEvent::ColorId(rgb));
    }

    fn apply_state(&mut self, change: StateChange) -> StateChange {
        self.events.push(BackendEvent::State(change));
        let previous = self.current(change);
        self.state.retain(|c| !c.same_kind(&change));
        self.state.push(change);
        previous
    }

    fn draw(&mut self, call: DrawCall) {
        self.events.push(BackendEvent::Draw(call));
    }
}

/// Geometry with a fixed local box. Its draw calls report the current LOD
/// level as `lod_index`.
pub struct TestGeometry {
    id: GeometryId,
    bounds: BoundingBox,
    pub lod: i32,
    pub vertex_transforms: usize,
    drops: Option<Arc<AtomicUsize>>,
    releases: Option<Arc<AtomicUsize>>,
}

impl TestGeometry {
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            id: generate_id(),
            bounds,
            lod: 0,
            vertex_transforms: 0,
            drops: None,
            releases: None,
        }
    }

    /// Box centered on the origin with the given bounding sphere radius.
    pub fn with_radius(radius: f64) -> Self {
        let half = radius / 3.0_f64.sqrt();
        Self::new(BoundingBox::new(
            Point3::new(-half, -half, -half),
            Point3::new(half, half, half),
        ))
    }

    pub fn unit() -> Self {
        Self::new(BoundingBox::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        ))
    }

    pub fn with_id(mut self, id: GeometryId) -> Self {
        self.id = id;
        self
    }

    pub fn counting_drops(mut self, drops: Arc<AtomicUsize>) -> Self {
        self.drops = Some(drops);
        self
    }

    pub fn counting_releases(mut self, releases: Arc<AtomicUsize>) -> Self {
        self.releases = Some(releases);
        self
    }

    pub fn boxed(self) -> Box<dyn Geometry> {
        Box::new(self)
    }
}

impl Drop for TestGeometry {
    fn drop(&mut self) {
        if let Some(drops) = &self.drops {
            drops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Geometry for TestGeometry {
    fn id(&self) -> GeometryId {
        self.id
    }

    fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    fn set_current_lod(&mut self, level: i32) {
        self.lod = level;
    }

    fn render(&self, properties: &RenderProperties, backend: &mut dyn RenderBackend) {
        backend.draw(DrawCall {
            geometry: self.id,
            body_index: properties.current_body_index(),
            lod_index: self.lod.max(0) as usize,
            element_count: 0,
            mode: properties.rendering_mode(),
            flag: properties.rendering_flag(),
        });
    }

    fn transform_vertices(&mut self, matrix: &Transform) {
        self.bounds.transform(matrix);
        self.vertex_transforms += 1;
    }

    fn release_gpu_resources(&mut self) {
        if let Some(releases) = &self.releases {
            releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn clone_geometry(&self) -> Box<dyn Geometry> {
        Box::new(TestGeometry {
            id: generate_id(),
            bounds: self.bounds,
            lod: self.lod,
            vertex_transforms: self.vertex_transforms,
            drops: None,
            releases: None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedViewport {
    pub eye: Point3<f64>,
    pub tangent: f64,
    pub static_ratio: f64,
    pub dynamic_ratio: f64,
}

impl FixedViewport {
    /// Camera `distance` units in front of the origin along +Z.
    pub fn at_distance(distance: f64, tangent: f64) -> Self {
        Self {
            eye: Point3::new(0.0, 0.0, distance),
            tangent,
            static_ratio: 0.0,
            dynamic_ratio: 0.0,
        }
    }

    pub fn with_ratios(mut self, static_ratio: f64, dynamic_ratio: f64) -> Self {
        self.static_ratio = static_ratio;
        self.dynamic_ratio = dynamic_ratio;
        self
    }
}

impl Viewport for FixedViewport {
    fn eye(&self) -> Point3<f64> {
        self.eye
    }

    fn view_tangent(&self) -> f64 {
        self.tangent
    }

    fn minimum_static_pixel_culling_ratio(&self) -> f64 {
        self.static_ratio
    }

    fn minimum_dynamic_pixel_culling_ratio(&self) -> f64 {
        self.dynamic_ratio
    }
}
