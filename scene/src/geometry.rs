//! Bodies and the representations that group them.
//!
//! A [`Geometry`] is one drawable body. A [`Representation`] is the ordered
//! body list an instance draws; cloning it shares the list, so several
//! instances can place the same bodies under different matrices.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{BoundingBox, Transform};
use crate::id::Uid;
use crate::render::{RenderBackend, RenderProperties};

pub type GeometryId = Uid;

/// A drawable body.
///
/// Implementations own their vertex data and any GPU resources built from
/// it. The scene only asks for bounds, picks a detail level, and tells the
/// body when to draw.
pub trait Geometry: Send + Sync {
    fn id(&self) -> GeometryId;

    fn name(&self) -> Option<&str> {
        None
    }

    /// Bounds in the body's local space.
    fn bounding_box(&self) -> BoundingBox;

    /// Detail level for the next draw, 0 (finest) to 100 (coarsest).
    fn set_current_lod(&mut self, level: i32);

    /// Draws the body with whatever state the backend currently holds.
    fn render(&self, properties: &RenderProperties, backend: &mut dyn RenderBackend);

    /// Rewrites raw vertex coordinates in place.
    fn transform_vertices(&mut self, matrix: &Transform);

    /// Builds the wire overlay of sharp edges. `angle` is in radians.
    fn create_sharp_edges(&mut self, _precision: f64, _angle: f64) {}

    /// Drops buffers uploaded for this body. Called when the owning graph is
    /// cleared; the body rebuilds them lazily on its next draw.
    fn release_gpu_resources(&mut self) {}

    /// Independent copy of this body with a fresh id.
    fn clone_geometry(&self) -> Box<dyn Geometry>;
}

type Bodies = Vec<Box<dyn Geometry>>;

#[derive(Default)]
struct SharedBodies {
    bodies: RwLock<Bodies>,
    /// Bumped on every write that may move or add vertices.
    generation: AtomicU64,
}

/// Ordered list of bodies, shared between clones.
///
/// Every holder sees the same [`generation`](Self::generation), so caches
/// derived from the bodies can tell when another holder changed them.
#[derive(Clone, Default)]
pub struct Representation {
    name: String,
    shared: Arc<SharedBodies>,
}

impl Representation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_geometry(geometry: Box<dyn Geometry>) -> Self {
        let name = geometry.name().unwrap_or_default().to_string();
        Self::from_bodies(name, vec![geometry])
    }

    fn from_bodies(name: String, bodies: Bodies) -> Self {
        Self {
            name,
            shared: Arc::new(SharedBodies {
                bodies: RwLock::new(bodies),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.bodies().is_empty()
    }

    pub fn body_count(&self) -> usize {
        self.bodies().len()
    }

    pub fn contains(&self, id: GeometryId) -> bool {
        self.bodies().iter().any(|body| body.id() == id)
    }

    /// Appends a body. Returns false, leaving the list unchanged, if a body
    /// with the same id is already present.
    pub fn add_body(&self, body: Box<dyn Geometry>) -> bool {
        let mut bodies = self.bodies_mut();
        if bodies.iter().any(|existing| existing.id() == body.id()) {
            return false;
        }
        bodies.push(body);
        true
    }

    pub fn body_ids(&self) -> Vec<GeometryId> {
        self.bodies().iter().map(|body| body.id()).collect()
    }

    pub fn bodies(&self) -> RwLockReadGuard<'_, Bodies> {
        self.shared
            .bodies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access to the bodies. Counts as a change for every holder.
    pub fn bodies_mut(&self) -> RwLockWriteGuard<'_, Bodies> {
        let bodies = self.write_bodies();
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        bodies
    }

    /// Write access for per-draw state (current LOD) that leaves vertices
    /// and bounds alone.
    pub(crate) fn bodies_for_draw(&self) -> RwLockWriteGuard<'_, Bodies> {
        self.write_bodies()
    }

    fn write_bodies(&self) -> RwLockWriteGuard<'_, Bodies> {
        self.shared
            .bodies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of write accesses so far, shared by all holders.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Combined local bounds of every body.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        for body in self.bodies().iter() {
            bounds.combine(&body.bounding_box());
        }
        bounds
    }

    /// Copy with its own bodies, each cloned with a fresh id.
    pub fn deep_copy(&self) -> Self {
        let bodies = self.bodies().iter().map(|body| body.clone_geometry()).collect();
        Self::from_bodies(self.name.clone(), bodies)
    }

    pub fn shares_bodies_with(&self, other: &Representation) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Number of representations sharing this body list.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Stable key of the shared body list, for visiting each list once.
    pub(crate) fn identity_key(&self) -> usize {
        Arc::as_ptr(&self.shared) as *const () as usize
    }
}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Representation")
            .field("name", &self.name)
            .field("bodies", &self.body_ids())
            .finish()
    }
}
