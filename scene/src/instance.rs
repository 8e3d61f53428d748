//! Placed, drawable views of a representation.

use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use cgmath::Vector3;

use crate::common::{BoundingBox, Orientation, Transform};
use crate::geometry::{Geometry, GeometryId, Representation};
use crate::id::{encode_rgb_id, generate_id, Uid};
use crate::lod::{clamp_lod, global_default_lod, is_culled, LodSelector};
use crate::render::{RenderBackend, RenderFlag, RenderMode, RenderProperties, RenderSettings};
use crate::render_state::RenderState;
use crate::viewport::Viewport;

/// Unique identifier for a view instance
pub type InstanceId = Uid;

/// How much of an instance lies inside the view frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewable {
    #[default]
    Full,
    Partial,
    NotViewable,
}

/// The three ways an instance can walk its bodies.
#[derive(Clone, Copy)]
enum RenderPass<'v> {
    Normal {
        flag: RenderFlag,
        use_lod: bool,
        viewport: Option<&'v dyn Viewport>,
    },
    BodySelection,
    PrimitiveSelection {
        body_id: GeometryId,
    },
}

/// World-space box together with the body generation it was computed from.
#[derive(Debug, Clone, Copy)]
struct CachedBounds {
    generation: u64,
    bounds: BoundingBox,
}

/// A representation placed in the world by an absolute matrix.
///
/// The world-space bounding box is computed on first read and cached until
/// the matrix or the body list changes. Cloning is deliberately absent: use
/// [`deep_copy`](Self::deep_copy) for independent bodies or
/// [`instanciate`](Self::instanciate) to share them.
#[derive(Debug)]
pub struct ViewInstance {
    id: InstanceId,
    color_id: [u8; 3],
    name: String,
    representation: Representation,
    absolute_matrix: Transform,
    cached_bounds: Mutex<Option<CachedBounds>>,
    body_visibility: Vec<bool>,
    render_properties: RenderProperties,
    visible: bool,
    viewable: Viewable,
    default_lod: i32,
    render_state: RenderState,
    order_weight: i32,
}

impl ViewInstance {
    /// Creates an instance with a newly generated id.
    pub fn new(representation: Representation) -> Self {
        Self::with_id(generate_id(), representation)
    }

    pub fn with_id(id: InstanceId, representation: Representation) -> Self {
        Self {
            id,
            color_id: encode_rgb_id(id),
            name: representation.name().to_string(),
            representation,
            absolute_matrix: Transform::identity(),
            cached_bounds: Mutex::new(None),
            body_visibility: Vec::new(),
            render_properties: RenderProperties::new(),
            visible: true,
            viewable: Viewable::Full,
            default_lod: global_default_lod(),
            render_state: RenderState::new(),
            order_weight: 0,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Picking color of this instance.
    pub fn color_id(&self) -> [u8; 3] {
        self.color_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    pub fn body_count(&self) -> usize {
        self.representation.body_count()
    }

    /// Adds a body to the (possibly shared) representation.
    /// Returns false if a body with the same id is already there.
    pub fn add_geometry(&mut self, geometry: Box<dyn Geometry>) -> bool {
        let added = self.representation.add_body(geometry);
        if added {
            self.invalidate_bounds();
        }
        added
    }

    // ===== Placement =====

    pub fn matrix(&self) -> &Transform {
        &self.absolute_matrix
    }

    pub fn translate(&mut self, offset: Vector3<f64>) -> &mut Self {
        self.mult_matrix(&Transform::from_translation(offset))
    }

    /// Applies `matrix` on top of the current placement.
    pub fn mult_matrix(&mut self, matrix: &Transform) -> &mut Self {
        self.absolute_matrix = matrix * &self.absolute_matrix;
        self.invalidate_bounds();
        self
    }

    pub fn set_matrix(&mut self, matrix: Transform) -> &mut Self {
        self.absolute_matrix = matrix;
        self.invalidate_bounds();
        self
    }

    pub fn reset_matrix(&mut self) -> &mut Self {
        self.set_matrix(Transform::identity())
    }

    // ===== Bounds =====

    /// World-space bounds of every body.
    ///
    /// An empty representation yields an empty box that is not cached.
    pub fn bounding_box(&self) -> BoundingBox {
        let generation = self.representation.generation();
        let mut cache = self.cache();
        if let Some(cached) = cache.filter(|c| c.generation == generation) {
            return cached.bounds;
        }
        if self.representation.is_empty() {
            *cache = None;
            return BoundingBox::empty();
        }

        let bounds = self
            .representation
            .bounding_box()
            .transformed(&self.absolute_matrix);
        *cache = Some(CachedBounds { generation, bounds });
        bounds
    }

    /// True when the cached box matches the current matrix and bodies.
    pub fn is_bounding_box_valid(&self) -> bool {
        let generation = self.representation.generation();
        self.cache().is_some_and(|c| c.generation == generation)
    }

    fn cache(&self) -> MutexGuard<'_, Option<CachedBounds>> {
        self.cached_bounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate_bounds(&mut self) {
        *self.cache() = None;
    }

    // ===== Copies =====

    /// Independent copy: bodies are cloned, the id is new.
    pub fn deep_copy(&self) -> Self {
        self.copy_with(self.representation.deep_copy())
    }

    /// Copy sharing this instance's bodies under a new id.
    pub fn instanciate(&self) -> Self {
        self.copy_with(self.representation.clone())
    }

    fn copy_with(&self, representation: Representation) -> Self {
        let id = generate_id();
        Self {
            id,
            color_id: encode_rgb_id(id),
            name: self.name.clone(),
            representation,
            absolute_matrix: self.absolute_matrix,
            cached_bounds: Mutex::new(*self.cache()),
            body_visibility: self.body_visibility.clone(),
            render_properties: self.render_properties.clone(),
            visible: self.visible,
            viewable: self.viewable,
            default_lod: self.default_lod,
            render_state: self.render_state.clone(),
            order_weight: self.order_weight,
        }
    }

    /// Takes over the display settings of `other`, keeping this instance's
    /// id, bodies and placement.
    pub(crate) fn copy_display_from(&mut self, other: &ViewInstance) {
        self.name = other.name.clone();
        self.body_visibility = other.body_visibility.clone();
        self.render_properties = other.render_properties.clone();
        self.visible = other.visible;
        self.viewable = other.viewable;
        self.default_lod = other.default_lod;
        self.render_state = other.render_state.clone();
        self.order_weight = other.order_weight;
    }

    // ===== Display properties =====

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn viewable(&self) -> Viewable {
        self.viewable
    }

    pub fn set_viewable(&mut self, viewable: Viewable) {
        self.viewable = viewable;
    }

    pub fn is_body_visible(&self, index: usize) -> bool {
        self.body_visibility.get(index).copied().unwrap_or(true)
    }

    /// Shows or hides one body. Out of range indices are ignored.
    pub fn set_body_visible(&mut self, index: usize, visible: bool) {
        let body_count = self.representation.body_count();
        if index >= body_count {
            return;
        }
        self.sync_body_visibility(body_count);
        self.body_visibility[index] = visible;
    }

    fn sync_body_visibility(&mut self, body_count: usize) {
        if self.body_visibility.len() != body_count {
            self.body_visibility = vec![true; body_count];
        }
    }

    pub fn render_properties(&self) -> &RenderProperties {
        &self.render_properties
    }

    pub fn render_properties_mut(&mut self) -> &mut RenderProperties {
        &mut self.render_properties
    }

    pub fn is_selectable(&self) -> bool {
        self.render_properties.selectable()
    }

    pub fn set_selectable(&mut self, selectable: bool) {
        self.render_properties.set_selectable(selectable);
    }

    pub fn is_selected(&self) -> bool {
        self.render_properties.is_selected()
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.render_properties.set_selected(selected);
    }

    pub fn default_lod(&self) -> i32 {
        self.default_lod
    }

    pub fn set_default_lod(&mut self, level: i32) {
        self.default_lod = clamp_lod(level);
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    pub fn set_render_state(&mut self, state: RenderState) {
        self.render_state = state;
    }

    pub fn order_weight(&self) -> i32 {
        self.order_weight
    }

    pub fn set_order_weight(&mut self, weight: i32) {
        self.order_weight = weight;
    }

    /// Draw order: lower weight first, ties broken by id.
    pub fn draw_order(&self, other: &ViewInstance) -> Ordering {
        (self.order_weight, self.id).cmp(&(other.order_weight, other.id))
    }

    /// Drops the cached bounds and resets the render state.
    pub fn clear(&mut self) {
        self.invalidate_bounds();
        self.render_state = RenderState::new();
    }

    // ===== Rendering =====

    /// Draws the visible bodies.
    ///
    /// With `use_lod` and a viewport, each body gets a level from its screen
    /// coverage. Otherwise bodies draw at the instance's default level,
    /// after a culling check when pixel culling is on.
    pub fn render(
        &mut self,
        flag: RenderFlag,
        use_lod: bool,
        viewport: Option<&dyn Viewport>,
        settings: &RenderSettings,
        backend: &mut dyn RenderBackend,
    ) {
        let pass = RenderPass::Normal {
            flag,
            use_lod,
            viewport,
        };
        self.traverse(pass, settings, backend);
    }

    /// Draws every body flat in its own id color.
    ///
    /// # Panics
    /// If `settings` is not in selection mode.
    pub fn render_for_body_selection(
        &mut self,
        settings: &RenderSettings,
        backend: &mut dyn RenderBackend,
    ) {
        assert!(
            settings.selection_mode,
            "body selection render outside selection mode"
        );
        self.traverse(RenderPass::BodySelection, settings, backend);
    }

    /// Draws the body `body_id` at full detail for primitive picking.
    ///
    /// Returns the index of that body, or the body count if it is not part
    /// of this instance or the instance is not selectable.
    ///
    /// # Panics
    /// If `settings` is not in selection mode.
    pub fn render_for_primitive_selection(
        &mut self,
        body_id: GeometryId,
        settings: &RenderSettings,
        backend: &mut dyn RenderBackend,
    ) -> usize {
        assert!(
            settings.selection_mode,
            "primitive selection render outside selection mode"
        );
        self.traverse(RenderPass::PrimitiveSelection { body_id }, settings, backend)
    }

    /// Walks the bodies for one pass and returns the index the walk stopped
    /// at (the body count when it ran to the end).
    fn traverse(
        &mut self,
        pass: RenderPass<'_>,
        settings: &RenderSettings,
        backend: &mut dyn RenderBackend,
    ) -> usize {
        let body_count = self.representation.body_count();
        if settings.selection_mode && !self.render_properties.selectable() {
            return body_count;
        }
        if body_count == 0 {
            return 0;
        }
        self.sync_body_visibility(body_count);

        let previous_mode = self.render_properties.rendering_mode();
        match pass {
            RenderPass::Normal { flag, .. } => self.render_properties.set_rendering_flag(flag),
            RenderPass::BodySelection => {
                self.render_properties.set_rendering_mode(RenderMode::BodySelection)
            }
            RenderPass::PrimitiveSelection { .. } => {
                self.render_properties.set_rendering_mode(RenderMode::PrimitiveSelection)
            }
        }

        let mut scope = self.render_state.modify(backend);
        scope.push_matrix(&self.absolute_matrix);
        if let RenderPass::Normal { .. } = pass {
            if self.absolute_matrix.orientation() == Orientation::Indirect {
                scope.flip_front_face();
            }
            if settings.selection_mode {
                scope.backend().set_color_id(self.color_id);
            }
        }

        let selector = LodSelector::new(self.default_lod, settings.pixel_culling);
        let mut stopped_at = body_count;
        let mut bodies = self.representation.bodies_for_draw();
        for (index, body) in bodies.iter_mut().enumerate() {
            let level = match pass {
                RenderPass::Normal {
                    use_lod, viewport, ..
                } => {
                    if !self.body_visibility[index] {
                        continue;
                    }
                    let dynamic = use_lod && viewport.is_some();
                    let level = if dynamic || (settings.pixel_culling && viewport.is_some()) {
                        selector.select(&body.bounding_box(), &self.absolute_matrix, viewport, use_lod)
                    } else {
                        0
                    };
                    if is_culled(level) {
                        log::trace!("Instance {} culled body {}", self.id, body.id());
                        continue;
                    }
                    if dynamic {
                        level
                    } else {
                        self.default_lod
                    }
                }
                RenderPass::BodySelection => {
                    scope.backend().set_color_id(encode_rgb_id(body.id()));
                    self.default_lod
                }
                RenderPass::PrimitiveSelection { body_id } => {
                    if body.id() != body_id {
                        continue;
                    }
                    stopped_at = index;
                    0
                }
            };

            body.set_current_lod(level);
            self.render_properties.set_current_body_index(index);
            body.render(&self.render_properties, scope.backend());

            if let RenderPass::PrimitiveSelection { .. } = pass {
                break;
            }
        }
        drop(bodies);
        drop(scope);

        self.render_properties.set_rendering_mode(previous_mode);
        stopped_at
    }
}
