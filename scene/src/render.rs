//! Render-facing types shared by instances and geometries.
//!
//! The scene graph never talks to a GPU API directly. Everything it draws
//! goes through a [`RenderBackend`], which an application implements on top
//! of its graphics layer.

use serde::{Deserialize, Serialize};

use crate::common::Transform;
use crate::geometry::GeometryId;
use crate::render_state::StateChange;

/// How a body should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    /// Regular shaded draw with the body's own materials.
    #[default]
    Normal,
    /// Picking pass: one flat color id per body.
    BodySelection,
    /// Picking pass: one flat color id per primitive of a single body.
    PrimitiveSelection,
}

/// Which subset of a body's primitives a pass draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderFlag {
    /// Opaque shaded primitives.
    #[default]
    Shading,
    /// Transparent primitives, drawn after opaque ones.
    Transparent,
    /// Wireframe and edge overlays.
    Wire,
}

/// Triangle winding treated as front facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    CounterClockwise,
    Clockwise,
}

/// Per-instance properties handed to each body when it renders.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderProperties {
    selectable: bool,
    selected: bool,
    rendering_mode: RenderMode,
    rendering_flag: RenderFlag,
    current_body_index: usize,
}

impl Default for RenderProperties {
    fn default() -> Self {
        Self {
            selectable: true,
            selected: false,
            rendering_mode: RenderMode::Normal,
            rendering_flag: RenderFlag::Shading,
            current_body_index: 0,
        }
    }
}

impl RenderProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selectable(&self) -> bool {
        self.selectable
    }

    pub fn set_selectable(&mut self, selectable: bool) {
        self.selectable = selectable;
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn rendering_mode(&self) -> RenderMode {
        self.rendering_mode
    }

    pub fn set_rendering_mode(&mut self, mode: RenderMode) {
        self.rendering_mode = mode;
    }

    pub fn rendering_flag(&self) -> RenderFlag {
        self.rendering_flag
    }

    pub fn set_rendering_flag(&mut self, flag: RenderFlag) {
        self.rendering_flag = flag;
    }

    /// Index, within its representation, of the body currently rendering.
    pub fn current_body_index(&self) -> usize {
        self.current_body_index
    }

    pub fn set_current_body_index(&mut self, index: usize) {
        self.current_body_index = index;
    }
}

/// Render-wide flags, set once per render context and read by every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderSettings {
    /// The current frame is a picking frame.
    pub selection_mode: bool,
    /// Bodies smaller than the viewport's minimum pixel size are skipped.
    pub pixel_culling: bool,
}

/// One body draw, as emitted to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub geometry: GeometryId,
    pub body_index: usize,
    pub lod_index: usize,
    pub element_count: usize,
    pub mode: RenderMode,
    pub flag: RenderFlag,
}

/// The graphics layer the scene draws through.
///
/// State changes report the value they replaced so callers can restore it.
pub trait RenderBackend {
    /// Pushes `matrix` on top of the current model matrix.
    fn push_matrix(&mut self, matrix: &Transform);

    /// Restores the model matrix saved by the matching `push_matrix`.
    fn pop_matrix(&mut self);

    fn set_front_face(&mut self, winding: Winding);

    /// Sets the flat color used by picking draws.
    fn set_color_id(&mut self, rgb: [u8; 3]);

    /// Applies `change` and returns the previous value of the same state.
    fn apply_state(&mut self, change: StateChange) -> StateChange;

    fn draw(&mut self, call: DrawCall);
}
