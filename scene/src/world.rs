//! The shared world: an occurrence graph behind a reference-counted handle.

mod handle;
mod occurrence;
mod selection;

#[cfg(test)]
mod world_tests;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::bail;

pub use handle::WorldHandle;
pub use occurrence::{
    Occurrence, OccurrenceId, ReferenceId, StructInstance, StructInstanceId, StructReference,
};
pub use selection::{SelectionEvent, SelectionModes, SelectionSet};

use crate::common::BoundingBox;
use crate::render::{RenderBackend, RenderFlag, RenderSettings};
use crate::viewport::Viewport;

/// Shared handle to a world graph.
///
/// Cloning shares the graph. Two worlds are equal when they share the same
/// graph. The graph is dropped with the last handle.
#[derive(Clone, Default)]
pub struct World {
    handle: Arc<RwLock<WorldHandle>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_handle(handle: WorldHandle) -> Self {
        Self {
            handle: Arc::new(RwLock::new(handle)),
        }
    }

    /// Read access to the graph.
    pub fn handle(&self) -> RwLockReadGuard<'_, WorldHandle> {
        self.handle.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access to the graph.
    pub fn handle_mut(&self) -> RwLockWriteGuard<'_, WorldHandle> {
        self.handle.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of handles sharing this graph.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.handle)
    }

    /// Drops this handle. Returns true while other handles keep the graph
    /// alive.
    pub fn release(self) -> bool {
        Arc::into_inner(self.handle).is_none()
    }

    /// Makes this handle share the graph of `other`, releasing the previous
    /// one.
    pub fn assign(&mut self, other: &World) {
        if !Arc::ptr_eq(&self.handle, &other.handle) {
            self.handle = Arc::clone(&other.handle);
        }
    }

    /// Copies the content of `other` under this world's root.
    ///
    /// Copied parts keep sharing their bodies with `other`: vertex edits made
    /// through either world (unit factor, sharp edges) show in both.
    ///
    /// Both graphs are locked in address order, so opposite merges running
    /// on two threads cannot deadlock.
    ///
    /// # Errors
    /// Returns an error when both handles share the same graph.
    pub fn merge(&self, other: &World) -> anyhow::Result<Vec<OccurrenceId>> {
        if Arc::ptr_eq(&self.handle, &other.handle) {
            bail!("A world cannot be merged into itself");
        }
        let (mut target, source) = if Arc::as_ptr(&self.handle) < Arc::as_ptr(&other.handle) {
            let target = self.handle_mut();
            (target, other.handle())
        } else {
            let source = other.handle();
            (self.handle_mut(), source)
        };
        Ok(target.merge(&source))
    }

    pub fn set_unit_factor(&self, factor: f64) {
        self.handle_mut().set_unit_factor(factor);
    }

    pub fn update_selection(&self, event: &SelectionEvent) {
        self.handle_mut().update_selection(event);
    }

    pub fn minimum_selected_occurrences(&self) -> Vec<OccurrenceId> {
        self.handle().minimum_selected_occurrences()
    }

    /// Builds sharp edge overlays on every body. `angle` is in degrees.
    pub fn create_sharp_edges(&self, precision: f64, angle: f64) {
        self.handle_mut().create_sharp_edges(precision, angle);
    }

    pub fn clear(&self) {
        self.handle_mut().clear();
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.handle().bounding_box()
    }

    pub fn render(
        &self,
        flag: RenderFlag,
        use_lod: bool,
        viewport: Option<&dyn Viewport>,
        settings: &RenderSettings,
        backend: &mut dyn RenderBackend,
    ) {
        self.handle_mut()
            .render(flag, use_lod, viewport, settings, backend);
    }

    /// # Panics
    /// If `settings` is not in selection mode.
    pub fn render_for_body_selection(
        &self,
        settings: &RenderSettings,
        backend: &mut dyn RenderBackend,
    ) {
        self.handle_mut().render_for_body_selection(settings, backend);
    }
}

impl PartialEq for World {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl Eq for World {}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handle = self.handle();
        f.debug_struct("World")
            .field("share_count", &self.share_count())
            .field("occurrences", &handle.occurrence_count())
            .field("view_instances", &handle.view_instance_count())
            .finish()
    }
}
