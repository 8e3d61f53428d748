//! Scoped backend state owned by each instance.
//!
//! A [`RenderState`] is a list of state changes. [`RenderState::modify`]
//! applies them and returns a [`StateScope`] that puts every touched state
//! back when it goes out of scope, together with any matrix push or winding
//! flip made through it.

use crate::common::Transform;
use crate::render::{RenderBackend, Winding};

/// A single piece of backend state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateChange {
    DepthTest(bool),
    Blending(bool),
    FaceCulling(bool),
    LineWidth(f32),
    /// Polygon offset `(factor, units)`, or disabled.
    PolygonOffset(Option<(f32, f32)>),
}

impl StateChange {
    /// True if both values describe the same kind of state.
    pub fn same_kind(&self, other: &StateChange) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// State an instance applies around its draw.
///
/// Cloning produces an independent copy, never a shared one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    changes: Vec<StateChange>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a change, replacing an earlier change of the same kind.
    pub fn with(mut self, change: StateChange) -> Self {
        self.set(change);
        self
    }

    pub fn set(&mut self, change: StateChange) {
        match self.changes.iter_mut().find(|c| c.same_kind(&change)) {
            Some(existing) => *existing = change,
            None => self.changes.push(change),
        }
    }

    pub fn changes(&self) -> &[StateChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Applies this state and returns a guard restoring it on drop.
    pub fn modify<'a>(&self, backend: &'a mut dyn RenderBackend) -> StateScope<'a> {
        let saved = self
            .changes
            .iter()
            .map(|&change| backend.apply_state(change))
            .collect();

        StateScope {
            backend,
            saved,
            pushed_matrices: 0,
            flipped: false,
        }
    }
}

/// Guard returned by [`RenderState::modify`].
///
/// On drop it pops pushed matrices, restores counter-clockwise winding if it
/// was flipped, then restores saved states in reverse order.
pub struct StateScope<'a> {
    backend: &'a mut dyn RenderBackend,
    saved: Vec<StateChange>,
    pushed_matrices: usize,
    flipped: bool,
}

impl StateScope<'_> {
    pub fn backend(&mut self) -> &mut dyn RenderBackend {
        &mut *self.backend
    }

    pub fn push_matrix(&mut self, matrix: &Transform) {
        self.backend.push_matrix(matrix);
        self.pushed_matrices += 1;
    }

    /// Treats clockwise triangles as front facing until the scope ends.
    pub fn flip_front_face(&mut self) {
        if !self.flipped {
            self.backend.set_front_face(Winding::Clockwise);
            self.flipped = true;
        }
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        for _ in 0..self.pushed_matrices {
            self.backend.pop_matrix();
        }
        if self.flipped {
            self.backend.set_front_face(Winding::CounterClockwise);
        }
        while let Some(previous) = self.saved.pop() {
            self.backend.apply_state(previous);
        }
    }
}
