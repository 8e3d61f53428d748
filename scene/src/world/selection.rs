//! Selected occurrences and the events that change them.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;

use super::occurrence::OccurrenceId;
use crate::geometry::GeometryId;

bitflags! {
    /// How a [`SelectionEvent`] combines with the current selection.
    ///
    /// `ADD | REMOVE` toggles each listed occurrence.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SelectionModes: u32 {
        /// Drop the current selection first
        const REPLACE = 1 << 0;
        const ADD = 1 << 1;
        const REMOVE = 1 << 2;
    }
}

/// A batch of occurrences, optionally narrowed to some of their bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    modes: SelectionModes,
    entries: Vec<(OccurrenceId, Vec<GeometryId>)>,
}

impl SelectionEvent {
    pub fn new(modes: SelectionModes) -> Self {
        Self {
            modes,
            entries: Vec::new(),
        }
    }

    pub fn with_occurrence(mut self, occurrence: OccurrenceId) -> Self {
        self.entries.push((occurrence, Vec::new()));
        self
    }

    pub fn with_bodies(mut self, occurrence: OccurrenceId, bodies: Vec<GeometryId>) -> Self {
        self.entries.push((occurrence, bodies));
        self
    }

    pub fn modes(&self) -> SelectionModes {
        self.modes
    }

    pub fn entries(&self) -> &[(OccurrenceId, Vec<GeometryId>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Selected occurrences in order of selection.
///
/// Each occurrence may list the bodies picked in it; an empty list means
/// the whole occurrence.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    selected: HashSet<OccurrenceId>,
    selection_order: Vec<OccurrenceId>,
    bodies: HashMap<OccurrenceId, Vec<GeometryId>>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn contains(&self, occurrence: OccurrenceId) -> bool {
        self.selected.contains(&occurrence)
    }

    pub fn occurrences(&self) -> &[OccurrenceId] {
        &self.selection_order
    }

    /// Bodies picked in `occurrence`, empty when the whole occurrence is.
    pub fn bodies(&self, occurrence: OccurrenceId) -> &[GeometryId] {
        self.bodies.get(&occurrence).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Adds an occurrence, merging `bodies` into any already picked.
    /// Returns true if the occurrence was not selected before.
    pub fn insert(&mut self, occurrence: OccurrenceId, bodies: &[GeometryId]) -> bool {
        let added = self.selected.insert(occurrence);
        if added {
            self.selection_order.push(occurrence);
        }
        let picked = self.bodies.entry(occurrence).or_default();
        for &body in bodies {
            if !picked.contains(&body) {
                picked.push(body);
            }
        }
        added
    }

    pub fn remove(&mut self, occurrence: OccurrenceId) -> bool {
        if !self.selected.remove(&occurrence) {
            return false;
        }
        self.selection_order.retain(|&id| id != occurrence);
        self.bodies.remove(&occurrence);
        true
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.selection_order.clear();
        self.bodies.clear();
    }
}
