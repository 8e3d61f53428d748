use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::bail;

use super::occurrence::{
    Occurrence, OccurrenceId, ReferenceId, StructInstance, StructInstanceId, StructReference,
};
use super::selection::{SelectionEvent, SelectionModes, SelectionSet};
use crate::common::{BoundingBox, Transform};
use crate::geometry::Representation;
use crate::id::generate_id;
use crate::instance::{InstanceId, ViewInstance, Viewable};
use crate::render::{RenderBackend, RenderFlag, RenderSettings};
use crate::viewport::Viewport;

/// The occurrence tree of a world, with its references, placements, view
/// instances and selection.
///
/// Every occurrence whose reference has bodies gets a [`ViewInstance`]
/// with the occurrence's id, placed at the occurrence's absolute matrix.
pub struct WorldHandle {
    root: OccurrenceId,
    occurrences: HashMap<OccurrenceId, Occurrence>,
    struct_instances: HashMap<StructInstanceId, StructInstance>,
    references: HashMap<ReferenceId, StructReference>,
    view_instances: HashMap<InstanceId, ViewInstance>,
    selection: SelectionSet,
}

impl Default for WorldHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldHandle {
    /// Creates a graph holding only an empty root assembly.
    pub fn new() -> Self {
        let mut handle = Self {
            root: 0,
            occurrences: HashMap::new(),
            struct_instances: HashMap::new(),
            references: HashMap::new(),
            view_instances: HashMap::new(),
            selection: SelectionSet::new(),
        };
        handle.root = handle.insert_root();
        handle
    }

    fn insert_root(&mut self) -> OccurrenceId {
        let reference = StructReference::new("Root");
        let instance = StructInstance::new(reference.id(), Transform::identity());
        let id = generate_id();

        self.occurrences
            .insert(id, Occurrence::new(id, None, instance.id()));
        self.struct_instances.insert(instance.id(), instance);
        self.references.insert(reference.id(), reference);
        id
    }

    // ===== Queries =====

    pub fn root(&self) -> OccurrenceId {
        self.root
    }

    pub fn occurrence(&self, id: OccurrenceId) -> Option<&Occurrence> {
        self.occurrences.get(&id)
    }

    pub fn struct_instance(&self, id: StructInstanceId) -> Option<&StructInstance> {
        self.struct_instances.get(&id)
    }

    pub fn reference(&self, id: ReferenceId) -> Option<&StructReference> {
        self.references.get(&id)
    }

    pub fn view_instance(&self, id: InstanceId) -> Option<&ViewInstance> {
        self.view_instances.get(&id)
    }

    pub fn view_instance_mut(&mut self, id: InstanceId) -> Option<&mut ViewInstance> {
        self.view_instances.get_mut(&id)
    }

    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    pub fn struct_instance_count(&self) -> usize {
        self.struct_instances.len()
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    pub fn view_instance_count(&self) -> usize {
        self.view_instances.len()
    }

    pub fn view_instances(&self) -> impl Iterator<Item = &ViewInstance> {
        self.view_instances.values()
    }

    pub fn references(&self) -> impl Iterator<Item = &StructReference> {
        self.references.values()
    }

    /// Children of `id`, empty for unknown occurrences.
    pub fn children(&self, id: OccurrenceId) -> &[OccurrenceId] {
        self.occurrences
            .get(&id)
            .map(Occurrence::children)
            .unwrap_or(&[])
    }

    /// Parent, grandparent and so on up to the root.
    pub fn ancestors(&self, id: OccurrenceId) -> Vec<OccurrenceId> {
        let mut ancestors = Vec::new();
        let mut current = self.occurrences.get(&id).and_then(Occurrence::parent);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.occurrences.get(&parent).and_then(Occurrence::parent);
        }
        ancestors
    }

    /// World-space bounds of every visible view instance.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        for view in self.view_instances.values().filter(|v| v.is_visible()) {
            bounds.combine(&view.bounding_box());
        }
        bounds
    }

    // ===== Building the graph =====

    /// Registers a reference. A reference already present under the same id
    /// is kept.
    pub fn add_reference(&mut self, reference: StructReference) -> ReferenceId {
        let id = reference.id();
        self.references.entry(id).or_insert(reference);
        id
    }

    pub fn add_struct_instance(
        &mut self,
        instance: StructInstance,
    ) -> anyhow::Result<StructInstanceId> {
        if !self.references.contains_key(&instance.reference()) {
            bail!(
                "Reference with ID {} not found in world",
                instance.reference()
            );
        }
        let id = instance.id();
        self.struct_instances.insert(id, instance);
        Ok(id)
    }

    /// Places `instance` under `parent`.
    ///
    /// # Errors
    /// Returns an error if the parent occurrence or the instance doesn't exist.
    pub fn add_occurrence(
        &mut self,
        parent: OccurrenceId,
        instance: StructInstanceId,
    ) -> anyhow::Result<OccurrenceId> {
        if !self.occurrences.contains_key(&parent) {
            bail!("Parent occurrence with ID {} not found in world", parent);
        }
        if !self.struct_instances.contains_key(&instance) {
            bail!("Struct instance with ID {} not found in world", instance);
        }
        Ok(self.insert_occurrence(parent, instance))
    }

    /// Adds a part made of `representation` under `parent`.
    pub fn add_part(
        &mut self,
        parent: OccurrenceId,
        name: &str,
        representation: Representation,
        matrix: Transform,
    ) -> anyhow::Result<OccurrenceId> {
        let reference = StructReference::new(name).with_representation(representation);
        self.add_reference_occurrence(parent, reference, matrix)
    }

    /// Adds an empty assembly under `parent`.
    pub fn add_assembly(
        &mut self,
        parent: OccurrenceId,
        name: &str,
        matrix: Transform,
    ) -> anyhow::Result<OccurrenceId> {
        self.add_reference_occurrence(parent, StructReference::new(name), matrix)
    }

    /// Places an existing reference once more under `parent`.
    pub fn add_instance_of(
        &mut self,
        parent: OccurrenceId,
        reference: ReferenceId,
        matrix: Transform,
    ) -> anyhow::Result<OccurrenceId> {
        if !self.occurrences.contains_key(&parent) {
            bail!("Parent occurrence with ID {} not found in world", parent);
        }
        let instance = self.add_struct_instance(StructInstance::new(reference, matrix))?;
        Ok(self.insert_occurrence(parent, instance))
    }

    fn add_reference_occurrence(
        &mut self,
        parent: OccurrenceId,
        reference: StructReference,
        matrix: Transform,
    ) -> anyhow::Result<OccurrenceId> {
        if !self.occurrences.contains_key(&parent) {
            bail!("Parent occurrence with ID {} not found in world", parent);
        }
        let name = reference.name().to_string();
        let reference = self.add_reference(reference);
        let instance = StructInstance::new(reference, matrix).with_name(name);
        let instance = self.add_struct_instance(instance)?;
        Ok(self.insert_occurrence(parent, instance))
    }

    /// Inserts an occurrence for a known parent and instance.
    fn insert_occurrence(&mut self, parent: OccurrenceId, instance: StructInstanceId) -> OccurrenceId {
        let id = generate_id();
        let relative = self
            .struct_instances
            .get(&instance)
            .map(|i| *i.relative_matrix())
            .unwrap_or_default();
        let absolute = match self.occurrences.get(&parent) {
            Some(parent) => parent.absolute_matrix() * &relative,
            None => relative,
        };

        let mut occurrence = Occurrence::new(id, Some(parent), instance);
        occurrence.set_absolute_matrix(absolute);
        self.occurrences.insert(id, occurrence);
        if let Some(parent) = self.occurrences.get_mut(&parent) {
            parent.add_child(id);
        }

        let representation = self
            .struct_instances
            .get(&instance)
            .and_then(|i| self.references.get(&i.reference()))
            .filter(|r| !r.representation_is_empty())
            .and_then(StructReference::representation)
            .cloned();
        if let Some(representation) = representation {
            let mut view = ViewInstance::with_id(id, representation);
            view.set_matrix(absolute);
            self.view_instances.insert(id, view);
        }
        id
    }

    /// Changes the placement of a struct instance and moves every occurrence
    /// of it, with their subtrees.
    pub fn set_relative_matrix(
        &mut self,
        instance: StructInstanceId,
        matrix: Transform,
    ) -> anyhow::Result<()> {
        let Some(target) = self.struct_instances.get_mut(&instance) else {
            bail!("Struct instance with ID {} not found in world", instance);
        };
        target.set_relative_matrix(matrix);

        let moved: Vec<OccurrenceId> = self
            .occurrences
            .values()
            .filter(|o| o.struct_instance() == instance)
            .map(Occurrence::id)
            .collect();
        for id in moved {
            self.update_children_absolute_matrix(id);
        }
        Ok(())
    }

    /// Recomputes the absolute matrix of `from` and all its descendants,
    /// and moves their view instances.
    pub fn update_children_absolute_matrix(&mut self, from: OccurrenceId) {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(occurrence) = self.occurrences.get(&id) else {
                continue;
            };
            let relative = self
                .struct_instances
                .get(&occurrence.struct_instance())
                .map(|i| *i.relative_matrix())
                .unwrap_or_default();
            let absolute = match occurrence.parent().and_then(|p| self.occurrences.get(&p)) {
                Some(parent) => parent.absolute_matrix() * &relative,
                None => relative,
            };
            stack.extend_from_slice(occurrence.children());

            if let Some(occurrence) = self.occurrences.get_mut(&id) {
                occurrence.set_absolute_matrix(absolute);
            }
            if let Some(view) = self.view_instances.get_mut(&id) {
                view.set_matrix(absolute);
            }
        }
    }

    /// Removes an occurrence and its subtree. Placements and references no
    /// longer used by any occurrence go with them.
    ///
    /// # Errors
    /// Returns an error for the root or an unknown occurrence.
    pub fn remove_occurrence(&mut self, id: OccurrenceId) -> anyhow::Result<()> {
        if id == self.root {
            bail!("The root occurrence cannot be removed");
        }
        let Some(occurrence) = self.occurrences.get(&id) else {
            bail!("Occurrence with ID {} not found in world", id);
        };
        let parent = occurrence.parent();

        let mut subtree = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(occurrence) = self.occurrences.get(&current) {
                stack.extend_from_slice(occurrence.children());
                subtree.push(current);
            }
        }

        if let Some(parent) = parent.and_then(|p| self.occurrences.get_mut(&p)) {
            parent.remove_child(id);
        }

        let mut released_instances = Vec::new();
        for occurrence_id in &subtree {
            if let Some(occurrence) = self.occurrences.remove(occurrence_id) {
                released_instances.push(occurrence.struct_instance());
            }
            self.view_instances.remove(occurrence_id);
            self.selection.remove(*occurrence_id);
        }
        self.drop_unused(released_instances);

        log::debug!("Removed {} occurrences", subtree.len());
        Ok(())
    }

    fn drop_unused(&mut self, instances: Vec<StructInstanceId>) {
        let used_instances: HashSet<StructInstanceId> = self
            .occurrences
            .values()
            .map(Occurrence::struct_instance)
            .collect();

        let mut candidates = HashSet::new();
        for instance in instances {
            if used_instances.contains(&instance) {
                continue;
            }
            if let Some(removed) = self.struct_instances.remove(&instance) {
                candidates.insert(removed.reference());
            }
        }

        let used_references: HashSet<ReferenceId> = self
            .struct_instances
            .values()
            .map(StructInstance::reference)
            .collect();
        for reference in candidates {
            if !used_references.contains(&reference) {
                self.references.remove(&reference);
            }
        }
    }

    // ===== Whole-graph operations =====

    /// Copies the content of `other` under this graph's root.
    ///
    /// The children of the other root are copied, or the other root itself
    /// when it has none. References are shared by id; placements and
    /// occurrences get new ids. Returns the top occurrences added.
    pub fn merge(&mut self, other: &WorldHandle) -> Vec<OccurrenceId> {
        let sources = match other.occurrence(other.root) {
            Some(root) if root.child_count() > 0 => root.children().to_vec(),
            _ => vec![other.root],
        };

        let root = self.root;
        let added: Vec<OccurrenceId> = sources
            .into_iter()
            .filter_map(|source| self.copy_subtree(other, source, root))
            .collect();
        self.update_children_absolute_matrix(root);

        log::debug!(
            "Merged {} occurrences into world, now {}",
            added.len(),
            self.occurrences.len()
        );
        added
    }

    fn copy_subtree(
        &mut self,
        other: &WorldHandle,
        source: OccurrenceId,
        parent: OccurrenceId,
    ) -> Option<OccurrenceId> {
        let mut top = None;
        let mut queue = VecDeque::from([(source, parent)]);

        while let Some((source, parent)) = queue.pop_front() {
            let Some(occurrence) = other.occurrences.get(&source) else {
                continue;
            };
            let Some(instance) = other.struct_instances.get(&occurrence.struct_instance()) else {
                continue;
            };
            let Some(reference) = other.references.get(&instance.reference()) else {
                continue;
            };

            self.add_reference(reference.clone());
            let copy = instance.duplicate();
            let copy_id = copy.id();
            self.struct_instances.insert(copy_id, copy);

            let id = self.insert_occurrence(parent, copy_id);
            if let (Some(source_view), Some(view)) =
                (other.view_instances.get(&source), self.view_instances.get_mut(&id))
            {
                view.copy_display_from(source_view);
                view.set_selected(false);
            }

            top.get_or_insert(id);
            queue.extend(occurrence.children().iter().map(|&child| (child, id)));
        }
        top
    }

    /// Scales the whole model by `factor`.
    ///
    /// Placements keep their linear block and get a scaled translation;
    /// body vertices are scaled once per representation.
    pub fn set_unit_factor(&mut self, factor: f64) {
        let scale = Transform::from_uniform_scale(factor);

        for instance in self.struct_instances.values_mut() {
            let base = *instance.relative_matrix();
            instance.set_relative_matrix(base.with_translation(base.translation() * factor));
        }

        let representations = self.unique_representations();
        for representation in &representations {
            for body in representation.bodies_mut().iter_mut() {
                body.transform_vertices(&scale);
            }
        }

        self.update_children_absolute_matrix(self.root);
        log::debug!(
            "Applied unit factor {} to {} representations",
            factor,
            representations.len()
        );
    }

    /// Builds sharp edge overlays on every body. `angle` is in degrees.
    pub fn create_sharp_edges(&mut self, precision: f64, angle: f64) {
        let angle = angle.to_radians();
        for representation in self.unique_representations() {
            for body in representation.bodies_mut().iter_mut() {
                body.create_sharp_edges(precision, angle);
            }
        }
    }

    /// Representations of all references, each body list once, in
    /// reference id order.
    fn unique_representations(&self) -> Vec<Representation> {
        let mut references: Vec<&StructReference> = self
            .references
            .values()
            .filter(|r| !r.representation_is_empty())
            .collect();
        references.sort_by_key(|r| r.id());

        let mut seen = HashSet::new();
        references
            .into_iter()
            .filter_map(StructReference::representation)
            .filter(|r| seen.insert(r.identity_key()))
            .cloned()
            .collect()
    }

    /// Empties the graph down to a fresh root.
    ///
    /// Bodies not shared outside this graph are asked to release their GPU
    /// resources first.
    pub fn clear(&mut self) {
        let mut holders: HashMap<usize, usize> = HashMap::new();
        for representation in self.held_representations() {
            *holders.entry(representation.identity_key()).or_default() += 1;
        }

        let mut released = HashSet::new();
        for representation in self.held_representations() {
            let key = representation.identity_key();
            let local = holders.get(&key).copied().unwrap_or_default();
            if released.insert(key) && representation.share_count() == local {
                for body in representation.bodies_mut().iter_mut() {
                    body.release_gpu_resources();
                }
            }
        }

        log::debug!("Clearing world with {} occurrences", self.occurrences.len());
        self.occurrences.clear();
        self.struct_instances.clear();
        self.references.clear();
        self.view_instances.clear();
        self.selection.clear();
        self.root = self.insert_root();
    }

    fn held_representations(&self) -> impl Iterator<Item = &Representation> {
        self.references
            .values()
            .filter_map(StructReference::representation)
            .chain(self.view_instances.values().map(ViewInstance::representation))
    }

    // ===== Selection =====

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn is_selected(&self, id: OccurrenceId) -> bool {
        self.selection.contains(id)
    }

    /// Selects `id`. Returns false if it is unknown or already selected.
    pub fn select(&mut self, id: OccurrenceId) -> bool {
        if !self.occurrences.contains_key(&id) {
            return false;
        }
        let added = self.selection.insert(id, &[]);
        self.sync_selected(id);
        added
    }

    pub fn unselect(&mut self, id: OccurrenceId) -> bool {
        let removed = self.selection.remove(id);
        self.sync_selected(id);
        removed
    }

    pub fn unselect_all(&mut self) {
        let previous = self.selection.occurrences().to_vec();
        self.selection.clear();
        for id in previous {
            self.sync_selected(id);
        }
    }

    /// Applies a selection event.
    ///
    /// Unknown occurrences in the event are skipped.
    pub fn update_selection(&mut self, event: &SelectionEvent) {
        let modes = event.modes();
        let toggle = modes.contains(SelectionModes::ADD | SelectionModes::REMOVE);

        let mut touched = Vec::new();
        if modes.contains(SelectionModes::REPLACE) {
            touched.extend_from_slice(self.selection.occurrences());
            self.selection.clear();
        }

        for (id, bodies) in event.entries() {
            let id = *id;
            if !self.occurrences.contains_key(&id) {
                log::warn!("Ignoring selection of unknown occurrence {}", id);
                continue;
            }
            if toggle {
                if !self.selection.remove(id) {
                    self.selection.insert(id, bodies);
                }
            } else if modes.contains(SelectionModes::REMOVE) {
                self.selection.remove(id);
            } else {
                self.selection.insert(id, bodies);
            }
            touched.push(id);
        }

        for id in touched {
            self.sync_selected(id);
        }
    }

    fn sync_selected(&mut self, id: OccurrenceId) {
        let selected = self.selection.contains(id);
        if let Some(view) = self.view_instances.get_mut(&id) {
            view.set_selected(selected);
        }
    }

    /// Selected occurrences with no selected ancestor, in selection order.
    pub fn minimum_selected_occurrences(&self) -> Vec<OccurrenceId> {
        self.selection
            .occurrences()
            .iter()
            .copied()
            .filter(|&id| {
                !self
                    .ancestors(id)
                    .iter()
                    .any(|&ancestor| self.selection.contains(ancestor))
            })
            .collect()
    }

    // ===== Rendering =====

    /// Visible, viewable instances in draw order.
    fn drawable_instances(&self) -> Vec<InstanceId> {
        let mut drawable: Vec<&ViewInstance> = self
            .view_instances
            .values()
            .filter(|v| v.is_visible() && v.viewable() != Viewable::NotViewable)
            .collect();
        drawable.sort_by(|a, b| a.draw_order(b));
        drawable.into_iter().map(ViewInstance::id).collect()
    }

    pub fn render(
        &mut self,
        flag: RenderFlag,
        use_lod: bool,
        viewport: Option<&dyn Viewport>,
        settings: &RenderSettings,
        backend: &mut dyn RenderBackend,
    ) {
        for id in self.drawable_instances() {
            if let Some(view) = self.view_instances.get_mut(&id) {
                view.render(flag, use_lod, viewport, settings, backend);
            }
        }
    }

    /// # Panics
    /// If `settings` is not in selection mode.
    pub fn render_for_body_selection(
        &mut self,
        settings: &RenderSettings,
        backend: &mut dyn RenderBackend,
    ) {
        for id in self.drawable_instances() {
            if let Some(view) = self.view_instances.get_mut(&id) {
                view.render_for_body_selection(settings, backend);
            }
        }
    }
}

impl Drop for WorldHandle {
    fn drop(&mut self) {
        log::debug!(
            "Releasing world graph with {} occurrences",
            self.occurrences.len()
        );
    }
}
