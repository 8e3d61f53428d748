use crate::common::Transform;
use crate::geometry::Representation;
use crate::id::{generate_id, Uid};

/// Identifier of an occurrence. Also the id of the view instance drawing it.
pub type OccurrenceId = Uid;

/// Identifier of a placement of a reference.
pub type StructInstanceId = Uid;

/// Identifier of a part or assembly definition.
pub type ReferenceId = Uid;

/// A part or assembly definition. Parts carry a representation; assemblies
/// only group other occurrences.
#[derive(Debug, Clone)]
pub struct StructReference {
    id: ReferenceId,
    name: String,
    representation: Option<Representation>,
}

impl StructReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            representation: None,
        }
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = Some(representation);
        self
    }

    pub fn id(&self) -> ReferenceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_representation(&self) -> bool {
        self.representation.is_some()
    }

    /// True when there is no representation or it has no body.
    pub fn representation_is_empty(&self) -> bool {
        self.representation
            .as_ref()
            .map_or(true, Representation::is_empty)
    }

    pub fn representation(&self) -> Option<&Representation> {
        self.representation.as_ref()
    }
}

/// A reference placed relative to its parent occurrence.
#[derive(Debug, Clone)]
pub struct StructInstance {
    id: StructInstanceId,
    name: String,
    reference: ReferenceId,
    relative_matrix: Transform,
}

impl StructInstance {
    pub fn new(reference: ReferenceId, relative_matrix: Transform) -> Self {
        Self {
            id: generate_id(),
            name: String::new(),
            reference,
            relative_matrix,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> StructInstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> ReferenceId {
        self.reference
    }

    pub fn relative_matrix(&self) -> &Transform {
        &self.relative_matrix
    }

    pub(super) fn set_relative_matrix(&mut self, matrix: Transform) {
        self.relative_matrix = matrix;
    }

    /// Copy under a new id, placing the same reference.
    pub(super) fn duplicate(&self) -> Self {
        Self {
            id: generate_id(),
            ..self.clone()
        }
    }
}

/// A node of the assembly tree.
///
/// Children are owned by the world arena; the parent link is a plain id
/// used for lookups only.
#[derive(Debug, Clone)]
pub struct Occurrence {
    id: OccurrenceId,
    parent: Option<OccurrenceId>,
    children: Vec<OccurrenceId>,
    instance: StructInstanceId,
    absolute_matrix: Transform,
}

impl Occurrence {
    pub(super) fn new(
        id: OccurrenceId,
        parent: Option<OccurrenceId>,
        instance: StructInstanceId,
    ) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            instance,
            absolute_matrix: Transform::identity(),
        }
    }

    pub fn id(&self) -> OccurrenceId {
        self.id
    }

    pub fn parent(&self) -> Option<OccurrenceId> {
        self.parent
    }

    pub fn children(&self) -> &[OccurrenceId] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn struct_instance(&self) -> StructInstanceId {
        self.instance
    }

    pub fn absolute_matrix(&self) -> &Transform {
        &self.absolute_matrix
    }

    pub(super) fn set_absolute_matrix(&mut self, matrix: Transform) {
        self.absolute_matrix = matrix;
    }

    pub(super) fn add_child(&mut self, child: OccurrenceId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(super) fn remove_child(&mut self, child: OccurrenceId) {
        self.children.retain(|&id| id != child);
    }
}
