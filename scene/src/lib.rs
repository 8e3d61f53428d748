//! Retained-mode scene graph for CAD models.
//!
//! Models are built as a [`World`] of occurrences. Occurrences with bodies
//! are drawn through [`ViewInstance`]s, which pick a level of detail per body
//! from its on-screen size and hand draw calls to a [`RenderBackend`].

pub use cadview_common as common;

pub mod geometry;
pub mod id;
pub mod instance;
pub mod lod;
pub mod mesh;
pub mod mesh_data;
pub mod render;
pub mod render_state;
pub mod viewport;
pub mod world;

#[cfg(test)]
mod test_support;

pub use geometry::{Geometry, GeometryId, Representation};
pub use instance::{InstanceId, ViewInstance, Viewable};
pub use lod::LodSelector;
pub use mesh::Mesh;
pub use mesh_data::{ChunkError, MeshData};
pub use render::{RenderBackend, RenderFlag, RenderMode, RenderSettings};
pub use render_state::RenderState;
pub use viewport::{Camera, CameraViewport, Viewport};
pub use world::{OccurrenceId, SelectionEvent, SelectionModes, World, WorldHandle};
