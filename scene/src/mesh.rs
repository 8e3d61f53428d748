//! Triangle mesh body.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use cgmath::{InnerSpace, Point3, Vector3};

use crate::common::{BoundingBox, Transform};
use crate::geometry::{Geometry, GeometryId};
use crate::id::generate_id;
use crate::lod::MAX_LOD;
use crate::mesh_data::MeshData;
use crate::render::{DrawCall, RenderBackend, RenderFlag, RenderProperties};

/// A [`Geometry`] drawing one of the triangle lists of its [`MeshData`].
///
/// LOD 0 of the data is the master (finest) level. A detail level in
/// `0..=100` selects the list at `round((lod_count - 1) * level / 100)`.
#[derive(Debug)]
pub struct Mesh {
    id: GeometryId,
    name: Option<String>,
    data: MeshData,
    bounds: BoundingBox,
    current_lod: i32,
    sharp_edges: Vec<[u32; 2]>,
    uploaded: AtomicBool,
}

impl Mesh {
    pub fn new(data: MeshData) -> Self {
        let bounds = data.bounding_box();
        Self {
            id: generate_id(),
            name: None,
            data,
            bounds,
            current_lod: 0,
            sharp_edges: Vec::new(),
            uploaded: AtomicBool::new(false),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn data(&self) -> &MeshData {
        &self.data
    }

    pub fn current_lod(&self) -> i32 {
        self.current_lod
    }

    /// Index of the triangle list drawn at detail `level`.
    pub fn lod_index(&self, level: i32) -> usize {
        let count = self.data.lod_count();
        if count <= 1 {
            return 0;
        }
        let level = f64::from(level.clamp(0, MAX_LOD));
        let index = ((count - 1) as f64 * level / f64::from(MAX_LOD)).round() as usize;
        index.min(count - 1)
    }

    /// Sharp edges found by the last [`Geometry::create_sharp_edges`], as
    /// pairs of vertex indices.
    pub fn sharp_edges(&self) -> &[[u32; 2]] {
        &self.sharp_edges
    }

    /// True once the mesh has been drawn and until its GPU resources are
    /// released.
    pub fn is_uploaded(&self) -> bool {
        self.uploaded.load(Ordering::Relaxed)
    }

    /// Maps every vertex to the first vertex found within `precision` of it.
    fn merged_vertices(&self, precision: f64) -> Vec<u32> {
        let mut first_at: HashMap<[i64; 3], u32> = HashMap::new();
        let mut canonical = Vec::with_capacity(self.data.vertex_count());

        for index in 0..self.data.vertex_count() {
            let Some(point) = self.data.position(index) else {
                break;
            };
            let key = if precision > 0.0 {
                [
                    (point.x / precision).round() as i64,
                    (point.y / precision).round() as i64,
                    (point.z / precision).round() as i64,
                ]
            } else {
                [
                    point.x.to_bits() as i64,
                    point.y.to_bits() as i64,
                    point.z.to_bits() as i64,
                ]
            };
            let index = index as u32;
            canonical.push(*first_at.entry(key).or_insert(index));
        }
        canonical
    }

    fn face_normal(&self, a: u32, b: u32, c: u32) -> Option<Vector3<f64>> {
        let pa = self.data.position(a as usize)?;
        let pb = self.data.position(b as usize)?;
        let pc = self.data.position(c as usize)?;
        let normal = (pb - pa).cross(pc - pa);
        (normal.magnitude2() > 0.0).then(|| normal.normalize())
    }
}

impl Geometry for Mesh {
    fn id(&self) -> GeometryId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    fn set_current_lod(&mut self, level: i32) {
        self.current_lod = level;
    }

    fn render(&self, properties: &RenderProperties, backend: &mut dyn RenderBackend) {
        let (lod_index, element_count) = if properties.rendering_flag() == RenderFlag::Wire {
            (0, self.sharp_edges.len() * 2)
        } else {
            let index = self.lod_index(self.current_lod);
            let count = self.data.lod(index).map_or(0, |lod| lod.indices.len());
            (index, count)
        };
        if element_count == 0 {
            return;
        }

        self.uploaded.store(true, Ordering::Relaxed);
        backend.draw(DrawCall {
            geometry: self.id,
            body_index: properties.current_body_index(),
            lod_index,
            element_count,
            mode: properties.rendering_mode(),
            flag: properties.rendering_flag(),
        });
    }

    fn transform_vertices(&mut self, matrix: &Transform) {
        self.data.transform_vertices(matrix);
        self.bounds = self.data.bounding_box();
    }

    /// Marks boundary, non-manifold and folded edges of the master level.
    fn create_sharp_edges(&mut self, precision: f64, angle: f64) {
        let Some(master) = self.data.lod(0) else {
            self.sharp_edges.clear();
            return;
        };
        let canonical = self.merged_vertices(precision);
        let merged = |index: u32| canonical.get(index as usize).copied();

        let mut edge_faces: BTreeMap<(u32, u32), Vec<Vector3<f64>>> = BTreeMap::new();
        for triangle in master.indices.chunks_exact(3) {
            let (Some(a), Some(b), Some(c)) =
                (merged(triangle[0]), merged(triangle[1]), merged(triangle[2]))
            else {
                continue;
            };
            if a == b || b == c || a == c {
                continue;
            }
            let Some(normal) = self.face_normal(a, b, c) else {
                continue;
            };
            for (start, end) in [(a, b), (b, c), (c, a)] {
                edge_faces
                    .entry((start.min(end), start.max(end)))
                    .or_default()
                    .push(normal);
            }
        }

        let threshold = angle.cos();
        self.sharp_edges = edge_faces
            .into_iter()
            .filter(|(_, normals)| match normals.as_slice() {
                [first, second] => first.dot(*second).clamp(-1.0, 1.0) < threshold,
                _ => true,
            })
            .map(|((start, end), _)| [start, end])
            .collect();

        log::debug!("Mesh {} has {} sharp edges", self.id, self.sharp_edges.len());
    }

    fn release_gpu_resources(&mut self) {
        self.uploaded.store(false, Ordering::Relaxed);
    }

    fn clone_geometry(&self) -> Box<dyn Geometry> {
        Box::new(Mesh {
            id: generate_id(),
            name: self.name.clone(),
            data: self.data.clone(),
            bounds: self.bounds,
            current_lod: self.current_lod,
            sharp_edges: self.sharp_edges.clone(),
            uploaded: AtomicBool::new(false),
        })
    }
}

/// Vertex positions as points, for building test and demo meshes.
pub fn positions_from_points(points: &[Point3<f32>]) -> Vec<f32> {
    points.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
}
