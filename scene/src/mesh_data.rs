//! Raw vertex arrays and detail levels of a mesh, with their binary chunk.
//!
//! # Chunk layout
//!
//! All values are big-endian.
//!
//! ```text
//! u32            chunk id (0xA704)
//! u32 + f32 * n  positions
//! u32 + f32 * n  normals
//! u32 + f32 * n  texels
//! u32 + f32 * n  colors
//! u32            LOD count
//!   f64          accuracy        (per LOD)
//!   u32 + u32*n  triangle indices (per LOD)
//! ```

use std::io::{self, Read, Write};

use cgmath::{InnerSpace, Point3, Vector3};
use thiserror::Error;

use crate::common::{BoundingBox, Transform};

/// Tag opening every mesh data chunk.
pub const MESH_DATA_CHUNK_ID: u32 = 0xA704;

/// Errors that can occur while reading or writing a mesh data chunk.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("Invalid chunk id: {0:#06x}")]
    InvalidChunkId(u32),

    #[error("Chunk ended before all fields were read")]
    Truncated,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One detail level: a triangle list indexing the shared vertex arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lod {
    /// Geometric accuracy this level was built for. 0 for the master level.
    pub accuracy: f64,
    pub indices: Vec<u32>,
}

impl Lod {
    pub fn new(accuracy: f64, indices: Vec<u32>) -> Self {
        Self { accuracy, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Vertex arrays shared by every LOD of a mesh.
///
/// Positions and normals hold 3 floats per vertex, texels 2 and colors 4.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub texels: Vec<f32>,
    pub colors: Vec<f32>,
    lods: Vec<Lod>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn position(&self, index: usize) -> Option<Point3<f64>> {
        let start = index * 3;
        let xyz = self.positions.get(start..start + 3)?;
        Some(Point3::new(
            f64::from(xyz[0]),
            f64::from(xyz[1]),
            f64::from(xyz[2]),
        ))
    }

    pub fn add_lod(&mut self, lod: Lod) {
        self.lods.push(lod);
    }

    pub fn lods(&self) -> &[Lod] {
        &self.lods
    }

    pub fn lod(&self, index: usize) -> Option<&Lod> {
        self.lods.get(index)
    }

    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    /// Moves the master level, appended last while building, to the front.
    pub fn finish_lods(&mut self) {
        if let Some(master) = self.lods.pop() {
            self.lods.insert(0, master);
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        for index in 0..self.vertex_count() {
            if let Some(point) = self.position(index) {
                bounds.combine_point(point);
            }
        }
        bounds
    }

    /// Rewrites positions and normals in place.
    pub fn transform_vertices(&mut self, matrix: &Transform) {
        for xyz in self.positions.chunks_exact_mut(3) {
            let point = Point3::new(f64::from(xyz[0]), f64::from(xyz[1]), f64::from(xyz[2]));
            let moved = matrix.transform_point(point);
            xyz[0] = moved.x as f32;
            xyz[1] = moved.y as f32;
            xyz[2] = moved.z as f32;
        }

        let normal_matrix = matrix.normal_matrix();
        for xyz in self.normals.chunks_exact_mut(3) {
            let normal = normal_matrix
                * Vector3::new(f64::from(xyz[0]), f64::from(xyz[1]), f64::from(xyz[2]));
            let normal = if normal.magnitude2() > 0.0 {
                normal.normalize()
            } else {
                normal
            };
            xyz[0] = normal.x as f32;
            xyz[1] = normal.y as f32;
            xyz[2] = normal.z as f32;
        }
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.texels.clear();
        self.colors.clear();
        self.lods.clear();
    }

    pub fn write_chunk<W: Write>(&self, writer: &mut W) -> Result<(), ChunkError> {
        writer.write_all(&MESH_DATA_CHUNK_ID.to_be_bytes())?;

        for values in [&self.positions, &self.normals, &self.texels, &self.colors] {
            write_len(writer, values.len())?;
            for value in values {
                writer.write_all(&value.to_be_bytes())?;
            }
        }

        write_len(writer, self.lods.len())?;
        for lod in &self.lods {
            writer.write_all(&lod.accuracy.to_be_bytes())?;
            write_len(writer, lod.indices.len())?;
            for index in &lod.indices {
                writer.write_all(&index.to_be_bytes())?;
            }
        }
        Ok(())
    }

    pub fn read_chunk<R: Read>(reader: &mut R) -> Result<Self, ChunkError> {
        let chunk_id = read_u32(reader)?;
        if chunk_id != MESH_DATA_CHUNK_ID {
            return Err(ChunkError::InvalidChunkId(chunk_id));
        }

        let positions = read_f32_array(reader)?;
        let normals = read_f32_array(reader)?;
        let texels = read_f32_array(reader)?;
        let colors = read_f32_array(reader)?;

        let lod_count = read_u32(reader)? as usize;
        let mut lods = Vec::with_capacity(lod_count.min(64));
        for _ in 0..lod_count {
            let mut accuracy = [0u8; 8];
            read_exact(reader, &mut accuracy)?;
            let count = read_u32(reader)? as usize;
            let mut indices = Vec::with_capacity(count.min(1 << 16));
            for _ in 0..count {
                indices.push(read_u32(reader)?);
            }
            lods.push(Lod::new(f64::from_be_bytes(accuracy), indices));
        }

        Ok(Self {
            positions,
            normals,
            texels,
            colors,
            lods,
        })
    }
}

fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<(), ChunkError> {
    let len = u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "array too long for chunk"))?;
    writer.write_all(&len.to_be_bytes())?;
    Ok(())
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ChunkError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ChunkError::Truncated,
        _ => ChunkError::Io(e),
    })
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, ChunkError> {
    let mut bytes = [0u8; 4];
    read_exact(reader, &mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_f32_array<R: Read>(reader: &mut R) -> Result<Vec<f32>, ChunkError> {
    let count = read_u32(reader)? as usize;
    let mut values = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        let mut bytes = [0u8; 4];
        read_exact(reader, &mut bytes)?;
        values.push(f32::from_be_bytes(bytes));
    }
    Ok(values)
}
