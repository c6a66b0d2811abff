// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Static spatial partition of a terrain mesh into cullable index ranges.

use super::CullPassError;
use bytemuck::{Pod, Zeroable};
use std::ops::Range;
use tessera_core::math::{Aabb, Vec3};

/// Source geometry for a culled terrain drawcall.
///
/// Indices are laid out chunk by chunk: chunk `i` owns the consecutive index
/// range that follows chunk `i - 1`.
#[derive(Debug, Clone, Default)]
pub struct TerrainMesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    texcoords: Vec<[f32; 2]>,
    indices: Vec<u32>,
    chunk_sizes: Vec<u32>,
}

impl TerrainMesh {
    /// A mesh whose indices form a single chunk.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let chunk_sizes = if indices.is_empty() {
            Vec::new()
        } else {
            vec![indices.len() as u32]
        };
        Self {
            positions,
            normals: Vec::new(),
            texcoords: Vec::new(),
            indices,
            chunk_sizes,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_texcoords(mut self, texcoords: Vec<[f32; 2]>) -> Self {
        self.texcoords = texcoords;
        self
    }

    /// Splits the indices into chunks of `chunk_index_count` indices. The last
    /// chunk takes whatever remains.
    pub fn chunked_uniform(mut self, chunk_index_count: u32) -> Self {
        let total = self.indices.len() as u32;
        let step = chunk_index_count.max(1);
        self.chunk_sizes = (0..total)
            .step_by(step as usize)
            .map(|start| step.min(total - start))
            .collect();
        self
    }

    /// Splits the indices into consecutive chunks of the given sizes.
    pub fn chunked_by(mut self, sizes: Vec<u32>) -> Self {
        self.chunk_sizes = sizes;
        self
    }

    /// A regular grid of `chunks_x * chunks_z` square chunks, each
    /// `chunk_cells` cells wide, with heights sampled from `height`.
    pub fn grid(
        chunks_x: u32,
        chunks_z: u32,
        chunk_cells: u32,
        cell_size: f32,
        height: impl Fn(f32, f32) -> f32,
    ) -> Self {
        let cells_x = chunks_x * chunk_cells;
        let cells_z = chunks_z * chunk_cells;
        let row = cells_x + 1;
        let eps = cell_size * 0.5;

        let mut positions = Vec::with_capacity((row * (cells_z + 1)) as usize);
        let mut normals = Vec::with_capacity(positions.capacity());
        let mut texcoords = Vec::with_capacity(positions.capacity());
        for j in 0..=cells_z {
            for i in 0..=cells_x {
                let (x, z) = (i as f32 * cell_size, j as f32 * cell_size);
                positions.push(Vec3::new(x, height(x, z), z));
                let normal = Vec3::new(
                    height(x - eps, z) - height(x + eps, z),
                    2.0 * eps,
                    height(x, z - eps) - height(x, z + eps),
                );
                normals.push(normal.normalize_or_zero());
                texcoords.push([i as f32 / cells_x.max(1) as f32, j as f32 / cells_z.max(1) as f32]);
            }
        }

        let chunk_index_count = chunk_cells * chunk_cells * 6;
        let mut indices = Vec::with_capacity((chunks_x * chunks_z * chunk_index_count) as usize);
        for cz in 0..chunks_z {
            for cx in 0..chunks_x {
                for j in cz * chunk_cells..(cz + 1) * chunk_cells {
                    for i in cx * chunk_cells..(cx + 1) * chunk_cells {
                        let a = j * row + i;
                        let b = a + 1;
                        let c = a + row;
                        let d = c + 1;
                        indices.extend_from_slice(&[a, c, b, b, c, d]);
                    }
                }
            }
        }

        Self::new(positions, indices)
            .with_normals(normals)
            .with_texcoords(texcoords)
            .chunked_uniform(chunk_index_count)
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn texcoords(&self) -> &[[f32; 2]] {
        &self.texcoords
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_sizes.len()
    }

    /// Total index count, which is the worst case any culled draw can emit.
    pub fn max_index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Checks the mesh and computes every chunk's bounds.
    pub fn build_chunks(&self) -> Result<Vec<VisibilityChunk>, CullPassError> {
        let vertex_count = self.positions.len();
        for (name, len) in [("normal", self.normals.len()), ("texcoord", self.texcoords.len())] {
            if len != 0 && len != vertex_count {
                return Err(CullPassError::InvalidMesh(format!(
                    "{len} {name}s for {vertex_count} vertices"
                )));
            }
        }
        if let Some(bad) = self.indices.iter().find(|i| **i as usize >= vertex_count) {
            return Err(CullPassError::InvalidMesh(format!(
                "index {bad} references one of {vertex_count} vertices"
            )));
        }
        let covered: u64 = self.chunk_sizes.iter().map(|s| *s as u64).sum();
        if covered != self.indices.len() as u64 {
            return Err(CullPassError::InvalidMesh(format!(
                "chunks cover {covered} of {} indices",
                self.indices.len()
            )));
        }

        let mut chunks = Vec::with_capacity(self.chunk_sizes.len());
        let mut first = 0u32;
        for size in &self.chunk_sizes {
            if *size == 0 || size % 3 != 0 {
                return Err(CullPassError::InvalidMesh(format!(
                    "chunk {} has {size} indices, expected a non-zero multiple of 3",
                    chunks.len()
                )));
            }
            let range = first as usize..(first + size) as usize;
            let chunk = VisibilityChunk::from_indices(&self.positions, &self.indices[range], first)
                .ok_or_else(|| CullPassError::InvalidMesh("chunk without vertices".into()))?;
            chunks.push(chunk);
            first += size;
        }
        Ok(chunks)
    }
}

/// One cullable piece of a mesh: an index range plus the box around every
/// vertex that range references. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityChunk {
    bounds: Aabb,
    first_index: u32,
    index_count: u32,
}

impl VisibilityChunk {
    /// Builds the chunk covering `indices`, which start at `first_index` in the
    /// mesh's index buffer. `None` if `indices` is empty or out of range.
    pub fn from_indices(positions: &[Vec3], indices: &[u32], first_index: u32) -> Option<Self> {
        let mut bounds = Aabb::INVALID;
        for index in indices {
            bounds = bounds.merged_with_point(*positions.get(*index as usize)?);
        }
        bounds.is_valid().then_some(Self {
            bounds,
            first_index,
            index_count: indices.len() as u32,
        })
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn center(&self) -> Vec3 {
        self.bounds.center()
    }

    pub fn half_extent(&self) -> Vec3 {
        self.bounds.half_extents()
    }

    pub fn first_index(&self) -> u32 {
        self.first_index
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn index_range(&self) -> Range<u32> {
        self.first_index..self.first_index + self.index_count
    }

    /// The device-side mirror of this chunk.
    pub fn record(&self) -> ChunkRecord {
        ChunkRecord {
            center: self.center().to_array(),
            first_index: self.first_index,
            half_extent: self.half_extent().to_array(),
            index_count: self.index_count,
        }
    }
}

/// Device mirror of a [`VisibilityChunk`], laid out as two 16-byte rows so it
/// packs without padding in a storage buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ChunkRecord {
    pub center: [f32; 3],
    pub first_index: u32,
    pub half_extent: [f32; 3],
    pub index_count: u32,
}

impl ChunkRecord {
    /// Size of one record in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center.into(), self.half_extent.into())
    }
}
