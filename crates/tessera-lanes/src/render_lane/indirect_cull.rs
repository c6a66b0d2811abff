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

//! The culled terrain drawcall: device-side chunk visibility feeding one
//! indexed indirect draw.

use super::cull_kernel::params;
use super::{
    BufferRole, ChunkRecord, DeviceBuffer, DeviceBufferError, TerrainMesh, VisibilityChunk,
};
use std::sync::Arc;
use tessera_core::config::SlotLayout;
use tessera_core::math::{Mat4, Vec3};
use tessera_core::renderer::{
    BarrierScope, BufferId, CommandEncoder, ComponentType, FillMode, GraphicsDevice, IndexFormat,
    IndirectDrawRecord, ParamValue, RenderError, ResourceError, ShaderId, VertexAttribute,
};
use thiserror::Error;

/// Errors raised while building or recording an [`IndirectCullPass`].
#[derive(Debug, Error)]
pub enum CullPassError {
    #[error("invalid terrain mesh: {0}")]
    InvalidMesh(String),
    #[error("{chunks} chunks cannot be dispatched with at most {limit} groups per dimension")]
    TooManyChunks { chunks: usize, limit: u32 },
    #[error("buffer error: {0}")]
    Buffer(#[from] DeviceBufferError),
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
}

impl From<CullPassError> for RenderError {
    fn from(err: CullPassError) -> Self {
        match err {
            CullPassError::Resource(err) | CullPassError::Buffer(DeviceBufferError::Resource(err)) => {
                RenderError::ResourceError(err)
            }
            other => RenderError::ContractViolation(other.to_string()),
        }
    }
}

/// The view a cull dispatch tests chunks against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullView {
    pub view_proj: Mat4,
    pub eye: Vec3,
    /// Chunks whose box is farther than this from `eye` are culled as well.
    pub max_distance: Option<f32>,
}

impl CullView {
    pub fn new(view_proj: Mat4, eye: Vec3) -> Self {
        Self {
            view_proj,
            eye,
            max_distance: None,
        }
    }

    pub fn with_max_distance(mut self, distance: f32) -> Self {
        self.max_distance = Some(distance);
        self
    }
}

// Slot table layout.
const POSITION: usize = 0;
const NORMAL: usize = 1;
const TEXCOORD: usize = 2;
const SOURCE_INDICES: usize = 3;
const CHUNK_RECORDS: usize = 4;
const OUTPUT_INDICES: usize = 5;
const INDIRECT: usize = 6;
const SLOT_COUNT: usize = 7;

/// Splits `chunks` groups into an `(x, y)` grid with neither side above
/// `limit`. One row whenever it fits.
pub fn dispatch_dimensions(chunks: u32, limit: u32) -> (u32, u32) {
    if chunks <= limit {
        (chunks, 1)
    } else {
        (limit, chunks.div_ceil(limit))
    }
}

/// A terrain drawcall whose visibility is resolved on the device.
///
/// [`update`](Self::update) records the cull dispatch: the element count of
/// the indirect record is reset, one group per chunk tests its box and
/// appends surviving indices to the output buffer, and a barrier makes those
/// writes visible. [`draw`](Self::draw) then issues a single indirect draw
/// over the output buffer. The submitting side never learns how many
/// triangles survived.
#[derive(Debug)]
pub struct IndirectCullPass {
    buffers: DeviceBuffer,
    chunks: Vec<VisibilityChunk>,
    cull_shader: ShaderId,
    slots: SlotLayout,
    attributes: Vec<usize>,
    dispatch_limit: u32,
    capacity: u32,
    warmup_remaining: u32,
}

impl IndirectCullPass {
    /// Uploads `mesh` and its chunk table and sizes the output for the case
    /// where every chunk survives.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        mesh: &TerrainMesh,
        cull_shader: ShaderId,
        slots: &SlotLayout,
        draw_delay: u32,
    ) -> Result<Self, CullPassError> {
        let chunks = mesh.build_chunks()?;
        let limit = device.limits().max_dispatch_groups_per_dimension.max(1);
        if chunks.len() as u64 > limit as u64 * limit as u64 {
            log::error!(
                "IndirectCullPass: {} chunks exceed the dispatch limit of {limit}x{limit}",
                chunks.len()
            );
            return Err(CullPassError::TooManyChunks {
                chunks: chunks.len(),
                limit,
            });
        }

        let mut buffers = DeviceBuffer::new(device, "terrain", SLOT_COUNT);
        let mut attributes = vec![POSITION];
        buffers.set_attrib_data(POSITION, float_attribute(slots.position, 3), mesh.positions())?;
        if !mesh.normals().is_empty() {
            buffers.set_attrib_data(NORMAL, float_attribute(slots.normal, 3), mesh.normals())?;
            attributes.push(NORMAL);
        }
        if !mesh.texcoords().is_empty() {
            buffers.set_attrib_data(TEXCOORD, float_attribute(slots.texcoord, 2), mesh.texcoords())?;
            attributes.push(TEXCOORD);
        }

        let index_bytes: &[u8] = bytemuck::cast_slice(mesh.indices());
        buffers.set_buffer_data(
            SOURCE_INDICES,
            BufferRole::Storage,
            (index_bytes.len() as u64).max(4),
            index_bytes,
        )?;
        let records: Vec<ChunkRecord> = chunks.iter().map(VisibilityChunk::record).collect();
        let record_bytes: &[u8] = bytemuck::cast_slice(&records);
        buffers.set_buffer_data(
            CHUNK_RECORDS,
            BufferRole::Storage,
            (record_bytes.len() as u64).max(ChunkRecord::SIZE),
            record_bytes,
        )?;

        // Written as storage by the cull dispatch, read as index/indirect by the draw.
        let capacity = mesh.max_index_count();
        buffers.set_buffer_data(
            OUTPUT_INDICES,
            BufferRole::Storage,
            (capacity as u64 * 4).max(4),
            &[],
        )?;
        buffers.use_as(OUTPUT_INDICES, BufferRole::Index(IndexFormat::Uint32))?;
        buffers.set_buffer_data(
            INDIRECT,
            BufferRole::Storage,
            IndirectDrawRecord::SIZE,
            bytemuck::bytes_of(&IndirectDrawRecord::empty()),
        )?;
        buffers.use_as(INDIRECT, BufferRole::Indirect)?;

        log::debug!(
            "IndirectCullPass: Created with {} chunks, {} vertices, capacity {} indices",
            chunks.len(),
            mesh.positions().len(),
            capacity
        );
        Ok(Self {
            buffers,
            chunks,
            cull_shader,
            slots: slots.clone(),
            attributes,
            dispatch_limit: limit,
            capacity,
            warmup_remaining: draw_delay,
        })
    }

    /// Records the cull dispatch for `view`. Returns the number of groups
    /// dispatched, which is the chunk count.
    pub fn update(
        &self,
        encoder: &mut dyn CommandEncoder,
        view: &CullView,
    ) -> Result<u32, CullPassError> {
        let chunk_count = self.chunks.len() as u32;
        if chunk_count == 0 {
            return Ok(0);
        }

        self.buffers.update_in(
            encoder,
            INDIRECT,
            IndirectDrawRecord::ELEMENT_COUNT_OFFSET,
            bytemuck::bytes_of(&0u32),
        )?;

        let (x, y) = dispatch_dimensions(chunk_count, self.dispatch_limit);
        encoder.set_shader(self.cull_shader);
        encoder.set_param(params::VIEW_PROJ, ParamValue::Mat4(view.view_proj));
        encoder.set_param(params::CHUNK_COUNT, ParamValue::Uint(chunk_count));
        encoder.set_param(params::GROUPS_X, ParamValue::Uint(x));
        encoder.set_param(params::EYE_POSITION, ParamValue::Vec4(view.eye.extend(1.0)));
        encoder.set_param(
            params::CULL_DISTANCE,
            ParamValue::Float(view.max_distance.unwrap_or(0.0)),
        );

        let mut bound = self.buffers.bind_storage(
            encoder,
            &[
                (self.slots.chunk_records, CHUNK_RECORDS),
                (self.slots.chunk_ranges, SOURCE_INDICES),
                (self.slots.indirect, INDIRECT),
                (self.slots.output_indices, OUTPUT_INDICES),
            ],
        )?;
        bound.dispatch_workgroups(x, y, 1);
        bound.memory_barrier(BarrierScope::all());
        Ok(chunk_count)
    }

    /// Records the indirect draw with `shader`, after the warm-up delay has
    /// elapsed. Returns whether a draw was recorded.
    ///
    /// The delay counts calls, not frames, so a pass drawn several times a
    /// frame warms up sooner.
    pub fn draw(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        shader: ShaderId,
        wireframe: bool,
    ) -> Result<bool, CullPassError> {
        if self.chunks.is_empty() {
            return Ok(false);
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            log::debug!(
                "IndirectCullPass: Draw held back, {} warm-up calls left",
                self.warmup_remaining
            );
            return Ok(false);
        }

        let previous = encoder.fill_mode();
        let switch = wireframe && previous != FillMode::Line;
        if switch {
            encoder.set_fill_mode(FillMode::Line);
        }
        {
            let mut draw =
                self.buffers
                    .bind_draw(encoder, &self.attributes, OUTPUT_INDICES, INDIRECT)?;
            draw.set_shader(shader);
            draw.draw_indirect();
        }
        if switch {
            encoder.set_fill_mode(previous);
        }
        Ok(true)
    }

    pub fn chunks(&self) -> &[VisibilityChunk] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Size of the output index buffer, in indices.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn warmup_remaining(&self) -> u32 {
        self.warmup_remaining
    }

    pub fn output_buffer(&self) -> Option<BufferId> {
        self.buffers.buffer(OUTPUT_INDICES)
    }

    pub fn indirect_buffer(&self) -> Option<BufferId> {
        self.buffers.buffer(INDIRECT)
    }
}

fn float_attribute(slot: u32, components: u32) -> VertexAttribute {
    VertexAttribute {
        slot,
        component: ComponentType::Float32,
        components,
        normalized: false,
        divisor: 0,
    }
}
