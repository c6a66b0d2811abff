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

//! CPU execution of the chunk cull program, for devices that run dispatches
//! on the host. Produces the same buffers as [`CHUNK_CULL_WGSL`](super::shaders::CHUNK_CULL_WGSL).

use super::ChunkRecord;
use tessera_core::config::SlotLayout;
use tessera_core::math::Frustum;
use tessera_core::renderer::{
    ComputeKernel, IndirectDrawRecord, KernelContext, KernelError, KernelInvocation, ParamValue,
};

/// Parameter names shared by the cull pass, the shader and this kernel.
pub mod params {
    /// `Mat4`: the frustum to test against.
    pub const VIEW_PROJ: &str = "viewProjectMatrix";
    /// `Uint`: number of chunks. Groups past it do nothing.
    pub const CHUNK_COUNT: &str = "chunkCount";
    /// `Uint`: width of the dispatch grid, for deriving a chunk index from a 2D group id.
    pub const GROUPS_X: &str = "groupsX";
    /// `Vec4`: eye position, used with [`CULL_DISTANCE`].
    pub const EYE_POSITION: &str = "eyePosition";
    /// `Float`: chunks farther than this from the eye are culled. `0` disables.
    pub const CULL_DISTANCE: &str = "cullDistance";
}

/// One group per chunk: test the chunk's box against the frustum and append
/// its indices to the output on a pass.
#[derive(Debug, Clone)]
pub struct ChunkCullKernel {
    slots: SlotLayout,
}

impl ChunkCullKernel {
    pub fn new(slots: SlotLayout) -> Self {
        Self { slots }
    }
}

impl ComputeKernel for ChunkCullKernel {
    fn label(&self) -> &str {
        "chunk_cull"
    }

    fn invoke(
        &self,
        invocation: KernelInvocation,
        ctx: &mut KernelContext<'_>,
    ) -> Result<(), KernelError> {
        let chunk = invocation.linear_index();
        let chunk_count = ctx
            .param(params::CHUNK_COUNT)?
            .as_uint()
            .ok_or_else(|| KernelError::ParamType {
                name: params::CHUNK_COUNT.to_owned(),
                expected: "uint",
            })?;
        if chunk >= chunk_count {
            return Ok(());
        }

        let record: ChunkRecord = ctx.read(self.slots.chunk_records, chunk as usize)?;
        let bounds = record.bounds();
        let frustum = Frustum::from_view_proj(&ctx.param_mat4(params::VIEW_PROJ)?);
        if !bounds.classify(&frustum).is_visible() {
            return Ok(());
        }
        if let (Ok(ParamValue::Float(max)), Ok(ParamValue::Vec4(eye))) = (
            ctx.param(params::CULL_DISTANCE),
            ctx.param(params::EYE_POSITION),
        ) {
            if max > 0.0 && bounds.distance_to_point(eye.truncate()) > max {
                return Ok(());
            }
        }

        let first = ctx.atomic_add_u32(
            self.slots.indirect,
            IndirectDrawRecord::ELEMENT_COUNT_OFFSET as usize,
            record.index_count,
        )?;
        let indices: Vec<u32> = ctx.read_slice(
            self.slots.chunk_ranges,
            record.first_index as usize,
            record.index_count as usize,
        )?;
        ctx.write_slice(self.slots.output_indices, first as usize, &indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use tessera_core::math::{Mat4, UVec3, Vec3};

    fn storage_for(records: &[ChunkRecord], indices: &[u32]) -> BTreeMap<u32, Vec<u8>> {
        let slots = SlotLayout::default();
        BTreeMap::from([
            (slots.chunk_records, bytemuck::cast_slice::<_, u8>(records).to_vec()),
            (slots.chunk_ranges, bytemuck::cast_slice::<_, u8>(indices).to_vec()),
            (
                slots.indirect,
                bytemuck::bytes_of(&IndirectDrawRecord::empty()).to_vec(),
            ),
            (slots.output_indices, vec![0u8; indices.len() * 4]),
        ])
    }

    fn group(x: u32, groups: u32) -> KernelInvocation {
        KernelInvocation {
            group_id: UVec3::new(x, 0, 0),
            num_groups: UVec3::new(groups, 1, 1),
        }
    }

    #[test]
    fn test_visible_chunk_appends_its_range() {
        let record = ChunkRecord {
            center: [0.0, 0.0, 0.0],
            first_index: 0,
            half_extent: [1.0, 1.0, 1.0],
            index_count: 3,
        };
        let values = HashMap::from([
            (params::VIEW_PROJ.to_owned(), ParamValue::Mat4(Mat4::IDENTITY)),
            (params::CHUNK_COUNT.to_owned(), ParamValue::Uint(1)),
        ]);
        let mut storage = storage_for(&[record], &[7, 8, 9]);
        let kernel = ChunkCullKernel::new(SlotLayout::default());
        {
            let mut ctx = KernelContext::new(&values, &mut storage);
            kernel.invoke(group(0, 2), &mut ctx).unwrap();
            // Past the chunk count.
            kernel.invoke(group(1, 2), &mut ctx).unwrap();
        }

        let slots = SlotLayout::default();
        let indirect: IndirectDrawRecord =
            bytemuck::pod_read_unaligned(&storage[&slots.indirect]);
        assert_eq!(indirect.element_count, 3);
        assert_eq!(
            bytemuck::cast_slice::<u8, u32>(&storage[&slots.output_indices]),
            &[7, 8, 9]
        );
    }

    #[test]
    fn test_culled_chunk_writes_nothing() {
        let far_away = ChunkRecord {
            center: [0.5, 0.0, 0.5],
            first_index: 0,
            half_extent: [0.1, 0.1, 0.1],
            index_count: 3,
        };
        let values = HashMap::from([
            (params::VIEW_PROJ.to_owned(), ParamValue::Mat4(Mat4::IDENTITY)),
            (params::CHUNK_COUNT.to_owned(), ParamValue::Uint(1)),
            (params::EYE_POSITION.to_owned(), ParamValue::Vec4(Vec3::ZERO.extend(1.0))),
            (params::CULL_DISTANCE.to_owned(), ParamValue::Float(0.2)),
        ]);
        let mut storage = storage_for(&[far_away], &[1, 2, 3]);
        let kernel = ChunkCullKernel::new(SlotLayout::default());
        let mut ctx = KernelContext::new(&values, &mut storage);
        kernel.invoke(group(0, 1), &mut ctx).unwrap();
        assert_eq!(
            ctx.read::<u32>(SlotLayout::default().indirect, 0).unwrap(),
            0
        );
    }

    #[test]
    fn test_missing_params_are_reported() {
        let values = HashMap::new();
        let mut storage = storage_for(&[], &[]);
        let mut ctx = KernelContext::new(&values, &mut storage);
        let err = ChunkCullKernel::new(SlotLayout::default())
            .invoke(group(0, 1), &mut ctx)
            .unwrap_err();
        assert_eq!(err, KernelError::MissingParam(params::CHUNK_COUNT.to_owned()));
    }
}
