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

//! Opaque handles and plain-data structures used while recording commands.

use crate::math::{Mat4, Vec4};
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

/// An opaque handle to a recorded command buffer that is ready for submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

bitflags! {
    /// Which aspects of a framebuffer are cleared when it is bound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u32 {
        /// Clear every color attachment.
        const COLOR = 1 << 0;
        /// Clear the depth attachment.
        const DEPTH = 1 << 1;
    }
}

bitflags! {
    /// Classes of device memory access made visible by a barrier.
    ///
    /// Writes issued before the barrier become visible to reads of the listed
    /// kinds issued after it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BarrierScope: u32 {
        /// Storage-buffer reads from later shader invocations.
        const STORAGE = 1 << 0;
        /// Indirect command reads by later draws or dispatches.
        const INDIRECT_COMMAND = 1 << 1;
        /// Index fetches by later draws.
        const INDEX = 1 << 2;
    }
}

/// Rasterization fill mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    /// Filled triangles.
    #[default]
    Fill,
    /// Triangle edges only (debug wireframe).
    Line,
}

/// The device-resident record read by an indexed indirect draw.
///
/// The field order matches the layout every modern API consumes for
/// indexed indirect draws.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawRecord {
    /// Number of indices to draw. Accumulated on the device by the cull dispatch.
    pub element_count: u32,
    /// Number of instances, at least one.
    pub instance_count: u32,
    /// First index read from the index buffer.
    pub first_index: u32,
    /// Value added to each index before vertex fetch.
    pub base_vertex: u32,
    /// First instance id.
    pub base_instance: u32,
}

impl IndirectDrawRecord {
    /// Size of the record in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
    /// Byte offset of `element_count` within the record.
    pub const ELEMENT_COUNT_OFFSET: u64 = 0;

    /// A single-instance record with no elements, starting at index zero.
    pub const fn empty() -> Self {
        Self {
            element_count: 0,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            base_instance: 0,
        }
    }
}

impl Default for IndirectDrawRecord {
    fn default() -> Self {
        Self::empty()
    }
}

/// A value for a named shader parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// A 4x4 matrix.
    Mat4(Mat4),
    /// A four-component vector.
    Vec4(Vec4),
    /// A scalar float.
    Float(f32),
    /// An unsigned integer.
    Uint(u32),
}

impl ParamValue {
    /// Returns the matrix if this is a [`ParamValue::Mat4`].
    pub fn as_mat4(&self) -> Option<Mat4> {
        match self {
            ParamValue::Mat4(m) => Some(*m),
            _ => None,
        }
    }

    /// Returns the integer if this is a [`ParamValue::Uint`].
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            ParamValue::Uint(v) => Some(*v),
            _ => None,
        }
    }
}
