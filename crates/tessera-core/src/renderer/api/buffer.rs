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

//! Defines data structures related to GPU buffer resources.

use bitflags::bitflags;
use std::borrow::Cow;

bitflags! {
    /// A set of flags describing the allowed usages of a [`BufferId`].
    ///
    /// The backend uses them to place the buffer in the right memory type and to
    /// validate that the buffer is bound only in roles it was created for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// The buffer can be used as the source of a copy operation.
        const COPY_SRC = 1 << 0;
        /// The buffer can be written from the submitting side.
        const COPY_DST = 1 << 1;
        /// The buffer can be bound as a vertex attribute buffer.
        const VERTEX = 1 << 2;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 3;
        /// The buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 4;
        /// The buffer can be bound as a storage buffer (read/write access from shaders).
        const STORAGE = 1 << 5;
        /// The buffer can hold indirect draw or dispatch records.
        const INDIRECT = 1 << 6;
        /// The buffer can be read back to the submitting side (debug only).
        const MAP_READ = 1 << 7;
    }
}

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label for the buffer.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// A bitmask of [`BufferUsage`] flags describing how the buffer will be used.
    pub usage: BufferUsage,
}

/// An opaque handle to a GPU buffer resource.
///
/// This ID is returned by `GraphicsDevice::create_buffer` and is used to reference
/// the buffer in all subsequent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// Specifies the data type of indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// Indices are 16-bit unsigned integers.
    Uint16,
    /// Indices are 32-bit unsigned integers.
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub const fn size_bytes(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// The scalar type of one vertex attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// 32-bit float.
    Float32,
    /// 32-bit unsigned integer.
    Uint32,
    /// 8-bit unsigned integer.
    Uint8,
}

impl ComponentType {
    /// Size of one component in bytes.
    pub const fn size_bytes(self) -> u64 {
        match self {
            ComponentType::Float32 | ComponentType::Uint32 => 4,
            ComponentType::Uint8 => 1,
        }
    }
}

/// Describes how one vertex attribute is read from a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// The attribute slot (shader location) the buffer feeds.
    pub slot: u32,
    /// Scalar type of each component.
    pub component: ComponentType,
    /// Number of components per vertex (1 to 4).
    pub components: u32,
    /// Whether integer components are normalized to `[0, 1]` when read.
    pub normalized: bool,
    /// Instancing divisor. `0` means per-vertex.
    pub divisor: u32,
}

impl VertexAttribute {
    /// Byte stride of one element.
    pub const fn stride(&self) -> u64 {
        self.component.size_bytes() * self.components as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_combination() {
        let usage = BufferUsage::STORAGE | BufferUsage::INDEX | BufferUsage::COPY_DST;
        assert!(usage.contains(BufferUsage::STORAGE));
        assert!(usage.contains(BufferUsage::INDEX));
        assert!(!usage.contains(BufferUsage::INDIRECT));
    }

    #[test]
    fn test_vertex_attribute_stride() {
        let color = VertexAttribute {
            slot: 4,
            component: ComponentType::Uint8,
            components: 3,
            normalized: true,
            divisor: 0,
        };
        assert_eq!(color.stride(), 3);
        let texcoord = VertexAttribute {
            slot: 2,
            component: ComponentType::Float32,
            components: 4,
            normalized: false,
            divisor: 0,
        };
        assert_eq!(texcoord.stride(), 16);
        assert_eq!(IndexFormat::Uint32.size_bytes(), 4);
    }
}
