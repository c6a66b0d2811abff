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

//! Slot-based device memory with scoped binding guards.
//!
//! A [`DeviceBuffer`] owns a fixed number of slots. Each slot holds one device
//! buffer tagged with the role it is currently used in. Bindings are made
//! through guards that release every slot they bound when dropped, so no slot
//! stays bound into the next pass.

use bytemuck::Pod;
use std::borrow::Cow;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tessera_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, CommandEncoder, GraphicsDevice, IndexFormat,
    RenderError, ResourceError, VertexAttribute,
};
use thiserror::Error;

/// Errors raised by [`DeviceBuffer`] operations.
#[derive(Debug, Error)]
pub enum DeviceBufferError {
    #[error("slot {index} is out of range for a table of {count} slots")]
    SlotOutOfRange { index: usize, count: usize },
    #[error("slot {0} holds no buffer")]
    EmptySlot(usize),
    #[error("slot {index} is used as {actual}, not as {expected}")]
    RoleMismatch {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{len} bytes of data are not a whole number of {stride}-byte elements")]
    Misaligned { len: usize, stride: u64 },
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl From<DeviceBufferError> for RenderError {
    fn from(err: DeviceBufferError) -> Self {
        match err {
            DeviceBufferError::Resource(err) => RenderError::ResourceError(err),
            other => RenderError::ContractViolation(other.to_string()),
        }
    }
}

/// The role a slot's buffer is currently used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// A vertex attribute stream.
    Vertex(VertexAttribute),
    /// An index buffer.
    Index(IndexFormat),
    /// A plain storage buffer.
    Storage,
    /// Indirect draw records.
    Indirect,
}

impl BufferRole {
    fn name(&self) -> &'static str {
        match self {
            BufferRole::Vertex(_) => "vertex",
            BufferRole::Index(_) => "index",
            BufferRole::Storage => "storage",
            BufferRole::Indirect => "indirect",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    buffer: BufferId,
    size: u64,
    role: BufferRole,
}

/// Slot buffers can be retargeted with [`DeviceBuffer::use_as`], so every one
/// is created usable in every role.
const SLOT_USAGE: BufferUsage = BufferUsage::VERTEX
    .union(BufferUsage::INDEX)
    .union(BufferUsage::STORAGE)
    .union(BufferUsage::INDIRECT)
    .union(BufferUsage::COPY_DST)
    .union(BufferUsage::MAP_READ);

/// A fixed-size table of device buffers owned by one component.
#[derive(Debug)]
pub struct DeviceBuffer {
    device: Arc<dyn GraphicsDevice>,
    label: String,
    slots: Vec<Option<Slot>>,
}

impl DeviceBuffer {
    /// Creates an empty table with `slot_count` slots.
    pub fn new(device: Arc<dyn GraphicsDevice>, label: &str, slot_count: usize) -> Self {
        Self {
            device,
            label: label.to_owned(),
            slots: vec![None; slot_count],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Uploads a vertex attribute stream into slot `index`, replacing any
    /// buffer the slot held.
    pub fn set_attrib_data<T: Pod>(
        &mut self,
        index: usize,
        attribute: VertexAttribute,
        data: &[T],
    ) -> Result<BufferId, DeviceBufferError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let stride = attribute.stride();
        if stride == 0 || bytes.len() as u64 % stride != 0 {
            return Err(DeviceBufferError::Misaligned {
                len: bytes.len(),
                stride,
            });
        }
        self.set_buffer_data(index, BufferRole::Vertex(attribute), bytes.len() as u64, bytes)
    }

    /// Allocates `size` bytes in slot `index`, initialized with `data` and
    /// zero-filled past it, replacing any buffer the slot held.
    pub fn set_buffer_data(
        &mut self,
        index: usize,
        role: BufferRole,
        size: u64,
        data: &[u8],
    ) -> Result<BufferId, DeviceBufferError> {
        self.check_index(index)?;
        let buffer = self.device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Owned(format!("{}[{index}]", self.label))),
                size,
                usage: SLOT_USAGE,
            },
            data,
        )?;
        if let Some(old) = self.slots[index].replace(Slot { buffer, size, role }) {
            self.device.destroy_buffer(old.buffer)?;
        }
        Ok(buffer)
    }

    /// Changes the role slot `index` is used in. The contents are unchanged.
    pub fn use_as(&mut self, index: usize, role: BufferRole) -> Result<(), DeviceBufferError> {
        let slot = self.slot_mut(index)?;
        slot.role = role;
        Ok(())
    }

    /// The buffer in slot `index`.
    pub fn buffer(&self, index: usize) -> Option<BufferId> {
        self.slots.get(index).copied().flatten().map(|s| s.buffer)
    }

    /// The size of the buffer in slot `index`.
    pub fn size(&self, index: usize) -> Option<u64> {
        self.slots.get(index).copied().flatten().map(|s| s.size)
    }

    /// The role slot `index` is used in.
    pub fn role(&self, index: usize) -> Option<BufferRole> {
        self.slots.get(index).copied().flatten().map(|s| s.role)
    }

    /// Writes into slot `index` immediately.
    pub fn update(&self, index: usize, offset: u64, data: &[u8]) -> Result<(), DeviceBufferError> {
        let slot = self.slot(index)?;
        self.device.write_buffer(slot.buffer, offset, data)?;
        Ok(())
    }

    /// Records a write into slot `index`, ordered with the rest of `encoder`'s stream.
    pub fn update_in(
        &self,
        encoder: &mut dyn CommandEncoder,
        index: usize,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceBufferError> {
        let slot = self.slot(index)?;
        let in_bounds = offset
            .checked_add(data.len() as u64)
            .is_some_and(|end| end <= slot.size);
        if !in_bounds {
            return Err(ResourceError::OutOfBounds {
                offset,
                len: data.len() as u64,
                size: slot.size,
            }
            .into());
        }
        encoder.write_buffer(slot.buffer, offset, data);
        Ok(())
    }

    /// Binds the vertex slots at `indices` until the guard drops.
    pub fn bind_attributes<'e>(
        &self,
        encoder: &'e mut dyn CommandEncoder,
        indices: &[usize],
    ) -> Result<AttributeBinding<'e>, DeviceBufferError> {
        let attributes = self.vertex_attributes(indices)?;
        for (buffer, attribute) in &attributes {
            encoder.bind_vertex_buffer(*buffer, *attribute);
        }
        Ok(AttributeBinding {
            encoder,
            slots: attributes.iter().map(|(_, a)| a.slot).collect(),
        })
    }

    /// Binds slots to storage binding points, as `(binding, index)` pairs, until
    /// the guard drops.
    pub fn bind_storage<'e>(
        &self,
        encoder: &'e mut dyn CommandEncoder,
        bindings: &[(u32, usize)],
    ) -> Result<StorageBinding<'e>, DeviceBufferError> {
        let mut resolved = Vec::with_capacity(bindings.len());
        for (binding, index) in bindings {
            resolved.push((*binding, self.slot(*index)?.buffer));
        }
        for (binding, buffer) in &resolved {
            encoder.bind_storage_buffer(*binding, *buffer);
        }
        Ok(StorageBinding {
            encoder,
            bindings: resolved.into_iter().map(|(b, _)| b).collect(),
        })
    }

    /// Binds vertex slots plus the index slot for drawing, and remembers the
    /// indirect slot for [`DrawBinding::draw_indirect`].
    pub fn bind_draw<'e>(
        &self,
        encoder: &'e mut dyn CommandEncoder,
        attribute_indices: &[usize],
        index_slot: usize,
        indirect_slot: usize,
    ) -> Result<DrawBinding<'e>, DeviceBufferError> {
        let attributes = self.vertex_attributes(attribute_indices)?;
        let index = self.slot(index_slot)?;
        let format = match index.role {
            BufferRole::Index(format) => format,
            other => {
                return Err(DeviceBufferError::RoleMismatch {
                    index: index_slot,
                    expected: "index",
                    actual: other.name(),
                })
            }
        };
        let indirect = self.slot(indirect_slot)?;
        if indirect.role != BufferRole::Indirect {
            return Err(DeviceBufferError::RoleMismatch {
                index: indirect_slot,
                expected: "indirect",
                actual: indirect.role.name(),
            });
        }

        for (buffer, attribute) in &attributes {
            encoder.bind_vertex_buffer(*buffer, *attribute);
        }
        encoder.bind_index_buffer(index.buffer, format);
        Ok(DrawBinding {
            attributes: AttributeBinding {
                encoder,
                slots: attributes.iter().map(|(_, a)| a.slot).collect(),
            },
            indirect: indirect.buffer,
        })
    }

    fn vertex_attributes(
        &self,
        indices: &[usize],
    ) -> Result<Vec<(BufferId, VertexAttribute)>, DeviceBufferError> {
        indices
            .iter()
            .map(|index| {
                let slot = self.slot(*index)?;
                match slot.role {
                    BufferRole::Vertex(attribute) => Ok((slot.buffer, attribute)),
                    other => Err(DeviceBufferError::RoleMismatch {
                        index: *index,
                        expected: "vertex",
                        actual: other.name(),
                    }),
                }
            })
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<(), DeviceBufferError> {
        if index >= self.slots.len() {
            return Err(DeviceBufferError::SlotOutOfRange {
                index,
                count: self.slots.len(),
            });
        }
        Ok(())
    }

    fn slot(&self, index: usize) -> Result<Slot, DeviceBufferError> {
        self.check_index(index)?;
        self.slots[index].ok_or(DeviceBufferError::EmptySlot(index))
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Slot, DeviceBufferError> {
        self.check_index(index)?;
        self.slots[index]
            .as_mut()
            .ok_or(DeviceBufferError::EmptySlot(index))
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut().filter_map(Option::take) {
            if let Err(err) = self.device.destroy_buffer(slot.buffer) {
                log::warn!(
                    "DeviceBuffer '{}': failed to destroy {:?}: {err}",
                    self.label,
                    slot.buffer
                );
            }
        }
    }
}

/// Vertex attribute slots bound until drop.
///
/// Dereferences to the encoder so draws can be recorded while bound.
pub struct AttributeBinding<'e> {
    encoder: &'e mut dyn CommandEncoder,
    slots: Vec<u32>,
}

impl<'e> Deref for AttributeBinding<'e> {
    type Target = dyn CommandEncoder + 'e;

    fn deref(&self) -> &Self::Target {
        &*self.encoder
    }
}

impl DerefMut for AttributeBinding<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.encoder
    }
}

impl Drop for AttributeBinding<'_> {
    fn drop(&mut self) {
        for slot in self.slots.drain(..) {
            self.encoder.unbind_vertex_slot(slot);
        }
    }
}

/// Storage binding points bound until drop.
///
/// Dereferences to the encoder so dispatches can be recorded while bound.
pub struct StorageBinding<'e> {
    encoder: &'e mut dyn CommandEncoder,
    bindings: Vec<u32>,
}

impl<'e> Deref for StorageBinding<'e> {
    type Target = dyn CommandEncoder + 'e;

    fn deref(&self) -> &Self::Target {
        &*self.encoder
    }
}

impl DerefMut for StorageBinding<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.encoder
    }
}

impl Drop for StorageBinding<'_> {
    fn drop(&mut self) {
        for binding in self.bindings.drain(..) {
            self.encoder.unbind_storage_buffer(binding);
        }
    }
}

/// Vertex and index bindings for a draw, released on drop.
pub struct DrawBinding<'e> {
    attributes: AttributeBinding<'e>,
    indirect: BufferId,
}

impl DrawBinding<'_> {
    /// Records an indexed indirect draw reading the bound indirect slot.
    pub fn draw_indirect(&mut self) {
        let indirect = self.indirect;
        self.attributes.draw_indexed_indirect(indirect, 0);
    }
}

impl<'e> Deref for DrawBinding<'e> {
    type Target = dyn CommandEncoder + 'e;

    fn deref(&self) -> &Self::Target {
        &*self.attributes
    }
}

impl DerefMut for DrawBinding<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.attributes
    }
}

impl Drop for DrawBinding<'_> {
    fn drop(&mut self) {
        self.attributes.unbind_index_buffer();
    }
}
