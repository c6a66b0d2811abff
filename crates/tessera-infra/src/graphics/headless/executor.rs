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

//! Runs a submitted command stream against the device's resource tables.

use super::command::Command;
use super::device::{check_range, lock, HeadlessDeviceInternal};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::Ordering;
use tessera_core::math::UVec3;
use tessera_core::renderer::{
    BarrierScope, BufferId, BufferUsage, FillMode, FramebufferId, IndexFormat, IndirectDrawRecord,
    KernelContext, KernelInvocation, ParamValue, RenderError, ResourceError, ShaderId, TextureId,
    VertexAttribute, Viewport,
};

/// What kind of draw was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawKind {
    /// A direct indexed draw.
    Indexed { index_count: u32 },
    /// An indirect indexed draw, with the indices it actually fetched.
    Indirect {
        element_count: u32,
        indices: Vec<u32>,
    },
    /// A full-screen pass, with the textures bound at the time.
    Fullscreen { inputs: Vec<TextureId> },
}

/// One executed draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub framebuffer: FramebufferId,
    pub viewport: Viewport,
    pub shader: Option<ShaderId>,
    pub fill_mode: FillMode,
    pub kind: DrawKind,
}

#[derive(Default)]
struct BindingState {
    framebuffer: Option<(FramebufferId, Viewport)>,
    shader: Option<ShaderId>,
    params: HashMap<String, ParamValue>,
    vertex_slots: BTreeMap<u32, (BufferId, VertexAttribute)>,
    index: Option<(BufferId, IndexFormat)>,
    storage: BTreeMap<u32, BufferId>,
    textures: BTreeMap<u32, TextureId>,
    fill_mode: FillMode,
    // Kinds of read that still race with an earlier dispatch's writes.
    unsynced: BarrierScope,
}

pub(crate) struct Executor<'a> {
    device: &'a HeadlessDeviceInternal,
    state: BindingState,
}

fn violation(msg: impl Into<String>) -> RenderError {
    let msg = msg.into();
    log::error!("HeadlessDevice: {msg}");
    RenderError::ContractViolation(msg)
}

impl<'a> Executor<'a> {
    pub(crate) fn new(device: &'a HeadlessDeviceInternal) -> Self {
        Self {
            device,
            state: BindingState::default(),
        }
    }

    pub(crate) fn run(mut self, commands: Vec<Command>) -> Result<(), RenderError> {
        for command in commands {
            self.execute(&command)?;
            lock(&self.device.command_log).push(command);
        }
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<(), RenderError> {
        let device = self.device;
        let limits = &device.limits;
        match command {
            Command::BindFramebuffer {
                framebuffer,
                viewport,
                ..
            } => {
                let framebuffers = lock(&device.framebuffers);
                let info = framebuffers
                    .get(framebuffer)
                    .ok_or(ResourceError::InvalidHandle)?;
                if viewport.x + viewport.width > info.width
                    || viewport.y + viewport.height > info.height
                {
                    return Err(violation(format!(
                        "viewport {viewport:?} exceeds framebuffer {framebuffer:?} ({}x{})",
                        info.width, info.height
                    )));
                }
                self.state.framebuffer = Some((*framebuffer, *viewport));
            }
            Command::SetShader(shader) => {
                if !lock(&device.shaders).values().any(|id| id == shader) {
                    return Err(ResourceError::InvalidHandle.into());
                }
                self.state.shader = Some(*shader);
                self.state.params.clear();
            }
            Command::SetParam { name, value } => {
                if self.state.shader.is_none() {
                    return Err(violation(format!("parameter '{name}' set with no active program")));
                }
                self.state.params.insert(name.clone(), *value);
            }
            Command::BindVertexBuffer { buffer, attribute } => {
                if attribute.slot >= limits.max_vertex_slots {
                    return Err(violation(format!(
                        "vertex slot {} exceeds the device limit",
                        attribute.slot
                    )));
                }
                if !(1..=4).contains(&attribute.components) {
                    return Err(violation(format!(
                        "vertex attribute with {} components",
                        attribute.components
                    )));
                }
                self.require_usage(*buffer, BufferUsage::VERTEX)?;
                self.state
                    .vertex_slots
                    .insert(attribute.slot, (*buffer, *attribute));
            }
            Command::UnbindVertexSlot(slot) => {
                self.state.vertex_slots.remove(slot);
            }
            Command::BindIndexBuffer { buffer, format } => {
                self.require_usage(*buffer, BufferUsage::INDEX)?;
                self.state.index = Some((*buffer, *format));
            }
            Command::UnbindIndexBuffer => self.state.index = None,
            Command::BindStorageBuffer { binding, buffer } => {
                if *binding >= limits.max_storage_bindings {
                    return Err(violation(format!(
                        "storage binding {binding} exceeds the device limit"
                    )));
                }
                self.require_usage(*buffer, BufferUsage::STORAGE)?;
                self.state.storage.insert(*binding, *buffer);
            }
            Command::UnbindStorageBuffer(binding) => {
                self.state.storage.remove(binding);
            }
            Command::BindTexture { unit, texture } => {
                if *unit >= limits.max_texture_units {
                    return Err(violation(format!("texture unit {unit} exceeds the device limit")));
                }
                if !lock(&device.textures).contains_key(texture) {
                    return Err(ResourceError::InvalidHandle.into());
                }
                self.state.textures.insert(*unit, *texture);
            }
            Command::UnbindTexture(unit) => {
                self.state.textures.remove(unit);
            }
            Command::WriteBuffer {
                buffer,
                offset,
                data,
            } => {
                let mut buffers = lock(&device.buffers);
                let entry = buffers.get_mut(buffer).ok_or(ResourceError::InvalidHandle)?;
                if !entry.usage.contains(BufferUsage::COPY_DST) {
                    return Err(ResourceError::InvalidUsage(format!(
                        "buffer {buffer:?} was not created with COPY_DST"
                    ))
                    .into());
                }
                let range = check_range(*offset, data.len() as u64, entry.data.len() as u64)?;
                entry.data[range].copy_from_slice(data);
            }
            Command::Dispatch { x, y, z } => self.dispatch(UVec3::new(*x, *y, *z))?,
            Command::MemoryBarrier(scope) => self.state.unsynced.remove(*scope),
            Command::SetFillMode(mode) => self.state.fill_mode = *mode,
            Command::DrawIndexed { indices, .. } => {
                let (buffer, format) = self.draw_index_buffer()?;
                self.check_index_range(buffer, format, indices.start, indices.len() as u32)?;
                self.record_draw(DrawKind::Indexed {
                    index_count: indices.len() as u32,
                })?;
            }
            Command::DrawIndexedIndirect { buffer, offset } => {
                let kind = self.draw_indirect(*buffer, *offset)?;
                self.record_draw(kind)?;
            }
            Command::DrawFullscreen => {
                if self.state.shader.is_none() {
                    return Err(violation("full-screen draw with no active program"));
                }
                let inputs = self.state.textures.values().copied().collect();
                self.record_draw(DrawKind::Fullscreen { inputs })?;
            }
        }
        Ok(())
    }

    fn require_usage(&self, buffer: BufferId, usage: BufferUsage) -> Result<(), RenderError> {
        let buffers = lock(&self.device.buffers);
        let entry = buffers.get(&buffer).ok_or(ResourceError::InvalidHandle)?;
        if !entry.usage.contains(usage) {
            return Err(ResourceError::InvalidUsage(format!(
                "buffer {buffer:?} bound as {usage:?} but created with {:?}",
                entry.usage
            ))
            .into());
        }
        Ok(())
    }

    fn dispatch(&mut self, groups: UVec3) -> Result<(), RenderError> {
        let max = self.device.limits.max_dispatch_groups_per_dimension;
        if groups.max_element() > max {
            return Err(violation(format!(
                "dispatch of {groups} groups exceeds {max} per dimension"
            )));
        }
        let shader = self
            .state
            .shader
            .ok_or_else(|| violation("dispatch with no active program"))?;
        let kernel = lock(&self.device.kernels)
            .get(&shader)
            .cloned()
            .ok_or_else(|| RenderError::MissingShader(format!("no compute kernel for {shader:?}")))?;

        let device = self.device;
        let mut buffers = lock(&device.buffers);
        let bound: Vec<BufferId> = self.state.storage.values().copied().collect();
        for (i, id) in bound.iter().enumerate() {
            if bound[..i].contains(id) {
                return Err(violation(format!(
                    "buffer {id:?} is bound to more than one storage binding"
                )));
            }
            if !buffers.contains_key(id) {
                return Err(ResourceError::InvalidHandle.into());
            }
        }
        let mut storage: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        for (binding, id) in &self.state.storage {
            if let Some(entry) = buffers.get_mut(id) {
                storage.insert(*binding, std::mem::take(&mut entry.data));
            }
        }

        let mut result = Ok(());
        {
            let mut ctx = KernelContext::new(&self.state.params, &mut storage);
            'groups: for gz in 0..groups.z {
                for gy in 0..groups.y {
                    for gx in 0..groups.x {
                        let invocation = KernelInvocation {
                            group_id: UVec3::new(gx, gy, gz),
                            num_groups: groups,
                        };
                        if let Err(err) = kernel.invoke(invocation, &mut ctx) {
                            log::error!(
                                "HeadlessDevice: kernel '{}' failed in group {}: {err}",
                                kernel.label(),
                                invocation.group_id
                            );
                            result = Err(RenderError::Kernel(err));
                            break 'groups;
                        }
                    }
                }
            }
        }

        for (binding, id) in &self.state.storage {
            if let (Some(entry), Some(data)) = (buffers.get_mut(id), storage.remove(binding)) {
                entry.data = data;
            }
        }
        drop(buffers);
        result?;

        let total = groups.x as u64 * groups.y as u64 * groups.z as u64;
        device
            .dispatched_groups
            .fetch_add(total, Ordering::Relaxed);
        self.state.unsynced = BarrierScope::all();
        Ok(())
    }

    fn draw_index_buffer(&self) -> Result<(BufferId, IndexFormat), RenderError> {
        let (buffer, format) = self
            .state
            .index
            .ok_or_else(|| violation("indexed draw with no index buffer bound"))?;
        if self.state.storage.values().any(|b| *b == buffer) {
            return Err(violation(format!(
                "index buffer {buffer:?} is still bound as a storage buffer"
            )));
        }
        if self.state.unsynced.contains(BarrierScope::INDEX) {
            return Err(violation(
                "indexed draw reads device-written data without an INDEX barrier",
            ));
        }
        Ok((buffer, format))
    }

    fn check_index_range(
        &self,
        buffer: BufferId,
        format: IndexFormat,
        first: u32,
        count: u32,
    ) -> Result<std::ops::Range<usize>, RenderError> {
        let buffers = lock(&self.device.buffers);
        let entry = buffers.get(&buffer).ok_or(ResourceError::InvalidHandle)?;
        let size = format.size_bytes();
        Ok(check_range(
            first as u64 * size,
            count as u64 * size,
            entry.data.len() as u64,
        )?)
    }

    fn draw_indirect(&self, buffer: BufferId, offset: u64) -> Result<DrawKind, RenderError> {
        self.require_usage(buffer, BufferUsage::INDIRECT)?;
        if self.state.storage.values().any(|b| *b == buffer) {
            return Err(violation(format!(
                "indirect buffer {buffer:?} is still bound as a storage buffer"
            )));
        }
        if self.state.unsynced.contains(BarrierScope::INDIRECT_COMMAND) {
            return Err(violation(
                "indirect draw reads a device-written record without an INDIRECT_COMMAND barrier",
            ));
        }
        let (index_buffer, format) = self.draw_index_buffer()?;

        let record: IndirectDrawRecord = {
            let buffers = lock(&self.device.buffers);
            let entry = buffers.get(&buffer).ok_or(ResourceError::InvalidHandle)?;
            let range = check_range(offset, IndirectDrawRecord::SIZE, entry.data.len() as u64)?;
            bytemuck::pod_read_unaligned(&entry.data[range])
        };
        if record.instance_count == 0 {
            return Err(violation("indirect record with zero instances"));
        }

        let range = self.check_index_range(
            index_buffer,
            format,
            record.first_index,
            record.element_count,
        )?;
        let buffers = lock(&self.device.buffers);
        let entry = buffers
            .get(&index_buffer)
            .ok_or(ResourceError::InvalidHandle)?;
        let bytes = &entry.data[range];
        let indices = match format {
            IndexFormat::Uint16 => bytes
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]) as u32)
                .collect(),
            IndexFormat::Uint32 => bytes
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<u32>)
                .collect(),
        };
        Ok(DrawKind::Indirect {
            element_count: record.element_count,
            indices,
        })
    }

    fn record_draw(&self, kind: DrawKind) -> Result<(), RenderError> {
        let (framebuffer, viewport) = self
            .state
            .framebuffer
            .ok_or_else(|| violation("draw with no framebuffer bound"))?;
        {
            let framebuffers = lock(&self.device.framebuffers);
            let info = framebuffers
                .get(&framebuffer)
                .ok_or(ResourceError::InvalidHandle)?;
            if let Some(texture) = self.state.textures.values().find(|t| info.attaches(**t)) {
                return Err(violation(format!(
                    "texture {texture:?} is sampled while attached to the bound framebuffer"
                )));
            }
        }
        lock(&self.device.draws).push(DrawRecord {
            framebuffer,
            viewport,
            shader: self.state.shader,
            fill_mode: self.state.fill_mode,
            kind,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::HeadlessDevice;
    use super::*;
    use std::borrow::Cow;
    use tessera_core::renderer::{
        BufferDescriptor, ClearMask, ComputeKernel, FilterMode, FramebufferDescriptor, GraphicsDevice,
        KernelError, TextureDescriptor, TextureFormat, TextureKind, WrapMode,
    };

    struct CountGroups;

    impl ComputeKernel for CountGroups {
        fn label(&self) -> &str {
            "count_groups"
        }

        fn invoke(
            &self,
            invocation: KernelInvocation,
            ctx: &mut KernelContext<'_>,
        ) -> Result<(), KernelError> {
            ctx.atomic_add_u32(0, 0, 1)?;
            ctx.write_slice(1, invocation.linear_index() as usize, &[invocation.linear_index()])
        }
    }

    fn storage_buffer(device: &HeadlessDevice, size: u64, extra: BufferUsage) -> BufferId {
        device
            .create_buffer(&BufferDescriptor {
                label: None,
                size,
                usage: BufferUsage::STORAGE | BufferUsage::COPY_DST | extra,
            })
            .unwrap()
    }

    fn depth_framebuffer(device: &HeadlessDevice) -> FramebufferId {
        let depth = device
            .create_texture(&TextureDescriptor {
                label: Some(Cow::Borrowed("depth")),
                width: 8,
                height: 8,
                format: TextureFormat::Depth32Float,
                filter: FilterMode::Nearest,
                wrap: WrapMode::ClampToEdge,
                mip_levels: 1,
                kind: TextureKind::D2,
            })
            .unwrap();
        device
            .create_framebuffer(&FramebufferDescriptor {
                label: None,
                color_attachments: &[],
                depth_attachment: Some(depth),
                layer: 0,
                disable_color_io: true,
            })
            .unwrap()
    }

    #[test]
    fn test_dispatch_runs_every_group_in_order() {
        let device = HeadlessDevice::new();
        let program = device.register_kernel("count", CountGroups);
        let counter = storage_buffer(&device, 4, BufferUsage::empty());
        let order = storage_buffer(&device, 4 * 6, BufferUsage::empty());

        let mut encoder = device.create_command_encoder(Some("dispatch"));
        encoder.set_shader(program);
        encoder.bind_storage_buffer(0, counter);
        encoder.bind_storage_buffer(1, order);
        encoder.dispatch_workgroups(3, 2, 1);
        device.submit_command_buffer(encoder.finish()).unwrap();

        let count: u32 = bytemuck::pod_read_unaligned(&device.read_buffer(counter, 0, 4).unwrap());
        assert_eq!(count, 6);
        let written = device.read_buffer(order, 0, 24).unwrap();
        let written: Vec<u32> = written
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(written, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(device.dispatched_groups(), 6);
    }

    #[test]
    fn test_indirect_draw_requires_barrier_and_unbind() {
        let device = HeadlessDevice::new();
        let program = device.register_kernel("count", CountGroups);
        let draw_program = device.register_shader("draw");
        let framebuffer = depth_framebuffer(&device);
        let record = IndirectDrawRecord::empty();
        let indirect = device
            .create_buffer_with_data(
                &BufferDescriptor {
                    label: None,
                    size: IndirectDrawRecord::SIZE,
                    usage: BufferUsage::STORAGE | BufferUsage::INDIRECT | BufferUsage::COPY_DST,
                },
                bytemuck::bytes_of(&record),
            )
            .unwrap();
        let indices = storage_buffer(&device, 16, BufferUsage::INDEX);

        let record_cull = |barrier: bool, unbind: bool| {
            let mut encoder = device.create_command_encoder(None);
            encoder.set_shader(program);
            encoder.bind_storage_buffer(0, indirect);
            encoder.bind_storage_buffer(1, indices);
            encoder.dispatch_workgroups(2, 1, 1);
            if barrier {
                encoder.memory_barrier(BarrierScope::all());
            }
            if unbind {
                encoder.unbind_storage_buffer(0);
                encoder.unbind_storage_buffer(1);
            }
            encoder.bind_framebuffer(framebuffer, Viewport::full(8, 8), ClearMask::empty());
            encoder.set_shader(draw_program);
            encoder.bind_index_buffer(indices, IndexFormat::Uint32);
            encoder.draw_indexed_indirect(indirect, 0);
            encoder.finish()
        };

        let missing_barrier = record_cull(false, true);
        assert!(matches!(
            device.submit_command_buffer(missing_barrier),
            Err(RenderError::ContractViolation(_))
        ));
        device.write_buffer(indirect, 0, bytemuck::bytes_of(&record)).unwrap();

        let still_bound = record_cull(true, false);
        assert!(matches!(
            device.submit_command_buffer(still_bound),
            Err(RenderError::ContractViolation(_))
        ));
        device.write_buffer(indirect, 0, bytemuck::bytes_of(&record)).unwrap();

        device.clear_logs();
        device.submit_command_buffer(record_cull(true, true)).unwrap();
        let draws = device.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(
            draws[0].kind,
            DrawKind::Indirect {
                element_count: 2,
                indices: vec![0, 1],
            }
        );
    }

    #[test]
    fn test_dispatch_without_kernel_is_reported() {
        let device = HeadlessDevice::new();
        let program = device.register_shader("not_a_kernel");
        let mut encoder = device.create_command_encoder(None);
        encoder.set_shader(program);
        encoder.dispatch_workgroups(1, 1, 1);
        assert!(matches!(
            device.submit_command_buffer(encoder.finish()),
            Err(RenderError::MissingShader(_))
        ));
    }

    #[test]
    fn test_feedback_loop_is_rejected() {
        let device = HeadlessDevice::new();
        let program = device.register_shader("blit");
        let framebuffer = depth_framebuffer(&device);
        let depth = device
            .framebuffer_info(framebuffer)
            .unwrap()
            .depth_attachment
            .unwrap();

        let mut encoder = device.create_command_encoder(None);
        encoder.bind_framebuffer(framebuffer, Viewport::full(8, 8), ClearMask::empty());
        encoder.set_shader(program);
        encoder.bind_texture(0, depth);
        encoder.draw_fullscreen();
        assert!(device.submit_command_buffer(encoder.finish()).is_err());
    }
}
