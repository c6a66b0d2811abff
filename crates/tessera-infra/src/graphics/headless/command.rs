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

use super::device::HeadlessDevice;
use std::any::Any;
use std::ops::Range;
use tessera_core::renderer::{
    BarrierScope, BufferId, ClearMask, CommandBufferId, CommandEncoder, FillMode, FramebufferId,
    IndexFormat, ParamValue, ShaderId, TextureId, VertexAttribute, Viewport,
};

/// One recorded command, as kept in the device's command log.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BindFramebuffer {
        framebuffer: FramebufferId,
        viewport: Viewport,
        clear: ClearMask,
    },
    SetShader(ShaderId),
    SetParam {
        name: String,
        value: ParamValue,
    },
    BindVertexBuffer {
        buffer: BufferId,
        attribute: VertexAttribute,
    },
    UnbindVertexSlot(u32),
    BindIndexBuffer {
        buffer: BufferId,
        format: IndexFormat,
    },
    UnbindIndexBuffer,
    BindStorageBuffer {
        binding: u32,
        buffer: BufferId,
    },
    UnbindStorageBuffer(u32),
    BindTexture {
        unit: u32,
        texture: TextureId,
    },
    UnbindTexture(u32),
    WriteBuffer {
        buffer: BufferId,
        offset: u64,
        data: Vec<u8>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    MemoryBarrier(BarrierScope),
    SetFillMode(FillMode),
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    DrawIndexedIndirect {
        buffer: BufferId,
        offset: u64,
    },
    DrawFullscreen,
}

impl Command {
    /// Whether the command is a dispatch.
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Command::Dispatch { .. })
    }

    /// Whether the command is any kind of draw.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Command::DrawIndexed { .. } | Command::DrawIndexedIndirect { .. } | Command::DrawFullscreen
        )
    }
}

/// Records commands for a [`HeadlessDevice`].
pub struct HeadlessCommandEncoder {
    pub(crate) device: HeadlessDevice,
    pub(crate) label: Option<String>,
    pub(crate) commands: Vec<Command>,
}

impl HeadlessCommandEncoder {
    /// Commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

impl CommandEncoder for HeadlessCommandEncoder {
    fn bind_framebuffer(&mut self, framebuffer: FramebufferId, viewport: Viewport, clear: ClearMask) {
        self.commands.push(Command::BindFramebuffer {
            framebuffer,
            viewport,
            clear,
        });
    }

    fn set_shader(&mut self, shader: ShaderId) {
        self.commands.push(Command::SetShader(shader));
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        self.commands.push(Command::SetParam {
            name: name.to_owned(),
            value,
        });
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId, attribute: VertexAttribute) {
        self.commands
            .push(Command::BindVertexBuffer { buffer, attribute });
    }

    fn unbind_vertex_slot(&mut self, slot: u32) {
        self.commands.push(Command::UnbindVertexSlot(slot));
    }

    fn bind_index_buffer(&mut self, buffer: BufferId, format: IndexFormat) {
        self.commands.push(Command::BindIndexBuffer { buffer, format });
    }

    fn unbind_index_buffer(&mut self) {
        self.commands.push(Command::UnbindIndexBuffer);
    }

    fn bind_storage_buffer(&mut self, binding: u32, buffer: BufferId) {
        self.commands
            .push(Command::BindStorageBuffer { binding, buffer });
    }

    fn unbind_storage_buffer(&mut self, binding: u32) {
        self.commands.push(Command::UnbindStorageBuffer(binding));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn unbind_texture(&mut self, unit: u32) {
        self.commands.push(Command::UnbindTexture(unit));
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        self.commands.push(Command::WriteBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(Command::Dispatch { x, y, z });
    }

    fn memory_barrier(&mut self, scope: BarrierScope) {
        self.commands.push(Command::MemoryBarrier(scope));
    }

    fn set_fill_mode(&mut self, mode: FillMode) {
        self.commands.push(Command::SetFillMode(mode));
    }

    fn fill_mode(&self) -> FillMode {
        self.commands
            .iter()
            .rev()
            .find_map(|command| match command {
                Command::SetFillMode(mode) => Some(*mode),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, offset: u64) {
        self.commands.push(Command::DrawIndexedIndirect {
            buffer: indirect_buffer,
            offset,
        });
    }

    fn draw_fullscreen(&mut self) {
        self.commands.push(Command::DrawFullscreen);
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let HeadlessCommandEncoder {
            device,
            label,
            commands,
        } = *self;
        device.register_command_buffer(label, commands)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
