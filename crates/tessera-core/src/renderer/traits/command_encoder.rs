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

use crate::renderer::api::{
    BarrierScope, BufferId, ClearMask, CommandBufferId, FillMode, FramebufferId, IndexFormat,
    ParamValue, ShaderId, TextureId, VertexAttribute, Viewport,
};
use std::any::Any;
use std::ops::Range;

/// Records an ordered stream of device commands.
///
/// Nothing recorded here executes until the finished command buffer is handed to
/// [`GraphicsDevice::submit_command_buffer`](super::GraphicsDevice::submit_command_buffer).
/// The device may execute commands out of order internally except across a
/// [`memory_barrier`](CommandEncoder::memory_barrier). The submitting side never waits
/// on device results.
///
/// Binding state (shader, parameters, slots) persists across draws and dispatches
/// until it is rebound or explicitly unbound.
pub trait CommandEncoder {
    /// Binds a framebuffer as the draw destination, sets the viewport and clears
    /// the aspects in `clear` (which may be empty).
    fn bind_framebuffer(&mut self, framebuffer: FramebufferId, viewport: Viewport, clear: ClearMask);

    /// Makes `shader` the active program for subsequent draws and dispatches.
    fn set_shader(&mut self, shader: ShaderId);

    /// Sets a named parameter on the active program.
    fn set_param(&mut self, name: &str, value: ParamValue);

    /// Binds a buffer as the source of one vertex attribute.
    fn bind_vertex_buffer(&mut self, buffer: BufferId, attribute: VertexAttribute);

    /// Releases a vertex attribute slot.
    fn unbind_vertex_slot(&mut self, slot: u32);

    /// Binds the index buffer read by indexed draws.
    fn bind_index_buffer(&mut self, buffer: BufferId, format: IndexFormat);

    /// Releases the index buffer binding.
    fn unbind_index_buffer(&mut self);

    /// Binds a buffer to a storage binding point.
    fn bind_storage_buffer(&mut self, binding: u32, buffer: BufferId);

    /// Releases a storage binding point.
    fn unbind_storage_buffer(&mut self, binding: u32);

    /// Binds a texture to a sampling unit.
    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    /// Releases a sampling unit.
    fn unbind_texture(&mut self, unit: u32);

    /// Records an update of buffer contents, ordered with the rest of the stream.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    /// Dispatches `x * y * z` compute work groups with the active program.
    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32);

    /// Makes writes recorded before this point visible to reads of the kinds in
    /// `scope` recorded after it.
    fn memory_barrier(&mut self, scope: BarrierScope);

    /// Sets the rasterization fill mode.
    fn set_fill_mode(&mut self, mode: FillMode);

    /// The fill mode most recently set on this encoder, `Fill` if none was.
    fn fill_mode(&self) -> FillMode;

    /// Records an indexed draw call with parameters known on the submitting side.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Records an indexed draw whose parameters are read from `indirect_buffer` at
    /// `offset` when the device executes it.
    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, offset: u64);

    /// Records a full-screen triangle draw with the active program.
    fn draw_fullscreen(&mut self);

    /// Finalizes the command recording and returns a handle to the resulting command buffer.
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
