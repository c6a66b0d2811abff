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

use super::command::{Command, HeadlessCommandEncoder};
use super::executor::{DrawRecord, Executor};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_core::renderer::api::full_mip_count;
use tessera_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, CommandBufferId, CommandEncoder, ComputeKernel,
    DeviceLimits, FilterMode, FramebufferDescriptor, FramebufferId, GraphicsDevice, RenderError,
    ResourceError, ShaderId, ShaderLibrary, TextureDescriptor, TextureFormat, TextureId,
    TextureKind,
};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub(crate) struct BufferEntry {
    pub(crate) data: Vec<u8>,
    pub(crate) usage: BufferUsage,
}

/// What the device remembers about a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: FilterMode,
    pub mip_levels: u32,
    pub kind: TextureKind,
}

/// What the device remembers about a framebuffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferInfo {
    pub color_attachments: Vec<TextureId>,
    pub depth_attachment: Option<TextureId>,
    pub layer: u32,
    pub disable_color_io: bool,
    /// Size of the attachments' base level.
    pub width: u32,
    pub height: u32,
}

impl FramebufferInfo {
    /// Whether `texture` is one of the attachments.
    pub fn attaches(&self, texture: TextureId) -> bool {
        self.color_attachments.contains(&texture) || self.depth_attachment == Some(texture)
    }
}

struct PendingCommandBuffer {
    label: Option<String>,
    commands: Vec<Command>,
}

pub(crate) struct HeadlessDeviceInternal {
    pub(crate) limits: DeviceLimits,
    pub(crate) buffers: Mutex<HashMap<BufferId, BufferEntry>>,
    pub(crate) textures: Mutex<HashMap<TextureId, TextureInfo>>,
    pub(crate) framebuffers: Mutex<HashMap<FramebufferId, FramebufferInfo>>,
    pub(crate) shaders: Mutex<HashMap<String, ShaderId>>,
    pub(crate) kernels: Mutex<HashMap<ShaderId, Arc<dyn ComputeKernel>>>,
    pending_command_buffers: Mutex<HashMap<CommandBufferId, PendingCommandBuffer>>,
    pub(crate) command_log: Mutex<Vec<Command>>,
    pub(crate) draws: Mutex<Vec<DrawRecord>>,
    pub(crate) dispatched_groups: AtomicU64,

    next_buffer_id: AtomicUsize,
    next_texture_id: AtomicUsize,
    next_framebuffer_id: AtomicUsize,
    next_shader_id: AtomicUsize,
    command_buffer_id_counter: AtomicU64,
}

/// A clonable, thread-safe handle to the headless device.
#[derive(Clone)]
pub struct HeadlessDevice {
    pub(crate) internal: Arc<HeadlessDeviceInternal>,
}

impl fmt::Debug for HeadlessDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessDevice")
            .field("limits", &self.internal.limits)
            .field("buffers", &self.live_buffer_count())
            .field("textures", &self.live_texture_count())
            .field("framebuffers", &self.live_framebuffer_count())
            .finish()
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Creates a device with default limits.
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    /// Creates a device reporting `limits`.
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            internal: Arc::new(HeadlessDeviceInternal {
                limits,
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                framebuffers: Mutex::new(HashMap::new()),
                shaders: Mutex::new(HashMap::new()),
                kernels: Mutex::new(HashMap::new()),
                pending_command_buffers: Mutex::new(HashMap::new()),
                command_log: Mutex::new(Vec::new()),
                draws: Mutex::new(Vec::new()),
                dispatched_groups: AtomicU64::new(0),
                next_buffer_id: AtomicUsize::new(0),
                next_texture_id: AtomicUsize::new(0),
                next_framebuffer_id: AtomicUsize::new(0),
                next_shader_id: AtomicUsize::new(0),
                command_buffer_id_counter: AtomicU64::new(0),
            }),
        }
    }

    // --- Programs ---

    /// Registers a graphics program by name. Registering a name twice returns
    /// the existing handle.
    pub fn register_shader(&self, name: &str) -> ShaderId {
        let mut shaders = lock(&self.internal.shaders);
        if let Some(id) = shaders.get(name) {
            return *id;
        }
        let id = ShaderId(self.internal.next_shader_id.fetch_add(1, Ordering::Relaxed));
        shaders.insert(name.to_owned(), id);
        log::debug!("HeadlessDevice: Registered program '{name}' as {id:?}");
        id
    }

    /// Registers a compute program by name together with the kernel that runs
    /// its dispatches.
    pub fn register_kernel(&self, name: &str, kernel: impl ComputeKernel + 'static) -> ShaderId {
        let id = self.register_shader(name);
        log::debug!(
            "HeadlessDevice: Program '{name}' dispatches run kernel '{}'",
            kernel.label()
        );
        lock(&self.internal.kernels).insert(id, Arc::new(kernel));
        id
    }

    // --- Inspection ---

    /// Describes a live texture.
    pub fn texture_info(&self, id: TextureId) -> Option<TextureInfo> {
        lock(&self.internal.textures).get(&id).cloned()
    }

    /// Describes a live framebuffer.
    pub fn framebuffer_info(&self, id: FramebufferId) -> Option<FramebufferInfo> {
        lock(&self.internal.framebuffers).get(&id).cloned()
    }

    pub fn live_buffer_count(&self) -> usize {
        lock(&self.internal.buffers).len()
    }

    pub fn live_texture_count(&self) -> usize {
        lock(&self.internal.textures).len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        lock(&self.internal.framebuffers).len()
    }

    /// Every command executed so far, in execution order.
    pub fn command_log(&self) -> Vec<Command> {
        lock(&self.internal.command_log).clone()
    }

    /// Every draw executed so far.
    pub fn draws(&self) -> Vec<DrawRecord> {
        lock(&self.internal.draws).clone()
    }

    /// Total work groups run by all dispatches so far.
    pub fn dispatched_groups(&self) -> u64 {
        self.internal.dispatched_groups.load(Ordering::Relaxed)
    }

    /// Forgets the command log, draw records and group count.
    pub fn clear_logs(&self) {
        lock(&self.internal.command_log).clear();
        lock(&self.internal.draws).clear();
        self.internal.dispatched_groups.store(0, Ordering::Relaxed);
    }

    pub(crate) fn register_command_buffer(
        &self,
        label: Option<String>,
        commands: Vec<Command>,
    ) -> CommandBufferId {
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::Relaxed),
        );
        lock(&self.internal.pending_command_buffers)
            .insert(id, PendingCommandBuffer { label, commands });
        id
    }

    fn generate_buffer_id(&self) -> BufferId {
        BufferId(self.internal.next_buffer_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_texture_id(&self) -> TextureId {
        TextureId(
            self.internal
                .next_texture_id
                .fetch_add(1, Ordering::Relaxed),
        )
    }

    fn generate_framebuffer_id(&self) -> FramebufferId {
        FramebufferId(
            self.internal
                .next_framebuffer_id
                .fetch_add(1, Ordering::Relaxed),
        )
    }
}

pub(crate) fn check_range(offset: u64, len: u64, size: u64) -> Result<std::ops::Range<usize>, ResourceError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset as usize..end as usize),
        _ => Err(ResourceError::OutOfBounds { offset, len, size }),
    }
}

impl ShaderLibrary for HeadlessDevice {
    fn shader(&self, name: &str) -> Option<ShaderId> {
        lock(&self.internal.shaders).get(name).copied()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        self.create_buffer_with_data(descriptor, &[])
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        if descriptor.size == 0 {
            return Err(ResourceError::InvalidDescriptor(
                "buffer size must be non-zero".into(),
            ));
        }
        let range = check_range(0, data.len() as u64, descriptor.size)?;
        let mut contents = vec![0u8; descriptor.size as usize];
        contents[range].copy_from_slice(data);

        let id = self.generate_buffer_id();
        lock(&self.internal.buffers).insert(
            id,
            BufferEntry {
                data: contents,
                usage: descriptor.usage,
            },
        );
        log::debug!(
            "HeadlessDevice: Created buffer '{}' with ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.size
        );
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.internal.buffers);
        let entry = buffers.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;
        if !entry.usage.contains(BufferUsage::COPY_DST) {
            return Err(ResourceError::InvalidUsage(format!(
                "buffer {id:?} was not created with COPY_DST"
            )));
        }
        let range = check_range(offset, data.len() as u64, entry.data.len() as u64)?;
        entry.data[range].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, id: BufferId, offset: u64, size: u64) -> Result<Vec<u8>, ResourceError> {
        let buffers = lock(&self.internal.buffers);
        let entry = buffers.get(&id).ok_or(ResourceError::InvalidHandle)?;
        let range = check_range(offset, size, entry.data.len() as u64)?;
        Ok(entry.data[range].to_vec())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        lock(&self.internal.buffers)
            .remove(&id)
            .map(|_| log::trace!("HeadlessDevice: Destroyed buffer with ID: {id:?}"))
            .ok_or(ResourceError::InvalidHandle)
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(ResourceError::InvalidDescriptor(format!(
                "texture size {}x{} has a zero dimension",
                descriptor.width, descriptor.height
            )));
        }
        let max_mips = full_mip_count(descriptor.width, descriptor.height);
        if descriptor.mip_levels == 0 || descriptor.mip_levels > max_mips {
            return Err(ResourceError::InvalidDescriptor(format!(
                "{} mip levels requested, expected 1..={max_mips}",
                descriptor.mip_levels
            )));
        }
        if descriptor.kind == TextureKind::Cube && descriptor.width != descriptor.height {
            return Err(ResourceError::InvalidDescriptor(
                "cube faces must be square".into(),
            ));
        }

        let id = self.generate_texture_id();
        lock(&self.internal.textures).insert(
            id,
            TextureInfo {
                label: descriptor.label.as_ref().map(|l| l.to_string()),
                width: descriptor.width,
                height: descriptor.height,
                format: descriptor.format,
                filter: descriptor.filter,
                mip_levels: descriptor.mip_levels,
                kind: descriptor.kind,
            },
        );
        log::debug!(
            "HeadlessDevice: Created texture '{}' with ID: {:?} ({}x{} {:?}, {} bytes)",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.width,
            descriptor.height,
            descriptor.format,
            descriptor.base_level_bytes()
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        lock(&self.internal.textures)
            .remove(&id)
            .map(|_| log::trace!("HeadlessDevice: Destroyed texture with ID: {id:?}"))
            .ok_or(ResourceError::InvalidHandle)
    }

    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, ResourceError> {
        let textures = lock(&self.internal.textures);
        let limits = &self.internal.limits;

        if descriptor.color_attachments.is_empty() && descriptor.depth_attachment.is_none() {
            return Err(ResourceError::InvalidDescriptor(
                "a framebuffer needs at least one attachment".into(),
            ));
        }
        if descriptor.color_attachments.len() > limits.max_color_attachments as usize {
            return Err(ResourceError::InvalidDescriptor(format!(
                "{} color attachments exceed the limit of {}",
                descriptor.color_attachments.len(),
                limits.max_color_attachments
            )));
        }
        if descriptor.disable_color_io && !descriptor.color_attachments.is_empty() {
            return Err(ResourceError::InvalidDescriptor(
                "a depth-only framebuffer cannot hold color attachments".into(),
            ));
        }

        let mut size: Option<(u32, u32)> = None;
        let attachments = descriptor
            .color_attachments
            .iter()
            .map(|id| (*id, false))
            .chain(descriptor.depth_attachment.map(|id| (id, true)));
        for (id, is_depth_slot) in attachments {
            let info = textures.get(&id).ok_or(ResourceError::InvalidHandle)?;
            if info.format.is_depth() != is_depth_slot {
                return Err(ResourceError::InvalidUsage(format!(
                    "texture {id:?} with format {:?} cannot be a {} attachment",
                    info.format,
                    if is_depth_slot { "depth" } else { "color" }
                )));
            }
            if descriptor.layer >= info.kind.layers() {
                return Err(ResourceError::InvalidDescriptor(format!(
                    "layer {} does not exist in texture {id:?}",
                    descriptor.layer
                )));
            }
            match size {
                None => size = Some((info.width, info.height)),
                Some(s) if s != (info.width, info.height) => {
                    return Err(ResourceError::InvalidDescriptor(
                        "framebuffer attachments differ in size".into(),
                    ))
                }
                Some(_) => {}
            }
        }
        let (width, height) = size.unwrap_or_default();
        drop(textures);

        let id = self.generate_framebuffer_id();
        lock(&self.internal.framebuffers).insert(
            id,
            FramebufferInfo {
                color_attachments: descriptor.color_attachments.to_vec(),
                depth_attachment: descriptor.depth_attachment,
                layer: descriptor.layer,
                disable_color_io: descriptor.disable_color_io,
                width,
                height,
            },
        );
        log::debug!(
            "HeadlessDevice: Created framebuffer '{}' with ID: {:?} ({}x{})",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            width,
            height
        );
        Ok(id)
    }

    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        lock(&self.internal.framebuffers)
            .remove(&id)
            .map(|_| log::trace!("HeadlessDevice: Destroyed framebuffer with ID: {id:?}"))
            .ok_or(ResourceError::InvalidHandle)
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(HeadlessCommandEncoder {
            device: self.clone(),
            label: label.map(str::to_owned),
            commands: Vec::new(),
        })
    }

    fn submit_command_buffer(&self, command_buffer: CommandBufferId) -> Result<(), RenderError> {
        let pending = lock(&self.internal.pending_command_buffers)
            .remove(&command_buffer)
            .ok_or_else(|| {
                log::error!(
                    "Attempted to submit a CommandBufferId ({command_buffer:?}) that does not exist."
                );
                RenderError::ResourceError(ResourceError::InvalidHandle)
            })?;
        log::trace!(
            "HeadlessDevice: Executing '{}' ({} commands)",
            pending.label.as_deref().unwrap_or_default(),
            pending.commands.len()
        );
        Executor::new(&self.internal).run(pending.commands)
    }

    fn limits(&self) -> DeviceLimits {
        self.internal.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use tessera_core::renderer::{TextureFormat, WrapMode};

    fn texture(device: &HeadlessDevice, w: u32, h: u32, format: TextureFormat) -> TextureId {
        device
            .create_texture(&TextureDescriptor {
                label: Some(Cow::Borrowed("test")),
                width: w,
                height: h,
                format,
                filter: FilterMode::Nearest,
                wrap: WrapMode::ClampToEdge,
                mip_levels: 1,
                kind: TextureKind::D2,
            })
            .unwrap()
    }

    #[test]
    fn test_buffer_lifecycle() {
        let device = HeadlessDevice::new();
        let id = device
            .create_buffer_with_data(
                &BufferDescriptor {
                    label: None,
                    size: 8,
                    usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
                },
                &[1, 2, 3],
            )
            .unwrap();
        assert_eq!(device.read_buffer(id, 0, 8).unwrap(), vec![1, 2, 3, 0, 0, 0, 0, 0]);

        device.write_buffer(id, 6, &[9, 9]).unwrap();
        assert_eq!(device.read_buffer(id, 6, 2).unwrap(), vec![9, 9]);
        assert!(matches!(
            device.write_buffer(id, 7, &[1, 1]),
            Err(ResourceError::OutOfBounds { offset: 7, len: 2, size: 8 })
        ));

        device.destroy_buffer(id).unwrap();
        assert_eq!(device.live_buffer_count(), 0);
        assert!(matches!(device.destroy_buffer(id), Err(ResourceError::InvalidHandle)));
    }

    #[test]
    fn test_write_requires_copy_dst() {
        let device = HeadlessDevice::new();
        let id = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 4,
                usage: BufferUsage::INDEX,
            })
            .unwrap();
        assert!(matches!(
            device.write_buffer(id, 0, &[0]),
            Err(ResourceError::InvalidUsage(_))
        ));
    }

    #[test]
    fn test_framebuffer_validation() {
        let device = HeadlessDevice::new();
        let color = texture(&device, 64, 32, TextureFormat::Rgba8Unorm);
        let depth = texture(&device, 64, 32, TextureFormat::Depth24Plus);
        let small = texture(&device, 32, 32, TextureFormat::Rgba8Unorm);

        let fb = device
            .create_framebuffer(&FramebufferDescriptor {
                label: None,
                color_attachments: &[color],
                depth_attachment: Some(depth),
                layer: 0,
                disable_color_io: false,
            })
            .unwrap();
        let info = device.framebuffer_info(fb).unwrap();
        assert_eq!((info.width, info.height), (64, 32));
        assert!(info.attaches(depth));

        let mismatched = device.create_framebuffer(&FramebufferDescriptor {
            label: None,
            color_attachments: &[color, small],
            depth_attachment: None,
            layer: 0,
            disable_color_io: false,
        });
        assert!(matches!(mismatched, Err(ResourceError::InvalidDescriptor(_))));

        let depth_as_color = device.create_framebuffer(&FramebufferDescriptor {
            label: None,
            color_attachments: &[depth],
            depth_attachment: None,
            layer: 0,
            disable_color_io: false,
        });
        assert!(matches!(depth_as_color, Err(ResourceError::InvalidUsage(_))));
    }

    #[test]
    fn test_texture_validation() {
        let device = HeadlessDevice::new();
        let bad_cube = device.create_texture(&TextureDescriptor {
            label: None,
            width: 64,
            height: 32,
            format: TextureFormat::Rgba8Unorm,
            filter: FilterMode::Linear,
            wrap: WrapMode::ClampToEdge,
            mip_levels: 1,
            kind: TextureKind::Cube,
        });
        assert!(bad_cube.is_err());

        let too_many_mips = device.create_texture(&TextureDescriptor {
            label: None,
            width: 4,
            height: 4,
            format: TextureFormat::Rgba8Unorm,
            filter: FilterMode::Linear,
            wrap: WrapMode::ClampToEdge,
            mip_levels: 4,
            kind: TextureKind::D2,
        });
        assert!(too_many_mips.is_err());
    }

    #[test]
    fn test_shader_registry() {
        let device = HeadlessDevice::new();
        let a = device.register_shader("terrain");
        assert_eq!(device.register_shader("terrain"), a);
        assert_eq!(device.shader("terrain"), Some(a));
        assert_eq!(device.shader("missing"), None);
    }

    #[test]
    fn test_submit_unknown_command_buffer() {
        let device = HeadlessDevice::new();
        assert!(device.submit_command_buffer(CommandBufferId(42)).is_err());
    }
}
