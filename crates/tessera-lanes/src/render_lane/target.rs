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

//! Render targets: a fixed set of device images that draws land in.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::renderer::{
    ClearMask, CommandEncoder, FilterMode, FramebufferDescriptor, FramebufferId, GraphicsDevice,
    RenderError, ResourceError, TextureDescriptor, TextureFormat, TextureId, TextureKind,
    Viewport, WrapMode,
};
use thiserror::Error;

/// Errors raised while building or binding a [`RenderTarget`].
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("color attachment {0} is already in use")]
    DuplicateAttachment(u32),
    #[error("color attachment {0} is missing; attachments must be contiguous from 0")]
    MissingAttachment(u32),
    #[error("color attachment {index} exceeds the device limit of {limit}")]
    AttachmentOutOfRange { index: u32, limit: u32 },
    #[error("a depth attachment was already added")]
    DuplicateDepth,
    #[error("depth-only targets cannot hold color attachments")]
    DepthOnlyWithColor,
    #[error("{0:?} cannot be used for a {1} attachment")]
    WrongFormat(TextureFormat, &'static str),
    #[error("target '{0}' has no attachments")]
    Empty(String),
    #[error("face {face} does not exist on a target with {faces} face(s)")]
    FaceOutOfRange { face: u32, faces: u32 },
    #[error("mip level {mip} does not exist on a target with {levels} level(s)")]
    MipOutOfRange { mip: u32, levels: u32 },
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl From<TargetError> for RenderError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::Resource(err) => RenderError::ResourceError(err),
            other => RenderError::ContractViolation(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ColorSpec {
    format: TextureFormat,
    filter: FilterMode,
}

/// Describes a [`RenderTarget`] before any device memory is allocated.
///
/// Attachments can only be added here; a built target's attachment set is fixed.
#[derive(Debug, Clone)]
pub struct RenderTargetBuilder {
    label: String,
    width: u32,
    height: u32,
    kind: TextureKind,
    mip_levels: u32,
    depth_only: bool,
    colors: BTreeMap<u32, ColorSpec>,
    depth: Option<TextureFormat>,
}

impl RenderTargetBuilder {
    fn with_kind(label: &str, width: u32, height: u32, kind: TextureKind) -> Self {
        Self {
            label: label.to_owned(),
            width,
            height,
            kind,
            mip_levels: 1,
            depth_only: false,
            colors: BTreeMap::new(),
            depth: None,
        }
    }

    /// Adds the color attachment at `index`.
    ///
    /// Each index may be used once.
    pub fn color(
        mut self,
        index: u32,
        format: TextureFormat,
        filter: FilterMode,
    ) -> Result<Self, TargetError> {
        if self.depth_only {
            return Err(TargetError::DepthOnlyWithColor);
        }
        if format.is_depth() {
            return Err(TargetError::WrongFormat(format, "color"));
        }
        if self.colors.contains_key(&index) {
            log::error!(
                "RenderTarget '{}': color attachment {index} requested twice",
                self.label
            );
            return Err(TargetError::DuplicateAttachment(index));
        }
        self.colors.insert(index, ColorSpec { format, filter });
        Ok(self)
    }

    /// Adds a depth attachment.
    pub fn depth(mut self, format: TextureFormat) -> Result<Self, TargetError> {
        if !format.is_depth() {
            return Err(TargetError::WrongFormat(format, "depth"));
        }
        if self.depth.is_some() {
            return Err(TargetError::DuplicateDepth);
        }
        self.depth = Some(format);
        Ok(self)
    }

    /// Gives every attachment a mip chain of `levels` levels.
    pub fn mip_levels(mut self, levels: u32) -> Self {
        self.mip_levels = levels.max(1);
        self
    }

    /// Allocates the images and framebuffers.
    pub fn build(self, device: Arc<dyn GraphicsDevice>) -> Result<RenderTarget, TargetError> {
        if self.colors.is_empty() && self.depth.is_none() {
            return Err(TargetError::Empty(self.label));
        }
        let limit = device.limits().max_color_attachments;
        for (expected, index) in self.colors.keys().enumerate() {
            if *index >= limit {
                return Err(TargetError::AttachmentOutOfRange {
                    index: *index,
                    limit,
                });
            }
            if *index != expected as u32 {
                return Err(TargetError::MissingAttachment(expected as u32));
            }
        }

        // Partially built targets release what they allocated on drop.
        let mut target = RenderTarget {
            device: device.clone(),
            label: self.label,
            width: self.width,
            height: self.height,
            kind: self.kind,
            mip_levels: self.mip_levels,
            depth_only: self.depth_only,
            colors: Vec::with_capacity(self.colors.len()),
            depth: None,
            framebuffers: Vec::new(),
        };

        for (index, spec) in &self.colors {
            let label = format!("{}.color{index}", target.label);
            let id = device.create_texture(&TextureDescriptor {
                label: Some(Cow::Owned(label)),
                width: target.width,
                height: target.height,
                format: spec.format,
                filter: spec.filter,
                wrap: WrapMode::ClampToEdge,
                mip_levels: target.mip_levels,
                kind: target.kind,
            })?;
            target.colors.push(id);
        }

        if let Some(format) = self.depth {
            let label = format!("{}.depth", target.label);
            let id = device.create_texture(&TextureDescriptor {
                label: Some(Cow::Owned(label)),
                width: target.width,
                height: target.height,
                format,
                filter: FilterMode::Nearest,
                wrap: if target.depth_only {
                    WrapMode::ClampToBorder
                } else {
                    WrapMode::ClampToEdge
                },
                mip_levels: target.mip_levels,
                kind: target.kind,
            })?;
            target.depth = Some(id);
        }

        for layer in 0..target.kind.layers() {
            let id = device.create_framebuffer(&FramebufferDescriptor {
                label: Some(Cow::Borrowed(&target.label)),
                color_attachments: &target.colors,
                depth_attachment: target.depth,
                layer,
                disable_color_io: target.depth_only,
            })?;
            target.framebuffers.push(id);
        }

        log::debug!(
            "RenderTarget '{}': built {}x{} with {} color attachment(s){}",
            target.label,
            target.width,
            target.height,
            target.colors.len(),
            if target.depth.is_some() { " and depth" } else { "" }
        );
        Ok(target)
    }
}

/// A set of device images bound together as a draw destination.
///
/// The target exclusively owns its images. Dropping it destroys every image
/// and framebuffer it created. Other components read its images only through
/// the texture handles returned by [`RenderTarget::color`] and
/// [`RenderTarget::depth`].
#[derive(Debug)]
pub struct RenderTarget {
    device: Arc<dyn GraphicsDevice>,
    label: String,
    width: u32,
    height: u32,
    kind: TextureKind,
    mip_levels: u32,
    depth_only: bool,
    colors: Vec<TextureId>,
    depth: Option<TextureId>,
    /// One framebuffer per layer (six for cube targets).
    framebuffers: Vec<FramebufferId>,
}

impl RenderTarget {
    /// Starts describing a 2D target.
    pub fn builder(label: &str, width: u32, height: u32) -> RenderTargetBuilder {
        RenderTargetBuilder::with_kind(label, width, height, TextureKind::D2)
    }

    /// Starts describing a cube target with square faces.
    pub fn cube_builder(label: &str, size: u32) -> RenderTargetBuilder {
        RenderTargetBuilder::with_kind(label, size, size, TextureKind::Cube)
    }

    /// Starts describing a depth-only target. Color reads and writes are
    /// disabled on its framebuffer.
    pub fn depth_only_builder(
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<RenderTargetBuilder, TargetError> {
        let mut builder = RenderTargetBuilder::with_kind(label, width, height, TextureKind::D2);
        builder.depth_only = true;
        builder.depth(format)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` of the base level.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn is_depth_only(&self) -> bool {
        self.depth_only
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    /// The color image at attachment index `n`, if there is one.
    pub fn color(&self, n: usize) -> Option<TextureId> {
        self.colors.get(n).copied()
    }

    /// The depth image, if there is one.
    pub fn depth(&self) -> Option<TextureId> {
        self.depth
    }

    /// The aspects cleared by [`RenderTarget::begin_use`].
    pub fn clear_mask(&self) -> ClearMask {
        let mut mask = ClearMask::empty();
        if !self.colors.is_empty() {
            mask |= ClearMask::COLOR;
        }
        if self.depth.is_some() {
            mask |= ClearMask::DEPTH;
        }
        mask
    }

    /// Binds the target and clears every attachment it has.
    pub fn begin_use(&self, encoder: &mut dyn CommandEncoder) {
        encoder.bind_framebuffer(
            self.framebuffers[0],
            Viewport::full(self.width, self.height),
            self.clear_mask(),
        );
    }

    /// Binds the target without clearing, to keep accumulating draws into it.
    pub fn use_target(&self, encoder: &mut dyn CommandEncoder) {
        encoder.bind_framebuffer(
            self.framebuffers[0],
            Viewport::full(self.width, self.height),
            ClearMask::empty(),
        );
    }

    /// Binds one face of a cube target at one mip level and clears it.
    ///
    /// The viewport halves with each mip level.
    pub fn begin_use_face(
        &self,
        encoder: &mut dyn CommandEncoder,
        face: u32,
        mip: u32,
    ) -> Result<(), TargetError> {
        let framebuffer =
            *self
                .framebuffers
                .get(face as usize)
                .ok_or(TargetError::FaceOutOfRange {
                    face,
                    faces: self.framebuffers.len() as u32,
                })?;
        if mip >= self.mip_levels {
            return Err(TargetError::MipOutOfRange {
                mip,
                levels: self.mip_levels,
            });
        }
        let viewport = Viewport::full((self.width >> mip).max(1), (self.height >> mip).max(1));
        encoder.bind_framebuffer(framebuffer, viewport, self.clear_mask());
        Ok(())
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        for id in self.framebuffers.drain(..) {
            if let Err(err) = self.device.destroy_framebuffer(id) {
                log::warn!("RenderTarget '{}': failed to destroy {id:?}: {err}", self.label);
            }
        }
        for id in self.colors.drain(..).chain(self.depth.take()) {
            if let Err(err) = self.device.destroy_texture(id) {
                log::warn!("RenderTarget '{}': failed to destroy {id:?}: {err}", self.label);
            }
        }
        log::trace!("RenderTarget '{}': released", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_infra::graphics::headless::{Command, FramebufferInfo, HeadlessDevice};

    fn setup() -> (Arc<HeadlessDevice>, Arc<dyn GraphicsDevice>) {
        let device = Arc::new(HeadlessDevice::new());
        let dyn_device: Arc<dyn GraphicsDevice> = device.clone();
        (device, dyn_device)
    }

    fn bound(device: &HeadlessDevice, record: impl FnOnce(&mut dyn CommandEncoder)) -> Vec<Command> {
        device.clear_logs();
        let mut encoder = device.create_command_encoder(None);
        record(encoder.as_mut());
        device.submit_command_buffer(encoder.finish()).unwrap();
        device.command_log()
    }

    fn framebuffer_of(device: &HeadlessDevice, commands: &[Command]) -> FramebufferInfo {
        match commands.last() {
            Some(Command::BindFramebuffer { framebuffer, .. }) => {
                device.framebuffer_info(*framebuffer).unwrap()
            }
            other => panic!("expected a framebuffer bind, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_attachment_is_rejected() {
        let result = RenderTarget::builder("scene", 64, 64)
            .color(0, TextureFormat::Rgba8Unorm, FilterMode::Linear)
            .unwrap()
            .color(0, TextureFormat::Rgba16Float, FilterMode::Linear);
        assert!(matches!(result, Err(TargetError::DuplicateAttachment(0))));
    }

    #[test]
    fn test_attachment_gap_is_rejected() {
        let (_, device) = setup();
        let result = RenderTarget::builder("scene", 64, 64)
            .color(1, TextureFormat::Rgba8Unorm, FilterMode::Linear)
            .unwrap()
            .build(device);
        assert!(matches!(result, Err(TargetError::MissingAttachment(0))));
    }

    #[test]
    fn test_clear_masks_follow_attachments() {
        let (headless, device) = setup();

        let shadow = RenderTarget::depth_only_builder("shadow", 32, 32, TextureFormat::Depth32Float)
            .unwrap()
            .build(device.clone())
            .unwrap();
        assert_eq!(shadow.clear_mask(), ClearMask::DEPTH);
        assert!(shadow.color(0).is_none());
        let commands = bound(&headless, |e| shadow.begin_use(e));
        assert!(framebuffer_of(&headless, &commands).disable_color_io);

        let scene = RenderTarget::builder("scene", 32, 32)
            .color(0, TextureFormat::Rgba16Float, FilterMode::Linear)
            .unwrap()
            .color(1, TextureFormat::Rgba8Unorm, FilterMode::Nearest)
            .unwrap()
            .depth(TextureFormat::Depth24Plus)
            .unwrap()
            .build(device.clone())
            .unwrap();
        assert_eq!(scene.clear_mask(), ClearMask::COLOR | ClearMask::DEPTH);
        assert_eq!(scene.color_count(), 2);
        assert!(scene.color(2).is_none());

        let post = RenderTarget::builder("post", 32, 32)
            .color(0, TextureFormat::Rgba8Unorm, FilterMode::Linear)
            .unwrap()
            .build(device)
            .unwrap();
        assert_eq!(post.clear_mask(), ClearMask::COLOR);
    }

    #[test]
    fn test_depth_only_rejects_color() {
        let result = RenderTarget::depth_only_builder("shadow", 8, 8, TextureFormat::Depth24Plus)
            .unwrap()
            .color(0, TextureFormat::Rgba8Unorm, FilterMode::Nearest);
        assert!(matches!(result, Err(TargetError::DepthOnlyWithColor)));
    }

    #[test]
    fn test_use_target_does_not_clear() {
        let (headless, device) = setup();
        let target = RenderTarget::builder("water", 16, 8)
            .color(0, TextureFormat::Rgba8Unorm, FilterMode::Linear)
            .unwrap()
            .depth(TextureFormat::Depth24Plus)
            .unwrap()
            .build(device)
            .unwrap();

        let commands = bound(&headless, |e| {
            target.begin_use(e);
            target.use_target(e);
        });
        let clears: Vec<ClearMask> = commands
            .iter()
            .filter_map(|c| match c {
                Command::BindFramebuffer { clear, viewport, .. } => {
                    assert_eq!(*viewport, Viewport::full(16, 8));
                    Some(*clear)
                }
                _ => None,
            })
            .collect();
        assert_eq!(clears, vec![ClearMask::COLOR | ClearMask::DEPTH, ClearMask::empty()]);
    }

    #[test]
    fn test_drop_releases_every_image() {
        let (headless, device) = setup();
        {
            let _target = RenderTarget::builder("scene", 32, 32)
                .color(0, TextureFormat::Rgba8Unorm, FilterMode::Linear)
                .unwrap()
                .color(1, TextureFormat::Rgba8Unorm, FilterMode::Linear)
                .unwrap()
                .depth(TextureFormat::Depth24Plus)
                .unwrap()
                .build(device)
                .unwrap();
            assert_eq!(headless.live_texture_count(), 3);
            assert_eq!(headless.live_framebuffer_count(), 1);
        }
        assert_eq!(headless.live_texture_count(), 0);
        assert_eq!(headless.live_framebuffer_count(), 0);
    }

    #[test]
    fn test_cube_faces_and_mip_viewports() {
        let (headless, device) = setup();
        let sky = RenderTarget::cube_builder("sky", 64)
            .color(0, TextureFormat::Rgba8Unorm, FilterMode::Linear)
            .unwrap()
            .mip_levels(3)
            .build(device)
            .unwrap();
        assert_eq!(headless.live_framebuffer_count(), 6);

        let commands = bound(&headless, |e| sky.begin_use_face(e, 5, 2).unwrap());
        let info = framebuffer_of(&headless, &commands);
        assert_eq!(info.layer, 5);
        match &commands[0] {
            Command::BindFramebuffer { viewport, .. } => {
                assert_eq!(*viewport, Viewport::full(16, 16))
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut encoder = headless.create_command_encoder(None);
        assert!(matches!(
            sky.begin_use_face(encoder.as_mut(), 6, 0),
            Err(TargetError::FaceOutOfRange { face: 6, faces: 6 })
        ));
        assert!(matches!(
            sky.begin_use_face(encoder.as_mut(), 0, 3),
            Err(TargetError::MipOutOfRange { mip: 3, levels: 3 })
        ));
    }
}
