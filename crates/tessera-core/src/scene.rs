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

//! The scene collaborator: what the pipeline asks of the world it renders.
//!
//! Traversal, transforms and per-object draw encoding stay on the scene side;
//! the pipeline only sorts the visible set into tiers and decides when and into
//! which target each tier is drawn.

use crate::math::{Mat4, Vec3};
use crate::renderer::{CommandEncoder, RenderError};

/// An opaque reference to one drawable owned by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableHandle(pub u64);

/// How a drawable moves, which decides the tier family it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawableClass {
    /// Never moves.
    Static,
    /// Moves under physics or script control.
    Dynamic,
    /// Skinned or otherwise animated in place.
    Animated,
}

/// One visible drawable as reported by scene traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleDrawable {
    /// The drawable.
    pub handle: DrawableHandle,
    /// Its movement class.
    pub class: DrawableClass,
    /// Distance from the camera to the drawable's bounds.
    pub distance: f32,
    /// Whether the drawable casts shadows at all.
    pub casts_shadow: bool,
}

/// The camera state for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// Combined view-projection transform.
    pub view_proj: Mat4,
    /// World-space eye position.
    pub position: Vec3,
    /// Camera speed in world units per second.
    pub speed: f32,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY,
            position: Vec3::ZERO,
            speed: 0.0,
        }
    }
}

/// The pass a drawable is being encoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Depth-only shadow pass for a cascade level (1 near, 2 mid, 3 far).
    Shadow {
        /// Cascade level.
        level: u8,
    },
    /// Main opaque pass into the scene G-buffer.
    Opaque,
    /// Water surface pass.
    Water,
    /// Mirrored pass into the reflection target.
    Reflection,
}

/// Implemented by the scene graph that feeds the pipeline.
pub trait SceneSource {
    /// The camera for the frame being built.
    fn camera(&self) -> CameraView;

    /// The light-space transform for a shadow cascade level.
    fn light_view_proj(&self, level: u8) -> Mat4;

    /// The mirrored transform used for the reflection pass.
    fn reflection_view_proj(&self) -> Mat4 {
        self.camera().view_proj
    }

    /// Calls `visitor` once for each drawable visible this frame.
    fn visit_visible(&self, visitor: &mut dyn FnMut(VisibleDrawable));

    /// Whether any water surface is visible this frame.
    fn water_visible(&self) -> bool {
        false
    }

    /// Whether the sky changed since the last frame and the environment cube
    /// needs re-rendering.
    fn sky_changed(&self) -> bool {
        false
    }

    /// Records the draw commands for one drawable into `encoder`.
    fn encode_drawable(
        &self,
        handle: DrawableHandle,
        pass: PassKind,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), RenderError>;
}
