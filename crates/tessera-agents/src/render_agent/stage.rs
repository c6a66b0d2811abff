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

use tessera_core::renderer::RenderError;

/// One stage of a frame, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameStage {
    Idle,
    UpdateQueues,
    SwapQueues,
    ShadowPass,
    OpaqueScenePass,
    WaterPass,
    ReflectionPass,
    DeferredComposite,
    PostFilterChain,
    Present,
}

impl FrameStage {
    /// Every stage a frame passes through, in order.
    pub const ORDER: [FrameStage; 10] = [
        FrameStage::Idle,
        FrameStage::UpdateQueues,
        FrameStage::SwapQueues,
        FrameStage::ShadowPass,
        FrameStage::OpaqueScenePass,
        FrameStage::WaterPass,
        FrameStage::ReflectionPass,
        FrameStage::DeferredComposite,
        FrameStage::PostFilterChain,
        FrameStage::Present,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FrameStage::Idle => "Idle",
            FrameStage::UpdateQueues => "UpdateQueues",
            FrameStage::SwapQueues => "SwapQueues",
            FrameStage::ShadowPass => "ShadowPass",
            FrameStage::OpaqueScenePass => "OpaqueScenePass",
            FrameStage::WaterPass => "WaterPass",
            FrameStage::ReflectionPass => "ReflectionPass",
            FrameStage::DeferredComposite => "DeferredComposite",
            FrameStage::PostFilterChain => "PostFilterChain",
            FrameStage::Present => "Present",
        }
    }

    /// Stages a frame may skip by policy.
    pub fn is_optional(self) -> bool {
        matches!(self, FrameStage::WaterPass | FrameStage::ReflectionPass)
    }
}

/// Enforces the stage order of a frame.
///
/// A stage may only follow the stage before it, or an earlier one when
/// every stage in between is optional. `Present` is followed by `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTracker {
    current: FrameStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            current: FrameStage::Idle,
        }
    }
}

impl StageTracker {
    pub fn current(&self) -> FrameStage {
        self.current
    }

    /// Whether `next` may follow the current stage.
    pub fn allows(&self, next: FrameStage) -> bool {
        if self.current == FrameStage::Present {
            return next == FrameStage::Idle;
        }
        if next <= self.current {
            return false;
        }
        FrameStage::ORDER
            .iter()
            .filter(|s| **s > self.current && **s < next)
            .all(|s| s.is_optional())
    }

    /// Moves to `next`, or reports the violation and stays put.
    pub fn advance(&mut self, next: FrameStage) -> Result<(), RenderError> {
        if !self.allows(next) {
            log::error!(
                "RenderManager: Stage {} cannot follow {}",
                next.name(),
                self.current.name()
            );
            return Err(RenderError::StageOrder {
                attempted: next.name(),
                current: self.current.name(),
            });
        }
        log::trace!("RenderManager: {} -> {}", self.current.name(), next.name());
        self.current = next;
        Ok(())
    }

    /// Abandons the frame in progress.
    pub fn reset(&mut self) {
        self.current = FrameStage::Idle;
    }
}
