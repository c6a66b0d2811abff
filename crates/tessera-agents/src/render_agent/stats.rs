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

use super::FrameStage;
use tessera_core::renderer::TextureId;

/// What one frame recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Drawables encoded through the scene, across every pass.
    pub draws: u32,
    /// Indirect terrain draws recorded.
    pub indirect_draws: u32,
    /// Cull dispatches recorded.
    pub dispatches: u32,
    /// Work groups across those dispatches.
    pub cull_groups: u32,
    pub filter_passes: u32,
    /// Environment cube faces re-rendered.
    pub sky_faces: u32,
    pub stages_run: Vec<FrameStage>,
    pub stages_skipped: Vec<FrameStage>,
    /// The texture handed to presentation.
    pub presented: Option<TextureId>,
}

impl FrameStats {
    pub(crate) fn begin(frame: u64) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    pub fn ran(&self, stage: FrameStage) -> bool {
        self.stages_run.contains(&stage)
    }
}
