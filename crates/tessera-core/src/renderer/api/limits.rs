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

//! Device capability limits that the pipeline validates against at construction.

/// Limits reported by a [`GraphicsDevice`](crate::renderer::GraphicsDevice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum number of work groups in any one dispatch dimension.
    pub max_dispatch_groups_per_dimension: u32,
    /// Number of storage-buffer binding points.
    pub max_storage_bindings: u32,
    /// Number of vertex attribute slots.
    pub max_vertex_slots: u32,
    /// Number of color attachments a framebuffer may hold.
    pub max_color_attachments: u32,
    /// Number of texture units.
    pub max_texture_units: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_dispatch_groups_per_dimension: 65_535,
            max_storage_bindings: 8,
            max_vertex_slots: 16,
            max_color_attachments: 8,
            max_texture_units: 16,
        }
    }
}
