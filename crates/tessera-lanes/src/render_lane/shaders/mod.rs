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

//! Built-in shader sources.
//!
//! - [`CHUNK_CULL_WGSL`] - Per-chunk frustum cull that compacts surviving index
//!   ranges and accumulates the indirect draw count.

/// Chunk cull compute shader.
///
/// One work group per chunk. Bindings follow the default
/// [`SlotLayout`](tessera_core::config::SlotLayout): chunk records at 1, source
/// indices at 2, the indirect record at 3 and output indices at 4. Parameters
/// live in a uniform block at binding 0.
pub const CHUNK_CULL_WGSL: &str = include_str!("chunk_cull.wgsl");
