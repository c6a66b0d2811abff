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

//! The frame pipeline.
//!
//! [`RenderManager`] owns every render target, both queue double buffers and
//! the culled terrain drawcalls, and records one command stream per frame in
//! a fixed stage order:
//!
//! `Idle -> UpdateQueues -> SwapQueues -> ShadowPass -> OpaqueScenePass ->
//! [WaterPass] -> [ReflectionPass] -> DeferredComposite -> PostFilterChain -> Present`
//!
//! The bracketed stages are skipped when the scene has nothing for them.

mod manager;
mod stage;
mod stats;

pub use manager::*;
pub use stage::*;
pub use stats::*;
