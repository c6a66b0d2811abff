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

//! Rendering lane - hot path for graphics operations

mod chunk;
mod cull_kernel;
mod device_buffer;
mod filter;
mod frame_queues;
mod indirect_cull;
mod queue;
pub mod shaders;
mod target;

pub use chunk::*;
pub use cull_kernel::*;
pub use device_buffer::*;
pub use filter::*;
pub use frame_queues::*;
pub use indirect_cull::*;
pub use queue::*;
pub use target::*;
