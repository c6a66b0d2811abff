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

//! A CPU-executed graphics device.
//!
//! Commands are recorded into a [`HeadlessCommandEncoder`] and run when the
//! finished buffer is submitted. Buffers hold real bytes, dispatches run the
//! [`ComputeKernel`](tessera_core::renderer::ComputeKernel) registered for the
//! bound program (groups in ascending linear order) and every draw is recorded
//! as a [`DrawRecord`] that tests can inspect. Textures have no texel storage.
//!
//! The executor also enforces the ordering rules a real driver would only
//! punish with corruption: draws reading device-written indices or indirect
//! records need a covering memory barrier, and a buffer may not be bound as
//! storage while a draw reads it.

mod command;
mod device;
mod executor;

pub use self::command::{Command, HeadlessCommandEncoder};
pub use self::device::{FramebufferInfo, HeadlessDevice, TextureInfo};
pub use self::executor::{DrawKind, DrawRecord};
