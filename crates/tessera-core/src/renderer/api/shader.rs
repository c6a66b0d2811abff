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

//! Shader handles. Compilation and uniform plumbing live outside the pipeline;
//! the pipeline only ever sees handles resolved by name.

/// An opaque handle to a compiled shader program (graphics or compute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub usize);

/// The shader/material collaborator.
///
/// Resolves program names to handles. Implementations own compilation and
/// parameter binding; the pipeline resolves every name it needs once, at
/// construction.
pub trait ShaderLibrary: Send + Sync {
    /// Looks up a compiled program by name.
    fn shader(&self, name: &str) -> Option<ShaderId>;
}
