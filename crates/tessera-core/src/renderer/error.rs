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

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::config::ConfigError;
use crate::renderer::traits::KernelError;
use std::fmt;

/// An error related to the creation or use of a GPU resource (buffers, textures, framebuffers).
#[derive(Debug)]
pub enum ResourceError {
    /// The handle or ID used to reference a resource is invalid or already destroyed.
    InvalidHandle,
    /// An access fell outside the resource's bounds.
    OutOfBounds {
        /// Byte offset of the access.
        offset: u64,
        /// Length of the access in bytes.
        len: u64,
        /// Size of the resource in bytes.
        size: u64,
    },
    /// The resource was used in a role its usage flags do not allow.
    InvalidUsage(String),
    /// A descriptor was rejected (zero size, bad attachment set, ...).
    InvalidDescriptor(String),
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::OutOfBounds { offset, len, size } => write!(
                f,
                "Resource access out of bounds: {len} bytes at offset {offset} in a {size}-byte resource."
            ),
            ResourceError::InvalidUsage(msg) => write!(f, "Invalid resource usage: {msg}"),
            ResourceError::InvalidDescriptor(msg) => write!(f, "Invalid descriptor: {msg}"),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// A high-level error that can occur within the render pipeline or graphics device.
#[derive(Debug)]
pub enum RenderError {
    /// A shader the pipeline needs was not provided by the shader library.
    MissingShader(String),
    /// A resource a pass depends on was never provisioned.
    MissingResource(String),
    /// A construction-time contract was broken (capacity, attachments, slots, ...).
    ContractViolation(String),
    /// A frame stage was entered out of order.
    StageOrder {
        /// The stage that was attempted.
        attempted: &'static str,
        /// The stage the frame was in.
        current: &'static str,
    },
    /// A compute kernel failed while executing a dispatch.
    Kernel(KernelError),
    /// The pipeline configuration was rejected.
    Config(ConfigError),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::MissingShader(name) => write!(f, "Required shader '{name}' is missing."),
            RenderError::MissingResource(what) => {
                write!(f, "Required resource is not provisioned: {what}")
            }
            RenderError::ContractViolation(msg) => write!(f, "Contract violation: {msg}"),
            RenderError::StageOrder { attempted, current } => write!(
                f,
                "Frame stage '{attempted}' cannot run while the frame is in '{current}'."
            ),
            RenderError::Kernel(err) => write!(f, "Compute kernel failed: {err}"),
            RenderError::Config(err) => write!(f, "Invalid pipeline configuration: {err}"),
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            RenderError::Kernel(err) => Some(err),
            RenderError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl From<KernelError> for RenderError {
    fn from(err: KernelError) -> Self {
        RenderError::Kernel(err)
    }
}

impl From<ConfigError> for RenderError {
    fn from(err: ConfigError) -> Self {
        RenderError::Config(err)
    }
}
