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

//! Math types used throughout the pipeline.
//!
//! Vector and matrix types come from `glam`; this module adds the bounding
//! volumes and the view frustum used for visibility determination.

pub mod frustum;
pub mod geometry;

pub use glam::{Mat4, UVec3, Vec3, Vec4};

pub use self::frustum::{Frustum, Plane};
pub use self::geometry::{Aabb, BoundingVolume, Containment, Sphere};

/// A small value used for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;

/// Checks if two floating-point numbers are approximately equal within `epsilon`.
#[inline]
pub fn approx_eq_eps(a: f32, b: f32, epsilon: f32) -> bool {
    (a - b).abs() < epsilon
}

/// Checks if two floating-point numbers are approximately equal using [`EPSILON`].
#[inline]
pub fn approx_eq(a: f32, b: f32) -> bool {
    approx_eq_eps(a, b, EPSILON)
}
