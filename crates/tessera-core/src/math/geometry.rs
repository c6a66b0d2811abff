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

//! Bounding volumes used as the culling granularity.
//!
//! A drawable or a terrain chunk carries exactly one [`BoundingVolume`]. The
//! variant set is closed: every kind answers the same capability contract
//! (frustum intersection, point containment, growth by a point, translation).

use super::{Frustum, Vec3};

/// Result of classifying a volume against a frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// The volume lies completely outside at least one plane.
    Outside,
    /// The volume straddles one or more planes.
    Intersecting,
    /// The volume lies completely inside every plane.
    Inside,
}

impl Containment {
    /// Returns `true` unless the volume is fully outside.
    #[inline]
    pub fn is_visible(self) -> bool {
        self != Containment::Outside
    }
}

/// Represents an Axis-Aligned Bounding Box (AABB).
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Aabb {
    /// The corner of the box with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner of the box with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that acts as the identity for [`Aabb::merged_with_point`].
    pub const INVALID: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Creates a new `Aabb` from two corner points, in any order.
    #[inline]
    pub fn from_min_max(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a new `Aabb` from a center point and its half-extents.
    ///
    /// Negative half-extents are made non-negative.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Creates an `Aabb` that tightly encloses a set of points.
    ///
    /// Returns `None` if `points` is empty.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self::from_min_max(*first, *first);
        for point in rest {
            aabb = aabb.merged_with_point(*point);
        }
        Some(aabb)
    }

    /// The center point of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half the size of the box on each axis.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The full size of the box on each axis.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Checks that `min <= max` on all axes. Degenerate boxes are valid.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Checks if a point is inside or on the boundary of the box.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Euclidean distance from `point` to the nearest point of the box. Zero inside.
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        ((self.center() - point).abs() - self.half_extents())
            .max(Vec3::ZERO)
            .length()
    }

    /// Returns a box grown to also enclose `point`.
    #[inline]
    pub fn merged_with_point(&self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Returns a box with the same extents, re-centered on `center`.
    #[inline]
    pub fn translated_to(&self, center: Vec3) -> Self {
        Self::from_center_half_extents(center, self.half_extents())
    }

    /// Widens the XZ footprint to a square of the larger horizontal side.
    ///
    /// Objects that spin about the vertical axis keep a stable box this way.
    pub fn loosened_width(&self) -> Self {
        let half = self.half_extents();
        let side = half.x.max(half.z);
        Self::from_center_half_extents(self.center(), Vec3::new(side, half.y, side))
    }

    /// Widens the box to a cube of its largest side.
    pub fn loosened_all(&self) -> Self {
        let side = self.half_extents().max_element();
        Self::from_center_half_extents(self.center(), Vec3::splat(side))
    }

    /// Classifies the box against every plane of `frustum`.
    pub fn classify(&self, frustum: &Frustum) -> Containment {
        let center = self.center();
        let half = self.half_extents();
        let mut result = Containment::Inside;
        for plane in frustum.planes() {
            let distance = plane.signed_distance(center);
            let radius = plane.normal.abs().dot(half);
            if distance < -radius {
                return Containment::Outside;
            }
            if distance < radius {
                result = Containment::Intersecting;
            }
        }
        result
    }
}

impl Default for Aabb {
    /// Returns [`Aabb::INVALID`].
    #[inline]
    fn default() -> Self {
        Self::INVALID
    }
}

/// A bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere, never negative.
    pub radius: f32,
}

impl Sphere {
    /// Creates a sphere; a negative radius is made positive.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.abs(),
        }
    }

    /// The smallest sphere centered on the box that encloses it.
    pub fn enclosing(aabb: &Aabb) -> Self {
        Self::new(aabb.center(), aabb.half_extents().length())
    }

    /// Checks if a point is inside or on the sphere.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }

    /// Returns a sphere grown (about its current center) to also enclose `point`.
    #[inline]
    pub fn merged_with_point(&self, point: Vec3) -> Self {
        Self::new(self.center, self.radius.max(self.center.distance(point)))
    }

    /// Classifies the sphere against every plane of `frustum`.
    pub fn classify(&self, frustum: &Frustum) -> Containment {
        let mut result = Containment::Inside;
        for plane in frustum.planes() {
            let distance = plane.signed_distance(self.center);
            if distance < -self.radius {
                return Containment::Outside;
            }
            if distance < self.radius {
                result = Containment::Intersecting;
            }
        }
        result
    }
}

/// The closed set of bounding-volume kinds a drawable or chunk may carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    /// An axis-aligned box.
    Aabb(Aabb),
    /// A sphere.
    Sphere(Sphere),
}

impl BoundingVolume {
    /// Classifies the volume against a frustum.
    pub fn classify(&self, frustum: &Frustum) -> Containment {
        match self {
            BoundingVolume::Aabb(aabb) => aabb.classify(frustum),
            BoundingVolume::Sphere(sphere) => sphere.classify(frustum),
        }
    }

    /// Returns `true` if any part of the volume may be inside the frustum.
    #[inline]
    pub fn intersects_frustum(&self, frustum: &Frustum) -> bool {
        self.classify(frustum).is_visible()
    }

    /// Checks if a point lies within the volume.
    pub fn contains_point(&self, point: Vec3) -> bool {
        match self {
            BoundingVolume::Aabb(aabb) => aabb.contains_point(point),
            BoundingVolume::Sphere(sphere) => sphere.contains_point(point),
        }
    }

    /// Grows the volume in place so that it encloses `point`.
    pub fn update_with_point(&mut self, point: Vec3) {
        *self = match self {
            BoundingVolume::Aabb(aabb) => BoundingVolume::Aabb(aabb.merged_with_point(point)),
            BoundingVolume::Sphere(sphere) => {
                BoundingVolume::Sphere(sphere.merged_with_point(point))
            }
        };
    }

    /// Moves the volume so its center sits at `center`, keeping its extents.
    pub fn translated_to(&self, center: Vec3) -> Self {
        match self {
            BoundingVolume::Aabb(aabb) => BoundingVolume::Aabb(aabb.translated_to(center)),
            BoundingVolume::Sphere(sphere) => {
                BoundingVolume::Sphere(Sphere::new(center, sphere.radius))
            }
        }
    }

    /// The center of the volume.
    pub fn center(&self) -> Vec3 {
        match self {
            BoundingVolume::Aabb(aabb) => aabb.center(),
            BoundingVolume::Sphere(sphere) => sphere.center,
        }
    }

    /// Returns the box if this volume is an [`Aabb`].
    pub fn as_aabb(&self) -> Option<&Aabb> {
        match self {
            BoundingVolume::Aabb(aabb) => Some(aabb),
            BoundingVolume::Sphere(_) => None,
        }
    }
}

impl From<Aabb> for BoundingVolume {
    fn from(aabb: Aabb) -> Self {
        BoundingVolume::Aabb(aabb)
    }
}

impl From<Sphere> for BoundingVolume {
    fn from(sphere: Sphere) -> Self {
        BoundingVolume::Sphere(sphere)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Mat4;
    use approx::assert_relative_eq;

    fn test_frustum() -> Frustum {
        // Camera at the origin looking down -Z, 90 degree vertical FOV, far plane at 100.
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_proj(&(proj * view))
    }

    #[test]
    fn test_aabb_from_min_max_orders_corners() {
        let aabb = Aabb::from_min_max(Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 2.0, -3.0));
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_aabb_from_points() {
        assert!(Aabb::from_points(&[]).is_none());
        let aabb = Aabb::from_points(&[
            Vec3::new(0.0, 1.0, 2.0),
            Vec3::new(-4.0, 5.0, 0.5),
            Vec3::new(3.0, -1.0, 1.0),
        ])
        .unwrap();
        assert_eq!(aabb.min, Vec3::new(-4.0, -1.0, 0.5));
        assert_eq!(aabb.max, Vec3::new(3.0, 5.0, 2.0));
        assert_relative_eq!(aabb.center().x, -0.5);
        assert_relative_eq!(aabb.half_extents().y, 3.0);
    }

    #[test]
    fn test_aabb_invalid_merges_to_point() {
        let point = Vec3::new(2.0, 3.0, 4.0);
        let aabb = Aabb::INVALID.merged_with_point(point);
        assert!(aabb.is_valid());
        assert_eq!(aabb.min, point);
        assert_eq!(aabb.max, point);
        assert!(!Aabb::default().is_valid());
    }

    #[test]
    fn test_aabb_loosened() {
        let aabb = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        let width = aabb.loosened_width();
        assert_eq!(width.half_extents(), Vec3::new(3.0, 2.0, 3.0));
        let all = aabb.loosened_all();
        assert_eq!(all.half_extents(), Vec3::splat(3.0));
    }

    #[test]
    fn test_aabb_classify_against_frustum() {
        let frustum = test_frustum();
        let inside = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -10.0), Vec3::ONE);
        let straddling = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -100.0), Vec3::ONE);
        let behind = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE);
        let beside = Aabb::from_center_half_extents(Vec3::new(50.0, 0.0, -10.0), Vec3::ONE);

        assert_eq!(inside.classify(&frustum), Containment::Inside);
        assert_eq!(straddling.classify(&frustum), Containment::Intersecting);
        assert_eq!(behind.classify(&frustum), Containment::Outside);
        assert_eq!(beside.classify(&frustum), Containment::Outside);
    }

    #[test]
    fn test_sphere_classify_and_grow() {
        let frustum = test_frustum();
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -20.0), 2.0);
        assert_eq!(sphere.classify(&frustum), Containment::Inside);
        let far_behind = Sphere::new(Vec3::new(0.0, 0.0, 30.0), 2.0);
        assert_eq!(far_behind.classify(&frustum), Containment::Outside);

        let grown = sphere.merged_with_point(Vec3::new(0.0, 0.0, -25.0));
        assert_relative_eq!(grown.radius, 5.0);
        assert!(grown.contains_point(Vec3::new(0.0, 4.9, -20.0)));
    }

    #[test]
    fn test_bounding_volume_dispatches_per_variant() {
        let frustum = test_frustum();
        let mut volume: BoundingVolume =
            Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::splat(0.5)).into();
        assert!(volume.intersects_frustum(&frustum));
        volume.update_with_point(Vec3::new(0.0, 0.0, 20.0));
        assert!(volume.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(volume.as_aabb().is_some());

        let moved = volume.translated_to(Vec3::new(0.0, 0.0, 500.0));
        assert!(!moved.intersects_frustum(&frustum));

        let sphere: BoundingVolume = Sphere::enclosing(&Aabb::from_center_half_extents(
            Vec3::ZERO,
            Vec3::new(3.0, 4.0, 0.0),
        ))
        .into();
        assert!(sphere.as_aabb().is_none());
        assert_relative_eq!(sphere.center().length(), 0.0);
    }

    #[test]
    fn test_aabb_distance_to_point() {
        let aabb = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.distance_to_point(Vec3::splat(0.5)), 0.0);
        assert_relative_eq!(aabb.distance_to_point(Vec3::new(4.0, 0.5, 5.0)), 5.0);
    }
}
