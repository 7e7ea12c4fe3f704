use glam::{Mat4, Vec3};

use super::Plane;

/// Axis-aligned bounding box.
///
/// The empty box has `min > max` on every axis; extending an empty box by a
/// point yields the degenerate box containing exactly that point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    #[inline]
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Radius of the sphere circumscribing the box.
    #[inline]
    pub fn radius(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            (self.max - self.min).length() * 0.5
        }
    }

    #[inline]
    pub fn extend_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn extend(&mut self, other: &Aabb) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Axis-aligned bounds of the transformed box (all eight corners mapped).
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        if self.is_empty() {
            return Self::EMPTY;
        }
        let mut out = Self::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.extend_point(m.transform_point3(corner));
        }
        out
    }

    /// Largest signed distance from the plane over the box.
    ///
    /// Negative means the whole box lies behind the plane (clipped away by a
    /// clip plane keeping the positive half-space).
    pub fn max_distance(&self, plane: &Plane) -> f32 {
        let center = self.center();
        let extent = (self.max - self.min) * 0.5;
        plane.signed_distance(center) + extent.dot(plane.normal().abs())
    }
}
