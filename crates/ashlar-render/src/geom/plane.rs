use glam::{Mat4, Vec3};

/// Oriented plane `normal · p = distance`, with a unit normal.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    normal: Vec3,
    distance: f32,
}

impl Default for Plane {
    #[inline]
    fn default() -> Self {
        Self { normal: Vec3::Z, distance: 0.0 }
    }
}

impl Plane {
    /// Plane through `point` with the given (not necessarily unit) normal.
    #[inline]
    pub fn new(normal: Vec3, point: Vec3) -> Self {
        let normal = normal.normalize();
        Self { normal, distance: normal.dot(point) }
    }

    #[inline]
    pub fn from_normal_distance(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    #[inline]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Signed distance of `p` to the plane; positive on the normal side.
    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) - self.distance
    }

    /// Orthogonal projection of `p` onto the plane.
    #[inline]
    pub fn project(&self, p: Vec3) -> Vec3 {
        p - self.normal * self.signed_distance(p)
    }

    /// The plane mapped through `m`.
    ///
    /// Normals transform by the inverse transpose; the anchor point by `m`
    /// itself. `m` must be invertible.
    pub fn transformed(&self, m: &Mat4) -> Plane {
        let point = m.transform_point3(self.normal * self.distance);
        let normal = m
            .inverse()
            .transpose()
            .transform_vector3(self.normal)
            .normalize();
        Plane { normal, distance: normal.dot(point) }
    }
}
