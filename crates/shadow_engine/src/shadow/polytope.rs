//! Planes and convex polytopes
//!
//! A plane stores `(normal, distance)` with `normal · p + distance` giving
//! the signed distance of `p`. Polytopes are intersections of the positive
//! half-spaces of their planes: a point is inside when it has non-negative
//! distance to every plane.

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::scene::bounds::Aabb;

/// Oriented plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Plane normal; points into the positive half-space
    pub normal: Vec3,
    /// Offset so that `normal · p + distance == 0` on the plane
    pub distance: f64,
}

impl Plane {
    /// Plane from raw coefficients `a x + b y + c z + d`
    pub const fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self { normal: Vec3::new(a, b, c), distance: d }
    }

    /// Plane through `point` with the given normal
    pub fn from_normal_point(normal: Vec3, point: &Vec3) -> Self {
        Self { normal, distance: -normal.dot(point) }
    }

    /// Plane through three points, normal `(b - a) x (c - b)`.
    ///
    /// Collinear points give a zero normal, which every point lies on.
    pub fn from_points(a: &Vec3, b: &Vec3, c: &Vec3) -> Self {
        let normal = (b - a).cross(&(c - b));
        let length = normal.norm();
        let normal = if length > 1e-6 { normal / length } else { Vec3::zeros() };
        Self::from_normal_point(normal, a)
    }

    fn as_vec4(&self) -> Vec4 {
        Vec4::new(self.normal.x, self.normal.y, self.normal.z, self.distance)
    }

    /// Signed distance of a point
    pub fn distance_to(&self, p: &Vec3) -> f64 {
        self.normal.dot(p) + self.distance
    }

    /// Dot product of the normal with a direction
    pub fn dot_normal(&self, v: &Vec3) -> f64 {
        self.normal.dot(v)
    }

    /// Same plane facing the other way
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self { normal: -self.normal, distance: -self.distance }
    }

    /// Scale so the normal has unit length
    #[must_use]
    pub fn normalized(&self) -> Self {
        let length = self.normal.norm();
        if length > 0.0 {
            Self { normal: self.normal / length, distance: self.distance / length }
        } else {
            *self
        }
    }

    /// Re-express the plane in another space.
    ///
    /// `m` maps points of the target space into the plane's current space,
    /// which is the inverse of the usual point transform and avoids inverting
    /// projection matrices.
    #[must_use]
    pub fn transform_providing_inverse(&self, m: &Mat4) -> Self {
        let v = m.transpose() * self.as_vec4();
        Self::new(v.x, v.y, v.z, v.w).normalized()
    }

    /// Which side of the plane the box is on: `1` fully in front, `-1`
    /// fully behind, `0` straddling.
    pub fn classify_aabb(&self, b: &Aabb) -> i32 {
        let mut upper = b.min;
        let mut lower = b.max;
        for i in 0..3 {
            if self.normal[i] >= 0.0 {
                upper[i] = b.max[i];
                lower[i] = b.min[i];
            } else {
                upper[i] = b.min[i];
                lower[i] = b.max[i];
            }
        }
        if self.distance_to(&lower) > 0.0 {
            1
        } else if self.distance_to(&upper) < 0.0 {
            -1
        } else {
            0
        }
    }
}

/// Convex region bounded by planes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polytope {
    planes: Vec<Plane>,
}

impl Polytope {
    /// Polytope from a list of planes
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// The clip-space cube `[-1, 1]^3`, planes ordered left, right,
    /// bottom, top, near, far.
    pub fn unit_frustum() -> Self {
        Self::from_planes(vec![
            Plane::new(1.0, 0.0, 0.0, 1.0),
            Plane::new(-1.0, 0.0, 0.0, 1.0),
            Plane::new(0.0, 1.0, 0.0, 1.0),
            Plane::new(0.0, -1.0, 0.0, 1.0),
            Plane::new(0.0, 0.0, 1.0, 1.0),
            Plane::new(0.0, 0.0, -1.0, 1.0),
        ])
    }

    /// Bounding planes
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// True when there are no planes at all
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Number of planes
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    /// Add a bounding plane
    pub fn add(&mut self, plane: Plane) {
        self.planes.push(plane);
    }

    /// Add several bounding planes
    pub fn extend(&mut self, planes: impl IntoIterator<Item = Plane>) {
        self.planes.extend(planes);
    }

    /// Re-express every plane, see [`Plane::transform_providing_inverse`]
    pub fn transform_providing_inverse(&mut self, m: &Mat4) {
        for plane in &mut self.planes {
            *plane = plane.transform_providing_inverse(m);
        }
    }

    /// Point containment with a tolerance
    pub fn contains_point(&self, p: &Vec3, tolerance: f64) -> bool {
        self.planes.iter().all(|plane| plane.distance_to(p) >= -tolerance)
    }

    /// Conservative box test: false only if the box is fully behind a plane
    pub fn contains_aabb(&self, b: &Aabb) -> bool {
        b.valid() && self.planes.iter().all(|plane| plane.classify_aabb(b) >= 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_plane_from_points_orientation() {
        let p = Plane::from_points(&Vec3::zeros(), &Vec3::x(), &Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(p.normal.z, 1.0, epsilon = EPSILON);
        assert!(p.distance_to(&Vec3::new(0.0, 0.0, 2.0)) > 0.0);
    }

    #[test]
    fn test_transform_providing_inverse_moves_plane_with_points() {
        // x >= 0 in the source space
        let plane = Plane::new(1.0, 0.0, 0.0, 0.0);
        // Target space is the source shifted by +3 in x
        let target_to_source = Mat4::new_translation(&Vec3::new(-3.0, 0.0, 0.0));
        let moved = plane.transform_providing_inverse(&target_to_source);
        assert_relative_eq!(moved.distance_to(&Vec3::new(3.0, 0.0, 0.0)), 0.0, epsilon = EPSILON);
        assert!(moved.distance_to(&Vec3::new(4.0, 0.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_unit_frustum_in_eye_space() {
        let projection = Mat4::new_orthographic(-2.0, 2.0, -1.0, 1.0, 1.0, 10.0);
        let mut polytope = Polytope::unit_frustum();
        polytope.transform_providing_inverse(&projection);
        assert!(polytope.contains_point(&Vec3::new(1.9, 0.0, -5.0), EPSILON));
        assert!(!polytope.contains_point(&Vec3::new(2.1, 0.0, -5.0), EPSILON));
        assert!(!polytope.contains_point(&Vec3::new(0.0, 0.0, -11.0), EPSILON));
        let corner = projection.try_inverse().unwrap().project_point(&Vec3::new(1.0, 1.0, 1.0));
        assert!(polytope.contains_point(&corner, 1e-6));
    }

    #[test]
    fn test_aabb_classification() {
        let plane = Plane::new(0.0, 1.0, 0.0, 0.0);
        let above = Aabb::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 2.0, 1.0));
        let below = Aabb::new(Vec3::new(0.0, -2.0, 0.0), Vec3::new(1.0, -1.0, 1.0));
        let across = Aabb::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(plane.classify_aabb(&above), 1);
        assert_eq!(plane.classify_aabb(&below), -1);
        assert_eq!(plane.classify_aabb(&across), 0);

        let polytope = Polytope::from_planes(vec![plane]);
        assert!(polytope.contains_aabb(&across));
        assert!(!polytope.contains_aabb(&below));
    }
}
