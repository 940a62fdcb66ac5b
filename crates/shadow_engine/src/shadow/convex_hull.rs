//! Edge-list convex hull used to measure regions in light clip space
//!
//! The hull is a bag of segments. Clipping against a plane trims segments
//! and caps the cut with a ring through the new intersection points, which
//! keeps the hull closed so its per-axis extents remain exact.

use std::cmp::Ordering;

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::shadow::frustum::Frustum;
use crate::shadow::polytope::Plane;

type Edge = (Vec3, Vec3);

/// Convex region stored as its edges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvexHull {
    edges: Vec<Edge>,
}

impl ConvexHull {
    /// Hull of the twelve edges of a frustum
    pub fn from_frustum(frustum: &Frustum) -> Self {
        let c = &frustum.corners;
        let ring = |a: usize, b: usize| (c[a], c[b]);
        Self {
            edges: vec![
                ring(0, 1),
                ring(1, 2),
                ring(2, 3),
                ring(3, 0),
                ring(4, 5),
                ring(5, 6),
                ring(6, 7),
                ring(7, 4),
                ring(0, 4),
                ring(1, 5),
                ring(2, 6),
                ring(3, 7),
            ],
        }
    }

    /// False once clipping removed everything
    pub fn valid(&self) -> bool {
        !self.edges.is_empty()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Every edge endpoint
    pub fn points(&self) -> impl Iterator<Item = &Vec3> {
        self.edges.iter().flat_map(|(a, b)| [a, b])
    }

    /// Map every endpoint through `m`, with the homogeneous divide
    pub fn transform(&mut self, m: &Mat4) {
        for (a, b) in &mut self.edges {
            *a = m.project_point(a);
            *b = m.project_point(b);
        }
    }

    /// Keep the part on the positive side of `plane`
    pub fn clip(&mut self, plane: &Plane) {
        let mut intersections: Vec<Vec3> = Vec::new();

        self.edges.retain_mut(|(v0, v1)| {
            let d0 = plane.distance_to(v0);
            let d1 = plane.distance_to(v1);
            if d0 < 0.0 && d1 < 0.0 {
                return false;
            }
            if d0 >= 0.0 && d1 >= 0.0 {
                return true;
            }
            let intersection = *v0 - (*v1 - *v0) * (d0 / (d1 - d0));
            intersections.push(intersection);
            if d0 < 0.0 {
                *v0 = intersection;
            } else {
                *v1 = intersection;
            }
            true
        });

        match intersections.len() {
            0 | 1 => {}
            2 => self.edges.push((intersections[0], intersections[1])),
            3 => {
                self.edges.push((intersections[0], intersections[1]));
                self.edges.push((intersections[1], intersections[2]));
                self.edges.push((intersections[2], intersections[0]));
            }
            _ => self.cap_with_ring(&plane.normal, &intersections),
        }
    }

    fn cap_with_ring(&mut self, normal: &Vec3, points: &[Vec3]) {
        let side_x = Vec3::x().cross(normal);
        let side_y = Vec3::y().cross(normal);
        let side = if side_x.norm_squared() >= side_y.norm_squared() { side_x } else { side_y };
        let side = side.normalize();
        let up = side.cross(normal).normalize();

        #[allow(clippy::cast_precision_loss)]
        let center = points.iter().sum::<Vec3>() / points.len() as f64;

        let mut ring: Vec<(f64, Vec3)> = points
            .iter()
            .map(|p| {
                let dv = p - center;
                (dv.dot(&side).atan2(dv.dot(&up)), *p)
            })
            .collect();
        ring.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        // Points at the same angle are duplicates from shared corners.
        ring.dedup_by(|later, earlier| {
            let same = later.0 == earlier.0;
            if same {
                earlier.1 = later.1;
            }
            same
        });

        if let Some(&(_, last)) = ring.last() {
            let mut previous = last;
            for &(_, point) in &ring {
                self.edges.push((previous, point));
                previous = point;
            }
        }
    }

    /// Smallest coordinate on an axis, `f64::MAX` for an empty hull
    pub fn min(&self, axis: usize) -> f64 {
        self.points().map(|p| p[axis]).fold(f64::MAX, f64::min)
    }

    /// Largest coordinate on an axis, `-f64::MAX` for an empty hull
    pub fn max(&self, axis: usize) -> f64 {
        self.points().map(|p| p[axis]).fold(-f64::MAX, f64::max)
    }

    /// Smallest `delta[axis] / delta.y` over points, `delta = p - eye`
    pub fn min_ratio(&self, eye: &Vec3, axis: usize) -> f64 {
        self.points()
            .map(|p| {
                let delta = p - eye;
                delta[axis] / delta.y
            })
            .fold(f64::MAX, f64::min)
    }

    /// Largest `delta[axis] / delta.y` over points, `delta = p - eye`
    pub fn max_ratio(&self, eye: &Vec3, axis: usize) -> f64 {
        self.points()
            .map(|p| {
                let delta = p - eye;
                delta[axis] / delta.y
            })
            .fold(-f64::MAX, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-9;

    /// A frustum whose corners are the cube `[-1, 1]^3`
    fn unit_cube() -> ConvexHull {
        let frustum = Frustum::new(&Mat4::identity(), &Mat4::new_orthographic(-1.0, 1.0, -1.0, 1.0, -1.0, 1.0), None).unwrap();
        ConvexHull::from_frustum(&frustum)
    }

    #[test]
    fn test_cube_extents() {
        let hull = unit_cube();
        assert_eq!(hull.edge_count(), 12);
        for axis in 0..3 {
            assert_relative_eq!(hull.min(axis), -1.0, epsilon = EPSILON);
            assert_relative_eq!(hull.max(axis), 1.0, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_axis_clip_caps_with_ring() {
        let mut hull = unit_cube();
        hull.clip(&Plane::new(-1.0, 0.0, 0.0, 0.5));
        assert!(hull.valid());
        assert_relative_eq!(hull.max(0), 0.5, epsilon = EPSILON);
        assert_relative_eq!(hull.min(0), -1.0, epsilon = EPSILON);
        assert_relative_eq!(hull.max(1), 1.0, epsilon = EPSILON);
        // 4 trimmed + 4 untouched + 4 cap edges
        assert_eq!(hull.edge_count(), 12);
    }

    #[test]
    fn test_corner_clip_makes_triangle() {
        let mut hull = unit_cube();
        // Cuts the corner (1, 1, 1) off along x + y + z <= 2
        hull.clip(&Plane::new(-1.0, -1.0, -1.0, 2.0).normalized());
        assert!(hull.valid());
        assert_relative_eq!(hull.max(0), 1.0, epsilon = EPSILON);
        for p in hull.points() {
            assert!(p.x + p.y + p.z <= 2.0 + EPSILON);
        }
    }

    #[test]
    fn test_diagonal_clip_keeps_hull_closed() {
        let mut hull = unit_cube();
        hull.clip(&Plane::new(-1.0, -1.0, 0.0, 0.0).normalized());
        assert!(hull.valid());
        for p in hull.points() {
            assert!(p.x + p.y <= EPSILON);
        }
        assert_relative_eq!(hull.max(0), 1.0, epsilon = EPSILON);
        assert_relative_eq!(hull.min(0), -1.0, epsilon = EPSILON);
        // The hull is clipped again through the new cap without losing it.
        hull.clip(&Plane::new(1.0, 0.0, 0.0, 0.0));
        assert!(hull.valid());
        assert_relative_eq!(hull.min(0), 0.0, epsilon = EPSILON);
        assert_relative_eq!(hull.max(1), 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_clip_everything_empties() {
        let mut hull = unit_cube();
        hull.clip(&Plane::new(1.0, 0.0, 0.0, -2.0));
        assert!(!hull.valid());
        assert_eq!(hull.min(0), f64::MAX);
    }

    #[test]
    fn test_transform_and_ratios() {
        let mut hull = unit_cube();
        hull.transform(&Mat4::new_translation(&Vec3::new(0.0, 4.0, 0.0)));
        assert_relative_eq!(hull.min(1), 3.0, epsilon = EPSILON);
        let eye = Vec3::zeros();
        assert_relative_eq!(hull.max_ratio(&eye, 0), 1.0 / 3.0, epsilon = EPSILON);
        assert_relative_eq!(hull.min_ratio(&eye, 2), -1.0 / 3.0, epsilon = EPSILON);
    }
}
