//! Main camera view volume in world space
//!
//! Corner `i` is the clip-space corner with x/y/z signs taken from
//! [`CLIP_CORNERS`]. Faces follow the plane order of
//! [`Polytope::unit_frustum`]: left, right, bottom, top, near, far.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::shadow::polytope::Polytope;

/// Clip-space corners of the unit cube in frustum corner order
pub const CLIP_CORNERS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, -1.0, 1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, 1.0, -1.0],
    [1.0, 1.0, -1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// Corner indices of each face
pub const FACES: [[usize; 4]; 6] = [
    [0, 3, 7, 4],
    [1, 5, 6, 2],
    [0, 1, 2, 3],
    [4, 7, 6, 5],
    [0, 4, 5, 1],
    [2, 6, 7, 3],
];

/// An edge between two corners, shared by two faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrustumEdge {
    /// Corner indices
    pub corners: [usize; 2],
    /// Indices of the two adjacent faces
    pub faces: [usize; 2],
}

const fn edge(a: usize, b: usize, f0: usize, f1: usize) -> FrustumEdge {
    FrustumEdge { corners: [a, b], faces: [f0, f1] }
}

/// The twelve edges with their adjacent faces
pub const EDGES: [FrustumEdge; 12] = [
    edge(0, 1, 2, 4),
    edge(1, 2, 2, 1),
    edge(2, 3, 2, 5),
    edge(3, 0, 2, 0),
    edge(0, 4, 0, 4),
    edge(1, 5, 4, 1),
    edge(2, 6, 1, 5),
    edge(3, 7, 5, 0),
    edge(4, 5, 3, 4),
    edge(5, 6, 3, 1),
    edge(6, 7, 3, 5),
    edge(7, 4, 3, 0),
];

/// Snapshot of the main camera's view volume for one cull pass
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// World to eye matrix
    pub view: Mat4,
    /// Eye to clip matrix after near/far clamping
    pub projection: Mat4,
    /// Whether the projection is orthographic
    pub orthographic: bool,
    /// Near distance encoded in `projection`
    pub near: f64,
    /// Far distance encoded in `projection`
    pub far: f64,
    /// World-space corners
    pub corners: [Vec3; 8],
    /// World-space eye position
    pub eye: Vec3,
    /// Center of the near face
    pub center_near: Vec3,
    /// Center of the far face
    pub center_far: Vec3,
    /// Midpoint between the near and far centers
    pub center: Vec3,
    /// Unit direction from the near center to the far center
    pub center_line: Vec3,
}

impl Frustum {
    /// Build the frustum, first clamping the projection's depth range to
    /// `near_far` when given.
    ///
    /// Returns `None` when `projection * view` is not invertible.
    pub fn new(view: &Mat4, projection: &Mat4, near_far: Option<(f64, f64)>) -> Option<Self> {
        let mut projection = *projection;
        if let Some((near, far)) = near_far {
            let mut clamped = projection;
            if clamped.clamp_near_far(near, far) {
                projection = clamped;
            } else {
                log::debug!("Ignoring unusable near/far clamp {near}..{far}");
            }
        }

        let inverse = (projection * view).try_inverse()?;
        let corners = CLIP_CORNERS.map(|[x, y, z]| inverse.project_point(&Vec3::new(x, y, z)));

        let eye = view.try_inverse()?.project_point(&Vec3::zeros());
        let center_near = (corners[0] + corners[1] + corners[5] + corners[4]) * 0.25;
        let center_far = (corners[3] + corners[2] + corners[6] + corners[7]) * 0.25;
        let center = (center_near + center_far) * 0.5;
        let center_line = (center_far - center_near).try_normalize(f64::EPSILON)?;
        let (near, far) = projection.near_far().unwrap_or((f64::NAN, f64::NAN));

        Some(Self {
            view: *view,
            orthographic: projection.is_orthographic(),
            projection,
            near,
            far,
            corners,
            eye,
            center_near,
            center_far,
            center,
            center_line,
        })
    }

    /// `projection * view`
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// The view volume as world-space planes, in face order
    pub fn polytope(&self) -> Polytope {
        let mut polytope = Polytope::unit_frustum();
        polytope.transform_providing_inverse(&self.view_projection());
        polytope
    }

    /// Line segments of the wireframe, two points per edge
    pub fn wireframe(&self) -> Vec<Vec3> {
        EDGES
            .iter()
            .flat_map(|e| [self.corners[e.corners[0]], self.corners[e.corners[1]]])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-6;

    fn camera() -> (Mat4, Mat4) {
        let view = Mat4::look_at(&Vec3::new(3.0, 2.0, 10.0), &Vec3::new(0.0, 0.0, 0.0), &Vec3::y());
        let projection = Mat4::perspective_degrees(50.0, 1.6, 0.5, 200.0);
        (view, projection)
    }

    #[test]
    fn test_corner_round_trip() {
        let (view, projection) = camera();
        let frustum = Frustum::new(&view, &projection, None).unwrap();
        let forward = frustum.view_projection();
        for (corner, expected) in frustum.corners.iter().zip(CLIP_CORNERS) {
            let clip = forward.project_point(corner);
            assert_relative_eq!(clip.x, expected[0], epsilon = EPSILON);
            assert_relative_eq!(clip.y, expected[1], epsilon = EPSILON);
            assert_relative_eq!(clip.z, expected[2], epsilon = EPSILON);
        }
    }

    #[test]
    fn test_corner_round_trip_orthographic() {
        let view = Mat4::look_at(&Vec3::new(0.0, 50.0, 0.0), &Vec3::zeros(), &Vec3::z());
        let projection = Mat4::new_orthographic(-10.0, 30.0, -5.0, 5.0, 1.0, 100.0);
        let frustum = Frustum::new(&view, &projection, None).unwrap();
        assert!(frustum.orthographic);
        let forward = frustum.view_projection();
        for (corner, expected) in frustum.corners.iter().zip(CLIP_CORNERS) {
            let clip = forward.project_point(corner);
            assert_relative_eq!(clip.x, expected[0], epsilon = EPSILON);
            assert_relative_eq!(clip.y, expected[1], epsilon = EPSILON);
            assert_relative_eq!(clip.z, expected[2], epsilon = EPSILON);
        }
    }

    #[test]
    fn test_derived_points() {
        let view = Mat4::look_at(&Vec3::zeros(), &-Vec3::z(), &Vec3::y());
        let projection = Mat4::perspective_degrees(60.0, 1.0, 1.0, 100.0);
        let frustum = Frustum::new(&view, &projection, Some((2.0, 20.0))).unwrap();
        assert_relative_eq!(frustum.near, 2.0, epsilon = EPSILON);
        assert_relative_eq!(frustum.far, 20.0, epsilon = 1e-5);
        assert_relative_eq!(frustum.eye.norm(), 0.0, epsilon = EPSILON);
        assert_relative_eq!(frustum.center_near.z, -2.0, epsilon = EPSILON);
        assert_relative_eq!(frustum.center_far.z, -20.0, epsilon = 1e-5);
        assert_relative_eq!(frustum.center_line.z, -1.0, epsilon = EPSILON);
        assert_relative_eq!(frustum.center.z, -11.0, epsilon = 1e-5);
    }

    #[test]
    fn test_faces_and_edges_are_consistent() {
        for e in &EDGES {
            for &face in &e.faces {
                assert!(FACES[face].contains(&e.corners[0]));
                assert!(FACES[face].contains(&e.corners[1]));
            }
        }
    }

    #[test]
    fn test_polytope_contains_center() {
        let (view, projection) = camera();
        let frustum = Frustum::new(&view, &projection, None).unwrap();
        let polytope = frustum.polytope();
        assert_eq!(polytope.len(), 6);
        assert!(polytope.contains_point(&frustum.center, 0.0));
        assert!(!polytope.contains_point(&(frustum.eye - frustum.center_line), 0.0));
        assert_eq!(frustum.wireframe().len(), 24);
    }
}
