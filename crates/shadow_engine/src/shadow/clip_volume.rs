//! Region of space that can cast shadows into the view
//!
//! Faces of the view frustum that the light enters through are dropped, so
//! the volume extends from the frustum towards the light. Silhouette edges,
//! where a kept face meets a dropped one, are capped by planes through the
//! edge that run parallel to the light rays (directional) or through the
//! light position (positional).

use crate::foundation::math::{utils, Vec3};
use crate::shadow::frustum::{Frustum, EDGES};
use crate::shadow::light_data::LightData;
use crate::shadow::polytope::{Plane, Polytope};

/// Which frustum faces stay in the light volume, in face order.
///
/// A face stays when its inward normal opposes the light direction
/// (directional) or when the light lies on its inner side (positional).
pub fn lit_faces(face_planes: &[Plane], light: &LightData) -> [bool; 6] {
    let mut lit = [false; 6];
    for (flag, plane) in lit.iter_mut().zip(face_planes) {
        *flag = if light.is_directional() {
            plane.dot_normal(&light.direction) < 0.0
        } else {
            plane.distance_to(&light.position3) >= 0.0
        };
    }
    lit
}

/// Build the world-space caster volume of `light` for `frustum`.
///
/// An empty polytope means the light sees nothing of the view; that is a
/// normal outcome and the light is simply not shadowed this frame.
pub fn light_polytope(frustum: &Frustum, light: &LightData) -> Polytope {
    let faces = frustum.polytope();
    let lit = lit_faces(faces.planes(), light);

    let mut polytope = Polytope::from_planes(
        faces
            .planes()
            .iter()
            .zip(lit)
            .filter_map(|(plane, keep)| keep.then_some(*plane))
            .collect(),
    );
    if polytope.is_empty() {
        return polytope;
    }

    for edge in &EDGES {
        if lit[edge.faces[0]] == lit[edge.faces[1]] {
            continue;
        }
        let a = frustum.corners[edge.corners[0]];
        let b = frustum.corners[edge.corners[1]];

        let plane = if light.is_directional() {
            let normal = utils::normalize_or_zero(&(b - a).cross(&light.direction));
            Plane::from_normal_point(normal, &a)
        } else {
            Plane::from_points(&light.position3, &a, &b)
        };
        if plane.normal == Vec3::zeros() {
            continue;
        }

        if plane.distance_to(&frustum.center) < 0.0 {
            polytope.add(plane.flipped());
        } else {
            polytope.add(plane);
        }
    }

    polytope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Mat4Ext};
    use crate::scene::traversal::PositionedLight;

    fn frustum() -> Frustum {
        let view = Mat4::look_at(&Vec3::new(0.0, 2.0, 0.0), &Vec3::new(0.0, 2.0, -1.0), &Vec3::y());
        let projection = Mat4::perspective_degrees(60.0, 1.0, 1.0, 50.0);
        Frustum::new(&view, &projection, None).unwrap()
    }

    #[test]
    fn test_face_removal_matches_light_direction() {
        let frustum = frustum();
        for direction in [
            Vec3::new(0.3, -1.0, 0.2),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(-1.0, -0.1, 0.7),
            Vec3::new(0.0, 1.0, 0.0),
        ] {
            let light = LightData::new(&PositionedLight::directional(0, direction));
            let faces = frustum.polytope();
            let lit = lit_faces(faces.planes(), &light);
            for (plane, kept) in faces.planes().iter().zip(lit) {
                let d = plane.dot_normal(&light.direction);
                if kept {
                    assert!(d < 0.0);
                } else {
                    assert!(d >= 0.0);
                }
            }
            let polytope = light_polytope(&frustum, &light);
            let kept = lit.iter().filter(|k| **k).count();
            assert!(polytope.len() >= kept);
            assert!(polytope.contains_point(&frustum.center, 1e-9));
        }
    }

    #[test]
    fn test_volume_extends_towards_light() {
        let frustum = frustum();
        let light = LightData::new(&PositionedLight::directional(0, -Vec3::y()));
        let polytope = light_polytope(&frustum, &light);
        // Above the frustum, between it and the light
        let above = frustum.center + Vec3::new(0.0, 100.0, 0.0);
        let below = frustum.center - Vec3::new(0.0, 100.0, 0.0);
        assert!(polytope.contains_point(&above, 1e-9));
        assert!(!polytope.contains_point(&below, 1e-9));
    }

    #[test]
    fn test_positional_light_inside_keeps_all_faces() {
        let frustum = frustum();
        let light = LightData::new(&PositionedLight::point(0, frustum.center, -Vec3::z()));
        let polytope = light_polytope(&frustum, &light);
        assert_eq!(polytope.len(), 6);
    }

    #[test]
    fn test_degenerate_direction_gives_empty_volume() {
        let frustum = frustum();
        let light = LightData::new(&PositionedLight::directional(0, Vec3::zeros()));
        assert!(light_polytope(&frustum, &light).is_empty());
    }
}
