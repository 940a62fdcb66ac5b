//! Caster extents in a shadow camera's clip space, from the scene graph
//!
//! Used before any caster is queued, when only part of the scene casts
//! shadows: a camera fitted to the view may then be much wider than the
//! casters it needs to hold.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::scene::bounds::Aabb;
use crate::scene::node::{ReferenceFrame, SceneNode};
use crate::shadow::polytope::Polytope;

/// Walks a scene and accumulates caster bounds in light clip space
#[derive(Debug)]
pub struct LightSpaceBounds<'a> {
    light_vp: Mat4,
    culling_volume: &'a Polytope,
    traversal_mask: u32,
    bounds: Aabb,
}

impl<'a> LightSpaceBounds<'a> {
    /// New walker; `culling_volume` is in world space
    pub fn new(light_vp: Mat4, culling_volume: &'a Polytope, traversal_mask: u32) -> Self {
        Self { light_vp, culling_volume, traversal_mask, bounds: Aabb::empty() }
    }

    /// Visit `root` and everything under it
    pub fn visit(&mut self, root: &SceneNode) {
        self.apply(root, &Mat4::identity());
    }

    /// Bounds gathered so far; x and y are clamped to `[-1, 1]`
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn culled(&self, node: &SceneNode, world: &Mat4) -> bool {
        if node.mask() & self.traversal_mask == 0 {
            return true;
        }
        let local = node.local_bounds();
        local.valid() && !self.culling_volume.contains_aabb(&local.transformed(world))
    }

    fn apply(&mut self, node: &SceneNode, world: &Mat4) {
        match node {
            // Viewer-dependent or separately projected subgraphs don't land in a shadow map.
            SceneNode::Billboard { .. } | SceneNode::Projection { .. } | SceneNode::Camera { .. } => {}
            SceneNode::TerrainQuadTree { mask } => {
                if mask & self.traversal_mask != 0 {
                    self.bounds.expand_by_point(&Vec3::new(-1.0, -1.0, 0.0));
                    self.bounds.expand_by_point(&Vec3::new(1.0, 1.0, 0.0));
                }
            }
            SceneNode::Geometry { bounds, .. } => {
                if !self.culled(node, world) {
                    self.update_bound(bounds, world);
                }
            }
            SceneNode::Group { children, .. } => {
                if !self.culled(node, world) {
                    for child in children {
                        self.apply(child, world);
                    }
                }
            }
            SceneNode::Transform { matrix, reference_frame, children, .. } => {
                if node.mask() & self.traversal_mask == 0 {
                    return;
                }
                let world = match reference_frame {
                    ReferenceFrame::Relative => world * matrix,
                    ReferenceFrame::Absolute => *matrix,
                };
                for child in children {
                    self.apply(child, &world);
                }
            }
        }
    }

    fn update_bound(&mut self, local: &Aabb, world: &Mat4) {
        if !local.valid() {
            return;
        }
        let m = self.light_vp * world;
        for corner in &local.corners() {
            let v = m.project_point(corner);
            // Behind the shadow camera's near plane
            if v.z < -1.0 {
                continue;
            }
            self.bounds.expand_by_point(&Vec3::new(v.x.clamp(-1.0, 1.0), v.y.clamp(-1.0, 1.0), v.z));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::NODE_MASK_ALL;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-9;
    const CASTER: u32 = 0x1;

    fn cube(center: Vec3, half: f64) -> Aabb {
        Aabb::from_center_extents(center, Vec3::repeat(half))
    }

    fn everything() -> Polytope {
        Polytope::default()
    }

    fn light_vp() -> Mat4 {
        Mat4::new_orthographic(-10.0, 10.0, -10.0, 10.0, -10.0, 10.0)
    }

    #[test]
    fn test_only_masked_geometry_counts() {
        let scene = SceneNode::group(vec![
            SceneNode::geometry(cube(Vec3::zeros(), 1.0), CASTER),
            SceneNode::geometry(cube(Vec3::new(8.0, 8.0, 0.0), 1.0), 0x2),
        ]);
        let culling = everything();
        let mut walker = LightSpaceBounds::new(light_vp(), &culling, CASTER);
        walker.visit(&scene);
        let b = walker.bounds();
        assert_relative_eq!(b.min.x, -0.1, epsilon = EPSILON);
        assert_relative_eq!(b.max.x, 0.1, epsilon = EPSILON);
        assert_relative_eq!(b.max.y, 0.1, epsilon = EPSILON);
    }

    #[test]
    fn test_transforms_recurse_and_absolute_resets() {
        let offset = Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0));
        let scene = SceneNode::transform(
            offset,
            vec![SceneNode::Transform {
                mask: NODE_MASK_ALL,
                matrix: Mat4::new_translation(&Vec3::new(0.0, -5.0, 0.0)),
                reference_frame: ReferenceFrame::Absolute,
                children: vec![SceneNode::geometry(cube(Vec3::zeros(), 1.0), NODE_MASK_ALL)],
            }],
        );
        let culling = everything();
        let mut walker = LightSpaceBounds::new(light_vp(), &culling, NODE_MASK_ALL);
        walker.visit(&scene);
        let b = walker.bounds();
        assert_relative_eq!(b.center().x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(b.center().y, -0.5, epsilon = EPSILON);
    }

    #[test]
    fn test_excluded_kinds_and_terrain() {
        let scene = SceneNode::group(vec![
            SceneNode::Billboard { mask: NODE_MASK_ALL, bounds: cube(Vec3::zeros(), 1.0) },
            SceneNode::Camera { mask: NODE_MASK_ALL, children: vec![SceneNode::geometry(cube(Vec3::zeros(), 1.0), NODE_MASK_ALL)] },
            SceneNode::Projection { mask: NODE_MASK_ALL, children: vec![SceneNode::geometry(cube(Vec3::zeros(), 1.0), NODE_MASK_ALL)] },
        ]);
        let culling = everything();
        let mut walker = LightSpaceBounds::new(light_vp(), &culling, NODE_MASK_ALL);
        walker.visit(&scene);
        assert!(!walker.bounds().valid());

        walker.visit(&SceneNode::TerrainQuadTree { mask: NODE_MASK_ALL });
        let b = walker.bounds();
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_culling_volume_rejects_geometry() {
        let scene = SceneNode::group(vec![
            SceneNode::geometry(cube(Vec3::new(-5.0, 0.0, 0.0), 1.0), NODE_MASK_ALL),
            SceneNode::geometry(cube(Vec3::new(5.0, 0.0, 0.0), 1.0), NODE_MASK_ALL),
        ]);
        // x >= 0 only
        let culling = Polytope::from_planes(vec![crate::shadow::polytope::Plane::new(1.0, 0.0, 0.0, 0.0)]);
        let mut walker = LightSpaceBounds::new(light_vp(), &culling, NODE_MASK_ALL);
        walker.visit(&scene);
        assert_relative_eq!(walker.bounds().min.x, 0.4, epsilon = EPSILON);
    }
}
