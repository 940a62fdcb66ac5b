//! Light clip-space extents of the casters actually queued for a map

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::scene::bounds::Aabb;
use crate::scene::traversal::RenderLeaf;

/// Extents of queued casters in a shadow camera's clip space
#[derive(Debug, Clone, PartialEq)]
pub struct RenderLeafBounds {
    /// Leaves visited, including ones with invalid bounds
    pub leaf_count: usize,
    /// Box of every visited corner, after clamping
    pub bounds: Aabb,
    /// Smallest `dx / dy` seen from the warp eye
    pub min_x_ratio: f64,
    /// Largest `dx / dy` seen from the warp eye
    pub max_x_ratio: f64,
    /// Smallest `dz / dy` seen from the warp eye
    pub min_z_ratio: f64,
    /// Largest `dz / dy` seen from the warp eye
    pub max_z_ratio: f64,
}

#[derive(Debug, Clone, Copy)]
struct Ratios {
    eye: Vec3,
    near: f64,
}

impl RenderLeafBounds {
    fn empty() -> Self {
        Self {
            leaf_count: 0,
            bounds: Aabb::empty(),
            min_x_ratio: f64::MAX,
            max_x_ratio: -f64::MAX,
            min_z_ratio: f64::MAX,
            max_z_ratio: -f64::MAX,
        }
    }

    /// Raw extents of `leaves` through `light_vp`, without clamping
    pub fn measure(leaves: &[RenderLeaf], light_vp: &Mat4) -> Self {
        Self::walk(leaves, light_vp, None, None)
    }

    /// Extents of `leaves` through `light_vp`, clamped to the unit cube
    pub fn measure_clamped(leaves: &[RenderLeaf], light_vp: &Mat4) -> Self {
        let unit = Aabb::new(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        Self::walk(leaves, light_vp, Some(&unit), None)
    }

    /// Clamped extents plus the slopes of every corner as seen from `eye`.
    ///
    /// Corners closer than `near` along y are measured as if they sat at
    /// `near`, so slopes stay finite.
    pub fn measure_ratios(leaves: &[RenderLeaf], light_vp: &Mat4, eye: &Vec3, near: f64) -> Self {
        let unit = Aabb::new(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        Self::walk(leaves, light_vp, Some(&unit), Some(Ratios { eye: *eye, near }))
    }

    fn walk(leaves: &[RenderLeaf], light_vp: &Mat4, clamp: Option<&Aabb>, ratios: Option<Ratios>) -> Self {
        let mut out = Self::empty();
        let mut previous: Option<Option<Mat4>> = None;
        let mut light_mvp = *light_vp;

        for leaf in leaves {
            out.leaf_count += 1;
            if previous != Some(leaf.world_matrix) {
                previous = Some(leaf.world_matrix);
                light_mvp = leaf.world_matrix.map_or(*light_vp, |world| light_vp * world);
            }
            if !leaf.bounds.valid() {
                log::trace!("Skipping render leaf with invalid bounds");
                continue;
            }
            for corner in &leaf.bounds.corners() {
                out.handle(light_mvp.project_point(corner), clamp, ratios.as_ref());
            }
        }
        out
    }

    fn handle(&mut self, mut ls: Vec3, clamp: Option<&Aabb>, ratios: Option<&Ratios>) {
        if let Some(r) = ratios {
            let delta = ls - r.eye;
            let depth = if delta.y > r.near { delta.y } else { r.near };
            let (x_ratio, z_ratio) = (delta.x / depth, delta.z / depth);
            self.min_x_ratio = self.min_x_ratio.min(x_ratio);
            self.max_x_ratio = self.max_x_ratio.max(x_ratio);
            self.min_z_ratio = self.min_z_ratio.min(z_ratio);
            self.max_z_ratio = self.max_z_ratio.max(z_ratio);
        }
        if let Some(limits) = clamp {
            for axis in 0..3 {
                ls[axis] = ls[axis].clamp(limits.min[axis], limits.max[axis]);
            }
        }
        self.bounds.expand_by_point(&ls);
    }

    /// True when nothing was queued
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }
}
