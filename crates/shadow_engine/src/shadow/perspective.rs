//! Perspective shadow map warp
//!
//! Re-projects an orthographic shadow camera through a virtual eye placed
//! behind the light-space near plane, so texels crowd towards the viewer.
//! The warp is skipped when light and view run (anti)parallel, where the
//! virtual eye would sit at infinity.

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::scene::traversal::RenderLeaf;
use crate::shadow::convex_hull::ConvexHull;
use crate::shadow::crop::view_slice_hull;
use crate::shadow::frustum::Frustum;
use crate::shadow::polytope::Plane;
use crate::shadow::render_leaf_bounds::RenderLeafBounds;

/// Distance between the warp's near and far planes in light clip units
const WARP_DEPTH: f64 = 2.0;

/// Warp opening angle in degrees
const WARP_ALPHA_DEGREES: f64 = 30.0;

/// Inputs of the warp
#[derive(Debug, Clone, Copy)]
pub struct PsmInput<'a> {
    /// Main view, for the eye and view direction
    pub frustum: &'a Frustum,
    /// Eye distance range of the map's slice of the view
    pub view_range: (f64, f64),
    /// Shadow camera view
    pub light_view: &'a Mat4,
    /// Shadow camera projection, before warping
    pub light_projection: &'a Mat4,
    /// Casters queued for the map
    pub render_leaves: &'a [RenderLeaf],
    /// Degrees from parallel within which the warp is skipped
    pub cutoff_angle: f64,
    /// Lower bound of the warp's near plane
    pub min_near_far_ratio: f64,
}

/// What the warp did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PsmOutcome {
    /// Warp applied; the new projection
    Warped(Mat4),
    /// Light and view are too close to parallel
    Parallel,
    /// Shadow projection is not orthographic
    Unsupported,
    /// Nothing was queued to measure against
    NoRenderLeaves,
}

impl PsmOutcome {
    /// Projection to render with, given the unwarped one
    pub fn projection_or(&self, unwarped: &Mat4) -> Mat4 {
        match self {
            Self::Warped(projection) => *projection,
            Self::Parallel | Self::Unsupported | Self::NoRenderLeaves => *unwarped,
        }
    }
}

/// Angle between the light direction and the view direction, measured in
/// the shadow camera's eye space, in radians
pub fn light_view_angle(frustum: &Frustum, light_view: &Mat4) -> f64 {
    let eye_v = light_view.project_point(&frustum.eye);
    let center_v = light_view.project_point(&frustum.center);
    let view_dir = utils::normalize_or_zero(&(center_v - eye_v));
    utils::angle_between_unit(&-Vec3::z(), &view_dir)
}

/// Compute the warped projection.
///
/// Nothing is modified: the caller applies [`PsmOutcome::Warped`] or keeps
/// its unwarped camera.
pub fn adjust_perspective_shadow_map(input: &PsmInput<'_>) -> PsmOutcome {
    let light_view = input.light_view;
    let light_dir = -Vec3::z();

    let gamma = light_view_angle(input.frustum, light_view);
    let cutoff = utils::deg_to_rad(input.cutoff_angle);
    if gamma < cutoff || gamma > utils::deg_to_rad(180.0 - input.cutoff_angle) {
        log::trace!("Light and view near parallel ({:.2} deg), keeping plain shadow map", utils::rad_to_deg(gamma));
        return PsmOutcome::Parallel;
    }
    if !input.light_projection.is_orthographic() {
        return PsmOutcome::Unsupported;
    }
    if input.render_leaves.is_empty() {
        return PsmOutcome::NoRenderLeaves;
    }

    let mut light_p = *input.light_projection;
    let mut light_vp = light_p * light_view;
    let (view_near, view_far) = input.view_range;

    let mut hull = view_slice_hull(input.frustum, view_near, view_far);
    hull.transform(&light_vp);

    let leaves = RenderLeafBounds::measure(input.render_leaves, &light_vp);
    if leaves.bounds.valid() {
        let b = &leaves.bounds;
        hull.clip(&Plane::new(1.0, 0.0, 0.0, -b.min.x));
        hull.clip(&Plane::new(-1.0, 0.0, 0.0, b.max.x));
        hull.clip(&Plane::new(0.0, 1.0, 0.0, -b.min.y));
        hull.clip(&Plane::new(0.0, -1.0, 0.0, b.max.y));
    }
    hull.clip(&Plane::new(0.0, 0.0, 1.0, 1.0));
    hull.clip(&Plane::new(0.0, 0.0, -1.0, 1.0));

    let (mut x_min, mut x_max) = (-1.0_f64, 1.0_f64);
    let (mut y_min, mut y_max) = (-1.0_f64, 1.0_f64);
    if hull.valid() {
        let widest_x = hull.min(0).abs().max(hull.max(0).abs());
        x_min = (-widest_x).max(-1.0);
        x_max = widest_x.min(1.0);
        y_min = hull.min(1).max(-1.0);
        y_max = hull.max(1).min(1.0);
    } else {
        hull = view_slice_hull(input.frustum, view_near, view_far);
        hull.transform(&light_vp);
    }

    if x_max > x_min && y_max > y_min && (x_min != -1.0 || x_max != 1.0 || y_min != -1.0 || y_max != 1.0) {
        let crop = Mat4::crop(
            &Vec3::new(-0.5 * (x_max + x_min), -0.5 * (y_max + y_min), 0.0),
            &Vec3::new(2.0 / (x_max - x_min), 2.0 / (y_max - y_min), 1.0),
        );
        hull.transform(&crop);
        light_p = crop * light_p;
        light_vp = light_p * light_view;
    }

    let eye_ls = light_vp.project_point(&input.frustum.eye);
    let center_ls = light_vp.project_point(&input.frustum.center);
    let view_dir_ls = utils::normalize_or_zero(&(center_ls - eye_ls));
    let side = utils::normalize_or_zero(&light_dir.cross(&view_dir_ls));
    let up = side.cross(&light_dir);
    if up == Vec3::zeros() {
        return PsmOutcome::Parallel;
    }

    let alpha = utils::deg_to_rad(WARP_ALPHA_DEGREES);
    let tan_gamma = (std::f64::consts::FRAC_PI_2 - gamma).tan();
    let min_n = (-1.0 - eye_ls.y).max(input.min_near_far_ratio);
    let n = (alpha.tan() * tan_gamma * tan_gamma).max(min_n);
    let f = n + WARP_DEPTH;
    let a = (f + n) / (f - n);
    let b = -2.0 * f * n / (f - n);

    let virtual_eye = Vec3::new(0.0, -1.0 - n, eye_ls.z);
    let warp_view = Mat4::look_at(&virtual_eye, &(virtual_eye + light_dir), &up);

    let (hull_min, hull_max) = hull_x_ratios(&hull, &virtual_eye);
    let ratios = RenderLeafBounds::measure_ratios(input.render_leaves, &light_vp, &virtual_eye, n);
    let min_x_ratio = hull_min.max(ratios.min_x_ratio);
    let max_x_ratio = hull_max.min(ratios.max_x_ratio);
    let best_x = min_x_ratio.abs().max(max_x_ratio.abs());
    let best_z = ratios.min_z_ratio.abs().max(ratios.max_z_ratio.abs());
    if !(best_x.is_finite() && best_z.is_finite()) || best_x == 0.0 || best_z == 0.0 {
        log::debug!("Degenerate warp ratios x={best_x} z={best_z}");
        return PsmOutcome::NoRenderLeaves;
    }

    // Depth is carried on y: w' = y.
    #[rustfmt::skip]
    let warp = Mat4::new(
        1.0 / best_x, 0.0, 0.0,          0.0,
        0.0,          a,   0.0,          b,
        0.0,          0.0, 1.0 / best_z, 0.0,
        0.0,          1.0, 0.0,          0.0,
    );

    PsmOutcome::Warped(warp * warp_view * light_p)
}

fn hull_x_ratios(hull: &ConvexHull, eye: &Vec3) -> (f64, f64) {
    if hull.valid() {
        (hull.min_ratio(eye, 0), hull.max_ratio(eye, 0))
    } else {
        (-f64::MAX, f64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::bounds::{Aabb, BoundingSphere};
    use crate::scene::traversal::PositionedLight;
    use crate::shadow::camera_solver::{compute_shadow_camera, ShadowCameraMatrices, SolverParams};
    use crate::shadow::light_data::LightData;

    const PARAMS: SolverParams = SolverParams { cutoff_angle: 2.0, max_positional_fov: 160.0 };

    fn frustum() -> Frustum {
        let view = Mat4::look_at(&Vec3::new(0.0, 2.0, 0.0), &Vec3::new(0.0, 2.0, -1.0), &Vec3::y());
        let projection = Mat4::perspective_degrees(60.0, 1.0, 1.0, 100.0);
        Frustum::new(&view, &projection, None).unwrap()
    }

    fn camera(frustum: &Frustum, direction: Vec3) -> ShadowCameraMatrices {
        let light = LightData::new(&PositionedLight::directional(0, direction));
        compute_shadow_camera(frustum, &light, &BoundingSphere::default(), &PARAMS).unwrap()
    }

    fn ground_leaves() -> Vec<RenderLeaf> {
        (0..5)
            .map(|i| RenderLeaf {
                world_matrix: Some(Mat4::new_translation(&Vec3::new(0.0, 0.0, -10.0 - 15.0 * f64::from(i)))),
                bounds: Aabb::new(Vec3::new(-3.0, 0.0, -3.0), Vec3::new(3.0, 2.0, 3.0)),
            })
            .collect()
    }

    fn input<'a>(frustum: &'a Frustum, camera: &'a ShadowCameraMatrices, leaves: &'a [RenderLeaf]) -> PsmInput<'a> {
        PsmInput {
            frustum,
            view_range: (1.0, 100.0),
            light_view: &camera.view,
            light_projection: &camera.projection,
            render_leaves: leaves,
            cutoff_angle: 2.0,
            min_near_far_ratio: 0.05,
        }
    }

    #[test]
    fn test_parallel_light_is_noop() {
        let frustum = frustum();
        let camera = camera(&frustum, frustum.center_line);
        let leaves = ground_leaves();
        let outcome = adjust_perspective_shadow_map(&input(&frustum, &camera, &leaves));
        assert_eq!(outcome, PsmOutcome::Parallel);
        assert_eq!(outcome.projection_or(&camera.projection), camera.projection);
    }

    #[test]
    fn test_overhead_light_warps() {
        let frustum = frustum();
        let camera = camera(&frustum, Vec3::new(0.0, -1.0, 0.3));
        let leaves = ground_leaves();
        let outcome = adjust_perspective_shadow_map(&input(&frustum, &camera, &leaves));
        let PsmOutcome::Warped(projection) = outcome else {
            panic!("expected a warp, got {outcome:?}");
        };
        assert!(!projection.is_orthographic());
        assert!(projection.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_no_leaves_keeps_camera() {
        let frustum = frustum();
        let camera = camera(&frustum, Vec3::new(0.0, -1.0, 0.3));
        let outcome = adjust_perspective_shadow_map(&input(&frustum, &camera, &[]));
        assert_eq!(outcome, PsmOutcome::NoRenderLeaves);
    }

    #[test]
    fn test_perspective_light_unsupported() {
        let frustum = frustum();
        let mut camera = camera(&frustum, Vec3::new(0.0, -1.0, 0.3));
        camera.projection = Mat4::perspective_degrees(90.0, 1.0, 1.0, 50.0);
        let leaves = ground_leaves();
        let outcome = adjust_perspective_shadow_map(&input(&frustum, &camera, &leaves));
        assert_eq!(outcome, PsmOutcome::Unsupported);
    }
}
