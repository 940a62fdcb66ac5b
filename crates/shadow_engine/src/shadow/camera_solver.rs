//! First-pass shadow camera for a light
//!
//! Directional lights get an orthographic box around the view frustum,
//! aligned with the view's center line so the box is as narrow as possible.
//! Positional lights get a perspective camera at the light that covers every
//! frustum corner.

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::scene::bounds::BoundingSphere;
use crate::shadow::frustum::Frustum;
use crate::shadow::light_data::LightData;

/// Near plane of a positional shadow camera, as a fraction of its far plane
pub const MIN_Z_NEAR_RATIO: f64 = 1e-4;

/// Smallest camera extent, on any axis, that still gives a usable projection
pub const MIN_CAMERA_EXTENT: f64 = 1e-9;

/// False for extents that are too thin or not finite
fn usable_extent(min: f64, max: f64) -> bool {
    max - min > MIN_CAMERA_EXTENT && (max - min).is_finite()
}

/// View and projection of a shadow camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCameraMatrices {
    /// World to light-eye
    pub view: Mat4,
    /// Light-eye to clip
    pub projection: Mat4,
}

/// Knobs of the solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverParams {
    /// Degrees from parallel within which the view's right vector seeds the basis
    pub cutoff_angle: f64,
    /// Widest field of view for omnidirectional lights, in degrees
    pub max_positional_fov: f64,
}

/// Orthonormal light basis `(side, up)` for a light direction.
///
/// When the light runs (anti)parallel to the view, the cross product with
/// the center line degenerates, so the camera's right vector is used instead.
pub fn light_basis(frustum: &Frustum, light_dir: &Vec3, cutoff_angle: f64) -> (Vec3, Vec3) {
    let gamma = utils::rad_to_deg(utils::angle_between_unit(light_dir, &frustum.center_line));
    let side = if gamma < cutoff_angle || gamma > 180.0 - cutoff_angle {
        let v = &frustum.view;
        let view_side = Vec3::new(v[(0, 0)], v[(0, 1)], v[(0, 2)]);
        light_dir.cross(&view_side.cross(light_dir))
    } else {
        light_dir.cross(&frustum.center_line)
    };
    let side = utils::normalize_or_zero(&side);
    let up = utils::normalize_or_zero(&side.cross(light_dir));
    (side, up)
}

/// Solve the shadow camera for one light.
///
/// `None` means nothing from this light can be shadowed: the box collapsed
/// or the whole view lies behind a positional light.
pub fn compute_shadow_camera(
    frustum: &Frustum,
    light: &LightData,
    scene_bound: &BoundingSphere,
    params: &SolverParams,
) -> Option<ShadowCameraMatrices> {
    if light.direction == Vec3::zeros() {
        return None;
    }
    let (side, up) = light_basis(frustum, &light.direction, params.cutoff_angle);

    if light.is_directional() {
        directional_camera(frustum, &light.direction, &side, &up, scene_bound)
    } else {
        positional_camera(frustum, light, &up, params)
    }
}

fn directional_camera(
    frustum: &Frustum,
    dir: &Vec3,
    side: &Vec3,
    up: &Vec3,
    scene_bound: &BoundingSphere,
) -> Option<ShadowCameraMatrices> {
    let (mut x_min, mut x_max) = (0.0_f64, 0.0_f64);
    let (mut y_min, mut y_max) = (0.0_f64, 0.0_f64);
    let (mut z_min, mut z_max) = (0.0_f64, 0.0_f64);
    for corner in &frustum.corners {
        let delta = corner - frustum.center;
        let (x, y, z) = (delta.dot(side), delta.dot(up), delta.dot(dir));
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
        z_min = z_min.min(z);
        z_max = z_max.max(z);
    }

    if scene_bound.valid() {
        let delta = scene_bound.center - frustum.center;
        let (cx, cy, cz) = (delta.dot(side), delta.dot(up), delta.dot(dir));
        let r = scene_bound.radius;
        x_min = x_min.max(cx - r);
        x_max = x_max.min(cx + r);
        y_min = y_min.max(cy - r);
        y_max = y_max.min(cy + r);
        // Casters between the light and the view must still land in the map.
        z_min = cz - r;
        z_max = z_max.min(cz + r);
    }

    if !(usable_extent(x_min, x_max) && usable_extent(y_min, y_max) && usable_extent(z_min, z_max)) {
        log::debug!("Directional shadow box collapsed: x {x_min}..{x_max} y {y_min}..{y_max} z {z_min}..{z_max}");
        return None;
    }

    let projection = Mat4::new_orthographic(x_min, x_max, y_min, y_max, 0.0, z_max - z_min);
    let view = Mat4::look_at(
        &(frustum.center + dir * z_min),
        &(frustum.center + dir * z_max),
        up,
    );
    Some(ShadowCameraMatrices { view, projection })
}

fn positional_camera(
    frustum: &Frustum,
    light: &LightData,
    up: &Vec3,
    params: &SolverParams,
) -> Option<ShadowCameraMatrices> {
    let z_max = frustum
        .corners
        .iter()
        .map(|corner| (corner - light.position3).dot(&light.direction))
        .fold(f64::NEG_INFINITY, f64::max);
    let z_min = z_max * MIN_Z_NEAR_RATIO;
    if !usable_extent(z_min, z_max) {
        log::debug!("View lies behind light {}", light.light_num);
        return None;
    }

    let fov = if light.is_spot() {
        light.spot_cutoff * 2.0
    } else {
        let widest = frustum
            .corners
            .iter()
            .filter_map(|corner| {
                let delta = corner - light.position3;
                let length = delta.norm();
                (length > 0.0).then(|| 2.0 * utils::rad_to_deg((delta.dot(&light.direction) / length).clamp(-1.0, 1.0).acos()))
            })
            .fold(0.0_f64, f64::max);
        widest.min(params.max_positional_fov)
    };

    let projection = Mat4::perspective_degrees(fov, 1.0, z_min, z_max);
    let view = Mat4::look_at(&light.position3, &(light.position3 + light.direction), up);
    Some(ShadowCameraMatrices { view, projection })
}
