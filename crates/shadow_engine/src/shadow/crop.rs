//! Tight fitting of a shadow camera to what it must cover
//!
//! Every routine here only ever narrows the shadow camera: the box it
//! crops to is clamped to `[-1, 1]^3` in the camera's current clip space.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::scene::bounds::Aabb;
use crate::shadow::convex_hull::ConvexHull;
use crate::shadow::frustum::Frustum;
use crate::shadow::polytope::Plane;

/// Outcome of cropping to a slice of the main view
#[derive(Debug, Clone, PartialEq)]
pub struct MainFrustumCrop {
    /// Narrowed projection
    pub projection: Mat4,
    /// Box cropped to, in the previous clip space
    pub clip_box: Aabb,
    /// World-space planes bounding the slice's light-space box
    pub planes: Vec<Plane>,
}

/// Unit clip cube
pub fn unit_box() -> Aabb {
    Aabb::new(Vec3::repeat(-1.0), Vec3::repeat(1.0))
}

fn clamped_to_unit(b: &Aabb) -> Aabb {
    let unit = unit_box();
    Aabb::new(b.min.sup(&unit.min), b.max.inf(&unit.max))
}

fn crop_matrix(b: &Aabb) -> Mat4 {
    let center = b.center();
    let range = b.max - b.min;
    Mat4::crop(&-center, &Vec3::new(2.0 / range.x, 2.0 / range.y, 2.0 / range.z))
}

/// Hull of the main view between `view_near` and `view_far`, measured
/// from the eye along the center line
pub fn view_slice_hull(frustum: &Frustum, view_near: f64, view_far: f64) -> ConvexHull {
    let center_line = frustum.center_line;
    let near_point = frustum.eye + center_line * view_near;
    let far_point = frustum.eye + center_line * view_far;

    let mut hull = ConvexHull::from_frustum(frustum);
    hull.clip(&Plane::from_normal_point(center_line, &near_point));
    hull.clip(&Plane::from_normal_point(-center_line, &far_point));
    hull
}

/// Crop a shadow camera to the part of the main view between `view_near`
/// and `view_far` along the view's center line.
///
/// Returns `None` when that part lies wholly outside the shadow camera.
pub fn crop_to_main_frustum(
    frustum: &Frustum,
    light_view: &Mat4,
    light_projection: &Mat4,
    view_near: f64,
    view_far: f64,
) -> Option<MainFrustumCrop> {
    let mut hull = view_slice_hull(frustum, view_near, view_far);
    hull.transform(&(light_projection * light_view));
    if !hull.valid() {
        return None;
    }

    let raw = Aabb::new(
        Vec3::new(hull.min(0), hull.min(1), hull.min(2)),
        Vec3::new(hull.max(0), hull.max(1), hull.max(2)),
    );
    let mut clip_box = clamped_to_unit(&raw);
    // Keep the light's near plane so casters in front of the slice still render.
    clip_box.min.z = -1.0;
    if !clip_box.valid() {
        return None;
    }
    let range = clip_box.max - clip_box.min;
    if range.x <= 0.0 || range.y <= 0.0 || range.z <= 0.0 {
        log::trace!("Cropped slice is flat: {range:?}");
        return None;
    }

    let projection = if clip_box == unit_box() {
        *light_projection
    } else {
        crop_matrix(&clip_box) * light_projection
    };

    let inverse_projection = light_projection.try_inverse()?;
    hull.transform(&inverse_projection);
    let (x_min, x_max) = (hull.min(0), hull.max(0));
    let (y_min, y_max) = (hull.min(1), hull.max(1));
    let z_min = hull.min(2);

    // No far-side z plane: casters between the slice and the light must stay.
    let planes = [
        Plane::new(0.0, -1.0, 0.0, y_max),
        Plane::new(0.0, 1.0, 0.0, -y_min),
        Plane::new(-1.0, 0.0, 0.0, x_max),
        Plane::new(1.0, 0.0, 0.0, -x_min),
        Plane::new(0.0, 0.0, 1.0, -z_min),
    ]
    .iter()
    .map(|plane| plane.transform_providing_inverse(light_view))
    .collect();

    Some(MainFrustumCrop { projection, clip_box, planes })
}

/// Re-center and re-scale x and y of `projection` onto `bounds`, a box in
/// its clip space.
///
/// Only applies when `bounds` lies strictly inside `[-1, 1]` on x or y;
/// z is left alone. Returns `None` when nothing would change.
pub fn crop_xy(projection: &Mat4, bounds: &Aabb) -> Option<Mat4> {
    if !bounds.valid() {
        return None;
    }
    let b = clamped_to_unit(bounds);
    let tighter = b.min.x > -1.0 || b.max.x < 1.0 || b.min.y > -1.0 || b.max.y < 1.0;
    let range = b.max - b.min;
    if !tighter || range.x <= 0.0 || range.y <= 0.0 {
        return None;
    }
    let center = b.center();
    let crop = Mat4::crop(&Vec3::new(-center.x, -center.y, 0.0), &Vec3::new(2.0 / range.x, 2.0 / range.y, 1.0));
    Some(crop * projection)
}
