//! Division of one light's shadow among several maps
//!
//! Two schemes exist. Cascaded maps slice view depth with a blend of
//! logarithmic and uniform splits. Parallel-split maps divide the shadow
//! camera's own clip-space y range, so the cut planes stay parallel to the
//! light.

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::shadow::frustum::Frustum;
use crate::shadow::polytope::Plane;

/// Fraction of the view depth range each non-final cascade extends past its end
pub const CASCADE_OVERLAP: f64 = 0.01;

/// Clip-space y overlap between neighbouring parallel-split maps
pub const PARALLEL_SPLIT_OVERLAP: f64 = 0.01;

/// Fraction of the computed midpoint used as the two-map split point
const MID_FRACTION: f64 = 0.8;

/// Tuning of the cascade split
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitParams {
    /// Weight of the logarithmic term, the rest is uniform
    pub log_ratio: f64,
    /// Constant shift applied to every interior split
    pub delta_bias: f64,
    /// Near/far ratio the logarithmic term starts from when near is not positive
    pub min_near_far_ratio: f64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self { log_ratio: 0.5, delta_bias: 0.0, min_near_far_ratio: 0.05 }
    }
}

/// Depth range of one cascade in eye distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeRange {
    /// Near distance
    pub near: f64,
    /// Far distance, overlap included
    pub far: f64,
}

/// Boundary `index` of `count` cascades over `near..far`.
///
/// The ends are returned as given. Interior boundaries are kept strictly
/// between their neighbours' limits.
pub fn split_distance(index: u32, count: u32, near: f64, far: f64, params: &SplitParams) -> f64 {
    if index == 0 || count == 0 {
        return near;
    }
    if index >= count {
        return far;
    }
    let t = f64::from(index) / f64::from(count);
    let log_near = if near > 0.0 { near } else { (far * params.min_near_far_ratio).max(f64::MIN_POSITIVE) };
    let logarithmic = log_near * (far / log_near).powf(t);
    let uniform = utils::lerp(near, far, t);
    let split = utils::lerp(uniform, logarithmic, params.log_ratio) + params.delta_bias;

    // Bias may push a split past its neighbours; keep room on either side.
    let step = (far - near) / f64::from(count) * 1e-3;
    let low = near + step * f64::from(index);
    let high = far - step * f64::from(count - index);
    split.clamp(low, high)
}

/// All `count + 1` boundaries, ascending, ends pinned to `near` and `far`
pub fn split_distances(count: u32, near: f64, far: f64, params: &SplitParams) -> Vec<f64> {
    (0..=count).map(|i| split_distance(i, count, near, far, params)).collect()
}

/// Depth range of cascade `index`; all but the last overlap the next one
pub fn cascade_range(index: u32, count: u32, near: f64, far: f64, params: &SplitParams) -> CascadeRange {
    let start = split_distance(index, count, near, far, params);
    let mut end = split_distance(index + 1, count, near, far, params);
    if index + 1 < count {
        end += CASCADE_OVERLAP * (far - near);
    }
    CascadeRange { near: start, far: end }
}

/// Clip-space y at which two parallel-split maps divide the shadow camera.
///
/// Zero when the eye projects inside the camera's y range, otherwise a
/// point biased towards the eye so the nearer map gets more texels.
pub fn parallel_split_point(frustum: &Frustum, light_vp: &Mat4) -> f64 {
    let eye_ls = light_vp.project_point(&frustum.eye);
    if (-1.0..=1.0).contains(&eye_ls.y) {
        log::trace!("Eye inside light clip region, splitting at 0");
        return 0.0;
    }
    let n = -1.0 - eye_ls.y;
    let f = 1.0 - eye_ls.y;
    let mid = eye_ls.y + (n * f).sqrt();
    mid * MID_FRACTION
}

/// One of the two maps' share of the light-space y range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParallelSlice {
    /// Lower clip-space y
    pub start: f64,
    /// Upper clip-space y, overlap included
    pub end: f64,
    upper: bool,
}

impl ParallelSlice {
    /// Slice `index` (0 below the split, 1 above it) of two maps divided at
    /// `split_point`. The lower slice overlaps the upper one.
    pub fn new(index: u32, split_point: f64) -> Self {
        if index == 0 {
            Self { start: -1.0, end: split_point + PARALLEL_SPLIT_OVERLAP, upper: false }
        } else {
            Self { start: split_point, end: 1.0, upper: true }
        }
    }

    /// Plane bounding the slice at the split, expressed in world space.
    ///
    /// `light_vp` maps world points into the shadow camera's clip space.
    pub fn world_plane(&self, light_vp: &Mat4) -> Plane {
        let clip = if self.upper { Plane::new(0.0, 1.0, 0.0, -self.start) } else { Plane::new(0.0, -1.0, 0.0, self.end) };
        clip.transform_providing_inverse(light_vp)
    }

    /// Projection that stretches the slice over the whole clip-space y range
    pub fn crop_projection(&self, projection: &Mat4) -> Mat4 {
        let mid = (self.start + self.end) * 0.5;
        let range = self.end - self.start;
        Mat4::crop(&Vec3::new(0.0, -mid, 0.0), &Vec3::new(1.0, 2.0 / range, 1.0)) * projection
    }
}
