//! Math utilities and types
//!
//! Shadow fitting runs in double precision: light-space extents of large
//! outdoor scenes lose too many bits in `f32` once several projection
//! matrices are concatenated. All matrices follow the column-vector
//! convention (`clip = projection * view * world`) and OpenGL-style clip
//! space, where the view volume maps to `[-1, 1]` on every axis.

pub use nalgebra::{Matrix4, Unit, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// 4D vector type
pub type Vec4 = Vector4<f64>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f64>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f64>;

/// Common mathematical constants
pub mod constants {
    /// Pi constant
    pub const PI: f64 = std::f64::consts::PI;

    /// Pi / 2
    pub const FRAC_PI_2: f64 = std::f64::consts::FRAC_PI_2;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f64 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f64 = 180.0 / PI;
}

/// Utility functions for common math operations
pub mod utils {
    use super::{constants, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f64) -> f64 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f64) -> f64 {
        radians * constants::RAD_TO_DEG
    }

    /// Linear interpolation between two values
    pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
        a + (b - a) * t
    }

    /// Normalize a vector, returning the zero vector for degenerate input
    /// instead of NaNs.
    pub fn normalize_or_zero(v: &Vec3) -> Vec3 {
        v.try_normalize(f64::EPSILON).unwrap_or_else(Vec3::zeros)
    }

    /// Angle in radians between two unit vectors, robust against dot
    /// products drifting slightly outside `[-1, 1]`.
    pub fn angle_between_unit(a: &Vec3, b: &Vec3) -> f64 {
        a.dot(b).clamp(-1.0, 1.0).acos()
    }
}

/// Frustum planes recovered from a perspective projection matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumParams {
    /// Left extent at the near plane
    pub left: f64,
    /// Right extent at the near plane
    pub right: f64,
    /// Bottom extent at the near plane
    pub bottom: f64,
    /// Top extent at the near plane
    pub top: f64,
    /// Near plane distance
    pub near: f64,
    /// Far plane distance
    pub far: f64,
}

/// Box recovered from an orthographic projection matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthoParams {
    /// Left plane
    pub left: f64,
    /// Right plane
    pub right: f64,
    /// Bottom plane
    pub bottom: f64,
    /// Top plane
    pub top: f64,
    /// Near plane
    pub near: f64,
    /// Far plane
    pub far: f64,
}

/// Extension trait for projection-matrix queries and construction.
pub trait Mat4Ext {
    /// Symmetric perspective projection (`fovy` in degrees).
    fn perspective_degrees(fovy_degrees: f64, aspect: f64, near: f64, far: f64) -> Mat4;

    /// Right-handed look-at view matrix.
    fn look_at(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4;

    /// Post-multiplied translate-then-scale used to re-center a clip-space box.
    fn crop(translate: &Vec3, scale: &Vec3) -> Mat4;

    /// True when the bottom row is `(0, 0, 0, *)`.
    fn is_orthographic(&self) -> bool;

    /// Recover glFrustum-style parameters, `None` for non-perspective matrices.
    fn frustum_params(&self) -> Option<FrustumParams>;

    /// Recover glOrtho-style parameters, `None` for non-orthographic matrices.
    fn ortho_params(&self) -> Option<OrthoParams>;

    /// Near/far distances encoded in either projection kind.
    fn near_far(&self) -> Option<(f64, f64)>;

    /// Rewrite the depth row so that `near..far` maps onto `[-1, 1]`,
    /// leaving x and y untouched. Returns false if the range is unusable.
    fn clamp_near_far(&mut self, near: f64, far: f64) -> bool;

    /// Transform a point with the homogeneous divide.
    fn project_point(&self, p: &Vec3) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn perspective_degrees(fovy_degrees: f64, aspect: f64, near: f64, far: f64) -> Mat4 {
        Mat4::new_perspective(aspect, utils::deg_to_rad(fovy_degrees), near, far)
    }

    fn look_at(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(*eye), &Point3::from(*target), up)
    }

    fn crop(translate: &Vec3, scale: &Vec3) -> Mat4 {
        Mat4::new_nonuniform_scaling(scale) * Mat4::new_translation(translate)
    }

    fn is_orthographic(&self) -> bool {
        self[(3, 0)] == 0.0 && self[(3, 1)] == 0.0 && self[(3, 2)] == 0.0
    }

    fn frustum_params(&self) -> Option<FrustumParams> {
        if self[(3, 0)] != 0.0 || self[(3, 1)] != 0.0 || self[(3, 2)] != -1.0 || self[(3, 3)] != 0.0 {
            return None;
        }
        let a = self[(2, 2)];
        let b = self[(2, 3)];
        if (a - 1.0).abs() < f64::EPSILON || (a + 1.0).abs() < f64::EPSILON {
            return None;
        }
        let near = b / (a - 1.0);
        let far = b / (a + 1.0);
        Some(FrustumParams {
            left: near * (self[(0, 2)] - 1.0) / self[(0, 0)],
            right: near * (1.0 + self[(0, 2)]) / self[(0, 0)],
            bottom: near * (self[(1, 2)] - 1.0) / self[(1, 1)],
            top: near * (1.0 + self[(1, 2)]) / self[(1, 1)],
            near,
            far,
        })
    }

    fn ortho_params(&self) -> Option<OrthoParams> {
        if !self.is_orthographic() || self[(3, 3)] != 1.0 || self[(2, 2)] == 0.0 {
            return None;
        }
        Some(OrthoParams {
            left: -(1.0 + self[(0, 3)]) / self[(0, 0)],
            right: (1.0 - self[(0, 3)]) / self[(0, 0)],
            bottom: -(1.0 + self[(1, 3)]) / self[(1, 1)],
            top: (1.0 - self[(1, 3)]) / self[(1, 1)],
            near: (self[(2, 3)] + 1.0) / self[(2, 2)],
            far: (self[(2, 3)] - 1.0) / self[(2, 2)],
        })
    }

    fn near_far(&self) -> Option<(f64, f64)> {
        if self.is_orthographic() {
            self.ortho_params().map(|o| (o.near, o.far))
        } else {
            self.frustum_params().map(|f| (f.near, f.far))
        }
    }

    fn clamp_near_far(&mut self, near: f64, far: f64) -> bool {
        if !near.is_finite() || !far.is_finite() || far <= near {
            return false;
        }
        let range = far - near;
        if self.is_orthographic() {
            self[(2, 0)] = 0.0;
            self[(2, 1)] = 0.0;
            self[(2, 2)] = -2.0 / range;
            self[(2, 3)] = -(far + near) / range;
        } else {
            if near <= 0.0 {
                return false;
            }
            self[(2, 0)] = 0.0;
            self[(2, 1)] = 0.0;
            self[(2, 2)] = -(far + near) / range;
            self[(2, 3)] = -2.0 * far * near / range;
        }
        true
    }

    fn project_point(&self, p: &Vec3) -> Vec3 {
        self.transform_point(&Point3::from(*p)).coords
    }
}
