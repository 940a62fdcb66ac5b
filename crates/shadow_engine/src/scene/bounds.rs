//! Bounding volumes used for culling and light-space fitting

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// Axis-Aligned Bounding Box
///
/// An "empty" box has `min > max` on every axis and absorbs the first point
/// expanded into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inverted box that contains nothing
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f64::MAX),
            max: Vec3::repeat(-f64::MAX),
        }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// True once at least one point has been added
    pub fn valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: &Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Grow to include a point
    pub fn expand_by_point(&mut self, p: &Vec3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Grow to include another box; invalid boxes are ignored
    pub fn expand_by_box(&mut self, other: &Self) {
        if other.valid() {
            self.expand_by_point(&other.min);
            self.expand_by_point(&other.max);
        }
    }

    /// The eight corners, indexed by bit pattern `zyx`
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }

    /// Box enclosing this box after transformation by `m`
    pub fn transformed(&self, m: &Mat4) -> Self {
        let mut out = Self::empty();
        if self.valid() {
            for corner in &self.corners() {
                out.expand_by_point(&m.project_point(corner));
            }
        }
        out
    }
}

/// Bounding sphere, as reported by the host for the whole shadowed scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius; negative means "no bound"
    pub radius: f64,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self { center: Vec3::zeros(), radius: -1.0 }
    }
}

impl BoundingSphere {
    /// Create a sphere
    pub const fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// A sphere is valid when its radius is non-negative
    pub fn valid(&self) -> bool {
        self.radius >= 0.0
    }

    /// Smallest sphere around a box
    pub fn from_aabb(aabb: &Aabb) -> Self {
        if aabb.valid() {
            Self::new(aabb.center(), aabb.extents().norm())
        } else {
            Self::default()
        }
    }
}
