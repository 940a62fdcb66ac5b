//! Minimal scene description walked by the light-space bounds pass
//!
//! The host owns its real scene graph; it hands the shadow engine a view of
//! the caster sub-graph expressed with this closed set of node kinds. Each
//! kind contributes differently to light-space bounds, see
//! [`crate::shadow::light_space_bounds`].

use crate::foundation::math::Mat4;
use crate::scene::bounds::Aabb;

/// Node mask matching every traversal mask
pub const NODE_MASK_ALL: u32 = u32::MAX;

/// How a transform node composes with its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceFrame {
    /// Multiplies onto the accumulated parent matrix
    #[default]
    Relative,
    /// Replaces the accumulated matrix
    Absolute,
}

/// A node in the shadowed scene
#[derive(Debug, Clone)]
pub enum SceneNode {
    /// Plain grouping node
    Group {
        /// Traversal mask of the node
        mask: u32,
        /// Child nodes
        children: Vec<SceneNode>,
    },
    /// Drawable geometry with a local bounding box
    Geometry {
        /// Traversal mask of the node
        mask: u32,
        /// Bounds in the node's local frame
        bounds: Aabb,
    },
    /// Matrix transform applied to its children
    Transform {
        /// Traversal mask of the node
        mask: u32,
        /// Local-to-parent matrix
        matrix: Mat4,
        /// Whether `matrix` is relative to the parent
        reference_frame: ReferenceFrame,
        /// Child nodes
        children: Vec<SceneNode>,
    },
    /// Camera-facing geometry; orientation depends on the viewer
    Billboard {
        /// Traversal mask of the node
        mask: u32,
        /// Bounds in the node's local frame
        bounds: Aabb,
    },
    /// Subtree drawn with its own projection (HUDs, overlays)
    Projection {
        /// Traversal mask of the node
        mask: u32,
        /// Child nodes
        children: Vec<SceneNode>,
    },
    /// Nested render-to-texture camera
    Camera {
        /// Traversal mask of the node
        mask: u32,
        /// Child nodes
        children: Vec<SceneNode>,
    },
    /// Paged terrain; its extent is resolved lazily by the host
    TerrainQuadTree {
        /// Traversal mask of the node
        mask: u32,
    },
}

impl SceneNode {
    /// Group node with the default mask
    pub fn group(children: Vec<Self>) -> Self {
        Self::Group { mask: NODE_MASK_ALL, children }
    }

    /// Geometry node with the given mask
    pub fn geometry(bounds: Aabb, mask: u32) -> Self {
        Self::Geometry { mask, bounds }
    }

    /// Relative transform node with the default mask
    pub fn transform(matrix: Mat4, children: Vec<Self>) -> Self {
        Self::Transform {
            mask: NODE_MASK_ALL,
            matrix,
            reference_frame: ReferenceFrame::Relative,
            children,
        }
    }

    /// Node mask of any kind of node
    pub const fn mask(&self) -> u32 {
        match self {
            Self::Group { mask, .. }
            | Self::Geometry { mask, .. }
            | Self::Transform { mask, .. }
            | Self::Billboard { mask, .. }
            | Self::Projection { mask, .. }
            | Self::Camera { mask, .. }
            | Self::TerrainQuadTree { mask } => *mask,
        }
    }

    /// Children of the node, empty for leaves
    pub fn children(&self) -> &[Self] {
        match self {
            Self::Group { children, .. }
            | Self::Transform { children, .. }
            | Self::Projection { children, .. }
            | Self::Camera { children, .. } => children,
            Self::Geometry { .. } | Self::Billboard { .. } | Self::TerrainQuadTree { .. } => &[],
        }
    }

    /// Local-space bounds of the subtree, ignoring masks
    pub fn local_bounds(&self) -> Aabb {
        match self {
            Self::Geometry { bounds, .. } | Self::Billboard { bounds, .. } => *bounds,
            Self::Transform { matrix, children, .. } => {
                let mut out = Aabb::empty();
                for child in children {
                    out.expand_by_box(&child.local_bounds().transformed(matrix));
                }
                out
            }
            Self::TerrainQuadTree { .. } => Aabb::empty(),
            Self::Group { children, .. } | Self::Projection { children, .. } | Self::Camera { children, .. } => {
                let mut out = Aabb::empty();
                for child in children {
                    out.expand_by_box(&child.local_bounds());
                }
                out
            }
        }
    }
}
