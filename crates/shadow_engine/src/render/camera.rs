//! Render-to-texture camera used for one shadow map

use bitflags::bitflags;

use crate::foundation::math::Mat4;
use crate::render::backend::{Attachment, RenderTargetHandle};

bitflags! {
    /// Buffers cleared before a camera renders
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u32 {
        /// Clear the color buffer
        const COLOR = 1 << 0;
        /// Clear the depth buffer
        const DEPTH = 1 << 1;
    }
}

/// When a nested camera renders relative to the main pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderOrder {
    /// Before the main camera; shadow maps must be ready before receivers sample them
    PreRender,
    /// After the main camera; used to overlay debug output
    PostRender,
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Left edge
    pub x: u32,
    /// Bottom edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Viewport {
    /// Viewport anchored at the origin
    pub const fn sized(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// A shadow camera: matrices, viewport and target
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowCamera {
    /// World to light-eye matrix
    pub view: Mat4,
    /// Light-eye to clip matrix
    pub projection: Mat4,
    /// Pixel rectangle rendered into
    pub viewport: Viewport,
    /// Ordering relative to the main pass
    pub render_order: RenderOrder,
    /// Buffers cleared before rendering
    pub clear_mask: ClearMask,
    /// Clear color when [`ClearMask::COLOR`] is set
    pub clear_color: [f32; 4],
    /// Attachment written
    pub attachment: Attachment,
    /// Backend render target, `None` until allocated or after release
    pub target: Option<RenderTargetHandle>,
}

impl ShadowCamera {
    /// Depth-only pre-render camera
    pub fn depth_pass(width: u32, height: u32) -> Self {
        Self {
            view: Mat4::identity(),
            projection: Mat4::identity(),
            viewport: Viewport::sized(width, height),
            render_order: RenderOrder::PreRender,
            clear_mask: ClearMask::DEPTH,
            clear_color: [1.0, 1.0, 1.0, 1.0],
            attachment: Attachment::Depth,
            target: None,
        }
    }

    /// Color post-render camera that makes a shadow map visible on screen
    pub fn debug_pass(width: u32, height: u32) -> Self {
        Self {
            render_order: RenderOrder::PostRender,
            clear_mask: ClearMask::COLOR | ClearMask::DEPTH,
            attachment: Attachment::Color,
            ..Self::depth_pass(width, height)
        }
    }

    /// `projection * view`
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}
