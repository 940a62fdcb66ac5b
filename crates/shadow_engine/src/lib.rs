//! # Shadow Engine
//!
//! View-dependent shadow mapping for a host scene graph.
//!
//! ## Features
//!
//! - **Per-view state**: each host view gets its own shadow maps and
//!   published receiver state, safe to cull from several threads
//! - **Tight shadow cameras**: light volumes clipped to the lit side of the
//!   view, cameras cropped to the view and to the casters actually queued
//! - **Multiple maps per light**: parallel-split or cascaded
//! - **Perspective shadow maps**: warped cameras when light and view allow it
//! - **Backend agnostic**: GPU objects are opaque handles from a
//!   [`ShadowBackend`](render::ShadowBackend); a headless backend is included
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shadow_engine::prelude::*;
//!
//! fn frame(technique: &ShadowTechnique, traversal: &mut dyn CullTraversal) {
//!     technique.cull(traversal);
//! }
//!
//! fn main() -> Result<(), ShadowError> {
//!     let settings = ShadowSettings::load_or_default("shadows.toml")?;
//!     let technique = ShadowTechnique::new(settings, Arc::new(HeadlessBackend::new()), Arc::new(StateCache::new()))?;
//!     technique.init()?;
//!     // Host calls `frame` once per view and frame, then eventually:
//!     technique.release_gl_objects();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;
pub mod shadow;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        foundation::math::{Mat4, Mat4Ext, Vec3, Vec4},
        render::{HeadlessBackend, ShadowBackend, ShadowStateSet, StateCache},
        scene::{
            Aabb, BoundingSphere, CasterPass, CasterStage, CullTraversal, NearFarMode, PositionedLight, RenderLeaf,
            SceneNode, StageId, ViewHandle,
        },
        shadow::{
            debug_hud::HudDraw, MultipleShadowMapHint, ShadowError, ShadowMapProjectionHint, ShadowSettings,
            ShadowTechnique,
        },
    };
}
