//! Rendering abstractions the shadow engine drives
//!
//! - [`backend`]: opaque GPU resource allocation
//! - [`camera`]: render-to-texture cameras
//! - [`state`]: published receiver state, caster state and the shared attribute cache

pub mod backend;
pub mod camera;
pub mod state;

pub use backend::{BackendError, BackendResult, HeadlessBackend, ShadowBackend, TextureHandle};
pub use camera::{RenderOrder, ShadowCamera, Viewport};
pub use state::{CastingState, ShadowStateSet, StateCache};
