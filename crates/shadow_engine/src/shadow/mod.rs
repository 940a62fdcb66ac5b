//! View-dependent shadow mapping
//!
//! Per view and frame the engine:
//! 1. extracts the view [`Frustum`](frustum::Frustum) with its near/far clamped
//!    to what is visible and to the maximum shadow distance;
//! 2. builds, per light, the [`Polytope`](polytope::Polytope) of space that can
//!    cast into the view and solves a first shadow camera around it;
//! 3. divides the light's shadow among its maps, parallel-split or cascaded,
//!    cropping each camera as tight as the view and the casters allow;
//! 4. optionally warps each camera into a perspective shadow map;
//! 5. publishes textures, texgens and uniforms to the receivers.

pub mod camera_solver;
pub mod cascade;
pub mod clip_volume;
pub mod convex_hull;
pub mod crop;
pub mod debug_hud;
pub mod frustum;
pub mod light_data;
pub mod light_space_bounds;
pub mod perspective;
pub mod polytope;
pub mod publisher;
pub mod render_leaf_bounds;
pub mod settings;
pub mod technique;
pub mod view_data;

#[cfg(test)]
mod tests;

pub use frustum::Frustum;
pub use light_data::LightData;
pub use polytope::{Plane, Polytope};
pub use settings::{MultipleShadowMapHint, ShadowMapProjectionHint, ShadowSettings};
pub use technique::{ShadowError, ShadowResult, ShadowTechnique};
pub use view_data::{ShadowData, ViewDependentData};
