//! Scene-side inputs of the shadow engine
//!
//! - [`bounds`]: bounding boxes and spheres
//! - [`node`]: the closed set of node kinds walked for light-space bounds
//! - [`traversal`]: the host cull traversal contract

pub mod bounds;
pub mod node;
pub mod traversal;

pub use bounds::{Aabb, BoundingSphere};
pub use node::{ReferenceFrame, SceneNode};
pub use traversal::{CasterPass, CasterStage, CullTraversal, NearFarMode, PositionedLight, RenderLeaf, StageId, ViewHandle};
