//! Contract between the shadow engine and the host's cull traversal
//!
//! The host owns the scene graph and the visit-then-render protocol. Once per
//! view and frame it hands the engine a [`CullTraversal`]; the engine reads
//! camera and light state from it and asks it to cull receivers and casters.

use std::sync::Arc;

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::camera::ShadowCamera;
use crate::render::state::{CastingState, ShadowStateSet};
use crate::scene::bounds::{Aabb, BoundingSphere};
use crate::scene::node::SceneNode;
use crate::shadow::debug_hud::HudDraw;
use crate::shadow::polytope::Polytope;

/// Opaque identity of one traversal context (one view)
///
/// Issued by the host; two concurrent traversals of different viewports
/// must carry different handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(pub u64);

/// How the host derives near/far planes while culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NearFarMode {
    /// Use the projection matrix as given
    DoNotCompute,
    /// Fit near/far to bounding volumes of visible drawables
    ComputeUsingBoundingVolumes,
    /// Fit near/far to the primitives of visible drawables
    ComputeUsingPrimitives,
}

/// A light as accumulated by the traversal
///
/// `position.w == 0` marks a directional light; its xyz then points towards
/// the light, so light travels along `-position.xyz`.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedLight {
    /// Light number used for filtering and de-duplication
    pub light_num: u32,
    /// Homogeneous position
    pub position: Vec4,
    /// Spot direction, ignored for directional lights
    pub direction: Vec3,
    /// Spot cutoff half-angle in degrees; 180 means omnidirectional
    pub spot_cutoff: f64,
    /// Light-local to world matrix, `None` for identity
    pub placement: Option<Mat4>,
}

impl PositionedLight {
    /// Directional light whose rays travel along `direction`
    pub fn directional(light_num: u32, direction: Vec3) -> Self {
        Self {
            light_num,
            position: Vec4::new(-direction.x, -direction.y, -direction.z, 0.0),
            direction,
            spot_cutoff: 180.0,
            placement: None,
        }
    }

    /// Omnidirectional point light
    pub fn point(light_num: u32, position: Vec3, direction: Vec3) -> Self {
        Self {
            light_num,
            position: Vec4::new(position.x, position.y, position.z, 1.0),
            direction,
            spot_cutoff: 180.0,
            placement: None,
        }
    }

    /// Spot light with the given cutoff half-angle in degrees
    pub fn spot(light_num: u32, position: Vec3, direction: Vec3, cutoff_degrees: f64) -> Self {
        Self { spot_cutoff: cutoff_degrees, ..Self::point(light_num, position, direction) }
    }

    /// Attach a placement matrix
    #[must_use]
    pub fn with_placement(mut self, placement: Mat4) -> Self {
        self.placement = Some(placement);
        self
    }
}

/// One queued drawable, as read back from the render queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderLeaf {
    /// Local to world matrix, `None` for identity
    pub world_matrix: Option<Mat4>,
    /// Local bounding box of the drawable
    pub bounds: Aabb,
}

/// Host identifier of a caster render stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub u64);

/// Everything the host needs to cull the casters of one shadow map
#[derive(Debug, Clone, Copy)]
pub struct CasterPass<'a> {
    /// Index of the shadow map within this frame
    pub shadow_map_index: u32,
    /// Camera the casters are rendered with
    pub camera: &'a ShadowCamera,
    /// World-space culling volume
    pub culling_volume: &'a Polytope,
    /// Node mask selecting casters
    pub traversal_mask: u32,
    /// Render state casters are drawn with
    pub state: &'a CastingState,
}

/// Result of culling the casters of one shadow map
#[derive(Debug, Clone, Default)]
pub struct CasterStage {
    /// Stage identifier for later projection updates
    pub id: Option<StageId>,
    /// Drawables queued for rendering
    pub render_leaves: Vec<RenderLeaf>,
    /// Near/far of the queued casters in light-eye space, if computed
    pub near_far: Option<(f64, f64)>,
}

/// Host cull traversal for one view and frame
pub trait CullTraversal {
    /// Identity of this traversal context
    fn view_handle(&self) -> ViewHandle;

    /// Frame counter; parity selects double-buffered state
    fn traversal_number(&self) -> u64;

    /// Current world to eye matrix
    fn view_matrix(&self) -> Mat4;

    /// Current projection matrix
    fn projection_matrix(&self) -> Mat4;

    /// Current near/far mode
    fn near_far_mode(&self) -> NearFarMode;

    /// Override the near/far mode
    fn set_near_far_mode(&mut self, mode: NearFarMode);

    /// Near/far computed by the most recent receiver cull
    fn calculated_near_far(&self) -> (f64, f64);

    /// Lights visible at this point of the traversal, in discovery order
    fn positioned_lights(&self) -> &[PositionedLight];

    /// Root of the shadowed sub-graph, if the host exposes it
    fn shadowed_scene(&self) -> Option<&SceneNode>;

    /// Bound of the whole shadowed scene
    fn scene_bound(&self) -> BoundingSphere;

    /// Cull the receiver sub-graph. `state` is applied for the duration
    /// of the traversal when given.
    fn cull_receiving_scene(&mut self, traversal_mask: u32, state: Option<&ShadowStateSet>);

    /// Cull casters into a pre-render stage for one shadow map
    fn cull_casting_scene(&mut self, pass: &CasterPass<'_>) -> CasterStage;

    /// Replace the projection a queued caster stage will render with
    fn update_casting_projection(&mut self, stage: StageId, projection: &Mat4);

    /// Attach the receiver state produced this frame, or none
    fn set_receiver_state(&mut self, state: Option<Arc<ShadowStateSet>>);

    /// Draw one debug overlay panel
    fn draw_debug_hud(&mut self, _draw: &HudDraw) {}
}
