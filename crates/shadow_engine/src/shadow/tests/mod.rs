//! End-to-end culls against a scripted host

mod lifecycle;

use std::sync::Arc;

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::render::backend::HeadlessBackend;
use crate::render::state::{CastingState, ShadowStateSet, StateCache};
use crate::scene::bounds::{Aabb, BoundingSphere};
use crate::scene::node::SceneNode;
use crate::scene::traversal::{
    CasterPass, CasterStage, CullTraversal, NearFarMode, PositionedLight, RenderLeaf, StageId, ViewHandle,
};
use crate::shadow::debug_hud::HudDraw;
use crate::shadow::settings::ShadowSettings;
use crate::shadow::technique::ShadowTechnique;

/// What the engine asked of the host for one caster pass
#[derive(Debug, Clone)]
pub(super) struct RecordedPass {
    pub shadow_map_index: u32,
    pub projection: Mat4,
    pub planes: usize,
    pub traversal_mask: u32,
    pub stage: StageId,
    pub state: CastingState,
}

/// Host traversal that replays a fixed camera, light set and caster queue
#[derive(Debug)]
pub(super) struct ScriptedHost {
    pub view_handle: ViewHandle,
    pub traversal_number: u64,
    pub view: Mat4,
    pub projection: Mat4,
    pub mode: NearFarMode,
    pub calculated: (f64, f64),
    pub lights: Vec<PositionedLight>,
    pub scene: Option<SceneNode>,
    pub bound: BoundingSphere,
    pub leaves: Vec<RenderLeaf>,
    pub receiver_culls: Vec<(u32, Option<ShadowStateSet>)>,
    pub modes_seen: Vec<NearFarMode>,
    pub passes: Vec<RecordedPass>,
    pub projection_updates: Vec<(StageId, Mat4)>,
    pub receiver_state: Option<Arc<ShadowStateSet>>,
    pub hud: Vec<HudDraw>,
    next_stage: u64,
}

impl ScriptedHost {
    pub fn new(view_handle: u64) -> Self {
        Self {
            view_handle: ViewHandle(view_handle),
            traversal_number: 0,
            view: Mat4::look_at(&Vec3::new(0.0, 2.0, 0.0), &Vec3::new(0.0, 2.0, -1.0), &Vec3::y()),
            projection: Mat4::perspective_degrees(60.0, 1.0, 1.0, 100.0),
            mode: NearFarMode::ComputeUsingBoundingVolumes,
            calculated: (1.0, 100.0),
            lights: vec![sun()],
            scene: None,
            bound: BoundingSphere::default(),
            leaves: ground_leaves(),
            receiver_culls: Vec::new(),
            modes_seen: Vec::new(),
            passes: Vec::new(),
            projection_updates: Vec::new(),
            receiver_state: None,
            hud: Vec::new(),
            next_stage: 0,
        }
    }

    /// Cull one frame and advance the frame counter
    pub fn frame(&mut self, technique: &ShadowTechnique) {
        self.passes.clear();
        self.projection_updates.clear();
        self.receiver_culls.clear();
        self.hud.clear();
        technique.cull(self);
        self.traversal_number += 1;
    }
}

impl CullTraversal for ScriptedHost {
    fn view_handle(&self) -> ViewHandle {
        self.view_handle
    }

    fn traversal_number(&self) -> u64 {
        self.traversal_number
    }

    fn view_matrix(&self) -> Mat4 {
        self.view
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn near_far_mode(&self) -> NearFarMode {
        self.mode
    }

    fn set_near_far_mode(&mut self, mode: NearFarMode) {
        self.mode = mode;
    }

    fn calculated_near_far(&self) -> (f64, f64) {
        self.calculated
    }

    fn positioned_lights(&self) -> &[PositionedLight] {
        &self.lights
    }

    fn shadowed_scene(&self) -> Option<&SceneNode> {
        self.scene.as_ref()
    }

    fn scene_bound(&self) -> BoundingSphere {
        self.bound
    }

    fn cull_receiving_scene(&mut self, traversal_mask: u32, state: Option<&ShadowStateSet>) {
        self.modes_seen.push(self.mode);
        self.receiver_culls.push((traversal_mask, state.cloned()));
    }

    fn cull_casting_scene(&mut self, pass: &CasterPass<'_>) -> CasterStage {
        let stage = StageId(self.next_stage);
        self.next_stage += 1;
        self.passes.push(RecordedPass {
            shadow_map_index: pass.shadow_map_index,
            projection: pass.camera.projection,
            planes: pass.culling_volume.len(),
            traversal_mask: pass.traversal_mask,
            stage,
            state: pass.state.clone(),
        });
        CasterStage { id: Some(stage), render_leaves: self.leaves.clone(), near_far: None }
    }

    fn update_casting_projection(&mut self, stage: StageId, projection: &Mat4) {
        self.projection_updates.push((stage, *projection));
    }

    fn set_receiver_state(&mut self, state: Option<Arc<ShadowStateSet>>) {
        self.receiver_state = state;
    }

    fn draw_debug_hud(&mut self, draw: &HudDraw) {
        self.hud.push(draw.clone());
    }
}

/// Sun slanting across the view
pub(super) fn sun() -> PositionedLight {
    PositionedLight::directional(0, Vec3::new(0.3, -1.0, -0.2))
}

/// A row of boxes on the ground receding from the eye
pub(super) fn ground_leaves() -> Vec<RenderLeaf> {
    (0..6)
        .map(|i| RenderLeaf {
            world_matrix: Some(Mat4::new_translation(&Vec3::new(0.0, 0.0, -8.0 - 15.0 * f64::from(i)))),
            bounds: Aabb::new(Vec3::new(-3.0, 0.0, -3.0), Vec3::new(3.0, 2.0, 3.0)),
        })
        .collect()
}

/// An initialised engine over a fresh headless backend
pub(super) fn engine(settings: ShadowSettings) -> (Arc<HeadlessBackend>, ShadowTechnique) {
    let backend = Arc::new(HeadlessBackend::new());
    let technique = ShadowTechnique::new(settings, backend.clone(), Arc::new(StateCache::new())).unwrap();
    technique.init().unwrap();
    (backend, technique)
}

/// Settings with warping and leaf fitting off, so projections depend only
/// on the view and the split scheme
pub(super) fn plain_settings() -> ShadowSettings {
    ShadowSettings {
        shadow_map_projection_hint: crate::shadow::settings::ShadowMapProjectionHint::Orthographic,
        tight_fit_from_render_leaves: false,
        ..ShadowSettings::default()
    }
}
