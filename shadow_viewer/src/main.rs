//! Headless shadow viewer
//!
//! Orbits a camera around a field of boxes under a sun and a spot light,
//! culls each frame through the shadow engine with the bookkeeping backend
//! and logs what was published. Usage:
//!
//! ```text
//! RUST_LOG=info shadow_viewer [settings.toml|settings.ron]
//! ```

use std::sync::Arc;

use shadow_engine::prelude::*;
use shadow_engine::shadow::Frustum;

const FRAMES: u32 = 8;
const CASTER: u32 = 0x1;
const RECEIVER: u32 = 0x2;

#[derive(thiserror::Error, Debug)]
enum ViewerError {
    #[error(transparent)]
    Shadow(#[from] ShadowError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A flattened drawable of the synthetic scene
#[derive(Debug, Clone, Copy)]
struct Drawable {
    world: Mat4,
    bounds: Aabb,
    mask: u32,
}

fn flatten(node: &SceneNode, world: &Mat4, out: &mut Vec<Drawable>) {
    match node {
        SceneNode::Geometry { mask, bounds } => out.push(Drawable { world: *world, bounds: *bounds, mask: *mask }),
        SceneNode::Transform { matrix, children, .. } => {
            let world = world * matrix;
            for child in children {
                flatten(child, &world, out);
            }
        }
        other => {
            for child in other.children() {
                flatten(child, world, out);
            }
        }
    }
}

fn build_scene() -> SceneNode {
    let ground = Aabb::new(Vec3::new(-200.0, -1.0, -200.0), Vec3::new(200.0, 0.0, 200.0));
    let pillar = Aabb::new(Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 6.0, 2.0));

    let mut children = vec![SceneNode::geometry(ground, RECEIVER)];
    for i in -4..=4 {
        for j in -4..=4 {
            let offset = Vec3::new(f64::from(i) * 20.0, 0.0, f64::from(j) * 20.0);
            children.push(SceneNode::transform(
                Mat4::new_translation(&offset),
                vec![SceneNode::geometry(pillar, CASTER | RECEIVER)],
            ));
        }
    }
    SceneNode::group(children)
}

/// Host traversal over the synthetic scene
struct ViewerHost {
    traversal_number: u64,
    view: Mat4,
    projection: Mat4,
    mode: NearFarMode,
    calculated: (f64, f64),
    lights: Vec<PositionedLight>,
    scene: SceneNode,
    drawables: Vec<Drawable>,
    next_stage: u64,
    receiver_state: Option<Arc<ShadowStateSet>>,
}

impl ViewerHost {
    fn new(scene: SceneNode) -> Self {
        let mut drawables = Vec::new();
        flatten(&scene, &Mat4::identity(), &mut drawables);
        Self {
            traversal_number: 0,
            view: Mat4::identity(),
            projection: Mat4::perspective_degrees(60.0, 16.0 / 9.0, 0.5, 1000.0),
            mode: NearFarMode::DoNotCompute,
            calculated: (0.5, 1000.0),
            lights: vec![
                PositionedLight::directional(0, Vec3::new(0.4, -1.0, 0.25)),
                PositionedLight::spot(1, Vec3::new(10.0, 30.0, 10.0), Vec3::new(0.0, -1.0, 0.0), 40.0),
            ],
            scene,
            drawables,
            next_stage: 0,
            receiver_state: None,
        }
    }

    fn orbit(&mut self, angle: f64) {
        let eye = Vec3::new(angle.cos() * 60.0, 8.0, angle.sin() * 60.0);
        self.view = Mat4::look_at(&eye, &Vec3::new(0.0, 2.0, 0.0), &Vec3::y());
    }

    fn visible_depth_range(&self, mask: u32) -> Option<(f64, f64)> {
        let frustum = Frustum::new(&self.view, &self.projection, None)?;
        let volume = frustum.polytope();
        let mut range: Option<(f64, f64)> = None;
        for drawable in self.drawables.iter().filter(|d| d.mask & mask != 0) {
            let world_bounds = drawable.bounds.transformed(&drawable.world);
            if !volume.contains_aabb(&world_bounds) {
                continue;
            }
            for corner in &world_bounds.corners() {
                let depth = -self.view.project_point(corner).z;
                range = Some(range.map_or((depth, depth), |(near, far)| (near.min(depth), far.max(depth))));
            }
        }
        range.map(|(near, far)| (near.max(0.1), far))
    }
}

impl CullTraversal for ViewerHost {
    fn view_handle(&self) -> ViewHandle {
        ViewHandle(0)
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
        Some(&self.scene)
    }

    fn scene_bound(&self) -> BoundingSphere {
        let mut bounds = Aabb::empty();
        for drawable in &self.drawables {
            bounds.expand_by_box(&drawable.bounds.transformed(&drawable.world));
        }
        BoundingSphere::from_aabb(&bounds)
    }

    fn cull_receiving_scene(&mut self, traversal_mask: u32, state: Option<&ShadowStateSet>) {
        if self.mode != NearFarMode::DoNotCompute {
            if let Some(range) = self.visible_depth_range(traversal_mask) {
                self.calculated = range;
            }
        }
        if let Some(state) = state {
            log::debug!("Receivers culled with {} texture binding(s)", state.textures.len());
        }
    }

    fn cull_casting_scene(&mut self, pass: &CasterPass<'_>) -> CasterStage {
        let render_leaves: Vec<RenderLeaf> = self
            .drawables
            .iter()
            .filter(|d| d.mask & pass.traversal_mask != 0)
            .filter(|d| pass.culling_volume.contains_aabb(&d.bounds.transformed(&d.world)))
            .map(|d| RenderLeaf { world_matrix: Some(d.world), bounds: d.bounds })
            .collect();
        log::debug!("Map {}: {} caster(s) queued", pass.shadow_map_index, render_leaves.len());

        let id = StageId(self.next_stage);
        self.next_stage += 1;
        CasterStage { id: Some(id), render_leaves, near_far: None }
    }

    fn update_casting_projection(&mut self, stage: StageId, projection: &Mat4) {
        log::trace!("Stage {stage:?} projection {projection:?}");
    }

    fn set_receiver_state(&mut self, state: Option<Arc<ShadowStateSet>>) {
        self.receiver_state = state;
    }

    fn draw_debug_hud(&mut self, draw: &HudDraw) {
        log::debug!("HUD panel {} at x={}", draw.panel, draw.viewport.x);
    }
}

fn main() -> Result<(), ViewerError> {
    shadow_engine::foundation::logging::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "shadow_viewer/shadow_viewer.toml".to_string());
    let settings = ShadowSettings::load_or_default(&path)?;
    log::info!("Loaded shadow settings from {path}");

    let backend = Arc::new(HeadlessBackend::new());
    let technique = ShadowTechnique::new(settings, backend.clone(), Arc::new(StateCache::new()))?;
    technique.init()?;
    technique.set_shadow_fade_start(0.9);
    if technique.settings().debug_draw {
        technique.enable_debug_hud();
    }

    let mut host = ViewerHost::new(build_scene());
    for frame in 0..FRAMES {
        host.orbit(f64::from(frame) * std::f64::consts::TAU / f64::from(FRAMES));
        technique.cull(&mut host);

        match &host.receiver_state {
            Some(state) => log::info!(
                "Frame {frame}: {} shadow map(s) on units {:?}, near/far {:.2}..{:.2}",
                state.texgens.len(),
                state.texgens.iter().map(|t| t.unit).collect::<Vec<_>>(),
                host.calculated.0,
                host.calculated.1
            ),
            None => log::info!("Frame {frame}: no shadows"),
        }
        host.traversal_number += 1;
    }

    log::info!("Live textures before release: {}", backend.live_textures());
    technique.release_gl_objects();
    technique.clean_scene_graph();
    log::info!(
        "Live after cleanup: {} texture(s), {} render target(s), {} program(s)",
        backend.live_textures(),
        backend.live_render_targets(),
        backend.live_programs()
    );
    Ok(())
}
