//! View-dependent shadow engine
//!
//! [`ShadowTechnique`] is driven once per view and frame through
//! [`ShadowTechnique::cull`]. Each call culls the receivers, fits one or more
//! shadow cameras per light to what the view can see, has the host cull the
//! casters of each map and publishes the receiver state that samples them.
//!
//! Views are independent: their state lives in a [`ViewDependentData`]
//! looked up by [`ViewHandle`], so several views may be culled concurrently.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::ConfigError;
use crate::foundation::logging::WarnOnce;
use crate::foundation::math::{Mat4, Mat4Ext};
use crate::render::backend::{BackendError, ProgramHandle, ProgramKind, ShadowBackend, TextureDesc, TextureFormat, TextureHandle};
use crate::render::state::{CastingState, ShadowStateSet, StateCache, Uniform};
use crate::scene::node::NODE_MASK_ALL;
use crate::scene::traversal::{CasterPass, CullTraversal, NearFarMode, ViewHandle};
use crate::shadow::camera_solver::{compute_shadow_camera, SolverParams};
use crate::shadow::cascade::{cascade_range, parallel_split_point, ParallelSlice, SplitParams};
use crate::shadow::clip_volume::light_polytope;
use crate::shadow::crop::{crop_to_main_frustum, crop_xy};
use crate::shadow::debug_hud::DebugHud;
use crate::shadow::frustum::Frustum;
use crate::shadow::light_data::{select_active_lights, LightData};
use crate::shadow::light_space_bounds::LightSpaceBounds;
use crate::shadow::perspective::{adjust_perspective_shadow_map, PsmInput, PsmOutcome};
use crate::shadow::publisher::{
    assemble_dummy_state, assemble_receiver_state, shared_uniforms, texgen_for, valid_region_matrix, UniformParams,
};
use crate::shadow::render_leaf_bounds::RenderLeafBounds;
use crate::shadow::settings::{MultipleShadowMapHint, ShadowMapProjectionHint, ShadowSettings};
use crate::shadow::view_data::{ShadowData, ViewDependentData};

/// Side of a debug overlay panel in pixels
pub const HUD_PANEL_SIZE: u32 = 256;

/// Gap between shadow map viewports in debug-draw mode
const DEBUG_VIEWPORT_GAP: u32 = 40;

/// Errors raised while setting the engine up
#[derive(thiserror::Error, Debug)]
pub enum ShadowError {
    /// The graphics resource layer refused an allocation
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Settings could not be loaded or are unusable
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for engine operations
pub type ShadowResult<T> = Result<T, ShadowError>;

/// Runtime-adjustable tuning
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tuning {
    log_ratio: f64,
    delta_bias: f64,
    polygon_offset: (f32, f32),
    front_face_culling: bool,
    shadow_fade_start: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self { log_ratio: 0.5, delta_bias: 0.0, polygon_offset: (1.1, 4.0), front_face_culling: true, shadow_fade_start: 0.0 }
    }
}

/// State built once by [`ShadowTechnique::init`] and shared by every view
#[derive(Debug, Clone)]
struct SharedState {
    casting: CastingState,
    uniforms: Vec<Uniform>,
    casting_program: ProgramHandle,
    receiving_program: ProgramHandle,
    fallback_base: TextureHandle,
    fallback_shadow: TextureHandle,
    dummy: Arc<ShadowStateSet>,
}

/// View-dependent shadow mapping
#[derive(Debug)]
pub struct ShadowTechnique {
    settings: ShadowSettings,
    backend: Arc<dyn ShadowBackend>,
    state_cache: Arc<StateCache>,
    shared: Mutex<Option<SharedState>>,
    views: Mutex<HashMap<ViewHandle, Arc<Mutex<ViewDependentData>>>>,
    enabled: AtomicBool,
    use_dummy_state: AtomicBool,
    tuning: Mutex<Tuning>,
    debug_hud: Mutex<Option<Arc<DebugHud>>>,
    texture_unit_warning: WarnOnce,
    psm_warning: WarnOnce,
}

impl ShadowTechnique {
    /// Create an engine; nothing is allocated until [`init`](Self::init).
    pub fn new(settings: ShadowSettings, backend: Arc<dyn ShadowBackend>, state_cache: Arc<StateCache>) -> ShadowResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            backend,
            state_cache,
            shared: Mutex::new(None),
            views: Mutex::new(HashMap::new()),
            enabled: AtomicBool::new(true),
            use_dummy_state: AtomicBool::new(false),
            tuning: Mutex::new(Tuning::default()),
            debug_hud: Mutex::new(None),
            texture_unit_warning: WarnOnce::new(),
            psm_warning: WarnOnce::new(),
        })
    }

    /// Settings the engine was created with
    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// Build the shared caster and receiver state. Repeated calls do nothing.
    pub fn init(&self) -> ShadowResult<()> {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if shared.is_some() {
            return Ok(());
        }
        *shared = Some(self.build_shared_state()?);
        log::info!(
            "Shadow engine initialised: {} map(s) per light, {}x{} texels",
            self.settings.effective_shadow_maps_per_light(),
            self.settings.texture_size.0,
            self.settings.texture_size.1
        );
        Ok(())
    }

    /// True once [`init`](Self::init) succeeded and until the scene graph is cleaned
    pub fn is_initialized(&self) -> bool {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn build_shared_state(&self) -> ShadowResult<SharedState> {
        let backend = self.backend.as_ref();
        let mut programs = Vec::new();
        let mut textures = Vec::new();
        let result = (|| -> ShadowResult<(ProgramHandle, ProgramHandle, TextureHandle, TextureHandle)> {
            let casting = backend.create_program(ProgramKind::ShadowCasting)?;
            programs.push(casting);
            let receiving = backend.create_program(ProgramKind::ShadowReceiving)?;
            programs.push(receiving);
            let base = backend.create_texture(&TextureDesc::fallback(TextureFormat::Rgba8))?;
            textures.push(base);
            let shadow = backend.create_texture(&TextureDesc::fallback(TextureFormat::Depth))?;
            textures.push(shadow);
            Ok((casting, receiving, base, shadow))
        })();

        let (casting_program, receiving_program, fallback_base, fallback_shadow) = match result {
            Ok(handles) => handles,
            Err(e) => {
                for program in programs {
                    backend.release_program(program);
                }
                for texture in textures {
                    backend.release_texture(texture);
                }
                return Err(e);
            }
        };

        let tuning = self.tuning();
        let casting = CastingState::new(
            &self.state_cache,
            tuning.front_face_culling,
            tuning.polygon_offset,
            Some(casting_program),
        );
        let mut shared = SharedState {
            casting,
            uniforms: Vec::new(),
            casting_program,
            receiving_program,
            fallback_base,
            fallback_shadow,
            dummy: Arc::default(),
        };
        self.refresh_uniforms(&mut shared, tuning.shadow_fade_start);
        Ok(shared)
    }

    fn refresh_uniforms(&self, shared: &mut SharedState, shadow_fade_start: f64) {
        let maps = self.settings.effective_shadow_maps_per_light();
        shared.uniforms = shared_uniforms(&UniformParams {
            base_shadow_texture_unit: self.settings.base_shadow_texture_unit,
            shadow_maps_per_light: maps,
            maximum_shadow_map_distance: self.settings.maximum_shadow_map_distance,
            shadow_fade_start,
        });
        let base = self.settings.base_shadow_texture_unit;
        let mut dummy = ShadowStateSet::default();
        assemble_dummy_state(&mut dummy, &shared.uniforms, base..base + maps, shared.fallback_shadow, Some(shared.fallback_base));
        shared.dummy = Arc::new(dummy);

        if let Err(e) = self.backend.upload_uniforms(shared.receiving_program, &shared.uniforms) {
            log::warn!("Could not upload shadow uniforms: {e}");
        }
    }

    fn tuning(&self) -> Tuning {
        *self.tuning.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_shared(&self, f: impl FnOnce(&Self, &mut SharedState)) {
        if let Some(shared) = self.shared.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            f(self, shared);
        }
    }

    /// Turn shadows back on
    pub fn enable_shadows(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Turn shadows off. With `set_dummy_state`, receivers are culled with a
    /// state that binds a fully lit fallback to every shadow unit.
    pub fn disable_shadows(&self, set_dummy_state: bool) {
        self.enabled.store(false, Ordering::Relaxed);
        self.use_dummy_state.store(set_dummy_state, Ordering::Relaxed);
    }

    /// Whether shadows are rendered
    pub fn is_shadows_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Show each shadow map and the view frustum inside it
    pub fn enable_debug_hud(&self) {
        let mut hud = self.debug_hud.lock().unwrap_or_else(PoisonError::into_inner);
        if hud.is_none() {
            *hud = Some(Arc::new(DebugHud::new(HUD_PANEL_SIZE)));
        }
    }

    /// Hide the debug overlay
    pub fn disable_debug_hud(&self) {
        *self.debug_hud.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The debug overlay, if enabled
    pub fn debug_hud(&self) -> Option<Arc<DebugHud>> {
        self.debug_hud.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Weight of the logarithmic term in cascade splits, `0..=1`
    pub fn set_split_point_uniform_logarithmic_ratio(&self, ratio: f64) {
        self.tuning.lock().unwrap_or_else(PoisonError::into_inner).log_ratio = ratio;
    }

    /// Constant shift applied to interior cascade splits
    pub fn set_split_point_delta_bias(&self, bias: f64) {
        self.tuning.lock().unwrap_or_else(PoisonError::into_inner).delta_bias = bias;
    }

    /// Depth bias used while rendering casters
    pub fn set_polygon_offset(&self, factor: f32, units: f32) {
        self.tuning.lock().unwrap_or_else(PoisonError::into_inner).polygon_offset = (factor, units);
        self.update_shared(|this, shared| shared.casting.set_polygon_offset(&this.state_cache, factor, units));
        self.state_cache.prune();
    }

    /// Fraction of the maximum shadow distance at which shadows start fading
    pub fn set_shadow_fade_start(&self, fade_start: f64) {
        self.tuning.lock().unwrap_or_else(PoisonError::into_inner).shadow_fade_start = fade_start;
        self.update_shared(|this, shared| this.refresh_uniforms(shared, fade_start));
    }

    /// Render back faces into the shadow maps
    pub fn enable_front_face_culling(&self) {
        self.set_front_face_culling(true);
    }

    /// Render both faces into the shadow maps
    pub fn disable_front_face_culling(&self) {
        self.set_front_face_culling(false);
    }

    fn set_front_face_culling(&self, enabled: bool) {
        self.tuning.lock().unwrap_or_else(PoisonError::into_inner).front_face_culling = enabled;
        self.update_shared(|this, shared| shared.casting.set_front_face_culling(&this.state_cache, enabled));
        self.state_cache.prune();
    }

    /// Render state casters are drawn with, once initialised
    pub fn casting_state(&self) -> Option<CastingState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner).as_ref().map(|s| s.casting.clone())
    }

    /// State bound to receivers while shadows are disabled, once initialised
    pub fn dummy_state(&self) -> Option<Arc<ShadowStateSet>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner).as_ref().map(|s| Arc::clone(&s.dummy))
    }

    /// State of one view, if it was ever culled
    pub fn view_data(&self, view: ViewHandle) -> Option<Arc<Mutex<ViewDependentData>>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner).get(&view).cloned()
    }

    /// Number of views with state
    pub fn view_count(&self) -> usize {
        self.views.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn view_data_or_insert(&self, view: ViewHandle) -> Arc<Mutex<ViewDependentData>> {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(views.entry(view).or_insert_with(|| {
            log::debug!("New shadow view {view:?}");
            Arc::new(Mutex::new(ViewDependentData::new()))
        }))
    }

    /// Release the shadow maps of every view. Views keep their entries and
    /// allocate again on their next cull. Safe to call repeatedly.
    pub fn release_gl_objects(&self) {
        let views: Vec<_> = self.views.lock().unwrap_or_else(PoisonError::into_inner).values().cloned().collect();
        for view in views {
            view.lock().unwrap_or_else(PoisonError::into_inner).release_gl_objects(self.backend.as_ref());
        }
    }

    /// Release everything and forget every view; [`init`](Self::init) must
    /// run again before shadows are rendered.
    pub fn clean_scene_graph(&self) {
        self.release_gl_objects();
        self.views.lock().unwrap_or_else(PoisonError::into_inner).clear();
        if let Some(shared) = self.shared.lock().unwrap_or_else(PoisonError::into_inner).take() {
            self.backend.release_program(shared.casting_program);
            self.backend.release_program(shared.receiving_program);
            self.backend.release_texture(shared.fallback_base);
            self.backend.release_texture(shared.fallback_shadow);
        }
        self.state_cache.prune();
        self.texture_unit_warning.reset();
        self.psm_warning.reset();
        log::debug!("Shadow scene graph cleaned");
    }

    /// Per-view state is keyed by view handle rather than by graphics
    /// context, so there is nothing to grow.
    pub fn resize_gl_object_buffers(&self, max_size: usize) {
        log::trace!("resize_gl_object_buffers({max_size}) ignored");
    }

    /// Cull one view for one frame
    pub fn cull(&self, cv: &mut dyn CullTraversal) {
        let receives_mask = self.settings.receives_shadow_traversal_mask;
        let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner).clone();

        if !self.is_shadows_enabled() {
            let dummy = shared.filter(|_| self.use_dummy_state.load(Ordering::Relaxed)).map(|s| s.dummy);
            cv.cull_receiving_scene(receives_mask, dummy.as_deref());
            return;
        }
        let Some(shared) = shared else {
            log::warn!("Shadow engine culled before init(), rendering without shadows");
            cv.cull_receiving_scene(receives_mask, None);
            cv.set_receiver_state(None);
            return;
        };

        let view = self.view_data_or_insert(cv.view_handle());
        let mut vdd = view.lock().unwrap_or_else(PoisonError::into_inner);
        self.cull_enabled(cv, &mut vdd, &shared);
    }

    fn view_near_far(&self, cv: &mut dyn CullTraversal, projection: &Mat4) -> Option<(f64, f64)> {
        let settings = &self.settings;
        let cached_mode = cv.near_far_mode();

        let (mut min_z_near, mut max_z_far) = if cached_mode == NearFarMode::DoNotCompute {
            projection.near_far().unwrap_or((0.0, f64::MAX))
        } else {
            (0.0, f64::MAX)
        };

        if let Some(mode) = settings.compute_near_far_mode_override {
            cv.set_near_far_mode(mode);
        }
        cv.cull_receiving_scene(settings.receives_shadow_traversal_mask, None);

        max_z_far = max_z_far.min(settings.maximum_shadow_map_distance);
        if min_z_near > max_z_far {
            min_z_near = max_z_far * settings.min_near_far_ratio;
        }

        let near_far = if cv.near_far_mode() == NearFarMode::DoNotCompute {
            (min_z_near, max_z_far)
        } else {
            let (calculated_near, calculated_far) = cv.calculated_near_far();
            (calculated_near.max(min_z_near), calculated_far.min(max_z_far))
        };
        cv.set_near_far_mode(cached_mode);

        if near_far.0 < near_far.1 {
            Some(near_far)
        } else {
            log::trace!("Nothing visible to shadow: near {} far {}", near_far.0, near_far.1);
            None
        }
    }

    #[allow(clippy::too_many_lines)]
    fn cull_enabled(&self, cv: &mut dyn CullTraversal, vdd: &mut ViewDependentData, shared: &SharedState) {
        let settings = &self.settings;
        let tuning = self.tuning();
        let main_view = cv.view_matrix();
        let main_projection = cv.projection_matrix();

        let Some(near_far) = self.view_near_far(cv, &main_projection) else {
            self.publish(cv, vdd, Vec::new(), Vec::new(), None, shared);
            return;
        };
        let Some(frustum) = Frustum::new(&main_view, &main_projection, Some(near_far)) else {
            log::debug!("View matrices are not invertible, skipping shadows");
            self.publish(cv, vdd, Vec::new(), Vec::new(), None, shared);
            return;
        };

        let mut lights = select_active_lights(cv.positioned_lights(), settings.light_num);
        let scene_bound = cv.scene_bound();
        let solver = SolverParams {
            cutoff_angle: settings.perspective_shadow_map_cutoff_angle,
            max_positional_fov: settings.max_positional_fov,
        };
        let split = SplitParams {
            log_ratio: tuning.log_ratio,
            delta_bias: tuning.delta_bias,
            min_near_far_ratio: settings.min_near_far_ratio,
        };
        let maps = settings.effective_shadow_maps_per_light();

        let mut previous: VecDeque<ShadowData> = std::mem::take(&mut vdd.shadows).into();
        let mut shadows = Vec::new();
        let mut texture_unit = settings.base_shadow_texture_unit;
        let mut debug_x = 0;

        for light in &mut lights {
            let polytope = light_polytope(&frustum, light);
            if polytope.is_empty() {
                log::trace!("Light {} lights nothing in view", light.light_num);
                continue;
            }
            let Some(camera) = compute_shadow_camera(&frustum, light, &scene_bound, &solver) else {
                log::trace!("No shadow camera for light {}", light.light_num);
                continue;
            };
            let light_view = camera.view;
            let mut light_projection = camera.projection;

            if settings.casts_shadow_traversal_mask != NODE_MASK_ALL {
                if let Some(root) = cv.shadowed_scene() {
                    let mut walker =
                        LightSpaceBounds::new(light_projection * light_view, &polytope, settings.casts_shadow_traversal_mask);
                    walker.visit(root);
                    if let Some(cropped) = crop_xy(&light_projection, &walker.bounds()) {
                        light_projection = cropped;
                    }
                }
            }

            let parallel_split = maps > 1 && settings.multiple_shadow_map_hint == MultipleShadowMapHint::ParallelSplit;
            let split_point =
                if parallel_split { parallel_split_point(&frustum, &(light_projection * light_view)) } else { 0.0 };

            for map in 0..maps {
                if texture_unit >= settings.max_texture_units {
                    if self.texture_unit_warning.first() {
                        log::warn!(
                            "Shadow texture unit {texture_unit} is beyond the {} addressable units, map dropped",
                            settings.max_texture_units
                        );
                    }
                    break;
                }

                let mut projection = light_projection;
                let mut culling_volume = polytope.clone();
                let mut view_range = (frustum.near, frustum.far);

                match settings.multiple_shadow_map_hint {
                    MultipleShadowMapHint::Cascaded => {
                        let range = cascade_range(map, maps, frustum.near, frustum.far, &split);
                        let Some(crop) = crop_to_main_frustum(&frustum, &light_view, &projection, range.near, range.far)
                        else {
                            log::trace!("Cascade {map} of light {} outside its camera", light.light_num);
                            continue;
                        };
                        projection = crop.projection;
                        culling_volume.extend(crop.planes);
                        view_range = (range.near, range.far);
                    }
                    MultipleShadowMapHint::ParallelSplit if parallel_split => {
                        let slice = ParallelSlice::new(map, split_point);
                        culling_volume.extend([slice.world_plane(&(projection * light_view))]);
                        projection = slice.crop_projection(&projection);
                    }
                    MultipleShadowMapHint::ParallelSplit => {}
                }

                let mut sd = match previous.pop_front() {
                    Some(sd) => sd,
                    None => match ShadowData::new(self.backend.as_ref(), settings) {
                        Ok(sd) => sd,
                        Err(e) => {
                            log::warn!("Could not allocate shadow map {map} of light {}: {e}", light.light_num);
                            continue;
                        }
                    },
                };
                sd.camera.view = light_view;
                sd.camera.projection = projection;
                if settings.debug_draw {
                    sd.camera.viewport.x = debug_x;
                    debug_x += sd.camera.viewport.width + DEBUG_VIEWPORT_GAP;
                }

                let stage = cv.cull_casting_scene(&CasterPass {
                    shadow_map_index: u32::try_from(shadows.len()).unwrap_or(u32::MAX),
                    camera: &sd.camera,
                    culling_volume: &culling_volume,
                    traversal_mask: settings.casts_shadow_traversal_mask,
                    state: &shared.casting,
                });

                if let Some((near, far)) = stage.near_far {
                    let mut clamped = projection;
                    if clamped.clamp_near_far(near, far) {
                        projection = clamped;
                    }
                }

                if settings.tight_fit_from_render_leaves && !stage.render_leaves.is_empty() {
                    let leaves = RenderLeafBounds::measure_clamped(&stage.render_leaves, &(projection * light_view));
                    if let Some(cropped) = crop_xy(&projection, &leaves.bounds) {
                        projection = cropped;
                    }
                }

                sd.valid_region = valid_region_matrix(&light_view, &projection, &main_view);

                if !frustum.orthographic && settings.shadow_map_projection_hint == ShadowMapProjectionHint::PerspectiveShadowMap {
                    let outcome = adjust_perspective_shadow_map(&PsmInput {
                        frustum: &frustum,
                        view_range,
                        light_view: &light_view,
                        light_projection: &projection,
                        render_leaves: &stage.render_leaves,
                        cutoff_angle: settings.perspective_shadow_map_cutoff_angle,
                        min_near_far_ratio: settings.min_near_far_ratio,
                    });
                    if outcome == PsmOutcome::Unsupported && self.psm_warning.first() {
                        log::warn!("Perspective shadow maps need an orthographic light projection, using plain maps");
                    }
                    projection = outcome.projection_or(&projection);
                }

                sd.camera.projection = projection;
                sd.stage = stage.id;
                if let Some(id) = stage.id {
                    cv.update_casting_projection(id, &projection);
                }

                sd.texture_unit = texture_unit;
                sd.texgen = Some(texgen_for(&sd.camera, &main_view, texture_unit));
                light.texture_units.push(texture_unit);
                shadows.push(sd);
                texture_unit += 1;
            }
        }

        for mut unused in previous {
            unused.release_gl_objects(self.backend.as_ref());
        }

        self.publish(cv, vdd, lights, shadows, Some(&frustum), shared);
    }

    fn publish(
        &self,
        cv: &mut dyn CullTraversal,
        vdd: &mut ViewDependentData,
        lights: Vec<LightData>,
        shadows: Vec<ShadowData>,
        frustum: Option<&Frustum>,
        shared: &SharedState,
    ) {
        let traversal_number = cv.traversal_number();
        let parity = usize::from(traversal_number % 2 == 1);

        assemble_receiver_state(
            vdd.state_set_mut(parity),
            &shadows,
            &shared.uniforms,
            self.settings.base_shadow_texture_unit,
            Some(shared.fallback_base),
            Some(shared.receiving_program),
        );
        cv.set_receiver_state((!shadows.is_empty()).then(|| vdd.state_set(parity)));

        if let (Some(hud), Some(frustum)) = (self.debug_hud(), frustum) {
            for draw in hud.build(frustum, &shadows, traversal_number) {
                cv.draw_debug_hud(&draw);
            }
        }

        log::trace!("View {:?}: {} light(s), {} shadow map(s)", cv.view_handle(), lights.len(), shadows.len());
        vdd.lights = lights;
        vdd.shadows = shadows;
    }
}
