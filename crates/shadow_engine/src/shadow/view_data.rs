//! Per-view shadow state
//!
//! One [`ViewDependentData`] exists per host view. It owns the shadow maps
//! rendered for that view and the receiver state published from them.

use std::sync::Arc;

use crate::foundation::math::Mat4;
use crate::render::backend::{Attachment, BackendResult, RenderTargetDesc, ShadowBackend, TextureDesc, TextureHandle};
use crate::render::camera::ShadowCamera;
use crate::render::state::{ShadowStateSet, TexGenBinding};
use crate::scene::traversal::StageId;
use crate::shadow::light_data::LightData;
use crate::shadow::settings::ShadowSettings;

/// Side of the color texture used when shadow maps are drawn for debugging
pub const DEBUG_TEXTURE_SIZE: u32 = 512;

/// One shadow map: its texture, the camera rendering it and where it binds
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowData {
    /// Texture rendered into; `None` once released
    pub texture: Option<TextureHandle>,
    /// Camera rendering the casters
    pub camera: ShadowCamera,
    /// Texture unit the map is bound to on receivers
    pub texture_unit: u32,
    /// Texture coordinate generator for receivers
    pub texgen: Option<TexGenBinding>,
    /// Main-eye to shadow-clip matrix, before any warp
    pub valid_region: Mat4,
    /// Caster stage queued for this map in the current frame
    pub stage: Option<StageId>,
}

impl ShadowData {
    /// Allocate the texture and render target of a new map.
    ///
    /// Debug mode renders a color image post-render so it can be shown on
    /// screen; otherwise depth is rendered pre-render for receivers.
    pub fn new(backend: &dyn ShadowBackend, settings: &ShadowSettings) -> BackendResult<Self> {
        let (desc, mut camera) = if settings.debug_draw {
            (
                TextureDesc::debug_color(DEBUG_TEXTURE_SIZE, DEBUG_TEXTURE_SIZE),
                ShadowCamera::debug_pass(DEBUG_TEXTURE_SIZE, DEBUG_TEXTURE_SIZE),
            )
        } else {
            let (w, h) = settings.texture_size;
            (TextureDesc::shadow_depth(w, h), ShadowCamera::depth_pass(w, h))
        };

        let texture = backend.create_texture(&desc)?;
        let target = backend.create_render_target(&RenderTargetDesc {
            texture,
            attachment: camera.attachment,
            width: desc.width,
            height: desc.height,
        });
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                backend.release_texture(texture);
                return Err(e);
            }
        };
        camera.target = Some(target);
        log::debug!(
            "Created {}x{} {} shadow map",
            desc.width,
            desc.height,
            if camera.attachment == Attachment::Color { "debug" } else { "depth" }
        );

        Ok(Self {
            texture: Some(texture),
            camera,
            texture_unit: 0,
            texgen: None,
            valid_region: Mat4::identity(),
            stage: None,
        })
    }

    /// True once the GPU objects have been handed back
    pub fn is_released(&self) -> bool {
        self.texture.is_none() && self.camera.target.is_none()
    }

    /// Hand the GPU objects back; repeated calls do nothing
    pub fn release_gl_objects(&mut self, backend: &dyn ShadowBackend) {
        if let Some(target) = self.camera.target.take() {
            backend.release_render_target(target);
        }
        if let Some(texture) = self.texture.take() {
            backend.release_texture(texture);
        }
    }
}

/// Everything the engine keeps for one view
#[derive(Debug, Default)]
pub struct ViewDependentData {
    /// Lights shadowed in the last frame, in discovery order
    pub lights: Vec<LightData>,
    /// Shadow maps of the last frame, in light then map order
    pub shadows: Vec<ShadowData>,
    state_sets: [Arc<ShadowStateSet>; 2],
}

impl ViewDependentData {
    /// Empty per-view state
    pub fn new() -> Self {
        Self::default()
    }

    /// Writable receiver state of a frame parity.
    ///
    /// The host may still hold the other parity's state while this one is
    /// rebuilt; if it still holds this one too, it keeps its copy.
    pub fn state_set_mut(&mut self, parity: usize) -> &mut ShadowStateSet {
        Arc::make_mut(&mut self.state_sets[parity % 2])
    }

    /// Shared receiver state of a frame parity
    pub fn state_set(&self, parity: usize) -> Arc<ShadowStateSet> {
        Arc::clone(&self.state_sets[parity % 2])
    }

    /// Release every owned shadow map; safe to call repeatedly
    pub fn release_gl_objects(&mut self, backend: &dyn ShadowBackend) {
        for shadow in &mut self.shadows {
            shadow.release_gl_objects(backend);
        }
        self.shadows.clear();
        for set in &mut self.state_sets {
            Arc::make_mut(set).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::HeadlessBackend;
    use crate::render::camera::RenderOrder;

    #[test]
    fn test_depth_map_setup() {
        let backend = HeadlessBackend::new();
        let settings = ShadowSettings { texture_size: (2048, 1024), ..ShadowSettings::default() };
        let shadow = ShadowData::new(&backend, &settings).unwrap();
        let desc = backend.texture_desc(shadow.texture.unwrap()).unwrap();
        assert_eq!((desc.width, desc.height), (2048, 1024));
        assert!(desc.compare.is_some());
        assert_eq!(shadow.camera.render_order, RenderOrder::PreRender);
        assert_eq!(shadow.camera.viewport.width, 2048);
        assert_eq!(backend.live_render_targets(), 1);
    }

    #[test]
    fn test_debug_map_setup() {
        let backend = HeadlessBackend::new();
        let settings = ShadowSettings { debug_draw: true, ..ShadowSettings::default() };
        let shadow = ShadowData::new(&backend, &settings).unwrap();
        let desc = backend.texture_desc(shadow.texture.unwrap()).unwrap();
        assert_eq!(desc.width, DEBUG_TEXTURE_SIZE);
        assert_eq!(shadow.camera.render_order, RenderOrder::PostRender);
        assert_eq!(shadow.camera.attachment, Attachment::Color);
    }

    #[test]
    fn test_failed_allocation_leaks_nothing() {
        let backend = HeadlessBackend::new();
        backend.set_fail_allocations(true);
        assert!(ShadowData::new(&backend, &ShadowSettings::default()).is_err());
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_release_twice() {
        let backend = HeadlessBackend::new();
        let mut vdd = ViewDependentData::new();
        vdd.shadows.push(ShadowData::new(&backend, &ShadowSettings::default()).unwrap());
        vdd.shadows.push(ShadowData::new(&backend, &ShadowSettings::default()).unwrap());
        vdd.release_gl_objects(&backend);
        vdd.release_gl_objects(&backend);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_render_targets(), 0);
        assert_eq!(backend.stale_releases(), 0);
    }

    #[test]
    fn test_state_sets_are_double_buffered() {
        let mut vdd = ViewDependentData::new();
        let held = vdd.state_set(0);
        vdd.state_set_mut(0).set_uniform(crate::render::state::Uniform::int("x", 1));
        assert!(held.uniform("x").is_none());
        assert!(vdd.state_set(0).uniform("x").is_some());
        assert!(vdd.state_set(1).uniform("x").is_none());
    }
}
