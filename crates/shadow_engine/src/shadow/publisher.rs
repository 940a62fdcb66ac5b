//! Receiver state assembled from a frame's shadow maps

use crate::foundation::math::{Mat4, Vec3};
use crate::render::backend::{ProgramHandle, TextureHandle};
use crate::render::camera::ShadowCamera;
use crate::render::state::{uniform_names, ShadowStateSet, TexGenBinding, TexGenCoords, Uniform, UniformValue};
use crate::shadow::view_data::ShadowData;

/// Unit the receivers' base texture is sampled from
pub const BASE_TEXTURE_UNIT: u32 = 0;

/// Clip space to `[0, 1]` texture space
pub fn texture_bias() -> Mat4 {
    Mat4::new_scaling(0.5) * Mat4::new_translation(&Vec3::new(1.0, 1.0, 1.0))
}

/// Texgen projecting receivers into a shadow camera's texture.
///
/// `main_view` is the receiving view's world to eye matrix; the eye-space
/// form keeps magnitudes small for single-precision upload.
pub fn texgen_for(camera: &ShadowCamera, main_view: &Mat4, unit: u32) -> TexGenBinding {
    let world_to_texture = texture_bias() * camera.view_projection();
    let eye_to_world = main_view.try_inverse().unwrap_or_else(Mat4::identity);
    TexGenBinding {
        unit,
        world_to_texture,
        eye_to_texture: world_to_texture * eye_to_world,
        coords: TexGenCoords::all(),
    }
}

/// Main-eye to shadow-clip matrix of an unwarped shadow camera
pub fn valid_region_matrix(light_view: &Mat4, light_projection: &Mat4, main_view: &Mat4) -> Mat4 {
    let eye_to_world = main_view.try_inverse().unwrap_or_else(Mat4::identity);
    light_projection * light_view * eye_to_world
}

/// Tuning that ends up in shared uniforms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformParams {
    /// First shadow texture unit
    pub base_shadow_texture_unit: u32,
    /// Maps per light
    pub shadow_maps_per_light: u32,
    /// Distance beyond which nothing is shadowed
    pub maximum_shadow_map_distance: f64,
    /// Fraction of that distance where fading starts
    pub shadow_fade_start: f64,
}

/// Uniforms shared by every frame's receiver state
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn shared_uniforms(params: &UniformParams) -> Vec<Uniform> {
    let mut uniforms = vec![
        Uniform::int(uniform_names::BASE_TEXTURE, BASE_TEXTURE_UNIT as i32),
        Uniform::int(uniform_names::BASE_TEXTURE_UNIT, BASE_TEXTURE_UNIT as i32),
        Uniform::float(uniform_names::MAXIMUM_SHADOW_MAP_DISTANCE, params.maximum_shadow_map_distance as f32),
        Uniform::float(
            uniform_names::SHADOW_FADE_START,
            (params.maximum_shadow_map_distance * params.shadow_fade_start) as f32,
        ),
    ];
    for k in 0..params.shadow_maps_per_light {
        let unit = (params.base_shadow_texture_unit + k) as i32;
        uniforms.push(Uniform::int(uniform_names::shadow_texture(k), unit));
        uniforms.push(Uniform::int(uniform_names::shadow_texture_unit(k), unit));
    }
    uniforms
}

/// Rebuild `set` from this frame's shadow maps
pub fn assemble_receiver_state(
    set: &mut ShadowStateSet,
    shadows: &[ShadowData],
    uniforms: &[Uniform],
    base_shadow_texture_unit: u32,
    fallback_base_texture: Option<TextureHandle>,
    program: Option<ProgramHandle>,
) {
    set.clear();
    if let Some(texture) = fallback_base_texture {
        set.bind_texture(BASE_TEXTURE_UNIT, texture);
    }
    for uniform in uniforms {
        set.set_uniform(uniform.clone());
    }
    set.program = program;

    for shadow in shadows {
        let Some(texture) = shadow.texture else {
            continue;
        };
        set.bind_texture(shadow.texture_unit, texture);
        if let Some(texgen) = shadow.texgen {
            set.set_texgen(texgen);
        }
        let index = shadow.texture_unit.saturating_sub(base_shadow_texture_unit);
        set.set_uniform(Uniform::new(
            uniform_names::valid_region_matrix(index),
            UniformValue::from_mat4(&shadow.valid_region),
        ));
    }
}

/// State bound while shadows are disabled: every configured shadow unit
/// samples the fallback texture, which reads as fully lit.
pub fn assemble_dummy_state(
    set: &mut ShadowStateSet,
    uniforms: &[Uniform],
    units: impl IntoIterator<Item = u32>,
    fallback_shadow_texture: TextureHandle,
    fallback_base_texture: Option<TextureHandle>,
) {
    set.clear();
    if let Some(texture) = fallback_base_texture {
        set.bind_texture(BASE_TEXTURE_UNIT, texture);
    }
    for uniform in uniforms {
        set.set_uniform(uniform.clone());
    }
    for unit in units {
        set.bind_texture(unit, fallback_shadow_texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use crate::render::backend::{HeadlessBackend, ShadowBackend, TextureDesc, TextureFormat};
    use crate::shadow::settings::ShadowSettings;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-9;

    fn params() -> UniformParams {
        UniformParams {
            base_shadow_texture_unit: 1,
            shadow_maps_per_light: 2,
            maximum_shadow_map_distance: 1000.0,
            shadow_fade_start: 0.5,
        }
    }

    #[test]
    fn test_texgen_maps_clip_cube_to_unit_cube() {
        let mut camera = ShadowCamera::depth_pass(64, 64);
        camera.projection = Mat4::new_orthographic(-10.0, 10.0, -10.0, 10.0, 0.0, 20.0);
        let texgen = texgen_for(&camera, &Mat4::identity(), 3);
        assert_eq!(texgen.unit, 3);
        let low = texgen.world_to_texture.project_point(&Vec3::new(-10.0, -10.0, 0.0));
        let high = texgen.world_to_texture.project_point(&Vec3::new(10.0, 10.0, -20.0));
        assert_relative_eq!(low, Vec3::new(0.0, 0.0, 0.0), epsilon = EPSILON);
        assert_relative_eq!(high, Vec3::new(1.0, 1.0, 1.0), epsilon = EPSILON);
    }

    #[test]
    fn test_eye_texgen_matches_world_texgen() {
        let mut camera = ShadowCamera::depth_pass(64, 64);
        camera.projection = Mat4::new_orthographic(-10.0, 10.0, -10.0, 10.0, 0.0, 20.0);
        let main_view = Mat4::look_at(&Vec3::new(3.0, 4.0, 5.0), &Vec3::zeros(), &Vec3::y());
        let texgen = texgen_for(&camera, &main_view, 1);
        let world = Vec3::new(1.0, -2.0, -3.0);
        let eye = main_view.project_point(&world);
        assert_relative_eq!(
            texgen.eye_to_texture.project_point(&eye),
            texgen.world_to_texture.project_point(&world),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_shared_uniforms() {
        let uniforms = shared_uniforms(&params());
        let mut set = ShadowStateSet::default();
        for u in &uniforms {
            set.set_uniform(u.clone());
        }
        assert_eq!(set.uniform("shadowTexture1"), Some(&UniformValue::Int(2)));
        assert_eq!(set.uniform("shadowFadeStart"), Some(&UniformValue::Float(500.0)));
        assert_eq!(set.uniform("baseTexture"), Some(&UniformValue::Int(0)));
    }

    #[test]
    fn test_receiver_state_binds_each_map() {
        let backend = HeadlessBackend::new();
        let settings = ShadowSettings::default();
        let mut shadows = vec![
            ShadowData::new(&backend, &settings).unwrap(),
            ShadowData::new(&backend, &settings).unwrap(),
        ];
        for (i, shadow) in shadows.iter_mut().enumerate() {
            shadow.texture_unit = 1 + i as u32;
            shadow.texgen = Some(texgen_for(&shadow.camera, &Mat4::identity(), shadow.texture_unit));
        }
        let base = backend.create_texture(&TextureDesc::fallback(TextureFormat::Rgba8)).unwrap();

        let mut set = ShadowStateSet::default();
        assemble_receiver_state(&mut set, &shadows, &shared_uniforms(&params()), 1, Some(base), None);
        assert_eq!(set.textures.len(), 3);
        assert_eq!(set.texgens.len(), 2);
        assert_eq!(set.texture_on(2), shadows[1].texture);
        assert!(set.uniform("validRegionMatrix1").is_some());
        assert!(set.uniform("validRegionMatrix2").is_none());
    }

    #[test]
    fn test_dummy_state_covers_units() {
        let backend = HeadlessBackend::new();
        let fallback = backend.create_texture(&TextureDesc::fallback(TextureFormat::Depth)).unwrap();
        let mut set = ShadowStateSet::default();
        assemble_dummy_state(&mut set, &shared_uniforms(&params()), 1..3, fallback, None);
        assert_eq!(set.texture_on(1), Some(fallback));
        assert_eq!(set.texture_on(2), Some(fallback));
        assert!(set.texgens.is_empty());
    }
}
