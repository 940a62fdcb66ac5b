//! Shadow configuration
//!
//! Defaults reproduce the behaviour most scenes want: one 1024² map per
//! light, perspective warping when the view allows it, and shadows out to
//! 8192 world units.

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::scene::node::NODE_MASK_ALL;
use crate::scene::traversal::NearFarMode;

/// How several shadow maps of one light divide the view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MultipleShadowMapHint {
    /// Split the light-space y range, with clip planes parallel to the light
    #[default]
    ParallelSplit,
    /// Split view depth into cascades and crop each to its slice
    Cascaded,
}

/// Projection used for shadow cameras
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShadowMapProjectionHint {
    /// Plain orthographic (directional) or perspective (positional) camera
    Orthographic,
    /// Warp the camera towards the viewer when the geometry allows it
    #[default]
    PerspectiveShadowMap,
}

/// Shadow engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Shadow map resolution in texels
    pub texture_size: (u32, u32),

    /// First texture unit used for shadow maps
    pub base_shadow_texture_unit: u32,

    /// Shadow maps per light
    pub num_shadow_maps_per_light: u32,

    /// Distance from the eye beyond which nothing is shadowed
    pub maximum_shadow_map_distance: f64,

    /// Near/far mode forced on the receiver traversal, `None` keeps the host's
    pub compute_near_far_mode_override: Option<NearFarMode>,

    /// Smallest near/far ratio allowed when deriving a near plane
    pub min_near_far_ratio: f64,

    /// Split scheme for several maps per light
    pub multiple_shadow_map_hint: MultipleShadowMapHint,

    /// Shadow camera projection scheme
    pub shadow_map_projection_hint: ShadowMapProjectionHint,

    /// Degrees from parallel within which light and view are considered aligned
    pub perspective_shadow_map_cutoff_angle: f64,

    /// Widest field of view of an omnidirectional light's camera, in degrees
    pub max_positional_fov: f64,

    /// Render shadow maps as color images for inspection
    pub debug_draw: bool,

    /// Only cast shadows from this light number
    pub light_num: Option<u32>,

    /// Node mask selecting casters
    pub casts_shadow_traversal_mask: u32,

    /// Node mask selecting receivers
    pub receives_shadow_traversal_mask: u32,

    /// Number of addressable texture units
    pub max_texture_units: u32,

    /// Tighten the crop to the bounds of the casters actually queued
    pub tight_fit_from_render_leaves: bool,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            texture_size: (1024, 1024),
            base_shadow_texture_unit: 1,
            num_shadow_maps_per_light: 1,
            maximum_shadow_map_distance: 8192.0,
            compute_near_far_mode_override: Some(NearFarMode::ComputeUsingBoundingVolumes),
            min_near_far_ratio: 0.05,
            multiple_shadow_map_hint: MultipleShadowMapHint::ParallelSplit,
            shadow_map_projection_hint: ShadowMapProjectionHint::PerspectiveShadowMap,
            perspective_shadow_map_cutoff_angle: 2.0,
            max_positional_fov: 160.0,
            debug_draw: false,
            light_num: None,
            casts_shadow_traversal_mask: NODE_MASK_ALL,
            receives_shadow_traversal_mask: NODE_MASK_ALL,
            max_texture_units: 8,
            tight_fit_from_render_leaves: true,
        }
    }
}

impl Config for ShadowSettings {}

impl ShadowSettings {
    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.texture_size.0 == 0 || self.texture_size.1 == 0 {
            return Err(ConfigError::Invalid {
                field: "texture_size",
                reason: format!("{:?} has a zero dimension", self.texture_size),
            });
        }
        if self.num_shadow_maps_per_light == 0 {
            return Err(ConfigError::Invalid {
                field: "num_shadow_maps_per_light",
                reason: "at least one map is required".to_string(),
            });
        }
        if !(self.maximum_shadow_map_distance > 0.0) {
            return Err(ConfigError::Invalid {
                field: "maximum_shadow_map_distance",
                reason: format!("{} is not positive", self.maximum_shadow_map_distance),
            });
        }
        if !(self.min_near_far_ratio > 0.0 && self.min_near_far_ratio < 1.0) {
            return Err(ConfigError::Invalid {
                field: "min_near_far_ratio",
                reason: format!("{} is outside (0, 1)", self.min_near_far_ratio),
            });
        }
        if !(0.0..90.0).contains(&self.perspective_shadow_map_cutoff_angle) {
            return Err(ConfigError::Invalid {
                field: "perspective_shadow_map_cutoff_angle",
                reason: format!("{} is outside [0, 90)", self.perspective_shadow_map_cutoff_angle),
            });
        }
        if !(self.max_positional_fov > 0.0 && self.max_positional_fov < 180.0) {
            return Err(ConfigError::Invalid {
                field: "max_positional_fov",
                reason: format!("{} is outside (0, 180)", self.max_positional_fov),
            });
        }
        Ok(())
    }

    /// Shadow maps per light the chosen split scheme can honour
    ///
    /// Parallel splitting is only defined for two maps.
    pub fn effective_shadow_maps_per_light(&self) -> u32 {
        match self.multiple_shadow_map_hint {
            MultipleShadowMapHint::ParallelSplit => self.num_shadow_maps_per_light.min(2),
            MultipleShadowMapHint::Cascaded => self.num_shadow_maps_per_light,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ShadowSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.effective_shadow_maps_per_light(), 1);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: ShadowSettings = toml::from_str(
            "num_shadow_maps_per_light = 4\nmultiple_shadow_map_hint = \"Cascaded\"\ntexture_size = [2048, 2048]\n",
        )
        .unwrap();
        assert_eq!(settings.num_shadow_maps_per_light, 4);
        assert_eq!(settings.effective_shadow_maps_per_light(), 4);
        assert_eq!(settings.texture_size, (2048, 2048));
        assert_eq!(settings.max_texture_units, 8);
    }

    #[test]
    fn test_parallel_split_caps_at_two() {
        let settings = ShadowSettings { num_shadow_maps_per_light: 3, ..ShadowSettings::default() };
        assert_eq!(settings.effective_shadow_maps_per_light(), 2);
    }

    #[test]
    fn test_save_and_load_ron() {
        let path = std::env::temp_dir().join(format!("shadow_settings_{}.ron", std::process::id()));
        let settings = ShadowSettings { light_num: Some(2), debug_draw: true, ..ShadowSettings::default() };
        settings.save_to_file(&path).unwrap();
        let loaded = ShadowSettings::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_rejects_zero_maps() {
        let settings = ShadowSettings { num_shadow_maps_per_light: 0, ..ShadowSettings::default() };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid { field: "num_shadow_maps_per_light", .. })));
    }
}
