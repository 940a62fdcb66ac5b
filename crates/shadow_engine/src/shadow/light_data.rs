//! Per-frame light records derived from the traversal's light state

use crate::foundation::math::{utils, Mat4, Vec3, Vec4};
use crate::scene::traversal::PositionedLight;

/// Whether a light has a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Parallel rays, no position
    Directional,
    /// Point or spot light
    Positional,
}

/// A light selected for shadowing this frame, in world space
#[derive(Debug, Clone, PartialEq)]
pub struct LightData {
    /// Light number
    pub light_num: u32,
    /// Directional or positional
    pub kind: LightKind,
    /// Homogeneous world position; `w == 0` for directional lights
    pub position: Vec4,
    /// Dehomogenised position, zero for directional lights
    pub position3: Vec3,
    /// Unit direction the light shines in; zero if degenerate
    pub direction: Vec3,
    /// Spot cutoff half-angle in degrees
    pub spot_cutoff: f64,
    /// Placement matrix the light was positioned with
    pub placement: Option<Mat4>,
    /// Texture units assigned to this light's shadow maps this frame
    pub texture_units: Vec<u32>,
}

impl LightData {
    /// Resolve a positioned light into world space
    pub fn new(light: &PositionedLight) -> Self {
        let directional = light.position.w == 0.0;
        let placement = light.placement.unwrap_or_else(Mat4::identity);
        let rotate = |v: &Vec3| placement.fixed_view::<3, 3>(0, 0) * v;

        let (position, position3, direction) = if directional {
            let towards_light = Vec3::new(light.position.x, light.position.y, light.position.z);
            let direction = utils::normalize_or_zero(&rotate(&-towards_light));
            (light.position, Vec3::zeros(), direction)
        } else {
            let position = placement * light.position;
            let position3 = if position.w == 0.0 {
                Vec3::new(position.x, position.y, position.z)
            } else {
                Vec3::new(position.x, position.y, position.z) / position.w
            };
            let direction = utils::normalize_or_zero(&rotate(&light.direction));
            (position, position3, direction)
        };

        Self {
            light_num: light.light_num,
            kind: if directional { LightKind::Directional } else { LightKind::Positional },
            position,
            position3,
            direction,
            spot_cutoff: light.spot_cutoff,
            placement: light.placement,
            texture_units: Vec::new(),
        }
    }

    /// True for directional lights
    pub fn is_directional(&self) -> bool {
        self.kind == LightKind::Directional
    }

    /// True for positional lights with a cone narrower than a hemisphere
    pub fn is_spot(&self) -> bool {
        self.kind == LightKind::Positional && self.spot_cutoff * 2.0 < 180.0
    }
}

/// Pick the lights that cast shadows this frame.
///
/// Lights keep their discovery order. When `light_num` is set, other lights
/// are skipped; a light number already taken is not taken again.
pub fn select_active_lights(lights: &[PositionedLight], light_num: Option<u32>) -> Vec<LightData> {
    let mut selected: Vec<LightData> = Vec::new();
    for light in lights {
        if light_num.is_some_and(|wanted| wanted != light.light_num) {
            continue;
        }
        if selected.iter().any(|l| l.light_num == light.light_num) {
            log::trace!("Light {} already selected", light.light_num);
            continue;
        }
        selected.push(LightData::new(light));
    }
    selected
}
