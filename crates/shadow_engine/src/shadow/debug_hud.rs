//! On-screen overlay showing each shadow map and the view frustum inside it
//!
//! Panels are created on demand, one per shadow map, and laid out left to
//! right. Frustum wireframes are kept per frame parity because the host may
//! draw the previous frame while the next one is culled.

use std::sync::{Mutex, PoisonError};

use crate::foundation::math::{Mat4Ext, Vec3};
use crate::render::backend::TextureHandle;
use crate::render::camera::Viewport;
use crate::shadow::frustum::Frustum;
use crate::shadow::view_data::ShadowData;

/// Gap between panels in pixels
pub const PANEL_GAP: u32 = 40;

/// One panel to draw
#[derive(Debug, Clone, PartialEq)]
pub struct HudDraw {
    /// Panel index, equal to the shadow map index
    pub panel: usize,
    /// Shadow map texture shown in the panel
    pub texture: TextureHandle,
    /// Screen rectangle of the panel
    pub viewport: Viewport,
    /// Main frustum edges as line-list vertices in the map's clip space
    pub frustum_vertices: Vec<Vec3>,
}

/// Debug overlay state of an engine
#[derive(Debug)]
pub struct DebugHud {
    panel_size: u32,
    panels: Mutex<Vec<Viewport>>,
    frustum_vertices: Mutex<[Vec<Vec<Vec3>>; 2]>,
}

impl DebugHud {
    /// Overlay with square panels of `panel_size` pixels
    pub fn new(panel_size: u32) -> Self {
        Self { panel_size, panels: Mutex::new(Vec::new()), frustum_vertices: Mutex::new([Vec::new(), Vec::new()]) }
    }

    /// Number of panels created so far
    pub fn panel_count(&self) -> usize {
        self.panels.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn panel(&self, index: usize) -> Viewport {
        let mut panels = self.panels.lock().unwrap_or_else(PoisonError::into_inner);
        while panels.len() <= index {
            let x = panels.last().map_or(0, |last: &Viewport| last.x + last.width + PANEL_GAP);
            panels.push(Viewport { x, y: 0, width: self.panel_size, height: self.panel_size });
        }
        panels[index]
    }

    /// Record this frame's wireframes and produce the panels to draw
    pub fn build(&self, frustum: &Frustum, shadows: &[ShadowData], traversal_number: u64) -> Vec<HudDraw> {
        let parity = usize::from(traversal_number % 2 == 1);
        let wireframe = frustum.wireframe();

        let per_map: Vec<Vec<Vec3>> = shadows
            .iter()
            .map(|shadow| {
                let vp = shadow.camera.view_projection();
                wireframe.iter().map(|v| vp.project_point(v)).collect()
            })
            .collect();

        let draws = shadows
            .iter()
            .zip(&per_map)
            .enumerate()
            .filter_map(|(panel, (shadow, vertices))| {
                let texture = shadow.texture?;
                Some(HudDraw { panel, texture, viewport: self.panel(panel), frustum_vertices: vertices.clone() })
            })
            .collect();

        self.frustum_vertices.lock().unwrap_or_else(PoisonError::into_inner)[parity] = per_map;
        draws
    }

    /// Wireframes recorded for a frame parity
    pub fn frustum_vertices(&self, parity: usize) -> Vec<Vec<Vec3>> {
        self.frustum_vertices.lock().unwrap_or_else(PoisonError::into_inner)[parity % 2].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::render::backend::HeadlessBackend;
    use crate::shadow::settings::ShadowSettings;

    #[test]
    fn test_panels_laid_out_with_gap() {
        let backend = HeadlessBackend::new();
        let settings = ShadowSettings { debug_draw: true, ..ShadowSettings::default() };
        let shadows = vec![
            ShadowData::new(&backend, &settings).unwrap(),
            ShadowData::new(&backend, &settings).unwrap(),
        ];
        let frustum = Frustum::new(&Mat4::identity(), &Mat4::perspective_degrees(60.0, 1.0, 1.0, 10.0), None).unwrap();
        let hud = DebugHud::new(256);
        let draws = hud.build(&frustum, &shadows, 7);
        assert_eq!(draws.len(), 2);
        assert_eq!(hud.panel_count(), 2);
        assert_eq!(draws[1].viewport.x, 256 + PANEL_GAP);
        assert_eq!(draws[0].frustum_vertices.len(), 24);
        assert_eq!(hud.frustum_vertices(1).len(), 2);
        assert!(hud.frustum_vertices(0).is_empty());
    }
}
