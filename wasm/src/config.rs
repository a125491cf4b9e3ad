use glam::Vec3;
use wasm_bindgen::prelude::*;

use crate::error::{RenderError, RenderResult};
use crate::renderer::water::grid_side;

/// Scene configuration passed to `WaterScene::init`
#[wasm_bindgen]
#[derive(Clone, Debug)]
pub struct SceneConfig {
    pub(crate) target_width: u32,
    pub(crate) target_height: u32,
    pub(crate) water_height: f32,      // Sine surface and clip plane, model space
    pub(crate) height_map_plane: f32,  // Height-map surface, model space
    pub(crate) cell_size: f32,
    pub(crate) mirror_plane: f32,
    pub(crate) reflection_scale: f32,  // Vertical scale of the mirrored camera
    pub(crate) model_scale: f32,
    pub(crate) model_origin: Vec3,
    pub(crate) height_map_frames: u32,
    pub(crate) time_step: f32,
    pub(crate) amplitude: f32,
    pub(crate) wavelength: f32,
    pub(crate) base_path: String,
    pub(crate) debug_monitor: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig {
            target_width: 590,
            target_height: 590,
            water_height: 0.3,
            height_map_plane: 0.6,
            cell_size: 0.01,
            mirror_plane: 0.0,
            reflection_scale: 0.75,
            model_scale: 100.0,
            model_origin: Vec3::ZERO,
            height_map_frames: 200,
            time_step: 0.01,
            amplitude: 0.05,
            wavelength: 0.5,
            base_path: ".".to_string(),
            debug_monitor: false,
        }
    }
}

#[wasm_bindgen]
impl SceneConfig {
    #[wasm_bindgen(constructor)]
    pub fn new() -> SceneConfig {
        SceneConfig::default()
    }

    #[wasm_bindgen(getter)]
    pub fn base_path(&self) -> String {
        self.base_path.clone()
    }

    #[wasm_bindgen(setter)]
    pub fn set_base_path(&mut self, base_path: String) {
        self.base_path = base_path.trim_end_matches('/').to_string();
    }

    /// Resolution of both offscreen targets
    pub fn set_target_size(&mut self, width: u32, height: u32) {
        self.target_width = width;
        self.target_height = height;
    }

    #[wasm_bindgen(getter)]
    pub fn water_height(&self) -> f32 {
        self.water_height
    }

    #[wasm_bindgen(setter)]
    pub fn set_water_height(&mut self, water_height: f32) {
        self.water_height = water_height;
    }

    #[wasm_bindgen(getter)]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[wasm_bindgen(setter)]
    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.cell_size = cell_size;
    }

    #[wasm_bindgen(setter)]
    pub fn set_height_map_frames(&mut self, count: u32) {
        self.height_map_frames = count;
    }

    #[wasm_bindgen(setter)]
    pub fn set_reflection_scale(&mut self, scale: f32) {
        self.reflection_scale = scale;
    }

    #[wasm_bindgen(setter)]
    pub fn set_mirror_plane(&mut self, height: f32) {
        self.mirror_plane = height;
    }

    #[wasm_bindgen(setter)]
    pub fn set_model_scale(&mut self, scale: f32) {
        self.model_scale = scale;
    }

    pub fn set_model_origin(&mut self, x: f32, y: f32, z: f32) {
        self.model_origin = Vec3::new(x, y, z);
    }

    #[wasm_bindgen(setter)]
    pub fn set_time_step(&mut self, step: f32) {
        self.time_step = step;
    }

    #[wasm_bindgen(setter)]
    pub fn set_debug_monitor(&mut self, enabled: bool) {
        self.debug_monitor = enabled;
    }
}

impl SceneConfig {
    /// Reject values that would produce degenerate GPU resources
    pub fn validate(&self) -> RenderResult<()> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "target size must be non-zero, got {}x{}",
                self.target_width, self.target_height
            )));
        }
        grid_side(self.cell_size).map_err(|err| match err {
            RenderError::InvalidMesh(reason) => RenderError::InvalidConfig(reason),
            other => other,
        })?;
        if !self.model_scale.is_finite() || self.model_scale == 0.0 {
            return Err(RenderError::InvalidConfig(
                "model scale must be finite and non-zero".to_string(),
            ));
        }
        if !self.wavelength.is_finite() || self.wavelength <= 0.0 {
            return Err(RenderError::InvalidConfig(format!(
                "wavelength must be positive, got {}",
                self.wavelength
            )));
        }
        if !self.time_step.is_finite() {
            return Err(RenderError::InvalidConfig("time step must be finite".to_string()));
        }
        Ok(())
    }

    /// `{base}/Images/{relative}`
    pub fn image_path(&self, relative: &str) -> String {
        format!("{}/Images/{}", self.base_path, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SceneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_width, 590);
        assert_eq!(config.height_map_frames, 200);
        assert_eq!(config.water_height, 0.3);
    }

    #[test]
    fn test_rejects_zero_target() {
        let mut config = SceneConfig::default();
        config.set_target_size(0, 100);
        assert!(matches!(config.validate(), Err(RenderError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_cell_size() {
        for cell_size in [0.0, -0.5, 3.0, f32::NAN] {
            let mut config = SceneConfig::default();
            config.set_cell_size(cell_size);
            assert!(config.validate().is_err(), "cell size {cell_size}");
        }
    }

    #[test]
    fn test_rejects_cell_size_with_oversized_grid() {
        let mut config = SceneConfig::default();
        config.set_cell_size(1e-5);
        assert!(matches!(config.validate(), Err(RenderError::InvalidConfig(_))));

        config.set_cell_size(0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_image_path_trims_trailing_slash() {
        let mut config = SceneConfig::default();
        config.set_base_path("assets/".to_string());
        assert_eq!(config.image_path("tiles.jpg"), "assets/Images/tiles.jpg");
    }
}
