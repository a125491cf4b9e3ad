pub mod config;
pub mod error;
mod logger;
pub mod math;
pub mod renderer;

use crate::config::SceneConfig;
use crate::renderer::buffer::TargetKind;
use crate::renderer::camera::{matrix_from_slice, Camera, CameraMode};
use crate::renderer::context::RenderContext;
use crate::renderer::scene::{JsSceneGeometry, NoGeometry, SceneGeometry};
use crate::renderer::water::WaterMode;
use crate::renderer::{Renderer, WaveParams};
use js_sys::Function;
use wasm_bindgen::prelude::*;
use web_sys::WebGl2RenderingContext;

const NOT_INITIALIZED: &str = "Renderer not initialized. Call init() first.";

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Route `log` output to the browser console
///
/// # Arguments
/// * `level` - "error", "warn", "info", "debug" or "trace"; anything else means "info"
#[wasm_bindgen]
pub fn init_logging(level: &str) {
    logger::init(logger::parse_level(level));
}

/// Water scene with planar reflection and refraction, driven by the host page
#[wasm_bindgen]
#[derive(Default)]
pub struct WaterScene {
    ctx: Option<RenderContext>,
    renderer: Option<Renderer>,
    camera: Camera,
    geometry: Option<JsSceneGeometry>,
}

#[wasm_bindgen]
impl WaterScene {
    /// Create a new WaterScene instance
    #[wasm_bindgen(constructor)]
    pub fn new() -> WaterScene {
        WaterScene::default()
    }

    /// Initialize with WebGL 2.0 context
    ///
    /// # Arguments
    /// * `gl` - WebGL 2.0 rendering context from canvas
    /// * `config` - Scene configuration; validated before any GPU work
    ///
    /// # Returns
    /// * `"init_done"` signal on success
    ///
    /// # Errors
    /// * Shader, framebuffer or resource failures; the scene stays uninitialized
    pub fn init(
        &mut self,
        gl: WebGl2RenderingContext,
        config: SceneConfig,
    ) -> Result<String, JsValue> {
        self.release();

        let mut ctx = RenderContext::new(gl)?;
        let renderer = Renderer::initialize(&mut ctx, config)?;
        self.ctx = Some(ctx);
        self.renderer = Some(renderer);
        Ok("init_done".to_string())
    }

    /// Select the camera for the next frames
    ///
    /// # Arguments
    /// * `mode` - 0 world, 1 top-down, 2 first person
    /// * `view` - Column-major view matrix (16 floats), ignored in top-down mode
    /// * `projection` - Column-major projection matrix (16 floats), ignored in top-down mode
    ///
    /// # Returns
    /// * `"camera_done"` signal on success
    pub fn set_camera(
        &mut self,
        mode: u32,
        view: &[f32],
        projection: &[f32],
    ) -> Result<String, JsValue> {
        let mode = CameraMode::from_code(mode)?;
        if mode != CameraMode::Top {
            let view = matrix_from_slice(view)?;
            let projection = matrix_from_slice(projection)?;
            self.camera.set_host_matrices(view, projection);
        }
        self.camera.mode = mode;
        Ok("camera_done".to_string())
    }

    /// Choose the water surface
    ///
    /// # Arguments
    /// * `mode` - 0 no water, 1 sine wave, 2 height map
    ///
    /// # Returns
    /// * `"water_mode_done"` signal on success
    pub fn set_water_mode(&mut self, mode: u32) -> Result<String, JsValue> {
        let mode = WaterMode::from_code(mode)?;
        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        renderer.set_water_mode(mode);
        Ok("water_mode_done".to_string())
    }

    /// Tune the sine wave
    ///
    /// # Returns
    /// * `"wave_done"` signal on success
    pub fn set_wave(&mut self, amplitude: f32, wavelength: f32) -> Result<String, JsValue> {
        let wave = WaveParams::new(amplitude, wavelength)?;
        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        renderer.set_wave(wave);
        Ok("wave_done".to_string())
    }

    /// Show an offscreen target in the lower-left corner
    ///
    /// # Arguments
    /// * `source` - 0 off, 1 reflection, 2 refraction
    ///
    /// # Returns
    /// * `"monitor_done"` signal on success
    pub fn set_debug_monitor(&mut self, source: u32) -> Result<String, JsValue> {
        let monitor = match source {
            0 => None,
            1 => Some(TargetKind::Reflection),
            2 => Some(TargetKind::Refraction),
            other => {
                return Err(JsValue::from_str(&format!(
                    "Unknown monitor source: {}",
                    other
                )))
            }
        };
        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        renderer.set_monitor(monitor);
        Ok("monitor_done".to_string())
    }

    /// Register the callback drawing the host's opaque geometry
    ///
    /// Called as `callback(shadowPass, projection, view)` with column-major
    /// `Float32Array` matrices, once per frame and once more for shadows
    /// unless the top-down camera is active.
    ///
    /// # Returns
    /// * `"callback_done"` signal on success
    pub fn set_scene_callback(&mut self, callback: Function) -> Result<String, JsValue> {
        self.geometry = Some(JsSceneGeometry::new(callback));
        Ok("callback_done".to_string())
    }

    /// Render one frame to the canvas
    ///
    /// # Returns
    /// * `"render_done"` signal on success
    ///
    /// # Errors
    /// * A singular view matrix aborts the frame only
    /// * A fatal error also releases the renderer; call `init()` again
    pub fn render(&mut self) -> Result<String, JsValue> {
        let (Some(ctx), Some(renderer)) = (self.ctx.as_mut(), self.renderer.as_mut()) else {
            return Err(JsValue::from_str(NOT_INITIALIZED));
        };
        let geometry: &dyn SceneGeometry = match self.geometry.as_ref() {
            Some(geometry) => geometry,
            None => &NoGeometry,
        };

        match renderer.render(ctx, &self.camera, geometry) {
            Ok(()) => Ok("render_done".to_string()),
            Err(err) => {
                if err.is_fatal() {
                    log::error!("Releasing water renderer after fatal error: {}", err);
                    self.release();
                }
                Err(err.into())
            }
        }
    }

    /// Pick up a new canvas size (e.g., fullscreen); offscreen targets keep their size
    ///
    /// # Returns
    /// * `"resize_done"` signal on success
    pub fn resize(&mut self) -> Result<String, JsValue> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        let (width, height) = ctx.refresh_window_size()?;
        ctx.apply_window_viewport();
        log::debug!("Canvas resized to {}x{}", width, height);
        Ok("resize_done".to_string())
    }

    /// Release every GPU resource
    ///
    /// # Returns
    /// * `"clean_up_done"` signal on success
    pub fn clean_up(&mut self) -> Result<String, JsValue> {
        if self.renderer.is_none() {
            return Err(JsValue::from_str(NOT_INITIALIZED));
        }
        self.release();
        Ok("clean_up_done".to_string())
    }
}

impl WaterScene {
    fn release(&mut self) {
        if let (Some(mut ctx), Some(renderer)) = (self.ctx.take(), self.renderer.take()) {
            renderer.clean_up(&mut ctx);
        }
    }
}
