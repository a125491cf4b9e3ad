pub mod buffer;
pub mod camera;
pub mod context;
pub mod scene;
pub mod shader;
pub mod texture;
pub mod uniforms;
pub mod water;

use glam::{Mat4, Vec3};
use web_sys::{WebGl2RenderingContext, WebGlTexture};

use crate::config::SceneConfig;
use crate::error::{RenderError, RenderResult};
use crate::math::{self, MirroredView};
use buffer::{MeshBuffers, TargetKind, WaterFrameBuffers};
use camera::Camera;
use context::RenderContext;
use scene::{model_matrix, ClipMode, SceneGeometry, Skybox, Tiles, SKYBOX_UNIT};
use shader::{
    ShaderProgram, ShaderPrograms, BLEND, COLOR_BUFFER_BIT, DEPTH_BUFFER_BIT, DEPTH_TEST,
    ONE_MINUS_SRC_ALPHA, SRC_ALPHA, STENCIL_BUFFER_BIT, TRIANGLES,
};
use uniforms::FrameUniforms;
use water::{HeightMapFrames, WaterMode, WaterSurfaces};

// Texture units read by the water programs
pub const HEIGHT_UNIT: u32 = 0;
pub const REFRACTION_UNIT: u32 = 1;
pub const REFLECTION_UNIT: u32 = 2;
pub const DEPTH_UNIT: u32 = 4;

const WATER_COLOR: Vec3 = Vec3::new(0.0, 0.3, 0.6);
const BACKGROUND: [f32; 4] = [0.0, 0.0, 0.3, 0.0];

/// Sine wave shape, tunable while running
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveParams {
    pub amplitude: f32,
    pub wavelength: f32,
}

impl WaveParams {
    pub fn new(amplitude: f32, wavelength: f32) -> RenderResult<WaveParams> {
        if !amplitude.is_finite() {
            return Err(RenderError::InvalidConfig(format!(
                "amplitude must be finite, got {}",
                amplitude
            )));
        }
        if !wavelength.is_finite() || wavelength <= 0.0 {
            return Err(RenderError::InvalidConfig(format!(
                "wavelength must be positive, got {}",
                wavelength
            )));
        }
        Ok(WaveParams {
            amplitude,
            wavelength,
        })
    }
}

/// Planar reflection/refraction water renderer
pub struct Renderer {
    config: SceneConfig,
    programs: ShaderPrograms,
    targets: WaterFrameBuffers,
    uniforms: FrameUniforms,
    surfaces: WaterSurfaces,
    height_frames: HeightMapFrames,
    skybox: Skybox,
    tiles: Tiles,
    monitor_quad: MeshBuffers,
    water_mode: Option<WaterMode>,
    monitor: Option<TargetKind>,
    wave: WaveParams,
    time: f32,
}

/// Resources created so far by `Renderer::initialize`
#[derive(Default)]
struct Staged {
    programs: Option<ShaderPrograms>,
    uniforms: Option<FrameUniforms>,
    surfaces: Option<WaterSurfaces>,
    targets: Option<WaterFrameBuffers>,
    skybox: Option<Skybox>,
    tiles: Option<Tiles>,
    monitor_quad: Option<MeshBuffers>,
    height_frames: Option<HeightMapFrames>,
}

impl Staged {
    fn allocate(&mut self, ctx: &RenderContext, config: &SceneConfig) -> RenderResult<()> {
        self.programs = Some(ShaderPrograms::new(&ctx.gl)?);

        let mut uniforms = FrameUniforms::new();
        uniforms.ensure_allocated(ctx)?;
        self.uniforms = Some(uniforms);

        self.surfaces = Some(WaterSurfaces::build(ctx, config)?);
        self.targets = Some(WaterFrameBuffers::new(
            ctx,
            config.target_width,
            config.target_height,
        )?);
        self.skybox = Some(Skybox::new(ctx, config)?);
        self.tiles = Some(Tiles::new(ctx, config)?);
        self.monitor_quad = Some(Renderer::create_quad_buffer(ctx)?);
        self.height_frames = Some(HeightMapFrames::load(
            ctx,
            &config.base_path,
            config.height_map_frames,
        )?);
        Ok(())
    }

    /// First resource `allocate` has not produced, in creation order
    fn missing(&self) -> Option<&'static str> {
        [
            (self.programs.is_none(), "shader programs"),
            (self.uniforms.is_none(), "frame uniforms"),
            (self.surfaces.is_none(), "water meshes"),
            (self.targets.is_none(), "offscreen targets"),
            (self.skybox.is_none(), "skybox"),
            (self.tiles.is_none(), "tiles"),
            (self.monitor_quad.is_none(), "monitor quad"),
            (self.height_frames.is_none(), "height map frames"),
        ]
        .into_iter()
        .find_map(|(missing, name)| missing.then_some(name))
    }

    /// Delete whatever was created, newest first
    fn release(self, ctx: &RenderContext) {
        if let Some(height_frames) = self.height_frames {
            height_frames.release(&ctx.gl);
        }
        if let Some(monitor_quad) = self.monitor_quad {
            monitor_quad.release(ctx);
        }
        if let Some(tiles) = self.tiles {
            tiles.release(ctx);
        }
        if let Some(skybox) = self.skybox {
            skybox.release(ctx);
        }
        if let Some(targets) = self.targets {
            targets.clean_up(ctx);
        }
        if let Some(surfaces) = self.surfaces {
            surfaces.release(ctx);
        }
        if let Some(uniforms) = self.uniforms {
            uniforms.release(ctx);
        }
        if let Some(programs) = self.programs {
            programs.release(&ctx.gl);
        }
    }
}

impl Renderer {
    /// Allocate every GPU resource the frame loop needs.
    ///
    /// Any failure here is fatal; `render` assumes all of it exists. What was
    /// created before the failure is deleted again.
    pub fn initialize(ctx: &mut RenderContext, config: SceneConfig) -> RenderResult<Renderer> {
        config.validate()?;
        let wave = WaveParams::new(config.amplitude, config.wavelength)?;

        let mut staged = Staged::default();
        if let Err(err) = staged.allocate(ctx, &config) {
            log::error!("Water renderer setup failed: {}", err);
            staged.release(ctx);
            return Err(err);
        }

        let (programs, uniforms, surfaces, targets, skybox, tiles, monitor_quad, height_frames) =
            match staged {
                Staged {
                    programs: Some(programs),
                    uniforms: Some(uniforms),
                    surfaces: Some(surfaces),
                    targets: Some(targets),
                    skybox: Some(skybox),
                    tiles: Some(tiles),
                    monitor_quad: Some(monitor_quad),
                    height_frames: Some(height_frames),
                } => (
                    programs,
                    uniforms,
                    surfaces,
                    targets,
                    skybox,
                    tiles,
                    monitor_quad,
                    height_frames,
                ),
                incomplete => {
                    let missing = incomplete.missing().unwrap_or("resources");
                    incomplete.release(ctx);
                    return Err(RenderError::resource(format!(
                        "Water renderer setup left {} unallocated",
                        missing
                    )));
                }
            };

        ctx.apply_window_viewport();
        log::info!(
            "Water renderer ready: targets {}x{}, cell size {}",
            config.target_width,
            config.target_height,
            config.cell_size
        );

        Ok(Renderer {
            monitor: config.debug_monitor.then_some(TargetKind::Reflection),
            config,
            programs,
            targets,
            uniforms,
            surfaces,
            height_frames,
            skybox,
            tiles,
            monitor_quad,
            water_mode: Some(WaterMode::HeightMap),
            wave,
            time: 0.0,
        })
    }

    /// Full-screen quad as two triangles; the monitor shader shrinks it to a corner
    fn create_quad_buffer(ctx: &RenderContext) -> RenderResult<MeshBuffers> {
        let vertices: [f32; 12] = [
            -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
        ];
        let mut quad = MeshBuffers::begin(ctx)?;
        quad.attribute(ctx, 0, 2, &vertices)?;
        Ok(quad.finish(ctx))
    }

    /// `None` hides the water surface
    pub fn set_water_mode(&mut self, mode: Option<WaterMode>) {
        self.water_mode = mode;
    }

    pub fn set_wave(&mut self, wave: WaveParams) {
        self.wave = wave;
    }

    /// Show an offscreen target in the lower-left corner, or nothing
    pub fn set_monitor(&mut self, monitor: Option<TargetKind>) {
        self.monitor = monitor;
    }

    /// Draw one frame.
    ///
    /// Renders the base scene, then the backdrop into the reflection and
    /// refraction targets, then composites the backdrop and the water.
    pub fn render(
        &mut self,
        ctx: &mut RenderContext,
        camera: &Camera,
        geometry: &dyn SceneGeometry,
    ) -> RenderResult<()> {
        self.time += self.config.time_step;

        // Base pass
        ctx.gl.bind_framebuffer(WebGl2RenderingContext::FRAMEBUFFER, None);
        ctx.apply_window_viewport();
        let [r, g, b, a] = BACKGROUND;
        ctx.gl.clear_color(r, g, b, a);
        ctx.gl.clear_stencil(0);
        ctx.gl
            .clear(COLOR_BUFFER_BIT | DEPTH_BUFFER_BIT | STENCIL_BUFFER_BIT);
        ctx.gl.enable(DEPTH_TEST);

        let (projection, view) = camera.matrices(ctx.window_viewport().aspect());
        ctx.set_projection(projection);
        ctx.set_view(view);

        geometry.draw_opaque(ctx, false)?;
        if camera.casts_shadows() {
            geometry.draw_opaque(ctx, true)?;
        }

        let mirrored = reflection_view(&view, &self.config)?;

        // Reflection pass
        ctx.set_view(mirrored);
        self.uniforms.publish_current(ctx)?;
        self.targets.bind_reflection(ctx);
        ctx.gl.clear(COLOR_BUFFER_BIT | DEPTH_BUFFER_BIT);
        self.draw_backdrop(ctx, ClipMode::Reflection);
        self.targets.unbind(ctx);

        // Refraction pass
        ctx.set_view(view);
        self.uniforms.publish_current(ctx)?;
        self.targets.bind_refraction(ctx);
        ctx.gl.clear(COLOR_BUFFER_BIT | DEPTH_BUFFER_BIT);
        self.draw_backdrop(ctx, ClipMode::Refraction);
        self.targets.unbind(ctx);

        // Composite pass
        self.uniforms.publish_current(ctx)?;
        self.draw_backdrop(ctx, ClipMode::None);
        if let Some(mode) = self.water_mode {
            self.draw_water(ctx, mode)?;
        }
        self.draw_monitor(ctx);

        ctx.gl.active_texture(WebGl2RenderingContext::TEXTURE0);
        Ok(())
    }

    fn draw_backdrop(&self, ctx: &RenderContext, clip: ClipMode) {
        self.skybox.draw(ctx, &self.programs.skybox);
        self.tiles
            .draw(ctx, &self.programs.tiles, clip, self.config.water_height);
    }

    fn water_program(&self, mode: WaterMode) -> &ShaderProgram {
        match mode {
            WaterMode::Sine => &self.programs.sine_water,
            WaterMode::HeightMap => &self.programs.height_water,
        }
    }

    fn draw_water(&mut self, ctx: &RenderContext, mode: WaterMode) -> RenderResult<()> {
        let camera_pos = math::camera_position(&ctx.view())?;
        let inverse_projection =
            Mat4::from_cols_array(&math::inverse(&ctx.projection().to_cols_array())?);

        let gl = &ctx.gl;
        let program = self.water_program(mode);
        program.use_program(gl);

        if mode == WaterMode::HeightMap && !self.height_frames.bind(gl, HEIGHT_UNIT) {
            log::debug!("No height map frame loaded yet");
        }
        bind_texture_unit(gl, REFRACTION_UNIT, self.targets.refraction_texture());
        bind_texture_unit(gl, REFLECTION_UNIT, self.targets.reflection_texture());
        if let Some(depth) = self.targets.refraction_depth_texture() {
            bind_texture_unit(gl, DEPTH_UNIT, depth);
        }
        gl.active_texture(WebGl2RenderingContext::TEXTURE0 + SKYBOX_UNIT);
        gl.bind_texture(
            WebGl2RenderingContext::TEXTURE_CUBE_MAP,
            Some(self.skybox.cubemap()),
        );

        program.set_int(gl, "u_height", HEIGHT_UNIT as i32);
        program.set_int(gl, "refractionTexture", REFRACTION_UNIT as i32);
        program.set_int(gl, "reflectionTexture", REFLECTION_UNIT as i32);
        program.set_int(gl, "skybox", SKYBOX_UNIT as i32);
        program.set_int(gl, "refractionDepth", DEPTH_UNIT as i32);
        program.set_mat4(gl, "u_inverse_projection", &inverse_projection);
        program.set_vec3(gl, "cameraPos", camera_pos);
        program.set_mat4(gl, "u_model", &model_matrix(&self.config));
        program.set_vec3(gl, "u_color", WATER_COLOR);
        program.set_float(gl, "amplitude", self.wave.amplitude);
        program.set_float(gl, "wavelength", self.wave.wavelength);
        program.set_float(gl, "time", self.time);

        gl.enable(BLEND);
        gl.blend_func(SRC_ALPHA, ONE_MINUS_SRC_ALPHA);
        self.surfaces.get(mode).draw(ctx);
        gl.disable(BLEND);

        if mode == WaterMode::HeightMap {
            self.height_frames.advance();
        }
        Ok(())
    }

    /// Draw an offscreen target texture to the lower-left quarter of the window
    fn draw_monitor(&self, ctx: &RenderContext) {
        let texture = match self.monitor {
            Some(TargetKind::Reflection) => self.targets.reflection_texture(),
            Some(TargetKind::Refraction) => self.targets.refraction_texture(),
            None => return,
        };
        let gl = &ctx.gl;
        let program = &self.programs.monitor;
        program.use_program(gl);

        gl.disable(DEPTH_TEST);
        bind_texture_unit(gl, 0, texture);
        program.set_int(gl, "u_texture", 0);

        gl.bind_vertex_array(Some(&self.monitor_quad.vao));
        gl.draw_arrays(TRIANGLES, 0, 6);
        gl.bind_vertex_array(None);
        gl.enable(DEPTH_TEST);
    }

    /// Release every GPU resource; the renderer is gone afterwards
    pub fn clean_up(self, ctx: &mut RenderContext) {
        ctx.gl.bind_framebuffer(WebGl2RenderingContext::FRAMEBUFFER, None);
        ctx.apply_window_viewport();

        self.programs.release(&ctx.gl);
        self.targets.clean_up(ctx);
        self.uniforms.release(ctx);
        self.surfaces.release(ctx);
        self.height_frames.release(&ctx.gl);
        self.skybox.release(ctx);
        self.tiles.release(ctx);
        self.monitor_quad.release(ctx);
        log::info!("Water renderer released");
    }
}

fn bind_texture_unit(gl: &WebGl2RenderingContext, unit: u32, texture: &WebGlTexture) {
    gl.active_texture(WebGl2RenderingContext::TEXTURE0 + unit);
    gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, Some(texture));
}

/// Matrices the reflection pass renders with, for a given true view
pub fn reflection_view(view: &Mat4, config: &SceneConfig) -> RenderResult<Mat4> {
    MirroredView::derive(view, config.mirror_plane, config.reflection_scale).map(|m| m.matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_units_are_distinct() {
        let units = [HEIGHT_UNIT, REFRACTION_UNIT, REFLECTION_UNIT, SKYBOX_UNIT, DEPTH_UNIT];
        for (i, a) in units.iter().enumerate() {
            for b in &units[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(units, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_nothing_staged_before_allocation() {
        let staged = Staged::default();
        assert_eq!(staged.missing(), Some("shader programs"));
    }

    #[test]
    fn test_wave_params_validation() {
        let wave = WaveParams::new(0.1, 0.25).unwrap();
        assert_eq!(wave.amplitude, 0.1);
        assert_eq!(wave.wavelength, 0.25);

        assert!(WaveParams::new(0.0, 0.5).is_ok());
        assert!(WaveParams::new(0.1, 0.0).is_err());
        assert!(WaveParams::new(0.1, -1.0).is_err());
        assert!(WaveParams::new(f32::NAN, 1.0).is_err());
    }

    #[test]
    fn test_reflection_view_uses_config_plane() {
        let config = SceneConfig::default();
        let view = Mat4::from_translation(Vec3::new(0.0, -10.0, 0.0));
        let mirrored = reflection_view(&view, &config).unwrap();
        let expected = MirroredView::derive(&view, 0.0, 0.75).unwrap().matrix;
        assert_eq!(mirrored, expected);
    }

    #[test]
    fn test_reflection_view_rejects_singular() {
        let config = SceneConfig::default();
        assert_eq!(
            reflection_view(&Mat4::ZERO, &config),
            Err(RenderError::SingularMatrix)
        );
    }
}
