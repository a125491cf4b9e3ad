use glam::{Mat3, Mat4};
use js_sys::{Float32Array, Function};
use wasm_bindgen::JsValue;
use web_sys::{WebGl2RenderingContext, WebGlTexture};

use crate::config::SceneConfig;
use crate::error::RenderResult;
use crate::renderer::buffer::MeshBuffers;
use crate::renderer::context::RenderContext;
use crate::renderer::shader::{ShaderProgram, LEQUAL, LESS, TRIANGLES, UNSIGNED_INT};
use crate::renderer::texture::{self, Sampling};

/// Texture unit the skybox cubemap lives on for every pass
pub const SKYBOX_UNIT: u32 = 3;
const TILES_UNIT: u32 = 0;

/// Which side of the water plane survives a backdrop draw
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ClipMode {
    None = 0,
    /// Keep geometry above the water
    Reflection = 1,
    /// Keep geometry below the water
    Refraction = 2,
}

/// Opaque world geometry drawn by the host (track, train, terrain)
pub trait SceneGeometry {
    /// Draw with the projection and view currently held by `ctx`.
    /// `shadow_pass` is set for the second, shadow-only invocation.
    fn draw_opaque(&self, ctx: &RenderContext, shadow_pass: bool) -> RenderResult<()>;
}

/// Scene with nothing but the backdrop and the water
pub struct NoGeometry;

impl SceneGeometry for NoGeometry {
    fn draw_opaque(&self, _ctx: &RenderContext, _shadow_pass: bool) -> RenderResult<()> {
        Ok(())
    }
}

/// Host callback invoked as `(shadowPass, projection, view)`
pub struct JsSceneGeometry {
    callback: Function,
}

impl JsSceneGeometry {
    pub fn new(callback: Function) -> JsSceneGeometry {
        JsSceneGeometry { callback }
    }
}

impl SceneGeometry for JsSceneGeometry {
    fn draw_opaque(&self, ctx: &RenderContext, shadow_pass: bool) -> RenderResult<()> {
        let projection = Float32Array::from(&ctx.projection().to_cols_array()[..]);
        let view = Float32Array::from(&ctx.view().to_cols_array()[..]);
        self.callback.call3(
            &JsValue::NULL,
            &JsValue::from_bool(shadow_pass),
            &projection,
            &view,
        )?;
        Ok(())
    }
}

/// Model transform shared by the tiles and the water surface
pub fn model_matrix(config: &SceneConfig) -> Mat4 {
    Mat4::from_translation(config.model_origin) * Mat4::from_scale(glam::Vec3::splat(config.model_scale))
}

/// Rotation part of `view` only, so the sky stays at infinity
pub fn skybox_view(view: &Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(*view))
}

#[rustfmt::skip]
const SKYBOX_VERTICES: [f32; 108] = [
    -1.0,  1.0, -1.0,  -1.0, -1.0, -1.0,   1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,   1.0,  1.0, -1.0,  -1.0,  1.0, -1.0,

    -1.0, -1.0,  1.0,  -1.0, -1.0, -1.0,  -1.0,  1.0, -1.0,
    -1.0,  1.0, -1.0,  -1.0,  1.0,  1.0,  -1.0, -1.0,  1.0,

     1.0, -1.0, -1.0,   1.0, -1.0,  1.0,   1.0,  1.0,  1.0,
     1.0,  1.0,  1.0,   1.0,  1.0, -1.0,   1.0, -1.0, -1.0,

    -1.0, -1.0,  1.0,  -1.0,  1.0,  1.0,   1.0,  1.0,  1.0,
     1.0,  1.0,  1.0,   1.0, -1.0,  1.0,  -1.0, -1.0,  1.0,

    -1.0,  1.0, -1.0,   1.0,  1.0, -1.0,   1.0,  1.0,  1.0,
     1.0,  1.0,  1.0,  -1.0,  1.0,  1.0,  -1.0,  1.0, -1.0,

    -1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,   1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,   1.0, -1.0,  1.0,
];

pub struct Skybox {
    mesh: MeshBuffers,
    cubemap: WebGlTexture,
}

impl Skybox {
    pub fn new(ctx: &RenderContext, config: &SceneConfig) -> RenderResult<Skybox> {
        let mut mesh = MeshBuffers::begin(ctx)?;
        mesh.attribute(ctx, 0, 3, &SKYBOX_VERTICES)?;
        let mesh = mesh.finish(ctx);
        match texture::load_cubemap(&ctx.gl, &config.image_path("skybox")) {
            Ok(cubemap) => Ok(Skybox { mesh, cubemap }),
            Err(err) => {
                mesh.release(ctx);
                Err(err)
            }
        }
    }

    pub fn cubemap(&self) -> &WebGlTexture {
        &self.cubemap
    }

    pub fn draw(&self, ctx: &RenderContext, program: &ShaderProgram) {
        let gl = &ctx.gl;
        gl.depth_func(LEQUAL);
        program.use_program(gl);
        program.set_mat4(gl, "projection", &ctx.projection());
        program.set_mat4(gl, "view", &skybox_view(&ctx.view()));
        program.set_int(gl, "skybox", SKYBOX_UNIT as i32);

        gl.active_texture(WebGl2RenderingContext::TEXTURE0 + SKYBOX_UNIT);
        gl.bind_texture(WebGl2RenderingContext::TEXTURE_CUBE_MAP, Some(&self.cubemap));

        gl.bind_vertex_array(Some(&self.mesh.vao));
        gl.draw_arrays(TRIANGLES, 0, 36);
        gl.bind_vertex_array(None);
        gl.depth_func(LESS);
    }

    pub fn release(self, ctx: &RenderContext) {
        self.mesh.release(ctx);
        ctx.gl.delete_texture(Some(&self.cubemap));
    }
}

// Pool walls and floor: back, left, front, right, down
#[rustfmt::skip]
const TILE_POSITIONS: [f32; 60] = [
     1.0, -1.0, -1.0,  -1.0, -1.0, -1.0,  -1.0,  1.0, -1.0,   1.0,  1.0, -1.0,
     1.0, -1.0,  1.0,   1.0, -1.0, -1.0,   1.0,  1.0, -1.0,   1.0,  1.0,  1.0,
    -1.0, -1.0,  1.0,   1.0, -1.0,  1.0,   1.0,  1.0,  1.0,  -1.0,  1.0,  1.0,
    -1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,  -1.0,  1.0,  1.0,  -1.0,  1.0, -1.0,
    -1.0, -1.0,  1.0,   1.0, -1.0,  1.0,   1.0, -1.0, -1.0,  -1.0, -1.0, -1.0,
];

#[rustfmt::skip]
const TILE_NORMALS: [f32; 60] = [
     0.0,  0.0, -1.0,   0.0,  0.0, -1.0,   0.0,  0.0, -1.0,   0.0,  0.0, -1.0,
     1.0,  0.0,  0.0,   1.0,  0.0,  0.0,   1.0,  0.0,  0.0,   1.0,  0.0,  0.0,
     0.0,  0.0,  1.0,   0.0,  0.0,  1.0,   0.0,  0.0,  1.0,   0.0,  0.0,  1.0,
    -1.0,  0.0,  0.0,  -1.0,  0.0,  0.0,  -1.0,  0.0,  0.0,  -1.0,  0.0,  0.0,
     0.0, -1.0,  0.0,   0.0, -1.0,  0.0,   0.0, -1.0,  0.0,   0.0, -1.0,  0.0,
];

const TILE_FACES: usize = 5;

fn tile_tex_coords() -> Vec<f32> {
    [1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0].repeat(TILE_FACES)
}

fn tile_indices() -> Vec<u32> {
    (0..TILE_FACES as u32)
        .flat_map(|face| {
            let j = face * 4;
            [j + 1, j, j + 3, j + 3, j + 2, j + 1]
        })
        .collect()
}

/// Textured pool around the water, clipped against the water plane per pass
pub struct Tiles {
    mesh: MeshBuffers,
    texture: WebGlTexture,
    model: Mat4,
}

impl Tiles {
    pub fn new(ctx: &RenderContext, config: &SceneConfig) -> RenderResult<Tiles> {
        let mut mesh = MeshBuffers::begin(ctx)?;
        mesh.attribute(ctx, 0, 3, &TILE_POSITIONS)?;
        mesh.attribute(ctx, 1, 3, &TILE_NORMALS)?;
        mesh.attribute(ctx, 2, 2, &tile_tex_coords())?;
        mesh.indices(ctx, &tile_indices())?;
        let mesh = mesh.finish(ctx);

        let texture =
            match texture::load_texture(&ctx.gl, &config.image_path("tiles.jpg"), Sampling::Tiled) {
                Ok(texture) => texture,
                Err(err) => {
                    mesh.release(ctx);
                    return Err(err);
                }
            };

        Ok(Tiles {
            mesh,
            texture,
            model: model_matrix(config),
        })
    }

    /// Draw with the frame uniforms already published
    pub fn draw(&self, ctx: &RenderContext, program: &ShaderProgram, clip: ClipMode, water_height: f32) {
        let gl = &ctx.gl;
        program.use_program(gl);
        program.set_mat4(gl, "u_model", &self.model);
        program.set_int(gl, "clip_mode", clip as i32);
        program.set_float(gl, "water_height", water_height);
        program.set_int(gl, "u_texture", TILES_UNIT as i32);

        gl.active_texture(WebGl2RenderingContext::TEXTURE0 + TILES_UNIT);
        gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, Some(&self.texture));

        gl.bind_vertex_array(Some(&self.mesh.vao));
        gl.draw_elements_with_i32(TRIANGLES, self.mesh.element_count, UNSIGNED_INT, 0);
        gl.bind_vertex_array(None);
    }

    pub fn release(self, ctx: &RenderContext) {
        self.mesh.release(ctx);
        ctx.gl.delete_texture(Some(&self.texture));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    #[test]
    fn test_clip_mode_discriminants() {
        assert_eq!(ClipMode::None as i32, 0);
        assert_eq!(ClipMode::Reflection as i32, 1);
        assert_eq!(ClipMode::Refraction as i32, 2);
    }

    #[test]
    fn test_skybox_view_drops_translation() {
        let view = Mat4::from_rotation_y(0.7) * Mat4::from_translation(Vec3::new(5.0, -2.0, 9.0));
        let stripped = skybox_view(&view);
        assert_eq!(stripped.w_axis, Vec4::W);
        assert_eq!(stripped.x_axis.truncate(), view.x_axis.truncate());
        assert_eq!(stripped.z_axis.truncate(), view.z_axis.truncate());
    }

    #[test]
    fn test_model_matrix_scales_then_translates() {
        let mut config = SceneConfig::default();
        config.model_origin = Vec3::new(10.0, 0.0, -5.0);
        let corner = model_matrix(&config) * Vec4::new(1.0, 0.3, -1.0, 1.0);
        assert!((corner - Vec4::new(110.0, 30.0, -105.0, 1.0)).abs().max_element() < 1e-4);
    }

    #[test]
    fn test_tile_mesh_layout() {
        let indices = tile_indices();
        assert_eq!(indices.len(), TILE_FACES * 6);
        assert_eq!(&indices[..6], &[1, 0, 3, 3, 2, 1]);
        assert_eq!(&indices[24..], &[17, 16, 19, 19, 18, 17]);
        assert_eq!(tile_tex_coords().len(), TILE_FACES * 4 * 2);
        assert_eq!(TILE_POSITIONS.len(), TILE_NORMALS.len());
    }

    #[test]
    fn test_floor_sits_at_the_bottom() {
        let floor = &TILE_POSITIONS[48..];
        assert!(floor.chunks(3).all(|p| p[1] == -1.0));
        assert!(TILE_NORMALS[48..].chunks(3).all(|n| n == [0.0, -1.0, 0.0]));
    }
}
