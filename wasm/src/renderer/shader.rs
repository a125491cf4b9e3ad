use std::collections::HashMap;

use glam::{Mat4, Vec3};
use web_sys::{WebGl2RenderingContext, WebGlProgram, WebGlShader, WebGlUniformLocation};

use crate::error::{RenderError, RenderResult};
use crate::renderer::uniforms::{FRAME_UNIFORM_BINDING, FRAME_UNIFORM_BLOCK};

// WebGL constants
pub const COLOR_BUFFER_BIT: u32 = WebGl2RenderingContext::COLOR_BUFFER_BIT;
pub const DEPTH_BUFFER_BIT: u32 = WebGl2RenderingContext::DEPTH_BUFFER_BIT;
pub const STENCIL_BUFFER_BIT: u32 = WebGl2RenderingContext::STENCIL_BUFFER_BIT;
pub const TRIANGLES: u32 = WebGl2RenderingContext::TRIANGLES;
pub const FLOAT: u32 = WebGl2RenderingContext::FLOAT;
pub const UNSIGNED_INT: u32 = WebGl2RenderingContext::UNSIGNED_INT;
pub const ARRAY_BUFFER: u32 = WebGl2RenderingContext::ARRAY_BUFFER;
pub const ELEMENT_ARRAY_BUFFER: u32 = WebGl2RenderingContext::ELEMENT_ARRAY_BUFFER;
pub const STATIC_DRAW: u32 = WebGl2RenderingContext::STATIC_DRAW;
pub const VERTEX_SHADER: u32 = WebGl2RenderingContext::VERTEX_SHADER;
pub const FRAGMENT_SHADER: u32 = WebGl2RenderingContext::FRAGMENT_SHADER;
pub const BLEND: u32 = WebGl2RenderingContext::BLEND;
pub const DEPTH_TEST: u32 = WebGl2RenderingContext::DEPTH_TEST;
pub const SRC_ALPHA: u32 = WebGl2RenderingContext::SRC_ALPHA;
pub const ONE_MINUS_SRC_ALPHA: u32 = WebGl2RenderingContext::ONE_MINUS_SRC_ALPHA;
pub const LEQUAL: u32 = WebGl2RenderingContext::LEQUAL;
pub const LESS: u32 = WebGl2RenderingContext::LESS;

// Shader sources
pub const SKYBOX_VERTEX_SHADER: &str = r#"#version 300 es
in vec3 position;
uniform mat4 projection;
uniform mat4 view;
out vec3 vDirection;
void main() {
    vDirection = position;
    vec4 pos = projection * view * vec4(position, 1.0);
    gl_Position = pos.xyww;
}
"#;

pub const SKYBOX_FRAGMENT_SHADER: &str = r#"#version 300 es
precision mediump float;
in vec3 vDirection;
uniform samplerCube skybox;
out vec4 fragColor;
void main() {
    fragColor = texture(skybox, vDirection);
}
"#;

pub const TILES_VERTEX_SHADER: &str = r#"#version 300 es
layout(std140) uniform Matrices {
    mat4 u_projection;
    mat4 u_view;
};
in vec3 position;
in vec3 normal;
in vec2 texcoord;
uniform mat4 u_model;
out vec2 vUv;
out vec3 vNormal;
out float vHeight;
void main() {
    vUv = texcoord;
    vNormal = mat3(u_model) * normal;
    vHeight = position.y;
    gl_Position = u_projection * u_view * u_model * vec4(position, 1.0);
}
"#;

pub const TILES_FRAGMENT_SHADER: &str = r#"#version 300 es
precision mediump float;
in vec2 vUv;
in vec3 vNormal;
in float vHeight;
uniform sampler2D u_texture;
uniform int clip_mode;
uniform float water_height;
out vec4 fragColor;
void main() {
    // 1: keep above the water (reflection), 2: keep below (refraction)
    if (clip_mode == 1 && vHeight < water_height) discard;
    if (clip_mode == 2 && vHeight > water_height) discard;
    vec3 light = normalize(vec3(0.0, 1.0, 1.0));
    float diffuse = abs(dot(normalize(vNormal), light)) * 0.6 + 0.4;
    fragColor = vec4(texture(u_texture, vUv).rgb * diffuse, 1.0);
}
"#;

pub const SINE_WATER_VERTEX_SHADER: &str = r#"#version 300 es
layout(std140) uniform Matrices {
    mat4 u_projection;
    mat4 u_view;
};
in vec3 position;
in vec2 texcoord;
uniform mat4 u_model;
uniform float amplitude;
uniform float wavelength;
uniform float time;
out vec3 vWorld;
out vec3 vNormal;
out vec4 vClip;
out vec2 vUv;
const float TWO_PI = 6.28318530718;
void main() {
    float k = TWO_PI / wavelength;
    float phase = k * (position.x + position.z) + time * TWO_PI;
    vec3 displaced = position;
    displaced.y += amplitude * sin(phase);
    float slope = amplitude * k * cos(phase);
    vec3 n = normalize(vec3(-slope, 1.0, -slope));

    vec4 world = u_model * vec4(displaced, 1.0);
    vWorld = world.xyz;
    vNormal = normalize(mat3(u_model) * n);
    vUv = texcoord;
    vClip = u_projection * u_view * world;
    gl_Position = vClip;
}
"#;

pub const HEIGHT_WATER_VERTEX_SHADER: &str = r#"#version 300 es
layout(std140) uniform Matrices {
    mat4 u_projection;
    mat4 u_view;
};
in vec3 position;
in vec2 texcoord;
uniform mat4 u_model;
uniform sampler2D u_height;
uniform float amplitude;
out vec3 vWorld;
out vec3 vNormal;
out vec4 vClip;
out vec2 vUv;
void main() {
    vec2 texel = 1.0 / vec2(textureSize(u_height, 0));
    float h = textureLod(u_height, texcoord, 0.0).r;
    float hx = textureLod(u_height, texcoord + vec2(texel.x, 0.0), 0.0).r;
    float hz = textureLod(u_height, texcoord + vec2(0.0, texel.y), 0.0).r;

    vec3 displaced = position;
    displaced.y += (h - 0.5) * amplitude;
    vec3 n = normalize(vec3((h - hx) * amplitude / texel.x, 1.0, (h - hz) * amplitude / texel.y));

    vec4 world = u_model * vec4(displaced, 1.0);
    vWorld = world.xyz;
    vNormal = normalize(mat3(u_model) * n);
    vUv = texcoord;
    vClip = u_projection * u_view * world;
    gl_Position = vClip;
}
"#;

pub const WATER_FRAGMENT_SHADER: &str = r#"#version 300 es
precision highp float;
in vec3 vWorld;
in vec3 vNormal;
in vec4 vClip;
in vec2 vUv;
uniform samplerCube skybox;
uniform sampler2D reflectionTexture;
uniform sampler2D refractionTexture;
uniform sampler2D refractionDepth;
uniform mat4 u_inverse_projection;
uniform vec3 cameraPos;
uniform vec3 u_color;
out vec4 fragColor;
// World units over which the surface fades in where it meets the pool
const float EDGE_FADE = 4.0;
float viewDistance(float depth) {
    vec4 p = u_inverse_projection * vec4(0.0, 0.0, depth * 2.0 - 1.0, 1.0);
    return -p.z / p.w;
}
void main() {
    vec3 n = normalize(vNormal);
    vec2 screen = vClip.xy / vClip.w * 0.5 + 0.5;
    vec2 uv = clamp(screen + n.xz * 0.02, 0.001, 0.999);

    float floorDistance = viewDistance(texture(refractionDepth, clamp(screen, 0.0, 1.0)).r);
    float waterDepth = floorDistance - viewDistance(gl_FragCoord.z);
    float edge = clamp(waterDepth / EDGE_FADE, 0.0, 1.0);

    vec3 reflection = texture(reflectionTexture, uv).rgb;
    vec3 refraction = texture(refractionTexture, uv).rgb;
    vec3 viewDir = normalize(cameraPos - vWorld);
    vec3 sky = texture(skybox, reflect(-viewDir, n)).rgb;

    float fresnel = clamp(pow(1.0 - max(dot(viewDir, n), 0.0), 3.0), 0.0, 1.0);
    vec3 color = mix(refraction, mix(reflection, sky, 0.3), fresnel);
    fragColor = vec4(mix(color, u_color, 0.1), 0.9 * edge);
}
"#;

pub const MONITOR_VERTEX_SHADER: &str = r#"#version 300 es
in vec2 position;
out vec2 v_uv;
void main() {
    v_uv = position * 0.5 + 0.5;
    gl_Position = vec4(position * 0.5 - 0.5, 0.0, 1.0);
}
"#;

pub const MONITOR_FRAGMENT_SHADER: &str = r#"#version 300 es
precision mediump float;
in vec2 v_uv;
uniform sampler2D u_texture;
out vec4 fragColor;
void main() {
    fragColor = vec4(texture(u_texture, v_uv).rgb, 1.0);
}
"#;

/// Shader program with uniform locations
pub struct ShaderProgram {
    pub program: WebGlProgram,
    pub uniforms: HashMap<String, WebGlUniformLocation>,
}

impl ShaderProgram {
    pub fn use_program(&self, gl: &WebGl2RenderingContext) {
        gl.use_program(Some(&self.program));
    }

    // Uniforms optimized out by the driver have no location and are skipped
    pub fn set_mat4(&self, gl: &WebGl2RenderingContext, name: &str, value: &Mat4) {
        if let Some(loc) = self.uniforms.get(name) {
            gl.uniform_matrix4fv_with_f32_array(Some(loc), false, &value.to_cols_array());
        }
    }

    pub fn set_vec3(&self, gl: &WebGl2RenderingContext, name: &str, value: Vec3) {
        if let Some(loc) = self.uniforms.get(name) {
            gl.uniform3fv_with_f32_array(Some(loc), &value.to_array());
        }
    }

    pub fn set_int(&self, gl: &WebGl2RenderingContext, name: &str, value: i32) {
        if let Some(loc) = self.uniforms.get(name) {
            gl.uniform1i(Some(loc), value);
        }
    }

    pub fn set_float(&self, gl: &WebGl2RenderingContext, name: &str, value: f32) {
        if let Some(loc) = self.uniforms.get(name) {
            gl.uniform1f(Some(loc), value);
        }
    }

    /// Attach the named uniform block to a buffer binding slot
    pub fn bind_uniform_block(
        &self,
        gl: &WebGl2RenderingContext,
        block: &str,
        binding: u32,
    ) -> RenderResult<()> {
        let index = gl.get_uniform_block_index(&self.program, block);
        if index == WebGl2RenderingContext::INVALID_INDEX {
            return Err(RenderError::shader(format!(
                "Program does not declare the {} block",
                block
            )));
        }
        gl.uniform_block_binding(&self.program, index, binding);
        Ok(())
    }

    pub fn release(&self, gl: &WebGl2RenderingContext) {
        gl.delete_program(Some(&self.program));
    }
}

/// All shader programs
pub struct ShaderPrograms {
    pub skybox: ShaderProgram,
    pub tiles: ShaderProgram,
    pub sine_water: ShaderProgram,
    pub height_water: ShaderProgram,
    pub monitor: ShaderProgram,
}

const WATER_UNIFORMS: [&str; 12] = [
    "u_model",
    "u_color",
    "amplitude",
    "wavelength",
    "time",
    "u_height",
    "skybox",
    "reflectionTexture",
    "refractionTexture",
    "refractionDepth",
    "u_inverse_projection",
    "cameraPos",
];

/// Vertex source, fragment source, attributes, uniforms, frame block
type ProgramSource = (
    &'static str,
    &'static str,
    &'static [&'static str],
    &'static [&'static str],
    bool,
);

// Same order as the `ShaderPrograms` fields
const PROGRAM_SOURCES: [ProgramSource; 5] = [
    (
        SKYBOX_VERTEX_SHADER,
        SKYBOX_FRAGMENT_SHADER,
        &["position"],
        &["projection", "view", "skybox"],
        false,
    ),
    (
        TILES_VERTEX_SHADER,
        TILES_FRAGMENT_SHADER,
        &["position", "normal", "texcoord"],
        &["u_model", "u_texture", "clip_mode", "water_height"],
        true,
    ),
    (
        SINE_WATER_VERTEX_SHADER,
        WATER_FRAGMENT_SHADER,
        &["position", "texcoord"],
        &WATER_UNIFORMS,
        true,
    ),
    (
        HEIGHT_WATER_VERTEX_SHADER,
        WATER_FRAGMENT_SHADER,
        &["position", "texcoord"],
        &WATER_UNIFORMS,
        true,
    ),
    (
        MONITOR_VERTEX_SHADER,
        MONITOR_FRAGMENT_SHADER,
        &["position"],
        &["u_texture"],
        false,
    ),
];

impl ShaderPrograms {
    /// Compile all shader programs; a failure deletes the ones already linked
    pub fn new(gl: &WebGl2RenderingContext) -> RenderResult<ShaderPrograms> {
        let mut compiled = Vec::with_capacity(PROGRAM_SOURCES.len());
        for (vertex, fragment, attributes, uniforms, frame_block) in PROGRAM_SOURCES {
            match compile_program(gl, vertex, fragment, attributes, uniforms, frame_block) {
                Ok(program) => compiled.push(program),
                Err(err) => {
                    compiled.iter().for_each(|program| program.release(gl));
                    return Err(err);
                }
            }
        }

        let [skybox, tiles, sine_water, height_water, monitor] =
            <[ShaderProgram; 5]>::try_from(compiled).map_err(|compiled| {
                compiled.iter().for_each(|program| program.release(gl));
                RenderError::shader("Shader program count mismatch")
            })?;

        log::info!("Compiled shader programs");

        Ok(ShaderPrograms {
            skybox,
            tiles,
            sine_water,
            height_water,
            monitor,
        })
    }

    pub fn release(&self, gl: &WebGl2RenderingContext) {
        for program in [
            &self.skybox,
            &self.tiles,
            &self.sine_water,
            &self.height_water,
            &self.monitor,
        ] {
            program.release(gl);
        }
    }
}

/// Compile a shader program.
///
/// Attribute locations follow the order of `attributes`. Programs declaring
/// the shared matrices block get it bound to the frame uniform slot.
fn compile_program(
    gl: &WebGl2RenderingContext,
    vertex_src: &str,
    fragment_src: &str,
    attributes: &[&str],
    uniforms: &[&str],
    frame_block: bool,
) -> RenderResult<ShaderProgram> {
    let vert_shader = compile_shader(gl, VERTEX_SHADER, vertex_src)?;
    let frag_shader = match compile_shader(gl, FRAGMENT_SHADER, fragment_src) {
        Ok(shader) => shader,
        Err(err) => {
            gl.delete_shader(Some(&vert_shader));
            return Err(err);
        }
    };

    let Some(program) = gl.create_program() else {
        gl.delete_shader(Some(&vert_shader));
        gl.delete_shader(Some(&frag_shader));
        return Err(RenderError::shader("Unable to create shader program"));
    };

    gl.attach_shader(&program, &vert_shader);
    gl.attach_shader(&program, &frag_shader);

    for (i, attr_name) in attributes.iter().enumerate() {
        gl.bind_attrib_location(&program, i as u32, attr_name);
    }

    gl.link_program(&program);

    gl.delete_shader(Some(&vert_shader));
    gl.delete_shader(Some(&frag_shader));

    if !gl
        .get_program_parameter(&program, WebGl2RenderingContext::LINK_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        let error = gl
            .get_program_info_log(&program)
            .unwrap_or_else(|| "Unknown error".to_string());
        gl.delete_program(Some(&program));
        return Err(RenderError::shader(format!("Shader link error: {}", error)));
    }

    let mut uniform_map = HashMap::new();
    for uniform_name in uniforms.iter() {
        if let Some(loc) = gl.get_uniform_location(&program, uniform_name) {
            uniform_map.insert(uniform_name.to_string(), loc);
        }
    }

    let program = ShaderProgram {
        program,
        uniforms: uniform_map,
    };

    if frame_block {
        if let Err(err) = program.bind_uniform_block(gl, FRAME_UNIFORM_BLOCK, FRAME_UNIFORM_BINDING) {
            program.release(gl);
            return Err(err);
        }
    }

    Ok(program)
}

/// Compile a single shader
fn compile_shader(
    gl: &WebGl2RenderingContext,
    shader_type: u32,
    source: &str,
) -> RenderResult<WebGlShader> {
    let shader = gl
        .create_shader(shader_type)
        .ok_or_else(|| RenderError::shader("Unable to create shader object"))?;

    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);

    if !gl
        .get_shader_parameter(&shader, WebGl2RenderingContext::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        let error = gl
            .get_shader_info_log(&shader)
            .unwrap_or_else(|| "Unknown error".to_string());
        gl.delete_shader(Some(&shader));
        return Err(RenderError::shader(format!("Shader compile error: {}", error)));
    }

    Ok(shader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_programs_declare_matrices() {
        for src in [
            TILES_VERTEX_SHADER,
            SINE_WATER_VERTEX_SHADER,
            HEIGHT_WATER_VERTEX_SHADER,
        ] {
            assert!(src.contains("uniform Matrices"));
            assert!(src.contains("mat4 u_projection;\n    mat4 u_view;"));
        }
    }

    #[test]
    fn test_water_samples_refraction_depth() {
        assert!(WATER_FRAGMENT_SHADER.contains("uniform sampler2D refractionDepth;"));
        assert!(WATER_FRAGMENT_SHADER.contains("0.9 * edge"));
        for name in ["refractionDepth", "u_inverse_projection"] {
            assert!(WATER_UNIFORMS.contains(&name));
        }
    }

    #[test]
    fn test_program_sources_bind_attributes_in_order() {
        for (vertex, _, attributes, _, frame_block) in PROGRAM_SOURCES {
            for name in attributes {
                assert!(vertex.contains(name), "{} not declared", name);
            }
            assert_eq!(frame_block, vertex.contains("uniform Matrices"));
        }
    }

    #[test]
    fn test_sources_target_glsl_es_300() {
        for src in [
            SKYBOX_VERTEX_SHADER,
            SKYBOX_FRAGMENT_SHADER,
            TILES_VERTEX_SHADER,
            TILES_FRAGMENT_SHADER,
            SINE_WATER_VERTEX_SHADER,
            HEIGHT_WATER_VERTEX_SHADER,
            WATER_FRAGMENT_SHADER,
            MONITOR_VERTEX_SHADER,
            MONITOR_FRAGMENT_SHADER,
        ] {
            assert!(src.starts_with("#version 300 es\n"));
        }
    }
}
