use js_sys::{Float32Array, Uint32Array};
use web_sys::{
    WebGl2RenderingContext, WebGlBuffer, WebGlFramebuffer, WebGlRenderbuffer, WebGlTexture,
    WebGlVertexArrayObject,
};

use crate::error::{RenderError, RenderResult};
use crate::renderer::context::RenderContext;
use crate::renderer::shader::{ARRAY_BUFFER, ELEMENT_ARRAY_BUFFER, FLOAT, STATIC_DRAW};

/// A GPU object created at most once.
///
/// `get_or_try_init` is the only way in, so a second call never allocates.
pub struct GpuSlot<T> {
    value: Option<T>,
}

impl<T> Default for GpuSlot<T> {
    fn default() -> Self {
        GpuSlot { value: None }
    }
}

impl<T> From<Option<T>> for GpuSlot<T> {
    fn from(value: Option<T>) -> Self {
        GpuSlot { value }
    }
}

impl<T> GpuSlot<T> {
    pub fn get_or_try_init<F>(&mut self, create: F) -> RenderResult<&T>
    where
        F: FnOnce() -> RenderResult<T>,
    {
        if self.value.is_none() {
            self.value = Some(create()?);
        }
        self.value
            .as_ref()
            .ok_or_else(|| RenderError::resource("GPU slot empty after initialization"))
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.value.is_some()
    }

    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }
}

/// Role of an offscreen target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Reflection,
    Refraction,
}

/// Depth storage: the refraction pass is sampled for depth effects, reflection is not
pub enum DepthAttachment {
    Renderbuffer(WebGlRenderbuffer),
    Texture(WebGlTexture),
}

/// Frame buffer object with a color texture and a depth attachment
pub struct OffscreenTarget {
    pub kind: TargetKind,
    pub framebuffer: WebGlFramebuffer,
    pub color: WebGlTexture,
    pub depth: DepthAttachment,
    pub width: u32,
    pub height: u32,
}

impl OffscreenTarget {
    /// Allocate the framebuffer and its attachments.
    ///
    /// An incomplete framebuffer is an environment error and aborts setup.
    pub fn create(
        ctx: &RenderContext,
        kind: TargetKind,
        width: u32,
        height: u32,
    ) -> RenderResult<OffscreenTarget> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidTarget { width, height });
        }
        let gl = &ctx.gl;

        let framebuffer = gl
            .create_framebuffer()
            .ok_or_else(|| RenderError::resource("Failed to create FBO"))?;
        gl.bind_framebuffer(WebGl2RenderingContext::FRAMEBUFFER, Some(&framebuffer));

        let color = Self::create_color_attachment(gl, width, height)?;
        let depth = match kind {
            TargetKind::Reflection => {
                DepthAttachment::Renderbuffer(Self::create_depth_buffer(gl, width, height)?)
            }
            TargetKind::Refraction => {
                DepthAttachment::Texture(Self::create_depth_texture(gl, width, height)?)
            }
        };

        let status = gl.check_framebuffer_status(WebGl2RenderingContext::FRAMEBUFFER);

        gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, None);
        gl.bind_framebuffer(WebGl2RenderingContext::FRAMEBUFFER, None);

        let target = OffscreenTarget {
            kind,
            framebuffer,
            color,
            depth,
            width,
            height,
        };

        if status != WebGl2RenderingContext::FRAMEBUFFER_COMPLETE {
            target.release(ctx);
            return Err(RenderError::IncompleteFramebuffer { kind, status });
        }

        log::info!("Created {:?} target {}x{}", kind, width, height);
        Ok(target)
    }

    fn create_color_attachment(
        gl: &WebGl2RenderingContext,
        width: u32,
        height: u32,
    ) -> RenderResult<WebGlTexture> {
        let texture = gl
            .create_texture()
            .ok_or_else(|| RenderError::resource("Failed to create texture"))?;
        gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, Some(&texture));
        gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
            WebGl2RenderingContext::TEXTURE_2D,
            0,
            WebGl2RenderingContext::RGB as i32,
            width as i32,
            height as i32,
            0,
            WebGl2RenderingContext::RGB,
            WebGl2RenderingContext::UNSIGNED_BYTE,
            None,
        )?;
        set_texture_filter(gl, WebGl2RenderingContext::LINEAR);
        gl.framebuffer_texture_2d(
            WebGl2RenderingContext::FRAMEBUFFER,
            WebGl2RenderingContext::COLOR_ATTACHMENT0,
            WebGl2RenderingContext::TEXTURE_2D,
            Some(&texture),
            0,
        );
        Ok(texture)
    }

    fn create_depth_texture(
        gl: &WebGl2RenderingContext,
        width: u32,
        height: u32,
    ) -> RenderResult<WebGlTexture> {
        let texture = gl
            .create_texture()
            .ok_or_else(|| RenderError::resource("Failed to create depth texture"))?;
        gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, Some(&texture));
        gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
            WebGl2RenderingContext::TEXTURE_2D,
            0,
            WebGl2RenderingContext::DEPTH_COMPONENT32F as i32,
            width as i32,
            height as i32,
            0,
            WebGl2RenderingContext::DEPTH_COMPONENT,
            WebGl2RenderingContext::FLOAT,
            None,
        )?;
        // Float depth is not filterable in WebGL2
        set_texture_filter(gl, WebGl2RenderingContext::NEAREST);
        gl.framebuffer_texture_2d(
            WebGl2RenderingContext::FRAMEBUFFER,
            WebGl2RenderingContext::DEPTH_ATTACHMENT,
            WebGl2RenderingContext::TEXTURE_2D,
            Some(&texture),
            0,
        );
        Ok(texture)
    }

    fn create_depth_buffer(
        gl: &WebGl2RenderingContext,
        width: u32,
        height: u32,
    ) -> RenderResult<WebGlRenderbuffer> {
        let renderbuffer = gl
            .create_renderbuffer()
            .ok_or_else(|| RenderError::resource("Failed to create depth renderbuffer"))?;
        gl.bind_renderbuffer(WebGl2RenderingContext::RENDERBUFFER, Some(&renderbuffer));
        gl.renderbuffer_storage(
            WebGl2RenderingContext::RENDERBUFFER,
            WebGl2RenderingContext::DEPTH_COMPONENT16,
            width as i32,
            height as i32,
        );
        gl.framebuffer_renderbuffer(
            WebGl2RenderingContext::FRAMEBUFFER,
            WebGl2RenderingContext::DEPTH_ATTACHMENT,
            WebGl2RenderingContext::RENDERBUFFER,
            Some(&renderbuffer),
        );
        gl.bind_renderbuffer(WebGl2RenderingContext::RENDERBUFFER, None);
        Ok(renderbuffer)
    }

    /// Redirect drawing into this target
    pub fn bind(&self, ctx: &mut RenderContext) {
        // No texture may stay bound while it could be a render destination
        ctx.gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, None);
        ctx.gl
            .bind_framebuffer(WebGl2RenderingContext::FRAMEBUFFER, Some(&self.framebuffer));
        ctx.enter_target(self.width, self.height);
    }

    /// Restore the default framebuffer and the pre-bind viewport
    pub fn unbind(ctx: &mut RenderContext) {
        ctx.gl.bind_framebuffer(WebGl2RenderingContext::FRAMEBUFFER, None);
        ctx.leave_target();
    }

    /// Delete the framebuffer and both attachments
    pub fn release(self, ctx: &RenderContext) {
        let gl = &ctx.gl;
        gl.delete_framebuffer(Some(&self.framebuffer));
        gl.delete_texture(Some(&self.color));
        match self.depth {
            DepthAttachment::Renderbuffer(rb) => gl.delete_renderbuffer(Some(&rb)),
            DepthAttachment::Texture(tex) => gl.delete_texture(Some(&tex)),
        }
    }
}

fn set_texture_filter(gl: &WebGl2RenderingContext, filter: u32) {
    gl.tex_parameteri(
        WebGl2RenderingContext::TEXTURE_2D,
        WebGl2RenderingContext::TEXTURE_MIN_FILTER,
        filter as i32,
    );
    gl.tex_parameteri(
        WebGl2RenderingContext::TEXTURE_2D,
        WebGl2RenderingContext::TEXTURE_MAG_FILTER,
        filter as i32,
    );
    gl.tex_parameteri(
        WebGl2RenderingContext::TEXTURE_2D,
        WebGl2RenderingContext::TEXTURE_WRAP_S,
        WebGl2RenderingContext::CLAMP_TO_EDGE as i32,
    );
    gl.tex_parameteri(
        WebGl2RenderingContext::TEXTURE_2D,
        WebGl2RenderingContext::TEXTURE_WRAP_T,
        WebGl2RenderingContext::CLAMP_TO_EDGE as i32,
    );
}

/// Reflection and refraction targets, both alive for the whole session
pub struct WaterFrameBuffers {
    reflection: OffscreenTarget,
    refraction: OffscreenTarget,
}

impl WaterFrameBuffers {
    pub fn new(ctx: &RenderContext, width: u32, height: u32) -> RenderResult<WaterFrameBuffers> {
        let reflection = OffscreenTarget::create(ctx, TargetKind::Reflection, width, height)?;
        let refraction = match OffscreenTarget::create(ctx, TargetKind::Refraction, width, height)
        {
            Ok(target) => target,
            Err(err) => {
                reflection.release(ctx);
                return Err(err);
            }
        };
        Ok(WaterFrameBuffers {
            reflection,
            refraction,
        })
    }

    pub fn bind_reflection(&self, ctx: &mut RenderContext) {
        self.reflection.bind(ctx);
    }

    pub fn bind_refraction(&self, ctx: &mut RenderContext) {
        self.refraction.bind(ctx);
    }

    pub fn unbind(&self, ctx: &mut RenderContext) {
        OffscreenTarget::unbind(ctx);
    }

    pub fn reflection_texture(&self) -> &WebGlTexture {
        &self.reflection.color
    }

    pub fn refraction_texture(&self) -> &WebGlTexture {
        &self.refraction.color
    }

    pub fn refraction_depth_texture(&self) -> Option<&WebGlTexture> {
        match &self.refraction.depth {
            DepthAttachment::Texture(tex) => Some(tex),
            DepthAttachment::Renderbuffer(_) => None,
        }
    }

    /// Call once when the scene shuts down
    pub fn clean_up(self, ctx: &RenderContext) {
        self.reflection.release(ctx);
        self.refraction.release(ctx);
    }
}

/// Vertex array with its attribute and index buffers
pub struct MeshBuffers {
    pub vao: WebGlVertexArrayObject,
    pub attribute_buffers: Vec<WebGlBuffer>,
    pub index_buffer: Option<WebGlBuffer>,
    pub element_count: i32,
}

impl MeshBuffers {
    /// Create a VAO and leave it bound for attribute setup
    pub fn begin(ctx: &RenderContext) -> RenderResult<MeshBuffers> {
        let vao = ctx
            .gl
            .create_vertex_array()
            .ok_or_else(|| RenderError::resource("Failed to create VAO"))?;
        ctx.gl.bind_vertex_array(Some(&vao));
        Ok(MeshBuffers {
            vao,
            attribute_buffers: Vec::new(),
            index_buffer: None,
            element_count: 0,
        })
    }

    /// Upload a tightly packed float attribute of `components` per vertex
    pub fn attribute(
        &mut self,
        ctx: &RenderContext,
        location: u32,
        components: i32,
        data: &[f32],
    ) -> RenderResult<()> {
        let gl = &ctx.gl;
        let buffer = gl
            .create_buffer()
            .ok_or_else(|| RenderError::resource("Failed to create vertex buffer"))?;
        gl.bind_buffer(ARRAY_BUFFER, Some(&buffer));
        unsafe {
            let array = Float32Array::view(data);
            gl.buffer_data_with_array_buffer_view(ARRAY_BUFFER, &array, STATIC_DRAW);
        }
        gl.enable_vertex_attrib_array(location);
        gl.vertex_attrib_pointer_with_i32(location, components, FLOAT, false, 0, 0);
        self.attribute_buffers.push(buffer);
        Ok(())
    }

    /// Upload the element buffer; draw calls use `UNSIGNED_INT` indices
    pub fn indices(&mut self, ctx: &RenderContext, data: &[u32]) -> RenderResult<()> {
        let gl = &ctx.gl;
        let buffer = gl
            .create_buffer()
            .ok_or_else(|| RenderError::resource("Failed to create index buffer"))?;
        gl.bind_buffer(ELEMENT_ARRAY_BUFFER, Some(&buffer));
        unsafe {
            let array = Uint32Array::view(data);
            gl.buffer_data_with_array_buffer_view(ELEMENT_ARRAY_BUFFER, &array, STATIC_DRAW);
        }
        self.index_buffer = Some(buffer);
        self.element_count = data.len() as i32;
        Ok(())
    }

    /// Unbind the VAO so later buffer binds do not leak into it
    pub fn finish(self, ctx: &RenderContext) -> MeshBuffers {
        ctx.gl.bind_vertex_array(None);
        self
    }

    pub fn release(self, ctx: &RenderContext) {
        ctx.gl.delete_vertex_array(Some(&self.vao));
        for buffer in &self.attribute_buffers {
            ctx.gl.delete_buffer(Some(buffer));
        }
        if let Some(buffer) = &self.index_buffer {
            ctx.gl.delete_buffer(Some(buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_slot_initializes_once() {
        let mut slot: GpuSlot<u32> = GpuSlot::default();
        let mut created = 0;

        for _ in 0..3 {
            let value = *slot
                .get_or_try_init(|| {
                    created += 1;
                    Ok(7)
                })
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(created, 1);
        assert!(slot.is_allocated());
    }

    #[test]
    fn test_gpu_slot_failure_leaves_slot_empty() {
        let mut slot: GpuSlot<u32> = GpuSlot::default();
        let result = slot.get_or_try_init(|| Err(RenderError::resource("no buffer")));
        assert!(result.is_err());
        assert!(!slot.is_allocated());

        assert_eq!(*slot.get_or_try_init(|| Ok(3)).unwrap(), 3);
        assert_eq!(slot.take(), Some(3));
        assert!(slot.get().is_none());
    }
}
