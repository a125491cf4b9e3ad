use glam::Mat4;
use js_sys::Float32Array;
use web_sys::{WebGl2RenderingContext, WebGlBuffer};

use crate::error::{RenderError, RenderResult};
use crate::renderer::buffer::GpuSlot;
use crate::renderer::context::RenderContext;

/// Name of the std140 block shared by the scene programs
pub const FRAME_UNIFORM_BLOCK: &str = "Matrices";
pub const FRAME_UNIFORM_BINDING: u32 = 0;

const MAT4_BYTES: i32 = 16 * 4;
pub const PROJECTION_OFFSET: i32 = 0;
pub const VIEW_OFFSET: i32 = MAT4_BYTES;
pub const FRAME_UNIFORM_SIZE: i32 = 2 * MAT4_BYTES;

/// Projection and view matrices broadcast to every program through one buffer
#[derive(Default)]
pub struct FrameUniforms {
    buffer: GpuSlot<WebGlBuffer>,
}

impl FrameUniforms {
    pub fn new() -> FrameUniforms {
        FrameUniforms::default()
    }

    /// Create the buffer on first call; later calls are no-ops
    pub fn ensure_allocated(&mut self, ctx: &RenderContext) -> RenderResult<()> {
        let gl = &ctx.gl;
        self.buffer.get_or_try_init(|| {
            let buffer = gl
                .create_buffer()
                .ok_or_else(|| RenderError::resource("Failed to create uniform buffer"))?;
            gl.bind_buffer(WebGl2RenderingContext::UNIFORM_BUFFER, Some(&buffer));
            gl.buffer_data_with_i32(
                WebGl2RenderingContext::UNIFORM_BUFFER,
                FRAME_UNIFORM_SIZE,
                WebGl2RenderingContext::DYNAMIC_DRAW,
            );
            gl.bind_buffer(WebGl2RenderingContext::UNIFORM_BUFFER, None);
            log::debug!("Allocated frame uniform buffer ({} bytes)", FRAME_UNIFORM_SIZE);
            Ok(buffer)
        })?;
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.buffer.is_allocated()
    }

    /// Upload both matrices and bind the buffer to the shared slot.
    ///
    /// Must run after the matrices are final for the pass and before any draw
    /// that reads the `Matrices` block.
    pub fn publish(&self, ctx: &RenderContext, projection: &Mat4, view: &Mat4) -> RenderResult<()> {
        let buffer = self
            .buffer
            .get()
            .ok_or_else(|| RenderError::resource("Frame uniforms published before allocation"))?;
        let gl = &ctx.gl;

        let projection = projection.to_cols_array();
        let view = view.to_cols_array();

        gl.bind_buffer(WebGl2RenderingContext::UNIFORM_BUFFER, Some(buffer));
        unsafe {
            let array = Float32Array::view(&projection);
            gl.buffer_sub_data_with_i32_and_array_buffer_view(
                WebGl2RenderingContext::UNIFORM_BUFFER,
                PROJECTION_OFFSET,
                &array,
            );
            let array = Float32Array::view(&view);
            gl.buffer_sub_data_with_i32_and_array_buffer_view(
                WebGl2RenderingContext::UNIFORM_BUFFER,
                VIEW_OFFSET,
                &array,
            );
        }
        gl.bind_buffer(WebGl2RenderingContext::UNIFORM_BUFFER, None);
        gl.bind_buffer_base(
            WebGl2RenderingContext::UNIFORM_BUFFER,
            FRAME_UNIFORM_BINDING,
            Some(buffer),
        );
        Ok(())
    }

    /// Publish whatever matrices the context currently holds
    pub fn publish_current(&self, ctx: &RenderContext) -> RenderResult<()> {
        self.publish(ctx, &ctx.projection(), &ctx.view())
    }

    pub fn release(mut self, ctx: &RenderContext) {
        if let Some(buffer) = self.buffer.take() {
            ctx.gl.delete_buffer(Some(&buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std140_layout() {
        assert_eq!(PROJECTION_OFFSET, 0);
        assert_eq!(VIEW_OFFSET, 64);
        assert_eq!(FRAME_UNIFORM_SIZE, 128);
    }

    #[test]
    fn test_starts_unallocated() {
        let uniforms = FrameUniforms::new();
        assert!(!uniforms.is_allocated());
    }
}
