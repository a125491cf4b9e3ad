use glam::Mat4;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, WebGl2RenderingContext};

use crate::error::{RenderError, RenderResult};

/// Viewport rectangle in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn sized(width: u32, height: u32) -> Viewport {
        Viewport {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Tracks the window viewport and the one active while an offscreen target is bound
#[derive(Clone, Copy, Debug)]
pub struct ViewportState {
    window: Viewport,
    current: Viewport,
    saved: Option<Viewport>,
}

impl ViewportState {
    pub fn new(width: u32, height: u32) -> ViewportState {
        let window = Viewport::sized(width, height);
        ViewportState {
            window,
            current: window,
            saved: None,
        }
    }

    pub fn window(&self) -> Viewport {
        self.window
    }

    pub fn current(&self) -> Viewport {
        self.current
    }

    pub fn is_offscreen(&self) -> bool {
        self.saved.is_some()
    }

    /// Window resized by the host; takes effect on the default framebuffer only
    pub fn set_window(&mut self, width: u32, height: u32) {
        self.window = Viewport::sized(width, height);
        if self.saved.is_none() {
            self.current = self.window;
        }
    }

    /// Switch to a target of the given size, returning the viewport to apply
    pub fn enter_target(&mut self, width: u32, height: u32) -> Viewport {
        if self.saved.is_none() {
            self.saved = Some(self.current);
        }
        self.current = Viewport::sized(width, height);
        self.current
    }

    /// Return to the default framebuffer, returning the viewport to apply
    pub fn leave_target(&mut self) -> Viewport {
        self.current = self.saved.take().unwrap_or(self.window);
        self.current
    }
}

/// Explicit render state threaded through every component call
pub struct RenderContext {
    pub gl: WebGl2RenderingContext,
    viewport: ViewportState,
    projection: Mat4,
    view: Mat4,
}

impl RenderContext {
    /// Wrap a WebGL 2.0 context, sized from its canvas
    pub fn new(gl: WebGl2RenderingContext) -> RenderResult<RenderContext> {
        if gl.is_context_lost() {
            return Err(RenderError::environment("WebGL context is lost"));
        }
        let (width, height) = Self::canvas_size(&gl)?;
        Ok(RenderContext {
            gl,
            viewport: ViewportState::new(width, height),
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        })
    }

    fn canvas_size(gl: &WebGl2RenderingContext) -> RenderResult<(u32, u32)> {
        let canvas = gl
            .canvas()
            .ok_or_else(|| RenderError::environment("No canvas"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| RenderError::environment("Context canvas is not an HtmlCanvasElement"))?;
        Ok((canvas.width(), canvas.height()))
    }

    /// Re-read the canvas size after the host resized it
    pub fn refresh_window_size(&mut self) -> RenderResult<(u32, u32)> {
        let (width, height) = Self::canvas_size(&self.gl)?;
        self.viewport.set_window(width, height);
        Ok((width, height))
    }

    pub fn window_viewport(&self) -> Viewport {
        self.viewport.window()
    }

    /// Apply the window viewport to the default framebuffer
    pub fn apply_window_viewport(&mut self) {
        let vp = self.viewport.leave_target();
        self.set_gl_viewport(vp);
    }

    pub(crate) fn enter_target(&mut self, width: u32, height: u32) {
        let vp = self.viewport.enter_target(width, height);
        self.set_gl_viewport(vp);
    }

    pub(crate) fn leave_target(&mut self) {
        let vp = self.viewport.leave_target();
        self.set_gl_viewport(vp);
    }

    fn set_gl_viewport(&self, vp: Viewport) {
        self.gl
            .viewport(vp.x, vp.y, vp.width as i32, vp.height as i32);
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_round_trip_restores_viewport() {
        let mut state = ViewportState::new(640, 480);
        let before = state.current();

        let inside = state.enter_target(100, 100);
        assert_eq!(inside, Viewport::sized(100, 100));
        assert!(state.is_offscreen());

        let after = state.leave_target();
        assert_eq!(after, before);
        assert_eq!(state.current(), Viewport::sized(640, 480));
        assert!(!state.is_offscreen());
    }

    #[test]
    fn test_switching_targets_keeps_first_saved_viewport() {
        let mut state = ViewportState::new(800, 600);
        state.enter_target(100, 100);
        state.enter_target(256, 128);
        assert_eq!(state.leave_target(), Viewport::sized(800, 600));
    }

    #[test]
    fn test_resize_while_offscreen() {
        let mut state = ViewportState::new(800, 600);
        state.enter_target(100, 100);
        state.set_window(1024, 768);
        assert_eq!(state.current(), Viewport::sized(100, 100));
        // The pre-bind viewport is restored; the new window size applies on the next frame
        assert_eq!(state.leave_target(), Viewport::sized(800, 600));
        assert_eq!(state.window(), Viewport::sized(1024, 768));
    }

    #[test]
    fn test_leave_without_enter_uses_window() {
        let mut state = ViewportState::new(320, 200);
        assert_eq!(state.leave_target(), Viewport::sized(320, 200));
    }

    #[test]
    fn test_aspect() {
        assert_eq!(Viewport::sized(200, 100).aspect(), 2.0);
        assert_eq!(Viewport::sized(200, 0).aspect(), 1.0);
    }
}
