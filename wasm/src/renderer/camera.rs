use glam::Mat4;

use crate::error::{RenderError, RenderResult};

/// Half-extent of the top-down view along the window's longer side
pub const TOP_VIEW_EXTENT: f32 = 110.0;
const TOP_VIEW_NEAR: f32 = 200.0;
const TOP_VIEW_FAR: f32 = -200.0;

/// Which camera drives the frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraMode {
    /// Orbiting world camera, matrices from the host
    World,
    /// Orthographic view straight down, computed here
    Top,
    /// Train-mounted camera, matrices from the host
    FirstPerson,
}

impl CameraMode {
    pub fn from_code(code: u32) -> RenderResult<CameraMode> {
        match code {
            0 => Ok(CameraMode::World),
            1 => Ok(CameraMode::Top),
            2 => Ok(CameraMode::FirstPerson),
            other => Err(RenderError::InvalidConfig(format!(
                "Unknown camera mode: {}",
                other
            ))),
        }
    }
}

/// Camera state for the next frame
pub struct Camera {
    pub mode: CameraMode,
    view: Mat4,
    projection: Mat4,
}

impl Camera {
    pub fn new() -> Camera {
        Camera {
            mode: CameraMode::World,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }

    /// Store host-computed matrices; ignored while in top-down mode
    pub fn set_host_matrices(&mut self, view: Mat4, projection: Mat4) {
        self.view = view;
        self.projection = projection;
    }

    /// The top-down view has no shadow pass
    pub fn casts_shadows(&self) -> bool {
        self.mode != CameraMode::Top
    }

    /// Projection and view for a window of the given aspect ratio
    pub fn matrices(&self, aspect: f32) -> (Mat4, Mat4) {
        match self.mode {
            CameraMode::Top => (top_projection(aspect), top_view()),
            CameraMode::World | CameraMode::FirstPerson => (self.projection, self.view),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

/// Orthographic box; the longer window side spans `2 * TOP_VIEW_EXTENT`
pub fn top_projection(aspect: f32) -> Mat4 {
    let (half_w, half_h) = if aspect >= 1.0 {
        (TOP_VIEW_EXTENT, TOP_VIEW_EXTENT / aspect)
    } else {
        (TOP_VIEW_EXTENT * aspect, TOP_VIEW_EXTENT)
    };
    Mat4::orthographic_rh_gl(-half_w, half_w, -half_h, half_h, TOP_VIEW_NEAR, TOP_VIEW_FAR)
}

/// Look straight down the Y axis
pub fn top_view() -> Mat4 {
    Mat4::from_rotation_x(-90f32.to_radians())
}

/// Column-major matrix from a host array
pub fn matrix_from_slice(values: &[f32]) -> RenderResult<Mat4> {
    if values.len() != 16 {
        return Err(RenderError::InvalidConfig(format!(
            "Expected 16 matrix elements, got {}",
            values.len()
        )));
    }
    Ok(Mat4::from_cols_slice(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn approx(a: Vec4, b: Vec4) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn test_host_matrices_pass_through() {
        let mut camera = Camera::new();
        let view = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let projection = Mat4::perspective_rh_gl(1.0, 1.5, 0.1, 100.0);
        camera.set_host_matrices(view, projection);

        assert_eq!(camera.matrices(1.5), (projection, view));
        camera.mode = CameraMode::FirstPerson;
        assert_eq!(camera.matrices(0.5), (projection, view));
        assert!(camera.casts_shadows());
    }

    #[test]
    fn test_top_mode_ignores_host_matrices() {
        let mut camera = Camera::new();
        camera.set_host_matrices(Mat4::from_scale(glam::Vec3::splat(3.0)), Mat4::ZERO);
        camera.mode = CameraMode::Top;

        let (projection, view) = camera.matrices(2.0);
        assert_eq!(projection, top_projection(2.0));
        assert_eq!(view, top_view());
        assert!(!camera.casts_shadows());
    }

    #[test]
    fn test_top_projection_extent() {
        // Wide window: horizontal extent fixed, vertical shrunk by the aspect
        let wide = top_projection(2.0);
        assert!(approx(wide * Vec4::new(110.0, 55.0, 0.0, 1.0), Vec4::new(1.0, 1.0, 0.0, 1.0)));

        // Tall window: vertical extent fixed
        let tall = top_projection(0.5);
        assert!(approx(tall * Vec4::new(55.0, 110.0, 0.0, 1.0), Vec4::new(1.0, 1.0, 0.0, 1.0)));
    }

    #[test]
    fn test_top_view_looks_down() {
        // A point above the origin ends up in front of the camera
        let eye = top_view() * Vec4::new(0.0, 10.0, 0.0, 1.0);
        assert!(approx(eye, Vec4::new(0.0, 0.0, -10.0, 1.0)));
    }

    #[test]
    fn test_matrix_from_slice() {
        let values: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let m = matrix_from_slice(&values).unwrap();
        assert_eq!(m.to_cols_array().to_vec(), values);
        assert!(matrix_from_slice(&values[..12]).is_err());
    }

    #[test]
    fn test_mode_codes() {
        assert_eq!(CameraMode::from_code(1).unwrap(), CameraMode::Top);
        assert!(CameraMode::from_code(9).is_err());
    }
}
