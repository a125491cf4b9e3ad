use glam::{Mat4, Vec3, Vec4};

use crate::error::{RenderError, RenderResult};

/// General 4x4 inverse by cofactor expansion, column-major in and out.
///
/// The term order follows the classical adjugate layout so results are
/// reproducible bit for bit across builds. A zero determinant is reported
/// as `SingularMatrix`.
pub fn inverse(m: &[f32; 16]) -> RenderResult<[f32; 16]> {
    let mut inv = [0.0f32; 16];

    inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
        + m[9] * m[7] * m[14]
        + m[13] * m[6] * m[11]
        - m[13] * m[7] * m[10];

    inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
        - m[8] * m[7] * m[14]
        - m[12] * m[6] * m[11]
        + m[12] * m[7] * m[10];

    inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
        + m[8] * m[7] * m[13]
        + m[12] * m[5] * m[11]
        - m[12] * m[7] * m[9];

    inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
        - m[8] * m[6] * m[13]
        - m[12] * m[5] * m[10]
        + m[12] * m[6] * m[9];

    inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
        - m[9] * m[3] * m[14]
        - m[13] * m[2] * m[11]
        + m[13] * m[3] * m[10];

    inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
        + m[8] * m[3] * m[14]
        + m[12] * m[2] * m[11]
        - m[12] * m[3] * m[10];

    inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
        - m[8] * m[3] * m[13]
        - m[12] * m[1] * m[11]
        + m[12] * m[3] * m[9];

    inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
        + m[8] * m[2] * m[13]
        + m[12] * m[1] * m[10]
        - m[12] * m[2] * m[9];

    inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
        + m[5] * m[3] * m[14]
        + m[13] * m[2] * m[7]
        - m[13] * m[3] * m[6];

    inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
        - m[4] * m[3] * m[14]
        - m[12] * m[2] * m[7]
        + m[12] * m[3] * m[6];

    inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
        + m[4] * m[3] * m[13]
        + m[12] * m[1] * m[7]
        - m[12] * m[3] * m[5];

    inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
        - m[4] * m[2] * m[13]
        - m[12] * m[1] * m[6]
        + m[12] * m[2] * m[5];

    inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
        - m[5] * m[3] * m[10]
        - m[9] * m[2] * m[7]
        + m[9] * m[3] * m[6];

    inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
        + m[4] * m[3] * m[10]
        + m[8] * m[2] * m[7]
        - m[8] * m[3] * m[6];

    inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
        - m[4] * m[3] * m[9]
        - m[8] * m[1] * m[7]
        + m[8] * m[3] * m[5];

    inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
        + m[4] * m[2] * m[9]
        + m[8] * m[1] * m[6]
        - m[8] * m[2] * m[5];

    let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
    if det == 0.0 {
        return Err(RenderError::SingularMatrix);
    }

    let det = 1.0 / det;
    for value in inv.iter_mut() {
        *value *= det;
    }

    Ok(inv)
}

/// World-space camera position: translation column of the inverse view
pub fn camera_position(view: &Mat4) -> RenderResult<Vec3> {
    let inv = inverse(&view.to_cols_array())?;
    Ok(Vec3::new(inv[12], inv[13], inv[14]))
}

/// Camera used for the reflection pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MirroredView {
    /// View rotation with translation zeroed and the up axis flipped
    pub rotation: Mat4,
    /// Camera translation reflected about the mirror plane
    pub translation: Mat4,
    pub matrix: Mat4,
}

impl MirroredView {
    /// Derive the mirrored camera from the true view matrix.
    ///
    /// Horizontal translation keeps the regular view convention (`-camera`),
    /// the vertical component is reflected about `plane_height` and scaled by
    /// `vertical_scale`.
    pub fn derive(view: &Mat4, plane_height: f32, vertical_scale: f32) -> RenderResult<MirroredView> {
        let inv = inverse(&view.to_cols_array())?;
        let camera = Vec3::new(inv[12], inv[13], inv[14]);

        let rotation = Mat4::from_cols(
            view.x_axis,
            -view.y_axis,
            view.z_axis,
            Vec4::new(0.0, 0.0, 0.0, view.w_axis.w),
        );

        let translation = Mat4::from_cols(
            Vec4::X,
            Vec4::Y,
            Vec4::Z,
            Vec4::new(
                -camera.x,
                (camera.y - 2.0 * plane_height) * vertical_scale,
                -camera.z,
                1.0,
            ),
        );

        Ok(MirroredView {
            rotation,
            translation,
            matrix: rotation * translation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-4;

    fn assert_close(a: &[f32; 16], b: &[f32; 16]) {
        for i in 0..16 {
            assert!(
                (a[i] - b[i]).abs() < TOLERANCE,
                "element {}: {} vs {}",
                i,
                a[i],
                b[i]
            );
        }
    }

    fn sample_matrices() -> Vec<Mat4> {
        vec![
            Mat4::IDENTITY,
            Mat4::from_translation(Vec3::new(3.0, -2.0, 7.5)),
            Mat4::from_rotation_y(0.7) * Mat4::from_rotation_x(-0.3),
            Mat4::from_translation(Vec3::new(-4.0, 12.0, 1.5))
                * Mat4::from_rotation_z(1.1)
                * Mat4::from_scale(Vec3::new(2.0, 0.5, 3.0)),
        ]
    }

    #[test]
    fn test_identity_inverse() {
        let id = Mat4::IDENTITY.to_cols_array();
        assert_eq!(inverse(&id).unwrap(), id);
    }

    #[test]
    fn test_product_with_inverse_is_identity() {
        for m in sample_matrices() {
            let inv = inverse(&m.to_cols_array()).unwrap();
            let product = m * Mat4::from_cols_array(&inv);
            assert_close(&product.to_cols_array(), &Mat4::IDENTITY.to_cols_array());
        }
    }

    #[test]
    fn test_double_inverse_round_trip() {
        for m in sample_matrices() {
            let once = inverse(&m.to_cols_array()).unwrap();
            let twice = inverse(&once).unwrap();
            assert_close(&twice, &m.to_cols_array());
        }
    }

    #[test]
    fn test_matches_glam_inverse() {
        for m in sample_matrices() {
            let ours = inverse(&m.to_cols_array()).unwrap();
            assert_close(&ours, &m.inverse().to_cols_array());
        }
    }

    #[test]
    fn test_singular_matrix() {
        let zero = [0.0f32; 16];
        assert_eq!(inverse(&zero), Err(RenderError::SingularMatrix));

        let flat = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)).to_cols_array();
        assert_eq!(inverse(&flat), Err(RenderError::SingularMatrix));
    }

    #[test]
    fn test_camera_position() {
        let eye = Vec3::new(10.0, 40.0, -25.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let position = camera_position(&view).unwrap();
        assert!((position - eye).length() < 1e-3);
    }

    #[test]
    fn test_mirror_of_identity_flips_only_vertical() {
        let mirrored = MirroredView::derive(&Mat4::IDENTITY, 0.0, 0.75).unwrap();
        assert_eq!(mirrored.translation.w_axis, Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(mirrored.rotation.x_axis, Vec4::X);
        assert_eq!(mirrored.rotation.y_axis, -Vec4::Y);
        assert_eq!(mirrored.rotation.z_axis, Vec4::Z);
        assert_eq!(
            mirrored.matrix,
            Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        );
    }

    #[test]
    fn test_mirror_reflects_camera_height() {
        let camera = Vec3::new(5.0, 20.0, -8.0);
        let view = Mat4::from_translation(-camera);
        let mirrored = MirroredView::derive(&view, 0.0, 0.75).unwrap();
        let t = mirrored.translation.w_axis;

        // Horizontal axes match the regular view translation
        assert!((t.x - view.w_axis.x).abs() < TOLERANCE);
        assert!((t.z - view.w_axis.z).abs() < TOLERANCE);
        // Vertical axis is reflected and scaled
        assert!((t.y - 15.0).abs() < TOLERANCE);
        // Pure translation has no rotation left once zeroed
        assert_eq!(mirrored.rotation.w_axis, Vec4::W);
    }

    #[test]
    fn test_mirror_about_raised_plane() {
        let view = Mat4::from_translation(Vec3::new(0.0, -50.0, 0.0));
        let mirrored = MirroredView::derive(&view, 30.0, 1.0).unwrap();
        assert!((mirrored.translation.w_axis.y - (50.0 - 60.0)).abs() < TOLERANCE);
    }

    #[test]
    fn test_mirror_of_singular_view() {
        let view = Mat4::from_scale(Vec3::ZERO);
        assert_eq!(
            MirroredView::derive(&view, 0.0, 0.75),
            Err(RenderError::SingularMatrix)
        );
    }
}
