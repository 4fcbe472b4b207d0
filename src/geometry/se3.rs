//! SE(3) rigid-body transform.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid-body transform (rotation + translation).
///
/// Poses stored in the map follow the camera-to-world convention (T_wc):
/// `p_world = pose.transform_point(&p_cam)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Build from a rotation matrix. The matrix is re-orthonormalized.
    pub fn from_rotation_matrix(rotation: &Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot),
            translation,
        }
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &SE3) -> SE3 {
        SE3 {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// 3x4 matrix `[R | t]`.
    pub fn to_matrix3x4(&self) -> Matrix3x4<f64> {
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 4>(0, 0)
            .copy_from(&self.to_matrix3x4());
        m
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for SE3 {
    type Output = SE3;

    fn mul(self, rhs: SE3) -> SE3 {
        self.compose(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_pose() -> SE3 {
        SE3::new(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            Vector3::new(1.0, -2.0, 0.5),
        )
    }

    #[test]
    fn test_inverse_composes_to_identity() {
        let pose = sample_pose();
        let ident = pose.compose(&pose.inverse());

        assert_relative_eq!(ident.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(ident.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_point_matches_matrix() {
        let pose = sample_pose();
        let p = Vector3::new(0.3, 0.7, 4.0);

        let via_matrix = pose.to_matrix() * p.push(1.0);
        let direct = pose.transform_point(&p);

        assert_relative_eq!(direct, via_matrix.xyz(), epsilon = 1e-12);
    }

    #[test]
    fn test_from_rotation_matrix_roundtrip() {
        let pose = sample_pose();
        let rebuilt = SE3::from_rotation_matrix(&pose.rotation_matrix(), pose.translation);

        assert_relative_eq!(
            rebuilt.rotation_matrix(),
            pose.rotation_matrix(),
            epsilon = 1e-12
        );
    }
}
