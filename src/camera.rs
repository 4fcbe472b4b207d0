//! Pinhole camera model with Brown–Conrady lens distortion.

use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};

/// Fixed-point iterations used to invert the distortion model.
const UNDISTORT_ITERATIONS: usize = 20;

/// Lens distortion coefficients in OpenCV order `k1 k2 p1 p2 k3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Parse a coefficient vector with 0, 4 or 5 entries.
    pub fn from_coefficients(coeffs: &[f64]) -> Result<Self> {
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(MapError::InvalidCalibration(
                "distortion coefficients must be finite".to_string(),
            ));
        }
        match coeffs.len() {
            0 => Ok(Self::default()),
            4 | 5 => Ok(Self {
                k1: coeffs[0],
                k2: coeffs[1],
                p1: coeffs[2],
                p2: coeffs[3],
                k3: coeffs.get(4).copied().unwrap_or(0.0),
            }),
            n => Err(MapError::InvalidCalibration(format!(
                "expected 0, 4 or 5 distortion coefficients, got {}",
                n
            ))),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0 && self.k3 == 0.0
    }

    /// Apply distortion to a normalized image coordinate.
    pub fn distort(&self, xn: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (xn.x, xn.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vector2::new(x * radial + dx, y * radial + dy)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, xd: &Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return *xd;
        }
        let mut x = *xd;
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x.norm_squared();
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            let dx = 2.0 * self.p1 * x.x * x.y + self.p2 * (r2 + 2.0 * x.x * x.x);
            let dy = self.p1 * (r2 + 2.0 * x.y * x.y) + 2.0 * self.p2 * x.x * x.y;
            x = Vector2::new((xd.x - dx) / radial, (xd.y - dy) / radial);
        }
        x
    }
}

/// Intrinsic camera model used by the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: Distortion::default(),
        }
    }

    /// Build from a 3x3 calibration matrix and a distortion vector.
    pub fn from_calibration(intrinsics: &Matrix3<f64>, distortion: &[f64]) -> Result<Self> {
        if intrinsics.iter().any(|v| !v.is_finite()) {
            return Err(MapError::InvalidCalibration(
                "intrinsics must be finite".to_string(),
            ));
        }
        let (fx, fy) = (intrinsics[(0, 0)], intrinsics[(1, 1)]);
        if fx <= 0.0 || fy <= 0.0 {
            return Err(MapError::InvalidCalibration(format!(
                "focal lengths must be positive (fx={}, fy={})",
                fx, fy
            )));
        }
        let lower_zero = intrinsics[(1, 0)] == 0.0
            && intrinsics[(2, 0)] == 0.0
            && intrinsics[(2, 1)] == 0.0;
        if !lower_zero || (intrinsics[(2, 2)] - 1.0).abs() > 1e-9 {
            return Err(MapError::InvalidCalibration(
                "intrinsics must be upper triangular with K[2][2] = 1".to_string(),
            ));
        }
        if intrinsics[(0, 1)].abs() > 1e-9 {
            return Err(MapError::InvalidCalibration(
                "skewed intrinsics are not supported".to_string(),
            ));
        }

        Ok(Self {
            fx,
            fy,
            cx: intrinsics[(0, 2)],
            cy: intrinsics[(1, 2)],
            distortion: Distortion::from_coefficients(distortion)?,
        })
    }

    #[rustfmt::skip]
    pub fn intrinsics(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx,
            0.0, self.fy, self.cy,
            0.0, 0.0, 1.0,
        )
    }

    /// Mean focal length, used to convert pixel thresholds to normalized units.
    pub fn focal(&self) -> f64 {
        0.5 * (self.fx + self.fy)
    }

    /// Project a point in camera coordinates to pixels.
    ///
    /// Returns `None` for points at or behind the camera plane.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= 0.0 {
            return None;
        }
        let xn = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let xd = self.distortion.distort(&xn);
        Some(Point2::new(self.fx * xd.x + self.cx, self.fy * xd.y + self.cy))
    }

    /// Back-project a pixel to an undistorted bearing `(x, y, 1)`.
    pub fn unproject(&self, pixel: &Point2<f64>) -> Vector3<f64> {
        let xd = Vector2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy);
        let xn = self.distortion.undistort(&xd);
        Vector3::new(xn.x, xn.y, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[rustfmt::skip]
    fn k800() -> Matrix3<f64> {
        Matrix3::new(
            800.0, 0.0, 320.0,
            0.0, 800.0, 240.0,
            0.0, 0.0, 1.0,
        )
    }

    #[test]
    fn test_from_calibration() {
        let cam = CameraModel::from_calibration(&k800(), &[0.0; 5]).unwrap();
        assert_eq!(cam.fx, 800.0);
        assert_eq!(cam.cy, 240.0);
        assert!(cam.distortion.is_zero());
        assert_relative_eq!(cam.intrinsics(), k800());
    }

    #[test]
    fn test_rejects_bad_calibration() {
        let mut k = k800();
        k[(0, 0)] = -1.0;
        assert!(matches!(
            CameraModel::from_calibration(&k, &[]),
            Err(MapError::InvalidCalibration(_))
        ));
        assert!(matches!(
            CameraModel::from_calibration(&k800(), &[0.1, 0.2, 0.3]),
            Err(MapError::InvalidCalibration(_))
        ));
    }

    #[test]
    fn test_project_unproject_roundtrip() {
        let mut cam = CameraModel::from_calibration(&k800(), &[]).unwrap();
        cam.distortion = Distortion::from_coefficients(&[-0.2, 0.05, 0.001, -0.0005]).unwrap();

        let p = Vector3::new(0.4, -0.3, 2.5);
        let px = cam.project(&p).unwrap();
        let bearing = cam.unproject(&px);

        assert_relative_eq!(bearing * p.z, p, epsilon = 1e-6);
    }

    #[test]
    fn test_project_behind_camera() {
        let cam = CameraModel::new(800.0, 800.0, 320.0, 240.0);
        assert!(cam.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
        assert!(cam.project(&Vector3::new(0.0, 0.0, 0.0)).is_none());
    }
}
