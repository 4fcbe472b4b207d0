//! Two-view triangulation with geometric validation.
//!
//! Points are triangulated by DLT in the reference camera frame and kept
//! only when they pass three checks:
//! 1. positive depth in both cameras
//! 2. parallax between the two viewing rays above a minimum
//! 3. reprojection error below a pixel threshold in both images

use std::collections::BTreeSet;

use nalgebra::{Matrix3x4, Matrix4, Point2, Vector3};
use tracing::trace;

use crate::camera::CameraModel;
use crate::config::TriangulationConfig;
use crate::geometry::{ray_angle, SE3};

/// A correspondence that survived triangulation.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulatedPoint {
    pub ref_idx: usize,
    pub cur_idx: usize,
    /// Position in the reference camera frame.
    pub position: Vector3<f64>,
    /// Angle between the two viewing rays, in degrees.
    pub parallax_deg: f64,
}

/// Linear triangulation of one correspondence.
///
/// `xn1`, `xn2` are normalized image coordinates `(x, y, 1)`; `t1_cw`, `t2_cw`
/// map the common frame into each camera. Returns the point in the common
/// frame, or `None` when the solution is at infinity.
pub fn triangulate_dlt(
    xn1: &Vector3<f64>,
    xn2: &Vector3<f64>,
    t1_cw: &SE3,
    t2_cw: &SE3,
) -> Option<Vector3<f64>> {
    let p1 = t1_cw.to_matrix3x4();
    let p2 = t2_cw.to_matrix3x4();

    // Two equations per view: x * P[2] - P[0], y * P[2] - P[1]
    let mut a = Matrix4::<f64>::zeros();
    fill_rows(&mut a, 0, xn1, &p1);
    fill_rows(&mut a, 2, xn2, &p2);

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let min_idx = svd.singular_values.imin();
    let x = v_t.row(min_idx);

    if x[3].abs() < 1e-10 {
        return None;
    }
    let p = Vector3::new(x[0] / x[3], x[1] / x[3], x[2] / x[3]);
    p.iter().all(|v| v.is_finite()).then_some(p)
}

fn fill_rows(a: &mut Matrix4<f64>, row: usize, xn: &Vector3<f64>, p: &Matrix3x4<f64>) {
    for j in 0..4 {
        a[(row, j)] = xn.x * p[(2, j)] - p[(0, j)];
        a[(row + 1, j)] = xn.y * p[(2, j)] - p[(1, j)];
    }
}

/// Squared pixel distance between the projection of `p_cam` and `observed`.
fn reprojection_error_sq(camera: &CameraModel, p_cam: &Vector3<f64>, observed: &Point2<f64>) -> f64 {
    match camera.project(p_cam) {
        Some(px) => (px - *observed).norm_squared(),
        None => f64::INFINITY,
    }
}

/// Triangulate the inlier matches between the reference and current frame.
///
/// `relative_pose` is `T_cur_ref`. `inliers` index into `matches`, which
/// hold `(ref_idx, cur_idx)` keypoint pairs. A current keypoint is used at
/// most once.
pub fn triangulate_matches(
    ref_keypoints: &[Point2<f64>],
    cur_keypoints: &[Point2<f64>],
    matches: &[(usize, usize)],
    inliers: &[usize],
    relative_pose: &SE3,
    camera: &CameraModel,
    config: &TriangulationConfig,
) -> Vec<TriangulatedPoint> {
    let identity = SE3::identity();
    let cur_center = relative_pose.inverse().translation;
    let max_err_sq = config.max_reproj_error_px * config.max_reproj_error_px;

    let mut used_cur = BTreeSet::new();
    let mut points = Vec::with_capacity(inliers.len());
    let (mut behind, mut low_parallax, mut reproj) = (0usize, 0usize, 0usize);

    for &k in inliers {
        let Some(&(ri, ci)) = matches.get(k) else {
            continue;
        };
        let (Some(kp1), Some(kp2)) = (ref_keypoints.get(ri), cur_keypoints.get(ci)) else {
            continue;
        };
        if used_cur.contains(&ci) {
            continue;
        }

        let xn1 = camera.unproject(kp1);
        let xn2 = camera.unproject(kp2);
        let Some(p_ref) = triangulate_dlt(&xn1, &xn2, &identity, relative_pose) else {
            continue;
        };
        let p_cur = relative_pose.transform_point(&p_ref);
        if p_ref.z <= 0.0 || p_cur.z <= 0.0 {
            behind += 1;
            continue;
        }

        let parallax_deg = ray_angle(&p_ref, &(p_ref - cur_center)).to_degrees();
        if parallax_deg < config.min_point_parallax_deg {
            low_parallax += 1;
            continue;
        }

        if reprojection_error_sq(camera, &p_ref, kp1) > max_err_sq
            || reprojection_error_sq(camera, &p_cur, kp2) > max_err_sq
        {
            reproj += 1;
            continue;
        }

        used_cur.insert(ci);
        points.push(TriangulatedPoint {
            ref_idx: ri,
            cur_idx: ci,
            position: p_ref,
            parallax_deg,
        });
    }

    trace!(
        "Triangulated {}/{} (behind={}, low_parallax={}, reproj={})",
        points.len(),
        inliers.len(),
        behind,
        low_parallax,
        reproj
    );
    points
}

/// Median of the parallax angles, in degrees. `None` for an empty set.
pub fn median_parallax_deg(points: &[TriangulatedPoint]) -> Option<f64> {
    median(points.iter().map(|p| p.parallax_deg).collect())
}

/// Median depth (z in the reference frame). `None` for an empty set.
pub fn median_depth(points: &[TriangulatedPoint]) -> Option<f64> {
    median(points.iter().map(|p| p.position.z).collect())
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn camera() -> CameraModel {
        CameraModel::new(800.0, 800.0, 320.0, 240.0)
    }

    /// Camera 2 sits 0.5 m to the right of camera 1, slightly rotated.
    fn relative_pose() -> SE3 {
        let t_ref_cur = SE3::new(
            UnitQuaternion::from_euler_angles(0.0, 0.02, 0.0),
            Vector3::new(0.5, 0.0, 0.0),
        );
        t_ref_cur.inverse()
    }

    #[test]
    fn test_dlt_recovers_point() {
        let pose = relative_pose();
        let p = Vector3::new(0.3, -0.2, 5.0);
        let p2 = pose.transform_point(&p);

        let xn1 = p / p.z;
        let xn2 = p2 / p2.z;
        let result = triangulate_dlt(&xn1, &xn2, &SE3::identity(), &pose).unwrap();

        assert_relative_eq!(result, p, epsilon = 1e-8);
    }

    #[test]
    fn test_triangulate_matches_filters() {
        let cam = camera();
        let pose = relative_pose();
        let world = [
            Vector3::new(0.0, 0.0, 5.0),
            Vector3::new(0.4, 0.1, 6.0),
            Vector3::new(-0.3, 0.2, 4.0),
            Vector3::new(0.1, -0.1, 4000.0), // far: negligible parallax
        ];

        let ref_kps: Vec<_> = world.iter().map(|p| cam.project(p).unwrap()).collect();
        let mut cur_kps: Vec<_> = world
            .iter()
            .map(|p| cam.project(&pose.transform_point(p)).unwrap())
            .collect();
        // Outlier: move one observation 30 px off its epipolar line.
        cur_kps[2].y += 30.0;

        let matches: Vec<_> = (0..world.len()).map(|i| (i, i)).collect();
        let inliers: Vec<_> = (0..world.len()).collect();
        let points = triangulate_matches(
            &ref_kps,
            &cur_kps,
            &matches,
            &inliers,
            &pose,
            &cam,
            &TriangulationConfig::default(),
        );

        let kept: Vec<_> = points.iter().map(|p| p.ref_idx).collect();
        assert_eq!(kept, vec![0, 1]);
        assert_relative_eq!(points[0].position, world[0], epsilon = 1e-6);
        assert!(points.iter().all(|p| p.parallax_deg > 1.0));
    }

    #[test]
    fn test_current_keypoint_used_once() {
        let cam = camera();
        let pose = relative_pose();
        let p = Vector3::new(0.1, 0.1, 5.0);
        let ref_kps = vec![cam.project(&p).unwrap(), cam.project(&p).unwrap()];
        let cur_kps = vec![cam.project(&pose.transform_point(&p)).unwrap()];

        let points = triangulate_matches(
            &ref_kps,
            &cur_kps,
            &[(0, 0), (1, 0)],
            &[0, 1],
            &pose,
            &cam,
            &TriangulationConfig::default(),
        );
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_medians() {
        let mk = |z: f64, parallax_deg: f64| TriangulatedPoint {
            ref_idx: 0,
            cur_idx: 0,
            position: Vector3::new(0.0, 0.0, z),
            parallax_deg,
        };
        let points = vec![mk(3.0, 2.0), mk(1.0, 5.0), mk(2.0, 1.0)];

        assert_eq!(median_depth(&points), Some(2.0));
        assert_eq!(median_parallax_deg(&points), Some(2.0));
        assert_eq!(median_depth(&[]), None);
    }
}
