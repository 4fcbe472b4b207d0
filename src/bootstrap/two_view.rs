//! Relative pose between two views from point correspondences.
//!
//! The reference estimator fits an essential matrix with the 8-point
//! algorithm inside RANSAC (Sampson distance), refines it by least squares
//! over a shrinking inlier threshold and picks the one of the four `(R, t)` decompositions that puts the most
//! triangulated points in front of both cameras.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::camera::CameraModel;
use crate::config::TwoViewConfig;
use crate::geometry::SE3;

use super::triangulation::triangulate_dlt;

/// Minimal sample size of the 8-point algorithm.
const SAMPLE_SIZE: usize = 8;
/// RANSAC confidence for the adaptive iteration count.
const RANSAC_PROBABILITY: f64 = 0.99;

/// Relative pose and the correspondences that support it.
#[derive(Debug, Clone)]
pub struct TwoViewGeometry {
    /// `T_cur_ref`: `p_cur = R * p_ref + t`, with `|t| = 1`.
    pub relative_pose: SE3,
    /// Indices into the input correspondences.
    pub inliers: Vec<usize>,
}

/// Estimates the relative pose of the current view with respect to the
/// reference view from matched bearings.
///
/// Bearings are normalized image coordinates `(x, y, 1)`, index-aligned
/// between the two slices.
pub trait RelativePoseEstimator {
    fn estimate(
        &mut self,
        reference: &[Vector3<f64>],
        current: &[Vector3<f64>],
        camera: &CameraModel,
    ) -> Option<TwoViewGeometry>;
}

/// 8-point essential matrix estimator with RANSAC.
pub struct EightPointEstimator {
    config: TwoViewConfig,
    rng: StdRng,
}

impl EightPointEstimator {
    pub fn new(config: TwoViewConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    pub fn config(&self) -> &TwoViewConfig {
        &self.config
    }
}

impl Default for EightPointEstimator {
    fn default() -> Self {
        Self::new(TwoViewConfig::default())
    }
}

impl RelativePoseEstimator for EightPointEstimator {
    fn estimate(
        &mut self,
        reference: &[Vector3<f64>],
        current: &[Vector3<f64>],
        camera: &CameraModel,
    ) -> Option<TwoViewGeometry> {
        let n = reference.len();
        if n != current.len() || n < SAMPLE_SIZE.max(self.config.min_inliers) {
            return None;
        }

        let threshold_norm = self.config.sampson_threshold_px / camera.focal();
        let threshold = threshold_norm * threshold_norm;

        let mut best: Option<(Matrix3<f64>, Vec<usize>)> = None;
        let mut max_iter = self.config.ransac_iterations;
        let mut iteration = 0;

        while iteration < max_iter {
            iteration += 1;
            let sample = rand::seq::index::sample(&mut self.rng, n, SAMPLE_SIZE).into_vec();
            let Some(e) = essential_8_point(reference, current, &sample) else {
                continue;
            };
            let inliers = find_inliers(&e, reference, current, threshold);

            let best_len = best.as_ref().map_or(0, |(_, i)| i.len());
            if inliers.len() > best_len {
                let ratio = inliers.len() as f64 / n as f64;
                let needed = adaptive_iterations(ratio, RANSAC_PROBABILITY);
                max_iter = max_iter.min(iteration.saturating_add(needed));
                best = Some((e, inliers));
            }
        }

        let (mut e, mut inliers) = best?;
        if inliers.len() < self.config.min_inliers {
            trace!("8-point: {} inliers < {}", inliers.len(), self.config.min_inliers);
            return None;
        }

        let refined = refine_essential(&e, reference, current, threshold);
        let refined_inliers = find_inliers(&refined, reference, current, threshold);
        if refined_inliers.len() >= inliers.len() {
            e = refined;
            inliers = refined_inliers;
        }

        let (relative_pose, good) = recover_pose(&e, reference, current, &inliers)?;
        if good.len() < self.config.min_inliers {
            debug!(
                "8-point: only {}/{} inliers in front of both cameras",
                good.len(),
                inliers.len()
            );
            return None;
        }

        debug!("8-point: {} inliers after {} iterations", good.len(), iteration);
        Some(TwoViewGeometry {
            relative_pose,
            inliers: good,
        })
    }
}

/// Squared-threshold factors of the refinement passes (1, 1/2, 1/4, 1/8 and
/// 1/16 of the pixel threshold).
const REFINE_SCHEDULE: [f64; 5] = [1.0, 0.25, 1.0 / 16.0, 1.0 / 64.0, 1.0 / 256.0];

/// Least-squares refinement of a RANSAC winner.
///
/// Each pass refits on the correspondences within a shrinking threshold of
/// the previous fit, so an outlier that happens to sit inside the full
/// threshold stops pulling on the estimate. Stops once the support would
/// fall below half of the first pass.
fn refine_essential(
    e: &Matrix3<f64>,
    reference: &[Vector3<f64>],
    current: &[Vector3<f64>],
    threshold: f64,
) -> Matrix3<f64> {
    let mut e = *e;
    let mut first_support = None;

    for factor in REFINE_SCHEDULE {
        let support = find_inliers(&e, reference, current, threshold * factor);
        let floor = *first_support.get_or_insert(support.len()) / 2;
        if support.len() < SAMPLE_SIZE.max(floor) {
            break;
        }
        match essential_8_point(reference, current, &support) {
            Some(refit) => e = refit,
            None => break,
        }
    }
    e
}

/// Number of RANSAC iterations needed to draw one all-inlier sample with
/// the given probability.
fn adaptive_iterations(inlier_ratio: f64, probability: f64) -> usize {
    let w = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if w >= 1.0 - f64::EPSILON {
        return 1;
    }
    if w <= f64::EPSILON {
        return usize::MAX;
    }
    let k = (1.0 - probability).ln() / (1.0 - w).ln();
    k.ceil().max(1.0) as usize
}

fn find_inliers(
    e: &Matrix3<f64>,
    reference: &[Vector3<f64>],
    current: &[Vector3<f64>],
    threshold: f64,
) -> Vec<usize> {
    (0..reference.len())
        .filter(|&i| sampson_error(e, &reference[i], &current[i]) < threshold)
        .collect()
}

/// First-order geometric error of `x2^T E x1 = 0`.
fn sampson_error(e: &Matrix3<f64>, x1: &Vector3<f64>, x2: &Vector3<f64>) -> f64 {
    let ex1 = e * x1;
    let etx2 = e.transpose() * x2;
    let x2tex1 = x2.dot(&ex1);
    let denom = ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y;
    if denom <= 1e-18 {
        f64::INFINITY
    } else {
        x2tex1 * x2tex1 / denom
    }
}

/// Linear essential matrix from the selected correspondences, with the
/// `(s, s, 0)` singular value constraint enforced.
fn essential_8_point(
    reference: &[Vector3<f64>],
    current: &[Vector3<f64>],
    indices: &[usize],
) -> Option<Matrix3<f64>> {
    if indices.len() < SAMPLE_SIZE {
        return None;
    }

    // Pad to at least 9 rows so V^T is square.
    let rows = indices.len().max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (r, &i) in indices.iter().enumerate() {
        let (x1, y1) = (reference[i].x, reference[i].y);
        let (x2, y2) = (current[i].x, current[i].y);
        a[(r, 0)] = x2 * x1;
        a[(r, 1)] = x2 * y1;
        a[(r, 2)] = x2;
        a[(r, 3)] = y2 * x1;
        a[(r, 4)] = y2 * y1;
        a[(r, 5)] = y2;
        a[(r, 6)] = x1;
        a[(r, 7)] = y1;
        a[(r, 8)] = 1.0;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let evec = v_t.row(svd.singular_values.imin());
    #[rustfmt::skip]
    let e = Matrix3::new(
        evec[0], evec[1], evec[2],
        evec[3], evec[4], evec[5],
        evec[6], evec[7], evec[8],
    );

    let (u, s, v) = sorted_svd3(&e)?;
    let mean = 0.5 * (s[0] + s[1]);
    let e = u * Matrix3::from_diagonal(&Vector3::new(mean, mean, 0.0)) * v.transpose();
    e.iter().all(|x| x.is_finite()).then_some(e)
}

/// SVD of a 3x3 matrix with singular values in decreasing order.
///
/// Returns `(U, s, V)` with `m = U * diag(s) * V^T`.
fn sorted_svd3(m: &Matrix3<f64>) -> Option<(Matrix3<f64>, Vector3<f64>, Matrix3<f64>)> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();
    let s = svd.singular_values;

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| s[b].total_cmp(&s[a]));

    let mut u_sorted = Matrix3::zeros();
    let mut v_sorted = Matrix3::zeros();
    let mut s_sorted = Vector3::zeros();
    for (dst, &src) in order.iter().enumerate() {
        u_sorted.set_column(dst, &u.column(src));
        v_sorted.set_column(dst, &v.column(src));
        s_sorted[dst] = s[src];
    }
    Some((u_sorted, s_sorted, v_sorted))
}

/// The four `(R, t)` decompositions of an essential matrix.
fn decompose_essential(e: &Matrix3<f64>) -> Option<[(Matrix3<f64>, Vector3<f64>); 4]> {
    let (mut u, _, mut v) = sorted_svd3(e)?;
    if u.determinant() < 0.0 {
        u = -u;
    }
    if v.determinant() < 0.0 {
        v = -v;
    }

    #[rustfmt::skip]
    let w = Matrix3::new(
        0.0, -1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, 1.0,
    );
    let r1 = u * w * v.transpose();
    let r2 = u * w.transpose() * v.transpose();
    let t: Vector3<f64> = u.column(2).into_owned().normalize();

    Some([(r1, t), (r1, -t), (r2, t), (r2, -t)])
}

/// Pick the decomposition with the most points in front of both cameras.
///
/// Returns the pose and the inliers that pass the cheirality check.
fn recover_pose(
    e: &Matrix3<f64>,
    reference: &[Vector3<f64>],
    current: &[Vector3<f64>],
    inliers: &[usize],
) -> Option<(SE3, Vec<usize>)> {
    let identity = SE3::identity();
    let mut best: Option<(SE3, Vec<usize>)> = None;

    for (r, t) in decompose_essential(e)? {
        let pose = SE3::from_rotation_matrix(&r, t);
        let good: Vec<usize> = inliers
            .iter()
            .copied()
            .filter(|&i| {
                triangulate_dlt(&reference[i], &current[i], &identity, &pose)
                    .map(|p| p.z > 0.0 && pose.transform_point(&p).z > 0.0)
                    .unwrap_or(false)
            })
            .collect();

        trace!("Candidate t={:?}: {} in front", t.as_slice(), good.len());
        if good.len() > best.as_ref().map_or(0, |(_, g)| g.len()) {
            best = Some((pose, good));
        }
    }
    best
}
