//! Monocular bootstrap: calibration plus a frame stream in, initial map out.
//!
//! The first frame with enough features becomes the reference. Every later
//! frame is matched against it, the relative pose is estimated and the
//! matches are triangulated. Once enough points with enough parallax exist
//! the two frames become the first two keyframes of a new [`SparseMap`].

use nalgebra::{Matrix3, Vector3};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::atlas::{FeatureCloudPoint, Identification, Keyframe, SparseMap};
use crate::camera::CameraModel;
use crate::config::BootstrapConfig;
use crate::error::{FailureReason, MapError, Result};
use crate::geometry::SE3;

use super::features::{match_descriptors, FeatureExtractor, Features};
use super::frame::FrameSource;
use super::result::BootstrapReport;
use super::state::{AtomicPhase, BootstrapPhase};
use super::triangulation::{median_depth, median_parallax_deg, triangulate_matches, TriangulatedPoint};
use super::two_view::{EightPointEstimator, RelativePoseEstimator};

/// Everything `run()` needs exclusive access to.
struct Session<S, E, P> {
    source: S,
    extractor: E,
    estimator: P,
    camera: Option<CameraModel>,
}

struct ReferenceFrame {
    timestamp_ns: u64,
    features: Features,
}

/// Relative pose `T_cur_ref` and the points that made the pair ready.
struct Initialization {
    relative_pose: SE3,
    points: Vec<TriangulatedPoint>,
}

/// Outcome of relating one frame to the reference.
enum Attempt {
    TooFewMatches,
    NoPose,
    NotReady,
    Ready(Initialization),
}

/// One-shot map initializer.
///
/// Phases move `Uninitialized -> CalibrationSet -> Accumulating ->
/// Succeeded | Failed`. A finished bootstrapper cannot be rerun; build a new
/// one to retry.
pub struct Bootstrapper<S, E, P = EightPointEstimator> {
    config: BootstrapConfig,
    phase: AtomicPhase,
    session: Mutex<Session<S, E, P>>,
    report: Mutex<BootstrapReport>,
}

impl<S, E> Bootstrapper<S, E, EightPointEstimator>
where
    S: FrameSource,
    E: FeatureExtractor,
{
    pub fn new(config: BootstrapConfig, source: S, extractor: E) -> Result<Self> {
        let estimator = EightPointEstimator::new(config.two_view.clone());
        Self::with_estimator(config, source, extractor, estimator)
    }
}

impl<S, E, P> Bootstrapper<S, E, P>
where
    S: FrameSource,
    E: FeatureExtractor,
    P: RelativePoseEstimator,
{
    pub fn with_estimator(
        config: BootstrapConfig,
        source: S,
        extractor: E,
        estimator: P,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            phase: AtomicPhase::default(),
            session: Mutex::new(Session {
                source,
                extractor,
                estimator,
                camera: None,
            }),
            report: Mutex::new(BootstrapReport::default()),
        })
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase.load()
    }

    pub fn report(&self) -> BootstrapReport {
        self.report.lock().clone()
    }

    /// Set or replace the camera calibration.
    ///
    /// Allowed before `run()` starts; afterwards fails with
    /// [`MapError::PreconditionViolated`]. An invalid calibration fails with
    /// [`MapError::InvalidCalibration`] and leaves the phase unchanged.
    pub fn set_camera_parameters(
        &self,
        intrinsics: &Matrix3<f64>,
        distortion: &[f64],
    ) -> Result<()> {
        let camera = CameraModel::from_calibration(intrinsics, distortion)?;

        let not_allowed = |phase: BootstrapPhase| {
            MapError::PreconditionViolated(format!(
                "camera parameters cannot change in phase {:?}",
                phase
            ))
        };

        let phase = self.phase.load();
        if !matches!(phase, BootstrapPhase::Uninitialized | BootstrapPhase::CalibrationSet) {
            return Err(not_allowed(phase));
        }
        let Some(mut session) = self.session.try_lock() else {
            return Err(not_allowed(self.phase.load()));
        };
        let phase = self.phase.load();
        if !matches!(phase, BootstrapPhase::Uninitialized | BootstrapPhase::CalibrationSet) {
            return Err(not_allowed(phase));
        }

        session.camera = Some(camera);
        // Already CalibrationSet is fine: the parameters were just replaced.
        let _ = self
            .phase
            .transition(BootstrapPhase::Uninitialized, BootstrapPhase::CalibrationSet);

        info!(
            "Camera set: fx={:.1} fy={:.1} cx={:.1} cy={:.1}{}",
            camera.fx,
            camera.fy,
            camera.cx,
            camera.cy,
            if camera.distortion.is_zero() { "" } else { " (distorted)" }
        );
        Ok(())
    }

    /// Consume frames until a map can be initialized or a budget runs out.
    ///
    /// Requires [`BootstrapPhase::CalibrationSet`]. A call in any other phase,
    /// including a concurrent call while another `run()` is accumulating,
    /// fails with [`MapError::PreconditionViolated`] and has no effect.
    pub fn run(&self) -> Result<SparseMap> {
        if let Err(phase) = self
            .phase
            .transition(BootstrapPhase::CalibrationSet, BootstrapPhase::Accumulating)
        {
            return Err(MapError::PreconditionViolated(format!(
                "run() requires phase CalibrationSet, found {:?}",
                phase
            )));
        }

        let mut session = self.session.lock();
        info!("Bootstrap started");
        match self.accumulate(&mut session) {
            Ok(map) => {
                self.phase.store(BootstrapPhase::Succeeded);
                Ok(map)
            }
            Err(e) => {
                self.phase.store(BootstrapPhase::Failed);
                Err(e)
            }
        }
    }

    fn accumulate(&self, session: &mut Session<S, E, P>) -> Result<SparseMap> {
        let camera = session.camera.ok_or_else(|| {
            MapError::PreconditionViolated("camera parameters not set".to_string())
        })?;
        let config = &self.config;
        let max_span_ns = config.max_duration_ms.map(|ms| ms.saturating_mul(1_000_000));

        let mut reference: Option<ReferenceFrame> = None;
        let mut first_timestamp: Option<u64> = None;

        for _ in 0..config.max_frames {
            let Some(frame) = session.source.next_frame() else {
                return Err(self.fail(FailureReason::StreamExhausted));
            };
            self.report.lock().frames_consumed += 1;

            let start = *first_timestamp.get_or_insert(frame.timestamp_ns);
            if let Some(max_span) = max_span_ns {
                if frame.timestamp_ns.saturating_sub(start) > max_span {
                    return Err(self.fail(FailureReason::TimeBudgetExhausted));
                }
            }

            let features = match session.extractor.extract(&frame) {
                Ok(f) if f.keypoints.len() == f.descriptors.len() => f,
                Ok(f) => {
                    warn!(
                        "Frame {}: {} keypoints but {} descriptors",
                        frame.timestamp_ns,
                        f.keypoints.len(),
                        f.descriptors.len()
                    );
                    self.lost()?;
                    continue;
                }
                Err(e) => {
                    warn!("Frame {}: feature extraction failed: {:#}", frame.timestamp_ns, e);
                    self.lost()?;
                    continue;
                }
            };

            let current = ReferenceFrame {
                timestamp_ns: frame.timestamp_ns,
                features,
            };

            let Some(ref_frame) = reference.take() else {
                reference = self.try_set_reference(current);
                continue;
            };

            if current.features.len() < config.min_features {
                debug!(
                    "Frame {}: {} features, dropping reference",
                    current.timestamp_ns,
                    current.features.len()
                );
                self.lost()?;
                continue;
            }

            match self.attempt(&ref_frame, &current.features, &camera, &mut session.estimator) {
                Attempt::Ready(init) => {
                    return self.build_map(&ref_frame, &current, init);
                }
                Attempt::NotReady => {
                    self.report.lock().consecutive_lost = 0;
                    reference = Some(ref_frame);
                }
                Attempt::NoPose => {
                    debug!("Frame {}: no relative pose", current.timestamp_ns);
                    self.lost()?;
                    reference = Some(ref_frame);
                }
                Attempt::TooFewMatches => {
                    debug!("Frame {}: too few matches, new reference", current.timestamp_ns);
                    self.lost()?;
                    reference = self.try_set_reference(current);
                }
            }
        }

        Err(self.fail(FailureReason::FrameBudgetExhausted))
    }

    fn try_set_reference(&self, frame: ReferenceFrame) -> Option<ReferenceFrame> {
        if frame.features.len() < self.config.min_features {
            trace!(
                "Frame {}: {} features, not enough for a reference",
                frame.timestamp_ns,
                frame.features.len()
            );
            return None;
        }
        debug!(
            "Reference frame {} ({} features)",
            frame.timestamp_ns,
            frame.features.len()
        );
        self.report.lock().reference_resets += 1;
        Some(frame)
    }

    fn attempt(
        &self,
        reference: &ReferenceFrame,
        current: &Features,
        camera: &CameraModel,
        estimator: &mut P,
    ) -> Attempt {
        let config = &self.config;
        let matches = match_descriptors(
            &reference.features.descriptors,
            &current.descriptors,
            &config.matcher,
        );
        self.report.lock().last_num_matches = matches.len();
        if matches.len() < config.min_matches {
            return Attempt::TooFewMatches;
        }

        let (ref_bearings, cur_bearings): (Vec<Vector3<f64>>, Vec<Vector3<f64>>) = matches
            .iter()
            .map(|&(r, c)| {
                (
                    camera.unproject(&reference.features.keypoints[r]),
                    camera.unproject(&current.keypoints[c]),
                )
            })
            .unzip();

        let Some(geometry) = estimator.estimate(&ref_bearings, &cur_bearings, camera) else {
            return Attempt::NoPose;
        };

        let points = triangulate_matches(
            &reference.features.keypoints,
            &current.keypoints,
            &matches,
            &geometry.inliers,
            &geometry.relative_pose,
            camera,
            &config.triangulation,
        );
        let parallax = median_parallax_deg(&points).unwrap_or(0.0);

        {
            let mut report = self.report.lock();
            report.last_num_inliers = geometry.inliers.len();
            report.last_triangulated = points.len();
            report.last_parallax_deg = parallax;
        }
        debug!(
            "{} matches, {} inliers, {} triangulated, median parallax {:.2} deg",
            matches.len(),
            geometry.inliers.len(),
            points.len(),
            parallax
        );

        if points.len() >= config.min_triangulated_points && parallax >= config.min_parallax_deg {
            Attempt::Ready(Initialization {
                relative_pose: geometry.relative_pose,
                points,
            })
        } else {
            Attempt::NotReady
        }
    }

    /// Create the map from the reference and current frame.
    ///
    /// The reference camera defines the world frame and the scene is scaled
    /// so the median point depth is 1.
    fn build_map(
        &self,
        reference: &ReferenceFrame,
        current: &ReferenceFrame,
        init: Initialization,
    ) -> Result<SparseMap> {
        let Initialization {
            relative_pose,
            mut points,
        } = init;

        let Some(depth) = median_depth(&points).filter(|d| *d > 0.0) else {
            debug!("No points in front of the reference camera");
            return Err(self.fail(FailureReason::DegenerateMap));
        };
        let scale = 1.0 / depth;
        for p in &mut points {
            p.position *= scale;
        }
        let t_cur_ref = SE3::new(relative_pose.rotation, relative_pose.translation * scale);

        let mut identification = Identification::new();
        identification.set_name(self.config.map_name.clone());
        identification.set_author(self.config.author.clone());
        let map = SparseMap::with_identification(identification);

        let kf0_id = map.allocate_keyframe_id();
        let kf1_id = map.allocate_keyframe_id();
        let mut kf0 = Keyframe::new(
            kf0_id,
            reference.timestamp_ns,
            SE3::identity(),
            reference.features.keypoints.clone(),
            reference.features.descriptors.clone(),
        );
        let mut kf1 = Keyframe::new(
            kf1_id,
            current.timestamp_ns,
            t_cur_ref.inverse(),
            current.features.keypoints.clone(),
            current.features.descriptors.clone(),
        );

        let mut cloud = Vec::with_capacity(points.len());
        for p in &points {
            let mp_id = map.allocate_map_point_id();
            kf0.set_map_point(p.ref_idx, mp_id);
            kf1.set_map_point(p.cur_idx, mp_id);
            cloud.push(FeatureCloudPoint::new(
                mp_id,
                p.position,
                reference.features.descriptors[p.ref_idx],
                kf0_id,
            ));
        }

        {
            let mut txn = map.lock_all();
            txn.insert_keyframe(kf0, cloud)
                .and_then(|_| txn.insert_keyframe(kf1, Vec::new()))
                .map_err(|e| {
                    debug!("Initial keyframes rejected: {}", e);
                    self.fail(FailureReason::DegenerateMap)
                })?;
        }
        let bbox = map.refresh_bounding_box();

        let report = self.report();
        info!(
            "Bootstrap succeeded after {} frames: {} points, baseline {:.3}, median parallax {:.2} deg",
            report.frames_consumed,
            points.len(),
            t_cur_ref.translation.norm(),
            report.last_parallax_deg
        );
        trace!("Map extent {:?}", bbox.extent());
        Ok(map)
    }

    /// Count a frame that could not be related to the reference.
    fn lost(&self) -> Result<()> {
        let consecutive = {
            let mut report = self.report.lock();
            report.record_lost();
            report.consecutive_lost
        };
        if consecutive >= self.config.max_consecutive_lost {
            return Err(self.fail(FailureReason::TrackingLost));
        }
        Ok(())
    }

    fn fail(&self, reason: FailureReason) -> MapError {
        let report = self.report();
        warn!(
            "Bootstrap failed: {} ({} frames, {} tracking losses)",
            reason, report.frames_consumed, report.tracking_losses
        );
        MapError::InitializationFailed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{Map, MapPointId};
    use crate::bootstrap::{Frame, TwoViewGeometry};
    use crate::io::synthetic::{
        synthetic_intrinsics, translated_pose, two_view_sequence, SyntheticExtractor,
        SyntheticScene, SyntheticSequence,
    };
    use approx::assert_relative_eq;
    use nalgebra::Point2;
    use std::collections::VecDeque;

    fn bootstrapper(
        config: BootstrapConfig,
        seq: SyntheticSequence,
    ) -> Bootstrapper<VecDeque<Frame>, SyntheticExtractor> {
        let b = Bootstrapper::new(config, seq.frames, seq.extractor).unwrap();
        b.set_camera_parameters(&synthetic_intrinsics(), &[]).unwrap();
        b
    }

    /// Frames whose camera barely moves.
    fn static_sequence(frames: usize) -> SyntheticSequence {
        let poses: Vec<_> = (0..frames).map(|i| translated_pose(1e-5 * i as f64, 0.0, 0.0)).collect();
        SyntheticScene::new(150, 5).sequence(&poses, 100_000_000)
    }

    struct NoPoseEstimator;

    impl RelativePoseEstimator for NoPoseEstimator {
        fn estimate(
            &mut self,
            _: &[Vector3<f64>],
            _: &[Vector3<f64>],
            _: &CameraModel,
        ) -> Option<TwoViewGeometry> {
            None
        }
    }

    struct FailingExtractor;

    impl FeatureExtractor for FailingExtractor {
        fn extract(&mut self, _: &Frame) -> anyhow::Result<Features> {
            anyhow::bail!("sensor unplugged")
        }
    }

    #[test]
    fn test_set_camera_parameters() {
        let seq = two_view_sequence(150, 0.5, 1);
        let b = Bootstrapper::new(BootstrapConfig::default(), seq.frames, seq.extractor).unwrap();
        assert_eq!(b.phase(), BootstrapPhase::Uninitialized);

        let mut bad = synthetic_intrinsics();
        bad[(0, 0)] = -1.0;
        assert!(matches!(
            b.set_camera_parameters(&bad, &[]),
            Err(MapError::InvalidCalibration(_))
        ));
        assert_eq!(b.phase(), BootstrapPhase::Uninitialized);

        b.set_camera_parameters(&synthetic_intrinsics(), &[]).unwrap();
        assert_eq!(b.phase(), BootstrapPhase::CalibrationSet);

        // Replacing is allowed before run()
        b.set_camera_parameters(&synthetic_intrinsics(), &[0.01, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(b.phase(), BootstrapPhase::CalibrationSet);
    }

    #[test]
    fn test_run_requires_calibration() {
        let seq = two_view_sequence(150, 0.5, 1);
        let b = Bootstrapper::new(BootstrapConfig::default(), seq.frames, seq.extractor).unwrap();

        assert!(matches!(b.run(), Err(MapError::PreconditionViolated(_))));
        assert_eq!(b.phase(), BootstrapPhase::Uninitialized);
        assert_eq!(b.report(), BootstrapReport::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let seq = two_view_sequence(10, 0.5, 1);
        let config = BootstrapConfig {
            max_frames: 0,
            ..BootstrapConfig::default()
        };
        assert!(matches!(
            Bootstrapper::new(config, seq.frames, seq.extractor),
            Err(MapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_two_views_with_baseline_succeed() {
        let config = BootstrapConfig {
            map_name: "synthetic".to_string(),
            author: "tests".to_string(),
            ..BootstrapConfig::default()
        };
        let b = bootstrapper(config, two_view_sequence(150, 0.5, 7));

        let map = b.run().unwrap();
        assert_eq!(b.phase(), BootstrapPhase::Succeeded);

        let stats = map.stats();
        assert_eq!(stats.num_keyframes, 2);
        assert_eq!(stats.num_covisibility_edges, 1);
        assert_eq!(stats.num_indexed_keyframes, 2);
        assert!(stats.num_points >= 50);
        map.check_invariants().unwrap();

        let snapshot = map.read_all();
        let kf0 = snapshot.keyframes.get(crate::atlas::KeyFrameId(0)).unwrap();
        let kf1 = snapshot.keyframes.get(crate::atlas::KeyFrameId(1)).unwrap();
        assert_eq!(
            snapshot.covisibility_graph.weight(kf0.id, kf1.id) as usize,
            stats.num_points
        );

        // Every point is seen by both keyframes.
        let referenced: Vec<MapPointId> = kf0.map_point_indices().map(|(_, id)| id).collect();
        assert_eq!(referenced.len(), stats.num_points);
        for point in snapshot.point_cloud.iter() {
            assert_eq!(point.num_observations(), 2);
        }

        // Reference camera is the origin; the second camera moved along +x.
        assert_relative_eq!(kf0.camera_center(), Vector3::zeros(), epsilon = 1e-12);
        let direction = kf1.camera_center().normalize();
        assert_relative_eq!(direction, Vector3::x(), epsilon = 1e-4);

        // Scale normalized to unit median depth.
        let mut depths: Vec<f64> = snapshot.point_cloud.iter().map(|p| p.position.z).collect();
        depths.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(depths[depths.len() / 2], 1.0, epsilon = 1e-9);
        drop(snapshot);

        let ident = map.identification_snapshot();
        assert_eq!(ident.name(), "synthetic");
        assert_eq!(ident.author(), "tests");
        assert!(!ident.bbox().is_empty());

        let report = b.report();
        assert_eq!(report.frames_consumed, 2);
        assert_eq!(report.tracking_losses, 0);
        assert_eq!(report.last_triangulated, stats.num_points);
        assert!(report.last_parallax_deg > 1.0);
    }

    #[test]
    fn test_finished_bootstrapper_rejects_calls() {
        let b = bootstrapper(BootstrapConfig::default(), two_view_sequence(150, 0.5, 7));
        b.run().unwrap();

        assert!(matches!(b.run(), Err(MapError::PreconditionViolated(_))));
        assert!(matches!(
            b.set_camera_parameters(&synthetic_intrinsics(), &[]),
            Err(MapError::PreconditionViolated(_))
        ));
        assert_eq!(b.phase(), BootstrapPhase::Succeeded);
    }

    #[test]
    fn test_tiny_baseline_fails() {
        let b = bootstrapper(BootstrapConfig::default(), two_view_sequence(150, 1e-4, 7));

        let err = b.run().unwrap_err();
        assert!(matches!(err, MapError::InitializationFailed(_)));
        assert_eq!(b.phase(), BootstrapPhase::Failed);
        assert_eq!(b.report().frames_consumed, 2);

        // Failure is terminal.
        assert!(matches!(b.run(), Err(MapError::PreconditionViolated(_))));
    }

    #[test]
    fn test_frame_budget() {
        let config = BootstrapConfig {
            max_frames: 3,
            ..BootstrapConfig::default()
        };
        let b = bootstrapper(config, static_sequence(6));

        assert!(matches!(
            b.run(),
            Err(MapError::InitializationFailed(FailureReason::FrameBudgetExhausted))
        ));
        assert_eq!(b.report().frames_consumed, 3);
    }

    #[test]
    fn test_time_budget() {
        let config = BootstrapConfig {
            max_duration_ms: Some(150),
            ..BootstrapConfig::default()
        };
        // Frames are 100 ms apart: the third one is past the budget.
        let b = bootstrapper(config, static_sequence(6));

        assert!(matches!(
            b.run(),
            Err(MapError::InitializationFailed(FailureReason::TimeBudgetExhausted))
        ));
        assert_eq!(b.report().frames_consumed, 3);
    }

    #[test]
    fn test_stream_exhausted() {
        let b = bootstrapper(BootstrapConfig::default(), static_sequence(3));
        assert!(matches!(
            b.run(),
            Err(MapError::InitializationFailed(FailureReason::StreamExhausted))
        ));
    }

    #[test]
    fn test_extraction_failures_lose_tracking() {
        let seq = static_sequence(10);
        let b = Bootstrapper::new(BootstrapConfig::default(), seq.frames, FailingExtractor).unwrap();
        b.set_camera_parameters(&synthetic_intrinsics(), &[]).unwrap();

        assert!(matches!(
            b.run(),
            Err(MapError::InitializationFailed(FailureReason::TrackingLost))
        ));
        let report = b.report();
        assert_eq!(report.tracking_losses, 5);
        assert_eq!(report.frames_consumed, 5);
    }

    #[test]
    fn test_custom_estimator_is_used() {
        let seq = two_view_sequence(150, 0.5, 7);
        let config = BootstrapConfig {
            max_consecutive_lost: 1,
            ..BootstrapConfig::default()
        };
        let b = Bootstrapper::with_estimator(config, seq.frames, seq.extractor, NoPoseEstimator)
            .unwrap();
        b.set_camera_parameters(&synthetic_intrinsics(), &[]).unwrap();

        assert!(matches!(
            b.run(),
            Err(MapError::InitializationFailed(FailureReason::TrackingLost))
        ));
        assert!(b.report().last_num_matches >= 60);
    }

    fn ready_pair() -> (ReferenceFrame, ReferenceFrame) {
        let features = Features::new(
            vec![Point2::new(100.0, 100.0), Point2::new(200.0, 150.0)],
            vec![[1u8; 32], [2u8; 32]],
        );
        let reference = ReferenceFrame {
            timestamp_ns: 0,
            features: features.clone(),
        };
        let current = ReferenceFrame {
            timestamp_ns: 33_000_000,
            features,
        };
        (reference, current)
    }

    fn point(ref_idx: usize, cur_idx: usize, depth: f64) -> TriangulatedPoint {
        TriangulatedPoint {
            ref_idx,
            cur_idx,
            position: Vector3::new(0.1, 0.0, depth),
            parallax_deg: 2.0,
        }
    }

    #[test]
    fn test_empty_initialization_is_degenerate() {
        let b = bootstrapper(BootstrapConfig::default(), two_view_sequence(10, 0.5, 1));
        let (reference, current) = ready_pair();
        let init = Initialization {
            relative_pose: translated_pose(-1.0, 0.0, 0.0),
            points: Vec::new(),
        };

        assert!(matches!(
            b.build_map(&reference, &current, init),
            Err(MapError::InitializationFailed(FailureReason::DegenerateMap))
        ));
    }

    #[test]
    fn test_conflicting_associations_are_degenerate() {
        let b = bootstrapper(BootstrapConfig::default(), two_view_sequence(10, 0.5, 1));
        let (reference, current) = ready_pair();
        // Both points claim reference feature 0.
        let init = Initialization {
            relative_pose: translated_pose(-1.0, 0.0, 0.0),
            points: vec![point(0, 0, 4.0), point(0, 1, 5.0)],
        };

        assert!(matches!(
            b.build_map(&reference, &current, init),
            Err(MapError::InitializationFailed(FailureReason::DegenerateMap))
        ));
    }
}
