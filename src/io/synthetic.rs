//! Synthetic scenes and frame sequences.
//!
//! A scene is a set of random 3D points, each with a random descriptor.
//! Observing it from a camera pose yields the [`Features`] an ideal
//! extractor would report: every visible point projected into the image,
//! optionally perturbed, plus unmatched distractor features, in shuffled
//! order. [`SyntheticExtractor`] hands those features back per frame
//! timestamp so the bootstrap can run without real images.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use anyhow::anyhow;
use nalgebra::{Matrix3, Point2, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::atlas::Descriptor;
use crate::bootstrap::{FeatureExtractor, Features, Frame, Image};
use crate::camera::CameraModel;
use crate::geometry::SE3;

pub const IMAGE_WIDTH: u32 = 640;
pub const IMAGE_HEIGHT: u32 = 480;
pub const FOCAL_LENGTH: f64 = 800.0;

/// Pinhole camera with f = 800 px, centred principal point, no distortion.
pub fn synthetic_camera() -> CameraModel {
    CameraModel::new(
        FOCAL_LENGTH,
        FOCAL_LENGTH,
        IMAGE_WIDTH as f64 / 2.0,
        IMAGE_HEIGHT as f64 / 2.0,
    )
}

pub fn synthetic_intrinsics() -> Matrix3<f64> {
    synthetic_camera().intrinsics()
}

/// Camera pose (camera-to-world) translated by `(x, y, z)` with no rotation.
pub fn translated_pose(x: f64, y: f64, z: f64) -> SE3 {
    SE3::new(UnitQuaternion::identity(), Vector3::new(x, y, z))
}

fn random_descriptor(rng: &mut StdRng) -> Descriptor {
    let mut d = [0u8; 32];
    rng.fill(&mut d[..]);
    d
}

pub struct SyntheticScene {
    pub points: Vec<Vector3<f64>>,
    pub descriptors: Vec<Descriptor>,
    camera: CameraModel,
    rng: StdRng,
    /// Uniform pixel noise amplitude added to every projection.
    pixel_noise: f64,
    /// Random features per frame that match nothing.
    distractors: usize,
}

impl SyntheticScene {
    /// `num_points` points in a box 4 to 8 m in front of the origin.
    pub fn new(num_points: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let points: Vec<_> = (0..num_points)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-1.5..1.5),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(4.0..8.0),
                )
            })
            .collect();
        let descriptors = (0..num_points).map(|_| random_descriptor(&mut rng)).collect();

        Self {
            points,
            descriptors,
            camera: synthetic_camera(),
            rng,
            pixel_noise: 0.0,
            distractors: 0,
        }
    }

    pub fn with_pixel_noise(mut self, amplitude: f64) -> Self {
        self.pixel_noise = amplitude.abs();
        self
    }

    pub fn with_distractors(mut self, count: usize) -> Self {
        self.distractors = count;
        self
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    fn in_image(p: &Point2<f64>) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < IMAGE_WIDTH as f64 && p.y < IMAGE_HEIGHT as f64
    }

    /// Features seen from camera pose `pose` (camera-to-world).
    pub fn observe(&mut self, pose: &SE3) -> Features {
        let t_cw = pose.inverse();
        let mut observed: Vec<(Point2<f64>, Descriptor)> = Vec::new();

        for (p, d) in self.points.iter().zip(&self.descriptors) {
            let Some(mut px) = self.camera.project(&t_cw.transform_point(p)) else {
                continue;
            };
            if self.pixel_noise > 0.0 {
                px.x += self.rng.gen_range(-self.pixel_noise..=self.pixel_noise);
                px.y += self.rng.gen_range(-self.pixel_noise..=self.pixel_noise);
            }
            if Self::in_image(&px) {
                observed.push((px, *d));
            }
        }

        for _ in 0..self.distractors {
            let px = Point2::new(
                self.rng.gen_range(0.0..IMAGE_WIDTH as f64),
                self.rng.gen_range(0.0..IMAGE_HEIGHT as f64),
            );
            observed.push((px, random_descriptor(&mut self.rng)));
        }

        observed.shuffle(&mut self.rng);
        let (keypoints, descriptors) = observed.into_iter().unzip();
        Features::new(keypoints, descriptors)
    }

    /// One frame per pose, `interval_ns` apart starting at 0.
    pub fn sequence(&mut self, poses: &[SE3], interval_ns: u64) -> SyntheticSequence {
        let image = Arc::new(Image::blank(IMAGE_WIDTH, IMAGE_HEIGHT));
        let mut frames = VecDeque::with_capacity(poses.len());
        let mut features = BTreeMap::new();

        for (i, pose) in poses.iter().enumerate() {
            let timestamp_ns = i as u64 * interval_ns;
            frames.push_back(Frame::new(timestamp_ns, image.clone()));
            features.insert(timestamp_ns, self.observe(pose));
        }

        SyntheticSequence {
            frames,
            extractor: SyntheticExtractor { features },
        }
    }
}

/// Frames plus the extractor that knows their features.
pub struct SyntheticSequence {
    pub frames: VecDeque<Frame>,
    pub extractor: SyntheticExtractor,
}

/// Looks features up by frame timestamp.
#[derive(Debug, Clone, Default)]
pub struct SyntheticExtractor {
    features: BTreeMap<u64, Features>,
}

impl SyntheticExtractor {
    pub fn insert(&mut self, timestamp_ns: u64, features: Features) {
        self.features.insert(timestamp_ns, features);
    }
}

impl FeatureExtractor for SyntheticExtractor {
    fn extract(&mut self, frame: &Frame) -> anyhow::Result<Features> {
        self.features
            .get(&frame.timestamp_ns)
            .cloned()
            .ok_or_else(|| anyhow!("no synthetic features for timestamp {}", frame.timestamp_ns))
    }
}

/// Two frames from a scene of `num_points` points: identity, then a camera
/// moved by `baseline` metres along +x.
pub fn two_view_sequence(num_points: usize, baseline: f64, seed: u64) -> SyntheticSequence {
    let mut scene = SyntheticScene::new(num_points, seed).with_distractors(20);
    scene.sequence(
        &[SE3::identity(), translated_pose(baseline, 0.0, 0.0)],
        33_000_000,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::FrameSource;

    #[test]
    fn test_observe_projects_visible_points() {
        let mut scene = SyntheticScene::new(100, 1);
        let features = scene.observe(&SE3::identity());

        assert!(features.len() > 90);
        assert_eq!(features.keypoints.len(), features.descriptors.len());
        assert!(features.keypoints.iter().all(SyntheticScene::in_image));
    }

    #[test]
    fn test_distractors_added() {
        let mut scene = SyntheticScene::new(10, 1).with_distractors(15);
        let baseline = SyntheticScene::new(10, 1).observe(&SE3::identity()).len();
        assert_eq!(scene.observe(&SE3::identity()).len(), baseline + 15);
    }

    #[test]
    fn test_sequence_and_extractor() {
        let mut seq = two_view_sequence(50, 0.5, 3);
        assert_eq!(seq.frames.len(), 2);

        let first = seq.frames.next_frame().unwrap();
        let second = seq.frames.next_frame().unwrap();
        assert_eq!(second.timestamp_ns - first.timestamp_ns, 33_000_000);

        assert!(seq.extractor.extract(&first).is_ok());
        let unknown = Frame::new(1, first.image.clone());
        assert!(seq.extractor.extract(&unknown).is_err());
    }

    #[test]
    fn test_same_seed_same_scene() {
        let a = SyntheticScene::new(20, 9);
        let b = SyntheticScene::new(20, 9);
        assert_eq!(a.points, b.points);
        assert_eq!(a.descriptors, b.descriptors);
    }
}
