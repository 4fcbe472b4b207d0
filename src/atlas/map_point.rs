//! FeatureCloudPoint - A 3D landmark observed by keyframes.
//!
//! Feature points are the payload of the map's point cloud. Each one tracks
//! which keyframes observe it, maintains quality metrics for culling
//! decisions, and carries a representative descriptor for matching.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::point_cloud::CloudPoint;
use super::types::{Descriptor, KeyFrameId, MapPointId};

/// A 3D map point (landmark) observed by one or more keyframes.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCloudPoint {
    /// Unique identifier for this point.
    pub id: MapPointId,

    /// 3D position in world frame.
    pub position: Vector3<f64>,

    /// Representative descriptor (from the creating observation).
    pub descriptor: Descriptor,

    /// Keyframes observing this point, mapped to feature index in that keyframe.
    /// observations[kf_id] = feature_idx means keyframe kf_id sees this point at feature_idx.
    pub observations: BTreeMap<KeyFrameId, usize>,

    /// Mean viewing direction (unit vector, world frame).
    pub normal: Vector3<f64>,

    /// Number of times this point was visible in a frame.
    pub visible_count: u32,

    /// Number of times this point was successfully matched.
    pub found_count: u32,

    /// Keyframe that first created this point.
    pub first_kf_id: KeyFrameId,

    /// Whether this point is marked as bad (should be removed).
    pub is_bad: bool,
}

impl FeatureCloudPoint {
    pub fn new(
        id: MapPointId,
        position: Vector3<f64>,
        descriptor: Descriptor,
        first_kf_id: KeyFrameId,
    ) -> Self {
        Self {
            id,
            position,
            descriptor,
            observations: BTreeMap::new(),
            normal: Vector3::zeros(),
            visible_count: 0,
            found_count: 0,
            first_kf_id,
            is_bad: false,
        }
    }

    /// Record that keyframe `kf_id` sees this point at feature `feature_idx`.
    pub fn add_observation(&mut self, kf_id: KeyFrameId, feature_idx: usize) {
        self.observations.insert(kf_id, feature_idx);
    }

    /// Returns true if the observation existed and was removed.
    pub fn erase_observation(&mut self, kf_id: KeyFrameId) -> bool {
        self.observations.remove(&kf_id).is_some()
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    /// found_count / visible_count, or 1.0 before the point was ever visible
    /// so that new points are not penalized.
    pub fn found_ratio(&self) -> f64 {
        if self.visible_count == 0 {
            1.0
        } else {
            self.found_count as f64 / self.visible_count as f64
        }
    }

    pub fn increase_visible(&mut self) {
        self.visible_count += 1;
    }

    pub fn increase_found(&mut self) {
        self.found_count += 1;
    }

    /// A point is culled when it is marked bad, has fewer than
    /// `min_observations` observers or a found ratio below `min_found_ratio`.
    pub fn should_cull(&self, min_found_ratio: f64, min_observations: usize) -> bool {
        self.is_bad
            || self.num_observations() < min_observations
            || self.found_ratio() < min_found_ratio
    }

    pub fn set_bad(&mut self) {
        self.is_bad = true;
    }

    /// Recompute the mean viewing direction from the observing camera centers.
    pub fn update_normal<'a>(&mut self, camera_centers: impl Iterator<Item = &'a Vector3<f64>>) {
        let mut normal_sum = Vector3::zeros();
        for center in camera_centers {
            let dir = self.position - center;
            let dist = dir.norm();
            if dist > 1e-10 {
                normal_sum += dir / dist;
            }
        }

        let norm = normal_sum.norm();
        if norm > 1e-10 {
            self.normal = normal_sum / norm;
        }
    }
}

impl CloudPoint for FeatureCloudPoint {
    type Id = MapPointId;

    fn id(&self) -> MapPointId {
        self.id
    }
}

impl std::fmt::Debug for FeatureCloudPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCloudPoint")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("observations", &self.observations.len())
            .field("visible_count", &self.visible_count)
            .field("found_count", &self.found_count)
            .field("is_bad", &self.is_bad)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_point() -> FeatureCloudPoint {
        FeatureCloudPoint::new(
            MapPointId::new(1),
            Vector3::new(1.0, 2.0, 3.0),
            [0u8; 32],
            KeyFrameId::new(0),
        )
    }

    #[test]
    fn test_add_remove_observation() {
        let mut mp = create_test_point();

        mp.add_observation(KeyFrameId::new(1), 5);
        mp.add_observation(KeyFrameId::new(2), 10);

        assert_eq!(mp.num_observations(), 2);
        assert_eq!(mp.observations.get(&KeyFrameId::new(1)), Some(&5));

        assert!(mp.erase_observation(KeyFrameId::new(1)));
        assert_eq!(mp.num_observations(), 1);
        assert!(!mp.erase_observation(KeyFrameId::new(1)));
    }

    #[test]
    fn test_found_ratio() {
        let mut mp = create_test_point();
        assert_eq!(mp.found_ratio(), 1.0);

        mp.increase_visible();
        mp.increase_visible();
        mp.increase_visible();
        mp.increase_found();
        mp.increase_found();
        assert_relative_eq!(mp.found_ratio(), 2.0 / 3.0);
    }

    #[test]
    fn test_should_cull() {
        let mut mp = create_test_point();

        mp.add_observation(KeyFrameId::new(1), 0);
        mp.add_observation(KeyFrameId::new(2), 0);
        assert!(mp.should_cull(0.25, 3));

        mp.add_observation(KeyFrameId::new(3), 0);
        assert!(!mp.should_cull(0.25, 3));

        mp.visible_count = 100;
        mp.found_count = 10;
        assert!(mp.should_cull(0.25, 3));

        mp.found_count = 30;
        assert!(!mp.should_cull(0.25, 3));

        mp.set_bad();
        assert!(mp.should_cull(0.0, 0));
    }

    #[test]
    fn test_update_normal() {
        let mut mp = create_test_point();
        mp.position = Vector3::new(0.0, 0.0, 5.0);

        let centers = [Vector3::new(-1.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)];
        mp.update_normal(centers.iter());

        assert_relative_eq!(mp.normal, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }
}
