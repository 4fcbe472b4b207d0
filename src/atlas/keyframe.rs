//! Keyframe - A selected frame with its features and map associations.
//!
//! Keyframes store the detected keypoints and descriptors of a frame, the
//! camera pose, and for every feature an optional association with a map
//! point. Relationships between keyframes (covisibility, retrieval) live in
//! their own stores and reference keyframes only by id.

use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::SE3;

use super::types::{Descriptor, KeyFrameId, MapPointId};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Unique identifier for this keyframe.
    pub id: KeyFrameId,

    /// Timestamp in nanoseconds.
    pub timestamp_ns: u64,

    /// Pose: transform from camera to world (T_wc).
    /// To transform a point from camera to world: p_world = pose.transform_point(p_cam)
    pub pose: SE3,

    /// Detected keypoints in pixels.
    pub keypoints: Vec<Point2<f64>>,

    /// One descriptor per keypoint.
    pub descriptors: Vec<Descriptor>,

    /// Feature index -> map point association.
    /// `None` is either "never associated" or a pruned observation.
    pub map_point_ids: Vec<Option<MapPointId>>,
}

impl Keyframe {
    /// Create a keyframe with no map point associations.
    pub fn new(
        id: KeyFrameId,
        timestamp_ns: u64,
        pose: SE3,
        keypoints: Vec<Point2<f64>>,
        descriptors: Vec<Descriptor>,
    ) -> Self {
        let num_features = keypoints.len();
        Self {
            id,
            timestamp_ns,
            pose,
            keypoints,
            descriptors,
            map_point_ids: vec![None; num_features],
        }
    }

    /// Camera position in world frame.
    pub fn camera_center(&self) -> Vector3<f64> {
        self.pose.translation
    }

    /// World-to-camera transform (inverse of pose).
    pub fn pose_cw(&self) -> SE3 {
        self.pose.inverse()
    }

    pub fn get_map_point(&self, feature_idx: usize) -> Option<MapPointId> {
        self.map_point_ids.get(feature_idx).copied().flatten()
    }

    /// Associate a feature with a map point.
    ///
    /// Returns the previous association, if there was one.
    pub fn set_map_point(&mut self, feature_idx: usize, mp_id: MapPointId) -> Option<MapPointId> {
        let slot = self.map_point_ids.get_mut(feature_idx)?;
        slot.replace(mp_id)
    }

    /// Remove the association for a feature (marks the observation pruned).
    pub fn erase_map_point(&mut self, feature_idx: usize) -> Option<MapPointId> {
        self.map_point_ids.get_mut(feature_idx)?.take()
    }

    /// Prune every slot referencing `mp_id`. Returns how many slots were cleared.
    pub fn erase_map_point_id(&mut self, mp_id: MapPointId) -> usize {
        let mut cleared = 0;
        for slot in self.map_point_ids.iter_mut() {
            if *slot == Some(mp_id) {
                *slot = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// All associated map point ids with their feature indices.
    pub fn map_point_indices(&self) -> impl Iterator<Item = (usize, MapPointId)> + '_ {
        self.map_point_ids
            .iter()
            .enumerate()
            .filter_map(|(idx, mp)| mp.map(|id| (idx, id)))
    }

    pub fn num_map_points(&self) -> usize {
        self.map_point_ids.iter().filter(|mp| mp.is_some()).count()
    }

    pub fn num_features(&self) -> usize {
        self.keypoints.len()
    }
}

impl std::fmt::Debug for Keyframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyframe")
            .field("id", &self.id)
            .field("timestamp_ns", &self.timestamp_ns)
            .field("num_features", &self.num_features())
            .field("num_map_points", &self.num_map_points())
            .finish()
    }
}
