//! Core ID types for the map stores.

use serde::{Deserialize, Serialize};

/// Unique identifier for a KeyFrame within a map.
///
/// KeyFrameIds are handed out by [`SparseMap::allocate_keyframe_id`] and serve
/// as lightweight handles for cross-referencing between stores, so no store
/// ever holds a pointer into another.
///
/// [`SparseMap::allocate_keyframe_id`]: crate::atlas::SparseMap::allocate_keyframe_id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyFrameId(pub u64);

impl KeyFrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for KeyFrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KF{}", self.0)
    }
}

/// Binary feature descriptor (256-bit, ORB layout).
pub type Descriptor = [u8; 32];

/// Unique identifier for a map point (3D landmark) within a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MapPointId(pub u64);

impl MapPointId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MapPointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MP{}", self.0)
    }
}
