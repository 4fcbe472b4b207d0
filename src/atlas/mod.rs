//! Atlas module - the shared sparse map and its stores.
//!
//! - [`SparseMap`] - composite map, one lock per store, canonical lock order
//! - [`PointCloud`] of [`FeatureCloudPoint`] - 3D landmarks with observations
//! - [`KeyframeCollection`] of [`Keyframe`] - poses, features, associations
//! - [`CovisibilityGraph`] - keyframes weighted by shared observations
//! - [`KeyframeRetrieval`] - bag-of-words index for place recognition
//! - [`Identification`] - uuid, provenance and extent of a map
//!
//! # Architecture
//!
//! The map forms a bipartite graph:
//! - keyframes observe points (KF → MP via `map_point_ids`)
//! - points track their observers (MP → KF via `observations`)
//!
//! Stores only refer to each other by id; [`SparseMap`] keeps those
//! references consistent.

pub mod covisibility;
pub mod identification;
pub mod keyframe;
pub mod keyframe_collection;
pub mod keyframe_db;
pub mod map;
pub mod map_point;
pub mod persistence;
pub mod point_cloud;
pub mod sparse_map;
pub mod store;
pub mod types;

pub use covisibility::CovisibilityGraph;
pub use identification::Identification;
pub use keyframe::Keyframe;
pub use keyframe_collection::KeyframeCollection;
pub use keyframe_db::{BowVector, Candidate, KeyframeRetrieval};
pub use map::{Map, MapPersistence};
pub use map_point::FeatureCloudPoint;
pub use point_cloud::{CloudPoint, PointCloud};
pub use sparse_map::{
    FeaturePointCloud, MapSnapshot, MapStats, MapTransaction, SparseMap, TransactionBuilder,
};
pub use store::{Store, StoreGuard, StoreKind};
pub use types::{Descriptor, KeyFrameId, MapPointId};
