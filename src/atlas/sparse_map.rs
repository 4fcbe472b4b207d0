//! SparseMap - the shared, concurrently accessed map.
//!
//! The map owns four stores, each behind its own lock:
//! - the feature point cloud,
//! - the keyframe collection,
//! - the covisibility graph,
//! - the keyframe retrieval index,
//!
//! plus an [`Identification`] record behind a mutex.
//!
//! # Locking
//!
//! Single-store access goes through `lock_<store>` / `read_<store>`.
//! Anything that has to keep the stores mutually consistent goes through a
//! [`MapTransaction`], which always acquires in
//! [`StoreKind::CANONICAL_ORDER`] (point cloud, keyframes, covisibility,
//! retrieval) regardless of the order the caller asked for. Identification
//! is always locked last. Since every thread follows the same total order,
//! two threads can never wait on each other in a cycle.
//!
//! Composite operations validate everything first and mutate last, so a
//! failed operation leaves the stores untouched.
//!
//! # Cross-store invariants
//!
//! After every committed transaction:
//! 1. every keyframe referenced by a covisibility edge exists,
//! 2. every keyframe indexed for retrieval exists,
//! 3. every map point referenced by a keyframe exists in the point cloud,
//! 4. every keyframe referenced by a point observation exists, and the
//!    point cloud has no duplicate ids,
//! 5. keyframe slots and point observations mirror each other: slot `i` of
//!    keyframe `k` holds point `p` exactly when `p` records `k` at `i`,
//! 6. every keyframe is stored under its own id.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

use crate::error::{MapError, Result};
use crate::geometry::BoundingBox3;

use super::covisibility::CovisibilityGraph;
use super::identification::Identification;
use super::keyframe::Keyframe;
use super::keyframe_collection::KeyframeCollection;
use super::keyframe_db::{bow_from_descriptors, KeyframeRetrieval};
use super::map_point::FeatureCloudPoint;
use super::point_cloud::PointCloud;
use super::store::{Store, StoreGuard, StoreKind};
use super::types::{KeyFrameId, MapPointId};

pub type FeaturePointCloud = PointCloud<FeatureCloudPoint>;

/// Element counts of a map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    pub num_points: usize,
    pub num_keyframes: usize,
    pub num_covisibility_edges: usize,
    pub num_indexed_keyframes: usize,
}

pub struct SparseMap {
    point_cloud: Store<FeaturePointCloud>,
    keyframes: Store<KeyframeCollection>,
    covisibility_graph: Store<CovisibilityGraph>,
    keyframe_retrieval: Store<KeyframeRetrieval>,
    identification: Mutex<Identification>,
    next_kf_id: AtomicU64,
    next_mp_id: AtomicU64,
}

macro_rules! store_accessors {
    ($field:ident, $ty:ty, $const_fn:ident, $lock_fn:ident, $try_lock_fn:ident, $read_fn:ident, $set_fn:ident) => {
        /// Lock-free read. Needs exclusive access to the map, so it cannot
        /// be reached once the map is shared behind an `Arc`.
        pub fn $const_fn(&mut self) -> &$ty {
            self.$field.get_mut()
        }

        /// Block until the store's exclusive guard is free.
        pub fn $lock_fn(&self) -> StoreGuard<'_, $ty> {
            StoreGuard::new(self.$field.write(), &self.identification)
        }

        /// Like the blocking lock, but gives up after `timeout`.
        pub fn $try_lock_fn(&self, timeout: Duration) -> Result<StoreGuard<'_, $ty>> {
            Ok(StoreGuard::new(
                self.$field.try_write_for(timeout)?,
                &self.identification,
            ))
        }

        /// Shared read access.
        pub fn $read_fn(&self) -> RwLockReadGuard<'_, $ty> {
            self.$field.read()
        }

        /// Replace the store wholesale and return the previous value. Waits
        /// for any outstanding guard on this store to be released first.
        pub fn $set_fn(&self, value: $ty) -> $ty {
            let old = self.$field.replace(value);
            self.identification.lock().touch();
            old
        }
    };
}

impl SparseMap {
    /// Empty map with a fresh identification.
    pub fn new() -> Self {
        Self::with_identification(Identification::new())
    }

    pub fn with_identification(identification: Identification) -> Self {
        Self {
            point_cloud: Store::new(StoreKind::PointCloud, PointCloud::new()),
            keyframes: Store::new(StoreKind::Keyframes, KeyframeCollection::new()),
            covisibility_graph: Store::new(StoreKind::CovisibilityGraph, CovisibilityGraph::new()),
            keyframe_retrieval: Store::new(StoreKind::KeyframeRetrieval, KeyframeRetrieval::new()),
            identification: Mutex::new(identification),
            next_kf_id: AtomicU64::new(0),
            next_mp_id: AtomicU64::new(0),
        }
    }

    /// Assemble a map from its parts, rejecting parts that violate the
    /// cross-store invariants with [`MapError::CorruptMapData`].
    pub fn from_parts(
        identification: Identification,
        mut point_cloud: FeaturePointCloud,
        keyframes: KeyframeCollection,
        covisibility_graph: CovisibilityGraph,
        keyframe_retrieval: KeyframeRetrieval,
    ) -> Result<Self> {
        validate_stores(&point_cloud, &keyframes, &covisibility_graph, &keyframe_retrieval)?;
        point_cloud.reindex();

        let next_kf = keyframes.ids().map(|id| id.0 + 1).max().unwrap_or(0);
        let next_mp = point_cloud.ids().map(|id| id.0 + 1).max().unwrap_or(0);

        Ok(Self {
            point_cloud: Store::new(StoreKind::PointCloud, point_cloud),
            keyframes: Store::new(StoreKind::Keyframes, keyframes),
            covisibility_graph: Store::new(StoreKind::CovisibilityGraph, covisibility_graph),
            keyframe_retrieval: Store::new(StoreKind::KeyframeRetrieval, keyframe_retrieval),
            identification: Mutex::new(identification),
            next_kf_id: AtomicU64::new(next_kf),
            next_mp_id: AtomicU64::new(next_mp),
        })
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    store_accessors!(
        point_cloud,
        FeaturePointCloud,
        const_point_cloud,
        lock_point_cloud,
        try_lock_point_cloud_for,
        read_point_cloud,
        set_point_cloud
    );

    store_accessors!(
        keyframes,
        KeyframeCollection,
        const_keyframes,
        lock_keyframes,
        try_lock_keyframes_for,
        read_keyframes,
        set_keyframes
    );

    store_accessors!(
        covisibility_graph,
        CovisibilityGraph,
        const_covisibility_graph,
        lock_covisibility_graph,
        try_lock_covisibility_graph_for,
        read_covisibility_graph,
        set_covisibility_graph
    );

    store_accessors!(
        keyframe_retrieval,
        KeyframeRetrieval,
        const_keyframe_retrieval,
        lock_keyframe_retrieval,
        try_lock_keyframe_retrieval_for,
        read_keyframe_retrieval,
        set_keyframe_retrieval
    );

    // ─────────────────────────────────────────────────────────────────────────
    // Identification
    // ─────────────────────────────────────────────────────────────────────────

    /// Lock the identification record.
    ///
    /// Never acquire a store lock while holding this guard.
    pub fn identification(&self) -> MutexGuard<'_, Identification> {
        self.identification.lock()
    }

    pub fn set_identification(&self, identification: Identification) -> Identification {
        std::mem::replace(&mut *self.identification.lock(), identification)
    }

    /// Recompute the bounding box from the point cloud and store it in the
    /// identification record.
    pub fn refresh_bounding_box(&self) -> BoundingBox3 {
        let cloud = self.point_cloud.read();
        let bbox = BoundingBox3::from_points(cloud.iter().map(|p| &p.position));
        let mut ident = self.identification.lock();
        ident.set_bbox(bbox);
        ident.touch();
        bbox
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Id allocation
    // ─────────────────────────────────────────────────────────────────────────

    pub fn allocate_keyframe_id(&self) -> KeyFrameId {
        KeyFrameId(self.next_kf_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn allocate_map_point_id(&self) -> MapPointId {
        MapPointId(self.next_mp_id.fetch_add(1, Ordering::Relaxed))
    }

    fn reserve_keyframe_id(&self, id: KeyFrameId) {
        self.next_kf_id.fetch_max(id.0 + 1, Ordering::Relaxed);
    }

    fn reserve_map_point_id(&self, id: MapPointId) {
        self.next_mp_id.fetch_max(id.0 + 1, Ordering::Relaxed);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn transaction(&self) -> TransactionBuilder<'_> {
        TransactionBuilder {
            map: self,
            wanted: [false; 4],
            timeout: None,
        }
    }

    /// Exclusive access to all four stores, acquired in canonical order.
    pub fn lock_all(&self) -> MapTransaction<'_> {
        MapTransaction {
            map: self,
            point_cloud: Some(self.point_cloud.write()),
            keyframes: Some(self.keyframes.write()),
            covisibility_graph: Some(self.covisibility_graph.write()),
            keyframe_retrieval: Some(self.keyframe_retrieval.write()),
            modified: false,
        }
    }

    /// Read locks on all four stores, taken in canonical order.
    pub fn read_all(&self) -> MapSnapshot<'_> {
        MapSnapshot {
            point_cloud: self.point_cloud.read(),
            keyframes: self.keyframes.read(),
            covisibility_graph: self.covisibility_graph.read(),
            keyframe_retrieval: self.keyframe_retrieval.read(),
        }
    }

    /// Validate the cross-store invariants under read locks.
    pub fn check_invariants(&self) -> Result<()> {
        self.read_all().validate()
    }

    pub fn stats(&self) -> MapStats {
        self.read_all().stats()
    }
}

impl Default for SparseMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SparseMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SparseMap");
        if let Some(ident) = self.identification.try_lock() {
            s.field("uuid", &ident.uuid_string());
        }
        if let Some(cloud) = self.point_cloud.try_read() {
            s.field("points", &cloud.len());
        }
        if let Some(kfs) = self.keyframes.try_read() {
            s.field("keyframes", &kfs.len());
        }
        if let Some(graph) = self.covisibility_graph.try_read() {
            s.field("covisibility_edges", &graph.num_edges());
        }
        if let Some(db) = self.keyframe_retrieval.try_read() {
            s.field("indexed_keyframes", &db.len());
        }
        s.finish_non_exhaustive()
    }
}

/// Shared read access to all four stores.
pub struct MapSnapshot<'m> {
    pub point_cloud: RwLockReadGuard<'m, FeaturePointCloud>,
    pub keyframes: RwLockReadGuard<'m, KeyframeCollection>,
    pub covisibility_graph: RwLockReadGuard<'m, CovisibilityGraph>,
    pub keyframe_retrieval: RwLockReadGuard<'m, KeyframeRetrieval>,
}

impl MapSnapshot<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_stores(
            &self.point_cloud,
            &self.keyframes,
            &self.covisibility_graph,
            &self.keyframe_retrieval,
        )
    }

    pub fn stats(&self) -> MapStats {
        MapStats {
            num_points: self.point_cloud.len(),
            num_keyframes: self.keyframes.len(),
            num_covisibility_edges: self.covisibility_graph.num_edges(),
            num_indexed_keyframes: self.keyframe_retrieval.len(),
        }
    }
}

/// Selects which stores a [`MapTransaction`] holds.
pub struct TransactionBuilder<'m> {
    map: &'m SparseMap,
    wanted: [bool; 4],
    timeout: Option<Duration>,
}

impl<'m> TransactionBuilder<'m> {
    pub fn with(mut self, kind: StoreKind) -> Self {
        self.wanted[kind.rank()] = true;
        self
    }

    pub fn with_all(mut self) -> Self {
        self.wanted = [true; 4];
        self
    }

    /// Bound the total time spent acquiring locks.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Acquire the selected stores in canonical order.
    ///
    /// On timeout every lock acquired so far is released before
    /// [`MapError::LockContentionTimeout`] is returned.
    pub fn begin(self) -> Result<MapTransaction<'m>> {
        let map = self.map;
        let deadline = self.timeout.map(|t| (Instant::now() + t, t));

        let mut txn = MapTransaction {
            map,
            point_cloud: None,
            keyframes: None,
            covisibility_graph: None,
            keyframe_retrieval: None,
            modified: false,
        };

        for kind in StoreKind::CANONICAL_ORDER {
            if !self.wanted[kind.rank()] {
                continue;
            }
            trace!(store = %kind, "acquiring");
            match kind {
                StoreKind::PointCloud => {
                    txn.point_cloud = Some(acquire(&map.point_cloud, deadline)?);
                }
                StoreKind::Keyframes => {
                    txn.keyframes = Some(acquire(&map.keyframes, deadline)?);
                }
                StoreKind::CovisibilityGraph => {
                    txn.covisibility_graph = Some(acquire(&map.covisibility_graph, deadline)?);
                }
                StoreKind::KeyframeRetrieval => {
                    txn.keyframe_retrieval = Some(acquire(&map.keyframe_retrieval, deadline)?);
                }
            }
        }

        Ok(txn)
    }
}

fn acquire<T>(
    store: &Store<T>,
    deadline: Option<(Instant, Duration)>,
) -> Result<RwLockWriteGuard<'_, T>> {
    match deadline {
        None => Ok(store.write()),
        Some((at, total)) => {
            let remaining = at.saturating_duration_since(Instant::now());
            store.try_write_for(remaining).map_err(|_| MapError::LockContentionTimeout {
                store: store.kind(),
                waited: total,
            })
        }
    }
}

/// Exclusive access to a subset of the map's stores.
///
/// Dropping the transaction releases every lock; if anything was written,
/// the map's last update time is advanced.
pub struct MapTransaction<'m> {
    map: &'m SparseMap,
    point_cloud: Option<RwLockWriteGuard<'m, FeaturePointCloud>>,
    keyframes: Option<RwLockWriteGuard<'m, KeyframeCollection>>,
    covisibility_graph: Option<RwLockWriteGuard<'m, CovisibilityGraph>>,
    keyframe_retrieval: Option<RwLockWriteGuard<'m, KeyframeRetrieval>>,
    modified: bool,
}

impl fmt::Debug for MapTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held: Vec<StoreKind> = StoreKind::CANONICAL_ORDER
            .into_iter()
            .filter(|kind| self.holds(*kind))
            .collect();
        f.debug_struct("MapTransaction")
            .field("stores", &held)
            .field("modified", &self.modified)
            .finish()
    }
}

fn missing(op: &str, kind: StoreKind) -> MapError {
    MapError::PreconditionViolated(format!("{} requires the {} lock", op, kind))
}

impl<'m> MapTransaction<'m> {
    pub fn holds(&self, kind: StoreKind) -> bool {
        match kind {
            StoreKind::PointCloud => self.point_cloud.is_some(),
            StoreKind::Keyframes => self.keyframes.is_some(),
            StoreKind::CovisibilityGraph => self.covisibility_graph.is_some(),
            StoreKind::KeyframeRetrieval => self.keyframe_retrieval.is_some(),
        }
    }

    pub fn point_cloud(&self) -> Option<&FeaturePointCloud> {
        self.point_cloud.as_deref()
    }

    pub fn point_cloud_mut(&mut self) -> Option<&mut FeaturePointCloud> {
        self.modified |= self.point_cloud.is_some();
        self.point_cloud.as_deref_mut()
    }

    pub fn keyframes(&self) -> Option<&KeyframeCollection> {
        self.keyframes.as_deref()
    }

    pub fn keyframes_mut(&mut self) -> Option<&mut KeyframeCollection> {
        self.modified |= self.keyframes.is_some();
        self.keyframes.as_deref_mut()
    }

    pub fn covisibility_graph(&self) -> Option<&CovisibilityGraph> {
        self.covisibility_graph.as_deref()
    }

    pub fn covisibility_graph_mut(&mut self) -> Option<&mut CovisibilityGraph> {
        self.modified |= self.covisibility_graph.is_some();
        self.covisibility_graph.as_deref_mut()
    }

    pub fn keyframe_retrieval(&self) -> Option<&KeyframeRetrieval> {
        self.keyframe_retrieval.as_deref()
    }

    pub fn keyframe_retrieval_mut(&mut self) -> Option<&mut KeyframeRetrieval> {
        self.modified |= self.keyframe_retrieval.is_some();
        self.keyframe_retrieval.as_deref_mut()
    }

    /// Insert a keyframe together with the points it creates.
    ///
    /// Every associated feature of `keyframe` becomes an observation of its
    /// point, covisibility weights with every other observer are increased
    /// and the keyframe is indexed for retrieval. Needs all four stores.
    ///
    /// Fails without touching the map when the keyframe id is taken, a new
    /// point id is taken or repeated, a referenced point does not exist, a
    /// point is referenced by two features, a new point is not observed
    /// by the keyframe, or a new point already lists another observer.
    pub fn insert_keyframe(
        &mut self,
        keyframe: Keyframe,
        new_points: Vec<FeatureCloudPoint>,
    ) -> Result<()> {
        const OP: &str = "insert_keyframe";
        let map = self.map;
        let cloud = self
            .point_cloud
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::PointCloud))?;
        let kfs = self
            .keyframes
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::Keyframes))?;
        let graph = self
            .covisibility_graph
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::CovisibilityGraph))?;
        let db = self
            .keyframe_retrieval
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::KeyframeRetrieval))?;

        // Validate
        cloud.fresh_index();
        let kf_id = keyframe.id;
        if kfs.contains(kf_id) {
            return Err(MapError::DuplicateKeyframe(kf_id));
        }

        let mut new_ids = BTreeSet::new();
        for p in &new_points {
            if cloud.contains(p.id) || !new_ids.insert(p.id) {
                return Err(MapError::DuplicateMapPoint(p.id));
            }
            // A new point only gets observations from the keyframe creating it.
            if let Some(other) = p.observations.keys().find(|k| **k != kf_id) {
                return Err(MapError::PreconditionViolated(format!(
                    "new point {} already carries an observation from {}",
                    p.id, other
                )));
            }
        }

        let mut referenced = BTreeSet::new();
        for (_, mp_id) in keyframe.map_point_indices() {
            if !cloud.contains(mp_id) && !new_ids.contains(&mp_id) {
                return Err(MapError::UnknownMapPoint(mp_id));
            }
            if !referenced.insert(mp_id) {
                return Err(MapError::PreconditionViolated(format!(
                    "{} is associated with more than one feature of {}",
                    mp_id, kf_id
                )));
            }
        }
        if let Some(orphan) = new_ids.iter().find(|id| !referenced.contains(*id)) {
            return Err(MapError::PreconditionViolated(format!(
                "new point {} is not observed by {}",
                orphan, kf_id
            )));
        }

        // Mutate
        let num_new = new_points.len();
        for p in new_points {
            map.reserve_map_point_id(p.id);
            cloud
                .insert(p)
                .map_err(|p| MapError::DuplicateMapPoint(p.id))?;
        }

        let center = keyframe.camera_center();
        let mut shared: BTreeMap<KeyFrameId, u32> = BTreeMap::new();
        for (idx, mp_id) in keyframe.map_point_indices() {
            let Some(point) = cloud.get_mut(mp_id) else {
                continue;
            };
            for other in point.observations.keys().filter(|k| **k != kf_id) {
                *shared.entry(*other).or_insert(0) += 1;
            }
            point.add_observation(kf_id, idx);
            let centers: Vec<_> = point
                .observations
                .keys()
                .filter_map(|k| {
                    if *k == kf_id {
                        Some(center)
                    } else {
                        kfs.get(*k).map(|kf| kf.camera_center())
                    }
                })
                .collect();
            point.update_normal(centers.iter());
        }

        graph.add_node(kf_id);
        for (other, weight) in &shared {
            graph.increase(kf_id, *other, *weight);
        }
        db.add(kf_id, bow_from_descriptors(&keyframe.descriptors));

        map.reserve_keyframe_id(kf_id);
        let num_assoc = keyframe.num_map_points();
        kfs.insert(keyframe).map_err(|kf| MapError::DuplicateKeyframe(kf.id))?;
        self.modified = true;

        debug!(
            "Inserted {} ({} associations, {} new points, {} covisible)",
            kf_id,
            num_assoc,
            num_new,
            shared.len()
        );
        Ok(())
    }

    /// Remove a keyframe from every store.
    ///
    /// Points left without any observer are pruned from the cloud.
    /// Needs all four stores.
    pub fn remove_keyframe(&mut self, kf_id: KeyFrameId) -> Result<Keyframe> {
        const OP: &str = "remove_keyframe";
        let cloud = self
            .point_cloud
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::PointCloud))?;
        let kfs = self
            .keyframes
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::Keyframes))?;
        let graph = self
            .covisibility_graph
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::CovisibilityGraph))?;
        let db = self
            .keyframe_retrieval
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::KeyframeRetrieval))?;

        let kf = kfs.remove(kf_id).ok_or(MapError::UnknownKeyframe(kf_id))?;
        db.erase(kf_id);
        graph.remove_node(kf_id);

        let mut orphaned = Vec::new();
        for (_, mp_id) in kf.map_point_indices() {
            let Some(point) = cloud.get_mut(mp_id) else {
                continue;
            };
            if point.erase_observation(kf_id) && point.observations.is_empty() {
                orphaned.push(mp_id);
            }
        }
        for mp_id in &orphaned {
            cloud.remove(*mp_id);
        }
        self.modified = true;

        debug!("Removed {} (pruned {} orphaned points)", kf_id, orphaned.len());
        Ok(kf)
    }

    /// Remove a point, mark every keyframe slot referencing it as pruned and
    /// decrease covisibility between its observers. Needs the point cloud,
    /// keyframe and covisibility stores.
    pub fn remove_map_point(&mut self, mp_id: MapPointId) -> Result<FeatureCloudPoint> {
        const OP: &str = "remove_map_point";
        let cloud = self
            .point_cloud
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::PointCloud))?;
        let kfs = self
            .keyframes
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::Keyframes))?;
        let graph = self
            .covisibility_graph
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::CovisibilityGraph))?;

        let point = remove_point_from(cloud, kfs, graph, mp_id)?;
        self.modified = true;
        Ok(point)
    }

    /// Remove every point that [`FeatureCloudPoint::should_cull`] flags.
    /// Returns the number of culled points.
    pub fn cull_map_points(&mut self, min_found_ratio: f64, min_observations: usize) -> Result<usize> {
        const OP: &str = "cull_map_points";
        let cloud = self
            .point_cloud
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::PointCloud))?;
        let kfs = self
            .keyframes
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::Keyframes))?;
        let graph = self
            .covisibility_graph
            .as_deref_mut()
            .ok_or_else(|| missing(OP, StoreKind::CovisibilityGraph))?;

        let to_cull: Vec<MapPointId> = cloud
            .iter()
            .filter(|mp| mp.should_cull(min_found_ratio, min_observations))
            .map(|mp| mp.id)
            .collect();

        for mp_id in &to_cull {
            remove_point_from(cloud, kfs, graph, *mp_id)?;
        }
        if !to_cull.is_empty() {
            self.modified = true;
            debug!("Culled {} map points", to_cull.len());
        }
        Ok(to_cull.len())
    }

    /// Validate the cross-store invariants. Needs all four stores.
    pub fn validate(&self) -> Result<()> {
        const OP: &str = "validate";
        validate_stores(
            self.point_cloud().ok_or_else(|| missing(OP, StoreKind::PointCloud))?,
            self.keyframes().ok_or_else(|| missing(OP, StoreKind::Keyframes))?,
            self.covisibility_graph()
                .ok_or_else(|| missing(OP, StoreKind::CovisibilityGraph))?,
            self.keyframe_retrieval()
                .ok_or_else(|| missing(OP, StoreKind::KeyframeRetrieval))?,
        )
    }
}

impl Drop for MapTransaction<'_> {
    fn drop(&mut self) {
        if self.modified {
            self.map.identification.lock().touch();
        }
    }
}

fn remove_point_from(
    cloud: &mut FeaturePointCloud,
    kfs: &mut KeyframeCollection,
    graph: &mut CovisibilityGraph,
    mp_id: MapPointId,
) -> Result<FeatureCloudPoint> {
    let point = cloud.remove(mp_id).ok_or(MapError::UnknownMapPoint(mp_id))?;

    let observers: Vec<KeyFrameId> = point.observations.keys().copied().collect();
    for kf_id in &observers {
        if let Some(kf) = kfs.get_mut(*kf_id) {
            kf.erase_map_point_id(mp_id);
        }
    }
    for (i, a) in observers.iter().enumerate() {
        for b in &observers[i + 1..] {
            graph.decrease(*a, *b, 1);
        }
    }

    trace!("Removed {} ({} observers)", mp_id, observers.len());
    Ok(point)
}

/// Check the cross-store invariants over borrowed stores.
pub fn validate_stores(
    cloud: &FeaturePointCloud,
    keyframes: &KeyframeCollection,
    graph: &CovisibilityGraph,
    retrieval: &KeyframeRetrieval,
) -> Result<()> {
    let mut points: BTreeMap<MapPointId, &FeatureCloudPoint> = BTreeMap::new();
    for point in cloud.iter() {
        if points.insert(point.id, point).is_some() {
            return Err(MapError::CorruptMapData(format!(
                "point cloud contains {} more than once",
                point.id
            )));
        }
    }

    if let Some((key, kf)) = keyframes.entries().find(|(key, kf)| *key != kf.id) {
        return Err(MapError::CorruptMapData(format!(
            "keyframe {} is stored under {}",
            kf.id, key
        )));
    }

    if let Some(id) = graph.referenced_ids().find(|id| !keyframes.contains(*id)) {
        return Err(MapError::CorruptMapData(format!(
            "covisibility graph references missing keyframe {}",
            id
        )));
    }
    if !graph.is_symmetric() {
        return Err(MapError::CorruptMapData(
            "covisibility graph is not symmetric".to_string(),
        ));
    }

    if let Some(id) = retrieval.ids().find(|id| !keyframes.contains(*id)) {
        return Err(MapError::CorruptMapData(format!(
            "retrieval index references missing keyframe {}",
            id
        )));
    }

    for kf in keyframes.iter() {
        if kf.map_point_ids.len() != kf.keypoints.len() {
            return Err(MapError::CorruptMapData(format!(
                "{} has {} association slots for {} keypoints",
                kf.id,
                kf.map_point_ids.len(),
                kf.keypoints.len()
            )));
        }
        for (idx, mp_id) in kf.map_point_indices() {
            let Some(point) = points.get(&mp_id) else {
                return Err(MapError::CorruptMapData(format!(
                    "{} references missing map point {}",
                    kf.id, mp_id
                )));
            };
            if point.observations.get(&kf.id) != Some(&idx) {
                return Err(MapError::CorruptMapData(format!(
                    "{} references {} at feature {} but the point does not record it",
                    kf.id, mp_id, idx
                )));
            }
        }
    }

    for point in points.values() {
        for (kf_id, idx) in &point.observations {
            let Some(kf) = keyframes.get(*kf_id) else {
                return Err(MapError::CorruptMapData(format!(
                    "{} is observed by missing keyframe {}",
                    point.id, kf_id
                )));
            };
            if kf.get_map_point(*idx) != Some(point.id) {
                return Err(MapError::CorruptMapData(format!(
                    "{} records {} at feature {} but the keyframe slot disagrees",
                    point.id, kf_id, idx
                )));
            }
        }
    }

    Ok(())
}
