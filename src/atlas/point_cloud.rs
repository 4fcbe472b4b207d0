//! Generic unordered point container.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Payload stored in a [`PointCloud`]. Two points are the same logical point
/// when their ids are equal.
pub trait CloudPoint {
    type Id: Copy + Ord + Debug;

    fn id(&self) -> Self::Id;
}

/// Unordered collection of points with no duplicate ids.
///
/// Lookups by id go through an id -> position index. [`PointCloud::insert`]
/// refuses duplicates. [`PointCloud::points_mut`] hands out the raw vector
/// and can break that guarantee; the map's invariant check reports it
/// through [`PointCloud::duplicate_ids`]. After the raw vector was handed
/// out, lookups scan until the next mutating call rebuilds the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloud<T: CloudPoint> {
    points: Vec<T>,
    #[serde(skip, default = "BTreeMap::new")]
    index: BTreeMap<T::Id, usize>,
    #[serde(skip, default = "stale")]
    index_stale: bool,
}

fn stale() -> bool {
    true
}

impl<T: CloudPoint> PointCloud<T> {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            index: BTreeMap::new(),
            index_stale: false,
        }
    }

    pub fn points(&self) -> &[T] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut Vec<T> {
        self.index_stale = true;
        &mut self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.points.iter()
    }

    fn position(&self, id: T::Id) -> Option<usize> {
        if self.index_stale {
            self.points.iter().position(|p| p.id() == id)
        } else {
            self.index.get(&id).copied()
        }
    }

    /// Rebuild the id index from the point vector. With duplicate ids the
    /// first occurrence wins.
    pub fn reindex(&mut self) {
        self.index.clear();
        for (i, p) in self.points.iter().enumerate() {
            self.index.entry(p.id()).or_insert(i);
        }
        self.index_stale = false;
    }

    /// Rebuild the index only if raw edits left it stale.
    pub(crate) fn fresh_index(&mut self) {
        if self.index_stale {
            self.reindex();
        }
    }

    pub fn get(&self, id: T::Id) -> Option<&T> {
        self.position(id).map(|i| &self.points[i])
    }

    pub fn get_mut(&mut self, id: T::Id) -> Option<&mut T> {
        self.fresh_index();
        let i = self.position(id)?;
        self.points.get_mut(i)
    }

    pub fn contains(&self, id: T::Id) -> bool {
        self.position(id).is_some()
    }

    /// Insert a point. Hands the point back if its id is already present.
    pub fn insert(&mut self, point: T) -> Result<(), T> {
        self.fresh_index();
        if self.index.contains_key(&point.id()) {
            return Err(point);
        }
        self.index.insert(point.id(), self.points.len());
        self.points.push(point);
        Ok(())
    }

    /// Insert every point whose id is not present yet. Returns how many were added.
    pub fn extend_unique(&mut self, points: impl IntoIterator<Item = T>) -> usize {
        let before = self.points.len();
        for p in points {
            // Duplicates are skipped.
            let _ = self.insert(p);
        }
        self.points.len() - before
    }

    pub fn remove(&mut self, id: T::Id) -> Option<T> {
        self.fresh_index();
        let idx = self.index.remove(&id)?;
        let removed = self.points.swap_remove(idx);
        if let Some(moved) = self.points.get(idx) {
            self.index.insert(moved.id(), idx);
        }
        Some(removed)
    }

    pub fn ids(&self) -> impl Iterator<Item = T::Id> + '_ {
        self.points.iter().map(|p| p.id())
    }

    /// Ids that occur more than once.
    pub fn duplicate_ids(&self) -> Vec<T::Id> {
        let mut seen = BTreeSet::new();
        let mut dups = BTreeSet::new();
        for id in self.ids() {
            if !seen.insert(id) {
                dups.insert(id);
            }
        }
        dups.into_iter().collect()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.index.clear();
        self.index_stale = false;
    }
}

impl<T: CloudPoint> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CloudPoint + PartialEq> PartialEq for PointCloud<T> {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
    }
}

impl<T: CloudPoint> FromIterator<T> for PointCloud<T> {
    /// Collects with [`PointCloud::extend_unique`] semantics: later duplicates are dropped.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut cloud = Self::new();
        cloud.extend_unique(iter);
        cloud
    }
}
