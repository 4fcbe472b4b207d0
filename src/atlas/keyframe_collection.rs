//! Id-keyed keyframe store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::keyframe::Keyframe;
use super::types::KeyFrameId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframeCollection {
    keyframes: BTreeMap<KeyFrameId, Keyframe>,
}

impl KeyframeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a keyframe. Hands it back if the id is already taken.
    pub fn insert(&mut self, kf: Keyframe) -> Result<(), Keyframe> {
        if self.keyframes.contains_key(&kf.id) {
            return Err(kf);
        }
        self.keyframes.insert(kf.id, kf);
        Ok(())
    }

    pub fn get(&self, id: KeyFrameId) -> Option<&Keyframe> {
        self.keyframes.get(&id)
    }

    pub fn get_mut(&mut self, id: KeyFrameId) -> Option<&mut Keyframe> {
        self.keyframes.get_mut(&id)
    }

    pub fn contains(&self, id: KeyFrameId) -> bool {
        self.keyframes.contains_key(&id)
    }

    pub fn remove(&mut self, id: KeyFrameId) -> Option<Keyframe> {
        self.keyframes.remove(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = KeyFrameId> + '_ {
        self.keyframes.keys().copied()
    }

    /// Keyframes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Keyframe> {
        self.keyframes.values()
    }

    /// `(key, keyframe)` pairs as stored. The key equals `keyframe.id` for
    /// every keyframe inserted through [`KeyframeCollection::insert`].
    pub fn entries(&self) -> impl Iterator<Item = (KeyFrameId, &Keyframe)> {
        self.keyframes.iter().map(|(id, kf)| (*id, kf))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Keyframe> {
        self.keyframes.values_mut()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Most recently created keyframe (highest id).
    pub fn last(&self) -> Option<&Keyframe> {
        self.keyframes.values().next_back()
    }

    /// Keyframes sorted by timestamp.
    pub fn temporal_order(&self) -> Vec<&Keyframe> {
        let mut kfs: Vec<_> = self.keyframes.values().collect();
        kfs.sort_by_key(|kf| kf.timestamp_ns);
        kfs
    }

    pub fn clear(&mut self) {
        self.keyframes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;

    fn kf(id: u64, ts: u64) -> Keyframe {
        Keyframe::new(KeyFrameId::new(id), ts, SE3::identity(), vec![], vec![])
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut kfs = KeyframeCollection::new();
        assert!(kfs.insert(kf(1, 10)).is_ok());
        assert!(kfs.insert(kf(2, 5)).is_ok());
        assert!(kfs.insert(kf(1, 99)).is_err());

        assert_eq!(kfs.len(), 2);
        assert_eq!(kfs.get(KeyFrameId::new(1)).map(|k| k.timestamp_ns), Some(10));
        assert_eq!(kfs.last().map(|k| k.id), Some(KeyFrameId::new(2)));

        let order: Vec<_> = kfs.temporal_order().iter().map(|k| k.id.0).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_remove() {
        let mut kfs = KeyframeCollection::new();
        kfs.insert(kf(3, 0)).unwrap();
        assert!(kfs.remove(KeyFrameId::new(3)).is_some());
        assert!(kfs.is_empty());
        assert!(kfs.remove(KeyFrameId::new(3)).is_none());
    }
}
