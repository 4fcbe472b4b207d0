//! KeyframeRetrieval - lightweight place recognition index.
//!
//! Full systems back this with a trained visual vocabulary and an inverted
//! index. Here words are derived directly from the leading descriptor bits,
//! which is enough to rank keyframes by appearance similarity:
//! - add / erase keyframes with their BoW vector
//! - retrieve candidate keyframes given a query BoW vector

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Descriptor, KeyFrameId};

/// Bag-of-Words vector: word_id -> weight.
pub type BowVector = BTreeMap<u32, f64>;

/// Candidate keyframe with similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub keyframe_id: KeyFrameId,
    pub score: f64,
}

/// Build an L1-normalized BoW vector. The word of a descriptor is its
/// first 16 bits.
pub fn bow_from_descriptors(descriptors: &[Descriptor]) -> BowVector {
    let mut bow = BowVector::new();
    if descriptors.is_empty() {
        return bow;
    }
    for d in descriptors {
        let word = u16::from_le_bytes([d[0], d[1]]) as u32;
        *bow.entry(word).or_insert(0.0) += 1.0;
    }
    let total = descriptors.len() as f64;
    for w in bow.values_mut() {
        *w /= total;
    }
    bow
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframeRetrieval {
    entries: BTreeMap<KeyFrameId, BowVector>,
}

impl KeyframeRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a keyframe entry.
    pub fn add(&mut self, kf_id: KeyFrameId, bow: BowVector) {
        self.entries.insert(kf_id, bow);
    }

    /// Remove a keyframe. Returns true if it was indexed.
    pub fn erase(&mut self, kf_id: KeyFrameId) -> bool {
        self.entries.remove(&kf_id).is_some()
    }

    pub fn contains(&self, kf_id: KeyFrameId) -> bool {
        self.entries.contains_key(&kf_id)
    }

    pub fn get(&self, kf_id: KeyFrameId) -> Option<&BowVector> {
        self.entries.get(&kf_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = KeyFrameId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Detect candidate keyframes similar to the provided BoW vector.
    ///
    /// Scores are dot products between BoW vectors. Keyframes in `exclude`
    /// are skipped. Results are sorted by decreasing score.
    pub fn detect_candidates(
        &self,
        query: &BowVector,
        exclude: &[KeyFrameId],
        max_results: usize,
    ) -> Vec<Candidate> {
        let mut cands = Vec::new();

        for (kf_id, bow) in &self.entries {
            if exclude.contains(kf_id) {
                continue;
            }

            let mut score = 0.0;
            for (word_id, weight) in query {
                if let Some(other_w) = bow.get(word_id) {
                    score += weight * other_w;
                }
            }

            if score > 0.0 {
                cands.push(Candidate {
                    keyframe_id: *kf_id,
                    score,
                });
            }
        }

        cands.sort_by(|a, b| b.score.total_cmp(&a.score));
        cands.truncate(max_results);
        cands
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn desc(word: u16) -> Descriptor {
        let mut d = [0u8; 32];
        d[..2].copy_from_slice(&word.to_le_bytes());
        d
    }

    #[test]
    fn test_bow_is_normalized() {
        let bow = bow_from_descriptors(&[desc(1), desc(1), desc(2), desc(3)]);
        assert_relative_eq!(bow.values().sum::<f64>(), 1.0);
        assert_relative_eq!(bow[&1], 0.5);
        assert!(bow_from_descriptors(&[]).is_empty());
    }

    #[test]
    fn test_detect_candidates_ranking() {
        let mut db = KeyframeRetrieval::new();
        db.add(KeyFrameId::new(1), bow_from_descriptors(&[desc(1), desc(2)]));
        db.add(KeyFrameId::new(2), bow_from_descriptors(&[desc(1), desc(1)]));
        db.add(KeyFrameId::new(3), bow_from_descriptors(&[desc(9)]));

        let query = bow_from_descriptors(&[desc(1)]);
        let cands = db.detect_candidates(&query, &[], 10);
        let ids: Vec<_> = cands.iter().map(|c| c.keyframe_id.0).collect();
        assert_eq!(ids, vec![2, 1]);

        let cands = db.detect_candidates(&query, &[KeyFrameId::new(2)], 10);
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].keyframe_id, KeyFrameId::new(1));
    }

    #[test]
    fn test_erase() {
        let mut db = KeyframeRetrieval::new();
        db.add(KeyFrameId::new(1), BowVector::new());
        assert!(db.erase(KeyFrameId::new(1)));
        assert!(!db.erase(KeyFrameId::new(1)));
        assert!(db.is_empty());
    }
}
