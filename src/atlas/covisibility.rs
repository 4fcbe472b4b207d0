//! Covisibility graph.
//!
//! Undirected graph over keyframes. The weight of an edge is the number of
//! map points both keyframes observe. Adjacency is stored on both endpoints
//! so neighbour queries never scan the whole graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::KeyFrameId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CovisibilityGraph {
    adjacency: BTreeMap<KeyFrameId, BTreeMap<KeyFrameId, u32>>,
}

impl CovisibilityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a keyframe with no edges. No-op if already present.
    pub fn add_node(&mut self, id: KeyFrameId) {
        self.adjacency.entry(id).or_default();
    }

    pub fn contains_node(&self, id: KeyFrameId) -> bool {
        self.adjacency.contains_key(&id)
    }

    /// Set the weight of the edge `a`-`b`. Self-edges are ignored.
    pub fn add_edge(&mut self, a: KeyFrameId, b: KeyFrameId, weight: u32) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b, weight);
        self.adjacency.entry(b).or_default().insert(a, weight);
    }

    /// Add `by` to the weight of `a`-`b`, creating the edge if needed.
    pub fn increase(&mut self, a: KeyFrameId, b: KeyFrameId, by: u32) {
        if a == b || by == 0 {
            return;
        }
        let w = self.weight(a, b).saturating_add(by);
        self.add_edge(a, b, w);
    }

    /// Subtract `by` from the weight of `a`-`b`. The edge disappears when its
    /// weight reaches zero; both nodes stay registered.
    pub fn decrease(&mut self, a: KeyFrameId, b: KeyFrameId, by: u32) {
        if a == b {
            return;
        }
        let w = self.weight(a, b).saturating_sub(by);
        if w == 0 {
            self.remove_edge(a, b);
        } else {
            self.add_edge(a, b, w);
        }
    }

    pub fn remove_edge(&mut self, a: KeyFrameId, b: KeyFrameId) {
        if let Some(n) = self.adjacency.get_mut(&a) {
            n.remove(&b);
        }
        if let Some(n) = self.adjacency.get_mut(&b) {
            n.remove(&a);
        }
    }

    /// Weight of `a`-`b`, 0 when not connected.
    pub fn weight(&self, a: KeyFrameId, b: KeyFrameId) -> u32 {
        self.adjacency
            .get(&a)
            .and_then(|n| n.get(&b))
            .copied()
            .unwrap_or(0)
    }

    pub fn neighbors(&self, id: KeyFrameId) -> impl Iterator<Item = (KeyFrameId, u32)> + '_ {
        self.adjacency
            .get(&id)
            .into_iter()
            .flat_map(|n| n.iter().map(|(k, w)| (*k, *w)))
    }

    /// The `n` neighbours sharing the most points, best first. Ties go to the lower id.
    pub fn best_neighbors(&self, id: KeyFrameId, n: usize) -> Vec<KeyFrameId> {
        let mut ordered: Vec<_> = self.neighbors(id).collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ordered.into_iter().take(n).map(|(k, _)| k).collect()
    }

    /// Neighbours with at least `min_weight` shared points.
    pub fn neighbors_above_weight(&self, id: KeyFrameId, min_weight: u32) -> Vec<KeyFrameId> {
        self.neighbors(id)
            .filter(|(_, w)| *w >= min_weight)
            .map(|(k, _)| k)
            .collect()
    }

    /// Remove a keyframe and every edge touching it.
    pub fn remove_node(&mut self, id: KeyFrameId) -> bool {
        let Some(neighbors) = self.adjacency.remove(&id) else {
            return false;
        };
        for other in neighbors.keys() {
            if let Some(n) = self.adjacency.get_mut(other) {
                n.remove(&id);
            }
        }
        true
    }

    /// Every keyframe id mentioned by the graph, as node or as edge endpoint.
    pub fn referenced_ids(&self) -> impl Iterator<Item = KeyFrameId> + '_ {
        self.adjacency
            .iter()
            .flat_map(|(k, n)| std::iter::once(*k).chain(n.keys().copied()))
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    pub fn num_edges(&self) -> usize {
        self.adjacency.values().map(|n| n.len()).sum::<usize>() / 2
    }

    /// Whether every edge is stored with the same weight on both endpoints.
    pub fn is_symmetric(&self) -> bool {
        self.adjacency.iter().all(|(a, n)| {
            n.iter().all(|(b, w)| {
                self.adjacency
                    .get(b)
                    .and_then(|m| m.get(a))
                    .is_some_and(|w2| w2 == w)
            })
        })
    }

    pub fn clear(&mut self) {
        self.adjacency.clear();
    }
}
