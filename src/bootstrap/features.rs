//! Feature sets and brute-force binary descriptor matching.

use nalgebra::Point2;

use crate::atlas::Descriptor;
use crate::config::MatcherConfig;

use super::frame::Frame;

/// Keypoints (pixels) and their 256-bit descriptors, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    pub keypoints: Vec<Point2<f64>>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn new(keypoints: Vec<Point2<f64>>, descriptors: Vec<Descriptor>) -> Self {
        debug_assert_eq!(keypoints.len(), descriptors.len());
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detects keypoints and computes descriptors for a frame.
pub trait FeatureExtractor {
    fn extract(&mut self, frame: &Frame) -> anyhow::Result<Features>;
}

/// Hamming distance between two 256-bit descriptors.
pub fn descriptor_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Best and second-best distance from `query` into `train`.
fn best_two(query: &Descriptor, train: &[Descriptor]) -> Option<(usize, u32, u32)> {
    let mut best: Option<(usize, u32)> = None;
    let mut second = u32::MAX;
    for (j, d) in train.iter().enumerate() {
        let dist = descriptor_distance(query, d);
        match best {
            Some((_, b)) if dist >= b => second = second.min(dist),
            Some((_, b)) => {
                second = b;
                best = Some((j, dist));
            }
            None => best = Some((j, dist)),
        }
    }
    best.map(|(j, b)| (j, b, second))
}

/// Match reference descriptors against current descriptors.
///
/// Returns `(ref_idx, cur_idx)` pairs sorted by `ref_idx`. A pair survives
/// when its distance is within `max_distance`, it passes the ratio test and,
/// with `cross_check`, the current descriptor's best match is the same
/// reference descriptor.
pub fn match_descriptors(
    reference: &[Descriptor],
    current: &[Descriptor],
    config: &MatcherConfig,
) -> Vec<(usize, usize)> {
    let mut matches = Vec::new();
    if reference.is_empty() || current.is_empty() {
        return matches;
    }

    for (i, desc) in reference.iter().enumerate() {
        let Some((j, best, second)) = best_two(desc, current) else {
            continue;
        };
        if best > config.max_distance {
            continue;
        }
        if second != u32::MAX && best as f32 > config.nn_ratio * second as f32 {
            continue;
        }
        if config.cross_check {
            match best_two(&current[j], reference) {
                Some((back, _, _)) if back == i => {}
                _ => continue,
            }
        }
        matches.push((i, j));
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(fill: u8) -> Descriptor {
        [fill; 32]
    }

    fn with_bits(base: Descriptor, flips: usize) -> Descriptor {
        let mut d = base;
        for bit in 0..flips {
            d[bit / 8] ^= 1 << (bit % 8);
        }
        d
    }

    #[test]
    fn test_descriptor_distance() {
        assert_eq!(descriptor_distance(&desc(0), &desc(0)), 0);
        assert_eq!(descriptor_distance(&desc(0), &desc(0xFF)), 256);
        assert_eq!(descriptor_distance(&desc(0), &with_bits(desc(0), 13)), 13);
    }

    #[test]
    fn test_match_identical_sets() {
        let set = vec![desc(0x00), desc(0xFF), desc(0x0F)];
        let mut shuffled = set.clone();
        shuffled.reverse();

        let matches = match_descriptors(&set, &shuffled, &MatcherConfig::default());
        assert_eq!(matches, vec![(0, 2), (1, 1), (2, 0)]);
    }

    #[test]
    fn test_distance_threshold() {
        let reference = vec![desc(0)];
        let current = vec![with_bits(desc(0), 80)];

        assert!(match_descriptors(&reference, &current, &MatcherConfig::default()).is_empty());

        let loose = MatcherConfig {
            max_distance: 100,
            ..MatcherConfig::default()
        };
        assert_eq!(match_descriptors(&reference, &current, &loose), vec![(0, 0)]);
    }

    #[test]
    fn test_ratio_test_rejects_ambiguous() {
        let reference = vec![desc(0)];
        let current = vec![with_bits(desc(0), 10), with_bits(desc(0xFF), 245)];
        // distances 10 and 11: ambiguous
        assert!(match_descriptors(&reference, &current, &MatcherConfig::default()).is_empty());

        let no_ratio = MatcherConfig {
            nn_ratio: 1.0,
            ..MatcherConfig::default()
        };
        assert_eq!(match_descriptors(&reference, &current, &no_ratio), vec![(0, 0)]);
    }

    #[test]
    fn test_cross_check() {
        // Both reference descriptors prefer current[0]; only the closer one keeps it.
        let reference = vec![with_bits(desc(0), 2), with_bits(desc(0), 6)];
        let current = vec![desc(0), desc(0xFF)];
        let config = MatcherConfig {
            nn_ratio: 1.0,
            ..MatcherConfig::default()
        };
        assert_eq!(match_descriptors(&reference, &current, &config), vec![(0, 0)]);

        let unchecked = MatcherConfig {
            cross_check: false,
            ..config
        };
        assert_eq!(
            match_descriptors(&reference, &current, &unchecked),
            vec![(0, 0), (1, 0)]
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert!(match_descriptors(&[], &[desc(0)], &MatcherConfig::default()).is_empty());
        assert!(match_descriptors(&[desc(0)], &[], &MatcherConfig::default()).is_empty());
    }
}
