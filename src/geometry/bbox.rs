//! Axis-aligned 3D bounding box.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Axis-aligned box given by its min and max corners.
///
/// An empty box has `min > max` on every axis so that extending it with the
/// first point yields a degenerate box around that point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox3 {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl BoundingBox3 {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f64>>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.extend(p);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, p: &Vector3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        !self.is_empty()
            && (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn center(&self) -> Option<Vector3<f64>> {
        (!self.is_empty()).then(|| (self.min + self.max) * 0.5)
    }

    pub fn extent(&self) -> Vector3<f64> {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            self.max - self.min
        }
    }
}

impl Default for BoundingBox3 {
    fn default() -> Self {
        Self::empty()
    }
}
