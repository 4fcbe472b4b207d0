//! Bootstrap configuration.
//!
//! Every section has defaults, so an empty TOML document is a valid
//! configuration and a file only has to list what it overrides.
//!
//! ```toml
//! map_name = "lab"
//! max_frames = 60
//! min_parallax_deg = 1.5
//!
//! [matcher]
//! max_distance = 60
//!
//! [two_view]
//! ransac_iterations = 300
//! seed = 7
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};

/// Stricter descriptor distance threshold (bits out of 256).
pub const TH_LOW: u32 = 50;
/// Nearest-neighbour ratio test threshold (best / second best).
pub const NN_RATIO: f32 = 0.75;

/// Descriptor matching between the reference and current frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Maximum Hamming distance for a match.
    pub max_distance: u32,
    /// Best / second-best distance ratio; 1.0 disables the test.
    pub nn_ratio: f32,
    /// Keep only mutual best matches.
    pub cross_check: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_distance: TH_LOW,
            nn_ratio: NN_RATIO,
            cross_check: true,
        }
    }
}

/// Relative pose estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoViewConfig {
    pub ransac_iterations: usize,
    /// Sampson distance threshold in pixels.
    pub sampson_threshold_px: f64,
    /// Minimum RANSAC inliers for a pose to be accepted.
    pub min_inliers: usize,
    /// RNG seed so runs are reproducible.
    pub seed: u64,
}

impl Default for TwoViewConfig {
    fn default() -> Self {
        Self {
            ransac_iterations: 200,
            sampson_threshold_px: 1.0,
            min_inliers: 30,
            seed: 0,
        }
    }
}

/// Per-point triangulation checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Minimum angle between the two viewing rays of a point, in degrees.
    pub min_point_parallax_deg: f64,
    /// Maximum reprojection error in either view, in pixels.
    pub max_reproj_error_px: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            min_point_parallax_deg: (0.99998_f64).acos().to_degrees(), // ~0.36 degrees
            max_reproj_error_px: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Name recorded in the new map's identification.
    pub map_name: String,
    /// Author recorded in the new map's identification.
    pub author: String,

    /// Give up after this many frames.
    pub max_frames: usize,
    /// Give up when frame timestamps span more than this (milliseconds).
    pub max_duration_ms: Option<u64>,
    /// Give up after this many consecutive frames that could not be related
    /// to the reference frame.
    pub max_consecutive_lost: usize,

    /// Features a frame needs to become the reference frame.
    pub min_features: usize,
    /// Matches against the reference needed to attempt pose estimation.
    pub min_matches: usize,
    /// Median parallax of the triangulated points needed for readiness, in degrees.
    pub min_parallax_deg: f64,
    /// Triangulated, geometrically consistent points needed for readiness.
    pub min_triangulated_points: usize,

    pub matcher: MatcherConfig,
    pub two_view: TwoViewConfig,
    pub triangulation: TriangulationConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            map_name: String::new(),
            author: String::new(),
            max_frames: 100,
            max_duration_ms: None,
            max_consecutive_lost: 5,
            min_features: 80,
            min_matches: 60,
            min_parallax_deg: 1.0,
            min_triangulated_points: 50,
            matcher: MatcherConfig::default(),
            two_view: TwoViewConfig::default(),
            triangulation: TriangulationConfig::default(),
        }
    }
}

impl BootstrapConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: &str) -> Result<()> {
            Err(MapError::InvalidConfig(msg.to_string()))
        }

        if self.max_frames < 2 {
            return invalid("max_frames must be at least 2");
        }
        if self.max_consecutive_lost == 0 {
            return invalid("max_consecutive_lost must be positive");
        }
        if self.min_matches < 8 {
            return invalid("min_matches must be at least 8");
        }
        if self.min_triangulated_points == 0 {
            return invalid("min_triangulated_points must be positive");
        }
        if !(self.min_parallax_deg.is_finite() && self.min_parallax_deg >= 0.0) {
            return invalid("min_parallax_deg must be a non-negative number");
        }
        if !(self.matcher.nn_ratio > 0.0 && self.matcher.nn_ratio <= 1.0) {
            return invalid("matcher.nn_ratio must be in (0, 1]");
        }
        if self.two_view.ransac_iterations == 0 {
            return invalid("two_view.ransac_iterations must be positive");
        }
        if !(self.two_view.sampson_threshold_px > 0.0) {
            return invalid("two_view.sampson_threshold_px must be positive");
        }
        if self.two_view.min_inliers < 8 {
            return invalid("two_view.min_inliers must be at least 8");
        }
        if !(self.triangulation.max_reproj_error_px > 0.0) {
            return invalid("triangulation.max_reproj_error_px must be positive");
        }
        if !(self.triangulation.min_point_parallax_deg >= 0.0) {
            return invalid("triangulation.min_point_parallax_deg must be non-negative");
        }
        Ok(())
    }
}
