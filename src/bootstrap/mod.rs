//! Monocular map bootstrap.
//!
//! - [`Bootstrapper`] - phase machine driving one initialization attempt
//! - [`FrameSource`] / [`FeatureExtractor`] - where frames and features come from
//! - [`RelativePoseEstimator`] - two-view pose, [`EightPointEstimator`] by default
//! - [`triangulation`] - DLT with depth, parallax and reprojection checks

pub mod bootstrapper;
pub mod features;
pub mod frame;
pub mod result;
pub mod state;
pub mod triangulation;
pub mod two_view;

pub use bootstrapper::Bootstrapper;
pub use features::{descriptor_distance, match_descriptors, FeatureExtractor, Features};
pub use frame::{Frame, FrameSource, Image};
pub use result::BootstrapReport;
pub use state::BootstrapPhase;
pub use triangulation::TriangulatedPoint;
pub use two_view::{EightPointEstimator, RelativePoseEstimator, TwoViewGeometry};
