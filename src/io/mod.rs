//! Data sources for running the bootstrap without a camera.

pub mod synthetic;

pub use synthetic::{SyntheticExtractor, SyntheticScene, SyntheticSequence};
