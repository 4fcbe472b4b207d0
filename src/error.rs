//! Error types for the sparse map and the bootstrap protocol.

use std::time::Duration;

use thiserror::Error;

use crate::atlas::store::StoreKind;
use crate::atlas::{KeyFrameId, MapPointId};

/// Why a bootstrap session ended without producing a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The frame source ran dry before the readiness condition was met.
    StreamExhausted,
    /// Too many consecutive frames could not be related to the reference.
    TrackingLost,
    /// The configured maximum number of frames was consumed.
    FrameBudgetExhausted,
    /// The configured time span (frame timestamps) was exceeded.
    TimeBudgetExhausted,
    /// The pair was ready but the points could not form a consistent map.
    DegenerateMap,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            FailureReason::StreamExhausted => "frame stream exhausted",
            FailureReason::TrackingLost => "tracking repeatedly lost",
            FailureReason::FrameBudgetExhausted => "frame budget exhausted",
            FailureReason::TimeBudgetExhausted => "time budget exhausted",
            FailureReason::DegenerateMap => "degenerate initial map",
        };
        f.write_str(msg)
    }
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("invalid identifier format: {0}")]
    InvalidFormat(String),

    #[error("precondition violated: {0}")]
    PreconditionViolated(String),

    #[error("initialization failed: {0}")]
    InitializationFailed(FailureReason),

    #[error("corrupt map data: {0}")]
    CorruptMapData(String),

    #[error("incompatible map format version {found} (supported: {supported})")]
    IncompatibleVersion { found: u16, supported: u16 },

    #[error("timed out after {waited:?} waiting for the {store} lock")]
    LockContentionTimeout { store: StoreKind, waited: Duration },

    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown keyframe {0}")]
    UnknownKeyframe(KeyFrameId),

    #[error("unknown map point {0}")]
    UnknownMapPoint(MapPointId),

    #[error("keyframe {0} already exists")]
    DuplicateKeyframe(KeyFrameId),

    #[error("map point {0} already exists")]
    DuplicateMapPoint(MapPointId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for MapError {
    fn from(e: toml::de::Error) -> Self {
        MapError::InvalidConfig(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
