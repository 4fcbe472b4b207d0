pub mod atlas;
pub mod bootstrap;
pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod io;

pub use atlas::SparseMap;
pub use bootstrap::Bootstrapper;
pub use config::BootstrapConfig;
pub use error::{FailureReason, MapError, Result};
