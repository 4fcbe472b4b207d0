//! Geometry utilities: SE3 transforms, bounding boxes, SO(3) helpers.

pub mod bbox;
pub mod se3;
pub mod so3;

pub use bbox::BoundingBox3;
pub use se3::SE3;
pub use so3::{ray_angle, skew};
