//! Geometry primitives: bounding boxes and volume-source shapes.

pub mod bounding_box;
pub mod manager;
pub mod primitive;

pub use bounding_box::BoundingBox;
pub use manager::GeometryManager;
pub use primitive::{Cylinder, Geometry};
