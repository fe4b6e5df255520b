//! Rendezvous decompositions for mesh and geometry sources.

pub mod engine;
pub mod geometry_rendezvous;

pub use engine::Rendezvous;
pub use geometry_rendezvous::GeometryRendezvous;
