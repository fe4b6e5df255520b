//! # mesh-rendezvous
//!
//! mesh-rendezvous is a Rust library for rendezvous-based parallel solution
//! transfer: two physics codes, each on its own distributed decomposition of
//! a shared spatial domain, exchange a field sampled on one side and
//! deposited on the other. Neither side knows where the other's data lives;
//! the library discovers, in parallel, which source entity contains each
//! target point and builds a persistent communication plan for the transfer.
//!
//! ## Features
//! - Shared-domain maps over unstructured meshes (any mix of the seven
//!   standard element topologies) and volume-source maps over geometric
//!   primitives
//! - A third, geometry-balanced *rendezvous* decomposition that turns the
//!   global search into a local one
//! - Pluggable communication backends (serial, threaded, MPI) behind one
//!   `Communicator` trait, so the whole pipeline runs in ordinary unit
//!   tests
//! - Inverse-communication distributors and persistent exporters, reused
//!   verbatim across repeated field transfers
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! mesh-rendezvous = "0.3"
//! # Optional features: "mpi-support" for the MPI backend.
//! ```
//!
//! A coupling builds one [`SharedDomainMap`](map::SharedDomainMap) (or
//! [`VolumeSourceMap`](map::VolumeSourceMap)) per source/target pair, calls
//! `setup` once, and then `apply` as often as the physics demands. Ranks
//! that hold no source or target data pass `None` and still participate in
//! every collective.

pub mod comm;
pub mod field;
pub mod geometry;
pub mod map;
pub mod mesh;
pub mod partition;
pub mod rendezvous;
pub mod search;
pub mod topology;
pub mod transfer_error;

/// A convenient prelude importing the most-used traits and types.
pub mod prelude {
    pub use crate::comm::communicator::{CommTag, Communicator, NoComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::communicator::MpiComm;
    #[cfg(feature = "rayon")]
    pub use crate::comm::communicator::RayonComm;
    pub use crate::comm::distributor::Distributor;
    pub use crate::comm::indexer::CommIndexer;
    pub use crate::field::evaluator::FieldEvaluator;
    pub use crate::field::manager::FieldManager;
    pub use crate::field::traits::{Field, FieldContainer};
    pub use crate::geometry::bounding_box::BoundingBox;
    pub use crate::geometry::manager::GeometryManager;
    pub use crate::geometry::primitive::{Cylinder, Geometry};
    pub use crate::map::shared_domain::SharedDomainMap;
    pub use crate::map::volume_source::VolumeSourceMap;
    pub use crate::mesh::container::MeshContainer;
    pub use crate::mesh::manager::MeshManager;
    pub use crate::mesh::traits::MeshBlock;
    pub use crate::rendezvous::engine::Rendezvous;
    pub use crate::search::element_tree::INVALID_ELEMENT;
    pub use crate::topology::cell_type::CellTopology;
    pub use crate::transfer_error::TransferError;
}
