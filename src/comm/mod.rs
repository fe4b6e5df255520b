//! Communication layer: point-to-point backends, collectives, rank
//! indexing, and the inverse-communication distributor.

pub mod collective;
pub mod communicator;
pub mod distributor;
pub mod indexer;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, Wait};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
#[cfg(feature = "rayon")]
pub use communicator::RayonComm;
pub use distributor::Distributor;
pub use indexer::CommIndexer;
