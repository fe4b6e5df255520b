//! TransferError: unified error type for mesh-rendezvous public APIs.
//!
//! Every fallible operation in the crate reports through this enum. All
//! phases of a map build are collective, so the policy is fail-fast with the
//! offending values attached; no partial recovery is attempted because a
//! rank that recovered alone would desynchronize the others.

use thiserror::Error;

/// Unified error type for mesh-rendezvous operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    /// Object dimension does not match the map/engine dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Search tolerance must be strictly positive.
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),

    /// `apply` or a query was invoked before `setup` completed.
    #[error("shared-domain map has not been set up")]
    MapNotSetup,

    /// Missed-point retrieval without `store_missed_points`.
    #[error("missed target points were not stored during setup")]
    MissedPointsNotStored,

    /// A rendezvous query was invoked before `build` completed.
    #[error("rendezvous decomposition has not been built")]
    RendezvousNotBuilt,

    /// Source and target bounding boxes do not intersect.
    #[error("source and target domains do not intersect")]
    DisjointDomains,

    /// No source entities exist on any process of the communicator.
    #[error("no source entities exist on any process")]
    EmptySource,

    /// Bounding box with inverted bounds on one axis.
    #[error("invalid bounding box: min {min} > max {max} on axis {axis}")]
    InvalidBox { axis: usize, min: f64, max: f64 },

    /// A mesh block failed construction-time validation.
    #[error("mesh block {block}: {detail}")]
    MalformedBlock { block: usize, detail: String },

    /// A vertex or geometry coordinate is NaN or infinite.
    #[error("non-finite coordinate {value} on entity {entity}, axis {axis}")]
    NonFiniteCoordinate {
        entity: usize,
        axis: usize,
        value: f64,
    },

    /// Wire tag does not name one of the seven element topologies.
    #[error("unknown element topology tag {0}")]
    UnknownTopology(u32),

    /// The same global id was registered twice in one ordinal map.
    #[error("duplicate global id {0} in ordinal map")]
    DuplicateGlobalId(u64),

    /// An imported global id has no slot in the receiving ordinal map.
    #[error("global id {0} not present in receiving ordinal map")]
    UnknownGlobalId(u64),

    /// The spatial partition could not be constructed.
    #[error("no spatial partition could be built: {0}")]
    PartitionFailure(String),

    /// Point-to-point communication failed.
    #[error("communication with rank {neighbor} failed: {detail}")]
    Comm { neighbor: usize, detail: String },

    /// A receive completed with an unexpected byte count.
    #[error("receive size mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },

    /// The evaluator returned a field of the wrong dimension.
    #[error("evaluator returned field of dimension {actual}, expected {expected}")]
    EvaluatorDimension { expected: usize, actual: usize },

    /// The evaluator returned the wrong number of values.
    #[error("evaluator returned {actual} values, expected {expected}")]
    EvaluatorSize { expected: usize, actual: usize },

    /// The caller's target buffer does not cover the mapped points.
    #[error("target buffer holds {actual} values, expected {expected}")]
    TargetSizeMismatch { expected: usize, actual: usize },

    /// Internal consistency violation; indicates a bug in the crate.
    #[error("invariant violated on rank {rank}: {detail}")]
    Invariant { rank: usize, detail: String },
}

impl TransferError {
    /// Shorthand for invariant violations, which always carry the rank.
    pub(crate) fn invariant(rank: usize, detail: impl Into<String>) -> Self {
        TransferError::Invariant {
            rank,
            detail: detail.into(),
        }
    }
}
