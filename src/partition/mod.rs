//! Rendezvous spatial partitioning.
//!
//! A partition covers the shared-domain box and answers the two queries the
//! rest of the crate routes through: which rank owns a point, and which
//! ranks a box touches. Every rank draws a small rank-seeded weighted sample
//! of its source coordinates; the samples are all-gathered and each rank
//! builds an identical partition, so both queries are pure local lookups
//! after construction.

pub mod grid;
pub mod rcb;

use bytemuck::{Pod, Zeroable};

use crate::comm::collective::all_gather;
use crate::comm::communicator::{CommTag, Communicator};
use crate::geometry::bounding_box::BoundingBox;
use crate::transfer_error::TransferError;

pub use grid::GridPartition;
pub use rcb::RcbPartition;

/// One sampled source coordinate with the load it stands in for.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SamplePoint {
    pub coord: [f64; 3],
    pub weight: f64,
}

/// Maximum samples contributed per rank to the gathered set.
pub const SAMPLES_PER_RANK: usize = 512;

/// Below this estimated global point count the recursive bisection has too
/// little signal and the uniform grid takes over.
const MIN_RCB_POINTS_PER_RANK: f64 = 2.0;

/// The two partition variants behind one query surface.
#[derive(Debug)]
pub enum RendezvousPartition {
    Rcb(RcbPartition),
    Grid(GridPartition),
}

impl RendezvousPartition {
    /// Rendezvous rank owning `point`. Points outside the box are clamped
    /// onto it first, so every query lands in `[0, num_parts)`.
    pub fn point_destination(&self, point: &[f64]) -> usize {
        match self {
            RendezvousPartition::Rcb(p) => p.point_destination(point),
            RendezvousPartition::Grid(p) => p.point_destination(point),
        }
    }

    /// Every rendezvous rank whose closed region `b` touches.
    pub fn box_destinations(&self, b: &BoundingBox) -> Vec<usize> {
        match self {
            RendezvousPartition::Rcb(p) => p.box_destinations(b),
            RendezvousPartition::Grid(p) => p.box_destinations(b),
        }
    }

    pub fn num_parts(&self) -> usize {
        match self {
            RendezvousPartition::Rcb(p) => p.num_parts(),
            RendezvousPartition::Grid(p) => p.num_parts(),
        }
    }
}

/// Build the partition for the shared-domain box. Collective: all ranks
/// contribute their sample (possibly empty) and receive the same partition.
pub fn build_partition<C: Communicator>(
    comm: &C,
    shared_box: &BoundingBox,
    dim: usize,
    local_sample: &[SamplePoint],
    tag: CommTag,
) -> Result<RendezvousPartition, TransferError> {
    if shared_box.is_empty() {
        return Err(TransferError::DisjointDomains);
    }
    let gathered = all_gather(comm, local_sample, tag)?;
    let samples: Vec<SamplePoint> = gathered.into_iter().flatten().collect();
    let estimated_points: f64 = samples.iter().map(|s| s.weight).sum();

    let size = comm.size();
    if samples.is_empty() || estimated_points < MIN_RCB_POINTS_PER_RANK * size as f64 {
        return Ok(RendezvousPartition::Grid(GridPartition::new(
            *shared_box,
            dim,
            size,
        )?));
    }
    Ok(RendezvousPartition::Rcb(RcbPartition::build(
        *shared_box,
        dim,
        samples,
        size,
    )?))
}

/// Deterministic rank-seeded sample of a blocked coordinate set restricted
/// to flagged entries.
pub fn sample_coordinates(
    coords: &[f64],
    num_points: usize,
    dim: usize,
    keep: impl Fn(usize) -> bool,
    rank: usize,
) -> Vec<SamplePoint> {
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let kept: Vec<usize> = (0..num_points).filter(|&n| keep(n)).collect();
    if kept.is_empty() {
        return Vec::new();
    }
    let chosen: Vec<usize> = if kept.len() <= SAMPLES_PER_RANK {
        kept.clone()
    } else {
        let mut rng = SmallRng::seed_from_u64(0x9d7c_5a5b ^ rank as u64);
        let mut picked: Vec<usize> = kept
            .choose_multiple(&mut rng, SAMPLES_PER_RANK)
            .copied()
            .collect();
        picked.sort_unstable();
        picked
    };
    let weight = kept.len() as f64 / chosen.len() as f64;
    chosen
        .into_iter()
        .map(|n| {
            let mut coord = [0.0; 3];
            for (d, slot) in coord.iter_mut().enumerate().take(dim) {
                *slot = coords[d * num_points + n];
            }
            SamplePoint { coord, weight }
        })
        .collect()
}
