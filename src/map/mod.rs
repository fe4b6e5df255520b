//! Transfer maps: the shared-domain map over mesh sources, its
//! volume-source sibling over geometric primitives, and the ordinal
//! map/exporter plumbing they persist.

pub mod global_map;
pub mod shared_domain;
pub mod volume_source;

pub use global_map::{Exporter, GlobalIdMap};
pub use shared_domain::SharedDomainMap;
pub use volume_source::VolumeSourceMap;

use crate::comm::collective::{all_gather, all_reduce_max_u64};
use crate::comm::communicator::{CommTag, Communicator};
use crate::geometry::bounding_box::BoundingBox;
use crate::transfer_error::TransferError;

/// Globally unique target-point ordinals without exact global counts:
/// rank `r` with `n_r` local points takes `r·G + 0 .. r·G + n_r - 1`,
/// where `G` is the all-reduced maximum local count.
pub(crate) fn compute_point_ordinals<C: Communicator>(
    comm: &C,
    local_points: usize,
    tag: CommTag,
) -> Result<(u64, Vec<u64>), TransferError> {
    let stride = all_reduce_max_u64(comm, local_points as u64, tag)?;
    let base = comm.rank() as u64 * stride;
    Ok((stride, (0..local_points as u64).map(|n| base + n).collect()))
}

/// Union of the per-rank boxes contributed by ranks holding data; `None`
/// when no rank contributes.
pub(crate) fn gathered_union_box<C: Communicator>(
    comm: &C,
    local: Option<BoundingBox>,
    tag: CommTag,
) -> Result<Option<BoundingBox>, TransferError> {
    let mine: Vec<BoundingBox> = local.into_iter().filter(|b| !b.is_empty()).collect();
    let gathered = all_gather(comm, &mine, tag)?;
    let mut union: Option<BoundingBox> = None;
    for b in gathered.into_iter().flatten() {
        union = Some(match union {
            Some(u) => BoundingBox::union(&u, &b),
            None => b,
        });
    }
    Ok(union)
}
