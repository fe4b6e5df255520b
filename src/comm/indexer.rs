//! Rank indexing between a sub-communicator and its enclosing parent.
//!
//! Sub-communicator membership is defined by presence of data (a manager
//! being `Some` on this rank); sub-ranks are assigned in ascending parent
//! rank order. A process outside the sub-communicator still learns where
//! sub-rank 0 lives, which seeds every metadata broadcast.

use crate::comm::collective::all_gather;
use crate::comm::communicator::{CommTag, Communicator};
use crate::transfer_error::TransferError;

/// Table mapping sub-communicator ranks to parent-communicator ranks.
#[derive(Debug, Clone)]
pub struct CommIndexer {
    l2g: Vec<usize>,
    local_sub_rank: Option<usize>,
}

impl CommIndexer {
    /// Build the table with a single membership all-gather over the parent
    /// communicator. Collective.
    pub fn new<C: Communicator>(
        comm: &C,
        in_sub_comm: bool,
        tag: CommTag,
    ) -> Result<Self, TransferError> {
        let flag: u8 = if in_sub_comm { 1 } else { 0 };
        let flags = all_gather(comm, &[flag], tag)?;
        let mut l2g = Vec::new();
        let mut local_sub_rank = None;
        for (parent_rank, f) in flags.iter().enumerate() {
            if f[0] != 0 {
                if parent_rank == comm.rank() {
                    local_sub_rank = Some(l2g.len());
                }
                l2g.push(parent_rank);
            }
        }
        Ok(Self { l2g, local_sub_rank })
    }

    /// Parent rank of the given sub-rank.
    pub fn l2g(&self, sub_rank: usize) -> Option<usize> {
        self.l2g.get(sub_rank).copied()
    }

    /// Parent rank of sub-rank 0, the broadcast seed. `None` only when the
    /// sub-communicator is empty on every rank.
    pub fn root(&self) -> Option<usize> {
        self.l2g(0)
    }

    /// Number of ranks in the sub-communicator.
    pub fn sub_size(&self) -> usize {
        self.l2g.len()
    }

    /// This process's sub-rank, when it is a member.
    pub fn local_sub_rank(&self) -> Option<usize> {
        self.local_sub_rank
    }

    pub fn is_member(&self) -> bool {
        self.local_sub_rank.is_some()
    }
}
