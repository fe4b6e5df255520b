//! Inverse-communication distributor.
//!
//! The primitive every migration phase in this crate is built on: each
//! sender knows, per item, the destination rank; no receiver knows its
//! senders. `from_sends` derives the receive plan with one symmetric count
//! exchange, and the plan then replays any number of payload exchanges with
//! stable ordering:
//!
//! - exports are delivered grouped by destination, preserving the sender's
//!   original item order within each destination;
//! - imports are concatenated in ascending source-rank order, so
//!   [`Distributor::source_ranks`] ("from images" × "from lengths") labels
//!   every imported item with the rank it came from.

use bytemuck::{Pod, Zeroable};

use crate::comm::communicator::{CommTag, Communicator, Wait};
use crate::comm::wire::{cast_slice, cast_slice_mut};
use crate::transfer_error::TransferError;

#[derive(Debug)]
pub struct Distributor {
    rank: usize,
    send_ranks: Vec<usize>,
    send_counts: Vec<usize>,
    // Grouped-by-destination ordering: original index of each export item.
    send_perm: Vec<usize>,
    recv_ranks: Vec<usize>,
    recv_counts: Vec<usize>,
    num_imports: usize,
    data_tag: CommTag,
}

impl Distributor {
    /// Build the communication plan from per-item destination ranks.
    ///
    /// Collective over `comm`: every rank exchanges send counts with every
    /// other rank on `base_tag`; payload exchanges use `base_tag + 1`.
    pub fn from_sends<C: Communicator>(
        comm: &C,
        destinations: &[usize],
        base_tag: CommTag,
    ) -> Result<Self, TransferError> {
        let rank = comm.rank();
        let size = comm.size();

        let mut counts_to = vec![0usize; size];
        for &dest in destinations {
            if dest >= size {
                return Err(TransferError::invariant(
                    rank,
                    format!("destination rank {dest} out of range for {size} ranks"),
                ));
            }
            counts_to[dest] += 1;
        }

        // Stable grouping of item indices by destination.
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); size];
        for (i, &dest) in destinations.iter().enumerate() {
            buckets[dest].push(i);
        }
        let mut send_ranks = Vec::new();
        let mut send_counts = Vec::new();
        let mut send_perm = Vec::with_capacity(destinations.len());
        for (r, bucket) in buckets.into_iter().enumerate() {
            if !bucket.is_empty() {
                send_ranks.push(r);
                send_counts.push(bucket.len());
                send_perm.extend(bucket);
            }
        }

        // Symmetric count exchange; the self count never touches the wire.
        let mut handles = Vec::with_capacity(size.saturating_sub(1));
        for peer in 0..size {
            if peer != rank {
                let mut template = [0u8; 8];
                handles.push((peer, comm.irecv(peer, base_tag.as_u16(), &mut template)));
            }
        }
        let pending: Vec<_> = (0..size)
            .filter(|&p| p != rank)
            .map(|p| comm.isend(p, base_tag.as_u16(), &(counts_to[p] as u64).to_ne_bytes()))
            .collect();

        let mut counts_from = vec![0usize; size];
        counts_from[rank] = counts_to[rank];
        for (peer, h) in handles {
            let raw = h.wait().ok_or_else(|| TransferError::Comm {
                neighbor: peer,
                detail: "count receive completed without data".into(),
            })?;
            if raw.len() != 8 {
                return Err(TransferError::BufferSizeMismatch {
                    neighbor: peer,
                    expected: 8,
                    got: raw.len(),
                });
            }
            counts_from[peer] = u64::from_ne_bytes(raw.try_into().expect("8-byte count")) as usize;
        }
        for s in pending {
            let _ = s.wait();
        }

        let mut recv_ranks = Vec::new();
        let mut recv_counts = Vec::new();
        for (r, &c) in counts_from.iter().enumerate() {
            if c > 0 {
                recv_ranks.push(r);
                recv_counts.push(c);
            }
        }
        let num_imports = recv_counts.iter().sum();

        Ok(Self {
            rank,
            send_ranks,
            send_counts,
            send_perm,
            recv_ranks,
            recv_counts,
            num_imports,
            data_tag: base_tag.offset(1),
        })
    }

    /// Number of items this rank exports.
    pub fn num_exports(&self) -> usize {
        self.send_perm.len()
    }

    /// Number of items this rank will import on every exchange.
    pub fn num_imports(&self) -> usize {
        self.num_imports
    }

    /// Unique source ranks in import order.
    pub fn from_ranks(&self) -> &[usize] {
        &self.recv_ranks
    }

    /// Items received from each source rank, aligned with [`from_ranks`].
    ///
    /// [`from_ranks`]: Distributor::from_ranks
    pub fn from_counts(&self) -> &[usize] {
        &self.recv_counts
    }

    /// One source rank per imported item: the from-images / from-lengths
    /// replay used to route replies back where items came from.
    pub fn source_ranks(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.num_imports);
        for (&r, &c) in self.recv_ranks.iter().zip(&self.recv_counts) {
            out.extend(std::iter::repeat(r).take(c));
        }
        out
    }

    /// Move `width` records per item through the plan. `exports` holds the
    /// items in their original order; the result holds `num_imports * width`
    /// records grouped by ascending source rank.
    pub fn exchange<C: Communicator, T: Pod + Zeroable>(
        &self,
        comm: &C,
        exports: &[T],
        width: usize,
    ) -> Result<Vec<T>, TransferError> {
        let n_items = self.send_perm.len();
        if exports.len() != n_items * width {
            return Err(TransferError::invariant(
                self.rank,
                format!(
                    "exchange expects {} records ({} items x width {}), got {}",
                    n_items * width,
                    n_items,
                    width,
                    exports.len()
                ),
            ));
        }

        // Pack exports grouped by destination.
        let mut grouped = Vec::with_capacity(exports.len());
        for &i in &self.send_perm {
            grouped.extend_from_slice(&exports[i * width..(i + 1) * width]);
        }

        let item = std::mem::size_of::<T>();
        let mut handles = Vec::new();
        for (&peer, &count) in self.recv_ranks.iter().zip(&self.recv_counts) {
            if peer != self.rank {
                let mut template = vec![0u8; count * width * item];
                handles.push((
                    peer,
                    count,
                    comm.irecv(peer, self.data_tag.as_u16(), &mut template),
                ));
            }
        }

        let mut pending = Vec::new();
        let mut offset = 0usize;
        let mut self_chunk: Option<std::ops::Range<usize>> = None;
        for (&peer, &count) in self.send_ranks.iter().zip(&self.send_counts) {
            let chunk = offset..offset + count * width;
            if peer == self.rank {
                self_chunk = Some(chunk);
            } else {
                pending.push(comm.isend(peer, self.data_tag.as_u16(), cast_slice(&grouped[chunk])));
            }
            offset += count * width;
        }

        // Assemble imports in ascending source-rank order; the local chunk
        // bypasses the wire.
        let mut imports = vec![T::zeroed(); self.num_imports * width];
        let mut cursor = 0usize;
        let mut handle_iter = handles.into_iter();
        for (&peer, &count) in self.recv_ranks.iter().zip(&self.recv_counts) {
            let span = count * width;
            let dst = &mut imports[cursor..cursor + span];
            if peer == self.rank {
                let chunk = self_chunk.clone().ok_or_else(|| {
                    TransferError::invariant(self.rank, "self import without self export")
                })?;
                dst.copy_from_slice(&grouped[chunk]);
            } else {
                let (h_peer, h_count, h) = handle_iter
                    .next()
                    .ok_or_else(|| TransferError::invariant(self.rank, "receive handle underrun"))?;
                debug_assert_eq!(h_peer, peer);
                debug_assert_eq!(h_count, count);
                let expected = span * item;
                let raw = h.wait().ok_or_else(|| TransferError::Comm {
                    neighbor: peer,
                    detail: "payload receive completed without data".into(),
                })?;
                if raw.len() != expected {
                    return Err(TransferError::BufferSizeMismatch {
                        neighbor: peer,
                        expected,
                        got: raw.len(),
                    });
                }
                cast_slice_mut(dst).copy_from_slice(&raw);
            }
            cursor += span;
        }
        for s in pending {
            let _ = s.wait();
        }

        Ok(imports)
    }
}

#[cfg(all(test, feature = "rayon"))]
mod tests {
    use super::*;
    use crate::comm::communicator::RayonComm;

    fn run_ranks<R: Send + 'static>(
        size: usize,
        f: impl Fn(RayonComm) -> R + Send + Sync + Clone + 'static,
    ) -> Vec<R> {
        let handles: Vec<_> = RayonComm::universe(size)
            .into_iter()
            .map(|c| {
                let f = f.clone();
                std::thread::spawn(move || f(c))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn all_to_all_with_self_sends() {
        // Each rank sends item (rank*10 + dest) to every rank, itself included.
        let results = run_ranks(3, |comm| {
            let rank = comm.rank() as u64;
            let dests: Vec<usize> = (0..3).collect();
            let items: Vec<u64> = (0..3).map(|d| rank * 10 + d).collect();
            let dist = Distributor::from_sends(&comm, &dests, CommTag::new(100)).unwrap();
            let imports = dist.exchange(&comm, &items, 1).unwrap();
            (comm.rank(), imports, dist.source_ranks())
        });
        for (rank, imports, sources) in results {
            let want: Vec<u64> = (0..3).map(|src| src * 10 + rank as u64).collect();
            assert_eq!(imports, want);
            assert_eq!(sources, vec![0, 1, 2]);
        }
    }

    #[test]
    fn asymmetric_plan_and_replay_pairing() {
        // Rank 0 sends two items to rank 1 and one to itself; rank 1 sends
        // nothing. Two exchanges on one plan must stay paired.
        let results = run_ranks(2, |comm| {
            let (dests, a, b): (Vec<usize>, Vec<u64>, Vec<f64>) = if comm.rank() == 0 {
                (vec![1, 0, 1], vec![11, 22, 33], vec![1.5, 2.5, 3.5])
            } else {
                (vec![], vec![], vec![])
            };
            let dist = Distributor::from_sends(&comm, &dests, CommTag::new(200)).unwrap();
            let ids = dist.exchange(&comm, &a, 1).unwrap();
            let vals = dist.exchange(&comm, &b, 1).unwrap();
            (comm.rank(), ids, vals, dist.source_ranks())
        });
        for (rank, ids, vals, sources) in results {
            if rank == 0 {
                assert_eq!(ids, vec![22]);
                assert_eq!(vals, vec![2.5]);
                assert_eq!(sources, vec![0]);
            } else {
                assert_eq!(ids, vec![11, 33]);
                assert_eq!(vals, vec![1.5, 3.5]);
                assert_eq!(sources, vec![0, 0]);
            }
        }
    }

    #[test]
    fn multi_record_items() {
        // width = 3: each item carries a coordinate triple.
        let results = run_ranks(2, |comm| {
            let (dests, coords): (Vec<usize>, Vec<f64>) = if comm.rank() == 0 {
                (vec![1], vec![1.0, 2.0, 3.0])
            } else {
                (vec![1], vec![4.0, 5.0, 6.0])
            };
            let dist = Distributor::from_sends(&comm, &dests, CommTag::new(300)).unwrap();
            (comm.rank(), dist.exchange(&comm, &coords, 3).unwrap())
        });
        for (rank, imports) in results {
            if rank == 1 {
                assert_eq!(imports, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
            } else {
                assert!(imports.is_empty());
            }
        }
    }
}
