//! Collectives built from the point-to-point [`Communicator`] primitives.
//!
//! Every function here is collective: all ranks of the communicator must
//! call it with the same tag, in the same order relative to other traffic on
//! that tag. Determinism comes from folding and concatenating in ascending
//! rank order.

use bytemuck::{Pod, Zeroable};

use crate::comm::communicator::{CommTag, Communicator, Wait};
use crate::comm::wire::{cast_slice, cast_slice_mut};
use crate::transfer_error::TransferError;

fn recv_exact<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    expected_bytes: usize,
) -> Result<C::RecvHandle, TransferError> {
    let mut template = vec![0u8; expected_bytes];
    Ok(comm.irecv(peer, tag.as_u16(), &mut template))
}

fn wait_exact(
    handle: impl Wait,
    peer: usize,
    expected_bytes: usize,
) -> Result<Vec<u8>, TransferError> {
    let raw = handle.wait().ok_or_else(|| TransferError::Comm {
        neighbor: peer,
        detail: "receive completed without data".into(),
    })?;
    if raw.len() != expected_bytes {
        return Err(TransferError::BufferSizeMismatch {
            neighbor: peer,
            expected: expected_bytes,
            got: raw.len(),
        });
    }
    Ok(raw)
}

/// Broadcast `data` from `root` to every rank. All ranks pass equally sized
/// buffers; the root's contents win.
pub fn broadcast<C: Communicator, T: Pod>(
    comm: &C,
    root: usize,
    data: &mut [T],
    tag: CommTag,
) -> Result<(), TransferError> {
    let rank = comm.rank();
    let size = comm.size();
    let bytes = std::mem::size_of_val(data);
    if rank == root {
        let pending: Vec<_> = (0..size)
            .filter(|&p| p != root)
            .map(|p| comm.isend(p, tag.as_u16(), cast_slice(data)))
            .collect();
        for s in pending {
            let _ = s.wait();
        }
    } else {
        let h = recv_exact(comm, root, tag, bytes)?;
        let raw = wait_exact(h, root, bytes)?;
        cast_slice_mut(data).copy_from_slice(&raw);
    }
    Ok(())
}

/// Gather a variable-length contribution from every rank onto every rank.
///
/// Returns one `Vec<T>` per rank, indexed by rank. Uses `tag` for the count
/// phase and `tag + 1` for the payload phase.
pub fn all_gather<C: Communicator, T: Pod + Zeroable>(
    comm: &C,
    mine: &[T],
    tag: CommTag,
) -> Result<Vec<Vec<T>>, TransferError> {
    let rank = comm.rank();
    let size = comm.size();
    let count_tag = tag;
    let data_tag = tag.offset(1);

    // Count phase: post all receives, then send to every peer.
    let mut count_handles = Vec::with_capacity(size.saturating_sub(1));
    for peer in 0..size {
        if peer != rank {
            count_handles.push((peer, recv_exact(comm, peer, count_tag, 8)?));
        }
    }
    let my_count = mine.len() as u64;
    let pending_counts: Vec<_> = (0..size)
        .filter(|&p| p != rank)
        .map(|p| comm.isend(p, count_tag.as_u16(), &my_count.to_ne_bytes()))
        .collect();

    let mut counts = vec![0usize; size];
    counts[rank] = mine.len();
    for (peer, h) in count_handles {
        let raw = wait_exact(h, peer, 8)?;
        counts[peer] = u64::from_ne_bytes(raw.try_into().expect("8-byte count")) as usize;
    }
    for s in pending_counts {
        let _ = s.wait();
    }

    // Payload phase: zero-length contributions skip the message entirely.
    let item = std::mem::size_of::<T>();
    let mut data_handles = Vec::new();
    for peer in 0..size {
        if peer != rank && counts[peer] > 0 {
            data_handles.push((peer, recv_exact(comm, peer, data_tag, counts[peer] * item)?));
        }
    }
    let pending_data: Vec<_> = (0..size)
        .filter(|&p| p != rank && !mine.is_empty())
        .map(|p| comm.isend(p, data_tag.as_u16(), cast_slice(mine)))
        .collect();

    let mut out: Vec<Vec<T>> = (0..size).map(|_| Vec::new()).collect();
    out[rank] = mine.to_vec();
    for (peer, h) in data_handles {
        let expected = counts[peer] * item;
        let raw = wait_exact(h, peer, expected)?;
        let mut buf = vec![T::zeroed(); counts[peer]];
        cast_slice_mut(&mut buf).copy_from_slice(&raw);
        out[peer] = buf;
    }
    for s in pending_data {
        let _ = s.wait();
    }

    Ok(out)
}

/// All-reduce a single record with a caller-supplied fold, applied in
/// ascending rank order on every rank.
pub fn all_reduce<C: Communicator, T: Pod + Zeroable>(
    comm: &C,
    value: T,
    tag: CommTag,
    fold: impl Fn(T, T) -> T,
) -> Result<T, TransferError> {
    let gathered = all_gather(comm, std::slice::from_ref(&value), tag)?;
    let mut it = gathered.into_iter().map(|v| v[0]);
    let first = it.next().expect("at least one rank");
    Ok(it.fold(first, fold))
}

pub fn all_reduce_max_u64<C: Communicator>(
    comm: &C,
    value: u64,
    tag: CommTag,
) -> Result<u64, TransferError> {
    all_reduce(comm, value, tag, u64::max)
}

pub fn all_reduce_sum_u64<C: Communicator>(
    comm: &C,
    value: u64,
    tag: CommTag,
) -> Result<u64, TransferError> {
    all_reduce(comm, value, tag, |a, b| a + b)
}

pub fn all_reduce_max_f64<C: Communicator>(
    comm: &C,
    value: f64,
    tag: CommTag,
) -> Result<f64, TransferError> {
    all_reduce(comm, value, tag, f64::max)
}
