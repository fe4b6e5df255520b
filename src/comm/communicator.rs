//! Communication abstraction for intra-process (threaded) and inter-process
//! (MPI) message passing.
//!
//! Wire format conventions (for higher-level protocols):
//! - Payloads are `bytemuck::Pod` slices cast to bytes; no `#[repr(packed)]`.
//! - Counts travel as `u64` fixed width.
//! - Delivery is FIFO per (source, destination, tag) channel; higher layers
//!   exchange sizes first when exact lengths are required.

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
///
/// Implementors provide asynchronous send/receive operations and waitable
/// handles. Every collective in this crate is built from these two calls.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of ranks.
    fn size(&self) -> usize;

    /// Synchronization barrier (default: no-op for serial comms).
    fn barrier(&self) {}
}

// Maps and engines clone their communicator; backends that own process
// state (MPI) are shared through an `Arc` instead.
impl<C: Communicator> Communicator for std::sync::Arc<C> {
    type SendHandle = C::SendHandle;
    type RecvHandle = C::RecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        (**self).isend(peer, tag, buf)
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        (**self).irecv(peer, tag, buf)
    }

    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn barrier(&self) {
        (**self).barrier()
    }
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    /// Create a new tag from a raw `u16`.
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Return the underlying `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Safely offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

/// Compile-time no-op comm for pure serial use and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- RayonComm: intra-process / multi-thread ---

#[cfg(feature = "rayon")]
mod rayon_backend {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Barrier, Condvar, Mutex};

    type Key = (usize, usize, u16); // (src, dst, tag)

    #[derive(Default)]
    struct Slot {
        q: VecDeque<Vec<u8>>,
    }

    #[derive(Default)]
    struct Mailbox {
        map: Mutex<HashMap<Key, Arc<(Mutex<Slot>, Condvar)>>>,
    }

    impl Mailbox {
        fn entry(&self, key: Key) -> Arc<(Mutex<Slot>, Condvar)> {
            let mut g = self.map.lock().expect("mailbox poisoned");
            g.entry(key).or_default().clone()
        }
    }

    pub struct LocalSendHandle;

    impl Wait for LocalSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            None
        }
    }

    pub struct LocalRecvHandle {
        cell: Arc<(Mutex<Slot>, Condvar)>,
        want_len: usize,
    }

    impl Wait for LocalRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (lock, cv) = &*self.cell;
            let mut slot = lock.lock().expect("slot poisoned");
            while slot.q.is_empty() {
                slot = cv.wait(slot).expect("condvar poisoned");
            }
            let mut msg = slot.q.pop_front().expect("queue non-empty");
            msg.truncate(self.want_len.min(msg.len()));
            Some(msg)
        }
    }

    /// Threaded communicator: one clone per rank, all sharing a mailbox and a
    /// reusable barrier. Create the full set with [`RayonComm::universe`] and
    /// hand one to each rank thread.
    #[derive(Clone)]
    pub struct RayonComm {
        rank: usize,
        size: usize,
        mailbox: Arc<Mailbox>,
        barrier: Arc<Barrier>,
    }

    impl std::fmt::Debug for RayonComm {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RayonComm")
                .field("rank", &self.rank)
                .field("size", &self.size)
                .finish()
        }
    }

    impl RayonComm {
        /// Create a universe of `size` ranks sharing one mailbox.
        pub fn universe(size: usize) -> Vec<RayonComm> {
            assert!(size > 0, "universe needs at least one rank");
            let mailbox = Arc::new(Mailbox::default());
            let barrier = Arc::new(Barrier::new(size));
            (0..size)
                .map(|rank| RayonComm {
                    rank,
                    size,
                    mailbox: Arc::clone(&mailbox),
                    barrier: Arc::clone(&barrier),
                })
                .collect()
        }
    }

    impl Communicator for RayonComm {
        type SendHandle = LocalSendHandle;
        type RecvHandle = LocalRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            let entry = self.mailbox.entry((self.rank, peer, tag));
            let (lock, cv) = &*entry;
            {
                let mut slot = lock.lock().expect("slot poisoned");
                slot.q.push_back(buf.to_vec());
            }
            cv.notify_all();
            LocalSendHandle
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
            LocalRecvHandle {
                cell: self.mailbox.entry((peer, self.rank, tag)),
                want_len: buf.len(),
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.barrier.wait();
        }
    }
}

#[cfg(feature = "rayon")]
pub use rayon_backend::RayonComm;

// --- MPI backend ---

#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::transfer_error::TransferError;
    use mpi::collective::CommunicatorCollectives;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::request::{Request, StaticScope};
    use mpi::topology::{Communicator as _, SimpleCommunicator};
    use std::mem::ManuallyDrop;

    /// Heap bytes pinned for one in-flight immediate operation.
    ///
    /// rsmpi ties a request to the lifetime of the buffer it borrows, and a
    /// handle returned from `isend`/`irecv` cannot borrow from the caller.
    /// The slot promotes its allocation to `'static` when the operation is
    /// posted and reclaims it exactly once: in `take` after completion, or
    /// on drop.
    struct InFlight {
        bytes: *mut [u8],
        request: Option<Request<'static, [u8], StaticScope>>,
    }

    impl InFlight {
        fn post<F>(bytes: Vec<u8>, start: F) -> Self
        where
            F: FnOnce(&'static mut [u8]) -> Request<'static, [u8], StaticScope>,
        {
            let bytes = Box::into_raw(bytes.into_boxed_slice());
            let request = start(unsafe { &mut *bytes });
            Self {
                bytes,
                request: Some(request),
            }
        }

        /// Wait for completion and reclaim the buffer.
        fn take(self) -> Vec<u8> {
            let mut slot = ManuallyDrop::new(self);
            if let Some(request) = slot.request.take() {
                let _ = request.wait();
            }
            unsafe { Box::from_raw(slot.bytes) }.into_vec()
        }
    }

    impl Drop for InFlight {
        fn drop(&mut self) {
            // The request must complete before its buffer can be freed.
            if let Some(request) = self.request.take() {
                let _ = request.wait();
            }
            unsafe { drop(Box::from_raw(self.bytes)) };
        }
    }

    pub struct MpiSendHandle(InFlight);

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.0.take();
            None
        }
    }

    pub struct MpiRecvHandle(InFlight);

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            Some(self.0.take())
        }
    }

    /// World communicator over rsmpi.
    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    // The universe handle pins MPI finalization to this value's lifetime;
    // concurrent use from several threads is governed by the MPI library's
    // threading level, not by this wrapper.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        /// Initialize MPI and wrap the world communicator.
        pub fn new() -> Result<Self, TransferError> {
            let universe = mpi::initialize().ok_or_else(|| TransferError::Comm {
                neighbor: 0,
                detail: "MPI initialization failed (already initialized?)".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            let dest = self.world.process_at_rank(peer as i32);
            MpiSendHandle(InFlight::post(buf.to_vec(), |bytes| {
                let bytes: &'static [u8] = bytes;
                dest.immediate_send_with_tag(StaticScope, bytes, tag as i32)
            }))
        }

        fn irecv(&self, peer: usize, tag: u16, template: &mut [u8]) -> Self::RecvHandle {
            // Sizes are exchanged before payloads everywhere in this crate,
            // so the posted buffer length is exact.
            let src = self.world.process_at_rank(peer as i32);
            MpiRecvHandle(InFlight::post(vec![0u8; template.len()], |bytes| {
                src.immediate_receive_into_with_tag(StaticScope, bytes, tag as i32)
            }))
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(all(test, feature = "rayon"))]
mod tests {
    use super::*;

    #[test]
    fn no_comm_is_serial() {
        let comm = NoComm;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        let mut buf = [0u8; 8];
        assert!(comm.irecv(0, 7, &mut buf).wait().is_none());
        assert!(comm.isend(0, 7, &[]).wait().is_none());
    }

    #[test]
    fn rayon_comm_roundtrip_and_tag_isolation() {
        let comms = RayonComm::universe(2);
        let (c0, c1) = (comms[0].clone(), comms[1].clone());

        const TAG_A: u16 = 0xA1;
        const TAG_B: u16 = 0xB2;

        let mut buf_a = [0u8; 8];
        let mut buf_b = [0u8; 8];
        let rxa = c1.irecv(0, TAG_A, &mut buf_a);
        let rxb = c1.irecv(0, TAG_B, &mut buf_b);

        let wa = 0xDEAD_BEEF_F00D_F00Du64.to_le_bytes();
        let wb = 0x0123_4567_89AB_CDEFu64.to_le_bytes();
        c0.isend(1, TAG_B, &wb);
        c0.isend(1, TAG_A, &wa);

        assert_eq!(rxa.wait().expect("rxa"), wa);
        assert_eq!(rxb.wait().expect("rxb"), wb);
    }

    #[test]
    fn universes_are_isolated() {
        let u1 = RayonComm::universe(2);
        let u2 = RayonComm::universe(2);
        u1[0].isend(1, 9, &[1, 2, 3]);
        // The message sits in u1's mailbox only; u2's rank 1 sees nothing.
        u2[0].isend(1, 9, &[9, 9]);
        let mut buf = [0u8; 2];
        let got = u2[1].irecv(0, 9, &mut buf).wait().expect("u2 msg");
        assert_eq!(got, vec![9, 9]);
    }
}
