//! Non-contiguous global-ordinal maps and the persistent exporter that
//! moves blocked values between them.

use bytemuck::{Pod, Zeroable};
use hashbrown::HashMap;

use crate::comm::communicator::{CommTag, Communicator};
use crate::comm::distributor::Distributor;
use crate::transfer_error::TransferError;

/// Ordered set of global ids owned by this rank, with reverse lookup.
#[derive(Debug, Clone, Default)]
pub struct GlobalIdMap {
    ids: Vec<u64>,
    g2l: HashMap<u64, usize>,
}

impl GlobalIdMap {
    pub fn new(ids: Vec<u64>) -> Result<Self, TransferError> {
        let mut g2l = HashMap::with_capacity(ids.len());
        for (n, &gid) in ids.iter().enumerate() {
            if g2l.insert(gid, n).is_some() {
                return Err(TransferError::DuplicateGlobalId(gid));
            }
        }
        Ok(Self { ids, g2l })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn local_index(&self, gid: u64) -> Option<usize> {
        self.g2l.get(&gid).copied()
    }
}

/// Persistent communication plan moving values from a source map to a
/// target map.
///
/// Built once from explicit `(source entry, destination rank)` items; every
/// `apply` replays the same routes with insert semantics, so the plan is
/// reused verbatim across field transfers.
#[derive(Debug)]
pub struct Exporter {
    dist: Distributor,
    export_locals: Vec<usize>,
    import_locals: Vec<usize>,
    num_source: usize,
    num_target: usize,
}

impl Exporter {
    /// General form: one item per (source entry, destination) pair; an entry
    /// may ship to several destinations. Collective.
    pub fn new<C: Communicator>(
        comm: &C,
        source: &GlobalIdMap,
        target: &GlobalIdMap,
        items: &[(usize, usize)],
        tag: CommTag,
    ) -> Result<Self, TransferError> {
        let export_locals: Vec<usize> = items.iter().map(|&(local, _)| local).collect();
        if let Some(&bad) = export_locals.iter().find(|&&l| l >= source.len()) {
            return Err(TransferError::invariant(
                comm.rank(),
                format!("export entry {bad} outside source map of {}", source.len()),
            ));
        }
        let destinations: Vec<usize> = items.iter().map(|&(_, dest)| dest).collect();
        let dist = Distributor::from_sends(comm, &destinations, tag)?;

        // One id exchange resolves every import to a target-map slot.
        let export_ids: Vec<u64> = export_locals.iter().map(|&l| source.ids()[l]).collect();
        let import_ids = dist.exchange(comm, &export_ids, 1)?;
        let import_locals = import_ids
            .iter()
            .map(|&gid| {
                target
                    .local_index(gid)
                    .ok_or(TransferError::UnknownGlobalId(gid))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dist,
            export_locals,
            import_locals,
            num_source: source.len(),
            num_target: target.len(),
        })
    }

    /// Common form: every source entry ships to exactly one destination.
    pub fn from_destinations<C: Communicator>(
        comm: &C,
        source: &GlobalIdMap,
        target: &GlobalIdMap,
        destinations: &[usize],
        tag: CommTag,
    ) -> Result<Self, TransferError> {
        if destinations.len() != source.len() {
            return Err(TransferError::invariant(
                comm.rank(),
                format!(
                    "{} destinations for a source map of {}",
                    destinations.len(),
                    source.len()
                ),
            ));
        }
        let items: Vec<(usize, usize)> = destinations.iter().copied().enumerate().collect();
        Self::new(comm, source, target, &items, tag)
    }

    /// Move `width` values per entry from `src` (blocked on the source map)
    /// into `dst` (blocked on the target map). Untouched target entries keep
    /// their prior contents.
    pub fn apply<C: Communicator, T: Pod + Zeroable>(
        &self,
        comm: &C,
        src: &[T],
        dst: &mut [T],
        width: usize,
    ) -> Result<(), TransferError> {
        if src.len() != self.num_source * width {
            return Err(TransferError::invariant(
                comm.rank(),
                format!(
                    "exporter source holds {} values, expected {}",
                    src.len(),
                    self.num_source * width
                ),
            ));
        }
        if dst.len() != self.num_target * width {
            return Err(TransferError::invariant(
                comm.rank(),
                format!(
                    "exporter target holds {} values, expected {}",
                    dst.len(),
                    self.num_target * width
                ),
            ));
        }

        // Blocked source -> interleaved wire.
        let mut exports = vec![T::zeroed(); self.export_locals.len() * width];
        for (k, &local) in self.export_locals.iter().enumerate() {
            for d in 0..width {
                exports[k * width + d] = src[d * self.num_source + local];
            }
        }
        let imports = self.dist.exchange(comm, &exports, width)?;

        // Interleaved wire -> blocked target.
        for (j, &local) in self.import_locals.iter().enumerate() {
            for d in 0..width {
                dst[d * self.num_target + local] = imports[j * width + d];
            }
        }
        Ok(())
    }

    pub fn num_imports(&self) -> usize {
        self.import_locals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::communicator::NoComm;

    #[test]
    fn duplicate_ids_rejected() {
        assert!(matches!(
            GlobalIdMap::new(vec![5, 6, 5]),
            Err(TransferError::DuplicateGlobalId(5))
        ));
    }

    #[test]
    fn serial_export_permutes_blocked_values() {
        let comm = NoComm;
        let source = GlobalIdMap::new(vec![10, 20, 30]).unwrap();
        let target = GlobalIdMap::new(vec![30, 10, 20]).unwrap();
        let exp =
            Exporter::from_destinations(&comm, &source, &target, &[0, 0, 0], CommTag::new(60))
                .unwrap();
        // Two values per entry, blocked: first component then second.
        let src = vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
        let mut dst = vec![0.0; 6];
        exp.apply(&comm, &src, &mut dst, 2).unwrap();
        assert_eq!(dst, vec![3.0, 1.0, 2.0, 30.0, 10.0, 20.0]);
    }

    #[test]
    fn unknown_target_id_is_an_error() {
        let comm = NoComm;
        let source = GlobalIdMap::new(vec![10]).unwrap();
        let target = GlobalIdMap::new(vec![99]).unwrap();
        assert!(matches!(
            Exporter::from_destinations(&comm, &source, &target, &[0], CommTag::new(62)),
            Err(TransferError::UnknownGlobalId(10))
        ));
    }

    #[test]
    fn duplicate_items_fan_out_one_entry() {
        let comm = NoComm;
        let source = GlobalIdMap::new(vec![10]).unwrap();
        let target = GlobalIdMap::new(vec![10]).unwrap();
        // The same source entry listed twice lands twice (insert semantics).
        let exp = Exporter::new(&comm, &source, &target, &[(0, 0), (0, 0)], CommTag::new(64))
            .unwrap();
        let mut dst = vec![0.0];
        exp.apply(&comm, &[7.5], &mut dst, 1).unwrap();
        assert_eq!(dst, vec![7.5]);
        assert_eq!(exp.num_imports(), 2);
    }
}
