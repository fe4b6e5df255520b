//! Shared-domain map: the full build-and-apply pipeline for mesh sources.

use hashbrown::HashMap;

use crate::comm::collective::broadcast;
use crate::comm::communicator::{CommTag, Communicator};
use crate::comm::distributor::Distributor;
use crate::comm::indexer::CommIndexer;
use crate::field::evaluator::FieldEvaluator;
use crate::field::manager::FieldManager;
use crate::field::tools::{local_coord_bounding_box, put_scalar};
use crate::field::traits::Field;
use crate::geometry::bounding_box::BoundingBox;
use crate::map::global_map::{Exporter, GlobalIdMap};
use crate::map::{compute_point_ordinals, gathered_union_box};
use crate::mesh::manager::MeshManager;
use crate::mesh::traits::MeshBlock;
use crate::rendezvous::engine::Rendezvous;
use crate::search::element_tree::INVALID_ELEMENT;
use crate::transfer_error::TransferError;

const TAG_SRC_INDEXER: CommTag = CommTag::new(0x0300);
const TAG_TGT_INDEXER: CommTag = CommTag::new(0x0304);
const TAG_ORDINALS: CommTag = CommTag::new(0x0308);
const TAG_SRC_BOX: CommTag = CommTag::new(0x030C);
const TAG_TGT_BOX: CommTag = CommTag::new(0x0310);
const TAG_T2R_DIST: CommTag = CommTag::new(0x0314);
const TAG_T2R_COORD: CommTag = CommTag::new(0x0318);
const TAG_MISSED_DIST: CommTag = CommTag::new(0x031C);
const TAG_R2S_DIST: CommTag = CommTag::new(0x0320);
const TAG_R2S_COORD: CommTag = CommTag::new(0x0324);
const TAG_S2T_EXPORT: CommTag = CommTag::new(0x0328);
const TAG_FIELD_DIM: CommTag = CommTag::new(0x032C);

struct MapState {
    target_map: GlobalIdMap,
    source_map: GlobalIdMap,
    source_elements: Vec<u64>,
    target_coords: Vec<f64>,
    source_to_target: Exporter,
    target_indexer: CommIndexer,
    missed_points: Vec<usize>,
}

/// Persistent source→target transfer plan over a shared spatial domain.
///
/// One `setup` per coupling, any number of `apply` calls. Every method is
/// collective over the construction communicator; ranks without source or
/// target data pass `None` and still participate.
pub struct SharedDomainMap<C: Communicator> {
    comm: C,
    dim: usize,
    store_missed_points: bool,
    tolerance: f64,
    state: Option<MapState>,
}

impl<C: Communicator + Clone> SharedDomainMap<C> {
    pub fn new(
        comm: C,
        dim: usize,
        store_missed_points: bool,
        tolerance: f64,
    ) -> Result<Self, TransferError> {
        if !(1..=3).contains(&dim) {
            return Err(TransferError::DimensionMismatch {
                expected: 3,
                actual: dim,
            });
        }
        if !(tolerance > 0.0) {
            return Err(TransferError::InvalidTolerance(tolerance));
        }
        Ok(Self {
            comm,
            dim,
            store_missed_points,
            tolerance,
            state: None,
        })
    }

    /// Build the map: rendezvous the source mesh, locate every target
    /// point, and construct the persistent source→target exporter.
    pub fn setup<M: MeshBlock + Sync, F: Field>(
        &mut self,
        source: Option<&mut MeshManager<M>>,
        target: Option<&FieldManager<F>>,
    ) -> Result<(), TransferError> {
        let comm = self.comm.clone();

        if let Some(m) = source.as_deref() {
            if m.dim() != self.dim {
                return Err(TransferError::DimensionMismatch {
                    expected: self.dim,
                    actual: m.dim(),
                });
            }
        }
        if let Some(t) = target {
            if t.field().dim() != self.dim {
                return Err(TransferError::DimensionMismatch {
                    expected: self.dim,
                    actual: t.field().dim(),
                });
            }
        }

        let source_indexer = CommIndexer::new(&comm, source.is_some(), TAG_SRC_INDEXER)?;
        if source_indexer.root().is_none() {
            return Err(TransferError::EmptySource);
        }
        let target_indexer = CommIndexer::new(&comm, target.is_some(), TAG_TGT_INDEXER)?;

        // Globally unique ordinals for the local target points.
        let local_points = target.map_or(0, |t| t.field().num_entries());
        let (stride, target_ordinals) = compute_point_ordinals(&comm, local_points, TAG_ORDINALS)?;
        let mut target_g2l: HashMap<u64, usize> = HashMap::new();
        if self.store_missed_points {
            for (n, &gid) in target_ordinals.iter().enumerate() {
                target_g2l.insert(gid, n);
            }
        }
        let target_map = GlobalIdMap::new(target_ordinals)?;

        // Shared-domain box: intersection of the global source and target
        // boxes; disjoint (or absent) sides are fatal.
        let source_box = gathered_union_box(
            &comm,
            source.as_deref().map(|m| m.local_bounding_box()),
            TAG_SRC_BOX,
        )?
        .ok_or(TransferError::EmptySource)?;
        let target_box = gathered_union_box(
            &comm,
            target.map(|t| local_coord_bounding_box(t.field(), self.dim)),
            TAG_TGT_BOX,
        )?
        .ok_or(TransferError::DisjointDomains)?;
        let shared_box = BoundingBox::intersection(&source_box, &target_box)
            .ok_or(TransferError::DisjointDomains)?;

        let mut rendezvous = Rendezvous::new(comm.clone(), self.dim, shared_box)?;
        rendezvous.build(source)?;

        // Route each local target point to its rendezvous rank; points
        // outside the expanded rendezvous box are dropped here (and recorded
        // as missed).
        let empty: [f64; 0] = [];
        let coords_view = target.map_or(&empty[..], |t| t.field().view());
        let rendezvous_procs = rendezvous.procs_containing_points(coords_view)?;
        let rendezvous_box = *rendezvous.global_box();

        let mut missed_points = Vec::new();
        let mut in_box: Vec<usize> = Vec::with_capacity(local_points);
        let mut point = [0.0; 3];
        for n in 0..local_points {
            for d in 0..self.dim {
                point[d] = coords_view[d * local_points + n];
            }
            if rendezvous_box.contains_point(&point[..self.dim]) {
                in_box.push(n);
            } else if self.store_missed_points {
                missed_points.push(n);
            }
        }
        let in_box_ordinals: Vec<u64> = in_box.iter().map(|&n| target_map.ids()[n]).collect();
        let in_box_procs: Vec<usize> = in_box.iter().map(|&n| rendezvous_procs[n]).collect();
        let mut in_box_coords = vec![0.0f64; self.dim * in_box.len()];
        for (k, &n) in in_box.iter().enumerate() {
            for d in 0..self.dim {
                in_box_coords[d * in_box.len() + k] = coords_view[d * local_points + n];
            }
        }

        // Inverse communication: surviving ordinals and coordinates move to
        // rendezvous space.
        let t2r_dist = Distributor::from_sends(&comm, &in_box_procs, TAG_T2R_DIST)?;
        let rendezvous_points = t2r_dist.exchange(&comm, &in_box_ordinals, 1)?;
        let in_box_map = GlobalIdMap::new(in_box_ordinals)?;
        let rendezvous_points_map = GlobalIdMap::new(rendezvous_points.clone())?;
        let t2r_exporter = Exporter::from_destinations(
            &comm,
            &in_box_map,
            &rendezvous_points_map,
            &in_box_procs,
            TAG_T2R_COORD,
        )?;
        let mut rendezvous_coords = vec![0.0f64; self.dim * rendezvous_points.len()];
        t2r_exporter.apply(&comm, &in_box_coords, &mut rendezvous_coords, self.dim)?;

        // Local search in rendezvous space.
        let (rendezvous_elements, rendezvous_src_procs) =
            rendezvous.elements_containing_points(&rendezvous_coords, self.tolerance)?;

        // Points no element claimed: echo their ordinals back to the target
        // ranks that own them, through a second distributor keyed by those
        // ranks.
        if self.store_missed_points {
            let origin_ranks = t2r_dist.source_ranks();
            let mut missed_ordinals = Vec::new();
            let mut missed_ranks = Vec::new();
            for (i, &elem) in rendezvous_elements.iter().enumerate() {
                if elem == INVALID_ELEMENT {
                    missed_ordinals.push(rendezvous_points[i]);
                    missed_ranks.push(origin_ranks[i]);
                }
            }
            let missed_dist = Distributor::from_sends(&comm, &missed_ranks, TAG_MISSED_DIST)?;
            let echoed = missed_dist.exchange(&comm, &missed_ordinals, 1)?;
            for gid in echoed {
                let local = *target_g2l
                    .get(&gid)
                    .ok_or(TransferError::UnknownGlobalId(gid))?;
                missed_points.push(local);
            }
        }

        // Keep only the found points for the source side.
        let mut found_ordinals = Vec::new();
        let mut found_elements = Vec::new();
        let mut found_src_ranks = Vec::new();
        let mut found_indices = Vec::new();
        for (i, &elem) in rendezvous_elements.iter().enumerate() {
            if elem != INVALID_ELEMENT {
                found_ordinals.push(rendezvous_points[i]);
                found_elements.push(elem);
                found_src_ranks.push(rendezvous_src_procs[i] as usize);
                found_indices.push(i);
            }
        }
        let n_rdv = rendezvous_points.len();
        let mut found_coords = vec![0.0f64; self.dim * found_indices.len()];
        for (k, &i) in found_indices.iter().enumerate() {
            for d in 0..self.dim {
                found_coords[d * found_indices.len() + k] = rendezvous_coords[d * n_rdv + i];
            }
        }

        // Ship (ordinal, element) pairs and coordinates to the owning source
        // ranks.
        let r2s_dist = Distributor::from_sends(&comm, &found_src_ranks, TAG_R2S_DIST)?;
        let source_elements = r2s_dist.exchange(&comm, &found_elements, 1)?;
        let source_points = r2s_dist.exchange(&comm, &found_ordinals, 1)?;
        let source_map = GlobalIdMap::new(source_points)?;

        let found_map = GlobalIdMap::new(found_ordinals)?;
        let r2s_exporter = Exporter::from_destinations(
            &comm,
            &found_map,
            &source_map,
            &found_src_ranks,
            TAG_R2S_COORD,
        )?;
        let mut target_coords = vec![0.0f64; self.dim * source_map.len()];
        r2s_exporter.apply(&comm, &found_coords, &mut target_coords, self.dim)?;

        debug_assert_eq!(source_elements.len(), target_coords.len() / self.dim.max(1));

        // The persistent plan: ordinal owners fall straight out of the
        // rank·G + n scheme.
        let export_dests: Vec<usize> = source_map
            .ids()
            .iter()
            .map(|&gid| (gid / stride.max(1)) as usize)
            .collect();
        let source_to_target = Exporter::from_destinations(
            &comm,
            &source_map,
            &target_map,
            &export_dests,
            TAG_S2T_EXPORT,
        )?;

        self.state = Some(MapState {
            target_map,
            source_map,
            source_elements,
            target_coords,
            source_to_target,
            target_indexer,
            missed_points,
        });
        Ok(())
    }

    /// Evaluate the source field at the mapped points and export the values
    /// into the target buffer. Unmapped points read zero.
    pub fn apply<E: FieldEvaluator, F: Field>(
        &self,
        evaluator: Option<&E>,
        target: Option<&mut FieldManager<F>>,
    ) -> Result<(), TransferError> {
        let comm = &self.comm;
        let state = self.state.as_ref().ok_or(TransferError::MapNotSetup)?;

        // All ranks need the field dimension; the target root defines it.
        let root = state
            .target_indexer
            .root()
            .ok_or(TransferError::MapNotSetup)?;
        let mut field_dim = target.as_ref().map_or(0u64, |t| t.field().dim() as u64);
        broadcast(comm, root, std::slice::from_mut(&mut field_dim), TAG_FIELD_DIM)?;
        let field_dim = field_dim as usize;

        let n_src = state.source_map.len();
        let source_values: Vec<f64> = match evaluator {
            Some(ev) => {
                let result = ev.evaluate(&state.source_elements, &state.target_coords);
                if result.dim() != field_dim {
                    return Err(TransferError::EvaluatorDimension {
                        expected: field_dim,
                        actual: result.dim(),
                    });
                }
                if result.size() != n_src * field_dim {
                    return Err(TransferError::EvaluatorSize {
                        expected: n_src * field_dim,
                        actual: result.size(),
                    });
                }
                result.into_data()
            }
            None => {
                if n_src > 0 {
                    return Err(TransferError::EvaluatorSize {
                        expected: n_src * field_dim,
                        actual: 0,
                    });
                }
                Vec::new()
            }
        };

        match target {
            Some(t) => {
                let field = t.field_mut();
                if field.dim() != field_dim {
                    return Err(TransferError::DimensionMismatch {
                        expected: field_dim,
                        actual: field.dim(),
                    });
                }
                if field.size() != state.target_map.len() * field_dim {
                    return Err(TransferError::TargetSizeMismatch {
                        expected: state.target_map.len() * field_dim,
                        actual: field.size(),
                    });
                }
                put_scalar(field, 0.0);
                state
                    .source_to_target
                    .apply(comm, &source_values, field.view_mut(), field_dim)?;
            }
            None => {
                if !state.target_map.is_empty() {
                    return Err(TransferError::TargetSizeMismatch {
                        expected: state.target_map.len() * field_dim,
                        actual: 0,
                    });
                }
                let mut empty: Vec<f64> = Vec::new();
                state
                    .source_to_target
                    .apply(comm, &source_values, &mut empty, field_dim)?;
            }
        }
        Ok(())
    }

    /// Local indices of the target points the map could not place. Requires
    /// `store_missed_points`.
    pub fn missed_target_points(&self) -> Result<&[usize], TransferError> {
        if !self.store_missed_points {
            return Err(TransferError::MissedPointsNotStored);
        }
        let state = self.state.as_ref().ok_or(TransferError::MapNotSetup)?;
        Ok(&state.missed_points)
    }

    /// Element ids this rank will be asked to evaluate (one per mapped
    /// point owned source-side).
    pub fn source_elements(&self) -> Result<&[u64], TransferError> {
        Ok(&self.state.as_ref().ok_or(TransferError::MapNotSetup)?.source_elements)
    }

    /// Blocked coordinates paired with [`source_elements`].
    ///
    /// [`source_elements`]: SharedDomainMap::source_elements
    pub fn source_coords(&self) -> Result<&[f64], TransferError> {
        Ok(&self.state.as_ref().ok_or(TransferError::MapNotSetup)?.target_coords)
    }
}
