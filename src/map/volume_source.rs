//! Volume-source map: the shared-domain skeleton over geometric primitives.
//!
//! Identical contracts to [`SharedDomainMap`](crate::map::SharedDomainMap)
//! with "element containing point" replaced by "geometry containing point";
//! the evaluator receives geometry gids.

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
use crate::geometry::manager::GeometryManager;
use crate::geometry::primitive::Geometry;
use crate::map::global_map::{Exporter, GlobalIdMap};
use crate::map::{compute_point_ordinals, gathered_union_box};
use crate::rendezvous::geometry_rendezvous::GeometryRendezvous;
use crate::search::element_tree::INVALID_ELEMENT;
use crate::transfer_error::TransferError;

const TAG_SRC_INDEXER: CommTag = CommTag::new(0x0400);
const TAG_TGT_INDEXER: CommTag = CommTag::new(0x0404);
const TAG_ORDINALS: CommTag = CommTag::new(0x0408);
const TAG_SRC_BOX: CommTag = CommTag::new(0x040C);
const TAG_TGT_BOX: CommTag = CommTag::new(0x0410);
const TAG_T2R_DIST: CommTag = CommTag::new(0x0414);
const TAG_T2R_COORD: CommTag = CommTag::new(0x0418);
const TAG_MISSED_DIST: CommTag = CommTag::new(0x041C);
const TAG_R2S_DIST: CommTag = CommTag::new(0x0420);
const TAG_R2S_COORD: CommTag = CommTag::new(0x0424);
const TAG_S2T_EXPORT: CommTag = CommTag::new(0x0428);
const TAG_FIELD_DIM: CommTag = CommTag::new(0x042C);

struct MapState {
    target_map: GlobalIdMap,
    source_geometries: Vec<u64>,
    target_coords: Vec<f64>,
    source_to_target: Exporter,
    target_indexer: CommIndexer,
    missed_points: Vec<usize>,
}

pub struct VolumeSourceMap<C: Communicator> {
    comm: C,
    dim: usize,
    store_missed_points: bool,
    tolerance: f64,
    state: Option<MapState>,
}

impl<C: Communicator + Clone> VolumeSourceMap<C> {
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

    pub fn setup<G: Geometry, F: Field>(
        &mut self,
        source: Option<&GeometryManager<G>>,
        target: Option<&FieldManager<F>>,
    ) -> Result<(), TransferError> {
        let comm = self.comm.clone();

        if let Some(m) = source {
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

        let local_points = target.map_or(0, |t| t.field().num_entries());
        let (stride, target_ordinals) = compute_point_ordinals(&comm, local_points, TAG_ORDINALS)?;
        let mut target_g2l: HashMap<u64, usize> = HashMap::new();
        if self.store_missed_points {
            for (n, &gid) in target_ordinals.iter().enumerate() {
                target_g2l.insert(gid, n);
            }
        }
        let target_map = GlobalIdMap::new(target_ordinals)?;

        let source_box =
            gathered_union_box(&comm, source.map(|m| m.local_bounding_box()), TAG_SRC_BOX)?
                .ok_or(TransferError::EmptySource)?;
        let target_box = gathered_union_box(
            &comm,
            target.map(|t| local_coord_bounding_box(t.field(), self.dim)),
            TAG_TGT_BOX,
        )?
        .ok_or(TransferError::DisjointDomains)?;
        let shared_box = BoundingBox::intersection(&source_box, &target_box)
            .ok_or(TransferError::DisjointDomains)?;

        let mut rendezvous = GeometryRendezvous::new(comm.clone(), self.dim, shared_box)?;
        rendezvous.build(source)?;

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

        let (rendezvous_geoms, rendezvous_src_procs) =
            rendezvous.geometries_containing_points(&rendezvous_coords, self.tolerance)?;

        if self.store_missed_points {
            let origin_ranks = t2r_dist.source_ranks();
            let mut missed_ordinals = Vec::new();
            let mut missed_ranks = Vec::new();
            for (i, &gid) in rendezvous_geoms.iter().enumerate() {
                if gid == INVALID_ELEMENT {
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

        let mut found_ordinals = Vec::new();
        let mut found_geoms = Vec::new();
        let mut found_src_ranks = Vec::new();
        let mut found_indices = Vec::new();
        for (i, &gid) in rendezvous_geoms.iter().enumerate() {
            if gid != INVALID_ELEMENT {
                found_ordinals.push(rendezvous_points[i]);
                found_geoms.push(gid);
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

        let r2s_dist = Distributor::from_sends(&comm, &found_src_ranks, TAG_R2S_DIST)?;
        let source_geometries = r2s_dist.exchange(&comm, &found_geoms, 1)?;
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
            source_geometries,
            target_coords,
            source_to_target,
            target_indexer,
            missed_points,
        });
        Ok(())
    }

    pub fn apply<E: FieldEvaluator, F: Field>(
        &self,
        evaluator: Option<&E>,
        target: Option<&mut FieldManager<F>>,
    ) -> Result<(), TransferError> {
        let comm = &self.comm;
        let state = self.state.as_ref().ok_or(TransferError::MapNotSetup)?;

        let root = state
            .target_indexer
            .root()
            .ok_or(TransferError::MapNotSetup)?;
        let mut field_dim = target.as_ref().map_or(0u64, |t| t.field().dim() as u64);
        broadcast(comm, root, std::slice::from_mut(&mut field_dim), TAG_FIELD_DIM)?;
        let field_dim = field_dim as usize;

        let n_src = state.source_geometries.len();
        let source_values: Vec<f64> = match evaluator {
            Some(ev) => {
                let result = ev.evaluate(&state.source_geometries, &state.target_coords);
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

    /// Local indices of target points no geometry claimed. Requires
    /// `store_missed_points`.
    pub fn missed_target_points(&self) -> Result<&[usize], TransferError> {
        if !self.store_missed_points {
            return Err(TransferError::MissedPointsNotStored);
        }
        let state = self.state.as_ref().ok_or(TransferError::MapNotSetup)?;
        Ok(&state.missed_points)
    }
}
