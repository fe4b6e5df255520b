//! Rendezvous backend for geometric source primitives.
//!
//! The mesh engine's skeleton with geometry in place of elements: primitives
//! migrate whole (they are `Pod`) to every rendezvous rank their bounding
//! box touches, and containment queries scan the local primitives in
//! ascending gid order.

use hashbrown::HashMap;

use crate::comm::collective::all_reduce_sum_u64;
use crate::comm::communicator::{CommTag, Communicator};
use crate::comm::distributor::Distributor;
use crate::geometry::bounding_box::BoundingBox;
use crate::geometry::manager::GeometryManager;
use crate::geometry::primitive::Geometry;
use crate::partition::{build_partition, RendezvousPartition, SamplePoint};
use crate::search::element_tree::INVALID_ELEMENT;
use crate::transfer_error::TransferError;

const TAG_GEOM_COUNT: CommTag = CommTag::new(0x0200);
const TAG_GEOM_SAMPLE: CommTag = CommTag::new(0x0204);
const TAG_GEOM_DIST: CommTag = CommTag::new(0x0208);

struct GeomBuiltState<G> {
    partition: RendezvousPartition,
    geometries: Vec<G>,
    gids: Vec<u64>,
    geometry_src_ranks: HashMap<u64, usize>,
}

pub struct GeometryRendezvous<C: Communicator, G: Geometry> {
    comm: C,
    dim: usize,
    global_box: BoundingBox,
    built: Option<GeomBuiltState<G>>,
}

impl<C: Communicator, G: Geometry> GeometryRendezvous<C, G> {
    pub fn new(comm: C, dim: usize, global_box: BoundingBox) -> Result<Self, TransferError> {
        if global_box.is_empty() {
            return Err(TransferError::DisjointDomains);
        }
        Ok(Self {
            comm,
            dim,
            global_box,
            built: None,
        })
    }

    /// Build the decomposition; collective even on ranks without geometry.
    pub fn build(&mut self, manager: Option<&GeometryManager<G>>) -> Result<(), TransferError> {
        let local = manager.map_or(0, |m| m.len()) as u64;
        let global = all_reduce_sum_u64(&self.comm, local, TAG_GEOM_COUNT)?;
        if global == 0 {
            return Err(TransferError::EmptySource);
        }

        let typical_length =
            (self.global_box.volume(self.dim) / global as f64).powf(1.0 / self.dim as f64);
        self.global_box = self.global_box.expanded(typical_length + 1.0e-4);

        // Primitives whose box misses the expanded shared box stay home.
        let active: Vec<usize> = manager.map_or(Vec::new(), |m| {
            (0..m.len())
                .filter(|&g| {
                    BoundingBox::intersection(&m.geometries()[g].bounding_box(), &self.global_box)
                        .is_some()
                })
                .collect()
        });

        let sample: Vec<SamplePoint> = manager.map_or(Vec::new(), |m| {
            active
                .iter()
                .map(|&g| SamplePoint {
                    coord: m.geometries()[g].centroid(),
                    weight: 1.0,
                })
                .collect()
        });
        let partition =
            build_partition(&self.comm, &self.global_box, self.dim, &sample, TAG_GEOM_SAMPLE)?;

        // A primitive goes to every rank its bounding box touches.
        let mut export_gids: Vec<u64> = Vec::new();
        let mut export_geoms: Vec<G> = Vec::new();
        let mut export_dests: Vec<usize> = Vec::new();
        if let Some(m) = manager {
            for &g in &active {
                for dest in partition.box_destinations(&m.geometries()[g].bounding_box()) {
                    export_gids.push(m.gids()[g]);
                    export_geoms.push(m.geometries()[g]);
                    export_dests.push(dest);
                }
            }
        }
        let dist = Distributor::from_sends(&self.comm, &export_dests, TAG_GEOM_DIST)?;
        let import_gids = dist.exchange(&self.comm, &export_gids, 1)?;
        let import_geoms = dist.exchange(&self.comm, &export_geoms, 1)?;
        let import_srcs = dist.source_ranks();

        // Deduplicate by gid, ascending; first arrival names the source.
        let mut by_gid: std::collections::BTreeMap<u64, (G, usize)> = std::collections::BTreeMap::new();
        for ((&gid, &geom), &src) in import_gids.iter().zip(&import_geoms).zip(&import_srcs) {
            by_gid.entry(gid).or_insert((geom, src));
        }
        let mut gids = Vec::with_capacity(by_gid.len());
        let mut geometries = Vec::with_capacity(by_gid.len());
        let mut geometry_src_ranks = HashMap::with_capacity(by_gid.len());
        for (gid, (geom, src)) in by_gid {
            gids.push(gid);
            geometries.push(geom);
            geometry_src_ranks.insert(gid, src);
        }

        self.built = Some(GeomBuiltState {
            partition,
            geometries,
            gids,
            geometry_src_ranks,
        });
        self.comm.barrier();
        Ok(())
    }

    pub fn global_box(&self) -> &BoundingBox {
        &self.global_box
    }

    fn built(&self) -> Result<&GeomBuiltState<G>, TransferError> {
        self.built.as_ref().ok_or(TransferError::RendezvousNotBuilt)
    }

    /// Rendezvous destination rank per point of a blocked coordinate list.
    pub fn procs_containing_points(&self, coords: &[f64]) -> Result<Vec<usize>, TransferError> {
        let built = self.built()?;
        let num_points = coords.len() / self.dim;
        let mut out = Vec::with_capacity(num_points);
        let mut point = [0.0; 3];
        for n in 0..num_points {
            for d in 0..self.dim {
                point[d] = coords[d * num_points + n];
            }
            out.push(built.partition.point_destination(&point[..self.dim]));
        }
        Ok(out)
    }

    /// Containing geometry (lowest gid wins) and its source rank per point;
    /// misses report [`INVALID_ELEMENT`] and -1.
    pub fn geometries_containing_points(
        &self,
        coords: &[f64],
        tolerance: f64,
    ) -> Result<(Vec<u64>, Vec<i32>), TransferError> {
        if tolerance <= 0.0 {
            return Err(TransferError::InvalidTolerance(tolerance));
        }
        let built = self.built()?;
        let num_points = coords.len() / self.dim;
        let mut geoms = Vec::with_capacity(num_points);
        let mut srcs = Vec::with_capacity(num_points);
        let mut point = [0.0; 3];
        for n in 0..num_points {
            for d in 0..self.dim {
                point[d] = coords[d * num_points + n];
            }
            let hit = built
                .geometries
                .iter()
                .zip(&built.gids)
                .find(|(g, _)| g.contains_point(&point, tolerance));
            match hit {
                Some((_, &gid)) => {
                    geoms.push(gid);
                    srcs.push(built.geometry_src_ranks[&gid] as i32);
                }
                None => {
                    geoms.push(INVALID_ELEMENT);
                    srcs.push(-1);
                }
            }
        }
        Ok((geoms, srcs))
    }
}
