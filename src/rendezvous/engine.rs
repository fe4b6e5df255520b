//! Rendezvous engine: redistributes the source mesh into a geometrically
//! load-balanced decomposition and answers containment queries there.
//!
//! Build order is fixed: filter the mesh against the expanded shared-domain
//! box, construct the spatial partition from the surviving coordinates,
//! migrate elements then vertices through inverse communication, move
//! coordinates and connectivity through non-contiguous ordinal maps, build
//! the search tree, barrier. A rank without source mesh participates in
//! every collective with empty contributions.

use hashbrown::HashMap;
use std::collections::BTreeSet;

use crate::comm::collective::{all_reduce_sum_u64, broadcast};
use crate::comm::communicator::{CommTag, Communicator};
use crate::comm::distributor::Distributor;
use crate::comm::indexer::CommIndexer;
use crate::geometry::bounding_box::BoundingBox;
use crate::geometry::primitive::Geometry;
use crate::map::global_map::{Exporter, GlobalIdMap};
use crate::mesh::container::MeshContainer;
use crate::mesh::manager::MeshManager;
use crate::mesh::traits::MeshBlock;
use crate::partition::{build_partition, sample_coordinates, RendezvousPartition, SamplePoint};
use crate::search::element_tree::{ElementTree, INVALID_ELEMENT};
use crate::topology::cell_type::CellTopology;
use crate::transfer_error::TransferError;

const TAG_ELEM_COUNT: CommTag = CommTag::new(0x0100);
const TAG_SAMPLE: CommTag = CommTag::new(0x0104);
const TAG_INDEXER: CommTag = CommTag::new(0x0108);
const TAG_NUM_BLOCKS: CommTag = CommTag::new(0x010C);
const TAG_ELEM_DIST: CommTag = CommTag::new(0x0110);
const TAG_VERT_DIST: CommTag = CommTag::new(0x0114);
const TAG_COORD_EXPORT: CommTag = CommTag::new(0x0118);
const TAG_CONN_EXPORT: CommTag = CommTag::new(0x011C);
const TAG_BLOCK_META: CommTag = CommTag::new(0x0120);

struct BuiltState {
    partition: RendezvousPartition,
    mesh: MeshManager<MeshContainer>,
    tree: ElementTree,
    element_src_ranks: HashMap<u64, usize>,
}

/// Rendezvous decomposition over a shared-domain box.
pub struct Rendezvous<C: Communicator> {
    comm: C,
    dim: usize,
    global_box: BoundingBox,
    built: Option<BuiltState>,
}

impl<C: Communicator> Rendezvous<C> {
    /// Construction records the communicator, dimension, and box; no mesh
    /// is touched until [`build`](Rendezvous::build).
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

    /// Build the rendezvous decomposition. `mesh` may be `None` on ranks
    /// holding no source data; the call is collective either way.
    pub fn build<M: MeshBlock + Sync>(
        &mut self,
        mut mesh: Option<&mut MeshManager<M>>,
    ) -> Result<(), TransferError> {
        let local_elements = mesh.as_deref().map_or(0, |m| m.local_num_elements()) as u64;
        let global_elements = all_reduce_sum_u64(&self.comm, local_elements, TAG_ELEM_COUNT)?;
        if global_elements == 0 {
            return Err(TransferError::EmptySource);
        }

        // Expand by a typical element length plus slack; the
        // over-approximation keeps boundary elements feeding the partition.
        let typical_length =
            (self.global_box.volume(self.dim) / global_elements as f64).powf(1.0 / self.dim as f64);
        self.global_box = self.global_box.expanded(typical_length + 1.0e-4);

        if let Some(m) = mesh.as_deref_mut() {
            flag_mesh_in_box(m, &self.global_box);
        }

        let sample = self.active_vertex_sample(mesh.as_deref());
        let partition = build_partition(&self.comm, &self.global_box, self.dim, &sample, TAG_SAMPLE)?;

        let (rendezvous_mesh, element_src_ranks) =
            self.migrate_mesh(mesh.as_deref(), &partition)?;
        let tree = ElementTree::build(&rendezvous_mesh)?;

        self.built = Some(BuiltState {
            partition,
            mesh: rendezvous_mesh,
            tree,
            element_src_ranks,
        });
        self.comm.barrier();
        Ok(())
    }

    /// The (expanded) box the decomposition was generated in.
    pub fn global_box(&self) -> &BoundingBox {
        &self.global_box
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn built(&self) -> Result<&BuiltState, TransferError> {
        self.built.as_ref().ok_or(TransferError::RendezvousNotBuilt)
    }

    /// The mesh held by this rank in rendezvous space.
    pub fn rendezvous_mesh(&self) -> Result<&MeshManager<MeshContainer>, TransferError> {
        Ok(&self.built()?.mesh)
    }

    /// Rendezvous destination rank for each point of a blocked coordinate
    /// list in the primary decomposition. Pure local query.
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

    /// Rendezvous destination ranks for each box; a box may span several.
    pub fn procs_containing_boxes(
        &self,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Vec<usize>>, TransferError> {
        let built = self.built()?;
        Ok(boxes
            .iter()
            .map(|b| built.partition.box_destinations(b))
            .collect())
    }

    /// Containing element and its source rank for each point of a blocked
    /// coordinate list already in rendezvous space. Misses report
    /// [`INVALID_ELEMENT`] and source rank -1.
    pub fn elements_containing_points(
        &self,
        coords: &[f64],
        tolerance: f64,
    ) -> Result<(Vec<u64>, Vec<i32>), TransferError> {
        if tolerance <= 0.0 {
            return Err(TransferError::InvalidTolerance(tolerance));
        }
        let built = self.built()?;
        let num_points = coords.len() / self.dim;
        let mut elements = Vec::with_capacity(num_points);
        let mut src_ranks = Vec::with_capacity(num_points);
        let mut point = [0.0; 3];
        for n in 0..num_points {
            for d in 0..self.dim {
                point[d] = coords[d * num_points + n];
            }
            match built.tree.find_point(&built.mesh, &point[..self.dim], tolerance) {
                Some(gid) => {
                    let src = *built.element_src_ranks.get(&gid).ok_or_else(|| {
                        TransferError::invariant(
                            self.comm.rank(),
                            format!("element {gid} in tree but not in source-rank map"),
                        )
                    })?;
                    elements.push(gid);
                    src_ranks.push(src as i32);
                }
                None => {
                    elements.push(INVALID_ELEMENT);
                    src_ranks.push(-1);
                }
            }
        }
        Ok((elements, src_ranks))
    }

    /// Rendezvous elements lying in each geometric object. With
    /// `all_vertices` every element vertex must sit inside the geometry
    /// within `tolerance`; otherwise one vertex suffices.
    pub fn elements_in_geometry<G: Geometry>(
        &self,
        geometry: &[G],
        tolerance: f64,
        all_vertices: bool,
    ) -> Result<Vec<Vec<u64>>, TransferError> {
        let built = self.built()?;
        let mesh = &built.mesh;
        let mut out: Vec<Vec<u64>> = vec![Vec::new(); geometry.len()];
        // Elements are the outer loop so coordinates are extracted once.
        for b in 0..mesh.num_blocks() {
            let block = mesh.block(b);
            let vpe = block.vertices_per_element();
            let mut verts = [[0.0; 3]; 8];
            for e in 0..block.num_elements() {
                for (i, slot) in verts.iter_mut().enumerate().take(vpe) {
                    *slot = mesh.element_vertex_coord(b, e, i);
                }
                for (g, geom) in geometry.iter().enumerate() {
                    let node_in = |v: &[f64; 3]| geom.contains_point(&v[..], tolerance);
                    let included = if all_vertices {
                        verts[..vpe].iter().all(node_in)
                    } else {
                        verts[..vpe].iter().any(node_in)
                    };
                    if included {
                        out[g].push(block.element_ids()[e]);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Source ranks for a list of rendezvous element ids.
    pub fn element_source_ranks(&self, elements: &[u64]) -> Result<Vec<i32>, TransferError> {
        let built = self.built()?;
        Ok(elements
            .iter()
            .map(|gid| built.element_src_ranks.get(gid).map_or(-1, |&r| r as i32))
            .collect())
    }

    fn active_vertex_sample<M: MeshBlock>(
        &self,
        mesh: Option<&MeshManager<M>>,
    ) -> Vec<SamplePoint> {
        let Some(m) = mesh else {
            return Vec::new();
        };
        let mut sample = Vec::new();
        for b in 0..m.num_blocks() {
            let block = m.block(b);
            let active = m.active_vertices(b);
            let seed = self.comm.rank() * m.num_blocks().max(1) + b;
            sample.extend(sample_coordinates(
                block.coordinates(),
                block.num_vertices(),
                self.dim,
                |n| active[n],
                seed,
            ));
        }
        sample
    }

    /// Move every active element and its vertices to their rendezvous
    /// ranks, rebuilding the blocks there.
    fn migrate_mesh<M: MeshBlock>(
        &self,
        mesh: Option<&MeshManager<M>>,
        partition: &RendezvousPartition,
    ) -> Result<(MeshManager<MeshContainer>, HashMap<u64, usize>), TransferError> {
        let comm = &self.comm;
        let indexer = CommIndexer::new(comm, mesh.is_some(), TAG_INDEXER)?;
        let root = indexer.root().ok_or(TransferError::EmptySource)?;

        let mut num_blocks = mesh.map_or(0u64, |m| m.num_blocks() as u64);
        broadcast(comm, root, std::slice::from_mut(&mut num_blocks), TAG_NUM_BLOCKS)?;
        if let Some(m) = mesh {
            if m.num_blocks() as u64 != num_blocks {
                return Err(TransferError::invariant(
                    comm.rank(),
                    format!(
                        "source ranks disagree on block count ({} here, {} at root)",
                        m.num_blocks(),
                        num_blocks
                    ),
                ));
            }
        }

        let mut element_src_ranks = HashMap::new();
        let mut containers = Vec::with_capacity(num_blocks as usize);
        for block_id in 0..num_blocks as usize {
            containers.push(self.migrate_block(
                mesh,
                block_id,
                partition,
                root,
                &mut element_src_ranks,
            )?);
        }

        let manager = MeshManager::new(containers, self.dim)?;
        Ok((manager, element_src_ranks))
    }

    fn migrate_block<M: MeshBlock>(
        &self,
        mesh: Option<&MeshManager<M>>,
        block_id: usize,
        partition: &RendezvousPartition,
        root: usize,
        element_src_ranks: &mut HashMap<u64, usize>,
    ) -> Result<MeshContainer, TransferError> {
        let comm = &self.comm;
        let block = mesh.map(|m| m.block(block_id));

        // Destination of every local vertex under the rendezvous partition.
        let vertex_dests: Vec<usize> = match block {
            Some(b) => {
                let nv = b.num_vertices();
                (0..nv)
                    .map(|n| {
                        let c = b.vertex_coord(n, self.dim);
                        partition.point_destination(&c[..self.dim])
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        // An element goes to every rank one of its vertices maps to; flatten
        // the destination sets into parallel (element, rank) arrays.
        let mut export_elem_locals: Vec<usize> = Vec::new();
        let mut export_elem_ids: Vec<u64> = Vec::new();
        let mut export_elem_dests: Vec<usize> = Vec::new();
        if let (Some(m), Some(b)) = (mesh, block) {
            let active = m.active_elements(block_id);
            let vpe = b.vertices_per_element();
            for e in 0..b.num_elements() {
                if !active[e] {
                    continue;
                }
                let mut dests = BTreeSet::new();
                for i in 0..vpe {
                    let gid = b.connectivity_entry(i, e);
                    let n = m
                        .local_vertex_index(block_id, gid)
                        .expect("connectivity closure validated at construction");
                    dests.insert(vertex_dests[n]);
                }
                for dest in dests {
                    export_elem_locals.push(e);
                    export_elem_ids.push(b.element_ids()[e]);
                    export_elem_dests.push(dest);
                }
            }
        }

        let elem_dist = Distributor::from_sends(comm, &export_elem_dests, TAG_ELEM_DIST)?;
        let import_elem_ids = elem_dist.exchange(comm, &export_elem_ids, 1)?;
        let import_elem_srcs = elem_dist.source_ranks();

        // Sorted-unique rendezvous elements; the first arrival names the
        // source rank.
        let mut rendezvous_elem_set = BTreeSet::new();
        for (&gid, &src) in import_elem_ids.iter().zip(&import_elem_srcs) {
            if rendezvous_elem_set.insert(gid) {
                element_src_ranks.insert(gid, src);
            }
        }
        let rendezvous_elem_ids: Vec<u64> = rendezvous_elem_set.into_iter().collect();

        // A vertex follows every element it participates in.
        let mut export_vert_ids: Vec<u64> = Vec::new();
        let mut export_vert_dests: Vec<usize> = Vec::new();
        let mut vert_items: Vec<(usize, usize)> = Vec::new();
        if let (Some(m), Some(b)) = (mesh, block) {
            let vpe = b.vertices_per_element();
            let mut vert_dest_sets: Vec<BTreeSet<usize>> =
                vec![BTreeSet::new(); b.num_vertices()];
            for (&e, &dest) in export_elem_locals.iter().zip(&export_elem_dests) {
                for i in 0..vpe {
                    let gid = b.connectivity_entry(i, e);
                    let n = m
                        .local_vertex_index(block_id, gid)
                        .expect("connectivity closure validated at construction");
                    vert_dest_sets[n].insert(dest);
                }
            }
            for (n, dests) in vert_dest_sets.into_iter().enumerate() {
                for dest in dests {
                    export_vert_ids.push(b.vertex_ids()[n]);
                    export_vert_dests.push(dest);
                    vert_items.push((n, dest));
                }
            }
        }

        let vert_dist = Distributor::from_sends(comm, &export_vert_dests, TAG_VERT_DIST)?;
        let import_vert_ids = vert_dist.exchange(comm, &export_vert_ids, 1)?;
        let rendezvous_vert_ids: Vec<u64> = {
            let set: BTreeSet<u64> = import_vert_ids.into_iter().collect();
            set.into_iter().collect()
        };

        // Broadcast the small per-block metadata from the sub-comm root.
        let mut meta = [0u64; 2];
        if let Some(b) = block {
            meta = [b.vertices_per_element() as u64, b.topology().as_tag() as u64];
        }
        broadcast(comm, root, &mut meta, TAG_BLOCK_META)?;
        let vpe = meta[0] as usize;
        let topology = CellTopology::from_tag(meta[1] as u32)?;
        let mut permutation = vec![0u64; vpe];
        if let Some(b) = block {
            for (i, p) in b.permutation().iter().enumerate() {
                permutation[i] = *p as u64;
            }
        }
        broadcast(comm, root, &mut permutation, TAG_BLOCK_META.offset(1))?;
        let permutation: Vec<usize> = permutation.into_iter().map(|p| p as usize).collect();

        // Coordinates ride a vertex exporter keyed by the same destination
        // sets; connectivity rides an element exporter.
        let source_vert_map = GlobalIdMap::new(block.map_or(Vec::new(), |b| b.vertex_ids().to_vec()))?;
        let target_vert_map = GlobalIdMap::new(rendezvous_vert_ids.clone())?;
        let vert_exporter = Exporter::new(
            comm,
            &source_vert_map,
            &target_vert_map,
            &vert_items,
            TAG_COORD_EXPORT,
        )?;
        let mut coordinates = vec![0.0f64; self.dim * rendezvous_vert_ids.len()];
        let empty_coords: [f64; 0] = [];
        vert_exporter.apply(
            comm,
            block.map_or(&empty_coords[..], |b| b.coordinates()),
            &mut coordinates,
            self.dim,
        )?;

        let source_elem_map =
            GlobalIdMap::new(block.map_or(Vec::new(), |b| b.element_ids().to_vec()))?;
        let target_elem_map = GlobalIdMap::new(rendezvous_elem_ids.clone())?;
        let elem_items: Vec<(usize, usize)> = export_elem_locals
            .iter()
            .copied()
            .zip(export_elem_dests.iter().copied())
            .collect();
        let elem_exporter = Exporter::new(
            comm,
            &source_elem_map,
            &target_elem_map,
            &elem_items,
            TAG_CONN_EXPORT,
        )?;
        let mut connectivity = vec![0u64; vpe * rendezvous_elem_ids.len()];
        let empty_conn: [u64; 0] = [];
        elem_exporter.apply(
            comm,
            block.map_or(&empty_conn[..], |b| b.connectivity()),
            &mut connectivity,
            vpe,
        )?;

        Ok(MeshContainer::new(
            rendezvous_vert_ids,
            coordinates,
            topology,
            rendezvous_elem_ids,
            connectivity,
            permutation,
        ))
    }
}

/// Mark active vertices and elements against the expanded box: a vertex is
/// active when inside, an element when any of its vertices is, and the
/// vertices of active elements are pulled in afterwards (the halo).
fn flag_mesh_in_box<M: MeshBlock>(mesh: &mut MeshManager<M>, expanded_box: &BoundingBox) {
    let dim = mesh.dim();
    for b in 0..mesh.num_blocks() {
        let block = mesh.block(b);
        let nv = block.num_vertices();
        let ne = block.num_elements();
        let vpe = block.vertices_per_element();

        let mut vertices_in_box = Vec::with_capacity(nv);
        for n in 0..nv {
            let c = block.vertex_coord(n, dim);
            vertices_in_box.push(expanded_box.contains_point(&c[..dim]));
        }

        let mut elements_in_box = Vec::with_capacity(ne);
        for e in 0..ne {
            let mut inside = false;
            for i in 0..vpe {
                let gid = block.connectivity_entry(i, e);
                let n = mesh
                    .local_vertex_index(b, gid)
                    .expect("connectivity closure validated at construction");
                if vertices_in_box[n] {
                    inside = true;
                }
            }
            elements_in_box.push(inside);
        }

        // Halo pull-in: vertices of in-box elements join even when they sit
        // outside the box themselves.
        for e in 0..ne {
            if elements_in_box[e] {
                for i in 0..vpe {
                    let gid = block.connectivity_entry(i, e);
                    let n = mesh
                        .local_vertex_index(b, gid)
                        .expect("connectivity closure validated at construction");
                    vertices_in_box[n] = true;
                }
            }
        }

        mesh.set_active_vertices(b, vertices_in_box);
        mesh.set_active_elements(b, elements_in_box);
    }
}
