//! Mesh manager: block aggregation, active-entity bitmaps, and vertex
//! indexing.

use hashbrown::HashMap;

use crate::geometry::bounding_box::BoundingBox;
use crate::mesh::traits::MeshBlock;
use crate::transfer_error::TransferError;

/// Aggregates the mesh blocks a rank contributes to a transfer problem.
///
/// The manager is communicator-free: global reductions (element counts,
/// bounding boxes) are performed by the rendezvous engine and the maps over
/// the parent communicator, so ranks holding no mesh still participate in
/// every collective.
#[derive(Debug)]
pub struct MeshManager<M> {
    blocks: Vec<M>,
    dim: usize,
    active_vertices: Vec<Vec<bool>>,
    active_elements: Vec<Vec<bool>>,
    vertex_index: Vec<HashMap<u64, usize>>,
}

impl<M: MeshBlock> MeshManager<M> {
    /// Validate and take ownership of `blocks`. All entities start active.
    pub fn new(blocks: Vec<M>, dim: usize) -> Result<Self, TransferError> {
        if !(1..=3).contains(&dim) {
            return Err(TransferError::DimensionMismatch {
                expected: 3,
                actual: dim,
            });
        }
        let mut active_vertices = Vec::with_capacity(blocks.len());
        let mut active_elements = Vec::with_capacity(blocks.len());
        let mut vertex_index = Vec::with_capacity(blocks.len());
        for (b, block) in blocks.iter().enumerate() {
            let malformed = |detail: String| TransferError::MalformedBlock { block: b, detail };
            if block.topology().dimension() != dim {
                return Err(TransferError::DimensionMismatch {
                    expected: dim,
                    actual: block.topology().dimension(),
                });
            }
            let nv = block.num_vertices();
            let ne = block.num_elements();
            let vpe = block.vertices_per_element();
            if block.coordinates().len() != dim * nv {
                return Err(malformed(format!(
                    "coordinate array holds {} values, expected {}",
                    block.coordinates().len(),
                    dim * nv
                )));
            }
            // Partitioning and tree construction order by coordinate; a NaN
            // or infinity must not get past construction.
            for (i, &c) in block.coordinates().iter().enumerate() {
                if !c.is_finite() {
                    return Err(TransferError::NonFiniteCoordinate {
                        entity: i % nv,
                        axis: i / nv,
                        value: c,
                    });
                }
            }
            if block.connectivity().len() != vpe * ne {
                return Err(malformed(format!(
                    "connectivity holds {} entries, expected {}",
                    block.connectivity().len(),
                    vpe * ne
                )));
            }
            let mut seen = vec![false; vpe];
            let valid_perm = block.permutation().len() == vpe
                && block.permutation().iter().all(|&p| {
                    p < vpe && !std::mem::replace(&mut seen[p], true)
                });
            if !valid_perm {
                return Err(malformed(format!(
                    "permutation {:?} is not a permutation of 0..{}",
                    block.permutation(),
                    vpe
                )));
            }
            let mut index = HashMap::with_capacity(nv);
            for (n, &gid) in block.vertex_ids().iter().enumerate() {
                if index.insert(gid, n).is_some() {
                    return Err(malformed(format!("vertex id {gid} appears twice")));
                }
            }
            for &gid in block.connectivity() {
                if !index.contains_key(&gid) {
                    return Err(malformed(format!(
                        "connectivity references vertex id {gid} not in the vertex array"
                    )));
                }
            }
            active_vertices.push(vec![true; nv]);
            active_elements.push(vec![true; ne]);
            vertex_index.push(index);
        }
        Ok(Self {
            blocks,
            dim,
            active_vertices,
            active_elements,
            vertex_index,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, b: usize) -> &M {
        &self.blocks[b]
    }

    pub fn blocks(&self) -> &[M] {
        &self.blocks
    }

    pub fn local_num_elements(&self) -> usize {
        self.blocks.iter().map(|b| b.num_elements()).sum()
    }

    /// Tight box over every vertex this rank holds; empty for a bare manager.
    pub fn local_bounding_box(&self) -> BoundingBox {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        let mut any = false;
        for block in &self.blocks {
            let nv = block.num_vertices();
            for n in 0..nv {
                any = true;
                let c = block.vertex_coord(n, self.dim);
                for d in 0..self.dim {
                    lo[d] = lo[d].min(c[d]);
                    hi[d] = hi[d].max(c[d]);
                }
            }
        }
        if !any {
            return BoundingBox::empty();
        }
        BoundingBox::from_extents(self.dim, &lo, &hi).expect("vertex extents are ordered")
    }

    /// Local index of a vertex global id within block `b`.
    pub fn local_vertex_index(&self, b: usize, gid: u64) -> Option<usize> {
        self.vertex_index[b].get(&gid).copied()
    }

    /// Coordinates of canonical vertex `i` of element `e` in block `b`.
    pub fn element_vertex_coord(&self, b: usize, e: usize, i: usize) -> [f64; 3] {
        let block = &self.blocks[b];
        let slot = block.permutation()[i];
        let gid = block.connectivity_entry(slot, e);
        let n = self.local_vertex_index(b, gid).expect("connectivity closure");
        block.vertex_coord(n, self.dim)
    }

    pub fn set_active_vertices(&mut self, b: usize, active: Vec<bool>) {
        debug_assert_eq!(active.len(), self.blocks[b].num_vertices());
        self.active_vertices[b] = active;
    }

    pub fn set_active_elements(&mut self, b: usize, active: Vec<bool>) {
        debug_assert_eq!(active.len(), self.blocks[b].num_elements());
        self.active_elements[b] = active;
    }

    pub fn active_vertices(&self, b: usize) -> &[bool] {
        &self.active_vertices[b]
    }

    pub fn active_elements(&self, b: usize) -> &[bool] {
        &self.active_elements[b]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::container::MeshContainer;
    use crate::topology::cell_type::CellTopology;

    fn two_line_block() -> MeshContainer {
        // Vertices 10, 20, 30 at x = 0, 1, 2; elements 100 (10-20), 200 (20-30).
        MeshContainer::new(
            vec![10, 20, 30],
            vec![0.0, 1.0, 2.0],
            CellTopology::Line,
            vec![100, 200],
            vec![10, 20, 20, 30],
            MeshContainer::identity_permutation(CellTopology::Line),
        )
    }

    #[test]
    fn valid_block_indexes_vertices() {
        let mgr = MeshManager::new(vec![two_line_block()], 1).unwrap();
        assert_eq!(mgr.local_num_elements(), 2);
        assert_eq!(mgr.local_vertex_index(0, 20), Some(1));
        assert_eq!(mgr.local_bounding_box().bounds()[0], 0.0);
        assert_eq!(mgr.local_bounding_box().bounds()[3], 2.0);
        assert_eq!(mgr.element_vertex_coord(0, 1, 0)[0], 1.0);
    }

    #[test]
    fn duplicate_vertex_id_rejected() {
        let block = MeshContainer::new(
            vec![10, 10],
            vec![0.0, 1.0],
            CellTopology::Line,
            vec![100],
            vec![10, 10],
            MeshContainer::identity_permutation(CellTopology::Line),
        );
        let err = MeshManager::new(vec![block], 1).unwrap_err();
        assert!(matches!(err, TransferError::MalformedBlock { block: 0, .. }));
    }

    #[test]
    fn dangling_connectivity_rejected() {
        let block = MeshContainer::new(
            vec![10, 20],
            vec![0.0, 1.0],
            CellTopology::Line,
            vec![100],
            vec![10, 99],
            MeshContainer::identity_permutation(CellTopology::Line),
        );
        assert!(MeshManager::new(vec![block], 1).is_err());
    }

    #[test]
    fn non_finite_coordinate_rejected() {
        let block = MeshContainer::new(
            vec![10, 20],
            vec![0.0, f64::NAN],
            CellTopology::Line,
            vec![100],
            vec![10, 20],
            MeshContainer::identity_permutation(CellTopology::Line),
        );
        assert!(matches!(
            MeshManager::new(vec![block], 1),
            Err(TransferError::NonFiniteCoordinate {
                entity: 1,
                axis: 0,
                ..
            })
        ));
    }

    #[test]
    fn topology_dimension_must_match() {
        let block = MeshContainer::new(
            vec![10, 20],
            vec![0.0, 1.0, 0.0, 1.0],
            CellTopology::Line,
            vec![100],
            vec![10, 20],
            MeshContainer::identity_permutation(CellTopology::Line),
        );
        assert!(matches!(
            MeshManager::new(vec![block], 2),
            Err(TransferError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn empty_manager_is_legal() {
        let mgr = MeshManager::<MeshContainer>::new(vec![], 3).unwrap();
        assert_eq!(mgr.local_num_elements(), 0);
        assert!(mgr.local_bounding_box().is_empty());
    }
}
