//! Read-only mesh block façade.
//!
//! A block is the subset of a mesh with a single element topology. The core
//! only ever reads blocks through this trait, so any user mesh type can be
//! adapted without copying.
//!
//! Layout contracts (identical on every implementor):
//! - coordinates are blocked by dimension: `coords[d * num_vertices + n]`;
//! - connectivity is blocked by vertex slot: `conn[i * num_elements + e]`,
//!   and entries are vertex *global ids*, not local indices;
//! - `permutation[i]` is the connectivity slot holding canonical vertex `i`.

use crate::topology::cell_type::CellTopology;

pub trait MeshBlock {
    /// Global ids of the vertices owned by this block.
    fn vertex_ids(&self) -> &[u64];

    /// Blocked vertex coordinates, `dim * num_vertices` long.
    fn coordinates(&self) -> &[f64];

    /// Global ids of the elements in this block.
    fn element_ids(&self) -> &[u64];

    /// Blocked connectivity, `vertices_per_element * num_elements` long.
    fn connectivity(&self) -> &[u64];

    /// Canonical-order permutation into connectivity slots.
    fn permutation(&self) -> &[usize];

    /// Element topology shared by every element of the block.
    fn topology(&self) -> CellTopology;

    fn num_vertices(&self) -> usize {
        self.vertex_ids().len()
    }

    fn num_elements(&self) -> usize {
        self.element_ids().len()
    }

    fn vertices_per_element(&self) -> usize {
        self.topology().num_vertices()
    }

    /// Coordinates of local vertex `n`, zero-padded to three components.
    fn vertex_coord(&self, n: usize, dim: usize) -> [f64; 3] {
        let coords = self.coordinates();
        let nv = self.num_vertices();
        let mut out = [0.0; 3];
        for (d, slot) in out.iter_mut().enumerate().take(dim) {
            *slot = coords[d * nv + n];
        }
        out
    }

    /// Global id of the vertex in connectivity slot `i` of element `e`.
    fn connectivity_entry(&self, i: usize, e: usize) -> u64 {
        self.connectivity()[i * self.num_elements() + e]
    }
}
