//! Concrete mesh block.
//!
//! The rendezvous decomposition is rebuilt into these containers after
//! migration; user code may also use them directly as its mesh type.

use crate::mesh::traits::MeshBlock;
use crate::topology::cell_type::CellTopology;

/// Owned single-topology mesh block in the blocked layouts the façade
/// documents. Structural validation happens when a
/// [`MeshManager`](crate::mesh::manager::MeshManager) takes ownership.
#[derive(Debug, Clone)]
pub struct MeshContainer {
    vertex_ids: Vec<u64>,
    coordinates: Vec<f64>,
    element_ids: Vec<u64>,
    connectivity: Vec<u64>,
    permutation: Vec<usize>,
    topology: CellTopology,
}

impl MeshContainer {
    pub fn new(
        vertex_ids: Vec<u64>,
        coordinates: Vec<f64>,
        topology: CellTopology,
        element_ids: Vec<u64>,
        connectivity: Vec<u64>,
        permutation: Vec<usize>,
    ) -> Self {
        Self {
            vertex_ids,
            coordinates,
            element_ids,
            connectivity,
            permutation,
            topology,
        }
    }

    /// Identity permutation for meshes already in canonical vertex order.
    pub fn identity_permutation(topology: CellTopology) -> Vec<usize> {
        (0..topology.num_vertices()).collect()
    }
}

impl MeshBlock for MeshContainer {
    fn vertex_ids(&self) -> &[u64] {
        &self.vertex_ids
    }

    fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    fn element_ids(&self) -> &[u64] {
        &self.element_ids
    }

    fn connectivity(&self) -> &[u64] {
        &self.connectivity
    }

    fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    fn topology(&self) -> CellTopology {
        self.topology
    }
}
