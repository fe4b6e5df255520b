//! Local search tree over element bounding boxes.
//!
//! A static median-split hierarchy: inner nodes carry the union box of
//! their subtree, leaves hold up to [`LEAF_SIZE`] elements. `find_point`
//! walks every subtree whose box (grown by the tolerance) contains the
//! point, then confirms candidates against the reference cell in ascending
//! element-id order, so the winning element for a shared-face point does
//! not depend on tree shape.

use crate::geometry::bounding_box::BoundingBox;
use crate::mesh::manager::MeshManager;
use crate::mesh::traits::MeshBlock;
use crate::topology::point_in_cell::point_in_cell;
use crate::transfer_error::TransferError;

/// Sentinel returned for points not contained in any element.
pub const INVALID_ELEMENT: u64 = u64::MAX;

const LEAF_SIZE: usize = 8;

#[derive(Debug, Clone, Copy)]
struct ElementEntry {
    bounds: BoundingBox,
    centroid: [f64; 3],
    gid: u64,
    block: usize,
    local: usize,
}

#[derive(Debug, Clone, Copy)]
enum TreeNode {
    Leaf {
        bounds: BoundingBox,
        start: usize,
        end: usize,
    },
    Inner {
        bounds: BoundingBox,
        left: usize,
        right: usize,
    },
}

#[derive(Debug)]
pub struct ElementTree {
    entries: Vec<ElementEntry>,
    nodes: Vec<TreeNode>,
    dim: usize,
}

impl ElementTree {
    /// Build over every element of the manager.
    pub fn build<M: MeshBlock + Sync>(mesh: &MeshManager<M>) -> Result<Self, TransferError> {
        let dim = mesh.dim();
        let mut entries = Vec::with_capacity(mesh.local_num_elements());
        for b in 0..mesh.num_blocks() {
            entries.extend(block_entries(mesh, b));
        }
        // Stable ordering before the median splits keeps rebuilds identical.
        entries.sort_by(|a, b| a.gid.cmp(&b.gid));

        let mut tree = Self {
            entries,
            nodes: Vec::new(),
            dim,
        };
        if !tree.entries.is_empty() {
            tree.split(0, tree.entries.len());
        }
        Ok(tree)
    }

    pub fn num_elements(&self) -> usize {
        self.entries.len()
    }

    fn split(&mut self, start: usize, end: usize) -> usize {
        let bounds = self.entries[start..end]
            .iter()
            .fold(BoundingBox::empty(), |acc, e| {
                BoundingBox::union(&acc, &e.bounds)
            });
        if end - start <= LEAF_SIZE {
            self.nodes.push(TreeNode::Leaf { bounds, start, end });
            return self.nodes.len() - 1;
        }
        let axis = bounds.longest_axis(self.dim);
        let mid = start + (end - start) / 2;
        self.entries[start..end].select_nth_unstable_by(mid - start, |a, b| {
            a.centroid[axis]
                .total_cmp(&b.centroid[axis])
                .then(a.gid.cmp(&b.gid))
        });
        let slot = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            bounds,
            start: 0,
            end: 0,
        }); // placeholder
        let left = self.split(start, mid);
        let right = self.split(mid, end);
        self.nodes[slot] = TreeNode::Inner {
            bounds,
            left,
            right,
        };
        slot
    }

    /// First element containing `point` within `tol`, lowest global id
    /// winning among multiple candidates.
    pub fn find_point<M: MeshBlock>(
        &self,
        mesh: &MeshManager<M>,
        point: &[f64],
        tol: f64,
    ) -> Option<u64> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut candidates: Vec<&ElementEntry> = Vec::new();
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            match self.nodes[node] {
                TreeNode::Leaf { bounds, start, end } => {
                    if bounds.expanded(tol).contains_point(point) {
                        for entry in &self.entries[start..end] {
                            if entry.bounds.expanded(tol).contains_point(point) {
                                candidates.push(entry);
                            }
                        }
                    }
                }
                TreeNode::Inner {
                    bounds,
                    left,
                    right,
                } => {
                    if bounds.expanded(tol).contains_point(point) {
                        stack.push(left);
                        stack.push(right);
                    }
                }
            }
        }
        candidates.sort_by_key(|e| e.gid);
        for entry in candidates {
            let block = mesh.block(entry.block);
            let vpe = block.vertices_per_element();
            let mut verts = [[0.0; 3]; 8];
            for (i, slot) in verts.iter_mut().enumerate().take(vpe) {
                *slot = mesh.element_vertex_coord(entry.block, entry.local, i);
            }
            if point_in_cell(block.topology(), &verts[..vpe], self.dim, point, tol) {
                return Some(entry.gid);
            }
        }
        None
    }
}

fn element_entry<M: MeshBlock>(mesh: &MeshManager<M>, b: usize, e: usize) -> ElementEntry {
    let block = mesh.block(b);
    let dim = mesh.dim();
    let vpe = block.vertices_per_element();
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for i in 0..vpe {
        let gid = block.connectivity_entry(i, e);
        let n = mesh
            .local_vertex_index(b, gid)
            .expect("connectivity closure validated at construction");
        let c = block.vertex_coord(n, dim);
        for d in 0..dim {
            lo[d] = lo[d].min(c[d]);
            hi[d] = hi[d].max(c[d]);
        }
    }
    let bounds = BoundingBox::from_extents(dim, &lo, &hi).expect("element extents are ordered");
    ElementEntry {
        bounds,
        centroid: bounds.center(dim),
        gid: block.element_ids()[e],
        block: b,
        local: e,
    }
}

#[cfg(feature = "rayon")]
fn block_entries<M: MeshBlock + Sync>(mesh: &MeshManager<M>, b: usize) -> Vec<ElementEntry> {
    use rayon::prelude::*;
    (0..mesh.block(b).num_elements())
        .into_par_iter()
        .map(|e| element_entry(mesh, b, e))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn block_entries<M: MeshBlock + Sync>(mesh: &MeshManager<M>, b: usize) -> Vec<ElementEntry> {
    (0..mesh.block(b).num_elements())
        .map(|e| element_entry(mesh, b, e))
        .collect()
}
