#![cfg(feature = "rayon")]
#![allow(dead_code)]

use mesh_rendezvous::comm::communicator::RayonComm;
use mesh_rendezvous::mesh::container::MeshContainer;
use mesh_rendezvous::mesh::manager::MeshManager;
use mesh_rendezvous::topology::cell_type::CellTopology;

/// Run `f` once per rank on its own thread and collect the results in rank
/// order. Panics in any rank fail the test.
pub fn spawn_ranks<R: Send + 'static>(
    size: usize,
    f: impl Fn(RayonComm) -> R + Send + Sync + Clone + 'static,
) -> Vec<R> {
    let handles: Vec<_> = RayonComm::universe(size)
        .into_iter()
        .map(|comm| {
            let f = f.clone();
            std::thread::spawn(move || f(comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

/// Uniform 1-D line mesh: `num_nodes` nodes from `x_lo` to `x_hi`.
/// Vertex gids start at `first_vertex_gid`, element gids at
/// `first_element_gid`.
pub fn line_mesh(
    x_lo: f64,
    x_hi: f64,
    num_nodes: usize,
    first_vertex_gid: u64,
    first_element_gid: u64,
) -> MeshManager<MeshContainer> {
    let h = (x_hi - x_lo) / (num_nodes - 1) as f64;
    let vertex_ids: Vec<u64> = (0..num_nodes as u64).map(|i| first_vertex_gid + i).collect();
    let coords: Vec<f64> = (0..num_nodes).map(|i| x_lo + i as f64 * h).collect();
    let ne = num_nodes - 1;
    let element_ids: Vec<u64> = (0..ne as u64).map(|e| first_element_gid + e).collect();
    let mut conn = vec![0u64; 2 * ne];
    for e in 0..ne {
        conn[e] = vertex_ids[e];
        conn[ne + e] = vertex_ids[e + 1];
    }
    let block = MeshContainer::new(
        vertex_ids,
        coords,
        CellTopology::Line,
        element_ids,
        conn,
        MeshContainer::identity_permutation(CellTopology::Line),
    );
    MeshManager::new(vec![block], 1).expect("valid line mesh")
}

/// Rows `j_lo..j_hi` of an `n x n` unit-quad grid on `[0, n] x [0, n]`.
/// Vertex gid `j*(n+1)+i+1`, element gid `j*n+i+1` — globally consistent
/// across row ranges, so two ranks holding adjacent ranges share boundary
/// vertex gids.
pub fn quad_grid_rows(n: usize, j_lo: usize, j_hi: usize) -> MeshManager<MeshContainer> {
    let stride = n + 1;
    let mut vertex_ids = Vec::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for j in j_lo..=j_hi {
        for i in 0..stride {
            vertex_ids.push((j * stride + i + 1) as u64);
            xs.push(i as f64);
            ys.push(j as f64);
        }
    }
    let mut coords = xs;
    coords.extend(ys);

    let ne = (j_hi - j_lo) * n;
    let mut element_ids = Vec::new();
    let mut conn = vec![0u64; 4 * ne];
    let mut e = 0;
    for j in j_lo..j_hi {
        for i in 0..n {
            element_ids.push((j * n + i + 1) as u64);
            let v0 = (j * stride + i + 1) as u64;
            conn[e] = v0;
            conn[ne + e] = v0 + 1;
            conn[2 * ne + e] = v0 + 1 + stride as u64;
            conn[3 * ne + e] = v0 + stride as u64;
            e += 1;
        }
    }
    let block = MeshContainer::new(
        vertex_ids,
        coords,
        CellTopology::Quadrilateral,
        element_ids,
        conn,
        MeshContainer::identity_permutation(CellTopology::Quadrilateral),
    );
    MeshManager::new(vec![block], 2).expect("valid quad grid")
}

/// A single unit hexahedron spanning `[lo, lo + 1]^3`.
pub fn unit_hex_mesh(lo: f64) -> MeshManager<MeshContainer> {
    let corners = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ];
    let vertex_ids: Vec<u64> = (1..=8).collect();
    let mut coords = vec![0.0; 24];
    for (n, c) in corners.iter().enumerate() {
        for d in 0..3 {
            coords[d * 8 + n] = lo + c[d];
        }
    }
    let block = MeshContainer::new(
        vertex_ids.clone(),
        coords,
        CellTopology::Hexahedron,
        vec![1],
        vertex_ids,
        MeshContainer::identity_permutation(CellTopology::Hexahedron),
    );
    MeshManager::new(vec![block], 3).expect("valid hex mesh")
}

pub fn assert_close(got: f64, want: f64, tol: f64) {
    assert!(
        (got - want).abs() <= tol,
        "expected {want}, got {got} (tol {tol})"
    );
}
