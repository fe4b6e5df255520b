use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mesh_rendezvous::mesh::container::MeshContainer;
use mesh_rendezvous::mesh::manager::MeshManager;
use mesh_rendezvous::search::element_tree::ElementTree;
use mesh_rendezvous::topology::cell_type::CellTopology;

/// n x n unit quads on [0, n] x [0, n].
fn quad_grid(n: usize) -> MeshManager<MeshContainer> {
    let stride = n + 1;
    let mut vertex_ids = Vec::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for j in 0..stride {
        for i in 0..stride {
            vertex_ids.push((j * stride + i + 1) as u64);
            xs.push(i as f64);
            ys.push(j as f64);
        }
    }
    let mut coords = xs;
    coords.extend(ys);
    let ne = n * n;
    let mut element_ids = Vec::new();
    let mut conn = vec![0u64; 4 * ne];
    for j in 0..n {
        for i in 0..n {
            let e = j * n + i;
            element_ids.push((e + 1) as u64);
            let v0 = (j * stride + i + 1) as u64;
            conn[e] = v0;
            conn[ne + e] = v0 + 1;
            conn[2 * ne + e] = v0 + 1 + stride as u64;
            conn[3 * ne + e] = v0 + stride as u64;
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

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("element_tree_build");
    for n in [16usize, 64, 128] {
        let mesh = quad_grid(n);
        group.bench_with_input(BenchmarkId::from_parameter(n * n), &mesh, |b, mesh| {
            b.iter(|| ElementTree::build(mesh).unwrap());
        });
    }
    group.finish();
}

fn bench_find_point(c: &mut Criterion) {
    let mut group = c.benchmark_group("element_tree_find_point");
    for n in [16usize, 64, 128] {
        let mesh = quad_grid(n);
        let tree = ElementTree::build(&mesh).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        let probes: Vec<[f64; 2]> = (0..1024)
            .map(|_| [rng.gen::<f64>() * n as f64, rng.gen::<f64>() * n as f64])
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n * n), &probes, |b, probes| {
            b.iter(|| {
                let mut hits = 0usize;
                for p in probes {
                    if tree.find_point(&mesh, p, 1e-9).is_some() {
                        hits += 1;
                    }
                }
                hits
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_find_point);
criterion_main!(benches);
