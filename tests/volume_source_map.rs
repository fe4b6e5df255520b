#![cfg(feature = "rayon")]

mod util;
use util::*;

use mesh_rendezvous::comm::communicator::NoComm;
use mesh_rendezvous::comm::Communicator;
use mesh_rendezvous::field::manager::FieldManager;
use mesh_rendezvous::field::traits::{Field, FieldContainer};
use mesh_rendezvous::geometry::manager::GeometryManager;
use mesh_rendezvous::geometry::primitive::Cylinder;
use mesh_rendezvous::map::volume_source::VolumeSourceMap;

const NUM_GEOM: usize = 4;

/// Four cylinders of length 2.5 and radius 0.75 centered at
/// (±1.5, ±1.5, 0.25), gids 0..3.
fn cylinder_bank() -> GeometryManager<Cylinder> {
    let length = 2.5;
    let radius = 0.75;
    let center_z = 0.25;
    let geometry = vec![
        Cylinder::new(length, radius, -1.5, -1.5, center_z),
        Cylinder::new(length, radius, 1.5, -1.5, center_z),
        Cylinder::new(length, radius, 1.5, 1.5, center_z),
        Cylinder::new(length, radius, -1.5, 1.5, center_z),
    ];
    GeometryManager::new(geometry, (0..NUM_GEOM as u64).collect(), 3).unwrap()
}

/// The four cylinder centers plus one bogus point far outside, blocked.
fn target_points() -> FieldContainer {
    let bogus = i32::MAX as f64;
    let center_z = 0.25;
    let coords = vec![
        -1.5, 1.5, 1.5, -1.5, bogus, // x
        -1.5, -1.5, 1.5, 1.5, bogus, // y
        center_z, center_z, center_z, center_z, bogus, // z
    ];
    FieldContainer::new(coords, 3)
}

/// Evaluator returning `1 + gid` inside a known cylinder, zero otherwise.
fn cylinder_evaluator(gids: &[u64], _coords: &[f64]) -> FieldContainer {
    FieldContainer::new(
        gids.iter()
            .map(|&g| if g < NUM_GEOM as u64 { 1.0 + g as f64 } else { 0.0 })
            .collect(),
        1,
    )
}

#[test]
fn serial_cylinder_transfer() {
    let source = cylinder_bank();
    let target_coords = FieldManager::new(target_points());

    let mut map = VolumeSourceMap::new(NoComm, 3, true, 1e-6).unwrap();
    map.setup(Some(&source), Some(&target_coords)).unwrap();

    let mut target = FieldManager::new(FieldContainer::zeros(NUM_GEOM + 1, 1));
    map.apply(Some(&cylinder_evaluator), Some(&mut target))
        .unwrap();

    let data = target.field().view();
    for i in 0..NUM_GEOM {
        assert_eq!(data[i], 1.0 + i as f64);
    }
    assert_eq!(data[NUM_GEOM], 0.0);
    assert_eq!(map.missed_target_points().unwrap(), &[NUM_GEOM]);
}

// One-to-many transfer: geometry only on rank 0, the same five target
// points on every rank.
#[test]
fn two_rank_transfer_with_source_on_rank_zero() {
    let results = spawn_ranks(2, |comm| {
        let source = (comm.rank() == 0).then(cylinder_bank);
        let target_coords = FieldManager::new(target_points());

        let mut map = VolumeSourceMap::new(comm.clone(), 3, true, 1e-6).unwrap();
        map.setup(source.as_ref(), Some(&target_coords)).unwrap();

        let mut target = FieldManager::new(FieldContainer::zeros(NUM_GEOM + 1, 1));
        map.apply(Some(&cylinder_evaluator), Some(&mut target))
            .unwrap();
        (
            target.into_field().into_data(),
            map.missed_target_points().unwrap().to_vec(),
        )
    });

    for (data, missed) in results {
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0, 0.0]);
        assert_eq!(missed, vec![NUM_GEOM]);
    }
}

// Repeated applies on one setup stay bitwise identical.
#[test]
fn repeated_geometry_apply_is_stable() {
    let source = cylinder_bank();
    let target_coords = FieldManager::new(target_points());

    let mut map = VolumeSourceMap::new(NoComm, 3, true, 1e-6).unwrap();
    map.setup(Some(&source), Some(&target_coords)).unwrap();

    let mut runs = Vec::new();
    for _ in 0..3 {
        let mut target = FieldManager::new(FieldContainer::zeros(NUM_GEOM + 1, 1));
        map.apply(Some(&cylinder_evaluator), Some(&mut target))
            .unwrap();
        runs.push(target.into_field().into_data());
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}
