#![cfg(feature = "rayon")]

mod util;
use util::*;

use mesh_rendezvous::comm::Communicator;
use mesh_rendezvous::geometry::bounding_box::BoundingBox;
use mesh_rendezvous::mesh::container::MeshContainer;
use mesh_rendezvous::rendezvous::engine::Rendezvous;
use mesh_rendezvous::search::element_tree::INVALID_ELEMENT;
use mesh_rendezvous::transfer_error::TransferError;

#[test]
fn serial_build_and_local_search() {
    use mesh_rendezvous::comm::communicator::NoComm;
    let mut mesh = line_mesh(0.0, 5.0, 11, 1, 100);
    let the_box = BoundingBox::from_extents(1, &[0.0], &[5.0]).unwrap();
    let mut rdv = Rendezvous::new(NoComm, 1, the_box).unwrap();
    rdv.build(Some(&mut mesh)).unwrap();

    // One rank owns everything.
    let coords = vec![0.25, 2.75, 4.9];
    assert_eq!(rdv.procs_containing_points(&coords).unwrap(), vec![0, 0, 0]);
    let (elems, srcs) = rdv.elements_containing_points(&coords, 1e-6).unwrap();
    assert_eq!(elems, vec![100, 105, 109]);
    assert_eq!(srcs, vec![0, 0, 0]);

    // A point beyond the mesh misses.
    let (elems, srcs) = rdv.elements_containing_points(&[9.0], 1e-6).unwrap();
    assert_eq!(elems, vec![INVALID_ELEMENT]);
    assert_eq!(srcs, vec![-1]);

    // With one rank, every box lands on it.
    let probe = BoundingBox::from_extents(1, &[1.0], &[2.0]).unwrap();
    assert_eq!(rdv.procs_containing_boxes(&[probe]).unwrap(), vec![vec![0]]);
}

#[test]
fn query_before_build_is_an_error() {
    use mesh_rendezvous::comm::communicator::NoComm;
    let the_box = BoundingBox::from_extents(1, &[0.0], &[1.0]).unwrap();
    let rdv = Rendezvous::<NoComm>::new(NoComm, 1, the_box).unwrap();
    assert!(matches!(
        rdv.procs_containing_points(&[0.5]),
        Err(TransferError::RendezvousNotBuilt)
    ));
}

#[test]
fn empty_source_everywhere_is_fatal() {
    use mesh_rendezvous::comm::communicator::NoComm;
    let the_box = BoundingBox::from_extents(1, &[0.0], &[1.0]).unwrap();
    let mut rdv = Rendezvous::new(NoComm, 1, the_box).unwrap();
    let err = rdv.build::<MeshContainer>(None).unwrap_err();
    assert_eq!(err, TransferError::EmptySource);
}

#[test]
fn two_rank_build_with_mesh_on_one_rank() {
    let results = spawn_ranks(2, |comm| {
        let the_box = BoundingBox::from_extents(1, &[0.0], &[5.0]).unwrap();
        let mut rdv = Rendezvous::new(comm.clone(), 1, the_box).unwrap();
        let mut mesh = (comm.rank() == 0).then(|| line_mesh(0.0, 5.0, 11, 1, 100));
        rdv.build(mesh.as_mut()).unwrap();

        // Every rank can route points; the partition is replicated.
        let dests = rdv
            .procs_containing_points(&[0.1, 1.2, 2.6, 4.9])
            .unwrap();
        assert!(dests.iter().all(|&d| d < 2));

        // A point routed to this rank must be found locally: the rank that
        // owns a region holds the elements covering it.
        let mut local_hits = 0;
        for i in 0..50 {
            let x = 0.05 + 4.9 * i as f64 / 49.0;
            if rdv.procs_containing_points(&[x]).unwrap()[0] == comm.rank() {
                let (elems, srcs) = rdv.elements_containing_points(&[x], 1e-6).unwrap();
                assert_ne!(elems[0], INVALID_ELEMENT, "point {x} lost by owner rank");
                assert_eq!(srcs[0], 0, "all source data lives on rank 0");
                local_hits += 1;
            }
        }
        (rdv.rendezvous_mesh().unwrap().local_num_elements(), local_hits)
    });

    // Both ranks hold a share of the redistributed mesh, and between them
    // they cover at least the ten source elements.
    let total: usize = results.iter().map(|(n, _)| n).sum();
    assert!(total >= 10, "rendezvous mesh lost elements: {results:?}");
    assert!(results.iter().all(|&(_, hits)| hits > 0));
}

#[test]
fn elements_in_geometry_any_and_all_vertices() {
    use mesh_rendezvous::comm::communicator::NoComm;
    let mut mesh = quad_grid_rows(4, 0, 4);
    let the_box = BoundingBox::from_extents(2, &[0.0, 0.0], &[4.0, 4.0]).unwrap();
    let mut rdv = Rendezvous::new(NoComm, 2, the_box).unwrap();
    rdv.build(Some(&mut mesh)).unwrap();

    // A box covering the lower-left quadrant corner-to-corner.
    let probe = BoundingBox::from_extents(2, &[0.0, 0.0], &[2.0, 2.0]).unwrap();
    let strict = rdv.elements_in_geometry(&[probe], 1e-6, true).unwrap();
    let loose = rdv.elements_in_geometry(&[probe], 1e-6, false).unwrap();

    // All vertices inside: the four quads of the quadrant.
    assert_eq!(strict[0], vec![1, 2, 5, 6]);
    // Any vertex inside additionally picks up the touching ring.
    assert_eq!(loose[0], vec![1, 2, 3, 5, 6, 7, 9, 10, 11]);
}
