use proptest::prelude::*;

use mesh_rendezvous::geometry::bounding_box::BoundingBox;
use mesh_rendezvous::partition::rcb::RcbPartition;
use mesh_rendezvous::partition::SamplePoint;

fn arb_box() -> impl Strategy<Value = BoundingBox> {
    (
        prop::array::uniform3(-10.0f64..10.0),
        prop::array::uniform3(0.0f64..5.0),
    )
        .prop_map(|(lo, extent)| {
            BoundingBox::new([
                lo[0],
                lo[1],
                lo[2],
                lo[0] + extent[0],
                lo[1] + extent[1],
                lo[2] + extent[2],
            ])
            .expect("ordered bounds")
        })
}

proptest! {
    #[test]
    fn intersection_commutes_and_is_contained(a in arb_box(), b in arb_box()) {
        let ab = BoundingBox::intersection(&a, &b);
        let ba = BoundingBox::intersection(&b, &a);
        prop_assert_eq!(ab, ba);
        if let Some(i) = ab {
            for d in 0..3 {
                prop_assert!(i.min(d) >= a.min(d) && i.min(d) >= b.min(d));
                prop_assert!(i.max(d) <= a.max(d) && i.max(d) <= b.max(d));
            }
            // Every point of the intersection is in both operands; probe
            // the corners and center.
            let c = i.center(3);
            prop_assert!(a.contains_point(&c) && b.contains_point(&c));
        }
    }

    #[test]
    fn union_contains_both(a in arb_box(), b in arb_box()) {
        let u = BoundingBox::union(&a, &b);
        for d in 0..3 {
            prop_assert!(u.min(d) <= a.min(d) && u.min(d) <= b.min(d));
            prop_assert!(u.max(d) >= a.max(d) && u.max(d) >= b.max(d));
        }
    }

    #[test]
    fn rcb_destinations_stay_in_range(
        coords in prop::collection::vec(prop::array::uniform3(0.0f64..1.0), 8..200),
        parts in 1usize..9,
        probes in prop::collection::vec(prop::array::uniform3(-0.5f64..1.5), 1..50),
    ) {
        let bounds = BoundingBox::new([0.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        let sample: Vec<SamplePoint> = coords
            .iter()
            .map(|&coord| SamplePoint { coord, weight: 1.0 })
            .collect();
        let p = RcbPartition::build(bounds, 3, sample, parts).unwrap();
        for probe in &probes {
            let dest = p.point_destination(probe);
            prop_assert!(dest < parts);
            // A box around the probe must reach at least the point's leaf.
            let probe_box = BoundingBox::new([
                probe[0] - 0.01, probe[1] - 0.01, probe[2] - 0.01,
                probe[0] + 0.01, probe[1] + 0.01, probe[2] + 0.01,
            ]).unwrap();
            prop_assert!(p.box_destinations(&probe_box).contains(&dest));
        }
    }
}
