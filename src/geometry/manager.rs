//! Geometry manager: the source-side aggregate for volume-source transfer.

use crate::geometry::bounding_box::BoundingBox;
use crate::geometry::primitive::Geometry;
use crate::transfer_error::TransferError;

/// The geometric primitives a rank contributes, with their global ids.
#[derive(Debug, Clone)]
pub struct GeometryManager<G> {
    geometries: Vec<G>,
    gids: Vec<u64>,
    dim: usize,
}

impl<G: Geometry> GeometryManager<G> {
    pub fn new(geometries: Vec<G>, gids: Vec<u64>, dim: usize) -> Result<Self, TransferError> {
        if !(1..=3).contains(&dim) {
            return Err(TransferError::DimensionMismatch {
                expected: 3,
                actual: dim,
            });
        }
        if geometries.len() != gids.len() {
            return Err(TransferError::MalformedBlock {
                block: 0,
                detail: format!(
                    "{} geometries but {} global ids",
                    geometries.len(),
                    gids.len()
                ),
            });
        }
        let mut seen = hashbrown::HashSet::with_capacity(gids.len());
        for &gid in &gids {
            if !seen.insert(gid) {
                return Err(TransferError::DuplicateGlobalId(gid));
            }
        }
        // Centroids seed the rendezvous partition and bounding boxes drive
        // the migration routes; neither tolerates NaN or infinity.
        for (g, geom) in geometries.iter().enumerate() {
            let centroid = geom.centroid();
            let bounds = geom.bounding_box().bounds();
            for axis in 0..dim {
                for value in [centroid[axis], bounds[axis], bounds[axis + 3]] {
                    if !value.is_finite() {
                        return Err(TransferError::NonFiniteCoordinate {
                            entity: g,
                            axis,
                            value,
                        });
                    }
                }
            }
        }
        Ok(Self {
            geometries,
            gids,
            dim,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn geometries(&self) -> &[G] {
        &self.geometries
    }

    pub fn gids(&self) -> &[u64] {
        &self.gids
    }

    /// Union of the primitive bounding boxes; empty for a bare manager.
    pub fn local_bounding_box(&self) -> BoundingBox {
        self.geometries
            .iter()
            .fold(BoundingBox::empty(), |acc, g| {
                BoundingBox::union(&acc, &g.bounding_box())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::primitive::Cylinder;

    #[test]
    fn gid_count_must_match() {
        let geoms = vec![Cylinder::new(1.0, 0.5, 0.0, 0.0, 0.0)];
        assert!(GeometryManager::new(geoms, vec![], 3).is_err());
    }

    #[test]
    fn non_finite_center_rejected() {
        let geoms = vec![Cylinder::new(1.0, 0.5, f64::NAN, 0.0, 0.0)];
        assert!(matches!(
            GeometryManager::new(geoms, vec![0], 3),
            Err(TransferError::NonFiniteCoordinate { entity: 0, .. })
        ));
    }

    #[test]
    fn union_box_covers_all_primitives() {
        let geoms = vec![
            Cylinder::new(2.0, 0.5, -1.0, 0.0, 0.0),
            Cylinder::new(2.0, 0.5, 1.0, 0.0, 0.0),
        ];
        let mgr = GeometryManager::new(geoms, vec![0, 1], 3).unwrap();
        let b = mgr.local_bounding_box();
        assert_eq!(b.bounds()[0], -1.5);
        assert_eq!(b.bounds()[3], 1.5);
    }
}
