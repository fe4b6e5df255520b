//! Geometric source primitives for the volume-source map.
//!
//! A primitive must be `Pod` so it can migrate whole to the rendezvous
//! decomposition.

use bytemuck::{Pod, Zeroable};

use crate::geometry::bounding_box::BoundingBox;

/// Capability set the volume-source map needs from a source primitive.
pub trait Geometry: Copy + Pod + Send + Sync + 'static {
    /// Length, area, or volume depending on the primitive dimension.
    fn measure(&self) -> f64;

    /// Centroid in physical space.
    fn centroid(&self) -> [f64; 3];

    /// Tight axis-aligned bounding box.
    fn bounding_box(&self) -> BoundingBox;

    /// Containment within absolute tolerance `tol`.
    fn contains_point(&self, point: &[f64], tol: f64) -> bool;
}

impl Geometry for BoundingBox {
    fn measure(&self) -> f64 {
        self.volume(3)
    }

    fn centroid(&self) -> [f64; 3] {
        self.center(3)
    }

    fn bounding_box(&self) -> BoundingBox {
        *self
    }

    fn contains_point(&self, point: &[f64], tol: f64) -> bool {
        self.expanded(tol).contains_point(point)
    }
}

/// Right circular cylinder with its axis along z.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Cylinder {
    pub length: f64,
    pub radius: f64,
    pub center: [f64; 3],
    _pad: f64,
}

impl Cylinder {
    pub fn new(length: f64, radius: f64, center_x: f64, center_y: f64, center_z: f64) -> Self {
        Self {
            length,
            radius,
            center: [center_x, center_y, center_z],
            _pad: 0.0,
        }
    }
}

impl Geometry for Cylinder {
    fn measure(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius * self.length
    }

    fn centroid(&self) -> [f64; 3] {
        self.center
    }

    fn bounding_box(&self) -> BoundingBox {
        let [cx, cy, cz] = self.center;
        let half = 0.5 * self.length;
        BoundingBox::new([
            cx - self.radius,
            cy - self.radius,
            cz - half,
            cx + self.radius,
            cy + self.radius,
            cz + half,
        ])
        .expect("cylinder bounds are ordered")
    }

    fn contains_point(&self, point: &[f64], tol: f64) -> bool {
        let [cx, cy, cz] = self.center;
        let dx = point[0] - cx;
        let dy = point[1] - cy;
        let radial = (dx * dx + dy * dy).sqrt();
        let axial = (point[2] - cz).abs();
        radial <= self.radius + tol && axial <= 0.5 * self.length + tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cylinder_containment() {
        let c = Cylinder::new(2.5, 0.75, -1.5, -1.5, 0.25);
        assert!(c.contains_point(&[-1.5, -1.5, 0.25], 1e-6));
        assert!(c.contains_point(&[-0.76, -1.5, 0.25], 1e-6));
        assert!(!c.contains_point(&[-0.7, -1.5, 0.25], 1e-6));
        // Axial extremes, within and beyond tolerance.
        assert!(c.contains_point(&[-1.5, -1.5, 1.5], 1e-6));
        assert!(!c.contains_point(&[-1.5, -1.5, 1.5 + 1e-3], 1e-6));
    }

    #[test]
    fn cylinder_bounding_box() {
        let c = Cylinder::new(2.5, 0.75, 1.5, 1.5, 0.25);
        let b = c.bounding_box();
        assert_eq!(b.bounds(), [0.75, 0.75, -1.0, 2.25, 2.25, 1.5]);
        assert!((c.measure() - std::f64::consts::PI * 0.75 * 0.75 * 2.5).abs() < 1e-12);
    }

    #[test]
    fn box_as_geometry() {
        let b = BoundingBox::new([0.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(Geometry::contains_point(&b, &[1.0 + 1e-7, 0.5, 0.5], 1e-6));
        assert_eq!(b.centroid(), [0.5, 0.5, 0.5]);
    }
}
