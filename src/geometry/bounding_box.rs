//! Axis-aligned bounding boxes.
//!
//! A box carries all three axes regardless of the problem dimension; unused
//! axes stay at the infinite sentinel bounds so containment and intersection
//! ignore them. The box is `Pod` and travels whole through collectives.

use bytemuck::{Pod, Zeroable};

use crate::transfer_error::TransferError;

/// Closed axis-aligned box `(x_min, y_min, z_min, x_max, y_max, z_max)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub z_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub z_max: f64,
}

const _: () = assert!(std::mem::size_of::<BoundingBox>() == 48);

impl BoundingBox {
    /// Construct from explicit bounds; inverted bounds on any axis are an
    /// error.
    pub fn new(bounds: [f64; 6]) -> Result<Self, TransferError> {
        for axis in 0..3 {
            if bounds[axis] > bounds[axis + 3] {
                return Err(TransferError::InvalidBox {
                    axis,
                    min: bounds[axis],
                    max: bounds[axis + 3],
                });
            }
        }
        Ok(Self {
            x_min: bounds[0],
            y_min: bounds[1],
            z_min: bounds[2],
            x_max: bounds[3],
            y_max: bounds[4],
            z_max: bounds[5],
        })
    }

    /// Box over the first `dim` axes; the remaining axes span everything.
    pub fn from_extents(dim: usize, lo: &[f64], hi: &[f64]) -> Result<Self, TransferError> {
        let mut bounds = [
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::INFINITY,
            f64::INFINITY,
        ];
        for d in 0..dim {
            bounds[d] = lo[d];
            bounds[d + 3] = hi[d];
        }
        Self::new(bounds)
    }

    /// The explicit empty-box sentinel: every axis inverted at infinity.
    pub fn empty() -> Self {
        Self {
            x_min: f64::INFINITY,
            y_min: f64::INFINITY,
            z_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_max: f64::NEG_INFINITY,
            z_max: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x_min > self.x_max || self.y_min > self.y_max || self.z_min > self.z_max
    }

    #[inline]
    pub fn bounds(&self) -> [f64; 6] {
        [
            self.x_min, self.y_min, self.z_min, self.x_max, self.y_max, self.z_max,
        ]
    }

    #[inline]
    pub fn min(&self, axis: usize) -> f64 {
        [self.x_min, self.y_min, self.z_min][axis]
    }

    #[inline]
    pub fn max(&self, axis: usize) -> f64 {
        [self.x_max, self.y_max, self.z_max][axis]
    }

    /// Volume over the first `dim` axes.
    pub fn volume(&self, dim: usize) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (0..dim).map(|d| self.max(d) - self.min(d)).product()
    }

    /// Closed-interval containment over the first `point.len()` axes.
    pub fn contains_point(&self, point: &[f64]) -> bool {
        point
            .iter()
            .enumerate()
            .all(|(d, &x)| self.min(d) <= x && x <= self.max(d))
    }

    /// Per-axis max(min)/min(max) intersection; `None` when disjoint.
    pub fn intersection(a: &BoundingBox, b: &BoundingBox) -> Option<BoundingBox> {
        let mut bounds = [0.0; 6];
        for d in 0..3 {
            let lo = a.min(d).max(b.min(d));
            let hi = a.max(d).min(b.max(d));
            if lo > hi {
                return None;
            }
            bounds[d] = lo;
            bounds[d + 3] = hi;
        }
        Some(BoundingBox::new(bounds).expect("intersection bounds are ordered"))
    }

    /// Smallest box containing both operands.
    pub fn union(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x_min: a.x_min.min(b.x_min),
            y_min: a.y_min.min(b.y_min),
            z_min: a.z_min.min(b.z_min),
            x_max: a.x_max.max(b.x_max),
            y_max: a.y_max.max(b.y_max),
            z_max: a.z_max.max(b.z_max),
        }
    }

    /// Grow every finite face outward by `delta`.
    pub fn expanded(&self, delta: f64) -> BoundingBox {
        let grow = |x: f64, sign: f64| if x.is_finite() { x + sign * delta } else { x };
        BoundingBox {
            x_min: grow(self.x_min, -1.0),
            y_min: grow(self.y_min, -1.0),
            z_min: grow(self.z_min, -1.0),
            x_max: grow(self.x_max, 1.0),
            y_max: grow(self.y_max, 1.0),
            z_max: grow(self.z_max, 1.0),
        }
    }

    /// Midpoint of the first `dim` axes.
    pub fn center(&self, dim: usize) -> [f64; 3] {
        let mut c = [0.0; 3];
        for d in 0..dim {
            c[d] = 0.5 * (self.min(d) + self.max(d));
        }
        c
    }

    /// Axis with the largest finite extent among the first `dim` axes.
    pub fn longest_axis(&self, dim: usize) -> usize {
        let mut best = 0;
        let mut best_len = f64::NEG_INFINITY;
        for d in 0..dim {
            let len = self.max(d) - self.min(d);
            if len.is_finite() && len > best_len {
                best_len = len;
                best = d;
            }
        }
        best
    }
}
