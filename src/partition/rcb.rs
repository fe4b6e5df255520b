//! Recursive coordinate bisection over a weighted coordinate sample.
//!
//! Every rank holds the same sample and builds the same tree: split the
//! longest axis of the current box at the weighted quantile that sends
//! `n_left / n` of the load left, recurse until one leaf per rank. Leaves
//! are assigned ranks in tree order, so leaf `k` is rendezvous rank `k`.

use crate::geometry::bounding_box::BoundingBox;
use crate::partition::SamplePoint;
use crate::transfer_error::TransferError;

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf(usize),
    Split {
        axis: usize,
        at: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug)]
pub struct RcbPartition {
    bounds: BoundingBox,
    dim: usize,
    nodes: Vec<Node>,
    num_parts: usize,
}

impl RcbPartition {
    pub fn build(
        bounds: BoundingBox,
        dim: usize,
        sample: Vec<SamplePoint>,
        num_parts: usize,
    ) -> Result<Self, TransferError> {
        if num_parts == 0 {
            return Err(TransferError::PartitionFailure(
                "cannot bisect for zero parts".into(),
            ));
        }
        let mut partition = Self {
            bounds,
            dim,
            nodes: Vec::with_capacity(2 * num_parts),
            num_parts,
        };
        partition.bisect(bounds, sample, num_parts, 0);
        Ok(partition)
    }

    /// Recursively subdivide; leaves take ranks `first_rank ..`.
    /// Returns the node index.
    fn bisect(
        &mut self,
        region: BoundingBox,
        mut sample: Vec<SamplePoint>,
        parts: usize,
        first_rank: usize,
    ) -> usize {
        if parts == 1 {
            self.nodes.push(Node::Leaf(first_rank));
            return self.nodes.len() - 1;
        }
        let left_parts = parts / 2;
        let axis = region.longest_axis(self.dim);
        let at = split_coordinate(&mut sample, axis, left_parts as f64 / parts as f64)
            .unwrap_or_else(|| 0.5 * (region.min(axis) + region.max(axis)));

        // Ties on the split plane go to the lower child.
        let (left_sample, right_sample): (Vec<_>, Vec<_>) =
            sample.into_iter().partition(|s| s.coord[axis] <= at);

        let mut left_region = region;
        let mut right_region = region;
        set_axis_max(&mut left_region, axis, at);
        set_axis_min(&mut right_region, axis, at);

        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf(usize::MAX)); // placeholder
        let left = self.bisect(left_region, left_sample, left_parts, first_rank);
        let right = self.bisect(
            right_region,
            right_sample,
            parts - left_parts,
            first_rank + left_parts,
        );
        self.nodes[slot] = Node::Split {
            axis,
            at,
            left,
            right,
        };
        slot
    }

    pub fn num_parts(&self) -> usize {
        self.num_parts
    }

    pub fn point_destination(&self, point: &[f64]) -> usize {
        let mut p = [0.0; 3];
        for d in 0..self.dim {
            p[d] = point[d].clamp(self.bounds.min(d), self.bounds.max(d));
        }
        let mut node = 0;
        loop {
            match self.nodes[node] {
                Node::Leaf(rank) => return rank,
                Node::Split {
                    axis, at, left, right,
                } => {
                    node = if p[axis] <= at { left } else { right };
                }
            }
        }
    }

    pub fn box_destinations(&self, b: &BoundingBox) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            match self.nodes[node] {
                Node::Leaf(rank) => out.push(rank),
                Node::Split {
                    axis, at, left, right,
                } => {
                    // Closed regions: a box touching the plane reaches both.
                    if b.min(axis) <= at {
                        stack.push(left);
                    }
                    if b.max(axis) >= at {
                        stack.push(right);
                    }
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Coordinate where the cumulative weight first reaches `fraction` of the
/// total. `None` for an empty sample.
fn split_coordinate(sample: &mut [SamplePoint], axis: usize, fraction: f64) -> Option<f64> {
    if sample.is_empty() {
        return None;
    }
    sample.sort_by(|a, b| a.coord[axis].total_cmp(&b.coord[axis]));
    let total: f64 = sample.iter().map(|s| s.weight).sum();
    let target = total * fraction;
    let mut acc = 0.0;
    for s in sample.iter() {
        acc += s.weight;
        if acc >= target {
            return Some(s.coord[axis]);
        }
    }
    Some(sample[sample.len() - 1].coord[axis])
}

fn set_axis_max(b: &mut BoundingBox, axis: usize, v: f64) {
    match axis {
        0 => b.x_max = v,
        1 => b.y_max = v,
        _ => b.z_max = v,
    }
}

fn set_axis_min(b: &mut BoundingBox, axis: usize, v: f64) {
    match axis {
        0 => b.x_min = v,
        1 => b.y_min = v,
        _ => b.z_min = v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_sample_1d(n: usize, lo: f64, hi: f64) -> Vec<SamplePoint> {
        (0..n)
            .map(|i| SamplePoint {
                coord: [lo + (hi - lo) * (i as f64 + 0.5) / n as f64, 0.0, 0.0],
                weight: 1.0,
            })
            .collect()
    }

    #[test]
    fn two_parts_split_a_line() {
        let b = BoundingBox::from_extents(1, &[0.0], &[5.0]).unwrap();
        let p = RcbPartition::build(b, 1, uniform_sample_1d(100, 0.0, 5.0), 2).unwrap();
        assert_eq!(p.point_destination(&[0.5]), 0);
        assert_eq!(p.point_destination(&[4.5]), 1);
        // Points outside the box clamp onto it.
        assert_eq!(p.point_destination(&[-10.0]), 0);
        assert_eq!(p.point_destination(&[10.0]), 1);
    }

    #[test]
    fn split_plane_ties_go_low() {
        let b = BoundingBox::from_extents(1, &[0.0], &[4.0]).unwrap();
        let sample = vec![
            SamplePoint {
                coord: [1.0, 0.0, 0.0],
                weight: 1.0,
            },
            SamplePoint {
                coord: [3.0, 0.0, 0.0],
                weight: 1.0,
            },
        ];
        let p = RcbPartition::build(b, 1, sample, 2).unwrap();
        // Split lands on the first sample coordinate; the point exactly there
        // belongs to the lower child.
        assert_eq!(p.point_destination(&[1.0]), 0);
        assert_eq!(p.point_destination(&[1.0 + 1e-12]), 1);
    }

    #[test]
    fn straddling_box_reaches_both_leaves() {
        let b = BoundingBox::from_extents(1, &[0.0], &[4.0]).unwrap();
        let p = RcbPartition::build(b, 1, uniform_sample_1d(64, 0.0, 4.0), 2).unwrap();
        let probe = BoundingBox::from_extents(1, &[1.9], &[2.5]).unwrap();
        assert_eq!(p.box_destinations(&probe), vec![0, 1]);
        let left_only = BoundingBox::from_extents(1, &[0.1], &[0.2]).unwrap();
        assert_eq!(p.box_destinations(&left_only), vec![0]);
    }

    #[test]
    fn every_destination_is_in_range() {
        let b = BoundingBox::new([0.0, 0.0, 0.0, 1.0, 2.0, 3.0]).unwrap();
        let sample: Vec<SamplePoint> = (0..200)
            .map(|i| {
                let t = i as f64 / 200.0;
                SamplePoint {
                    coord: [t, 2.0 * t * t, 3.0 - 3.0 * t],
                    weight: 1.0 + (i % 3) as f64,
                }
            })
            .collect();
        let p = RcbPartition::build(b, 3, sample, 7).unwrap();
        for i in 0..1000 {
            let t = i as f64 / 1000.0;
            let dest = p.point_destination(&[t, 2.0 * t, 3.0 * t]);
            assert!(dest < 7);
        }
    }

    #[test]
    fn load_is_roughly_balanced() {
        let b = BoundingBox::from_extents(2, &[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let sample: Vec<SamplePoint> = (0..32)
            .flat_map(|i| {
                (0..32).map(move |j| SamplePoint {
                    coord: [(i as f64 + 0.5) / 32.0, (j as f64 + 0.5) / 32.0, 0.0],
                    weight: 1.0,
                })
            })
            .collect();
        let parts = 4;
        let p = RcbPartition::build(b, 2, sample.clone(), parts).unwrap();
        let mut loads = vec![0usize; parts];
        for s in &sample {
            loads[p.point_destination(&s.coord[..2])] += 1;
        }
        for &l in &loads {
            // 1024 points over 4 parts: within 2x of perfect balance.
            assert!(l >= 128 && l <= 512, "unbalanced loads {loads:?}");
        }
    }
}
