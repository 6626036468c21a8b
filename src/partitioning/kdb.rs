//! KDB-tree partitioning.
//!
//! The most populated leaf is bisected at the median sample coordinate along
//! an axis that alternates with depth. Each split adds exactly one leaf, so
//! the builder stops at `n` leaves unless every remaining leaf is already at
//! or below the minimum sample count, or cannot be split at all.

use super::util::{RankedLeaf, cell_order, sorted, split_value};
use geoshard_types::BoundingBox;
use std::collections::BinaryHeap;

type Point = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn for_depth(depth: usize) -> Self {
        if depth % 2 == 0 { Axis::X } else { Axis::Y }
    }

    fn other(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

#[derive(Debug)]
struct Leaf {
    bbox: BoundingBox,
    points: Vec<Point>,
    depth: usize,
}

impl Leaf {
    /// Bisect along `axis`, or `None` when every sample shares that coordinate.
    fn bisect(&self, axis: Axis) -> Option<(Leaf, Leaf)> {
        let b = self.bbox;
        let coordinate = |p: &Point| match axis {
            Axis::X => p.0,
            Axis::Y => p.1,
        };
        let values = sorted(self.points.iter().map(coordinate).collect());
        let split = match axis {
            Axis::X => split_value(&values, b.min_x, b.max_x)?,
            Axis::Y => split_value(&values, b.min_y, b.max_y)?,
        };

        let (low, high): (Vec<Point>, Vec<Point>) =
            self.points.iter().partition(|p| coordinate(p) < split);
        let (low_box, high_box) = match axis {
            Axis::X => (
                BoundingBox::new(b.min_x, b.min_y, split, b.max_y),
                BoundingBox::new(split, b.min_y, b.max_x, b.max_y),
            ),
            Axis::Y => (
                BoundingBox::new(b.min_x, b.min_y, b.max_x, split),
                BoundingBox::new(b.min_x, split, b.max_x, b.max_y),
            ),
        };
        let depth = self.depth + 1;
        Some((
            Leaf {
                bbox: low_box,
                points: low,
                depth,
            },
            Leaf {
                bbox: high_box,
                points: high,
                depth,
            },
        ))
    }
}

/// Build KDB-tree leaves over `extent` from the sample `points`.
pub(crate) fn build(
    extent: &BoundingBox,
    points: Vec<Point>,
    n: usize,
    min_leaf_samples: usize,
) -> Vec<BoundingBox> {
    let mut seq = 0usize;
    let mut heap = BinaryHeap::new();
    let mut unsplittable: Vec<BoundingBox> = Vec::new();

    heap.push(RankedLeaf {
        count: points.len(),
        seq,
        leaf: Leaf {
            bbox: *extent,
            points,
            depth: 0,
        },
    });

    while heap.len() + unsplittable.len() < n {
        let Some(ranked) = heap.pop() else {
            break;
        };
        if ranked.count <= min_leaf_samples {
            heap.push(ranked);
            break;
        }

        let leaf = ranked.leaf;
        let axis = Axis::for_depth(leaf.depth);
        let halves = leaf
            .bisect(axis)
            .or_else(|| leaf.bisect(axis.other()));
        match halves {
            Some((low, high)) => {
                for child in [low, high] {
                    seq += 1;
                    heap.push(RankedLeaf {
                        count: child.points.len(),
                        seq,
                        leaf: child,
                    });
                }
            }
            None => unsplittable.push(leaf.bbox),
        }
    }

    let mut leaves: Vec<BoundingBox> = heap
        .into_iter()
        .map(|ranked| ranked.leaf.bbox)
        .chain(unsplittable)
        .collect();
    leaves.sort_by(cell_order);
    log::trace!("kdb-tree partitioning produced {} leaves", leaves.len());
    leaves
}
