//! Quad-tree partitioning.
//!
//! Starting from the extent, the most crowded leaf is split into four
//! quadrants at the sample median of each axis. Splitting stops once there are
//! at least `n` leaves, once no leaf holds more than `ceil(samples / n)`
//! samples, or when a leaf reaches the maximum depth.
//!
//! An empty quadrant is never emitted. It is absorbed into its row neighbour,
//! which always holds samples because the median split leaves samples on both
//! sides of each axis, so every leaf stays a rectangle and the leaves remain
//! disjoint and covering. When one axis has no usable split the leaf is
//! bisected along the other axis instead.

use super::util::{RankedLeaf, cell_order, sorted, split_value};
use geoshard_types::BoundingBox;
use std::collections::BinaryHeap;

type Point = (f64, f64);

#[derive(Debug)]
struct Cell {
    bbox: BoundingBox,
    points: Vec<Point>,
    depth: usize,
}

/// Build quad-tree leaves over `extent` from the sample `points`.
pub(crate) fn build(
    extent: &BoundingBox,
    points: Vec<Point>,
    n: usize,
    max_depth: usize,
) -> Vec<BoundingBox> {
    let threshold = points.len().div_ceil(n).max(1);
    let mut seq = 0usize;
    let mut heap = BinaryHeap::new();
    let mut finished: Vec<BoundingBox> = Vec::new();

    heap.push(RankedLeaf {
        count: points.len(),
        seq,
        leaf: Cell {
            bbox: *extent,
            points,
            depth: 0,
        },
    });

    while heap.len() + finished.len() < n {
        let Some(ranked) = heap.pop() else {
            break;
        };
        if ranked.count <= threshold {
            heap.push(ranked);
            break;
        }

        let cell = ranked.leaf;
        if cell.depth >= max_depth {
            finished.push(cell.bbox);
            continue;
        }
        match split(cell) {
            Ok(children) => {
                for child in children {
                    seq += 1;
                    heap.push(RankedLeaf {
                        count: child.points.len(),
                        seq,
                        leaf: child,
                    });
                }
            }
            Err(cell) => finished.push(cell.bbox),
        }
    }

    let mut leaves: Vec<BoundingBox> = heap
        .into_iter()
        .map(|ranked| ranked.leaf.bbox)
        .chain(finished)
        .collect();
    leaves.sort_by(cell_order);
    log::trace!("quad-tree partitioning produced {} leaves", leaves.len());
    leaves
}

/// Split a cell into up to four rectangles, or hand it back if it cannot be split.
fn split(cell: Cell) -> Result<Vec<Cell>, Cell> {
    let b = cell.bbox;
    let xs = sorted(cell.points.iter().map(|p| p.0).collect());
    let ys = sorted(cell.points.iter().map(|p| p.1).collect());
    let sx = split_value(&xs, b.min_x, b.max_x);
    let sy = split_value(&ys, b.min_y, b.max_y);

    let depth = cell.depth + 1;
    match (sx, sy) {
        (Some(sx), Some(sy)) => Ok(quadrants(cell, sx, sy)),
        (Some(sx), None) => {
            let (west, east): (Vec<Point>, Vec<Point>) =
                cell.points.into_iter().partition(|p| p.0 < sx);
            Ok(vec![
                Cell {
                    bbox: BoundingBox::new(b.min_x, b.min_y, sx, b.max_y),
                    points: west,
                    depth,
                },
                Cell {
                    bbox: BoundingBox::new(sx, b.min_y, b.max_x, b.max_y),
                    points: east,
                    depth,
                },
            ])
        }
        (None, Some(sy)) => {
            let (south, north): (Vec<Point>, Vec<Point>) =
                cell.points.into_iter().partition(|p| p.1 < sy);
            Ok(vec![
                Cell {
                    bbox: BoundingBox::new(b.min_x, b.min_y, b.max_x, sy),
                    points: south,
                    depth,
                },
                Cell {
                    bbox: BoundingBox::new(b.min_x, sy, b.max_x, b.max_y),
                    points: north,
                    depth,
                },
            ])
        }
        (None, None) => Err(cell),
    }
}

fn quadrants(cell: Cell, sx: f64, sy: f64) -> Vec<Cell> {
    let b = cell.bbox;
    let depth = cell.depth + 1;

    // [row][col]: row 0 is south, col 0 is west.
    let mut buckets: [[Vec<Point>; 2]; 2] = Default::default();
    for p in cell.points {
        let row = usize::from(p.1 >= sy);
        let col = usize::from(p.0 >= sx);
        buckets[row][col].push(p);
    }

    let ys = [b.min_y, sy, b.max_y];
    let xs = [b.min_x, sx, b.max_x];
    let mut out = Vec::with_capacity(4);
    for (row, [west, east]) in buckets.into_iter().enumerate() {
        let (min_y, max_y) = (ys[row], ys[row + 1]);
        if west.is_empty() || east.is_empty() {
            let mut points = west;
            points.extend(east);
            out.push(Cell {
                bbox: BoundingBox::new(b.min_x, min_y, b.max_x, max_y),
                points,
                depth,
            });
        } else {
            out.push(Cell {
                bbox: BoundingBox::new(xs[0], min_y, xs[1], max_y),
                points: west,
                depth,
            });
            out.push(Cell {
                bbox: BoundingBox::new(xs[1], min_y, xs[2], max_y),
                points: east,
                depth,
            });
        }
    }
    out
}
