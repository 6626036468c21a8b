//! Helpers shared by the boundary builders.

use geoshard_types::BoundingBox;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

/// Smallest half-size used when inflating a degenerate extent.
const MIN_HALF_EXTENT: f64 = 0.5;

/// Coordinate of grid line `i` out of `cells` along `[min, max]`.
///
/// The last line is pinned to `max` so adjacent cells share the exact same
/// edge value and the outer edge matches the extent without rounding drift.
#[inline]
pub(crate) fn edge(min: f64, max: f64, cells: usize, i: usize) -> f64 {
    if i >= cells {
        max
    } else {
        min + (max - min) * (i as f64 / cells as f64)
    }
}

/// Choose `(rows, cols)` with `rows * cols == n`, closest to the aspect ratio
/// of `extent` (cols run along x).
pub(crate) fn grid_shape(n: usize, extent: &BoundingBox) -> (usize, usize) {
    let aspect = if extent.height() > 0.0 && extent.width() > 0.0 {
        extent.width() / extent.height()
    } else {
        1.0
    };
    let target = aspect.ln();

    let mut best = (1, n);
    let mut best_score = f64::INFINITY;
    for rows in 1..=n {
        if n % rows != 0 {
            continue;
        }
        let cols = n / rows;
        let score = ((cols as f64 / rows as f64).ln() - target).abs();
        if score < best_score {
            best_score = score;
            best = (rows, cols);
        }
    }
    best
}

/// Box around a degenerate extent with at least `MIN_HALF_EXTENT` on each
/// side of its centre, scaled up with the magnitude of the coordinates.
pub(crate) fn inflate_degenerate(extent: &BoundingBox) -> BoundingBox {
    let (cx, cy) = extent.center();
    let magnitude = cx.abs().max(cy.abs());
    let pad = MIN_HALF_EXTENT
        .max(extent.width().max(extent.height()) / 2.0)
        .max(magnitude * 1e-9);
    let half_w = (extent.width() / 2.0).max(pad);
    let half_h = (extent.height() / 2.0).max(pad);
    BoundingBox::new(cx - half_w, cy - half_h, cx + half_w, cy + half_h).union(extent)
}

/// Split value for `values` (sorted ascending) strictly inside `(lo, hi)`
/// such that both `v < split` and `v >= split` are non-empty.
///
/// Prefers the median; returns `None` when every value is equal.
pub(crate) fn split_value(values: &[f64], lo: f64, hi: f64) -> Option<f64> {
    let first = *values.first()?;
    let median = values[values.len() / 2];

    let upper = if median > first {
        median
    } else {
        *values.iter().find(|v| **v > first)?
    };

    if upper < hi {
        return Some(upper);
    }

    // The split landed on the outer edge; cut halfway below it instead.
    let below = values.iter().rev().find(|v| **v < upper)?;
    let split = (below + upper) / 2.0;
    (split > lo && split < hi && split > *below).then_some(split)
}

/// Sort values with a total order (NaN-free input assumed).
pub(crate) fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_unstable_by(f64::total_cmp);
    values
}

/// Deterministic output order for leaf cells: bottom-to-top, then left-to-right.
pub(crate) fn cell_order(a: &BoundingBox, b: &BoundingBox) -> Ordering {
    a.min_y
        .total_cmp(&b.min_y)
        .then(a.min_x.total_cmp(&b.min_x))
        .then(a.max_y.total_cmp(&b.max_y))
        .then(a.max_x.total_cmp(&b.max_x))
}

/// Number of distinct positions in `points`, treating `-0.0` as `0.0`.
pub(crate) fn distinct_positions(points: &[(f64, f64)]) -> usize {
    points
        .iter()
        .map(|&(x, y)| ((x + 0.0).to_bits(), (y + 0.0).to_bits()))
        .collect::<FxHashSet<_>>()
        .len()
}

/// A leaf awaiting a split, ranked by sample count then by creation order.
#[derive(Debug)]
pub(crate) struct RankedLeaf<T> {
    pub count: usize,
    pub seq: usize,
    pub leaf: T,
}

impl<T> PartialEq for RankedLeaf<T> {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.seq == other.seq
    }
}

impl<T> Eq for RankedLeaf<T> {}

impl<T> PartialOrd for RankedLeaf<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for RankedLeaf<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on count; earlier leaves win ties.
        self.count
            .cmp(&other.count)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
