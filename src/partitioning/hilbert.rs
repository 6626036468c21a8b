//! Hilbert-curve binning.
//!
//! The extent is overlaid with a `2^order x 2^order` grid and each sample
//! centre is mapped to its cell's position along the Hilbert curve. The sorted
//! positions are cut into `n` equal-count ranges, and the ranges are widened so
//! that together they tile the whole curve.
//!
//! A range of the curve decomposes into aligned blocks of `4^k` positions, each
//! of which fills an aligned `2^k x 2^k` square of cells. A boundary is the
//! bounding box of its range's squares. Boundaries never leave a gap, but
//! because a range's footprint is not rectangular they may overlap.

use super::util::edge;
use geoshard_types::BoundingBox;

/// Build `n` Hilbert-binned boundaries over `extent`.
///
/// `order` is raised as needed so the curve has at least `n` positions.
pub(crate) fn build(
    extent: &BoundingBox,
    centres: &[(f64, f64)],
    n: usize,
    order: u32,
) -> Vec<BoundingBox> {
    let order = effective_order(order, n);
    let side = 1u64 << order;
    let total = side * side;

    let mut positions: Vec<u64> = centres
        .iter()
        .map(|&(x, y)| {
            let cx = cell_coordinate(x, extent.min_x, extent.max_x, side);
            let cy = cell_coordinate(y, extent.min_y, extent.max_y, side);
            xy2d(order, cx, cy)
        })
        .collect();
    positions.sort_unstable();

    let cuts = cut_points(&positions, n, total);
    let line = |i: u64| edge_at(extent, side, i);

    cuts.windows(2)
        .map(|range| {
            let (lo, hi) = footprint(order, range[0], range[1]);
            BoundingBox::new(line(lo.0).0, line(lo.1).1, line(hi.0).0, line(hi.1).1)
        })
        .collect()
}

fn effective_order(order: u32, n: usize) -> u32 {
    let mut order = order.clamp(1, 31);
    while order < 31 && (1u64 << (2 * order)) < n as u64 {
        order += 1;
    }
    order
}

fn cell_coordinate(value: f64, min: f64, max: f64, side: u64) -> u64 {
    let width = max - min;
    if width <= 0.0 {
        return 0;
    }
    let cell = ((value - min) / width * side as f64).floor();
    if cell <= 0.0 {
        0
    } else {
        (cell as u64).min(side - 1)
    }
}

/// World coordinates of grid line `i` on both axes.
fn edge_at(extent: &BoundingBox, side: u64, i: u64) -> (f64, f64) {
    let cells = side as usize;
    let i = i as usize;
    (
        edge(extent.min_x, extent.max_x, cells, i),
        edge(extent.min_y, extent.max_y, cells, i),
    )
}

/// `n + 1` strictly increasing cut points from 0 to `total`, each interior cut
/// at the first position of an equal-count slice of `positions`.
fn cut_points(positions: &[u64], n: usize, total: u64) -> Vec<u64> {
    let mut cuts = Vec::with_capacity(n + 1);
    cuts.push(0u64);
    for i in 1..n {
        let wanted = positions
            .get(i * positions.len() / n)
            .copied()
            .unwrap_or(total);
        let previous = cuts[i - 1];
        let latest = total - (n - i) as u64;
        cuts.push(wanted.max(previous + 1).min(latest));
    }
    cuts.push(total);
    cuts
}

/// Grid-cell bounding box `((min_x, min_y), (max_x, max_y))` of the curve
/// range `[start, end)`, as exclusive grid-line indices on the max side.
fn footprint(order: u32, start: u64, end: u64) -> ((u64, u64), (u64, u64)) {
    let mut min = (u64::MAX, u64::MAX);
    let mut max = (0u64, 0u64);
    let mut d = start;
    while d < end {
        // Largest aligned block starting at `d` that stays inside the range.
        let mut k = 0u32;
        while k < order {
            let size = 1u64 << (2 * (k + 1));
            if d % size != 0 || d + size > end {
                break;
            }
            k += 1;
        }
        let span = 1u64 << k;
        let (x, y) = d2xy(order, d);
        let (x0, y0) = (x & !(span - 1), y & !(span - 1));
        min = (min.0.min(x0), min.1.min(y0));
        max = (max.0.max(x0 + span), max.1.max(y0 + span));
        d += 1u64 << (2 * k);
    }
    (min, max)
}

/// Position along the Hilbert curve of cell `(x, y)` on a `2^order` grid.
pub(crate) fn xy2d(order: u32, mut x: u64, mut y: u64) -> u64 {
    let n = 1u64 << order;
    let mut d = 0u64;
    let mut s = n >> 1;
    while s > 0 {
        let rx = u64::from((x & s) > 0);
        let ry = u64::from((y & s) > 0);
        d += s * s * ((3 * rx) ^ ry);
        rotate(n, &mut x, &mut y, rx, ry);
        s >>= 1;
    }
    d
}

/// Cell `(x, y)` at position `d` along the Hilbert curve on a `2^order` grid.
pub(crate) fn d2xy(order: u32, d: u64) -> (u64, u64) {
    let n = 1u64 << order;
    let (mut x, mut y) = (0u64, 0u64);
    let mut t = d;
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (t / 2);
        let ry = 1 & (t ^ rx);
        rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        t /= 4;
        s <<= 1;
    }
    (x, y)
}

fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_round_trip_visits_every_cell() {
        let order = 3;
        let mut seen = vec![false; 64];
        for d in 0..64 {
            let (x, y) = d2xy(order, d);
            assert_eq!(xy2d(order, x, y), d);
            seen[(y * 8 + x) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_curve_is_continuous() {
        let order = 4;
        for d in 1..256 {
            let (x0, y0) = d2xy(order, d - 1);
            let (x1, y1) = d2xy(order, d);
            assert_eq!(x0.abs_diff(x1) + y0.abs_diff(y1), 1);
        }
    }

    #[test]
    fn test_aligned_block_is_square() {
        // Positions 16..32 on an order-3 curve fill one 4x4 quadrant.
        let ((x0, y0), (x1, y1)) = footprint(3, 16, 32);
        assert_eq!((x1 - x0, y1 - y0), (4, 4));
        assert_eq!(footprint(3, 0, 64), ((0, 0), (8, 8)));
    }

    #[test]
    fn test_cut_points_strictly_increase() {
        let cuts = cut_points(&[5, 5, 5, 5, 5, 5], 4, 64);
        assert_eq!(cuts.len(), 5);
        assert_eq!(cuts[0], 0);
        assert_eq!(cuts[4], 64);
        assert!(cuts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_boundaries_cover_extent() {
        let extent = BoundingBox::new(0.0, 0.0, 100.0, 50.0);
        let mut rng = fastrand::Rng::with_seed(3);
        let centres: Vec<(f64, f64)> = (0..2000)
            .map(|_| (rng.f64() * 100.0, rng.f64() * 50.0))
            .collect();
        let boundaries = build(&extent, &centres, 12, 6);
        assert_eq!(boundaries.len(), 12);
        assert!(boundaries.iter().all(|b| !b.is_degenerate()));

        // Every cell centre of a fine probe grid lies in some boundary.
        for i in 0..200 {
            for j in 0..100 {
                let (x, y) = (i as f64 * 0.5 + 0.25, j as f64 * 0.5 + 0.25);
                assert!(boundaries.iter().any(|b| b.contains_point(x, y)));
            }
        }
        assert!(boundaries.iter().any(|b| b.contains_point(100.0, 50.0)));
    }

    #[test]
    fn test_order_raised_for_many_partitions() {
        let extent = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let boundaries = build(&extent, &[(0.5, 0.5)], 20, 1);
        assert_eq!(boundaries.len(), 20);
    }
}
