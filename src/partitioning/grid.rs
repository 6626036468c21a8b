//! Equal grid partitioning.

use super::util::{edge, grid_shape};
use geoshard_types::BoundingBox;

/// Divide `extent` into exactly `n` equal cells, row-major from the bottom-left.
///
/// The sample distribution is ignored; only the extent matters.
pub(crate) fn build(extent: &BoundingBox, n: usize) -> Vec<BoundingBox> {
    let (rows, cols) = grid_shape(n, extent);
    let mut cells = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        let min_y = edge(extent.min_y, extent.max_y, rows, row);
        let max_y = edge(extent.min_y, extent.max_y, rows, row + 1);
        for col in 0..cols {
            let min_x = edge(extent.min_x, extent.max_x, cols, col);
            let max_x = edge(extent.min_x, extent.max_x, cols, col + 1);
            cells.push(BoundingBox::new(min_x, min_y, max_x, max_y));
        }
    }
    log::trace!("grid partitioning: {rows} rows x {cols} cols");
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_cells() {
        let cells = build(&BoundingBox::new(0.0, 0.0, 10.0, 10.0), 4);
        assert_eq!(
            cells,
            vec![
                BoundingBox::new(0.0, 0.0, 5.0, 5.0),
                BoundingBox::new(5.0, 0.0, 10.0, 5.0),
                BoundingBox::new(0.0, 5.0, 5.0, 10.0),
                BoundingBox::new(5.0, 5.0, 10.0, 10.0),
            ]
        );
    }

    #[test]
    fn test_cells_share_edges() {
        let extent = BoundingBox::new(-1.3, 0.7, 9.1, 3.3);
        let cells = build(&extent, 6);
        assert_eq!(cells.len(), 6);

        let area: f64 = cells.iter().map(|c| c.area()).sum();
        assert!((area - extent.area()).abs() < 1e-9);

        for (i, a) in cells.iter().enumerate() {
            for b in &cells[i + 1..] {
                if let Some(overlap) = a.intersection(b) {
                    assert_eq!(overlap.area(), 0.0);
                }
            }
        }
        assert_eq!(cells.last().map(|c| c.max_x), Some(extent.max_x));
        assert_eq!(cells.last().map(|c| c.max_y), Some(extent.max_y));
    }

    #[test]
    fn test_prime_partition_count() {
        let cells = build(&BoundingBox::new(0.0, 0.0, 1.0, 1.0), 7);
        assert_eq!(cells.len(), 7);
    }
}
