//! Range and k-nearest-neighbour queries over one partitioned dataset.

use crate::config::SpatialPredicate;
use crate::dataset::PartitionedDataset;
use crate::error::{GeoshardError, Result};
use crate::geometry::{GeometryHandle, GeometryId, SpatialGeometry};
use geoshard_types::BoundingBox;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// A KNN answer: the geometry and its distance to the query point.
#[derive(Debug, Clone)]
pub struct KnnResult<G> {
    pub handle: GeometryHandle<G>,
    pub distance: f64,
}

/// Query engine borrowing a partitioned dataset.
///
/// # Example
///
/// ```rust
/// use geoshard::prelude::*;
///
/// let source: Vec<GeometryHandle<Geometry<f64>>> = (0..100)
///     .map(|i| GeometryHandle::point(i, (i % 10) as f64, (i / 10) as f64).unwrap())
///     .collect();
/// let config = Config::default().with_num_partitions(4).with_seed(1);
/// let dataset = PartitionedDataset::build(&source, &config).unwrap();
///
/// let engine = QueryEngine::new(&dataset);
/// let nearest = engine.knn(0.2, 0.1, 3).unwrap();
/// assert_eq!(nearest[0].handle.id(), 0);
///
/// let hits = engine.range_box(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap();
/// assert_eq!(hits.len(), 4);
/// ```
pub struct QueryEngine<'a, G> {
    dataset: &'a PartitionedDataset<G>,
}

impl<'a, G: SpatialGeometry> QueryEngine<'a, G> {
    pub fn new(dataset: &'a PartitionedDataset<G>) -> Self {
        Self { dataset }
    }

    /// Geometries `g` with `predicate(window, g)`, each exactly once, by id.
    ///
    /// # Errors
    ///
    /// `IndexQuery` when the window has no finite bounding box,
    /// `InvalidConfiguration` for an invalid predicate.
    pub fn range(&self, window: &G, predicate: SpatialPredicate) -> Result<Vec<GeometryHandle<G>>> {
        predicate.validate()?;
        let window_box = window
            .bounding_box()
            .ok_or_else(|| GeoshardError::index_query("query window is empty"))?;
        self.search(&window_box, predicate.distance(), |candidate| {
            predicate.evaluate(window, candidate)
        })
    }

    /// Geometries whose bounding box overlaps `bbox` (edges inclusive), by id.
    pub fn range_box(&self, bbox: &BoundingBox) -> Result<Vec<GeometryHandle<G>>> {
        self.search(bbox, 0.0, |_| true)
    }

    fn search<F>(&self, window_box: &BoundingBox, distance: f64, accept: F) -> Result<Vec<GeometryHandle<G>>>
    where
        F: Fn(&G) -> bool + Sync,
    {
        if !window_box.is_finite() {
            log::warn!("Rejecting range query with non-finite window {window_box:?}");
            return Err(GeoshardError::index_query(format!(
                "query window has non-finite coordinates: {window_box:?}"
            )));
        }
        let search_box = window_box.expand(distance);
        let lookup = self.dataset.lookup();
        let partition_ids = lookup.overlapping(&search_box);

        let per_partition: Vec<Vec<GeometryHandle<G>>> = partition_ids
            .par_iter()
            .filter_map(|id| self.dataset.partition(*id))
            .filter(|p| !p.is_empty())
            .map(|partition| -> Result<Vec<GeometryHandle<G>>> {
                let entries = partition.entries();
                let mut found = Vec::new();
                for position in partition.index().query(&search_box)? {
                    let entry = &entries[position];
                    if !accept(entry.handle.geometry()) {
                        continue;
                    }
                    // Report from the home of the overlap with the search box only.
                    let home = entry
                        .assigned_box
                        .intersection(&search_box)
                        .and_then(|reference| lookup.home_of_box(&reference));
                    if home == Some(partition.id()) {
                        found.push(entry.handle.clone());
                    }
                }
                Ok(found)
            })
            .collect::<Result<_>>()?;

        let mut results: Vec<GeometryHandle<G>> = per_partition.into_iter().flatten().collect();
        results.sort_unstable_by_key(|h| h.id());
        log::debug!(
            "range query over {} partitions returned {} geometries",
            partition_ids.len(),
            results.len()
        );
        Ok(results)
    }

    /// The `k` geometries nearest to `(x, y)`, by distance then id.
    ///
    /// Partitions are visited in ascending order of the distance to their
    /// content, and skipped once that bound exceeds the current k-th distance.
    pub fn knn(&self, x: f64, y: f64, k: usize) -> Result<Vec<KnnResult<G>>> {
        if !x.is_finite() || !y.is_finite() {
            log::warn!("Rejecting knn query with non-finite point ({x}, {y})");
            return Err(GeoshardError::index_query(format!(
                "query point has non-finite coordinates: ({x}, {y})"
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut order: Vec<(f64, usize)> = self
            .dataset
            .partitions()
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.content_extent().map(|e| (e.min_distance_to_point(x, y), i)))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut best: FxHashMap<GeometryId, KnnResult<G>> = FxHashMap::default();
        let mut kth = f64::INFINITY;
        let mut visited = 0usize;

        for (lower_bound, i) in order {
            if best.len() >= k && lower_bound > kth {
                break;
            }
            visited += 1;
            let partition = &self.dataset.partitions()[i];
            let entries = partition.entries();
            for (position, distance) in partition.index().nearest(x, y, k)? {
                let handle = &entries[position].handle;
                best.entry(handle.id())
                    .and_modify(|r| r.distance = r.distance.min(distance))
                    .or_insert_with(|| KnnResult {
                        handle: handle.clone(),
                        distance,
                    });
            }
            if best.len() >= k {
                kth = kth_distance(best.values().map(|r| r.distance), k);
            }
        }

        let mut results: Vec<KnnResult<G>> = best.into_values().collect();
        results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.handle.id().cmp(&b.handle.id()))
        });
        results.truncate(k);
        log::trace!("knn visited {visited} partitions");
        Ok(results)
    }
}

fn kth_distance(distances: impl Iterator<Item = f64>, k: usize) -> f64 {
    let mut distances: Vec<f64> = distances.collect();
    if distances.len() < k {
        return f64::INFINITY;
    }
    let (_, kth, _) = distances.select_nth_unstable_by(k - 1, f64::total_cmp);
    *kth
}
