//! Region quad-tree variant (MX-CIF style).
//!
//! Each node covers a square-ish region split at its centre. An entry lives in
//! the deepest node whose region fully contains its bounding box, so boxes
//! straddling a split line stay at the parent. Leaves hold at most
//! `node_capacity` entries unless `max_depth` is reached.

use super::IndexOptions;
use crate::geometry::{GeometryHandle, SpatialGeometry};
use geoshard_types::BoundingBox;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
struct QuadNode {
    region: BoundingBox,
    items: Vec<usize>,
    children: Vec<QuadNode>,
    /// Entries in this subtree, node included.
    count: usize,
}

impl QuadNode {
    fn build(
        region: BoundingBox,
        items: Vec<usize>,
        boxes: &[BoundingBox],
        depth: usize,
        options: &IndexOptions,
    ) -> Self {
        let count = items.len();
        let leaf = |items| QuadNode {
            region,
            items,
            children: Vec::new(),
            count,
        };

        if count <= options.node_capacity
            || depth >= options.max_depth
            || (region.width() <= 0.0 && region.height() <= 0.0)
        {
            return leaf(items);
        }

        let (cx, cy) = region.center();
        let quadrants = [
            BoundingBox::new(region.min_x, region.min_y, cx, cy),
            BoundingBox::new(cx, region.min_y, region.max_x, cy),
            BoundingBox::new(region.min_x, cy, cx, region.max_y),
            BoundingBox::new(cx, cy, region.max_x, region.max_y),
        ];

        let mut buckets: [Vec<usize>; 4] = Default::default();
        let mut straddling = Vec::new();
        for position in items {
            match quadrants.iter().position(|q| q.contains(&boxes[position])) {
                Some(quadrant) => buckets[quadrant].push(position),
                None => straddling.push(position),
            }
        }
        if straddling.len() == count {
            return leaf(straddling);
        }

        let children = quadrants
            .into_iter()
            .zip(buckets)
            .map(|(quadrant, bucket)| QuadNode::build(quadrant, bucket, boxes, depth + 1, options))
            .collect();
        QuadNode {
            region,
            items: straddling,
            children,
            count,
        }
    }
}

/// Region quad-tree over bounding boxes.
#[derive(Debug)]
pub struct QuadTreeIndex<G> {
    root: Option<QuadNode>,
    handles: Vec<GeometryHandle<G>>,
}

impl<G: SpatialGeometry> QuadTreeIndex<G> {
    pub(crate) fn build(handles: Vec<GeometryHandle<G>>, options: IndexOptions) -> Self {
        let boxes: Vec<BoundingBox> = handles.iter().map(|h| *h.bbox()).collect();
        let root = boxes.iter().copied().reduce(|a, b| a.union(&b)).map(|region| {
            QuadNode::build(region, (0..boxes.len()).collect(), &boxes, 0, &options)
        });
        Self { root, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn handle(&self, position: usize) -> Option<&GeometryHandle<G>> {
        self.handles.get(position)
    }

    pub(crate) fn query(&self, bbox: &BoundingBox) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack: Vec<&QuadNode> = self.root.iter().collect();
        while let Some(node) = stack.pop() {
            if node.count == 0 || !node.region.intersects(bbox) {
                continue;
            }
            found.extend(
                node.items
                    .iter()
                    .copied()
                    .filter(|p| self.handles[*p].bbox().intersects(bbox)),
            );
            stack.extend(node.children.iter());
        }
        found
    }

    /// Best-first search over nodes and entries by distance lower bound.
    pub(crate) fn nearest(&self, x: f64, y: f64, k: usize) -> Vec<(usize, f64)> {
        let mut found = Vec::with_capacity(k);
        let mut heap = BinaryHeap::new();
        if let Some(root) = &self.root {
            heap.push(Queued {
                distance: root.region.min_distance_to_point(x, y),
                item: Candidate::Node(root),
            });
        }

        let mut kth: Option<f64> = None;
        while let Some(Queued { distance, item }) = heap.pop() {
            if kth.is_some_and(|limit| distance > limit) {
                break;
            }
            match item {
                Candidate::Entry(position) => {
                    found.push((position, distance));
                    if found.len() == k {
                        kth = Some(distance);
                    }
                }
                Candidate::Node(node) => {
                    for &position in &node.items {
                        heap.push(Queued {
                            distance: self.handles[position].geometry().distance_to_point(x, y),
                            item: Candidate::Entry(position),
                        });
                    }
                    for child in node.children.iter().filter(|c| c.count > 0) {
                        heap.push(Queued {
                            distance: child.region.min_distance_to_point(x, y),
                            item: Candidate::Node(child),
                        });
                    }
                }
            }
        }
        found
    }
}

#[derive(Debug)]
enum Candidate<'a> {
    Node(&'a QuadNode),
    Entry(usize),
}

#[derive(Debug)]
struct Queued<'a> {
    distance: f64,
    item: Candidate<'a>,
}

impl PartialEq for Queued<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued<'_> {}

impl PartialOrd for Queued<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance.
        other.distance.total_cmp(&self.distance)
    }
}
