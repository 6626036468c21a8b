//! Geometry abstraction consumed by the engine.
//!
//! The engine never implements geometry algorithms itself. It works against
//! [`SpatialGeometry`], which only has to report a bounding box and answer the
//! binary predicates, and wraps every input in an immutable
//! [`GeometryHandle`] carrying a precomputed box and a stable identifier.
//! An implementation for `geo::Geometry<f64>` is provided.

use crate::config::SpatialPredicate;
use crate::error::{GeoshardError, Result};
use geo::{BoundingRect, Contains, Distance, Euclidean, Geometry, Intersects, Point};
use geoshard_types::BoundingBox;
use std::fmt;
use std::sync::Arc;

/// Stable identifier of a geometry, unique within its dataset.
pub type GeometryId = u64;

/// Operations the engine needs from a geometry value.
pub trait SpatialGeometry: Send + Sync {
    /// Axis-aligned extent, or `None` for an empty geometry.
    fn bounding_box(&self) -> Option<BoundingBox>;

    fn intersects(&self, other: &Self) -> bool;

    /// True when `other` lies inside `self`.
    fn contains(&self, other: &Self) -> bool;

    /// Minimum Euclidean distance between the two geometries.
    fn distance(&self, other: &Self) -> f64;

    /// Minimum Euclidean distance from the geometry to a point.
    fn distance_to_point(&self, x: f64, y: f64) -> f64;
}

impl SpatialGeometry for Geometry<f64> {
    fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_rect().map(BoundingBox::from_rect)
    }

    fn intersects(&self, other: &Self) -> bool {
        Intersects::intersects(self, other)
    }

    fn contains(&self, other: &Self) -> bool {
        Contains::contains(self, other)
    }

    fn distance(&self, other: &Self) -> f64 {
        match (self, other) {
            (Geometry::Point(a), Geometry::Point(b)) => Euclidean.distance(*a, *b),
            _ => Euclidean.distance(self, other),
        }
    }

    fn distance_to_point(&self, x: f64, y: f64) -> f64 {
        let origin = Point::new(x, y);
        match self {
            Geometry::Point(p) => Euclidean.distance(*p, origin),
            _ => Euclidean.distance(self, &Geometry::Point(origin)),
        }
    }
}

/// Immutable reference to a geometry plus its bounding box and identifier.
///
/// Cloning a handle is cheap: the geometry itself is shared.
pub struct GeometryHandle<G> {
    id: GeometryId,
    bbox: BoundingBox,
    geometry: Arc<G>,
}

impl<G: SpatialGeometry> GeometryHandle<G> {
    /// Wrap a geometry, computing its bounding box once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for empty geometries and for
    /// geometries whose extent is not finite.
    pub fn new(id: GeometryId, geometry: G) -> Result<Self> {
        Self::from_arc(id, Arc::new(geometry))
    }

    pub fn from_arc(id: GeometryId, geometry: Arc<G>) -> Result<Self> {
        let bbox = geometry.bounding_box().ok_or_else(|| {
            GeoshardError::invalid_config(format!("geometry {id} has no bounding box"))
        })?;
        if !bbox.is_finite() {
            return Err(GeoshardError::invalid_config(format!(
                "geometry {id} has a non-finite bounding box"
            )));
        }
        Ok(Self { id, bbox, geometry })
    }
}

impl<G> GeometryHandle<G> {
    pub fn id(&self) -> GeometryId {
        self.id
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }
}

impl GeometryHandle<Geometry<f64>> {
    /// Convenience constructor for a point geometry.
    pub fn point(id: GeometryId, x: f64, y: f64) -> Result<Self> {
        Self::new(id, Geometry::Point(Point::new(x, y)))
    }

    /// Convenience constructor for an axis-aligned rectangle geometry.
    pub fn rect(id: GeometryId, bbox: BoundingBox) -> Result<Self> {
        Self::new(id, Geometry::Rect(bbox.to_rect()))
    }
}

impl<G> Clone for GeometryHandle<G> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            bbox: self.bbox,
            geometry: Arc::clone(&self.geometry),
        }
    }
}

impl<G> fmt::Debug for GeometryHandle<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryHandle")
            .field("id", &self.id)
            .field("bbox", &self.bbox)
            .finish_non_exhaustive()
    }
}

impl SpatialPredicate {
    /// Evaluate the exact predicate between `left` and `right`.
    pub fn evaluate<G: SpatialGeometry>(&self, left: &G, right: &G) -> bool {
        self.evaluate_with_distance(left, right).is_some()
    }

    /// Evaluate the predicate, returning `None` on a miss and otherwise the
    /// measured distance (present only for `WithinDistance`).
    pub fn evaluate_with_distance<G: SpatialGeometry>(
        &self,
        left: &G,
        right: &G,
    ) -> Option<Option<f64>> {
        match self {
            SpatialPredicate::Intersects => left.intersects(right).then_some(None),
            SpatialPredicate::Contains => left.contains(right).then_some(None),
            SpatialPredicate::Within => right.contains(left).then_some(None),
            SpatialPredicate::WithinDistance(max) => {
                let distance = left.distance(right);
                (distance <= *max).then_some(Some(distance))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(id: GeometryId, min: f64, max: f64) -> GeometryHandle<Geometry<f64>> {
        GeometryHandle::rect(id, BoundingBox::new(min, min, max, max)).unwrap()
    }

    #[test]
    fn test_handle_bbox_precomputed() {
        let poly: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 3.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        let handle = GeometryHandle::new(7, poly).unwrap();
        assert_eq!(handle.id(), 7);
        assert_eq!(*handle.bbox(), BoundingBox::new(0.0, 0.0, 4.0, 3.0));

        let cloned = handle.clone();
        assert_eq!(cloned.id(), handle.id());
        assert!(std::ptr::eq(cloned.geometry(), handle.geometry()));
    }

    #[test]
    fn test_handle_rejects_non_finite() {
        assert!(GeometryHandle::point(1, f64::NAN, 0.0).is_err());
        assert!(GeometryHandle::point(1, f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_predicates() {
        let big = square(1, 0.0, 10.0);
        let small = square(2, 2.0, 3.0);
        let far = square(3, 20.0, 21.0);
        let beside = GeometryHandle::rect(4, BoundingBox::new(20.0, 0.0, 21.0, 10.0)).unwrap();

        let p = SpatialPredicate::Intersects;
        assert!(p.evaluate(big.geometry(), small.geometry()));
        assert!(!p.evaluate(big.geometry(), far.geometry()));

        assert!(SpatialPredicate::Contains.evaluate(big.geometry(), small.geometry()));
        assert!(!SpatialPredicate::Contains.evaluate(small.geometry(), big.geometry()));
        assert!(SpatialPredicate::Within.evaluate(small.geometry(), big.geometry()));

        let near = SpatialPredicate::WithinDistance(10.0);
        assert_eq!(
            near.evaluate_with_distance(big.geometry(), beside.geometry()),
            Some(Some(10.0))
        );
        assert_eq!(near.evaluate_with_distance(big.geometry(), far.geometry()), None);
        assert_eq!(
            SpatialPredicate::WithinDistance(9.9)
                .evaluate_with_distance(big.geometry(), beside.geometry()),
            None
        );

        let diagonal = SpatialPredicate::WithinDistance(15.0)
            .evaluate_with_distance(big.geometry(), far.geometry())
            .flatten()
            .unwrap();
        assert!((diagonal - 200f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_point_distances() {
        let a = GeometryHandle::point(0, 0.0, 0.0).unwrap();
        let b = GeometryHandle::point(1, 3.0, 4.0).unwrap();
        assert_eq!(a.geometry().distance(b.geometry()), 5.0);
        assert_eq!(b.geometry().distance_to_point(0.0, 0.0), 5.0);

        let rect = square(2, 1.0, 2.0);
        assert!((rect.geometry().distance_to_point(0.0, 0.0) - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(rect.geometry().distance_to_point(1.5, 1.5), 0.0);
    }
}
