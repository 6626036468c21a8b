//! # geoshard-types
//!
//! Leaf geometric types shared by every layer of the geoshard partitioning
//! engine.
//!
//! - **Bounding boxes**: [`BoundingBox`], an axis-aligned, always-normalized
//!   extent with inclusive overlap semantics.
//!
//! All types are serializable with Serde and convert to and from the `geo`
//! crate's `Rect`.
//!
//! ## Examples
//!
//! ```rust
//! use geoshard_types::bbox::BoundingBox;
//!
//! let cell = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
//! let point = BoundingBox::point(10.0, 5.0);
//! assert!(cell.intersects(&point)); // edges are inclusive
//! ```

pub mod bbox;

pub use bbox::BoundingBox;
