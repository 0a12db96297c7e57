//! Foundational types for occupancy-grid topology extraction.
//!
//! ## Rasters
//! [`Image`] is an owned row-major buffer. [`ImageView`] borrows one for the
//! stages that only read, such as morphology and thinning.
//!
//! ## Grid Coordinates
//! Cell `(x, y)` lives at index `y * width + x`. World coordinates produced by
//! the extraction stages are `pixel * resolution`; the grid [`Origin2D`] is
//! carried along for consumers that need map-frame poses.
//!
//! ## Stage Outputs
//! [`DistanceField`] holds per-cell distance to the nearest obstacle in world
//! units. [`SkeletonMask`] marks ridge pixels with a non-zero value.

mod error;
mod geom;
mod grid;
mod image;

pub use error::Error;
pub use geom::{Origin2D, Point2};
pub use grid::{Cell, OccupancyGrid};
pub use image::{Image, ImageView};

/// Per-cell Euclidean distance to the nearest occupied cell, in world units.
pub type DistanceField = Image<f32>;

/// Binary ridge mask; non-zero marks a skeleton pixel.
pub type SkeletonMask = Image<u8>;
