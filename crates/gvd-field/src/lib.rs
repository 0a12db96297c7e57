//! Distance field and ridge extraction over occupancy grids.
//!
//! The distance field is an exact Euclidean distance transform computed with
//! the separable lower-envelope-of-parabolas method: a column pass followed by
//! a row pass over squared distances. Values are in world units
//! (`pixels * resolution`). Unknown cells are treated as free, so the ridge
//! network extends into unexplored space instead of stopping at a spurious
//! frontier boundary.
//!
//! Ridges are strict local maxima of the field over the 8-neighborhood,
//! which approximates the Generalized Voronoi Diagram of the obstacles.
//! Ridges on a slope (where the field keeps increasing along the ridge) are
//! not local maxima and do not show up; plateaus and saddle crests do.
//!
//! Both stages are pure functions of their input. With `parallel` enabled,
//! independent rows/columns run on the rayon pool and are collected in index
//! order, so the output never depends on scheduling.

mod distance;
mod ridge;

pub use distance::{DistanceFieldBuilder, FieldConfig, build_distance_field};
pub use ridge::{RIDGE_EPSILON, RidgeExtractor, extract_ridges};
