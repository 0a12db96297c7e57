//! Umbrella crate for the `gvd` workspace: occupancy grid in, topological
//! map out.
//!
//! Stages, each a pure function of the previous one's output:
//! 1. [`build_distance_field`]: exact Euclidean distance to the nearest
//!    obstacle, in world units.
//! 2. [`extract_ridges`]: local maxima of the field, approximating the
//!    Generalized Voronoi Diagram of the obstacles.
//! 3. [`thin_zhang_suen_u8`] (optional, on by default): reduces the ridge
//!    mask to one-pixel width.
//! 4. [`build_topology`]: nodes, traced edges and pruning.
//!
//! [`TopologyPipeline`] chains them under one [`PipelineConfig`]. Options can
//! be layered from several sources with [`PipelineOverrides`].

mod config;
mod pipeline;

pub use config::{ConfigError, PipelineConfig, PipelineOverrides};
pub use pipeline::{PipelineOutput, PipelineStats, StageTimings, TopologyPipeline};

pub use gvd_core::*;
pub use gvd_field::*;
pub use gvd_graph::*;
pub use gvd_morph::*;
