//! Topological graph extraction from binary skeleton masks.
//!
//! The skeleton is read with 8-connectivity:
//! - Pixels with exactly one skeleton neighbor (endpoints) or three or more
//!   (junctions) are node candidates.
//! - Candidates within `merge_radius` of each other (transitively) collapse
//!   into one node at their rounded centroid.
//! - Degree-2 pixels are walked from every node until another node pixel is
//!   reached. A walk that runs out of unvisited neighbors promotes its last
//!   pixel to a new dead-end node.
//! - Edges shorter than `prune_min_length` are dropped afterwards. Nodes are
//!   never removed, so pruning can leave isolated nodes behind.
//!
//! Known limitation: a closed ring made of degree-2 pixels only has no node
//! candidate and is therefore absent from the output.
//!
//! Output is deterministic: candidates are scanned in row-major order,
//! clusters are numbered by their first member, neighbors are tried in the
//! fixed order NW, N, NE, W, E, SW, S, SE, and edges are numbered in
//! emission order.

mod build;
mod graph;
mod union_find;

pub use build::{
    BuildStats, GraphBuildConfig, build_topology, build_topology_from_mask,
    build_topology_with_stats,
};
pub use graph::{EdgeId, NodeId, TopoEdge, TopoNode, TopologicalMap};
