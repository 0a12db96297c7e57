use gvd_core::Point2;
use serde::{Deserialize, Serialize};

pub type NodeId = usize;
pub type EdgeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopoNode {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
}

impl TopoNode {
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopoEdge {
    pub id: EdgeId,
    pub u: NodeId,
    pub v: NodeId,
    /// Path length in world units, accumulated along `polyline`.
    pub length: f64,
    /// World-space points from the pixel next to `u` up to the pixel at `v`.
    pub polyline: Vec<[f64; 2]>,
}

impl TopoEdge {
    pub fn connects(&self, node: NodeId) -> bool {
        self.u == node || self.v == node
    }

    pub fn polyline_length(&self) -> f64 {
        self.polyline
            .windows(2)
            .map(|w| (w[1][0] - w[0][0]).hypot(w[1][1] - w[0][1]))
            .sum()
    }
}

/// Nodes and edges in creation order.
///
/// Node ids are dense (`nodes[i].id == i`). Edge ids are unique and
/// increasing; pruning can leave gaps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopologicalMap {
    pub nodes: Vec<TopoNode>,
    pub edges: Vec<TopoEdge>,
}

impl TopologicalMap {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&TopoNode> {
        self.nodes.get(id).filter(|n| n.id == id)
    }

    pub fn incident_edges(&self, node: NodeId) -> impl Iterator<Item = &TopoEdge> {
        self.edges.iter().filter(move |e| e.connects(node))
    }

    /// Number of edge ends at `node`; a self loop counts twice.
    pub fn degree(&self, node: NodeId) -> usize {
        self.edges
            .iter()
            .map(|e| usize::from(e.u == node) + usize::from(e.v == node))
            .sum()
    }

    /// Nodes that no surviving edge touches.
    pub fn isolated_nodes(&self) -> impl Iterator<Item = &TopoNode> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.connects(n.id)))
    }

    pub fn total_length(&self) -> f64 {
        self.edges.iter().map(|e| e.length).sum()
    }

    /// Pretty-printed JSON in the `{"nodes": [...], "edges": [...]}` layout.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
