use gvd_core::SkeletonMask;
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::graph::{NodeId, TopoEdge, TopoNode, TopologicalMap};
use crate::union_find::UnionFind;

// Neighbor offsets in tie-break order: NW, N, NE, W, E, SW, S, SE.
// Whenever more than one neighbor qualifies, the lowest index wins.
const DX: [isize; 8] = [-1, 0, 1, -1, 1, -1, 0, 1];
const DY: [isize; 8] = [-1, -1, -1, 0, 0, 1, 1, 1];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphBuildConfig {
    /// Candidate node pixels closer than this (world units) share a node.
    pub merge_radius: f64,
    /// Edges shorter than this (world units) are dropped after tracing.
    pub prune_min_length: f64,
    /// A trace taking more steps than this is abandoned without an edge.
    pub max_trace_steps: usize,
    pub parallel: bool,
}

impl Default for GraphBuildConfig {
    fn default() -> Self {
        Self {
            merge_radius: 0.2,
            prune_min_length: 0.5,
            max_trace_steps: 100_000,
            parallel: true,
        }
    }
}

/// Counters collected while building one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildStats {
    pub skeleton_pixels: usize,
    pub candidates: usize,
    pub clusters: usize,
    pub dead_ends: usize,
    pub aborted_traces: usize,
    pub traced_edges: usize,
    pub pruned_edges: usize,
}

pub fn build_topology_from_mask(
    mask: &SkeletonMask,
    resolution: f64,
    cfg: &GraphBuildConfig,
) -> TopologicalMap {
    build_topology(mask.data(), mask.width(), mask.height(), resolution, cfg)
}

pub fn build_topology(
    mask: &[u8],
    width: usize,
    height: usize,
    resolution: f64,
    cfg: &GraphBuildConfig,
) -> TopologicalMap {
    build_topology_with_stats(mask, width, height, resolution, cfg).0
}

/// Converts a skeleton mask (non-zero = ridge pixel) into a topological map.
///
/// Malformed input (zero dimension, `mask.len() != width * height`,
/// non-positive resolution) yields an empty map.
///
/// A closed ring made only of degree-2 pixels has no candidate node and is
/// dropped entirely: it produces neither nodes nor edges.
pub fn build_topology_with_stats(
    mask: &[u8],
    width: usize,
    height: usize,
    resolution: f64,
    cfg: &GraphBuildConfig,
) -> (TopologicalMap, BuildStats) {
    let mut stats = BuildStats::default();

    if !input_is_valid(mask.len(), width, height, resolution) {
        warn!(
            "topology: rejecting mask (len={}, {width}x{height}, resolution={resolution})",
            mask.len()
        );
        return (TopologicalMap::default(), stats);
    }

    let skel: Vec<u8> = mask.iter().map(|&v| u8::from(v != 0)).collect();
    stats.skeleton_pixels = skel.iter().filter(|&&v| v != 0).count();
    if stats.skeleton_pixels == 0 {
        return (TopologicalMap::default(), stats);
    }

    let grid = PixelGrid {
        width,
        height,
        resolution,
    };

    let degree = degree_map(&skel, width, height, cfg.parallel);
    let candidates = collect_candidates(&skel, &degree, width, height, cfg.parallel);
    stats.candidates = candidates.len();

    let radius_px = cfg.merge_radius.max(0.0) / resolution;
    let clusters = cluster_candidates(&candidates, radius_px);
    stats.clusters = clusters.len();

    let mut nodes = Vec::with_capacity(clusters.len());
    let mut anchors = Vec::with_capacity(clusters.len());
    let mut label: Vec<Option<NodeId>> = vec![None; skel.len()];
    for members in &clusters {
        let (cx, cy) = centroid(members.iter().map(|&i| candidates[i]));
        let id = nodes.len();
        nodes.push(grid.node(id, cx, cy));
        anchors.push((cx, cy));

        // Centroids can coincide; the earlier cluster owns the pixel.
        let p = cy * width + cx;
        if label[p].is_none() {
            label[p] = Some(id);
        }
    }

    let mut tracer = Tracer {
        grid,
        skel: &skel,
        label,
        visited: vec![false; skel.len()],
        max_steps: cfg.max_trace_steps,
        nodes,
        edges: Vec::new(),
        stats: &mut stats,
    };

    // Dead-end nodes promoted while tracing are appended to `nodes` but
    // never start traces of their own: every neighbor they have is already
    // on the path that reached them.
    for (origin, &(sx, sy)) in anchors.iter().enumerate() {
        for k in 0..8 {
            let Some(first) = tracer.grid.neighbor(sx, sy, k) else {
                continue;
            };
            if tracer.skel[first] == 0 || tracer.visited[first] {
                continue;
            }
            tracer.trace(origin, (sx, sy), first);
        }
    }

    let Tracer { nodes, mut edges, .. } = tracer;

    stats.traced_edges = edges.len();
    edges.retain(|e| e.length >= cfg.prune_min_length);
    stats.pruned_edges = stats.traced_edges - edges.len();

    debug!(
        "topology: {} skeleton px, {} candidates -> {} clusters, {} dead ends, {} aborted, \
         {} edges ({} pruned)",
        stats.skeleton_pixels,
        stats.candidates,
        stats.clusters,
        stats.dead_ends,
        stats.aborted_traces,
        edges.len(),
        stats.pruned_edges
    );

    (TopologicalMap { nodes, edges }, stats)
}

fn input_is_valid(len: usize, width: usize, height: usize, resolution: f64) -> bool {
    width > 0
        && height > 0
        && resolution.is_finite()
        && resolution > 0.0
        && width.checked_mul(height) == Some(len)
}

#[derive(Debug, Clone, Copy)]
struct PixelGrid {
    width: usize,
    height: usize,
    resolution: f64,
}

impl PixelGrid {
    #[inline]
    fn neighbor(&self, x: usize, y: usize, k: usize) -> Option<usize> {
        let nx = x as isize + DX[k];
        let ny = y as isize + DY[k];
        if nx < 0 || ny < 0 || nx >= self.width as isize || ny >= self.height as isize {
            return None;
        }
        Some(ny as usize * self.width + nx as usize)
    }

    #[inline]
    fn coords(&self, p: usize) -> (usize, usize) {
        (p % self.width, p / self.width)
    }

    #[inline]
    fn world(&self, x: usize, y: usize) -> [f64; 2] {
        [x as f64 * self.resolution, y as f64 * self.resolution]
    }

    fn node(&self, id: NodeId, x: usize, y: usize) -> TopoNode {
        let [wx, wy] = self.world(x, y);
        TopoNode { id, x: wx, y: wy }
    }
}

struct Tracer<'a> {
    grid: PixelGrid,
    skel: &'a [u8],
    label: Vec<Option<NodeId>>,
    visited: Vec<bool>,
    max_steps: usize,
    nodes: Vec<TopoNode>,
    edges: Vec<TopoEdge>,
    stats: &'a mut BuildStats,
}

impl Tracer<'_> {
    /// Walks the skeleton from `first`, a neighbor of the origin node pixel
    /// `start`, and emits at most one edge.
    fn trace(&mut self, origin: NodeId, start: (usize, usize), first: usize) {
        let start_p = start.1 * self.grid.width + start.0;
        let mut prev = start_p;
        let mut cur = first;
        let mut polyline = Vec::new();
        let mut length = 0.0f64;
        let mut steps = 0usize;

        loop {
            if steps > self.max_steps {
                self.stats.aborted_traces += 1;
                debug!("topology: trace from node {origin} exceeded {} steps", self.max_steps);
                return;
            }

            self.visited[cur] = true;
            let (cx, cy) = self.grid.coords(cur);
            polyline.push(self.grid.world(cx, cy));

            if cur == start_p {
                return;
            }

            if let Some(target) = self.label[cur] {
                self.emit(origin, target, length, polyline);
                return;
            }

            let Some((k, next)) = self.next_pixel(cx, cy, prev) else {
                let id = self.nodes.len();
                self.nodes.push(self.grid.node(id, cx, cy));
                self.label[cur] = Some(id);
                self.stats.dead_ends += 1;
                self.emit(origin, id, length, polyline);
                return;
            };

            let dx = DX[k] as f64 * self.grid.resolution;
            let dy = DY[k] as f64 * self.grid.resolution;
            length += dx.hypot(dy);
            prev = cur;
            cur = next;
            steps += 1;
        }
    }

    /// Lowest-index skeleton neighbor that is neither `prev` nor visited.
    fn next_pixel(&self, x: usize, y: usize, prev: usize) -> Option<(usize, usize)> {
        (0..8).find_map(|k| {
            let nb = self.grid.neighbor(x, y, k)?;
            (nb != prev && self.skel[nb] != 0 && !self.visited[nb]).then_some((k, nb))
        })
    }

    fn emit(&mut self, u: NodeId, v: NodeId, length: f64, polyline: Vec<[f64; 2]>) {
        let id = self.edges.len();
        self.edges.push(TopoEdge {
            id,
            u,
            v,
            length,
            polyline,
        });
    }
}

/// Skeleton-neighbor count per pixel (0 for background pixels).
fn degree_map(skel: &[u8], width: usize, height: usize, parallel: bool) -> Vec<u8> {
    let mut degree = vec![0u8; skel.len()];
    let fill_row = |(y, row): (usize, &mut [u8])| {
        for (x, d) in row.iter_mut().enumerate() {
            if skel[y * width + x] != 0 {
                *d = pixel_degree(skel, width, height, x, y);
            }
        }
    };

    if parallel {
        degree.par_chunks_mut(width).enumerate().for_each(fill_row);
    } else {
        degree.chunks_mut(width).enumerate().for_each(fill_row);
    }

    degree
}

fn pixel_degree(skel: &[u8], width: usize, height: usize, x: usize, y: usize) -> u8 {
    let grid = PixelGrid {
        width,
        height,
        resolution: 1.0,
    };
    (0..8)
        .filter_map(|k| grid.neighbor(x, y, k))
        .filter(|&nb| skel[nb] != 0)
        .count() as u8
}

/// Endpoint (degree 1) and junction (degree >= 3) pixels off the outermost
/// ring, in row-major order.
fn collect_candidates(
    skel: &[u8],
    degree: &[u8],
    width: usize,
    height: usize,
    parallel: bool,
) -> Vec<(usize, usize)> {
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let row_candidates = |y: usize| -> Vec<(usize, usize)> {
        (1..width - 1)
            .filter(|&x| {
                let p = y * width + x;
                skel[p] != 0 && (degree[p] == 1 || degree[p] >= 3)
            })
            .map(|x| (x, y))
            .collect()
    };

    let rows: Vec<Vec<(usize, usize)>> = if parallel {
        (1..height - 1).into_par_iter().map(row_candidates).collect()
    } else {
        (1..height - 1).map(row_candidates).collect()
    };

    rows.concat()
}

/// Groups row-major sorted candidates whose pixel distance is within
/// `radius_px` (transitively). Clusters come out ordered by their first
/// member; members keep candidate order.
fn cluster_candidates(candidates: &[(usize, usize)], radius_px: f64) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(candidates.len());
    let r2 = radius_px * radius_px;

    for (i, &(xi, yi)) in candidates.iter().enumerate() {
        for (j, &(xj, yj)) in candidates.iter().enumerate().skip(i + 1) {
            let dy = (yj - yi) as f64;
            if dy > radius_px {
                break;
            }
            let dx = xj as f64 - xi as f64;
            if dx * dx + dy * dy <= r2 {
                uf.union(i, j);
            }
        }
    }

    let mut slot = vec![usize::MAX; candidates.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for i in 0..candidates.len() {
        let root = uf.find(i);
        if slot[root] == usize::MAX {
            slot[root] = clusters.len();
            clusters.push(Vec::new());
        }
        clusters[slot[root]].push(i);
    }

    clusters
}

/// Mean position rounded half away from zero to the nearest pixel.
fn centroid(pixels: impl Iterator<Item = (usize, usize)>) -> (usize, usize) {
    let (mut sx, mut sy, mut n) = (0.0f64, 0.0f64, 0usize);
    for (x, y) in pixels {
        sx += x as f64;
        sy += y as f64;
        n += 1;
    }
    if n == 0 {
        return (0, 0);
    }

    let n = n as f64;
    ((sx / n).round() as usize, (sy / n).round() as usize)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::{
        BuildStats, GraphBuildConfig, build_topology, build_topology_with_stats,
        cluster_candidates, collect_candidates, degree_map,
    };
    use crate::TopologicalMap;

    struct Mask {
        width: usize,
        height: usize,
        data: Vec<u8>,
    }

    impl Mask {
        fn new(width: usize, height: usize) -> Self {
            Self {
                width,
                height,
                data: vec![0; width * height],
            }
        }

        fn set(&mut self, x: usize, y: usize) -> &mut Self {
            self.data[y * self.width + x] = 255;
            self
        }

        fn hline(&mut self, y: usize, xs: std::ops::RangeInclusive<usize>) -> &mut Self {
            for x in xs {
                self.set(x, y);
            }
            self
        }

        fn vline(&mut self, x: usize, ys: std::ops::RangeInclusive<usize>) -> &mut Self {
            for y in ys {
                self.set(x, y);
            }
            self
        }

        fn build(&self, resolution: f64, cfg: &GraphBuildConfig) -> (TopologicalMap, BuildStats) {
            build_topology_with_stats(&self.data, self.width, self.height, resolution, cfg)
        }
    }

    fn cfg(merge_radius: f64, prune_min_length: f64) -> GraphBuildConfig {
        GraphBuildConfig {
            merge_radius,
            prune_min_length,
            ..GraphBuildConfig::default()
        }
    }

    fn assert_consistent(map: &TopologicalMap, resolution: f64) {
        for (i, n) in map.nodes.iter().enumerate() {
            assert_eq!(n.id, i);
        }
        for pair in map.edges.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
        for e in &map.edges {
            assert!(map.node(e.u).is_some());
            assert!(map.node(e.v).is_some());
            assert!(!e.polyline.is_empty());
            assert_abs_diff_eq!(e.length, e.polyline_length(), epsilon = 1e-9);

            let v = map.node(e.v).expect("edge target exists");
            let last = e.polyline[e.polyline.len() - 1];
            assert_abs_diff_eq!(last[0], v.x, epsilon = 1e-12);
            assert_abs_diff_eq!(last[1], v.y, epsilon = 1e-12);

            let u = map.node(e.u).expect("edge origin exists");
            let first = e.polyline[0];
            assert!((first[0] - u.x).abs() <= resolution + 1e-12);
            assert!((first[1] - u.y).abs() <= resolution + 1e-12);
        }
    }

    #[test]
    fn straight_segment_gives_two_nodes_one_edge() {
        let n = 10;
        let mut m = Mask::new(14, 7);
        m.hline(3, 2..=2 + n - 1);

        let r = 0.1;
        let (map, stats) = m.build(r, &cfg(0.05, 0.0));

        assert_eq!(stats.candidates, 2);
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.edges.len(), 1);

        let e = &map.edges[0];
        assert_eq!((e.u, e.v), (0, 1));
        assert_abs_diff_eq!(e.length, (n - 2) as f64 * r, epsilon = 1e-9);
        assert!((e.length - (n - 1) as f64 * r).abs() <= r + 1e-9);
        assert_eq!(e.polyline.len(), n - 1);
        assert_consistent(&map, r);
    }

    #[test]
    fn t_junction_graph() {
        let mut m = Mask::new(9, 9);
        m.vline(4, 1..=7).hline(4, 5..=7);

        let r = 0.5;
        let (map, stats) = m.build(r, &cfg(1.5 * r, 0.0));

        // (4,3), (4,4), (4,5) and (5,4) all have degree >= 3 in 8-connectivity.
        assert_eq!(stats.candidates, 7);
        assert_eq!(stats.clusters, 4);
        assert_eq!(map.nodes.len(), 4);
        assert_eq!(map.edges.len(), 3);
        assert_eq!(stats.dead_ends, 0);

        let junction = &map.nodes[1];
        assert_eq!((junction.x, junction.y), (2.0, 2.0));
        assert_eq!(map.degree(1), 3);
        for e in &map.edges {
            assert!(e.connects(1));
            assert_abs_diff_eq!(e.length, 2.0 * r, epsilon = 1e-12);
        }
        assert_consistent(&map, r);
    }

    #[test]
    fn merge_radius_law() {
        let candidates = [(6, 5), (9, 5)];
        assert_eq!(cluster_candidates(&candidates, 3.0).len(), 1);
        assert_eq!(cluster_candidates(&candidates, 2.999).len(), 2);

        let mut m = Mask::new(16, 11);
        m.hline(5, 2..=6).hline(5, 9..=13);
        let r = 0.25;

        let (merged, stats) = m.build(r, &cfg(0.75, 0.0));
        assert_eq!(stats.clusters, 3);
        assert_eq!((merged.nodes[1].x, merged.nodes[1].y), (8.0 * r, 5.0 * r));
        // (6,5) is absorbed into the merged cluster whose anchor sits in the
        // gap, so the left run dead-ends there and gets its own node.
        assert_eq!(stats.dead_ends, 1);
        assert_eq!(merged.nodes.len(), 4);
        assert_consistent(&merged, r);

        let (split, stats) = m.build(r, &cfg(0.7, 0.0));
        assert_eq!(stats.clusters, 4);
        assert_eq!(stats.dead_ends, 0);
        assert_eq!(split.nodes.len(), 4);
        assert_eq!(split.edges.len(), 2);
        assert_consistent(&split, r);
    }

    #[test]
    fn first_cluster_keeps_shared_anchor_label() {
        // A two-pixel-thick square ring around a three-pixel bar. Both
        // clusters have their centroid at (9, 9), more than the merge radius
        // away from each other's members.
        let mut m = Mask::new(19, 19);
        for i in 2..=16 {
            for t in [2, 3, 15, 16] {
                m.set(i, t).set(t, i);
            }
        }
        m.hline(9, 8..=10);

        let r = 0.1;
        let (map, stats) = m.build(r, &cfg(2.5 * r, 0.0));

        assert_eq!(stats.clusters, 2);
        let (ring, bar) = (&map.nodes[0], &map.nodes[1]);
        assert_eq!((ring.x, ring.y), (bar.x, bar.y));
        assert_eq!((ring.x, ring.y), (9.0 * r, 9.0 * r));

        // Only the ring's node owns the pixel, so the bar's ends are reached
        // from node 0 and become dead ends. Node 1 is left without edges.
        assert_eq!(stats.dead_ends, 2);
        assert_eq!(map.nodes.len(), 4);
        assert_eq!(map.edges.len(), 2);
        assert!(map.edges.iter().all(|e| e.u == 0));
        assert_eq!(map.isolated_nodes().map(|n| n.id).collect::<Vec<_>>(), vec![1]);
        assert_consistent(&map, r);
    }

    #[test]
    fn pruning_drops_short_edges_but_keeps_nodes() {
        let mut m = Mask::new(14, 7);
        m.hline(3, 2..=11);

        let (map, stats) = m.build(0.1, &cfg(0.05, 1.0));
        assert_eq!(stats.traced_edges, 1);
        assert_eq!(stats.pruned_edges, 1);
        assert!(map.edges.is_empty());
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.isolated_nodes().count(), 2);
    }

    #[test]
    fn pruned_map_respects_threshold() {
        let mut m = Mask::new(30, 20);
        m.hline(10, 1..=28).vline(8, 2..=9).vline(20, 11..=13);

        let prune = 0.6;
        let map = build_topology(&m.data, m.width, m.height, 0.1, &cfg(0.15, prune));
        assert!(!map.edges.is_empty());
        assert!(map.edges.iter().all(|e| e.length >= prune));
    }

    #[test]
    fn dead_end_at_border_is_promoted() {
        let mut m = Mask::new(12, 11);
        m.hline(5, 0..=8);

        let r = 0.2;
        let (map, stats) = m.build(r, &cfg(0.1, 0.0));
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.dead_ends, 1);
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.edges.len(), 1);

        let e = &map.edges[0];
        assert_eq!((e.u, e.v), (0, 1));
        assert_eq!((map.nodes[1].x, map.nodes[1].y), (0.0, 5.0 * r));
        assert_abs_diff_eq!(e.length, 7.0 * r, epsilon = 1e-9);
        assert_consistent(&map, r);
    }

    #[test]
    fn pure_cycle_is_dropped() {
        let mut m = Mask::new(11, 9);
        for &(x, y) in &[
            (5, 2),
            (6, 3),
            (7, 4),
            (6, 5),
            (5, 6),
            (4, 5),
            (3, 4),
            (4, 3),
        ] {
            m.set(x, y);
        }

        let degree = degree_map(&m.data, m.width, m.height, false);
        assert!(
            m.data
                .iter()
                .zip(&degree)
                .all(|(&s, &d)| s == 0 || d == 2)
        );

        let (map, stats) = m.build(0.05, &cfg(0.2, 0.0));
        assert_eq!(stats.skeleton_pixels, 8);
        assert_eq!(stats.candidates, 0);
        assert!(map.is_empty());
    }

    #[test]
    fn empty_and_malformed_inputs_give_empty_map() {
        let c = GraphBuildConfig::default();
        assert!(build_topology(&[0; 20], 5, 4, 0.05, &c).is_empty());
        assert!(build_topology(&[], 0, 4, 0.05, &c).is_empty());
        assert!(build_topology(&[], 4, 0, 0.05, &c).is_empty());

        let mut m = Mask::new(14, 7);
        m.hline(3, 2..=11);
        assert!(build_topology(&m.data[..50], 14, 7, 0.05, &c).is_empty());
        assert!(build_topology(&m.data, 14, 7, 0.0, &c).is_empty());
        assert!(build_topology(&m.data, 14, 7, -0.1, &c).is_empty());
        assert!(build_topology(&m.data, 14, 7, f64::NAN, &c).is_empty());
    }

    #[test]
    fn step_cap_abandons_traces() {
        let mut m = Mask::new(14, 7);
        m.hline(3, 2..=11);

        let c = GraphBuildConfig {
            max_trace_steps: 0,
            ..cfg(0.05, 0.0)
        };
        let (map, stats) = m.build(0.1, &c);
        assert_eq!(stats.aborted_traces, 2);
        assert!(map.edges.is_empty());
        assert_eq!(map.nodes.len(), 2);
    }

    #[test]
    fn candidates_skip_outer_ring_and_keep_row_order() {
        let mut m = Mask::new(8, 6);
        m.hline(0, 0..=3).hline(3, 2..=5).set(7, 5);

        let degree = degree_map(&m.data, m.width, m.height, false);
        let seq = collect_candidates(&m.data, &degree, m.width, m.height, false);
        let par = collect_candidates(&m.data, &degree, m.width, m.height, true);
        assert_eq!(seq, vec![(2, 3), (5, 3)]);
        assert_eq!(seq, par);
    }

    #[test]
    fn deterministic_across_runs_and_parallelism() {
        let mut m = Mask::new(40, 30);
        m.hline(15, 1..=38)
            .vline(10, 1..=28)
            .vline(30, 5..=25)
            .hline(25, 10..=30)
            .set(20, 20)
            .set(21, 21)
            .set(22, 22);

        let par = GraphBuildConfig {
            parallel: true,
            ..cfg(0.1, 0.05)
        };
        let seq = GraphBuildConfig {
            parallel: false,
            ..par
        };

        let a = m.build(0.05, &par);
        let b = m.build(0.05, &par);
        let c = m.build(0.05, &seq);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(!a.0.edges.is_empty());
        assert_consistent(&a.0, 0.05);
    }
}
