use std::time::{Duration, Instant};

use gvd_core::{DistanceField, Image, OccupancyGrid, SkeletonMask};
use gvd_field::{DistanceFieldBuilder, RidgeExtractor};
use gvd_graph::{BuildStats, TopologicalMap, build_topology_with_stats};
use gvd_morph::thin_zhang_suen_u8;
use log::{debug, warn};

use crate::PipelineConfig;

/// Wall-clock time spent in each stage of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub distance: Duration,
    pub ridges: Duration,
    pub thinning: Duration,
    pub graph: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.distance + self.ridges + self.thinning + self.graph
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    /// Ridge pixels before thinning.
    pub ridge_pixels: usize,
    pub graph: BuildStats,
    pub timings: StageTimings,
}

/// Every intermediate product of one run, for inspection and rendering.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub distance: DistanceField,
    /// The mask handed to the graph builder (thinned when enabled).
    pub skeleton: SkeletonMask,
    pub map: TopologicalMap,
    pub stats: PipelineStats,
}

/// Occupancy grid to topological map: distance field, ridges, optional
/// thinning, graph.
///
/// The pipeline holds configuration only; every run is independent.
#[derive(Debug, Clone, Default)]
pub struct TopologyPipeline {
    cfg: PipelineConfig,
    field: DistanceFieldBuilder,
    ridges: RidgeExtractor,
}

impl TopologyPipeline {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            cfg,
            field: DistanceFieldBuilder::new(cfg.field_config()),
            ridges: RidgeExtractor::new(cfg.parallel),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn extract(&self, grid: &OccupancyGrid) -> TopologicalMap {
        self.run(grid).map
    }

    /// Classifies ROS-style occupancy values (`-1` unknown, `0..=100`) with
    /// the configured threshold, then runs the pipeline.
    pub fn run_occupancy_values(
        &self,
        width: usize,
        height: usize,
        resolution: f64,
        values: &[i8],
    ) -> PipelineOutput {
        let grid = OccupancyGrid::from_occupancy_values(
            width,
            height,
            resolution,
            values,
            self.cfg.occupancy_threshold,
        );
        self.run(&grid)
    }

    pub fn run(&self, grid: &OccupancyGrid) -> PipelineOutput {
        if let Err(err) = grid.validate() {
            warn!("pipeline: rejecting grid: {err}");
            return PipelineOutput::default();
        }

        let mut timings = StageTimings::default();

        let t = Instant::now();
        let distance = self.field.build(grid);
        timings.distance = t.elapsed();

        let t = Instant::now();
        let ridges = self.ridges.extract(&distance);
        timings.ridges = t.elapsed();
        let ridge_pixels = count_set(&ridges);

        let skeleton = if self.cfg.thin_skeleton {
            let t = Instant::now();
            let thinned = thin_zhang_suen_u8(&ridges.as_view());
            timings.thinning = t.elapsed();
            thinned
        } else {
            ridges
        };

        let t = Instant::now();
        let (map, graph) = build_topology_with_stats(
            skeleton.data(),
            skeleton.width(),
            skeleton.height(),
            grid.resolution,
            &self.cfg.graph_config(),
        );
        timings.graph = t.elapsed();

        debug!(
            "pipeline: {}x{} grid, {} ridge px, {} skeleton px, {} nodes, {} edges \
             (distance {:?}, ridges {:?}, thinning {:?}, graph {:?})",
            grid.width,
            grid.height,
            ridge_pixels,
            graph.skeleton_pixels,
            map.nodes.len(),
            map.edges.len(),
            timings.distance,
            timings.ridges,
            timings.thinning,
            timings.graph
        );

        PipelineOutput {
            distance,
            skeleton,
            map,
            stats: PipelineStats {
                ridge_pixels,
                graph,
                timings,
            },
        }
    }
}

fn count_set(mask: &Image<u8>) -> usize {
    mask.data().iter().filter(|&&v| v != 0).count()
}
