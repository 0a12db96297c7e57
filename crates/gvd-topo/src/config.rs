use gvd_field::FieldConfig;
use gvd_graph::GraphBuildConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("occupancy threshold must be in 0..=100, got {0}")]
    OccupancyThreshold(u8),
    #[error("{name} must be finite and non-negative, got {value}")]
    NegativeLength { name: &'static str, value: f64 },
    #[error("max_trace_steps must be at least 1")]
    ZeroTraceSteps,
}

/// Every tunable of the grid-to-map pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Occupancy values (`0..=100`) at or above this are obstacles.
    pub occupancy_threshold: u8,
    /// Square opening radius (cells) applied to obstacles before the distance
    /// transform. `0` disables it.
    pub morph_radius: usize,
    /// Thin the ridge mask to one pixel before building the graph.
    pub thin_skeleton: bool,
    /// World units.
    pub merge_radius: f64,
    /// World units.
    pub prune_min_length: f64,
    pub max_trace_steps: usize,
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let graph = GraphBuildConfig::default();
        Self {
            occupancy_threshold: 50,
            morph_radius: 0,
            thin_skeleton: true,
            merge_radius: graph.merge_radius,
            prune_min_length: graph.prune_min_length,
            max_trace_steps: graph.max_trace_steps,
            parallel: graph.parallel,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.occupancy_threshold > 100 {
            return Err(ConfigError::OccupancyThreshold(self.occupancy_threshold));
        }
        for (name, value) in [
            ("merge_radius", self.merge_radius),
            ("prune_min_length", self.prune_min_length),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeLength { name, value });
            }
        }
        if self.max_trace_steps == 0 {
            return Err(ConfigError::ZeroTraceSteps);
        }
        Ok(())
    }

    pub fn field_config(&self) -> FieldConfig {
        FieldConfig {
            morph_radius: self.morph_radius,
            parallel: self.parallel,
        }
    }

    pub fn graph_config(&self) -> GraphBuildConfig {
        GraphBuildConfig {
            merge_radius: self.merge_radius,
            prune_min_length: self.prune_min_length,
            max_trace_steps: self.max_trace_steps,
            parallel: self.parallel,
        }
    }
}

/// Partial [`PipelineConfig`]: `None` means "not set at this layer".
///
/// Layers stack with [`PipelineOverrides::or`] (the receiver wins) and are
/// resolved against a base with [`PipelineOverrides::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOverrides {
    pub occupancy_threshold: Option<u8>,
    pub morph_radius: Option<usize>,
    pub thin_skeleton: Option<bool>,
    pub merge_radius: Option<f64>,
    pub prune_min_length: Option<f64>,
    pub max_trace_steps: Option<usize>,
    pub parallel: Option<bool>,
}

impl PipelineOverrides {
    pub fn apply(&self, base: &PipelineConfig) -> PipelineConfig {
        PipelineConfig {
            occupancy_threshold: self.occupancy_threshold.unwrap_or(base.occupancy_threshold),
            morph_radius: self.morph_radius.unwrap_or(base.morph_radius),
            thin_skeleton: self.thin_skeleton.unwrap_or(base.thin_skeleton),
            merge_radius: self.merge_radius.unwrap_or(base.merge_radius),
            prune_min_length: self.prune_min_length.unwrap_or(base.prune_min_length),
            max_trace_steps: self.max_trace_steps.unwrap_or(base.max_trace_steps),
            parallel: self.parallel.unwrap_or(base.parallel),
        }
    }

    pub fn or(self, lower: PipelineOverrides) -> PipelineOverrides {
        PipelineOverrides {
            occupancy_threshold: self.occupancy_threshold.or(lower.occupancy_threshold),
            morph_radius: self.morph_radius.or(lower.morph_radius),
            thin_skeleton: self.thin_skeleton.or(lower.thin_skeleton),
            merge_radius: self.merge_radius.or(lower.merge_radius),
            prune_min_length: self.prune_min_length.or(lower.prune_min_length),
            max_trace_steps: self.max_trace_steps.or(lower.max_trace_steps),
            parallel: self.parallel.or(lower.parallel),
        }
    }
}
