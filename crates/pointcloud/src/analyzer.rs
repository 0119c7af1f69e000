//! Resource analysis: memory estimates and parameter adjustment.
//!
//! [`ResourceAnalyzer`] combines a point count, an operation and a
//! [`SystemResources`] snapshot into an [`OptimizationSuggestion`]. It never
//! changes a request silently: every override it makes lands in
//! `adjusted_params` together with a human-readable reason in `suggestions`.
//! Whether the overrides are applied is the caller's decision.
//!
//! All functions here are pure; the same inputs always produce the same
//! suggestion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cost_model::{CostModel, OperationComplexity, BYTES_PER_POINT};
use crate::errors::PointCloudError;
use crate::operations::PointCloudOperation;
use crate::types::SystemResources;

/// Fraction of available memory above which an operation needs adjustment.
pub const ADJUSTMENT_TRIGGER_RATIO: f64 = 0.8;

/// Fraction of available memory targeted when recommending a point count.
pub const SAFE_MEMORY_RATIO: f64 = 0.6;

/// Voxel edge length used when no reduction is required.
pub const BASE_VOXEL_SIZE: f64 = 0.01;

/// Derating applied to the core count for time estimates; work does not
/// parallelise perfectly.
pub const PARALLEL_EFFICIENCY: f64 = 0.7;

/// Projected run time above which a time-estimate suggestion is added.
pub const TIME_WARNING_SECONDS: f64 = 60.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Voxel size that reduces `current` points to roughly `target`.
///
/// Assumes a uniform 3D grid, so the edge length scales with the cube root
/// of the reduction ratio. `target` is clamped to at least one point.
pub fn calculate_voxel_size(current: u64, target: u64) -> f64 {
    let ratio = current as f64 / target.max(1) as f64;
    BASE_VOXEL_SIZE * ratio.cbrt()
}

/// Outcome of [`ResourceAnalyzer::suggest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    /// Estimated memory exceeds [`ADJUSTMENT_TRIGGER_RATIO`] of available memory.
    pub needs_adjustment: bool,
    pub estimated_memory_bytes: f64,
    pub available_memory_bytes: f64,
    /// Rationale trail, in the order the adjustments were made.
    pub suggestions: Vec<String>,
    /// The caller's parameters with any overrides applied.
    pub adjusted_params: Map<String, Value>,
    pub can_use_gpu: bool,
    /// Projected wall-clock seconds, for CPU-intensive operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_seconds: Option<f64>,
}

impl OptimizationSuggestion {
    /// `true` when the analyzer recommends downsampling before running.
    pub fn auto_downsample(&self) -> bool {
        self.adjusted_params
            .get("auto_downsample")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Recommended point count, when a downsample was suggested.
    pub fn target_points(&self) -> Option<u64> {
        self.adjusted_params.get("target_points").and_then(Value::as_u64)
    }

    /// Voxel size matching [`Self::target_points`].
    pub fn voxel_size(&self) -> Option<f64> {
        self.adjusted_params.get("voxel_size").and_then(Value::as_f64)
    }
}

/// Memory estimation and parameter adjustment over a shared [`CostModel`].
#[derive(Debug, Clone)]
pub struct ResourceAnalyzer {
    cost_model: Arc<CostModel>,
}

impl ResourceAnalyzer {
    pub fn new(cost_model: Arc<CostModel>) -> Self {
        Self { cost_model }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn cost_of(&self, op: PointCloudOperation) -> OperationComplexity {
        self.cost_model.cost_of(op)
    }

    /// `point_count × 36 bytes × memory_factor`.
    pub fn estimate_memory(&self, point_count: u64, op: PointCloudOperation) -> f64 {
        point_count as f64 * BYTES_PER_POINT * self.cost_of(op).memory_factor
    }

    /// Projected wall-clock seconds for `point_count` points on `cpu_count` cores.
    pub fn estimate_seconds(&self, point_count: u64, op: PointCloudOperation, cpu_count: usize) -> f64 {
        let rate = self.cost_model.seconds_per_million_points(op);
        let effective_cores = cpu_count.max(1) as f64 * PARALLEL_EFFICIENCY;
        rate * (point_count as f64 / 1_000_000.0) / effective_cores
    }

    /// Checks `op` on `point_count` points against `resources` and proposes
    /// safer parameters when needed.
    pub fn suggest(
        &self,
        point_count: u64,
        op: PointCloudOperation,
        params: &Map<String, Value>,
        resources: &SystemResources,
    ) -> OptimizationSuggestion {
        let cost = self.cost_of(op);
        let estimated = self.estimate_memory(point_count, op);
        let available = resources.available_memory_bytes;
        let needs_adjustment = estimated > available * ADJUSTMENT_TRIGGER_RATIO;

        let mut suggestions = Vec::new();
        let mut adjusted = params.clone();

        if needs_adjustment {
            let safe_memory = available * SAFE_MEMORY_RATIO;
            let by_memory = (safe_memory / (BYTES_PER_POINT * cost.memory_factor))
                .floor()
                .max(0.0) as u64;
            let recommended = by_memory.min(cost.recommended_max_points);
            if point_count > recommended {
                suggestions.push(format!(
                    "Estimated memory requirement {:.1} MB exceeds the safe limit for {:.1} MB available; \
                     recommend downsampling to {} points",
                    estimated / BYTES_PER_MB,
                    available / BYTES_PER_MB,
                    recommended
                ));
                adjusted.insert("auto_downsample".to_string(), Value::Bool(true));
                adjusted.insert("target_points".to_string(), Value::from(recommended));
                adjusted.insert(
                    "voxel_size".to_string(),
                    Value::from(calculate_voxel_size(point_count, recommended)),
                );
            }
        }

        apply_operation_heuristics(op, point_count, resources, &mut adjusted, &mut suggestions);

        let estimated_seconds = cost.cpu_intensive.then(|| {
            let seconds = self.estimate_seconds(point_count, op, resources.cpu_count);
            if seconds > TIME_WARNING_SECONDS {
                suggestions.push(format!(
                    "Estimated processing time is {:.0} seconds on {} CPU cores; consider downsampling first",
                    seconds, resources.cpu_count
                ));
            }
            seconds
        });

        if needs_adjustment {
            debug!(
                operation = %op,
                point_count,
                estimated_bytes = estimated,
                available_bytes = available,
                "operation exceeds memory threshold"
            );
        }

        OptimizationSuggestion {
            needs_adjustment,
            estimated_memory_bytes: estimated,
            available_memory_bytes: available,
            suggestions,
            adjusted_params: adjusted,
            can_use_gpu: cost.gpu_capable && resources.has_gpu,
            estimated_seconds,
        }
    }

    /// Refuses `op` when its estimate crosses the adjustment threshold.
    ///
    /// The returned [`PointCloudError::Resource`] always carries at least one
    /// actionable suggestion.
    pub fn require_within_budget(
        &self,
        point_count: u64,
        op: PointCloudOperation,
        resources: &SystemResources,
    ) -> Result<OptimizationSuggestion, PointCloudError> {
        let suggestion = self.suggest(point_count, op, &Map::new(), resources);
        if suggestion.needs_adjustment {
            return Err(resource_error(op, &suggestion));
        }
        Ok(suggestion)
    }
}

/// Builds the [`PointCloudError::Resource`] describing why `op` cannot run as requested.
pub fn resource_error(op: PointCloudOperation, suggestion: &OptimizationSuggestion) -> PointCloudError {
    let mut suggestions = suggestion.suggestions.clone();
    if let Some(target) = suggestion.target_points() {
        suggestions.push(format!(
            "Run voxel_downsample with target_points={target} before {op}"
        ));
    }
    if suggestions.is_empty() {
        suggestions.push("Free memory or run on a host with more available RAM".to_string());
    }
    PointCloudError::Resource {
        message: format!(
            "Insufficient memory for {op}: estimated {:.1} MB required, {:.1} MB available",
            suggestion.estimated_memory_bytes / BYTES_PER_MB,
            suggestion.available_memory_bytes / BYTES_PER_MB
        ),
        suggestions,
    }
}

fn apply_operation_heuristics(
    op: PointCloudOperation,
    point_count: u64,
    resources: &SystemResources,
    adjusted: &mut Map<String, Value>,
    suggestions: &mut Vec<String>,
) {
    let low_memory = resources.is_low_memory();
    match op {
        PointCloudOperation::ComputeNormals if low_memory => {
            cap_integer(adjusted, suggestions, "max_nearest_neighbors", 30, 20, "low memory");
        }
        PointCloudOperation::SurfaceReconstruction if low_memory => {
            cap_integer(adjusted, suggestions, "depth", 8, 6, "low memory");
        }
        PointCloudOperation::IcpRegistration if low_memory => {
            cap_integer(adjusted, suggestions, "max_iterations", 30, 20, "low memory");
        }
        PointCloudOperation::ClusterDbscan if point_count > 100_000 => {
            if let Some(eps) = adjusted.get("eps").and_then(Value::as_f64) {
                if eps < 0.01 {
                    adjusted.insert("eps".to_string(), Value::from(0.05));
                    suggestions.push(format!(
                        "Increased eps from {eps} to 0.05; a radius below 0.01 on more than 100000 points \
                         produces excessive neighbor queries"
                    ));
                }
            }
        }
        _ => {}
    }
}

/// Replaces `key` with `cap` when the caller asked for more than `threshold`.
fn cap_integer(
    adjusted: &mut Map<String, Value>,
    suggestions: &mut Vec<String>,
    key: &str,
    threshold: u64,
    cap: u64,
    reason: &str,
) {
    if let Some(requested) = adjusted.get(key).and_then(Value::as_u64) {
        if requested > threshold {
            adjusted.insert(key.to_string(), Value::from(cap));
            suggestions.push(format!("Reduced {key} from {requested} to {cap} due to {reason}"));
        }
    }
}
