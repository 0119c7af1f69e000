//! Static per-operation cost model.
//!
//! [`CostModel`] maps each [`PointCloudOperation`] to an
//! [`OperationComplexity`]: a memory multiplier on the per-point baseline,
//! CPU/GPU affinity, a safe point-count ceiling, and a wall-clock rate used for
//! time estimates. The model is built once at process start and shared by
//! reference; it is never mutated afterwards.
//!
//! Operations without an entry resolve to [`OperationComplexity::DEFAULT`]
//! rather than failing, so a new operation works before it is calibrated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::operations::PointCloudOperation;

/// Baseline bytes per point: xyz + rgb + normal, 3 × f32 each.
pub const BYTES_PER_POINT: f64 = 36.0;

/// Seconds per million points used for operations without a calibrated rate.
///
/// A flat placeholder rather than a measured figure.
pub const DEFAULT_SECONDS_PER_MILLION_POINTS: f64 = 20.0;

/// Resource profile of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperationComplexity {
    /// Multiplier applied to [`BYTES_PER_POINT`].
    pub memory_factor: f64,
    pub cpu_intensive: bool,
    pub gpu_capable: bool,
    /// Ceiling for safe execution on a constrained host.
    pub recommended_max_points: u64,
}

impl OperationComplexity {
    /// Conservative medium estimate for uncalibrated operations.
    pub const DEFAULT: OperationComplexity = OperationComplexity {
        memory_factor: 3.0,
        cpu_intensive: false,
        gpu_capable: false,
        recommended_max_points: 500_000,
    };

    const fn new(
        memory_factor: f64,
        cpu_intensive: bool,
        gpu_capable: bool,
        recommended_max_points: u64,
    ) -> Self {
        Self {
            memory_factor,
            cpu_intensive,
            gpu_capable,
            recommended_max_points,
        }
    }
}

impl Default for OperationComplexity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Immutable lookup from operation to complexity and time rate.
#[derive(Debug, Clone)]
pub struct CostModel {
    complexity: HashMap<PointCloudOperation, OperationComplexity>,
    seconds_per_million: HashMap<PointCloudOperation, f64>,
}

impl CostModel {
    /// A model with no entries; every lookup returns the defaults.
    pub fn empty() -> Self {
        Self {
            complexity: HashMap::new(),
            seconds_per_million: HashMap::new(),
        }
    }

    /// The calibrated production table.
    pub fn standard() -> Self {
        use PointCloudOperation as Op;

        let complexity = [
            (Op::LoadPointcloud, OperationComplexity::new(1.0, false, false, 10_000_000)),
            (Op::CreatePointcloud, OperationComplexity::new(1.0, false, false, 10_000_000)),
            (Op::SavePointcloud, OperationComplexity::new(1.0, false, false, 10_000_000)),
            (Op::GetMetadata, OperationComplexity::new(1.0, false, false, 10_000_000)),
            (Op::Translate, OperationComplexity::new(1.1, false, false, 10_000_000)),
            (Op::Scale, OperationComplexity::new(1.1, false, false, 10_000_000)),
            (Op::Rotate, OperationComplexity::new(1.2, false, false, 5_000_000)),
            (Op::VoxelDownsample, OperationComplexity::new(2.0, true, true, 1_000_000)),
            (Op::ComputeNormals, OperationComplexity::new(3.0, true, true, 500_000)),
            (Op::FilterOutliers, OperationComplexity::new(3.5, true, false, 500_000)),
            (Op::ComputeConvexHull, OperationComplexity::new(4.0, true, false, 200_000)),
            (Op::ClusterConnected, OperationComplexity::new(4.5, true, false, 200_000)),
            (Op::SurfaceReconstruction, OperationComplexity::new(8.0, true, true, 100_000)),
            (Op::IcpRegistration, OperationComplexity::new(6.0, true, true, 200_000)),
            (Op::ClusterDbscan, OperationComplexity::new(7.0, true, false, 100_000)),
            (Op::AlphaShapes, OperationComplexity::new(10.0, true, false, 50_000)),
            (Op::MlsSmoothing, OperationComplexity::new(12.0, true, true, 50_000)),
        ]
        .into_iter()
        .collect();

        let seconds_per_million = [
            (Op::VoxelDownsample, 2.0),
            (Op::ComputeNormals, 10.0),
            (Op::FilterOutliers, 15.0),
            (Op::SurfaceReconstruction, 120.0),
            (Op::IcpRegistration, 60.0),
        ]
        .into_iter()
        .collect();

        Self {
            complexity,
            seconds_per_million,
        }
    }

    /// Adds or replaces an entry. Intended for building custom tables.
    #[must_use]
    pub fn with_entry(mut self, op: PointCloudOperation, complexity: OperationComplexity) -> Self {
        self.complexity.insert(op, complexity);
        self
    }

    /// Adds or replaces a time rate.
    #[must_use]
    pub fn with_time_rate(mut self, op: PointCloudOperation, seconds_per_million: f64) -> Self {
        self.seconds_per_million.insert(op, seconds_per_million);
        self
    }

    /// Complexity of `op`, or [`OperationComplexity::DEFAULT`] if uncalibrated.
    pub fn cost_of(&self, op: PointCloudOperation) -> OperationComplexity {
        self.complexity.get(&op).copied().unwrap_or_default()
    }

    /// Complexity by wire name. Unknown names resolve to the default.
    pub fn cost_of_name(&self, name: &str) -> OperationComplexity {
        PointCloudOperation::from_name(name)
            .map(|op| self.cost_of(op))
            .unwrap_or_default()
    }

    /// Base seconds per million points on a single core.
    pub fn seconds_per_million_points(&self, op: PointCloudOperation) -> f64 {
        self.seconds_per_million
            .get(&op)
            .copied()
            .unwrap_or(DEFAULT_SECONDS_PER_MILLION_POINTS)
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_name_resolves_to_default() {
        let model = CostModel::standard();
        let cost = model.cost_of_name("quantum_teleport");
        assert_eq!(cost.memory_factor, 3.0);
        assert_eq!(cost.recommended_max_points, 500_000);
        assert!(!cost.cpu_intensive);
        assert!(!cost.gpu_capable);
    }

    #[test]
    fn test_missing_entry_resolves_to_default() {
        let model = CostModel::empty();
        assert_eq!(
            model.cost_of(PointCloudOperation::AlphaShapes),
            OperationComplexity::DEFAULT
        );
    }

    #[test]
    fn test_every_operation_is_calibrated_except_analysis() {
        let model = CostModel::standard();
        for op in PointCloudOperation::ALL {
            if op == PointCloudOperation::AnalyzeResources {
                continue;
            }
            assert!(model.complexity.contains_key(&op), "{op} has no entry");
        }
    }

    #[test]
    fn test_calibration_matches_table() {
        let model = CostModel::standard();
        let normals = model.cost_of(PointCloudOperation::ComputeNormals);
        assert_eq!(normals.memory_factor, 3.0);
        assert!(normals.gpu_capable);
        assert_eq!(normals.recommended_max_points, 500_000);

        let mls = model.cost_of(PointCloudOperation::MlsSmoothing);
        assert_eq!(mls.memory_factor, 12.0);
        assert_eq!(mls.recommended_max_points, 50_000);
    }

    #[test]
    fn test_time_rate_defaults() {
        let model = CostModel::standard();
        assert_eq!(
            model.seconds_per_million_points(PointCloudOperation::ComputeNormals),
            10.0
        );
        assert_eq!(
            model.seconds_per_million_points(PointCloudOperation::ClusterDbscan),
            DEFAULT_SECONDS_PER_MILLION_POINTS
        );
    }

    #[test]
    fn test_custom_entry_overrides_standard() {
        let custom = OperationComplexity {
            memory_factor: 1.5,
            cpu_intensive: false,
            gpu_capable: false,
            recommended_max_points: 42,
        };
        let model = CostModel::standard().with_entry(PointCloudOperation::ComputeNormals, custom);
        assert_eq!(model.cost_of(PointCloudOperation::ComputeNormals), custom);
    }
}
