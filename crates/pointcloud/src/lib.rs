//! Core resource-governance domain for the ACT point-cloud node.
//!
//! Decides, for a given operation and point-cloud size, whether the operation
//! is safe to run on the current machine and, if not, how to adapt its
//! parameters before a geometry backend is called.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! Host probing lives in the `probe` crate, geometry in the `geometry` crate,
//! and request handling in the `nodes` crate.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RequestId`) |
//! | [`types`] | Value types (`SystemResources`, `PointCloud`, `PointCloudMetadata`, etc.) |
//! | [`errors`] | The `PointCloudError` taxonomy |
//! | [`operations`] | The closed catalogue of operations and their parameters |
//! | [`cost_model`] | Per-operation memory/CPU/GPU profile |
//! | [`analyzer`] | Memory estimation and parameter adjustment |
//! | [`ports`] | Traits implemented by infrastructure crates |

pub mod analyzer;
pub mod cost_model;
pub mod errors;
pub mod identifiers;
pub mod operations;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use analyzer::{
    calculate_voxel_size, resource_error, OptimizationSuggestion, ResourceAnalyzer,
    ADJUSTMENT_TRIGGER_RATIO, BASE_VOXEL_SIZE, PARALLEL_EFFICIENCY, SAFE_MEMORY_RATIO,
    TIME_WARNING_SECONDS,
};
pub use cost_model::{
    CostModel, OperationComplexity, BYTES_PER_POINT, DEFAULT_SECONDS_PER_MILLION_POINTS,
};
pub use errors::{PointCloudError, PointCloudResult};
pub use identifiers::RequestId;
pub use operations::{Availability, ParameterSpec, PointCloudOperation};
pub use ports::{GeometryBackend, GpuProbe, Node, ResourceProbe};
pub use types::{
    Bounds, GpuInfo, PointCloud, PointCloudMetadata, PointFormat, SourceInfo, SystemResources,
    Timestamp, Transform, GIB, LOW_MEMORY_BYTES, VERY_LOW_MEMORY_BYTES,
};
