//! Port traits implemented by infrastructure crates.
//!
//! The core defines *what* it needs from the host and from a geometry
//! library; the `probe` and `geometry` crates define *how* to supply it.
//! Tests substitute their own implementations.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::PointCloudResult;
use crate::types::{GpuInfo, PointCloud, PointFormat, SystemResources, Transform};

/// Reads instantaneous host memory, CPU and GPU availability.
///
/// Implementations read shared OS state without mutating it and must be safe
/// to call concurrently from multiple sessions. Results are never cached.
pub trait ResourceProbe: Send + Sync {
    fn probe(&self) -> SystemResources;
}

/// Optional GPU capability detection.
///
/// A missing driver or runtime yields `None`; detection never fails.
pub trait GpuProbe: Send + Sync {
    fn detect(&self) -> Option<GpuInfo>;
}

/// A point-cloud geometry library.
///
/// The core configures and calls these operations but does not own their
/// numerical internals. Calls may be long-running and blocking; the session
/// issues them off the async scheduler and never runs two concurrently
/// against the same cloud.
pub trait GeometryBackend: Send + Sync {
    /// Short name used in logs and responses.
    fn name(&self) -> &str;

    /// Formats this backend can both read and write.
    fn supported_formats(&self) -> &[PointFormat];

    fn supports(&self, format: PointFormat) -> bool {
        self.supported_formats().contains(&format)
    }

    fn load_point_cloud(&self, path: &Path, format: PointFormat) -> PointCloudResult<PointCloud>;

    fn save_point_cloud(
        &self,
        cloud: &PointCloud,
        path: &Path,
        format: PointFormat,
    ) -> PointCloudResult<()>;

    fn create(
        &self,
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[f64; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> PointCloudResult<PointCloud>;

    fn voxel_down_sample(&self, cloud: &PointCloud, voxel_size: f64) -> PointCloudResult<PointCloud>;

    /// Estimates normals in place from the `k` nearest neighbours of each point.
    fn estimate_normals(&self, cloud: &mut PointCloud, k: usize) -> PointCloudResult<()>;

    /// Returns the filtered cloud and the indices of the kept points.
    fn remove_statistical_outlier(
        &self,
        cloud: &PointCloud,
        nb_neighbors: usize,
        std_ratio: f64,
    ) -> PointCloudResult<(PointCloud, Vec<usize>)>;

    /// Returns the filtered cloud and the indices of the kept points.
    fn remove_radius_outlier(
        &self,
        cloud: &PointCloud,
        nb_points: usize,
        radius: f64,
    ) -> PointCloudResult<(PointCloud, Vec<usize>)>;

    fn transform(&self, cloud: &mut PointCloud, transform: &Transform) -> PointCloudResult<()>;
}

/// A workflow node as seen by the surrounding workflow framework.
///
/// The framework passes the raw request (`{"params": {...}}`) and receives a
/// JSON-serialisable response. A node never returns an error to the
/// framework; failures are encoded in the response.
#[async_trait]
pub trait Node: Send + Sync {
    /// Node type name as registered with the framework.
    fn node_type(&self) -> &str;

    async fn execute(&self, request: Value) -> Value;
}
