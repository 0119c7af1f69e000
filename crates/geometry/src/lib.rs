//! Native geometry backend for the ACT point-cloud node.
//!
//! Implements the [`pointcloud::GeometryBackend`] trait in pure Rust:
//!
//! - ASCII file I/O for PLY, XYZ, XYZN, XYZRGB and PTS.
//! - Centroid voxel-grid downsampling.
//! - k-nearest-neighbour PCA normal estimation.
//! - Statistical and radius outlier removal.
//! - Translate, rotate and scale transforms.
//!
//! Neighbourhood queries use an R*-tree (`rstar`); per-point work is spread
//! across cores with `rayon`. Every call is synchronous and may block for a
//! long time on large clouds; callers on an async runtime must move calls off
//! the scheduler.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The [`pointcloud`] crate sees only
//! [`pointcloud::GeometryBackend`].

mod filters;
mod io;
mod normals;
mod spatial;
mod transform;

use std::path::Path;

use pointcloud::{
    GeometryBackend, PointCloud, PointCloudError, PointCloudResult, PointFormat, Transform,
};
use tracing::debug;

/// The pure-Rust [`GeometryBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

fn require_supported(backend: &NativeBackend, format: PointFormat) -> PointCloudResult<()> {
    if backend.supports(format) {
        Ok(())
    } else {
        Err(PointCloudError::UnsupportedFormat {
            format: format.to_string(),
            suggestions: vec![format!(
                "The native backend handles: {}",
                io::SUPPORTED_FORMATS.map(PointFormat::as_str).join(", ")
            )],
        })
    }
}

impl GeometryBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn supported_formats(&self) -> &[PointFormat] {
        &io::SUPPORTED_FORMATS
    }

    fn load_point_cloud(&self, path: &Path, format: PointFormat) -> PointCloudResult<PointCloud> {
        require_supported(self, format)?;
        let cloud = io::read(path, format)?;
        debug!(path = %path.display(), %format, points = cloud.len(), "read point cloud");
        Ok(cloud)
    }

    fn save_point_cloud(
        &self,
        cloud: &PointCloud,
        path: &Path,
        format: PointFormat,
    ) -> PointCloudResult<()> {
        require_supported(self, format)?;
        io::write(cloud, path, format)?;
        debug!(path = %path.display(), %format, points = cloud.len(), "wrote point cloud");
        Ok(())
    }

    fn create(
        &self,
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[f64; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> PointCloudResult<PointCloud> {
        if let Some(bad) = points.iter().position(|p| p.iter().any(|v| !v.is_finite())) {
            return Err(PointCloudError::validation(format!(
                "point {bad} has a non-finite coordinate"
            )));
        }
        PointCloud::new(points, colors, normals)
    }

    fn voxel_down_sample(&self, cloud: &PointCloud, voxel_size: f64) -> PointCloudResult<PointCloud> {
        filters::voxel_down_sample(cloud, voxel_size)
    }

    fn estimate_normals(&self, cloud: &mut PointCloud, k: usize) -> PointCloudResult<()> {
        normals::estimate_normals(cloud, k)
    }

    fn remove_statistical_outlier(
        &self,
        cloud: &PointCloud,
        nb_neighbors: usize,
        std_ratio: f64,
    ) -> PointCloudResult<(PointCloud, Vec<usize>)> {
        Ok(filters::remove_statistical_outlier(cloud, nb_neighbors, std_ratio))
    }

    fn remove_radius_outlier(
        &self,
        cloud: &PointCloud,
        nb_points: usize,
        radius: f64,
    ) -> PointCloudResult<(PointCloud, Vec<usize>)> {
        Ok(filters::remove_radius_outlier(cloud, nb_points, radius))
    }

    fn transform(&self, cloud: &mut PointCloud, transform: &Transform) -> PointCloudResult<()> {
        transform::apply(cloud, transform)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_backend_advertises_ascii_formats_only() {
        let backend = NativeBackend::new();
        assert!(backend.supports(PointFormat::Ply));
        assert!(backend.supports(PointFormat::Xyzrgb));
        assert!(!backend.supports(PointFormat::Pcd));
        assert!(!backend.supports(PointFormat::Las));
    }

    #[test]
    fn test_save_rejects_unsupported_format_without_creating_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.pcd");
        let cloud = PointCloud::from_points(vec![[0.0; 3]]);
        let err = NativeBackend
            .save_point_cloud(&cloud, &path, PointFormat::Pcd)
            .unwrap_err();
        assert!(matches!(err, PointCloudError::UnsupportedFormat { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_create_rejects_non_finite_points() {
        let err = NativeBackend
            .create(vec![[0.0, f64::NAN, 0.0]], None, None)
            .unwrap_err();
        assert!(matches!(err, PointCloudError::Validation { .. }));
    }

    #[test]
    fn test_save_then_load_xyzrgb() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.xyzrgb");
        let cloud = NativeBackend
            .create(vec![[1.0, 2.0, 3.0]], Some(vec![[0.25, 0.5, 1.0]]), None)
            .unwrap();
        NativeBackend
            .save_point_cloud(&cloud, &path, PointFormat::Xyzrgb)
            .unwrap();
        let back = NativeBackend
            .load_point_cloud(&path, PointFormat::Xyzrgb)
            .unwrap();
        assert_eq!(back, cloud);
    }
}
