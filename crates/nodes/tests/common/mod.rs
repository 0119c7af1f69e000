//! Shared fixtures for the dispatcher integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nodes::OperationDispatcher;
use pointcloud::{
    CostModel, GeometryBackend, PointCloud, PointCloudError, PointCloudResult, PointFormat,
    ResourceAnalyzer, Transform, BASE_VOXEL_SIZE,
};
use probe::FixedResourceProbe;
use serde_json::{Map, Value};

/// Arguments seen by [`RecordingBackend`], in call order.
#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub voxel_sizes: Vec<f64>,
    /// `(k, point_count)` for each normal estimation.
    pub normals: Vec<(usize, usize)>,
    pub statistical_neighbors: Vec<usize>,
    pub saved: Vec<PathBuf>,
}

/// A backend that fabricates clouds of a fixed size and records its inputs.
///
/// Voxel downsampling shrinks the cloud by `(voxel_size / 0.01)^3`, the
/// inverse of the cube-root sizing rule, so a suggested target is hit exactly.
pub struct RecordingBackend {
    load_points: usize,
    fail_normals: bool,
    calls: Mutex<Calls>,
}

impl RecordingBackend {
    pub fn new(load_points: usize) -> Arc<Self> {
        Arc::new(Self {
            load_points,
            fail_normals: false,
            calls: Mutex::new(Calls::default()),
        })
    }

    pub fn failing_normals(load_points: usize) -> Arc<Self> {
        Arc::new(Self {
            load_points,
            fail_normals: true,
            calls: Mutex::new(Calls::default()),
        })
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    fn line(n: usize) -> PointCloud {
        PointCloud::from_points((0..n).map(|i| [i as f64 * 1e-3, 0.0, 0.0]).collect())
    }
}

impl GeometryBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn supported_formats(&self) -> &[PointFormat] {
        &PointFormat::ALL
    }

    fn load_point_cloud(&self, _path: &Path, _format: PointFormat) -> PointCloudResult<PointCloud> {
        Ok(Self::line(self.load_points))
    }

    fn save_point_cloud(
        &self,
        _cloud: &PointCloud,
        path: &Path,
        _format: PointFormat,
    ) -> PointCloudResult<()> {
        self.calls.lock().unwrap().saved.push(path.to_path_buf());
        Ok(())
    }

    fn create(
        &self,
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[f64; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> PointCloudResult<PointCloud> {
        PointCloud::new(points, colors, normals)
    }

    fn voxel_down_sample(&self, cloud: &PointCloud, voxel_size: f64) -> PointCloudResult<PointCloud> {
        self.calls.lock().unwrap().voxel_sizes.push(voxel_size);
        let shrink = (voxel_size / BASE_VOXEL_SIZE).powi(3).max(1.0);
        let kept = (cloud.len() as f64 / shrink).round() as usize;
        Ok(Self::line(kept.max(1)))
    }

    fn estimate_normals(&self, cloud: &mut PointCloud, k: usize) -> PointCloudResult<()> {
        self.calls.lock().unwrap().normals.push((k, cloud.len()));
        if self.fail_normals {
            return Err(PointCloudError::backend("eigen solver diverged"));
        }
        cloud.set_normals(vec![[0.0, 0.0, 1.0]; cloud.len()])
    }

    fn remove_statistical_outlier(
        &self,
        cloud: &PointCloud,
        nb_neighbors: usize,
        _std_ratio: f64,
    ) -> PointCloudResult<(PointCloud, Vec<usize>)> {
        self.calls
            .lock()
            .unwrap()
            .statistical_neighbors
            .push(nb_neighbors);
        Ok((cloud.clone(), (0..cloud.len()).collect()))
    }

    fn remove_radius_outlier(
        &self,
        cloud: &PointCloud,
        _nb_points: usize,
        _radius: f64,
    ) -> PointCloudResult<(PointCloud, Vec<usize>)> {
        Ok((cloud.clone(), (0..cloud.len()).collect()))
    }

    fn transform(&self, _cloud: &mut PointCloud, _transform: &Transform) -> PointCloudResult<()> {
        Ok(())
    }
}

pub fn dispatcher(
    backend: Option<Arc<dyn GeometryBackend>>,
    available_gib: f64,
) -> OperationDispatcher {
    OperationDispatcher::new(
        backend,
        Arc::new(ResourceAnalyzer::new(Arc::new(CostModel::standard()))),
        Arc::new(FixedResourceProbe::with_available_gib(available_gib)),
    )
}

/// A small placeholder file; [`RecordingBackend`] ignores its contents.
pub fn placeholder_file(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, "ply\n").unwrap();
    path.display().to_string()
}

pub fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
