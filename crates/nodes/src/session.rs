//! Scoped ownership of one point cloud for the duration of a request.
//!
//! A [`PointCloudSession`] holds at most one cloud together with its
//! [`PointCloudMetadata`]. The two are stored as a single value and replaced
//! as a unit, so `metadata.point_count` can never disagree with the live
//! cloud. Closing the session (explicitly, or by dropping it on any exit path
//! including cancellation) frees the cloud and clears the metadata.
//!
//! Every mutating method re-validates resource sufficiency against a fresh
//! [`ResourceProbe`] snapshot before touching the cloud. Backend calls run on
//! the blocking thread pool, one at a time per session.

use std::path::Path;
use std::sync::Arc;

use pointcloud::{
    calculate_voxel_size, resource_error, Bounds, GeometryBackend, OptimizationSuggestion,
    PointCloud, PointCloudError, PointCloudMetadata, PointCloudOperation, PointCloudResult,
    PointFormat, ResourceAnalyzer, ResourceProbe, SourceInfo, SystemResources, Transform,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// File-size heuristic used to pre-flight a load before parsing.
pub const ESTIMATED_POINTS_PER_MB: f64 = 50_000.0;

/// A load is refused when its estimate exceeds this fraction of available memory.
pub const LOAD_REFUSAL_RATIO: f64 = 1.0;

/// Statistical filtering on clouds larger than this caps the neighbour count.
pub const LARGE_CLOUD_POINTS: usize = 1_000_000;

/// Neighbour cap for statistical filtering on large clouds.
pub const LARGE_CLOUD_MAX_NEIGHBORS: usize = 15;

pub const DEFAULT_MAX_NEAREST_NEIGHBORS: usize = 30;
pub const DEFAULT_NB_NEIGHBORS: usize = 20;
pub const DEFAULT_STD_RATIO: f64 = 2.0;
pub const DEFAULT_RADIUS: f64 = 0.05;
pub const DEFAULT_MIN_POINTS: usize = 16;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownsampleReport {
    pub original_points: usize,
    pub downsampled_points: usize,
    pub voxel_size: f64,
    /// Fraction of points removed, in `[0, 1]`.
    pub reduction_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalsReport {
    pub normals_computed: usize,
    pub max_nearest_neighbors: usize,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downsample: Option<DownsampleReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    Statistical,
    Radius,
}

impl OutlierMethod {
    pub fn parse(name: &str) -> PointCloudResult<Self> {
        match name {
            "statistical" => Ok(Self::Statistical),
            "radius" => Ok(Self::Radius),
            other => Err(PointCloudError::validation_with(
                format!("Unknown outlier filtering method: {other}"),
                vec!["Use method \"statistical\" or \"radius\"".to_string()],
            )),
        }
    }
}

/// Caller-supplied outlier parameters; unset values take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutlierParams {
    pub nb_neighbors: Option<usize>,
    pub std_ratio: Option<f64>,
    pub radius: Option<f64>,
    pub min_points: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub method: OutlierMethod,
    pub points_before: usize,
    pub points_after: usize,
    pub outliers_removed: usize,
    /// The parameters as requested (defaults filled in), not as capped.
    pub parameters: Map<String, Value>,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downsample: Option<DownsampleReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformReport {
    pub transform: Transform,
    pub points: usize,
    pub bounds: Bounds,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downsample: Option<DownsampleReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReport {
    pub output_path: String,
    pub format: PointFormat,
    pub points: usize,
}

/// Result of a mutating operation's resource check.
struct Preflight {
    suggestion: OptimizationSuggestion,
    downsample: Option<DownsampleReport>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A cloud and the metadata describing it, always replaced together.
struct LoadedCloud {
    cloud: PointCloud,
    metadata: PointCloudMetadata,
}

impl LoadedCloud {
    fn new(cloud: PointCloud, source: Option<SourceInfo>) -> Self {
        let metadata = PointCloudMetadata::describe(&cloud, source);
        Self { cloud, metadata }
    }

    /// Swaps in a new cloud, keeping provenance.
    fn replace(&mut self, cloud: PointCloud) {
        let source = self.metadata.source.take();
        *self = Self::new(cloud, source);
    }

    /// Rebuilds the metadata after an in-place mutation.
    fn refresh(&mut self) {
        let source = self.metadata.source.take();
        self.metadata = PointCloudMetadata::describe(&self.cloud, source);
    }
}

/// Owns at most one point cloud for one request.
pub struct PointCloudSession {
    backend: Option<Arc<dyn GeometryBackend>>,
    analyzer: Arc<ResourceAnalyzer>,
    probe: Arc<dyn ResourceProbe>,
    cancel: CancellationToken,
    loaded: Option<LoadedCloud>,
}

impl PointCloudSession {
    /// Opens an empty session.
    ///
    /// `backend` is `None` when no geometry library is available; geometry
    /// operations then fail with [`PointCloudError::NoLibrary`].
    pub fn open(
        backend: Option<Arc<dyn GeometryBackend>>,
        analyzer: Arc<ResourceAnalyzer>,
        probe: Arc<dyn ResourceProbe>,
        cancel: CancellationToken,
    ) -> Self {
        debug!(
            backend = backend.as_ref().map_or("none", |b| b.name()),
            "point cloud session opened"
        );
        Self {
            backend,
            analyzer,
            probe,
            cancel,
            loaded: None,
        }
    }

    /// Frees the cloud and clears the metadata. Idempotent.
    pub fn close(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            let points = loaded.metadata.point_count;
            drop(loaded);
            debug!(points, "point cloud session closed; buffers released");
        }
    }

    pub fn metadata(&self) -> Option<&PointCloudMetadata> {
        self.loaded.as_ref().map(|l| &l.metadata)
    }

    pub fn cloud(&self) -> Option<&PointCloud> {
        self.loaded.as_ref().map(|l| &l.cloud)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn analyzer(&self) -> &ResourceAnalyzer {
        &self.analyzer
    }

    /// A fresh host snapshot.
    pub fn resources(&self) -> SystemResources {
        self.probe.probe()
    }

    fn backend(&self) -> PointCloudResult<Arc<dyn GeometryBackend>> {
        self.backend.clone().ok_or_else(PointCloudError::no_library)
    }

    fn point_count(&self) -> PointCloudResult<usize> {
        self.metadata()
            .map(|m| m.point_count)
            .ok_or(PointCloudError::NoPointCloud)
    }

    fn check_cancelled(&self, op: PointCloudOperation) -> PointCloudResult<()> {
        if op.is_long_running() && self.cancel.is_cancelled() {
            info!(operation = %op, "cancelled before backend call");
            return Err(PointCloudError::Cancelled {
                operation: op.to_string(),
            });
        }
        Ok(())
    }

    /// Runs `f` against the loaded cloud on the blocking pool.
    ///
    /// The cloud is moved out for the duration of the call and moved back
    /// afterwards, so no other call can observe it mid-mutation. If the task
    /// itself fails the cloud is lost and the session is left empty.
    async fn with_cloud<T, F>(&mut self, op: PointCloudOperation, f: F) -> PointCloudResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn GeometryBackend, &mut LoadedCloud) -> PointCloudResult<T> + Send + 'static,
    {
        if self.loaded.is_none() {
            return Err(PointCloudError::NoPointCloud);
        }
        let backend = self.backend()?;
        self.check_cancelled(op)?;
        let Some(mut loaded) = self.loaded.take() else {
            return Err(PointCloudError::NoPointCloud);
        };

        let joined = tokio::task::spawn_blocking(move || {
            let result = f(backend.as_ref(), &mut loaded);
            (loaded, result)
        })
        .await;

        match joined {
            Ok((loaded, result)) => {
                self.loaded = Some(loaded);
                result
            }
            Err(e) => Err(PointCloudError::backend(format!("{op} task failed: {e}"))),
        }
    }

    // -----------------------------------------------------------------------
    // Acquisition
    // -----------------------------------------------------------------------

    /// Loads a cloud from `path`, replacing any cloud already held.
    ///
    /// The format is inferred from the extension when not given. Before
    /// parsing, the point count is estimated from the file size and the load
    /// is refused if that estimate exceeds available memory.
    pub async fn load(
        &mut self,
        path: &Path,
        format: Option<PointFormat>,
    ) -> PointCloudResult<PointCloudMetadata> {
        let op = PointCloudOperation::LoadPointcloud;
        let file = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            _ => {
                return Err(PointCloudError::NotFound {
                    path: path.display().to_string(),
                })
            }
        };
        let format = match format {
            Some(f) => f,
            None => PointFormat::from_path(path)?,
        };
        let backend = self.backend()?;
        if !backend.supports(format) {
            return Err(PointCloudError::UnsupportedFormat {
                format: format.to_string(),
                suggestions: vec![format!(
                    "The {} backend handles: {}",
                    backend.name(),
                    backend
                        .supported_formats()
                        .iter()
                        .map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )],
            });
        }

        let size_mb = file.len() as f64 / BYTES_PER_MB;
        let estimated_points = (size_mb * ESTIMATED_POINTS_PER_MB).ceil() as u64;
        let resources = self.resources();
        let estimated = self.analyzer.estimate_memory(estimated_points, op);
        if estimated > resources.available_memory_bytes * LOAD_REFUSAL_RATIO {
            warn!(
                path = %path.display(),
                estimated_points,
                estimated_bytes = estimated,
                available_bytes = resources.available_memory_bytes,
                "refusing load"
            );
            let suggestion = self
                .analyzer
                .suggest(estimated_points, op, &Map::new(), &resources);
            return Err(resource_error(op, &suggestion));
        }

        self.check_cancelled(op)?;
        let owned = path.to_path_buf();
        let cloud = tokio::task::spawn_blocking(move || backend.load_point_cloud(&owned, format))
            .await
            .map_err(|e| PointCloudError::backend(format!("{op} task failed: {e}")))??;

        let source = SourceInfo {
            file_path: path.display().to_string(),
            format,
        };
        self.close();
        let loaded = LoadedCloud::new(cloud, Some(source));
        let metadata = loaded.metadata.clone();
        self.loaded = Some(loaded);
        info!(points = metadata.point_count, %format, "point cloud loaded");
        Ok(metadata)
    }

    /// Creates a cloud from in-memory arrays, replacing any cloud already held.
    pub async fn create(
        &mut self,
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[f64; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> PointCloudResult<PointCloudMetadata> {
        let op = PointCloudOperation::CreatePointcloud;
        if points.is_empty() {
            return Err(PointCloudError::validation(
                "Parameter 'points' must contain at least one point",
            ));
        }
        for (name, values) in [("colors", &colors), ("normals", &normals)] {
            if let Some(v) = values {
                if v.len() != points.len() {
                    return Err(PointCloudError::validation(format!(
                        "Shape mismatch: {name} has {} rows but points has {}",
                        v.len(),
                        points.len()
                    )));
                }
            }
        }

        let resources = self.resources();
        self.analyzer
            .require_within_budget(points.len() as u64, op, &resources)?;

        let backend = self.backend()?;
        let cloud = tokio::task::spawn_blocking(move || backend.create(points, colors, normals))
            .await
            .map_err(|e| PointCloudError::backend(format!("{op} task failed: {e}")))??;

        self.close();
        let loaded = LoadedCloud::new(cloud, None);
        let metadata = loaded.metadata.clone();
        self.loaded = Some(loaded);
        Ok(metadata)
    }

    /// Writes the current cloud to `path`.
    pub async fn save(
        &mut self,
        path: &Path,
        format: Option<PointFormat>,
    ) -> PointCloudResult<SaveReport> {
        let format = match format {
            Some(f) => f,
            None => PointFormat::from_path(path)?,
        };
        let owned = path.to_path_buf();
        let points = self
            .with_cloud(PointCloudOperation::SavePointcloud, move |backend, loaded| {
                backend.save_point_cloud(&loaded.cloud, &owned, format)?;
                Ok(loaded.cloud.len())
            })
            .await?;
        Ok(SaveReport {
            output_path: path.display().to_string(),
            format,
            points,
        })
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Downsamples with a voxel grid.
    ///
    /// When only `target_points` is given the voxel size is derived from the
    /// cube-root scaling rule. Refused only when the operation's estimate
    /// exceeds all available memory.
    pub async fn voxel_downsample(
        &mut self,
        voxel_size: Option<f64>,
        target_points: Option<u64>,
    ) -> PointCloudResult<DownsampleReport> {
        let op = PointCloudOperation::VoxelDownsample;
        let current = self.point_count()?;
        let voxel_size = match (voxel_size, target_points) {
            (Some(size), _) => size,
            (None, Some(0)) => {
                return Err(PointCloudError::validation(
                    "Parameter 'target_points' must be at least 1",
                ))
            }
            (None, Some(target)) => calculate_voxel_size(current as u64, target),
            (None, None) => {
                return Err(PointCloudError::validation_with(
                    "voxel_downsample requires 'voxel_size' or 'target_points'",
                    vec![format!(
                        "Pass voxel_size (e.g. {}) or target_points",
                        pointcloud::BASE_VOXEL_SIZE
                    )],
                ))
            }
        };
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(PointCloudError::validation(format!(
                "Parameter 'voxel_size' must be a positive number, got {voxel_size}"
            )));
        }

        let resources = self.resources();
        let estimated = self.analyzer.estimate_memory(current as u64, op);
        if estimated > resources.available_memory_bytes {
            let suggestion = self.analyzer.suggest(current as u64, op, &Map::new(), &resources);
            return Err(resource_error(op, &suggestion));
        }

        self.downsample_unchecked(voxel_size).await
    }

    async fn downsample_unchecked(&mut self, voxel_size: f64) -> PointCloudResult<DownsampleReport> {
        let report = self
            .with_cloud(PointCloudOperation::VoxelDownsample, move |backend, loaded| {
                let original_points = loaded.cloud.len();
                let reduced = backend.voxel_down_sample(&loaded.cloud, voxel_size)?;
                loaded.replace(reduced);
                let downsampled_points = loaded.metadata.point_count;
                let reduction_ratio = if original_points == 0 {
                    0.0
                } else {
                    1.0 - downsampled_points as f64 / original_points as f64
                };
                Ok(DownsampleReport {
                    original_points,
                    downsampled_points,
                    voxel_size,
                    reduction_ratio,
                })
            })
            .await?;
        info!(
            from = report.original_points,
            to = report.downsampled_points,
            voxel_size,
            "voxel downsample applied"
        );
        Ok(report)
    }

    /// Checks `op` against a fresh snapshot; auto-downsamples when allowed.
    async fn preflight(
        &mut self,
        op: PointCloudOperation,
        params: &Map<String, Value>,
        auto_optimize: bool,
    ) -> PointCloudResult<Preflight> {
        let current = self.point_count()? as u64;
        let resources = self.resources();
        let suggestion = self.analyzer.suggest(current, op, params, &resources);
        if !(suggestion.needs_adjustment && suggestion.auto_downsample()) {
            return Ok(Preflight {
                suggestion,
                downsample: None,
            });
        }
        if !auto_optimize {
            warn!(operation = %op, points = current, "refusing: memory threshold exceeded");
            return Err(resource_error(op, &suggestion));
        }
        let voxel_size = match (suggestion.voxel_size(), suggestion.target_points()) {
            (Some(size), _) => size,
            (None, target) => calculate_voxel_size(current, target.unwrap_or(1)),
        };
        info!(operation = %op, points = current, voxel_size, "auto-downsampling before operation");
        let downsample = self.downsample_unchecked(voxel_size).await?;
        Ok(Preflight {
            suggestion,
            downsample: Some(downsample),
        })
    }

    /// Estimates normals on the current cloud.
    ///
    /// Always runs through the analyzer first. If a downsample is suggested it
    /// is applied before estimation (or the call is refused when
    /// `auto_optimize` is off), so normals are computed against the cloud as
    /// it actually is.
    pub async fn compute_normals(
        &mut self,
        max_nearest_neighbors: Option<usize>,
        auto_optimize: bool,
    ) -> PointCloudResult<NormalsReport> {
        let op = PointCloudOperation::ComputeNormals;
        let requested = max_nearest_neighbors.unwrap_or(DEFAULT_MAX_NEAREST_NEIGHBORS);
        if requested == 0 {
            return Err(PointCloudError::validation(
                "Parameter 'max_nearest_neighbors' must be at least 1",
            ));
        }
        let mut params = Map::new();
        params.insert("max_nearest_neighbors".to_string(), Value::from(requested));

        let Preflight {
            suggestion,
            downsample,
        } = self.preflight(op, &params, auto_optimize).await?;
        let k = suggestion
            .adjusted_params
            .get("max_nearest_neighbors")
            .and_then(Value::as_u64)
            .and_then(|k| usize::try_from(k).ok())
            .unwrap_or(requested);

        let normals_computed = self
            .with_cloud(op, move |backend, loaded| {
                backend.estimate_normals(&mut loaded.cloud, k)?;
                loaded.refresh();
                Ok(loaded.cloud.normals().map_or(0, <[[f64; 3]]>::len))
            })
            .await?;

        Ok(NormalsReport {
            normals_computed,
            max_nearest_neighbors: k,
            suggestions: suggestion.suggestions,
            downsample,
        })
    }

    /// Removes outliers with the statistical or radius test.
    ///
    /// On clouds above [`LARGE_CLOUD_POINTS`] the statistical neighbour count
    /// is capped at [`LARGE_CLOUD_MAX_NEIGHBORS`] whatever the caller asked
    /// for; the report still echoes the requested value.
    pub async fn filter_outliers(
        &mut self,
        method: OutlierMethod,
        requested: OutlierParams,
        auto_optimize: bool,
    ) -> PointCloudResult<OutlierReport> {
        let op = PointCloudOperation::FilterOutliers;
        self.point_count()?;

        let mut parameters = Map::new();
        match method {
            OutlierMethod::Statistical => {
                let nb = requested.nb_neighbors.unwrap_or(DEFAULT_NB_NEIGHBORS);
                let ratio = requested.std_ratio.unwrap_or(DEFAULT_STD_RATIO);
                if nb == 0 || !(ratio.is_finite() && ratio > 0.0) {
                    return Err(PointCloudError::validation(
                        "Statistical filtering needs nb_neighbors >= 1 and a positive std_ratio",
                    ));
                }
                parameters.insert("nb_neighbors".to_string(), Value::from(nb));
                parameters.insert("std_ratio".to_string(), Value::from(ratio));
            }
            OutlierMethod::Radius => {
                let radius = requested.radius.unwrap_or(DEFAULT_RADIUS);
                let min_points = requested.min_points.unwrap_or(DEFAULT_MIN_POINTS);
                if !(radius.is_finite() && radius > 0.0) {
                    return Err(PointCloudError::validation(
                        "Radius filtering needs a positive radius",
                    ));
                }
                parameters.insert("radius".to_string(), Value::from(radius));
                parameters.insert("min_points".to_string(), Value::from(min_points));
            }
        }

        let Preflight {
            suggestion,
            downsample,
        } = self.preflight(op, &parameters, auto_optimize).await?;
        let mut suggestions = suggestion.suggestions;
        let points_before = self.point_count()?;

        let (points_after, inliers) = match method {
            OutlierMethod::Statistical => {
                let requested_nb = requested.nb_neighbors.unwrap_or(DEFAULT_NB_NEIGHBORS);
                let nb = if points_before > LARGE_CLOUD_POINTS {
                    requested_nb.min(LARGE_CLOUD_MAX_NEIGHBORS)
                } else {
                    requested_nb
                };
                if nb != requested_nb {
                    suggestions.push(format!(
                        "Capped nb_neighbors from {requested_nb} to {nb} for a cloud of {points_before} points"
                    ));
                }
                let ratio = requested.std_ratio.unwrap_or(DEFAULT_STD_RATIO);
                self.with_cloud(op, move |backend, loaded| {
                    let (filtered, inliers) =
                        backend.remove_statistical_outlier(&loaded.cloud, nb, ratio)?;
                    loaded.replace(filtered);
                    Ok((loaded.metadata.point_count, inliers.len()))
                })
                .await?
            }
            OutlierMethod::Radius => {
                let radius = requested.radius.unwrap_or(DEFAULT_RADIUS);
                let min_points = requested.min_points.unwrap_or(DEFAULT_MIN_POINTS);
                self.with_cloud(op, move |backend, loaded| {
                    let (filtered, inliers) =
                        backend.remove_radius_outlier(&loaded.cloud, min_points, radius)?;
                    loaded.replace(filtered);
                    Ok((loaded.metadata.point_count, inliers.len()))
                })
                .await?
            }
        };
        if inliers != points_after {
            warn!(inliers, points_after, "backend inlier list disagrees with filtered cloud");
        }

        Ok(OutlierReport {
            method,
            points_before,
            points_after,
            outliers_removed: points_before.saturating_sub(points_after),
            parameters,
            suggestions,
            downsample,
        })
    }

    /// Applies a translate, rotate or scale transform in place.
    pub async fn transform(
        &mut self,
        op: PointCloudOperation,
        transform: Transform,
        auto_optimize: bool,
    ) -> PointCloudResult<TransformReport> {
        let Preflight {
            suggestion,
            downsample,
        } = self.preflight(op, &Map::new(), auto_optimize).await?;

        let (points, bounds) = self
            .with_cloud(op, move |backend, loaded| {
                backend.transform(&mut loaded.cloud, &transform)?;
                loaded.refresh();
                Ok((loaded.metadata.point_count, loaded.metadata.bounds))
            })
            .await?;

        Ok(TransformReport {
            transform,
            points,
            bounds,
            suggestions: suggestion.suggestions,
            downsample,
        })
    }
}

impl Drop for PointCloudSession {
    fn drop(&mut self) {
        self.close();
    }
}
