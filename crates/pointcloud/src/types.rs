//! Shared value types for the point-cloud core.
//!
//! Resource snapshots, point-cloud data and metadata, file formats, and
//! transforms. These types carry invariants (e.g. per-point attribute arrays
//! always match the point count) and are enforced at construction.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{PointCloudError, PointCloudResult};

/// Bytes in one gibibyte.
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Available memory below which the host is considered low on memory.
pub const LOW_MEMORY_BYTES: f64 = 4.0 * GIB;

/// Available memory below which the host is considered very low on memory.
pub const VERY_LOW_MEMORY_BYTES: f64 = 2.0 * GIB;

// ---------------------------------------------------------------------------
// Host resources
// ---------------------------------------------------------------------------

/// GPU capability reported by a [`crate::GpuProbe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    /// Device name as reported by the driver.
    pub name: String,
    /// Total device memory in bytes.
    pub memory_bytes: f64,
}

/// Snapshot of host memory, CPU and GPU availability.
///
/// Recomputed on demand by a [`crate::ResourceProbe`]; never cached across
/// calls because availability drifts over the lifetime of a long workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemResources {
    pub total_memory_bytes: f64,
    pub available_memory_bytes: f64,
    /// Always at least 1.
    pub cpu_count: usize,
    pub has_gpu: bool,
    /// Zero when no GPU is present.
    pub gpu_memory_bytes: f64,
}

impl SystemResources {
    /// Builds a snapshot, clamping `cpu_count` to at least one and deriving
    /// the GPU fields from `gpu`.
    pub fn new(
        total_memory_bytes: f64,
        available_memory_bytes: f64,
        cpu_count: usize,
        gpu: Option<&GpuInfo>,
    ) -> Self {
        Self {
            total_memory_bytes,
            available_memory_bytes,
            cpu_count: cpu_count.max(1),
            has_gpu: gpu.is_some(),
            gpu_memory_bytes: gpu.map_or(0.0, |g| g.memory_bytes),
        }
    }

    /// Less than 4 GiB available.
    pub fn is_low_memory(&self) -> bool {
        self.available_memory_bytes < LOW_MEMORY_BYTES
    }

    /// Less than 2 GiB available.
    pub fn is_very_low_memory(&self) -> bool {
        self.available_memory_bytes < VERY_LOW_MEMORY_BYTES
    }
}

// ---------------------------------------------------------------------------
// Point cloud data
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    /// Computes the bounds of `points`. An empty slice yields a zero box.
    pub fn of(points: &[[f64; 3]]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                min: [0.0; 3],
                max: [0.0; 3],
            };
        };
        let mut min = *first;
        let mut max = *first;
        for p in &points[1..] {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Self { min, max }
    }

    /// Edge lengths of the box.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// In-memory point cloud exchanged with a [`crate::GeometryBackend`].
///
/// Colours and normals, when present, always have exactly one entry per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f64; 3]>,
    colors: Option<Vec<[f64; 3]>>,
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Builds a cloud, rejecting colour or normal arrays whose length differs
    /// from the point count.
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[f64; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> PointCloudResult<Self> {
        check_attribute_len("colors", points.len(), colors.as_deref())?;
        check_attribute_len("normals", points.len(), normals.as_deref())?;
        Ok(Self {
            points,
            colors,
            normals,
        })
    }

    /// Builds a cloud from bare coordinates.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            colors: None,
            normals: None,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn colors(&self) -> Option<&[[f64; 3]]> {
        self.colors.as_deref()
    }

    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Mutable access to coordinates. The point count cannot change through it.
    pub fn points_mut(&mut self) -> &mut [[f64; 3]] {
        &mut self.points
    }

    /// Mutable access to normals, if present.
    pub fn normals_mut(&mut self) -> Option<&mut [[f64; 3]]> {
        self.normals.as_deref_mut()
    }

    /// Replaces the normals, rejecting a length mismatch.
    pub fn set_normals(&mut self, normals: Vec<[f64; 3]>) -> PointCloudResult<()> {
        check_attribute_len("normals", self.points.len(), Some(&normals))?;
        self.normals = Some(normals);
        Ok(())
    }

    /// Returns a new cloud containing only the points at `indices`, with
    /// their attributes.
    pub fn select(&self, indices: &[usize]) -> Self {
        let pick = |v: &Vec<[f64; 3]>| indices.iter().map(|&i| v[i]).collect::<Vec<_>>();
        Self {
            points: pick(&self.points),
            colors: self.colors.as_ref().map(pick),
            normals: self.normals.as_ref().map(pick),
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::of(&self.points)
    }
}

fn check_attribute_len(
    name: &str,
    expected: usize,
    values: Option<&[[f64; 3]]>,
) -> PointCloudResult<()> {
    match values {
        Some(v) if v.len() != expected => Err(PointCloudError::validation(format!(
            "{name} has {} entries but points has {expected}",
            v.len()
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// Point cloud file formats recognised by the core.
///
/// Recognition does not imply support: each backend advertises the subset it
/// can actually read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointFormat {
    Ply,
    Pcd,
    Xyz,
    Xyzn,
    Xyzrgb,
    Pts,
    Las,
    Laz,
    E57,
}

impl PointFormat {
    pub const ALL: [PointFormat; 9] = [
        Self::Ply,
        Self::Pcd,
        Self::Xyz,
        Self::Xyzn,
        Self::Xyzrgb,
        Self::Pts,
        Self::Las,
        Self::Laz,
        Self::E57,
    ];

    /// Canonical lowercase name, also the file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ply => "ply",
            Self::Pcd => "pcd",
            Self::Xyz => "xyz",
            Self::Xyzn => "xyzn",
            Self::Xyzrgb => "xyzrgb",
            Self::Pts => "pts",
            Self::Las => "las",
            Self::Laz => "laz",
            Self::E57 => "e57",
        }
    }

    /// Parses a format name or extension, case-insensitively, with or without a leading dot.
    pub fn parse(name: &str) -> PointCloudResult<Self> {
        let wanted = name.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| PointCloudError::UnsupportedFormat {
                format: name.to_string(),
                suggestions: vec![format!(
                    "Use one of: {}",
                    Self::ALL.map(|f| f.as_str()).join(", ")
                )],
            })
    }

    /// Infers the format from a path's extension.
    pub fn from_path(path: &Path) -> PointCloudResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext.is_empty() {
            return Err(PointCloudError::UnsupportedFormat {
                format: path.display().to_string(),
                suggestions: vec![
                    "Add a file extension or pass the 'format' parameter explicitly".to_string(),
                ],
            });
        }
        Self::parse(ext)
    }
}

impl std::fmt::Display for PointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Where a session's cloud came from, when it was loaded from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub file_path: String,
    pub format: PointFormat,
}

/// Description of the cloud owned by a session.
///
/// `point_count` always equals the live point count of the cloud it
/// describes; sessions rebuild it in the same step as every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudMetadata {
    pub point_count: usize,
    pub has_colors: bool,
    pub has_normals: bool,
    pub bounds: Bounds,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,
}

impl PointCloudMetadata {
    /// Describes `cloud`, keeping `source` as its provenance.
    pub fn describe(cloud: &PointCloud, source: Option<SourceInfo>) -> Self {
        Self {
            point_count: cloud.len(),
            has_colors: cloud.colors().is_some(),
            has_normals: cloud.normals().is_some(),
            bounds: cloud.bounds(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// A geometric transform applied in place by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    Translate {
        offset: [f64; 3],
    },
    /// Euler angles in radians, applied about X, then Y, then Z.
    Rotate {
        angles: [f64; 3],
        center: Option<[f64; 3]>,
    },
    /// Uniform scale; `factor` must be strictly positive.
    Scale {
        factor: f64,
        center: Option<[f64; 3]>,
    },
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
