//! The catalogue of point-cloud operations.
//!
//! [`PointCloudOperation`] is a closed enum: every name the node accepts is a
//! variant, and each variant is either implemented or explicitly
//! [`Availability::NotYetImplemented`]. Dispatch tables match on it
//! exhaustively, so adding a variant without deciding how it is handled is a
//! compile error.

use serde::{Deserialize, Serialize};

/// Every operation the point-cloud node recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointCloudOperation {
    LoadPointcloud,
    CreatePointcloud,
    SavePointcloud,
    GetMetadata,
    Translate,
    Rotate,
    Scale,
    VoxelDownsample,
    ComputeNormals,
    FilterOutliers,
    AnalyzeResources,
    ComputeConvexHull,
    ClusterConnected,
    SurfaceReconstruction,
    IcpRegistration,
    ClusterDbscan,
    AlphaShapes,
    MlsSmoothing,
}

/// Whether the node can execute an operation today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Implemented,
    /// Catalogued with a cost-model entry but no handler yet.
    NotYetImplemented,
}

/// Required and optional request parameters for one operation.
///
/// Required parameters are checked in declaration order so the first missing
/// one reported is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl PointCloudOperation {
    pub const ALL: [PointCloudOperation; 18] = [
        Self::LoadPointcloud,
        Self::CreatePointcloud,
        Self::SavePointcloud,
        Self::GetMetadata,
        Self::Translate,
        Self::Rotate,
        Self::Scale,
        Self::VoxelDownsample,
        Self::ComputeNormals,
        Self::FilterOutliers,
        Self::AnalyzeResources,
        Self::ComputeConvexHull,
        Self::ClusterConnected,
        Self::SurfaceReconstruction,
        Self::IcpRegistration,
        Self::ClusterDbscan,
        Self::AlphaShapes,
        Self::MlsSmoothing,
    ];

    /// Wire name of the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadPointcloud => "load_pointcloud",
            Self::CreatePointcloud => "create_pointcloud",
            Self::SavePointcloud => "save_pointcloud",
            Self::GetMetadata => "get_metadata",
            Self::Translate => "translate",
            Self::Rotate => "rotate",
            Self::Scale => "scale",
            Self::VoxelDownsample => "voxel_downsample",
            Self::ComputeNormals => "compute_normals",
            Self::FilterOutliers => "filter_outliers",
            Self::AnalyzeResources => "analyze_resources",
            Self::ComputeConvexHull => "compute_convex_hull",
            Self::ClusterConnected => "cluster_connected",
            Self::SurfaceReconstruction => "surface_reconstruction",
            Self::IcpRegistration => "icp_registration",
            Self::ClusterDbscan => "cluster_dbscan",
            Self::AlphaShapes => "alpha_shapes",
            Self::MlsSmoothing => "mls_smoothing",
        }
    }

    /// Looks up an operation by wire name. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    pub fn availability(self) -> Availability {
        match self {
            Self::LoadPointcloud
            | Self::CreatePointcloud
            | Self::SavePointcloud
            | Self::GetMetadata
            | Self::Translate
            | Self::Rotate
            | Self::Scale
            | Self::VoxelDownsample
            | Self::ComputeNormals
            | Self::FilterOutliers
            | Self::AnalyzeResources => Availability::Implemented,
            Self::ComputeConvexHull
            | Self::ClusterConnected
            | Self::SurfaceReconstruction
            | Self::IcpRegistration
            | Self::ClusterDbscan
            | Self::AlphaShapes
            | Self::MlsSmoothing => Availability::NotYetImplemented,
        }
    }

    /// Long-running operations check for cancellation between pre-flight and
    /// the backend call.
    pub fn is_long_running(self) -> bool {
        matches!(
            self,
            Self::SurfaceReconstruction
                | Self::IcpRegistration
                | Self::ClusterDbscan
                | Self::ClusterConnected
                | Self::AlphaShapes
                | Self::MlsSmoothing
                | Self::ComputeNormals
                | Self::FilterOutliers
        )
    }

    pub fn parameters(self) -> ParameterSpec {
        const SOURCE: &[&str] = &["format", "output_path", "auto_optimize"];
        match self {
            Self::LoadPointcloud => ParameterSpec {
                required: &["file_path"],
                optional: &["format"],
            },
            Self::CreatePointcloud => ParameterSpec {
                required: &["points"],
                optional: &["colors", "normals", "output_path"],
            },
            Self::SavePointcloud => ParameterSpec {
                required: &["file_path", "output_path"],
                optional: &["format", "output_format"],
            },
            Self::GetMetadata => ParameterSpec {
                required: &["file_path"],
                optional: &["format"],
            },
            Self::Translate => ParameterSpec {
                required: &["file_path", "offset"],
                optional: SOURCE,
            },
            Self::Rotate => ParameterSpec {
                required: &["file_path", "angles"],
                optional: &["center", "format", "output_path", "auto_optimize"],
            },
            Self::Scale => ParameterSpec {
                required: &["file_path", "factor"],
                optional: &["center", "format", "output_path", "auto_optimize"],
            },
            Self::VoxelDownsample => ParameterSpec {
                required: &["file_path"],
                optional: &["voxel_size", "target_points", "format", "output_path"],
            },
            Self::ComputeNormals => ParameterSpec {
                required: &["file_path"],
                optional: &[
                    "max_nearest_neighbors",
                    "format",
                    "output_path",
                    "auto_optimize",
                ],
            },
            Self::FilterOutliers => ParameterSpec {
                required: &["file_path", "method"],
                optional: &[
                    "nb_neighbors",
                    "std_ratio",
                    "radius",
                    "min_points",
                    "format",
                    "output_path",
                    "auto_optimize",
                ],
            },
            Self::AnalyzeResources => ParameterSpec {
                required: &["point_count", "target_operation"],
                optional: &["params"],
            },
            Self::ComputeConvexHull
            | Self::ClusterConnected
            | Self::SurfaceReconstruction
            | Self::IcpRegistration
            | Self::ClusterDbscan
            | Self::AlphaShapes
            | Self::MlsSmoothing => ParameterSpec {
                required: &["file_path"],
                optional: SOURCE,
            },
        }
    }
}

impl std::fmt::Display for PointCloudOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_lookup() {
        for op in PointCloudOperation::ALL {
            assert_eq!(PointCloudOperation::from_name(op.as_str()), Some(op));
        }
        assert_eq!(PointCloudOperation::from_name("teleport"), None);
    }

    #[test]
    fn test_serde_name_matches_wire_name() {
        let json = serde_json::to_string(&PointCloudOperation::VoxelDownsample).unwrap();
        assert_eq!(json, "\"voxel_downsample\"");
    }

    #[test]
    fn test_load_requires_file_path() {
        assert_eq!(
            PointCloudOperation::LoadPointcloud.parameters().required,
            &["file_path"]
        );
    }

    #[test]
    fn test_placeholders_are_not_implemented() {
        assert_eq!(
            PointCloudOperation::IcpRegistration.availability(),
            Availability::NotYetImplemented
        );
        assert_eq!(
            PointCloudOperation::ComputeNormals.availability(),
            Availability::Implemented
        );
    }
}
