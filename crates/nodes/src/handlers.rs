//! Per-operation handlers.
//!
//! [`handle`] matches every [`PointCloudOperation`] exhaustively. Each arm
//! decodes its parameters, drives the session and shapes the JSON `result`
//! object. Operations that work on an existing file load it into the session
//! first and, when `output_path` is given, write the resulting cloud back out.

use std::path::Path;

use pointcloud::{
    PointCloudError, PointCloudOperation, PointCloudResult, PointFormat, Transform,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::params::RequestParams;
use crate::session::{OutlierMethod, OutlierParams, PointCloudSession};

/// Request-independent handler settings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HandlerContext {
    /// Default for the per-request `auto_optimize` parameter.
    pub auto_optimize: bool,
}

/// Message for catalogued operations that have no handler yet.
pub fn not_yet_implemented(op: PointCloudOperation) -> String {
    format!("Point cloud operation '{op}' is not yet implemented")
}

pub(crate) async fn handle(
    op: PointCloudOperation,
    params: &RequestParams,
    session: &mut PointCloudSession,
    ctx: HandlerContext,
) -> PointCloudResult<Value> {
    let auto_optimize = params.bool("auto_optimize")?.unwrap_or(ctx.auto_optimize);

    let mut result = match op {
        PointCloudOperation::LoadPointcloud => {
            let metadata = load_source(session, params).await?;
            json!({ "loaded": true, "point_count": metadata.point_count })
        }
        PointCloudOperation::GetMetadata => {
            load_source(session, params).await?;
            Map::new().into()
        }
        PointCloudOperation::CreatePointcloud => {
            let points = params
                .point_array("points")?
                .ok_or_else(|| PointCloudError::validation("Missing required parameter: points"))?;
            let colors = params.point_array("colors")?;
            let normals = params.point_array("normals")?;
            let metadata = session.create(points, colors, normals).await?;
            json!({ "created": true, "point_count": metadata.point_count })
        }
        PointCloudOperation::SavePointcloud => {
            load_source(session, params).await?;
            // The explicit save below is the operation itself.
            let output = params.require_str("output_path")?;
            let format = parse_format(params, "output_format")?;
            let saved = session.save(Path::new(output), format).await?;
            return finish(session, to_json(&saved)?);
        }
        PointCloudOperation::VoxelDownsample => {
            load_source(session, params).await?;
            let report = session
                .voxel_downsample(params.f64("voxel_size")?, params.u64("target_points")?)
                .await?;
            to_json(&report)?
        }
        PointCloudOperation::ComputeNormals => {
            load_source(session, params).await?;
            let report = session
                .compute_normals(params.usize("max_nearest_neighbors")?, auto_optimize)
                .await?;
            to_json(&report)?
        }
        PointCloudOperation::FilterOutliers => {
            let method = OutlierMethod::parse(params.require_str("method")?)?;
            let requested = OutlierParams {
                nb_neighbors: params.usize("nb_neighbors")?,
                std_ratio: params.f64("std_ratio")?,
                radius: params.f64("radius")?,
                min_points: params.usize("min_points")?,
            };
            load_source(session, params).await?;
            let report = session.filter_outliers(method, requested, auto_optimize).await?;
            to_json(&report)?
        }
        PointCloudOperation::Translate | PointCloudOperation::Rotate | PointCloudOperation::Scale => {
            let transform = parse_transform(op, params)?;
            load_source(session, params).await?;
            let report = session.transform(op, transform, auto_optimize).await?;
            to_json(&report)?
        }
        PointCloudOperation::AnalyzeResources => return analyze_resources(session, params),
        PointCloudOperation::ComputeConvexHull
        | PointCloudOperation::ClusterConnected
        | PointCloudOperation::SurfaceReconstruction
        | PointCloudOperation::IcpRegistration
        | PointCloudOperation::ClusterDbscan
        | PointCloudOperation::AlphaShapes
        | PointCloudOperation::MlsSmoothing => {
            return Err(PointCloudError::validation(not_yet_implemented(op)))
        }
    };

    if let Some(output) = params.str("output_path")? {
        let format = parse_format(params, "output_format")?;
        let saved = session.save(Path::new(output), format).await?;
        insert(&mut result, "saved", to_json(&saved)?);
    }
    finish(session, result)
}

/// Attaches the session's current metadata to `result`.
fn finish(session: &PointCloudSession, mut result: Value) -> PointCloudResult<Value> {
    if let Some(metadata) = session.metadata() {
        insert(&mut result, "metadata", to_json(metadata)?);
    }
    Ok(result)
}

fn insert(result: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = result {
        map.insert(key.to_string(), value);
    }
}

fn to_json<T: Serialize>(value: &T) -> PointCloudResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| PointCloudError::backend(format!("failed to encode result: {e}")))
}

fn parse_format(params: &RequestParams, key: &str) -> PointCloudResult<Option<PointFormat>> {
    params.str(key)?.map(PointFormat::parse).transpose()
}

async fn load_source(
    session: &mut PointCloudSession,
    params: &RequestParams,
) -> PointCloudResult<pointcloud::PointCloudMetadata> {
    let path = params.require_str("file_path")?;
    let format = parse_format(params, "format")?;
    session.load(Path::new(path), format).await
}

fn parse_transform(op: PointCloudOperation, params: &RequestParams) -> PointCloudResult<Transform> {
    match op {
        PointCloudOperation::Translate => Ok(Transform::Translate {
            offset: params.require_vec3("offset")?,
        }),
        PointCloudOperation::Rotate => Ok(Transform::Rotate {
            angles: params.require_vec3("angles")?,
            center: params.vec3("center")?,
        }),
        PointCloudOperation::Scale => {
            let factor = params.require_f64("factor")?;
            if !(factor.is_finite() && factor > 0.0) {
                return Err(PointCloudError::validation(format!(
                    "Parameter 'factor' must be a positive number, got {factor}"
                )));
            }
            Ok(Transform::Scale {
                factor,
                center: params.vec3("center")?,
            })
        }
        other => Err(PointCloudError::validation(format!(
            "{other} is not a transform operation"
        ))),
    }
}

/// Plans a hypothetical operation without touching any cloud.
fn analyze_resources(
    session: &PointCloudSession,
    params: &RequestParams,
) -> PointCloudResult<Value> {
    let point_count = params.require_u64("point_count")?;
    let name = params.require_str("target_operation")?;
    let target = PointCloudOperation::from_name(name).ok_or_else(|| {
        PointCloudError::validation_with(
            format!("Unknown target_operation: {name}"),
            vec![format!(
                "Use one of: {}",
                PointCloudOperation::ALL
                    .iter()
                    .map(|op| op.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )],
        )
    })?;
    let target_params = params.object("params")?.cloned().unwrap_or_default();

    let resources = session.resources();
    let analyzer = session.analyzer();
    let suggestion = analyzer.suggest(point_count, target, &target_params, &resources);
    Ok(json!({
        "point_count": point_count,
        "target_operation": target,
        "resources": to_json(&resources)?,
        "complexity": to_json(&analyzer.cost_of(target))?,
        "suggestion": to_json(&suggestion)?,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pointcloud::{CostModel, ResourceAnalyzer, GIB};
    use probe::FixedResourceProbe;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn session(available_gib: f64) -> PointCloudSession {
        PointCloudSession::open(
            Some(Arc::new(geometry::NativeBackend::new())),
            Arc::new(ResourceAnalyzer::new(Arc::new(CostModel::standard()))),
            Arc::new(FixedResourceProbe::with_available_gib(available_gib)),
            CancellationToken::new(),
        )
    }

    fn params(value: Value) -> RequestParams {
        match value {
            Value::Object(map) => RequestParams::new(map),
            _ => RequestParams::default(),
        }
    }

    const CTX: HandlerContext = HandlerContext {
        auto_optimize: true,
    };

    #[tokio::test]
    async fn test_analyze_resources_reports_all_sections() {
        let mut s = session(0.2);
        let result = handle(
            PointCloudOperation::AnalyzeResources,
            &params(json!({ "point_count": 2_000_000, "target_operation": "compute_normals" })),
            &mut s,
            CTX,
        )
        .await
        .unwrap();
        assert_eq!(result["complexity"]["memory_factor"], json!(3.0));
        assert_eq!(result["suggestion"]["needs_adjustment"], json!(true));
        assert_eq!(
            result["resources"]["available_memory_bytes"],
            json!(0.2 * GIB)
        );
        assert!(!s.is_loaded());
    }

    #[tokio::test]
    async fn test_analyze_resources_rejects_unknown_target() {
        let mut s = session(8.0);
        let err = handle(
            PointCloudOperation::AnalyzeResources,
            &params(json!({ "point_count": 10, "target_operation": "teleport" })),
            &mut s,
            CTX,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PointCloudError::Validation { .. }));
        assert!(err.suggestions()[0].contains("compute_normals"));
    }

    #[tokio::test]
    async fn test_create_with_output_path_saves_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("created.xyz");
        let mut s = session(8.0);
        let result = handle(
            PointCloudOperation::CreatePointcloud,
            &params(json!({
                "points": [[0, 0, 0], [1, 1, 1]],
                "output_path": out.display().to_string(),
            })),
            &mut s,
            CTX,
        )
        .await
        .unwrap();
        assert_eq!(result["saved"]["points"], json!(2));
        assert_eq!(result["metadata"]["point_count"], json!(2));
        assert!(out.exists());
    }

    #[tokio::test]
    async fn test_scale_rejects_non_positive_factor() {
        let mut s = session(8.0);
        let err = handle(
            PointCloudOperation::Scale,
            &params(json!({ "file_path": "/tmp/whatever.xyz", "factor": 0.0 })),
            &mut s,
            CTX,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PointCloudError::Validation { .. }));
    }
}
