//! End-to-end request scenarios against a recording backend and fixed host
//! resources.

mod common;

use std::sync::Arc;

use nodes::{DispatcherConfig, OperationDispatcher, RequestState, ResponseStatus};
use pointcloud::{
    calculate_voxel_size, CostModel, GeometryBackend, OperationComplexity, PointCloudOperation,
    ResourceAnalyzer,
};
use probe::FixedResourceProbe;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{dispatcher, params, placeholder_file, RecordingBackend};

#[tokio::test]
async fn create_twenty_million_points_fits_in_four_gib() {
    let response = dispatcher(Some(RecordingBackend::new(1)), 4.0)
        .execute(
            "analyze_resources",
            params(json!({ "point_count": 20_000_000, "target_operation": "create_pointcloud" })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Success);
    let suggestion = &response.result.unwrap()["suggestion"];
    assert_eq!(suggestion["needs_adjustment"], json!(false));
    assert_eq!(suggestion["estimated_memory_bytes"], json!(720_000_000.0));
}

/// Scales `create_pointcloud` so that a thousand points weigh what twenty
/// million do with the standard costs times the headroom left on a 4 GiB host.
fn heavy_create_dispatcher() -> OperationDispatcher {
    let costs = CostModel::standard().with_entry(
        PointCloudOperation::CreatePointcloud,
        OperationComplexity {
            memory_factor: 95_000.0,
            cpu_intensive: false,
            gpu_capable: false,
            recommended_max_points: 10_000_000,
        },
    );
    OperationDispatcher::new(
        Some(RecordingBackend::new(1)),
        Arc::new(ResourceAnalyzer::new(Arc::new(costs))),
        Arc::new(FixedResourceProbe::with_available_gib(4.0)),
    )
}

fn origin_points(n: usize) -> serde_json::Value {
    json!(vec![[0.0, 0.0, 0.0]; n])
}

#[tokio::test]
async fn create_just_under_four_gib_budget_succeeds() {
    // 1000 × 36 B × 95000 = 3.42e9 B, under 0.8 × 4 GiB ≈ 3.436e9 B.
    let response = heavy_create_dispatcher()
        .execute("create_pointcloud", params(json!({ "points": origin_points(1000) })))
        .await;
    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    let result = response.result.unwrap();
    assert_eq!(result["created"], json!(true));
    assert_eq!(result["point_count"], json!(1000));
}

#[tokio::test]
async fn create_just_over_four_gib_budget_is_refused() {
    // 1010 × 36 B × 95000 ≈ 3.454e9 B, over the threshold.
    let response = heavy_create_dispatcher()
        .execute("create_pointcloud", params(json!({ "points": origin_points(1010) })))
        .await;
    assert_eq!(response.status, ResponseStatus::Error);
    let message = response.error.unwrap();
    assert!(
        message.starts_with("Insufficient memory for create_pointcloud"),
        "{message}"
    );
    assert!(!response.suggestions.is_empty());
}

#[tokio::test]
async fn normals_proceed_untouched_with_ample_memory() {
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingBackend::new(2_000_000);
    let response = dispatcher(Some(backend.clone() as Arc<dyn GeometryBackend>), 3.0)
        .execute(
            "compute_normals",
            params(json!({ "file_path": placeholder_file(dir.path(), "scan.ply") })),
        )
        .await;

    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    let calls = backend.calls();
    assert!(calls.voxel_sizes.is_empty());
    assert_eq!(calls.normals, vec![(30, 2_000_000)]);
    let result = response.result.unwrap();
    assert_eq!(result["normals_computed"], json!(2_000_000));
    assert!(result.get("downsample").is_none());
}

#[tokio::test]
async fn normals_downsample_first_on_a_starved_host() {
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingBackend::new(2_000_000);
    let response = dispatcher(Some(backend.clone() as Arc<dyn GeometryBackend>), 0.2)
        .execute(
            "compute_normals",
            params(json!({ "file_path": placeholder_file(dir.path(), "scan.ply") })),
        )
        .await;

    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    let calls = backend.calls();
    assert_eq!(
        calls.voxel_sizes,
        vec![calculate_voxel_size(2_000_000, 500_000)]
    );
    // Normals run on the reduced cloud, never on the stale 2M count.
    assert_eq!(calls.normals, vec![(30, 500_000)]);

    let result = response.result.unwrap();
    assert_eq!(result["downsample"]["original_points"], json!(2_000_000));
    assert_eq!(result["downsample"]["downsampled_points"], json!(500_000));
    assert_eq!(result["normals_computed"], json!(500_000));
    assert_eq!(result["metadata"]["point_count"], json!(500_000));
    assert!(!result["suggestions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn normals_refused_when_auto_optimize_is_off() {
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingBackend::new(2_000_000);
    let response = dispatcher(Some(backend.clone() as Arc<dyn GeometryBackend>), 0.2)
        .execute(
            "compute_normals",
            params(json!({
                "file_path": placeholder_file(dir.path(), "scan.ply"),
                "auto_optimize": false,
            })),
        )
        .await;

    assert_eq!(response.status, ResponseStatus::Error);
    assert!(response.error.unwrap().starts_with("Insufficient memory for compute_normals"));
    assert!(response
        .suggestions
        .iter()
        .any(|s| s == "Run voxel_downsample with target_points=500000 before compute_normals"));
    assert!(backend.calls().normals.is_empty());
}

#[tokio::test]
async fn config_default_for_auto_optimize_applies() {
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingBackend::new(2_000_000);
    let response = dispatcher(Some(backend.clone() as Arc<dyn GeometryBackend>), 0.2)
        .with_config(DispatcherConfig {
            auto_optimize: false,
        })
        .execute(
            "compute_normals",
            params(json!({ "file_path": placeholder_file(dir.path(), "scan.ply") })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Error);
    assert!(backend.calls().voxel_sizes.is_empty());
}

#[tokio::test]
async fn statistical_neighbors_capped_on_large_clouds() {
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingBackend::new(1_500_000);
    let response = dispatcher(Some(backend.clone() as Arc<dyn GeometryBackend>), 8.0)
        .execute(
            "filter_outliers",
            params(json!({
                "file_path": placeholder_file(dir.path(), "scan.ply"),
                "method": "statistical",
                "nb_neighbors": 50,
            })),
        )
        .await;

    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    assert_eq!(backend.calls().statistical_neighbors, vec![15]);
    let result = response.result.unwrap();
    assert_eq!(result["parameters"]["nb_neighbors"], json!(50));
    assert_eq!(result["points_before"], json!(1_500_000));
    assert_eq!(result["points_after"], result["metadata"]["point_count"]);
}

#[tokio::test]
async fn statistical_neighbors_untouched_on_small_clouds() {
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingBackend::new(10_000);
    dispatcher(Some(backend.clone() as Arc<dyn GeometryBackend>), 8.0)
        .execute(
            "filter_outliers",
            params(json!({
                "file_path": placeholder_file(dir.path(), "scan.ply"),
                "method": "statistical",
                "nb_neighbors": 50,
            })),
        )
        .await;
    assert_eq!(backend.calls().statistical_neighbors, vec![50]);
}

#[tokio::test]
async fn load_without_file_path_names_the_parameter() {
    let response = dispatcher(Some(RecordingBackend::new(1)), 8.0)
        .execute("load_pointcloud", params(json!({})))
        .await;
    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(
        response.error.as_deref(),
        Some("Missing required parameter: file_path")
    );
}

#[tokio::test]
async fn unknown_operation_is_a_structured_error() {
    let (response, trace) = dispatcher(Some(RecordingBackend::new(1)), 8.0)
        .execute_traced("make_coffee", params(json!({})), CancellationToken::new())
        .await;
    assert_eq!(
        response.to_json()["error"],
        json!("Unsupported point cloud operation: make_coffee")
    );
    assert!(!trace.contains(&RequestState::SessionOpen));
}

#[tokio::test]
async fn missing_backend_reports_install_remedies() {
    let dir = tempfile::tempdir().unwrap();
    let response = dispatcher(None, 8.0)
        .execute(
            "load_pointcloud",
            params(json!({ "file_path": placeholder_file(dir.path(), "scan.ply") })),
        )
        .await;
    assert_eq!(response.error.as_deref(), Some("No point cloud library available"));
    assert!(!response.suggestions.is_empty());
}

#[tokio::test]
async fn backend_failure_is_reported_generically() {
    let dir = tempfile::tempdir().unwrap();
    let (response, trace) = dispatcher(Some(RecordingBackend::failing_normals(100)), 8.0)
        .execute_traced(
            "compute_normals",
            params(json!({ "file_path": placeholder_file(dir.path(), "scan.ply") })),
            CancellationToken::new(),
        )
        .await;
    let message = response.error.unwrap();
    assert_eq!(
        message,
        "Internal error while executing compute_normals; see logs for details"
    );
    assert!(!message.contains("eigen"));
    assert!(trace.contains(&RequestState::UnexpectedError));
    let closed = trace.iter().position(|s| *s == RequestState::SessionClosed);
    let responded = trace.iter().position(|s| *s == RequestState::Responded);
    assert!(closed.unwrap() < responded.unwrap());
}

#[tokio::test]
async fn cancelled_request_skips_the_backend() {
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingBackend::new(100);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let response = dispatcher(Some(backend.clone() as Arc<dyn GeometryBackend>), 8.0)
        .execute_with_cancellation(
            "compute_normals",
            params(json!({ "file_path": placeholder_file(dir.path(), "scan.ply") })),
            cancel,
        )
        .await;
    assert_eq!(
        response.error.as_deref(),
        Some("Operation 'compute_normals' was cancelled")
    );
    assert!(backend.calls().normals.is_empty());
}

#[tokio::test]
async fn output_path_saves_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let backend = RecordingBackend::new(1_000);
    let output = dir.path().join("out.xyz");
    let response = dispatcher(Some(backend.clone() as Arc<dyn GeometryBackend>), 8.0)
        .execute(
            "voxel_downsample",
            params(json!({
                "file_path": placeholder_file(dir.path(), "scan.ply"),
                "voxel_size": 0.02,
                "output_path": output.display().to_string(),
            })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    assert_eq!(backend.calls().saved, vec![output]);
    let result = response.result.unwrap();
    assert_eq!(result["downsampled_points"], json!(125));
    assert_eq!(result["saved"]["points"], json!(125));
    assert_eq!(result["reduction_ratio"], json!(0.875));
}
