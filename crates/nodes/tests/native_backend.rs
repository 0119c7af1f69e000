//! Requests run end to end through the native geometry backend on real files.

mod common;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use geometry::NativeBackend;
use nodes::{OperationDispatcher, ResponseStatus};
use serde_json::{json, Value};

use common::{dispatcher, params};

fn native(available_gib: f64) -> OperationDispatcher {
    dispatcher(Some(Arc::new(NativeBackend::new())), available_gib)
}

/// A 6×6×6 grid with 0.1 spacing plus one far-away point.
fn write_grid_with_outlier(path: &Path) {
    let mut text = String::new();
    for x in 0..6 {
        for y in 0..6 {
            for z in 0..6 {
                writeln!(text, "{} {} {}", x as f64 * 0.1, y as f64 * 0.1, z as f64 * 0.1).unwrap();
            }
        }
    }
    text.push_str("25 25 25\n");
    std::fs::write(path, text).unwrap();
}

async fn point_count_of(d: &OperationDispatcher, path: &Path) -> Value {
    let response = d
        .execute(
            "get_metadata",
            params(json!({ "file_path": path.display().to_string() })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    response.result.unwrap()["metadata"]["point_count"].clone()
}

#[tokio::test]
async fn radius_filter_removes_the_outlier_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("grid.xyz");
    let output = dir.path().join("clean.xyz");
    write_grid_with_outlier(&input);
    let d = native(8.0);

    let response = d
        .execute(
            "filter_outliers",
            params(json!({
                "file_path": input.display().to_string(),
                "method": "radius",
                "radius": 0.15,
                "min_points": 3,
                "output_path": output.display().to_string(),
            })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    let result = response.result.unwrap();
    assert_eq!(result["points_before"], json!(217));
    assert_eq!(result["points_after"], json!(216));
    assert_eq!(result["outliers_removed"], json!(1));
    assert_eq!(result["metadata"]["point_count"], json!(216));
    assert_eq!(point_count_of(&d, &output).await, json!(216));
}

#[tokio::test]
async fn voxel_downsample_metadata_matches_written_cloud() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("grid.xyz");
    let output = dir.path().join("coarse.ply");
    write_grid_with_outlier(&input);
    let d = native(8.0);

    let response = d
        .execute(
            "voxel_downsample",
            params(json!({
                "file_path": input.display().to_string(),
                "voxel_size": 0.25,
                "output_path": output.display().to_string(),
            })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    let result = response.result.unwrap();
    let downsampled = result["downsampled_points"].clone();
    assert_eq!(result["metadata"]["point_count"], downsampled);
    assert_eq!(point_count_of(&d, &output).await, downsampled);
}

#[tokio::test]
async fn save_converts_between_formats() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("grid.xyz");
    let output = dir.path().join("grid.ply");
    write_grid_with_outlier(&input);
    let d = native(8.0);

    let response = d
        .execute(
            "save_pointcloud",
            params(json!({
                "file_path": input.display().to_string(),
                "output_path": output.display().to_string(),
            })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    assert_eq!(response.result.unwrap()["format"], json!("ply"));
    assert_eq!(point_count_of(&d, &output).await, json!(217));
}

#[tokio::test]
async fn translate_moves_the_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("pair.xyz");
    std::fs::write(&input, "0 0 0\n1 1 1\n").unwrap();

    let response = native(8.0)
        .execute(
            "translate",
            params(json!({ "file_path": input.display().to_string(), "offset": [10, 0, -1] })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Success, "{:?}", response.error);
    let bounds = &response.result.unwrap()["metadata"]["bounds"];
    assert_eq!(bounds["min"], json!([10.0, 0.0, -1.0]));
    assert_eq!(bounds["max"], json!([11.0, 1.0, 0.0]));
}

#[tokio::test]
async fn unsupported_extension_suggests_alternatives() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.las");
    std::fs::write(&input, [0_u8; 16]).unwrap();

    let response = native(8.0)
        .execute(
            "load_pointcloud",
            params(json!({ "file_path": input.display().to_string() })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(
        response.error.as_deref(),
        Some("Unsupported point cloud format: las")
    );
    assert!(response.suggestions[0].contains("ply"));
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let response = native(8.0)
        .execute(
            "get_metadata",
            params(json!({ "file_path": "/nowhere/scan.ply" })),
        )
        .await;
    assert_eq!(
        response.error.as_deref(),
        Some("File not found: /nowhere/scan.ply")
    );
}

#[tokio::test]
async fn nan_row_is_rejected_as_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.xyz");
    let mut text = String::new();
    for i in 0..50 {
        writeln!(text, "{} 0 0", i as f64 * 0.1).unwrap();
    }
    text.push_str("nan 0 0\n");
    std::fs::write(&input, text).unwrap();

    for operation in ["load_pointcloud", "compute_normals"] {
        let response = native(8.0)
            .execute(
                operation,
                params(json!({ "file_path": input.display().to_string() })),
            )
            .await;
        assert_eq!(response.status, ResponseStatus::Error);
        let message = response.error.unwrap();
        assert!(message.contains("line 51"), "{operation}: {message}");
        assert!(message.contains("non-finite"), "{operation}: {message}");
    }
}

#[tokio::test]
async fn output_into_missing_directory_names_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing");

    let response = native(8.0)
        .execute(
            "create_pointcloud",
            params(json!({
                "points": [[0, 0, 0], [1, 1, 1]],
                "output_path": missing.join("out.xyz").display().to_string(),
            })),
        )
        .await;
    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(
        response.error,
        Some(format!("File not found: {}", missing.display()))
    );
}
