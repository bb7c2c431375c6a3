//! Integration tests for the batch control endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_admits_images_and_rejects_other_files() {
    let pipeline = test_pipeline();
    let app = build_test_app(pipeline.clone());

    let response = upload(
        app,
        &[
            ("last_modified", None, "text/plain", b"1700000000000".to_vec()),
            image_part("a.png", 100),
            image_part("b.png", 60),
            ("file", Some("notes.txt"), "text/plain", b"hello".to_vec()),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["admitted"], 2);
    assert_eq!(json["data"]["duplicates"], 0);
    assert_eq!(json["data"]["rejected"], 1);
    assert_eq!(json["data"]["expected_file_count"], 2);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn repeated_upload_is_reported_as_duplicate() {
    let pipeline = test_pipeline();

    upload(build_test_app(pipeline.clone()), &[image_part("a.png", 10)]).await;
    let response = upload(build_test_app(pipeline.clone()), &[image_part("a.png", 10)]).await;

    let json = body_json(response).await;
    assert_eq!(json["data"]["admitted"], 0);
    assert_eq!(json["data"]["duplicates"], 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn invalid_last_modified_is_a_bad_request() {
    let pipeline = test_pipeline();
    let response = upload(
        build_test_app(pipeline.clone()),
        &[("last_modified", None, "text/plain", b"yesterday".to_vec())],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");

    pipeline.shutdown().await;
}

// ---------------------------------------------------------------------------
// Inspect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_snapshot_lists_rows_in_submission_order() {
    let pipeline = test_pipeline();
    upload(
        build_test_app(pipeline.clone()),
        &[image_part("first.png", 40), image_part("second.png", 80)],
    )
    .await;
    pipeline.wait_idle().await.unwrap();

    let response = get(build_test_app(pipeline.clone()), "/api/v1/batch").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let rows = json["data"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["original_name"], "first.png");
    assert_eq!(rows[0]["status"], "done");
    assert_eq!(rows[0]["new_size"], 20);
    assert_eq!(rows[1]["original_name"], "second.png");
    assert_eq!(json["data"]["progress"]["stats"]["completed_count"], 2);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn stats_on_empty_pipeline_are_zero() {
    let pipeline = test_pipeline();
    let json = body_json(get(build_test_app(pipeline.clone()), "/api/v1/stats").await).await;

    assert_eq!(json["data"]["generation"], 0);
    assert_eq!(json["data"]["stats"]["expected_file_count"], 0);
    assert_eq!(json["data"]["params"]["format"], "webp");

    pipeline.shutdown().await;
}

// ---------------------------------------------------------------------------
// Settings and reprocess
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settings_reject_out_of_range_quality() {
    let pipeline = test_pipeline();
    let response = send_json(
        build_test_app(pipeline.clone()),
        Method::PUT,
        "/api/v1/settings",
        json!({ "format": "webp", "quality": 1.5 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn settings_reject_unknown_format() {
    let pipeline = test_pipeline();
    let response = send_json(
        build_test_app(pipeline.clone()),
        Method::PUT,
        "/api/v1/settings",
        json!({ "format": "bmp", "quality": 0.5 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn settings_change_with_inputs_starts_reprocessing() {
    let pipeline = test_pipeline();
    upload(build_test_app(pipeline.clone()), &[image_part("a.png", 10)]).await;
    pipeline.wait_idle().await.unwrap();

    let response = send_json(
        build_test_app(pipeline.clone()),
        Method::PUT,
        "/api/v1/settings",
        json!({ "format": "image/jpeg", "quality": 0.5 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["changed"], true);
    assert_eq!(json["data"]["reprocessing"], 1);
    assert_eq!(json["data"]["params"]["format"], "jpeg");

    pipeline.wait_idle().await.unwrap();
    assert_eq!(pipeline.results().await.unwrap()[0].output_name, "a.jpg");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn reprocess_with_empty_body_keeps_parameters() {
    let pipeline = test_pipeline();
    upload(build_test_app(pipeline.clone()), &[image_part("a.png", 10)]).await;
    pipeline.wait_idle().await.unwrap();

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/v1/reprocess")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = send(build_test_app(pipeline.clone()), request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["generation"], 1);

    let progress = pipeline.wait_idle().await.unwrap();
    assert!(progress.has_prior_run);
    assert_eq!(progress.session_diff, 0);

    pipeline.shutdown().await;
}

// ---------------------------------------------------------------------------
// Download and clear
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_archive_returns_zip() {
    let pipeline = test_pipeline();
    upload(
        build_test_app(pipeline.clone()),
        &[image_part("a.png", 10), image_part("b.png", 12)],
    )
    .await;
    pipeline.wait_idle().await.unwrap();

    let response = get(build_test_app(pipeline.clone()), "/api/v1/download").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"converted_images.zip\""
    );
    assert_eq!(&body_bytes(response).await[..2], b"PK");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn download_archive_without_outputs_is_a_validation_error() {
    let pipeline = test_pipeline();
    let response = get(build_test_app(pipeline.clone()), "/api/v1/download").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn download_single_output() {
    let pipeline = test_pipeline();
    upload(build_test_app(pipeline.clone()), &[image_part("photo.png", 30)]).await;
    pipeline.wait_idle().await.unwrap();
    let task_id = pipeline.results().await.unwrap()[0].task_id;

    let response = get(
        build_test_app(pipeline.clone()),
        &format!("/api/v1/download/{task_id}"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/webp");
    assert_eq!(body_bytes(response).await.len(), 15);

    let missing = get(build_test_app(pipeline.clone()), "/api/v1/download/9999").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(missing).await["code"], "NOT_FOUND");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn clear_resets_the_session() {
    let pipeline = test_pipeline();
    upload(build_test_app(pipeline.clone()), &[image_part("a.png", 10)]).await;
    pipeline.wait_idle().await.unwrap();

    let response = delete(build_test_app(pipeline.clone()), "/api/v1/batch").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["generation"], 1);

    let json = body_json(get(build_test_app(pipeline.clone()), "/api/v1/batch").await).await;
    assert!(json["data"]["rows"].as_array().unwrap().is_empty());
    assert_eq!(json["data"]["progress"]["stats"]["completed_count"], 0);

    pipeline.shutdown().await;
}
