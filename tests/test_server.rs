mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use std::sync::Arc;
use tower::ServiceExt;
use wildaware::classifier::LABELS;
use wildaware::server::{self, AppState, HealthResponse};
use wildaware::store::ObjectStore;

const BOUNDARY: &str = "wildaware-test-boundary";

fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            field, filename, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload-image")
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .expect("valid request")
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> anyhow::Result<T> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn test_state() -> (
    AppState<SqliteCatalog, LocalObjectStore>,
    tempfile::TempDir,
    tempfile::TempDir,
) {
    let (catalog, db_dir) = create_test_catalog(&LABELS).await;
    let buckets = tempfile::TempDir::new().expect("Failed to create bucket directory");
    let objects = LocalObjectStore::new(buckets.path());
    let state = AppState::new(Arc::new(catalog), Arc::new(objects), "UserImg");
    (state, db_dir, buckets)
}

#[tokio::test]
async fn test_health() -> anyhow::Result<()> {
    let (state, _db, _buckets) = test_state().await;
    let app = server::build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponse = body_json(response).await?;
    assert_eq!(health.status, "ok");
    Ok(())
}

#[tokio::test]
async fn test_upload_non_image_rejected() -> anyhow::Result<()> {
    let (state, _db, buckets) = test_state().await;
    let app = server::build_router(state.clone());

    let body = multipart_body("image", "notes.txt", "text/plain", b"hello");
    let response = app.oneshot(upload_request(body)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let parsed: UploadResponse = body_json(response).await?;
    assert!(!parsed.is_success());
    match parsed {
        UploadResponse::Rejected { error, .. } => assert!(!error.is_empty()),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(!buckets.path().join("UserImg").exists());
    assert_eq!(state.scans.len().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_upload_undecodable_image_rejected() -> anyhow::Result<()> {
    let (state, _db, _buckets) = test_state().await;
    let app = server::build_router(state);

    let body = multipart_body("image", "paw.jpg", "image/jpeg", b"not really a jpeg");
    let parsed: UploadResponse = body_json(app.oneshot(upload_request(body)).await?).await?;

    assert!(!parsed.is_success());
    Ok(())
}

#[tokio::test]
async fn test_upload_missing_field() -> anyhow::Result<()> {
    let (state, _db, _buckets) = test_state().await;
    let app = server::build_router(state);

    let body = multipart_body("photo", "paw.png", "image/png", &png_bytes(16, 16));
    let parsed: UploadResponse = body_json(app.oneshot(upload_request(body)).await?).await?;

    assert_eq!(
        parsed,
        UploadResponse::Rejected {
            success: false,
            error: "no image received".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_upload_empty_file_rejected() -> anyhow::Result<()> {
    let (state, _db, _buckets) = test_state().await;
    let app = server::build_router(state);

    let body = multipart_body("image", "paw.png", "image/png", b"");
    let parsed: UploadResponse = body_json(app.oneshot(upload_request(body)).await?).await?;

    assert_eq!(
        parsed,
        UploadResponse::Rejected {
            success: false,
            error: "empty file".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_upload_over_limit_rejected() -> anyhow::Result<()> {
    let (state, _db, buckets) = test_state().await;
    let app = server::build_router(state.clone());

    let oversized = vec![0u8; server::MAX_UPLOAD_BYTES + 1024 * 1024];
    let body = multipart_body("image", "huge.jpg", "image/jpeg", &oversized);
    let response = app.oneshot(upload_request(body)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let parsed: UploadResponse = body_json(response).await?;
    match parsed {
        UploadResponse::Rejected { success, error } => {
            assert!(!success);
            assert!(error.contains("too large"), "unexpected error {}", error);
            assert!(error.contains("16 MiB"), "unexpected error {}", error);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(!buckets.path().join("UserImg").exists());
    assert_eq!(state.scans.len().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_upload_and_fetch_result() -> anyhow::Result<()> {
    let (state, _db, buckets) = test_state().await;
    let image = png_bytes(64, 64);

    let body = multipart_body("image", "paw.png", "image/png", &image);
    let response = server::build_router(state.clone())
        .oneshot(upload_request(body))
        .await?;
    let parsed: UploadResponse = body_json(response).await?;

    let redirect = match parsed {
        UploadResponse::Accepted { success, redirect } => {
            assert!(success);
            redirect
        }
        other => panic!("expected success, got {:?}", other),
    };
    assert!(redirect.starts_with("/scan_result/"));

    let scans_dir = buckets.path().join("UserImg").join("scans");
    let stored: Vec<_> = std::fs::read_dir(&scans_dir)?.collect::<Result<_, _>>()?;
    assert_eq!(stored.len(), 1);
    let name = stored[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("scan_") && name.ends_with(".jpg"), "unexpected key {}", name);

    let response = server::build_router(state.clone())
        .oneshot(Request::builder().uri(&redirect).body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let result: ScanResult = body_json(response).await?;

    let expected = wildaware::classifier::classify(state.catalog.as_ref(), &image).await;
    assert_eq!(result.classification, expected);
    assert_eq!(
        result.image_url,
        state.objects.public_url("UserImg", &format!("scans/{}", name))
    );
    Ok(())
}

#[tokio::test]
async fn test_upload_storage_failure_reported() -> anyhow::Result<()> {
    let (catalog, _db) = create_test_catalog(&LABELS).await;
    let state = AppState::new(Arc::new(catalog), Arc::new(FailingStore), "UserImg");
    let app = server::build_router(state);

    let body = multipart_body("image", "paw.png", "image/png", &png_bytes(16, 16));
    let parsed: UploadResponse = body_json(app.oneshot(upload_request(body)).await?).await?;

    assert!(!parsed.is_success());
    Ok(())
}

#[tokio::test]
async fn test_unknown_scan_result() -> anyhow::Result<()> {
    let (state, _db, _buckets) = test_state().await;
    let app = server::build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/scan_result/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
