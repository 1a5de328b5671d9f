use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tower::ServiceExt;
use wildaware::exporter::{self, LogScanner, Metrics};

fn append(path: &std::path::Path, text: &str) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

#[tokio::test]
async fn test_scanner_counts_only_new_lines() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let log = dir.path().join("app.log");
    let metrics = Metrics::default();
    let mut scanner = LogScanner::new(&log);

    // Missing file is not an error.
    assert_eq!(scanner.scan(&metrics).await?, 0);

    append(
        &log,
        "2026-01-01T10:00:00Z  INFO auth: login succeeded user=a\n\
         2026-01-01T10:00:01Z  INFO wildaware::server::upload: upload started\n\
         2026-01-01T10:00:02Z  INFO wildaware::server::upload: animal identified animal=Loup\n\
         2026-01-01T10:00:03Z ERROR wildaware::server::upload: upload failed\n\
         2026-01-01T10:00:04Z  INFO wildaware: nothing to see\n",
    )?;
    assert_eq!(scanner.scan(&metrics).await?, 4);

    // Nothing new: counters stay put.
    assert_eq!(scanner.scan(&metrics).await?, 0);

    append(&log, "2026-01-01T10:00:05Z  INFO wildaware::server::upload: upload sta")?;
    assert_eq!(scanner.scan(&metrics).await?, 0);
    append(&log, "rted\n")?;
    assert_eq!(scanner.scan(&metrics).await?, 1);

    assert_eq!(metrics.user_connections_total.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.uploads_total.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.uploads_success_total.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.ia_analyses_total.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.errors_total.load(Ordering::Relaxed), 1);
    Ok(())
}

#[tokio::test]
async fn test_scanner_restarts_after_truncation() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let log = dir.path().join("app.log");
    let metrics = Metrics::default();
    let mut scanner = LogScanner::new(&log);

    append(&log, "x  INFO upload started\nx  INFO upload started\nx  INFO upload started\n")?;
    scanner.scan(&metrics).await?;
    assert!(scanner.position() > 0);

    std::fs::write(&log, "y ERROR boom\n")?;
    assert_eq!(scanner.scan(&metrics).await?, 1);

    assert_eq!(metrics.uploads_total.load(Ordering::Relaxed), 3);
    assert_eq!(metrics.errors_total.load(Ordering::Relaxed), 1);
    Ok(())
}

#[tokio::test]
async fn test_scanner_survives_invalid_utf8() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let log = dir.path().join("app.log");
    let mut bytes = b"x  INFO upload started\nbad ".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe]);
    bytes.extend_from_slice(b" line\nx  INFO upload started\n");
    std::fs::write(&log, &bytes)?;
    let metrics = Metrics::default();
    let mut scanner = LogScanner::new(&log);

    assert_eq!(scanner.scan(&metrics).await?, 2);
    assert_eq!(scanner.position(), bytes.len() as u64);
    assert_eq!(metrics.uploads_total.load(Ordering::Relaxed), 2);

    append(&log, "y ERROR after the bad line\n")?;
    assert_eq!(scanner.scan(&metrics).await?, 1);
    assert_eq!(metrics.errors_total.load(Ordering::Relaxed), 1);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_app_is_down() -> anyhow::Result<()> {
    let http = reqwest::Client::new();
    // Nothing listens on the discard port of the loopback address.
    assert!(!exporter::check_app_health(&http, "http://127.0.0.1:9").await);
    Ok(())
}

#[tokio::test]
async fn test_metrics_route() -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::default());
    metrics.set_up(true);
    let app = exporter::build_router(Arc::clone(&metrics));

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let text = String::from_utf8(bytes.to_vec())?;
    assert!(text.contains("wildaware_app_up 1"));
    assert!(text.contains("# TYPE wildaware_uploads_total counter"));
    Ok(())
}
