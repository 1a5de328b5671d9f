//! Prometheus exporter fed by the application's log file.
//!
//! A scan cycle checks the app's `/health` endpoint and reads whatever was
//! appended to the log since the previous cycle. Counters only ever grow;
//! `wildaware_app_up` reflects the latest check.

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::ExporterConfig;
use crate::telemetry::{LogEvent, classify_line};

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct Metrics {
    pub uploads_total: AtomicU64,
    pub uploads_success_total: AtomicU64,
    pub ia_analyses_total: AtomicU64,
    pub user_connections_total: AtomicU64,
    pub errors_total: AtomicU64,
    pub app_up: AtomicBool,
}

impl Metrics {
    pub fn record(&self, event: LogEvent) {
        match event {
            LogEvent::UserConnected => {
                self.user_connections_total.fetch_add(1, Ordering::Relaxed);
            }
            LogEvent::UploadStarted => {
                self.uploads_total.fetch_add(1, Ordering::Relaxed);
            }
            LogEvent::AnimalIdentified => {
                self.ia_analyses_total.fetch_add(1, Ordering::Relaxed);
                self.uploads_success_total.fetch_add(1, Ordering::Relaxed);
            }
            LogEvent::Error => {
                self.errors_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn set_up(&self, up: bool) {
        self.app_up.store(up, Ordering::Relaxed);
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> String {
        let counters = [
            ("wildaware_uploads_total", "Image uploads started", &self.uploads_total),
            (
                "wildaware_uploads_success_total",
                "Image uploads that produced a result",
                &self.uploads_success_total,
            ),
            ("wildaware_ia_analyses_total", "Footprint classifications", &self.ia_analyses_total),
            (
                "wildaware_user_connections_total",
                "Successful user sign-ins",
                &self.user_connections_total,
            ),
            ("wildaware_errors_total", "Error lines in the application log", &self.errors_total),
        ];

        let mut body = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(body, "# HELP {name} {help}");
            let _ = writeln!(body, "# TYPE {name} counter");
            let _ = writeln!(body, "{name} {}", value.load(Ordering::Relaxed));
        }
        let _ = writeln!(body, "# HELP wildaware_app_up Whether the application answered its health check");
        let _ = writeln!(body, "# TYPE wildaware_app_up gauge");
        let _ = writeln!(
            body,
            "wildaware_app_up {}",
            u8::from(self.app_up.load(Ordering::Relaxed))
        );
        body
    }
}

/// Read cursor over an append-only log file.
#[derive(Debug)]
pub struct LogScanner {
    path: PathBuf,
    position: u64,
}

impl LogScanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Count the complete lines appended since the last scan.
    ///
    /// A missing file is not an error; the log may not exist yet. A trailing
    /// line without its newline is left for the next scan.
    pub async fn scan(&mut self, metrics: &Metrics) -> Result<usize> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "log file not present yet");
                return Ok(0);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open log {:?}", self.path));
            }
        };

        let len = file.metadata().await?.len();
        if len < self.position {
            info!(path = %self.path.display(), "log file shrank, reading from the start");
            self.position = 0;
        }
        file.seek(std::io::SeekFrom::Start(self.position)).await?;

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        let mut counted = 0;
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line).await?;
            if read == 0 || line.last() != Some(&b'\n') {
                break;
            }
            self.position += read as u64;
            // Lines with invalid UTF-8 are still consumed so the cursor moves past them.
            let text = String::from_utf8_lossy(&line);
            if let Some(event) = classify_line(text.trim_end()) {
                metrics.record(event);
                counted += 1;
            }
        }
        Ok(counted)
    }
}

/// True when `{app_url}/health` answers with a success status within the timeout.
pub async fn check_app_health(http: &reqwest::Client, app_url: &str) -> bool {
    let url = format!("{}/health", app_url.trim_end_matches('/'));
    match http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!(url = %url, error = %e, "health check failed");
            false
        }
    }
}

async fn run_cycle(
    http: &reqwest::Client,
    config: &ExporterConfig,
    scanner: &mut LogScanner,
    metrics: &Metrics,
) -> Result<()> {
    let up = check_app_health(http, &config.app_url).await;
    metrics.set_up(up);
    let counted = scanner.scan(metrics).await?;
    debug!(up, counted, position = scanner.position(), "scan cycle done");
    Ok(())
}

/// Scan forever. A failed cycle is logged and followed by the longer back-off.
pub async fn scan_loop(config: ExporterConfig, metrics: Arc<Metrics>) {
    let http = reqwest::Client::new();
    let mut scanner = LogScanner::new(&config.app_log);

    loop {
        let pause = match run_cycle(&http, &config, &mut scanner, &metrics).await {
            Ok(()) => config.interval(),
            Err(e) => {
                warn!(error = %e, "scan cycle failed");
                config.error_backoff()
            }
        };
        tokio::time::sleep(pause).await;
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}

pub fn build_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Serve `/metrics` and run the scan loop until Ctrl-C.
pub async fn run(config: ExporterConfig) -> Result<()> {
    let metrics = Arc::new(Metrics::default());
    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(
        app_url = %config.app_url,
        log = %config.app_log.display(),
        "metrics exporter listening on http://{}/metrics",
        config.listen
    );

    let scanner = tokio::spawn(scan_loop(config, Arc::clone(&metrics)));
    let result = axum::serve(listener, build_router(metrics))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await;
    scanner.abort();
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identified_counts_as_success_and_analysis() {
        let metrics = Metrics::default();
        metrics.record(LogEvent::UploadStarted);
        metrics.record(LogEvent::AnimalIdentified);
        assert_eq!(metrics.uploads_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.uploads_success_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.ia_analyses_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn render_lists_every_series() {
        let metrics = Metrics::default();
        metrics.set_up(true);
        metrics.record(LogEvent::Error);
        let text = metrics.render();
        assert!(text.contains("# TYPE wildaware_errors_total counter"));
        assert!(text.contains("wildaware_errors_total 1\n"));
        assert!(text.contains("wildaware_user_connections_total 0\n"));
        assert!(text.contains("# TYPE wildaware_app_up gauge"));
        assert!(text.contains("wildaware_app_up 1\n"));
    }
}
