//! Upload/classification HTTP boundary.

mod health;
mod scans;
mod upload;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::ServerConfig;
use crate::store::{AnimalCatalog, ObjectStore};

pub use health::HealthResponse;
pub use scans::ScanResults;
pub use upload::{IMAGE_FIELD, MAX_UPLOAD_BYTES, UploadError};

/// Shared by every handler. The backend clients are created once at startup
/// and handed in here.
pub struct AppState<C, O> {
    pub catalog: Arc<C>,
    pub objects: Arc<O>,
    pub scans: ScanResults,
    pub user_bucket: String,
    pub startup_time: Instant,
}

impl<C, O> AppState<C, O> {
    pub fn new(catalog: Arc<C>, objects: Arc<O>, user_bucket: impl Into<String>) -> Self {
        Self {
            catalog,
            objects,
            scans: ScanResults::default(),
            user_bucket: user_bucket.into(),
            startup_time: Instant::now(),
        }
    }
}

impl<C, O> Clone for AppState<C, O> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            objects: Arc::clone(&self.objects),
            scans: self.scans.clone(),
            user_bucket: self.user_bucket.clone(),
            startup_time: self.startup_time,
        }
    }
}

pub fn build_router<C, O>(state: AppState<C, O>) -> Router
where
    C: AnimalCatalog,
    O: ObjectStore,
{
    Router::new()
        .route("/health", get(health::health_check::<C, O>))
        .route("/upload-image", post(upload::upload_image::<C, O>))
        .route("/scan_result/:id", get(scans::scan_result::<C, O>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve<C, O>(config: &ServerConfig, state: AppState<C, O>) -> Result<()>
where
    C: AnimalCatalog,
    O: ObjectStore,
{
    config.validate()?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(mode = ?config.mode, "wildaware listening on http://{}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}
