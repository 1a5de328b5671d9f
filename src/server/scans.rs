use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::AppState;
use crate::models::ScanResult;

/// Results kept for the result page; the oldest are evicted past this count.
const MAX_KEPT_SCANS: usize = 1024;

#[derive(Default)]
struct Inner {
    results: HashMap<Uuid, ScanResult>,
    order: VecDeque<Uuid>,
}

/// Recent scan results, keyed by the id handed out in the upload redirect.
#[derive(Clone, Default)]
pub struct ScanResults {
    inner: Arc<RwLock<Inner>>,
}

impl ScanResults {
    pub async fn insert(&self, result: ScanResult) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        inner.results.insert(id, result);
        inner.order.push_back(id);
        while inner.order.len() > MAX_KEPT_SCANS {
            if let Some(oldest) = inner.order.pop_front() {
                inner.results.remove(&oldest);
            }
        }
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<ScanResult> {
        self.inner.read().await.results.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.results.len()
    }
}

/// GET /scan_result/:id
pub async fn scan_result<C, O>(
    State(state): State<AppState<C, O>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanResult>, (StatusCode, Json<Value>)> {
    match state.scans.get(&id).await {
        Some(result) => Ok(Json(result)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no scan result with id {}", id) })),
        )),
    }
}
