use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::classifier;
use crate::imaging;
use crate::models::{ScanResult, UploadResponse};
use crate::store::{AnimalCatalog, ObjectStore, StoreError};
use crate::telemetry::{ANIMAL_IDENTIFIED, UPLOAD_STARTED};

/// Multipart field carrying the scanned image.
pub const IMAGE_FIELD: &str = "image";
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no image received")]
    NoImage,
    #[error("empty file")]
    EmptyFile,
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
    #[error("file is not a readable image: {0}")]
    NotAnImage(String),
    #[error("file too large (limit is {} MiB)", MAX_UPLOAD_BYTES / (1024 * 1024))]
    TooLarge,
    #[error("cannot read upload: {0}")]
    Read(String),
    #[error("cannot store image: {0}")]
    Storage(#[from] StoreError),
}

impl UploadError {
    /// Problems with what the client sent, as opposed to backend failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Storage(_))
    }
}

/// POST /upload-image
///
/// Always answers with an [`UploadResponse`]; nothing in here turns into a
/// bare HTTP error.
pub async fn upload_image<C, O>(
    State(state): State<AppState<C, O>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<UploadResponse>
where
    C: AnimalCatalog,
    O: ObjectStore,
{
    info!("{}", UPLOAD_STARTED);

    match handle_upload(&state, multipart).await {
        Ok(redirect) => Json(UploadResponse::accepted(redirect)),
        Err(e) => {
            if e.is_client_error() {
                warn!(error = %e, "upload rejected");
            } else {
                error!(error = %e, "upload failed");
            }
            Json(UploadResponse::rejected(e.to_string()))
        }
    }
}

async fn handle_upload<C, O>(
    state: &AppState<C, O>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, UploadError>
where
    C: AnimalCatalog,
    O: ObjectStore,
{
    let mut multipart = multipart.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge
        } else {
            UploadError::Read(e.body_text())
        }
    })?;
    let (content_type, bytes) = read_image_field(&mut multipart).await?;

    if bytes.is_empty() {
        return Err(UploadError::EmptyFile);
    }
    let content_type = match content_type {
        Some(ct) if ct.starts_with("image/") => ct,
        Some(ct) if ct == "application/octet-stream" => "image/jpeg".to_string(),
        Some(ct) => return Err(UploadError::UnsupportedType(ct)),
        None => "image/jpeg".to_string(),
    };

    let sample = bytes.clone();
    tokio::task::spawn_blocking(move || imaging::decode(&sample).map(|_| ()))
        .await
        .map_err(|e| UploadError::Read(e.to_string()))?
        .map_err(|e| UploadError::NotAnImage(e.to_string()))?;

    let key = format!(
        "scans/scan_{}_{}.jpg",
        Uuid::new_v4().simple(),
        OffsetDateTime::now_utc().unix_timestamp()
    );
    info!(bucket = %state.user_bucket, key = %key, "storing scanned image");
    state
        .objects
        .upload(&state.user_bucket, &key, bytes.to_vec(), &content_type)
        .await?;
    let image_url = state.objects.public_url(&state.user_bucket, &key);

    let classification = classifier::classify(state.catalog.as_ref(), &bytes).await;
    info!(
        animal = %classification.animal,
        confidence = classification.confidence,
        "{}",
        ANIMAL_IDENTIFIED
    );

    let id = state
        .scans
        .insert(ScanResult {
            image_url,
            classification,
        })
        .await;
    Ok(format!("/scan_result/{}", id))
}

async fn read_image_field(multipart: &mut Multipart) -> Result<(Option<String>, Bytes), UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(read_error)?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(read_error)?;
        return Ok((content_type, bytes));
    }
    Err(UploadError::NoImage)
}

fn read_error(e: MultipartError) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge
    } else {
        UploadError::Read(e.body_text())
    }
}
