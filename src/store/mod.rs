//! Remote collaborators: the species catalog, the footprint table and the
//! object store.
//!
//! Everything that talks to the hosted backend goes through these traits, so
//! the server and the batch tools take a client by value instead of reaching
//! for a global, and tests swap in the SQLite / directory backed versions.

pub mod local;
pub mod sqlite;
pub mod supabase;

use std::future::Future;
use thiserror::Error;

use crate::models::{AnimalRecord, NewFootprint};

pub use local::LocalObjectStore;
pub use sqlite::SqliteCatalog;
pub use supabase::SupabaseClient;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Network(e.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub name: String,
    /// Folders have no object id in a listing.
    pub is_folder: bool,
}

/// Read access to the species table.
pub trait AnimalCatalog: Send + Sync + 'static {
    /// Exact, case-sensitive match on the species name.
    fn find_by_species(&self, species: &str) -> impl Future<Output = StoreResult<Option<AnimalRecord>>> + Send;

    /// Any single record; used as a fallback when a lookup misses.
    fn any_animal(&self) -> impl Future<Output = StoreResult<Option<AnimalRecord>>> + Send;

    fn animal_id(&self, species: &str) -> impl Future<Output = StoreResult<Option<i64>>> + Send {
        async move { Ok(self.find_by_species(species).await?.map(|a| a.id)) }
    }
}

/// Append-only access to the footprint table.
pub trait FootprintLedger: Send + Sync + 'static {
    fn insert_footprint(&self, footprint: &NewFootprint) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Bucket/key blob storage.
pub trait ObjectStore: Send + Sync + 'static {
    /// Entries directly under `prefix` ("" for the bucket root).
    fn list(&self, bucket: &str, prefix: &str) -> impl Future<Output = StoreResult<Vec<ObjectEntry>>> + Send;

    fn download(&self, bucket: &str, key: &str) -> impl Future<Output = StoreResult<Vec<u8>>> + Send;

    fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn public_url(&self, bucket: &str, key: &str) -> String;
}

/// Object key for a local file: its relative path with `/` separators and
/// spaces replaced by underscores.
pub fn object_key(relative: &std::path::Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn keys_use_underscores_and_forward_slashes() {
        assert_eq!(object_key(Path::new("Raton laveur/paw 1.jpg")), "Raton_laveur/paw_1.jpg");
        assert_eq!(object_key(Path::new("train/Loup/a.png")), "train/Loup/a.png");
    }
}
