mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from wildaware for tests
pub use wildaware::models::{AnimalRecord, ClassificationResult, ScanResult, Split, UploadResponse};
pub use wildaware::store::{LocalObjectStore, SqliteCatalog};
