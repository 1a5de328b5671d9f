pub mod assets;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod exporter;
pub mod imaging;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod telemetry;

pub use models::{AnimalRecord, ClassificationResult, ScanResult, Split, UploadResponse};
pub use imaging::Augmenter;
pub use pipeline::{ImageStep, Pipeline, SnapshotDir, StepContext};
pub use store::{AnimalCatalog, FootprintLedger, ObjectStore, StoreError};
