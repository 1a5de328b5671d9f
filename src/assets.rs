//! Moving footprint images between local trees and the object store, and
//! recording their public URLs in the footprint table.
//!
//! Every loop here recovers per item: a failed upload, download, decode or
//! insert is logged and counted, and the run moves on to the next file.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::imaging::{self, is_image_file};
use crate::models::NewFootprint;
use crate::store::{AnimalCatalog, FootprintLedger, ObjectStore, StoreResult, object_key};

/// Folder name → object keys (`{folder}/{file}`) inside it.
pub type BucketStructure = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl TransferStats {
    fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub inserted: usize,
    pub failed: usize,
    /// Folders whose species name is not in the catalog.
    pub skipped_folders: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderStats {
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EtlStats {
    pub started_at: String,
    pub total_processed: usize,
    pub total_success: usize,
    pub total_failed: usize,
    pub by_folder: BTreeMap<String, FolderStats>,
}

impl EtlStats {
    fn new() -> Self {
        let started_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            started_at,
            total_processed: 0,
            total_success: 0,
            total_failed: 0,
            by_folder: BTreeMap::new(),
        }
    }

    fn record(&mut self, folder: &str, ok: bool) {
        let entry = self.by_folder.entry(folder.to_string()).or_default();
        entry.processed += 1;
        self.total_processed += 1;
        if ok {
            entry.success += 1;
            self.total_success += 1;
        } else {
            entry.failed += 1;
            self.total_failed += 1;
        }
    }
}

/// Fail fast when the bucket cannot be listed at all.
pub async fn check_bucket_access<S: ObjectStore>(store: &S, bucket: &str) -> Result<()> {
    store
        .list(bucket, "")
        .await
        .with_context(|| format!("Cannot access bucket {}", bucket))?;
    info!(bucket, "bucket reachable");
    Ok(())
}

/// Upload every image under `root` to `bucket`, keyed by its relative path.
pub async fn upload_tree<S: ObjectStore>(store: &S, bucket: &str, root: &Path) -> Result<TransferStats> {
    if !root.is_dir() {
        anyhow::bail!("upload source {:?} is not a directory", root);
    }

    let mut stats = TransferStats::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "cannot read directory entry, skipped");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !is_image_file(path) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let key = object_key(relative);

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read file, skipped");
                stats.record(false);
                continue;
            }
        };

        match store
            .upload(bucket, &key, bytes, imaging::content_type_for(path))
            .await
        {
            Ok(()) => {
                info!(key = %key, "uploaded");
                stats.record(true);
            }
            Err(e) => {
                error!(key = %key, error = %e, "upload failed");
                stats.record(false);
            }
        }
    }

    info!(
        bucket,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "upload finished"
    );
    Ok(stats)
}

/// One level of folders in `bucket`, with the files directly inside each.
///
/// A folder that cannot be listed is logged and left out.
pub async fn bucket_structure<S: ObjectStore>(store: &S, bucket: &str) -> Result<BucketStructure> {
    let root = store
        .list(bucket, "")
        .await
        .with_context(|| format!("Cannot list bucket {}", bucket))?;

    let mut structure = BucketStructure::new();
    for item in root {
        if !item.is_folder && !item.name.contains('/') {
            continue;
        }
        let folder = item
            .name
            .split('/')
            .next()
            .unwrap_or(&item.name)
            .to_string();
        if folder.is_empty() || structure.contains_key(&folder) {
            continue;
        }

        match store.list(bucket, &folder).await {
            Ok(contents) => {
                let files = contents
                    .into_iter()
                    .filter(|c| !c.is_folder && !c.name.starts_with('.'))
                    .map(|c| format!("{}/{}", folder, c.name))
                    .collect();
                structure.insert(folder, files);
            }
            Err(e) => warn!(bucket, folder = %folder, error = %e, "cannot list folder"),
        }
    }
    Ok(structure)
}

/// Same shape as [`bucket_structure`], built from the class folders of a local tree.
pub fn local_structure(root: &Path) -> Result<BucketStructure> {
    let mut structure = BucketStructure::new();
    for (folder, dir) in crate::dataset::list_classes(root)? {
        let files = crate::dataset::list_class_images(&dir)?
            .into_iter()
            .filter_map(|p| {
                p.file_name()
                    .map(|name| object_key(&Path::new(&folder).join(name)))
            })
            .collect();
        structure.insert(folder, files);
    }
    Ok(structure)
}

/// Catalog id for a folder name. Object keys replace spaces with underscores,
/// so a miss on the exact name is retried with the underscores turned back.
async fn resolve_species<C: AnimalCatalog>(catalog: &C, folder: &str) -> StoreResult<Option<i64>> {
    if let Some(id) = catalog.animal_id(folder).await? {
        return Ok(Some(id));
    }
    if !folder.contains('_') {
        return Ok(None);
    }
    catalog.animal_id(&folder.replace('_', " ")).await
}

/// Insert one footprint row per key, linked to the species named by its folder.
pub async fn link_footprints<C, L, S>(
    catalog: &C,
    ledger: &L,
    store: &S,
    bucket: &str,
    structure: &BucketStructure,
) -> LinkStats
where
    C: AnimalCatalog,
    L: FootprintLedger,
    S: ObjectStore,
{
    let mut stats = LinkStats::default();

    for (species, keys) in structure {
        let animal_id = match resolve_species(catalog, species).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(species = %species, "species not found in catalog, folder skipped");
                stats.skipped_folders.push(species.clone());
                continue;
            }
            Err(e) => {
                error!(species = %species, error = %e, "species lookup failed, folder skipped");
                stats.skipped_folders.push(species.clone());
                continue;
            }
        };

        for key in keys {
            let footprint = NewFootprint {
                animal_id,
                image_url: store.public_url(bucket, key),
            };
            match ledger.insert_footprint(&footprint).await {
                Ok(()) => {
                    info!(key = %key, "footprint URL recorded");
                    stats.inserted += 1;
                }
                Err(e) => {
                    error!(key = %key, error = %e, "cannot record footprint URL");
                    stats.failed += 1;
                }
            }
        }
    }
    stats
}

/// Normalize every image of `source_bucket` into `destination_bucket`.
///
/// Images keep their folder and file name; content is re-encoded as a
/// `size` x `size` JPEG.
pub async fn run_remote_etl<S: ObjectStore>(
    store: &S,
    source_bucket: &str,
    destination_bucket: &str,
    size: u32,
) -> EtlStats {
    let mut stats = EtlStats::new();
    info!(source_bucket, destination_bucket, "ETL started");

    let structure = match bucket_structure(store, source_bucket).await {
        Ok(structure) => structure,
        Err(e) => {
            error!(error = %e, "cannot read source bucket");
            return stats;
        }
    };
    if structure.is_empty() {
        warn!(source_bucket, "no folders found in source bucket");
        return stats;
    }

    for (folder, files) in &structure {
        info!(folder = %folder, files = files.len(), "processing folder");
        for source_key in files {
            let ok = process_remote_image(store, source_bucket, destination_bucket, folder, source_key, size).await;
            stats.record(folder, ok);
        }
        if let Some(f) = stats.by_folder.get(folder) {
            info!(folder = %folder, processed = f.processed, success = f.success, failed = f.failed, "folder done");
        }
    }

    info!(
        processed = stats.total_processed,
        success = stats.total_success,
        failed = stats.total_failed,
        "ETL finished"
    );
    stats
}

async fn process_remote_image<S: ObjectStore>(
    store: &S,
    source_bucket: &str,
    destination_bucket: &str,
    folder: &str,
    source_key: &str,
    size: u32,
) -> bool {
    let bytes = match store.download(source_bucket, source_key).await {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => {
            error!(key = %source_key, "downloaded image is empty");
            return false;
        }
        Err(e) => {
            error!(key = %source_key, error = %e, "download failed");
            return false;
        }
    };

    let encoded = match imaging::normalize_bytes(&bytes, size) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(key = %source_key, error = %e, "cannot normalize image");
            return false;
        }
    };

    let file_name = source_key.rsplit('/').next().unwrap_or(source_key);
    let destination_key = format!("{}/{}", folder, file_name);
    match store
        .upload(destination_bucket, &destination_key, encoded, "image/jpeg")
        .await
    {
        Ok(()) => {
            info!(key = %destination_key, "image processed");
            true
        }
        Err(e) => {
            error!(key = %destination_key, error = %e, "upload failed");
            false
        }
    }
}
