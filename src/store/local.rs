use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::store::{ObjectEntry, ObjectStore, StoreError, StoreResult};

/// Object store backed by a directory: `{root}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let public_base = format!("file://{}", root.display());
        Self { root, public_base }
    }

    /// Base used when building public URLs (defaults to a `file://` URL of the root).
    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn resolve(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let mut path = self.root.join(bucket);
        for part in Path::new(key).components() {
            match part {
                Component::Normal(p) => path.push(p),
                Component::CurDir => {}
                _ => return Err(StoreError::NotFound(format!("invalid key '{}'", key))),
            }
        }
        Ok(path)
    }
}

impl ObjectStore for LocalObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let dir = self.resolve(bucket, prefix)?;
        if !fs::try_exists(&dir).await? {
            return Err(StoreError::NotFound(format!("{}/{}", bucket, prefix)));
        }
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(ObjectEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_folder: entry.file_type().await?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn download(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.resolve(bucket, key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("{}/{}", bucket, key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>, _content_type: &str) -> StoreResult<()> {
        let path = self.resolve(bucket, key)?;
        if fs::try_exists(&path).await? {
            return Err(StoreError::Status {
                status: 409,
                body: format!("object {}/{} already exists", bucket, key),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.public_base, bucket, key)
    }
}
