use image::{ImageBuffer, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use wildaware::store::{ObjectEntry, ObjectStore, SqliteCatalog, StoreError, StoreResult};

/// Creates a width x height image with a color gradient, so resampling and
/// geometric transforms have something to work on.
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
}

/// Encodes a gradient image as PNG bytes.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    gradient_image(width, height)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("Failed to encode test PNG");
    buf
}

/// Writes a PNG at `path`, creating parent directories.
pub fn save_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create image directory");
    }
    gradient_image(width, height)
        .save_with_format(path, image::ImageFormat::Png)
        .expect("Failed to save test image");
}

/// Builds `root/{class}/img_{i}.png` for every `(class, count)` pair.
pub fn create_class_tree(root: &Path, classes: &[(&str, usize)]) {
    for (class_name, count) in classes {
        for i in 0..*count {
            save_png(&root.join(class_name).join(format!("img_{:02}.png", i)), 40 + i as u32, 30);
        }
    }
}

/// Creates a catalog database in a temporary directory, seeded with `species`.
/// Returns both the catalog and the directory (which must be kept alive).
pub async fn create_test_catalog(species: &[&str]) -> (SqliteCatalog, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let catalog = SqliteCatalog::open(dir.path().join("catalog.db"))
        .await
        .expect("Failed to create test catalog");
    for name in species {
        catalog
            .insert_animal(
                name,
                &format!("https://cards.test/{}.png", name),
                &format!("Fun fact about {}", name),
            )
            .await
            .expect("Failed to seed catalog");
    }
    (catalog, dir)
}

/// Object store whose every call fails, for exercising error paths.
pub struct FailingStore;

impl ObjectStore for FailingStore {
    async fn list(&self, bucket: &str, _prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        Err(StoreError::Network(format!("bucket {} unreachable", bucket)))
    }

    async fn download(&self, _bucket: &str, _key: &str) -> StoreResult<Vec<u8>> {
        Err(StoreError::Network("download refused".to_string()))
    }

    async fn upload(&self, _bucket: &str, _key: &str, _bytes: Vec<u8>, _content_type: &str) -> StoreResult<()> {
        Err(StoreError::Status {
            status: 500,
            body: "storage offline".to_string(),
        })
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("https://failing.test/{}/{}", bucket, key)
    }
}
