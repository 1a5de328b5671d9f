pub mod augment;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::path::Path;
use thiserror::Error;

pub use augment::Augmenter;

/// Side length every dataset and bucket image is normalized to.
pub const TARGET_SIZE: u32 = 224;
pub const JPEG_QUALITY: u8 = 95;

/// Extensions accepted by every image walk, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("cannot decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("cannot encode jpeg: {0}")]
    Encode(#[source] image::ImageError),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Content type sent alongside an upload, based on the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, NormalizeError> {
    image::load_from_memory(bytes).map_err(NormalizeError::Decode)
}

pub fn open(path: &Path) -> Result<DynamicImage, NormalizeError> {
    image::open(path).map_err(|e| match e {
        image::ImageError::IoError(source) => NormalizeError::Io {
            path: path.display().to_string(),
            source,
        },
        other => NormalizeError::Decode(other),
    })
}

/// Resize to exactly `width` x `height`.
///
/// Shrinking uses area averaging: every source pixel contributes to exactly
/// one target pixel. Enlarging falls back to bilinear sampling.
pub fn resize(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    if rgb.width() == width && rgb.height() == height {
        return rgb;
    }
    if width <= rgb.width() && height <= rgb.height() {
        imageops::thumbnail(&rgb, width, height)
    } else {
        imageops::resize(&rgb, width, height, FilterType::Triangle)
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, NormalizeError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(NormalizeError::Encode)?;
    Ok(buffer)
}

/// Decode `bytes`, resize to a `size` x `size` square and re-encode as JPEG.
pub fn normalize_bytes(bytes: &[u8], size: u32) -> Result<Vec<u8>, NormalizeError> {
    let image = decode(bytes)?;
    let resized = resize(&image, size, size);
    encode_jpeg(&resized, JPEG_QUALITY)
}

/// Encode `image` at the fixed quality and write it, creating parent directories.
pub fn write_jpeg(image: &RgbImage, dest: &Path) -> Result<(), NormalizeError> {
    let bytes = encode_jpeg(image, JPEG_QUALITY)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|source| NormalizeError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    std::fs::write(dest, bytes).map_err(|source| NormalizeError::Io {
        path: dest.display().to_string(),
        source,
    })
}

/// Read `src`, normalize it to `width` x `height` and write the JPEG to `dest`.
///
/// Returns the resized buffer so callers can keep working on it (augmentation).
pub fn normalize_file(src: &Path, dest: &Path, width: u32, height: u32) -> Result<RgbImage, NormalizeError> {
    let image = open(src)?;
    let resized = resize(&image, width, height);
    write_jpeg(&resized, dest)?;
    Ok(resized)
}
