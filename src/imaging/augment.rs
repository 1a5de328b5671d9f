//! Randomized geometric and photometric transforms used to synthesize extra
//! training samples.
//!
//! Each transform is an [`ImageStep`] so the chain runs through the regular
//! [`Pipeline`] (and can dump every intermediate image in debug mode). The
//! deterministic kernels (`rotate_reflect`, `zoom`, `adjust_contrast_brightness`)
//! are public for callers that want fixed parameters.

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, warp_with};
use rand::{Rng, RngCore};
use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::{ImageStep, Pipeline, StepContext};

/// Rotation by a uniform angle in `[-max_degrees, max_degrees]`.
pub struct RotationStep {
    pub max_degrees: f32,
}

impl ImageStep for RotationStep {
    fn process(&self, image: RgbImage, rng: &mut dyn RngCore, _context: &StepContext) -> Result<RgbImage> {
        let angle = rng.gen_range(-self.max_degrees..=self.max_degrees);
        Ok(rotate_reflect(&image, angle))
    }

    fn name(&self) -> &str {
        "Rotation"
    }
}

/// Uniform zoom by a factor in `[min_factor, max_factor]`, brought back to the
/// original size by center crop or center zero padding.
pub struct ZoomStep {
    pub min_factor: f32,
    pub max_factor: f32,
}

impl ImageStep for ZoomStep {
    fn process(&self, image: RgbImage, rng: &mut dyn RngCore, _context: &StepContext) -> Result<RgbImage> {
        let factor = rng.gen_range(self.min_factor..=self.max_factor);
        Ok(zoom(&image, factor))
    }

    fn name(&self) -> &str {
        "Zoom"
    }
}

/// Horizontal mirror with the given probability.
pub struct MirrorStep {
    pub probability: f64,
}

impl ImageStep for MirrorStep {
    fn process(&self, image: RgbImage, rng: &mut dyn RngCore, _context: &StepContext) -> Result<RgbImage> {
        if rng.gen_bool(self.probability) {
            Ok(imageops::flip_horizontal(&image))
        } else {
            Ok(image)
        }
    }

    fn name(&self) -> &str {
        "Mirror"
    }
}

/// Contrast multiplier and integer brightness offset.
pub struct ContrastBrightnessStep {
    pub min_contrast: f32,
    pub max_contrast: f32,
    pub max_brightness_shift: i32,
}

impl ImageStep for ContrastBrightnessStep {
    fn process(&self, image: RgbImage, rng: &mut dyn RngCore, _context: &StepContext) -> Result<RgbImage> {
        let alpha = rng.gen_range(self.min_contrast..=self.max_contrast);
        let beta = rng.gen_range(-self.max_brightness_shift..=self.max_brightness_shift);
        Ok(adjust_contrast_brightness(image, alpha, beta))
    }

    fn name(&self) -> &str {
        "Contrast Brightness"
    }
}

/// Mirror `v` back into `[0, len - 1]` with the border pixel repeated
/// (`cba|abc...xyz|zyx`).
fn reflect_coordinate(v: f32, len: u32) -> f32 {
    let n = len as f32;
    let period = 2.0 * n;
    let mut m = (v + 0.5).rem_euclid(period);
    if m > n {
        m = period - m;
    }
    (m - 0.5).clamp(0.0, n - 1.0)
}

/// Rotate about the integer center `(w / 2, h / 2)`; positive angles turn
/// counter-clockwise. Pixels that fall outside the source are filled by
/// reflecting across the border.
pub fn rotate_reflect(image: &RgbImage, degrees: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let cx = (w / 2) as f32;
    let cy = (h / 2) as f32;
    let (sin, cos) = degrees.to_radians().sin_cos();

    // One replicated pixel on every side keeps the bilinear neighbours of the
    // last row and column inside the sampled buffer.
    let padded = RgbImage::from_fn(w + 2, h + 2, |x, y| {
        let sx = x.saturating_sub(1).min(w - 1);
        let sy = y.saturating_sub(1).min(h - 1);
        *image.get_pixel(sx, sy)
    });

    let rotated = warp_with(
        &padded,
        move |x, y| {
            let dx = x - 1.0 - cx;
            let dy = y - 1.0 - cy;
            let sx = cx + dx * cos - dy * sin;
            let sy = cy + dx * sin + dy * cos;
            (reflect_coordinate(sx, w) + 1.0, reflect_coordinate(sy, h) + 1.0)
        },
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
    );

    imageops::crop_imm(&rotated, 1, 1, w, h).to_image()
}

/// Scale by `factor`, then center-crop (factor > 1) or center zero-pad
/// (factor <= 1) back to the input dimensions.
pub fn zoom(image: &RgbImage, factor: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let zw = ((w as f32 * factor).round() as u32).max(1);
    let zh = ((h as f32 * factor).round() as u32).max(1);
    let zoomed = imageops::resize(image, zw, zh, FilterType::Triangle);

    if factor > 1.0 {
        // Rounding can leave one side no larger than the original.
        let x = zw.saturating_sub(w) / 2;
        let y = zh.saturating_sub(h) / 2;
        let cropped = imageops::crop_imm(&zoomed, x, y, w.min(zw), h.min(zh)).to_image();
        if cropped.dimensions() == (w, h) {
            return cropped;
        }
        let mut canvas = RgbImage::new(w, h);
        imageops::replace(&mut canvas, &cropped, 0, 0);
        canvas
    } else {
        let mut canvas = RgbImage::new(w, h);
        let x = (w as i64 - zw as i64) / 2;
        let y = (h as i64 - zh as i64) / 2;
        imageops::replace(&mut canvas, &zoomed, x, y);
        canvas
    }
}

/// `alpha * p + beta` per channel, clamped to `0..=255`.
pub fn adjust_contrast_brightness(mut image: RgbImage, alpha: f32, beta: i32) -> RgbImage {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let v = (alpha * *channel as f32 + beta as f32).round();
            *channel = v.clamp(0.0, 255.0) as u8;
        }
    }
    image
}

/// Applies rotation, zoom, mirror and contrast/brightness, in that order,
/// with fresh parameters on every call.
#[derive(Clone)]
pub struct Augmenter {
    pipeline: Pipeline,
}

impl Augmenter {
    pub fn new() -> Self {
        let pipeline = Pipeline::new()
            .add_step(Arc::new(RotationStep { max_degrees: 30.0 }))
            .add_step(Arc::new(ZoomStep {
                min_factor: 0.8,
                max_factor: 1.2,
            }))
            .add_step(Arc::new(MirrorStep { probability: 0.5 }))
            .add_step(Arc::new(ContrastBrightnessStep {
                min_contrast: 0.8,
                max_contrast: 1.2,
                max_brightness_shift: 20,
            }));
        Self { pipeline }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.pipeline = self.pipeline.with_verbose(verbose);
        self
    }

    /// Save every intermediate image under `output_dir` (must be empty).
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        self.pipeline = self.pipeline.with_debug(output_dir)?;
        Ok(self)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn augment(&self, image: &RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        self.augment_tagged(image, "augmented", rng)
    }

    pub fn augment_tagged(&self, image: &RgbImage, tag: &str, rng: &mut dyn RngCore) -> Result<RgbImage> {
        self.pipeline.run(image.clone(), tag, rng)
    }

    /// `count` independent variants of `image`.
    pub fn variants(&self, image: &RgbImage, count: usize, rng: &mut dyn RngCore) -> Result<Vec<RgbImage>> {
        (0..count)
            .map(|i| self.augment_tagged(image, &format!("aug_{}", i), rng))
            .collect()
    }
}

impl Default for Augmenter {
    fn default() -> Self {
        Self::new()
    }
}
