//! Dataset preparation: split each class, normalize every image into
//! `{split}/{class}/`, and synthesize augmented variants for the training split.

use anyhow::{Context, Result};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::dataset::pool::{ExecutionMode, run_batch};
use crate::dataset::{SplitRatios, split_dataset};
use crate::imaging::{self, Augmenter};
use crate::models::Split;

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub image_size: (u32, u32),
    pub ratios: SplitRatios,
    pub augment: bool,
    /// Augmented variants written per training image.
    pub augmented_per_image: usize,
    pub mode: ExecutionMode,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            image_size: (imaging::TARGET_SIZE, imaging::TARGET_SIZE),
            ratios: SplitRatios::default(),
            augment: true,
            augmented_per_image: 5,
            mode: ExecutionMode::Sequential,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitCounts {
    /// Images assigned to the split.
    pub assigned: usize,
    /// Normalized images actually written.
    pub written: usize,
    /// Images that could not be read or decoded.
    pub skipped: usize,
    pub augmented: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrepareReport {
    pub classes: BTreeMap<String, BTreeMap<Split, SplitCounts>>,
}

impl PrepareReport {
    pub fn counts(&self, class_name: &str, split: Split) -> Option<&SplitCounts> {
        self.classes.get(class_name).and_then(|c| c.get(&split))
    }

    pub fn total_written(&self) -> usize {
        self.classes
            .values()
            .flat_map(|splits| splits.values())
            .map(|c| c.written)
            .sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.classes
            .values()
            .flat_map(|splits| splits.values())
            .map(|c| c.skipped)
            .sum()
    }
}

enum JobOutcome {
    Written { augmented: usize },
    Skipped,
}

struct ImageJob {
    source: PathBuf,
    split_dir: PathBuf,
    augment: bool,
}

/// Split `input_dir` (one subdirectory per class) into `output_dir/{train,validation,test}/{class}/`.
///
/// `rng` drives the per-class shuffle only; augmentation draws from each
/// worker's own generator. Unreadable images are logged and skipped.
pub fn prepare_dataset<R: Rng + ?Sized>(
    input_dir: &Path,
    output_dir: &Path,
    options: &PrepareOptions,
    rng: &mut R,
) -> Result<PrepareReport> {
    let assignments = split_dataset(input_dir, &options.ratios, rng)?;

    for split in Split::ALL {
        let dir = output_dir.join(split.dir_name());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create split directory {:?}", dir))?;
    }

    let augmenter = Augmenter::new();
    let (width, height) = options.image_size;
    let mut report = PrepareReport::default();

    for (class_name, assignment) in &assignments {
        let class_report = report.classes.entry(class_name.clone()).or_default();

        for split in Split::ALL {
            let files = assignment.get(split);
            let split_dir = output_dir.join(split.dir_name()).join(class_name);
            std::fs::create_dir_all(&split_dir)
                .with_context(|| format!("Failed to create {:?}", split_dir))?;

            info!(
                split = %split,
                class = %class_name,
                images = files.len(),
                "processing split"
            );

            let jobs: Vec<ImageJob> = files
                .iter()
                .map(|source| ImageJob {
                    source: source.clone(),
                    split_dir: split_dir.clone(),
                    augment: options.augment && split == Split::Train,
                })
                .collect();

            let outcomes = run_batch(jobs, options.mode, |job| {
                process_image(&job, width, height, options.augmented_per_image, &augmenter)
            });

            let counts = class_report.entry(split).or_default();
            counts.assigned = files.len();
            for outcome in outcomes {
                match outcome {
                    JobOutcome::Written { augmented } => {
                        counts.written += 1;
                        counts.augmented += augmented;
                    }
                    JobOutcome::Skipped => counts.skipped += 1,
                }
            }
        }
    }

    Ok(report)
}

fn process_image(job: &ImageJob, width: u32, height: u32, variants: usize, augmenter: &Augmenter) -> JobOutcome {
    let Some(stem) = job.source.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        warn!(path = %job.source.display(), "image has no file name, skipped");
        return JobOutcome::Skipped;
    };

    let dest = job.split_dir.join(format!("{}.jpg", stem));
    let resized = match imaging::normalize_file(&job.source, &dest, width, height) {
        Ok(resized) => resized,
        Err(e) => {
            warn!(path = %job.source.display(), error = %e, "cannot read image, skipped");
            return JobOutcome::Skipped;
        }
    };

    let mut augmented = 0;
    if job.augment {
        let mut rng = rand::thread_rng();
        for i in 0..variants {
            let tag = format!("{}_aug_{}", stem, i);
            let written = augmenter
                .augment_tagged(&resized, &tag, &mut rng)
                .and_then(|img| {
                    imaging::write_jpeg(&img, &job.split_dir.join(format!("{}.jpg", tag)))
                        .map_err(anyhow::Error::from)
                });
            match written {
                Ok(()) => augmented += 1,
                Err(e) => warn!(path = %job.source.display(), variant = i, error = %e, "augmentation failed"),
            }
        }
    }

    JobOutcome::Written { augmented }
}
