pub mod pool;
pub mod prepare;

use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::imaging::is_image_file;
use crate::models::Split;

pub use pool::ExecutionMode;
pub use prepare::{PrepareOptions, PrepareReport, prepare_dataset};

const RATIO_TOLERANCE: f64 = 1e-9;

/// Train / validation / test proportions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
    pub test: f64,
}

impl SplitRatios {
    pub fn new(train: f64, validation: f64, test: f64) -> Result<Self> {
        let ratios = Self {
            train,
            validation,
            test,
        };
        ratios.validate()?;
        Ok(ratios)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, r) in [
            ("train", self.train),
            ("validation", self.validation),
            ("test", self.test),
        ] {
            if !(0.0..=1.0).contains(&r) {
                anyhow::bail!("{} ratio must be within [0, 1], got {}", name, r);
            }
        }
        let sum = self.train + self.validation + self.test;
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            anyhow::bail!("split ratios must sum to 1.0, got {}", sum);
        }
        Ok(())
    }

    /// Sizes of the train and validation slices for `n` items; the test slice
    /// takes whatever remains.
    pub fn cut_points(&self, n: usize) -> (usize, usize) {
        let train = ((self.train * n as f64) + RATIO_TOLERANCE).floor() as usize;
        let validation = ((self.validation * n as f64) + RATIO_TOLERANCE).floor() as usize;
        let train = train.min(n);
        let validation = validation.min(n - train);
        (train, validation)
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            validation: 0.15,
            test: 0.15,
        }
    }
}

impl std::str::FromStr for SplitRatios {
    type Err = anyhow::Error;

    /// Parses `"0.7,0.15,0.15"`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("invalid split ratios '{}'", s))?;
        match parts.as_slice() {
            [train, validation, test] => SplitRatios::new(*train, *validation, *test),
            _ => anyhow::bail!("expected three comma-separated ratios, got '{}'", s),
        }
    }
}

/// Split membership of one class's images.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitAssignment {
    pub train: Vec<PathBuf>,
    pub validation: Vec<PathBuf>,
    pub test: Vec<PathBuf>,
}

impl SplitAssignment {
    pub fn get(&self, split: Split) -> &[PathBuf] {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Split, &PathBuf)> {
        Split::ALL
            .into_iter()
            .flat_map(move |split| self.get(split).iter().map(move |p| (split, p)))
    }
}

/// Shuffle `images` and slice them by `ratios` (floor on the first two cuts).
pub fn assign_splits<R: Rng + ?Sized>(mut images: Vec<PathBuf>, ratios: &SplitRatios, rng: &mut R) -> SplitAssignment {
    images.shuffle(rng);
    let (train_len, validation_len) = ratios.cut_points(images.len());

    let test = images.split_off(train_len + validation_len);
    let validation = images.split_off(train_len);
    SplitAssignment {
        train: images,
        validation,
        test,
    }
}

/// Eligible images directly inside `class_dir`, sorted by name.
pub fn list_class_images(class_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(class_dir)
        .with_context(|| format!("Failed to read class directory {:?}", class_dir))?
    {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Class label → class directory for every immediate subdirectory of `root`.
/// Plain files at this level are ignored.
pub fn list_classes(root: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut classes = BTreeMap::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("Failed to read dataset root {:?}", root))?
    {
        let entry = entry?;
        // Follows symlinks so linked class folders count.
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        classes.insert(name, entry.path());
    }
    Ok(classes)
}

/// Split every class under `root`.
pub fn split_dataset<R: Rng + ?Sized>(
    root: &Path,
    ratios: &SplitRatios,
    rng: &mut R,
) -> Result<BTreeMap<String, SplitAssignment>> {
    ratios.validate()?;
    let mut out = BTreeMap::new();
    for (class_name, class_dir) in list_classes(root)? {
        let images = list_class_images(&class_dir)?;
        out.insert(class_name, assign_splits(images, ratios, rng));
    }
    Ok(out)
}
