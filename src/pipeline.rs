//! Ordered chain of image transforms with optional per-step snapshots.

use anyhow::{Context, Result};
use image::RgbImage;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::Arc;

/// Where intermediate images are written, one subdirectory per step.
#[derive(Clone, Debug)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    /// Use `root` for snapshots. It is created if missing and must be empty
    /// otherwise, so runs never mix with older output.
    pub fn prepare(root: PathBuf) -> Result<Self> {
        if root.exists() {
            let mut entries = std::fs::read_dir(&root)
                .with_context(|| format!("Failed to read snapshot directory {:?}", root))?;
            if entries.next().is_some() {
                anyhow::bail!("Snapshot directory is not empty: {}", root.display());
            }
        } else {
            std::fs::create_dir_all(&root)
                .with_context(|| format!("Failed to create snapshot directory {:?}", root))?;
        }
        Ok(Self { root })
    }

    fn save(&self, stage: &str, tag: &str, image: &RgbImage) -> Result<PathBuf> {
        let dir = self.root.join(stage);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.png", tag));
        image
            .save(&path)
            .with_context(|| format!("Failed to save snapshot {:?}", path))?;
        Ok(path)
    }
}

/// Settings shared by every step of one pipeline.
#[derive(Clone, Debug, Default)]
pub struct StepContext {
    pub verbose: bool,
    pub snapshots: Option<SnapshotDir>,
}

/// One transform in an image pipeline.
///
/// Steps may draw their parameters from `rng`; a step that needs no randomness
/// simply ignores it.
pub trait ImageStep: Send + Sync {
    fn process(&self, image: RgbImage, rng: &mut dyn RngCore, context: &StepContext) -> Result<RgbImage>;

    /// Short name, also used for the snapshot directory.
    fn name(&self) -> &str;
}

#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn ImageStep>>,
    context: StepContext,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Snapshot the input and the output of every step under `dir`.
    pub fn with_debug(mut self, dir: PathBuf) -> Result<Self> {
        self.context.snapshots = Some(SnapshotDir::prepare(dir)?);
        Ok(self)
    }

    pub fn add_step(mut self, step: Arc<dyn ImageStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order on `input`.
    ///
    /// `tag` names the snapshot files of this run (e.g. "paw_aug_2"), so
    /// several runs can share one snapshot directory.
    pub fn run(&self, input: RgbImage, tag: &str, rng: &mut dyn RngCore) -> Result<RgbImage> {
        self.snapshot("00_input", tag, &input)?;

        let mut image = input;
        for (idx, step) in self.steps.iter().enumerate() {
            if self.context.verbose {
                tracing::debug!(step = step.name(), tag, "running step");
            }
            image = step
                .process(image, rng, &self.context)
                .with_context(|| format!("step '{}' failed", step.name()))?;

            let stage = format!("{:02}_{}", idx + 1, step.name().to_lowercase().replace(' ', "_"));
            self.snapshot(&stage, tag, &image)?;
        }
        Ok(image)
    }

    fn snapshot(&self, stage: &str, tag: &str, image: &RgbImage) -> Result<()> {
        if let Some(snapshots) = &self.context.snapshots {
            let path = snapshots.save(stage, tag, image)?;
            if self.context.verbose {
                tracing::debug!(path = %path.display(), "snapshot saved");
            }
        }
        Ok(())
    }
}
