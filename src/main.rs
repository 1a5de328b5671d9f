use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use wildaware::assets;
use wildaware::classifier;
use wildaware::config::{DESTINATION_BUCKET, ExporterConfig, SOURCE_BUCKET, ServerConfig, StoreConfig};
use wildaware::dataset::{ExecutionMode, PrepareOptions, SplitRatios, prepare_dataset};
use wildaware::exporter;
use wildaware::imaging::{self, Augmenter};
use wildaware::logging;
use wildaware::server::{self, AppState};
use wildaware::store::{AnimalCatalog, LocalObjectStore, ObjectStore, SqliteCatalog, SupabaseClient};

#[derive(Parser)]
#[command(name = "wildaware")]
#[command(about = "Footprint scanning server and dataset tooling")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a class-per-folder image tree into train/validation/test
    Prepare {
        #[arg(value_name = "INPUT_DIR")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT_DIR")]
        output: PathBuf,

        /// Train,validation,test ratios
        #[arg(long, default_value = "0.7,0.15,0.15")]
        ratios: SplitRatios,

        /// Output width and height in pixels
        #[arg(long, default_value_t = imaging::TARGET_SIZE)]
        size: u32,

        /// Skip augmented variants for the train split
        #[arg(long)]
        no_augment: bool,

        /// Augmented variants per training image
        #[arg(long, default_value_t = 5)]
        augment_count: usize,

        /// Worker threads (1 = sequential)
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Seed for the split shuffle
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Write augmented variants of a single image
    Augment {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[arg(value_name = "OUTPUT_DIR")]
        output: PathBuf,

        #[arg(long, default_value_t = 5)]
        count: usize,

        /// Save every intermediate step to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Resize one image to a square RGB JPEG
    Normalize {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[arg(long, default_value_t = imaging::TARGET_SIZE)]
        size: u32,
    },

    /// Classify one image and print the result as JSON
    Classify {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Local catalog database instead of the hosted backend
        #[arg(long, value_name = "FILE")]
        catalog_db: Option<PathBuf>,
    },

    /// Upload an image tree to a bucket, keyed by relative path
    Upload {
        #[arg(value_name = "DIR")]
        source: PathBuf,

        #[arg(long, default_value = DESTINATION_BUCKET)]
        bucket: String,

        #[command(flatten)]
        store: StoreConfig,
    },

    /// Record the public URL of every footprint image in the footprint table
    LinkUrls {
        #[arg(long, default_value = DESTINATION_BUCKET)]
        bucket: String,

        /// Take folder names and files from a local tree instead of listing the bucket
        #[arg(long, value_name = "DIR")]
        from_dir: Option<PathBuf>,

        #[command(flatten)]
        store: StoreConfig,
    },

    /// Normalize every image of the source bucket into the destination bucket
    Etl {
        #[arg(long, default_value = SOURCE_BUCKET)]
        source_bucket: String,

        #[arg(long, default_value = DESTINATION_BUCKET)]
        destination_bucket: String,

        #[arg(long, default_value_t = imaging::TARGET_SIZE)]
        size: u32,

        #[command(flatten)]
        store: StoreConfig,
    },

    /// Run the upload/classification server
    Serve {
        #[command(flatten)]
        server: ServerConfig,

        /// Local catalog database (requires --bucket-dir)
        #[arg(long, value_name = "FILE", requires = "bucket_dir")]
        catalog_db: Option<PathBuf>,

        /// Directory standing in for the object store (requires --catalog-db)
        #[arg(long, value_name = "DIR", requires = "catalog_db")]
        bucket_dir: Option<PathBuf>,
    },

    /// Tail the application log and serve Prometheus metrics
    Exporter {
        #[command(flatten)]
        config: ExporterConfig,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

async fn serve_with<C: AnimalCatalog, O: ObjectStore>(config: &ServerConfig, catalog: C, objects: O) -> Result<()> {
    let state = AppState::new(Arc::new(catalog), Arc::new(objects), config.user_bucket.clone());
    server::serve(config, state).await
}

async fn classify_with<C: AnimalCatalog>(catalog: &C, image: &Path) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read {:?}", image))?;
    let result = classifier::classify(catalog, &bytes).await;
    print_json(&result)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Command::Prepare {
            input,
            output,
            ratios,
            size,
            no_augment,
            augment_count,
            workers,
            seed,
        } => {
            let options = PrepareOptions {
                image_size: (size, size),
                ratios,
                augment: !no_augment,
                augmented_per_image: augment_count,
                mode: ExecutionMode::from_workers(workers),
            };
            let mut rng = make_rng(seed);
            let report = tokio::task::spawn_blocking(move || prepare_dataset(&input, &output, &options, &mut rng))
                .await??;
            info!(
                written = report.total_written(),
                skipped = report.total_skipped(),
                "dataset prepared"
            );
            print_json(&report)?;
        }

        Command::Augment {
            image,
            output,
            count,
            debug_out,
            seed,
        } => {
            let mut augmenter = Augmenter::new().with_verbose(cli.verbose);
            if let Some(dir) = debug_out {
                augmenter = augmenter.with_debug(dir)?;
            }
            let source = imaging::open(&image)?.to_rgb8();
            let stem = image
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());

            let mut rng = make_rng(seed);
            for (i, variant) in augmenter.variants(&source, count, &mut rng)?.iter().enumerate() {
                let dest = output.join(format!("{}_aug_{}.jpg", stem, i));
                imaging::write_jpeg(variant, &dest)?;
                info!(path = %dest.display(), "variant written");
            }
        }

        Command::Normalize { image, output, size } => {
            imaging::normalize_file(&image, &output, size, size)?;
            info!(path = %output.display(), size, "image normalized");
        }

        Command::Classify { image, catalog_db } => match catalog_db {
            Some(db) => classify_with(&SqliteCatalog::open(db).await?, &image).await?,
            None => classify_with(&SupabaseClient::new(&StoreConfig::from_env()?)?, &image).await?,
        },

        Command::Upload { source, bucket, store } => {
            let client = SupabaseClient::new(&store)?;
            assets::check_bucket_access(&client, &bucket).await?;
            let stats = assets::upload_tree(&client, &bucket, &source).await?;
            print_json(&stats)?;
        }

        Command::LinkUrls { bucket, from_dir, store } => {
            let client = SupabaseClient::new(&store)?;
            let structure = match from_dir {
                Some(dir) => assets::local_structure(&dir)?,
                None => assets::bucket_structure(&client, &bucket).await?,
            };
            let stats = assets::link_footprints(&client, &client, &client, &bucket, &structure).await;
            print_json(&stats)?;
        }

        Command::Etl {
            source_bucket,
            destination_bucket,
            size,
            store,
        } => {
            let client = SupabaseClient::new(&store)?;
            assets::check_bucket_access(&client, &source_bucket).await?;
            assets::check_bucket_access(&client, &destination_bucket).await?;
            let stats = assets::run_remote_etl(&client, &source_bucket, &destination_bucket, size).await;
            print_json(&stats)?;
        }

        Command::Serve {
            server,
            catalog_db,
            bucket_dir,
        } => match (catalog_db, bucket_dir) {
            (Some(db), Some(dir)) => {
                info!(catalog = %db.display(), buckets = %dir.display(), "using local backends");
                serve_with(&server, SqliteCatalog::open(db).await?, LocalObjectStore::new(dir)).await?;
            }
            _ => {
                let client = SupabaseClient::new(&StoreConfig::from_env()?)?;
                serve_with(&server, client.clone(), client).await?;
            }
        },

        Command::Exporter { config } => exporter::run(config).await?,
    }

    Ok(())
}
