//! Configuration supplied by the environment (or the matching CLI flags).

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const SOURCE_BUCKET: &str = "Dirty_Footprint";
pub const DESTINATION_BUCKET: &str = "Empreintes";
pub const USER_BUCKET: &str = "UserImg";

/// Connection settings for the hosted backend.
#[derive(Debug, Clone, Args)]
pub struct StoreConfig {
    /// Backend project URL
    #[arg(long = "store-url", env = "SUPABASE_URL")]
    pub base_url: String,

    /// Backend API key
    #[arg(long = "store-key", env = "SUPABASE_KEY", hide_env_values = true)]
    pub api_key: String,
}

impl StoreConfig {
    /// Read the connection settings straight from the environment, for
    /// commands where the hosted backend is optional.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("SUPABASE_URL").context("SUPABASE_URL is not set")?;
        let api_key = std::env::var("SUPABASE_KEY").context("SUPABASE_KEY is not set")?;
        Ok(Self { base_url, api_key })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AppMode {
    #[default]
    Development,
    Production,
}

impl AppMode {
    pub fn is_production(&self) -> bool {
        matches!(self, AppMode::Production)
    }
}

/// Settings for the upload/classification server.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5000")]
    pub listen: String,

    /// Session signing secret
    #[arg(long, env = "WILDAWARE_SECRET_KEY", hide_env_values = true, default_value = "")]
    pub secret_key: String,

    #[arg(long, env = "WILDAWARE_ENV", value_enum, default_value_t = AppMode::Development)]
    pub mode: AppMode,

    /// Bucket receiving scanned user images
    #[arg(long, default_value = USER_BUCKET)]
    pub user_bucket: String,
}

/// Settings for the log-tailing metrics exporter.
#[derive(Debug, Clone, Args)]
pub struct ExporterConfig {
    /// Base URL of the application whose /health is polled
    #[arg(long, env = "WILDAWARE_APP_URL", default_value = "http://wildaware-app:5000")]
    pub app_url: String,

    /// Application log file to tail
    #[arg(long, default_value = "logs/app.log")]
    pub app_log: PathBuf,

    /// Address serving /metrics
    #[arg(long = "metrics-listen", default_value = "0.0.0.0:9090")]
    pub listen: String,

    /// Seconds between scan cycles
    #[arg(long, default_value_t = 30)]
    pub interval_secs: u64,

    /// Seconds to wait after a failed cycle
    #[arg(long, default_value_t = 60)]
    pub error_backoff_secs: u64,
}

impl ExporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mode.is_production() && self.secret_key.trim().is_empty() {
            anyhow::bail!("WILDAWARE_SECRET_KEY must be set in production mode");
        }
        Ok(())
    }
}
