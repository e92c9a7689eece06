use std::path::PathBuf;
use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

use crate::imaging::CanvasSize;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Status server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// PostgreSQL connection string
    #[garde(length(min = 1))]
    pub database_url: String,

    /// Bucket holding the uploaded selfies
    #[garde(length(min = 1))]
    pub storage_bucket: String,

    /// S3-compatible endpoint URL
    #[garde(length(min = 1))]
    pub storage_endpoint: String,

    #[garde(length(min = 1))]
    pub storage_access_key: String,

    #[garde(length(min = 1))]
    pub storage_secret_key: String,

    #[serde(default = "default_storage_region")]
    #[garde(length(min = 1))]
    pub storage_region: String,

    /// Printer used when a job does not name one
    #[serde(default = "default_printer_name")]
    #[garde(length(min = 1))]
    pub printer_name: String,

    /// Spooler program invoked as `<cmd> -d <printer> -o fit-to-page <file>`
    #[serde(default = "default_print_command")]
    #[garde(length(min = 1))]
    pub print_command: String,

    #[serde(default = "default_canvas_side")]
    #[garde(range(min = 64, max = 4096))]
    pub canvas_width: u32,

    #[serde(default = "default_canvas_side")]
    #[garde(range(min = 64, max = 4096))]
    pub canvas_height: u32,

    /// Where rendered stickers are written before printing
    #[serde(default = "default_output_dir")]
    #[garde(skip)]
    pub output_dir: PathBuf,

    /// Caption used when a job carries no customer name
    #[serde(default = "default_booth_caption")]
    #[garde(length(max = 64))]
    pub booth_caption: String,

    #[serde(default = "default_worker_concurrency")]
    #[garde(range(min = 1, max = 64))]
    pub worker_concurrency: usize,

    #[serde(default = "default_queue_capacity")]
    #[garde(range(min = 1, max = 10_000))]
    pub queue_capacity: usize,

    #[serde(default = "default_acquisition_timeout_secs")]
    #[garde(range(min = 1))]
    pub acquisition_timeout_secs: u64,

    #[serde(default = "default_dispatch_timeout_secs")]
    #[garde(range(min = 1))]
    pub dispatch_timeout_secs: u64,

    /// A job left in `processing` longer than this is considered abandoned
    #[serde(default = "default_claim_timeout_secs")]
    #[garde(range(min = 1))]
    pub claim_timeout_secs: u64,

    #[serde(default = "default_reaper_interval_secs")]
    #[garde(range(min = 1))]
    pub reaper_interval_secs: u64,

    #[serde(default = "default_max_attempts")]
    #[garde(range(min = 1, max = 100))]
    pub max_attempts: i32,

    /// Postgres NOTIFY channel carrying inserted rows
    #[serde(default = "default_feed_channel")]
    #[garde(length(min = 1, max = 63))]
    pub feed_channel: String,

    /// Pending jobs picked up per backlog sweep
    #[serde(default = "default_backlog_limit")]
    #[garde(range(min = 1, max = 10_000))]
    pub backlog_limit: i64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_storage_region() -> String {
    "auto".to_string()
}

fn default_printer_name() -> String {
    "Brother_QL_800".to_string()
}

fn default_print_command() -> String {
    "lp".to_string()
}

fn default_canvas_side() -> u32 {
    384
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("sticker-prints")
}

fn default_booth_caption() -> String {
    "Sticker Booth".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

fn default_acquisition_timeout_secs() -> u64 {
    30
}

fn default_dispatch_timeout_secs() -> u64 {
    60
}

fn default_claim_timeout_secs() -> u64 {
    300
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_max_attempts() -> i32 {
    3
}

fn default_feed_channel() -> String {
    "print_queue_insert".to_string()
}

fn default_backlog_limit() -> i64 {
    100
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),

    #[error(
        "CLAIM_TIMEOUT_SECS ({claim}) must exceed ACQUISITION_TIMEOUT_SECS + DISPATCH_TIMEOUT_SECS ({minimum})"
    )]
    ClaimTimeout { claim: u64, minimum: u64 },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    /// Build from explicit key/value pairs (upper-case env names).
    pub fn from_iter<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: AppConfig = envy::from_iter(vars)?;
        config.validate()?;

        let minimum = config.acquisition_timeout_secs + config.dispatch_timeout_secs;
        if config.claim_timeout_secs <= minimum {
            return Err(ConfigError::ClaimTimeout {
                claim: config.claim_timeout_secs,
                minimum,
            });
        }
        Ok(config)
    }

    pub fn canvas(&self) -> CanvasSize {
        CanvasSize::new(self.canvas_width, self.canvas_height)
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_secs(self.acquisition_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}
