//! Runtime configuration.
//!
//! Loaded from a TOML file; every field has a default, and a few fields can
//! be overridden from `PROOFNEST_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::anchor::blocks::DEFAULT_ESPLORA_URL;
use crate::anchor::record::AnchorMethod;
use crate::error::{LedgerError, Result};

pub const ENV_DATA_DIR: &str = "PROOFNEST_DATA_DIR";
pub const ENV_BATCH_SIZE: &str = "PROOFNEST_BATCH_SIZE";
pub const ENV_ANCHOR_INTERVAL: &str = "PROOFNEST_ANCHOR_INTERVAL_SECS";
pub const ENV_CALENDAR_URLS: &str = "PROOFNEST_CALENDAR_URLS";

/// Public OpenTimestamps calendars.
pub const DEFAULT_CALENDARS: &[&str] = &[
    "https://alice.btc.calendar.opentimestamps.org",
    "https://bob.btc.calendar.opentimestamps.org",
    "https://finney.calendar.eternitywall.com",
];

/// Default data directory (`$HOME/.proofnest`).
pub fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".proofnest")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofnestConfig {
    #[serde(default)]
    pub anchor: AnchorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Anchoring batch and retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    /// Records per regular batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on records in one batch, including catch-up batches.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Scheduler period.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_calendar_urls")]
    pub calendar_urls: Vec<String>,

    /// Submission/status attempts per call, including the first.
    #[serde(default = "default_submit_attempts")]
    pub submit_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Polls that may report PENDING before the anchor is marked FAILED.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub method: AnchorMethod,

    /// Esplora API used to check Bitcoin attestations against block headers.
    #[serde(default = "default_block_explorer_url")]
    pub block_explorer_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_batch_size() -> usize {
    16
}

fn default_max_batch_size() -> usize {
    256
}

fn default_interval_secs() -> u64 {
    600
}

fn default_calendar_urls() -> Vec<String> {
    DEFAULT_CALENDARS.iter().map(|s| s.to_string()).collect()
}

fn default_submit_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_polls() -> u32 {
    48
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_block_explorer_url() -> String {
    DEFAULT_ESPLORA_URL.to_string()
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            interval_secs: default_interval_secs(),
            calendar_urls: default_calendar_urls(),
            submit_attempts: default_submit_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_polls: default_max_polls(),
            request_timeout_secs: default_request_timeout_secs(),
            method: AnchorMethod::default(),
            block_explorer_url: default_block_explorer_url(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl ProofnestConfig {
    /// Load from a TOML file, apply environment overrides, and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `PROOFNEST_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup(ENV_BATCH_SIZE) {
            self.anchor.batch_size = size
                .trim()
                .parse()
                .map_err(|_| LedgerError::Config(format!("{ENV_BATCH_SIZE}={size} is not a number")))?;
        }
        if let Some(secs) = lookup(ENV_ANCHOR_INTERVAL) {
            self.anchor.interval_secs = secs.trim().parse().map_err(|_| {
                LedgerError::Config(format!("{ENV_ANCHOR_INTERVAL}={secs} is not a number"))
            })?;
        }
        if let Some(urls) = lookup(ENV_CALENDAR_URLS) {
            self.anchor.calendar_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.anchor.validate()
    }

    pub fn records_path(&self) -> PathBuf {
        self.storage.data_dir.join("records.jsonl")
    }

    pub fn key_path(&self) -> PathBuf {
        self.storage.data_dir.join("agent.pnk")
    }

    pub fn config_path(&self) -> PathBuf {
        self.storage.data_dir.join("config.toml")
    }
}

impl AnchorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LedgerError::Config("anchor.batch_size must be at least 1".into()));
        }
        if self.batch_size > self.max_batch_size {
            return Err(LedgerError::Config(format!(
                "anchor.batch_size {} exceeds anchor.max_batch_size {}",
                self.batch_size, self.max_batch_size
            )));
        }
        if self.method == AnchorMethod::OpenTimestamps && self.calendar_urls.is_empty() {
            return Err(LedgerError::Config(
                "anchor.calendar_urls must not be empty for opentimestamps".into(),
            ));
        }
        if self.submit_attempts == 0 {
            return Err(LedgerError::Config("anchor.submit_attempts must be at least 1".into()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(LedgerError::Config(format!(
                "anchor.initial_backoff_ms {} exceeds anchor.max_backoff_ms {}",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        if self.max_polls == 0 {
            return Err(LedgerError::Config("anchor.max_polls must be at least 1".into()));
        }
        Ok(())
    }
}
