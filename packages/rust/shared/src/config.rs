//! Application configuration for the outreach pipeline.
//!
//! User config lives at `~/.outreach/outreach.toml`.
//! CLI flags override config file values, which override defaults.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OutreachError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "outreach.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".outreach";

// ---------------------------------------------------------------------------
// Config structs (matching outreach.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sender identity used on outgoing mail.
    #[serde(default)]
    pub sender: SenderConfig,

    /// Batch dispatch pacing.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Follow-up detection.
    #[serde(default)]
    pub follow_up: FollowUpConfig,

    /// Reply matching.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Persisted documents.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[sender]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Display name passed to the drafting service.
    #[serde(default)]
    pub name: String,

    /// From address for outgoing mail.
    #[serde(default)]
    pub address: String,
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum sends per batch run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Lower bound of the random pause between sends.
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,

    /// Upper bound of the random pause between sends.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}
fn default_min_delay() -> u64 {
    30
}
fn default_max_delay() -> u64 {
    90
}

/// `[follow_up]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpConfig {
    /// Whole days after the initial email before a follow-up is due.
    #[serde(default = "default_threshold_days")]
    pub threshold_days: i64,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            threshold_days: default_threshold_days(),
        }
    }
}

fn default_threshold_days() -> i64 {
    14
}

/// `[reconcile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Share of a draft subject's significant words that must appear in an
    /// inbound subject for the two to match.
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: default_overlap_threshold(),
        }
    }
}

fn default_overlap_threshold() -> f64 {
    0.5
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `leads.json`, `compliance.json` and `scheduled_sends.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.outreach/data".into()
}

impl StorageConfig {
    /// The data directory with a leading `~` expanded.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    OutreachError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.data_dir)),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch policy (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime batch pacing, derived from the `[dispatch]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPolicy {
    /// Maximum sends attempted in one batch.
    pub batch_size: usize,
    /// Uniform range the inter-send pause is drawn from.
    pub delay_range: RangeInclusive<Duration>,
}

impl DispatchPolicy {
    /// A policy without pauses between sends.
    pub fn immediate(batch_size: usize) -> Self {
        Self {
            batch_size,
            delay_range: Duration::ZERO..=Duration::ZERO,
        }
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DispatchPolicy {
    fn from(config: &AppConfig) -> Self {
        let min = config.dispatch.min_delay_secs;
        let max = config.dispatch.max_delay_secs.max(min);
        Self {
            batch_size: config.dispatch.batch_size,
            delay_range: Duration::from_secs(min)..=Duration::from_secs(max),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.outreach/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| OutreachError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.outreach/outreach.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| OutreachError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        OutreachError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| OutreachError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OutreachError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| OutreachError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that a sender address is configured before anything is sent.
pub fn validate_sender(sender: &SenderConfig) -> Result<()> {
    let address = sender.address.trim();
    if address.is_empty() || !address.contains('@') {
        return Err(OutreachError::config(
            "sender address not configured. Set [sender] address in outreach.toml",
        ));
    }
    Ok(())
}
