//! Session configuration.
//!
//! Configuration is read once, at session start, from a TOML file and
//! optional command-line overrides. The validated [`SessionConfig`] is then
//! passed by value into the controller and the delivery router; no component
//! consults ambient settings while a session is running.

use crate::capture::CaptureConfig;
use crate::collection::CollectorConfig;
use crate::walk::WalkConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How completed blocks leave the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Stream each block to a relay, addressed to a recipient key.
    Network,
    /// Write each block to files and hand them to an export sink.
    #[default]
    Local,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Network => f.write_str("network"),
            DeliveryMode::Local => f.write_str("local"),
        }
    }
}

impl std::str::FromStr for DeliveryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "network" => Ok(DeliveryMode::Network),
            "local" => Ok(DeliveryMode::Local),
            other => Err(ConfigError::InvalidDeliveryMode(other.to_string())),
        }
    }
}

/// Number of blocks a session generates before terminating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTarget {
    /// Keep generating until the session is closed.
    Unlimited,
    /// Terminate after this many blocks.
    Bounded(NonZeroU32),
}

impl BlockTarget {
    /// Builds a target from the two settings the configuration file carries.
    pub fn from_settings(unlimited: bool, amount: u32) -> Result<Self, ConfigError> {
        if unlimited {
            return Ok(BlockTarget::Unlimited);
        }
        NonZeroU32::new(amount)
            .map(BlockTarget::Bounded)
            .ok_or(ConfigError::InvalidBlockTarget)
    }

    /// Returns true if `block_index` is the final block of a bounded session.
    pub fn is_last(&self, block_index: u32) -> bool {
        match self {
            BlockTarget::Unlimited => false,
            BlockTarget::Bounded(target) => block_index == target.get(),
        }
    }

    /// Returns true if another block may still be drained after `block_index`.
    pub fn allows_after(&self, block_index: u32) -> bool {
        match self {
            BlockTarget::Unlimited => true,
            BlockTarget::Bounded(target) => block_index < target.get(),
        }
    }

    /// Fraction of the session completed once `block_index` has been handed off.
    ///
    /// Unlimited sessions have no progress fraction.
    pub fn progress(&self, block_index: u32) -> Option<f64> {
        match self {
            BlockTarget::Unlimited => None,
            BlockTarget::Bounded(target) => {
                Some((f64::from(block_index) / f64::from(target.get())).clamp(0.0, 1.0))
            }
        }
    }
}

/// Validated, immutable configuration for one generation session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delivery strategy, fixed for the lifetime of the session.
    pub delivery_mode: DeliveryMode,
    /// Number of blocks to produce.
    pub block_target: BlockTarget,
    /// Also export the `.csv` histogram helper file in local mode.
    pub export_auxiliary_file: bool,
    /// Raise the chi-square warning when the threshold is exceeded.
    pub chi_warning_enabled: bool,
    /// Chi-square value above which the warning is raised.
    pub chi_warning_threshold: f64,
    /// Relay recipient; required in network mode.
    pub recipient_key: Option<String>,
    /// Prefix for exported artifact names.
    pub label_prefix: String,
    /// Random-walk audit parameters.
    pub walk: WalkConfig,
    /// Poll cadence.
    pub poll: PollConfig,
    /// Directory where local-mode files are staged before hand-off.
    pub staging_dir: PathBuf,
}

impl SessionConfig {
    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery_mode == DeliveryMode::Network {
            match self.recipient_key.as_deref() {
                Some(key) if !key.trim().is_empty() => {}
                _ => return Err(ConfigError::MissingRecipientKey),
            }
        }
        if !self.chi_warning_threshold.is_finite() {
            return Err(ConfigError::InvalidChiThreshold);
        }
        self.walk.validate()?;
        self.poll.validate()?;
        Ok(())
    }

    /// Returns the recipient key, failing if none is configured.
    pub fn require_recipient(&self) -> Result<&str, ConfigError> {
        self.recipient_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingRecipientKey)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Local,
            block_target: BlockTarget::Unlimited,
            export_auxiliary_file: false,
            chi_warning_enabled: false,
            chi_warning_threshold: 310.0,
            recipient_key: None,
            label_prefix: DEFAULT_LABEL_PREFIX.to_string(),
            walk: WalkConfig::default(),
            poll: PollConfig::default(),
            staging_dir: default_staging_dir(),
        }
    }
}

/// Per-application directory under the system temp dir.
pub fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("optical-entropy-blocks")
}

/// Default prefix for exported artifact names.
pub const DEFAULT_LABEL_PREFIX: &str = "OE_block";

/// Poll cadence for statistics and the walk refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Statistics poll interval in milliseconds.
    pub stats_interval_ms: u64,
    /// Walk visualisation refresh interval in milliseconds.
    pub walk_interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: 200,
            walk_interval_ms: 500,
        }
    }
}

impl PollConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn walk_interval(&self) -> Duration {
        Duration::from_millis(self.walk_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stats_interval_ms == 0 || self.walk_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        Ok(())
    }
}

/// `[session]` section as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub delivery_mode: DeliveryMode,
    pub block_amount_unlimited: bool,
    pub block_amount: u32,
    pub export_auxiliary_file: bool,
    pub chi_warning_enabled: bool,
    pub chi_warning_threshold: f64,
    pub recipient_key: Option<String>,
    pub label_prefix: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            delivery_mode: defaults.delivery_mode,
            block_amount_unlimited: false,
            block_amount: 3,
            export_auxiliary_file: defaults.export_auxiliary_file,
            chi_warning_enabled: defaults.chi_warning_enabled,
            chi_warning_threshold: defaults.chi_warning_threshold,
            recipient_key: None,
            label_prefix: defaults.label_prefix,
        }
    }
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Where block files are written before hand-off.
    pub staging_dir: PathBuf,
    /// Where the directory export sink places handed-off files.
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            output_dir: PathBuf::from("blocks"),
        }
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay address as `host:port`.
    pub address: String,
    /// Connect and read timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// `[metrics]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Scrape port; 0 leaves the server off.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

/// Every TOML section the binary reads. Missing sections take defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub walk: WalkConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FileConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.capture.validate()?;
        config.collector.validate()?;
        Ok(config)
    }

    /// Builds and validates the session configuration.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let section = &self.session;
        let config = SessionConfig {
            delivery_mode: section.delivery_mode,
            block_target: BlockTarget::from_settings(
                section.block_amount_unlimited,
                section.block_amount,
            )?,
            export_auxiliary_file: section.export_auxiliary_file,
            chi_warning_enabled: section.chi_warning_enabled,
            chi_warning_threshold: section.chi_warning_threshold,
            recipient_key: section.recipient_key.clone(),
            label_prefix: section.label_prefix.clone(),
            walk: self.walk.clone(),
            poll: self.poll.clone(),
            staging_dir: self.export.staging_dir.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("capture width and height must be non-zero")]
    InvalidDimensions,
    #[error("locked exposure must be at least 1us")]
    InvalidExposure,
    #[error("capture rate must be within 1..=120 fps")]
    InvalidFrameRate,
    #[error("network delivery requires a recipient key")]
    MissingRecipientKey,
    #[error("bounded sessions need a block amount of at least 1")]
    InvalidBlockTarget,
    #[error("unknown delivery mode: {0}")]
    InvalidDeliveryMode(String),
    #[error("chi-square warning threshold must be finite")]
    InvalidChiThreshold,
    #[error("walk bound and step must be positive and step must not exceed bound")]
    InvalidWalk,
    #[error("poll intervals must be non-zero")]
    InvalidPollInterval,
    #[error("block size must be at least 1 byte")]
    InvalidBlockSize,
    #[error("extractor buffer limit must hold at least one block")]
    InvalidBufferLimit,
    #[error("cannot read config {0}")]
    Read(String),
    #[error("malformed config: {0}")]
    Parse(String),
}
