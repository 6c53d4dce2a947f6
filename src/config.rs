//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Result, TrackerError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub main: MainConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub habitat: HabitatConfig,
    #[serde(default)]
    pub aprs: AprsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub balloons: Vec<BalloonConfig>,
}

/// Sink switches and the identity reported to the habitat sink
#[derive(Debug, Deserialize, Clone)]
pub struct MainConfig {
    #[serde(default)]
    pub habhub_callsign: String,

    #[serde(default)]
    pub push_habhub: bool,

    #[serde(default)]
    pub push_aprs: bool,
}

/// Poll loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_interval_s")]
    pub interval_s: u64,

    #[serde(default = "default_fetch_count")]
    pub fetch_count: usize,

    #[serde(default = "default_preload_count")]
    pub preload_count: usize,

    #[serde(default = "default_http_timeout_s")]
    pub http_timeout_s: u64,

    #[serde(default = "default_cache_window_min")]
    pub cache_window_min: i64,

    #[serde(default = "default_process_window_min")]
    pub process_window_min: i64,

    #[serde(default = "default_cache_max")]
    pub cache_max: usize,
}

/// Live spot source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub url: String,

    #[serde(default = "default_source_band")]
    pub band: String,
}

/// Habitat sink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HabitatConfig {
    #[serde(default = "default_habitat_url")]
    pub url: String,
}

/// Map sink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AprsConfig {
    #[serde(default)]
    pub url: String,
}

/// Durable state locations
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,

    #[serde(default)]
    pub spot_store: Option<String>,
}

/// Log file location
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_log_file")]
    pub file: String,
}

/// One tracked balloon payload
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BalloonConfig {
    /// Payload name used in the delivery sentence
    pub name: String,

    /// Callsign of the position transmissions
    pub callsign: String,

    /// Band as integer MHz (e.g. 14 for 20 m)
    pub band_mhz: u32,

    /// Telemetry channel (0-19)
    pub channel: u8,

    #[serde(default)]
    pub timeslot: Timeslot,

    /// Identifier passed to the map sink
    pub delivery_id: String,
}

/// Telemetry timeslot selection
///
/// Configured either as an integer slot or the string `"any"`. A spot at
/// minute `m` is in slot `(m % 10) / 2`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "TimeslotSetting")]
pub enum Timeslot {
    #[default]
    Any,
    Slot(u8),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeslotSetting {
    Number(u8),
    Text(String),
}

impl TryFrom<TimeslotSetting> for Timeslot {
    type Error = String;

    fn try_from(setting: TimeslotSetting) -> std::result::Result<Self, Self::Error> {
        match setting {
            TimeslotSetting::Number(slot) => Ok(Timeslot::Slot(slot)),
            TimeslotSetting::Text(text) if text.eq_ignore_ascii_case("any") => Ok(Timeslot::Any),
            TimeslotSetting::Text(text) => Err(format!("timeslot must be 0-8 or \"any\", got {:?}", text)),
        }
    }
}

impl Timeslot {
    /// Whether a spot at `minute` falls in this timeslot
    pub fn matches_minute(self, minute: u32) -> bool {
        match self {
            Timeslot::Any => true,
            Timeslot::Slot(slot) => (minute % 10) / 2 == u32::from(slot),
        }
    }
}

// Default value functions
fn default_interval_s() -> u64 { 90 }
fn default_fetch_count() -> usize { 8000 }
fn default_preload_count() -> usize { 10000 }
fn default_http_timeout_s() -> u64 { 30 }
fn default_cache_window_min() -> i64 { 120 }
fn default_process_window_min() -> i64 { 60 }
fn default_cache_max() -> usize { crate::spot::cache::DEFAULT_CACHE_CAPACITY }

fn default_source_url() -> String { "http://wsprnet.org/olddb".to_string() }
fn default_source_band() -> String { "20".to_string() }

fn default_habitat_url() -> String {
    "http://habitat.habhub.org/habitat/_design/payload_telemetry/_update/add_listener".to_string()
}

fn default_ledger_path() -> String { "./sent.db".to_string() }

fn default_log_dir() -> String { ".".to_string() }
fn default_log_file() -> String { "logging.txt".to_string() }

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_s: default_interval_s(),
            fetch_count: default_fetch_count(),
            preload_count: default_preload_count(),
            http_timeout_s: default_http_timeout_s(),
            cache_window_min: default_cache_window_min(),
            process_window_min: default_process_window_min(),
            cache_max: default_cache_max(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            band: default_source_band(),
        }
    }
}

impl Default for HabitatConfig {
    fn default() -> Self {
        Self { url: default_habitat_url() }
    }
}

impl Default for AprsConfig {
    fn default() -> Self {
        Self { url: String::new() }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            spot_store: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file: default_log_file(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> TrackerError {
    TrackerError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wspr_tracker::config::Config;
    ///
    /// let config = Config::load("balloon.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.main.push_habhub && self.main.habhub_callsign.trim().is_empty() {
            return Err(invalid("habhub_callsign cannot be empty when push_habhub is enabled"));
        }

        if self.main.push_habhub && self.habitat.url.is_empty() {
            return Err(invalid("habitat url cannot be empty when push_habhub is enabled"));
        }

        if self.main.push_aprs && self.aprs.url.is_empty() {
            return Err(invalid("aprs url cannot be empty when push_aprs is enabled"));
        }

        // Validate timing fields
        if self.poll.interval_s == 0 || self.poll.interval_s > 3600 {
            return Err(invalid("interval_s must be between 1 and 3600"));
        }

        if self.poll.http_timeout_s == 0 || self.poll.http_timeout_s > 300 {
            return Err(invalid("http_timeout_s must be between 1 and 300"));
        }

        if self.poll.cache_window_min <= 0 || self.poll.process_window_min <= 0 {
            return Err(invalid("cache_window_min and process_window_min must be greater than 0"));
        }

        if self.poll.cache_window_min < self.poll.process_window_min {
            return Err(invalid("cache_window_min must not be shorter than process_window_min"));
        }

        // Validate sizes
        for (name, value) in [
            ("fetch_count", self.poll.fetch_count),
            ("preload_count", self.poll.preload_count),
            ("cache_max", self.poll.cache_max),
        ] {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        if self.source.url.is_empty() {
            return Err(invalid("source url cannot be empty"));
        }

        if self.storage.ledger_path.is_empty() {
            return Err(invalid("ledger_path cannot be empty"));
        }

        self.validate_balloons()
    }

    fn validate_balloons(&self) -> Result<()> {
        if self.balloons.is_empty() {
            return Err(invalid("at least one balloon must be configured"));
        }

        let mut channels = HashSet::new();
        for balloon in &self.balloons {
            if balloon.name.trim().is_empty() || balloon.callsign.trim().is_empty() {
                return Err(invalid("balloon name and callsign cannot be empty"));
            }

            if balloon.channel > 19 {
                return Err(invalid(format!(
                    "balloon {} channel {} is out of bounds (must be 0-19)",
                    balloon.name, balloon.channel
                )));
            }

            if let Timeslot::Slot(slot) = balloon.timeslot {
                if slot > 8 {
                    return Err(invalid(format!(
                        "balloon {} timeslot {} is out of bounds (must be 0-8 or \"any\")",
                        balloon.name, slot
                    )));
                }
            }

            // Shared (channel, band) pairs make correlation ambiguous
            if !channels.insert((balloon.channel, balloon.band_mhz)) {
                return Err(invalid(format!(
                    "channel {} on {} MHz is used by more than one balloon",
                    balloon.channel, balloon.band_mhz
                )));
            }
        }

        Ok(())
    }
}
