//! Configuration loading and validation for daylightd.
//!
//! Configuration lives in a TOML file, by default
//! `$XDG_CONFIG_HOME/daylightd/daylightd.toml`, or wherever `--config` points.
//!
//! ```toml
//! latitude = 40.0                   # Geographic coordinates
//! longitude = -105.0
//! poll_interval = 60                # Seconds between samples
//! time_offset = 30                  # Minutes trimmed from both ends of daylight
//!
//! [influxdb]
//! address = "http://localhost:8086"
//! token = "..."                     # 2.x token, wins over username/password
//! organization = "home"
//! bucket = "sensors"                # 2.x bucket, wins over database/retention_policy
//! # database = "telegraf"           # 1.x database
//! # retention_policy = "autogen"
//! measurement_prefix = ""           # Prepended to the "daylight" measurement
//! skip_verify_ssl = false
//! flush_interval = 30               # Seconds
//!
//! [influxdb.tags]                   # Static tags attached to every point
//! host = "garage"
//! ```
//!
//! The address and credentials can be overridden through the environment
//! (`DAYLIGHTD_INFLUXDB_ADDRESS`, `DAYLIGHTD_INFLUXDB_TOKEN`,
//! `DAYLIGHTD_INFLUXDB_USERNAME`, `DAYLIGHTD_INFLUXDB_PASSWORD`) so that
//! secrets can stay out of the file.
//!
//! Every problem found here is fatal at startup; nothing in this module runs
//! once the poll loop has started.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::daylight::Location;
use crate::logger::Log;
use crate::sink::{Credentials, WriteTarget, has_line_break};
use crate::solar::validate_coordinates;

/// Connection settings for the InfluxDB sink.
///
/// Empty strings mean "not set", matching how the server treats them.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct InfluxDbConfig {
    pub address: String,
    pub token: String,
    pub username: String,
    pub password: String,
    pub organization: String,
    pub bucket: String,
    pub database: String,
    pub retention_policy: String,
    pub measurement_prefix: String,
    pub skip_verify_ssl: bool,
    pub flush_interval: Option<u64>, // seconds, 0 means default
    pub tags: BTreeMap<String, String>,
}

impl InfluxDbConfig {
    pub fn flush_interval(&self) -> u64 {
        match self.flush_interval {
            Some(0) | None => DEFAULT_FLUSH_INTERVAL,
            Some(secs) => secs,
        }
    }

    /// Measurement name with the configured prefix applied.
    pub fn measurement(&self) -> String {
        format!("{}{}", self.measurement_prefix, MEASUREMENT_NAME)
    }
}

/// Configuration structure for daylightd.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub poll_interval: Option<u64>, // seconds
    pub time_offset: Option<i64>,   // minutes
    #[serde(default)]
    pub influxdb: InfluxDbConfig,
}

impl Config {
    /// Default location of the configuration file.
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE))
    }

    /// Resolve the path to load: the explicit one if given, otherwise the default.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::get_config_path(),
        }
    }

    /// Load configuration from `explicit` or the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit)?;
        Self::load_from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    /// Load, apply environment overrides and defaults, and validate.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found at {}", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Self::apply_env_overrides(&mut config);
        Self::apply_defaults_and_validate_fields(&mut config)?;
        validate_config(&config)?;

        Ok(config)
    }

    fn apply_env_overrides(config: &mut Config) {
        let overrides: [(&str, &mut String); 4] = [
            (ENV_INFLUXDB_ADDRESS, &mut config.influxdb.address),
            (ENV_INFLUXDB_TOKEN, &mut config.influxdb.token),
            (ENV_INFLUXDB_USERNAME, &mut config.influxdb.username),
            (ENV_INFLUXDB_PASSWORD, &mut config.influxdb.password),
        ];
        for (var, field) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *field = value;
                }
            }
        }
    }

    fn apply_defaults_and_validate_fields(config: &mut Config) -> Result<()> {
        let Some(lat) = config.latitude else {
            anyhow::bail!("Missing latitude in configuration");
        };
        let Some(lon) = config.longitude else {
            anyhow::bail!("Missing longitude in configuration");
        };
        validate_coordinates(lat, lon)?;

        if let Some(interval) = config.poll_interval {
            if !(MINIMUM_POLL_INTERVAL..=MAXIMUM_POLL_INTERVAL).contains(&interval) {
                anyhow::bail!(
                    "Poll interval must be between {} and {} seconds",
                    MINIMUM_POLL_INTERVAL,
                    MAXIMUM_POLL_INTERVAL
                );
            }
        } else {
            config.poll_interval = Some(DEFAULT_POLL_INTERVAL);
        }

        if let Some(offset) = config.time_offset {
            if !(MINIMUM_TIME_OFFSET..=MAXIMUM_TIME_OFFSET).contains(&offset) {
                anyhow::bail!(
                    "Time offset must be between {} and {} minutes",
                    MINIMUM_TIME_OFFSET,
                    MAXIMUM_TIME_OFFSET
                );
            }
        } else {
            config.time_offset = Some(DEFAULT_TIME_OFFSET);
        }

        if config.influxdb.flush_interval.is_none_or(|secs| secs == 0) {
            config.influxdb.flush_interval = Some(DEFAULT_FLUSH_INTERVAL);
        }

        Ok(())
    }

    pub fn location(&self) -> Location {
        Location::new(
            self.latitude.unwrap_or_default(),
            self.longitude.unwrap_or_default(),
        )
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL))
    }

    pub fn time_offset(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.time_offset.unwrap_or(DEFAULT_TIME_OFFSET))
    }

    pub fn log_config(&self, path: &Path) {
        Log::log_block_start(&format!("Loaded configuration from {}", path.display()));

        let location = self.location();
        let lat_dir = if location.latitude >= 0.0 { "N" } else { "S" };
        let lon_dir = if location.longitude >= 0.0 { "E" } else { "W" };
        Log::log_indented(&format!(
            "Location: {:.4}°{}, {:.4}°{}",
            location.latitude.abs(),
            lat_dir,
            location.longitude.abs(),
            lon_dir
        ));
        Log::log_indented(&format!(
            "Poll interval: {} seconds",
            self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL)
        ));
        Log::log_indented(&format!(
            "Time offset: {} minutes",
            self.time_offset.unwrap_or(DEFAULT_TIME_OFFSET)
        ));

        let influx = &self.influxdb;
        Log::log_indented(&format!("InfluxDB address: {}", influx.address));
        if let Ok(target) = WriteTarget::from_config(influx) {
            let destination = match &target {
                WriteTarget::V1 {
                    database,
                    retention_policy,
                    ..
                } => format!("{}/{}", database, retention_policy),
                WriteTarget::V2 {
                    organization,
                    bucket,
                    ..
                } if organization.is_empty() => bucket.clone(),
                WriteTarget::V2 {
                    organization,
                    bucket,
                    ..
                } => format!("{} ({})", bucket, organization),
            };
            Log::log_indented(&format!(
                "Write target: {} via {} API",
                destination,
                target.api_version()
            ));
        }
        let auth = match Credentials::from_config(influx) {
            Credentials::None => "none".to_string(),
            Credentials::Token(_) => "token ********".to_string(),
            Credentials::Basic { username, .. } => format!("user {} ********", username),
        };
        Log::log_indented(&format!("Authentication: {}", auth));
        Log::log_indented(&format!("Measurement: {}", influx.measurement()));
        if !influx.tags.is_empty() {
            let tags = influx
                .tags
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            Log::log_indented(&format!("Tags: {}", tags));
        }
        Log::log_indented(&format!("Flush interval: {} seconds", influx.flush_interval()));
        if influx.skip_verify_ssl {
            Log::log_warning("TLS certificate verification is disabled");
        }
    }
}

/// Cross-field validation of the sink settings.
pub fn validate_config(config: &Config) -> Result<()> {
    let influx = &config.influxdb;

    if influx.address.is_empty() {
        anyhow::bail!("Missing InfluxDB address in configuration");
    }
    let url = reqwest::Url::parse(&influx.address)
        .with_context(|| format!("Invalid InfluxDB address: {}", influx.address))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!(
            "InfluxDB address must use http or https (got {})",
            url.scheme()
        );
    }

    WriteTarget::from_config(influx)?;

    if has_line_break(&influx.measurement()) {
        anyhow::bail!("Measurement prefix must not contain line breaks");
    }
    for (key, value) in &influx.tags {
        if has_line_break(key) || has_line_break(value) {
            anyhow::bail!("Tag {:?} must not contain line breaks", key);
        }
    }

    Ok(())
}
