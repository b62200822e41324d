//! Application constants and default values for daylightd.
//!
//! This module contains the configuration defaults, validation limits,
//! and operational constants used throughout the application.

// ═══ Application Configuration Defaults ═══
// These values are used when config options are not specified by the user

pub const DEFAULT_POLL_INTERVAL: u64 = 60; // seconds between daylight samples
pub const DEFAULT_TIME_OFFSET: i64 = 0; // minutes trimmed from both ends of daylight
pub const DEFAULT_FLUSH_INTERVAL: u64 = 30; // seconds between sink flushes
pub const DEFAULT_CONFIG_DIR: &str = "daylightd";
pub const DEFAULT_CONFIG_FILE: &str = "daylightd.toml";

// ═══ Measurement Layout ═══
// The single series written to the time-series database

pub const MEASUREMENT_NAME: &str = "daylight";
pub const FIELD_NAME: &str = "daylight";

// ═══ Environment Overrides ═══
// Credentials can be kept out of the config file

pub const ENV_INFLUXDB_ADDRESS: &str = "DAYLIGHTD_INFLUXDB_ADDRESS";
pub const ENV_INFLUXDB_TOKEN: &str = "DAYLIGHTD_INFLUXDB_TOKEN";
pub const ENV_INFLUXDB_USERNAME: &str = "DAYLIGHTD_INFLUXDB_USERNAME";
pub const ENV_INFLUXDB_PASSWORD: &str = "DAYLIGHTD_INFLUXDB_PASSWORD";

// ═══ Validation Limits ═══
// These limits ensure user inputs are within reasonable and safe ranges

pub const MINIMUM_POLL_INTERVAL: u64 = 1; // seconds
pub const MAXIMUM_POLL_INTERVAL: u64 = 86_400; // one day

// A 12 hour offset already collapses any daylight interval to nothing
pub const MINIMUM_TIME_OFFSET: i64 = -720; // minutes
pub const MAXIMUM_TIME_OFFSET: i64 = 720; // minutes

pub const MINIMUM_LATITUDE: f64 = -90.0;
pub const MAXIMUM_LATITUDE: f64 = 90.0;
pub const MINIMUM_LONGITUDE: f64 = -180.0;
pub const MAXIMUM_LONGITUDE: f64 = 180.0;

// ═══ Sink Buffering ═══
// Batching and retry behaviour of the background InfluxDB writer

pub const DEFAULT_BATCH_SIZE: usize = 5_000; // lines per write request
pub const DEFAULT_MAX_RETRIES: u32 = 3; // delivery attempts per batch
pub const DEFAULT_RETRY_BUFFER_LIMIT: usize = 50_000; // retained lines before dropping oldest
pub const HTTP_TIMEOUT_SECS: u64 = 10;

// ═══ Operational Timing Constants ═══

pub const CHECK_INTERVAL_MS: u64 = 250; // How often to check the running flag during sleep

// ═══ Exit Codes ═══

pub const EXIT_FAILURE: i32 = 1; // General failure
