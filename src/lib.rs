//! # daylightd
//!
//! Records, on a fixed cadence, whether it is currently daylight at a configured
//! location, and writes that boolean into InfluxDB.
//!
//! ## Architecture
//!
//! - **args**: Command-line parsing
//! - **config**: TOML configuration loading, environment overrides and validation
//! - **constants**: Application-wide constants and defaults
//! - **daylight**: Sun window cache with day-rollover refresh, and the daylight evaluator
//! - **logger**: Structured logging with visual formatting
//! - **poll**: The poll loop driving refresh, evaluation, submission and sleep
//! - **signals**: SIGINT/SIGTERM handling for graceful shutdown
//! - **sink**: Time-series sink trait and the buffered InfluxDB writer
//! - **solar**: Sunrise/sunset calculation

pub mod args;
pub mod config;
pub mod constants;
pub mod daylight;
pub mod logger;
pub mod poll;
pub mod signals;
pub mod sink;
pub mod solar;

// Re-export important types for easier access
pub use config::Config;
pub use daylight::{DaylightCache, DaylightSample, Location, SunWindow, is_daylight};
pub use logger::{Log, LogLevel};
pub use poll::{PollLoop, PollSettings};
pub use sink::{InfluxWriter, Point, Sink};
pub use solar::{SolarCalculator, SunCalculator};
