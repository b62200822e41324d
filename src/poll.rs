//! The poll loop: refresh, evaluate, submit, sleep.
//!
//! One cycle runs per poll interval on the calling thread. The cycle start is
//! recorded before any work, and the loop sleeps only for what is left of the
//! interval, so a slow cycle shortens the next sleep instead of shifting the
//! cadence. A cycle that overruns the interval is followed immediately by the
//! next one; cycles are never skipped.
//!
//! Shutdown is cooperative. The `running` flag is checked between cycles and
//! while sleeping, never in the middle of a cycle. Once it clears, the loop
//! flushes the sink exactly once and returns.

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::constants::{CHECK_INTERVAL_MS, FIELD_NAME};
use crate::daylight::{DaylightCache, DaylightSample, Location, is_daylight};
use crate::logger::Log;
use crate::sink::{Point, Sink};
use crate::solar::SunCalculator;

const CHECK_INTERVAL: Duration = Duration::from_millis(CHECK_INTERVAL_MS);

/// Cadence and output settings for the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub offset: chrono::Duration,
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            offset: config.time_offset(),
            measurement: config.influxdb.measurement(),
            tags: config.influxdb.tags.clone(),
        }
    }
}

/// How long to sleep after a cycle that took `elapsed`.
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Single-threaded poll loop owning the daylight cache and the sink.
pub struct PollLoop<C: SunCalculator, S: Sink> {
    calculator: C,
    sink: S,
    cache: DaylightCache,
    settings: PollSettings,
}

impl<C: SunCalculator, S: Sink> PollLoop<C, S> {
    /// Compute the initial sun window for the day containing `now`.
    ///
    /// Fails if the calculator cannot produce a window, which only happens for
    /// invalid coordinates.
    pub fn new<Tz: TimeZone>(
        calculator: C,
        sink: S,
        settings: PollSettings,
        location: Location,
        now: &DateTime<Tz>,
    ) -> Result<Self> {
        let cache = DaylightCache::new(&calculator, location, now)?;
        Ok(Self {
            calculator,
            sink,
            cache,
            settings,
        })
    }

    pub fn cache(&self) -> &DaylightCache {
        &self.cache
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Run one cycle for `now` and return the sample that was submitted.
    ///
    /// Neither a calculator failure nor a sink failure aborts the cycle: the
    /// former keeps the previous window, the latter loses this one sample.
    pub fn run_cycle<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> DaylightSample
    where
        Tz::Offset: std::fmt::Display,
    {
        match self.cache.refresh_if_stale(&self.calculator, now) {
            Ok(true) => {
                let window = self.cache.window();
                let tz = now.timezone();
                Log::log_block_start(&format!("Sun window refreshed for {}", now.date_naive()));
                Log::log_indented(&format!(
                    "Sunrise: {}",
                    window.sunrise.with_timezone(&tz).format("%H:%M:%S %Z")
                ));
                Log::log_indented(&format!(
                    "Sunset: {}",
                    window.sunset.with_timezone(&tz).format("%H:%M:%S %Z")
                ));
            }
            Ok(false) => {}
            Err(e) => {
                Log::log_warning(&format!(
                    "Failed to refresh sun window, keeping previous one: {:#}",
                    e
                ));
            }
        }

        let sample = DaylightSample {
            timestamp: now.with_timezone(&Utc),
            is_daylight: is_daylight(self.cache.window(), now, self.settings.offset),
        };

        Log::log_debug(&format!(
            "{} daylight={}",
            now.format("%Y-%m-%d %H:%M:%S %Z"),
            sample.is_daylight
        ));

        if let Err(e) = self.sink.write_point(self.sample_point(&sample)) {
            Log::log_error(&format!("Failed to submit daylight sample: {:#}", e));
        }

        sample
    }

    fn sample_point(&self, sample: &DaylightSample) -> Point {
        Point::new(self.settings.measurement.as_str(), sample.timestamp)
            .tags(&self.settings.tags)
            .field(FIELD_NAME, sample.is_daylight)
    }

    /// Run cycles on the local clock until `running` clears, then flush.
    ///
    /// Returns the outcome of the final flush.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();

            self.run_cycle(&Local::now());

            let pause = sleep_duration(self.settings.interval, cycle_start.elapsed());
            if pause.is_zero() {
                Log::log_debug("Cycle overran the poll interval, starting next cycle now");
            }
            sleep_while_running(pause, running);
        }

        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        Log::log_block_start("Flushing buffered samples...");
        self.sink.flush()
    }
}

/// Sleep in small chunks so a shutdown request is noticed promptly.
fn sleep_while_running(duration: Duration, running: &AtomicBool) {
    let mut slept = Duration::ZERO;
    while slept < duration && running.load(Ordering::SeqCst) {
        let chunk = CHECK_INTERVAL.min(duration - slept);
        thread::sleep(chunk);
        slept += chunk;
    }
}
