use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::Denver;
use chrono_tz::Tz;
use daylightd::sink::{Transport, WriterOptions};
use daylightd::{
    Config, DaylightCache, InfluxWriter, Location, PollLoop, PollSettings, SolarCalculator, Sink,
};
use serial_test::serial;
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const BOULDER_CONFIG: &str = r#"
latitude = 40.015
longitude = -105.27
poll_interval = 60
time_offset = 30

[influxdb]
address = "http://localhost:8086"
token = "secret"
organization = "home"
bucket = "sensors"
measurement_prefix = "env_"
flush_interval = 3600

[influxdb.tags]
site = "boulder"
"#;

/// Transport that keeps every delivered line instead of sending it.
#[derive(Clone, Default)]
struct CapturingTransport {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturingTransport {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Transport for CapturingTransport {
    fn send(&self, body: &str) -> Result<()> {
        let mut lines = self.lines.lock().unwrap();
        lines.extend(body.lines().map(str::to_owned));
        Ok(())
    }
}

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("daylightd.toml");
    fs::write(&path, content).unwrap();
    path
}

fn denver(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
    Denver.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn writer_for(config: &Config, transport: CapturingTransport) -> InfluxWriter {
    let options = WriterOptions {
        flush_interval: Duration::from_secs(config.influxdb.flush_interval()),
        ..WriterOptions::default()
    };
    InfluxWriter::new(transport, options).unwrap()
}

#[test]
#[serial]
fn test_config_to_line_protocol_over_a_day() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, BOULDER_CONFIG);
    let config = Config::load(Some(&path)).unwrap();

    let transport = CapturingTransport::default();
    let writer = writer_for(&config, transport.clone());
    let mut poll = PollLoop::new(
        SolarCalculator,
        writer,
        PollSettings::from_config(&config),
        config.location(),
        &denver(2024, 6, 15, 0, 5),
    )
    .unwrap();

    // Summer in Boulder: sunrise around 05:30 and sunset around 20:30 local
    let checks = [
        (denver(2024, 6, 15, 3, 0), false),
        (denver(2024, 6, 15, 12, 0), true),
        (denver(2024, 6, 15, 23, 0), false),
        (denver(2024, 6, 16, 12, 0), true),
    ];
    for (now, expected) in checks {
        let sample = poll.run_cycle(&now);
        assert_eq!(sample.is_daylight, expected, "at {}", now);
    }

    // Nothing reaches the transport before the flush interval or a flush
    assert!(transport.lines().is_empty());
    poll.sink().flush().unwrap();

    let lines = transport.lines();
    assert_eq!(lines.len(), 4);
    for ((now, expected), line) in checks.iter().zip(&lines) {
        assert_eq!(
            line,
            &format!(
                "env_daylight,site=boulder daylight={} {}",
                expected,
                now.timestamp_millis()
            )
        );
    }
}

#[test]
#[serial]
fn test_window_follows_the_calendar_day() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, BOULDER_CONFIG);
    let config = Config::load(Some(&path)).unwrap();

    let transport = CapturingTransport::default();
    let mut poll = PollLoop::new(
        SolarCalculator,
        writer_for(&config, transport),
        PollSettings::from_config(&config),
        config.location(),
        &denver(2024, 6, 15, 12, 0),
    )
    .unwrap();
    let first = *poll.cache().window();

    poll.run_cycle(&denver(2024, 6, 15, 23, 59));
    assert_eq!(*poll.cache().window(), first);

    poll.run_cycle(&denver(2024, 6, 16, 0, 1));
    let second = *poll.cache().window();
    assert_ne!(second, first);
    assert_eq!(
        second.sunrise.with_timezone(&Denver).date_naive(),
        denver(2024, 6, 16, 0, 0).date_naive()
    );
}

#[test]
fn test_tokyo_on_a_utc_clock_refreshes_once_per_day() {
    let tokyo = Location::new(35.68, 139.69);
    let start = Utc.with_ymd_and_hms(2024, 6, 15, 1, 0, 0).unwrap();
    let mut cache = DaylightCache::new(&SolarCalculator, tokyo, &start).unwrap();

    // Tokyo's sunrise is on the previous UTC date
    assert!(cache.window().sunrise.date_naive() < start.date_naive());

    let refreshes = (0..60)
        .filter(|minute| {
            let now = start + chrono::Duration::minutes(*minute);
            cache.refresh_if_stale(&SolarCalculator, &now).unwrap()
        })
        .count();
    assert_eq!(refreshes, 0);

    let next_day = Utc.with_ymd_and_hms(2024, 6, 16, 0, 30, 0).unwrap();
    assert!(cache.refresh_if_stale(&SolarCalculator, &next_day).unwrap());
    assert!(!cache.refresh_if_stale(&SolarCalculator, &next_day).unwrap());
}

#[test]
#[serial]
fn test_run_until_stopped_flushes_once() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, BOULDER_CONFIG);
    let config = Config::load(Some(&path)).unwrap();

    let transport = CapturingTransport::default();
    let mut poll = PollLoop::new(
        SolarCalculator,
        writer_for(&config, transport.clone()),
        PollSettings::from_config(&config),
        config.location(),
        &chrono::Local::now(),
    )
    .unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let stopper = {
        let running = running.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            running.store(false, std::sync::atomic::Ordering::SeqCst);
        })
    };

    // The first cycle runs immediately; the 60s sleep is cut short by the stop
    poll.run(&running).unwrap();
    stopper.join().unwrap();

    let lines = transport.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("env_daylight,site=boulder daylight="));
}

#[test]
#[serial]
fn test_invalid_configs_are_rejected() {
    let dir = TempDir::new().unwrap();

    let no_destination = BOULDER_CONFIG.replace("bucket = \"sensors\"", "");
    let path = write_config(&dir, &no_destination);
    assert!(Config::load(Some(&path)).is_err());

    let bad_latitude = BOULDER_CONFIG.replace("latitude = 40.015", "latitude = 95.0");
    let path = write_config(&dir, &bad_latitude);
    assert!(Config::load(Some(&path)).is_err());

    let missing = dir.path().join("absent.toml");
    assert!(Config::load(Some(&missing)).is_err());
}
