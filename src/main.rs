use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::sync::mpsc::Receiver;
use std::thread;

use daylightd::args::{Args, CliAction};
use daylightd::constants::EXIT_FAILURE;
use daylightd::signals::setup_signal_handler;
use daylightd::{
    Config, InfluxWriter, Log, PollLoop, PollSettings, SolarCalculator, SunCalculator, SunWindow,
    is_daylight,
};

/// Log sink delivery failures as they arrive, until the writer goes away.
fn spawn_error_observer(errors: Receiver<anyhow::Error>) -> Result<()> {
    thread::Builder::new()
        .name("influx-errors".to_string())
        .spawn(move || {
            for error in errors {
                Log::log_error(&format!("Error writing to InfluxDB: {:#}", error));
            }
        })
        .context("failed to spawn InfluxDB error observer")?;
    Ok(())
}

fn log_sun_window(window: &SunWindow, config: &Config) {
    let fmt = "%Y-%m-%d %H:%M:%S %Z";
    Log::log_indented(&format!(
        "Sunrise: {}",
        window.sunrise.with_timezone(&Local).format(fmt)
    ));
    Log::log_indented(&format!(
        "Sunset: {}",
        window.sunset.with_timezone(&Local).format(fmt)
    ));
    match window.effective(config.time_offset()) {
        Some((start, end)) if start <= end => Log::log_indented(&format!(
            "Daylight: {} to {}",
            start.with_timezone(&Local).format("%H:%M:%S"),
            end.with_timezone(&Local).format("%H:%M:%S")
        )),
        _ => Log::log_warning("Time offset leaves no daylight interval"),
    }
}

/// Print today's daylight interval and the current state without writing anything.
fn run_check(config: &Config) -> Result<()> {
    let now = Local::now();
    let window = SolarCalculator
        .sun_window(&config.location(), now.date_naive())
        .context("failed to calculate sunrise/sunset")?;

    Log::log_block_start(&format!("Sun times for {}", now.date_naive()));
    log_sun_window(&window, config);
    Log::log_block_start(&format!(
        "Daylight now: {}",
        is_daylight(&window, &now, config.time_offset())
    ));
    Log::log_end();
    Ok(())
}

fn run_daemon(config: &Config) -> Result<()> {
    let signal_state = setup_signal_handler()?;

    let mut writer = InfluxWriter::from_config(&config.influxdb)
        .context("failed to initialize InfluxDB connection")?;
    if let Some(errors) = writer.errors() {
        spawn_error_observer(errors)?;
    }

    let mut poll = PollLoop::new(
        SolarCalculator,
        writer,
        PollSettings::from_config(config),
        config.location(),
        &Local::now(),
    )
    .context("failed to calculate initial sunrise/sunset")?;

    Log::log_block_start("Initial sun window");
    log_sun_window(poll.cache().window(), config);
    Log::log_block_start(&format!(
        "Polling every {} seconds",
        poll.settings().interval.as_secs()
    ));

    match poll.run(&signal_state.running) {
        Ok(()) => Log::log_decorated("Buffered samples flushed"),
        Err(e) => Log::log_error(&format!("Final flush to InfluxDB failed: {:#}", e)),
    }

    // Dropping the loop stops the writer thread, which closes the error channel
    drop(poll);
    Log::log_block_start("Shutting down daylightd...");
    Log::log_end();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    Log::set_verbose(args.debug);
    Log::log_version();

    let config_path = Config::resolve_path(args.config.as_deref())?;
    let config = match Config::load(Some(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            Log::log_critical(&format!("{:#}", e));
            std::process::exit(EXIT_FAILURE);
        }
    };
    config.log_config(&config_path);

    let result = match args.action() {
        CliAction::Check => run_check(&config),
        CliAction::Run => run_daemon(&config),
    };

    if let Err(e) = result {
        Log::log_critical(&format!("{:#}", e));
        std::process::exit(EXIT_FAILURE);
    }
    Ok(())
}
