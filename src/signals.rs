//! Shutdown signal handling.
//!
//! SIGINT and SIGTERM clear a shared `running` flag from a dedicated thread.
//! The poll loop observes the flag between cycles and performs the final flush
//! itself; nothing is torn down from the signal thread.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use crate::logger::Log;

/// Signal handling state shared between threads
pub struct SignalState {
    /// Atomic flag indicating if the application should keep running
    pub running: Arc<AtomicBool>,
}

impl SignalState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        _ => "unknown signal",
    }
}

/// Register SIGINT/SIGTERM and spawn the thread that reacts to them.
pub fn setup_signal_handler() -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;

    let running_clone = running.clone();
    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                Log::log_pipe();
                Log::log_info(&format!(
                    "Shutdown signal received: {}",
                    signal_name(sig)
                ));
                running_clone.store(false, Ordering::SeqCst);
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(SignalState { running })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(SIGINT), "SIGINT");
        assert_eq!(signal_name(SIGTERM), "SIGTERM");
        assert_eq!(signal_name(0), "unknown signal");
    }

    #[test]
    fn test_sigterm_clears_running_flag() {
        let state = setup_signal_handler().unwrap();
        assert!(state.is_running());

        signal_hook::low_level::raise(SIGTERM).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while state.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!state.is_running());
    }
}
