//! Command-line argument parsing.
//!
//! Thin clap front end. `--check` validates the configuration and prints
//! today's daylight interval without contacting the database.

use clap::Parser;
use std::path::PathBuf;

/// Record whether it is currently daylight at a location into InfluxDB.
#[derive(Debug, Parser, PartialEq)]
#[command(name = "daylightd", version, about)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log every poll cycle
    #[arg(short, long)]
    pub debug: bool,

    /// Validate the configuration, print today's sun times and exit
    #[arg(long)]
    pub check: bool,
}

/// What the binary should do after parsing arguments.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the poll loop until a shutdown signal arrives
    Run,
    /// Print configuration and today's daylight interval, then exit
    Check,
}

impl Args {
    pub fn action(&self) -> CliAction {
        if self.check {
            CliAction::Check
        } else {
            CliAction::Run
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_args() {
        let args = Args::try_parse_from(["daylightd"]).unwrap();
        assert_eq!(args.config, None);
        assert!(!args.debug);
        assert_eq!(args.action(), CliAction::Run);
    }

    #[test]
    fn test_parse_config_and_debug() {
        let args = Args::try_parse_from(["daylightd", "-c", "/etc/daylightd.toml", "--debug"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/daylightd.toml")));
        assert!(args.debug);
    }

    #[test]
    fn test_parse_check() {
        let args = Args::try_parse_from(["daylightd", "--check"]).unwrap();
        assert_eq!(args.action(), CliAction::Check);
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        assert!(Args::try_parse_from(["daylightd", "--bogus"]).is_err());
        assert!(Args::try_parse_from(["daylightd", "--config"]).is_err());
    }
}
