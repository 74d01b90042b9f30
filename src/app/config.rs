//! Process-wide settings derived from the command line

use crate::cli::{Cli, Commands};

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            verbose: cli.verbose,
            // cluster workers log into the scheduler's job log
            json_logs: matches!(cli.command, Commands::RunUnit { .. }),
        }
    }

    /// Filter directive used when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            2 => "trace",
            _ => "trace,tera=debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_log_level_by_verbosity() {
        let levels: Vec<&str> = (0..4)
            .map(|verbose| {
                AppConfig {
                    verbose,
                    ..Default::default()
                }
                .log_level()
            })
            .collect();
        assert_eq!(levels, ["info", "debug", "trace", "trace,tera=debug"]);
    }

    #[test]
    fn test_only_workers_log_json() {
        let worker = Cli::parse_from(["adaptive-splits", "run-unit", "--job", "j", "--output", "o"]);
        assert!(AppConfig::from_cli(&worker).json_logs);

        let run = Cli::parse_from(["adaptive-splits", "-vv", "run", "run.yaml"]);
        let config = AppConfig::from_cli(&run);
        assert!(!config.json_logs);
        assert_eq!(config.verbose, 2);
    }
}
