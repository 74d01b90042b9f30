//! CLI argument structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::stability::ThresholdKind;

/// Run data splits until a monitored metric is stable
#[derive(Parser)]
#[command(name = "adaptive-splits")]
#[command(about = "adaptive-splits - Evaluate data splits until a metric converges", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the adaptive controller described by a run file
    #[command(name = "run")]
    Run {
        /// Run file (.yaml, .yml, .toml or .json)
        config: PathBuf,

        /// Write the execution output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the base seed of the run file
        #[arg(long, allow_hyphen_values = true)]
        base_seed: Option<i64>,
    },

    /// Evaluate a single job file (worker side of the cluster backend)
    #[command(name = "run-unit")]
    RunUnit {
        /// Job file written by the cluster scheduler
        #[arg(long)]
        job: PathBuf,

        /// Where to write the unit result
        #[arg(long)]
        output: PathBuf,
    },

    /// Check a recorded metric history for stability
    #[command(name = "check")]
    Check {
        /// JSON file holding an array of metric values
        #[arg(long)]
        history: PathBuf,

        /// Strategy id, e.g. mean_absolute or cohen_absolute
        #[arg(long)]
        strategy: String,

        /// Number of trailing values forming the window
        #[arg(long)]
        window: usize,

        /// Threshold value
        #[arg(long)]
        threshold: f64,

        /// How the threshold value is interpreted
        #[arg(long, default_value = "absolute", value_parser = parse_threshold_kind)]
        threshold_kind: ThresholdKind,
    },
}

fn parse_threshold_kind(raw: &str) -> Result<ThresholdKind, String> {
    raw.parse::<ThresholdKind>().map_err(|e| e.user_message())
}
