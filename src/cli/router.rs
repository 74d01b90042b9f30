//! Command routing and execution

use crate::cli::args::Commands;
use crate::cli::commands::*;
use anyhow::Result;

/// Execute a CLI command based on the parsed arguments
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            output,
            base_seed,
        } => {
            run_controller(RunParams {
                config,
                output,
                base_seed,
            })
            .await
        }
        Commands::RunUnit { job, output } => run_unit(&job, &output).await,
        Commands::Check {
            history,
            strategy,
            window,
            threshold,
            threshold_kind,
        } => {
            run_check(CheckParams {
                history,
                strategy,
                window,
                threshold,
                threshold_kind,
            })
            .await
        }
    }
}
