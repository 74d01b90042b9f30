use adaptive_splits::app::{handle_fatal_error, init_logging, AppConfig};
use adaptive_splits::cli::{execute_command, Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&AppConfig::from_cli(&cli));

    if let Err(e) = execute_command(cli.command).await {
        handle_fatal_error(e, cli.verbose);
    }
}
