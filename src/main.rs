//! Stagecraft CLI - multi-stage build orchestrator
//!
//! Entry point for the stagecraft command-line application.

use anyhow::Result;
use clap::Parser;

use stagecraft::cli::output::{display_error, init_logging, OutputConfig};
use stagecraft::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Apply output configuration globally
    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);
    output_config.apply_global();
    init_logging(output_config);

    // Run the command and handle errors
    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
