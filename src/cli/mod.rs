//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::defaults;
use crate::config::settings::SettingsOverrides;
use commands::{Commands, GlobalOptions};

/// Version line with build metadata
fn long_version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| {
        format!(
            "{} (git {}, {}, built {})",
            env!("CARGO_PKG_VERSION"),
            option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
            option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown target"),
            option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        )
    })
}

/// Stagecraft - multi-stage build orchestrator
///
/// Plans and runs builds described as a graph of stages, rebuilding only the
/// dependencies whose configuration changed.
#[derive(Parser, Debug)]
#[command(name = "stagecraft")]
#[command(author, version, long_version = long_version(), about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Stage file to load
    #[arg(
        short,
        long,
        global = true,
        env = "STAGECRAFT_FILE",
        default_value = defaults::STAGE_FILE
    )]
    pub file: PathBuf,

    /// Directory for the manifest store
    #[arg(long, global = true, env = "STAGECRAFT_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Root that recorded install paths are resolved against
    #[arg(long, global = true, env = "STAGECRAFT_INSTALL_ROOT")]
    pub install_root: Option<PathBuf>,

    /// Abort before the next action after this many seconds (0 disables)
    #[arg(long, global = true, env = "STAGECRAFT_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let options = GlobalOptions {
            file: self.file,
            overrides: SettingsOverrides {
                state_dir: self.state_dir,
                install_root: self.install_root,
                timeout_secs: self.timeout,
            },
        };

        if let Some(cmd) = self.command {
            cmd.run(&options).await
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}
