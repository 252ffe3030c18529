//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod graph;
pub mod plan;
pub mod status;
pub mod uninstall;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::settings::{RunSettings, SettingsOverrides};
use crate::core::manifest::ManifestTracker;
use crate::core::stagefile::StageFile;
use crate::infra::store::FileStore;

/// Flags shared by every command
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Stage file path
    pub file: PathBuf,
    /// Settings given on the command line or via environment
    pub overrides: SettingsOverrides,
}

/// A loaded stage file and its resolved settings
pub struct Project {
    pub file: StageFile,
    pub settings: RunSettings,
}

impl GlobalOptions {
    /// Load the stage file and resolve run settings against its directory
    pub fn load_project(&self) -> Result<Project> {
        let file = StageFile::load(&self.file)
            .with_context(|| format!("Failed to load {}", self.file.display()))?;

        let base_dir = match self.file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let settings = RunSettings::resolve(&base_dir, &file.settings, &self.overrides);
        tracing::debug!("Resolved settings: {:?}", settings);

        Ok(Project { file, settings })
    }
}

/// Open the locked manifest store and wrap it in a tracker
pub fn open_tracker(settings: &RunSettings) -> Result<ManifestTracker<FileStore>> {
    let store = FileStore::open(&settings.state_dir).with_context(|| {
        format!(
            "Failed to open manifest store in {}",
            settings.state_dir.display()
        )
    })?;
    Ok(ManifestTracker::new(store, settings.install_root.clone()))
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the stage file and stage graph without building
    Check,

    /// Show the actions a build would run
    Plan,

    /// Plan and execute the build
    Build {
        /// Print the plan without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the stage graph in DOT format
    Graph,

    /// List recorded install manifests
    Status,

    /// Remove the files a stage's dependency build installed
    Uninstall {
        /// Stage that built the dependency
        stage: String,

        /// Dependency name
        dependency: String,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, options: &GlobalOptions) -> Result<()> {
        match self {
            Self::Check => check::execute(options).await,
            Self::Plan => plan::execute(options).await,
            Self::Build { dry_run } => {
                if dry_run {
                    plan::execute(options).await
                } else {
                    build::execute(options).await
                }
            }
            Self::Graph => graph::execute(options).await,
            Self::Status => status::execute(options).await,
            Self::Uninstall { stage, dependency } => {
                uninstall::execute(options, &stage, &dependency).await
            }
        }
    }
}
