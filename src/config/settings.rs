//! Run settings resolution
//!
//! Priority: CLI flags (which also read `STAGECRAFT_*` environment
//! variables) > stage file `[settings]` > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::defaults;
use crate::core::stagefile::Settings;

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub state_dir: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved run settings
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Directory holding the manifest store and its lock
    pub state_dir: PathBuf,
    /// Root that recorded install paths resolve against
    pub install_root: PathBuf,
    /// Run-level deadline
    pub timeout: Option<Duration>,
}

impl RunSettings {
    /// Resolve settings; relative file paths are taken from `base_dir`
    /// (the stage file's directory)
    pub fn resolve(base_dir: &Path, file: &Settings, overrides: &SettingsOverrides) -> Self {
        let state_dir = overrides
            .state_dir
            .clone()
            .or_else(|| file.state_dir.as_ref().map(|dir| base_dir.join(dir)))
            .unwrap_or_else(|| base_dir.join(defaults::STATE_DIR));

        let install_root = overrides
            .install_root
            .clone()
            .or_else(|| file.install_root.as_ref().map(|dir| base_dir.join(dir)))
            .unwrap_or_else(|| PathBuf::from(defaults::INSTALL_ROOT));

        let timeout = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            state_dir,
            install_root,
            timeout,
        }
    }

    /// Path of the manifest store file
    pub fn manifest_store_path(&self) -> PathBuf {
        self.state_dir.join(defaults::MANIFEST_STORE_FILE)
    }
}
