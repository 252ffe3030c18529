//! Status command implementation
//!
//! Implements `stagecraft status` to list what the manifest store records.

use anyhow::{Context, Result};
use serde::Serialize;

use super::{open_tracker, GlobalOptions};
use crate::cli::output::{is_json, print_detail, print_info, print_json};
use crate::core::manifest::ManifestEntry;

/// A recorded entry and whether its paths are the ones on disk
#[derive(Serialize)]
struct EntryStatus {
    #[serde(flatten)]
    entry: ManifestEntry,
    installed: bool,
}

/// Execute the status command
pub async fn execute(options: &GlobalOptions) -> Result<()> {
    let project = options.load_project()?;
    let tracker = open_tracker(&project.settings)?;
    let mut entries = Vec::new();
    for entry in tracker.entries().context("Failed to read manifest store")? {
        let installed = tracker
            .is_installed(&entry)
            .context("Failed to read manifest store")?;
        entries.push(EntryStatus { entry, installed });
    }

    if is_json() {
        print_json(&serde_json::json!({
            "install_root": tracker.install_root(),
            "store": tracker.store().path(),
            "entries": entries,
        }));
        return Ok(());
    }

    if entries.is_empty() {
        print_info("No install manifests recorded");
        return Ok(());
    }

    print_info(&format!(
        "{} install manifests in {}",
        entries.len(),
        tracker.store().path().display()
    ));
    for status in &entries {
        print_detail(&format!(
            "• {} (config {}, {} paths, {})",
            status.entry.key,
            status.entry.config_hash,
            status.entry.paths.len(),
            if status.installed {
                "installed"
            } else {
                "not installed"
            }
        ));
    }
    Ok(())
}
