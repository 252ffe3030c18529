//! Uninstall command implementation
//!
//! Implements `stagecraft uninstall <stage> <dependency>`: removes every path
//! the recorded build installed and drops the record.

use anyhow::{Context, Result};

use super::{open_tracker, GlobalOptions};
use crate::cli::output::{is_json, print_detail, print_json, print_success, print_warning};
use crate::core::manifest::ManifestKey;

/// Execute the uninstall command
pub async fn execute(options: &GlobalOptions, stage: &str, dependency: &str) -> Result<()> {
    let project = options.load_project()?;
    let mut tracker = open_tracker(&project.settings)?;
    let key = ManifestKey::new(stage, dependency);

    let Some(entry) = tracker.lookup(&key).context("Failed to read manifest store")? else {
        if is_json() {
            print_json(&serde_json::json!({ "status": "success", "removed": [], "missing": [] }));
        } else {
            print_warning(&format!("Nothing recorded for {key}"));
        }
        return Ok(());
    };

    let report = tracker
        .uninstall(&entry)
        .with_context(|| format!("Failed to uninstall {key}"))?;

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "removed": report.removed,
            "missing": report.missing,
        }));
    } else {
        print_success(&format!(
            "Uninstalled {key}: {} paths removed",
            report.removed.len()
        ));
        if !report.missing.is_empty() {
            print_detail(&format!("{} paths were already absent", report.missing.len()));
        }
    }
    Ok(())
}
