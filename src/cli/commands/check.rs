//! Check command implementation
//!
//! Implements `stagecraft check` to validate the stage file and graph
//! without touching the manifest store.

use anyhow::{Context, Result};

use super::GlobalOptions;
use crate::cli::output::{is_json, print_detail, print_json, print_success};

/// Execute the check command
pub async fn execute(options: &GlobalOptions) -> Result<()> {
    let project = options.load_project()?;
    let graph = project
        .file
        .graph()
        .context("Stage graph is invalid")?;

    let order: Vec<&str> = graph
        .topological_order()
        .into_iter()
        .map(|stage| stage.name.as_str())
        .collect();

    tracing::info!(
        "Checked project '{}' ({} stages)",
        project.file.project.name,
        graph.len()
    );

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "project": project.file.project.name,
            "stages": order,
        }));
        return Ok(());
    }

    print_success(&format!(
        "Stage file is valid ({} stages)",
        graph.len()
    ));
    print_detail(&format!("Execution order: {}", order.join(" -> ")));
    for stage in graph.topological_order() {
        let mut notes = Vec::new();
        if let Some(parent) = stage.parent {
            notes.push(format!("from {}", graph.stage(parent).name));
        }
        if let Some(source) = stage.source() {
            notes.push(format!(
                "builds {} {} ({})",
                source.name, source.version, stage.build_type
            ));
        }
        if !stage.copy_sources.is_empty() {
            let sources: Vec<&str> = stage
                .copy_sources
                .iter()
                .map(|id| graph.stage(*id).name.as_str())
                .collect();
            notes.push(format!("copies from {}", sources.join(", ")));
        }
        if notes.is_empty() {
            print_detail(&format!("• {}", stage.name));
        } else {
            print_detail(&format!("• {} ({})", stage.name, notes.join("; ")));
        }
    }
    Ok(())
}
