//! CLI command for displaying the stage graph
//!
//! Implements the `stagecraft graph` command.

use anyhow::{Context, Result};

use super::GlobalOptions;
use crate::cli::output::{is_json, print_json};

/// Execute the graph command
pub async fn execute(options: &GlobalOptions) -> Result<()> {
    let project = options.load_project()?;
    let graph = project.file.graph().context("Stage graph is invalid")?;

    if is_json() {
        let stages: Vec<serde_json::Value> = graph
            .topological_order()
            .into_iter()
            .map(|stage| {
                serde_json::json!({
                    "name": stage.name,
                    "from": stage.parent.map(|id| graph.stage(id).name.clone()),
                    "copy_from": stage
                        .copy_sources
                        .iter()
                        .map(|id| graph.stage(*id).name.clone())
                        .collect::<Vec<_>>(),
                    "build_type": stage.build_type.as_str(),
                })
            })
            .collect();
        print_json(&serde_json::json!({ "stages": stages }));
    } else {
        print!("{}", graph.to_dot());
    }
    Ok(())
}
