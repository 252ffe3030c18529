//! Plan command implementation
//!
//! Implements `stagecraft plan` (and `build --dry-run`): prints the actions a
//! build would run against the current manifest store.

use anyhow::{Context, Result};

use super::{open_tracker, GlobalOptions};
use crate::cli::output::{is_json, is_quiet};
use crate::core::plan;

/// Execute the plan command
pub async fn execute(options: &GlobalOptions) -> Result<()> {
    let project = options.load_project()?;
    let graph = project.file.graph().context("Stage graph is invalid")?;
    let tracker = open_tracker(&project.settings)?;

    let plan = plan::plan(&graph, &tracker).context("Failed to plan build")?;

    if is_json() {
        println!("{}", plan.to_json().context("Failed to serialize plan")?);
    } else if !is_quiet() {
        println!("{}", plan.format_text().trim_end());
    }
    Ok(())
}
