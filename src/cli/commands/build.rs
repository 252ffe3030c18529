//! Build command implementation
//!
//! Implements `stagecraft build`: plans against the manifest store, then
//! executes the plan with real processes while showing a progress bar.

use anyhow::{Context, Result};

use super::{open_tracker, GlobalOptions};
use crate::cli::output::{
    create_build_bar, is_json, print_detail, print_json, print_success, print_warning,
};
use crate::core::executor::Executor;
use crate::core::plan;
use crate::infra::runner::ProcessRunner;

/// Execute the build command
pub async fn execute(options: &GlobalOptions) -> Result<()> {
    let project = options.load_project()?;
    let graph = project.file.graph().context("Stage graph is invalid")?;
    let tracker = open_tracker(&project.settings)?;

    let plan = plan::plan(&graph, &tracker).context("Failed to plan build")?;
    tracing::info!(
        "Building project '{}': {} actions",
        project.file.project.name,
        plan.len()
    );

    if plan.is_empty() {
        if is_json() {
            print_json(&serde_json::json!({ "status": "success", "completed": [] }));
        } else {
            print_success("Nothing to do");
        }
        return Ok(());
    }

    let bar = create_build_bar(plan.len() as u64);
    let progress = bar.clone();
    let cache_hit = plan.is_cache_hit();

    let mut executor = Executor::new(
        graph,
        project.file.tools.clone(),
        tracker,
        ProcessRunner::new(),
    )
    .with_timeout(project.settings.timeout)
    .with_progress(move |event| {
        if event.finished {
            progress.inc(1);
        } else {
            progress.set_message(format!("{} {}", event.record.action_kind, event.record.stage));
        }
    });

    // Commands block; the executor (and the store lock) is dropped with the task
    let result = tokio::task::spawn_blocking(move || executor.run(&plan))
        .await
        .context("Build task failed to complete")?;
    bar.finish_and_clear();

    match result {
        Ok(report) => {
            if is_json() {
                print_json(&serde_json::json!({
                    "status": "success",
                    "completed": report.completed,
                    "elapsed_secs": report.elapsed.as_secs_f64(),
                }));
            } else {
                print_success(&format!(
                    "Completed {} actions in {:.1}s",
                    report.completed.len(),
                    report.elapsed.as_secs_f64()
                ));
                if cache_hit {
                    print_detail("All source builds were up to date");
                }
            }
            Ok(())
        }
        Err(err) => {
            let completed = err.completed().to_vec();
            let err = anyhow::Error::new(err);
            if is_json() {
                print_json(&serde_json::json!({
                    "status": "error",
                    "error": format!("{err:#}"),
                    "completed": completed,
                }));
            } else {
                print_warning(&format!(
                    "{} actions completed before the build stopped",
                    completed.len()
                ));
            }
            Err(err.context("Build failed"))
        }
    }
}
