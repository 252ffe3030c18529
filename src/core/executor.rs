//! Plan execution
//!
//! Runs a [`BuildPlan`] strictly in order. Every action is carried out by the
//! command runner; the manifest tracker is only updated after the
//! corresponding command succeeded, so a failed run leaves the store
//! consistent with the last completed action. Completed actions are not
//! rolled back.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::graph::StageGraph;
use crate::core::manifest::{ManifestKey, ManifestStore, ManifestTracker};
use crate::core::plan::{Action, BuildPlan, PlanRecord};
use crate::core::stage::Stage;
use crate::core::stagefile::ToolsConfig;
use crate::error::{ActionError, ExecutionError};
use crate::infra::filesystem;
use crate::infra::runner::{CommandRunner, CommandSpec};

/// Progress notification for one action
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    /// Zero-based position in the plan
    pub index: usize,
    pub total: usize,
    pub record: &'a PlanRecord,
    /// `false` when starting, `true` once the action succeeded
    pub finished: bool,
}

type ProgressFn = Box<dyn FnMut(&ProgressEvent<'_>) + Send>;

/// Summary of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub completed: Vec<PlanRecord>,
    pub elapsed: Duration,
}

/// Executes plans against a runner and a manifest tracker
pub struct Executor<S, R> {
    graph: StageGraph,
    tools: ToolsConfig,
    tracker: ManifestTracker<S>,
    runner: R,
    timeout: Option<Duration>,
    progress: Option<ProgressFn>,
}

impl<S: ManifestStore, R: CommandRunner> Executor<S, R> {
    pub fn new(graph: StageGraph, tools: ToolsConfig, tracker: ManifestTracker<S>, runner: R) -> Self {
        Self {
            graph,
            tools,
            tracker,
            runner,
            timeout: None,
            progress: None,
        }
    }

    /// Stop before the next action once `timeout` has elapsed
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Receive a callback before and after each action
    #[must_use]
    pub fn with_progress(mut self, progress: impl FnMut(&ProgressEvent<'_>) + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn tracker(&self) -> &ManifestTracker<S> {
        &self.tracker
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Give back the tracker and runner
    pub fn into_parts(self) -> (ManifestTracker<S>, R) {
        (self.tracker, self.runner)
    }

    /// Run every action in order, halting at the first failure
    pub fn run(&mut self, plan: &BuildPlan) -> Result<ExecutionReport, ExecutionError> {
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let total = plan.len();
        let mut completed = Vec::with_capacity(total);

        for (index, action) in plan.actions().iter().enumerate() {
            let record = action.record();

            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!("Timed out after {} of {} actions", completed.len(), total);
                return Err(ExecutionError::TimedOut {
                    next: record,
                    completed,
                });
            }

            tracing::info!("[{}/{}] {}", index + 1, total, record);
            self.notify(index, total, &record, false);

            if let Err(cause) = self.execute(action) {
                tracing::error!("{} failed: {}", record, cause);
                return Err(ExecutionError::ActionFailed {
                    action: record,
                    cause,
                    completed,
                });
            }

            self.notify(index, total, &record, true);
            completed.push(record);
        }

        Ok(ExecutionReport {
            completed,
            elapsed: started.elapsed(),
        })
    }

    fn notify(&mut self, index: usize, total: usize, record: &PlanRecord, finished: bool) {
        if let Some(progress) = self.progress.as_mut() {
            progress(&ProgressEvent {
                index,
                total,
                record,
                finished,
            });
        }
    }

    fn execute(&mut self, action: &Action) -> Result<(), ActionError> {
        match action {
            Action::InstallPackages { stage, packages } => {
                let stage = self.stage(stage)?;
                let spec = CommandSpec::from_parts(&self.tools.package_manager, packages.clone())
                    .ok_or_else(|| ActionError::invalid("package manager command is empty"))?;
                let spec = with_stage_context(spec, stage);
                self.run_checked(&spec)
            }
            Action::BuildFromSource {
                stage,
                dependency,
                config_hash,
                ..
            } => self.build_from_source(stage, dependency, config_hash),
            Action::Uninstall {
                stage,
                key,
                config_hash,
            } => self.uninstall(stage, key, config_hash),
            Action::CopyArtifacts {
                source,
                dest,
                paths,
                dest_dir,
            } => self.copy_artifacts(source, dest, paths, dest_dir.as_deref()),
            Action::RunCommand { stage, command } => {
                let stage = self.stage(stage)?;
                let spec = CommandSpec::from_parts(&self.tools.shell, [command.clone()])
                    .ok_or_else(|| ActionError::invalid("shell command is empty"))?;
                let spec = with_stage_context(spec, stage);
                self.run_checked(&spec)
            }
        }
    }

    fn stage(&self, name: &str) -> Result<&Stage, ActionError> {
        self.graph
            .get(name)
            .ok_or_else(|| ActionError::invalid(format!("stage '{name}' is not part of the graph")))
    }

    fn run_checked(&mut self, spec: &CommandSpec) -> Result<(), ActionError> {
        let output = self.runner.run(spec)?;
        output.check(spec)?;
        Ok(())
    }

    fn build_from_source(
        &mut self,
        stage_name: &str,
        dependency: &str,
        config_hash: &str,
    ) -> Result<(), ActionError> {
        let stage = self.stage(stage_name)?;
        let source = stage.source().filter(|s| s.name == dependency).ok_or_else(|| {
            ActionError::invalid(format!("stage '{stage_name}' does not build '{dependency}'"))
        })?;

        let command = source.render_command(&stage.name, &stage.build_type);
        let spec = CommandSpec::from_parts(&self.tools.shell, [command])
            .ok_or_else(|| ActionError::invalid("shell command is empty"))?;
        let spec = with_stage_context(spec, stage);

        let manifest_file = source
            .install_manifest
            .as_ref()
            .map(|path| resolve_in_workdir(stage, path));
        let declared: Vec<PathBuf> = stage.def.outputs.iter().map(PathBuf::from).collect();

        self.run_checked(&spec)?;

        let paths = match manifest_file {
            Some(file) => read_install_manifest(&file)?,
            None => declared,
        };

        let key = ManifestKey::new(stage_name, dependency);
        self.tracker.record(&key, config_hash, paths)?;
        Ok(())
    }

    fn uninstall(
        &mut self,
        stage: &str,
        key: &ManifestKey,
        config_hash: &str,
    ) -> Result<(), ActionError> {
        let Some(entry) = self.tracker.lookup(key)? else {
            tracing::warn!("No manifest recorded for {key}; treating as already clean");
            return Ok(());
        };

        if entry.config_hash != config_hash {
            return Err(ActionError::ConfigMismatch {
                key: key.to_string(),
                recorded: entry.config_hash,
                planned: config_hash.to_string(),
            });
        }

        let report = if key.stage == stage {
            self.tracker.uninstall(&entry)?
        } else {
            // Replacing what another stage installed; its record stays
            self.tracker.clear_paths(&entry)?
        };

        tracing::debug!(
            "Removed {} paths for {key} in stage '{stage}' ({} already absent)",
            report.removed.len(),
            report.missing.len()
        );
        Ok(())
    }

    fn copy_artifacts(
        &mut self,
        source: &str,
        dest: &str,
        patterns: &[String],
        dest_dir: Option<&str>,
    ) -> Result<(), ActionError> {
        let source_root = self.stage(source)?.root();
        let dest_stage = self.stage(dest)?;
        let dest_root = dest_stage.root();

        let mut copies = Vec::new();
        for pattern in patterns {
            let matches = filesystem::expand_pattern(&source_root, pattern)?;
            if matches.is_empty() {
                return Err(ActionError::NoMatch {
                    pattern: pattern.clone(),
                    stage: source.to_string(),
                });
            }
            for relative in matches {
                let target = match dest_dir {
                    Some(dir) => {
                        let name = relative.file_name().map(PathBuf::from).unwrap_or_default();
                        dest_root.join(dir.trim_start_matches('/')).join(name)
                    }
                    None => dest_root.join(&relative),
                };
                copies.push((source_root.join(&relative), target));
            }
        }

        let mut specs = Vec::with_capacity(copies.len());
        for (from, to) in copies {
            if let Some(parent) = to.parent() {
                filesystem::create_dir_all(parent)?;
            }
            let spec = CommandSpec::from_parts(
                &self.tools.copy,
                [from.display().to_string(), to.display().to_string()],
            )
            .ok_or_else(|| ActionError::invalid("copy command is empty"))?;
            specs.push(with_stage_context(spec, dest_stage));
        }

        for spec in &specs {
            self.run_checked(spec)?;
        }
        Ok(())
    }
}

/// Working directory and environment shared by every command of a stage
fn with_stage_context(spec: CommandSpec, stage: &Stage) -> CommandSpec {
    let mut env: BTreeMap<String, String> = stage.args.clone();
    env.insert("STAGE".to_string(), stage.name.clone());
    env.insert("BUILD_TYPE".to_string(), stage.build_type.to_string());
    spec.current_dir(stage.def.workdir.clone()).envs(env)
}

fn resolve_in_workdir(stage: &Stage, path: &Path) -> PathBuf {
    match &stage.def.workdir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Read a CMake-style install manifest: one installed path per line
fn read_install_manifest(path: &Path) -> Result<Vec<PathBuf>, ActionError> {
    let content = filesystem::read_file(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}
