//! Build planning
//!
//! Walks the stage graph in dependency order and turns it into a flat list
//! of actions. From-source builds are compared against the manifest tracker
//! so that only stages whose configuration differs are rebuilt. Every build
//! shares one install root, so before a build the planner removes whichever
//! configuration of the dependency is materialized there, whatever stage
//! installed it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::core::graph::StageGraph;
use crate::core::manifest::{config_hash, ConfigDiff, ManifestKey, ManifestStore, ManifestTracker};
use crate::core::stage::{BuildType, Stage, StageId};
use crate::error::ManifestError;

/// Kind of a plan action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    InstallPackages,
    BuildFromSource,
    Uninstall,
    CopyArtifacts,
    RunCommand,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InstallPackages => "install_packages",
            Self::BuildFromSource => "build_from_source",
            Self::Uninstall => "uninstall",
            Self::CopyArtifacts => "copy_artifacts",
            Self::RunCommand => "run_command",
        };
        f.write_str(name)
    }
}

/// One step of a build plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Install system packages into a stage
    InstallPackages { stage: String, packages: Vec<String> },

    /// Build and install a dependency from source
    BuildFromSource {
        stage: String,
        dependency: String,
        version: String,
        build_type: BuildType,
        config_hash: String,
    },

    /// Remove the paths recorded under `key` before a rebuild
    Uninstall {
        stage: String,
        key: ManifestKey,
        config_hash: String,
    },

    /// Copy matching paths out of a completed stage
    CopyArtifacts {
        source: String,
        dest: String,
        paths: Vec<String>,
        dest_dir: Option<String>,
    },

    /// Run a shell command inside a stage
    RunCommand { stage: String, command: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::InstallPackages { .. } => ActionKind::InstallPackages,
            Self::BuildFromSource { .. } => ActionKind::BuildFromSource,
            Self::Uninstall { .. } => ActionKind::Uninstall,
            Self::CopyArtifacts { .. } => ActionKind::CopyArtifacts,
            Self::RunCommand { .. } => ActionKind::RunCommand,
        }
    }

    /// The stage this action runs in (the destination for copies)
    pub fn stage(&self) -> &str {
        match self {
            Self::InstallPackages { stage, .. }
            | Self::BuildFromSource { stage, .. }
            | Self::Uninstall { stage, .. }
            | Self::RunCommand { stage, .. } => stage,
            Self::CopyArtifacts { dest, .. } => dest,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::InstallPackages { packages, .. } => packages.join(" "),
            Self::BuildFromSource {
                dependency,
                version,
                build_type,
                config_hash,
                ..
            } => format!("{dependency} {version} ({build_type}, config {config_hash})"),
            Self::Uninstall {
                key, config_hash, ..
            } => format!("{key} (config {config_hash})"),
            Self::CopyArtifacts {
                source,
                paths,
                dest_dir,
                ..
            } => match dest_dir {
                Some(dir) => format!("from {source}: {} -> {dir}", paths.join(" ")),
                None => format!("from {source}: {}", paths.join(" ")),
            },
            Self::RunCommand { command, .. } => command.clone(),
        }
    }

    /// Stable, execution-independent description of this action
    pub fn record(&self) -> PlanRecord {
        PlanRecord {
            action_kind: self.kind(),
            stage: self.stage().to_string(),
            detail: self.detail(),
        }
    }
}

/// Inspection record of a plan action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub action_kind: ActionKind,
    pub stage: String,
    pub detail: String,
}

impl fmt::Display for PlanRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.action_kind, self.stage, self.detail)
    }
}

/// Ordered list of actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    actions: Vec<Action>,
}

impl From<Vec<Action>> for BuildPlan {
    fn from(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

impl BuildPlan {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions of one kind
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind() == kind).count()
    }

    /// Whether the plan rebuilds nothing
    pub fn is_cache_hit(&self) -> bool {
        self.count(ActionKind::BuildFromSource) == 0 && self.count(ActionKind::Uninstall) == 0
    }

    pub fn records(&self) -> Vec<PlanRecord> {
        self.actions.iter().map(Action::record).collect()
    }

    /// Plan as a JSON array of records
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.records())
    }

    /// Plan as an aligned text table
    pub fn format_text(&self) -> String {
        if self.actions.is_empty() {
            return "Nothing to do".to_string();
        }

        let records = self.records();
        let stage_width = records.iter().map(|r| r.stage.len()).max().unwrap_or(0);
        let mut output = String::new();
        for (i, record) in records.iter().enumerate() {
            output.push_str(&format!(
                "{:>3}. {:<17} {:<width$}  {}\n",
                i + 1,
                record.action_kind.to_string(),
                record.stage,
                record.detail,
                width = stage_width
            ));
        }
        output
    }
}

/// What the planner decided for a stage's source build
#[derive(Debug, Clone)]
struct PlannedEntry {
    hash: String,
    /// Installed (or reinstalled) by this plan
    rebuilt: bool,
}

/// Entry whose paths are on disk at a point in the plan
#[derive(Debug, Clone)]
struct Materialized {
    key: ManifestKey,
    hash: String,
}

/// Planning state carried across stages
#[derive(Default)]
struct PlanState {
    planned: HashMap<(StageId, String), PlannedEntry>,
    /// Per dependency; `None` once looked up and found empty
    materialized: HashMap<String, Option<Materialized>>,
}

/// Computes build plans from a stage graph and recorded manifests
pub struct Planner<'a, S> {
    graph: &'a StageGraph,
    tracker: &'a ManifestTracker<S>,
}

impl<'a, S: ManifestStore> Planner<'a, S> {
    pub fn new(graph: &'a StageGraph, tracker: &'a ManifestTracker<S>) -> Self {
        Self { graph, tracker }
    }

    /// Compute the plan
    ///
    /// Per stage, actions are emitted as: package installs, copies, the
    /// source build (preceded by an uninstall when the configuration
    /// changed), then run commands.
    pub fn plan(&self) -> Result<BuildPlan, ManifestError> {
        let mut actions = Vec::new();
        let mut state = PlanState::default();

        for stage in self.graph.topological_order() {
            if !stage.def.packages.is_empty() {
                actions.push(Action::InstallPackages {
                    stage: stage.name.clone(),
                    packages: stage.def.packages.clone(),
                });
            }

            warn_on_overlapping_copies(stage);
            for (edge, source) in stage.def.copy.iter().zip(&stage.copy_sources) {
                actions.push(Action::CopyArtifacts {
                    source: self.graph.stage(*source).name.clone(),
                    dest: stage.name.clone(),
                    paths: edge.paths.clone(),
                    dest_dir: edge.dest.clone(),
                });
            }

            self.plan_source_build(stage, &mut state, &mut actions)?;

            for command in &stage.def.run {
                actions.push(Action::RunCommand {
                    stage: stage.name.clone(),
                    command: command.clone(),
                });
            }
        }

        Ok(BuildPlan { actions })
    }

    fn plan_source_build(
        &self,
        stage: &Stage,
        state: &mut PlanState,
        actions: &mut Vec<Action>,
    ) -> Result<(), ManifestError> {
        let Some(source) = stage.source() else {
            return Ok(());
        };

        let key = ManifestKey::new(&stage.name, &source.name);
        let hash = config_hash(source, &stage.build_type, &stage.args);
        let inherited = self.inherited(stage.id, &source.name, &state.planned);
        let upstream_rebuilt = inherited.as_ref().is_some_and(|i| i.rebuilt);
        let diff = self.tracker.diff(&key, &hash)?;

        let build = match (&diff, upstream_rebuilt) {
            (ConfigDiff::Unchanged, false) => false,
            (ConfigDiff::Changed(_), false) => true,
            _ => match &inherited {
                // Same bits as the ancestor; only refresh a stale own record
                Some(parent) if parent.hash == hash => matches!(diff, ConfigDiff::Changed(_)),
                _ => true,
            },
        };

        tracing::debug!(
            "Stage '{}' dependency '{}': {:?}, upstream rebuilt: {}, build: {}",
            stage.name,
            source.name,
            diff,
            upstream_rebuilt,
            build
        );

        if build {
            // Nothing marked as on disk; the stage's own stale record is the best guess
            let on_disk = match self.materialized(&source.name, state)? {
                Some(current) => Some(current),
                None => match &diff {
                    ConfigDiff::Changed(old) => Some(Materialized {
                        key: old.key.clone(),
                        hash: old.config_hash.clone(),
                    }),
                    _ => None,
                },
            };

            if let Some(current) = on_disk.filter(|current| current.hash != hash) {
                actions.push(Action::Uninstall {
                    stage: stage.name.clone(),
                    key: current.key,
                    config_hash: current.hash,
                });
            }
            actions.push(Action::BuildFromSource {
                stage: stage.name.clone(),
                dependency: source.name.clone(),
                version: source.version.clone(),
                build_type: stage.build_type.clone(),
                config_hash: hash.clone(),
            });
            state.materialized.insert(
                source.name.clone(),
                Some(Materialized {
                    key,
                    hash: hash.clone(),
                }),
            );
        }

        if build || !matches!(diff, ConfigDiff::New) {
            state.planned.insert(
                (stage.id, source.name.clone()),
                PlannedEntry {
                    hash,
                    rebuilt: build || upstream_rebuilt,
                },
            );
        }

        Ok(())
    }

    /// Entry materialized for a dependency at this point of the plan,
    /// seeded from the store's marker
    fn materialized(
        &self,
        dependency: &str,
        state: &mut PlanState,
    ) -> Result<Option<Materialized>, ManifestError> {
        if let Some(current) = state.materialized.get(dependency) {
            return Ok(current.clone());
        }
        let current = self
            .tracker
            .active_entry(dependency)?
            .map(|entry| Materialized {
                key: entry.key,
                hash: entry.config_hash,
            });
        state
            .materialized
            .insert(dependency.to_string(), current.clone());
        Ok(current)
    }

    /// Nearest derive-from ancestor's planned entry for a dependency
    fn inherited(
        &self,
        id: StageId,
        dependency: &str,
        planned: &HashMap<(StageId, String), PlannedEntry>,
    ) -> Option<PlannedEntry> {
        self.graph
            .ancestors(id)
            .into_iter()
            .find_map(|ancestor| planned.get(&(ancestor, dependency.to_string())).cloned())
    }
}

/// Pairs of copy edges of a stage (zero-based, in declaration order) whose
/// destinations overlap
fn overlapping_copies(stage: &Stage) -> Vec<(usize, usize)> {
    let targets: Vec<(usize, String)> = stage
        .def
        .copy
        .iter()
        .enumerate()
        .flat_map(|(i, edge)| {
            edge.paths.iter().map(move |p| {
                let target = edge.dest.clone().unwrap_or_else(|| literal_prefix(p));
                (i, target)
            })
        })
        .collect();

    let mut overlaps = Vec::new();
    for (a, (edge_a, target_a)) in targets.iter().enumerate() {
        for (edge_b, target_b) in &targets[a + 1..] {
            if edge_a == edge_b || overlaps.contains(&(*edge_a, *edge_b)) {
                continue;
            }
            let (pa, pb) = (Path::new(target_a), Path::new(target_b));
            if pa.starts_with(pb) || pb.starts_with(pa) {
                overlaps.push((*edge_a, *edge_b));
            }
        }
    }
    overlaps
}

/// Copies run in declaration order, so the later edge wins
fn warn_on_overlapping_copies(stage: &Stage) {
    for (first, second) in overlapping_copies(stage) {
        tracing::warn!(
            "Stage '{}': copy edges {} and {} write overlapping paths; the later copy wins",
            stage.name,
            first + 1,
            second + 1
        );
    }
}

/// Leading path components without wildcards
fn literal_prefix(pattern: &str) -> String {
    let parts: Vec<&str> = pattern
        .split('/')
        .take_while(|part| !crate::infra::filesystem::is_glob(part))
        .collect();
    let prefix = parts.join("/");
    if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix
    }
}

/// Plan a graph against a tracker
pub fn plan<S: ManifestStore>(
    graph: &StageGraph,
    tracker: &ManifestTracker<S>,
) -> Result<BuildPlan, ManifestError> {
    Planner::new(graph, tracker).plan()
}
