//! Error types for stagecraft
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::plan::PlanRecord;

/// Kind of edge a stage reference was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// `from = "..."` on a stage
    DeriveFrom,
    /// `[[stage.copy]] from = "..."`
    CopyFrom,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeriveFrom => write!(f, "derive-from"),
            Self::CopyFrom => write!(f, "copy-from"),
        }
    }
}

/// Stage graph construction errors
///
/// These are fatal and reported before any action runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A derive-from or copy-from edge names a stage that was never declared
    #[error("Stage '{stage}' has a {edge} reference to unknown stage '{reference}'")]
    UnknownStageReference {
        stage: String,
        reference: String,
        edge: EdgeKind,
    },

    /// Two stages share a name
    #[error("Stage name '{name}' is declared more than once")]
    DuplicateStageName { name: String },

    /// The edges form a cycle
    #[error("Cyclic stage dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}

/// Persisted manifest store errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Store content is unreadable or inconsistent
    #[error("Manifest store '{location}' is corrupt: {reason}")]
    Corrupt { location: String, reason: String },

    /// IO error while reading or writing the store
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Another run holds the store lock
    #[error("Manifest store '{path}' is locked by another run")]
    Locked { path: PathBuf },

    /// Removing a recorded path failed for a reason other than absence
    #[error("Failed to remove installed path '{path}': {error}")]
    RemovePath { path: PathBuf, error: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Invalid path pattern
    #[error("Invalid path pattern '{pattern}': {error}")]
    Pattern { pattern: String, error: String },

    /// A directory below a copy source could not be walked
    #[error("Failed to walk '{path}': {error}")]
    Walk { path: PathBuf, error: String },
}

/// Stage file loading errors
#[derive(Error, Debug)]
pub enum StageFileError {
    /// Stage file not found
    #[error("Stage file not found at '{path}'")]
    NotFound { path: PathBuf },

    /// IO error reading the stage file
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// TOML parse error
    #[error("Failed to parse stage file: {source}")]
    Parse { source: toml::de::Error },

    /// Invalid field value
    #[error("Stage '{stage}' has invalid field '{field}': {message}")]
    InvalidField {
        stage: String,
        field: String,
        message: String,
    },
}

/// Why a single plan action failed
#[derive(Error, Debug)]
pub enum ActionError {
    /// The command could not be run or exited nonzero
    #[error(transparent)]
    Command(#[from] RunnerError),

    /// Reading or updating the manifest store failed
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Filesystem work around the command failed
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// A copy pattern matched nothing in its source stage
    #[error("Pattern '{pattern}' matched nothing in stage '{stage}'")]
    NoMatch { pattern: String, stage: String },

    /// The recorded entry changed between planning and execution
    #[error("Manifest for {key} has configuration {recorded}, plan expected {planned}")]
    ConfigMismatch {
        key: String,
        recorded: String,
        planned: String,
    },

    /// The action does not fit the graph or tools it runs against
    #[error("{message}")]
    Invalid { message: String },
}

impl ActionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Plan execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// An external command or manifest step failed; later actions were not run
    #[error("Action {action} failed")]
    ActionFailed {
        action: PlanRecord,
        #[source]
        cause: ActionError,
        completed: Vec<PlanRecord>,
    },

    /// The run-level deadline passed before the next action started
    #[error("Run timed out before action {next}")]
    TimedOut {
        next: PlanRecord,
        completed: Vec<PlanRecord>,
    },
}

impl ExecutionError {
    /// Actions that completed before the run stopped
    pub fn completed(&self) -> &[PlanRecord] {
        match self {
            Self::ActionFailed { completed, .. } | Self::TimedOut { completed, .. } => completed,
        }
    }
}

/// Command runner errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunnerError {
    /// Program could not be found on PATH
    #[error("Program '{program}' not found in PATH")]
    ProgramNotFound { program: String },

    /// Spawning the process failed
    #[error("Failed to spawn '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Command exited with a nonzero status
    #[error("'{command}' exited with status {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Top-level stagecraft error type
#[derive(Error, Debug)]
pub enum StagecraftError {
    /// Graph error
    #[error("Stage graph error: {0}")]
    Graph(#[from] GraphError),

    /// Manifest store error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Stage file error
    #[error("Stage file error: {0}")]
    StageFile(#[from] StageFileError),

    /// Execution error
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}
