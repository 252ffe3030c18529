//! Stage definitions
//!
//! A stage is one node of the build graph: it may derive from a parent stage,
//! copy artifacts out of other stages, install system packages, build one
//! dependency from source and run commands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// CMake-style build configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildType {
    Debug,
    #[default]
    Release,
    RelWithDebInfo,
    MinSizeRel,
    /// Any other toolchain-specific configuration name
    Custom(String),
}

impl BuildType {
    /// Name as passed to the build tool
    pub fn as_str(&self) -> &str {
        match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
            Self::RelWithDebInfo => "RelWithDebInfo",
            Self::MinSizeRel => "MinSizeRel",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for BuildType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "release" => Self::Release,
            "relwithdebinfo" => Self::RelWithDebInfo,
            "minsizerel" => Self::MinSizeRel,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for BuildType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<BuildType> for String {
    fn from(value: BuildType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A copy-from edge: selected paths taken out of a completed stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyEdge {
    /// Source stage name
    pub from: String,

    /// Path patterns inside the source stage root (`*` and `**` allowed)
    pub paths: Vec<String>,

    /// Destination directory inside this stage's root.
    /// When unset, each match keeps its source path.
    #[serde(default)]
    pub dest: Option<String>,
}

/// Build directive for a dependency compiled from source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBuild {
    /// Dependency name, shared by every stage that builds it
    pub name: String,

    /// Selected source version
    pub version: String,

    /// Extra configure flags
    #[serde(default)]
    pub flags: Vec<String>,

    /// Shell command template.
    ///
    /// Placeholders: `{name}`, `{version}`, `{build_type}`, `{flags}`, `{stage}`.
    pub command: String,

    /// File listing installed paths one per line (CMake `install_manifest.txt`)
    #[serde(default)]
    pub install_manifest: Option<PathBuf>,
}

impl SourceBuild {
    /// Expand the command template for a stage and build type
    pub fn render_command(&self, stage: &str, build_type: &BuildType) -> String {
        self.command
            .replace("{name}", &self.name)
            .replace("{version}", &self.version)
            .replace("{build_type}", build_type.as_str())
            .replace("{flags}", &self.flags.join(" "))
            .replace("{stage}", stage)
    }
}

/// A stage as written in the stage file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
    /// Unique stage name
    pub name: String,

    /// Parent stage (derive-from edge)
    #[serde(default)]
    pub from: Option<String>,

    /// Copy-from edges, in declaration order
    #[serde(default)]
    pub copy: Vec<CopyEdge>,

    /// Build type, inherited from the parent when unset
    #[serde(default)]
    pub build_type: Option<BuildType>,

    /// System packages to install
    #[serde(default)]
    pub packages: Vec<String>,

    /// Build arguments, exported to commands as environment variables
    #[serde(default)]
    pub args: BTreeMap<String, String>,

    /// From-source dependency build
    #[serde(default)]
    pub source: Option<SourceBuild>,

    /// Commands run after everything else in the stage
    #[serde(default)]
    pub run: Vec<String>,

    /// Paths installed by the source build when no install manifest is written
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Directory materializing this stage's filesystem
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Working directory for commands
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

impl StageDef {
    /// Create a root stage with no configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Derive from a parent stage
    #[must_use]
    pub fn derive_from(mut self, parent: impl Into<String>) -> Self {
        self.from = Some(parent.into());
        self
    }

    /// Add a copy-from edge
    #[must_use]
    pub fn copy_from(mut self, source: impl Into<String>, paths: &[&str]) -> Self {
        self.copy.push(CopyEdge {
            from: source.into(),
            paths: paths.iter().map(|p| (*p).to_string()).collect(),
            dest: None,
        });
        self
    }

    /// Set the build type
    #[must_use]
    pub fn with_build_type(mut self, build_type: BuildType) -> Self {
        self.build_type = Some(build_type);
        self
    }

    /// Add system packages
    #[must_use]
    pub fn with_packages(mut self, packages: &[&str]) -> Self {
        self.packages
            .extend(packages.iter().map(|p| (*p).to_string()));
        self
    }

    /// Add a build argument
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Set the from-source build directive
    #[must_use]
    pub fn with_source(mut self, source: SourceBuild) -> Self {
        self.source = Some(source);
        self
    }

    /// Add a command
    #[must_use]
    pub fn with_run(mut self, command: impl Into<String>) -> Self {
        self.run.push(command.into());
        self
    }

    /// Declare paths installed by the source build
    #[must_use]
    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs.extend(outputs.iter().map(|o| (*o).to_string()));
        self
    }

    /// Set the stage root directory
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

/// Index of a stage inside a [`crate::core::graph::StageGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub usize);

/// A validated stage node with resolved edges and effective configuration
#[derive(Debug, Clone)]
pub struct Stage {
    /// Position in declaration order
    pub id: StageId,

    /// Stage name
    pub name: String,

    /// Resolved parent
    pub parent: Option<StageId>,

    /// Resolved copy-from sources, parallel to `def.copy`
    pub copy_sources: Vec<StageId>,

    /// Effective build type after inheritance
    pub build_type: BuildType,

    /// Effective build arguments after inheritance
    pub args: BTreeMap<String, String>,

    /// The declaration this node was built from
    pub def: StageDef,
}

impl Stage {
    /// The stage's from-source directive, if any
    pub fn source(&self) -> Option<&SourceBuild> {
        self.def.source.as_ref()
    }

    /// Root directory for copy-from resolution
    pub fn root(&self) -> PathBuf {
        self.def.root.clone().unwrap_or_else(|| PathBuf::from("/"))
    }
}
