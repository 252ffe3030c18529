//! Stage file (stages.toml) parsing
//!
//! The stage file declares the project's stages, the external tools used to
//! execute them and run settings. String values may reference environment
//! variables with `${VAR}` syntax.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::graph::StageGraph;
use crate::core::stage::StageDef;
use crate::error::{StageFileError, StagecraftError};
use crate::infra::filesystem;

/// The declarative stage description
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageFile {
    /// Project metadata
    #[serde(default)]
    pub project: ProjectConfig,

    /// External commands used by the executor
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Run settings
    #[serde(default)]
    pub settings: Settings,

    /// Stage declarations, in declaration order
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageDef>,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_project_name")]
    pub name: String,

    /// Project description
    #[serde(default)]
    pub description: Option<String>,
}

fn default_project_name() -> String {
    "unnamed".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            description: None,
        }
    }
}

/// External tool invocations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Package manager install command; package names are appended
    #[serde(default = "default_package_manager")]
    pub package_manager: Vec<String>,

    /// Shell prefix for build and run commands; the command is appended
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,

    /// Copy command; source and destination are appended
    #[serde(default = "default_copy")]
    pub copy: Vec<String>,
}

fn default_package_manager() -> Vec<String> {
    to_strings(defaults::PACKAGE_MANAGER)
}

fn default_shell() -> Vec<String> {
    to_strings(defaults::SHELL)
}

fn default_copy() -> Vec<String> {
    to_strings(defaults::COPY)
}

fn to_strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            package_manager: default_package_manager(),
            shell: default_shell(),
            copy: default_copy(),
        }
    }
}

/// Run settings; CLI flags and environment variables override these
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Directory holding the manifest store, relative to the stage file
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Root that recorded install paths resolve against
    #[serde(default)]
    pub install_root: Option<PathBuf>,

    /// Abort before the next action once this many seconds have passed
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Substitute environment variables in a string using ${VAR} syntax.
///
/// Unset variables expand to the empty string.
///
/// # Examples
/// ```
/// use stagecraft::core::stagefile::substitute_env_vars;
///
/// std::env::set_var("STAGECRAFT_DOC_VAR", "fmt");
/// let result = substitute_env_vars("lib${STAGECRAFT_DOC_VAR}.a").unwrap();
/// assert_eq!(result, "libfmt.a");
/// std::env::remove_var("STAGECRAFT_DOC_VAR");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, regex::Error> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;

    Ok(re
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

/// Recursively substitute environment variables in a TOML value
fn substitute_in_value(value: &mut toml::Value) -> Result<(), regex::Error> {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s)?;
        }
        toml::Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_in_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

impl StageFile {
    /// Parse from a TOML string, without substitution
    pub fn from_toml(content: &str) -> Result<Self, StageFileError> {
        toml::from_str(content).map_err(|source| StageFileError::Parse { source })
    }

    /// Parse from a TOML string, substituting `${VAR}` in every string value
    pub fn from_toml_with_env(content: &str) -> Result<Self, StageFileError> {
        let mut value: toml::Value =
            toml::from_str(content).map_err(|source| StageFileError::Parse { source })?;
        substitute_in_value(&mut value).map_err(|e| StageFileError::InvalidField {
            stage: "*".to_string(),
            field: "*".to_string(),
            message: e.to_string(),
        })?;
        value
            .try_into()
            .map_err(|source| StageFileError::Parse { source })
    }

    /// Load a stage file with environment substitution
    pub fn load(path: &Path) -> Result<Self, StageFileError> {
        if !path.exists() {
            return Err(StageFileError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = filesystem::read_file(path).map_err(|e| StageFileError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let file = Self::from_toml_with_env(&content)?;
        file.validate()?;
        tracing::debug!(
            "Loaded {} stages from {}",
            file.stages.len(),
            path.display()
        );
        Ok(file)
    }

    /// Field-level checks the graph does not cover
    pub fn validate(&self) -> Result<(), StageFileError> {
        let invalid = |stage: &str, field: &str, message: &str| StageFileError::InvalidField {
            stage: stage.to_string(),
            field: field.to_string(),
            message: message.to_string(),
        };

        for tool in [
            ("tools.package_manager", &self.tools.package_manager),
            ("tools.shell", &self.tools.shell),
            ("tools.copy", &self.tools.copy),
        ] {
            if tool.1.is_empty() {
                return Err(invalid("*", tool.0, "command must not be empty"));
            }
        }

        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(invalid(&stage.name, "name", "must not be empty"));
            }
            if let Some(source) = &stage.source {
                if source.name.trim().is_empty() {
                    return Err(invalid(&stage.name, "source.name", "must not be empty"));
                }
                if source.command.trim().is_empty() {
                    return Err(invalid(&stage.name, "source.command", "must not be empty"));
                }
            }
            for edge in &stage.copy {
                if edge.paths.is_empty() {
                    return Err(invalid(
                        &stage.name,
                        "copy.paths",
                        &format!("copy from '{}' lists no paths", edge.from),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Build the validated stage graph
    pub fn graph(&self) -> Result<StageGraph, StagecraftError> {
        Ok(StageGraph::new(self.stages.clone())?)
    }
}
