//! External command execution
//!
//! The executor hands every package install, build, copy and run command to a
//! [`CommandRunner`]. [`ProcessRunner`] spawns real processes; tests plug in
//! their own runner.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

use crate::error::RunnerError;

/// A command to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Create a command for a program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Build from a `[program, args...]` prefix plus trailing arguments
    pub fn from_parts(prefix: &[String], rest: impl IntoIterator<Item = String>) -> Option<Self> {
        let (program, args) = prefix.split_first()?;
        let mut spec = Self::new(program.clone());
        spec.args.extend(args.iter().cloned());
        spec.args.extend(rest);
        Some(spec)
    }

    /// Add an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn current_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cwd = dir;
        self
    }

    /// Add environment variables
    #[must_use]
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Shell-like rendering for logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.contains(char::is_whitespace) {
                    format!("'{part}'")
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful exit with no output
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a nonzero exit into an error
    pub fn check(self, spec: &CommandSpec) -> Result<Self, RunnerError> {
        if self.success() {
            Ok(self)
        } else {
            Err(RunnerError::NonZeroExit {
                command: spec.display(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Executes external commands
pub trait CommandRunner {
    /// Run a command to completion
    ///
    /// A nonzero exit is reported through [`CommandOutput::code`], not as an
    /// error; errors mean the command could not be run at all.
    fn run(&mut self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as child processes
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&mut self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        // Bare names are looked up on PATH for a clearer error than ENOENT
        if !spec.program.contains('/') && which::which(&spec.program).is_err() {
            return Err(RunnerError::ProgramNotFound {
                program: spec.program.clone(),
            });
        }

        tracing::debug!("Running: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).envs(&spec.env);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|e| RunnerError::Spawn {
            program: spec.program.clone(),
            error: e.to_string(),
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !result.stdout.is_empty() {
            tracing::trace!("stdout: {}", result.stdout.trim_end());
        }
        Ok(result)
    }
}
