//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a project with `stages.toml` already written
    #[allow(dead_code)]
    pub fn with_stage_file(content: &str) -> Self {
        let project = Self::new();
        project.create_file("stages.toml", content);
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    #[allow(dead_code)]
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    #[allow(dead_code)]
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run the stagecraft binary inside the project
    #[allow(dead_code)]
    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_stagecraft"));
        cmd.current_dir(self.path())
            .env_remove("STAGECRAFT_FILE")
            .env_remove("STAGECRAFT_STATE_DIR")
            .env_remove("STAGECRAFT_INSTALL_ROOT")
            .env_remove("STAGECRAFT_TIMEOUT")
            .env_remove("RUST_LOG")
            .args(args);
        cmd.output().expect("Failed to execute stagecraft")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert a command succeeded, showing its stderr otherwise
#[allow(dead_code)]
pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed: {}\nstdout: {}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
}

/// Pipeline whose commands only touch the project directory
///
/// `dev` builds `fmt` into `sysroot/`, `deploy` copies the library out of it.
/// `{build_type}` is substituted into the stage file by the caller.
#[allow(dead_code)]
pub const LOCAL_PIPELINE: &str = r#"
[project]
name = "local-pipeline"

[tools]
package_manager = ["true"]

[settings]
state_dir = "state"
install_root = "sysroot"

[[stage]]
name = "base"
packages = ["cmake", "ninja-build"]

[[stage]]
name = "dev"
from = "base"
build_type = "{build_type}"
root = "sysroot"
outputs = ["usr/local/lib/libfmt.a"]

[stage.source]
name = "fmt"
version = "10.2.1"
command = "mkdir -p sysroot/usr/local/lib && echo {build_type} > sysroot/usr/local/lib/libfmt.a"

[[stage]]
name = "deploy"
from = "base"
root = "deploy"

[[stage.copy]]
from = "dev"
paths = ["/usr/local/lib/libfmt*"]
dest = "/app/lib"
"#;

/// [`LOCAL_PIPELINE`] with the dev stage at `build_type`
#[allow(dead_code)]
pub fn local_pipeline(build_type: &str) -> String {
    LOCAL_PIPELINE.replace("{build_type}", build_type)
}
