//! Default configuration values

/// Stage file looked up in the working directory
pub const STAGE_FILE: &str = "stages.toml";

/// State directory, relative to the stage file's directory
pub const STATE_DIR: &str = ".stagecraft";

/// Manifest store file inside the state directory
pub const MANIFEST_STORE_FILE: &str = "manifests.json";

/// Advisory lock file inside the state directory
pub const MANIFEST_LOCK_FILE: &str = "manifests.lock";

/// Manifest store schema version
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Root that relative install paths resolve against
pub const INSTALL_ROOT: &str = "/";

/// Package manager install command
pub const PACKAGE_MANAGER: &[&str] = &["apt-get", "install", "-y", "--no-install-recommends"];

/// Shell used for build and run commands
pub const SHELL: &[&str] = &["sh", "-c"];

/// Copy command for copy-from edges
pub const COPY: &[&str] = &["cp", "-a"];
