//! Install manifest tracking
//!
//! Records which paths a from-source build installed for a given stage, so a
//! later configuration change can remove exactly those paths before the
//! dependency is rebuilt. Entries are keyed by stage and dependency, which
//! lets divergent lineages (Debug in one stage, Release in another) each keep
//! their own record. Only one entry per dependency is materialized in the
//! install root at a time; the store marks which one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::stage::{BuildType, SourceBuild};
use crate::error::ManifestError;

/// Identity of a manifest entry: which stage installed which dependency
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestKey {
    pub stage: String,
    pub dependency: String,
}

impl ManifestKey {
    pub fn new(stage: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            dependency: dependency.into(),
        }
    }

    /// Flat key used by persisted stores
    pub fn store_key(&self) -> String {
        format!("{}/{}", self.stage, self.dependency)
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.dependency, self.stage)
    }
}

/// Paths a from-source build installed under one configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: ManifestKey,

    /// Hash of build type, version, flags and build arguments
    pub config_hash: String,

    /// Installed paths, relative to the install root unless absolute
    pub paths: BTreeSet<PathBuf>,

    /// Seconds since the Unix epoch when the entry was recorded
    #[serde(default)]
    pub recorded_at: u64,
}

/// Result of comparing a requested configuration with the recorded one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigDiff {
    /// Recorded with the same configuration, nothing to do
    Unchanged,
    /// Recorded with another configuration, which must be uninstalled first
    Changed(ManifestEntry),
    /// Never recorded
    New,
}

/// Durable key-value store for manifest entries
pub trait ManifestStore {
    /// Fetch an entry
    fn get(&self, key: &ManifestKey) -> Result<Option<ManifestEntry>, ManifestError>;

    /// Insert or replace an entry
    fn put(&mut self, entry: ManifestEntry) -> Result<(), ManifestError>;

    /// Delete an entry and any marker naming it; deleting a missing entry is
    /// not an error
    fn delete(&mut self, key: &ManifestKey) -> Result<(), ManifestError>;

    /// All entries, ordered by key
    fn list(&self) -> Result<Vec<ManifestEntry>, ManifestError>;

    /// Key of the entry whose paths are on disk for a dependency
    fn active(&self, dependency: &str) -> Result<Option<ManifestKey>, ManifestError>;

    /// Mark (or with `None`, unmark) the entry on disk for a dependency
    fn set_active(
        &mut self,
        dependency: &str,
        key: Option<&ManifestKey>,
    ) -> Result<(), ManifestError>;
}

/// In-process store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<ManifestKey, ManifestEntry>,
    active: BTreeMap<String, ManifestKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ManifestStore for MemoryStore {
    fn get(&self, key: &ManifestKey) -> Result<Option<ManifestEntry>, ManifestError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, entry: ManifestEntry) -> Result<(), ManifestError> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn delete(&mut self, key: &ManifestKey) -> Result<(), ManifestError> {
        self.entries.remove(key);
        if self.active.get(&key.dependency) == Some(key) {
            self.active.remove(&key.dependency);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<ManifestEntry>, ManifestError> {
        Ok(self.entries.values().cloned().collect())
    }

    fn active(&self, dependency: &str) -> Result<Option<ManifestKey>, ManifestError> {
        Ok(self.active.get(dependency).cloned())
    }

    fn set_active(
        &mut self,
        dependency: &str,
        key: Option<&ManifestKey>,
    ) -> Result<(), ManifestError> {
        match key {
            Some(key) => self.active.insert(dependency.to_string(), key.clone()),
            None => self.active.remove(dependency),
        };
        Ok(())
    }
}

/// Compute the configuration hash of a source build
///
/// Covers dependency name, version, build type, flags and build arguments.
/// Arguments come from a `BTreeMap`, so their order is stable.
pub fn config_hash(
    source: &SourceBuild,
    build_type: &BuildType,
    args: &BTreeMap<String, String>,
) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(source.name.as_bytes());
    hasher.update([0]);
    hasher.update(source.version.as_bytes());
    hasher.update([0]);
    hasher.update(build_type.as_str().as_bytes());
    for flag in &source.flags {
        hasher.update([0]);
        hasher.update(flag.as_bytes());
    }
    for (key, value) in args {
        hasher.update([1]);
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }

    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Outcome of removing an entry's paths
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    /// Paths that existed and were removed
    pub removed: Vec<PathBuf>,
    /// Paths that were already absent
    pub missing: Vec<PathBuf>,
}

/// Tracks installed paths per stage and dependency
#[derive(Debug)]
pub struct ManifestTracker<S> {
    store: S,
    install_root: PathBuf,
}

impl<S: ManifestStore> ManifestTracker<S> {
    /// Create a tracker; relative recorded paths resolve against `install_root`
    pub fn new(store: S, install_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            install_root: install_root.into(),
        }
    }

    /// Directory relative paths are resolved against
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Access the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist the paths a stage's build installed
    ///
    /// The entry becomes the one materialized for its dependency.
    pub fn record(
        &mut self,
        key: &ManifestKey,
        config_hash: &str,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<ManifestEntry, ManifestError> {
        let entry = ManifestEntry {
            key: key.clone(),
            config_hash: config_hash.to_string(),
            paths: paths.into_iter().collect(),
            recorded_at: unix_now(),
        };
        tracing::debug!(
            "Recording {} ({} paths, config {})",
            key,
            entry.paths.len(),
            config_hash
        );
        self.store.put(entry.clone())?;
        self.store.set_active(&key.dependency, Some(key))?;
        Ok(entry)
    }

    /// Currently recorded entry for a key
    pub fn lookup(&self, key: &ManifestKey) -> Result<Option<ManifestEntry>, ManifestError> {
        self.store.get(key)
    }

    /// Entry whose paths are currently on disk for a dependency
    pub fn active_entry(&self, dependency: &str) -> Result<Option<ManifestEntry>, ManifestError> {
        match self.store.active(dependency)? {
            Some(key) => self.store.get(&key),
            None => Ok(None),
        }
    }

    /// Whether an entry's paths are the ones materialized in the install root
    pub fn is_installed(&self, entry: &ManifestEntry) -> Result<bool, ManifestError> {
        Ok(self.store.active(&entry.key.dependency)?.as_ref() == Some(&entry.key))
    }

    /// Compare a requested configuration with what is recorded
    pub fn diff(&self, key: &ManifestKey, new_hash: &str) -> Result<ConfigDiff, ManifestError> {
        Ok(match self.lookup(key)? {
            None => ConfigDiff::New,
            Some(entry) if entry.config_hash == new_hash => ConfigDiff::Unchanged,
            Some(entry) => ConfigDiff::Changed(entry),
        })
    }

    /// Remove every recorded path, then drop the record
    ///
    /// Idempotent: absent paths count as clean and a record that is already
    /// gone (or was replaced by another configuration) is left alone.
    pub fn uninstall(&mut self, entry: &ManifestEntry) -> Result<UninstallReport, ManifestError> {
        let report = self.clear_paths(entry)?;

        if let Some(current) = self.store.get(&entry.key)? {
            if current.config_hash == entry.config_hash {
                self.store.delete(&entry.key)?;
            }
        }

        tracing::info!(
            "Uninstalled {} ({} removed, {} already absent)",
            entry.key,
            report.removed.len(),
            report.missing.len()
        );
        Ok(report)
    }

    /// Remove an entry's paths without touching its record
    ///
    /// Used when another stage replaces a dependency this entry installed;
    /// the record stays valid for its own stage but is no longer materialized.
    pub fn clear_paths(&mut self, entry: &ManifestEntry) -> Result<UninstallReport, ManifestError> {
        let mut report = UninstallReport::default();

        // Deepest paths first so files go before their directories
        let mut paths: Vec<&PathBuf> = entry.paths.iter().collect();
        paths.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

        for path in paths {
            let target = self.resolve(path);
            if crate::infra::filesystem::remove_path(&target).map_err(|e| {
                ManifestError::RemovePath {
                    path: target.clone(),
                    error: e.to_string(),
                }
            })? {
                report.removed.push(target);
            } else {
                report.missing.push(target);
            }
        }

        if self.store.active(&entry.key.dependency)?.as_ref() == Some(&entry.key) {
            self.store.set_active(&entry.key.dependency, None)?;
        }

        Ok(report)
    }

    /// All recorded entries
    pub fn entries(&self) -> Result<Vec<ManifestEntry>, ManifestError> {
        self.store.list()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.install_root.join(relative)
    }
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(version: &str) -> SourceBuild {
        SourceBuild {
            name: "fmt".to_string(),
            version: version.to_string(),
            flags: vec!["-DFMT_TEST=OFF".to_string()],
            command: "true".to_string(),
            install_manifest: None,
        }
    }

    fn tracker(root: &Path) -> ManifestTracker<MemoryStore> {
        ManifestTracker::new(MemoryStore::new(), root)
    }

    #[test]
    fn test_config_hash_is_deterministic() {
        let args = BTreeMap::new();
        let h1 = config_hash(&source("10.2.1"), &BuildType::Debug, &args);
        let h2 = config_hash(&source("10.2.1"), &BuildType::Debug, &args);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 32);
    }

    #[test]
    fn test_config_hash_changes_with_each_input() {
        let args = BTreeMap::new();
        let base = config_hash(&source("10.2.1"), &BuildType::Debug, &args);

        assert_ne!(base, config_hash(&source("10.2.1"), &BuildType::Release, &args));
        assert_ne!(base, config_hash(&source("11.0.0"), &BuildType::Debug, &args));

        let mut flagged = source("10.2.1");
        flagged.flags.push("-DFMT_DOC=OFF".to_string());
        assert_ne!(base, config_hash(&flagged, &BuildType::Debug, &args));

        let mut with_args = BTreeMap::new();
        with_args.insert("CC".to_string(), "clang".to_string());
        assert_ne!(base, config_hash(&source("10.2.1"), &BuildType::Debug, &with_args));
    }

    #[test]
    fn test_diff_new_unchanged_changed() {
        let root = TempDir::new().unwrap();
        let mut tracker = tracker(root.path());
        let key = ManifestKey::new("dev", "fmt");

        assert_eq!(tracker.diff(&key, "aaa").unwrap(), ConfigDiff::New);

        tracker
            .record(&key, "aaa", vec![PathBuf::from("lib/libfmt.a")])
            .unwrap();
        assert_eq!(tracker.diff(&key, "aaa").unwrap(), ConfigDiff::Unchanged);

        match tracker.diff(&key, "bbb").unwrap() {
            ConfigDiff::Changed(old) => assert_eq!(old.config_hash, "aaa"),
            other => panic!("expected Changed, got {other:?}"),
        }
    }

    #[test]
    fn test_uninstall_removes_paths_and_record() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("lib")).unwrap();
        std::fs::create_dir_all(root.path().join("include/fmt")).unwrap();
        std::fs::write(root.path().join("lib/libfmt.a"), "archive").unwrap();
        std::fs::write(root.path().join("include/fmt/core.h"), "header").unwrap();

        let mut tracker = tracker(root.path());
        let key = ManifestKey::new("dev", "fmt");
        let entry = tracker
            .record(
                &key,
                "aaa",
                vec![
                    PathBuf::from("/lib/libfmt.a"),
                    PathBuf::from("include/fmt/core.h"),
                    PathBuf::from("include/fmt"),
                ],
            )
            .unwrap();

        let report = tracker.uninstall(&entry).unwrap();

        assert_eq!(report.removed.len(), 3);
        assert!(report.missing.is_empty());
        assert!(!root.path().join("lib/libfmt.a").exists());
        assert!(!root.path().join("include/fmt").exists());
        assert!(root.path().join("lib").exists(), "unrecorded dirs stay");
        assert!(tracker.lookup(&key).unwrap().is_none());
    }

    #[test]
    fn test_uninstall_twice_is_idempotent() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("tool"), "bin").unwrap();

        let mut tracker = tracker(root.path());
        let key = ManifestKey::new("build", "tool");
        let entry = tracker
            .record(&key, "aaa", vec![PathBuf::from("tool")])
            .unwrap();

        let first = tracker.uninstall(&entry).unwrap();
        let second = tracker.uninstall(&entry).unwrap();

        assert_eq!(first.removed.len(), 1);
        assert!(second.removed.is_empty());
        assert_eq!(second.missing.len(), 1);
    }

    #[test]
    fn test_uninstall_keeps_replacement_record() {
        let root = TempDir::new().unwrap();
        let mut tracker = tracker(root.path());
        let key = ManifestKey::new("dev", "fmt");

        let old = tracker.record(&key, "aaa", Vec::new()).unwrap();
        tracker.record(&key, "bbb", Vec::new()).unwrap();
        tracker.uninstall(&old).unwrap();

        let current = tracker.lookup(&key).unwrap().unwrap();
        assert_eq!(current.config_hash, "bbb");
    }

    #[test]
    fn test_clear_paths_keeps_record() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("libfmt.so"), "so").unwrap();

        let mut tracker = tracker(root.path());
        let key = ManifestKey::new("dev", "fmt");
        let entry = tracker
            .record(&key, "aaa", vec![PathBuf::from("libfmt.so")])
            .unwrap();

        let report = tracker.clear_paths(&entry).unwrap();

        assert_eq!(report.removed.len(), 1);
        assert!(!root.path().join("libfmt.so").exists());
        assert!(tracker.lookup(&key).unwrap().is_some());
    }

    #[test]
    fn test_record_marks_entry_materialized() {
        let root = TempDir::new().unwrap();
        let mut tracker = tracker(root.path());

        let debug = tracker
            .record(&ManifestKey::new("debug", "fmt"), "debug", Vec::new())
            .unwrap();
        assert!(tracker.is_installed(&debug).unwrap());

        let release = tracker
            .record(&ManifestKey::new("release", "fmt"), "release", Vec::new())
            .unwrap();
        assert!(tracker.is_installed(&release).unwrap());
        assert!(!tracker.is_installed(&debug).unwrap());
        assert_eq!(tracker.active_entry("fmt").unwrap(), Some(release));
        assert_eq!(tracker.active_entry("zlib").unwrap(), None);
    }

    #[test]
    fn test_clearing_paths_unmarks_materialized_entry() {
        let root = TempDir::new().unwrap();
        let mut tracker = tracker(root.path());
        let entry = tracker
            .record(&ManifestKey::new("dev", "fmt"), "aaa", Vec::new())
            .unwrap();

        tracker.clear_paths(&entry).unwrap();

        assert!(!tracker.is_installed(&entry).unwrap());
        assert!(tracker.active_entry("fmt").unwrap().is_none());
        assert!(tracker.lookup(&entry.key).unwrap().is_some());
    }

    #[test]
    fn test_clearing_inactive_entry_keeps_marker() {
        let root = TempDir::new().unwrap();
        let mut tracker = tracker(root.path());
        let dev = tracker
            .record(&ManifestKey::new("dev", "fmt"), "aaa", Vec::new())
            .unwrap();
        let build = tracker
            .record(&ManifestKey::new("build", "fmt"), "bbb", Vec::new())
            .unwrap();

        tracker.clear_paths(&dev).unwrap();

        assert!(tracker.is_installed(&build).unwrap());
    }

    #[test]
    fn test_entries_are_scoped_per_stage() {
        let root = TempDir::new().unwrap();
        let mut tracker = tracker(root.path());

        tracker
            .record(&ManifestKey::new("dev", "fmt"), "debug", Vec::new())
            .unwrap();
        tracker
            .record(&ManifestKey::new("build", "fmt"), "release", Vec::new())
            .unwrap();

        let entries = tracker.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            tracker
                .diff(&ManifestKey::new("dev", "fmt"), "debug")
                .unwrap(),
            ConfigDiff::Unchanged
        );
        assert_eq!(
            tracker
                .diff(&ManifestKey::new("build", "fmt"), "release")
                .unwrap(),
            ConfigDiff::Unchanged
        );
    }
}
