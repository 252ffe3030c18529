//! File-backed manifest store
//!
//! Entries live in a single JSON document inside the state directory. The
//! store holds an exclusive advisory lock on a sibling lock file for as long
//! as it is open, so two runs never interleave uninstall/install sequences.
//! Next to the entries the document keeps, per dependency, the key of the
//! entry currently materialized in the install root.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::manifest::{ManifestEntry, ManifestKey, ManifestStore};
use crate::error::ManifestError;
use crate::infra::filesystem;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, ManifestEntry>,
    #[serde(default)]
    active: BTreeMap<String, ManifestKey>,
}

/// Manifest store persisted as `manifests.json`
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, ManifestEntry>,
    active: BTreeMap<String, ManifestKey>,
    // Held for the store's lifetime; dropping the file releases the lock
    _lock: File,
}

impl FileStore {
    /// Open (creating if needed) the store in `state_dir` and lock it
    pub fn open(state_dir: &Path) -> Result<Self, ManifestError> {
        std::fs::create_dir_all(state_dir).map_err(|e| ManifestError::Io {
            path: state_dir.to_path_buf(),
            error: e.to_string(),
        })?;

        let lock_path = state_dir.join(defaults::MANIFEST_LOCK_FILE);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ManifestError::Io {
                path: lock_path.clone(),
                error: e.to_string(),
            })?;

        if let Err(e) = lock.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(ManifestError::Locked { path: lock_path });
            }
            return Err(ManifestError::Io {
                path: lock_path,
                error: e.to_string(),
            });
        }

        let path = state_dir.join(defaults::MANIFEST_STORE_FILE);
        let document = Self::read_document(&path)?;
        tracing::debug!(
            "Opened manifest store {} ({} entries)",
            path.display(),
            document.entries.len()
        );

        Ok(Self {
            path,
            entries: document.entries,
            active: document.active,
            _lock: lock,
        })
    }

    /// Location of the JSON document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(path: &Path) -> Result<StoreDocument, ManifestError> {
        if !path.exists() {
            return Ok(StoreDocument {
                version: defaults::MANIFEST_SCHEMA_VERSION,
                entries: BTreeMap::new(),
                active: BTreeMap::new(),
            });
        }

        let content = filesystem::read_file(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let corrupt = |reason: String| ManifestError::Corrupt {
            location: path.display().to_string(),
            reason,
        };

        let document: StoreDocument =
            serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;

        if document.version != defaults::MANIFEST_SCHEMA_VERSION {
            return Err(corrupt(format!(
                "unsupported schema version {} (expected {})",
                document.version,
                defaults::MANIFEST_SCHEMA_VERSION
            )));
        }

        for (key, entry) in &document.entries {
            if *key != entry.key.store_key() {
                return Err(corrupt(format!(
                    "entry '{key}' is recorded under key '{}'",
                    entry.key.store_key()
                )));
            }
            if entry.config_hash.is_empty() || hex::decode(&entry.config_hash).is_err() {
                return Err(corrupt(format!(
                    "entry '{key}' has invalid config hash '{}'",
                    entry.config_hash
                )));
            }
        }

        for (dependency, key) in &document.active {
            if *dependency != key.dependency {
                return Err(corrupt(format!(
                    "dependency '{dependency}' is marked installed by entry '{}'",
                    key.store_key()
                )));
            }
        }

        Ok(document)
    }

    fn persist(&self) -> Result<(), ManifestError> {
        let document = StoreDocument {
            version: defaults::MANIFEST_SCHEMA_VERSION,
            entries: self.entries.clone(),
            active: self.active.clone(),
        };
        let content = serde_json::to_string_pretty(&document).map_err(|e| ManifestError::Io {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        filesystem::write_file_atomic(&self.path, &content).map_err(|e| ManifestError::Io {
            path: self.path.clone(),
            error: e.to_string(),
        })
    }
}

impl ManifestStore for FileStore {
    fn get(&self, key: &ManifestKey) -> Result<Option<ManifestEntry>, ManifestError> {
        Ok(self.entries.get(&key.store_key()).cloned())
    }

    fn put(&mut self, entry: ManifestEntry) -> Result<(), ManifestError> {
        self.entries.insert(entry.key.store_key(), entry);
        self.persist()
    }

    fn delete(&mut self, key: &ManifestKey) -> Result<(), ManifestError> {
        let removed = self.entries.remove(&key.store_key()).is_some();
        let unmarked = self.active.get(&key.dependency) == Some(key);
        if unmarked {
            self.active.remove(&key.dependency);
        }
        if removed || unmarked {
            self.persist()?;
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
        let changed = match key {
            Some(key) => {
                self.active.insert(dependency.to_string(), key.clone()).as_ref() != Some(key)
            }
            None => self.active.remove(dependency).is_some(),
        };
        if changed {
            self.persist()?;
        }
        Ok(())
    }
}
