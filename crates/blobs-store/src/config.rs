use std::path::{Component, Path, PathBuf};

use blobs_crypto::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Layout and hashing parameters of an object store.
///
/// All directories are relative to the store root. The configuration is
/// fixed when a [`Store`](crate::Store) is constructed and never changes
/// afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Fan-out tree of committed objects.
    pub blob_dir: PathBuf,
    /// Scratch files of in-flight write sessions.
    pub temp_dir: PathBuf,
    /// Root of the staging namespace. Empty means the store root itself.
    pub stage_dir: PathBuf,
    /// Advisory lock file taken around garbage collection.
    pub lock_file: PathBuf,
    /// Hash construction naming every object.
    pub algorithm: HashAlgorithm,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            blob_dir: PathBuf::from(".blobs/store"),
            temp_dir: PathBuf::from(".blobs/new"),
            stage_dir: PathBuf::new(),
            lock_file: PathBuf::from(".blobs/lock"),
            algorithm: HashAlgorithm::default(),
        }
    }
}

impl StoreConfig {
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_stage_dir(mut self, stage_dir: impl Into<PathBuf>) -> Self {
        self.stage_dir = stage_dir.into();
        self
    }

    /// Check that the areas are plain relative paths that do not overlap.
    ///
    /// The temp area must not sit inside the blob area (temp files would be
    /// listed as objects) and neither may the stage area (links would be
    /// swept as strays).
    pub fn validate(&self) -> StoreResult<()> {
        let blob = plain_relative("blob_dir", &self.blob_dir, false)?;
        let temp = plain_relative("temp_dir", &self.temp_dir, false)?;
        let stage = plain_relative("stage_dir", &self.stage_dir, true)?;
        let lock = plain_relative("lock_file", &self.lock_file, false)?;

        if blob.starts_with(&temp) || temp.starts_with(&blob) {
            return Err(StoreError::InvalidConfig(
                "blob_dir and temp_dir must not overlap".into(),
            ));
        }
        for (name, path) in [("stage_dir", &stage), ("lock_file", &lock)] {
            if path.starts_with(&blob) || path.starts_with(&temp) {
                return Err(StoreError::InvalidConfig(format!(
                    "{name} must not lie inside blob_dir or temp_dir"
                )));
            }
        }
        Ok(())
    }
}

fn plain_relative(name: &str, path: &Path, allow_empty: bool) -> StoreResult<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(StoreError::InvalidConfig(format!(
                    "{name} must be a relative path without '..': {}",
                    path.display()
                )))
            }
        }
    }
    if out.as_os_str().is_empty() && !allow_empty {
        return Err(StoreError::InvalidConfig(format!("{name} must not be empty")));
    }
    Ok(out)
}
