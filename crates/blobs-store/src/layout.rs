//! The path scheme: where objects, temp files, and staging links live.
//!
//! Everything here is a pure function of the store root and its
//! [`StoreConfig`]; nothing touches the filesystem.

use std::path::{Component, Path, PathBuf};

use blobs_types::ObjectId;

use crate::config::StoreConfig;

/// Absolute locations of a store's areas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    blob_root: PathBuf,
    temp_root: PathBuf,
    stage_root: PathBuf,
    lock_path: PathBuf,
}

impl Layout {
    /// Derive the layout for an absolute root.
    pub fn new(root: &Path, config: &StoreConfig) -> Self {
        let root = normalize(root);
        Self {
            blob_root: area(&root, &config.blob_dir),
            temp_root: area(&root, &config.temp_dir),
            stage_root: area(&root, &config.stage_dir),
            lock_path: area(&root, &config.lock_file),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_root(&self) -> &Path {
        &self.blob_root
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    pub fn stage_root(&self) -> &Path {
        &self.stage_root
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Location of an object: `blob_root/h[0]/h[1]/h[2..6]/h`.
    ///
    /// The three fan-out levels hold at most 16, 16 and 65536 entries, so no
    /// directory grows without bound however large the store gets.
    pub fn blob_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        let mut path = self.blob_root.clone();
        path.push(&hex[0..1]);
        path.push(&hex[1..2]);
        path.push(&hex[2..6]);
        path.push(&hex);
        path
    }

    /// Inverse of [`blob_path`](Self::blob_path).
    ///
    /// Returns `None` unless the leaf is a well-formed id *and* the path is
    /// exactly where that id belongs.
    pub fn id_from_blob_path(&self, path: &Path) -> Option<ObjectId> {
        let leaf = path.file_name()?.to_str()?;
        let id = ObjectId::from_hex(leaf).ok()?;
        (self.blob_path(&id) == path).then_some(id)
    }

    /// Location of a staging link. `rel` must already be validated.
    pub fn stage_path(&self, rel: &Path) -> PathBuf {
        self.stage_root.join(rel)
    }

    /// Whether a path falls inside the blob or temp area, or is the lock file.
    pub fn is_internal(&self, path: &Path) -> bool {
        path.starts_with(&self.blob_root)
            || path.starts_with(&self.temp_root)
            || path == self.lock_path
    }
}

fn area(root: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        normalize(&root.join(rel))
    }
}

/// Lexically resolve `.` and `..` components.
///
/// Symlinks along the way are not consulted: `a/link/..` becomes `a`.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
