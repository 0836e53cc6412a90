//! Staging links: the only way an object becomes reachable.
//!
//! A staging link is a symbolic link somewhere under the stage area whose
//! target is the blob path of a committed object. The store keeps no other
//! record of them; [`Store::linked`] rediscovers them by walking the stage
//! area every time it is called.
//!
//! Valid stage paths:
//! - Must be non-empty and relative
//! - Must not contain `..` or a root/prefix component
//! - Must not land inside the blob area, the temp area, or on the lock file

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use blobs_types::ObjectId;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::layout::normalize;
use crate::store::{vanished, Store};

/// Reachability map: every linked object and the stage paths naming it.
pub type Linked = BTreeMap<ObjectId, Vec<PathBuf>>;

/// Validate a caller-supplied stage path, returning it with `.` components
/// dropped.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use blobs_store::validate_stage_path;
///
/// assert!(validate_stage_path(Path::new("latest/greeting")).is_ok());
/// assert!(validate_stage_path(Path::new("")).is_err());
/// assert!(validate_stage_path(Path::new("../outside")).is_err());
/// assert!(validate_stage_path(Path::new("/etc/passwd")).is_err());
/// ```
pub fn validate_stage_path(path: &Path) -> StoreResult<PathBuf> {
    let invalid = |reason: &str| StoreError::InvalidStagePath {
        path: path.to_path_buf(),
        reason: reason.into(),
    };

    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("must be relative to the stage area"))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(invalid("must not be empty"));
    }
    Ok(clean)
}

impl Store {
    /// Validate `path` and locate it under the stage area.
    fn resolve_stage_path(&self, path: &Path) -> StoreResult<PathBuf> {
        let rel = validate_stage_path(path)?;
        let full = self.layout().stage_path(&rel);
        if self.layout().is_internal(&full) {
            return Err(StoreError::InvalidStagePath {
                path: path.to_path_buf(),
                reason: "collides with the store's own files".into(),
            });
        }
        Ok(full)
    }

    /// Point the staging link at `stage_path` to a committed object.
    ///
    /// Whatever file or link already sits at `stage_path` is replaced. The
    /// replacement is remove-then-create, so concurrent `link` calls on the
    /// same path may interleave; distinct paths are independent. The blob
    /// area is never modified.
    pub fn link(&self, id: &ObjectId, stage_path: impl AsRef<Path>) -> StoreResult<()> {
        let link_path = self.resolve_stage_path(stage_path.as_ref())?;
        if !self.exists(id)? {
            return Err(StoreError::NotCommitted(*id));
        }

        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::symlink_metadata(&link_path) {
            Ok(meta) if meta.is_dir() => {
                return Err(StoreError::InvalidStagePath {
                    path: stage_path.as_ref().to_path_buf(),
                    reason: "a directory exists at this path".into(),
                })
            }
            Ok(_) => {
                fs::remove_file(&link_path)?;
                debug!(path = %link_path.display(), "replacing existing stage entry");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        symlink(&self.layout().blob_path(id), &link_path)?;
        debug!(id = %id, path = %link_path.display(), "linked object");
        Ok(())
    }

    /// Remove the staging link at `stage_path`.
    ///
    /// Returns `Ok(false)` if nothing is there. Refuses to delete anything
    /// that is not a symbolic link.
    pub fn unlink(&self, stage_path: impl AsRef<Path>) -> StoreResult<bool> {
        let link_path = self.resolve_stage_path(stage_path.as_ref())?;
        match fs::symlink_metadata(&link_path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(&link_path)?;
                debug!(path = %link_path.display(), "unlinked stage path");
                Ok(true)
            }
            Ok(_) => Err(StoreError::NotALink(link_path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Every object reachable from the stage area, with the stage-relative
    /// paths of the links naming it.
    ///
    /// Links are not followed. Entries that are not symbolic links, links
    /// that cannot be read, and links pointing anywhere other than an object
    /// location in this store's blob area are all ignored. Dangling links
    /// into the blob area still count.
    pub fn linked(&self) -> StoreResult<Linked> {
        let layout = self.layout();
        let stage_root = layout.stage_root();
        let mut seen = Linked::new();

        let walker = WalkDir::new(stage_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.path().starts_with(layout.blob_root())
                    || e.path().starts_with(layout.temp_root()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if vanished(&err) => continue,
                Err(err) => return Err(err.into()),
            };
            if !entry.path_is_symlink() {
                continue;
            }

            let target = match fs::read_link(entry.path()) {
                Ok(target) => target,
                Err(err) => {
                    debug!(path = %entry.path().display(), error = %err, "skipping unreadable stage entry");
                    continue;
                }
            };
            let target = if target.is_absolute() {
                normalize(&target)
            } else {
                let base = entry.path().parent().unwrap_or(stage_root);
                normalize(&base.join(target))
            };
            if !target.starts_with(layout.blob_root()) {
                continue;
            }
            let Some(id) = layout.id_from_blob_path(&target) else {
                debug!(
                    path = %entry.path().display(),
                    target = %target.display(),
                    "stage link into blob area does not name an object"
                );
                continue;
            };

            let rel = entry
                .path()
                .strip_prefix(stage_root)
                .unwrap_or(entry.path())
                .to_path_buf();
            seen.entry(id).or_default().push(rel);
        }

        Ok(seen)
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
