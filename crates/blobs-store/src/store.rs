use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use blobs_types::ObjectId;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::layout::Layout;

/// Handle on a filesystem-backed object store.
///
/// The handle is a plain value: the root, the configuration and the derived
/// [`Layout`]. It holds no open files and no interior mutability, so it can
/// be cloned and shared freely. Every operation derives its paths from the
/// handle it is called on.
#[derive(Clone, Debug)]
pub struct Store {
    layout: Layout,
    config: StoreConfig,
}

impl Store {
    /// Open the store rooted at `root` with the default configuration.
    ///
    /// Only resolves `root` to an absolute path; the directories are created
    /// lazily by the first write.
    ///
    /// The root is made absolute but not canonicalized, and staging links are
    /// matched against it lexically. Every handle that links into or
    /// collects a store must spell its root the same way: a handle opened
    /// through a symlinked parent does not recognise links written through
    /// the real path, and its collection would treat those objects as
    /// unreachable.
    pub fn load(root: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_config(root, StoreConfig::default())
    }

    /// Open the store rooted at `root` with a custom configuration.
    pub fn with_config(root: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let root = root.as_ref();
        let absolute = std::path::absolute(root).map_err(|source| StoreError::PathResolution {
            path: root.to_path_buf(),
            source,
        })?;
        config.validate()?;
        let layout = Layout::new(&absolute, &config);
        debug!(root = %layout.root().display(), algorithm = %config.algorithm, "store loaded");
        Ok(Self { layout, config })
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether a committed object with this id is present.
    pub fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        match fs::symlink_metadata(self.layout.blob_path(id)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Open an object for reading.
    pub fn open(&self, id: &ObjectId) -> StoreResult<File> {
        File::open(self.layout.blob_path(id)).map_err(|e| missing(e, id))
    }

    /// Read an object fully into memory.
    pub fn read(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let mut data = Vec::new();
        self.open(id)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Resolve a hex identifier to a committed object.
    ///
    /// The string is validated before any path is built from it. Malformed
    /// input cannot name a committed object, so it reports `NotFound` just
    /// like a well-formed id that is absent.
    pub fn load_hex(&self, hex: &str) -> StoreResult<ObjectId> {
        let id = ObjectId::from_hex(hex).map_err(|e| {
            debug!(input = hex, error = %e, "rejected malformed object id");
            StoreError::NotFound(hex.to_string())
        })?;
        if self.exists(&id)? {
            Ok(id)
        } else {
            Err(StoreError::NotFound(id.to_hex()))
        }
    }

    /// Delete an object.
    ///
    /// Staging links that still point at it are left dangling. Only the
    /// garbage collector knows whether removal is safe.
    pub fn remove(&self, id: &ObjectId) -> StoreResult<()> {
        if !self.exists(id)? {
            return Err(StoreError::NotFound(id.to_hex()));
        }
        fs::remove_file(self.layout.blob_path(id)).map_err(|e| missing(e, id))?;
        debug!(id = %id, "removed object");
        Ok(())
    }

    /// Every committed object, in traversal order.
    ///
    /// Files in the blob area that do not sit where their name says they
    /// should are not objects; they are reported and skipped.
    pub fn list(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in WalkDir::new(self.layout.blob_root()).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if vanished(&err) => continue,
                Err(err) => return Err(err.into()),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match self.layout.id_from_blob_path(entry.path()) {
                Some(id) => ids.push(id),
                None => warn!(path = %entry.path().display(), "ignoring stray file in blob area"),
            }
        }
        Ok(ids)
    }

    /// Size of an object in bytes.
    pub fn size(&self, id: &ObjectId) -> StoreResult<u64> {
        let meta = fs::metadata(self.layout.blob_path(id)).map_err(|e| missing(e, id))?;
        Ok(meta.len())
    }

    /// When the object was last published.
    pub fn modified(&self, id: &ObjectId) -> StoreResult<SystemTime> {
        let meta = fs::metadata(self.layout.blob_path(id)).map_err(|e| missing(e, id))?;
        Ok(meta.modified()?)
    }

    /// Re-hash an object and compare against its name.
    pub fn verify(&self, id: &ObjectId) -> StoreResult<()> {
        let computed = self.config.algorithm.hash_reader(self.open(id)?)?;
        if computed != *id {
            warn!(id = %id, computed = %computed, "object content does not match its name");
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(())
    }

    /// Stream a reader into a new write session and commit it.
    pub fn put<R: Read>(&self, mut reader: R) -> StoreResult<ObjectId> {
        let mut session = self.create()?;
        io::copy(&mut reader, &mut session)?;
        self.commit(session)
    }

    /// Delete temp files older than `min_age`.
    ///
    /// Sessions that were never committed (a crashed writer) leave their
    /// temp file behind. The collector does not look at the temp area, so
    /// this is how those orphans are reclaimed. Pick `min_age` well above
    /// the longest expected write to avoid deleting a live session's file.
    pub fn prune_temp(&self, min_age: Duration) -> StoreResult<Vec<PathBuf>> {
        let now = SystemTime::now();
        let mut pruned = Vec::new();
        for entry in WalkDir::new(self.layout.temp_root()).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if vanished(&err) => continue,
                Err(err) => return Err(err.into()),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let modified = match entry.metadata() {
                Ok(meta) => meta.modified()?,
                Err(err) if vanished(&err) => continue,
                Err(err) => return Err(err.into()),
            };
            if now.duration_since(modified).unwrap_or(Duration::ZERO) < min_age {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "pruned abandoned temp file");
                    pruned.push(entry.into_path());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(pruned)
    }
}

/// Map a filesystem "not found" onto the object-level error.
fn missing(err: io::Error, id: &ObjectId) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(id.to_hex())
    } else {
        StoreError::Io(err)
    }
}

/// A walk error caused by an entry disappearing mid-traversal, or by the
/// walked area not existing yet.
pub(crate) fn vanished(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}
