//! Advisory store lock.
//!
//! Mark-and-sweep is not atomic: a link created after the mark phase can
//! point at an object the sweep then deletes. The store does no internal
//! locking, so callers must keep links and commits out of the way while a
//! collection runs. [`StoreLock`] is how they prove it: [`Store::run_gc`]
//! only runs with one in hand.
//!
//! Two ways to hold one:
//! - [`Store::lock`] takes an exclusive OS lock on the store's lock file.
//!   The lock lives as long as the open handle, so a holder that dies
//!   releases it with its file descriptors. Cooperating processes take the
//!   same lock around their own commits and links.
//! - [`StoreLock::assume_held`] for callers that serialize some other way
//!   (a single-threaded tool, an external lock manager).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Token proving exclusive access to a store.
#[derive(Debug)]
pub struct StoreLock {
    held: Option<(PathBuf, File)>,
}

impl StoreLock {
    /// Assert that the caller already serializes collection against links
    /// and commits by other means.
    pub fn assume_held() -> Self {
        Self { held: None }
    }

    /// The lock file backing this token, if any.
    pub fn path(&self) -> Option<&Path> {
        self.held.as_ref().map(|(path, _)| path.as_path())
    }

    /// Whether this token may guard collection on `store`.
    pub(crate) fn guards(&self, store: &Store) -> StoreResult<()> {
        match self.path() {
            Some(path) if path != store.layout().lock_path() => {
                Err(StoreError::WrongLock(path.to_path_buf()))
            }
            _ => Ok(()),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Closing the handle releases the OS lock. The file itself stays.
        if let Some((path, _)) = &self.held {
            debug!(path = %path.display(), "store lock released");
        }
    }
}

impl Store {
    /// Take the store's lock.
    ///
    /// Fails with [`StoreError::Locked`] while another handle holds it. The
    /// lock file is created on first use and never deleted; a file left on
    /// disk without a live holder does not block anyone. While held it
    /// records the holder's process id.
    pub fn lock(&self) -> StoreResult<StoreLock> {
        let path = self.layout().lock_path().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(StoreError::Locked(path))
            }
            Err(e) => return Err(e.into()),
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "store lock acquired");
        Ok(StoreLock {
            held: Some((path, file)),
        })
    }
}
