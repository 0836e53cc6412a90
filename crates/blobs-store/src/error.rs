use std::io;
use std::path::PathBuf;

use blobs_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found, or the identifier could not
    /// possibly name one.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A staging link was requested for an object that was never committed.
    #[error("no committed object: {0}")]
    NotCommitted(ObjectId),

    /// The store root could not be turned into an absolute path.
    #[error("cannot resolve store root {}: {source}", .path.display())]
    PathResolution {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stage path is absolute, escapes the stage area, or collides with
    /// the store's own areas.
    #[error("invalid stage path {}: {reason}", .path.display())]
    InvalidStagePath { path: PathBuf, reason: String },

    /// An entry in the stage area is not a symbolic link.
    #[error("not a staging link: {}", .0.display())]
    NotALink(PathBuf),

    /// Stored bytes no longer hash to the object's identifier.
    #[error("hash mismatch for {id}: content hashes to {computed}")]
    HashMismatch { id: ObjectId, computed: ObjectId },

    /// Another holder owns the store lock.
    #[error("store is locked: {}", .0.display())]
    Locked(PathBuf),

    /// The lock handed to a garbage collection run guards a different store.
    #[error("lock {} does not guard this store", .0.display())]
    WrongLock(PathBuf),

    /// The store configuration is inconsistent.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Returns `true` for the "no such object" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<walkdir::Error> for StoreError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.into())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
