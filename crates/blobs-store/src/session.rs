//! Write sessions and the commit that publishes them.
//!
//! A session is a uniquely named temp file plus a digest accumulator. Every
//! byte the file accepts is fed to the accumulator in the same call, so the
//! identifier computed at commit is always the digest of what was written.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use blobs_crypto::Digester;
use blobs_types::ObjectId;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreResult;
use crate::store::Store;

/// Prefix of temp file names inside the temp area.
const TEMP_PREFIX: &str = "blob";

/// A single in-flight write.
///
/// Dropping a session without committing it deletes its temp file.
pub struct WriteSession {
    file: NamedTempFile,
    digester: Digester,
    written: u64,
}

impl WriteSession {
    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Location of the backing temp file.
    pub fn temp_path(&self) -> &Path {
        self.file.path()
    }
}

impl Write for WriteSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.digester.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl std::fmt::Debug for WriteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSession")
            .field("temp_path", &self.file.path())
            .field("written", &self.written)
            .field("algorithm", &self.digester.algorithm())
            .finish()
    }
}

impl Store {
    /// Open a new write session in the temp area.
    pub fn create(&self) -> StoreResult<WriteSession> {
        let temp_root = self.layout().temp_root();
        fs::create_dir_all(temp_root)?;
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(temp_root)?;
        debug!(path = %file.path().display(), "write session opened");
        Ok(WriteSession {
            file,
            digester: self.config().algorithm.digester(),
            written: 0,
        })
    }

    /// Publish a session as an immutable object.
    ///
    /// The temp file is synced, named by its digest and moved into the blob
    /// area without ever replacing an existing file. If the object is already
    /// present (identical content committed before, or concurrently) the
    /// redundant temp file is discarded and the existing object stands.
    pub fn commit(&self, session: WriteSession) -> StoreResult<ObjectId> {
        let WriteSession {
            mut file,
            digester,
            written,
        } = session;

        file.flush()?;
        file.as_file().sync_all()?;

        let id = digester.finalize();
        let dest = self.layout().blob_path(&id);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        loop {
            match file.persist_noclobber(&dest) {
                Ok(_) => {
                    debug!(id = %id, bytes = written, "committed object");
                    return Ok(id);
                }
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    match touch(&dest) {
                        Ok(()) => {
                            debug!(id = %id, "object already present; discarding duplicate write");
                            return Ok(id);
                        }
                        // Removed between the two calls; publish ours instead.
                        Err(e) if e.kind() == io::ErrorKind::NotFound => file = err.file,
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(err) => return Err(err.error.into()),
            }
        }
    }
}

/// Bump an existing object's mtime so age-based collection treats a
/// re-commit like a fresh one. Only metadata changes.
fn touch(path: &Path) -> io::Result<()> {
    fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobs_crypto::HashAlgorithm;
    use proptest::prelude::*;
    use std::io::Read;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(dir.path()).unwrap();
        (dir, store)
    }

    fn temp_entries(store: &Store) -> usize {
        fs::read_dir(store.layout().temp_root()).unwrap().count()
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    #[test]
    fn create_makes_temp_file() {
        let (_dir, store) = temp_store();
        let session = store.create().unwrap();
        assert!(session.temp_path().starts_with(store.layout().temp_root()));
        assert!(session
            .temp_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_PREFIX));
        assert_eq!(session.bytes_written(), 0);
    }

    #[test]
    fn sessions_use_distinct_files() {
        let (_dir, store) = temp_store();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        assert_ne!(a.temp_path(), b.temp_path());
    }

    #[test]
    fn writes_reach_the_temp_file() {
        let (_dir, store) = temp_store();
        let mut session = store.create().unwrap();
        session.write_all(b"partial").unwrap();
        session.flush().unwrap();
        assert_eq!(session.bytes_written(), 7);
        assert_eq!(fs::read(session.temp_path()).unwrap(), b"partial");
    }

    #[test]
    fn dropped_session_cleans_up() {
        let (_dir, store) = temp_store();
        let mut session = store.create().unwrap();
        session.write_all(b"abandoned").unwrap();
        let path = session.temp_path().to_path_buf();
        drop(session);
        assert!(!path.exists());
        assert!(store.list().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    #[test]
    fn commit_publishes_under_digest() {
        let (_dir, store) = temp_store();
        let mut session = store.create().unwrap();
        session.write_all(b"hel").unwrap();
        session.write_all(b"lo").unwrap();
        let temp_path = session.temp_path().to_path_buf();
        let id = store.commit(session).unwrap();

        assert_eq!(id, HashAlgorithm::Sha256.hash(b"hello"));
        assert!(!temp_path.exists());
        assert_eq!(fs::read(store.layout().blob_path(&id)).unwrap(), b"hello");
    }

    #[test]
    fn commit_empty_session() {
        let (_dir, store) = temp_store();
        let id = store.commit(store.create().unwrap()).unwrap();
        assert_eq!(id, HashAlgorithm::Sha256.hash(b""));
        assert_eq!(store.read(&id).unwrap(), b"");
    }

    #[test]
    fn duplicate_commit_is_a_no_op() {
        let (_dir, store) = temp_store();
        let first = store.put(&b"hello"[..]).unwrap();

        let second = store.put(&b"hello"[..]).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list().unwrap(), vec![first]);
        assert_eq!(store.read(&first).unwrap(), b"hello");
        // The redundant temp file was discarded.
        assert_eq!(temp_entries(&store), 0);
    }

    #[test]
    fn duplicate_commit_refreshes_mtime() {
        let (_dir, store) = temp_store();
        let id = store.put(&b"payload"[..]).unwrap();
        let path = store.layout().blob_path(&id);
        let old = SystemTime::now() - Duration::from_secs(7200);
        fs::File::options().write(true).open(&path).unwrap().set_modified(old).unwrap();
        assert!(store.modified(&id).unwrap() < SystemTime::now() - Duration::from_secs(3600));

        store.put(&b"payload"[..]).unwrap();
        assert!(store.modified(&id).unwrap() > old);
        assert_eq!(store.read(&id).unwrap(), b"payload");
    }

    #[test]
    fn concurrent_identical_commits_converge() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(8));
        let payload = vec![0x5au8; 64 * 1024];

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let payload = payload.clone();
                thread::spawn(move || {
                    let mut session = store.create().unwrap();
                    session.write_all(&payload).unwrap();
                    barrier.wait();
                    store.commit(session).unwrap()
                })
            })
            .collect();

        let ids: Vec<ObjectId> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.list().unwrap(), vec![ids[0]]);
        assert_eq!(store.read(&ids[0]).unwrap(), payload);
        assert_eq!(temp_entries(&store), 0);
    }

    #[test]
    fn large_streamed_write() {
        let (_dir, store) = temp_store();
        let data: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        let id = store.put(&data[..]).unwrap();
        assert_eq!(id, HashAlgorithm::Sha256.hash(&data));

        let mut read_back = Vec::new();
        store.open(&id).unwrap().read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back, data);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn committed_bytes_match_their_name(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..512), 0..8)
        ) {
            let (_dir, store) = temp_store();
            let mut session = store.create().unwrap();
            let mut all = Vec::new();
            for chunk in &chunks {
                session.write_all(chunk).unwrap();
                all.extend_from_slice(chunk);
            }
            let id = store.commit(session).unwrap();
            prop_assert_eq!(id, HashAlgorithm::Sha256.hash(&all));
            prop_assert_eq!(store.read(&id).unwrap(), all);
        }
    }
}
