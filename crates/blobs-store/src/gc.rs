//! Garbage collection.
//!
//! A [`GarbageCollector`] decides *what* to reclaim; [`Store::run_gc`] does
//! the removing. Reachability is recomputed from the stage area on every
//! run. No reference counts are kept anywhere.

use std::time::{Duration, SystemTime};

use blobs_types::ObjectId;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::lock::StoreLock;
use crate::store::Store;

/// Strategy for choosing objects to reclaim.
pub trait GarbageCollector {
    /// Objects that should be removed from `store`.
    fn find(&self, store: &Store) -> StoreResult<Vec<ObjectId>>;
}

/// Default strategy: every committed object that no staging link names.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkAndSweep;

impl GarbageCollector for MarkAndSweep {
    fn find(&self, store: &Store) -> StoreResult<Vec<ObjectId>> {
        let linked = store.linked()?;
        let all = store.list()?;
        debug!(linked = linked.len(), objects = all.len(), "mark phase complete");
        Ok(all
            .into_iter()
            .filter(|id| !linked.contains_key(id))
            .collect())
    }
}

/// Narrows another strategy to objects at least `min_age` old.
///
/// Gives writers a window between commit and link in which a fresh object
/// cannot be collected. Committing content that is already stored resets
/// the object's age.
#[derive(Clone, Debug)]
pub struct GracePeriod<C = MarkAndSweep> {
    pub min_age: Duration,
    pub inner: C,
}

impl GracePeriod<MarkAndSweep> {
    pub fn new(min_age: Duration) -> Self {
        Self {
            min_age,
            inner: MarkAndSweep,
        }
    }
}

impl<C: GarbageCollector> GarbageCollector for GracePeriod<C> {
    fn find(&self, store: &Store) -> StoreResult<Vec<ObjectId>> {
        let now = SystemTime::now();
        let mut old_enough = Vec::new();
        for id in self.inner.find(store)? {
            let modified = match store.modified(&id) {
                Ok(modified) => modified,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if now.duration_since(modified).unwrap_or(Duration::ZERO) >= self.min_age {
                old_enough.push(id);
            }
        }
        Ok(old_enough)
    }
}

/// Outcome of a collection run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub removed: Vec<ObjectId>,
}

impl Store {
    /// Run a collection: find candidates, then remove them in order.
    ///
    /// The first removal failure aborts the run; objects already removed
    /// stay removed. Candidates are recomputed on every run, so a failed or
    /// interrupted run is safely retried.
    ///
    /// `lock` is the caller's proof that no links or commits happen until
    /// this returns; see [`crate::lock`].
    ///
    /// Reachability comes from links whose targets lie under this handle's
    /// root as spelled at [`Store::load`]. Run collection through the same
    /// root spelling the writers use, or their links will not be seen.
    pub fn run_gc<C>(&self, collector: &C, lock: &StoreLock) -> StoreResult<GcReport>
    where
        C: GarbageCollector + ?Sized,
    {
        lock.guards(self)?;
        let candidates = collector.find(self)?;
        info!(candidates = candidates.len(), "garbage collection started");

        let mut report = GcReport::default();
        for id in candidates {
            self.remove(&id)?;
            debug!(id = %id, "collected object");
            report.removed.push(id);
        }
        info!(removed = report.removed.len(), "garbage collection finished");
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(dir.path()).unwrap();
        (dir, store)
    }

    /// Test strategy returning a fixed candidate list.
    struct Fixed(Vec<ObjectId>);

    impl GarbageCollector for Fixed {
        fn find(&self, _store: &Store) -> StoreResult<Vec<ObjectId>> {
            Ok(self.0.clone())
        }
    }

    // -----------------------------------------------------------------------
    // Mark-and-sweep
    // -----------------------------------------------------------------------

    #[test]
    fn finds_only_unlinked_objects() {
        let (_dir, store) = temp_store();
        let kept = store.put(&b"kept"[..]).unwrap();
        let dropped = store.put(&b"dropped"[..]).unwrap();
        store.link(&kept, "keep/me").unwrap();
        assert_eq!(MarkAndSweep.find(&store).unwrap(), vec![dropped]);
    }

    #[test]
    fn empty_store_has_no_candidates() {
        let (_dir, store) = temp_store();
        assert!(MarkAndSweep.find(&store).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    #[test]
    fn link_then_unlink_lifecycle() {
        let (_dir, store) = temp_store();
        let lock = store.lock().unwrap();
        let id = store.put(&b"hello"[..]).unwrap();

        store.link(&id, "latest/greeting").unwrap();
        let report = store.run_gc(&MarkAndSweep, &lock).unwrap();
        assert!(report.removed.is_empty());
        assert!(store.exists(&id).unwrap());

        assert!(store.unlink("latest/greeting").unwrap());
        assert!(!store.linked().unwrap().contains_key(&id));
        let report = store.run_gc(&MarkAndSweep, &lock).unwrap();
        assert_eq!(report.removed, vec![id]);
        assert!(!store.exists(&id).unwrap());
    }

    #[test]
    fn never_removes_linked_objects() {
        let (_dir, store) = temp_store();
        let lock = StoreLock::assume_held();
        let mut linked = Vec::new();
        for i in 0..20u8 {
            let id = store.put(&[i][..]).unwrap();
            if i % 3 == 0 {
                store.link(&id, format!("links/{i}")).unwrap();
                linked.push(id);
            }
        }
        let report = store.run_gc(&MarkAndSweep, &lock).unwrap();
        assert_eq!(report.removed.len(), 20 - linked.len());
        let mut remaining = store.list().unwrap();
        remaining.sort();
        linked.sort();
        assert_eq!(remaining, linked);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let (_dir, store) = temp_store();
        let lock = StoreLock::assume_held();
        store.put(&b"garbage"[..]).unwrap();
        assert_eq!(store.run_gc(&MarkAndSweep, &lock).unwrap().removed.len(), 1);
        assert!(store.run_gc(&MarkAndSweep, &lock).unwrap().removed.is_empty());
    }

    #[test]
    fn dangling_link_to_removed_object_is_harmless() {
        let (_dir, store) = temp_store();
        let lock = StoreLock::assume_held();
        let id = store.put(&b"hello"[..]).unwrap();
        store.link(&id, "greeting").unwrap();
        store.remove(&id).unwrap();
        // The dangling link still marks the id, and nothing is left to sweep.
        assert!(store.run_gc(&MarkAndSweep, &lock).unwrap().removed.is_empty());
    }

    #[test]
    fn sweep_is_fail_fast() {
        let (_dir, store) = temp_store();
        let lock = StoreLock::assume_held();
        let a = store.put(&b"a"[..]).unwrap();
        let missing = ObjectId::from_hash([0u8; 32]);
        let b = store.put(&b"b"[..]).unwrap();

        let err = store
            .run_gc(&Fixed(vec![a, missing, b]), &lock)
            .unwrap_err();
        assert!(err.is_not_found());
        // Progress before the failure is kept; the rest is untouched.
        assert!(!store.exists(&a).unwrap());
        assert!(store.exists(&b).unwrap());

        // A fresh mark-and-sweep finishes the job.
        let report = store.run_gc(&MarkAndSweep, &lock).unwrap();
        assert_eq!(report.removed, vec![b]);
    }

    #[test]
    fn run_gc_rejects_foreign_lock() {
        let (_dir_a, a) = temp_store();
        let (_dir_b, b) = temp_store();
        let id = b.put(&b"hello"[..]).unwrap();
        let lock = a.lock().unwrap();
        assert!(matches!(
            b.run_gc(&MarkAndSweep, &lock),
            Err(StoreError::WrongLock(_))
        ));
        assert!(b.exists(&id).unwrap());
    }

    #[test]
    fn run_gc_accepts_trait_objects() {
        let (_dir, store) = temp_store();
        store.put(&b"x"[..]).unwrap();
        let collector: Box<dyn GarbageCollector> = Box::new(MarkAndSweep);
        let report = store
            .run_gc(collector.as_ref(), &StoreLock::assume_held())
            .unwrap();
        assert_eq!(report.removed.len(), 1);
    }

    #[test]
    fn stage_area_files_survive_gc() {
        let (dir, store) = temp_store();
        fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();
        store.put(&b"garbage"[..]).unwrap();
        store
            .run_gc(&MarkAndSweep, &StoreLock::assume_held())
            .unwrap();
        assert!(dir.path().join("unrelated.txt").exists());
    }

    // -----------------------------------------------------------------------
    // Grace period
    // -----------------------------------------------------------------------

    #[test]
    fn grace_period_protects_young_objects() {
        let (_dir, store) = temp_store();
        let id = store.put(&b"fresh"[..]).unwrap();
        let gc = GracePeriod::new(Duration::from_secs(3600));
        assert!(gc.find(&store).unwrap().is_empty());
        let report = store.run_gc(&gc, &StoreLock::assume_held()).unwrap();
        assert!(report.removed.is_empty());
        assert!(store.exists(&id).unwrap());
    }

    #[test]
    fn grace_period_protects_recommitted_objects() {
        let (_dir, store) = temp_store();
        let id = store.put(&b"payload"[..]).unwrap();
        let two_hours_ago = SystemTime::now() - Duration::from_secs(7200);
        fs::File::options()
            .write(true)
            .open(store.layout().blob_path(&id))
            .unwrap()
            .set_modified(two_hours_ago)
            .unwrap();
        let gc = GracePeriod::new(Duration::from_secs(3600));
        assert_eq!(gc.find(&store).unwrap(), vec![id]);

        // The same content committed again, not yet linked.
        assert_eq!(store.put(&b"payload"[..]).unwrap(), id);
        assert!(gc.find(&store).unwrap().is_empty());
    }

    #[test]
    fn zero_grace_period_matches_inner() {
        let (_dir, store) = temp_store();
        let kept = store.put(&b"kept"[..]).unwrap();
        let dropped = store.put(&b"dropped"[..]).unwrap();
        store.link(&kept, "k").unwrap();
        let gc = GracePeriod::new(Duration::ZERO);
        assert_eq!(gc.find(&store).unwrap(), vec![dropped]);
    }

    #[test]
    fn grace_period_wraps_any_strategy() {
        let (_dir, store) = temp_store();
        let id = store.put(&b"x"[..]).unwrap();
        let gone = ObjectId::from_hash([0xff; 32]);
        let gc = GracePeriod {
            min_age: Duration::ZERO,
            inner: Fixed(vec![gone, id]),
        };
        // Candidates that vanished before the age check are dropped.
        assert_eq!(gc.find(&store).unwrap(), vec![id]);
    }

    #[test]
    fn report_serializes_hex_ids() {
        let id = ObjectId::from_hash([0xab; 32]);
        let report = GcReport { removed: vec![id] };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, format!("{{\"removed\":[\"{}\"]}}", id.to_hex()));
    }
}
