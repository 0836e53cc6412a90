//! Content-addressed object storage on a local filesystem.
//!
//! Content is written once, named by the digest of its own bytes, and never
//! modified. Objects become reachable through staging links: symbolic links
//! in a separate namespace that point into the blob area. A garbage
//! collector removes objects no staging link reaches.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/
//!   .blobs/store/<h0>/<h1>/<h2..6>/<hex>   committed objects
//!   .blobs/new/blob*                       in-flight write sessions
//!   .blobs/lock                            advisory GC lock
//!   <stage paths...>                       staging links (stage area = root by default)
//! ```
//!
//! # Lifecycle
//!
//! 1. [`Store::create`] opens a [`WriteSession`]; bytes written to it are
//!    hashed as they land in the temp file.
//! 2. [`Store::commit`] moves the temp file to the object's blob path.
//! 3. [`Store::link`] makes the object reachable from a stage path.
//! 4. [`Store::run_gc`] with a [`GarbageCollector`] removes the rest.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once committed; an id always matches its bytes.
//! 2. Publication never overwrites: a duplicate commit keeps the existing file.
//! 3. Reachability is recomputed by traversal; no reference counts are kept.
//! 4. The store handle carries all configuration; there is no global state.
//! 5. Collection must not race link creation; callers prove exclusivity with a [`StoreLock`].
//! 6. All I/O errors are propagated. The one exception: stage entries that are
//!    not readable symbolic links are skipped while computing reachability.

pub mod config;
pub mod error;
pub mod gc;
pub mod layout;
pub mod lock;
pub mod session;
pub mod stage;
pub mod store;

// Re-export primary types at crate root for ergonomic imports.
pub use blobs_crypto::HashAlgorithm;
pub use blobs_types::ObjectId;
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use gc::{GarbageCollector, GcReport, GracePeriod, MarkAndSweep};
pub use layout::Layout;
pub use lock::StoreLock;
pub use session::WriteSession;
pub use stage::{validate_stage_path, Linked};
pub use store::Store;
