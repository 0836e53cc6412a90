//! Digest engine for the blobs store.
//!
//! Provides the hash constructions an object store can be configured with
//! and the incremental accumulator a write session feeds as bytes arrive.
//!
//! All crypto operations wrap established libraries — no custom cryptography.

pub mod digest;

pub use digest::{Digester, HashAlgorithm, UnknownAlgorithm};
