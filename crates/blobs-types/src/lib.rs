//! Foundation types for the blobs content-addressable store.
//!
//! Every other blobs crate depends on `blobs-types`. It deliberately carries
//! no hashing and no I/O: an [`ObjectId`] is just a validated 256-bit digest.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Content-addressed identifier (64 lowercase hex characters)
//! - [`TypeError`] — Parse failures for identifiers

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::{ObjectId, DIGEST_LEN, HEX_LEN};
