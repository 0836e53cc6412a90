use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use blobs_types::ObjectId;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;

/// Hash construction used to name objects.
///
/// Both algorithms produce 256-bit digests, so object identifiers are always
/// 64 hex characters. A store must be read with the algorithm it was written
/// with; nothing in the blob area records which one that was.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 (FIPS 180-4).
    #[default]
    Sha256,
    /// BLAKE3 in its default (unkeyed) mode.
    Blake3,
}

impl HashAlgorithm {
    /// Start a fresh incremental accumulator.
    pub fn digester(self) -> Digester {
        match self {
            Self::Sha256 => Digester::Sha256(sha2::Sha256::new()),
            Self::Blake3 => Digester::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Hash a complete buffer.
    pub fn hash(self, data: &[u8]) -> ObjectId {
        let mut digester = self.digester();
        digester.update(data);
        digester.finalize()
    }

    /// Hash everything a reader yields until EOF.
    pub fn hash_reader<R: Read>(self, mut reader: R) -> io::Result<ObjectId> {
        let mut digester = self.digester();
        io::copy(&mut reader, &mut digester)?;
        Ok(digester.finalize())
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// Stable lowercase name, as used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Returned when a hash algorithm name is not recognised.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown hash algorithm: {0} (expected sha256 or blake3)")]
pub struct UnknownAlgorithm(pub String);

/// Incremental digest accumulator.
///
/// Implements [`Write`] so it can sit on the receiving end of `io::copy`;
/// writes never fail and always consume the whole buffer.
pub enum Digester {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Digester {
    /// Feed bytes into the accumulator.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Consume the accumulator and produce the identifier.
    pub fn finalize(self) -> ObjectId {
        match self {
            Self::Sha256(h) => ObjectId::from_hash(h.finalize().into()),
            Self::Blake3(h) => ObjectId::from_hash(*h.finalize().as_bytes()),
        }
    }

    /// The algorithm this accumulator implements.
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha256(_) => HashAlgorithm::Sha256,
            Self::Blake3(_) => HashAlgorithm::Blake3,
        }
    }
}

impl Write for Digester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digester")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}
