//! Content fingerprinting for uploaded videos.
//!
//! A fingerprint is the identity of a video's byte content: SHA-256 truncated
//! to 16 bytes, rendered as lowercase hex. Identical bytes always produce the
//! same fingerprint regardless of filename or upload time, which is what makes
//! it usable as the deduplication key for remote uploads. This is a cache key,
//! not an access-control token, so collision resistance beyond "overwhelmingly
//! unlikely by accident" is not required.

use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest bytes kept after truncation (32 hex chars).
const FINGERPRINT_BYTES: usize = 16;

/// Chunk size for streaming hashing.
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Stable identity of one video's byte content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoFingerprint(String);

impl VideoFingerprint {
    /// Fingerprint a whole in-memory buffer.
    ///
    /// Acceptable for this system because uploads are bounded by the size
    /// ceiling; use [`VideoFingerprint::from_reader`] when streaming.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// Fingerprint a byte stream without holding it all in memory.
    pub fn from_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let digest = hasher.finalize();
        Ok(Self(hex::encode(&digest[..FINGERPRINT_BYTES])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines and display names.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for VideoFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
