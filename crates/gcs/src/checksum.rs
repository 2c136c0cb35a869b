//! Streaming checksums and the verification contract
//!
//! The remote reports digests base64-encoded: MD5 when the object has one,
//! and CRC32C (Castagnoli, big-endian byte order) always. Transfers hash
//! every byte in transmission order and compare raw digest bytes at the
//! end. MD5 is preferred when present; CRC32C is the fallback.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::{Digest as _, Md5};

use gs_core::{Error, Result};

use crate::object::ObjectEntry;

/// Which digest a transfer verifies against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Crc32c,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => write!(f, "md5"),
            ChecksumAlgorithm::Crc32c => write!(f, "crc32c"),
        }
    }
}

/// Order-dependent streaming hasher. `update` is called once per chunk in
/// transmission order; `finalize` only after every chunk was consumed.
#[derive(Debug, Clone)]
pub enum StreamingChecksum {
    Md5(Md5),
    Crc32c(u32),
}

impl StreamingChecksum {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => StreamingChecksum::Md5(Md5::new()),
            ChecksumAlgorithm::Crc32c => StreamingChecksum::Crc32c(0),
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            StreamingChecksum::Md5(_) => ChecksumAlgorithm::Md5,
            StreamingChecksum::Crc32c(_) => ChecksumAlgorithm::Crc32c,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            StreamingChecksum::Md5(hasher) => hasher.update(chunk),
            StreamingChecksum::Crc32c(state) => *state = crc32c::crc32c_append(*state, chunk),
        }
    }

    /// Final digest bytes (16 for MD5, 4 big-endian for CRC32C)
    pub fn finalize(self) -> Vec<u8> {
        match self {
            StreamingChecksum::Md5(hasher) => hasher.finalize().to_vec(),
            StreamingChecksum::Crc32c(state) => state.to_be_bytes().to_vec(),
        }
    }
}

/// Digest fields reported by the remote for one object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDigests {
    pub md5: Option<String>,
    pub crc32c: Option<String>,
}

impl RemoteDigests {
    pub fn from_entry(entry: &ObjectEntry) -> Self {
        Self {
            md5: entry.md5_hash.clone(),
            crc32c: entry.crc32c.clone(),
        }
    }

    /// Parse an `X-Goog-Hash` header: comma-separated `algo=base64value`
    /// pairs, where the value itself may contain `=` padding.
    pub fn from_hash_header(header: &str) -> Self {
        let mut digests = RemoteDigests::default();
        for part in header.split(',') {
            let Some((name, value)) = part.trim().split_once('=') else {
                continue;
            };
            match name {
                "md5" => digests.md5 = Some(value.to_string()),
                "crc32c" => digests.crc32c = Some(value.to_string()),
                _ => {}
            }
        }
        digests
    }

    /// Select the algorithm to verify with: MD5 when present, CRC32C
    /// otherwise. `None` when the remote reported nothing to check against.
    pub fn preferred(&self) -> Option<(ChecksumAlgorithm, &str)> {
        if let Some(md5) = self.md5.as_deref() {
            Some((ChecksumAlgorithm::Md5, md5))
        } else {
            self.crc32c
                .as_deref()
                .map(|c| (ChecksumAlgorithm::Crc32c, c))
        }
    }
}

/// Compare a computed digest against the remote-reported base64 value.
///
/// The comparison is on raw bytes after decoding. The returned error names
/// the destination object.
pub fn verify_digest(
    computed: &[u8],
    expected_b64: &str,
    bucket: &str,
    key: &str,
) -> Result<()> {
    let expected = BASE64
        .decode(expected_b64.trim())
        .map_err(|e| Error::General(format!("undecodable remote digest '{expected_b64}': {e}")))?;
    if computed == expected.as_slice() {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            expected: expected_b64.trim().to_string(),
            computed: BASE64.encode(computed),
        })
    }
}

/// Base64 of a digest, the encoding the wire format uses
pub fn encode_digest(digest: &[u8]) -> String {
    BASE64.encode(digest)
}

/// Byte and digest bookkeeping for one transfer attempt.
///
/// Owned exclusively by the session driving one file; chunks must be fed in
/// transmission order. Both digests run in parallel because which one the
/// remote will report is not known until the transfer completes.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub processed: u64,
    pub total: Option<u64>,
    md5: StreamingChecksum,
    crc32c: StreamingChecksum,
}

impl TransferProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            processed: 0,
            total,
            md5: StreamingChecksum::new(ChecksumAlgorithm::Md5),
            crc32c: StreamingChecksum::new(ChecksumAlgorithm::Crc32c),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.crc32c.update(chunk);
        self.processed += chunk.len() as u64;
    }

    /// Digest bytes for the requested algorithm over everything processed
    /// so far
    pub fn digest(&self, algorithm: ChecksumAlgorithm) -> Vec<u8> {
        match algorithm {
            ChecksumAlgorithm::Md5 => self.md5.clone().finalize(),
            ChecksumAlgorithm::Crc32c => self.crc32c.clone().finalize(),
        }
    }
}
