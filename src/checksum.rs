//! CRC-32 helpers shared by the data file, the WAL, the coordinator log and
//! the catalog. Every on-disk record format in this crate uses the same
//! algorithm directly (plain CRC-32, IEEE polynomial, via `crc32fast`)
//! rather than leaving it pluggable, so one small module covers all of them.

use crate::error::{EngineError, Result};
use crc32fast::Hasher;

/// Computes the CRC-32 of `data`.
pub fn compute(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies `data` against an `expected` checksum, returning `ChecksumMismatch` on failure.
pub fn verify(data: &[u8], expected: u32) -> Result<()> {
    let actual = compute(data);
    if actual != expected {
        return Err(EngineError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Incremental CRC-32 builder for streaming encode of multi-field records.
pub struct Builder(Hasher);

impl Builder {
    pub fn new() -> Self {
        Self(Hasher::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
