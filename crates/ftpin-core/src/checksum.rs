//! SHA-256 over the bytes a consumer reads.
//!
//! Hashing happens inline on the consumer side of the stream, after any
//! reconnects, so the digest covers exactly what was delivered.

use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// Reader adapter that counts and hashes everything read through it.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Bytes read so far.
    pub fn byte_count(&self) -> u64 {
        self.bytes
    }

    /// Byte count and lowercase hex digest; returns the inner reader too.
    pub fn finish(self) -> (R, u64, String) {
        let digest = self.hasher.finalize();
        (self.inner, self.bytes, hex::encode(digest))
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}
