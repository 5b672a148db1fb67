use std::io::{self, Read, Write};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Wraps a reader, hashing every byte that passes through it.
///
/// `verify` reads to EOF (if not already there) and compares the running
/// digest against `expected_hex` as a case-insensitive hex string.
pub struct ChecksumReader<R> {
    inner: R,
    hasher: Sha256,
    path: String,
    at_eof: bool,
}

impl<R: Read> ChecksumReader<R> {
    pub fn new(inner: R, path: impl Into<String>) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            path: path.into(),
            at_eof: false,
        }
    }

    fn drain_to_eof(&mut self) -> Result<()> {
        if self.at_eof {
            return Ok(());
        }
        let mut sink = [0u8; 8192];
        loop {
            let n = self.inner.read(&mut sink)?;
            if n == 0 {
                break;
            }
            self.hasher.update(&sink[..n]);
        }
        self.at_eof = true;
        Ok(())
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    /// Reads any remaining bytes to EOF, then compares the digest.
    pub fn verify(mut self, expected_hex: &str) -> Result<()> {
        self.drain_to_eof()?;
        let got = self.digest_hex();
        if got.eq_ignore_ascii_case(expected_hex) {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                path: self.path,
                expected: expected_hex.to_string(),
                got,
            })
        }
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            self.at_eof = true;
        } else {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Wraps a writer, hashing every byte written through it.
pub struct ChecksumWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, hasher: Sha256::new() }
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Computes the SHA-256 of an in-memory buffer, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_matches_computed_digest() {
        let digest = sha256_hex(b"my first update");
        let reader = ChecksumReader::new(&b"my first update"[..], "data/0000/update.ext4");
        reader.verify(&digest).unwrap();
    }

    #[test]
    fn verify_is_case_insensitive() {
        let digest = sha256_hex(b"hello");
        let reader = ChecksumReader::new(&b"hello"[..], "x");
        reader.verify(&digest.to_uppercase()).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_digest() {
        let reader = ChecksumReader::new(&b"hello"[..], "x");
        assert!(reader.verify(&"0".repeat(64)).is_err());
    }

    #[test]
    fn verify_reads_remaining_bytes_first() {
        let mut reader = ChecksumReader::new(&b"hello world"[..], "x");
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        let digest = sha256_hex(b"hello world");
        reader.verify(&digest).unwrap();
    }
}
