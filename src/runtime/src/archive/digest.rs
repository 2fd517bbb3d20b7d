//! SHA-256 digest helpers.

use std::io::{self, Read, Write};
use std::path::Path;

use cnb_assets_core::error::{AssetError, Result};
use sha2::{Digest, Sha256};

/// Prefix used for all digests and diff-ids.
pub const SHA256_PREFIX: &str = "sha256:";

/// A writer that hashes everything passing through it on the way to `inner`.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush `inner` and return it with the hex digest of the written bytes.
    pub fn finish(mut self) -> io::Result<(W, String)> {
        self.inner.flush()?;
        Ok((self.inner, hex::encode(self.hasher.finalize())))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Compute SHA256 digest of raw bytes.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute SHA256 digest of a file, streaming its content.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        AssetError::Other(format!(
            "Failed to open file for hashing {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 32 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Split `sha256:<hex>` into algorithm and hash; bare hashes are sha256.
pub fn parse_digest(digest: &str) -> (&str, &str) {
    match digest.split_once(':') {
        Some((algorithm, hash)) => (algorithm, hash),
        None => ("sha256", digest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_hashing_writer_tees_and_hashes() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hel").unwrap();
        writer.write_all(b"lo").unwrap();
        assert_eq!(writer.written(), 5);

        let (inner, digest) = writer.finish().unwrap();
        assert_eq!(inner, b"hello");
        assert_eq!(digest, HELLO_SHA256);
    }

    #[test]
    fn test_sha256_bytes() {
        assert_eq!(sha256_bytes(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn test_sha256_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_sha256_file_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(sha256_file(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_parse_digest() {
        assert_eq!(parse_digest("sha256:abc"), ("sha256", "abc"));
        assert_eq!(parse_digest("abc"), ("sha256", "abc"));
    }
}
