//! Bounded file reading.
//!
//! Files are read through a scoped handle in fixed-size chunks. Every chunk is
//! fed to a SHA-256 hasher as it arrives, so one read yields both the content
//! (for analysis) and the content hash (for the fingerprint).

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

use crate::fingerprint::ContentHash;

pub const CHUNK_SIZE: usize = 64 * 1024;

/// Errors while loading one file.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("file grew past the {limit} byte limit while being read")]
    TooLarge { limit: u64 },
}

/// Raw bytes of a file plus their hash.
#[derive(Debug)]
pub struct LoadedSource {
    pub bytes: Vec<u8>,
    pub hash: ContentHash,
}

/// Read a whole file, refusing to buffer more than `limit` bytes.
pub fn read_bounded(path: &Path, limit: u64) -> Result<LoadedSource, SourceError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut bytes = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let n = read_chunk(&mut file, &mut chunk)?;
        if n == 0 {
            break;
        }
        if bytes.len() as u64 + n as u64 > limit {
            return Err(SourceError::TooLarge { limit });
        }
        hasher.update(&chunk[..n]);
        bytes.extend_from_slice(&chunk[..n]);
    }

    Ok(LoadedSource {
        bytes,
        hash: ContentHash::from_digest(&hasher.finalize()),
    })
}

/// Hash a file without keeping its content.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = read_chunk(&mut file, &mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(ContentHash::from_digest(&hasher.finalize()))
}

/// Leading text of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    /// Lossily decoded, so it may be longer than `raw_len`.
    pub text: String,
    /// Raw bytes read from disk.
    pub raw_len: usize,
    /// The file holds more than `text` shows.
    pub truncated: bool,
}

/// Leading text of a file: at most `max_bytes` raw bytes, cut on a char
/// boundary.
pub fn read_excerpt(path: &Path, max_bytes: usize) -> io::Result<Excerpt> {
    let file = File::open(path)?;
    let mut buf = Vec::with_capacity(max_bytes.min(CHUNK_SIZE));
    // One extra byte tells us whether there was more.
    file.take(max_bytes as u64 + 1).read_to_end(&mut buf)?;

    let truncated = buf.len() > max_bytes;
    buf.truncate(max_bytes);
    let raw_len = buf.len();
    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        // A multi-byte char cut in half decodes as U+FFFD at the very end.
        if text.ends_with('\u{FFFD}') {
            text.pop();
        }
    }
    Ok(Excerpt {
        text,
        raw_len,
        truncated,
    })
}

fn read_chunk(file: &mut File, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(chunk) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_bounded_hashes_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.py");
        let content = "x = 1\n".repeat(20_000);
        std::fs::write(&path, &content).unwrap();

        let loaded = read_bounded(&path, 1024 * 1024).unwrap();
        assert_eq!(loaded.bytes, content.as_bytes());
        assert_eq!(loaded.hash, ContentHash::from_bytes(content.as_bytes()));
        assert_eq!(hash_file(&path).unwrap(), loaded.hash);
    }

    #[test]
    fn test_read_bounded_rejects_growth() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.txt");
        std::fs::write(&path, vec![b'a'; 100]).unwrap();
        assert!(matches!(
            read_bounded(&path, 50),
            Err(SourceError::TooLarge { limit: 50 })
        ));
    }

    #[test]
    fn test_read_excerpt_truncates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "hello world").unwrap();

        let excerpt = read_excerpt(&path, 5).unwrap();
        assert_eq!(excerpt.text, "hello");
        assert_eq!(excerpt.raw_len, 5);
        assert!(excerpt.truncated);

        let excerpt = read_excerpt(&path, 100).unwrap();
        assert_eq!(excerpt.text, "hello world");
        assert_eq!(excerpt.raw_len, 11);
        assert!(!excerpt.truncated);
    }

    #[test]
    fn test_read_excerpt_respects_char_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "a\u{e9}").unwrap();
        let excerpt = read_excerpt(&path, 2).unwrap();
        assert_eq!(excerpt.text, "a");
        assert!(excerpt.truncated);
    }

    #[test]
    fn test_read_excerpt_counts_raw_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("legacy.py");
        let mut bytes = b"x = 1 # caf".to_vec();
        bytes.extend(std::iter::repeat(0xE9).take(100));
        std::fs::write(&path, &bytes).unwrap();

        let excerpt = read_excerpt(&path, 50).unwrap();
        assert_eq!(excerpt.raw_len, 50);
        assert!(excerpt.truncated);
        assert!(excerpt.text.starts_with("x = 1 # caf\u{FFFD}"));
        assert!(excerpt.text.len() > 50);
    }
}
