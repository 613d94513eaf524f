//! Per-tier disk persistence
//!
//! One file per cached key: `<dir>/<hash>.cache`, where the name is the first
//! 128 bits of the SHA-256 of the key, hex-encoded. Files hold the encoded
//! payload only; all metadata lives in the in-memory entry. Every operation
//! here is best-effort: failures are logged and surface to the tier as
//! "value not available" or "write failed", never as errors to the caller.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::core::error::Result;

pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open (creating if necessary) the tier's directory
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        // 128 bits of the digest keeps names short; collisions are negligible
        self.dir.join(format!("{}.cache", hex::encode(&digest[..16])))
    }

    /// Write the payload for a key; false on any I/O failure
    pub fn write(&self, key: &str, bytes: &[u8]) -> bool {
        let path = self.file_path(key);
        match fs::write(&path, bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("disk cache write failed for {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Read the payload for a key; `None` if missing or unreadable
    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.file_path(key);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("disk cache read failed for {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Remove the payload file for a key, if present
    pub fn remove(&self, key: &str) {
        let path = self.file_path(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("disk cache remove failed for {}: {}", path.display(), e);
            }
        }
    }

    /// Remove every `.cache` file in the tier's directory
    pub fn clear(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("disk cache clear failed for {}: {}", self.dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "cache") {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("disk cache clear failed for {}: {}", path.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read_remove() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path().to_path_buf()).unwrap();

        assert!(store.write("key1", b"payload"));
        assert_eq!(store.read("key1"), Some(b"payload".to_vec()));

        store.remove("key1");
        assert_eq!(store.read("key1"), None);
    }

    #[test]
    fn test_file_name_is_hashed() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path().to_path_buf()).unwrap();
        store.write("some/key:with weird chars", b"x");

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().into_string().unwrap();
        // 16 bytes hex-encoded plus the extension
        assert_eq!(name.len(), 32 + ".cache".len());
        assert!(name.ends_with(".cache"));
    }

    #[test]
    fn test_clear_removes_only_cache_files() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path().to_path_buf()).unwrap();
        store.write("a", b"1");
        store.write("b", b"2");
        fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();

        store.clear();

        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].file_name(), "unrelated.txt");
    }

    #[test]
    fn test_remove_missing_key_is_silent() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path().to_path_buf()).unwrap();
        store.remove("never-written");
    }
}
