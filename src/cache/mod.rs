// classify_worker/src/cache/mod.rs
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::warn;

use crate::classify::Classification;

/// Deterministic fingerprint of a (message, ordered labels) pair.
///
/// Label order is significant: the hosted model receives labels verbatim, so
/// reordered label sets are distinct cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

/// Fingerprint the request content. Every field is length-prefixed so that
/// ("ab", ["c"]) and ("a", ["bc"]) never collide.
pub fn fingerprint(text: &str, labels: &[String]) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update((text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    for label in labels {
        hasher.update((label.len() as u64).to_le_bytes());
        hasher.update(label.as_bytes());
    }
    CacheKey(format!("{:x}", hasher.finalize()))
}

/// Memoization store for classification results.
///
/// Values are a pure function of the key, so concurrent same-key writes are
/// idempotent and need no coordination. Storage failures must degrade to a
/// miss rather than fail the request.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Classification>;
    fn put(&self, key: &CacheKey, value: &Classification);
}

/// Disk-backed cache: one JSON file per entry, named by the fingerprint.
/// Entries survive process restarts. No eviction and no TTL; retention is
/// unbounded.
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_hex()))
    }
}

impl ResultCache for DiskCache {
    fn get(&self, key: &CacheKey) -> Option<Classification> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache entry is corrupt, treating as miss");
                None
            }
        }
    }

    fn put(&self, key: &CacheKey, value: &Classification) {
        let path = self.entry_path(key);
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "cache entry failed to serialize, dropping write");
                return;
            }
        };

        // Write through a temp file so a torn write never lands under the
        // final name.
        let tmp = self.root.join(format!("{}.tmp", key.as_hex()));
        let result = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "cache write failed, dropping entry");
            let _ = fs::remove_file(&tmp);
        }
    }
}

/// In-memory cache used by tests and as the fallback when the cache
/// directory cannot be created.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Classification>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Classification> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    fn put(&self, key: &CacheKey, value: &Classification) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(key.clone(), value.clone());
    }
}
