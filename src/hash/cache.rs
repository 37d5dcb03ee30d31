use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Cache section for full-file digests
pub const SECTION_HASHES: &str = "hashes";
/// Cache section for offset (header-skipping) digests
pub const SECTION_ADDNET: &str = "hashes-addnet";

/// One cached digest, valid while the file's modification time is unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashRecord {
    /// Seconds since the epoch, as reported by the filesystem
    pub mtime: f64,
    pub sha256: String,
}

type Sections = HashMap<String, HashMap<String, HashRecord>>;

/// Persisted digest cache shared by every hashing call.
///
/// Read-then-write with no file locking; the last writer wins.
pub struct HashCache {
    /// Backing JSON file, `None` for a purely in-memory cache
    path: Option<PathBuf>,
    sections: RwLock<Sections>,
}

impl HashCache {
    /// Loads the cache file. A missing or malformed file yields an empty cache.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let sections = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Sections>(&content) {
                Ok(sections) => {
                    debug!("Loaded hash cache from {}", path.display());
                    sections
                }
                Err(e) => {
                    warn!("Ignoring malformed hash cache {}: {}", path.display(), e);
                    Sections::new()
                }
            },
            Err(_) => Sections::new(),
        };

        Self {
            path: Some(path),
            sections: RwLock::new(sections),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            sections: RwLock::new(Sections::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cached digest for `key`, only when the recorded mtime matches
    pub fn get(&self, section: &str, key: &str, mtime: f64) -> Option<String> {
        let sections = self.read();
        let record = sections.get(section)?.get(key)?;
        if record.mtime == mtime {
            Some(record.sha256.clone())
        } else {
            debug!("Stale hash cache entry for {} ({} != {})", key, record.mtime, mtime);
            None
        }
    }

    pub fn insert(&self, section: &str, key: &str, record: HashRecord) {
        self.write()
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), record);
    }

    /// Writes the cache back to disk. No-op for in-memory caches.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&*self.read())?;
        fs::write(path, content)?;
        info!("Saved hash cache to {}", path.display());
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Sections> {
        self.sections.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sections> {
        self.sections.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn entries_expire_when_mtime_changes() {
        let cache = HashCache::in_memory();
        cache.insert(
            SECTION_HASHES,
            "lora/foo",
            HashRecord { mtime: 10.5, sha256: "abc".into() },
        );
        assert_eq!(cache.get(SECTION_HASHES, "lora/foo", 10.5), Some("abc".into()));
        assert_eq!(cache.get(SECTION_HASHES, "lora/foo", 11.0), None);
        assert_eq!(cache.get(SECTION_ADDNET, "lora/foo", 10.5), None);
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache").join("hashes.json");

        let cache = HashCache::load(&path);
        cache.insert(
            SECTION_ADDNET,
            "checkpoint/bar",
            HashRecord { mtime: 1.0, sha256: "def".into() },
        );
        cache.persist().unwrap();

        let reloaded = HashCache::load(&path);
        assert_eq!(reloaded.get(SECTION_ADDNET, "checkpoint/bar", 1.0), Some("def".into()));
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashes.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(HashCache::load(&path).get(SECTION_HASHES, "x", 0.0), None);
    }
}
