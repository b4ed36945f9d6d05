//! Content-addressed transform cache.
//!
//! Records are keyed by a composite hash of module path, raw content
//! hash and the loader-chain options hash, so a change to any of the
//! three misses cleanly. Each record carries an integrity hash of its
//! payload; a record that fails the check is treated as a miss and
//! surfaced as a warning, never an error.
//!
//! The in-memory index is shared across rayon workers behind a RwLock.
//! Concurrent writers racing on one key are last-writer-wins, which is
//! safe because both computed the value from identical inputs. An
//! optional record-count bound prunes the oldest records when the cache
//! is opened.

use crate::error::{BuildWarning, Result};
use crate::transform::TransformOutput;
use liffey_util::hash::{composite_hash, content_hash};
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    key: String,
    payload: TransformOutput,
    /// Hash of the serialized payload, checked on read.
    payload_hash: String,
    /// Unix seconds, used for age-based pruning.
    stored_at: u64,
}

/// Persistent transform cache with an in-memory index.
pub struct BuildCache {
    dir: Option<PathBuf>,
    index: RwLock<HashMap<String, TransformOutput>>,
    hits: AtomicU64,
    warnings: Mutex<Vec<BuildWarning>>,
}

impl BuildCache {
    /// Open a cache. With `dir` set, existing records are loaded and,
    /// when `max_records` is exceeded, the oldest are deleted. Without
    /// a directory the cache is memory-only.
    #[must_use]
    pub fn open(dir: Option<PathBuf>, max_records: Option<usize>) -> Self {
        let cache = Self {
            dir,
            index: RwLock::new(HashMap::default()),
            hits: AtomicU64::new(0),
            warnings: Mutex::new(Vec::new()),
        };
        cache.load_from_disk(max_records);
        cache
    }

    /// Compute the cache key for a module.
    #[must_use]
    pub fn key(path: &Path, content_hash: &str, options_hash: &str) -> String {
        let normalized = path.to_string_lossy().replace('\\', "/");
        composite_hash(&[
            normalized.as_bytes(),
            content_hash.as_bytes(),
            options_hash.as_bytes(),
        ])
    }

    /// Look up a record. A hit bumps the hit counter; a corrupt disk
    /// record is deleted and reported as a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<TransformOutput> {
        if let Ok(index) = self.index.read() {
            if let Some(output) = index.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(output.clone());
            }
        }
        None
    }

    /// Store a record, in memory and (when enabled) on disk.
    ///
    /// # Errors
    /// Returns an IO error when the disk write fails; the in-memory
    /// entry is kept either way.
    pub fn put(&self, key: &str, output: &TransformOutput) -> Result<()> {
        if let Ok(mut index) = self.index.write() {
            index.insert(key.to_string(), output.clone());
        }
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        liffey_util::fs::ensure_dir(dir)?;
        let payload_bytes = serde_json::to_vec(output)?;
        let record = CacheRecord {
            key: key.to_string(),
            payload: output.clone(),
            payload_hash: content_hash(&payload_bytes),
            stored_at: now_secs(),
        };
        let serialized = serde_json::to_vec_pretty(&record)?;
        liffey_util::fs::atomic_write(&dir.join(format!("{key}.json")), &serialized)?;
        Ok(())
    }

    /// Number of hits served since the cache was opened.
    #[must_use]
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Warnings collected while reading records (corruption, prune IO).
    #[must_use]
    pub fn drain_warnings(&self) -> Vec<BuildWarning> {
        self.warnings
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default()
    }

    fn warn(&self, warning: BuildWarning) {
        if let Ok(mut w) = self.warnings.lock() {
            w.push(warning);
        }
    }

    fn load_from_disk(&self, max_records: Option<usize>) {
        let Some(dir) = &self.dir else { return };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };

        let mut records: Vec<(PathBuf, CacheRecord)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => records.push((path, record)),
                Err(key) => {
                    let _ = std::fs::remove_file(&path);
                    self.warn(BuildWarning::CacheCorruption { key });
                }
            }
        }

        // Oldest first, so the tail survives a prune.
        records.sort_by_key(|(_, r)| r.stored_at);
        if let Some(max) = max_records {
            while records.len() > max {
                let (path, record) = records.remove(0);
                tracing::debug!(key = %record.key, "pruning cache record");
                let _ = std::fs::remove_file(&path);
            }
        }

        if let Ok(mut index) = self.index.write() {
            for (_, record) in records {
                index.insert(record.key, record.payload);
            }
        }
    }
}

/// Read and integrity-check one record; the error side carries the key
/// (or file stem) for the corruption warning.
fn read_record(path: &Path) -> std::result::Result<CacheRecord, String> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = std::fs::read(path).map_err(|_| stem.clone())?;
    let record: CacheRecord = serde_json::from_slice(&bytes).map_err(|_| stem.clone())?;
    let payload_bytes = serde_json::to_vec(&record.payload).map_err(|_| stem.clone())?;
    if content_hash(&payload_bytes) != record.payload_hash {
        return Err(record.key);
    }
    Ok(record)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: &str) -> TransformOutput {
        TransformOutput {
            code: code.to_string(),
            map: None,
            emitted_asset: None,
        }
    }

    #[test]
    fn test_memory_roundtrip_and_hit_count() {
        let cache = BuildCache::open(None, None);
        let key = BuildCache::key(Path::new("/p/a.js"), "abc", "def");
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.hit_count(), 0);

        cache.put(&key, &output("code")).unwrap();
        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.code, "code");
        assert_eq!(cache.hit_count(), 1);
    }

    #[test]
    fn test_key_varies_with_each_component() {
        let base = BuildCache::key(Path::new("/p/a.js"), "c1", "o1");
        assert_ne!(base, BuildCache::key(Path::new("/p/b.js"), "c1", "o1"));
        assert_ne!(base, BuildCache::key(Path::new("/p/a.js"), "c2", "o1"));
        assert_ne!(base, BuildCache::key(Path::new("/p/a.js"), "c1", "o2"));
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = BuildCache::key(Path::new("/p/a.js"), "abc", "def");
        {
            let cache = BuildCache::open(Some(dir.path().to_path_buf()), None);
            cache.put(&key, &output("persisted")).unwrap();
        }
        let cache = BuildCache::open(Some(dir.path().to_path_buf()), None);
        assert_eq!(cache.get(&key).unwrap().code, "persisted");
    }

    #[test]
    fn test_tampered_record_is_a_miss_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let key = BuildCache::key(Path::new("/p/a.js"), "abc", "def");
        {
            let cache = BuildCache::open(Some(dir.path().to_path_buf()), None);
            cache.put(&key, &output("original")).unwrap();
        }

        let file = dir.path().join(format!("{key}.json"));
        let tampered = std::fs::read_to_string(&file)
            .unwrap()
            .replace("original", "tampered");
        std::fs::write(&file, tampered).unwrap();

        let cache = BuildCache::open(Some(dir.path().to_path_buf()), None);
        assert!(cache.get(&key).is_none());
        let warnings = cache.drain_warnings();
        assert!(matches!(
            warnings.as_slice(),
            [BuildWarning::CacheCorruption { .. }]
        ));
    }

    #[test]
    fn test_max_records_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = BuildCache::open(Some(dir.path().to_path_buf()), None);
            for i in 0..5 {
                let key = BuildCache::key(Path::new("/p/a.js"), &format!("c{i}"), "o");
                cache.put(&key, &output(&format!("v{i}"))).unwrap();
            }
        }
        let _pruned = BuildCache::open(Some(dir.path().to_path_buf()), Some(2));
        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 2);
    }
}
