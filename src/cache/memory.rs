//! In-process cache with optional JSON persistence.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::{as_integer, CacheError, CacheStore};
use crate::observability::metrics;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A stored value and its expiry (unix seconds, `None` = never).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub value: serde_json::Value,
    pub expires: Option<u64>,
}

impl Entry {
    fn new(value: serde_json::Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires: ttl.map(|t| now().saturating_add(t.as_secs())),
        }
    }

    pub fn is_live(&self) -> bool {
        self.expires.map_or(true, |at| at > now())
    }
}

/// A thread-safe in-memory cache.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, Entry>>,
    persistence_path: Option<PathBuf>,
}

impl MemoryCache {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Create a cache persisted at `path`, loading live entries if the file exists.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let cache = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, Entry> = serde_json::from_reader(reader)?;
            for (key, entry) in map.into_iter().filter(|(_, e)| e.is_live()) {
                cache.inner.insert(key, entry);
            }
            tracing::info!(path = %path.display(), entries = cache.inner.len(), "Loaded memory cache snapshot");
        }
        Ok(cache)
    }

    /// Write live entries to the persistence path, if one is set.
    pub fn save_to_file(&self) -> Result<(), CacheError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let map: HashMap<String, Entry> = self
            .inner
            .iter()
            .filter(|r| r.value().is_live())
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        serde_json::to_writer(BufWriter::new(File::create(path)?), &map)?;
        tracing::info!(path = %path.display(), entries = map.len(), "Saved memory cache snapshot");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.is_live());
        before - self.inner.len()
    }
}

impl CacheStore for MemoryCache {
    fn driver(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let value = match self.inner.get(key) {
            Some(entry) if entry.is_live() => Some(entry.value.clone()),
            Some(_) => {
                self.inner.remove_if(key, |_, e| !e.is_live());
                None
            }
            None => None,
        };
        metrics::record_cache_op(self.driver(), "read", value.is_some());
        Ok(value)
    }

    fn write(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.inner.insert(key.to_string(), Entry::new(value, ttl));
        metrics::record_cache_op(self.driver(), "write", true);
        Ok(())
    }

    fn add(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<bool, CacheError> {
        match self.inner.entry(key.to_string()) {
            MapEntry::Occupied(mut slot) => {
                if slot.get().is_live() {
                    return Ok(false);
                }
                slot.insert(Entry::new(value, ttl));
            }
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::new(value, ttl));
            }
        }
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.inner.remove(key).is_some_and(|(_, e)| e.is_live()))
    }

    fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64, CacheError> {
        match self.inner.entry(key.to_string()) {
            MapEntry::Occupied(mut slot) if slot.get().is_live() => {
                let next = as_integer(key, &slot.get().value)? + by;
                slot.get_mut().value = serde_json::json!(next);
                Ok(next)
            }
            MapEntry::Occupied(mut slot) => {
                slot.insert(Entry::new(serde_json::json!(by), ttl));
                Ok(by)
            }
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::new(serde_json::json!(by), ttl));
                Ok(by)
            }
        }
    }

    fn flush(&self) -> Result<(), CacheError> {
        self.save_to_file()
    }
}
