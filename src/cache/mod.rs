//! Key/value cache subsystem.
//!
//! # Data Flow
//! ```text
//! [cache.<name>] config
//!     → Caches::get(name)   (alias entries resolve one level)
//!     → driver instance, created once per resolved name
//!         file.rs      one file per key, 4-byte LE expiry + payload
//!         memcache.rs  memcached text protocol over TCP
//!         memory.rs    in-process map, optional JSON snapshot
//! ```
//!
//! Values are JSON (`serde_json::Value`); [`read_as`] and [`write_as`] add
//! typed access on top.

pub mod file;
pub mod memcache;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{CacheConfig, CacheDriver, CacheEntry};

pub use file::FileCache;
pub use memcache::MemcacheCache;
pub use memory::MemoryCache;

/// Errors raised by cache drivers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache payload error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("memcached protocol error: {0}")]
    Protocol(String),

    #[error("unknown cache configuration '{0}'")]
    UnknownConfig(String),

    #[error("value of '{0}' is not numeric")]
    NotNumeric(String),

    #[error("value of '{0}' must be a string when serialization is off")]
    NotString(String),
}

/// A cache backend.
pub trait CacheStore: Send + Sync {
    /// Driver name used in logs and metrics.
    fn driver(&self) -> &'static str;

    /// Read a live value.
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Store a value. `None` uses the driver's default lifetime.
    fn write(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Store only if the key is absent. Returns whether it was stored.
    fn add(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<bool, CacheError>;

    /// Remove a key. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Add `by` to a numeric value, creating it when missing.
    fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64, CacheError>;

    /// Persist in-memory state, if the driver keeps any.
    fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Read and deserialize a cached value.
pub fn read_as<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Result<Option<T>, CacheError> {
    match store.read(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a value.
pub fn write_as<T: Serialize>(store: &dyn CacheStore, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), CacheError> {
    store.write(key, serde_json::to_value(value)?, ttl)
}

/// Interpret a cached value as an integer (numbers or numeric strings).
pub(crate) fn as_integer(key: &str, value: &serde_json::Value) -> Result<i64, CacheError> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().ok_or_else(|| CacheError::NotNumeric(key.to_string())),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| CacheError::NotNumeric(key.to_string())),
        _ => Err(CacheError::NotNumeric(key.to_string())),
    }
}

/// Named cache configurations and their driver instances.
#[derive(Default)]
pub struct Caches {
    configs: BTreeMap<String, CacheEntry>,
    instances: DashMap<String, Arc<dyn CacheStore>>,
}

impl Caches {
    pub fn new(configs: BTreeMap<String, CacheEntry>) -> Self {
        Self {
            configs,
            instances: DashMap::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name) || self.instances.contains_key(name)
    }

    /// Register a ready-made store under `name`.
    pub fn insert(&self, name: &str, store: Arc<dyn CacheStore>) {
        self.instances.insert(name.to_string(), store);
    }

    /// The store configured under `name`, created on first use.
    pub fn get(&self, name: &str) -> Result<Arc<dyn CacheStore>, CacheError> {
        if let Some(store) = self.instances.get(name) {
            return Ok(Arc::clone(store.value()));
        }

        let (resolved, config) = self.resolve(name)?;
        if let Some(store) = self.instances.get(resolved) {
            return Ok(Arc::clone(store.value()));
        }

        let store = build_store(config)?;
        tracing::info!(name = %resolved, driver = store.driver(), "Cache store created");
        Ok(Arc::clone(
            self.instances
                .entry(resolved.to_string())
                .or_insert(store)
                .value(),
        ))
    }

    fn resolve<'c>(&'c self, name: &'c str) -> Result<(&'c str, &'c CacheConfig), CacheError> {
        match self.configs.get(name) {
            Some(CacheEntry::Store(config)) => Ok((name, config)),
            Some(CacheEntry::Alias(target)) => match self.configs.get(target) {
                Some(CacheEntry::Store(config)) => Ok((target.as_str(), config)),
                _ => Err(CacheError::UnknownConfig(target.clone())),
            },
            None => Err(CacheError::UnknownConfig(name.to_string())),
        }
    }

    /// Flush every created store.
    pub fn flush_all(&self) -> Result<(), CacheError> {
        for store in self.instances.iter() {
            store.value().flush()?;
        }
        Ok(())
    }
}

fn build_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    Ok(match config.driver {
        CacheDriver::File => {
            let dir = config.path.clone().unwrap_or_else(|| "tmp/cache".to_string());
            Arc::new(FileCache::new(dir, config.serialize)?)
        }
        CacheDriver::Memcache => Arc::new(MemcacheCache::from_config(config)),
        CacheDriver::Memory => match &config.path {
            Some(path) => Arc::new(MemoryCache::load_from_file(path)?),
            None => Arc::new(MemoryCache::new(None)),
        },
    })
}
