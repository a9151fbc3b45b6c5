//! File cache driver.
//!
//! Each key is one file under the cache directory. The file holds a 4-byte
//! little-endian expiry (unix seconds) followed by the payload: JSON, or
//! the raw string when serialization is off. Expired files are removed when
//! read.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::{as_integer, CacheError, CacheStore};
use crate::observability::metrics;

/// Lifetime used when a write names none (3650 days).
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(86_400 * 3650);

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Cache stored as one file per key.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    serialize: bool,
}

impl FileCache {
    /// Create the driver, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, serialize: bool) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, serialize })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Bytes outside `[A-Za-z0-9.-]`, `_` itself and a
    /// leading `.` are written as `_xx` (hex), so distinct keys get
    /// distinct files and none leaves the cache directory.
    pub fn path_for(&self, key: &str) -> PathBuf {
        if key.is_empty() {
            return self.dir.join("_");
        }
        let mut name = String::with_capacity(key.len());
        for (i, byte) in key.bytes().enumerate() {
            let keep = byte.is_ascii_alphanumeric() || byte == b'-' || (byte == b'.' && i > 0);
            if keep {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("_{:02x}", byte));
            }
        }
        self.dir.join(name)
    }

    /// Live entry as (expiry, payload).
    fn read_entry(&self, key: &str) -> Result<Option<(u64, Vec<u8>)>, CacheError> {
        let path = self.path_for(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.len() < 4 {
            return Ok(None);
        }

        let expires = u64::from(u32::from_le_bytes([data[0], data[1], data[2], data[3]]));
        if expires < now() {
            tracing::trace!(key = %key, "Expired cache file removed");
            self.delete(key)?;
            return Ok(None);
        }
        Ok(Some((expires, data[4..].to_vec())))
    }

    fn decode(&self, payload: &[u8]) -> Result<serde_json::Value, CacheError> {
        if self.serialize {
            Ok(serde_json::from_slice(payload)?)
        } else {
            Ok(serde_json::Value::String(String::from_utf8_lossy(payload).into_owned()))
        }
    }

    fn encode(&self, key: &str, value: &serde_json::Value) -> Result<Vec<u8>, CacheError> {
        if self.serialize {
            return Ok(serde_json::to_vec(value)?);
        }
        match value {
            serde_json::Value::String(s) => Ok(s.clone().into_bytes()),
            serde_json::Value::Number(n) => Ok(n.to_string().into_bytes()),
            _ => Err(CacheError::NotString(key.to_string())),
        }
    }
}

impl CacheStore for FileCache {
    fn driver(&self) -> &'static str {
        "file"
    }

    fn read(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let entry = self.read_entry(key)?;
        metrics::record_cache_op(self.driver(), "read", entry.is_some());
        entry.map(|(_, payload)| self.decode(&payload)).transpose()
    }

    fn write(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let payload = self.encode(key, &value)?;
        let expires = now().saturating_add(ttl.unwrap_or(DEFAULT_LIFETIME).as_secs());
        let expires = u32::try_from(expires).unwrap_or(u32::MAX);

        let mut data = Vec::with_capacity(4 + payload.len());
        data.extend_from_slice(&expires.to_le_bytes());
        data.extend_from_slice(&payload);
        fs::write(self.path_for(key), data)?;
        metrics::record_cache_op(self.driver(), "write", true);
        Ok(())
    }

    fn add(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<bool, CacheError> {
        if self.read_entry(key)?.is_some() {
            return Ok(false);
        }
        self.write(key, value, ttl)?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Keeps the remaining lifetime of an existing entry.
    fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64, CacheError> {
        let (next, ttl) = match self.read_entry(key)? {
            Some((expires, payload)) => {
                let current = as_integer(key, &self.decode(&payload)?)?;
                let remaining = Duration::from_secs(expires.saturating_sub(now()));
                (current + by, Some(remaining))
            }
            None => (by, ttl),
        };
        self.write(key, serde_json::json!(next), ttl)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, FileCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache"), true).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_write_read_delete() {
        let (_dir, cache) = cache();
        cache.write("user.1", serde_json::json!({"name": "ana"}), None).unwrap();
        assert_eq!(cache.read("user.1").unwrap(), Some(serde_json::json!({"name": "ana"})));
        assert!(cache.delete("user.1").unwrap());
        assert!(!cache.delete("user.1").unwrap());
        assert_eq!(cache.read("user.1").unwrap(), None);
    }

    #[test]
    fn test_binary_layout() {
        let (_dir, cache) = cache();
        cache
            .write("k", serde_json::json!("v"), Some(Duration::from_secs(60)))
            .unwrap();
        let data = fs::read(cache.path_for("k")).unwrap();
        let expires = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as u64;
        assert!(expires >= now() + 59 && expires <= now() + 61);
        assert_eq!(&data[4..], b"\"v\"");
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let (_dir, cache) = cache();
        let mut data = 1u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"1");
        fs::write(cache.path_for("old"), data).unwrap();

        assert_eq!(cache.read("old").unwrap(), None);
        assert!(!cache.path_for("old").exists());
    }

    #[test]
    fn test_add_only_when_absent() {
        let (_dir, cache) = cache();
        assert!(cache.add("k", serde_json::json!(1), None).unwrap());
        assert!(!cache.add("k", serde_json::json!(2), None).unwrap());
        assert_eq!(cache.read("k").unwrap(), Some(serde_json::json!(1)));
    }

    #[test]
    fn test_increment_keeps_lifetime() {
        let (_dir, cache) = cache();
        assert_eq!(cache.increment("hits", 2, Some(Duration::from_secs(100))).unwrap(), 2);
        assert_eq!(cache.increment("hits", 3, None).unwrap(), 5);

        let data = fs::read(cache.path_for("hits")).unwrap();
        let expires = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as u64;
        assert!(expires <= now() + 100);
    }

    #[test]
    fn test_raw_mode() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path(), false).unwrap();
        cache.write("page", serde_json::json!("<p>hi</p>"), None).unwrap();
        assert_eq!(&fs::read(cache.path_for("page")).unwrap()[4..], b"<p>hi</p>");
        assert_eq!(cache.read("page").unwrap(), Some(serde_json::json!("<p>hi</p>")));
        assert!(matches!(
            cache.write("obj", serde_json::json!({"a": 1}), None),
            Err(CacheError::NotString(_))
        ));
    }

    #[test]
    fn test_keys_stay_inside_dir() {
        let (_dir, cache) = cache();
        let path = cache.path_for("../../etc/passwd");
        assert_eq!(path.parent(), Some(cache.dir()));
        assert_eq!(cache.path_for("a b"), cache.dir().join("a_20"));
        assert_eq!(cache.path_for(".hidden"), cache.dir().join("_2ehidden"));
    }

    #[test]
    fn test_similar_keys_use_separate_files() {
        let (_dir, cache) = cache();
        cache.write("user:1", serde_json::json!("alice"), None).unwrap();
        assert_eq!(cache.read("user_1").unwrap(), None);
        assert_eq!(cache.read("user 1").unwrap(), None);

        cache.write("user_1", serde_json::json!("bob"), None).unwrap();
        assert_eq!(cache.read("user:1").unwrap(), Some(serde_json::json!("alice")));
        assert_eq!(cache.read("user_1").unwrap(), Some(serde_json::json!("bob")));
        assert_ne!(cache.path_for("user:1"), cache.path_for("user_1"));
    }
}
