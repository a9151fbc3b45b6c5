//! Memcached driver (text protocol over TCP).
//!
//! Keys are prefixed and hashed to one of the configured servers. One
//! connection per server is kept and dropped after any I/O or protocol
//! error; the next call reconnects.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::{CacheError, CacheStore};
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Relative expirations above this many seconds are sent as unix time.
const MAX_RELATIVE_TTL: u64 = 60 * 60 * 24 * 30;

const MAX_KEY_LEN: usize = 250;

/// Memcached-backed cache.
pub struct MemcacheCache {
    servers: Vec<String>,
    prefix: String,
    timeout: Duration,
    connections: Mutex<HashMap<String, BufReader<TcpStream>>>,
}

impl std::fmt::Debug for MemcacheCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheCache")
            .field("servers", &self.servers)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl MemcacheCache {
    pub fn new(servers: Vec<String>, prefix: impl Into<String>) -> Self {
        Self {
            servers,
            prefix: prefix.into(),
            timeout: Duration::from_secs(2),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Servers are `host` (with `port`) followed by each `servers` entry;
    /// entries without a port use `port`.
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut servers = Vec::new();
        if let Some(host) = &config.host {
            servers.push(format!("{}:{}", host, config.port));
        }
        for server in &config.servers {
            if server.contains(':') {
                servers.push(server.clone());
            } else {
                servers.push(format!("{}:{}", server, config.port));
            }
        }
        if servers.is_empty() {
            servers.push(format!("localhost:{}", config.port));
        }
        Self::new(servers, config.prefix.clone())
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Server responsible for `key` (FNV-1a over the full key).
    pub fn server_for(&self, key: &str) -> &str {
        let hash = key.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
        &self.servers[(hash % self.servers.len() as u64) as usize]
    }

    fn full_key(&self, key: &str) -> Result<String, CacheError> {
        let full: String = format!("{}{}", self.prefix, key)
            .chars()
            .map(|c| if c.is_whitespace() || c.is_control() { '_' } else { c })
            .collect();
        if full.len() > MAX_KEY_LEN {
            return Err(CacheError::Protocol(format!("key longer than {} bytes", MAX_KEY_LEN)));
        }
        Ok(full)
    }

    fn with_connection<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut BufReader<TcpStream>) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let server = self.server_for(key).to_string();
        let mut connections = self.connections.lock().expect("memcache connections mutex poisoned");
        if !connections.contains_key(&server) {
            let stream = TcpStream::connect(&server)?;
            stream.set_read_timeout(Some(self.timeout))?;
            stream.set_write_timeout(Some(self.timeout))?;
            tracing::debug!(server = %server, "Connected to memcached");
            connections.insert(server.clone(), BufReader::new(stream));
        }

        let conn = connections
            .get_mut(&server)
            .ok_or_else(|| CacheError::Protocol("connection unavailable".to_string()))?;
        let result = f(conn);
        if let Err(e) = &result {
            tracing::warn!(server = %server, error = %e, "Dropping memcached connection");
            connections.remove(&server);
        }
        result
    }

    fn store(&self, verb: &str, key: &str, value: &serde_json::Value, ttl: Option<Duration>) -> Result<bool, CacheError> {
        let full = self.full_key(key)?;
        let payload = serde_json::to_vec(value)?;
        let command = format!("{} {} 0 {} {}\r\n", verb, full, expiration(ttl), payload.len());
        self.with_connection(&full, |conn| {
            let stream = conn.get_mut();
            stream.write_all(command.as_bytes())?;
            stream.write_all(&payload)?;
            stream.write_all(b"\r\n")?;
            parse_store_reply(conn)
        })
    }
}

/// Expiration field for a TTL; `0` never expires.
pub fn expiration(ttl: Option<Duration>) -> u64 {
    match ttl.map(|t| t.as_secs()) {
        None | Some(0) => 0,
        Some(secs) if secs > MAX_RELATIVE_TTL => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            now + secs
        }
        Some(secs) => secs,
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, CacheError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(CacheError::Protocol("connection closed".to_string()));
    }
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        return Err(CacheError::Protocol(line));
    }
    Ok(line)
}

/// Parse a `get` response: `VALUE <key> <flags> <bytes>` + data + `END`.
pub fn parse_get_reply<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, CacheError> {
    let header = read_line(reader)?;
    if header == "END" {
        return Ok(None);
    }
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() < 4 || parts[0] != "VALUE" {
        return Err(CacheError::Protocol(format!("unexpected reply '{}'", header)));
    }
    let len: usize = parts[3]
        .parse()
        .map_err(|_| CacheError::Protocol(format!("bad length in '{}'", header)))?;

    let mut data = vec![0u8; len + 2];
    reader.read_exact(&mut data)?;
    data.truncate(len);

    let end = read_line(reader)?;
    if end != "END" {
        return Err(CacheError::Protocol(format!("expected END, got '{}'", end)));
    }
    Ok(Some(data))
}

/// `STORED` → true, `NOT_STORED` → false.
pub fn parse_store_reply<R: BufRead>(reader: &mut R) -> Result<bool, CacheError> {
    match read_line(reader)?.as_str() {
        "STORED" => Ok(true),
        "NOT_STORED" | "EXISTS" => Ok(false),
        other => Err(CacheError::Protocol(format!("unexpected reply '{}'", other))),
    }
}

/// `DELETED` → true, `NOT_FOUND` → false.
pub fn parse_delete_reply<R: BufRead>(reader: &mut R) -> Result<bool, CacheError> {
    match read_line(reader)?.as_str() {
        "DELETED" => Ok(true),
        "NOT_FOUND" => Ok(false),
        other => Err(CacheError::Protocol(format!("unexpected reply '{}'", other))),
    }
}

/// New counter value, `None` for `NOT_FOUND`.
pub fn parse_incr_reply<R: BufRead>(reader: &mut R) -> Result<Option<i64>, CacheError> {
    let line = read_line(reader)?;
    if line == "NOT_FOUND" {
        return Ok(None);
    }
    line.trim()
        .parse()
        .map(Some)
        .map_err(|_| CacheError::Protocol(format!("unexpected reply '{}'", line)))
}

impl CacheStore for MemcacheCache {
    fn driver(&self) -> &'static str {
        "memcache"
    }

    fn read(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let full = self.full_key(key)?;
        let command = format!("get {}\r\n", full);
        let data = self.with_connection(&full, |conn| {
            conn.get_mut().write_all(command.as_bytes())?;
            parse_get_reply(conn)
        })?;
        metrics::record_cache_op(self.driver(), "read", data.is_some());
        data.map(|bytes| serde_json::from_slice(&bytes).map_err(CacheError::from))
            .transpose()
    }

    fn write(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let stored = self.store("set", key, &value, ttl)?;
        metrics::record_cache_op(self.driver(), "write", stored);
        if !stored {
            return Err(CacheError::Protocol(format!("server refused to store '{}'", key)));
        }
        Ok(())
    }

    fn add(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<bool, CacheError> {
        self.store("add", key, &value, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let full = self.full_key(key)?;
        let command = format!("delete {}\r\n", full);
        self.with_connection(&full, |conn| {
            conn.get_mut().write_all(command.as_bytes())?;
            parse_delete_reply(conn)
        })
    }

    /// Falls back to writing `by` when the key is missing.
    fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64, CacheError> {
        let full = self.full_key(key)?;
        let verb = if by < 0 { "decr" } else { "incr" };
        let command = format!("{} {} {}\r\n", verb, full, by.unsigned_abs());
        let result = self.with_connection(&full, |conn| {
            conn.get_mut().write_all(command.as_bytes())?;
            parse_incr_reply(conn)
        })?;
        match result {
            Some(value) => Ok(value),
            None => {
                self.write(key, serde_json::json!(by), ttl)?;
                Ok(by)
            }
        }
    }
}
