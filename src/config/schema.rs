//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for an
//! application. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for an application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings (bind address, base path, limits).
    pub server: ServerConfig,

    /// Router behaviour shared by every route.
    pub router: RouterConfig,

    /// Route definitions, matched in declaration order.
    pub routes: Vec<RouteConfig>,

    /// Named database configurations (`default` is used by models unless
    /// they name another one).
    pub databases: BTreeMap<String, DatabaseConfig>,

    /// Named cache configurations. An entry may be an alias naming another
    /// entry.
    pub cache: BTreeMap<String, CacheEntry>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Free-form application settings, read through [`crate::config::Settings`].
    pub settings: toml::Table,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path prefix the application is mounted under (e.g., "/app").
    /// Stripped from the request path before routing.
    pub base_path: String,

    /// Scheme and host used to make redirect targets absolute
    /// (e.g., "http://localhost:8080").
    pub full_base: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            base_path: String::new(),
            full_base: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// File extensions stripped from the path before matching.
    pub extensions: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["html".to_string()],
        }
    }
}

/// A route declared in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route rule, e.g. "/blog/:action/:id".
    pub rule: String,

    /// Named defaults (`controller`, `action`, `package`, ...).
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,

    /// Positional defaults passed to the action before extracted segments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Regex constraints for named segments.
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Driver name. Only "sqlite" is supported.
    pub driver: String,

    /// Database file path, or ":memory:".
    pub path: String,

    /// Text encoding applied on open (e.g. "UTF-8").
    pub encoding: Option<String>,

    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: ":memory:".to_string(),
            encoding: None,
            busy_timeout_ms: 5000,
        }
    }
}

/// A cache entry: either a full configuration or the name of another entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CacheEntry {
    Alias(String),
    Store(CacheConfig),
}

/// Cache backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    File,
    Memcache,
    Memory,
}

/// Cache backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub driver: CacheDriver,

    /// Directory for the file driver, persistence file for the memory driver.
    pub path: Option<String>,

    /// Store values as JSON (file driver). When false, only string values
    /// are accepted and stored raw.
    pub serialize: bool,

    /// Key prefix (memcache driver).
    pub prefix: String,

    /// Single memcached host (memcache driver).
    pub host: Option<String>,

    /// Port used with `host` and for servers that do not name one.
    pub port: u16,

    /// Additional memcached servers as "host:port".
    pub servers: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::File,
            path: None,
            serialize: true,
            prefix: String::new(),
            host: None,
            port: 11211,
            servers: Vec::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.router.extensions, vec!["html".to_string()]);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            base_path = "/app"

            [[routes]]
            rule = "/posts/:id"
            defaults = { controller = "posts", action = "view" }
            requirements = { id = "[0-9]+" }

            [databases.default]
            path = "app.db"

            [cache]
            default = "fast"

            [cache.fast]
            driver = "memory"

            [settings.site]
            title = "Demo"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_path, "/app");
        assert_eq!(config.routes[0].defaults["controller"], "posts");
        assert_eq!(config.routes[0].requirements["id"], "[0-9]+");
        assert_eq!(config.databases["default"].driver, "sqlite");
        assert!(matches!(&config.cache["default"], CacheEntry::Alias(name) if name == "fast"));
        match &config.cache["fast"] {
            CacheEntry::Store(store) => assert_eq!(store.driver, CacheDriver::Memory),
            other => panic!("unexpected entry {:?}", other),
        }
        assert!(config.settings.contains_key("site"));
    }
}
