//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (cache aliases name existing entries)
//! - Validate value ranges (timeouts > 0, route rules well formed)
//! - Compile route requirements so bad regexes fail at load time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use regex::Regex;

use crate::config::schema::{AppConfig, CacheDriver, CacheEntry};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("server.request_timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("server.base_path '{0}' must be empty or start with '/'")]
    BasePath(String),

    #[error("router.extensions entry '{0}' must be a bare extension without dots")]
    Extension(String),

    #[error("route #{index}: rule '{rule}' must start with '/'")]
    RouteRule { index: usize, rule: String },

    #[error("route '{rule}': requirement for '{name}' is not a valid regex: {message}")]
    RouteRequirement { rule: String, name: String, message: String },

    #[error("database '{name}': unsupported driver '{driver}'")]
    DatabaseDriver { name: String, driver: String },

    #[error("cache '{name}': alias points to unknown entry '{target}'")]
    CacheAlias { name: String, target: String },

    #[error("cache '{name}': memcache driver needs `host` or `servers`")]
    MemcacheServers { name: String },
}

/// Validate an application config, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    let base = &config.server.base_path;
    if !base.is_empty() && !base.starts_with('/') {
        errors.push(ValidationError::BasePath(base.clone()));
    }

    for ext in &config.router.extensions {
        if ext.is_empty() || ext.contains('.') {
            errors.push(ValidationError::Extension(ext.clone()));
        }
    }

    for (index, route) in config.routes.iter().enumerate() {
        if !route.rule.starts_with('/') {
            errors.push(ValidationError::RouteRule {
                index,
                rule: route.rule.clone(),
            });
        }
        for (name, pattern) in &route.requirements {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::RouteRequirement {
                    rule: route.rule.clone(),
                    name: name.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    for (name, db) in &config.databases {
        if db.driver != "sqlite" {
            errors.push(ValidationError::DatabaseDriver {
                name: name.clone(),
                driver: db.driver.clone(),
            });
        }
    }

    for (name, entry) in &config.cache {
        match entry {
            CacheEntry::Alias(target) => {
                if !matches!(config.cache.get(target), Some(CacheEntry::Store(_))) {
                    errors.push(ValidationError::CacheAlias {
                        name: name.clone(),
                        target: target.clone(),
                    });
                }
            }
            CacheEntry::Store(store) => {
                if store.driver == CacheDriver::Memcache
                    && store.host.is_none()
                    && store.servers.is_empty()
                {
                    errors.push(ValidationError::MemcacheServers { name: name.clone() });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CacheConfig, RouteConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 0;
        config.routes.push(RouteConfig {
            rule: "posts/:id".into(),
            defaults: Default::default(),
            args: Vec::new(),
            requirements: [("id".to_string(), "[0-9+".to_string())].into(),
        });
        config
            .cache
            .insert("default".into(), CacheEntry::Alias("missing".into()));
        config.cache.insert(
            "mc".into(),
            CacheEntry::Store(CacheConfig {
                driver: CacheDriver::Memcache,
                ..Default::default()
            }),
        );

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::ZeroTimeout));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::RouteRequirement { name, .. } if name == "id")));
        assert!(errors.contains(&ValidationError::MemcacheServers { name: "mc".into() }));
    }
}
