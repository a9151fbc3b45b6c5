//! Runtime application settings addressed by dotted paths.
//!
//! `settings.read("mail.smtp.host")` walks nested tables; `write` creates
//! the intermediate tables it needs. Extra TOML files can be merged on top
//! (top-level keys replace existing ones) and a section can be stored back
//! to its own file.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use toml::{Table, Value};

use crate::config::loader::ConfigError;

/// Free-form settings tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    root: Table,
}

impl Settings {
    pub fn new(root: Table) -> Self {
        Self { root }
    }

    /// The whole settings tree.
    pub fn all(&self) -> &Table {
        &self.root
    }

    /// Read the value at a dotted path.
    pub fn read(&self, path: &str) -> Option<&Value> {
        let mut keys = path.split('.');
        let first = keys.next()?;
        let mut current = self.root.get(first)?;
        for key in keys {
            current = current.as_table()?.get(key)?;
        }
        Some(current)
    }

    /// Read and deserialize the value at a dotted path, `None` if it is
    /// missing or has the wrong shape.
    pub fn read_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.read(path).and_then(|v| v.clone().try_into().ok())
    }

    /// Read a value, falling back to `default`.
    pub fn read_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        self.read_as(path).unwrap_or(default)
    }

    /// Write a value at a dotted path. Non-table values found on the way
    /// are replaced by tables.
    pub fn write(&mut self, path: &str, value: impl Into<Value>) {
        let keys: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = keys.split_last() else {
            return;
        };

        let mut table = &mut self.root;
        for key in parents {
            let entry = table
                .entry(key.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            if !entry.is_table() {
                *entry = Value::Table(Table::new());
            }
            table = match entry {
                Value::Table(inner) => inner,
                _ => return,
            };
        }
        table.insert(last.to_string(), value.into());
    }

    /// Merge a TOML file into the settings. Returns `false` if the file does
    /// not exist.
    pub fn merge_file(&mut self, path: &Path) -> Result<bool, ConfigError> {
        if !path.exists() {
            return Ok(false);
        }
        let content = fs::read_to_string(path)?;
        let table: Table = toml::from_str(&content)?;
        for (key, value) in table {
            self.root.insert(key, value);
        }
        tracing::debug!(path = %path.display(), "Merged settings file");
        Ok(true)
    }

    /// Persist the section `name` to `<dir>/<name>.toml`.
    pub fn store(&self, name: &str, dir: &Path) -> Result<(), ConfigError> {
        let mut table = Table::new();
        if let Some(section) = self.read(name) {
            table.insert(name.to_string(), section.clone());
        }
        let content = toml::to_string(&table)?;
        fs::write(dir.join(format!("{}.toml", name.to_lowercase())), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_dotted_paths() {
        let mut settings = Settings::default();
        settings.write("mail.smtp.host", "localhost");
        settings.write("mail.smtp.port", 25);

        assert_eq!(settings.read("mail.smtp.host").and_then(Value::as_str), Some("localhost"));
        assert_eq!(settings.read_as::<i64>("mail.smtp.port"), Some(25));
        assert!(settings.read("mail.imap").is_none());
        assert!(!settings.read_or("mail.smtp.tls", false));
    }

    #[test]
    fn test_write_replaces_scalar_parent() {
        let mut settings = Settings::default();
        settings.write("site", "plain");
        settings.write("site.title", "Demo");
        assert_eq!(settings.read_as::<String>("site.title").as_deref(), Some("Demo"));
    }

    #[test]
    fn test_store_and_merge_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.write("site.title", "Demo");
        settings.store("site", dir.path()).unwrap();

        let mut reloaded = Settings::default();
        assert!(reloaded.merge_file(&dir.path().join("site.toml")).unwrap());
        assert_eq!(reloaded.read_as::<String>("site.title").as_deref(), Some("Demo"));
        assert!(!reloaded.merge_file(&dir.path().join("missing.toml")).unwrap());
    }
}
