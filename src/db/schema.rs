//! Table schemas and the process-wide schema cache.
//!
//! A schema is read once per `<data source>.<table>` and kept in memory.
//! When an external cache store is attached, schemas are also written there
//! under `schema_<data source>.<table>` so new processes skip the lookup.
//! Entries are only dropped by explicit eviction.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::db::connection::DataSource;
use crate::db::error::OrmError;

/// How a column's values are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    #[default]
    Str,
    Bool,
    Lob,
}

impl ParamType {
    /// Map a declared column type (e.g. `VARCHAR(255)`) to a binding type.
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.trim().to_lowercase();
        if declared == "tinyint(1)" {
            return ParamType::Bool;
        }
        let base = declared.split('(').next().unwrap_or("").trim();
        match base {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" => ParamType::Int,
            "varchar" | "char" | "text" | "date" | "datetime" => ParamType::Str,
            "boolean" | "bool" => ParamType::Bool,
            "blob" => ParamType::Lob,
            _ => ParamType::Str,
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ParamType,
    #[serde(default)]
    pub primary: bool,
}

/// Ordered column list of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Binding type of `name`, `Str` for unknown names.
    pub fn kind(&self, name: &str) -> ParamType {
        self.get(name).map(|c| c.kind).unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Process-wide schema cache.
#[derive(Default)]
pub struct SchemaCache {
    schemas: DashMap<String, Arc<Schema>>,
    store: Option<Arc<dyn CacheStore>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also persist schemas to `store`.
    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            schemas: DashMap::new(),
            store: Some(store),
        }
    }

    /// Return the cached schema of `table`, describing it on first use.
    pub fn get_or_describe(&self, source: &DataSource, table: &str) -> Result<Arc<Schema>, OrmError> {
        let key = format!("{}.{}", source.name(), table);
        if let Some(schema) = self.schemas.get(&key) {
            return Ok(Arc::clone(schema.value()));
        }

        let store_key = format!("schema_{}", key);
        if let Some(store) = &self.store {
            if let Some(cached) = store.read(&store_key)? {
                match serde_json::from_value::<Schema>(cached) {
                    Ok(schema) => {
                        let schema = Arc::new(schema);
                        self.schemas.insert(key, Arc::clone(&schema));
                        return Ok(schema);
                    }
                    Err(e) => {
                        tracing::warn!(key = %store_key, error = %e, "Ignoring unreadable cached schema");
                    }
                }
            }
        }

        let schema = source.describe(table)?;
        if let Some(store) = &self.store {
            let encoded = serde_json::to_value(&schema).map_err(crate::cache::CacheError::from)?;
            store.write(&store_key, encoded, None)?;
        }
        tracing::debug!(table = %key, columns = schema.len(), "Schema loaded");

        let schema = Arc::new(schema);
        self.schemas.insert(key, Arc::clone(&schema));
        Ok(schema)
    }

    /// Drop the cached schema of `table` from memory and the attached store.
    pub fn evict(&self, source_name: &str, table: &str) -> Result<(), OrmError> {
        let key = format!("{}.{}", source_name, table);
        self.schemas.remove(&key);
        if let Some(store) = &self.store {
            store.delete(&format!("schema_{}", key))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::DatabaseConfig;

    #[test]
    fn test_declared_type_mapping() {
        assert_eq!(ParamType::from_declared("INTEGER"), ParamType::Int);
        assert_eq!(ParamType::from_declared("int(11)"), ParamType::Int);
        assert_eq!(ParamType::from_declared("tinyint(1)"), ParamType::Bool);
        assert_eq!(ParamType::from_declared("tinyint(4)"), ParamType::Int);
        assert_eq!(ParamType::from_declared("VARCHAR(255)"), ParamType::Str);
        assert_eq!(ParamType::from_declared("boolean"), ParamType::Bool);
        assert_eq!(ParamType::from_declared("BLOB"), ParamType::Lob);
        assert_eq!(ParamType::from_declared("decimal(10,2)"), ParamType::Str);
        assert_eq!(ParamType::from_declared(""), ParamType::Str);
    }

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new(vec![
            Column { name: "id".into(), kind: ParamType::Int, primary: true },
            Column { name: "title".into(), kind: ParamType::Str, primary: false },
        ]);
        assert_eq!(schema.kind("id"), ParamType::Int);
        assert_eq!(schema.kind("nope"), ParamType::Str);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["id", "title"]);
    }

    #[test]
    fn test_cache_describes_once_and_persists() {
        let source = DataSource::open("default", &DatabaseConfig::default()).unwrap();
        source
            .execute_batch("CREATE TABLE posts (id INTEGER PRIMARY KEY, title VARCHAR(100))")
            .unwrap();

        let store = Arc::new(MemoryCache::new(None));
        let cache = SchemaCache::with_store(store.clone());
        let schema = cache.get_or_describe(&source, "posts").unwrap();
        assert_eq!(schema.len(), 2);
        assert!(schema.get("id").unwrap().primary);
        assert!(store.read("schema_default.posts").unwrap().is_some());

        // A fresh cache picks the schema up from the store.
        let warm = SchemaCache::with_store(store.clone());
        source.execute_batch("DROP TABLE posts").unwrap();
        assert_eq!(*warm.get_or_describe(&source, "posts").unwrap(), *schema);

        warm.evict("default", "posts").unwrap();
        assert!(warm.is_empty());
        assert!(store.read("schema_default.posts").unwrap().is_none());
    }
}
