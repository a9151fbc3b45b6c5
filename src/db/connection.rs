//! Data sources: one SQLite connection per named database configuration.
//!
//! # Responsibilities
//! - Open connections from `[databases.<name>]` entries
//! - Bind named parameters with the binding type from the table schema
//! - Keep an optional in-process cache of SELECT results
//!
//! # Design Decisions
//! - One connection behind a mutex; no pooling
//! - Binding is strict: every referenced parameter must be supplied and
//!   every supplied parameter must be referenced
//! - Any write through the data source clears the whole query cache; a
//!   SELECT that raced with a write is not stored

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use rusqlite::{Connection, Statement};

use crate::config::DatabaseConfig;
use crate::db::error::OrmError;
use crate::db::schema::{Column, ParamType, Schema};
use crate::db::value::{Params, Row, Value};
use crate::observability::metrics;

/// Cached SELECT results. `generation` moves on every clear.
#[derive(Default)]
struct QueryCache {
    generation: u64,
    entries: HashMap<String, Arc<Vec<Row>>>,
}

/// A named database handle.
pub struct DataSource {
    name: String,
    conn: Mutex<Connection>,
    query_cache: Mutex<QueryCache>,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource").field("name", &self.name).finish()
    }
}

impl DataSource {
    /// Open the database described by `config`.
    pub fn open(name: &str, config: &DatabaseConfig) -> Result<Self, OrmError> {
        if config.driver != "sqlite" {
            return Err(OrmError::UnsupportedDriver(config.driver.clone()));
        }

        let conn = if config.path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.path)?
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if let Some(encoding) = &config.encoding {
            conn.pragma_update(None, "encoding", encoding)?;
        }

        tracing::info!(name = %name, path = %config.path, "Data source opened");
        Ok(Self::from_connection(name, conn))
    }

    /// Wrap an already opened connection.
    pub fn from_connection(name: &str, conn: Connection) -> Self {
        Self {
            name: name.to_string(),
            conn: Mutex::new(conn),
            query_cache: Mutex::new(QueryCache::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a SELECT and return all rows.
    pub fn query(&self, sql: &str, params: &Params, schema: Option<&Schema>) -> Result<Vec<Row>, OrmError> {
        metrics::record_query("select", false);
        let conn = self.conn.lock().expect("connection mutex poisoned");
        let mut stmt = conn.prepare(sql)?;
        bind(&mut stmt, params, schema)?;

        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut columns = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                columns.push((name.clone(), row.get::<_, Value>(i)?));
            }
            result.push(Row::new(columns));
        }
        tracing::debug!(sql = %sql, rows = result.len(), "Query executed");
        Ok(result)
    }

    /// Like [`DataSource::query`], answering repeated SELECTs from the
    /// query cache.
    pub fn query_cached(&self, sql: &str, params: &Params, schema: Option<&Schema>) -> Result<Vec<Row>, OrmError> {
        if !is_select(sql) {
            return self.query(sql, params, schema);
        }

        let key = cache_key(sql, params);
        let generation = {
            let cache = self.query_cache.lock().expect("query cache mutex poisoned");
            if let Some(rows) = cache.entries.get(&key) {
                metrics::record_query("select", true);
                tracing::trace!(sql = %sql, "Query served from cache");
                return Ok(rows.as_ref().clone());
            }
            cache.generation
        };

        let rows = self.query(sql, params, schema)?;
        self.store_cached(generation, key, &rows);
        Ok(rows)
    }

    /// Store `rows` unless the cache was cleared since `generation` was read.
    fn store_cached(&self, generation: u64, key: String, rows: &[Row]) {
        let mut cache = self.query_cache.lock().expect("query cache mutex poisoned");
        if cache.generation == generation {
            cache.entries.insert(key, Arc::new(rows.to_vec()));
        } else {
            tracing::trace!("Query cache cleared during read, result not stored");
        }
    }

    /// First column of the first row, `None` when there are no rows.
    pub fn query_scalar(&self, sql: &str, params: &Params, schema: Option<&Schema>) -> Result<Option<Value>, OrmError> {
        let rows = self.query(sql, params, schema)?;
        Ok(rows.into_iter().next().and_then(|row| row.first().cloned()))
    }

    /// Run a write statement, returning the affected row count.
    pub fn execute(&self, sql: &str, params: &Params, schema: Option<&Schema>) -> Result<usize, OrmError> {
        metrics::record_query("write", false);
        let affected = {
            let conn = self.conn.lock().expect("connection mutex poisoned");
            let mut stmt = conn.prepare(sql)?;
            bind(&mut stmt, params, schema)?;
            stmt.raw_execute()?
        };
        self.clear_cache();
        tracing::debug!(sql = %sql, affected, "Statement executed");
        Ok(affected)
    }

    /// Run one or more unparameterized statements (DDL, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<(), OrmError> {
        self.conn
            .lock()
            .expect("connection mutex poisoned")
            .execute_batch(sql)?;
        self.clear_cache();
        Ok(())
    }

    /// Rowid of the last successful insert on this connection.
    pub fn last_insert_id(&self) -> i64 {
        self.conn
            .lock()
            .expect("connection mutex poisoned")
            .last_insert_rowid()
    }

    /// Read the column definitions of `table`.
    pub fn describe(&self, table: &str) -> Result<Schema, OrmError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        let mut stmt = conn.prepare("SELECT name, type, pk FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([table], |row| {
                Ok(Column {
                    name: row.get(0)?,
                    kind: ParamType::from_declared(&row.get::<_, String>(1)?),
                    primary: row.get::<_, i64>(2)? > 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(OrmError::UnknownTable(table.to_string()));
        }
        Ok(Schema::new(columns))
    }

    pub fn clear_cache(&self) {
        let mut cache = self.query_cache.lock().expect("query cache mutex poisoned");
        cache.generation = cache.generation.wrapping_add(1);
        cache.entries.clear();
    }

    /// Number of cached SELECT results.
    pub fn cached_queries(&self) -> usize {
        self.query_cache.lock().expect("query cache mutex poisoned").entries.len()
    }
}

fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"))
}

fn cache_key(sql: &str, params: &Params) -> String {
    let encoded = serde_json::to_string(params).unwrap_or_default();
    format!("{}\u{0}{}", sql, encoded)
}

/// Bind `params` to the statement's named placeholders.
fn bind(stmt: &mut Statement<'_>, params: &Params, schema: Option<&Schema>) -> Result<(), OrmError> {
    let mut referenced = HashSet::new();
    for index in 1..=stmt.parameter_count() {
        let placeholder = stmt.parameter_name(index).unwrap_or("?").to_string();
        let name = placeholder.trim_start_matches([':', '@', '$']).to_string();
        let value = params
            .get(&name)
            .ok_or_else(|| OrmError::MissingParameter(name.clone()))?;
        // Only schema columns pick a binding type; other values keep their own.
        let value = match schema.and_then(|s| s.get(&name)) {
            Some(column) => value.clone().coerce(column.kind),
            None => value.clone(),
        };
        stmt.raw_bind_parameter(index, value)?;
        referenced.insert(name);
    }

    if let Some((name, _)) = params.iter().find(|(name, _)| !referenced.contains(*name)) {
        return Err(OrmError::UnexpectedParameter(name.to_string()));
    }
    Ok(())
}

/// Registry of data sources, opened lazily from config.
#[derive(Default)]
pub struct DataSources {
    configs: BTreeMap<String, DatabaseConfig>,
    open: DashMap<String, Arc<DataSource>>,
}

impl DataSources {
    pub fn new(configs: BTreeMap<String, DatabaseConfig>) -> Self {
        Self {
            configs,
            open: DashMap::new(),
        }
    }

    /// Register an already opened data source.
    pub fn insert(&self, source: DataSource) -> Arc<DataSource> {
        let source = Arc::new(source);
        self.open.insert(source.name().to_string(), Arc::clone(&source));
        source
    }

    /// Return the data source named `name`, opening it on first use.
    pub fn get(&self, name: &str) -> Result<Arc<DataSource>, OrmError> {
        if let Some(source) = self.open.get(name) {
            return Ok(Arc::clone(source.value()));
        }
        let config = self
            .configs
            .get(name)
            .ok_or_else(|| OrmError::UnknownDataSource(name.to_string()))?;
        let source = Arc::new(DataSource::open(name, config)?);
        Ok(Arc::clone(
            self.open.entry(name.to_string()).or_insert(source).value(),
        ))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }
}
