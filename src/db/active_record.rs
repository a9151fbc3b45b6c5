//! Active-Record operations.
//!
//! [`Orm`] owns the data sources, the model registry and the schema cache.
//! [`Orm::table`] returns a [`Table`]: the model bound to its data source,
//! which provides finders, writes with lifecycle hooks and relation
//! resolution.
//!
//! # Write flow
//! ```text
//! save(record)
//!     → validate (unless skipped)      ── Err(Invalid)
//!     → before_save hook               ── Err(Aborted)
//!     → field set from schema ∩ record
//!     → INSERT or UPDATE by primary key
//!     → after_save(created)
//! ```

use std::sync::Arc;

use crate::cache::Caches;
use crate::config::AppConfig;
use crate::db::connection::{DataSource, DataSources};
use crate::db::error::OrmError;
use crate::db::model::{Model, ModelMeta, ModelRegistry, RelationKind, ResolvedRelation};
use crate::db::query::{self, quote_field, Fields, Select};
use crate::db::record::{Record, Related};
use crate::db::schema::{ParamType, Schema, SchemaCache};
use crate::db::value::{Params, Row, Value};

/// Entry point of the persistence layer.
pub struct Orm {
    sources: DataSources,
    models: ModelRegistry,
    schemas: SchemaCache,
}

impl Orm {
    pub fn new(sources: DataSources, schemas: SchemaCache) -> Self {
        Self {
            sources,
            models: ModelRegistry::new(),
            schemas,
        }
    }

    /// Build from `[databases]`. Schemas are also cached in the `default`
    /// cache configuration when one is declared.
    pub fn from_config(config: &AppConfig, caches: &Caches) -> Result<Self, OrmError> {
        let sources = DataSources::new(config.databases.clone());
        let schemas = if caches.contains("default") {
            SchemaCache::with_store(caches.get("default")?)
        } else {
            SchemaCache::new()
        };
        Ok(Self::new(sources, schemas))
    }

    pub fn register(&mut self, model: impl Model + 'static) -> Arc<dyn Model> {
        self.models.register(model)
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    /// Table of the registered model `name`.
    pub fn table(&self, name: &str) -> Result<Table<'_>, OrmError> {
        self.table_for(self.models.get(name)?)
    }

    /// Table of an arbitrary model, registered or not.
    pub fn table_for(&self, model: Arc<dyn Model>) -> Result<Table<'_>, OrmError> {
        let source = self.sources.get(&model.meta().db_config)?;
        Ok(Table {
            orm: self,
            model,
            source,
        })
    }

    /// A new, unsaved record of model `name`.
    pub fn create(&self, name: &str) -> Result<Record, OrmError> {
        Ok(Record::new(self.models.get(name)?))
    }
}

/// Options for insert/update/replace.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub validate: bool,
    /// Columns to write. Empty means every schema column set on the record.
    pub fields: Vec<String>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            validate: true,
            fields: Vec::new(),
        }
    }
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// A model bound to its data source.
pub struct Table<'a> {
    orm: &'a Orm,
    model: Arc<dyn Model>,
    source: Arc<DataSource>,
}

impl<'a> Table<'a> {
    pub fn meta(&self) -> &ModelMeta {
        self.model.meta()
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn source(&self) -> &Arc<DataSource> {
        &self.source
    }

    fn name(&self) -> &str {
        &self.meta().table
    }

    pub fn new_record(&self) -> Record {
        Record::new(Arc::clone(&self.model))
    }

    pub fn schema(&self) -> Result<Arc<Schema>, OrmError> {
        self.orm.schemas.get_or_describe(&self.source, self.name())
    }

    pub fn build_select(&self, select: &Select) -> String {
        query::build_select(self.name(), select)
    }

    fn fetch(&self, sql: &str, params: &Params) -> Result<Vec<Row>, OrmError> {
        let schema = self.schema()?;
        if self.meta().cache_queries {
            self.source.query_cached(sql, params, Some(&schema))
        } else {
            self.source.query(sql, params, Some(&schema))
        }
    }

    fn record_from_row(&self, row: Row, schema: &Schema) -> Record {
        let attributes = row
            .into_columns()
            .into_iter()
            .map(|(name, value)| {
                let value = match schema.kind(&name) {
                    ParamType::Bool => value.coerce(ParamType::Bool),
                    _ => value,
                };
                (name, value)
            })
            .collect();
        Record::loaded(Arc::clone(&self.model), attributes)
    }

    fn key_params(&self, id: &[Value]) -> Params {
        self.meta()
            .primary_key
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), id.get(i).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    // ---- reads ----

    /// Run raw SQL and return rows.
    pub fn query_rows(&self, sql: &str, params: &Params) -> Result<Vec<Row>, OrmError> {
        self.fetch(sql, params)
    }

    /// Run raw SQL and return persisted records.
    pub fn query(&self, sql: &str, params: &Params) -> Result<Vec<Record>, OrmError> {
        let schema = self.schema()?;
        let rows = self.fetch(sql, params)?;
        Ok(rows
            .into_iter()
            .map(|row| self.record_from_row(row, &schema))
            .collect())
    }

    pub fn find_all(&self, select: &Select, params: &Params) -> Result<Vec<Record>, OrmError> {
        self.query(&self.build_select(select), params)
    }

    pub fn find(&self, select: &Select, params: &Params) -> Result<Option<Record>, OrmError> {
        let select = select.clone().limit(1);
        Ok(self.find_all(&select, params)?.into_iter().next())
    }

    /// Find by a single-column primary key.
    pub fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<Record>, OrmError> {
        self.find_by_key(&[id.into()], &Select::new())
    }

    /// Find by primary key values in key order; `extra` supplies fields,
    /// joins and so on (its conditions are replaced).
    pub fn find_by_key(&self, id: &[Value], extra: &Select) -> Result<Option<Record>, OrmError> {
        let select = extra
            .clone()
            .conditions(query::key_conditions(&self.meta().primary_key));
        self.find(&select, &self.key_params(id))
    }

    /// Load the row with primary key `id` into `record`.
    pub fn read(&self, record: &mut Record, id: &[Value]) -> Result<bool, OrmError> {
        let Some(found) = self.find_by_key(id, &Select::new())? else {
            return Ok(false);
        };
        let mut attributes = record.attributes().clone();
        attributes.extend(found.attributes().clone());
        record.replace_attributes(attributes);
        record.set_exists(true);
        Ok(true)
    }

    /// Re-read every column of `record` from the table.
    pub fn reload(&self, record: &mut Record) -> Result<bool, OrmError> {
        let id = record.id();
        self.read(record, &id)
    }

    /// `(key, label)` pairs, by default primary key and display field
    /// ordered by the label. Two explicit fields override both.
    pub fn find_list(&self, select: &Select, params: &Params) -> Result<Vec<(Value, Value)>, OrmError> {
        let meta = self.meta();
        let explicit = match &select.fields {
            Fields::List(list) if list.len() >= 2 => Some((list[0].clone(), list[1].clone())),
            Fields::Raw(raw) => {
                let mut parts = raw.split(',').map(|p| p.trim().to_string());
                match (parts.next(), parts.next()) {
                    (Some(k), Some(v)) => Some((k, v)),
                    _ => None,
                }
            }
            _ => None,
        };

        let mut select = select.clone();
        let (key, value) = match explicit {
            Some(pair) => pair,
            None => {
                let pair = (meta.key_field()?.to_string(), meta.display_field.clone());
                select.fields = Fields::List(vec![pair.0.clone(), pair.1.clone()]);
                pair
            }
        };
        if select.order.as_deref().map_or(true, |o| o.trim().is_empty()) {
            select.order = Some(format!("{} ASC", quote_field(&value)));
        }

        let (key_label, value_label) = (column_label(&key), column_label(&value));
        let rows = self.fetch(&self.build_select(&select), params)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get(&key_label).cloned().unwrap_or(Value::Null),
                    row.get(&value_label).cloned().unwrap_or(Value::Null),
                )
            })
            .collect())
    }

    /// Number of matching rows. Explicit fields become `COUNT(<fields>)`.
    pub fn find_count(&self, select: &Select, params: &Params) -> Result<i64, OrmError> {
        let counted = match &select.fields {
            Fields::All => "*".to_string(),
            Fields::Raw(raw) => raw.clone(),
            Fields::List(list) => query::quote_fields(list).join(", "),
        };
        let mut select = select.clone();
        select.fields = Fields::Raw(format!("COUNT({})", counted));

        let rows = self.fetch(&self.build_select(&select), params)?;
        Ok(rows
            .first()
            .and_then(Row::first)
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Whether no other row has the record's value in `field`. A persisted
    /// record's own row is excluded when its key is fully set.
    pub fn is_unique(&self, record: &Record, field: &str) -> Result<bool, OrmError> {
        let mut conditions = format!("{} = :{}", quote_field(field), field);
        let mut params = Params::new().with(field, record.get(field).cloned().unwrap_or(Value::Null));

        let id = record.id();
        if id.iter().all(|v| !v.is_null()) {
            for (key, value) in self.meta().primary_key.iter().zip(id) {
                conditions.push_str(&format!(" AND {} != :{}", quote_field(key), key));
                params.insert(key.clone(), value);
            }
        }
        Ok(self.find_count(&Select::new().conditions(conditions), &params)? == 0)
    }

    /// One page of records; pages start at 1.
    pub fn paginate(&self, page: i64, limit: i64, select: &Select, params: &Params) -> Result<Vec<Record>, OrmError> {
        let limit = limit.max(1);
        let offset = (page.max(1) - 1).saturating_mul(limit);
        let select = select.clone().limit(format!("{}, {}", offset, limit));
        self.find_all(&select, params)
    }

    fn equality(fields: &[(&str, Value)]) -> (String, Params) {
        let names: Vec<&str> = fields.iter().map(|(f, _)| *f).collect();
        let params = fields.iter().map(|(f, v)| (f.to_string(), v.clone())).collect();
        (query::key_conditions(&names), params)
    }

    /// First record whose fields equal the given values.
    pub fn find_by(&self, fields: &[(&str, Value)]) -> Result<Option<Record>, OrmError> {
        let (conditions, params) = Self::equality(fields);
        self.find(&Select::new().conditions(conditions), &params)
    }

    pub fn find_all_by(&self, fields: &[(&str, Value)]) -> Result<Vec<Record>, OrmError> {
        let (conditions, params) = Self::equality(fields);
        self.find_all(&Select::new().conditions(conditions), &params)
    }

    fn finder(expr: &str, values: &[Value]) -> Result<(String, Params), OrmError> {
        let (conditions, keys) = query::parse_finder(expr);
        if keys.len() != values.len() {
            return Err(OrmError::FinderArity {
                expr: expr.to_string(),
                expected: keys.len(),
                got: values.len(),
            });
        }
        let params = keys.into_iter().zip(values.iter().cloned()).collect();
        Ok((conditions, params))
    }

    /// Finder expression such as `EmailOrUsername`, one value per field.
    pub fn find_by_expr(&self, expr: &str, values: &[Value]) -> Result<Option<Record>, OrmError> {
        let (conditions, params) = Self::finder(expr, values)?;
        self.find(&Select::new().conditions(conditions), &params)
    }

    pub fn find_all_by_expr(&self, expr: &str, values: &[Value]) -> Result<Vec<Record>, OrmError> {
        let (conditions, params) = Self::finder(expr, values)?;
        self.find_all(&Select::new().conditions(conditions), &params)
    }

    // ---- writes ----

    /// Insert when the record is new, update otherwise.
    pub fn save(&self, record: &mut Record) -> Result<(), OrmError> {
        self.save_with(record, &SaveOptions::default())
    }

    pub fn save_with(&self, record: &mut Record, options: &SaveOptions) -> Result<(), OrmError> {
        if record.exists() {
            self.update(record, options)
        } else {
            self.insert(record, options)
        }
    }

    /// Validation, `before_save` and field resolution shared by writes.
    fn prepare_save(&self, record: &mut Record, options: &SaveOptions) -> Result<(Arc<Schema>, Vec<String>), OrmError> {
        if options.validate {
            self.model.validate(record).map_err(OrmError::Invalid)?;
        }
        if !self.model.before_save(record) {
            return Err(OrmError::Aborted { hook: "before_save" });
        }

        let schema = self.schema()?;
        let fields: Vec<String> = if options.fields.is_empty() {
            schema
                .names()
                .filter(|name| record.get(name).is_some())
                .map(String::from)
                .collect()
        } else {
            for field in &options.fields {
                if !schema.contains(field) {
                    return Err(OrmError::UnknownField {
                        table: self.name().to_string(),
                        field: field.clone(),
                    });
                }
            }
            options.fields.clone()
        };
        if fields.is_empty() {
            return Err(OrmError::NothingToSave);
        }
        Ok((schema, fields))
    }

    fn field_params(record: &Record, fields: &[String]) -> Params {
        fields
            .iter()
            .map(|f| (f.clone(), record.get(f).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    pub fn insert(&self, record: &mut Record, options: &SaveOptions) -> Result<(), OrmError> {
        let (schema, fields) = self.prepare_save(record, options)?;
        let sql = query::insert(self.name(), &fields);
        self.source
            .execute(&sql, &Self::field_params(record, &fields), Some(&schema))?;

        let primary_key = &self.meta().primary_key;
        if primary_key.len() == 1 && record.get(&primary_key[0]).map_or(true, Value::is_null) {
            record.set(&primary_key[0], self.source.last_insert_id());
        }
        record.set_exists(true);
        self.model.after_save(record, true);
        Ok(())
    }

    pub fn replace(&self, record: &mut Record, options: &SaveOptions) -> Result<(), OrmError> {
        let (schema, fields) = self.prepare_save(record, options)?;
        let sql = query::replace(self.name(), &fields);
        self.source
            .execute(&sql, &Self::field_params(record, &fields), Some(&schema))?;
        record.set_exists(true);
        self.model.after_save(record, true);
        Ok(())
    }

    pub fn update(&self, record: &mut Record, options: &SaveOptions) -> Result<(), OrmError> {
        let (schema, fields) = self.prepare_save(record, options)?;
        let primary_key = &self.meta().primary_key;
        let updates: Vec<String> = fields
            .into_iter()
            .filter(|f| !primary_key.contains(f))
            .collect();
        if updates.is_empty() {
            return Err(OrmError::NothingToSave);
        }

        let sql = query::update(self.name(), &updates, primary_key);
        let mut params = Self::field_params(record, &updates);
        params.extend(&self.key_params(&record.id()));
        self.source.execute(&sql, &params, Some(&schema))?;

        record.set_exists(true);
        self.model.after_save(record, false);
        Ok(())
    }

    /// Update one column of a persisted record.
    pub fn save_field(&self, record: &mut Record, field: &str, value: impl Into<Value>) -> Result<(), OrmError> {
        if !record.exists() {
            return Err(OrmError::NotPersisted);
        }
        let schema = self.schema()?;
        if !schema.contains(field) {
            return Err(OrmError::UnknownField {
                table: self.name().to_string(),
                field: field.to_string(),
            });
        }
        let primary_key = &self.meta().primary_key;
        if primary_key.iter().any(|k| k == field) {
            return Err(OrmError::PrimaryKeyField(field.to_string()));
        }

        let value = value.into();
        if !self.model.before_save_field(record, field, &value) {
            return Err(OrmError::Aborted { hook: "before_save_field" });
        }

        let sql = query::update_field(self.name(), field, primary_key);
        let mut params = self.key_params(&record.id());
        params.insert(field, value.clone());
        self.source.execute(&sql, &params, Some(&schema))?;

        record.set(field, value);
        self.model.after_save_field(record, field);
        Ok(())
    }

    /// Delete a persisted record and its dependent join rows.
    pub fn delete(&self, record: &mut Record) -> Result<(), OrmError> {
        if !record.exists() {
            return Err(OrmError::NotPersisted);
        }
        if !self.model.before_delete(record) {
            return Err(OrmError::Aborted { hook: "before_delete" });
        }

        let schema = self.schema()?;
        let sql = query::delete(self.name(), &self.meta().primary_key);
        self.source
            .execute(&sql, &self.key_params(&record.id()), Some(&schema))?;

        record.set_exists(false);
        self.clean_links(record)?;
        self.model.after_delete(record);
        Ok(())
    }

    /// Delete every row matching `conditions`, which must not be empty.
    pub fn delete_all(&self, conditions: &str, params: &Params) -> Result<usize, OrmError> {
        if conditions.trim().is_empty() {
            return Err(OrmError::EmptyConditions);
        }
        if !self.model.before_delete_all(conditions) {
            return Err(OrmError::Aborted { hook: "before_delete_all" });
        }

        let schema = self.schema()?;
        let sql = query::delete_all(self.name(), conditions);
        let affected = self.source.execute(&sql, params, Some(&schema))?;
        self.model.after_delete_all(affected);
        Ok(affected)
    }

    /// `UPDATE <table> SET <updates> WHERE <conditions>`.
    pub fn update_all(&self, updates: &str, conditions: &str, params: &Params) -> Result<usize, OrmError> {
        if !self.model.before_update_all(updates, conditions) {
            return Err(OrmError::Aborted { hook: "before_update_all" });
        }

        let schema = self.schema()?;
        let sql = query::update_all(self.name(), updates, conditions);
        let affected = self.source.execute(&sql, params, Some(&schema))?;
        self.model.after_update_all(affected);
        Ok(affected)
    }

    /// Remove every row.
    pub fn truncate(&self) -> Result<(), OrmError> {
        if !self.model.before_truncate() {
            return Err(OrmError::Aborted { hook: "before_truncate" });
        }
        self.source
            .execute(&query::truncate(self.name()), &Params::new(), None)?;
        tracing::info!(table = %self.name(), "Table truncated");
        self.model.after_truncate();
        Ok(())
    }

    // ---- relations ----

    pub fn relation(&self, name: &str) -> Result<ResolvedRelation, OrmError> {
        let meta = self.meta();
        meta.get_relation(name)
            .map(|r| r.resolve(&meta.name))
            .ok_or_else(|| OrmError::UnknownRelation {
                model: meta.name.clone(),
                name: name.to_string(),
            })
    }

    /// Resolve relation `name` of `record`. Persisting relations are stored
    /// on the record and served from it afterwards.
    pub fn related(&self, record: &mut Record, name: &str) -> Result<Related, OrmError> {
        if let Some(existing) = record.related(name) {
            return Ok(existing.clone());
        }
        let relation = self.relation(name)?;
        let result = self.resolve_relation(record, &relation)?;
        if relation.persist {
            record.set_related(name, result.clone());
        }
        Ok(result)
    }

    fn resolve_relation(&self, record: &Record, relation: &ResolvedRelation) -> Result<Related, OrmError> {
        let target = self.orm.table(&relation.target)?;
        match relation.kind {
            RelationKind::HasMany | RelationKind::HasOne => {
                let fk = &relation.foreign_key;
                let conditions = relation
                    .conditions
                    .clone()
                    .unwrap_or_else(|| format!("{} = :{}", quote_field(fk), fk));
                let mut params = relation.params.clone();
                if conditions.contains(&format!(":{}", fk)) {
                    params.insert(fk.clone(), record.first_id());
                }
                let select = relation.extra.clone().conditions(conditions);

                let parent = record.shallow();
                let slots: Vec<String> = target
                    .meta()
                    .relations_to(RelationKind::BelongsTo, &self.meta().name)
                    .map(|(name, _)| name.to_string())
                    .collect();
                let backfill = |child: &mut Record| {
                    for slot in &slots {
                        child.set_related(slot, Related::One(Box::new(parent.clone())));
                    }
                };

                if relation.kind == RelationKind::HasMany {
                    let mut children = target.find_all(&select, &params)?;
                    children.iter_mut().for_each(backfill);
                    Ok(Related::Many(children))
                } else {
                    Ok(match target.find(&select, &params)? {
                        Some(mut child) => {
                            backfill(&mut child);
                            Related::One(Box::new(child))
                        }
                        None => Related::Missing,
                    })
                }
            }
            RelationKind::BelongsTo => {
                let key = record.get(&relation.foreign_key).cloned().unwrap_or(Value::Null);
                if key.is_null() {
                    return Ok(Related::Missing);
                }
                Ok(match target.find_by_key(&[key], &relation.extra)? {
                    Some(parent) => Related::One(Box::new(parent)),
                    None => Related::Missing,
                })
            }
            RelationKind::HasAndBelongsToMany => {
                let self_key = &relation.self_key;
                let conditions = relation
                    .conditions
                    .clone()
                    .unwrap_or_else(|| format!("{} = :{}", quote_field(self_key), self_key));
                let mut params = relation.params.clone();
                if conditions.contains(&format!(":{}", self_key)) {
                    params.insert(self_key.clone(), record.first_id());
                }

                let target_table = &target.meta().table;
                let target_key = target.meta().key_field()?;
                let mut select = relation.extra.clone().conditions(conditions);
                if select.joins.is_none() {
                    let join = quote_field(&relation.join_table);
                    select.joins = Some(format!(
                        "LEFT JOIN {} ON ({}.{} = {}.{})",
                        join,
                        join,
                        quote_field(&relation.foreign_key),
                        quote_field(target_table),
                        quote_field(target_key),
                    ));
                }
                if select.fields == Fields::All {
                    select.fields = Fields::Raw(format!("{}.*", quote_field(target_table)));
                }
                Ok(Related::Many(target.find_all(&select, &params)?))
            }
        }
    }

    /// New record of model `target` attached to `owner` through its
    /// belongs-to relations (foreign keys set).
    pub fn build_related(&self, owner: &Record, target: &str) -> Result<Record, OrmError> {
        let target = self.orm.table(target)?;
        let mut record = target.new_record();
        let owner_name = &owner.meta().name;
        let slots: Vec<String> = target
            .meta()
            .relations_to(RelationKind::BelongsTo, owner_name)
            .map(|(name, _)| name.to_string())
            .collect();

        if slots.is_empty() {
            record.set_related(owner_name, Related::One(Box::new(owner.shallow())));
        }
        for slot in slots {
            record.associate(&slot, owner)?;
        }
        Ok(record)
    }

    fn habtm(&self, other: &Record, name: Option<&str>) -> Result<ResolvedRelation, OrmError> {
        let meta = self.meta();
        let found = match name {
            Some(name) => meta
                .get_relation(name)
                .filter(|r| r.kind == RelationKind::HasAndBelongsToMany),
            None => meta
                .relations_to(RelationKind::HasAndBelongsToMany, &other.meta().name)
                .next()
                .map(|(_, r)| r),
        };
        found
            .map(|r| r.resolve(&meta.name))
            .ok_or_else(|| OrmError::UnknownRelation {
                model: meta.name.clone(),
                name: name.unwrap_or(&other.meta().name).to_string(),
            })
    }

    fn join_table(&self, relation: &ResolvedRelation) -> Result<Table<'a>, OrmError> {
        let meta = ModelMeta::new(&relation.join_table)
            .table(&relation.join_table)
            .primary_key([relation.self_key.clone(), relation.foreign_key.clone()])
            .db_config(&self.meta().db_config);
        let model: Arc<dyn Model> = Arc::new(meta);
        self.orm.table_for(model)
    }

    fn link_conditions(relation: &ResolvedRelation, record: &Record, other: &Record) -> (String, Params) {
        let conditions = format!(
            "{} = :self AND {} = :foreign",
            quote_field(&relation.self_key),
            quote_field(&relation.foreign_key)
        );
        let params = Params::new()
            .with("self", record.first_id())
            .with("foreign", other.first_id());
        (conditions, params)
    }

    /// Whether a join row links `record` and `other`.
    pub fn has_link(&self, record: &Record, other: &Record, name: Option<&str>) -> Result<bool, OrmError> {
        let relation = self.habtm(other, name)?;
        let join = self.join_table(&relation)?;
        let (conditions, params) = Self::link_conditions(&relation, record, other);
        Ok(join.find_count(&Select::new().conditions(conditions), &params)? > 0)
    }

    /// Create the join row; `false` when it already exists.
    pub fn add_link(&self, record: &Record, other: &Record, name: Option<&str>) -> Result<bool, OrmError> {
        let relation = self.habtm(other, name)?;
        let join = self.join_table(&relation)?;
        let (conditions, params) = Self::link_conditions(&relation, record, other);
        if join.find_count(&Select::new().conditions(conditions), &params)? > 0 {
            return Ok(false);
        }

        let mut link = join.new_record();
        link.set(&relation.self_key, record.first_id())
            .set(&relation.foreign_key, other.first_id());
        join.insert(&mut link, &SaveOptions::new().skip_validation())?;
        Ok(true)
    }

    /// Remove the join row, returning the number of rows deleted.
    pub fn remove_link(&self, record: &Record, other: &Record, name: Option<&str>) -> Result<usize, OrmError> {
        let relation = self.habtm(other, name)?;
        let join = self.join_table(&relation)?;
        let (conditions, params) = Self::link_conditions(&relation, record, other);
        join.delete_all(&conditions, &params)
    }

    /// Remove join rows of every dependent has-and-belongs-to-many relation.
    pub fn clean_links(&self, record: &Record) -> Result<(), OrmError> {
        let meta = self.meta();
        for (_, relation) in &meta.relations {
            if relation.kind != RelationKind::HasAndBelongsToMany || !relation.dependent {
                continue;
            }
            let relation = relation.resolve(&meta.name);
            let join = self.join_table(&relation)?;
            let removed = join.delete_all(
                &format!("{} = :self", quote_field(&relation.self_key)),
                &Params::new().with("self", record.first_id()),
            )?;
            tracing::debug!(join_table = %relation.join_table, removed, "Join rows removed");
        }
        Ok(())
    }
}

/// Column name reported by SQLite for a select-list entry.
fn column_label(field: &str) -> String {
    field
        .rsplit('.')
        .next()
        .unwrap_or(field)
        .trim()
        .trim_matches('`')
        .to_string()
}
