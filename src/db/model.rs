//! Model declarations: table mapping, relations and lifecycle hooks.
//!
//! A model is described by a [`ModelMeta`]. Applications that need
//! validation or hooks implement [`Model`] on their own type and return the
//! meta from [`Model::meta`]; plain models register the meta directly.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::db::error::OrmError;
use crate::db::query::Select;
use crate::db::record::Record;
use crate::db::value::{Params, Value};
use crate::inflect::underscore;
use crate::validator::ValidationErrors;

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasMany,
    HasOne,
    BelongsTo,
    HasAndBelongsToMany,
}

/// A relation declaration. Unset keys are filled from naming conventions
/// when the relation is resolved (see [`Relation::resolve`]).
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    /// Target model name.
    pub target: String,
    pub foreign_key: Option<String>,
    /// Owner column in the join table (has-and-belongs-to-many).
    pub self_key: Option<String>,
    pub join_table: Option<String>,
    /// Replaces the default foreign key condition.
    pub conditions: Option<String>,
    pub params: Params,
    /// Extra select parts (order, limit, fields, joins).
    pub extra: Select,
    /// Store the resolved result on the record.
    pub persist: bool,
    /// Remove join rows when the owner is deleted.
    pub dependent: bool,
}

impl Relation {
    fn new(kind: RelationKind, target: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
            foreign_key: None,
            self_key: None,
            join_table: None,
            conditions: None,
            params: Params::new(),
            extra: Select::new(),
            persist: true,
            dependent: true,
        }
    }

    pub fn has_many(target: &str) -> Self {
        Self::new(RelationKind::HasMany, target)
    }

    pub fn has_one(target: &str) -> Self {
        Self::new(RelationKind::HasOne, target)
    }

    pub fn belongs_to(target: &str) -> Self {
        Self::new(RelationKind::BelongsTo, target)
    }

    pub fn has_and_belongs_to_many(target: &str) -> Self {
        Self::new(RelationKind::HasAndBelongsToMany, target)
    }

    pub fn foreign_key(mut self, key: &str) -> Self {
        self.foreign_key = Some(key.to_string());
        self
    }

    pub fn self_key(mut self, key: &str) -> Self {
        self.self_key = Some(key.to_string());
        self
    }

    pub fn join_table(mut self, table: &str) -> Self {
        self.join_table = Some(table.to_string());
        self
    }

    pub fn conditions(mut self, conditions: &str, params: Params) -> Self {
        self.conditions = Some(conditions.to_string());
        self.params = params;
        self
    }

    pub fn extra(mut self, extra: Select) -> Self {
        self.extra = extra;
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn dependent(mut self, dependent: bool) -> Self {
        self.dependent = dependent;
        self
    }

    /// Fill unset keys for a relation owned by `owner`.
    ///
    /// - has-many / has-one: foreign key `<owner>_id`
    /// - belongs-to: foreign key `<target>_id`
    /// - has-and-belongs-to-many: foreign key `<target>_id`, self key
    ///   `<owner>_id`, join table `<a>_<b>` in lexical order
    pub fn resolve(&self, owner: &str) -> ResolvedRelation {
        let owner_u = underscore(owner);
        let target_u = underscore(&self.target);
        let (foreign_key, self_key, join_table) = match self.kind {
            RelationKind::HasMany | RelationKind::HasOne => {
                (format!("{}_id", owner_u), String::new(), String::new())
            }
            RelationKind::BelongsTo => (format!("{}_id", target_u), String::new(), String::new()),
            RelationKind::HasAndBelongsToMany => {
                let join = if target_u < owner_u {
                    format!("{}_{}", target_u, owner_u)
                } else {
                    format!("{}_{}", owner_u, target_u)
                };
                (format!("{}_id", target_u), format!("{}_id", owner_u), join)
            }
        };

        ResolvedRelation {
            kind: self.kind,
            target: self.target.clone(),
            foreign_key: self.foreign_key.clone().unwrap_or(foreign_key),
            self_key: self.self_key.clone().unwrap_or(self_key),
            join_table: self.join_table.clone().unwrap_or(join_table),
            conditions: self.conditions.clone(),
            params: self.params.clone(),
            extra: self.extra.clone(),
            persist: self.persist,
            dependent: self.dependent,
        }
    }
}

/// A relation with every key known.
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    pub kind: RelationKind,
    pub target: String,
    pub foreign_key: String,
    pub self_key: String,
    pub join_table: String,
    pub conditions: Option<String>,
    pub params: Params,
    pub extra: Select,
    pub persist: bool,
    pub dependent: bool,
}

/// Table mapping of a model.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    pub name: String,
    pub table: String,
    pub primary_key: Vec<String>,
    pub display_field: String,
    pub db_config: String,
    pub cache_queries: bool,
    /// Relations by name, in declaration order.
    pub relations: Vec<(String, Relation)>,
}

impl ModelMeta {
    /// Conventions: table `<underscored name>s`, key `id`, display field
    /// `id`, data source `default`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: format!("{}s", underscore(name)),
            primary_key: vec!["id".to_string()],
            display_field: "id".to_string(),
            db_config: "default".to_string(),
            cache_queries: false,
            relations: Vec::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// An empty list keeps the current key.
    pub fn primary_key<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if !keys.is_empty() {
            self.primary_key = keys;
        }
        self
    }

    /// First primary key column.
    pub fn key_field(&self) -> Result<&str, OrmError> {
        self.primary_key
            .first()
            .map(String::as_str)
            .ok_or_else(|| OrmError::NoPrimaryKey(self.name.clone()))
    }

    pub fn display_field(mut self, field: &str) -> Self {
        self.display_field = field.to_string();
        self
    }

    pub fn db_config(mut self, name: &str) -> Self {
        self.db_config = name.to_string();
        self
    }

    pub fn cache_queries(mut self, enabled: bool) -> Self {
        self.cache_queries = enabled;
        self
    }

    /// Declare a relation under `name`.
    pub fn relation(mut self, name: &str, relation: Relation) -> Self {
        self.relations.retain(|(n, _)| n != name);
        self.relations.push((name.to_string(), relation));
        self
    }

    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Relations of `kind` pointing at model `target`.
    pub fn relations_to<'a>(
        &'a self,
        kind: RelationKind,
        target: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Relation)> + 'a {
        self.relations
            .iter()
            .filter(move |(_, r)| r.kind == kind && r.target == target)
            .map(|(n, r)| (n.as_str(), r))
    }
}

/// Behaviour attached to a model.
///
/// Every hook has a permissive default. A `before_*` hook returning `false`
/// aborts the operation before any SQL runs.
pub trait Model: Send + Sync {
    fn meta(&self) -> &ModelMeta;

    fn validate(&self, _record: &Record) -> Result<(), ValidationErrors> {
        Ok(())
    }

    fn before_save(&self, _record: &mut Record) -> bool {
        true
    }

    fn after_save(&self, _record: &Record, _created: bool) {}

    fn before_save_field(&self, _record: &Record, _field: &str, _value: &Value) -> bool {
        true
    }

    fn after_save_field(&self, _record: &Record, _field: &str) {}

    fn before_delete(&self, _record: &Record) -> bool {
        true
    }

    fn after_delete(&self, _record: &Record) {}

    fn before_update_all(&self, _updates: &str, _conditions: &str) -> bool {
        true
    }

    fn after_update_all(&self, _affected: usize) {}

    fn before_delete_all(&self, _conditions: &str) -> bool {
        true
    }

    fn after_delete_all(&self, _affected: usize) {}

    fn before_truncate(&self) -> bool {
        true
    }

    fn after_truncate(&self) {}
}

impl Model for ModelMeta {
    fn meta(&self) -> &ModelMeta {
        self
    }
}

/// Registered models by name.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: impl Model + 'static) -> Arc<dyn Model> {
        let model: Arc<dyn Model> = Arc::new(model);
        self.models.insert(model.meta().name.clone(), Arc::clone(&model));
        model
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Model>, OrmError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownModel(name.to_string()))
    }

    /// Model names with their tables, sorted by name.
    pub fn tables(&self) -> BTreeMap<&str, &str> {
        self.models
            .values()
            .map(|m| (m.meta().name.as_str(), m.meta().table.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_conventions() {
        let meta = ModelMeta::new("BlogPost");
        assert_eq!(meta.table, "blog_posts");
        assert_eq!(meta.primary_key, vec!["id"]);
        assert_eq!(meta.display_field, "id");
        assert_eq!(meta.db_config, "default");
        assert!(!meta.cache_queries);
    }

    #[test]
    fn test_empty_primary_key_is_rejected() {
        let meta = ModelMeta::new("Tag").primary_key(Vec::<String>::new());
        assert_eq!(meta.key_field().unwrap(), "id");

        let mut bare = ModelMeta::new("Tag");
        bare.primary_key.clear();
        assert!(matches!(bare.key_field(), Err(OrmError::NoPrimaryKey(name)) if name == "Tag"));
    }

    #[test]
    fn test_relation_defaults() {
        let has_many = Relation::has_many("Comment").resolve("BlogPost");
        assert_eq!(has_many.foreign_key, "blog_post_id");

        let belongs_to = Relation::belongs_to("BlogPost").resolve("Comment");
        assert_eq!(belongs_to.foreign_key, "blog_post_id");
        assert!(belongs_to.persist);

        let habtm = Relation::has_and_belongs_to_many("Tag").resolve("Post");
        assert_eq!(habtm.foreign_key, "tag_id");
        assert_eq!(habtm.self_key, "post_id");
        assert_eq!(habtm.join_table, "post_tag");
        assert!(habtm.dependent);

        let reverse = Relation::has_and_belongs_to_many("Post").resolve("Tag");
        assert_eq!(reverse.join_table, "post_tag");
    }

    #[test]
    fn test_relation_overrides() {
        let resolved = Relation::has_many("Comment")
            .foreign_key("article_id")
            .persist(false)
            .resolve("Post");
        assert_eq!(resolved.foreign_key, "article_id");
        assert!(!resolved.persist);
    }

    #[test]
    fn test_registry() {
        let mut registry = ModelRegistry::new();
        registry.register(ModelMeta::new("Post").relation("Comments", Relation::has_many("Comment")));
        assert!(registry.get("Post").is_ok());
        assert!(matches!(registry.get("Nope"), Err(OrmError::UnknownModel(_))));
        assert_eq!(registry.tables().get("Post"), Some(&"posts"));

        let post = registry.get("Post").unwrap();
        assert!(post.meta().get_relation("Comments").is_some());
        assert_eq!(
            post.meta().relations_to(RelationKind::HasMany, "Comment").count(),
            1
        );
    }
}
