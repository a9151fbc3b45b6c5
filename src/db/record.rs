//! A single table row bound to its model.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::db::error::OrmError;
use crate::db::model::{Model, ModelMeta, RelationKind};
use crate::db::value::Value;

/// Resolved relation data stored on a record.
#[derive(Debug, Clone)]
pub enum Related {
    One(Box<Record>),
    Many(Vec<Record>),
    /// The relation was resolved and nothing was found.
    Missing,
}

impl Related {
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Related::One(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_many(&self) -> &[Record] {
        match self {
            Related::Many(records) => records,
            _ => &[],
        }
    }
}

/// One row of a model's table.
#[derive(Clone)]
pub struct Record {
    model: Arc<dyn Model>,
    attributes: BTreeMap<String, Value>,
    related: BTreeMap<String, Related>,
    exists: bool,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.meta().name)
            .field("attributes", &self.attributes)
            .field("related", &self.related)
            .field("exists", &self.exists)
            .finish()
    }
}

impl Record {
    /// A new, not yet persisted record.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            attributes: BTreeMap::new(),
            related: BTreeMap::new(),
            exists: false,
        }
    }

    pub(crate) fn loaded(model: Arc<dyn Model>, attributes: BTreeMap<String, Value>) -> Self {
        Self {
            model,
            attributes,
            related: BTreeMap::new(),
            exists: true,
        }
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn meta(&self) -> &ModelMeta {
        self.model.meta()
    }

    /// Whether the row is known to exist in the table.
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub(crate) fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(field.to_string(), value.into());
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.attributes.remove(field)
    }

    /// Assign every entry of `data`.
    pub fn set_all<K, V>(&mut self, data: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in data {
            self.attributes.insert(k.into(), v.into());
        }
        self
    }

    /// Assign only the entries of `data` named in `fields`.
    pub fn set_fields<V: Into<Value> + Clone>(&mut self, data: &BTreeMap<String, V>, fields: &[&str]) -> &mut Self {
        for field in fields {
            if let Some(value) = data.get(*field) {
                self.attributes.insert(field.to_string(), value.clone().into());
            }
        }
        self
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub(crate) fn replace_attributes(&mut self, attributes: BTreeMap<String, Value>) {
        self.attributes = attributes;
    }

    /// Primary key values in key order (`Null` for unset columns).
    pub fn id(&self) -> Vec<Value> {
        self.meta()
            .primary_key
            .iter()
            .map(|k| self.attributes.get(k).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// The first primary key value.
    pub fn first_id(&self) -> Value {
        self.id().into_iter().next().unwrap_or(Value::Null)
    }

    /// Assign primary key values in key order.
    pub fn set_id(&mut self, id: Vec<Value>) -> &mut Self {
        let keys = self.meta().primary_key.clone();
        for (key, value) in keys.into_iter().zip(id) {
            self.attributes.insert(key, value);
        }
        self
    }

    /// Clear attributes and resolved relations.
    pub fn reset(&mut self) {
        self.attributes.clear();
        self.related.clear();
        self.exists = false;
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    pub fn set_related(&mut self, name: &str, related: Related) -> &mut Self {
        self.related.insert(name.to_string(), related);
        self
    }

    pub fn forget_related(&mut self, name: &str) -> Option<Related> {
        self.related.remove(name)
    }

    /// Attach `parent` through a belongs-to relation named `name` (or
    /// targeting the model `name`) and copy its key into the foreign key.
    pub fn associate(&mut self, name: &str, parent: &Record) -> Result<(), OrmError> {
        let (slot, relation) = self
            .meta()
            .relations
            .iter()
            .find(|(n, r)| r.kind == RelationKind::BelongsTo && (n == name || r.target == name))
            .map(|(n, r)| (n.clone(), r.resolve(&self.meta().name)))
            .ok_or_else(|| OrmError::UnknownRelation {
                model: self.meta().name.clone(),
                name: name.to_string(),
            })?;
        self.attributes.insert(relation.foreign_key, parent.first_id());
        self.related.insert(slot, Related::One(Box::new(parent.shallow())));
        Ok(())
    }

    /// Copy without resolved relations.
    pub(crate) fn shallow(&self) -> Record {
        Record {
            model: Arc::clone(&self.model),
            attributes: self.attributes.clone(),
            related: BTreeMap::new(),
            exists: self.exists,
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len() + self.related.len()))?;
        for (field, value) in &self.attributes {
            map.serialize_entry(field, value)?;
        }
        for (name, related) in &self.related {
            match related {
                Related::One(record) => map.serialize_entry(name, record.as_ref())?,
                Related::Many(records) => map.serialize_entry(name, records)?,
                Related::Missing => map.serialize_entry(name, &Value::Null)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::model::Relation;

    fn comment_model() -> Arc<dyn Model> {
        Arc::new(ModelMeta::new("Comment").relation("Post", Relation::belongs_to("Post")))
    }

    #[test]
    fn test_attributes_and_id() {
        let mut record = Record::new(Arc::new(ModelMeta::new("Post")));
        assert!(!record.exists());
        assert_eq!(record.id(), vec![Value::Null]);

        record.set("title", "Hello").set_id(vec![Value::Int(3)]);
        assert_eq!(record.first_id(), Value::Int(3));
        assert_eq!(record.get("title"), Some(&Value::from("Hello")));

        record.reset();
        assert!(record.attributes().is_empty());
    }

    #[test]
    fn test_set_fields_filters() {
        let data = BTreeMap::from([
            ("title".to_string(), "x"),
            ("admin".to_string(), "1"),
        ]);
        let mut record = Record::new(Arc::new(ModelMeta::new("Post")));
        record.set_fields(&data, &["title", "missing"]);
        assert_eq!(record.attributes().len(), 1);
        assert!(record.get("admin").is_none());
    }

    #[test]
    fn test_associate_sets_foreign_key() {
        let mut post = Record::new(Arc::new(ModelMeta::new("Post")));
        post.set("id", 9);

        let mut comment = Record::new(comment_model());
        comment.associate("Post", &post).unwrap();
        assert_eq!(comment.get("post_id"), Some(&Value::Int(9)));
        assert!(comment.related("Post").and_then(Related::as_one).is_some());

        assert!(matches!(
            comment.associate("Author", &post),
            Err(OrmError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_serializes_attributes_and_relations() {
        let mut post = Record::new(Arc::new(ModelMeta::new("Post")));
        post.set("id", 1).set("title", "T");
        let mut comment = Record::new(comment_model());
        comment.set("id", 5);
        post.set_related("Comments", Related::Many(vec![comment]));
        post.set_related("Author", Related::Missing);

        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 1, "title": "T", "Comments": [{"id": 5}], "Author": null})
        );
    }
}
