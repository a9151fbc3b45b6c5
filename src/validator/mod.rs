//! Field validation.
//!
//! A [`Validator`] reads fields from any [`Subject`] (a record, a JSON
//! object, a form map), applies [`Rule`]s from [`rules`] and collects
//! messages per field. Models typically build one in `Model::validate` and
//! return [`Validator::into_result`].

pub mod rules;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::db::Record;

/// Messages per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Something whose fields can be read as text.
pub trait Subject {
    fn field(&self, name: &str) -> Option<String>;
}

impl Subject for Record {
    fn field(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_null()).map(ToString::to_string)
    }
}

impl Subject for serde_json::Map<String, serde_json::Value> {
    fn field(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl Subject for BTreeMap<String, String> {
    fn field(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl Subject for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A check applied to one field value.
#[derive(Debug, Clone)]
pub enum Rule {
    Equal(String),
    IEqual(String),
    MinLength(usize),
    MaxLength(usize),
    Length(usize),
    Username,
    Number,
    Digits,
    AlphaNumeric,
    Email,
    Url { strict: bool },
    Ip,
    Hostname,
    InList(Vec<String>),
    Date,
    NotEmpty,
}

impl Rule {
    pub fn in_list<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Rule::InList(items.into_iter().map(Into::into).collect())
    }

    pub fn passes(&self, value: &str) -> bool {
        match self {
            Rule::Equal(other) => rules::equal(value, other),
            Rule::IEqual(other) => rules::iequal(value, other),
            Rule::MinLength(n) => rules::min_length(value, *n),
            Rule::MaxLength(n) => rules::max_length(value, *n),
            Rule::Length(n) => rules::length(value, *n),
            Rule::Username => rules::username(value),
            Rule::Number => rules::number(value),
            Rule::Digits => rules::digits(value),
            Rule::AlphaNumeric => rules::alpha_numeric(value),
            Rule::Email => rules::email(value),
            Rule::Url { strict } => rules::url(value, *strict),
            Rule::Ip => rules::ip(value),
            Rule::Hostname => rules::hostname(value),
            Rule::InList(list) => rules::in_list(value, list),
            Rule::Date => rules::date(value),
            Rule::NotEmpty => rules::not_empty(value),
        }
    }
}

pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Validates the fields of a subject, collecting messages.
pub struct Validator<'a, S: Subject + ?Sized> {
    subject: &'a S,
    errors: ValidationErrors,
}

impl<'a, S: Subject + ?Sized> Validator<'a, S> {
    pub fn new(subject: &'a S) -> Self {
        Self {
            subject,
            errors: ValidationErrors::default(),
        }
    }

    pub fn value(&self, field: &str) -> Option<String> {
        self.subject.field(field)
    }

    /// Apply `rule` to `field` (missing fields read as empty).
    pub fn check(&mut self, field: &str, rule: Rule, message: &str) -> bool {
        let value = self.value(field).unwrap_or_default();
        let ok = rule.passes(&value);
        if !ok {
            self.invalidate(field, message);
        }
        ok
    }

    /// Fails for missing, empty, `"0"` and false values.
    pub fn required(&mut self, field: &str) -> bool {
        self.required_with(field, REQUIRED_MESSAGE)
    }

    pub fn required_with(&mut self, field: &str, message: &str) -> bool {
        match self.value(field) {
            Some(v) if rules::not_empty(&v) => true,
            _ => {
                self.invalidate(field, message);
                false
            }
        }
    }

    pub fn invalidate(&mut self, field: &str, message: &str) {
        self.errors.add(field, message);
    }

    /// Whether `field` (or, with `None`, every field) is free of errors.
    pub fn is_valid(&self, field: Option<&str>) -> bool {
        match field {
            Some(field) => !self.errors.contains(field),
            None => self.errors.is_empty(),
        }
    }

    pub fn reset(&mut self) {
        self.errors = ValidationErrors::default();
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}
