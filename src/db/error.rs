//! Errors raised by the persistence layer.

use crate::cache::CacheError;
use crate::validator::ValidationErrors;

/// Errors that can occur while building, binding or running statements.
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),

    #[error("operation aborted by {hook}")]
    Aborted { hook: &'static str },

    #[error("record has not been persisted")]
    NotPersisted,

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("model '{model}' has no relation '{name}'")]
    UnknownRelation { model: String, name: String },

    #[error("table '{table}' has no column '{field}'")]
    UnknownField { table: String, field: String },

    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("model '{0}' has no primary key")]
    NoPrimaryKey(String),

    #[error("primary key column '{0}' cannot be changed with save_field")]
    PrimaryKeyField(String),

    #[error("refusing to run a bulk statement without conditions")]
    EmptyConditions,

    #[error("no fields to save")]
    NothingToSave,

    #[error("finder '{expr}' expects {expected} values, got {got}")]
    FinderArity {
        expr: String,
        expected: usize,
        got: usize,
    },

    #[error("missing value for parameter ':{0}'")]
    MissingParameter(String),

    #[error("parameter ':{0}' is not used by the statement")]
    UnexpectedParameter(String),

    #[error("unknown data source '{0}'")]
    UnknownDataSource(String),

    #[error("unsupported database driver '{0}'")]
    UnsupportedDriver(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("schema cache error: {0}")]
    Cache(#[from] CacheError),
}
