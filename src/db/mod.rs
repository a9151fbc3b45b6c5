//! Persistence subsystem: Active-Record models over SQLite.
//!
//! # Data Flow
//! ```text
//! Table::find_all(select, params)
//!     → query.rs (build SELECT from parts)
//!     → schema.rs (binding types, cached per data source + table)
//!     → connection.rs (bind named params, run, optional query cache)
//!     → record.rs (rows become Records bound to their model)
//!
//! Table::save(record)
//!     → model.rs hooks (validate, before_save)
//!     → query.rs (INSERT / UPDATE by primary key)
//!     → connection.rs (execute, clears query cache)
//!     → model.rs hooks (after_save)
//! ```
//!
//! # Design Decisions
//! - User values are always bound, never interpolated
//! - One connection per named data source, shared by every model using it
//! - Relations are resolved lazily with one secondary query each

pub mod active_record;
pub mod connection;
pub mod error;
pub mod model;
pub mod query;
pub mod record;
pub mod schema;
pub mod value;

pub use active_record::{Orm, SaveOptions, Table};
pub use connection::{DataSource, DataSources};
pub use error::OrmError;
pub use model::{Model, ModelMeta, ModelRegistry, Relation, RelationKind, ResolvedRelation};
pub use query::{Fields, Select};
pub use record::{Record, Related};
pub use schema::{Column, ParamType, Schema, SchemaCache};
pub use value::{Params, Row, Value};
