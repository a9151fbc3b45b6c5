//! Poly: a small MVC web framework.
//!
//! Routes map request paths to controller actions, controllers load and
//! persist rows through Active-Record tables, and a pluggable cache layer
//! backs schema metadata and application data.

pub mod cache;
pub mod config;
pub mod db;
pub mod http;
pub mod inflect;
pub mod lifecycle;
pub mod observability;
pub mod pagination;
pub mod routing;
pub mod shell;
pub mod validator;

pub use config::schema::AppConfig;
pub use http::{Dispatcher, HttpServer};
pub use lifecycle::Shutdown;
