//! HTTP front end and MVC dispatch.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, request ID, trace span, timeout, body limit)
//!     → request.rs (strip base path, owned Request)
//!     → dispatch.rs (route match → controller → filters and action)
//!     → controller.rs (Context: params, view vars, output, redirects)
//!     → response.rs (Reply → HTTP response, status phrases)
//! ```
//!
//! # Design Decisions
//! - Dispatch is synchronous and runs on the blocking pool
//! - The route table lives behind `ArcSwap` for config reloads

pub mod controller;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use controller::{Context, Controller, Controllers};
pub use dispatch::{DispatchError, Dispatcher};
pub use request::{Request, UuidRequestId, X_REQUEST_ID};
pub use response::{status_phrase, HttpError, Reply};
pub use server::HttpServer;
