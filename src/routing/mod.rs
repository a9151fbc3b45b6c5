//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request path (e.g. /blog/42.html)
//!     → router.rs (strip recognized extension, split segments)
//!     → matcher.rs (evaluate literal and requirement conditions)
//!     → Return: RouteMatch (named + positional params) or None
//!
//! Route Compilation (at startup and on config reload):
//!     RouteConfig[]
//!     → Compile per-segment matchers
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;

pub use router::{Defaults, Route, RouteError, RouteMatch, Router};
