//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (tracing subscriber: pretty or JSON)
//!     → metrics.rs (request, query and cache counters)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (when enabled)
//! ```
//!
//! # Design Decisions
//! - Request IDs come from the HTTP layer and appear in request spans
//! - Recording a metric without an installed exporter is a no-op

pub mod logging;
pub mod metrics;
