//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! signals.rs:  Ctrl+C / SIGTERM → Shutdown::trigger
//! shutdown.rs: broadcast to the server and the config watcher
//!              → stop accepting → drain in-flight requests → flush caches
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
