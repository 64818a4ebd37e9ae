//! Tracing and logging setup shared by every entry point.

/// Subscriber configuration (filters, formatting).
pub mod subscriber;

pub use subscriber::{init, init_for_tests};
