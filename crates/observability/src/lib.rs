//! Process-wide logging setup shared by binaries and tests.

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::{init, init_for_tests, init_with_default};
