//! Tracing, logging and panic reporting (shared setup).

/// Initialize process-wide observability (tracing/logging plus panic reporting).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
    panic::install_hook();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Panic hook that routes panics through tracing with a backtrace.
pub mod panic;
