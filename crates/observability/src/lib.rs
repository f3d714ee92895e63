//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing with the `info` default filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init("info");
}

/// Subscriber configuration (filters, output format).
pub mod subscriber;
