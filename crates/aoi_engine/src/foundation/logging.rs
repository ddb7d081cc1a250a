//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// Honours `RUST_LOG` like any `env_logger` host. Calling this twice is
/// harmless; the second call is ignored.
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize logging for unit tests (output captured by the test harness)
#[cfg(test)]
pub(crate) fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
