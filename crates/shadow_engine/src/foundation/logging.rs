//! Logging utilities and structured logging support

use std::sync::atomic::{AtomicBool, Ordering};

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
pub fn init() {
    env_logger::init();
}

/// A latch for warnings that should only reach the log once per owner.
///
/// Configuration problems are re-detected every frame; logging them each
/// time would flood the output at frame rate.
#[derive(Debug, Default)]
pub struct WarnOnce {
    fired: AtomicBool,
}

impl WarnOnce {
    /// Create an unfired latch
    pub const fn new() -> Self {
        Self { fired: AtomicBool::new(false) }
    }

    /// Returns true exactly once, on the first call.
    pub fn first(&self) -> bool {
        !self.fired.swap(true, Ordering::Relaxed)
    }

    /// Re-arm the latch
    pub fn reset(&self) {
        self.fired.store(false, Ordering::Relaxed);
    }
}
