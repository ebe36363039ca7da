//! Runtime-switchable diagnostics
//!
//! Everything the drop subsystem reports goes through the `log` facade under the
//! `desktop_drop` target, but only while the runtime toggle is on. Debug builds start
//! with logging enabled, release builds start silent. The toggle can be flipped from
//! the host application (`setLoggingEnabled`), from Rust (`set_enabled`) or from native
//! code through the exported `desktop_drop_set_logging_enabled` symbol.

use std::sync::atomic::{AtomicBool, Ordering};

/// `log` target used for every record emitted by this crate
pub const TARGET: &str = "desktop_drop";

static ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

#[inline]
pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn set_enabled(on: bool) {
    ENABLED.store(on, Ordering::Relaxed);
}

/// C ABI toggle for hosts that configure the plugin from native code.
#[no_mangle]
pub extern "C" fn desktop_drop_set_logging_enabled(on: i32) {
    set_enabled(on != 0);
}

/// Debug-level record, emitted only while the runtime toggle is on.
macro_rules! drop_log {
    ($($arg:tt)*) => {
        if $crate::logging::enabled() {
            ::log::debug!(target: $crate::logging::TARGET, $($arg)*);
        }
    };
}

/// Warning-level record for OS calls that failed, same gating as `drop_log!`.
macro_rules! drop_warn {
    ($($arg:tt)*) => {
        if $crate::logging::enabled() {
            ::log::warn!(target: $crate::logging::TARGET, $($arg)*);
        }
    };
}
