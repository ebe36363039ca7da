//! Drag session state shared between OLE callbacks and the root window's message loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The `dragging` flag plus the time of the last completed drop.
///
/// The flag is the only synchronisation signal between the drag callback context
/// and the message loop, so every transition is an atomic swap.
#[derive(Debug, Default)]
pub struct Session {
    dragging: AtomicBool,
    last_drop: Mutex<Option<Instant>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a drag as in flight. Returns the previous state.
    pub fn begin(&self) -> bool {
        self.dragging.swap(true, Ordering::AcqRel)
    }

    /// Mark the drag as finished. Returns the previous state.
    pub fn end(&self) -> bool {
        self.dragging.swap(false, Ordering::AcqRel)
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.load(Ordering::Acquire)
    }

    pub fn record_drop(&self, at: Instant) {
        if let Ok(mut last) = self.last_drop.lock() {
            *last = Some(at);
        }
    }

    pub fn last_drop(&self) -> Option<Instant> {
        self.last_drop.lock().ok().and_then(|last| *last)
    }

    /// True if a drop completed less than `window` before `now`.
    pub fn within_debounce(&self, now: Instant, window: Duration) -> bool {
        match self.last_drop() {
            Some(last) => now.saturating_duration_since(last) < window,
            None => false,
        }
    }
}
