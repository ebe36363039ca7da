//! Ordered hand-off of UI events from drag callbacks to the root window's message loop
//!
//! Drag callbacks never call into the application directly. They enqueue an owned
//! [`DropEvent`] and post a payload-free wake message to the root window; on each wake
//! the root window procedure hands every queued event, oldest first, to the
//! [`MethodChannel`]. A lost wake only delays events until the next one, and wakes
//! that find the queue empty do nothing. Events left over at shutdown are drained and
//! dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::platform::{Signal, WindowHandle, WindowSystem};

/// Outbound half of the host channel.
pub trait MethodChannel: Send + Sync {
    fn invoke(&self, method: &str, arguments: Value);
}

/// Notification delivered to the application.
#[derive(Clone, Debug, PartialEq)]
pub enum DropEvent {
    Entered { x: f64, y: f64 },
    Updated { x: f64, y: f64 },
    Exited,
    Performed(Vec<String>),
}

impl DropEvent {
    pub fn method(&self) -> &'static str {
        match self {
            DropEvent::Entered { .. } => "entered",
            DropEvent::Updated { .. } => "updated",
            DropEvent::Exited => "exited",
            DropEvent::Performed(_) => "performOperation",
        }
    }

    /// Method name and arguments, consuming the event.
    pub fn into_invocation(self) -> (&'static str, Value) {
        let method = self.method();
        let arguments = match self {
            DropEvent::Entered { x, y } | DropEvent::Updated { x, y } => json!([x, y]),
            DropEvent::Exited => Value::Null,
            DropEvent::Performed(paths) => Value::from(paths),
        };
        (method, arguments)
    }
}

/// FIFO of pending events bound to one root window.
pub struct EventDispatcher {
    os: Arc<dyn WindowSystem>,
    root: WindowHandle,
    tx: UnboundedSender<DropEvent>,
    rx: Mutex<UnboundedReceiver<DropEvent>>,
    /// Something on the root window consumes wakes (the interceptor is installed).
    receiving: AtomicBool,
}

impl EventDispatcher {
    pub fn new(os: Arc<dyn WindowSystem>, root: WindowHandle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            os,
            root,
            tx,
            rx: Mutex::new(rx),
            receiving: AtomicBool::new(false),
        }
    }

    fn receiver(&self) -> MutexGuard<'_, UnboundedReceiver<DropEvent>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether wakes posted to the root window will be handled. Until this is set
    /// every event is discarded at post time.
    pub fn set_receiving(&self, receiving: bool) {
        self.receiving.store(receiving, Ordering::Release);
    }

    /// Queue `event` for delivery on the root window's message loop.
    ///
    /// Returns false if the event was discarded because the root window is gone,
    /// nothing consumes wakes on it, or the dispatcher has been shut down.
    pub fn post(&self, event: DropEvent) -> bool {
        if !self.os.is_window(self.root) {
            drop_log!("Discarding {} event: root window is gone", event.method());
            return false;
        }
        if !self.receiving.load(Ordering::Acquire) {
            drop_log!("Discarding {} event: root window is not hooked", event.method());
            return false;
        }

        if let Err(rejected) = self.tx.send(event) {
            drop_log!("Discarding {} event: dispatcher is shut down", rejected.0.method());
            return false;
        }

        // Without a wake the event stays queued until the next wake delivers it or
        // `drain` releases it
        if !self.os.post_signal(self.root, Signal::DeliverEvent, Duration::ZERO) {
            drop_warn!("PostMessage for queued UI event failed");
        }
        true
    }

    /// Every queued event in post order. The queue lock is released before the
    /// events are handed out.
    pub fn take_all(&self) -> Vec<DropEvent> {
        let mut rx = self.receiver();
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Close the queue and release every undelivered event. Returns how many were
    /// released.
    pub fn drain(&self) -> usize {
        let mut rx = self.receiver();
        rx.close();
        let mut released = 0;
        while let Ok(event) = rx.try_recv() {
            drop(event);
            released += 1;
        }
        released
    }
}
