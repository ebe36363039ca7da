//! OS seam for the drop subsystem
//!
//! The registry, interceptor and drop target only talk to the OS through
//! [`WindowSystem`]. The Win32 implementation lives in [`windows`]; tests drive the
//! same code through a recording fake.
//!
//! Callbacks flow the other way through [`DropHandler`]: the backend translates OLE
//! `IDropTarget` calls and root window messages into these neutral types.

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "windows")]
pub use self::windows::Win32WindowSystem;

use std::sync::Weak;
use std::time::Duration;

use crate::effect::{DropEffects, ModifierKeys};
use crate::error::OsError;

/// Opaque native window handle (`HWND` on Windows).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub const NULL: Self = Self(0);

    pub const fn new(raw: isize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> isize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Pixel coordinate, screen or client space depending on context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Private messages the subsystem posts to the root window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Run the deferred re-registration sweep if it is still pending.
    ReRegister,
    /// Deliver one queued UI event.
    DeliverEvent,
}

/// Where a legacy drop landed, as reported by `DragQueryPoint`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropPoint {
    Client(Point),
    Screen(Point),
}

/// Data object offered by a modern (OLE) drag.
pub trait FileSource {
    /// Whether the object advertises a file list (`CF_HDROP`).
    fn has_file_list(&self) -> bool;

    /// Decoded file list, or `None` when the format is missing or unreadable.
    fn file_list(&self) -> Option<Vec<String>>;
}

/// Payload of a legacy `WM_DROPFILES` message. The backend releases the
/// underlying handle once the message has been handled.
pub trait LegacyDrop {
    fn drop_point(&self) -> DropPoint;
    fn file_list(&self) -> Vec<String>;
}

/// Root window messages the interceptor acts on. Anything else is forwarded to the
/// original window procedure without reaching the handler.
pub enum RootMessage<'a> {
    Signal(Signal),
    ChildCreated(WindowHandle),
    ChildDestroyed(WindowHandle),
    DropFiles(&'a dyn LegacyDrop),
}

/// What the backend should do with a message after the handler saw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Consumed; don't call the original window procedure.
    Handled,
    /// Pass on to the original window procedure.
    Forward,
}

/// Receiver for OLE drag callbacks and intercepted root window messages.
///
/// Drag callbacks may arrive on a different context than the window's message
/// loop and must never block on it.
pub trait DropHandler: Send + Sync {
    fn drag_enter(&self, data: Option<&dyn FileSource>, keys: ModifierKeys, point: Point, effect: &mut DropEffects);
    fn drag_over(&self, keys: ModifierKeys, point: Point, effect: &mut DropEffects);
    fn drag_leave(&self);
    fn perform_drop(&self, data: Option<&dyn FileSource>, keys: ModifierKeys, point: Point, effect: &mut DropEffects);
    fn handle_root_message(&self, message: RootMessage<'_>) -> Disposition;
}

/// Every OS call the drop subsystem makes.
pub trait WindowSystem: Send + Sync {
    /// Hand the backend the object that OLE callbacks and root messages are routed
    /// to. Called once, before any registration.
    fn bind(&self, handler: Weak<dyn DropHandler>);

    fn is_window(&self, window: WindowHandle) -> bool;

    /// `RegisterDragDrop` with the bound handler.
    fn register_drop_target(&self, window: WindowHandle) -> Result<(), OsError>;

    /// `RevokeDragDrop`.
    fn revoke_drop_target(&self, window: WindowHandle) -> Result<(), OsError>;

    /// `DragAcceptFiles`, enabling or disabling `WM_DROPFILES` delivery.
    fn accept_files(&self, window: WindowHandle, accept: bool);

    fn window_from_point(&self, screen: Point) -> Option<WindowHandle>;

    /// All descendants of `root`, depth-first.
    fn child_windows(&self, root: WindowHandle) -> Vec<WindowHandle>;

    fn screen_to_client(&self, window: WindowHandle, screen: Point) -> Point;

    /// Queue `signal` on the root window's message loop after `delay`. Returns
    /// false if the message could not be queued.
    fn post_signal(&self, root: WindowHandle, signal: Signal, delay: Duration) -> bool;

    /// Subclass the root window procedure. Returns false if already installed or
    /// the window is gone.
    fn install_root_hook(&self, root: WindowHandle) -> bool;

    /// Restore the original root window procedure. Returns false if no hook was
    /// installed.
    fn remove_root_hook(&self, root: WindowHandle) -> bool;

    fn ole_initialize(&self) -> Result<(), OsError>;

    fn ole_uninitialize(&self);
}
