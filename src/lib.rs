//! File drag-and-drop for a desktop host window
//!
//! The host toolkit hands over a single top-level window, but OLE delivers drag
//! callbacks per native window, child windows come and go during the app's
//! lifetime, and OLE callbacks must never block on the window's message loop. This
//! crate registers the root window and every descendant as drop targets, keeps
//! those registrations consistent while drags are in flight, and turns both the OLE
//! protocol and legacy `WM_DROPFILES` messages into one ordered event stream.
//!
//! Events delivered to the host channel:
//! - `entered` `[x, y]` - a drag entered the window (client coordinates)
//! - `updated` `[x, y]` - the drag moved
//! - `exited` - the drag left, or a drop finished
//! - `performOperation` `[path, ...]` - files were dropped
//!
//! ## Modules
//! - `effect` - drop effect selection from modifier keys
//! - `registry` - per-window OLE registration and deferred re-registration
//! - `interceptor` - root window subclass decisions
//! - `target` - the drag protocol state machine
//! - `dispatch` - ordered hand-off of events to the message loop
//! - `platform` - OS seam and the Win32 backend

#[macro_use]
pub mod logging;

pub mod config;
pub mod dispatch;
pub mod effect;
pub mod error;
pub mod interceptor;
pub mod platform;
pub mod plugin;
pub mod registry;
pub mod session;
pub mod target;

#[cfg(test)]
mod mock;

pub use config::DropConfig;
pub use dispatch::{DropEvent, MethodChannel};
pub use effect::{DropEffects, ModifierKeys};
pub use error::{AttachError, OsError};
pub use platform::{WindowHandle, WindowSystem};
pub use plugin::{DesktopDropPlugin, MethodResponse, Registrar};
pub use target::DropTarget;
