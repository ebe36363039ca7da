//! Root window message interception
//!
//! The host toolkit only hands out its top-level window, so the subsystem subclasses
//! that window's procedure to:
//! - receive its two private signals (deferred re-registration, UI event delivery),
//! - see child windows come and go via `WM_PARENTNOTIFY`,
//! - catch legacy `WM_DROPFILES` drops.
//!
//! The Win32 subclassing itself lives in the platform backend; this module tracks
//! the install state and decides what each translated message does.

use crate::platform::{Disposition, RootMessage, Signal, WindowHandle, WindowSystem};
use crate::target::DropTarget;

/// Install state of the root window hook.
#[derive(Debug, Default)]
pub struct RootInterceptor {
    installed: Option<WindowHandle>,
}

impl RootInterceptor {
    pub fn is_installed(&self) -> bool {
        self.installed.is_some()
    }

    /// Subclass `root`. A second install while installed is a no-op.
    pub fn install(&mut self, os: &dyn WindowSystem, root: WindowHandle) {
        if self.installed.is_some() || !os.is_window(root) {
            return;
        }
        if os.install_root_hook(root) {
            drop_log!("Root subclass installed on {:#x}", root.raw());
            self.installed = Some(root);
        } else {
            drop_warn!("Root subclass could not be installed on {:#x}", root.raw());
        }
    }

    /// Restore the original window procedure and drop the marker property.
    pub fn uninstall(&mut self, os: &dyn WindowSystem) {
        let Some(root) = self.installed.take() else { return };
        if os.is_window(root) && os.remove_root_hook(root) {
            drop_log!("Root subclass removed from {:#x}", root.raw());
        }
    }
}

/// Act on one intercepted root window message.
pub(crate) fn route(target: &DropTarget, message: RootMessage<'_>) -> Disposition {
    match message {
        RootMessage::Signal(Signal::ReRegister) => {
            target.registry().run_deferred_reregister();
            Disposition::Handled
        }
        RootMessage::Signal(Signal::DeliverEvent) => {
            target.deliver_queued();
            Disposition::Handled
        }
        RootMessage::ChildCreated(child) => {
            target.registry().child_created(child);
            Disposition::Forward
        }
        RootMessage::ChildDestroyed(child) => {
            target.registry().child_destroyed(child);
            Disposition::Forward
        }
        RootMessage::DropFiles(drop) => {
            target.handle_legacy_drop(drop);
            Disposition::Handled
        }
    }
}
