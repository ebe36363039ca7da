//! Host-facing entry point
//!
//! Attaches a [`DropTarget`] to the window supplied by the host's registrar and
//! answers the two inbound channel calls (`setLoggingEnabled`, `getLoggingEnabled`).

use std::sync::Arc;

use serde_json::Value;

use crate::config::DropConfig;
use crate::dispatch::MethodChannel;
use crate::error::AttachError;
use crate::logging;
use crate::platform::{WindowHandle, WindowSystem};
use crate::target::DropTarget;

/// Channel name the host binds the method channel to.
pub const CHANNEL_NAME: &str = "desktop_drop";

/// Supplies the host's native top-level window.
pub trait Registrar {
    fn native_window(&self) -> Option<WindowHandle>;
}

/// Reply to an inbound method call.
#[derive(Clone, Debug, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    NotImplemented,
}

/// One attached drop target. Dropping the plugin releases its reference, which
/// tears the target down.
pub struct DesktopDropPlugin {
    target: Arc<DropTarget>,
}

impl DesktopDropPlugin {
    /// Attach to the registrar's window. Without a window there is nothing to
    /// register and the whole subsystem stays off.
    pub fn register_with_registrar(
        registrar: &dyn Registrar,
        channel: Arc<dyn MethodChannel>,
        os: Arc<dyn WindowSystem>,
        config: DropConfig,
    ) -> Result<Self, AttachError> {
        if let Some(on) = config.logging_enabled {
            logging::set_enabled(on);
        }

        let Some(window) = registrar.native_window().filter(|window| !window.is_null()) else {
            drop_log!("RegisterWithRegistrar: no window, no drop.");
            return Err(AttachError::NoWindow);
        };

        let target = DropTarget::new(os, window, channel, config);
        drop_log!("DesktopDropPlugin attached to {:#x}", window.raw());
        Ok(Self { target })
    }

    /// Attach using the Win32 backend.
    #[cfg(target_os = "windows")]
    pub fn register_native(
        registrar: &dyn Registrar,
        channel: Arc<dyn MethodChannel>,
        config: DropConfig,
    ) -> Result<Self, AttachError> {
        let os: Arc<dyn WindowSystem> = Arc::new(crate::platform::Win32WindowSystem::new());
        Self::register_with_registrar(registrar, channel, os, config)
    }

    pub fn target(&self) -> &Arc<DropTarget> {
        &self.target
    }

    /// Inbound call from the application. Malformed arguments fall back to safe
    /// values instead of failing.
    pub fn handle_method_call(method: &str, arguments: &Value) -> MethodResponse {
        match method {
            "setLoggingEnabled" => {
                logging::set_enabled(arguments.as_bool().unwrap_or(false));
                MethodResponse::Success(Value::Bool(true))
            }
            "getLoggingEnabled" => MethodResponse::Success(Value::Bool(logging::enabled())),
            other => {
                drop_log!("MethodCall: {}", other);
                MethodResponse::NotImplemented
            }
        }
    }
}

impl Drop for DesktopDropPlugin {
    fn drop(&mut self) {
        drop_log!("DesktopDropPlugin detached from {:#x}", self.target.root().raw());
    }
}
