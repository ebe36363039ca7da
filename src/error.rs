//! Error types shared by the platform seam and the plugin façade

use thiserror::Error;

/// Outcome of a failed OS call made on behalf of the registry or drop target.
///
/// None of these reach the application: callers log them and carry on with
/// reduced coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OsError {
    /// `DRAGDROP_E_ALREADYREGISTERED`; callers treat this as success.
    #[error("window is already registered as a drop target")]
    AlreadyRegistered,
    /// `CO_E_NOTINITIALIZED`: OLE was never initialized on the calling thread.
    #[error("OLE is not initialized on this thread")]
    NotInitialized,
    #[error("out of memory")]
    OutOfMemory,
    #[error("window handle is no longer valid")]
    InvalidWindow,
    #[error("OS call failed with HRESULT {0:#010x}")]
    Failed(u32),
}

impl OsError {
    /// Registration outcomes that leave the window registered.
    pub fn counts_as_registered(result: Result<(), OsError>) -> bool {
        matches!(result, Ok(()) | Err(OsError::AlreadyRegistered))
    }
}

/// Reasons the plugin refuses to attach to a host.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("registrar did not supply a native window; drag-and-drop is disabled")]
    NoWindow,
}
