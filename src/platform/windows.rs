//! Windows drag-drop handling via OLE and root window subclassing
//!
//! 1. An `IDropTarget` shim is registered on the root HWND and its children; it
//!    forwards every callback to the bound [`DropHandler`]
//! 2. The root window procedure is replaced (`SetWindowLongPtrW`) so private signals,
//!    `WM_PARENTNOTIFY` and `WM_DROPFILES` reach the handler on the UI thread
//! 3. Signals are plain `PostMessageW` wakes; delayed ones use a window timer

#![cfg(target_os = "windows")]

use std::ffi::c_void;
use std::sync::{Mutex, Weak};
use std::time::Duration;

use windows::core::{implement, w, HRESULT, PCWSTR};
use windows::Win32::Foundation::{HANDLE, HWND, LPARAM, LRESULT, POINT, POINTL, S_OK, WPARAM};
use windows::Win32::Graphics::Gdi::ScreenToClient;
use windows::Win32::System::Com::{IDataObject, DVASPECT_CONTENT, FORMATETC, TYMED_HGLOBAL};
use windows::Win32::System::Memory::{GlobalLock, GlobalUnlock};
use windows::Win32::System::Ole::{
    IDropTarget, IDropTarget_Impl, OleInitialize, OleUninitialize, RegisterDragDrop, ReleaseStgMedium,
    RevokeDragDrop, DROPEFFECT,
};
use windows::Win32::System::SystemServices::MODIFIERKEYS_FLAGS;
use windows::Win32::UI::Shell::{DragAcceptFiles, DragFinish, DragQueryFileW, DragQueryPoint, HDROP};
use windows::Win32::UI::WindowsAndMessaging::{
    CallWindowProcW, DefWindowProcW, EnumChildWindows, GetPropW, IsWindow, KillTimer, PostMessageW, RemovePropW,
    SetPropW, SetTimer, SetWindowLongPtrW, WindowFromPoint, GWLP_WNDPROC, WM_APP, WM_CREATE, WM_DESTROY,
    WM_DROPFILES, WM_PARENTNOTIFY, WM_TIMER, WNDPROC,
};
use windows_core::{BOOL, Ref};

use super::{
    Disposition, DropHandler, DropPoint, FileSource, LegacyDrop, Point, RootMessage, Signal, WindowHandle,
    WindowSystem,
};
use crate::effect::{DropEffects, ModifierKeys};
use crate::error::OsError;

/// CF_HDROP for file drops
const CF_HDROP: u16 = 15;

/// HRESULTs the registry distinguishes
const DRAGDROP_E_ALREADYREGISTERED: HRESULT = HRESULT(0x80040101u32 as i32);
const CO_E_NOTINITIALIZED: HRESULT = HRESULT(0x800401F0u32 as i32);
const E_OUTOFMEMORY: HRESULT = HRESULT(0x8007000Eu32 as i32);
const DRAGDROP_E_INVALIDHWND: HRESULT = HRESULT(0x80040102u32 as i32);
const E_INVALIDARG: HRESULT = HRESULT(0x80070057u32 as i32);
/// `HRESULT_FROM_WIN32(ERROR_INVALID_WINDOW_HANDLE)`
const E_INVALID_WINDOW_HANDLE: HRESULT = HRESULT(0x80070578u32 as i32);
const E_UNEXPECTED: HRESULT = HRESULT(0x8000FFFFu32 as i32);

/// Private root window messages
const MSG_REREGISTER: u32 = WM_APP + 0x501;
const MSG_DELIVER_EVENT: u32 = WM_APP + 0x502;

/// Timer used for back-off of the re-registration signal
const REREGISTER_TIMER_ID: usize = 0x0D0D;

/// Window property holding the `RootHook` pointer while the subclass is installed
const ROOT_PROP: PCWSTR = w!("DesktopDrop.RootHook");

fn to_hwnd(window: WindowHandle) -> HWND {
    HWND(window.raw() as *mut c_void)
}

fn to_handle(hwnd: HWND) -> WindowHandle {
    WindowHandle::new(hwnd.0 as isize)
}

fn os_error(err: windows_core::Error) -> OsError {
    match err.code() {
        DRAGDROP_E_ALREADYREGISTERED => OsError::AlreadyRegistered,
        CO_E_NOTINITIALIZED => OsError::NotInitialized,
        E_OUTOFMEMORY => OsError::OutOfMemory,
        DRAGDROP_E_INVALIDHWND | E_INVALIDARG | E_INVALID_WINDOW_HANDLE => OsError::InvalidWindow,
        code => OsError::Failed(code.0 as u32),
    }
}

// ============================================================================
// Backend
// ============================================================================

/// COM interface handed to `RegisterDragDrop`. Only touched on the UI thread.
struct ComTarget(IDropTarget);

unsafe impl Send for ComTarget {}
unsafe impl Sync for ComTarget {}

/// [`WindowSystem`] backed by Win32 and OLE.
#[derive(Default)]
pub struct Win32WindowSystem {
    target: Mutex<Option<ComTarget>>,
    handler: Mutex<Option<Weak<dyn DropHandler>>>,
}

impl Win32WindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn handler(&self) -> Option<Weak<dyn DropHandler>> {
        self.handler.lock().ok().and_then(|handler| handler.clone())
    }
}

impl WindowSystem for Win32WindowSystem {
    fn bind(&self, handler: Weak<dyn DropHandler>) {
        let shim: IDropTarget = DropTargetShim { handler: handler.clone() }.into();
        if let Ok(mut target) = self.target.lock() {
            *target = Some(ComTarget(shim));
        }
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        !window.is_null() && unsafe { IsWindow(Some(to_hwnd(window))) }.as_bool()
    }

    fn register_drop_target(&self, window: WindowHandle) -> Result<(), OsError> {
        let target = self.target.lock().map_err(|_| OsError::Failed(E_UNEXPECTED.0 as u32))?;
        let Some(ComTarget(shim)) = target.as_ref() else {
            return Err(OsError::Failed(E_UNEXPECTED.0 as u32));
        };
        unsafe { RegisterDragDrop(to_hwnd(window), shim) }.map_err(os_error)
    }

    fn revoke_drop_target(&self, window: WindowHandle) -> Result<(), OsError> {
        unsafe { RevokeDragDrop(to_hwnd(window)) }.map_err(os_error)
    }

    fn accept_files(&self, window: WindowHandle, accept: bool) {
        unsafe { DragAcceptFiles(to_hwnd(window), accept) };
    }

    fn window_from_point(&self, screen: Point) -> Option<WindowHandle> {
        let hwnd = unsafe { WindowFromPoint(POINT { x: screen.x, y: screen.y }) };
        if hwnd.0.is_null() {
            None
        } else {
            Some(to_handle(hwnd))
        }
    }

    fn child_windows(&self, root: WindowHandle) -> Vec<WindowHandle> {
        unsafe extern "system" fn collect_child(hwnd: HWND, lparam: LPARAM) -> BOOL {
            let out = &mut *(lparam.0 as *mut Vec<WindowHandle>);
            out.push(to_handle(hwnd));
            BOOL(1)
        }

        let mut children: Vec<WindowHandle> = Vec::new();
        unsafe {
            let _ = EnumChildWindows(
                Some(to_hwnd(root)),
                Some(collect_child),
                LPARAM(&mut children as *mut Vec<WindowHandle> as isize),
            );
        }
        children
    }

    fn screen_to_client(&self, window: WindowHandle, screen: Point) -> Point {
        let mut client_pt = POINT { x: screen.x, y: screen.y };
        let _ = unsafe { ScreenToClient(to_hwnd(window), &mut client_pt) };
        Point::new(client_pt.x, client_pt.y)
    }

    fn post_signal(&self, root: WindowHandle, signal: Signal, delay: Duration) -> bool {
        let hwnd = to_hwnd(root);
        unsafe {
            match signal {
                Signal::DeliverEvent => PostMessageW(Some(hwnd), MSG_DELIVER_EVENT, WPARAM(0), LPARAM(0)).is_ok(),
                Signal::ReRegister if delay.is_zero() => {
                    PostMessageW(Some(hwnd), MSG_REREGISTER, WPARAM(0), LPARAM(0)).is_ok()
                }
                // Re-arming the same timer id coalesces repeated retries
                Signal::ReRegister => {
                    let ms = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX).max(1);
                    SetTimer(Some(hwnd), REREGISTER_TIMER_ID, ms, None) != 0
                }
            }
        }
    }

    fn install_root_hook(&self, root: WindowHandle) -> bool {
        let Some(handler) = self.handler() else { return false };
        let hwnd = to_hwnd(root);

        unsafe {
            if !GetPropW(hwnd, ROOT_PROP).0.is_null() {
                return false;
            }

            let hook = Box::into_raw(Box::new(RootHook { previous: None, handler }));
            if SetPropW(hwnd, ROOT_PROP, Some(HANDLE(hook as *mut c_void))).is_err() {
                drop(Box::from_raw(hook));
                return false;
            }

            let previous = SetWindowLongPtrW(hwnd, GWLP_WNDPROC, root_proc as usize as isize);
            (*hook).previous = std::mem::transmute::<isize, WNDPROC>(previous);
        }
        true
    }

    fn remove_root_hook(&self, root: WindowHandle) -> bool {
        let hwnd = to_hwnd(root);
        unsafe {
            let hook = GetPropW(hwnd, ROOT_PROP).0 as *mut RootHook;
            if hook.is_null() {
                return false;
            }

            let previous = (*hook).previous.map_or(0, |wndproc| wndproc as usize as isize);
            SetWindowLongPtrW(hwnd, GWLP_WNDPROC, previous);
            let _ = KillTimer(Some(hwnd), REREGISTER_TIMER_ID);
            let _ = RemovePropW(hwnd, ROOT_PROP);
            drop(Box::from_raw(hook));
        }
        true
    }

    fn ole_initialize(&self) -> Result<(), OsError> {
        unsafe { OleInitialize(None) }.map_err(os_error)
    }

    fn ole_uninitialize(&self) {
        unsafe { OleUninitialize() };
    }
}

// ============================================================================
// Root window subclass
// ============================================================================

/// State reachable from the subclassed window procedure through `ROOT_PROP`.
struct RootHook {
    previous: WNDPROC,
    handler: Weak<dyn DropHandler>,
}

unsafe extern "system" fn root_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let hook = GetPropW(hwnd, ROOT_PROP).0 as *const RootHook;
    if hook.is_null() {
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }

    // The handler may remove the hook; keep what we need to forward
    let previous = (*hook).previous;
    if let Some(handler) = (*hook).handler.upgrade() {
        if route_message(&*handler, hwnd, msg, wparam, lparam) == Some(Disposition::Handled) {
            return LRESULT(0);
        }
    }

    CallWindowProcW(previous, hwnd, msg, wparam, lparam)
}

/// Translate a raw root message; `None` means the handler doesn't care about it.
unsafe fn route_message(
    handler: &dyn DropHandler,
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> Option<Disposition> {
    let message = match msg {
        MSG_REREGISTER => RootMessage::Signal(Signal::ReRegister),
        MSG_DELIVER_EVENT => RootMessage::Signal(Signal::DeliverEvent),
        WM_TIMER if wparam.0 == REREGISTER_TIMER_ID => {
            let _ = KillTimer(Some(hwnd), REREGISTER_TIMER_ID);
            RootMessage::Signal(Signal::ReRegister)
        }
        WM_DROPFILES => {
            // DragFinish runs when `dropped` goes out of scope
            let dropped = DroppedFiles(HDROP(wparam.0 as *mut c_void));
            handler.handle_root_message(RootMessage::DropFiles(&dropped));
            return Some(Disposition::Handled);
        }
        WM_PARENTNOTIFY => {
            let child = to_handle(HWND(lparam.0 as *mut c_void));
            match (wparam.0 & 0xFFFF) as u32 {
                WM_CREATE => RootMessage::ChildCreated(child),
                WM_DESTROY => RootMessage::ChildDestroyed(child),
                _ => return None,
            }
        }
        _ => return None,
    };
    Some(handler.handle_root_message(message))
}

// ============================================================================
// File list extraction
// ============================================================================

fn hdrop_format() -> FORMATETC {
    FORMATETC {
        cfFormat: CF_HDROP,
        ptd: std::ptr::null_mut(),
        dwAspect: DVASPECT_CONTENT.0 as u32,
        lindex: -1,
        tymed: TYMED_HGLOBAL.0 as u32,
    }
}

/// Every path in an HDROP, decoded from UTF-16.
unsafe fn query_files(hdrop: HDROP) -> Vec<String> {
    let count = DragQueryFileW(hdrop, 0xFFFFFFFF, None);
    let mut paths = Vec::with_capacity(count as usize);

    for i in 0..count {
        let len = DragQueryFileW(hdrop, i, None);
        if len > 0 {
            let mut buf = vec![0u16; (len + 1) as usize];
            DragQueryFileW(hdrop, i, Some(&mut buf));
            paths.push(String::from_utf16_lossy(&buf[..len as usize]));
        }
    }

    paths
}

/// `IDataObject` seen through the file-list lens.
struct DataObjectFiles<'a>(&'a IDataObject);

impl FileSource for DataObjectFiles<'_> {
    fn has_file_list(&self) -> bool {
        unsafe { self.0.QueryGetData(&hdrop_format()) == S_OK }
    }

    fn file_list(&self) -> Option<Vec<String>> {
        if !self.has_file_list() {
            return None;
        }

        unsafe {
            let mut medium = self.0.GetData(&hdrop_format()).ok()?;
            let hglobal = medium.u.hGlobal;
            let files = if hglobal.0.is_null() || GlobalLock(hglobal).is_null() {
                None
            } else {
                let files = query_files(HDROP(hglobal.0));
                let _ = GlobalUnlock(hglobal);
                Some(files)
            };
            ReleaseStgMedium(&mut medium);
            files
        }
    }
}

/// `WM_DROPFILES` handle, released with `DragFinish` on drop.
struct DroppedFiles(HDROP);

impl LegacyDrop for DroppedFiles {
    fn drop_point(&self) -> DropPoint {
        let mut pt = POINT::default();
        let in_client = unsafe { DragQueryPoint(self.0, &mut pt) }.as_bool();
        let point = Point::new(pt.x, pt.y);
        if in_client {
            DropPoint::Client(point)
        } else {
            DropPoint::Screen(point)
        }
    }

    fn file_list(&self) -> Vec<String> {
        unsafe { query_files(self.0) }
    }
}

impl Drop for DroppedFiles {
    fn drop(&mut self) {
        unsafe { DragFinish(self.0) };
    }
}

// ============================================================================
// IDropTarget shim
// ============================================================================

#[implement(IDropTarget)]
struct DropTargetShim {
    handler: Weak<dyn DropHandler>,
}

/// Run `f` with the effect mask OLE handed in and write the chosen effect back.
unsafe fn with_effect(pdweffect: *mut DROPEFFECT, f: impl FnOnce(&mut DropEffects)) {
    let mut effect = if pdweffect.is_null() {
        DropEffects::NONE
    } else {
        DropEffects::from_bits((*pdweffect).0)
    };
    f(&mut effect);
    if !pdweffect.is_null() {
        *pdweffect = DROPEFFECT(effect.bits());
    }
}

fn keys(grfkeystate: MODIFIERKEYS_FLAGS) -> ModifierKeys {
    ModifierKeys::from_bits(grfkeystate.0)
}

impl IDropTarget_Impl for DropTargetShim_Impl {
    fn DragEnter(
        &self,
        pdataobj: Ref<'_, IDataObject>,
        grfkeystate: MODIFIERKEYS_FLAGS,
        pt: &POINTL,
        pdweffect: *mut DROPEFFECT,
    ) -> windows_core::Result<()> {
        let Some(handler) = self.handler.upgrade() else { return Ok(()) };
        let data = pdataobj.as_ref().map(DataObjectFiles);
        unsafe {
            with_effect(pdweffect, |effect| {
                handler.drag_enter(
                    data.as_ref().map(|data| data as &dyn FileSource),
                    keys(grfkeystate),
                    Point::new(pt.x, pt.y),
                    effect,
                )
            });
        }
        Ok(())
    }

    fn DragOver(
        &self,
        grfkeystate: MODIFIERKEYS_FLAGS,
        pt: &POINTL,
        pdweffect: *mut DROPEFFECT,
    ) -> windows_core::Result<()> {
        let Some(handler) = self.handler.upgrade() else { return Ok(()) };
        unsafe {
            with_effect(pdweffect, |effect| {
                handler.drag_over(keys(grfkeystate), Point::new(pt.x, pt.y), effect)
            });
        }
        Ok(())
    }

    fn DragLeave(&self) -> windows_core::Result<()> {
        if let Some(handler) = self.handler.upgrade() {
            handler.drag_leave();
        }
        Ok(())
    }

    fn Drop(
        &self,
        pdataobj: Ref<'_, IDataObject>,
        grfkeystate: MODIFIERKEYS_FLAGS,
        pt: &POINTL,
        pdweffect: *mut DROPEFFECT,
    ) -> windows_core::Result<()> {
        let Some(handler) = self.handler.upgrade() else { return Ok(()) };
        let data = pdataobj.as_ref().map(DataObjectFiles);
        unsafe {
            with_effect(pdweffect, |effect| {
                handler.perform_drop(
                    data.as_ref().map(|data| data as &dyn FileSource),
                    keys(grfkeystate),
                    Point::new(pt.x, pt.y),
                    effect,
                )
            });
        }
        Ok(())
    }
}
