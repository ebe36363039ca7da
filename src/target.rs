//! The drop target bound to one top-level window
//!
//! Implements the OLE drag protocol (enter/over/leave/drop) plus the legacy
//! `WM_DROPFILES` fallback and turns both into one ordered stream of
//! [`DropEvent`]s:
//! - `entered` / `updated` with client coordinates while the drag hovers,
//! - `performOperation` with the dropped paths, followed by `exited`,
//! - `exited` when the drag leaves.
//!
//! Some drag sources deliver both an OLE drop and a `WM_DROPFILES` for the same
//! gesture. The legacy path is ignored while an OLE session is active and within the
//! configured debounce window after any completed drop.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use crate::config::DropConfig;
use crate::dispatch::{DropEvent, EventDispatcher, MethodChannel};
use crate::effect::{self, DropEffects, ModifierKeys};
use crate::interceptor;
use crate::platform::{
    Disposition, DropHandler, DropPoint, FileSource, LegacyDrop, Point, RootMessage, WindowHandle, WindowSystem,
};
use crate::registry::WindowRegistry;
use crate::session::Session;

/// Drop target for one top-level window.
///
/// Shared through `Arc`: the plugin façade holds the owning reference and the
/// platform backend only keeps a `Weak` for routing callbacks. Dropping the last
/// reference tears everything down (registry, own registration, fallback OLE init).
pub struct DropTarget {
    os: Arc<dyn WindowSystem>,
    root: WindowHandle,
    config: DropConfig,
    channel: Arc<dyn MethodChannel>,
    session: Arc<Session>,
    registry: Mutex<WindowRegistry>,
    dispatcher: EventDispatcher,
    /// `OleInitialize` was called as a registration fallback and must be undone.
    ole_fallback: bool,
    torn_down: AtomicBool,
}

impl DropTarget {
    /// Register `root` with OLE, enable legacy drops and start tracking its
    /// child windows.
    pub fn new(
        os: Arc<dyn WindowSystem>,
        root: WindowHandle,
        channel: Arc<dyn MethodChannel>,
        config: DropConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<DropTarget>| {
            let handler: Weak<dyn DropHandler> = weak.clone();
            os.bind(handler);

            let ole_fallback = register_root(&*os, root);
            os.accept_files(root, true);

            let session = Arc::new(Session::new());
            let mut registry = WindowRegistry::new(os.clone(), session.clone(), config.retry_policy());
            registry.start(root);

            // Wakes are only consumed by the root subclass
            let dispatcher = EventDispatcher::new(os.clone(), root);
            dispatcher.set_receiving(registry.interceptor_installed());

            drop_log!("DropTarget created on {:#x} ole_fallback={}", root.raw(), ole_fallback);

            Self {
                dispatcher,
                os,
                root,
                config,
                channel,
                session,
                registry: Mutex::new(registry),
                ole_fallback,
                torn_down: AtomicBool::new(false),
            }
        })
    }

    pub fn root(&self) -> WindowHandle {
        self.root
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_dragging()
    }

    /// Registry access for drag callbacks and root window messages alike.
    ///
    /// OLE calls `IDropTarget` on the thread that registered it, which is the root
    /// window's UI thread, so the lock is never contended across threads. A drag
    /// callback never waits on a sweep in progress.
    pub(crate) fn registry(&self) -> MutexGuard<'_, WindowRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand every queued event to the host channel, oldest first.
    pub(crate) fn deliver_queued(&self) {
        for event in self.dispatcher.take_all() {
            let (method, arguments) = event.into_invocation();
            drop_log!("Delivering {}", method);
            self.channel.invoke(method, arguments);
        }
    }

    fn client_point(&self, screen: Point) -> (f64, f64) {
        let client = self.os.screen_to_client(self.root, screen);
        (f64::from(client.x), f64::from(client.y))
    }

    /// Drag finished one way or another: apply queued registry work and remember
    /// when, for the legacy debounce.
    fn finish_session(&self) {
        self.session.end();
        self.registry().on_session_end();
        self.session.record_drop(Instant::now());
    }

    /// `WM_DROPFILES` fallback for sources that skip the OLE protocol.
    pub fn handle_legacy_drop(&self, drop: &dyn LegacyDrop) {
        if self.session.is_dragging() {
            drop_log!("WM_DROPFILES ignored: OLE drag in flight");
            return;
        }
        if self.session.within_debounce(Instant::now(), self.config.debounce()) {
            drop_log!("WM_DROPFILES ignored: within {:?} of the previous drop", self.config.debounce());
            return;
        }

        let point = match drop.drop_point() {
            DropPoint::Client(point) => point,
            DropPoint::Screen(point) => self.os.screen_to_client(self.root, point),
        };
        self.dispatcher.post(DropEvent::Entered {
            x: f64::from(point.x),
            y: f64::from(point.y),
        });

        let files = normalize_paths(drop.file_list());
        drop_log!("WM_DROPFILES files={}", files.len());
        for file in &files {
            drop_log!("done: {}", file);
        }
        self.dispatcher.post(DropEvent::Performed(files));
        self.dispatcher.post(DropEvent::Exited);

        drop_log!("WM_DROPFILES seen; request deferred OLE re-register");
        self.registry().request_reregister_all();

        self.session.record_drop(Instant::now());
    }

    /// Revoke everything, unhook the root and release queued events. Runs once.
    pub fn shutdown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.registry().stop();

        let released = self.dispatcher.drain();
        if released > 0 {
            drop_log!("Released {} undelivered event(s)", released);
        }

        if self.os.is_window(self.root) {
            let result = self.os.revoke_drop_target(self.root);
            drop_log!("DropTarget shutdown RevokeDragDrop: {:?}", result);
        }
    }
}

impl Drop for DropTarget {
    fn drop(&mut self) {
        self.shutdown();
        if self.ole_fallback {
            drop_log!("OleUninitialize()");
            self.os.ole_uninitialize();
        }
    }
}

impl DropHandler for DropTarget {
    fn drag_enter(&self, data: Option<&dyn FileSource>, keys: ModifierKeys, point: Point, effect: &mut DropEffects) {
        self.session.begin();
        *effect = effect::resolve_reported(keys, *effect);

        self.registry().ensure_registered_under_point(point);

        let has_files = data.is_some_and(|data| data.has_file_list());
        let (x, y) = self.client_point(point);
        drop_log!(
            "DragEnter effect={} keys={:#x} CF_HDROP={} pt=({},{}) client=({},{})",
            effect,
            keys.bits(),
            has_files,
            point.x,
            point.y,
            x,
            y
        );
        self.dispatcher.post(DropEvent::Entered { x, y });
    }

    fn drag_over(&self, keys: ModifierKeys, point: Point, effect: &mut DropEffects) {
        *effect = effect::resolve_reported(keys, *effect);
        let (x, y) = self.client_point(point);
        self.dispatcher.post(DropEvent::Updated { x, y });
    }

    fn drag_leave(&self) {
        drop_log!("DragLeave");
        self.dispatcher.post(DropEvent::Exited);
        self.finish_session();
    }

    fn perform_drop(&self, data: Option<&dyn FileSource>, keys: ModifierKeys, point: Point, effect: &mut DropEffects) {
        *effect = effect::resolve_reported(keys, *effect);
        drop_log!("Drop effect={} keys={:#x} pt=({},{})", effect, keys.bits(), point.x, point.y);

        let files = match data.and_then(|data| data.file_list()) {
            Some(files) => normalize_paths(files),
            None => {
                drop_log!("CF_HDROP not available");
                Vec::new()
            }
        };
        drop_log!("HDROP files={}", files.len());
        for file in &files {
            drop_log!("done: {}", file);
        }

        self.dispatcher.post(DropEvent::Performed(files));
        self.dispatcher.post(DropEvent::Exited);
        self.finish_session();
    }

    fn handle_root_message(&self, message: RootMessage<'_>) -> Disposition {
        interceptor::route(self, message)
    }
}

/// `RegisterDragDrop` on the root, initializing OLE and retrying once if the first
/// attempt fails. Returns true if the retry succeeded after `OleInitialize`.
fn register_root(os: &dyn WindowSystem, root: WindowHandle) -> bool {
    let first = os.register_drop_target(root);
    drop_log!("RegisterDragDrop first: {:?}", first);
    let Err(err) = first else { return false };

    drop_log!("RegisterDragDrop failed ({}), calling OleInitialize", err);
    if let Err(err) = os.ole_initialize() {
        drop_warn!("OleInitialize failed: {}", err);
    }
    let retry = os.register_drop_target(root);
    drop_log!("RegisterDragDrop retry: {:?}", retry);
    retry.is_ok()
}

/// Strip `\\?\` verbatim prefixes so the host sees ordinary paths.
fn normalize_paths(paths: Vec<String>) -> Vec<String> {
    paths
        .into_iter()
        .map(|path| dunce::simplified(Path::new(&path)).to_string_lossy().into_owned())
        .collect()
}
