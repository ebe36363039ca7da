//! Recording fakes for the OS seam and the host channel (tests only)

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;

use crate::dispatch::MethodChannel;
use crate::error::OsError;
use crate::platform::{
    DropHandler, DropPoint, FileSource, LegacyDrop, Point, RootMessage, Signal, WindowHandle, WindowSystem,
};

/// OS call observed by the fake, in call order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Register(WindowHandle),
    Revoke(WindowHandle),
    OleInitialize,
    OleUninitialize,
}

#[derive(Default)]
struct State {
    alive: HashSet<WindowHandle>,
    children: Vec<WindowHandle>,
    under_point: Option<WindowHandle>,
    os_registered: HashSet<WindowHandle>,
    fail_register: HashMap<WindowHandle, OsError>,
    ole_uninitialized: bool,
    accepting: HashSet<WindowHandle>,
    signals: VecDeque<(Signal, Duration)>,
    hook_installed: bool,
    hook_installs: usize,
    hook_refused: bool,
    deliver_post_countdown: Option<usize>,
    calls: Vec<Call>,
    client_origin: Point,
    handler: Option<Weak<dyn DropHandler>>,
}

/// In-memory window tree with one root at [`MockWindows::ROOT`].
pub struct MockWindows {
    state: Mutex<State>,
}

impl MockWindows {
    pub const ROOT: WindowHandle = WindowHandle::new(0x100);

    pub fn new() -> Arc<Self> {
        let mut state = State::default();
        state.alive.insert(Self::ROOT);
        state.client_origin = Point::new(40, 30);
        Arc::new(Self { state: Mutex::new(state) })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_child(&self, child: WindowHandle) {
        let mut state = self.state();
        state.alive.insert(child);
        state.children.push(child);
    }

    pub fn destroy(&self, window: WindowHandle) {
        let mut state = self.state();
        state.alive.remove(&window);
        state.os_registered.remove(&window);
        state.children.retain(|child| *child != window);
    }

    pub fn set_window_under_point(&self, window: Option<WindowHandle>) {
        self.state().under_point = window;
    }

    pub fn fail_register(&self, window: WindowHandle, error: OsError) {
        self.state().fail_register.insert(window, error);
    }

    /// Registration fails with `NotInitialized` until `ole_initialize` runs.
    pub fn set_ole_uninitialized(&self) {
        self.state().ole_uninitialized = true;
    }

    /// Registration made outside the subsystem, e.g. by the host toolkit.
    pub fn preregister(&self, window: WindowHandle) {
        self.state().os_registered.insert(window);
    }

    pub fn is_os_registered(&self, window: WindowHandle) -> bool {
        self.state().os_registered.contains(&window)
    }

    pub fn is_accepting_files(&self, window: WindowHandle) -> bool {
        self.state().accepting.contains(&window)
    }

    /// `SetWindowLongPtrW` fails on the root, e.g. another subclass got there first.
    pub fn refuse_hook(&self) {
        self.state().hook_refused = true;
    }

    /// The `nth` `DeliverEvent` post from now fails, as `PostMessageW` does on a
    /// full message queue.
    pub fn fail_deliver_post(&self, nth: usize) {
        self.state().deliver_post_countdown = Some(nth);
    }

    pub fn hook_installed(&self) -> bool {
        self.state().hook_installed
    }

    pub fn hook_installs(&self) -> usize {
        self.state().hook_installs
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, call: Call) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn pending_signals(&self) -> Vec<Signal> {
        self.state().signals.iter().map(|(signal, _)| *signal).collect()
    }

    pub fn pending_delays(&self) -> Vec<Duration> {
        self.state().signals.iter().map(|(_, delay)| *delay).collect()
    }

    pub fn take_signal(&self) -> Option<Signal> {
        self.state().signals.pop_front().map(|(signal, _)| signal)
    }

    pub fn has_handler(&self) -> bool {
        self.state().handler.is_some()
    }

    /// Feed up to `limit` queued signals to `handler`, as the root window
    /// procedure would. Returns how many were processed.
    pub fn pump(&self, handler: &dyn DropHandler, limit: usize) -> usize {
        let mut processed = 0;
        while processed < limit {
            // Lock released before the handler runs; it may post more signals
            let Some(signal) = self.take_signal() else { break };
            handler.handle_root_message(RootMessage::Signal(signal));
            processed += 1;
        }
        processed
    }
}

impl WindowSystem for MockWindows {
    fn bind(&self, handler: Weak<dyn DropHandler>) {
        self.state().handler = Some(handler);
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        self.state().alive.contains(&window)
    }

    fn register_drop_target(&self, window: WindowHandle) -> Result<(), OsError> {
        let mut state = self.state();
        state.calls.push(Call::Register(window));
        if !state.alive.contains(&window) {
            return Err(OsError::InvalidWindow);
        }
        if state.ole_uninitialized {
            return Err(OsError::NotInitialized);
        }
        if let Some(error) = state.fail_register.get(&window) {
            return Err(*error);
        }
        if !state.os_registered.insert(window) {
            return Err(OsError::AlreadyRegistered);
        }
        Ok(())
    }

    fn revoke_drop_target(&self, window: WindowHandle) -> Result<(), OsError> {
        let mut state = self.state();
        state.calls.push(Call::Revoke(window));
        if !state.alive.contains(&window) {
            return Err(OsError::InvalidWindow);
        }
        if state.os_registered.remove(&window) {
            Ok(())
        } else {
            Err(OsError::Failed(0x8004_0100))
        }
    }

    fn accept_files(&self, window: WindowHandle, accept: bool) {
        let mut state = self.state();
        if accept {
            state.accepting.insert(window);
        } else {
            state.accepting.remove(&window);
        }
    }

    fn window_from_point(&self, _screen: Point) -> Option<WindowHandle> {
        self.state().under_point
    }

    fn child_windows(&self, root: WindowHandle) -> Vec<WindowHandle> {
        let state = self.state();
        if root == Self::ROOT {
            state.children.clone()
        } else {
            Vec::new()
        }
    }

    fn screen_to_client(&self, _window: WindowHandle, screen: Point) -> Point {
        let origin = self.state().client_origin;
        Point::new(screen.x - origin.x, screen.y - origin.y)
    }

    fn post_signal(&self, root: WindowHandle, signal: Signal, delay: Duration) -> bool {
        let mut state = self.state();
        if !state.alive.contains(&root) {
            return false;
        }
        if signal == Signal::DeliverEvent {
            match state.deliver_post_countdown {
                Some(n) if n <= 1 => {
                    state.deliver_post_countdown = None;
                    return false;
                }
                Some(n) => state.deliver_post_countdown = Some(n - 1),
                None => {}
            }
        }
        state.signals.push_back((signal, delay));
        true
    }

    fn install_root_hook(&self, root: WindowHandle) -> bool {
        let mut state = self.state();
        if state.hook_installed || state.hook_refused || !state.alive.contains(&root) {
            return false;
        }
        state.hook_installed = true;
        state.hook_installs += 1;
        true
    }

    fn remove_root_hook(&self, _root: WindowHandle) -> bool {
        std::mem::replace(&mut self.state().hook_installed, false)
    }

    fn ole_initialize(&self) -> Result<(), OsError> {
        let mut state = self.state();
        state.calls.push(Call::OleInitialize);
        state.ole_uninitialized = false;
        Ok(())
    }

    fn ole_uninitialize(&self) {
        self.state().calls.push(Call::OleUninitialize);
    }
}

/// Host channel that records every invocation.
#[derive(Default)]
pub struct RecordingChannel {
    invocations: Mutex<Vec<(String, Value)>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.invocations().into_iter().map(|(method, _)| method).collect()
    }
}

impl MethodChannel for RecordingChannel {
    fn invoke(&self, method: &str, arguments: Value) {
        self.invocations.lock().unwrap().push((method.to_string(), arguments));
    }
}

/// OLE data object stand-in. `None` models a source without `CF_HDROP`.
pub struct FakeFiles(pub Option<Vec<String>>);

impl FileSource for FakeFiles {
    fn has_file_list(&self) -> bool {
        self.0.is_some()
    }

    fn file_list(&self) -> Option<Vec<String>> {
        self.0.clone()
    }
}

/// `WM_DROPFILES` payload stand-in.
pub struct FakeLegacyDrop {
    pub point: DropPoint,
    pub files: Vec<String>,
}

impl LegacyDrop for FakeLegacyDrop {
    fn drop_point(&self) -> DropPoint {
        self.point
    }

    fn file_list(&self) -> Vec<String> {
        self.files.clone()
    }
}
