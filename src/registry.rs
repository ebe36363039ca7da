//! Drop target registration for the root window and its descendants
//!
//! OLE delivers drag callbacks per native window, so every child window the host
//! creates needs its own `RegisterDragDrop`. Registration calls are unsafe while a
//! drag is in flight, so mutations requested during a session are queued and applied
//! once it ends (deletes first, then adds, each in request order).
//!
//! Consuming a legacy `WM_DROPFILES` handle is known to leave OLE's per-window state
//! stale. The fix is a full revoke/re-register sweep, which is deferred to the root
//! window's message loop and retried with back-off until no drag is in flight.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryPolicy;
use crate::error::OsError;
use crate::interceptor::RootInterceptor;
use crate::platform::{Point, Signal, WindowHandle, WindowSystem};
use crate::session::Session;

/// Result of handling one re-registration signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Nothing was pending.
    Idle,
    /// A drag is in flight; the signal was posted again with back-off.
    Rescheduled,
    /// The sweep ran.
    Swept,
}

pub struct WindowRegistry {
    os: Arc<dyn WindowSystem>,
    session: Arc<Session>,
    retry: RetryPolicy,
    root: Option<WindowHandle>,
    registered: HashSet<WindowHandle>,
    pending_add: Vec<WindowHandle>,
    pending_del: Vec<WindowHandle>,
    reregister_pending: bool,
    retry_attempt: u32,
    interceptor: RootInterceptor,
}

impl WindowRegistry {
    pub fn new(os: Arc<dyn WindowSystem>, session: Arc<Session>, retry: RetryPolicy) -> Self {
        Self {
            os,
            session,
            retry,
            root: None,
            registered: HashSet::new(),
            pending_add: Vec::new(),
            pending_del: Vec::new(),
            reregister_pending: false,
            retry_attempt: 0,
            interceptor: RootInterceptor::default(),
        }
    }

    pub fn root(&self) -> Option<WindowHandle> {
        self.root
    }

    pub fn is_registered(&self, window: WindowHandle) -> bool {
        self.registered.contains(&window)
    }

    pub fn registered(&self) -> &HashSet<WindowHandle> {
        &self.registered
    }

    pub fn pending_adds(&self) -> &[WindowHandle] {
        &self.pending_add
    }

    pub fn pending_deletes(&self) -> &[WindowHandle] {
        &self.pending_del
    }

    pub fn reregister_pending(&self) -> bool {
        self.reregister_pending
    }

    pub fn interceptor_installed(&self) -> bool {
        self.interceptor.is_installed()
    }

    /// Enable legacy drops on `root`, hook its window procedure and register it
    /// together with every current descendant.
    pub fn start(&mut self, root: WindowHandle) {
        self.root = Some(root);
        if !self.os.is_window(root) {
            drop_warn!("Registry start: root {:#x} is not a window", root.raw());
            return;
        }

        self.os.accept_files(root, true);
        self.interceptor.install(&*self.os, root);

        self.register_window(root);
        self.register_descendants(root);
        drop_log!("Registry started on {:#x}, {} window(s) registered", root.raw(), self.registered.len());
    }

    /// Undo `start`: unhook the root, revoke every registration and forget all state.
    pub fn stop(&mut self) {
        if let Some(root) = self.root {
            if self.os.is_window(root) {
                self.os.accept_files(root, false);
            }
        }
        self.interceptor.uninstall(&*self.os);

        for window in self.registered.drain() {
            if self.os.is_window(window) {
                let result = self.os.revoke_drop_target(window);
                drop_log!("Stop revoke {:#x}: {:?}", window.raw(), result);
            }
        }

        self.root = None;
        self.reregister_pending = false;
        self.retry_attempt = 0;
        self.pending_add.clear();
        self.pending_del.clear();
    }

    /// Register `window` as a drop target, or queue the registration while a drag
    /// is in flight.
    pub fn register_window(&mut self, window: WindowHandle) {
        if window.is_null() || self.registered.contains(&window) {
            return;
        }

        if self.session.is_dragging() {
            if !self.pending_add.contains(&window) {
                drop_log!("Queueing register of {:#x} until the drag ends", window.raw());
                self.pending_add.push(window);
            }
            return;
        }

        self.register_now(window);
    }

    /// Revoke `window`, or queue the revocation while a drag is in flight.
    pub fn revoke_window(&mut self, window: WindowHandle) {
        if window.is_null() || !self.registered.contains(&window) {
            return;
        }

        if self.session.is_dragging() {
            if !self.pending_del.contains(&window) {
                drop_log!("Queueing revoke of {:#x} until the drag ends", window.raw());
                self.pending_del.push(window);
            }
            return;
        }

        self.revoke_now(window);
    }

    /// Make sure the window under the cursor gets its own registration. Drag-enter
    /// fires on the top-level window first; nested children need their own.
    pub fn ensure_registered_under_point(&mut self, screen: Point) {
        let Some(window) = self.os.window_from_point(screen) else { return };
        if !self.registered.contains(&window) {
            self.register_window(window);
        }
    }

    /// A child of the root was created: register it right away and schedule a
    /// sweep so OLE picks up any state the new child disturbed.
    pub fn child_created(&mut self, child: WindowHandle) {
        if child.is_null() {
            return;
        }
        self.register_window(child);
        if self.os.is_window(child) {
            self.os.accept_files(child, true);
        }
        self.request_reregister_all();
    }

    /// A child of the root is being destroyed.
    pub fn child_destroyed(&mut self, child: WindowHandle) {
        if child.is_null() {
            return;
        }
        self.revoke_window(child);
        if self.os.is_window(child) {
            self.os.accept_files(child, false);
        }
    }

    /// Mark a sweep as pending and post the signal that runs it.
    pub fn request_reregister_all(&mut self) {
        let Some(root) = self.root.filter(|root| self.os.is_window(*root)) else { return };
        self.reregister_pending = true;
        if !self.os.post_signal(root, Signal::ReRegister, Duration::ZERO) {
            drop_warn!("Could not post re-register signal to {:#x}", root.raw());
        }
    }

    /// Handle one re-registration signal.
    pub fn run_deferred_reregister(&mut self) -> SweepOutcome {
        if !self.reregister_pending {
            return SweepOutcome::Idle;
        }

        let Some(root) = self.root.filter(|root| self.os.is_window(*root)) else {
            self.reregister_pending = false;
            return SweepOutcome::Idle;
        };

        if self.session.is_dragging() {
            let delay = self.retry.delay(self.retry_attempt);
            self.retry_attempt = self.retry_attempt.saturating_add(1);
            drop_log!("Re-register deferred: drag in flight, retrying in {:?}", delay);
            if !self.os.post_signal(root, Signal::ReRegister, delay) {
                drop_warn!("Could not reschedule re-register signal");
            }
            return SweepOutcome::Rescheduled;
        }

        self.reregister_pending = false;
        self.retry_attempt = 0;
        self.force_reregister_all();
        SweepOutcome::Swept
    }

    /// Revoke and re-register every known window, then pick up descendants that
    /// appeared since the last enumeration. Never runs during a drag.
    pub fn force_reregister_all(&mut self) {
        let Some(root) = self.root.filter(|root| self.os.is_window(*root)) else { return };
        if self.session.is_dragging() {
            drop_log!("ForceReRegisterAll skipped: drag in flight");
            return;
        }

        drop_log!("ForceReRegisterAll begin");

        let snapshot: Vec<WindowHandle> = self.registered.iter().copied().collect();
        self.reregister(root);
        for window in snapshot {
            if window == root {
                continue;
            }
            if self.os.is_window(window) {
                self.reregister(window);
            } else {
                self.registered.remove(&window);
            }
        }
        self.register_descendants(root);

        self.os.accept_files(root, true);
        drop_log!("ForceReRegisterAll done. total={}", self.registered.len());
    }

    /// Apply mutations queued during the drag: deletes first so a handle queued
    /// both ways is never registered and immediately revoked.
    pub fn flush_pending_ops(&mut self) {
        for window in std::mem::take(&mut self.pending_del) {
            if self.os.is_window(window) {
                let result = self.os.revoke_drop_target(window);
                drop_log!("Flush revoke {:#x}: {:?}", window.raw(), result);
            } else {
                drop_log!("Flush drop {:#x}: window already destroyed", window.raw());
            }
            self.registered.remove(&window);
        }

        for window in std::mem::take(&mut self.pending_add) {
            if self.os.is_window(window) && !self.registered.contains(&window) {
                self.register_now(window);
            }
        }
    }

    /// The drag ended: apply queued mutations and re-arm a sweep that was blocked.
    pub fn on_session_end(&mut self) {
        self.flush_pending_ops();
        if self.reregister_pending {
            self.request_reregister_all();
        }
    }

    fn register_descendants(&mut self, root: WindowHandle) {
        for child in self.os.child_windows(root) {
            self.register_window(child);
            self.os.accept_files(child, true);
        }
    }

    fn register_now(&mut self, window: WindowHandle) {
        if !self.os.is_window(window) {
            return;
        }
        let result = self.os.register_drop_target(window);
        drop_log!("RegisterOnWindow {:#x}: {:?}", window.raw(), result);
        if OsError::counts_as_registered(result) {
            self.registered.insert(window);
        } else if let Err(err) = result {
            drop_warn!("RegisterDragDrop failed for {:#x}: {}", window.raw(), err);
        }
    }

    fn revoke_now(&mut self, window: WindowHandle) {
        if self.os.is_window(window) {
            let result = self.os.revoke_drop_target(window);
            drop_log!("RevokeOnWindow {:#x}: {:?}", window.raw(), result);
        }
        self.registered.remove(&window);
    }

    fn reregister(&mut self, window: WindowHandle) {
        let revoked = self.os.revoke_drop_target(window);
        self.registered.remove(&window);
        let registered = self.os.register_drop_target(window);
        drop_log!("ReReg {:#x}: revoke {:?}, register {:?}", window.raw(), revoked, registered);
        if OsError::counts_as_registered(registered) {
            self.registered.insert(window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockWindows};

    const CHILD_A: WindowHandle = WindowHandle::new(0x201);
    const CHILD_B: WindowHandle = WindowHandle::new(0x202);
    const CHILD_C: WindowHandle = WindowHandle::new(0x203);

    fn registry() -> (Arc<MockWindows>, Arc<Session>, WindowRegistry) {
        let os = MockWindows::new();
        let session = Arc::new(Session::new());
        let registry = WindowRegistry::new(os.clone(), session.clone(), RetryPolicy::default());
        (os, session, registry)
    }

    #[test]
    fn test_start_registers_root_and_children() {
        let (os, _session, mut registry) = registry();
        os.add_child(CHILD_A);
        os.add_child(CHILD_B);

        registry.start(MockWindows::ROOT);

        for window in [MockWindows::ROOT, CHILD_A, CHILD_B] {
            assert!(registry.is_registered(window));
            assert!(os.is_os_registered(window));
            assert!(os.is_accepting_files(window));
        }
        assert!(registry.interceptor_installed());
        assert!(os.hook_installed());
    }

    #[test]
    fn test_register_is_idempotent() {
        let (os, _session, mut registry) = registry();
        registry.start(MockWindows::ROOT);
        os.add_child(CHILD_A);
        os.clear_calls();

        registry.register_window(CHILD_A);
        registry.register_window(CHILD_A);
        registry.register_window(WindowHandle::NULL);
        assert_eq!(os.calls(), vec![Call::Register(CHILD_A)]);
    }

    #[test]
    fn test_already_registered_counts_as_success() {
        let (os, _session, mut registry) = registry();
        os.add_child(CHILD_A);
        os.preregister(CHILD_A);
        registry.start(MockWindows::ROOT);
        assert!(registry.is_registered(CHILD_A));
    }

    #[test]
    fn test_failed_registration_is_not_tracked() {
        let (os, _session, mut registry) = registry();
        os.add_child(CHILD_A);
        os.fail_register(CHILD_A, OsError::OutOfMemory);
        registry.start(MockWindows::ROOT);
        assert!(registry.is_registered(MockWindows::ROOT));
        assert!(!registry.is_registered(CHILD_A));
    }

    #[test]
    fn test_revoke_removes_even_if_os_call_fails() {
        let (os, _session, mut registry) = registry();
        os.add_child(CHILD_A);
        registry.start(MockWindows::ROOT);

        // Someone else already revoked it behind our back
        os.revoke_drop_target(CHILD_A).unwrap();
        os.clear_calls();

        registry.revoke_window(CHILD_A);
        assert!(!registry.is_registered(CHILD_A));
        assert_eq!(os.calls(), vec![Call::Revoke(CHILD_A)]);

        // Not registered any more: no-op
        registry.revoke_window(CHILD_A);
        assert_eq!(os.calls().len(), 1);
    }

    #[test]
    fn test_mutations_queue_during_drag() {
        let (os, session, mut registry) = registry();
        os.add_child(CHILD_A);
        registry.start(MockWindows::ROOT);
        os.add_child(CHILD_B);
        os.clear_calls();

        session.begin();
        registry.register_window(CHILD_B);
        registry.register_window(CHILD_B);
        registry.revoke_window(CHILD_A);
        registry.revoke_window(CHILD_A);

        assert!(os.calls().is_empty());
        assert_eq!(registry.pending_adds(), &[CHILD_B]);
        assert_eq!(registry.pending_deletes(), &[CHILD_A]);
        assert!(registry.is_registered(CHILD_A));

        session.end();
        registry.on_session_end();

        assert_eq!(os.calls(), vec![Call::Revoke(CHILD_A), Call::Register(CHILD_B)]);
        assert!(!registry.is_registered(CHILD_A));
        assert!(registry.is_registered(CHILD_B));
        assert!(registry.pending_adds().is_empty());
        assert!(registry.pending_deletes().is_empty());
    }

    #[test]
    fn test_flush_applies_in_request_order() {
        let (os, session, mut registry) = registry();
        registry.start(MockWindows::ROOT);
        for child in [CHILD_A, CHILD_B, CHILD_C] {
            os.add_child(child);
        }
        os.clear_calls();

        session.begin();
        registry.register_window(CHILD_C);
        registry.register_window(CHILD_A);
        registry.register_window(CHILD_B);
        session.end();
        registry.flush_pending_ops();

        assert_eq!(
            os.calls(),
            vec![Call::Register(CHILD_C), Call::Register(CHILD_A), Call::Register(CHILD_B)]
        );
    }

    #[test]
    fn test_child_destroyed_mid_session() {
        let (os, session, mut registry) = registry();
        os.add_child(CHILD_A);
        registry.start(MockWindows::ROOT);

        session.begin();
        registry.child_destroyed(CHILD_A);
        os.destroy(CHILD_A);
        os.clear_calls();

        session.end();
        registry.on_session_end();

        assert!(!registry.is_registered(CHILD_A));
        assert_eq!(os.count_calls(Call::Revoke(CHILD_A)), 0);
    }

    #[test]
    fn test_queued_add_for_destroyed_window_is_dropped() {
        let (os, session, mut registry) = registry();
        registry.start(MockWindows::ROOT);
        os.add_child(CHILD_A);

        session.begin();
        registry.child_created(CHILD_A);
        os.destroy(CHILD_A);
        session.end();
        os.clear_calls();
        registry.flush_pending_ops();

        assert!(os.calls().is_empty());
        assert!(!registry.is_registered(CHILD_A));
    }

    #[test]
    fn test_flush_matches_sequential_model() {
        // Pseudo-random register/revoke sequences across several sessions, checked
        // against a model that applies each session's requests deletes-first.
        let handles: Vec<WindowHandle> = (1..=6).map(|i| WindowHandle::new(0x300 + i)).collect();
        let mut seed: u32 = 0x2545_f491;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        let (os, session, mut registry) = registry();
        for handle in &handles {
            os.add_child(*handle);
        }
        registry.start(MockWindows::ROOT);
        let mut model: HashSet<WindowHandle> = registry.registered().clone();

        for _ in 0..50 {
            session.begin();
            let mut adds = Vec::new();
            let mut dels = Vec::new();
            for _ in 0..8 {
                let handle = handles[(next() % handles.len() as u32) as usize];
                if next() % 2 == 0 {
                    registry.register_window(handle);
                    if !model.contains(&handle) && !adds.contains(&handle) {
                        adds.push(handle);
                    }
                } else {
                    registry.revoke_window(handle);
                    if model.contains(&handle) && !dels.contains(&handle) {
                        dels.push(handle);
                    }
                }
            }
            session.end();
            registry.on_session_end();

            for handle in dels {
                model.remove(&handle);
            }
            model.extend(adds);
            assert_eq!(registry.registered(), &model);
            for handle in &handles {
                assert_eq!(os.is_os_registered(*handle), model.contains(handle));
            }
        }
    }

    #[test]
    fn test_ensure_registered_under_point() {
        let (os, session, mut registry) = registry();
        registry.start(MockWindows::ROOT);
        os.add_child(CHILD_A);
        os.set_window_under_point(Some(CHILD_A));

        registry.ensure_registered_under_point(Point::new(5, 5));
        assert!(registry.is_registered(CHILD_A));

        // During a drag the registration waits for the session to end
        os.add_child(CHILD_B);
        os.set_window_under_point(Some(CHILD_B));
        session.begin();
        registry.ensure_registered_under_point(Point::new(5, 5));
        assert_eq!(registry.pending_adds(), &[CHILD_B]);

        os.set_window_under_point(None);
        registry.ensure_registered_under_point(Point::new(5, 5));
        assert_eq!(registry.pending_adds(), &[CHILD_B]);
    }

    #[test]
    fn test_force_reregister_all() {
        let (os, _session, mut registry) = registry();
        os.add_child(CHILD_A);
        os.add_child(CHILD_B);
        registry.start(MockWindows::ROOT);
        os.destroy(CHILD_B);
        os.add_child(CHILD_C);
        os.clear_calls();

        registry.force_reregister_all();

        let calls = os.calls();
        assert_eq!(calls[0], Call::Revoke(MockWindows::ROOT));
        assert_eq!(calls[1], Call::Register(MockWindows::ROOT));
        assert_eq!(os.count_calls(Call::Revoke(CHILD_A)), 1);
        assert_eq!(os.count_calls(Call::Register(CHILD_A)), 1);
        assert_eq!(os.count_calls(Call::Revoke(CHILD_B)), 0);
        assert_eq!(os.count_calls(Call::Register(CHILD_C)), 1);

        let expected: HashSet<_> = [MockWindows::ROOT, CHILD_A, CHILD_C].into_iter().collect();
        assert_eq!(registry.registered(), &expected);
    }

    #[test]
    fn test_deferred_sweep_waits_for_session_end() {
        let (os, session, mut registry) = registry();
        registry.start(MockWindows::ROOT);
        assert_eq!(registry.run_deferred_reregister(), SweepOutcome::Idle);

        session.begin();
        registry.request_reregister_all();
        assert_eq!(os.take_signal(), Some(Signal::ReRegister));

        os.clear_calls();
        assert_eq!(registry.run_deferred_reregister(), SweepOutcome::Rescheduled);
        assert_eq!(registry.run_deferred_reregister(), SweepOutcome::Rescheduled);
        assert!(os.calls().is_empty());
        assert_eq!(os.pending_signals(), vec![Signal::ReRegister; 2]);
        let delays = os.pending_delays();
        assert!(delays[1] > delays[0]);

        session.end();
        registry.on_session_end();

        let mut outcomes = Vec::new();
        while os.take_signal().is_some() {
            outcomes.push(registry.run_deferred_reregister());
        }
        assert_eq!(outcomes.iter().filter(|o| **o == SweepOutcome::Swept).count(), 1);
        assert_eq!(os.count_calls(Call::Revoke(MockWindows::ROOT)), 1);
        assert!(!registry.reregister_pending());
    }

    #[test]
    fn test_stop_revokes_and_clears() {
        let (os, session, mut registry) = registry();
        os.add_child(CHILD_A);
        os.add_child(CHILD_B);
        registry.start(MockWindows::ROOT);
        os.destroy(CHILD_B);

        session.begin();
        registry.register_window(CHILD_C);
        registry.request_reregister_all();
        session.end();
        os.clear_calls();

        registry.stop();

        assert_eq!(os.count_calls(Call::Revoke(MockWindows::ROOT)), 1);
        assert_eq!(os.count_calls(Call::Revoke(CHILD_A)), 1);
        assert_eq!(os.count_calls(Call::Revoke(CHILD_B)), 0);
        assert!(registry.registered().is_empty());
        assert!(registry.pending_adds().is_empty());
        assert!(!registry.reregister_pending());
        assert!(registry.root().is_none());
        assert!(!os.hook_installed());
        assert!(!os.is_accepting_files(MockWindows::ROOT));
    }
}
