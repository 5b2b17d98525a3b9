//! Controller button routing.
//!
//! The VR runtime reports each controller's pressed-button mask every frame
//! and lets us edit the mask the game sees. Edges are diffed per hand and
//! handed to every callback whose mask covers the changed bit. A button a
//! callback consumed on press stays hidden from the game until released.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, trace, warn};

use crate::host::Host;

/// OpenVR button ids.
pub mod buttons {
    pub const SYSTEM: u32 = 0;
    pub const APPLICATION_MENU: u32 = 1;
    pub const GRIP: u32 = 2;
    pub const A: u32 = 7;
    pub const TOUCHPAD: u32 = 32;
    pub const TRIGGER: u32 = 33;

    pub const fn mask(id: u32) -> u64 {
        1u64 << id
    }
}

/// `(is_left, is_released, button_id) -> consumed`.
pub type ButtonCallback = Arc<dyn Fn(bool, bool, u32) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Clone)]
struct Entry {
    id: CallbackId,
    mask: u64,
    callback: ButtonCallback,
}

#[derive(Default)]
struct RouterState {
    callbacks: Vec<Entry>,
    previous: [u64; 2],
    blocked: [u64; 2],
}

pub fn button_name(mask: u64) -> &'static str {
    use buttons::{A, APPLICATION_MENU, GRIP, SYSTEM, TOUCHPAD, TRIGGER};
    if mask & buttons::mask(APPLICATION_MENU) != 0 {
        "ApplicationMenu"
    } else if mask & buttons::mask(GRIP) != 0 {
        "Grip"
    } else if mask & buttons::mask(TOUCHPAD) != 0 {
        "Touchpad"
    } else if mask & buttons::mask(TRIGGER) != 0 {
        "Trigger"
    } else if mask & buttons::mask(A) != 0 {
        "A"
    } else if mask & buttons::mask(SYSTEM) != 0 {
        "System"
    } else {
        "Unknown"
    }
}

fn hand_index(left: bool) -> usize {
    if left {
        0
    } else {
        1
    }
}

pub struct InputRouter {
    host: Arc<dyn Host>,
    state: Mutex<RouterState>,
    next_id: AtomicU64,
    initialized: AtomicBool,
    warned_missing: AtomicBool,
}

impl InputRouter {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            state: Mutex::new(RouterState::default()),
            next_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
            warned_missing: AtomicBool::new(false),
        }
    }

    /// Subscribe to the runtime's controller stream. Without it the engine
    /// keeps running with no button input.
    pub fn initialize(&self) -> bool {
        if self.is_initialized() {
            warn!("input: already initialized");
            return true;
        }
        if !self.host.register_controller_callback() {
            if !self.warned_missing.swap(true, Ordering::AcqRel) {
                warn!("input: controller state stream unavailable, buttons disabled");
            }
            return false;
        }
        self.initialized.store(true, Ordering::Release);
        info!("input: controller state stream registered");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        *self.state.lock() = RouterState::default();
        info!("input: shut down");
    }

    pub fn add_button_callback(
        &self,
        mask: u64,
        callback: impl Fn(bool, bool, u32) -> bool + Send + Sync + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state.lock().callbacks.push(Entry {
            id,
            mask,
            callback: Arc::new(callback),
        });
        info!("input: added callback {} for mask 0x{:X}", id.0, mask);
        id
    }

    pub fn remove_button_callback(&self, id: CallbackId) -> bool {
        let mut state = self.state.lock();
        let before = state.callbacks.len();
        state.callbacks.retain(|e| e.id != id);
        let removed = state.callbacks.len() != before;
        if removed {
            info!("input: removed callback {}", id.0);
        }
        removed
    }

    pub fn callback_count(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    /// Buttons currently hidden from the game for `left`.
    pub fn blocked(&self, left: bool) -> u64 {
        self.state.lock().blocked[hand_index(left)]
    }

    /// Controller-thread entry: `pressed` is the runtime's mask, `output`
    /// the mask the game will see. Returns whether anything is blocked.
    pub fn on_controller_state(&self, left: bool, pressed: u64, output: &mut u64) -> bool {
        let hand = hand_index(left);
        let (previous, callbacks) = {
            let mut state = self.state.lock();
            let previous = std::mem::replace(&mut state.previous[hand], pressed);
            (previous, state.callbacks.clone())
        };
        let newly_pressed = pressed & !previous;
        let newly_released = previous & !pressed;
        let side = if left { "left" } else { "right" };

        if newly_pressed != 0 {
            trace!("input: [{}] pressed {} (0x{:X})", side, button_name(newly_pressed), newly_pressed);
            let consumed = invoke(&callbacks, left, false, newly_pressed);
            self.state.lock().blocked[hand] |= consumed;
        }
        if newly_released != 0 {
            trace!("input: [{}] released {} (0x{:X})", side, button_name(newly_released), newly_released);
            invoke(&callbacks, left, true, newly_released);
            self.state.lock().blocked[hand] &= !newly_released;
        }

        let blocked = self.state.lock().blocked[hand];
        if blocked != 0 {
            trace!("input: [{}] hiding 0x{:X} from the game", side, blocked);
            *output &= !blocked;
        }
        blocked != 0
    }
}

/// Run every callback covering each changed bit. Returns the consumed bits.
fn invoke(callbacks: &[Entry], left: bool, released: bool, changed: u64) -> u64 {
    let mut consumed = 0;
    for button in 0..64u32 {
        let bit = 1u64 << button;
        if changed & bit == 0 {
            continue;
        }
        for entry in callbacks.iter().filter(|e| e.mask & bit != 0) {
            if (entry.callback)(left, released, button) {
                consumed |= bit;
            }
        }
    }
    consumed
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::host::headless::HeadlessHost;

    fn router() -> (Arc<HeadlessHost>, Arc<InputRouter>) {
        let host = Arc::new(HeadlessHost::new());
        let router = Arc::new(InputRouter::new(host.clone()));
        (host, router)
    }

    const TRIGGER: u64 = buttons::mask(buttons::TRIGGER);
    const GRIP: u64 = buttons::mask(buttons::GRIP);

    #[test]
    fn test_edges_reach_matching_callbacks() {
        let (_host, router) = router();
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = Arc::clone(&events);
            router.add_button_callback(TRIGGER, move |left, released, button| {
                events.lock().push((left, released, button));
                false
            });
        }
        let mut out = TRIGGER | GRIP;
        router.on_controller_state(true, TRIGGER | GRIP, &mut out);
        router.on_controller_state(true, TRIGGER | GRIP, &mut out);
        router.on_controller_state(true, 0, &mut out);
        assert_eq!(
            *events.lock(),
            vec![(true, false, buttons::TRIGGER), (true, true, buttons::TRIGGER)]
        );
    }

    #[test]
    fn test_consumed_button_is_blocked_while_held() {
        let (_host, router) = router();
        router.add_button_callback(TRIGGER, |_, released, _| !released);

        let mut out = TRIGGER | GRIP;
        assert!(router.on_controller_state(false, TRIGGER | GRIP, &mut out));
        assert_eq!(out, GRIP);

        let mut out = TRIGGER;
        router.on_controller_state(false, TRIGGER, &mut out);
        assert_eq!(out, 0);
        assert_eq!(router.blocked(false), TRIGGER);
        assert_eq!(router.blocked(true), 0);

        let mut out = 0;
        assert!(!router.on_controller_state(false, 0, &mut out));
        assert_eq!(router.blocked(false), 0);
    }

    #[test]
    fn test_hands_are_tracked_separately() {
        let (_host, router) = router();
        let presses = Arc::new(AtomicUsize::new(0));
        {
            let presses = Arc::clone(&presses);
            router.add_button_callback(TRIGGER, move |_, released, _| {
                if !released {
                    presses.fetch_add(1, Ordering::SeqCst);
                }
                false
            });
        }
        let mut out = 0;
        router.on_controller_state(true, TRIGGER, &mut out);
        router.on_controller_state(false, TRIGGER, &mut out);
        assert_eq!(presses.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_may_register_another() {
        let (_host, router) = router();
        let weak = Arc::downgrade(&router);
        router.add_button_callback(TRIGGER, move |_, _, _| {
            if let Some(router) = weak.upgrade() {
                router.add_button_callback(GRIP, |_, _, _| true);
            }
            false
        });
        let mut out = 0;
        router.on_controller_state(true, TRIGGER, &mut out);
        assert_eq!(router.callback_count(), 2);
    }

    #[test]
    fn test_remove_callback() {
        let (_host, router) = router();
        let id = router.add_button_callback(TRIGGER, |_, _, _| true);
        assert!(router.remove_button_callback(id));
        assert!(!router.remove_button_callback(id));
        let mut out = TRIGGER;
        router.on_controller_state(true, TRIGGER, &mut out);
        assert_eq!(out, TRIGGER);
    }

    #[test]
    fn test_missing_stream_degrades() {
        let (host, router) = router();
        host.set_controller_stream_available(false);
        assert!(!router.initialize());
        assert!(!router.initialize());
        assert!(!router.is_initialized());

        host.set_controller_stream_available(true);
        assert!(router.initialize());
        assert!(router.is_initialized());
    }

    #[test]
    fn test_button_names() {
        assert_eq!(button_name(TRIGGER), "Trigger");
        assert_eq!(button_name(GRIP), "Grip");
        assert_eq!(button_name(0), "Unknown");
    }
}
