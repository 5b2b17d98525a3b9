//! Controller haptics.
//!
//! Each hand has a FIFO of timed pulses. A worker thread per hand plays the
//! front pulse every `PULSE_INTERVAL` (the runtime ignores pulses closer
//! together than that), interpolating ramped pulses over their duration.
//! A newer pulse waits for the older ones to finish.

pub mod pulses;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, trace, warn};

pub use pulses::{ease, pulse_for_event, HapticPulse};

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::host::Host;
use crate::node::InputEvent;

/// Minimum spacing between two pulses on one controller.
pub const PULSE_INTERVAL: Duration = Duration::from_millis(5);

/// A queued pulse, strengths already clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticEvent {
    pub start_strength: f32,
    pub end_strength: f32,
    pub duration: f32,
    pub ease_in: bool,
    pub ease_out: bool,
}

impl HapticEvent {
    pub fn from_pulse(pulse: &HapticPulse) -> Self {
        let (start, end, duration, ease_in, ease_out) = match *pulse {
            HapticPulse::Simple { strength, duration } => (strength, strength, duration, false, false),
            HapticPulse::Ramped {
                start,
                end,
                duration,
                ease_in,
                ease_out,
            } => (start, end, duration, ease_in, ease_out),
        };
        Self {
            start_strength: start.clamp(0.0, 1.0),
            end_strength: end.clamp(0.0, 1.0),
            duration,
            ease_in,
            ease_out,
        }
    }

    /// Strength `elapsed` seconds after the pulse started.
    pub fn strength_at(&self, elapsed: f32) -> f32 {
        let t = if self.duration <= 0.0 {
            1.0
        } else {
            (elapsed / self.duration).clamp(0.0, 1.0)
        };
        let t = ease(t, self.ease_in, self.ease_out);
        self.start_strength + (self.end_strength - self.start_strength) * t
    }
}

#[derive(Debug, Default)]
struct HandQueue {
    events: VecDeque<HapticEvent>,
    front_started: Option<Instant>,
}

impl HandQueue {
    /// Strength to play now, retiring the front pulse once it has run its
    /// full duration.
    fn step(&mut self, now: Instant) -> Option<f32> {
        let front = *self.events.front()?;
        let started = *self.front_started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started).as_secs_f32();
        let strength = front.strength_at(elapsed);
        if elapsed >= front.duration {
            self.events.pop_front();
            self.front_started = None;
        }
        Some(strength)
    }
}

fn hand_name(left: bool) -> &'static str {
    if left {
        "left"
    } else {
        "right"
    }
}

pub struct Haptics {
    host: Arc<dyn Host>,
    clock: Arc<dyn Clock>,
    queues: [Mutex<HandQueue>; 2],
    disabled: AtomicBool,
    running: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Haptics {
    pub fn new(host: Arc<dyn Host>, clock: Arc<dyn Clock>) -> Self {
        Self {
            host,
            clock,
            queues: [Mutex::new(HandQueue::default()), Mutex::new(HandQueue::default())],
            disabled: AtomicBool::new(false),
            running: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn queue(&self, left: bool) -> &Mutex<HandQueue> {
        &self.queues[if left { 0 } else { 1 }]
    }

    /// Globally enable or disable feedback. Disabling drops queued pulses.
    pub fn set_globally_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
        if disabled {
            for queue in &self.queues {
                let mut queue = queue.lock();
                queue.events.clear();
                queue.front_started = None;
            }
        }
    }

    pub fn is_globally_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Spawn one worker per hand. Workers stop on `shutdown` or when the
    /// manager is dropped.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("haptics: already running");
            return Ok(());
        }
        let mut workers = self.workers.lock();
        for left in [true, false] {
            let weak = Arc::downgrade(self);
            let handle = thread::Builder::new()
                .name(format!("haptics-{}", hand_name(left)))
                .spawn(move || worker_loop(weak, left))
                .map_err(|e| EngineError::Host(format!("haptics thread spawn: {e}")))?;
            workers.push(handle);
        }
        info!("haptics: started worker threads");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                warn!("haptics: worker panicked");
            }
        }
        for queue in &self.queues {
            queue.lock().events.clear();
        }
        info!("haptics: shut down");
    }

    pub fn queue_pulse(&self, left: bool, pulse: &HapticPulse) {
        if self.is_globally_disabled() {
            return;
        }
        if !pulse.is_valid() {
            trace!("haptics: dropping invalid pulse {:?}", pulse);
            return;
        }
        self.queue(left).lock().events.push_back(HapticEvent::from_pulse(pulse));
    }

    /// Queue the pulse for `event` on its hand unless an element on the
    /// bubbling path opted out.
    pub fn trigger_for_event(&self, event: &InputEvent) {
        if !event.send_haptic_pulse {
            trace!("haptics: {} has haptics disabled", event.kind.as_str());
            return;
        }
        let pulse = pulse_for_event(event.kind);
        trace!(
            "haptics: {} -> {:?} ({} hand)",
            event.kind.as_str(),
            pulse,
            hand_name(event.is_left_hand)
        );
        self.queue_pulse(event.is_left_hand, &pulse);
    }

    pub fn pending(&self, left: bool) -> usize {
        self.queue(left).lock().events.len()
    }

    /// Play one step for `left`. Worker threads call this every interval.
    pub fn tick_hand(&self, left: bool) -> Option<f32> {
        let now = self.clock.now();
        let strength = self.queue(left).lock().step(now)?;
        if strength > 0.0 {
            self.host.trigger_haptic(left, strength);
        }
        Some(strength)
    }
}

impl Drop for Haptics {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

fn worker_loop(haptics: Weak<Haptics>, left: bool) {
    loop {
        {
            let Some(haptics) = haptics.upgrade() else {
                return;
            };
            if !haptics.is_running() {
                return;
            }
            haptics.tick_hand(left);
        }
        thread::sleep(PULSE_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::host::headless::HeadlessHost;
    use crate::node::InputEventType;

    fn haptics() -> (Arc<HeadlessHost>, Arc<TestClock>, Haptics) {
        let host = Arc::new(HeadlessHost::new());
        let clock = Arc::new(TestClock::new());
        let haptics = Haptics::new(host.clone(), clock.clone());
        (host, clock, haptics)
    }

    #[test]
    fn test_ramp_interpolates() {
        let event = HapticEvent::from_pulse(&HapticPulse::ramped(0.2, 0.6, 0.1, false, false));
        assert!((event.strength_at(0.0) - 0.2).abs() < 1e-4);
        assert!((event.strength_at(0.05) - 0.4).abs() < 1e-4);
        assert!((event.strength_at(1.0) - 0.6).abs() < 1e-4);
    }

    #[test]
    fn test_strengths_are_clamped() {
        let event = HapticEvent::from_pulse(&HapticPulse::ramped(-1.0, 3.0, 0.1, false, false));
        assert_eq!(event.start_strength, 0.0);
        assert_eq!(event.end_strength, 1.0);
    }

    #[test]
    fn test_pulses_play_in_arrival_order() {
        let (host, clock, haptics) = haptics();
        haptics.queue_pulse(true, &HapticPulse::simple(0.3, 0.01));
        haptics.queue_pulse(true, &HapticPulse::simple(0.9, 0.01));

        assert_eq!(haptics.tick_hand(true), Some(0.3));
        clock.advance_secs(0.011);
        assert_eq!(haptics.tick_hand(true), Some(0.3));
        assert_eq!(haptics.tick_hand(true), Some(0.9));
        clock.advance_secs(0.011);
        haptics.tick_hand(true);
        assert_eq!(haptics.tick_hand(true), None);

        let pulses = host.haptic_pulses();
        assert_eq!(pulses.first(), Some(&(true, 0.3)));
        assert!(pulses.iter().all(|(left, _)| *left));
    }

    #[test]
    fn test_hands_are_independent() {
        let (_host, _clock, haptics) = haptics();
        haptics.queue_pulse(false, &HapticPulse::simple(0.5, 0.02));
        assert_eq!(haptics.pending(true), 0);
        assert_eq!(haptics.pending(false), 1);
        assert_eq!(haptics.tick_hand(true), None);
    }

    #[test]
    fn test_cleared_flag_suppresses_event_pulse() {
        let (_host, _clock, haptics) = haptics();
        let mut event = InputEvent::new(InputEventType::HoverEnter, None, None, true);
        event.send_haptic_pulse = false;
        haptics.trigger_for_event(&event);
        assert_eq!(haptics.pending(true), 0);

        event.send_haptic_pulse = true;
        haptics.trigger_for_event(&event);
        assert_eq!(haptics.pending(true), 1);
    }

    #[test]
    fn test_global_disable_drops_pulses() {
        let (_host, _clock, haptics) = haptics();
        haptics.queue_pulse(true, &HapticPulse::simple(0.5, 0.02));
        haptics.set_globally_disabled(true);
        assert_eq!(haptics.pending(true), 0);
        haptics.queue_pulse(true, &HapticPulse::simple(0.5, 0.02));
        assert_eq!(haptics.pending(true), 0);
    }

    #[test]
    fn test_workers_start_and_stop() {
        let host = Arc::new(HeadlessHost::new());
        let haptics = Arc::new(Haptics::new(host, Arc::new(crate::clock::SystemClock)));
        haptics.start().unwrap();
        assert!(haptics.is_running());
        haptics.shutdown();
        assert!(!haptics.is_running());
    }
}
