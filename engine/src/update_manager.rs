//! Per-frame driving of every registered root driver.
//!
//! Root drivers register on initialize. The first registration installs the
//! host's frame and physics hooks; they stay installed for the life of the
//! process. Each frame drains finished texture loads, updates the roots and
//! their interaction controllers, then moves the tooltips.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::driver::ProjectileDriver;
use crate::engine::Engine;
use crate::host::Host;
use crate::interaction::InteractionController;

/// Delta used for the first frame and after a long gap.
pub const FALLBACK_DT: f32 = 1.0 / 60.0;
pub const MAX_DT: f32 = 0.1;
/// Frame updates slower than this are logged.
pub const SLOW_UPDATE: Duration = Duration::from_millis(100);
/// Gaps between frames longer than this are logged and use `FALLBACK_DT`.
pub const LONG_GAP: Duration = Duration::from_secs(2);

pub struct UpdateManager {
    host: Arc<dyn Host>,
    clock: Arc<dyn Clock>,
    drivers: Mutex<Vec<Weak<ProjectileDriver>>>,
    count: AtomicUsize,
    hooks_installed: AtomicBool,
    last_frame: Mutex<Option<Instant>>,
    hidden: Mutex<Vec<Weak<ProjectileDriver>>>,
    frames: AtomicU64,
}

impl UpdateManager {
    pub fn new(host: Arc<dyn Host>, clock: Arc<dyn Clock>) -> Self {
        Self {
            host,
            clock,
            drivers: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            hooks_installed: AtomicBool::new(false),
            last_frame: Mutex::new(None),
            hidden: Mutex::new(Vec::new()),
            frames: AtomicU64::new(0),
        }
    }

    // ── Registry ─────────────────────────────────────────────

    pub fn register(&self, driver: &Arc<ProjectileDriver>) {
        if !self.hooks_installed.swap(true, Ordering::AcqRel) {
            if self.host.install_frame_hooks() {
                info!("update manager: frame hooks installed");
            } else {
                warn!("update manager: host refused frame hooks");
            }
        }
        let mut drivers = self.drivers.lock();
        if drivers.iter().any(|d| d.as_ptr() == Arc::as_ptr(driver)) {
            trace!("update manager: '{}' already registered", driver.base().id());
            return;
        }
        drivers.push(Arc::downgrade(driver));
        self.count.store(drivers.len(), Ordering::Release);
        debug!(
            "update manager: registered '{}' ({} total)",
            driver.base().id(),
            drivers.len()
        );
    }

    pub fn unregister(&self, driver: &Arc<ProjectileDriver>) -> bool {
        let mut drivers = self.drivers.lock();
        let before = drivers.len();
        drivers.retain(|d| d.as_ptr() != Arc::as_ptr(driver));
        self.count.store(drivers.len(), Ordering::Release);
        drivers.len() != before
    }

    pub fn unregister_all(&self) {
        self.drivers.lock().clear();
        self.hidden.lock().clear();
        self.count.store(0, Ordering::Release);
        debug!("update manager: all drivers unregistered");
    }

    /// Live registered roots. Dropped drivers are pruned.
    pub fn registered(&self) -> Vec<Arc<ProjectileDriver>> {
        let mut drivers = self.drivers.lock();
        drivers.retain(|d| d.strong_count() > 0);
        self.count.store(drivers.len(), Ordering::Release);
        drivers.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn registered_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_registered(&self, driver: &Arc<ProjectileDriver>) -> bool {
        self.drivers.lock().iter().any(|d| d.as_ptr() == Arc::as_ptr(driver))
    }

    pub fn hooks_installed(&self) -> bool {
        self.hooks_installed.load(Ordering::Acquire)
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    // ── Frame ────────────────────────────────────────────────

    /// Seconds since the previous frame, clamped to `(0, MAX_DT]`.
    pub fn next_delta(&self) -> f32 {
        let now = self.clock.now();
        let previous = self.last_frame.lock().replace(now);
        let dt = match previous {
            None => FALLBACK_DT,
            Some(previous) => {
                let gap = now.saturating_duration_since(previous);
                if gap >= LONG_GAP {
                    warn!("watchdog: {:.2}s since the last frame, using fallback dt", gap.as_secs_f32());
                    FALLBACK_DT
                } else {
                    gap.as_secs_f32()
                }
            }
        };
        if !dt.is_finite() || dt <= 0.0 {
            FALLBACK_DT
        } else {
            dt.min(MAX_DT)
        }
    }

    /// Main-thread frame hook. Returns the delta used, or `None` when
    /// nothing is registered.
    pub fn on_frame(&self, engine: &Engine) -> Option<f32> {
        if self.registered_count() == 0 {
            *self.last_frame.lock() = None;
            return None;
        }
        let started = Instant::now();
        let dt = self.next_delta();
        self.frames.fetch_add(1, Ordering::Relaxed);

        let loaded = engine.texture_loader().process_completed_loads();
        if loaded > 0 {
            trace!("update manager: {} texture loads completed", loaded);
        }

        let drivers = self.registered();
        for driver in &drivers {
            driver.update(dt);
        }

        if self.host.is_game_stopped() {
            trace!("update manager: game stopped, skipping interaction");
        } else {
            for controller in controllers_of(&drivers) {
                controller.update(dt);
            }
        }

        engine.tooltips().update(dt);

        let elapsed = started.elapsed();
        if elapsed >= SLOW_UPDATE {
            warn!(
                "watchdog: frame update took {:.1}ms for {} drivers",
                elapsed.as_secs_f64() * 1000.0,
                drivers.len()
            );
        }
        Some(dt)
    }

    // ── Level transitions ────────────────────────────────────

    /// Hide every visible root, remembering which ones for
    /// `restore_visible`. Tooltips are hidden first.
    pub fn hide_all(&self, engine: &Engine) -> usize {
        engine.tooltips().hide_all();
        let visible: Vec<Arc<ProjectileDriver>> =
            self.registered().into_iter().filter(|d| d.is_visible()).collect();
        *self.hidden.lock() = visible.iter().map(Arc::downgrade).collect();
        for driver in &visible {
            driver.set_visible(false);
        }
        info!("update manager: hid {} drivers", visible.len());
        visible.len()
    }

    /// Show again the roots `hide_all` hid that are still registered.
    pub fn restore_visible(&self) -> usize {
        let hidden = std::mem::take(&mut *self.hidden.lock());
        let mut restored = 0;
        for driver in hidden.iter().filter_map(Weak::upgrade) {
            if self.is_registered(&driver) {
                driver.set_visible(true);
                restored += 1;
            }
        }
        info!("update manager: restored {} drivers", restored);
        restored
    }
}

/// Distinct controllers attached to `drivers`.
fn controllers_of(drivers: &[Arc<ProjectileDriver>]) -> Vec<Arc<InteractionController>> {
    let mut controllers: Vec<Arc<InteractionController>> = Vec::new();
    for driver in drivers {
        if let Some(controller) = driver.interaction_controller() {
            if !controllers.iter().any(|c| Arc::ptr_eq(c, &controller)) {
                controllers.push(controller);
            }
        }
    }
    controllers
}
