//! Deterministic engine loop over the headless host.
//!
//! One `frame` plays the host's side of a render frame: the clock moves,
//! the frame hook runs, every live projectile gets its physics tick and
//! the main-thread task queue drains. The demo binary and the tests drive
//! the engine through it.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::clock::TestClock;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::host::headless::HeadlessHost;
use crate::host::FormId;
use crate::projectile::ProjectileForms;

/// First projectile form id; ammo forms start at `AMMO_FORM_BASE`.
pub const PROJECTILE_FORM_BASE: u32 = 0x800;
pub const AMMO_FORM_BASE: u32 = 0x900;
pub const WEAPON_FORM: FormId = FormId(0x700);

/// Upper bound on waiting for the texture worker each frame.
const TEXTURE_WAIT: Duration = Duration::from_secs(2);

/// `pool_size` projectile and ammo forms.
pub fn headless_forms(pool_size: usize) -> ProjectileForms {
    let pool_size = pool_size as u32;
    ProjectileForms {
        weapon: WEAPON_FORM,
        projectiles: (0..pool_size).map(|i| FormId(PROJECTILE_FORM_BASE + i)).collect(),
        ammo: (0..pool_size).map(|i| FormId(AMMO_FORM_BASE + i)).collect(),
    }
}

pub struct Simulation {
    pub host: Arc<HeadlessHost>,
    pub clock: Arc<TestClock>,
    pub engine: Arc<Engine>,
}

impl Simulation {
    /// Engine with `pool_size` forms and a running texture loader.
    /// Haptics workers stay stopped; use `tick_haptics`.
    pub fn new(pool_size: usize) -> Self {
        Self::with_host(Arc::new(HeadlessHost::new()), pool_size)
    }

    pub fn with_host(host: Arc<HeadlessHost>, pool_size: usize) -> Self {
        let clock = Arc::new(TestClock::new());
        let engine = Engine::new(host.clone(), clock.clone(), EngineConfig::default());
        let sim = Self { host, clock, engine };
        if let Err(e) = sim.boot(pool_size) {
            error!("sim: engine failed to start: {}", e);
        }
        sim
    }

    /// Like `with_host` with an explicit config, surfacing start errors.
    pub fn start(host: Arc<HeadlessHost>, pool_size: usize, config: EngineConfig) -> Result<Self> {
        let clock = Arc::new(TestClock::new());
        let engine = Engine::new(host.clone(), clock.clone(), config);
        let sim = Self { host, clock, engine };
        sim.boot(pool_size)?;
        Ok(sim)
    }

    fn boot(&self, pool_size: usize) -> Result<()> {
        self.engine.initialize(&headless_forms(pool_size))?;
        self.engine.texture_loader().start()
    }

    /// One render frame of `dt` seconds.
    pub fn frame(&self, dt: f32) {
        self.clock.advance_secs(dt);
        self.engine.texture_loader().wait_idle(TEXTURE_WAIT);
        self.engine.on_frame();
        self.physics_tick();
        self.host.run_main_tasks();
    }

    /// Run `count` frames of `dt`.
    pub fn frames(&self, count: usize, dt: f32) {
        for _ in 0..count {
            self.frame(dt);
        }
    }

    /// Physics hook for every projectile the host currently simulates.
    pub fn physics_tick(&self) {
        for ptr in self.host.projectile_ptrs() {
            self.engine.on_physics_tick(ptr);
        }
    }

    /// One haptics step per hand, as the workers would do.
    pub fn tick_haptics(&self) {
        for left in [true, false] {
            self.engine.haptics().tick_hand(left);
        }
    }
}
