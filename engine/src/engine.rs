//! The engine: every process-wide service in one owner.
//!
//! Nodes keep a `Weak<Engine>` and reach the subsystem, the update manager,
//! haptics and the tooltip manager through it. The host calls `on_frame`
//! from its main loop, `on_physics_tick` for each projectile it simulates
//! and `on_controller_state` from the VR runtime's controller thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::driver::GlyphMetrics;
use crate::error::Result;
use crate::haptics::Haptics;
use crate::host::{Host, ProjectilePtr};
use crate::input_router::InputRouter;
use crate::interaction::ControllerRegistry;
use crate::projectile::{ProjectileForms, ProjectileSubsystem};
use crate::texture_loader::TextureLoader;
use crate::tooltip::TooltipManager;
use crate::update_manager::UpdateManager;

pub struct Engine {
    host: Arc<dyn Host>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    glyphs: Arc<GlyphMetrics>,
    subsystem: ProjectileSubsystem,
    update_manager: UpdateManager,
    texture_loader: TextureLoader,
    haptics: Arc<Haptics>,
    tooltips: TooltipManager,
    input: InputRouter,
    controllers: ControllerRegistry,
    workers_started: AtomicBool,
}

impl Engine {
    pub fn new(host: Arc<dyn Host>, clock: Arc<dyn Clock>, config: EngineConfig) -> Arc<Self> {
        Self::with_glyphs(host, clock, config, GlyphMetrics::builtin_ascii())
    }

    /// Engine whose text drivers lay out with `glyphs`, usually loaded from
    /// the atlas mapping file.
    pub fn with_glyphs(
        host: Arc<dyn Host>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        glyphs: GlyphMetrics,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            subsystem: ProjectileSubsystem::new(Arc::clone(&host)),
            update_manager: UpdateManager::new(Arc::clone(&host), Arc::clone(&clock)),
            texture_loader: TextureLoader::new(Arc::clone(&host)),
            haptics: Arc::new(Haptics::new(Arc::clone(&host), Arc::clone(&clock))),
            tooltips: TooltipManager::new(weak.clone()),
            input: InputRouter::new(Arc::clone(&host)),
            controllers: ControllerRegistry::default(),
            glyphs: Arc::new(glyphs),
            workers_started: AtomicBool::new(false),
            host,
            clock,
            config,
        })
    }

    // ── Services ─────────────────────────────────────────────

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn glyphs(&self) -> &Arc<GlyphMetrics> {
        &self.glyphs
    }

    pub fn subsystem(&self) -> &ProjectileSubsystem {
        &self.subsystem
    }

    pub fn update_manager(&self) -> &UpdateManager {
        &self.update_manager
    }

    pub fn texture_loader(&self) -> &TextureLoader {
        &self.texture_loader
    }

    pub fn haptics(&self) -> &Arc<Haptics> {
        &self.haptics
    }

    pub fn tooltips(&self) -> &TooltipManager {
        &self.tooltips
    }

    pub fn input(&self) -> &InputRouter {
        &self.input
    }

    pub fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Set up the subsystem with the host's forms and subscribe to
    /// controller input. A missing controller stream is not an error.
    pub fn initialize(&self, forms: &ProjectileForms) -> Result<()> {
        self.subsystem.initialize(forms)?;
        self.haptics
            .set_globally_disabled(self.config.globally_disable_haptic_feedback);
        if !self.input.initialize() {
            warn!("engine: running without controller input");
        }
        info!(
            "engine: initialized ({} forms, haptics {})",
            forms.projectiles.len(),
            if self.haptics.is_globally_disabled() { "disabled" } else { "enabled" }
        );
        Ok(())
    }

    /// `initialize`, then start the texture loader and haptics workers.
    pub fn start(&self, forms: &ProjectileForms) -> Result<()> {
        self.initialize(forms)?;
        self.texture_loader.start()?;
        self.haptics.start()?;
        self.workers_started.store(true, Ordering::Release);
        info!("engine: started");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.subsystem.is_initialized()
    }

    /// Stop workers, drop every root and release all host projectiles.
    pub fn shutdown(&self) {
        self.tooltips.shutdown();
        self.update_manager.unregister_all();
        if self.workers_started.swap(false, Ordering::AcqRel) {
            self.haptics.shutdown();
        }
        self.texture_loader.shutdown();
        self.input.shutdown();
        if self.subsystem.is_initialized() {
            self.subsystem.shutdown();
        }
        info!("engine: shut down");
    }

    // ── Host entry points ────────────────────────────────────

    /// Main-thread frame hook.
    pub fn on_frame(&self) -> Option<f32> {
        self.update_manager.on_frame(self)
    }

    /// Physics-thread hook, once per host projectile per tick.
    pub fn on_physics_tick(&self, ptr: ProjectilePtr) {
        self.subsystem.on_projectile_update(ptr);
    }

    /// Controller-thread hook. Returns whether any button is hidden from
    /// the game.
    pub fn on_controller_state(&self, left: bool, pressed: u64, output: &mut u64) -> bool {
        self.input.on_controller_state(left, pressed, output)
    }

    /// After the host loads a save: remove projectiles a previous session
    /// left behind.
    pub fn on_game_loaded(&self) -> usize {
        let removed = self.subsystem.cleanup_orphans();
        if removed > 0 {
            info!("engine: removed {} orphaned projectiles", removed);
        }
        removed
    }

    /// Before a level transition.
    pub fn hide_all(&self) -> usize {
        self.update_manager.hide_all(self)
    }

    /// After a level transition.
    pub fn restore_visible(&self) -> usize {
        self.update_manager.restore_visible()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.texture_loader.shutdown();
        self.haptics.shutdown();
    }
}
