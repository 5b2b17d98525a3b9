//! Controlled projectiles: scene-graph leaves rendered by host projectiles.
//!
//! Each leaf binds to at most one host projectile through a pooled form.
//! Binding is asynchronous, so the leaf runs an `Unbound -> Firing -> Bound`
//! state machine with compare-and-swap transitions plus a fire generation:
//! any transition that invalidates a pending fire bumps the generation, and
//! a bind callback carrying an older generation is discarded.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use super::game_projectile::{GameProjectile, DEFAULT_MODEL, ICON_TEMPLATE_MODEL};
use crate::driver::ProjectileDriver;
use crate::engine::Engine;
use crate::host::{CharUv, ProjectilePtr};
use crate::id::Identifier;
use crate::math::{facing_rotation, Mat3, Transform, Vec3};
use crate::node::{InputEvent, InputEventType, Node, NodeBase};
use crate::smoother::{TransformSmoother, TransitionMode, DEFAULT_PROJECTILE_SPEED};

/// Label position relative to its projectile.
pub const DEFAULT_LABEL_OFFSET: Vec3 = Vec3::new(0.0, 0.0, -10.0);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    /// No form held, no host projectile.
    Unbound = 0,
    /// Form held, fire submitted, waiting for the bind callback.
    Firing = 1,
    /// Host projectile bound and driven every tick.
    Bound = 2,
}

impl BindState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Firing,
            2 => Self::Bound,
            _ => Self::Unbound,
        }
    }
}

/// Per-leaf rule overriding local rotation to face the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillboardMode {
    None,
    FacePlayer,
    FaceHmd,
    #[default]
    YawOnly,
}

/// Event callback. Returning true consumes the event.
pub type EventCallback = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    activate_down: Option<EventCallback>,
    activate_up: Option<EventCallback>,
    hover_enter: Option<EventCallback>,
    hover_exit: Option<EventCallback>,
    grab_start: Option<EventCallback>,
    grab_end: Option<EventCallback>,
}

impl Callbacks {
    fn for_kind(&self, kind: InputEventType) -> Option<EventCallback> {
        match kind {
            InputEventType::ActivateDown => self.activate_down.clone(),
            InputEventType::ActivateUp => self.activate_up.clone(),
            InputEventType::HoverEnter => self.hover_enter.clone(),
            InputEventType::HoverExit => self.hover_exit.clone(),
            InputEventType::GrabStart => self.grab_start.clone(),
            InputEventType::GrabEnd => self.grab_end.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Appearance {
    model_path: String,
    texture_path: String,
    char_uv: Option<CharUv>,
    tooltip_text: String,
    border_color: String,
    base_scale: f32,
    scale_correction: f32,
    /// Degrees, `(pitch, roll, yaw)`.
    rotation_correction: Vec3,
    hover_scale: f32,
    billboard: BillboardMode,
    is_anchor_handle: bool,
    close_on_activate: bool,
    use_haptic_feedback: bool,
    activateable: bool,
    hover_threshold_override: Option<f32>,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL.to_string(),
            texture_path: String::new(),
            char_uv: None,
            tooltip_text: String::new(),
            border_color: String::new(),
            base_scale: 1.0,
            scale_correction: 1.0,
            rotation_correction: Vec3::ZERO,
            hover_scale: 1.0,
            billboard: BillboardMode::default(),
            is_anchor_handle: false,
            close_on_activate: false,
            use_haptic_feedback: true,
            activateable: true,
            hover_threshold_override: None,
        }
    }
}

impl Appearance {
    fn effective_model(&self) -> String {
        if self.texture_path.is_empty() {
            self.model_path.clone()
        } else {
            ICON_TEMPLATE_MODEL.to_string()
        }
    }
}

struct Attachments {
    background: Option<Arc<ControlledProjectile>>,
    label: Option<Arc<ProjectileDriver>>,
    label_text: String,
    label_scale: f32,
    label_visible: bool,
    label_offset: Vec3,
}

impl Default for Attachments {
    fn default() -> Self {
        Self {
            background: None,
            label: None,
            label_text: String::new(),
            label_scale: 1.0,
            label_visible: true,
            label_offset: DEFAULT_LABEL_OFFSET,
        }
    }
}

pub struct ControlledProjectile {
    engine: Weak<Engine>,
    this: Weak<ControlledProjectile>,
    base: NodeBase,
    id: AtomicU64,
    initialized: AtomicBool,
    state: AtomicU8,
    generation: AtomicU64,
    form_index: Mutex<Option<usize>>,
    appearance: Mutex<Appearance>,
    callbacks: Mutex<Callbacks>,
    attachments: Mutex<Attachments>,
    smoother: Mutex<TransformSmoother>,
    game: Mutex<GameProjectile>,
}

impl ControlledProjectile {
    /// Create an inert leaf. Nothing is registered or fired until
    /// `initialize`, normally called by the owning driver.
    pub fn new(engine: &Arc<Engine>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            engine: Arc::downgrade(engine),
            this: this.clone(),
            base: NodeBase::new(),
            id: AtomicU64::new(Identifier::INVALID.raw()),
            initialized: AtomicBool::new(false),
            state: AtomicU8::new(BindState::Unbound as u8),
            generation: AtomicU64::new(0),
            form_index: Mutex::new(None),
            appearance: Mutex::new(Appearance::default()),
            callbacks: Mutex::new(Callbacks::default()),
            attachments: Mutex::new(Attachments::default()),
            smoother: Mutex::new(TransformSmoother::new(DEFAULT_PROJECTILE_SPEED)),
            game: Mutex::new(GameProjectile::new(Arc::clone(engine.host()))),
        })
    }

    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    pub fn node(&self) -> Option<Node> {
        self.this.upgrade().map(Node::Projectile)
    }

    pub(crate) fn weak(&self) -> Weak<ControlledProjectile> {
        self.this.clone()
    }

    pub fn identifier(&self) -> Identifier {
        Identifier::from_raw(self.id.load(Ordering::Acquire))
    }

    /// Registered with the subsystem and not yet destroyed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn state(&self) -> BindState {
        BindState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn form_index(&self) -> Option<usize> {
        *self.form_index.lock()
    }

    pub fn game(&self) -> MutexGuard<'_, GameProjectile> {
        self.game.lock()
    }

    fn cas_state(&self, from: BindState, to: BindState) -> Result<(), BindState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(BindState::from_u8)
    }

    fn store_state(&self, state: BindState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn release_form(&self) {
        let index = self.form_index.lock().take();
        if let (Some(index), Some(engine)) = (index, self.engine.upgrade()) {
            engine.subsystem().release_form(index);
        }
    }

    // ── Scene graph ──────────────────────────────────────────

    pub fn world_position(&self) -> Vec3 {
        self.base.world_position_or(|| Vec3::ZERO)
    }

    /// Parent chain rotation with the rotation correction applied on the right.
    pub fn world_rotation(&self) -> Mat3 {
        let rotation = self.base.world_rotation();
        let correction = self.appearance.lock().rotation_correction;
        if correction == Vec3::ZERO {
            rotation
        } else {
            rotation.mul(&Mat3::from_euler_degrees(correction))
        }
    }

    /// `parent * local * base * correction * hover`.
    pub fn world_scale(&self) -> f32 {
        let scale = self.base.world_scale();
        let a = self.appearance.lock();
        scale * a.base_scale * a.scale_correction * a.hover_scale
    }

    pub fn world_transform(&self) -> Transform {
        Transform {
            position: self.world_position(),
            rotation: self.world_rotation(),
            scale: self.world_scale(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Assign an identifier, register, and fire when effectively visible.
    pub fn initialize(&self) {
        if self.is_initialized() {
            return;
        }
        let start = Instant::now();
        let Some(engine) = self.engine.upgrade() else {
            error!("controlled projectile: engine dropped before initialize");
            return;
        };
        let subsystem = engine.subsystem();
        if !subsystem.is_initialized() {
            error!("controlled projectile: initialize before subsystem is available");
            return;
        }

        let id = Identifier::generate();
        self.id.store(id.raw(), Ordering::Release);
        self.initialized.store(true, Ordering::Release);

        let model = {
            let a = self.appearance.lock();
            let mut game = self.game.lock();
            game.set_model_path(&a.model_path);
            game.set_char_uv(a.char_uv);
            if !a.texture_path.is_empty() {
                game.set_texture_path(&a.texture_path);
                game.set_border_color(&a.border_color);
            }
            a.effective_model()
        };

        if let Some(this) = self.this.upgrade() {
            subsystem.register(id, &this);
        }

        let local = self.base.is_visible();
        let effective = self.base.is_effectively_visible();
        if !local || !effective {
            info!(
                "controlled projectile {}: starting hidden (local={} effective={}), skipping fire",
                id, local, effective
            );
            return;
        }

        let Some(index) = subsystem.acquire_form(&model) else {
            error!("controlled projectile {}: no form for '{}'", id, model);
            return;
        };
        *self.form_index.lock() = Some(index);
        trace!("controlled projectile {}: Unbound -> Firing (init)", id);
        self.store_state(BindState::Firing);
        self.bump_generation();

        if let Err(e) = subsystem.fire(self) {
            error!("controlled projectile {}: initial fire failed: {}", id, e);
            self.store_state(BindState::Unbound);
            self.release_form();
        }

        let (background, label, label_visible) = self.attachment_handles();
        if let Some(bg) = background {
            bg.initialize();
        }
        if let (Some(label), true) = (label, label_visible) {
            label.initialize();
        }

        let elapsed = start.elapsed().as_micros();
        if elapsed > 1000 {
            warn!("[PERF] controlled projectile {} initialize took {}us", id, elapsed);
        }
    }

    /// Tear down: background, label, host projectile, form, registration.
    pub fn destroy(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        let id = self.identifier();
        trace!("controlled projectile {}: destroy", id);

        let (background, label) = {
            let mut att = self.attachments.lock();
            (att.background.take(), att.label.take())
        };
        if let Some(bg) = background {
            bg.destroy();
        }
        if let Some(label) = label {
            label.clear();
        }

        {
            let mut game = self.game.lock();
            game.mark_for_deletion();
            game.unbind();
        }
        if self.state.swap(BindState::Unbound as u8, Ordering::AcqRel) != BindState::Unbound as u8 {
            self.bump_generation();
        }
        self.release_form();

        if let Some(engine) = self.engine.upgrade() {
            engine.subsystem().unregister(id);
        }
    }

    /// Frame update on the main thread.
    pub fn update(&self, dt: f32) {
        if !self.is_initialized() {
            return;
        }

        let local = self.base.is_visible();
        if local && self.state() == BindState::Unbound && self.base.is_effectively_visible() {
            trace!("controlled projectile {}: ancestors visible again, rebinding", self.identifier());
            self.rebind_projectile();
        }

        self.update_billboard();
        let target = self.world_transform();

        {
            let mut smoother = self.smoother.lock();
            if self.state() == BindState::Bound
                && smoother.mode() == TransitionMode::Lerp
                && !smoother.is_transitioning()
            {
                smoother.set_current(self.game.lock().target_transform());
            }
            smoother.set_target(target);
            smoother.update(dt);
            if self.state() == BindState::Bound {
                let current = smoother.current();
                let mut game = self.game.lock();
                if game.is_bound() {
                    game.set_transform(current);
                }
            }
        }

        if self.state() == BindState::Bound {
            let mut game = self.game.lock();
            game.apply_pending_texture();
            game.apply_pending_char_uv();
        }

        let (background, label, label_visible) = self.attachment_handles();
        if let Some(bg) = background {
            if !bg.is_initialized() && local && self.base.is_effectively_visible() {
                trace!("controlled projectile {}: deferred background init", self.identifier());
                bg.initialize();
            }
            bg.update(dt);
        }
        if let (Some(label), true) = (label, label_visible) {
            label.update(dt);
        }
    }

    fn attachment_handles(&self) -> (Option<Arc<ControlledProjectile>>, Option<Arc<ProjectileDriver>>, bool) {
        let att = self.attachments.lock();
        (att.background.clone(), att.label.clone(), att.label_visible)
    }

    fn update_billboard(&self) {
        let mode = self.appearance.lock().billboard;
        if mode == BillboardMode::None {
            return;
        }
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let host = engine.host();
        let target = match mode {
            BillboardMode::FacePlayer => host.player_position(),
            BillboardMode::FaceHmd | BillboardMode::YawOnly => host.hmd_position(),
            BillboardMode::None => return,
        };

        let current = self.world_position();
        let desired = if mode == BillboardMode::YawOnly {
            let flat = Vec3::new(target.x, target.y, current.z);
            facing_rotation(current, flat)
        } else {
            facing_rotation(current, target)
        };
        let local = match self.base.parent() {
            Some(parent) => parent.world_rotation().inverse().mul(&desired),
            None => desired,
        };
        self.base.set_local_rotation(local);
    }

    // ── Visibility ───────────────────────────────────────────

    pub fn is_visible(&self) -> bool {
        self.base.is_visible()
    }

    /// Record user intent and bind or unbind to match it.
    pub fn set_visible(&self, visible: bool) {
        if !self.is_initialized() {
            self.base.replace_visible(visible);
            return;
        }
        if self.base.replace_visible(visible) == visible {
            return;
        }
        trace!(
            "controlled projectile {}: set_visible({}) state={:?}",
            self.identifier(),
            visible,
            self.state()
        );

        let (background, label, label_visible) = self.attachment_handles();
        if visible {
            let effective = self.base.is_effectively_visible();
            if effective && self.state() == BindState::Unbound {
                self.rebind_projectile();
            }
            if let Some(bg) = background {
                if !bg.is_initialized() && effective {
                    bg.initialize();
                }
                bg.set_visible(true);
            }
            if let (Some(label), true) = (label, label_visible) {
                if !label.is_initialized() && effective {
                    label.initialize();
                }
                label.set_visible(true);
            }
            return;
        }

        self.unbind_projectile();
        if let Some(bg) = background {
            bg.set_visible(false);
        }
        if let Some(label) = label {
            label.set_visible(false);
        }
    }

    /// An ancestor hid: release resources but keep user intent.
    pub fn on_parent_hide(&self) {
        trace!(
            "controlled projectile {}: parent hide, state={:?}",
            self.identifier(),
            self.state()
        );
        self.unbind_projectile();
        let (background, label, _) = self.attachment_handles();
        if let Some(bg) = background {
            bg.on_parent_hide();
        }
        if let Some(label) = label {
            label.on_parent_hide();
        }
    }

    // ── Bind state machine ───────────────────────────────────

    pub(crate) fn unbind_projectile(&self) {
        if !self.is_initialized() {
            return;
        }
        let id = self.identifier();

        if self.cas_state(BindState::Firing, BindState::Unbound).is_ok() {
            let generation = self.bump_generation();
            self.release_form();
            trace!("controlled projectile {}: Firing -> Unbound, cancelled pending bind (gen={})", id, generation);
            return;
        }

        if self.cas_state(BindState::Bound, BindState::Unbound).is_ok() {
            let generation = self.bump_generation();
            {
                let mut smoother = self.smoother.lock();
                let mut game = self.game.lock();
                if game.is_bound() {
                    smoother.set_current(game.target_transform());
                }
                game.mark_for_deletion();
                game.unbind();
            }
            self.release_form();
            trace!("controlled projectile {}: Bound -> Unbound (gen={})", id, generation);
        }
    }

    fn rebind_projectile(&self) {
        if !self.is_initialized() {
            return;
        }
        let id = self.identifier();
        if let Err(state) = self.cas_state(BindState::Unbound, BindState::Firing) {
            trace!("controlled projectile {}: rebind skipped, state={:?}", id, state);
            return;
        }
        trace!("controlled projectile {}: Unbound -> Firing", id);

        let Some(engine) = self.engine.upgrade() else {
            warn!("controlled projectile {}: rebind without engine", id);
            self.store_state(BindState::Unbound);
            return;
        };
        let subsystem = engine.subsystem();

        let model = self.appearance.lock().effective_model();
        let Some(index) = subsystem.acquire_form(&model) else {
            warn!("controlled projectile {}: rebind found no form for '{}'", id, model);
            self.store_state(BindState::Unbound);
            return;
        };
        *self.form_index.lock() = Some(index);
        let generation = self.bump_generation();

        if let Err(e) = subsystem.fire(self) {
            warn!("controlled projectile {}: rebind fire failed: {}", id, e);
            self.release_form();
            self.store_state(BindState::Unbound);
            return;
        }
        trace!("controlled projectile {}: fire submitted (form={} gen={})", id, index, generation);
    }

    /// Main-thread completion of a fire. Returns whether the projectile was
    /// taken; a rejected one is left for the host to expire.
    pub fn bind_to_projectile(&self, ptr: ProjectilePtr, generation: u64) -> bool {
        let id = self.identifier();
        if let Err(state) = self.cas_state(BindState::Firing, BindState::Bound) {
            debug!(
                "controlled projectile {}: stale fire, bind of {} (gen={}) ignored in state {:?}",
                id, ptr, generation, state
            );
            return false;
        }

        let current = self.generation();
        if generation != current {
            debug!(
                "controlled projectile {}: stale fire, bind of {} gen={} but current={}, reverting to Unbound",
                id, ptr, generation, current
            );
            self.store_state(BindState::Unbound);
            self.bump_generation();
            self.release_form();
            return false;
        }

        let target = {
            let mut smoother = self.smoother.lock();
            let target = smoother.target();
            smoother.set_current(target);
            target
        };
        let mut game = self.game.lock();
        game.bind(ptr);
        game.set_visible(true);
        game.set_transform(target);
        game.apply_transform();
        trace!("controlled projectile {}: Firing -> Bound to {} (gen={})", id, ptr, generation);
        true
    }

    /// Seed both ends of the smoother, used right before a fire.
    pub(crate) fn seed_transform(&self, transform: Transform) {
        let mut smoother = self.smoother.lock();
        smoother.set_current(transform);
        smoother.set_target(transform);
    }

    // ── Events ───────────────────────────────────────────────

    pub fn on_event(&self, event: &mut InputEvent) -> bool {
        {
            let a = self.appearance.lock();
            if !a.use_haptic_feedback || !a.activateable {
                event.send_haptic_pulse = false;
            }
        }
        let callback = self.callbacks.lock().for_kind(event.kind);
        callback.is_some_and(|cb| cb())
    }

    pub fn set_on_activate_down(&self, cb: impl Fn() -> bool + Send + Sync + 'static) {
        self.callbacks.lock().activate_down = Some(Arc::new(cb));
    }

    pub fn set_on_activate_up(&self, cb: impl Fn() -> bool + Send + Sync + 'static) {
        self.callbacks.lock().activate_up = Some(Arc::new(cb));
    }

    pub fn set_on_hover_enter(&self, cb: impl Fn() -> bool + Send + Sync + 'static) {
        self.callbacks.lock().hover_enter = Some(Arc::new(cb));
    }

    pub fn set_on_hover_exit(&self, cb: impl Fn() -> bool + Send + Sync + 'static) {
        self.callbacks.lock().hover_exit = Some(Arc::new(cb));
    }

    pub fn set_on_grab_start(&self, cb: impl Fn() -> bool + Send + Sync + 'static) {
        self.callbacks.lock().grab_start = Some(Arc::new(cb));
    }

    pub fn set_on_grab_end(&self, cb: impl Fn() -> bool + Send + Sync + 'static) {
        self.callbacks.lock().grab_end = Some(Arc::new(cb));
    }

    // ── Transform ────────────────────────────────────────────

    /// Smoothed transform as last sent to the host.
    pub fn transform(&self) -> Transform {
        self.smoother.lock().current()
    }

    /// Retarget directly, bypassing the scene graph until the next update.
    pub fn set_transform(&self, transform: Transform) {
        if !self.is_initialized() {
            return;
        }
        let mut smoother = self.smoother.lock();
        if smoother.mode() == TransitionMode::Lerp && !smoother.is_transitioning() {
            smoother.set_current(self.game.lock().target_transform());
        }
        smoother.set_target(transform);
        if smoother.mode() == TransitionMode::Instant {
            let current = smoother.current();
            self.game.lock().set_transform(current);
        }
    }

    /// Euler `(pitch, roll, yaw)` radians of the current transform.
    pub fn rotation(&self) -> Vec3 {
        self.transform().rotation.to_euler()
    }

    pub fn set_rotation(&self, euler: Vec3) {
        if !self.is_initialized() {
            return;
        }
        let mut transform = self.smoother.lock().target();
        transform.rotation = Mat3::from_euler(euler);
        self.set_transform(transform);
    }

    pub fn set_transition_mode(&self, mode: TransitionMode) {
        self.smoother.lock().set_mode(mode);
    }

    pub fn transition_mode(&self) -> TransitionMode {
        self.smoother.lock().mode()
    }

    pub fn set_smoothing_speed(&self, speed: f32) {
        self.smoother.lock().set_speed(speed);
    }

    pub fn smoothing_speed(&self) -> f32 {
        self.smoother.lock().speed()
    }

    // ── Appearance and behaviour ─────────────────────────────

    pub fn set_model_path(&self, path: &str) {
        self.appearance.lock().model_path = path.to_string();
        self.game.lock().set_model_path(path);
    }

    pub fn model_path(&self) -> String {
        self.appearance.lock().model_path.clone()
    }

    pub fn set_texture_path(&self, path: &str) {
        self.appearance.lock().texture_path = path.to_string();
        if self.is_initialized() {
            self.game.lock().set_texture_path(path);
        }
    }

    pub fn texture_path(&self) -> String {
        self.appearance.lock().texture_path.clone()
    }

    /// Show one cell of the model's texture atlas instead of the whole map.
    pub fn set_char_uv(&self, uv: Option<CharUv>) {
        self.appearance.lock().char_uv = uv;
        if self.is_initialized() {
            self.game.lock().set_char_uv(uv);
        }
    }

    pub fn char_uv(&self) -> Option<CharUv> {
        self.appearance.lock().char_uv
    }

    /// Text shown on the wrist while a hand hovers this element.
    pub fn set_tooltip_text(&self, text: &str) {
        self.appearance.lock().tooltip_text = text.to_string();
    }

    pub fn tooltip_text(&self) -> String {
        self.appearance.lock().tooltip_text.clone()
    }

    pub fn set_border_color(&self, color: &str) {
        self.appearance.lock().border_color = color.to_string();
        self.game.lock().set_border_color(color);
    }

    pub fn border_color(&self) -> String {
        self.appearance.lock().border_color.clone()
    }

    pub fn set_base_scale(&self, scale: f32) {
        self.appearance.lock().base_scale = scale;
    }

    pub fn base_scale(&self) -> f32 {
        self.appearance.lock().base_scale
    }

    pub fn set_scale_correction(&self, correction: f32) {
        self.appearance.lock().scale_correction = correction;
    }

    /// Model-space correction in degrees, `(pitch, roll, yaw)`.
    pub fn set_rotation_correction(&self, degrees: Vec3) {
        self.appearance.lock().rotation_correction = degrees;
    }

    pub fn set_hover_scale(&self, scale: f32) {
        self.appearance.lock().hover_scale = scale;
    }

    pub fn hover_scale(&self) -> f32 {
        self.appearance.lock().hover_scale
    }

    pub fn set_billboard_mode(&self, mode: BillboardMode) {
        self.appearance.lock().billboard = mode;
    }

    pub fn billboard_mode(&self) -> BillboardMode {
        self.appearance.lock().billboard
    }

    pub fn set_is_anchor_handle(&self, anchor: bool) {
        self.appearance.lock().is_anchor_handle = anchor;
    }

    pub fn is_anchor_handle(&self) -> bool {
        self.appearance.lock().is_anchor_handle
    }

    pub fn set_close_on_activate(&self, close: bool) {
        self.appearance.lock().close_on_activate = close;
    }

    pub fn close_on_activate(&self) -> bool {
        self.appearance.lock().close_on_activate
    }

    pub fn set_use_haptic_feedback(&self, enabled: bool) {
        self.appearance.lock().use_haptic_feedback = enabled;
    }

    pub fn use_haptic_feedback(&self) -> bool {
        self.appearance.lock().use_haptic_feedback
    }

    /// Non-activateable elements get no haptics and no hover scaling.
    pub fn set_activateable(&self, activateable: bool) {
        self.appearance.lock().activateable = activateable;
    }

    pub fn is_activateable(&self) -> bool {
        self.appearance.lock().activateable
    }

    /// Values `<= 0` restore the controller default.
    pub fn set_hover_threshold_override(&self, threshold: f32) {
        self.appearance.lock().hover_threshold_override = (threshold > 0.0).then_some(threshold);
    }

    pub fn hover_threshold_override(&self) -> Option<f32> {
        self.appearance.lock().hover_threshold_override
    }

    // ── Background ───────────────────────────────────────────

    /// An empty path removes the background.
    pub fn set_background_model_path(&self, path: &str) {
        if path.is_empty() {
            self.clear_background();
            return;
        }
        let background = self.ensure_background();
        let Some(background) = background else {
            return;
        };
        background.set_model_path(path);
        if self.is_initialized() && self.base.is_visible() && self.base.is_effectively_visible() {
            background.initialize();
        }
    }

    fn ensure_background(&self) -> Option<Arc<ControlledProjectile>> {
        let mut att = self.attachments.lock();
        if let Some(bg) = &att.background {
            return Some(Arc::clone(bg));
        }
        let engine = self.engine.upgrade()?;
        let background = ControlledProjectile::new(&engine);
        background.base.set_parent(self.node().as_ref());
        background.set_activateable(false);
        background.set_use_haptic_feedback(false);
        background.base.set_local_position(Vec3::ZERO);
        att.background = Some(Arc::clone(&background));
        Some(background)
    }

    pub fn set_background_scale(&self, scale: f32) {
        if let Some(bg) = self.background() {
            bg.set_base_scale(scale);
        }
    }

    pub fn background(&self) -> Option<Arc<ControlledProjectile>> {
        self.attachments.lock().background.clone()
    }

    pub fn clear_background(&self) {
        let background = self.attachments.lock().background.take();
        if let Some(bg) = background {
            bg.set_visible(false);
            bg.destroy();
        }
    }

    // ── Label ────────────────────────────────────────────────

    /// An empty string removes the label.
    pub fn set_label_text(&self, text: &str) {
        if text.is_empty() {
            self.clear_label_text();
            return;
        }
        self.attachments.lock().label_text = text.to_string();
        let Some(label) = self.ensure_label() else {
            return;
        };
        label.set_text(text);
        let label_visible = self.attachments.lock().label_visible;
        if self.is_initialized() && self.base.is_visible() && label_visible && self.base.is_effectively_visible() {
            label.initialize();
            label.set_visible(true);
        }
    }

    fn ensure_label(&self) -> Option<Arc<ProjectileDriver>> {
        let mut att = self.attachments.lock();
        if let Some(label) = &att.label {
            return Some(Arc::clone(label));
        }
        let engine = self.engine.upgrade()?;
        let label = ProjectileDriver::text(&engine);
        label.base().set_parent(self.node().as_ref());
        label.base().set_local_position(att.label_offset);
        label.set_text_scale(att.label_scale);
        info!("controlled projectile {}: created label driver", self.identifier());
        att.label = Some(Arc::clone(&label));
        Some(label)
    }

    pub fn label_text(&self) -> String {
        self.attachments.lock().label_text.clone()
    }

    pub fn label(&self) -> Option<Arc<ProjectileDriver>> {
        self.attachments.lock().label.clone()
    }

    pub fn set_label_text_scale(&self, scale: f32) {
        let label = {
            let mut att = self.attachments.lock();
            att.label_scale = scale;
            att.label.clone()
        };
        if let Some(label) = label {
            label.set_text_scale(scale);
        }
    }

    pub fn set_label_text_visible(&self, visible: bool) {
        let label = {
            let mut att = self.attachments.lock();
            if att.label_visible == visible {
                return;
            }
            att.label_visible = visible;
            att.label.clone()
        };
        let Some(label) = label else {
            return;
        };
        if !visible {
            label.set_visible(false);
        } else if self.base.is_visible() && self.base.is_effectively_visible() {
            label.set_visible(true);
        }
    }

    pub fn is_label_text_visible(&self) -> bool {
        self.attachments.lock().label_visible
    }

    pub fn set_label_offset(&self, offset: Vec3) {
        let label = {
            let mut att = self.attachments.lock();
            att.label_offset = offset;
            att.label.clone()
        };
        if let Some(label) = label {
            label.base().set_local_position(offset);
        }
    }

    pub fn clear_label_text(&self) {
        let label = {
            let mut att = self.attachments.lock();
            att.label_text.clear();
            att.label.take()
        };
        if let Some(label) = label {
            label.set_visible(false);
            label.clear();
        }
    }
}

impl Drop for ControlledProjectile {
    fn drop(&mut self) {
        self.destroy();
    }
}
