//! Hand-proximity interaction for one root driver.
//!
//! Every frame each tracked hand hovers the closest visible leaf within its
//! threshold. Hover changes are debounced and held with a small exit
//! hysteresis so a hand resting between two elements does not flicker.
//! Button edges from the input router turn into activate and grab events
//! on the hovered leaf.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::driver::ProjectileDriver;
use crate::engine::Engine;
use crate::input_router::CallbackId;
use crate::math::Vec3;
use crate::node::{InputEvent, InputEventType, Node};
use crate::projectile::ControlledProjectile;

/// Seconds a new candidate must stay closest before it takes the hover.
pub const HOVER_DEBOUNCE: f32 = 0.05;
/// Exit threshold as a multiple of the enter threshold.
pub const HOVER_EXIT_FACTOR: f32 = 1.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandTrackingMode {
    #[default]
    AnyHand,
    LeftHand,
    RightHand,
}

impl HandTrackingMode {
    fn tracks(self, left: bool) -> bool {
        match self {
            Self::AnyHand => true,
            Self::LeftHand => left,
            Self::RightHand => !left,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InteractionConfig {
    pub hover_threshold: f32,
    pub hover_scale: f32,
    pub hover_transition_speed: f32,
    pub tracking: HandTrackingMode,
    pub display_tooltip: bool,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            hover_threshold: 10.0,
            hover_scale: 1.2,
            hover_transition_speed: 100.0,
            tracking: HandTrackingMode::AnyHand,
            display_tooltip: true,
        }
    }
}

/// Invoked after an element with close-on-activate is activated.
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct HandState {
    hovered: Weak<ControlledProjectile>,
    previous_hovered: Weak<ControlledProjectile>,
    grabbed: Weak<ControlledProjectile>,
    activated: Weak<ControlledProjectile>,
    pending: Weak<ControlledProjectile>,
    pending_timer: f32,
    is_grabbing: bool,
}

impl HandState {
    fn clear(&mut self) {
        *self = Self::default();
    }

    fn clear_pending(&mut self) {
        self.pending = Weak::new();
        self.pending_timer = 0.0;
    }
}

fn hand_index(left: bool) -> usize {
    if left {
        0
    } else {
        1
    }
}

fn hand_name(left: bool) -> &'static str {
    if left {
        "left"
    } else {
        "right"
    }
}

fn same(a: Option<&Arc<ControlledProjectile>>, b: Option<&Arc<ControlledProjectile>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn describe(p: Option<&Arc<ControlledProjectile>>) -> String {
    p.map(|p| format!("'{}' [{}]", p.base().id(), p.identifier()))
        .unwrap_or_else(|| "(none)".to_string())
}

pub struct InteractionController {
    engine: Weak<Engine>,
    root: Mutex<Weak<ProjectileDriver>>,
    hands: Mutex<[HandState; 2]>,
    scales: Mutex<HashMap<usize, f32>>,
    config: Mutex<InteractionConfig>,
    close_callback: Mutex<Option<CloseCallback>>,
    activation_buttons: AtomicU64,
    grab_buttons: AtomicU64,
}

impl InteractionController {
    /// Create a controller and add it to the engine's controller list.
    /// Attach it with `ProjectileDriver::set_interaction_controller`.
    pub fn new(engine: &Arc<Engine>) -> Arc<Self> {
        let controller = Arc::new(Self {
            engine: Arc::downgrade(engine),
            root: Mutex::new(Weak::new()),
            hands: Mutex::new(Default::default()),
            scales: Mutex::new(HashMap::new()),
            config: Mutex::new(InteractionConfig::default()),
            close_callback: Mutex::new(None),
            activation_buttons: AtomicU64::new(0),
            grab_buttons: AtomicU64::new(0),
        });
        engine.controllers().add(&controller);
        controller
    }

    pub fn set_root(&self, root: Weak<ProjectileDriver>) {
        *self.root.lock() = root;
    }

    pub fn root(&self) -> Option<Arc<ProjectileDriver>> {
        self.root.lock().upgrade()
    }

    fn root_visible(&self) -> Option<Arc<ProjectileDriver>> {
        self.root().filter(|r| r.is_visible())
    }

    // ── Configuration ────────────────────────────────────────

    pub fn config(&self) -> InteractionConfig {
        *self.config.lock()
    }

    pub fn set_hover_threshold(&self, threshold: f32) {
        self.config.lock().hover_threshold = threshold;
    }

    pub fn set_hover_scale(&self, scale: f32) {
        self.config.lock().hover_scale = scale;
    }

    pub fn set_hover_transition_speed(&self, speed: f32) {
        self.config.lock().hover_transition_speed = speed;
    }

    pub fn set_hand_tracking_mode(&self, mode: HandTrackingMode) {
        self.config.lock().tracking = mode;
    }

    pub fn set_display_tooltip(&self, display: bool) {
        self.config.lock().display_tooltip = display;
    }

    pub fn set_close_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.close_callback.lock() = Some(Arc::new(callback));
    }

    /// Buttons that activate the hovered element. The first non-empty mask
    /// installs the shared router callback for every controller.
    pub fn set_activation_buttons(&self, mask: u64) {
        self.activation_buttons.store(mask, Ordering::Relaxed);
        if let Some(engine) = self.engine.upgrade() {
            ControllerRegistry::ensure_callback(&engine, ButtonRole::Activate, mask);
        }
    }

    pub fn activation_buttons(&self) -> u64 {
        self.activation_buttons.load(Ordering::Relaxed)
    }

    pub fn set_grab_buttons(&self, mask: u64) {
        self.grab_buttons.store(mask, Ordering::Relaxed);
        if let Some(engine) = self.engine.upgrade() {
            ControllerRegistry::ensure_callback(&engine, ButtonRole::Grab, mask);
        }
    }

    pub fn grab_buttons(&self) -> u64 {
        self.grab_buttons.load(Ordering::Relaxed)
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn hovered(&self, left: bool) -> Option<Arc<ControlledProjectile>> {
        self.hands.lock()[hand_index(left)].hovered.upgrade()
    }

    pub fn previous_hovered(&self, left: bool) -> Option<Arc<ControlledProjectile>> {
        self.hands.lock()[hand_index(left)].previous_hovered.upgrade()
    }

    pub fn activated(&self, left: bool) -> Option<Arc<ControlledProjectile>> {
        self.hands.lock()[hand_index(left)].activated.upgrade()
    }

    pub fn grabbed(&self, left: bool) -> Option<Arc<ControlledProjectile>> {
        self.hands.lock()[hand_index(left)].grabbed.upgrade()
    }

    pub fn is_grabbing(&self, left: bool) -> bool {
        self.hands.lock()[hand_index(left)].is_grabbing
    }

    pub fn is_hand_interacting(&self, left: bool) -> bool {
        let hands = self.hands.lock();
        let hand = &hands[hand_index(left)];
        hand.is_grabbing || hand.hovered.strong_count() > 0
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Drop every hand state and hide the tooltips this controller showed.
    pub fn clear(&self) {
        let display_tooltip = self.config().display_tooltip;
        let hovered: Vec<(bool, Option<Arc<ControlledProjectile>>)> = {
            let mut hands = self.hands.lock();
            [true, false]
                .into_iter()
                .map(|left| {
                    let hand = &mut hands[hand_index(left)];
                    let hovered = hand.hovered.upgrade();
                    hand.clear();
                    (left, hovered)
                })
                .collect()
        };
        self.scales.lock().clear();

        if !display_tooltip {
            return;
        }
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        for (left, hovered) in hovered {
            match hovered {
                Some(p) => engine.tooltips().hide_tooltip(left, p.identifier()),
                None => engine.tooltips().force_hide_tooltip(left),
            }
        }
    }

    /// Hover tracking and hover-scale animation. Does nothing while the
    /// root is hidden.
    pub fn update(&self, dt: f32) {
        let Some(root) = self.root_visible() else {
            return;
        };
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let leaves = collect_leaves(&root);
        let config = self.config();

        for left in [true, false] {
            if config.tracking.tracks(left) {
                let hand = engine.host().hand_node(left).map(|n| n.world_transform().position);
                if let Some(hand) = hand {
                    self.update_hover_for_hand(&engine, left, hand, &leaves, &config, dt);
                }
            } else {
                let mut hands = self.hands.lock();
                let state = &mut hands[hand_index(left)];
                if state.hovered.strong_count() > 0 {
                    state.clear();
                }
            }
        }
        self.update_scales(&leaves, &config, dt);
    }

    fn update_hover_for_hand(
        &self,
        engine: &Arc<Engine>,
        left: bool,
        hand: Vec3,
        leaves: &[Arc<ControlledProjectile>],
        config: &InteractionConfig,
        dt: f32,
    ) {
        let current = self.hovered(left);

        if current.is_none() && config.display_tooltip && engine.tooltips().is_tooltip_visible(left) {
            trace!("[interaction] {} hand: hiding orphaned tooltip", hand_name(left));
            engine.tooltips().force_hide_tooltip(left);
            self.hands.lock()[hand_index(left)].clear_pending();
        }

        let threshold = |p: &ControlledProjectile| p.hover_threshold_override().unwrap_or(config.hover_threshold);

        let mut closest: Option<(Arc<ControlledProjectile>, f32)> = None;
        let mut current_distance = f32::MAX;
        let mut current_exit = config.hover_threshold * HOVER_EXIT_FACTOR;
        for leaf in leaves {
            if !leaf.base().is_effectively_visible() {
                continue;
            }
            let distance = leaf.world_position().distance(hand);
            let leaf_threshold = threshold(leaf);
            if same(Some(leaf), current.as_ref()) {
                current_distance = distance;
                current_exit = leaf_threshold * HOVER_EXIT_FACTOR;
            }
            if distance < leaf_threshold && closest.as_ref().map_or(true, |(_, d)| distance < *d) {
                closest = Some((Arc::clone(leaf), distance));
            }
        }

        let mut candidate = closest.as_ref().map(|(p, _)| Arc::clone(p));
        if let Some(current) = &current {
            if current_distance <= current_exit && !same(candidate.as_ref(), Some(current)) {
                let keep = closest.as_ref().map_or(true, |(_, d)| *d >= current_distance);
                if keep {
                    candidate = Some(Arc::clone(current));
                }
            }
        }

        let commit = {
            let mut hands = self.hands.lock();
            let state = &mut hands[hand_index(left)];
            if same(candidate.as_ref(), current.as_ref()) {
                state.clear_pending();
                false
            } else {
                let immediate = candidate.is_none()
                    || current.as_ref().is_some_and(|c| !c.base().is_effectively_visible());
                if immediate {
                    state.clear_pending();
                    true
                } else if same(candidate.as_ref(), state.pending.upgrade().as_ref()) {
                    state.pending_timer += dt;
                    if state.pending_timer >= HOVER_DEBOUNCE {
                        state.clear_pending();
                        true
                    } else {
                        false
                    }
                } else {
                    state.pending = candidate.as_ref().map(Arc::downgrade).unwrap_or_default();
                    state.pending_timer = dt;
                    false
                }
            }
        };

        if commit {
            self.commit_hover(engine, left, candidate, config.display_tooltip);
        }
    }

    fn commit_hover(
        &self,
        engine: &Arc<Engine>,
        left: bool,
        next: Option<Arc<ControlledProjectile>>,
        display_tooltip: bool,
    ) {
        let previous = self.hovered(left);
        trace!(
            "[interaction] hover {} hand: {} -> {}",
            hand_name(left),
            describe(previous.as_ref()),
            describe(next.as_ref())
        );
        let hand_node = engine.host().hand_node(left);

        if let Some(previous) = &previous {
            let mut event = InputEvent::new(InputEventType::HoverExit, previous.node(), hand_node.clone(), left);
            dispatch(previous, &mut event);
            engine.haptics().trigger_for_event(&event);
            if display_tooltip {
                engine.tooltips().hide_tooltip(left, previous.identifier());
            }
        }

        if let Some(next) = &next {
            let mut event = InputEvent::new(InputEventType::HoverEnter, next.node(), hand_node, left);
            dispatch(next, &mut event);
            engine.haptics().trigger_for_event(&event);
            let text = next.tooltip_text();
            if display_tooltip && !text.is_empty() {
                engine.tooltips().show_tooltip(left, next.identifier(), &text);
            }
        }

        let mut hands = self.hands.lock();
        let state = &mut hands[hand_index(left)];
        state.previous_hovered = std::mem::take(&mut state.hovered);
        state.hovered = next.as_ref().map(Arc::downgrade).unwrap_or_default();
    }

    fn update_scales(&self, leaves: &[Arc<ControlledProjectile>], config: &InteractionConfig, dt: f32) {
        let (left, right) = {
            let hands = self.hands.lock();
            (hands[0].hovered.upgrade(), hands[1].hovered.upgrade())
        };
        let factor = (config.hover_transition_speed * dt).min(1.0);

        let mut scales = self.scales.lock();
        let mut seen = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            if !leaf.is_activateable() {
                leaf.set_hover_scale(1.0);
                continue;
            }
            let key = Arc::as_ptr(leaf) as usize;
            seen.push(key);
            let hovered = same(Some(leaf), left.as_ref()) || same(Some(leaf), right.as_ref());
            let target = if hovered { config.hover_scale } else { 1.0 };
            let scale = scales.entry(key).or_insert(1.0);
            *scale += (target - *scale) * factor;
            leaf.set_hover_scale(*scale);
        }
        scales.retain(|key, _| seen.contains(key));
    }

    // ── Buttons ──────────────────────────────────────────────

    /// Activate-down on the hovered element, activate-up on the element
    /// that received the down. Returns whether the input was consumed.
    pub fn on_activation_input(&self, left: bool, released: bool) -> bool {
        if self.root_visible().is_none() {
            return false;
        }
        let Some(engine) = self.engine.upgrade() else {
            return false;
        };
        let hand_node = engine.host().hand_node(left);

        if released {
            let Some(activated) = self.activated(left) else {
                return false;
            };
            trace!(
                "[interaction] activate up {} hand: {}",
                hand_name(left),
                describe(Some(&activated))
            );
            let mut event = InputEvent::new(InputEventType::ActivateUp, activated.node(), hand_node, left);
            dispatch(&activated, &mut event);
            engine.haptics().trigger_for_event(&event);
            self.hands.lock()[hand_index(left)].activated = Weak::new();
            return true;
        }

        let Some(hovered) = self.hovered(left) else {
            return false;
        };
        let close = hovered.close_on_activate();
        trace!(
            "[interaction] activate down {} hand: {} close_on_activate={}",
            hand_name(left),
            describe(Some(&hovered)),
            close
        );
        self.hands.lock()[hand_index(left)].activated = Arc::downgrade(&hovered);

        let mut event = InputEvent::activate_down(hovered.node(), hand_node, left, close);
        dispatch(&hovered, &mut event);
        engine.haptics().trigger_for_event(&event);

        let callback = self.close_callback.lock().clone();
        if let (true, Some(callback)) = (close, callback) {
            debug!("[interaction] '{}' closes on activate", hovered.base().id());
            if self.config().display_tooltip {
                engine.tooltips().hide_tooltip(left, hovered.identifier());
            }
            callback();
        }
        true
    }

    /// Grab-start on the hovered element, grab-end on the grabbed one.
    pub fn on_grab_input(&self, left: bool, released: bool) -> bool {
        if self.root_visible().is_none() {
            return false;
        }
        let Some(engine) = self.engine.upgrade() else {
            return false;
        };
        let hand_node = engine.host().hand_node(left);

        if released {
            let grabbed = {
                let hands = self.hands.lock();
                let state = &hands[hand_index(left)];
                if !state.is_grabbing {
                    return false;
                }
                state.grabbed.upgrade()
            };
            let Some(grabbed) = grabbed else {
                return false;
            };
            trace!("[interaction] grab end {} hand: {}", hand_name(left), describe(Some(&grabbed)));
            let mut event = InputEvent::new(InputEventType::GrabEnd, grabbed.node(), hand_node, left);
            dispatch(&grabbed, &mut event);
            engine.haptics().trigger_for_event(&event);
            let mut hands = self.hands.lock();
            let state = &mut hands[hand_index(left)];
            state.is_grabbing = false;
            state.grabbed = Weak::new();
            return true;
        }

        let Some(hovered) = self.hovered(left) else {
            return false;
        };
        trace!(
            "[interaction] grab start {} hand: {} anchor_handle={}",
            hand_name(left),
            describe(Some(&hovered)),
            hovered.is_anchor_handle()
        );
        {
            let mut hands = self.hands.lock();
            let state = &mut hands[hand_index(left)];
            state.is_grabbing = true;
            state.grabbed = Arc::downgrade(&hovered);
        }
        let mut event = InputEvent::new(InputEventType::GrabStart, hovered.node(), hand_node, left);
        dispatch(&hovered, &mut event);
        engine.haptics().trigger_for_event(&event);
        true
    }
}

fn dispatch(source: &Arc<ControlledProjectile>, event: &mut InputEvent) {
    if let Some(node) = source.node() {
        node.dispatch_event(event);
    }
}

/// Initialized projectile leaves under `root`, depth first.
fn collect_leaves(root: &ProjectileDriver) -> Vec<Arc<ControlledProjectile>> {
    fn walk(children: &[Node], out: &mut Vec<Arc<ControlledProjectile>>) {
        for child in children {
            match child {
                Node::Projectile(p) => {
                    if p.is_initialized() {
                        out.push(Arc::clone(p));
                    }
                }
                Node::Driver(d) => walk(&d.children(), out),
            }
        }
    }
    let mut out = Vec::new();
    walk(&root.children(), &mut out);
    out
}

// ── Controller registry ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonRole {
    Activate,
    Grab,
}

/// Every live controller, consulted in creation order for button input.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: Mutex<Vec<Weak<InteractionController>>>,
    activation_callback: Mutex<Option<CallbackId>>,
    grab_callback: Mutex<Option<CallbackId>>,
}

impl ControllerRegistry {
    pub fn add(&self, controller: &Arc<InteractionController>) {
        let mut controllers = self.controllers.lock();
        controllers.retain(|c| c.strong_count() > 0);
        if !controllers.iter().any(|c| c.as_ptr() == Arc::as_ptr(controller)) {
            controllers.push(Arc::downgrade(controller));
        }
    }

    pub fn controllers(&self) -> Vec<Arc<InteractionController>> {
        self.controllers.lock().iter().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.controllers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any controller with a visible root has `left` hovering.
    pub fn any_controller_has_hovered_item(&self, left: bool) -> bool {
        self.controllers()
            .iter()
            .any(|c| c.root_visible().is_some() && c.hovered(left).is_some())
    }

    fn route(&self, left: bool, released: bool, role: ButtonRole) -> bool {
        for controller in self.controllers() {
            if controller.root_visible().is_none() {
                continue;
            }
            let consumed = match role {
                ButtonRole::Activate => controller.on_activation_input(left, released),
                ButtonRole::Grab => controller.on_grab_input(left, released),
            };
            if consumed {
                return true;
            }
        }
        false
    }

    fn ensure_callback(engine: &Arc<Engine>, role: ButtonRole, mask: u64) {
        let registry = engine.controllers();
        let slot = match role {
            ButtonRole::Activate => &registry.activation_callback,
            ButtonRole::Grab => &registry.grab_callback,
        };
        let mut slot = slot.lock();
        if slot.is_some() || mask == 0 {
            return;
        }
        let weak = Arc::downgrade(engine);
        let id = engine.input().add_button_callback(mask, move |left, released, _button| {
            let Some(engine) = weak.upgrade() else {
                return false;
            };
            if engine.host().is_game_stopped() {
                return false;
            }
            engine.controllers().route(left, released, role)
        });
        info!("[interaction] registered {:?} callback for mask 0x{:X}", role, mask);
        *slot = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use super::*;
    use crate::sim::Simulation;

    const DT: f32 = 0.016;

    struct Menu {
        root: Arc<ProjectileDriver>,
        controller: Arc<InteractionController>,
        a: Arc<ControlledProjectile>,
        b: Arc<ControlledProjectile>,
    }

    /// A at the left hand's default position, B at the right hand's.
    fn menu(sim: &Simulation) -> Menu {
        let root = ProjectileDriver::root(&sim.engine);
        root.set_center(Vec3::new(0.0, 40.0, 100.0));
        let a = ControlledProjectile::new(&sim.engine);
        a.base().set_id("a");
        a.base().set_local_position(Vec3::new(-20.0, 0.0, 0.0));
        let b = ControlledProjectile::new(&sim.engine);
        b.base().set_id("b");
        b.base().set_local_position(Vec3::new(20.0, 0.0, 0.0));
        root.add_child(Arc::clone(&a));
        root.add_child(Arc::clone(&b));
        let controller = InteractionController::new(&sim.engine);
        root.set_interaction_controller(Some(Arc::clone(&controller)));
        root.set_visible(true);
        Menu {
            root,
            controller,
            a,
            b,
        }
    }

    fn run(controller: &InteractionController, frames: usize) {
        for _ in 0..frames {
            controller.update(DT);
        }
    }

    fn is(p: Option<Arc<ControlledProjectile>>, expected: &Arc<ControlledProjectile>) -> bool {
        p.is_some_and(|p| Arc::ptr_eq(&p, expected))
    }

    #[test]
    fn test_hover_waits_for_debounce() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        run(&m.controller, 3);
        assert!(m.controller.hovered(true).is_none());
        run(&m.controller, 1);
        assert!(is(m.controller.hovered(true), &m.a));
        assert!(is(m.controller.hovered(false), &m.b));
    }

    #[test]
    fn test_hover_end_commits_immediately() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        run(&m.controller, 4);
        assert!(m.controller.hovered(true).is_some());

        sim.host.set_hand_position(true, Vec3::new(-20.0, 40.0, 150.0));
        run(&m.controller, 1);
        assert!(m.controller.hovered(true).is_none());
        assert!(is(m.controller.previous_hovered(true), &m.a));
    }

    #[test]
    fn test_exit_hysteresis_keeps_hover() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        run(&m.controller, 4);

        sim.host.set_hand_position(true, Vec3::new(-20.0, 40.0, 110.05));
        run(&m.controller, 1);
        assert!(is(m.controller.hovered(true), &m.a));

        sim.host.set_hand_position(true, Vec3::new(-20.0, 40.0, 110.2));
        run(&m.controller, 1);
        assert!(m.controller.hovered(true).is_none());
    }

    #[test]
    fn test_closer_candidate_takes_over_after_debounce() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        m.b.base().set_local_position(Vec3::new(-12.0, 0.0, 0.0));
        m.controller.set_hand_tracking_mode(HandTrackingMode::LeftHand);
        run(&m.controller, 4);
        assert!(is(m.controller.hovered(true), &m.a));

        // B at distance 1, A at 7: B is closer and inside its threshold.
        sim.host.set_hand_position(true, Vec3::new(-13.0, 40.0, 100.0));
        run(&m.controller, 3);
        assert!(is(m.controller.hovered(true), &m.a));
        run(&m.controller, 1);
        assert!(is(m.controller.hovered(true), &m.b));
    }

    #[test]
    fn test_threshold_override() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        m.a.set_hover_threshold_override(2.0);
        sim.host.set_hand_position(true, Vec3::new(-20.0, 40.0, 105.0));
        run(&m.controller, 5);
        assert!(m.controller.hovered(true).is_none());

        m.a.set_hover_threshold_override(0.0);
        run(&m.controller, 4);
        assert!(is(m.controller.hovered(true), &m.a));
    }

    #[test]
    fn test_hover_scale_animates() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        run(&m.controller, 10);
        assert!((m.a.hover_scale() - 1.2).abs() < 1e-4);
        assert!((m.b.hover_scale() - 1.2).abs() < 1e-4);

        m.b.set_activateable(false);
        run(&m.controller, 1);
        assert_eq!(m.b.hover_scale(), 1.0);
    }

    #[test]
    fn test_tracking_mode_ignores_other_hand() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        m.controller.set_hand_tracking_mode(HandTrackingMode::RightHand);
        run(&m.controller, 5);
        assert!(m.controller.hovered(true).is_none());
        assert!(is(m.controller.hovered(false), &m.b));
    }

    #[test]
    fn test_activation_routes_per_hand() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        let a_down = Arc::new(AtomicUsize::new(0));
        let b_down = Arc::new(AtomicUsize::new(0));
        let b_up = Arc::new(AtomicUsize::new(0));
        {
            let a_down = Arc::clone(&a_down);
            m.a.set_on_activate_down(move || {
                a_down.fetch_add(1, Ordering::SeqCst);
                true
            });
            let b_down = Arc::clone(&b_down);
            m.b.set_on_activate_down(move || {
                b_down.fetch_add(1, Ordering::SeqCst);
                true
            });
            let b_up = Arc::clone(&b_up);
            m.b.set_on_activate_up(move || {
                b_up.fetch_add(1, Ordering::SeqCst);
                true
            });
        }
        run(&m.controller, 4);

        assert!(m.controller.on_activation_input(true, false));
        assert_eq!(a_down.load(Ordering::SeqCst), 1);
        assert_eq!(b_down.load(Ordering::SeqCst), 0);

        assert!(m.controller.on_activation_input(false, false));
        assert!(m.controller.on_activation_input(false, true));
        assert_eq!(b_down.load(Ordering::SeqCst), 1);
        assert_eq!(b_up.load(Ordering::SeqCst), 1);
        assert!(m.controller.activated(false).is_none());
        assert!(!m.controller.on_activation_input(false, true));
    }

    #[test]
    fn test_activation_queues_haptics() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        run(&m.controller, 4);
        let pending = sim.engine.haptics().pending(true);
        m.controller.on_activation_input(true, false);
        assert_eq!(sim.engine.haptics().pending(true), pending + 1);

        m.a.set_use_haptic_feedback(false);
        m.controller.on_activation_input(true, true);
        assert_eq!(sim.engine.haptics().pending(true), pending + 1);
    }

    #[test]
    fn test_grab_start_and_end() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        assert!(!m.controller.on_grab_input(true, false));
        run(&m.controller, 4);
        assert!(m.controller.on_grab_input(true, false));
        assert!(m.controller.is_grabbing(true));
        assert!(is(m.controller.grabbed(true), &m.a));
        assert!(m.controller.is_hand_interacting(true));
        assert!(m.controller.on_grab_input(true, true));
        assert!(!m.controller.is_grabbing(true));
        assert!(!m.controller.on_grab_input(true, true));
    }

    #[test]
    fn test_tooltip_follows_hover() {
        let sim = Simulation::new(8);
        let m = menu(&sim);
        m.a.set_tooltip_text("Potion");
        run(&m.controller, 4);
        let tooltips = sim.engine.tooltips();
        assert!(tooltips.is_tooltip_visible(true));
        assert_eq!(tooltips.current_text(true), "Potion");
        assert!(!tooltips.is_tooltip_visible(false));

        sim.host.set_hand_position(true, Vec3::new(-20.0, 40.0, 150.0));
        run(&m.controller, 1);
        assert!(!tooltips.is_tooltip_visible(true));
    }

    #[test]
    fn test_close_hides_tooltip_before_callback() {
        let sim = Simulation::new(8);
        let m = menu(&sim);
        m.a.set_tooltip_text("Close");
        m.a.set_close_on_activate(true);
        let tooltip_seen = Arc::new(AtomicBool::new(true));
        {
            let engine = Arc::downgrade(&sim.engine);
            let seen = Arc::clone(&tooltip_seen);
            m.controller.set_close_callback(move || {
                if let Some(engine) = engine.upgrade() {
                    seen.store(engine.tooltips().is_tooltip_visible(true), Ordering::SeqCst);
                }
            });
        }
        run(&m.controller, 4);
        assert!(sim.engine.tooltips().is_tooltip_visible(true));
        assert!(m.controller.on_activation_input(true, false));
        assert!(!tooltip_seen.load(Ordering::SeqCst));
    }

    #[test]
    fn test_hidden_root_ignores_input_and_clears() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        run(&m.controller, 4);
        m.root.set_visible(false);
        assert!(m.controller.hovered(true).is_none());
        assert!(!m.controller.on_activation_input(true, false));
        run(&m.controller, 4);
        assert!(m.controller.hovered(true).is_none());
    }

    #[test]
    fn test_registry_reports_hover() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        assert!(!sim.engine.controllers().any_controller_has_hovered_item(true));
        run(&m.controller, 4);
        assert!(sim.engine.controllers().any_controller_has_hovered_item(true));
        m.root.set_visible(false);
        assert!(!sim.engine.controllers().any_controller_has_hovered_item(true));
    }

    #[test]
    fn test_router_buttons_reach_controller() {
        let sim = Simulation::new(4);
        let m = menu(&sim);
        let downs = Arc::new(AtomicUsize::new(0));
        {
            let downs = Arc::clone(&downs);
            m.a.set_on_activate_down(move || {
                downs.fetch_add(1, Ordering::SeqCst);
                true
            });
        }
        m.controller.set_activation_buttons(1 << 33);
        run(&m.controller, 4);

        let mut out = 1u64 << 33;
        sim.engine.input().on_controller_state(true, 1 << 33, &mut out);
        assert_eq!(downs.load(Ordering::SeqCst), 1);
        assert_eq!(out, 0);

        sim.host.set_game_stopped(true);
        let mut out = 0;
        sim.engine.input().on_controller_state(true, 0, &mut out);
        let mut out = 1u64 << 33;
        sim.engine.input().on_controller_state(true, 1 << 33, &mut out);
        assert_eq!(downs.load(Ordering::SeqCst), 1);
        assert_eq!(out, 1 << 33);
    }
}
