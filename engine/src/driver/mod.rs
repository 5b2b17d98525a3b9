//! Layout drivers: interior scene-graph nodes.
//!
//! A `ProjectileDriver` owns an ordered child list and an anchor for its
//! center. What makes a grid a grid is its `Layout`, a strategy object that
//! places the children in the driver's local space every frame. Parent
//! rotation reaches the children through the scene-graph formula, so a
//! layout never rotates anything itself.
//!
//! Locking: `state` and `layout` are separate mutexes. A layout runs with
//! only the layout lock held and receives a snapshot of the children, so it
//! may query the driver's world transform and call into any child.

pub mod column_grid;
pub mod curved_row;
pub mod facing;
pub mod glyphs;
pub mod grid;
pub mod half_wheel;
pub mod radial;
pub mod root;
pub mod row_grid;
pub mod scroll;
pub mod text;

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace, warn};

pub use column_grid::ColumnGridLayout;
pub use curved_row::CurvedRowLayout;
pub use facing::{FacingStrategy, FullFacing, YawOnlyFacing};
pub use glyphs::{GlyphCell, GlyphMetrics};
pub use grid::GridLayout;
pub use half_wheel::HalfWheelLayout;
pub use radial::RadialLayout;
pub use root::RootLayout;
pub use row_grid::RowGridLayout;
pub use scroll::{HorizontalFill, HorizontalOrigin, VerticalFill, VerticalOrigin};
pub use text::{TextAlignment, TextBounds, TextLayout};

use crate::anchor::Anchor;
use crate::engine::Engine;
use crate::host::{Host, NodeRef};
use crate::interaction::InteractionController;
use crate::math::{Mat3, Vec3};
use crate::node::{InputEvent, InputEventType, Node, NodeBase, UnhandledEventCallback};
use crate::projectile::ControlledProjectile;
use crate::smoother::{TransitionMode, DEFAULT_DRIVER_SPEED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Root,
    Grid,
    Radial,
    CurvedRow,
    HalfWheel,
    RowGrid,
    ColumnGrid,
    Text,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Grid => "grid",
            Self::Radial => "radial",
            Self::CurvedRow => "curved-row",
            Self::HalfWheel => "half-wheel",
            Self::RowGrid => "row-grid",
            Self::ColumnGrid => "column-grid",
            Self::Text => "text",
        }
    }
}

/// Placement strategy of a driver.
///
/// Every hook receives the owning driver and a snapshot of its children.
/// Positions are local to the driver.
pub trait Layout: Send + 'static {
    /// Place the children for this frame.
    fn update_layout(&mut self, driver: &ProjectileDriver, children: &[Node], dt: f32);

    /// Runs before facing and layout each visible frame.
    fn before_update(&mut self, _driver: &ProjectileDriver, _children: &[Node]) {}

    /// Return a new child list to replace the current one.
    fn sync_children(&mut self, _driver: &ProjectileDriver, _children: &[Node]) -> Option<Vec<Node>> {
        None
    }

    /// Layout-specific event handling, offered before the driver's own.
    fn on_event(&mut self, _driver: &ProjectileDriver, _event: &mut InputEvent, _children: &[Node]) -> bool {
        false
    }

    /// The driver is about to turn visible after being hidden.
    fn on_show(&mut self) {}

    /// The child list changed length.
    fn on_children_changed(&mut self, _count: usize) {}

    /// The driver was cleared.
    fn on_clear(&mut self) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Facing {
    strategy: Arc<dyn FacingStrategy>,
    anchor: NodeRef,
}

#[derive(Default)]
struct GrabState {
    active: bool,
    left: bool,
    previous_anchor: Anchor,
    grabbed: Weak<ControlledProjectile>,
}

struct DriverState {
    children: Vec<Node>,
    anchor: Anchor,
    transition_mode: TransitionMode,
    smoothing_speed: f32,
    use_haptic_feedback: bool,
    facing: Option<Facing>,
    grab: GrabState,
    interaction: Option<Arc<InteractionController>>,
    on_unhandled: Option<UnhandledEventCallback>,
}

impl DriverState {
    fn new(mode: TransitionMode) -> Self {
        Self {
            children: Vec::new(),
            anchor: Anchor::new(),
            transition_mode: mode,
            smoothing_speed: DEFAULT_DRIVER_SPEED,
            use_haptic_feedback: true,
            facing: None,
            grab: GrabState::default(),
            interaction: None,
            on_unhandled: None,
        }
    }
}

pub struct ProjectileDriver {
    engine: Weak<Engine>,
    this: Weak<ProjectileDriver>,
    kind: DriverKind,
    base: NodeBase,
    initialized: AtomicBool,
    state: Mutex<DriverState>,
    layout: Mutex<Box<dyn Layout>>,
}

impl ProjectileDriver {
    fn with_layout(engine: &Arc<Engine>, kind: DriverKind, layout: Box<dyn Layout>, mode: TransitionMode) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            engine: Arc::downgrade(engine),
            this: this.clone(),
            kind,
            base: NodeBase::new(),
            initialized: AtomicBool::new(false),
            state: Mutex::new(DriverState::new(mode)),
            layout: Mutex::new(layout),
        })
    }

    /// Hidden container whose children keep their own local positions.
    /// `set_visible(true)` initializes the tree on first use.
    pub fn root(engine: &Arc<Engine>) -> Arc<Self> {
        let driver = Self::with_layout(engine, DriverKind::Root, Box::new(RootLayout), TransitionMode::Lerp);
        driver.base.replace_visible(false);
        driver
    }

    pub fn grid(engine: &Arc<Engine>) -> Arc<Self> {
        Self::with_layout(engine, DriverKind::Grid, Box::new(GridLayout::default()), TransitionMode::Lerp)
    }

    pub fn radial(engine: &Arc<Engine>) -> Arc<Self> {
        Self::with_layout(engine, DriverKind::Radial, Box::new(RadialLayout::default()), TransitionMode::Lerp)
    }

    pub fn curved_row(engine: &Arc<Engine>) -> Arc<Self> {
        Self::with_layout(
            engine,
            DriverKind::CurvedRow,
            Box::new(CurvedRowLayout::default()),
            TransitionMode::Lerp,
        )
    }

    pub fn half_wheel(engine: &Arc<Engine>) -> Arc<Self> {
        Self::with_layout(
            engine,
            DriverKind::HalfWheel,
            Box::new(HalfWheelLayout::default()),
            TransitionMode::Lerp,
        )
    }

    pub fn row_grid(engine: &Arc<Engine>) -> Arc<Self> {
        Self::with_layout(engine, DriverKind::RowGrid, Box::new(RowGridLayout::default()), TransitionMode::Lerp)
    }

    pub fn column_grid(engine: &Arc<Engine>) -> Arc<Self> {
        Self::with_layout(
            engine,
            DriverKind::ColumnGrid,
            Box::new(ColumnGridLayout::default()),
            TransitionMode::Lerp,
        )
    }

    /// Text rendered as one glyph projectile per visible character.
    pub fn text(engine: &Arc<Engine>) -> Arc<Self> {
        Self::with_layout(engine, DriverKind::Text, Box::new(TextLayout::default()), TransitionMode::Instant)
    }

    pub fn kind(&self) -> DriverKind {
        self.kind
    }

    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    pub fn node(&self) -> Option<Node> {
        self.this.upgrade().map(Node::Driver)
    }

    pub(crate) fn weak(&self) -> Weak<ProjectileDriver> {
        self.this.clone()
    }

    pub fn engine(&self) -> Option<Arc<Engine>> {
        self.engine.upgrade()
    }

    fn host(&self) -> Option<Arc<dyn Host>> {
        self.engine.upgrade().map(|e| Arc::clone(e.host()))
    }

    pub(crate) fn hand_position(&self, left: bool) -> Option<Vec3> {
        let hand = self.host()?.hand_node(left)?;
        Some(hand.world_transform().position)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_root(&self) -> bool {
        !self.base.has_parent()
    }

    // ── Typed layout access ──────────────────────────────────

    /// Run `f` against the layout when it is an `L`.
    pub fn layout<L: Layout, R>(&self, f: impl FnOnce(&L) -> R) -> Option<R> {
        let layout = self.layout.lock();
        layout.as_any().downcast_ref::<L>().map(f)
    }

    pub fn layout_mut<L: Layout, R>(&self, f: impl FnOnce(&mut L) -> R) -> Option<R> {
        let mut layout = self.layout.lock();
        layout.as_any_mut().downcast_mut::<L>().map(f)
    }

    // ── Scene graph ──────────────────────────────────────────

    /// World position of the anchor, the center of a root driver.
    pub fn center_position(&self) -> Vec3 {
        let anchor = self.state.lock().anchor.clone();
        match self.host() {
            Some(host) => anchor.world_position(host.as_ref()),
            None => anchor.fallback_position() + anchor.offset(),
        }
    }

    pub fn world_position(&self) -> Vec3 {
        self.base.world_position_or(|| self.center_position())
    }

    pub fn world_rotation(&self) -> Mat3 {
        self.base.world_rotation()
    }

    pub fn world_scale(&self) -> f32 {
        self.base.world_scale()
    }

    /// Map a world position into this driver's local frame.
    pub fn world_to_local(&self, world: Vec3) -> Vec3 {
        self.world_rotation().inverse().rotate(world - self.world_position())
    }

    pub fn children(&self) -> Vec<Node> {
        self.state.lock().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.state.lock().children.len()
    }

    pub fn add_child(&self, child: impl Into<Node>) {
        let child = child.into();
        child.set_parent(self.node().as_ref());
        let (children, count) = {
            let mut state = self.state.lock();
            state.children.push(child.clone());
            (state.children.clone(), state.children.len())
        };
        {
            let mut layout = self.layout.lock();
            layout.on_children_changed(count);
            if self.is_initialized() {
                layout.update_layout(self, &children, 0.0);
            }
        }
        if self.is_initialized() {
            child.initialize();
        }
        trace!(
            "[driver '{}'] add_child '{}' (total {})",
            self.base.id(),
            child.id(),
            count
        );
    }

    /// Detach a child. Its host projectiles are released as if an ancestor
    /// hid; the node itself stays alive for the caller to re-add or drop.
    pub fn remove_child(&self, child: &Node) -> bool {
        let (removed, count) = {
            let mut state = self.state.lock();
            let before = state.children.len();
            state.children.retain(|c| !c.ptr_eq(child));
            (state.children.len() != before, state.children.len())
        };
        if !removed {
            return false;
        }
        self.layout.lock().on_children_changed(count);
        child.on_parent_hide();
        child.set_parent(None);
        trace!("[driver '{}'] remove_child '{}' (total {})", self.base.id(), child.id(), count);
        true
    }

    /// Destroy projectile children and clear child drivers recursively.
    pub fn clear(&self) {
        let children = std::mem::take(&mut self.state.lock().children);
        trace!("[driver '{}'] clear: removing {} children", self.base.id(), children.len());
        for child in &children {
            match child {
                Node::Projectile(p) => p.destroy(),
                Node::Driver(d) => d.clear(),
            }
        }
        let mut layout = self.layout.lock();
        layout.on_children_changed(0);
        layout.on_clear();
    }

    fn replace_children(&self, children: Vec<Node>) {
        let old = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.children, children.clone())
        };
        for child in &old {
            match child {
                Node::Projectile(p) => p.destroy(),
                Node::Driver(d) => d.clear(),
            }
        }
        let this = self.node();
        for child in &children {
            child.set_parent(this.as_ref());
        }
        {
            let mut layout = self.layout.lock();
            layout.on_children_changed(children.len());
            if self.is_initialized() {
                layout.update_layout(self, &children, 0.0);
            }
        }
        if self.is_initialized() {
            for child in &children {
                child.initialize();
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Initialize the subtree. Root drivers register for frame updates.
    pub fn initialize(&self) {
        if self.is_initialized() {
            return;
        }
        let Some(engine) = self.engine.upgrade() else {
            error!("driver: engine dropped before initialize");
            return;
        };
        if !engine.subsystem().is_initialized() {
            error!("[driver '{}'] initialize before subsystem is available", self.base.id());
            return;
        }
        self.initialized.store(true, Ordering::Release);

        let children = self.children();
        for child in &children {
            child.initialize();
        }

        if self.is_root() {
            if let Some(this) = self.this.upgrade() {
                engine.update_manager().register(&this);
            }
            trace!(
                "[driver '{}'] initialized and registered ({} children)",
                self.base.id(),
                children.len()
            );
        } else {
            trace!("[driver '{}'] initialized ({} children)", self.base.id(), children.len());
        }
    }

    /// Frame update: facing, layout, grab drift compensation, children.
    pub fn update(&self, dt: f32) {
        if !self.base.is_visible() {
            return;
        }

        let mut children = self.children();
        let replacement = {
            let mut layout = self.layout.lock();
            layout.before_update(self, &children);
            layout.sync_children(self, &children)
        };
        if let Some(replacement) = replacement {
            self.replace_children(replacement);
            children = self.children();
        }

        let facing = {
            let state = self.state.lock();
            state
                .facing
                .as_ref()
                .map(|f| (Arc::clone(&f.strategy), Arc::clone(&f.anchor)))
        };
        if let Some((strategy, anchor)) = facing {
            let rotation = strategy.compute_rotation(self.world_position(), anchor.world_transform().position);
            self.base.set_local_rotation(rotation);
        }

        self.layout.lock().update_layout(self, &children, dt);

        self.compensate_grab_drift();

        for child in &children {
            child.update(dt);
        }
    }

    fn compensate_grab_drift(&self) {
        let (left, grabbed) = {
            let state = self.state.lock();
            if !state.grab.active {
                return;
            }
            (state.grab.left, state.grab.grabbed.clone())
        };
        let hand = self.host().and_then(|h| h.hand_node(left));
        let Some(hand) = hand else {
            warn!("[driver '{}'] hand node unavailable during grab, restoring previous anchor", self.base.id());
            let mut state = self.state.lock();
            state.anchor = state.grab.previous_anchor.clone();
            state.grab = GrabState::default();
            return;
        };
        self.state.lock().anchor.set_direct(Arc::clone(&hand));

        if let Some(handle) = grabbed.upgrade() {
            let drift = handle.world_position() - hand.world_transform().position;
            let mut state = self.state.lock();
            let offset = state.anchor.offset();
            state.anchor.set_offset(offset - drift);
        }
    }

    // ── Visibility ───────────────────────────────────────────

    pub fn is_visible(&self) -> bool {
        self.base.is_visible()
    }

    pub fn set_visible(&self, visible: bool) {
        if visible && self.kind == DriverKind::Root && !self.is_initialized() {
            self.initialize();
        }
        if self.base.is_visible() == visible {
            return;
        }
        let children = self.children();
        trace!(
            "[driver '{}'] set_visible {} -> {} ({} children)",
            self.base.id(),
            !visible,
            visible,
            children.len()
        );
        if visible {
            self.layout.lock().on_show();
        }
        self.base.replace_visible(visible);

        if !visible {
            let controller = self.state.lock().interaction.clone();
            if let Some(controller) = controller {
                controller.clear();
            }
            for child in &children {
                child.on_parent_hide();
            }
        }
    }

    /// Propagate to children; local visibility is untouched.
    pub fn on_parent_hide(&self) {
        let children = self.children();
        trace!("[driver '{}'] parent hide, {} children", self.base.id(), children.len());
        for child in &children {
            child.on_parent_hide();
        }
    }

    // ── Anchor, facing and transitions ───────────────────────

    /// Fix the center at a world position.
    pub fn set_center(&self, position: Vec3) {
        self.state.lock().anchor.set_world_position(position);
    }

    pub fn set_anchor(&self, node: NodeRef, use_rotation: bool, use_scale: bool) {
        let mut state = self.state.lock();
        state.anchor.set_direct(node);
        state.anchor.set_use_rotation(use_rotation);
        state.anchor.set_use_scale(use_scale);
    }

    pub fn set_anchor_offset(&self, offset: Vec3) {
        self.state.lock().anchor.set_offset(offset);
    }

    pub fn anchor(&self) -> Anchor {
        self.state.lock().anchor.clone()
    }

    /// Rotate toward `anchor` every frame. Meant for root drivers only.
    pub fn set_facing(&self, strategy: Arc<dyn FacingStrategy>, anchor: NodeRef) {
        self.state.lock().facing = Some(Facing { strategy, anchor });
    }

    pub fn clear_facing(&self) {
        self.state.lock().facing = None;
    }

    pub fn has_facing(&self) -> bool {
        self.state.lock().facing.is_some()
    }

    pub fn transition_mode(&self) -> TransitionMode {
        self.state.lock().transition_mode
    }

    /// Set the mode here and on every descendant.
    pub fn set_transition_mode(&self, mode: TransitionMode) {
        let children = {
            let mut state = self.state.lock();
            state.transition_mode = mode;
            state.children.clone()
        };
        for child in &children {
            match child {
                Node::Projectile(p) => p.set_transition_mode(mode),
                Node::Driver(d) => d.set_transition_mode(mode),
            }
        }
    }

    pub fn smoothing_speed(&self) -> f32 {
        self.state.lock().smoothing_speed
    }

    pub fn set_smoothing_speed(&self, speed: f32) {
        let children = {
            let mut state = self.state.lock();
            state.smoothing_speed = speed;
            state.children.clone()
        };
        for child in &children {
            match child {
                Node::Projectile(p) => p.set_smoothing_speed(speed),
                Node::Driver(d) => d.set_smoothing_speed(speed),
            }
        }
    }

    pub fn set_use_haptic_feedback(&self, enabled: bool) {
        self.state.lock().use_haptic_feedback = enabled;
    }

    pub fn use_haptic_feedback(&self) -> bool {
        self.state.lock().use_haptic_feedback
    }

    // ── Interaction ──────────────────────────────────────────

    pub fn set_interaction_controller(&self, controller: Option<Arc<InteractionController>>) {
        if let Some(controller) = &controller {
            controller.set_root(self.weak());
        }
        self.state.lock().interaction = controller;
    }

    /// This driver's controller, or the nearest ancestor's.
    pub fn interaction_controller(&self) -> Option<Arc<InteractionController>> {
        if let Some(own) = self.state.lock().interaction.clone() {
            return Some(own);
        }
        match self.base.parent() {
            Some(Node::Driver(parent)) => parent.interaction_controller(),
            _ => None,
        }
    }

    /// Observer of every event reaching this root, consumed or not.
    pub fn set_on_event(&self, callback: impl Fn(&InputEvent) + Send + Sync + 'static) {
        self.state.lock().on_unhandled = Some(Arc::new(callback));
    }

    pub fn has_event_callback(&self) -> bool {
        self.state.lock().on_unhandled.is_some()
    }

    // ── Events ───────────────────────────────────────────────

    pub fn on_event(&self, event: &mut InputEvent) -> bool {
        if !self.use_haptic_feedback() && self.base.has_parent() {
            event.send_haptic_pulse = false;
        }
        let children = self.children();
        let handled = self.layout.lock().on_event(self, event, &children);
        let consumed = handled || self.handle_grab_event(event);

        if self.kind == DriverKind::Root {
            let callback = self.state.lock().on_unhandled.clone();
            if let Some(callback) = callback {
                callback(event);
            }
        }
        consumed
    }

    fn handle_grab_event(&self, event: &InputEvent) -> bool {
        match event.kind {
            InputEventType::GrabStart => {
                let Some(handle) = event.source_projectile().filter(|p| p.is_anchor_handle()) else {
                    return false;
                };
                let Some(root) = self.root_driver() else {
                    return false;
                };
                trace!(
                    "[driver '{}'] grab start on anchor '{}', positioning root '{}'",
                    self.base.id(),
                    handle.base().id(),
                    root.base.id()
                );
                root.start_driver_positioning(event.is_left_hand, Some(handle));
                true
            }
            InputEventType::GrabEnd => {
                let Some(root) = self.root_driver() else {
                    return false;
                };
                if !root.is_grabbing() {
                    return false;
                }
                root.end_driver_positioning();
                true
            }
            _ => false,
        }
    }

    /// Topmost driver in the parent chain.
    pub fn root_driver(&self) -> Option<Arc<ProjectileDriver>> {
        let mut current = self.this.upgrade()?;
        loop {
            match current.base.parent() {
                Some(Node::Driver(parent)) => current = parent,
                _ => return Some(current),
            }
        }
    }

    // ── Grab positioning ─────────────────────────────────────

    pub fn is_grabbing(&self) -> bool {
        self.state.lock().grab.active
    }

    /// Move the driver with a hand. With an anchor handle the handle keeps
    /// its offset to the hand; otherwise the center snaps to the hand.
    pub fn start_driver_positioning(&self, left: bool, handle: Option<&Arc<ControlledProjectile>>) {
        let Some(hand) = self.host().and_then(|h| h.hand_node(left)) else {
            warn!("[driver '{}'] start positioning: hand node unavailable", self.base.id());
            return;
        };
        if self.is_grabbing() {
            trace!("[driver '{}'] start positioning: already grabbing", self.base.id());
            return;
        }

        let handle = match handle {
            Some(h) => Some(Arc::clone(h)),
            None => find_first_anchor_handle(&self.children()),
        };
        let center = self.center_position();
        let hand_position = hand.world_transform().position;

        let mut state = self.state.lock();
        state.grab.previous_anchor = state.anchor.clone();
        state.grab.left = left;
        state.anchor.clear();
        state.anchor.set_direct(hand);
        match handle {
            Some(handle) => {
                let offset = center - hand_position;
                state.anchor.set_offset(offset);
                state.grab.grabbed = Arc::downgrade(&handle);
                trace!(
                    "[driver '{}'] positioning with {} hand, offset=({:.1},{:.1},{:.1})",
                    self.base.id(),
                    if left { "left" } else { "right" },
                    offset.x,
                    offset.y,
                    offset.z
                );
            }
            None => {
                state.anchor.set_offset(Vec3::ZERO);
                state.grab.grabbed = Weak::new();
            }
        }
        state.grab.active = true;
    }

    /// Track a different handle for drift compensation, or the first
    /// anchor handle in the subtree.
    pub fn update_grabbed_projectile(&self, handle: Option<&Arc<ControlledProjectile>>) {
        if !self.is_grabbing() {
            return;
        }
        let handle = match handle {
            Some(h) => Some(Arc::clone(h)),
            None => find_first_anchor_handle(&self.children()),
        };
        self.state.lock().grab.grabbed = handle.as_ref().map(Arc::downgrade).unwrap_or_default();
    }

    /// Drop the hand and keep the driver where it was released.
    pub fn end_driver_positioning(&self) {
        if !self.is_grabbing() {
            return;
        }
        let center = self.center_position();
        let previous = self.state.lock().grab.previous_anchor.clone();
        let previous_node = self.host().and_then(|h| previous.resolve_node(h.as_ref()));

        let mut state = self.state.lock();
        state.grab.grabbed = Weak::new();
        match previous_node {
            Some(node) => {
                let mut restored = previous;
                restored.set_offset(center - node.world_transform().position);
                state.anchor = restored;
            }
            None => {
                state.anchor.clear();
                state.anchor.set_world_position(center);
            }
        }
        state.grab.active = false;
        trace!(
            "[driver '{}'] end positioning at ({:.1},{:.1},{:.1})",
            self.base.id(),
            center.x,
            center.y,
            center.z
        );
    }

    // ── Text ─────────────────────────────────────────────────

    pub fn set_text(&self, text: &str) {
        if self.layout_mut::<TextLayout, _>(|t| t.set_text(text)).is_none() {
            warn!("[driver '{}'] set_text on a {} driver", self.base.id(), self.kind.as_str());
        }
    }

    pub fn text_content(&self) -> String {
        self.layout::<TextLayout, _>(|t| t.text()).unwrap_or_default()
    }

    pub fn set_text_scale(&self, scale: f32) {
        self.layout_mut::<TextLayout, _>(|t| t.set_scale(scale));
    }

    pub fn set_text_alignment(&self, alignment: TextAlignment) {
        self.layout_mut::<TextLayout, _>(|t| t.set_alignment(alignment));
    }

    pub fn text_bounds(&self) -> TextBounds {
        self.layout::<TextLayout, _>(|t| t.bounds()).unwrap_or_default()
    }
}

fn find_first_anchor_handle(children: &[Node]) -> Option<Arc<ControlledProjectile>> {
    for child in children {
        match child {
            Node::Projectile(p) if p.is_anchor_handle() => return Some(Arc::clone(p)),
            Node::Projectile(_) => {}
            Node::Driver(d) => {
                if let Some(found) = find_first_anchor_handle(&d.children()) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Show or hide a child the way scrolling layouts do: hidden projectiles
/// also collapse to zero scale so their last frame never lingers.
///
/// An initialized projectile's local scale is overwritten with 1.0 or 0.0
/// on every call, so children of row, column and half-wheel layouts cannot
/// keep a local scale of their own. Use `set_base_scale` to size them.
pub(crate) fn set_child_shown(child: &Node, shown: bool) {
    child.set_visible(shown);
    if let Node::Projectile(p) = child {
        if p.is_initialized() {
            p.base().set_local_scale(if shown { 1.0 } else { 0.0 });
        }
    }
}
