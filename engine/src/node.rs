//! Scene-graph nodes and input events.
//!
//! A node is either a leaf `ControlledProjectile` or an interior
//! `ProjectileDriver`. Children are owned by their driver through `Node`;
//! the back-reference to the parent is a `WeakNode` so the tree never
//! forms a strong cycle.
//!
//! World transforms are derived, never stored:
//! - `world_rot = parent.world_rot * local_rot`
//! - `world_pos = parent.world_pos + parent.world_rot * local_pos`
//! - `world_scale = parent.world_scale * local_scale`
//!
//! Locks on a node are held only long enough to copy data out. Nothing
//! calls into another node while holding its own lock.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::driver::ProjectileDriver;
use crate::host::NodeRef;
use crate::math::{Mat3, Vec3};
use crate::projectile::ControlledProjectile;

// ── Input events ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEventType {
    HoverEnter,
    HoverExit,
    GrabStart,
    GrabEnd,
    ActivateDown,
    ActivateUp,
}

impl InputEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HoverEnter => "hover-enter",
            Self::HoverExit => "hover-exit",
            Self::GrabStart => "grab-start",
            Self::GrabEnd => "grab-end",
            Self::ActivateDown => "activate-down",
            Self::ActivateUp => "activate-up",
        }
    }
}

/// One interaction event, bubbled from its source leaf toward the root.
#[derive(Debug, Clone)]
pub struct InputEvent {
    pub kind: InputEventType,
    /// Node that originated the event, usually a leaf.
    pub source: Option<Node>,
    pub hand_node: Option<NodeRef>,
    pub is_left_hand: bool,
    /// Activate events only: the element asked to close its menu.
    pub close_on_activate: bool,
    /// Cleared by elements that opt out of haptics while bubbling.
    pub send_haptic_pulse: bool,
}

impl InputEvent {
    pub fn new(kind: InputEventType, source: Option<Node>, hand_node: Option<NodeRef>, is_left_hand: bool) -> Self {
        Self {
            kind,
            source,
            hand_node,
            is_left_hand,
            close_on_activate: false,
            send_haptic_pulse: true,
        }
    }

    pub fn activate_down(source: Option<Node>, hand_node: Option<NodeRef>, is_left_hand: bool, close: bool) -> Self {
        Self {
            close_on_activate: close,
            ..Self::new(InputEventType::ActivateDown, source, hand_node, is_left_hand)
        }
    }

    /// The source leaf, when the event came from a projectile.
    pub fn source_projectile(&self) -> Option<&Arc<ControlledProjectile>> {
        self.source.as_ref().and_then(Node::as_projectile)
    }
}

/// Observer for events that reach a root driver.
pub type UnhandledEventCallback = Arc<dyn Fn(&InputEvent) + Send + Sync>;

// ── Per-node local state ─────────────────────────────────────

#[derive(Debug, Clone)]
struct NodeCore {
    id: String,
    position: Vec3,
    rotation: Mat3,
    scale: f32,
    visible: bool,
    parent: Option<WeakNode>,
}

impl Default for NodeCore {
    fn default() -> Self {
        Self {
            id: String::new(),
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
            scale: 1.0,
            visible: true,
            parent: None,
        }
    }
}

/// Local transform, visibility and parent link shared by every node kind.
#[derive(Debug, Default)]
pub struct NodeBase {
    core: Mutex<NodeCore>,
}

impl NodeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> String {
        self.core.lock().id.clone()
    }

    pub fn set_id(&self, id: &str) {
        self.core.lock().id = id.to_string();
    }

    pub fn local_position(&self) -> Vec3 {
        self.core.lock().position
    }

    pub fn set_local_position(&self, position: Vec3) {
        self.core.lock().position = position;
    }

    pub fn local_rotation(&self) -> Mat3 {
        self.core.lock().rotation
    }

    pub fn set_local_rotation(&self, rotation: Mat3) {
        self.core.lock().rotation = rotation;
    }

    pub fn local_scale(&self) -> f32 {
        self.core.lock().scale
    }

    pub fn set_local_scale(&self, scale: f32) {
        self.core.lock().scale = scale;
    }

    /// Local visibility: user intent, kept across parent hide cycles.
    pub fn is_visible(&self) -> bool {
        self.core.lock().visible
    }

    /// Store the visibility flag, returning the previous value.
    pub fn replace_visible(&self, visible: bool) -> bool {
        std::mem::replace(&mut self.core.lock().visible, visible)
    }

    pub fn parent(&self) -> Option<Node> {
        self.core.lock().parent.as_ref().and_then(WeakNode::upgrade)
    }

    pub fn has_parent(&self) -> bool {
        self.parent().is_some()
    }

    pub fn set_parent(&self, parent: Option<&Node>) {
        self.core.lock().parent = parent.map(Node::downgrade);
    }

    pub fn is_effectively_visible(&self) -> bool {
        if !self.is_visible() {
            return false;
        }
        self.parent().map_or(true, |p| p.is_effectively_visible())
    }

    pub fn world_rotation(&self) -> Mat3 {
        let (local, parent) = {
            let core = self.core.lock();
            (core.rotation, core.parent.clone())
        };
        match parent.and_then(|p| p.upgrade()) {
            Some(parent) => parent.world_rotation().mul(&local),
            None => local,
        }
    }

    /// World position; `origin` is used in place of a parent for roots.
    pub fn world_position_or(&self, origin: impl FnOnce() -> Vec3) -> Vec3 {
        let (local, parent) = {
            let core = self.core.lock();
            (core.position, core.parent.clone())
        };
        match parent.and_then(|p| p.upgrade()) {
            Some(parent) => parent.world_position() + parent.world_rotation().rotate(local),
            None => local + origin(),
        }
    }

    pub fn world_scale(&self) -> f32 {
        let (local, parent) = {
            let core = self.core.lock();
            (core.scale, core.parent.clone())
        };
        match parent.and_then(|p| p.upgrade()) {
            Some(parent) => parent.world_scale() * local,
            None => local,
        }
    }
}

// ── Node handles ─────────────────────────────────────────────

/// Strong handle to a scene-graph node.
#[derive(Clone)]
pub enum Node {
    Projectile(Arc<ControlledProjectile>),
    Driver(Arc<ProjectileDriver>),
}

/// Non-owning counterpart of `Node`.
#[derive(Clone)]
pub enum WeakNode {
    Projectile(Weak<ControlledProjectile>),
    Driver(Weak<ProjectileDriver>),
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        match self {
            Self::Projectile(w) => w.upgrade().map(Node::Projectile),
            Self::Driver(w) => w.upgrade().map(Node::Driver),
        }
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Projectile(_) => f.write_str("WeakNode::Projectile"),
            Self::Driver(_) => f.write_str("WeakNode::Driver"),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Projectile(p) => write!(f, "Projectile({:?})", p.base().id()),
            Self::Driver(d) => write!(f, "Driver({:?})", d.base().id()),
        }
    }
}

impl From<Arc<ControlledProjectile>> for Node {
    fn from(p: Arc<ControlledProjectile>) -> Self {
        Self::Projectile(p)
    }
}

impl From<Arc<ProjectileDriver>> for Node {
    fn from(d: Arc<ProjectileDriver>) -> Self {
        Self::Driver(d)
    }
}

impl Node {
    pub fn downgrade(&self) -> WeakNode {
        match self {
            Self::Projectile(p) => WeakNode::Projectile(Arc::downgrade(p)),
            Self::Driver(d) => WeakNode::Driver(Arc::downgrade(d)),
        }
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Self::Projectile(a), Self::Projectile(b)) => Arc::ptr_eq(a, b),
            (Self::Driver(a), Self::Driver(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_projectile(&self) -> Option<&Arc<ControlledProjectile>> {
        match self {
            Self::Projectile(p) => Some(p),
            Self::Driver(_) => None,
        }
    }

    pub fn as_driver(&self) -> Option<&Arc<ProjectileDriver>> {
        match self {
            Self::Driver(d) => Some(d),
            Self::Projectile(_) => None,
        }
    }

    pub fn base(&self) -> &NodeBase {
        match self {
            Self::Projectile(p) => p.base(),
            Self::Driver(d) => d.base(),
        }
    }

    pub fn id(&self) -> String {
        self.base().id()
    }

    pub fn set_id(&self, id: &str) {
        self.base().set_id(id);
    }

    pub fn local_position(&self) -> Vec3 {
        self.base().local_position()
    }

    pub fn set_local_position(&self, position: Vec3) {
        self.base().set_local_position(position);
    }

    pub fn local_rotation(&self) -> Mat3 {
        self.base().local_rotation()
    }

    pub fn set_local_rotation(&self, rotation: Mat3) {
        self.base().set_local_rotation(rotation);
    }

    /// Euler `(pitch, roll, yaw)` in degrees.
    pub fn set_local_rotation_degrees(&self, euler: Vec3) {
        self.base().set_local_rotation(Mat3::from_euler_degrees(euler));
    }

    pub fn local_scale(&self) -> f32 {
        self.base().local_scale()
    }

    pub fn set_local_scale(&self, scale: f32) {
        self.base().set_local_scale(scale);
    }

    pub fn parent(&self) -> Option<Node> {
        self.base().parent()
    }

    pub fn set_parent(&self, parent: Option<&Node>) {
        self.base().set_parent(parent);
    }

    pub fn world_position(&self) -> Vec3 {
        match self {
            Self::Projectile(p) => p.world_position(),
            Self::Driver(d) => d.world_position(),
        }
    }

    pub fn world_rotation(&self) -> Mat3 {
        match self {
            Self::Projectile(p) => p.world_rotation(),
            Self::Driver(d) => d.world_rotation(),
        }
    }

    pub fn world_scale(&self) -> f32 {
        match self {
            Self::Projectile(p) => p.world_scale(),
            Self::Driver(d) => d.world_scale(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.base().is_visible()
    }

    pub fn is_effectively_visible(&self) -> bool {
        self.base().is_effectively_visible()
    }

    pub fn initialize(&self) {
        match self {
            Self::Projectile(p) => p.initialize(),
            Self::Driver(d) => d.initialize(),
        }
    }

    pub fn update(&self, dt: f32) {
        match self {
            Self::Projectile(p) => p.update(dt),
            Self::Driver(d) => d.update(dt),
        }
    }

    pub fn set_visible(&self, visible: bool) {
        match self {
            Self::Projectile(p) => p.set_visible(visible),
            Self::Driver(d) => d.set_visible(visible),
        }
    }

    pub fn on_parent_hide(&self) {
        match self {
            Self::Projectile(p) => p.on_parent_hide(),
            Self::Driver(d) => d.on_parent_hide(),
        }
    }

    /// Handle an event at this node. Returns true when consumed.
    pub fn on_event(&self, event: &mut InputEvent) -> bool {
        match self {
            Self::Projectile(p) => p.on_event(event),
            Self::Driver(d) => d.on_event(event),
        }
    }

    /// Offer the event to this node, then each ancestor, until one consumes it.
    pub fn dispatch_event(&self, event: &mut InputEvent) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.on_event(event) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Topmost ancestor, or self.
    pub fn root(&self) -> Node {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::sim::Simulation;

    struct Tree {
        root: Arc<ProjectileDriver>,
        inner: Arc<ProjectileDriver>,
        leaf: Arc<ControlledProjectile>,
    }

    fn tree(sim: &Simulation) -> Tree {
        let root = ProjectileDriver::root(&sim.engine);
        let inner = ProjectileDriver::grid(&sim.engine);
        let leaf = ControlledProjectile::new(&sim.engine);
        inner.add_child(Arc::clone(&leaf));
        root.add_child(Arc::clone(&inner));
        Tree { root, inner, leaf }
    }

    #[test]
    fn test_effective_visibility_follows_ancestors() {
        let sim = Simulation::new(4);
        let t = tree(&sim);
        assert!(t.leaf.base().is_visible());
        assert!(!t.leaf.base().is_effectively_visible());

        t.root.set_visible(true);
        assert!(t.leaf.base().is_effectively_visible());

        t.inner.set_visible(false);
        assert!(!t.leaf.base().is_effectively_visible());
        assert!(t.leaf.base().is_visible());
    }

    #[test]
    fn test_parent_links_and_root() {
        let sim = Simulation::new(4);
        let t = tree(&sim);
        let leaf = Node::Projectile(Arc::clone(&t.leaf));
        assert!(leaf.parent().is_some_and(|p| p.ptr_eq(&Node::Driver(Arc::clone(&t.inner)))));
        assert!(leaf.root().ptr_eq(&Node::Driver(Arc::clone(&t.root))));

        let Tree { root, inner, leaf } = t;
        drop(root);
        drop(inner);
        assert!(!leaf.base().has_parent());
    }

    #[test]
    fn test_world_scale_multiplies_down_the_chain() {
        let sim = Simulation::new(4);
        let t = tree(&sim);
        t.root.base().set_local_scale(2.0);
        t.inner.base().set_local_scale(0.25);
        assert!((t.inner.base().world_scale() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_event_bubbles_until_consumed() {
        let sim = Simulation::new(4);
        let t = tree(&sim);
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = Arc::clone(&seen);
            t.root.set_on_event(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }
        let leaf = Node::Projectile(Arc::clone(&t.leaf));

        let mut event = InputEvent::new(InputEventType::HoverEnter, Some(leaf.clone()), None, true);
        assert!(!leaf.dispatch_event(&mut event));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        t.leaf.set_on_hover_enter(|| true);
        let mut event = InputEvent::new(InputEventType::HoverEnter, Some(leaf.clone()), None, true);
        assert!(leaf.dispatch_event(&mut event));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(event.source_projectile().map(|p| p.base().id()), Some(String::new()));
    }

    #[test]
    fn test_activate_down_carries_close_flag() {
        let event = InputEvent::activate_down(None, None, false, true);
        assert_eq!(event.kind, InputEventType::ActivateDown);
        assert!(event.close_on_activate);
        assert!(event.send_haptic_pulse);
        assert_eq!(event.kind.as_str(), "activate-down");
    }
}
