//! Hover tooltips on the back of each wrist.
//!
//! Each hand gets a hidden root driver with a single text driver, built on
//! the first `show_tooltip`. A tooltip remembers which element showed it so
//! a late hide from an element the hand already left cannot remove the
//! newer tooltip.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::driver::{ProjectileDriver, TextAlignment};
use crate::engine::Engine;
use crate::id::Identifier;
use crate::math::{Mat3, Vec3};
use crate::smoother::TransitionMode;

#[derive(Debug, Clone, Copy)]
pub struct TooltipSettings {
    /// Wrist-relative in x and y, world-space in z.
    pub offset: Vec3,
    /// `(pitch, roll, yaw)` radians applied to the tooltip root.
    pub rotation_offset: Vec3,
    pub text_scale: f32,
    /// Distance the tooltip is pulled toward the HMD.
    pub towards_player_distance: f32,
}

impl Default for TooltipSettings {
    fn default() -> Self {
        Self {
            offset: Vec3::new(5.0, 0.0, 8.0),
            rotation_offset: Vec3::new(-0.4, 0.0, 0.0),
            text_scale: 0.9,
            towards_player_distance: 2.0,
        }
    }
}

#[derive(Default)]
struct HandTooltip {
    root: Option<Arc<ProjectileDriver>>,
    text: Option<Arc<ProjectileDriver>>,
    owner: Option<Identifier>,
    current_text: String,
    visible: bool,
}

fn hand_name(left: bool) -> &'static str {
    if left {
        "left"
    } else {
        "right"
    }
}

pub struct TooltipManager {
    engine: Weak<Engine>,
    hands: Mutex<[HandTooltip; 2]>,
    settings: Mutex<TooltipSettings>,
}

impl TooltipManager {
    pub fn new(engine: Weak<Engine>) -> Self {
        Self {
            engine,
            hands: Mutex::new(Default::default()),
            settings: Mutex::new(TooltipSettings::default()),
        }
    }

    fn hand(left: bool) -> usize {
        if left {
            0
        } else {
            1
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.hands.lock()[0].root.is_some()
    }

    fn ensure_initialized(&self) -> bool {
        if self.is_initialized() {
            return true;
        }
        let Some(engine) = self.engine.upgrade() else {
            warn!("tooltip: engine dropped before first tooltip");
            return false;
        };
        let settings = self.settings();
        let mut hands = self.hands.lock();
        for left in [true, false] {
            let text = ProjectileDriver::text(&engine);
            text.base().set_id(&format!("tooltip text {}", hand_name(left)));
            text.set_text_scale(settings.text_scale);
            text.set_text_alignment(TextAlignment::Center);

            let root = ProjectileDriver::root(&engine);
            root.base().set_id(&format!("tooltip {}", hand_name(left)));
            root.base().set_local_rotation(Mat3::from_euler(settings.rotation_offset));
            root.add_child(Arc::clone(&text));
            root.set_transition_mode(TransitionMode::Instant);

            let hand = &mut hands[Self::hand(left)];
            hand.root = Some(root);
            hand.text = Some(text);
        }
        info!("tooltip: created wrist tooltips");
        true
    }

    /// Drop both tooltip trees.
    pub fn shutdown(&self) {
        self.hide_all();
        let taken: Vec<HandTooltip> = {
            let mut hands = self.hands.lock();
            hands.iter_mut().map(std::mem::take).collect()
        };
        for hand in taken {
            if let Some(root) = hand.root {
                root.clear();
                if let Some(engine) = self.engine.upgrade() {
                    engine.update_manager().unregister(&root);
                }
            }
        }
        debug!("tooltip: shut down");
    }

    // ── Display ──────────────────────────────────────────────

    pub fn show_tooltip(&self, left: bool, owner: Identifier, text: &str) {
        if !self.ensure_initialized() {
            return;
        }
        let (root, driver) = {
            let mut hands = self.hands.lock();
            let hand = &mut hands[Self::hand(left)];
            hand.owner = Some(owner);
            hand.current_text = text.to_string();
            hand.visible = true;
            (hand.root.clone(), hand.text.clone())
        };
        trace!("tooltip: show {} hand owner={} text='{}'", hand_name(left), owner, text);
        if let Some(driver) = driver {
            driver.set_text(text);
        }
        if let Some(root) = root {
            root.set_visible(true);
        }
    }

    /// Hide only when `owner` showed the current tooltip.
    pub fn hide_tooltip(&self, left: bool, owner: Identifier) {
        let current = self.hands.lock()[Self::hand(left)].owner;
        if current == Some(owner) {
            self.force_hide_tooltip(left);
        } else {
            trace!(
                "tooltip: hide {} hand owner={} skipped, current={:?}",
                hand_name(left),
                owner,
                current.map(|id| id.to_string())
            );
        }
    }

    pub fn force_hide_tooltip(&self, left: bool) {
        let root = {
            let mut hands = self.hands.lock();
            let hand = &mut hands[Self::hand(left)];
            hand.owner = None;
            hand.current_text.clear();
            hand.visible = false;
            hand.root.clone()
        };
        if let Some(root) = root {
            root.set_visible(false);
        }
        trace!("tooltip: hidden on {} hand", hand_name(left));
    }

    pub fn hide_all(&self) {
        self.force_hide_tooltip(true);
        self.force_hide_tooltip(false);
    }

    pub fn is_tooltip_visible(&self, left: bool) -> bool {
        self.hands.lock()[Self::hand(left)].visible
    }

    /// Text on `left`'s tooltip, empty while hidden.
    pub fn current_text(&self, left: bool) -> String {
        let hands = self.hands.lock();
        let hand = &hands[Self::hand(left)];
        if hand.visible {
            hand.current_text.clone()
        } else {
            String::new()
        }
    }

    pub fn root(&self, left: bool) -> Option<Arc<ProjectileDriver>> {
        self.hands.lock()[Self::hand(left)].root.clone()
    }

    // ── Settings ─────────────────────────────────────────────

    pub fn settings(&self) -> TooltipSettings {
        *self.settings.lock()
    }

    pub fn set_offset(&self, offset: Vec3) {
        self.settings.lock().offset = offset;
    }

    pub fn set_rotation_offset(&self, rotation: Vec3) {
        self.settings.lock().rotation_offset = rotation;
        for left in [true, false] {
            if let Some(root) = self.root(left) {
                root.base().set_local_rotation(Mat3::from_euler(rotation));
            }
        }
    }

    pub fn set_text_scale(&self, scale: f32) {
        self.settings.lock().text_scale = scale;
        let drivers: Vec<Arc<ProjectileDriver>> = self.hands.lock().iter().filter_map(|h| h.text.clone()).collect();
        for driver in drivers {
            driver.set_text_scale(scale);
        }
    }

    pub fn set_towards_player_distance(&self, distance: f32) {
        self.settings.lock().towards_player_distance = distance;
    }

    // ── Frame ────────────────────────────────────────────────

    /// Move visible tooltips to their wrists.
    pub fn update(&self, _dt: f32) {
        if !self.is_initialized() {
            return;
        }
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let settings = self.settings();
        for left in [true, false] {
            let root = {
                let hands = self.hands.lock();
                let hand = &hands[Self::hand(left)];
                if !hand.visible {
                    continue;
                }
                hand.root.clone()
            };
            let Some(root) = root else {
                continue;
            };
            let Some(wrist) = engine.host().wrist_node(left) else {
                warn!("tooltip: {} wrist node unavailable", hand_name(left));
                continue;
            };
            let wrist = wrist.world_transform();
            let planar = wrist.rotation.rotate(Vec3::new(settings.offset.x, settings.offset.y, 0.0));
            let mut position = wrist.position + Vec3::new(planar.x, planar.y, settings.offset.z);

            if settings.towards_player_distance > 0.0 {
                let to_hmd = engine.host().hmd_position() - position;
                let distance = to_hmd.length();
                if distance > 0.001 {
                    position = position + to_hmd.scale(settings.towards_player_distance / distance);
                }
            }
            root.set_center(position);
        }
    }
}
