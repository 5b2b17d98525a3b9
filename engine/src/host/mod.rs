//! Host game boundary.
//!
//! Everything the engine consumes from the host game and the VR runtime
//! goes through `Host`: projectile forms, launching and looking up
//! projectiles, writing their transforms, hand/HMD nodes, the main-thread
//! task queue and the haptic short-pulse primitive.
//!
//! `headless` provides an in-memory host used by the binary and tests.

pub mod headless;

use std::fmt;
use std::sync::Arc;

use crate::math::{Mat3, Transform, Vec3};

// ── Handles ──────────────────────────────────────────────────

/// Host record id of a preallocated projectile or ammo form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormId(pub u32);

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Host reference handle. `0` never resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RefHandle(pub u32);

impl RefHandle {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Address of a live host projectile. Only meaningful while its handle
/// still resolves to the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjectilePtr(pub u64);

impl fmt::Display for ProjectilePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ── Requests ─────────────────────────────────────────────────

/// Atlas cell shown by a character mesh, in a `cols` x `rows` grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharUv {
    pub col: u32,
    pub row: u32,
    pub cols: u32,
    pub rows: u32,
}

/// Arguments of the host's `LaunchArrow`.
#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest {
    pub weapon_form: FormId,
    pub ammo_form: FormId,
    /// Projectile form the ammo fires; becomes the projectile's base form.
    pub projectile_form: FormId,
    pub position: Vec3,
    /// `(pitch, roll, yaw)` radians.
    pub angles: Vec3,
}

/// Per-tick transform overwrite for one projectile.
#[derive(Debug, Clone, Copy)]
pub struct ProjectileWrite {
    pub position: Vec3,
    pub rotation: Mat3,
    pub scale: f32,
}

/// Work that must run on the host's main thread.
pub type MainTask = Box<dyn FnOnce() + Send + 'static>;

// ── Scene nodes ──────────────────────────────────────────────

/// A node in the host's scene graph (hand, wrist, HMD, reference 3D root).
pub trait HostNode: Send + Sync + fmt::Debug {
    fn world_transform(&self) -> Transform;

    /// False once the node has been detached from the scene graph.
    fn has_parent(&self) -> bool;
}

pub type NodeRef = Arc<dyn HostNode>;

// ── Host ─────────────────────────────────────────────────────

pub trait Host: Send + Sync {
    // Forms
    fn set_form_model(&self, form: FormId, model: &str);
    /// Write `range` and `gravity` into a projectile form's data.
    fn set_form_flight(&self, form: FormId, range: f32, gravity: f32);

    // Projectiles
    fn launch_arrow(&self, request: &LaunchRequest) -> Option<RefHandle>;
    fn lookup_by_handle(&self, handle: RefHandle) -> Option<ProjectilePtr>;
    fn handle_for(&self, ptr: ProjectilePtr) -> RefHandle;
    fn base_form_of(&self, ptr: ProjectilePtr) -> Option<FormId>;
    /// Zero velocities, reset runtime range/lifetime and write the
    /// transform into the projectile's data and 3D node. False when the
    /// projectile has no 3D node yet.
    fn write_projectile(&self, ptr: ProjectilePtr, write: &ProjectileWrite) -> bool;
    /// Geometry children under the texture container, `None` until the
    /// model has loaded.
    fn geometry_node_count(&self, ptr: ProjectilePtr) -> Option<usize>;
    fn set_texture(&self, ptr: ProjectilePtr, path: &str) -> bool;
    /// Point the material's UV offset and scale at one atlas cell.
    fn set_char_uv(&self, ptr: ProjectilePtr, uv: CharUv) -> bool;
    fn hide_projectile(&self, ptr: ProjectilePtr);
    fn disable_projectile(&self, ptr: ProjectilePtr);
    fn set_delete(&self, ptr: ProjectilePtr);
    /// Projectiles currently in the player's cell.
    fn cell_projectiles(&self) -> Vec<ProjectilePtr>;

    // Threads and hooks
    fn queue_main_task(&self, task: MainTask);
    /// Install the per-frame and per-tick hooks. Called once.
    fn install_frame_hooks(&self) -> bool;
    /// Register with the VR runtime's controller-state stream. False when
    /// the runtime's hook manager is missing.
    fn register_controller_callback(&self) -> bool;
    fn is_game_stopped(&self) -> bool;
    fn is_menu_open(&self) -> bool;

    // VR nodes
    fn hand_node(&self, left: bool) -> Option<NodeRef>;
    fn wrist_node(&self, left: bool) -> Option<NodeRef>;
    fn hmd_position(&self) -> Vec3;
    fn player_position(&self) -> Vec3;
    fn reference_node(&self, handle: RefHandle, child: Option<&str>) -> Option<NodeRef>;

    // Devices and assets
    fn trigger_haptic(&self, left: bool, strength: f32);
    /// Blocking texture load, called from the loader's worker thread.
    fn load_texture(&self, path: &str) -> bool;
}
