//! In-memory host for CI, the demo binary and tests.
//!
//! Simulates the host's projectile tables (pointer + handle), form records,
//! a main-thread task queue that the caller drains, tracked hand/wrist/HMD
//! nodes, and a texture store. Geometry appears a configurable number of
//! physics ticks after launch, mimicking asynchronous model loading.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
    CharUv, FormId, Host, HostNode, LaunchRequest, MainTask, NodeRef, ProjectilePtr,
    ProjectileWrite, RefHandle,
};
use crate::math::{Mat3, Transform, Vec3};

// ── Nodes ────────────────────────────────────────────────────

/// A movable scene node with optional named children.
#[derive(Debug)]
pub struct HeadlessNode {
    transform: Mutex<Transform>,
    attached: AtomicBool,
    children: Mutex<HashMap<String, Arc<HeadlessNode>>>,
}

impl HeadlessNode {
    pub fn new(position: Vec3) -> Arc<Self> {
        Arc::new(Self {
            transform: Mutex::new(Transform::at(position)),
            attached: AtomicBool::new(true),
            children: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_position(&self, position: Vec3) {
        self.transform.lock().position = position;
    }

    pub fn set_rotation(&self, rotation: Mat3) {
        self.transform.lock().rotation = rotation;
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::Release);
    }

    pub fn add_child(&self, name: &str, child: Arc<HeadlessNode>) {
        self.children.lock().insert(name.to_string(), child);
    }

    pub fn child(&self, name: &str) -> Option<Arc<HeadlessNode>> {
        self.children.lock().get(name).cloned()
    }
}

impl HostNode for HeadlessNode {
    fn world_transform(&self) -> Transform {
        *self.transform.lock()
    }

    fn has_parent(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

// ── Projectiles ──────────────────────────────────────────────

/// Observable state of a simulated projectile.
#[derive(Debug, Clone)]
pub struct SimProjectile {
    pub base_form: FormId,
    pub handle: RefHandle,
    pub model: String,
    pub position: Vec3,
    pub rotation: Mat3,
    pub scale: f32,
    pub ticks: u32,
    pub hidden: bool,
    pub disabled: bool,
    pub deleted: bool,
    pub textures: Vec<String>,
    pub char_uv: Option<CharUv>,
}

#[derive(Default)]
struct World {
    next_ptr: u64,
    next_handle: u32,
    projectiles: HashMap<ProjectilePtr, SimProjectile>,
    handles: HashMap<RefHandle, ProjectilePtr>,
    form_models: HashMap<FormId, String>,
    form_flight: HashMap<FormId, (f32, f32)>,
    references: HashMap<RefHandle, Arc<HeadlessNode>>,
    launches: u32,
    last_launch: Option<LaunchRequest>,
}

// ── Host ─────────────────────────────────────────────────────

/// Called after a form's model changes, outside the world lock.
pub type FormModelHook = Arc<dyn Fn(FormId, &str) + Send + Sync>;

pub struct HeadlessHost {
    world: Mutex<World>,
    tasks: Mutex<VecDeque<MainTask>>,
    hands: [Arc<HeadlessNode>; 2],
    wrists: [Arc<HeadlessNode>; 2],
    hmd: Mutex<Vec3>,
    player: Mutex<Vec3>,
    geometry_delay: AtomicU32,
    fail_launches: AtomicBool,
    game_stopped: AtomicBool,
    menu_open: AtomicBool,
    controller_stream: AtomicBool,
    hooks_installed: AtomicU32,
    missing_textures: Mutex<HashSet<String>>,
    haptics: Mutex<Vec<(bool, f32)>>,
    form_model_hook: Mutex<Option<FormModelHook>>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

fn hand_index(left: bool) -> usize {
    if left {
        0
    } else {
        1
    }
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self {
            world: Mutex::new(World {
                next_ptr: 0x1000,
                next_handle: 1,
                ..Default::default()
            }),
            tasks: Mutex::new(VecDeque::new()),
            hands: [
                HeadlessNode::new(Vec3::new(-20.0, 40.0, 100.0)),
                HeadlessNode::new(Vec3::new(20.0, 40.0, 100.0)),
            ],
            wrists: [
                HeadlessNode::new(Vec3::new(-20.0, 30.0, 100.0)),
                HeadlessNode::new(Vec3::new(20.0, 30.0, 100.0)),
            ],
            hmd: Mutex::new(Vec3::new(0.0, 0.0, 120.0)),
            player: Mutex::new(Vec3::ZERO),
            geometry_delay: AtomicU32::new(0),
            fail_launches: AtomicBool::new(false),
            game_stopped: AtomicBool::new(false),
            menu_open: AtomicBool::new(false),
            controller_stream: AtomicBool::new(true),
            hooks_installed: AtomicU32::new(0),
            missing_textures: Mutex::new(HashSet::new()),
            haptics: Mutex::new(Vec::new()),
            form_model_hook: Mutex::new(None),
        }
    }

    /// Physics ticks before a new projectile's geometry exists.
    pub fn set_geometry_delay(&self, ticks: u32) {
        self.geometry_delay.store(ticks, Ordering::Relaxed);
    }

    pub fn set_form_model_hook(&self, hook: Option<FormModelHook>) {
        *self.form_model_hook.lock() = hook;
    }

    pub fn set_fail_launches(&self, fail: bool) {
        self.fail_launches.store(fail, Ordering::Relaxed);
    }

    pub fn set_game_stopped(&self, stopped: bool) {
        self.game_stopped.store(stopped, Ordering::Relaxed);
    }

    pub fn set_menu_open(&self, open: bool) {
        self.menu_open.store(open, Ordering::Relaxed);
    }

    pub fn set_controller_stream_available(&self, available: bool) {
        self.controller_stream.store(available, Ordering::Relaxed);
    }

    pub fn set_hmd_position(&self, position: Vec3) {
        *self.hmd.lock() = position;
    }

    pub fn set_player_position(&self, position: Vec3) {
        *self.player.lock() = position;
    }

    pub fn hand(&self, left: bool) -> Arc<HeadlessNode> {
        Arc::clone(&self.hands[hand_index(left)])
    }

    pub fn wrist(&self, left: bool) -> Arc<HeadlessNode> {
        Arc::clone(&self.wrists[hand_index(left)])
    }

    pub fn set_hand_position(&self, left: bool, position: Vec3) {
        self.hands[hand_index(left)].set_position(position);
    }

    pub fn mark_texture_missing(&self, path: &str) {
        self.missing_textures.lock().insert(path.to_string());
    }

    /// Register a reference whose 3D root is `node`.
    pub fn add_reference(&self, node: Arc<HeadlessNode>) -> RefHandle {
        let mut world = self.world.lock();
        let handle = RefHandle(world.next_handle);
        world.next_handle += 1;
        world.references.insert(handle, node);
        handle
    }

    /// Drain the main-thread queue, including tasks queued while draining.
    pub fn run_main_tasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.tasks.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Live (not destroyed) projectile pointers, for driving physics ticks.
    pub fn projectile_ptrs(&self) -> Vec<ProjectilePtr> {
        let world = self.world.lock();
        let mut ptrs: Vec<_> = world.projectiles.keys().copied().collect();
        ptrs.sort_by_key(|p| p.0);
        ptrs
    }

    pub fn projectile(&self, ptr: ProjectilePtr) -> Option<SimProjectile> {
        self.world.lock().projectiles.get(&ptr).cloned()
    }

    /// Destroy a projectile the way the host does: silently.
    pub fn destroy_projectile(&self, ptr: ProjectilePtr) {
        let mut world = self.world.lock();
        if let Some(p) = world.projectiles.remove(&ptr) {
            world.handles.remove(&p.handle);
            debug!("headless: destroyed projectile {}", ptr);
        }
    }

    /// Remove every projectile flagged for deletion. Returns the count.
    pub fn collect_deleted(&self) -> usize {
        let doomed: Vec<_> = {
            let world = self.world.lock();
            world
                .projectiles
                .iter()
                .filter(|(_, p)| p.deleted)
                .map(|(ptr, _)| *ptr)
                .collect()
        };
        for ptr in &doomed {
            self.destroy_projectile(*ptr);
        }
        doomed.len()
    }

    /// Place a projectile of `form` in the cell without launching it, as a
    /// save from an earlier session would.
    pub fn spawn_stray(&self, form: FormId) -> ProjectilePtr {
        let mut world = self.world.lock();
        Self::spawn_locked(&mut world, form, Vec3::ZERO)
    }

    pub fn form_model(&self, form: FormId) -> Option<String> {
        self.world.lock().form_models.get(&form).cloned()
    }

    pub fn form_flight(&self, form: FormId) -> Option<(f32, f32)> {
        self.world.lock().form_flight.get(&form).copied()
    }

    pub fn launch_count(&self) -> u32 {
        self.world.lock().launches
    }

    pub fn last_launch(&self) -> Option<LaunchRequest> {
        self.world.lock().last_launch
    }

    pub fn hooks_installed(&self) -> u32 {
        self.hooks_installed.load(Ordering::Relaxed)
    }

    pub fn haptic_pulses(&self) -> Vec<(bool, f32)> {
        self.haptics.lock().clone()
    }

    fn spawn_locked(world: &mut World, form: FormId, position: Vec3) -> ProjectilePtr {
        let ptr = ProjectilePtr(world.next_ptr);
        world.next_ptr += 0x10;
        let handle = RefHandle(world.next_handle);
        world.next_handle += 1;
        let model = world.form_models.get(&form).cloned().unwrap_or_default();
        world.projectiles.insert(
            ptr,
            SimProjectile {
                base_form: form,
                handle,
                model,
                position,
                rotation: Mat3::IDENTITY,
                scale: 1.0,
                ticks: 0,
                hidden: false,
                disabled: false,
                deleted: false,
                textures: Vec::new(),
                char_uv: None,
            },
        );
        world.handles.insert(handle, ptr);
        ptr
    }
}

impl Host for HeadlessHost {
    fn set_form_model(&self, form: FormId, model: &str) {
        self.world.lock().form_models.insert(form, model.to_string());
        let hook = self.form_model_hook.lock().clone();
        if let Some(hook) = hook {
            hook(form, model);
        }
    }

    fn set_form_flight(&self, form: FormId, range: f32, gravity: f32) {
        self.world.lock().form_flight.insert(form, (range, gravity));
    }

    fn launch_arrow(&self, request: &LaunchRequest) -> Option<RefHandle> {
        if self.fail_launches.load(Ordering::Relaxed) {
            return None;
        }
        let mut world = self.world.lock();
        world.launches += 1;
        world.last_launch = Some(*request);
        let ptr = Self::spawn_locked(&mut world, request.projectile_form, request.position);
        world.projectiles.get(&ptr).map(|p| p.handle)
    }

    fn lookup_by_handle(&self, handle: RefHandle) -> Option<ProjectilePtr> {
        if !handle.is_valid() {
            return None;
        }
        self.world.lock().handles.get(&handle).copied()
    }

    fn handle_for(&self, ptr: ProjectilePtr) -> RefHandle {
        self.world
            .lock()
            .projectiles
            .get(&ptr)
            .map(|p| p.handle)
            .unwrap_or(RefHandle::INVALID)
    }

    fn base_form_of(&self, ptr: ProjectilePtr) -> Option<FormId> {
        self.world.lock().projectiles.get(&ptr).map(|p| p.base_form)
    }

    fn write_projectile(&self, ptr: ProjectilePtr, write: &ProjectileWrite) -> bool {
        let mut world = self.world.lock();
        match world.projectiles.get_mut(&ptr) {
            Some(p) => {
                p.position = write.position;
                p.rotation = write.rotation;
                p.scale = write.scale;
                p.ticks = p.ticks.saturating_add(1);
                true
            }
            None => false,
        }
    }

    fn geometry_node_count(&self, ptr: ProjectilePtr) -> Option<usize> {
        let delay = self.geometry_delay.load(Ordering::Relaxed);
        let world = self.world.lock();
        let p = world.projectiles.get(&ptr)?;
        (p.ticks >= delay).then_some(1)
    }

    fn set_texture(&self, ptr: ProjectilePtr, path: &str) -> bool {
        let mut world = self.world.lock();
        match world.projectiles.get_mut(&ptr) {
            Some(p) => {
                p.textures.push(path.to_string());
                true
            }
            None => false,
        }
    }

    fn set_char_uv(&self, ptr: ProjectilePtr, uv: CharUv) -> bool {
        let mut world = self.world.lock();
        match world.projectiles.get_mut(&ptr) {
            Some(p) => {
                p.char_uv = Some(uv);
                true
            }
            None => false,
        }
    }

    fn hide_projectile(&self, ptr: ProjectilePtr) {
        if let Some(p) = self.world.lock().projectiles.get_mut(&ptr) {
            p.hidden = true;
        }
    }

    fn disable_projectile(&self, ptr: ProjectilePtr) {
        if let Some(p) = self.world.lock().projectiles.get_mut(&ptr) {
            p.disabled = true;
        }
    }

    fn set_delete(&self, ptr: ProjectilePtr) {
        if let Some(p) = self.world.lock().projectiles.get_mut(&ptr) {
            p.deleted = true;
        }
    }

    fn cell_projectiles(&self) -> Vec<ProjectilePtr> {
        self.projectile_ptrs()
    }

    fn queue_main_task(&self, task: MainTask) {
        self.tasks.lock().push_back(task);
    }

    fn install_frame_hooks(&self) -> bool {
        self.hooks_installed.fetch_add(1, Ordering::Relaxed);
        info!("headless: frame and physics hooks installed");
        true
    }

    fn register_controller_callback(&self) -> bool {
        self.controller_stream.load(Ordering::Relaxed)
    }

    fn is_game_stopped(&self) -> bool {
        self.game_stopped.load(Ordering::Relaxed)
    }

    fn is_menu_open(&self) -> bool {
        self.menu_open.load(Ordering::Relaxed)
    }

    fn hand_node(&self, left: bool) -> Option<NodeRef> {
        let node = &self.hands[hand_index(left)];
        node.has_parent().then(|| Arc::clone(node) as NodeRef)
    }

    fn wrist_node(&self, left: bool) -> Option<NodeRef> {
        Some(Arc::clone(&self.wrists[hand_index(left)]) as NodeRef)
    }

    fn hmd_position(&self) -> Vec3 {
        *self.hmd.lock()
    }

    fn player_position(&self) -> Vec3 {
        *self.player.lock()
    }

    fn reference_node(&self, handle: RefHandle, child: Option<&str>) -> Option<NodeRef> {
        let root = self.world.lock().references.get(&handle).cloned()?;
        match child {
            Some(name) if !name.is_empty() => root.child(name).map(|c| c as NodeRef),
            _ => Some(root as NodeRef),
        }
    }

    fn trigger_haptic(&self, left: bool, strength: f32) {
        self.haptics.lock().push((left, strength));
    }

    fn load_texture(&self, path: &str) -> bool {
        !self.missing_textures.lock().contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(host: &HeadlessHost) -> ProjectilePtr {
        let handle = host
            .launch_arrow(&LaunchRequest {
                weapon_form: FormId(0x700),
                ammo_form: FormId(0x900),
                projectile_form: FormId(0x800),
                position: Vec3::ZERO,
                angles: Vec3::ZERO,
            })
            .unwrap();
        host.lookup_by_handle(handle).unwrap()
    }

    #[test]
    fn test_launch_and_lookup() {
        let host = HeadlessHost::new();
        host.set_form_model(FormId(0x800), "m.nif");
        let ptr = launch(&host);
        assert_eq!(host.base_form_of(ptr), Some(FormId(0x800)));
        assert_eq!(host.projectile(ptr).unwrap().model, "m.nif");
        assert!(host.handle_for(ptr).is_valid());
    }

    #[test]
    fn test_destroyed_handle_no_longer_resolves() {
        let host = HeadlessHost::new();
        let ptr = launch(&host);
        let handle = host.handle_for(ptr);
        host.destroy_projectile(ptr);
        assert_eq!(host.lookup_by_handle(handle), None);
        assert_eq!(host.lookup_by_handle(RefHandle::INVALID), None);
    }

    #[test]
    fn test_geometry_delay() {
        let host = HeadlessHost::new();
        host.set_geometry_delay(2);
        let ptr = launch(&host);
        let write = ProjectileWrite {
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
            scale: 1.0,
        };
        assert_eq!(host.geometry_node_count(ptr), None);
        host.write_projectile(ptr, &write);
        assert_eq!(host.geometry_node_count(ptr), None);
        host.write_projectile(ptr, &write);
        assert_eq!(host.geometry_node_count(ptr), Some(1));
    }

    #[test]
    fn test_main_tasks_drain_nested() {
        let host = Arc::new(HeadlessHost::new());
        let inner = Arc::clone(&host);
        host.queue_main_task(Box::new(move || {
            inner.queue_main_task(Box::new(|| {}));
        }));
        assert_eq!(host.run_main_tasks(), 2);
        assert_eq!(host.pending_tasks(), 0);
    }

    #[test]
    fn test_reference_child_lookup() {
        let host = HeadlessHost::new();
        let root = HeadlessNode::new(Vec3::new(1.0, 2.0, 3.0));
        root.add_child("NPC Head", HeadlessNode::new(Vec3::new(0.0, 0.0, 9.0)));
        let handle = host.add_reference(root);
        let head = host.reference_node(handle, Some("NPC Head")).unwrap();
        assert!((head.world_transform().position.z - 9.0).abs() < 1e-5);
        assert!(host.reference_node(handle, Some("missing")).is_none());
        assert!(host.reference_node(handle, None).is_some());
    }

    #[test]
    fn test_detached_hand_is_unavailable() {
        let host = HeadlessHost::new();
        assert!(host.hand_node(true).is_some());
        host.hand(true).set_attached(false);
        assert!(host.hand_node(true).is_none());
    }
}
