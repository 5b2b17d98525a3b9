//! Registry of controlled projectiles and the host-side fire path.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info, trace, warn};

use super::cleanup;
use super::controlled::ControlledProjectile;
use super::form_pool::{FormPool, PoolStats};
use crate::error::{EngineError, Result};
use crate::host::{FormId, Host, LaunchRequest, ProjectilePtr};
use crate::id::Identifier;
use crate::math::Vec3;

/// Launch point drop below the intended position.
pub const LAUNCH_DEPTH: f32 = 1000.0;

/// Host forms the engine renders through.
#[derive(Debug, Clone, Default)]
pub struct ProjectileForms {
    pub weapon: FormId,
    pub projectiles: Vec<FormId>,
    pub ammo: Vec<FormId>,
}

type Registry = HashMap<Identifier, Weak<ControlledProjectile>>;

pub struct ProjectileSubsystem {
    host: Arc<dyn Host>,
    pool: FormPool,
    registry: ReentrantMutex<RefCell<Registry>>,
    controlled: AtomicUsize,
    weapon_form: Mutex<Option<FormId>>,
    initialized: AtomicBool,
}

impl ProjectileSubsystem {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            pool: FormPool::new(Arc::clone(&host)),
            host,
            registry: ReentrantMutex::new(RefCell::new(HashMap::new())),
            controlled: AtomicUsize::new(0),
            weapon_form: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn initialize(&self, forms: &ProjectileForms) -> Result<()> {
        if self.is_initialized() {
            warn!("projectile subsystem already initialized");
            return Ok(());
        }
        if forms.projectiles.is_empty() || forms.ammo.is_empty() {
            return Err(EngineError::Host("no projectile or ammo forms available".into()));
        }
        self.pool.initialize(&forms.projectiles, &forms.ammo);
        *self.weapon_form.lock() = Some(forms.weapon);
        self.initialized.store(true, Ordering::Release);
        info!("projectile subsystem initialized with {} forms", self.pool.stats().total);
        Ok(())
    }

    pub fn shutdown(&self) {
        if !self.is_initialized() {
            warn!("projectile subsystem shutdown called but not initialized");
            return;
        }
        trace!("projectile subsystem shutdown, {} registered", self.registered_len());
        self.release_all_projectiles();
        self.pool.shutdown();
        *self.weapon_form.lock() = None;
        self.initialized.store(false, Ordering::Release);
        info!("projectile subsystem shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn pool(&self) -> &FormPool {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // ── Registry ─────────────────────────────────────────────

    pub fn register(&self, id: Identifier, projectile: &Arc<ControlledProjectile>) {
        let guard = self.registry.lock();
        let mut map = guard.borrow_mut();
        if map.insert(id, Arc::downgrade(projectile)).is_none() {
            self.controlled.fetch_add(1, Ordering::AcqRel);
        }
        trace!("[TRACK] registered projectile {}, map size now {}", id, map.len());
    }

    pub fn unregister(&self, id: Identifier) {
        let guard = self.registry.lock();
        let mut map = guard.borrow_mut();
        if map.remove(&id).is_some() {
            self.controlled.fetch_sub(1, Ordering::AcqRel);
        }
        trace!("[TRACK] unregistered projectile {}, map size now {}", id, map.len());
    }

    /// Live projectile for `id`. Expired entries are pruned on the way.
    pub fn get_projectile(&self, id: Identifier) -> Option<Arc<ControlledProjectile>> {
        let guard = self.registry.lock();
        let mut map = guard.borrow_mut();
        let weak = map.get(&id)?.clone();
        let projectile = weak.upgrade();
        if projectile.is_none() {
            map.remove(&id);
            self.controlled.fetch_sub(1, Ordering::AcqRel);
            warn!("projectile subsystem: {} found but expired", id);
        }
        projectile
    }

    pub fn has_projectile(&self, id: Identifier) -> bool {
        let guard = self.registry.lock();
        let map = guard.borrow();
        map.get(&id).is_some_and(|w| w.strong_count() > 0)
    }

    /// Registered projectiles that are still alive.
    pub fn active_count(&self) -> usize {
        let guard = self.registry.lock();
        let map = guard.borrow();
        map.values().filter(|w| w.strong_count() > 0).count()
    }

    /// Fast-path count read by the physics hook.
    pub fn controlled_count(&self) -> usize {
        self.controlled.load(Ordering::Acquire)
    }

    fn registered_len(&self) -> usize {
        self.registry.lock().borrow().len()
    }

    fn snapshot(&self) -> Vec<Weak<ControlledProjectile>> {
        self.registry.lock().borrow().values().cloned().collect()
    }

    /// Detach every projectile from its host projectile and forget them all.
    pub fn release_all_projectiles(&self) {
        let projectiles: Vec<_> = {
            let guard = self.registry.lock();
            let mut map = guard.borrow_mut();
            map.drain().map(|(_, w)| w).collect()
        };
        self.controlled.store(0, Ordering::Release);
        for projectile in projectiles.iter().filter_map(Weak::upgrade) {
            projectile.unbind_projectile();
        }
        info!("projectile subsystem released all projectiles");
    }

    // ── Forms ────────────────────────────────────────────────

    pub fn acquire_form(&self, model: &str) -> Option<usize> {
        let start = Instant::now();
        let _guard = self.registry.lock();
        let waited = start.elapsed().as_micros();
        if waited > 200 {
            warn!("[LOCK] acquire_form waited {}us (model='{}')", waited, model);
        }
        self.pool.acquire(model)
    }

    pub fn release_form(&self, index: usize) {
        let start = Instant::now();
        let _guard = self.registry.lock();
        let waited = start.elapsed().as_micros();
        if waited > 200 {
            warn!("[LOCK] release_form waited {}us (form={})", waited, index);
        }
        self.pool.release(index);
    }

    // ── Fire ─────────────────────────────────────────────────

    /// Queue a launch for a projectile in `Firing`. The main-thread task
    /// re-checks the generation before launching and binds the result.
    pub fn fire(&self, projectile: &ControlledProjectile) -> Result<()> {
        let transform = projectile.world_transform();
        projectile.seed_transform(transform);

        let id = projectile.identifier();
        let index = projectile
            .form_index()
            .ok_or_else(|| EngineError::Host(format!("projectile {} fired without a form", id)))?;
        trace!(
            "fire: {} form={} pos=({:.1},{:.1},{:.1})",
            id,
            index,
            transform.position.x,
            transform.position.y,
            transform.position.z
        );

        let projectile_form = self.pool.projectile_form(index);
        let ammo_form = self.pool.ammo_form(index);
        let weapon_form = *self.weapon_form.lock();
        let (Some(projectile_form), Some(ammo_form), Some(weapon_form)) = (projectile_form, ammo_form, weapon_form) else {
            error!(
                "fire: missing forms for slot {} (projectile={:?} ammo={:?} weapon={:?})",
                index, projectile_form, ammo_form, weapon_form
            );
            return Err(EngineError::Host(format!("missing forms for slot {}", index)));
        };

        let euler = transform.rotation.to_euler();
        let request = LaunchRequest {
            weapon_form,
            ammo_form,
            projectile_form,
            position: transform.position - Vec3::new(0.0, 0.0, LAUNCH_DEPTH),
            angles: Vec3::new(euler.x, 0.0, euler.z),
        };
        let generation = projectile.generation();
        let weak = projectile.weak();
        let host = Arc::clone(&self.host);

        self.host.queue_main_task(Box::new(move || {
            let Some(projectile) = weak.upgrade() else {
                debug!("fire task: projectile {} no longer exists", id);
                return;
            };
            if projectile.generation() != generation {
                trace!(
                    "fire task: stale generation ({} vs current {}), not launching",
                    generation,
                    projectile.generation()
                );
                return;
            }
            let Some(handle) = host.launch_arrow(&request) else {
                warn!("fire task: launch returned no handle for {}", id);
                return;
            };
            let Some(ptr) = host.lookup_by_handle(handle) else {
                error!("fire task: handle {:?} did not resolve", handle);
                return;
            };
            if projectile.bind_to_projectile(ptr, generation) {
                trace!("fire task: bound {} to {}", id, ptr);
            }
        }));
        Ok(())
    }

    // ── Physics tick ─────────────────────────────────────────

    /// Per-tick physics hook. Overwrites the transform of `ptr` when it
    /// belongs to a controlled projectile.
    pub fn on_projectile_update(&self, ptr: ProjectilePtr) {
        if !self.is_initialized() || self.controlled_count() == 0 {
            return;
        }
        let start = Instant::now();
        let candidates = self.snapshot();
        let waited = start.elapsed().as_micros();
        if waited > 100 {
            warn!("[PERF] on_projectile_update registry lock took {}us", waited);
        }

        let alive: Vec<_> = candidates.iter().filter_map(Weak::upgrade).collect();
        let found = alive.iter().find(|p| p.game().ptr() == Some(ptr));
        let elapsed = start.elapsed().as_micros();
        if elapsed > 150 {
            warn!("[PERF] projectile lookup took {}us (map size={})", elapsed, candidates.len());
        }

        if let Some(projectile) = found {
            projectile.game().apply_transform();
        }
        self.drop_on_main_thread(alive);
    }

    /// Release strong refs taken off the main thread. A ref that turns out
    /// to be the last owner moves its projectile to a main task, so the
    /// teardown in `Drop` always runs on the main thread.
    fn drop_on_main_thread(&self, projectiles: Vec<Arc<ControlledProjectile>>) {
        let orphaned: Vec<ControlledProjectile> =
            projectiles.into_iter().filter_map(Arc::into_inner).collect();
        if orphaned.is_empty() {
            return;
        }
        debug!("physics tick: deferring {} projectile drop(s) to the main thread", orphaned.len());
        self.host.queue_main_task(Box::new(move || drop(orphaned)));
    }

    /// Disable and delete cell projectiles built from our forms.
    pub fn cleanup_orphans(&self) -> usize {
        cleanup::cleanup_orphans(self.host.as_ref(), &self.pool.projectile_forms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Mat3;
    use crate::projectile::controlled::{BillboardMode, BindState};
    use crate::sim::Simulation;

    #[test]
    fn test_initialize_requires_forms() {
        let sim = Simulation::new(2);
        let subsystem = ProjectileSubsystem::new(sim.engine.host().clone());
        let err = subsystem.initialize(&ProjectileForms::default()).unwrap_err();
        assert!(matches!(err, EngineError::Host(_)));
        assert!(!subsystem.is_initialized());
    }

    #[test]
    fn test_register_and_lookup() {
        let sim = Simulation::new(2);
        let p = ControlledProjectile::new(&sim.engine);
        p.initialize();
        let subsystem = sim.engine.subsystem();
        let id = p.identifier();
        assert!(subsystem.has_projectile(id));
        assert_eq!(subsystem.active_count(), 1);
        assert!(Arc::ptr_eq(&subsystem.get_projectile(id).unwrap(), &p));
        drop(p);
        assert!(!subsystem.has_projectile(id));
        assert_eq!(subsystem.controlled_count(), 0);
    }

    #[test]
    fn test_fire_launches_below_target() {
        let sim = Simulation::new(2);
        let p = ControlledProjectile::new(&sim.engine);
        p.base().set_local_position(Vec3::new(10.0, 20.0, 30.0));
        p.set_billboard_mode(BillboardMode::None);
        p.base().set_local_rotation(Mat3::from_euler(Vec3::new(0.3, 0.2, 0.5)));
        let target = p.world_transform();
        p.initialize();
        assert!(sim.host.last_launch().is_none());
        sim.host.run_main_tasks();

        let request = sim.host.last_launch().unwrap();
        assert_eq!(request.position, Vec3::new(10.0, 20.0, 30.0 - LAUNCH_DEPTH));
        assert_eq!(request.projectile_form, FormId(0x800));
        let euler = target.rotation.to_euler();
        assert!((request.angles.x - euler.x).abs() < 1e-5);
        assert_eq!(request.angles.y, 0.0);
        assert!((request.angles.z - euler.z).abs() < 1e-5);

        let ptr = p.game().ptr().unwrap();
        // Bind applies the seeded transform immediately.
        let placed = sim.host.projectile(ptr).unwrap();
        assert_eq!(placed.position, Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(placed.base_form, FormId(0x800));
    }

    #[test]
    fn test_physics_tick_rewrites_bound_projectile() {
        let sim = Simulation::new(2);
        let p = ControlledProjectile::new(&sim.engine);
        p.initialize();
        sim.host.run_main_tasks();
        let ptr = p.game().ptr().unwrap();
        p.game().set_transform(crate::math::Transform::at(Vec3::new(5.0, 5.0, 5.0)));
        sim.engine.subsystem().on_projectile_update(ptr);
        assert_eq!(sim.host.projectile(ptr).unwrap().position, Vec3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn test_last_owner_dropped_on_main_thread() {
        let sim = Simulation::new(2);
        let subsystem = sim.engine.subsystem();
        let p = ControlledProjectile::new(&sim.engine);
        p.initialize();
        sim.host.run_main_tasks();
        let ptr = p.game().ptr().unwrap();
        let weak = p.weak();

        let shared = Arc::clone(&p);
        subsystem.drop_on_main_thread(vec![shared]);
        assert_eq!(sim.host.pending_tasks(), 0);

        subsystem.drop_on_main_thread(vec![p]);
        assert_eq!(sim.host.pending_tasks(), 1);
        assert!(weak.upgrade().is_none());
        assert!(!sim.host.projectile(ptr).unwrap().hidden);

        sim.host.run_main_tasks();
        assert!(sim.host.projectile(ptr).unwrap().hidden);
        assert_eq!(subsystem.pool_stats().used, 0);
    }

    #[test]
    fn test_physics_tick_ignores_foreign_projectile() {
        let sim = Simulation::new(2);
        let stray = sim.host.spawn_stray(FormId(0x123));
        sim.engine.subsystem().on_projectile_update(stray);
        assert_eq!(sim.host.projectile(stray).unwrap().ticks, 0);
    }

    #[test]
    fn test_release_all_unbinds() {
        let sim = Simulation::new(2);
        let p = ControlledProjectile::new(&sim.engine);
        p.initialize();
        sim.host.run_main_tasks();
        let subsystem = sim.engine.subsystem();
        subsystem.release_all_projectiles();
        assert_eq!(p.state(), BindState::Unbound);
        assert_eq!(subsystem.active_count(), 0);
        assert_eq!(subsystem.pool_stats().used, 0);
    }

    #[test]
    fn test_cleanup_orphans_deletes_our_forms() {
        let sim = Simulation::new(2);
        let ours = sim.host.spawn_stray(FormId(0x801));
        let theirs = sim.host.spawn_stray(FormId(0x123));
        assert_eq!(sim.engine.subsystem().cleanup_orphans(), 1);
        assert!(sim.host.projectile(ours).unwrap().deleted);
        assert!(!sim.host.projectile(theirs).unwrap().deleted);
    }
}
