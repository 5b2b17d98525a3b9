//! Reference-counted pool of preallocated host projectile forms.
//!
//! The host exposes a small fixed set of projectile/ammo form pairs. Any
//! number of UI elements share them: elements that need the same model
//! share one slot, and a slot whose count drops to zero is free to be
//! reassigned to a different model.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::{error, info, trace, warn};

use crate::host::{FormId, Host};

/// One host form pair and its current assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormSlot {
    pub projectile_form: Option<FormId>,
    pub ammo_form: Option<FormId>,
    /// Empty iff `ref_count == 0`.
    pub model: String,
    pub ref_count: u32,
}

/// Occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub used: usize,
    pub free: usize,
    pub total: usize,
}

#[derive(Default)]
struct PoolState {
    slots: Vec<FormSlot>,
    by_model: HashMap<String, usize>,
    initialized: bool,
}

pub struct FormPool {
    host: Arc<dyn Host>,
    state: ReentrantMutex<RefCell<PoolState>>,
}

impl FormPool {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            state: ReentrantMutex::new(RefCell::new(PoolState::default())),
        }
    }

    /// Size the pool to the longer of the two form lists.
    pub fn initialize(&self, projectile_forms: &[FormId], ammo_forms: &[FormId]) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.initialized {
            warn!("form pool already initialized");
            return;
        }
        let count = projectile_forms.len().max(ammo_forms.len());
        state.slots = (0..count)
            .map(|i| FormSlot {
                projectile_form: projectile_forms.get(i).copied(),
                ammo_form: ammo_forms.get(i).copied(),
                ..Default::default()
            })
            .collect();
        state.by_model.clear();
        state.initialized = true;
        info!("form pool initialized with {} slots", count);
    }

    pub fn shutdown(&self) {
        let guard = self.state.lock();
        *guard.borrow_mut() = PoolState::default();
        info!("form pool shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().borrow().initialized
    }

    /// Reserve a slot for `model`, sharing an existing assignment when one
    /// exists. `None` when every slot holds a different model.
    pub fn acquire(&self, model: &str) -> Option<usize> {
        // Held across the host calls below; the RefCell borrow is not, so a
        // host that calls back into the pool sees the new assignment.
        let guard = self.state.lock();
        let (index, projectile_form, ammo_form) = {
            let mut state = guard.borrow_mut();
            let state = &mut *state;
            if !state.initialized {
                error!("form pool acquire('{}') before initialization", model);
                return None;
            }

            if let Some(&index) = state.by_model.get(model) {
                let slot = &mut state.slots[index];
                slot.ref_count += 1;
                trace!("form pool: reusing slot {} for '{}', refs={}", index, model, slot.ref_count);
                return Some(index);
            }

            let Some(index) = state.slots.iter().position(|s| s.ref_count == 0) else {
                let total = state.slots.len();
                error!("form pool exhausted: no free slot for '{}' ({}/{} used)", model, total, total);
                for (i, slot) in state.slots.iter().enumerate() {
                    error!("form pool:   slot {} refs={} model='{}'", i, slot.ref_count, slot.model);
                }
                return None;
            };

            let slot = &mut state.slots[index];
            slot.model = model.to_string();
            slot.ref_count = 1;
            let forms = (index, slot.projectile_form, slot.ammo_form);
            state.by_model.insert(model.to_string(), index);
            forms
        };

        if let Some(form) = projectile_form {
            self.host.set_form_model(form, model);
        }
        if let Some(form) = ammo_form {
            self.host.set_form_model(form, model);
        }
        drop(guard);
        trace!("form pool: assigned slot {} to '{}'", index, model);
        Some(index)
    }

    /// Drop one reference. At zero the slot is free for any model.
    pub fn release(&self, index: usize) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let state = &mut *state;
        let Some(slot) = state.slots.get_mut(index) else {
            return;
        };
        if slot.ref_count == 0 {
            warn!("form pool: release of slot {} which already has refCount 0", index);
            return;
        }
        slot.ref_count -= 1;
        trace!("form pool: slot {} refs now {}", index, slot.ref_count);
        if slot.ref_count == 0 {
            let model = std::mem::take(&mut slot.model);
            state.by_model.remove(&model);
            trace!("form pool: slot {} free (was '{}')", index, model);
        }
    }

    pub fn projectile_form(&self, index: usize) -> Option<FormId> {
        self.state.lock().borrow().slots.get(index)?.projectile_form
    }

    pub fn ammo_form(&self, index: usize) -> Option<FormId> {
        self.state.lock().borrow().slots.get(index)?.ammo_form
    }

    pub fn slot(&self, index: usize) -> Option<FormSlot> {
        self.state.lock().borrow().slots.get(index).cloned()
    }

    /// Projectile forms of every slot, used to recognise our projectiles.
    pub fn projectile_forms(&self) -> Vec<FormId> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.slots.iter().filter_map(|s| s.projectile_form).collect()
    }

    pub fn stats(&self) -> PoolStats {
        let guard = self.state.lock();
        let state = guard.borrow();
        let used = state.slots.iter().filter(|s| s.ref_count > 0).count();
        PoolStats {
            used,
            free: state.slots.len() - used,
            total: state.slots.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::headless::HeadlessHost;

    fn forms(n: u32, base: u32) -> Vec<FormId> {
        (0..n).map(|i| FormId(base + i)).collect()
    }

    fn pool(n: u32) -> (Arc<HeadlessHost>, FormPool) {
        let host = Arc::new(HeadlessHost::new());
        let pool = FormPool::new(host.clone());
        pool.initialize(&forms(n, 0x800), &forms(n, 0x900));
        (host, pool)
    }

    #[test]
    fn test_acquire_before_initialize() {
        let host = Arc::new(HeadlessHost::new());
        let pool = FormPool::new(host);
        assert_eq!(pool.acquire("m.nif"), None);
    }

    #[test]
    fn test_same_model_shares_slot() {
        let (host, pool) = pool(4);
        assert_eq!(pool.acquire("m.nif"), Some(0));
        assert_eq!(pool.acquire("m.nif"), Some(0));
        assert_eq!(pool.slot(0).unwrap().ref_count, 2);
        assert_eq!(host.form_model(FormId(0x800)).as_deref(), Some("m.nif"));
        assert_eq!(host.form_model(FormId(0x900)).as_deref(), Some("m.nif"));
    }

    #[test]
    fn test_release_frees_and_reassigns() {
        let (host, pool) = pool(1);
        let i = pool.acquire("m.nif").unwrap();
        pool.release(i);
        let slot = pool.slot(i).unwrap();
        assert_eq!(slot.ref_count, 0);
        assert!(slot.model.is_empty());
        assert_eq!(pool.acquire("n.nif"), Some(0));
        assert_eq!(host.form_model(FormId(0x800)).as_deref(), Some("n.nif"));
    }

    #[test]
    fn test_exhaustion() {
        let (_host, pool) = pool(2);
        assert_eq!(pool.acquire("a.nif"), Some(0));
        assert_eq!(pool.acquire("b.nif"), Some(1));
        assert_eq!(pool.acquire("c.nif"), None);
        // Shared model still succeeds while exhausted.
        assert_eq!(pool.acquire("a.nif"), Some(0));
    }

    #[test]
    fn test_double_release_is_ignored() {
        let (_host, pool) = pool(2);
        let i = pool.acquire("a.nif").unwrap();
        pool.release(i);
        pool.release(i);
        pool.release(99);
        assert_eq!(pool.stats().used, 0);
    }

    #[test]
    fn test_uneven_form_lists() {
        let host = Arc::new(HeadlessHost::new());
        let pool = FormPool::new(host);
        pool.initialize(&forms(3, 0x800), &forms(1, 0x900));
        assert_eq!(pool.stats().total, 3);
        assert_eq!(pool.ammo_form(2), None);
        assert_eq!(pool.projectile_form(2), Some(FormId(0x802)));
    }

    #[test]
    fn test_stats_add_up() {
        let (_host, pool) = pool(4);
        pool.acquire("a.nif");
        pool.acquire("b.nif");
        pool.acquire("a.nif");
        let stats = pool.stats();
        assert_eq!(stats.used, 2);
        assert_eq!(stats.free, 2);
        assert_eq!(stats.used + stats.free, stats.total);
    }

    #[test]
    fn test_host_may_reenter_during_model_change() {
        let (host, pool) = pool(2);
        let pool = Arc::new(pool);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let pool = Arc::downgrade(&pool);
            let seen = Arc::clone(&seen);
            host.set_form_model_hook(Some(Arc::new(move |form: FormId, model: &str| {
                if let Some(pool) = pool.upgrade() {
                    seen.lock().push((form, model.to_string(), pool.stats().used, pool.slot(0)));
                }
            })));
        }

        assert_eq!(pool.acquire("m.nif"), Some(0));
        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, FormId(0x800));
        assert_eq!(seen[1].0, FormId(0x900));
        for (_, model, used, slot) in &seen {
            assert_eq!(model, "m.nif");
            assert_eq!(*used, 1);
            let slot = slot.clone().unwrap();
            assert_eq!(slot.model, "m.nif");
            assert_eq!(slot.ref_count, 1);
        }
        host.set_form_model_hook(None);
    }

    #[test]
    fn test_concurrent_same_model() {
        let (_host, pool) = pool(4);
        let pool = Arc::new(pool);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.acquire("m.nif"))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![Some(0), Some(0)]);
        assert_eq!(pool.slot(0).unwrap().ref_count, 2);
    }
}
