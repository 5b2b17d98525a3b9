//! End-to-end scenarios against the headless host.
//!
//! Each test drives the engine the way a host would: frames through
//! `Simulation`, buttons through the controller-state hook.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use projectile_engine::driver::{ProjectileDriver, RowGridLayout};
use projectile_engine::host::FormId;
use projectile_engine::input_router::buttons;
use projectile_engine::interaction::InteractionController;
use projectile_engine::math::Vec3;
use projectile_engine::node::Node;
use projectile_engine::projectile::{BindState, ControlledProjectile};
use projectile_engine::sim::Simulation;

const DT: f32 = 0.016;
const TRIGGER: u64 = buttons::mask(buttons::TRIGGER);

fn leaf(sim: &Simulation, model: &str) -> Arc<ControlledProjectile> {
    let p = ControlledProjectile::new(&sim.engine);
    p.set_model_path(model);
    p
}

// ── Pool reuse ───────────────────────────────────────────────

#[test]
fn test_pool_reuse_under_show_hide_churn() {
    let sim = Simulation::new(4);
    let pool = sim.engine.subsystem().pool();
    let p1 = leaf(&sim, "m.nif");
    let p2 = leaf(&sim, "m.nif");
    p1.set_visible(false);
    p2.set_visible(false);
    p1.initialize();
    p2.initialize();

    p1.set_visible(true);
    assert_eq!(p1.form_index(), Some(0));
    assert_eq!(pool.slot(0).unwrap().ref_count, 1);

    p2.set_visible(true);
    assert_eq!(p2.form_index(), Some(0));
    assert_eq!(pool.slot(0).unwrap().ref_count, 2);

    p1.set_visible(false);
    assert_eq!(pool.slot(0).unwrap().ref_count, 1);

    p2.set_visible(false);
    let slot = pool.slot(0).unwrap();
    assert_eq!(slot.ref_count, 0);
    assert!(slot.model.is_empty());

    assert_eq!(pool.acquire("n.nif"), Some(0));
    assert_eq!(pool.slot(0).unwrap().model, "n.nif");
    let stats = pool.stats();
    assert_eq!(stats.used + stats.free, stats.total);
}

// ── Hide during firing ───────────────────────────────────────

#[test]
fn test_hide_during_firing_ignores_stale_bind() {
    let sim = Simulation::new(4);
    let p = leaf(&sim, "m.nif");
    p.initialize();
    while p.generation() < 7 {
        p.set_visible(false);
        p.set_visible(true);
    }
    assert_eq!(p.state(), BindState::Firing);
    assert_eq!(p.generation(), 7);
    let used_before = sim.engine.subsystem().pool_stats().used;

    p.set_visible(false);
    assert_eq!(p.state(), BindState::Unbound);
    assert_eq!(p.generation(), 8);
    let used_after_hide = sim.engine.subsystem().pool_stats().used;
    assert_eq!(used_after_hide, used_before - 1);

    // The launch completed on the host before the hide was seen.
    let launched = sim.host.spawn_stray(FormId(0x800));
    assert!(!p.bind_to_projectile(launched, 7));
    assert_eq!(p.state(), BindState::Unbound);
    assert_eq!(p.form_index(), None);
    assert_eq!(sim.engine.subsystem().pool_stats().used, used_after_hide);

    let host_side = sim.host.projectile(launched).unwrap();
    assert!(!host_side.deleted);
    assert!(!host_side.disabled);

    // Queued fire tasks all carry older generations.
    sim.host.run_main_tasks();
    assert_eq!(sim.host.launch_count(), 0);
    assert_eq!(p.state(), BindState::Unbound);
}

// ── Effective visibility ─────────────────────────────────────

#[test]
fn test_showing_root_binds_hidden_subtree() {
    let sim = Simulation::new(4);
    let root = ProjectileDriver::root(&sim.engine);
    root.set_center(Vec3::new(0.0, 50.0, 100.0));
    let inner = ProjectileDriver::grid(&sim.engine);
    root.add_child(Arc::clone(&inner));
    let p = leaf(&sim, "m.nif");
    inner.add_child(Arc::clone(&p));
    assert!(p.is_visible());
    assert_eq!(p.state(), BindState::Unbound);
    assert_eq!(sim.host.pending_tasks(), 0);

    root.set_visible(true);
    assert!(p.base().is_effectively_visible());
    assert_eq!(p.state(), BindState::Unbound);

    // The first update sees the newly visible leaf, fires, and the
    // main-thread task binds it within the same frame.
    sim.frame(DT);
    assert!(p.form_index().is_some());
    assert_eq!(p.state(), BindState::Bound);
    let ptr = p.game().ptr().unwrap();
    let written = sim.host.projectile(ptr).unwrap().position;
    assert!((written - p.world_position()).length() < 1e-3);
}

#[test]
fn test_hidden_ancestor_keeps_leaf_unbound() {
    let sim = Simulation::new(4);
    let root = ProjectileDriver::root(&sim.engine);
    let inner = ProjectileDriver::grid(&sim.engine);
    let p = leaf(&sim, "m.nif");
    inner.add_child(Arc::clone(&p));
    root.add_child(Arc::clone(&inner));
    root.set_visible(true);
    sim.frame(DT);
    assert_eq!(p.state(), BindState::Bound);

    inner.set_visible(false);
    sim.frames(3, DT);
    assert_eq!(p.state(), BindState::Unbound);
    assert!(p.is_visible());

    inner.set_visible(true);
    sim.frames(2, DT);
    assert_eq!(p.state(), BindState::Bound);
}

// ── Two hands ────────────────────────────────────────────────

struct Menu {
    root: Arc<ProjectileDriver>,
    controller: Arc<InteractionController>,
    a: Arc<ControlledProjectile>,
    b: Arc<ControlledProjectile>,
}

/// A under the left hand's default position, B under the right hand's.
fn menu(sim: &Simulation) -> Menu {
    let root = ProjectileDriver::root(&sim.engine);
    root.set_center(Vec3::new(0.0, 40.0, 100.0));
    let a = leaf(sim, "a.nif");
    a.base().set_id("a");
    a.base().set_local_position(Vec3::new(-20.0, 0.0, 0.0));
    let b = leaf(sim, "b.nif");
    b.base().set_id("b");
    b.base().set_local_position(Vec3::new(20.0, 0.0, 0.0));
    root.add_child(Arc::clone(&a));
    root.add_child(Arc::clone(&b));
    let controller = InteractionController::new(&sim.engine);
    controller.set_activation_buttons(TRIGGER);
    root.set_interaction_controller(Some(Arc::clone(&controller)));
    root.set_visible(true);
    Menu {
        root,
        controller,
        a,
        b,
    }
}

fn is(p: Option<Arc<ControlledProjectile>>, expected: &Arc<ControlledProjectile>) -> bool {
    p.is_some_and(|p| Arc::ptr_eq(&p, expected))
}

fn press(sim: &Simulation, left: bool, mask: u64) -> u64 {
    let mut out = mask;
    sim.engine.on_controller_state(left, mask, &mut out);
    out
}

#[test]
fn test_two_hands_hover_independently() {
    let sim = Simulation::new(8);
    let m = menu(&sim);
    let a_down = Arc::new(AtomicUsize::new(0));
    let b_down = Arc::new(AtomicUsize::new(0));
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
    }

    sim.frames(6, DT);
    assert!(is(m.controller.hovered(true), &m.a));
    assert!(is(m.controller.hovered(false), &m.b));

    sim.frames(20, DT);
    assert!((m.a.hover_scale() - 1.2).abs() < 1e-4);
    assert!((m.b.hover_scale() - 1.2).abs() < 1e-4);

    // Consumed on press, so the game never sees the trigger.
    assert_eq!(press(&sim, true, TRIGGER), 0);
    assert_eq!(a_down.load(Ordering::SeqCst), 1);
    assert_eq!(b_down.load(Ordering::SeqCst), 0);
    press(&sim, true, 0);

    assert_eq!(press(&sim, false, TRIGGER), 0);
    assert_eq!(a_down.load(Ordering::SeqCst), 1);
    assert_eq!(b_down.load(Ordering::SeqCst), 1);
    press(&sim, false, 0);
    assert_eq!(sim.engine.input().blocked(false), 0);
    assert!(sim.engine.controllers().any_controller_has_hovered_item(true));
}

// ── Activation with close ────────────────────────────────────

#[test]
fn test_close_on_activate_leaves_no_tooltip() {
    let sim = Simulation::new(8);
    let m = menu(&sim);
    m.a.set_tooltip_text("Close menu");
    m.a.set_close_on_activate(true);

    let tooltip_during_close = Arc::new(AtomicBool::new(true));
    {
        let engine = Arc::downgrade(&sim.engine);
        let root = Arc::downgrade(&m.root);
        let seen = Arc::clone(&tooltip_during_close);
        m.controller.set_close_callback(move || {
            if let Some(engine) = engine.upgrade() {
                seen.store(engine.tooltips().is_tooltip_visible(true), Ordering::SeqCst);
            }
            if let Some(root) = root.upgrade() {
                root.set_visible(false);
                root.clear();
            }
        });
    }

    sim.frames(6, DT);
    assert!(sim.engine.tooltips().is_tooltip_visible(true));
    assert_eq!(sim.engine.tooltips().current_text(true), "Close menu");

    press(&sim, true, TRIGGER);
    assert!(!tooltip_during_close.load(Ordering::SeqCst));
    assert_eq!(m.root.child_count(), 0);
    assert!(!m.a.is_initialized());

    sim.frames(3, DT);
    assert!(!sim.engine.tooltips().is_tooltip_visible(true));
    assert!(!sim.engine.tooltips().is_tooltip_visible(false));
    assert!(m.controller.hovered(true).is_none());
    assert_eq!(sim.engine.subsystem().pool_stats().used, 0);
}

// ── Layout after mutation ────────────────────────────────────

#[test]
fn test_grid_scroll_clamped_after_removal() {
    let sim = Simulation::new(8);
    let root = ProjectileDriver::root(&sim.engine);
    let grid = ProjectileDriver::row_grid(&sim.engine);
    root.add_child(Arc::clone(&grid));
    let items: Vec<_> = (0..4).map(|i| leaf(&sim, &format!("item{i}.nif"))).collect();
    for p in &items {
        grid.add_child(Arc::clone(p));
    }
    grid.layout_mut::<RowGridLayout, _>(|g| g.visible_height = 10.0);
    root.set_visible(true);
    sim.frame(DT);

    // Four rows 12 apart in a 10-unit window.
    grid.layout_mut::<RowGridLayout, _>(|g| g.set_scroll_offset(26.0));
    assert_eq!(grid.layout::<RowGridLayout, _>(|g| g.scroll_offset()), Some(26.0));

    grid.set_visible(false);
    assert!(grid.remove_child(&Node::Projectile(Arc::clone(&items[3]))));
    assert!(grid.remove_child(&Node::Projectile(Arc::clone(&items[2]))));
    grid.set_visible(true);
    assert_eq!(grid.layout::<RowGridLayout, _>(|g| g.scroll_offset()), Some(2.0));

    assert!(!items[3].base().has_parent());
    assert_eq!(items[3].state(), BindState::Unbound);
    assert_eq!(grid.child_count(), 2);
}
