//! Projectile engine demo - boots the engine against the headless host
//! and runs a menu for a fixed number of frames.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use projectile_engine::config::EngineConfig;
use projectile_engine::driver::ProjectileDriver;
use projectile_engine::engine::Engine;
use projectile_engine::host::headless::HeadlessHost;
use projectile_engine::interaction::InteractionController;
use projectile_engine::math::Vec3;
use projectile_engine::projectile::ControlledProjectile;
use projectile_engine::sim::Simulation;

const FRAME_DT: f32 = 1.0 / 90.0;

#[derive(Parser, Debug)]
#[command(name = "projectile-engine", about = "Hand-tracked projectile UI engine")]
struct Cli {
    /// INI config file, created with defaults when missing
    #[arg(long, default_value = "projectile-engine.ini")]
    config: PathBuf,

    /// Number of frames to simulate
    #[arg(long, default_value = "300")]
    frames: usize,

    /// Number of menu items
    #[arg(long, default_value = "8")]
    items: usize,

    /// Layout: root, grid, radial, curved-row, half-wheel, row-grid or column-grid
    #[arg(long, default_value = "radial")]
    layout: String,

    /// Number of projectile forms in the pool
    #[arg(long, default_value = "64")]
    pool_size: usize,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn layout_driver(engine: &Arc<Engine>, layout: &str) -> anyhow::Result<Arc<ProjectileDriver>> {
    let driver = match layout {
        "root" => ProjectileDriver::root(engine),
        "grid" => ProjectileDriver::grid(engine),
        "radial" => ProjectileDriver::radial(engine),
        "curved-row" => ProjectileDriver::curved_row(engine),
        "half-wheel" => ProjectileDriver::half_wheel(engine),
        "row-grid" => ProjectileDriver::row_grid(engine),
        "column-grid" => ProjectileDriver::column_grid(engine),
        other => bail!(
            "unknown layout: {other}. Use: root, grid, radial, curved-row, half-wheel, row-grid or column-grid"
        ),
    };
    Ok(driver)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("projectile-engine {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = EngineConfig::load_or_create(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("projectile_engine={}", config.log_level).into()),
        )
        .init();

    info!("projectile-engine v{} starting", env!("CARGO_PKG_VERSION"));
    info!("layout: {}, items: {}, pool: {}", cli.layout, cli.items, cli.pool_size);

    let host = Arc::new(HeadlessHost::new());
    let sim = Simulation::start(host, cli.pool_size, config).context("starting engine")?;

    let root = ProjectileDriver::root(&sim.engine);
    root.base().set_id("demo menu");
    root.set_center(Vec3::new(0.0, 40.0, 100.0));

    let items = if cli.layout == "root" {
        Arc::clone(&root)
    } else {
        let layout = layout_driver(&sim.engine, &cli.layout)?;
        layout.base().set_id(&cli.layout);
        root.add_child(Arc::clone(&layout));
        layout
    };
    for i in 0..cli.items {
        let item = ControlledProjectile::new(&sim.engine);
        item.base().set_id(&format!("item {i}"));
        item.set_tooltip_text(&format!("Item {i}"));
        items.add_child(item);
    }

    let controller = InteractionController::new(&sim.engine);
    root.set_interaction_controller(Some(controller));
    root.set_visible(true);

    sim.frames(cli.frames, FRAME_DT);

    let stats = sim.engine.subsystem().pool_stats();
    info!(
        "pool: {} used, {} free, {} total",
        stats.used, stats.free, stats.total
    );
    info!(
        "subsystem: {} controlled, {} active, {} host launches",
        sim.engine.subsystem().controlled_count(),
        sim.engine.subsystem().active_count(),
        sim.host.launch_count()
    );
    info!(
        "update manager: {} roots over {} frames",
        sim.engine.update_manager().registered_count(),
        sim.engine.update_manager().frame_count()
    );

    sim.engine.shutdown();
    Ok(())
}
