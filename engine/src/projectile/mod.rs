//! Host projectiles as UI elements.
//!
//! `form_pool` shares the scarce host forms, `game_projectile` wraps one
//! host projectile, `controlled` is the scene-graph leaf and its bind state
//! machine, and `subsystem` owns the registry and the fire path.

pub mod cleanup;
pub mod controlled;
pub mod form_pool;
pub mod game_projectile;
pub mod subsystem;

pub use controlled::{BillboardMode, BindState, ControlledProjectile, EventCallback};
pub use form_pool::{FormPool, FormSlot, PoolStats};
pub use game_projectile::GameProjectile;
pub use subsystem::{ProjectileForms, ProjectileSubsystem};
