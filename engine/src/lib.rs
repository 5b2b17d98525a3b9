//! Projectile engine library: hand-tracked 3D UI built from pooled,
//! host-owned projectiles.
//!
//! This library crate exposes every module for integration testing. The
//! demo binary entry point lives in `main.rs`.

pub mod anchor;
pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod haptics;
pub mod host;
pub mod id;
pub mod input_router;
pub mod interaction;
pub mod math;
pub mod node;
pub mod projectile;
pub mod sim;
pub mod smoother;
pub mod texture_loader;
pub mod tooltip;
pub mod update_manager;

pub use engine::Engine;
pub use error::{EngineError, Result};
