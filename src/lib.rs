//! Simulation core of a top-down tank-arena game: a rigid-body world behind
//! plain handles, cross-frame collision events, a pooled bullet ballistics
//! layer and per-tank locomotion. No rendering, audio or input lives here;
//! those arrive as injected sinks and providers.

pub mod arena;
pub mod bullet;
pub mod bullet_manager;
pub mod collision_manager;
pub mod config;
pub mod interval;
pub mod logger;
pub mod physics;
pub mod sink;
pub mod tank;
pub mod tank_manager;

pub use arena::Arena;
pub use config::{ArenaConfig, BoxShapes, ShapeSource};
pub use rapier3d::na;

/// Deterministic simulation RNG, seeded from the arena config.
pub type SimRng = rand_xoshiro::Xoshiro128StarStar;
