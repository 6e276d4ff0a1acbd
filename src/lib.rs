//! Character locomotion, joints and joint controllers on top of rapier3d.
//!
//! Everything lives in a [`PhysicsWorld`]; drive it with
//! [`PhysicsWorld::update`] at a fixed step (see [`GameLoop`]).

pub mod core;
pub mod engine;

pub use engine::game_loop::{GameLoop, FIXED_TIMESTEP};
pub use engine::physics::{PhysicsError, PhysicsWorld, WorldConfig};
