// Physics system using rapier3d: bodies, joints, controllers and characters

pub mod body;
pub mod character;
mod collision;
pub mod controller;
mod debug;
mod events;
mod handle;
pub mod joint;
mod material;
mod shape;
mod sound;
mod space;
mod world;

use thiserror::Error;

pub use body::{BodyDesc, BodyHandle, ContactFlags, PhysicsBody};
pub use character::{
    CharacterBody, CharacterCallback, CharacterConfig, CharacterHandle, CharacterShape,
    DirectionConfig, GroundState, MoveDirection,
};
pub use collision::{
    fold_push, BodyCallback, CollideData, CollisionGroups, ContactPoint, SweepCallback,
};
pub use controller::{
    Axis, ControllerDesc, ControllerHandle, ControllerInput, ControllerInputSpace,
    ControllerOutput, ControllerType, EndCondition, PhysicsController,
};
pub use debug::{DebugContacts, DebugVertex};
pub use events::{LimitEvent, LimitSide, PhysicsEvent};
pub use handle::{Arena, Handle};
pub use joint::{
    JointDesc, JointHandle, JointKind, LimitHandler, MoveSound, MoveSpeedType, PhysicsJoint,
};
pub use material::{PhysicsMaterial, SpeedBandSound};
pub use shape::{Shape, ShapeHandle, ShapeKind};
pub use sound::{NullSoundPlayer, SoundEntityId, SoundPlayer};
pub use space::{BodyKind, PhysicsSpace, RayHit, SweepFilter, SweepResult};
pub use world::{PhysicsWorld, WorldConfig};

/// Lookup and configuration failures inside the physics layer.
///
/// The per-frame API never returns these; public entry points log them and
/// fall back to a no-op or a zero value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("body {0} not found")]
    BodyNotFound(u32),

    #[error("joint {0} not found")]
    JointNotFound(u32),

    #[error("controller {0} not found")]
    ControllerNotFound(u32),

    #[error("character {0} not found")]
    CharacterNotFound(u32),

    #[error("shape {0} not found")]
    ShapeNotFound(u32),

    #[error("material '{0}' not found")]
    MaterialNotFound(String),

    #[error("shape {0} still has {1} users")]
    ShapeInUse(u32, u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
