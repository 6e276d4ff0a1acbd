//! Shared scene builders for the scenario tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use stride_physics::engine::physics::{
    BodyDesc, BodyHandle, CharacterConfig, CharacterShape, SoundEntityId, SoundPlayer,
};
use stride_physics::{PhysicsWorld, WorldConfig};

pub const DT: f32 = 1.0 / 60.0;

/// Sound player that records one-shot and looping sound starts
#[derive(Clone, Default)]
pub struct RecordingPlayer {
    pub started: Rc<RefCell<Vec<String>>>,
    next_id: u64,
}

impl SoundPlayer for RecordingPlayer {
    fn create_sound_entity(
        &mut self,
        _name: &str,
        sound: &str,
        _auto_remove: bool,
    ) -> Option<SoundEntityId> {
        self.started.borrow_mut().push(sound.to_string());
        self.next_id += 1;
        Some(SoundEntityId(self.next_id))
    }

    fn set_position(&mut self, _: SoundEntityId, _: Vec3) {}

    fn set_volume(&mut self, _: SoundEntityId, _: f32) {}

    fn set_speed(&mut self, _: SoundEntityId, _: f32) {}

    fn fade_in(&mut self, _: SoundEntityId, _: f32) {}

    fn fade_out(&mut self, _: SoundEntityId, _: f32) {}

    fn is_playing(&self, _: SoundEntityId) -> bool {
        true
    }
}

/// World with default gravity and a 40x40 floor whose top sits at y = 0
pub fn world_with_floor() -> (PhysicsWorld, BodyHandle) {
    let mut world = PhysicsWorld::new(WorldConfig::default());
    let shape = world.create_box_shape(Vec3::new(40.0, 1.0, 40.0));
    let floor = world
        .create_body(&BodyDesc::new("floor", shape).position(Vec3::new(0.0, -0.5, 0.0)))
        .expect("floor");
    (world, floor)
}

pub fn zero_gravity_world() -> PhysicsWorld {
    PhysicsWorld::new(WorldConfig {
        gravity: Vec3::ZERO,
        ..WorldConfig::default()
    })
}

/// Box-shaped character config (0.6 x 1.8 x 0.6)
pub fn box_character() -> CharacterConfig {
    CharacterConfig::default().shape(CharacterShape::Box, Vec3::new(0.6, 1.8, 0.6))
}

/// Static box with its bottom face at y = 0
pub fn add_block(world: &mut PhysicsWorld, name: &str, center_xz: (f32, f32), size: Vec3) -> BodyHandle {
    let shape = world.create_box_shape(size);
    world
        .create_body(
            &BodyDesc::new(name, shape)
                .position(Vec3::new(center_xz.0, size.y * 0.5, center_xz.1)),
        )
        .expect("block")
}
