use std::time::Duration;

use anyhow::{Context, Result};
use glam::Vec3;
use log::info;

use stride_physics::engine::physics::{
    BodyDesc, CharacterConfig, ControllerDesc, ControllerInput, ControllerOutput, Axis,
    JointDesc, JointKind, MoveDirection, PhysicsEvent, PhysicsMaterial,
};
use stride_physics::{GameLoop, PhysicsWorld, WorldConfig};

/// Simulated seconds the demo runs for
const DEMO_SECONDS: f32 = 5.0;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting stride demo...");

    let mut world = PhysicsWorld::new(WorldConfig::default());
    world.create_material(PhysicsMaterial::new("stone").friction(0.8));

    // Floor
    let floor_shape = world.create_box_shape(Vec3::new(40.0, 1.0, 40.0));
    world
        .create_body(
            &BodyDesc::new("floor", floor_shape)
                .position(Vec3::new(0.0, -0.5, 0.0))
                .material("stone"),
        )
        .context("failed to create floor")?;

    // Door hinged on its left edge, driven open by a PID controller
    let door_shape = world.create_box_shape(Vec3::new(1.0, 2.0, 0.1));
    let door = world
        .create_body(
            &BodyDesc::new("door", door_shape)
                .mass(10.0)
                .position(Vec3::new(3.5, 1.05, 4.0)),
        )
        .context("failed to create door")?;
    let hinge = world
        .create_joint(
            &JointDesc::new("door_hinge", JointKind::Hinge, door)
                .pivot(Vec3::new(3.0, 1.05, 4.0))
                .pin(Vec3::Y)
                .limits(-45f32.to_radians(), 45f32.to_radians()),
        )
        .context("failed to create hinge")?;
    world
        .create_controller(
            hinge,
            &ControllerDesc::new("open")
                .pid(20.0, 0.0, 12.0)
                .input(ControllerInput::JointAngle, Axis::Y)
                .output(ControllerOutput::Torque, Axis::Y)
                .destination(30f32.to_radians()),
        )
        .context("failed to create door controller")?;

    // Player walking forward
    let player = world
        .create_character("player", CharacterConfig::default(), Vec3::new(0.0, 0.95, 0.0))
        .context("failed to create character")?;

    let mut game_loop = GameLoop::new();
    let dt = game_loop.fixed_timestep();
    let frame = Duration::from_secs_f32(1.0 / 30.0);

    while game_loop.simulated_secs() < DEMO_SECONDS {
        for _ in 0..game_loop.advance(frame) {
            if let Some(character) = world.character_mut(player) {
                character.move_dir(MoveDirection::Forward, 1.0, dt);
            }
            world.update(dt);

            for event in world.drain_events() {
                match event {
                    PhysicsEvent::HitGround { velocity, .. } => {
                        info!("Player landed at {:.2} m/s", velocity.length())
                    }
                    other => info!("{:?}", other),
                }
            }
        }
    }

    if let Some(character) = world.character(player) {
        info!(
            "Player at {:?} (on ground: {})",
            character.position(),
            character.is_on_ground()
        );
    }
    info!(
        "Door angle {:.1} degrees after {} steps",
        world.joint_value(hinge).to_degrees(),
        game_loop.update_count()
    );

    Ok(())
}
