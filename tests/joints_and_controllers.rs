//! Joint, limit, breakage and controller scenarios

mod common;

use std::cell::Cell;
use std::rc::Rc;

use approx::assert_relative_eq;
use glam::Vec3;
use stride_physics::engine::physics::{
    Axis, BodyCallback, BodyDesc, BodyHandle, ControllerDesc, ControllerInput, ControllerOutput,
    EndCondition, JointDesc, JointKind, LimitEvent, LimitSide, MoveSound, MoveSpeedType,
    PhysicsEvent, SpeedBandSound, SweepFilter,
};
use stride_physics::PhysicsWorld;

use common::{world_with_floor, zero_gravity_world, RecordingPlayer, DT};

/// 1 x 2 x 0.1 door of 10 kg hinged on its left edge at the origin
fn hinged_door(world: &mut PhysicsWorld, limits: Option<(f32, f32)>) -> (BodyHandle, JointDesc) {
    let shape = world.create_box_shape(Vec3::new(1.0, 2.0, 0.1));
    let door = world
        .create_body(
            &BodyDesc::new("door", shape)
                .mass(10.0)
                .position(Vec3::new(0.5, 1.05, 0.0)),
        )
        .unwrap();
    let mut desc = JointDesc::new("hinge", JointKind::Hinge, door)
        .pivot(Vec3::new(0.0, 1.05, 0.0))
        .pin(Vec3::Y);
    if let Some((min, max)) = limits {
        desc = desc.limits(min, max);
    }
    (door, desc)
}

fn limit_count(events: &[PhysicsEvent], side: LimitSide) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PhysicsEvent::JointLimit(limit) if limit.side == side))
        .count()
}

fn run(world: &mut PhysicsWorld, steps: usize) -> Vec<PhysicsEvent> {
    let mut events = Vec::new();
    for _ in 0..steps {
        world.update(DT);
        events.extend(world.drain_events());
    }
    events
}

#[test]
fn test_pid_drives_hinge_to_target() {
    let mut world = zero_gravity_world();
    let limit = 45f32.to_radians();
    let (_, desc) = hinged_door(&mut world, Some((-limit, limit)));
    let hinge = world.create_joint(&desc).unwrap();
    world
        .create_controller(
            hinge,
            &ControllerDesc::new("open")
                .pid(20.0, 0.0, 12.0)
                .input(ControllerInput::JointAngle, Axis::Y)
                .output(ControllerOutput::Torque, Axis::Y)
                .destination(30f32.to_radians()),
        )
        .unwrap();

    let events = run(&mut world, 360);

    assert_relative_eq!(
        world.joint_value(hinge).to_degrees(),
        30.0,
        epsilon = 0.5
    );
    // Settled well inside the limits
    assert!(!events
        .iter()
        .any(|e| matches!(e, PhysicsEvent::JointLimit(_))));
}

#[test]
fn test_limit_reports_once_while_held() {
    let mut world = zero_gravity_world();
    let player = RecordingPlayer::default();
    let started = player.started.clone();
    world.set_sound_player(Box::new(player));

    let limit = 45f32.to_radians();
    let (_, desc) = hinged_door(&mut world, Some((-limit, limit)));
    let desc = desc.limit_effects(
        SpeedBandSound::new("door_min", 0.0, 2.0),
        SpeedBandSound::new("door_max", 0.0, 2.0),
    );
    let hinge = world.create_joint(&desc).unwrap();

    let handled = Rc::new(Cell::new(0));
    let seen = handled.clone();
    world.set_joint_limit_handler(hinge, Box::new(move |_: &LimitEvent| seen.set(seen.get() + 1)));

    // Keep pushing the door open far past its limit
    world
        .create_controller(
            hinge,
            &ControllerDesc::new("slam")
                .proportional(40.0, 0.0)
                .input(ControllerInput::JointAngle, Axis::Y)
                .output(ControllerOutput::Torque, Axis::Y)
                .destination(std::f32::consts::PI),
        )
        .unwrap();

    let events = run(&mut world, 120);
    let limits: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PhysicsEvent::JointLimit(limit) => Some(limit.clone()),
            _ => None,
        })
        .collect();

    assert!(!limits.is_empty());
    assert!(limits.iter().all(|l| l.side == LimitSide::Max));
    assert_eq!(handled.get() as usize, limits.len());

    // Held against the stop: no further reports
    let later = run(&mut world, 60);
    assert!(!later
        .iter()
        .any(|e| matches!(e, PhysicsEvent::JointLimit(_))));
    assert!(started.borrow().iter().all(|s| s == "door_max"));
    assert!(world.joint_value(hinge) <= limit + 0.05);
}

#[test]
fn test_destination_controller_hands_over_to_next() {
    let mut world = zero_gravity_world();
    let shape = world.create_box_shape(Vec3::ONE);
    let cart = world
        .create_body(&BodyDesc::new("cart", shape).mass(1.0))
        .unwrap();
    let rail = world
        .create_joint(&JointDesc::new("rail", JointKind::Slider, cart).pin(Vec3::X))
        .unwrap();

    let brake = world
        .create_controller(
            rail,
            &ControllerDesc::new("brake")
                .proportional(5.0, 0.0)
                .input(ControllerInput::LinearSpeed, Axis::X)
                .output(ControllerOutput::Force, Axis::X)
                .destination(0.0)
                .end_condition(EndCondition::OnDestination)
                .next_controller("cruise"),
        )
        .unwrap();
    let cruise = world
        .create_controller(
            rail,
            &ControllerDesc::new("cruise")
                .proportional(5.0, 0.0)
                .input(ControllerInput::LinearSpeed, Axis::X)
                .output(ControllerOutput::Force, Axis::X)
                .destination(-1.0)
                .active(false),
        )
        .unwrap();

    world.set_linear_velocity(cart, Vec3::new(2.0, 0.0, 0.0));
    let events = run(&mut world, 180);

    let finished: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PhysicsEvent::ControllerFinished {
                controller, next, ..
            } => Some((*controller, *next)),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![(brake, Some(cruise))]);
    assert!(!world.controller(brake).unwrap().is_active());
    assert!(world.controller(cruise).unwrap().is_active());

    // The cart now cruises backwards along the rail
    run(&mut world, 180);
    assert!(world.linear_velocity(cart).x < -0.9);
    assert!(world.body_position(cart).x < 0.5);
}

#[test]
fn test_change_controller_switches_active() {
    let mut world = zero_gravity_world();
    let (_, desc) = hinged_door(&mut world, None);
    let hinge = world.create_joint(&desc).unwrap();
    let open = world
        .create_controller(hinge, &ControllerDesc::new("open").pid(10.0, 0.0, 1.0))
        .unwrap();
    let close = world
        .create_controller(hinge, &ControllerDesc::new("close").pid(10.0, 0.0, 1.0))
        .unwrap();

    assert!(world.change_controller(hinge, "close"));
    assert!(!world.controller(open).unwrap().is_active());
    assert!(world.controller(close).unwrap().is_active());
    assert!(!world.change_controller(hinge, "missing"));
    assert!(world.controller(close).unwrap().is_active());
}

#[test]
fn test_overloaded_joint_breaks_once() {
    let (mut world, _) = world_with_floor();
    let player = RecordingPlayer::default();
    let started = player.started.clone();
    world.set_sound_player(Box::new(player));

    let shape = world.create_box_shape(Vec3::splat(0.5));
    let lamp = world
        .create_body(
            &BodyDesc::new("lamp", shape)
                .mass(10.0)
                .position(Vec3::new(0.0, 3.0, 0.0)),
        )
        .unwrap();
    let chain = world
        .create_joint(
            &JointDesc::new("chain", JointKind::Ball, lamp)
                .pivot(Vec3::new(0.0, 3.5, 0.0))
                .breakable(20.0, "chain_snap"),
        )
        .unwrap();
    assert_eq!(world.body(lamp).unwrap().joints(), &[chain]);

    let events = run(&mut world, 60);
    let broken: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, PhysicsEvent::JointBroken { .. }))
        .collect();

    assert_eq!(broken.len(), 1);
    assert!(world.joint(chain).is_none());
    assert!(world.body(lamp).unwrap().joints().is_empty());
    assert_eq!(
        started.borrow().iter().filter(|s| *s == "chain_snap").count(),
        1
    );
    // Dropped onto the floor
    assert!(world.body_position(lamp).y < 1.0);
}

#[test]
fn test_manual_break_only_for_breakable_joints() {
    let mut world = zero_gravity_world();
    let (door, desc) = hinged_door(&mut world, None);
    let fixed = world.create_joint(&desc).unwrap();

    world.break_joint(fixed);
    run(&mut world, 2);
    assert!(world.joint(fixed).is_some());

    world.destroy_joint(fixed);
    let breakable = world
        .create_joint(&desc.clone().breakable(1.0e9, "snap"))
        .unwrap();
    world.break_joint(breakable);
    let events = run(&mut world, 1);

    assert!(world.joint(breakable).is_none());
    assert!(world.body(door).unwrap().joints().is_empty());
    assert!(events.iter().any(|e| matches!(
        e,
        PhysicsEvent::JointBroken { joint, child, parent: None, .. }
            if *joint == breakable && *child == door
    )));
}

#[test]
fn test_world_query_folds_pushes_per_axis() {
    let mut world = zero_gravity_world();
    let unit = world.create_box_shape(Vec3::ONE);
    // Overlaps the tester by 0.1 on +X and by 0.2 from below
    let wall = world
        .create_body(&BodyDesc::new("wall", unit).position(Vec3::new(0.9, 0.0, 0.0)))
        .unwrap();
    let ledge = world
        .create_body(&BodyDesc::new("ledge", unit).position(Vec3::new(0.0, -0.8, 0.0)))
        .unwrap();

    let tester = world.create_box_shape(Vec3::ONE);
    let result = world.check_shape_world_collision(
        tester,
        Vec3::ZERO,
        glam::Quat::IDENTITY,
        &SweepFilter::default(),
        None,
    );

    assert!(result.collided);
    assert_relative_eq!(result.push.x, -0.1, epsilon = 1e-4);
    assert_relative_eq!(result.push.y, 0.2, epsilon = 1e-4);
    assert_relative_eq!(result.push.z, 0.0, epsilon = 1e-4);
    assert_relative_eq!(result.position.y, 0.2, epsilon = 1e-4);

    let hit_bodies: Vec<_> = result.contacts.iter().map(|(b, _)| *b).collect();
    assert!(hit_bodies.contains(&wall));
    assert!(hit_bodies.contains(&ledge));

    let skipped = world.check_shape_world_collision(
        tester,
        Vec3::ZERO,
        glam::Quat::IDENTITY,
        &SweepFilter {
            skip_static: true,
            ..SweepFilter::default()
        },
        None,
    );
    assert!(!skipped.collided);
    assert_eq!(skipped.push, Vec3::ZERO);
}

#[test]
fn test_world_query_keeps_deepest_push_on_shared_axis() {
    let mut world = zero_gravity_world();
    let unit = world.create_box_shape(Vec3::ONE);
    // Both ledges push the tester up: 0.1 and 0.25
    world
        .create_body(&BodyDesc::new("low", unit).position(Vec3::new(-0.5, -0.9, 0.0)))
        .unwrap();
    world
        .create_body(&BodyDesc::new("high", unit).position(Vec3::new(0.5, -0.75, 0.0)))
        .unwrap();

    let tester = world.create_box_shape(Vec3::new(2.0, 1.0, 1.0));
    let result = world.check_shape_world_collision(
        tester,
        Vec3::ZERO,
        glam::Quat::IDENTITY,
        &SweepFilter::default(),
        None,
    );

    assert_eq!(result.contacts.len(), 2);
    assert_relative_eq!(result.push.y, 0.25, epsilon = 1e-4);
    assert_relative_eq!(result.push.x, 0.0, epsilon = 1e-4);
}

#[test]
fn test_limit_rearms_after_leaving_it() {
    let mut world = zero_gravity_world();
    let limit = 45f32.to_radians();
    let (_, desc) = hinged_door(&mut world, Some((-limit, limit)));
    let hinge = world.create_joint(&desc).unwrap();
    world
        .create_controller(
            hinge,
            &ControllerDesc::new("slam")
                .proportional(40.0, 0.0)
                .input(ControllerInput::JointAngle, Axis::Y)
                .output(ControllerOutput::Torque, Axis::Y)
                .destination(std::f32::consts::PI),
        )
        .unwrap();
    world
        .create_controller(
            hinge,
            &ControllerDesc::new("center")
                .pid(20.0, 0.0, 12.0)
                .input(ControllerInput::JointAngle, Axis::Y)
                .output(ControllerOutput::Torque, Axis::Y)
                .destination(0.0)
                .active(false),
        )
        .unwrap();

    let first = run(&mut world, 120);
    assert!(limit_count(&first, LimitSide::Max) >= 1);
    assert!(world.joint(hinge).unwrap().has_collided());

    // Pull the door back to the middle: the latch clears
    assert!(world.change_controller(hinge, "center"));
    let away = run(&mut world, 240);
    assert_eq!(limit_count(&away, LimitSide::Max), 0);
    assert!(world.joint_value(hinge).abs() < 0.3);
    assert!(!world.joint(hinge).unwrap().has_collided());

    // Slamming it again reports the limit again
    assert!(world.change_controller(hinge, "slam"));
    let again = run(&mut world, 120);
    assert!(limit_count(&again, LimitSide::Max) >= 1);
}

/// Refuses contact with one body and counts how often it was asked
struct Veto {
    refused: BodyHandle,
    asked: Rc<Cell<u32>>,
}

impl BodyCallback for Veto {
    fn on_begin_collision(&mut self, _body: BodyHandle, other: BodyHandle) -> bool {
        if other == self.refused {
            self.asked.set(self.asked.get() + 1);
            false
        } else {
            true
        }
    }
}

#[test]
fn test_body_callback_vetoes_contact_pair() {
    let (mut world, floor) = world_with_floor();
    let cube = world.create_box_shape(Vec3::splat(0.5));
    let ghost = world
        .create_body(
            &BodyDesc::new("ghost", cube)
                .mass(1.0)
                .position(Vec3::new(-2.0, 1.0, 0.0)),
        )
        .unwrap();
    let solid = world
        .create_body(
            &BodyDesc::new("solid", cube)
                .mass(1.0)
                .position(Vec3::new(2.0, 1.0, 0.0)),
        )
        .unwrap();

    let asked = Rc::new(Cell::new(0));
    world.add_body_callback(
        ghost,
        Box::new(Veto {
            refused: floor,
            asked: asked.clone(),
        }),
    );
    // Same callback type, vetoing a body it never meets
    world.add_body_callback(
        solid,
        Box::new(Veto {
            refused: ghost,
            asked: Rc::new(Cell::new(0)),
        }),
    );

    run(&mut world, 90);

    assert!(asked.get() > 0);
    // Fell through the floor (bottom face at y = -1)
    assert!(world.body_position(ghost).y < -1.5);
    assert_relative_eq!(world.body_position(solid).y, 0.25, epsilon = 0.02);
}

#[test]
fn test_move_sound_starts_after_debounce_and_stops() {
    let mut world = zero_gravity_world();
    let player = RecordingPlayer::default();
    let started = player.started.clone();
    world.set_sound_player(Box::new(player));

    let (door, desc) = hinged_door(&mut world, None);
    let hinge = world
        .create_joint(&desc.move_sound(MoveSound::new("creak", MoveSpeedType::Angular)))
        .unwrap();
    // Swinging about the hinge: the door center 0.5 m out moves at 1 m/s
    world.set_angular_velocity(door, Vec3::new(0.0, 2.0, 0.0));
    world.set_linear_velocity(door, Vec3::new(0.0, 0.0, -1.0));

    // Three frames above the minimum speed before the loop starts
    run(&mut world, 3);
    assert!(started.borrow().is_empty());
    run(&mut world, 1);
    assert_eq!(*started.borrow(), vec!["creak".to_string()]);
    assert!(world.joint(hinge).unwrap().move_sound_active());

    // Keeps one loop running while the door swings
    run(&mut world, 30);
    assert_eq!(started.borrow().len(), 1);

    world.set_angular_velocity(door, Vec3::ZERO);
    world.set_linear_velocity(door, Vec3::ZERO);
    run(&mut world, 1);
    assert!(!world.joint(hinge).unwrap().move_sound_active());
}

#[test]
fn test_screw_turns_as_it_travels() {
    let mut world = zero_gravity_world();
    let shape = world.create_box_shape(Vec3::splat(0.2));
    let nut = world
        .create_body(&BodyDesc::new("nut", shape).mass(1.0))
        .unwrap();
    let thread = world
        .create_joint(
            &JointDesc::new("thread", JointKind::Screw, nut)
                .pin(Vec3::Y)
                .pitch(0.2)
                .limits(-1.0, 1.0),
        )
        .unwrap();

    world.set_linear_velocity(nut, Vec3::new(0.0, 0.5, 0.0));
    let events = run(&mut world, 30);

    // 0.5 m/s at 0.2 m per turn
    assert_relative_eq!(
        world.angular_velocity(nut).y,
        0.5 * std::f32::consts::TAU / 0.2,
        epsilon = 0.5
    );
    assert_relative_eq!(world.joint_value(thread), 0.25, epsilon = 0.02);
    assert_relative_eq!(world.body_position(nut).x, 0.0, epsilon = 1e-3);
    assert_eq!(limit_count(&events, LimitSide::Max), 0);

    // Screw travel is checked against the distance tolerance
    world.set_linear_velocity(nut, Vec3::new(0.0, 2.0, 0.0));
    let events = run(&mut world, 60);
    assert!(limit_count(&events, LimitSide::Max) >= 1);
    assert!(world.joint(thread).unwrap().has_collided());
    assert!(world.joint_value(thread) <= 1.0 + 0.02);
}
