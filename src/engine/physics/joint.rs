// Joints: backend constraint plus limit feedback, breakage and move sounds

use glam::{Quat, Vec3};
use log::{debug, warn};
use rapier3d::prelude::{
    GenericJoint, GenericJointBuilder, ImpulseJointHandle, JointAxesMask, JointAxis,
};
use std::collections::BTreeMap;

use super::body::BodyHandle;
use super::controller::{ControllerHandle, EndCondition, PhysicsController};
use super::events::{EventQueue, LimitEvent, LimitSide, PhysicsEvent};
use super::handle::{Arena, Handle};
use super::material::SpeedBandSound;
use super::sound::{play_one_shot, LoopingSound, SoundPlayer};
use super::PhysicsError;
use crate::core::math::{lerp, to_isometry, twist_angle};

/// Handle to a joint owned by the physics world
pub type JointHandle = Handle<PhysicsJoint>;

/// Called on the has-collided edge of a limit
pub type LimitHandler = Box<dyn FnMut(&LimitEvent)>;

/// Frames above the minimum move speed before the move sound starts
pub const MOVE_SOUND_START_FRAMES: u32 = 3;

/// Velocity motor gain coupling a screw's spin to its travel
pub(crate) const SCREW_COUPLING: f32 = 1.0e4;

/// Fade speed used when the move sound stops
pub const MOVE_SOUND_FADE_OUT: f32 = 4.3;

const MOVE_SOUND_FADE_IN: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JointKind {
    #[default]
    Hinge,
    Slider,
    Ball,
    /// Slider whose child turns about the pin as it travels, `pitch` meters per turn
    Screw,
}

impl JointKind {
    /// Whether the joint value is a distance rather than an angle
    pub fn is_linear(self) -> bool {
        matches!(self, JointKind::Slider | JointKind::Screw)
    }
}

/// Which relative speed drives the move sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveSpeedType {
    #[default]
    Linear,
    Angular,
}

/// Looping sound played while the joint moves.
///
/// Speed maps to volume and playback frequency through three points: the
/// sound starts at `min_speed`, reaches the middle values at `middle_speed`
/// and the max values at `max_speed`.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveSound {
    pub sound: String,
    pub speed_type: MoveSpeedType,
    pub min_speed: f32,
    pub middle_speed: f32,
    pub max_speed: f32,
    pub min_freq: f32,
    pub middle_freq: f32,
    pub max_freq: f32,
    pub min_volume: f32,
    pub middle_volume: f32,
    pub max_volume: f32,
}

impl Default for MoveSound {
    fn default() -> Self {
        Self {
            sound: String::new(),
            speed_type: MoveSpeedType::Linear,
            min_speed: 0.1,
            middle_speed: 1.0,
            max_speed: 2.0,
            min_freq: 0.7,
            middle_freq: 1.0,
            max_freq: 1.3,
            min_volume: 0.0,
            middle_volume: 0.7,
            max_volume: 1.0,
        }
    }
}

impl MoveSound {
    pub fn new(sound: &str, speed_type: MoveSpeedType) -> Self {
        Self {
            sound: sound.to_string(),
            speed_type,
            ..Self::default()
        }
    }

    /// (volume, frequency) for a speed at or above `min_speed`
    pub fn curve(&self, speed: f32) -> (f32, f32) {
        fn t(value: f32, from: f32, to: f32) -> f32 {
            if to - from <= f32::EPSILON {
                1.0
            } else {
                ((value - from) / (to - from)).clamp(0.0, 1.0)
            }
        }

        if speed <= self.middle_speed {
            let t = t(speed, self.min_speed, self.middle_speed);
            (
                lerp(self.min_volume, self.middle_volume, t),
                lerp(self.min_freq, self.middle_freq, t),
            )
        } else {
            let t = t(speed, self.middle_speed, self.max_speed);
            (
                lerp(self.middle_volume, self.max_volume, t),
                lerp(self.middle_freq, self.max_freq, t),
            )
        }
    }
}

/// Description of a joint to create. Pivot and pin are in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct JointDesc {
    pub name: String,
    pub kind: JointKind,
    /// `None` anchors the joint to the world
    pub parent: Option<BodyHandle>,
    pub child: BodyHandle,
    pub pivot: Vec3,
    pub pin: Vec3,
    /// (min, max) in radians for hinges and balls (max only), meters for sliders and screws
    pub limits: Option<(f32, f32)>,
    /// Travel along the pin per full turn, screws only. Negative pitch turns left-handed.
    pub pitch: f32,
    pub min_limit_effect: SpeedBandSound,
    pub max_limit_effect: SpeedBandSound,
    pub breakable: bool,
    pub break_force: f32,
    pub break_sound: String,
    /// Distance from a limit inside which the child is held at rest, 0 disables
    pub sticky_min_distance: f32,
    pub sticky_max_distance: f32,
    pub move_sound: Option<MoveSound>,
    pub collide_connected: bool,
}

impl JointDesc {
    pub fn new(name: &str, kind: JointKind, child: BodyHandle) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent: None,
            child,
            pivot: Vec3::ZERO,
            pin: Vec3::Y,
            limits: None,
            pitch: 0.1,
            min_limit_effect: SpeedBandSound::default(),
            max_limit_effect: SpeedBandSound::default(),
            breakable: false,
            break_force: 0.0,
            break_sound: String::new(),
            sticky_min_distance: 0.0,
            sticky_max_distance: 0.0,
            move_sound: None,
            collide_connected: false,
        }
    }

    pub fn parent(mut self, parent: BodyHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn pivot(mut self, pivot: Vec3) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn pin(mut self, pin: Vec3) -> Self {
        self.pin = pin;
        self
    }

    pub fn limits(mut self, min: f32, max: f32) -> Self {
        self.limits = Some((min, max));
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn limit_effects(mut self, min: SpeedBandSound, max: SpeedBandSound) -> Self {
        self.min_limit_effect = min;
        self.max_limit_effect = max;
        self
    }

    pub fn breakable(mut self, force: f32, sound: &str) -> Self {
        self.breakable = true;
        self.break_force = force;
        self.break_sound = sound.to_string();
        self
    }

    pub fn sticky(mut self, min_distance: f32, max_distance: f32) -> Self {
        self.sticky_min_distance = min_distance;
        self.sticky_max_distance = max_distance;
        self
    }

    pub fn move_sound(mut self, sound: MoveSound) -> Self {
        self.move_sound = Some(sound);
        self
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.pin.length_squared() < 1e-8 {
            return Err(PhysicsError::InvalidConfig(format!(
                "joint '{}' needs a non-zero pin",
                self.name
            )));
        }
        if let Some((min, max)) = self.limits {
            if min > max {
                return Err(PhysicsError::InvalidConfig(format!(
                    "joint '{}' has min limit above max limit",
                    self.name
                )));
            }
        }
        if self.kind == JointKind::Screw && !(self.pitch.is_finite() && self.pitch.abs() > 1e-6) {
            return Err(PhysicsError::InvalidConfig(format!(
                "screw joint '{}' needs a non-zero pitch",
                self.name
            )));
        }
        if self.parent == Some(self.child) {
            return Err(PhysicsError::InvalidConfig(format!(
                "joint '{}' connects a body to itself",
                self.name
            )));
        }
        if self.breakable && self.break_force <= 0.0 {
            return Err(PhysicsError::InvalidConfig(format!(
                "joint '{}' is breakable without a break force",
                self.name
            )));
        }
        Ok(())
    }

    /// Backend constraint. The joint frame is placed at the pivot with its X
    /// axis along the pin, expressed in each body's local frame.
    ///
    /// A screw frees travel and spin about the pin. The world couples the
    /// spin to the travel every step through a velocity motor on the
    /// angular axis.
    pub(crate) fn backend_joint(
        &self,
        parent_pose: (Vec3, Quat),
        child_pose: (Vec3, Quat),
    ) -> GenericJoint {
        let pin = self.pin.normalize_or_zero();
        let frame = to_isometry(self.pivot, Quat::from_rotation_arc(Vec3::X, pin));
        let frame1 = to_isometry(parent_pose.0, parent_pose.1).inverse() * frame;
        let frame2 = to_isometry(child_pose.0, child_pose.1).inverse() * frame;

        let (mask, limit_axes): (JointAxesMask, &[JointAxis]) = match self.kind {
            JointKind::Hinge => (JointAxesMask::LOCKED_REVOLUTE_AXES, &[JointAxis::AngX]),
            JointKind::Slider => (JointAxesMask::LOCKED_PRISMATIC_AXES, &[JointAxis::X]),
            JointKind::Screw => (
                JointAxesMask::Y | JointAxesMask::Z | JointAxesMask::ANG_Y | JointAxesMask::ANG_Z,
                &[JointAxis::X],
            ),
            JointKind::Ball => (
                JointAxesMask::LOCKED_SPHERICAL_AXES,
                &[JointAxis::AngY, JointAxis::AngZ],
            ),
        };

        let mut builder = GenericJointBuilder::new(mask)
            .local_frame1(frame1)
            .local_frame2(frame2)
            .contacts_enabled(self.collide_connected);
        if let Some((min, max)) = self.limits {
            for axis in limit_axes {
                let range = match self.kind {
                    JointKind::Ball => [-max.abs(), max.abs()],
                    _ => [min, max],
                };
                builder = builder.limits(*axis, range);
            }
        }
        builder.build()
    }
}

/// Relative motion of a joint's bodies gathered after the backend step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMotion {
    pub child_position: Vec3,
    pub child_rotation: Quat,
    /// Child velocity minus parent velocity
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub child_enabled: bool,
}

/// Borrowed world state a limit edge may touch
pub(crate) struct LimitContext<'a> {
    pub controllers: &'a mut Arena<PhysicsController>,
    pub events: &'a mut EventQueue,
    pub player: &'a mut dyn SoundPlayer,
}

pub struct PhysicsJoint {
    name: String,
    kind: JointKind,
    parent: Option<BodyHandle>,
    child: BodyHandle,
    pub(crate) backend: ImpulseJointHandle,
    pin: Vec3,
    /// World pivot, refreshed from the child after each step unless world-anchored
    pivot: Vec3,
    /// Pin and pivot in the parent frame (world frame when anchored)
    parent_pin: Vec3,
    parent_pivot: Vec3,
    child_local_pin: Vec3,
    child_local_pivot: Vec3,
    initial_relative: Quat,
    limits: Option<(f32, f32)>,
    pitch: f32,
    min_limit_effect: SpeedBandSound,
    max_limit_effect: SpeedBandSound,
    has_collided: bool,
    breakable: bool,
    break_force: f32,
    break_sound: String,
    broken: bool,
    break_reported: bool,
    sticky_min_distance: f32,
    sticky_max_distance: f32,
    move_sound: Option<MoveSound>,
    move_loop: LoopingSound,
    move_start_count: u32,
    controllers: BTreeMap<String, ControllerHandle>,
    limit_handler: Option<LimitHandler>,
}

impl PhysicsJoint {
    pub(crate) fn new(
        desc: &JointDesc,
        backend: ImpulseJointHandle,
        parent_pose: (Vec3, Quat),
        child_pose: (Vec3, Quat),
    ) -> Self {
        let pin = desc.pin.normalize_or_zero();
        let (parent_pos, parent_rot) = parent_pose;
        let (child_pos, child_rot) = child_pose;
        Self {
            name: desc.name.clone(),
            kind: desc.kind,
            parent: desc.parent,
            child: desc.child,
            backend,
            pin,
            pivot: desc.pivot,
            parent_pin: parent_rot.inverse() * pin,
            parent_pivot: parent_rot.inverse() * (desc.pivot - parent_pos),
            child_local_pin: child_rot.inverse() * pin,
            child_local_pivot: child_rot.inverse() * (desc.pivot - child_pos),
            initial_relative: parent_rot.inverse() * child_rot,
            limits: desc.limits,
            pitch: desc.pitch,
            min_limit_effect: desc.min_limit_effect.clone(),
            max_limit_effect: desc.max_limit_effect.clone(),
            has_collided: false,
            breakable: desc.breakable,
            break_force: desc.break_force,
            break_sound: desc.break_sound.clone(),
            broken: false,
            break_reported: false,
            sticky_min_distance: desc.sticky_min_distance,
            sticky_max_distance: desc.sticky_max_distance,
            move_sound: desc.move_sound.clone(),
            move_loop: LoopingSound::default(),
            move_start_count: 0,
            controllers: BTreeMap::new(),
            limit_handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    pub fn parent(&self) -> Option<BodyHandle> {
        self.parent
    }

    pub fn child(&self) -> BodyHandle {
        self.child
    }

    pub fn pin(&self) -> Vec3 {
        self.pin
    }

    pub fn pivot(&self) -> Vec3 {
        self.pivot
    }

    pub fn limits(&self) -> Option<(f32, f32)> {
        self.limits
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn has_collided(&self) -> bool {
        self.has_collided
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Break the joint; the world removes it on the next joint pass
    pub fn break_joint(&mut self) {
        if self.breakable {
            self.broken = true;
        } else {
            warn!("Joint '{}' is not breakable", self.name);
        }
    }

    pub fn set_limit_handler(&mut self, handler: Option<LimitHandler>) {
        self.limit_handler = handler;
    }

    pub fn move_sound_active(&self) -> bool {
        self.move_loop.is_running()
    }

    // --- Controllers ---

    pub fn controllers(&self) -> &BTreeMap<String, ControllerHandle> {
        &self.controllers
    }

    pub fn controller(&self, name: &str) -> Option<ControllerHandle> {
        self.controllers.get(name).copied()
    }

    pub(crate) fn add_controller(&mut self, name: &str, handle: ControllerHandle) {
        if let Some(old) = self.controllers.insert(name.to_string(), handle) {
            warn!(
                "Joint '{}' already had controller '{}' ({:?}); replaced",
                self.name, name, old
            );
        }
    }

    pub(crate) fn remove_controller(&mut self, handle: ControllerHandle) {
        self.controllers.retain(|_, h| *h != handle);
    }

    pub(crate) fn take_controllers(&mut self) -> Vec<ControllerHandle> {
        std::mem::take(&mut self.controllers).into_values().collect()
    }

    /// Activate exactly the named controller and deactivate its siblings
    pub(crate) fn change_controller(
        &self,
        name: &str,
        controllers: &mut Arena<PhysicsController>,
    ) -> bool {
        if !self.controllers.contains_key(name) {
            warn!("Joint '{}' has no controller '{}'", self.name, name);
            return false;
        }
        for (ctrl_name, handle) in &self.controllers {
            if let Some(ctrl) = controllers.get_mut(*handle) {
                ctrl.set_active(ctrl_name == name);
            }
        }
        true
    }

    /// Deactivate a controller that reached its end and activate its successor
    pub(crate) fn finish_controller(
        &self,
        joint: JointHandle,
        handle: ControllerHandle,
        controllers: &mut Arena<PhysicsController>,
        events: &mut EventQueue,
    ) {
        let Some(ctrl) = controllers.get_mut(handle) else {
            return;
        };
        ctrl.set_active(false);
        let name = ctrl.name().to_string();
        let next_name = ctrl.next_controller().map(str::to_string);

        let next = next_name.and_then(|next_name| match self.controllers.get(&next_name) {
            Some(&next) => Some(next),
            None => {
                warn!(
                    "Controller '{}' on joint '{}' names unknown next controller '{}'",
                    name, self.name, next_name
                );
                None
            }
        });
        if let Some(next) = next {
            if let Some(next_ctrl) = controllers.get_mut(next) {
                next_ctrl.set_active(true);
                debug!("Joint '{}': '{}' -> '{}'", self.name, name, next_ctrl.name());
            }
        }

        events.push(PhysicsEvent::ControllerFinished {
            controller: handle,
            joint,
            name,
            next,
        });
    }

    // --- Measurement ---

    /// Spin (rad/s about the pin) a screw needs for the given relative velocity.
    /// `None` for every other kind.
    pub(crate) fn screw_spin(&self, parent_rotation: Quat, relative_velocity: Vec3) -> Option<f32> {
        if self.kind != JointKind::Screw {
            return None;
        }
        let travel = relative_velocity.dot(parent_rotation * self.parent_pin);
        Some(travel * std::f32::consts::TAU / self.pitch)
    }

    /// Current joint value: hinge angle and ball swing in radians, slider
    /// and screw travel in meters
    pub fn measure(&self, parent_pose: (Vec3, Quat), child_pose: (Vec3, Quat)) -> f32 {
        let (parent_pos, parent_rot) = parent_pose;
        let (child_pos, child_rot) = child_pose;
        match self.kind {
            JointKind::Hinge => {
                let relative = parent_rot.inverse() * child_rot * self.initial_relative.inverse();
                twist_angle(relative, self.parent_pin)
            }
            JointKind::Slider | JointKind::Screw => {
                let parent_anchor = parent_pos + parent_rot * self.parent_pivot;
                let child_anchor = child_pos + child_rot * self.child_local_pivot;
                (child_anchor - parent_anchor).dot(parent_rot * self.parent_pin)
            }
            JointKind::Ball => {
                let parent_axis = parent_rot * self.parent_pin;
                let child_axis = child_rot * self.child_local_pin;
                parent_axis.angle_between(child_axis)
            }
        }
    }

    /// Which limit the value sits at, if any
    pub fn limit_side(&self, value: f32, tolerance: f32) -> Option<LimitSide> {
        let (min, max) = self.limits?;
        match self.kind {
            JointKind::Ball => (value >= max.abs() - tolerance).then_some(LimitSide::Max),
            _ if value >= max - tolerance => Some(LimitSide::Max),
            _ if value <= min + tolerance => Some(LimitSide::Min),
            _ => None,
        }
    }

    /// Whether the child should be held at rest near a limit
    pub fn is_sticking(&self, value: f32) -> bool {
        let Some((min, max)) = self.limits else {
            return false;
        };
        (self.sticky_min_distance > 0.0 && value - min < self.sticky_min_distance)
            || (self.sticky_max_distance > 0.0 && max - value < self.sticky_max_distance)
    }

    // --- Limit feedback ---

    pub(crate) fn on_max_limit(&mut self, handle: JointHandle, speed: f32, ctx: &mut LimitContext) {
        self.on_limit(handle, LimitSide::Max, speed, ctx);
    }

    pub(crate) fn on_min_limit(&mut self, handle: JointHandle, speed: f32, ctx: &mut LimitContext) {
        self.on_limit(handle, LimitSide::Min, speed, ctx);
    }

    /// Clear the latch so the next limit contact fires again
    pub fn on_no_limit(&mut self) {
        self.has_collided = false;
    }

    fn on_limit(
        &mut self,
        handle: JointHandle,
        side: LimitSide,
        speed: f32,
        ctx: &mut LimitContext,
    ) {
        if self.has_collided {
            return;
        }
        self.has_collided = true;

        let event = LimitEvent {
            joint: handle,
            joint_name: self.name.clone(),
            side,
            speed,
        };
        if let Some(handler) = self.limit_handler.as_mut() {
            handler(&event);
        }
        ctx.events.push(PhysicsEvent::JointLimit(event));

        let end = match side {
            LimitSide::Min => EndCondition::OnMin,
            LimitSide::Max => EndCondition::OnMax,
        };
        let ending: Vec<ControllerHandle> = self
            .controllers
            .values()
            .copied()
            .filter(|h| {
                ctx.controllers
                    .get(*h)
                    .is_some_and(|c| c.is_active() && c.end_condition() == end)
            })
            .collect();
        for ctrl in ending {
            self.finish_controller(handle, ctrl, ctx.controllers, ctx.events);
        }

        let effect = match side {
            LimitSide::Min => &self.min_limit_effect,
            LimitSide::Max => &self.max_limit_effect,
        };
        if let Some(volume) = effect.volume(speed) {
            play_one_shot(ctx.player, &self.name, &effect.sound, self.pivot, volume);
        }
    }

    /// Refresh the pivot and drive the move sound
    pub fn on_physics_update(&mut self, motion: &JointMotion, player: &mut dyn SoundPlayer) {
        if self.parent.is_some() {
            self.pivot = motion.child_position + motion.child_rotation * self.child_local_pivot;
        }

        let Some(sound) = self.move_sound.as_ref() else {
            return;
        };
        let speed = if motion.child_enabled {
            match sound.speed_type {
                MoveSpeedType::Linear => motion.linear_velocity.length(),
                MoveSpeedType::Angular => motion.angular_velocity.length(),
            }
        } else {
            0.0
        };

        if self.move_loop.is_running() {
            if speed < sound.min_speed {
                self.move_loop.stop(player, MOVE_SOUND_FADE_OUT);
            } else {
                let (volume, freq) = sound.curve(speed);
                self.move_loop.update(player, self.pivot, volume, freq);
            }
        } else if speed >= sound.min_speed {
            if self.move_start_count >= MOVE_SOUND_START_FRAMES {
                self.move_start_count = 0;
                let (volume, freq) = sound.curve(speed);
                self.move_loop
                    .start(player, &self.name, &sound.sound, MOVE_SOUND_FADE_IN);
                self.move_loop.update(player, self.pivot, volume, freq);
            } else {
                self.move_start_count += 1;
            }
        } else {
            self.move_start_count = 0;
        }
    }

    /// True once when the joint should be removed: manually broken or
    /// loaded past its break force
    pub fn check_breakage(&mut self, force: f32, player: &mut dyn SoundPlayer) -> bool {
        if !self.breakable || self.break_reported {
            return false;
        }
        if self.broken || force >= self.break_force {
            self.broken = true;
            self.break_reported = true;
            play_one_shot(player, &self.name, &self.break_sound, self.pivot, 1.0);
            debug!("Joint '{}' broke at force {:.2}", self.name, force);
            return true;
        }
        false
    }

    pub(crate) fn stop_sounds(&mut self, player: &mut dyn SoundPlayer) {
        self.move_loop.stop(player, MOVE_SOUND_FADE_OUT);
    }
}

impl std::fmt::Debug for PhysicsJoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsJoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("limits", &self.limits)
            .field("broken", &self.broken)
            .field("controllers", &self.controllers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::controller::{ControllerDesc, ControllerInputSpace};
    use crate::engine::physics::sound::{NullSoundPlayer, SoundEntityId};
    use approx::assert_relative_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingPlayer {
        created: Vec<String>,
        faded_out: usize,
    }

    impl SoundPlayer for RecordingPlayer {
        fn create_sound_entity(&mut self, _: &str, sound: &str, _: bool) -> Option<SoundEntityId> {
            self.created.push(sound.to_string());
            Some(SoundEntityId(self.created.len() as u64))
        }
        fn set_position(&mut self, _: SoundEntityId, _: Vec3) {}
        fn set_volume(&mut self, _: SoundEntityId, _: f32) {}
        fn set_speed(&mut self, _: SoundEntityId, _: f32) {}
        fn fade_in(&mut self, _: SoundEntityId, _: f32) {}
        fn fade_out(&mut self, _: SoundEntityId, _: f32) {
            self.faded_out += 1;
        }
        fn is_playing(&self, _: SoundEntityId) -> bool {
            true
        }
    }

    fn identity() -> (Vec3, Quat) {
        (Vec3::ZERO, Quat::IDENTITY)
    }

    fn hinge(desc: JointDesc) -> PhysicsJoint {
        PhysicsJoint::new(&desc, ImpulseJointHandle::invalid(), identity(), identity())
    }

    fn door_desc() -> JointDesc {
        JointDesc::new("door", JointKind::Hinge, Handle::new(1, 0))
            .limits(-1.0, 1.0)
            .limit_effects(
                SpeedBandSound::new("thud_min", 0.5, 2.0),
                SpeedBandSound::new("thud_max", 0.5, 2.0),
            )
    }

    #[test]
    fn test_limit_edge_fires_once() {
        let mut joint = hinge(door_desc());
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        joint.set_limit_handler(Some(Box::new(move |_: &LimitEvent| seen.set(seen.get() + 1))));

        let mut controllers = Arena::new();
        let mut events = EventQueue::default();
        let mut player = RecordingPlayer::default();
        let handle: JointHandle = Handle::new(0, 0);

        for _ in 0..5 {
            let mut ctx = LimitContext {
                controllers: &mut controllers,
                events: &mut events,
                player: &mut player,
            };
            joint.on_max_limit(handle, 1.0, &mut ctx);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(player.created, vec!["thud_max".to_string()]);
        assert_eq!(events.len(), 1);

        joint.on_no_limit();
        let mut ctx = LimitContext {
            controllers: &mut controllers,
            events: &mut events,
            player: &mut player,
        };
        joint.on_min_limit(handle, 1.0, &mut ctx);
        assert_eq!(calls.get(), 2);
        assert_eq!(player.created.len(), 2);
    }

    #[test]
    fn test_limit_sound_skipped_below_min_speed() {
        let mut joint = hinge(door_desc());
        let mut controllers = Arena::new();
        let mut events = EventQueue::default();
        let mut player = RecordingPlayer::default();
        let mut ctx = LimitContext {
            controllers: &mut controllers,
            events: &mut events,
            player: &mut player,
        };
        joint.on_max_limit(Handle::new(0, 0), 0.1, &mut ctx);
        assert!(joint.has_collided());
        assert!(player.created.is_empty());
    }

    #[test]
    fn test_limit_end_condition_chains_controller() {
        let mut joint = hinge(door_desc());
        let joint_handle: JointHandle = Handle::new(0, 0);
        let mut controllers = Arena::new();
        let opening = controllers.insert(PhysicsController::new(
            &ControllerDesc::new("open")
                .end_condition(EndCondition::OnMax)
                .next_controller("close"),
            joint_handle,
            Handle::new(1, 0),
            ControllerInputSpace::World,
        ));
        let closing = controllers.insert(PhysicsController::new(
            &ControllerDesc::new("close").active(false),
            joint_handle,
            Handle::new(1, 0),
            ControllerInputSpace::World,
        ));
        joint.add_controller("open", opening);
        joint.add_controller("close", closing);

        let mut events = EventQueue::default();
        let mut player = NullSoundPlayer;
        let mut ctx = LimitContext {
            controllers: &mut controllers,
            events: &mut events,
            player: &mut player,
        };
        joint.on_max_limit(joint_handle, 0.0, &mut ctx);

        assert!(!controllers.get(opening).unwrap().is_active());
        assert!(controllers.get(closing).unwrap().is_active());
        let drained = events.drain();
        assert!(drained.iter().any(|e| matches!(
            e,
            PhysicsEvent::ControllerFinished { next: Some(n), .. } if *n == closing
        )));
    }

    #[test]
    fn test_change_controller_is_exclusive() {
        let mut joint = hinge(door_desc());
        let mut controllers = Arena::new();
        let names = ["a", "b", "c"];
        for name in names {
            let h = controllers.insert(PhysicsController::new(
                &ControllerDesc::new(name),
                Handle::new(0, 0),
                Handle::new(1, 0),
                ControllerInputSpace::World,
            ));
            joint.add_controller(name, h);
        }

        assert!(joint.change_controller("b", &mut controllers));
        let active: Vec<_> = controllers
            .iter()
            .filter(|(_, c)| c.is_active())
            .map(|(_, c)| c.name().to_string())
            .collect();
        assert_eq!(active, vec!["b".to_string()]);
        assert!(!joint.change_controller("missing", &mut controllers));
    }

    #[test]
    fn test_hinge_measure() {
        let joint = hinge(door_desc());
        let child = (Vec3::ZERO, Quat::from_rotation_y(0.3));
        assert_relative_eq!(joint.measure(identity(), child), 0.3, epsilon = 1e-5);
        assert_eq!(joint.limit_side(0.995, 0.01), Some(LimitSide::Max));
        assert_eq!(joint.limit_side(-0.995, 0.01), Some(LimitSide::Min));
        assert_eq!(joint.limit_side(0.0, 0.01), None);
    }

    #[test]
    fn test_slider_measure() {
        let desc = JointDesc::new("drawer", JointKind::Slider, Handle::new(1, 0))
            .pin(Vec3::X)
            .limits(0.0, 0.5)
            .sticky(0.02, 0.0);
        let joint = hinge(desc);
        let child = (Vec3::new(0.25, 0.0, 0.0), Quat::IDENTITY);
        assert_relative_eq!(joint.measure(identity(), child), 0.25, epsilon = 1e-5);
        assert!(joint.is_sticking(0.01));
        assert!(!joint.is_sticking(0.25));
    }

    #[test]
    fn test_screw_measures_travel_and_couples_spin() {
        let desc = JointDesc::new("jack", JointKind::Screw, Handle::new(1, 0))
            .pin(Vec3::Y)
            .pitch(0.05)
            .limits(0.0, 0.3);
        assert!(desc.validate().is_ok());
        assert!(desc.clone().pitch(0.0).validate().is_err());
        // Pitch only matters for screws
        assert!(door_desc().pitch(0.0).validate().is_ok());

        let joint = hinge(desc);
        // Spin about the pin does not count as travel
        let child = (Vec3::new(0.0, 0.1, 0.0), Quat::from_rotation_y(1.0));
        assert_relative_eq!(joint.measure(identity(), child), 0.1, epsilon = 1e-5);
        assert_eq!(joint.limit_side(0.299, 0.005), Some(LimitSide::Max));
        assert_eq!(joint.limit_side(0.001, 0.005), Some(LimitSide::Min));

        // 0.05 m/s along the pin is one turn per second
        let spin = joint.screw_spin(Quat::IDENTITY, Vec3::new(0.3, 0.05, 0.0));
        assert_relative_eq!(spin.unwrap(), std::f32::consts::TAU, epsilon = 1e-4);
        assert!(hinge(door_desc()).screw_spin(Quat::IDENTITY, Vec3::Y).is_none());
    }

    #[test]
    fn test_breakage_reported_once() {
        let desc = door_desc().breakable(100.0, "snap");
        let mut joint = hinge(desc);
        let mut player = RecordingPlayer::default();

        assert!(!joint.check_breakage(50.0, &mut player));
        assert!(joint.check_breakage(150.0, &mut player));
        assert!(!joint.check_breakage(150.0, &mut player));
        assert_eq!(player.created, vec!["snap".to_string()]);
    }

    #[test]
    fn test_manual_break() {
        let mut joint = hinge(door_desc().breakable(1e6, ""));
        joint.break_joint();
        assert!(joint.check_breakage(0.0, &mut NullSoundPlayer));
    }

    #[test]
    fn test_move_sound_debounce_and_fade() {
        let desc = door_desc().move_sound(MoveSound::new("creak", MoveSpeedType::Angular));
        let mut joint = hinge(desc);
        let mut player = RecordingPlayer::default();
        let moving = JointMotion {
            child_position: Vec3::ZERO,
            child_rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::new(0.0, 1.5, 0.0),
            child_enabled: true,
        };

        for _ in 0..MOVE_SOUND_START_FRAMES {
            joint.on_physics_update(&moving, &mut player);
        }
        assert!(!joint.move_sound_active());
        joint.on_physics_update(&moving, &mut player);
        assert!(joint.move_sound_active());

        let resting = JointMotion {
            angular_velocity: Vec3::ZERO,
            ..moving
        };
        joint.on_physics_update(&resting, &mut player);
        assert!(!joint.move_sound_active());
        assert_eq!(player.faded_out, 1);
    }

    #[test]
    fn test_move_curve_segments() {
        let sound = MoveSound::new("creak", MoveSpeedType::Linear);
        let (volume, freq) = sound.curve(sound.middle_speed);
        assert_relative_eq!(volume, sound.middle_volume);
        assert_relative_eq!(freq, sound.middle_freq);
        let (volume, freq) = sound.curve(100.0);
        assert_relative_eq!(volume, sound.max_volume);
        assert_relative_eq!(freq, sound.max_freq);
    }

    #[test]
    fn test_validate() {
        assert!(door_desc().validate().is_ok());
        assert!(door_desc().pin(Vec3::ZERO).validate().is_err());
        assert!(door_desc().limits(1.0, -1.0).validate().is_err());
    }
}
