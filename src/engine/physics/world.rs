use glam::{Quat, Vec3};
use log::{debug, info, warn};

use super::body::{BodyDesc, BodyHandle, PhysicsBody};
use super::character::{CharacterBody, CharacterConfig, CharacterHandle, CharacterShape};
use super::collision::{BodyCallback, SweepCallback};
use super::controller::{
    ControllerDesc, ControllerHandle, ControllerInputSpace, ControllerOutput, ControllerSample,
    PhysicsController,
};
use super::debug::DebugContacts;
use super::events::{EventQueue, LimitSide, PhysicsEvent};
use super::handle::Arena;
use super::joint::{
    JointDesc, JointHandle, JointKind, JointMotion, LimitContext, LimitHandler, PhysicsJoint,
    SCREW_COUPLING,
};
use super::material::PhysicsMaterial;
use super::shape::{Shape, ShapeHandle, ShapeKind};
use super::sound::{NullSoundPlayer, SoundPlayer};
use super::space::{BodyKind, PhysicsSpace, RayHit, SweepFilter, SweepResult};
use super::PhysicsError;

/// World-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    /// Gravity vector (default: -9.81 m/s² on the y axis)
    pub gravity: Vec3,
    /// Frame new controllers read speed inputs in
    pub controller_input_space: ControllerInputSpace,
    /// Record sweep contacts for debug drawing
    pub debug_contacts: bool,
    /// Hinge and ball joints count as "at the limit" this close to it (radians)
    pub limit_angle_tolerance: f32,
    /// Same for sliders and screws (meters)
    pub limit_distance_tolerance: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            controller_input_space: ControllerInputSpace::World,
            debug_contacts: false,
            limit_angle_tolerance: 0.01,
            limit_distance_tolerance: 0.005,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig(
                "gravity must be finite".to_string(),
            ));
        }
        if self.limit_angle_tolerance < 0.0 || self.limit_distance_tolerance < 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "limit tolerances must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log a failed lookup and turn it into `None`
fn logged<T>(action: &str, result: Result<T, PhysicsError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", action, e);
            None
        }
    }
}

/// Shape used for a character of the given configuration and size
fn character_shape(shape: CharacterShape, size: Vec3) -> Shape {
    let kind = match shape {
        CharacterShape::Box => ShapeKind::Box { size },
        CharacterShape::Cylinder => ShapeKind::Cylinder {
            radius: size.x * 0.5,
            height: size.y,
        },
        CharacterShape::Capsule => ShapeKind::Capsule {
            radius: size.x * 0.5,
            height: size.y,
        },
    };
    Shape::primitive(kind, Vec3::ZERO, Quat::IDENTITY)
}

/// Physics world that owns every body, joint, controller and character and
/// runs the fixed per-step pipeline
pub struct PhysicsWorld {
    config: WorldConfig,
    space: PhysicsSpace,
    joints: Arena<PhysicsJoint>,
    controllers: Arena<PhysicsController>,
    characters: Arena<CharacterBody>,
    events: EventQueue,
    sound_player: Box<dyn SoundPlayer>,
}

impl PhysicsWorld {
    /// Create a new physics world. An invalid configuration falls back to the defaults.
    pub fn new(config: WorldConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Invalid world config ({}), using defaults", e);
                WorldConfig::default()
            }
        };
        let mut space = PhysicsSpace::new(config.gravity);
        space.debug.set_enabled(config.debug_contacts);
        info!("Physics world created (gravity {:?})", config.gravity);

        Self {
            config,
            space,
            joints: Arena::new(),
            controllers: Arena::new(),
            characters: Arena::new(),
            events: EventQueue::default(),
            sound_player: Box::new(NullSoundPlayer),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vec3 {
        self.space.gravity()
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
        self.space.set_gravity(gravity);
    }

    /// Read access to the backend wrapper for queries not mirrored here
    pub fn space(&self) -> &PhysicsSpace {
        &self.space
    }

    pub fn set_sound_player(&mut self, player: Box<dyn SoundPlayer>) {
        self.sound_player = player;
    }

    pub fn sound_player(&self) -> &dyn SoundPlayer {
        self.sound_player.as_ref()
    }

    // --- Materials ---

    /// Register (or replace) a material. Invalid materials are rejected.
    pub fn create_material(&mut self, material: PhysicsMaterial) -> bool {
        match material.validate() {
            Ok(()) => {
                debug!("Material '{}' registered", material.name);
                self.space.add_material(material);
                true
            }
            Err(e) => {
                warn!("Material rejected: {}", e);
                false
            }
        }
    }

    pub fn material(&self, name: &str) -> Option<&PhysicsMaterial> {
        self.space.material(name)
    }

    pub fn set_body_material(&mut self, body: BodyHandle, material: &str) {
        logged(
            "set_body_material",
            self.space.set_body_material(body, material),
        );
    }

    // --- Shapes ---

    /// Create a shape with a local offset. Compound kinds combine existing
    /// shapes and fail when no children are given.
    pub fn create_shape(
        &mut self,
        kind: ShapeKind,
        offset_position: Vec3,
        offset_rotation: Quat,
    ) -> Option<ShapeHandle> {
        if let ShapeKind::Compound { children } = kind {
            return logged(
                "create_shape",
                self.space
                    .add_compound_shape(&children, offset_position, offset_rotation),
            );
        }
        Some(self.add_primitive(kind, offset_position, offset_rotation))
    }

    fn add_primitive(&mut self, kind: ShapeKind, offset_position: Vec3, offset_rotation: Quat) -> ShapeHandle {
        self.space
            .add_shape(Shape::primitive(kind, offset_position, offset_rotation))
    }

    pub fn create_box_shape(&mut self, size: Vec3) -> ShapeHandle {
        self.add_primitive(ShapeKind::Box { size }, Vec3::ZERO, Quat::IDENTITY)
    }

    pub fn create_sphere_shape(&mut self, radius: f32) -> ShapeHandle {
        self.add_primitive(ShapeKind::Sphere { radius }, Vec3::ZERO, Quat::IDENTITY)
    }

    pub fn create_cylinder_shape(&mut self, radius: f32, height: f32) -> ShapeHandle {
        self.add_primitive(
            ShapeKind::Cylinder { radius, height },
            Vec3::ZERO,
            Quat::IDENTITY,
        )
    }

    pub fn create_capsule_shape(&mut self, radius: f32, height: f32) -> ShapeHandle {
        self.add_primitive(
            ShapeKind::Capsule { radius, height },
            Vec3::ZERO,
            Quat::IDENTITY,
        )
    }

    /// Combine shapes (with their offsets) into one. Children stay alive while
    /// the compound does. Children must be primitives; a compound child fails.
    pub fn create_compound_shape(&mut self, children: &[ShapeHandle]) -> Option<ShapeHandle> {
        logged(
            "create_compound_shape",
            self.space
                .add_compound_shape(children, Vec3::ZERO, Quat::IDENTITY),
        )
    }

    /// Free an unused shape. Shapes still used by bodies are left alone.
    pub fn destroy_shape(&mut self, shape: ShapeHandle) -> bool {
        logged("destroy_shape", self.space.destroy_shape(shape)).is_some()
    }

    /// Users of a shape, 0 for unknown shapes
    pub fn shape_user_count(&self, shape: ShapeHandle) -> u32 {
        self.space.shape(shape).map(|s| s.users()).unwrap_or(0)
    }

    pub fn shape(&self, shape: ShapeHandle) -> Option<&Shape> {
        self.space.shape(shape)
    }

    // --- Bodies ---

    /// Create a body; a mass of 0 makes it static
    pub fn create_body(&mut self, desc: &BodyDesc) -> Option<BodyHandle> {
        let kind = if desc.is_static() {
            BodyKind::Static
        } else {
            BodyKind::Dynamic
        };
        logged("create_body", self.space.create_body(desc, kind))
    }

    /// Destroy a body, the joints using it and their controllers
    pub fn destroy_body(&mut self, handle: BodyHandle) {
        let Some(body) = self.space.body(handle) else {
            warn!("destroy_body: {}", PhysicsError::BodyNotFound(handle.index()));
            return;
        };
        if body.is_character() {
            warn!(
                "Body '{}' belongs to a character; destroy the character instead",
                body.name()
            );
            return;
        }
        self.remove_body_internal(handle);
    }

    fn remove_body_internal(&mut self, handle: BodyHandle) {
        let joints: Vec<JointHandle> = self
            .space
            .body(handle)
            .map(|b| b.joints().to_vec())
            .unwrap_or_default();
        for joint in joints {
            self.remove_joint(joint, false);
        }
        if let Some(body) = self.space.remove_body(handle, self.sound_player.as_mut()) {
            debug!("Body '{}' destroyed", body.name());
        }
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&PhysicsBody> {
        self.space.body(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut PhysicsBody> {
        self.space.body_mut(handle)
    }

    pub fn body_by_name(&self, name: &str) -> Option<BodyHandle> {
        self.space
            .bodies
            .iter()
            .find(|(_, body)| body.name() == name)
            .map(|(handle, _)| handle)
    }

    pub fn body_count(&self) -> usize {
        self.space.body_count()
    }

    pub fn body_position(&self, handle: BodyHandle) -> Vec3 {
        self.space.body_position(handle).unwrap_or(Vec3::ZERO)
    }

    pub fn body_rotation(&self, handle: BodyHandle) -> Quat {
        self.space.body_rotation(handle).unwrap_or(Quat::IDENTITY)
    }

    pub fn set_body_position(&mut self, handle: BodyHandle, position: Vec3) {
        self.space.set_body_position(handle, position);
    }

    pub fn set_body_rotation(&mut self, handle: BodyHandle, rotation: Quat) {
        self.space.set_body_rotation(handle, rotation);
    }

    pub fn linear_velocity(&self, handle: BodyHandle) -> Vec3 {
        self.space.linear_velocity(handle).unwrap_or(Vec3::ZERO)
    }

    pub fn angular_velocity(&self, handle: BodyHandle) -> Vec3 {
        self.space.angular_velocity(handle).unwrap_or(Vec3::ZERO)
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        self.space.set_linear_velocity(handle, velocity);
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        self.space.set_angular_velocity(handle, velocity);
    }

    pub fn add_force(&mut self, handle: BodyHandle, force: Vec3) {
        self.space.add_force(handle, force);
    }

    pub fn add_torque(&mut self, handle: BodyHandle, torque: Vec3) {
        self.space.add_torque(handle, torque);
    }

    pub fn add_impulse(&mut self, handle: BodyHandle, impulse: Vec3) {
        self.space.add_impulse(handle, impulse);
    }

    /// Wake (enable) or put to sleep (disable) a body
    pub fn set_body_enabled(&mut self, handle: BodyHandle, enabled: bool) {
        if enabled {
            self.space.wake_body(handle);
        } else {
            self.space.sleep_body(handle);
        }
    }

    pub fn is_body_enabled(&self, handle: BodyHandle) -> bool {
        self.space.is_body_enabled(handle)
    }

    pub fn set_body_collide(&mut self, handle: BodyHandle, collide: bool) {
        self.space.set_body_collide(handle, collide);
    }

    pub fn set_body_collide_character(&mut self, handle: BodyHandle, collide: bool) {
        self.space.set_body_collide_character(handle, collide);
    }

    /// Observe (and optionally veto) a body's contacts
    pub fn add_body_callback(&mut self, handle: BodyHandle, callback: Box<dyn BodyCallback>) {
        let Some(body) = self.space.body_mut(handle) else {
            warn!("add_body_callback: {}", PhysicsError::BodyNotFound(handle.index()));
            return;
        };
        body.callbacks.push(callback);
        self.space.enable_pair_filter(handle);
    }

    // --- Joints ---

    pub fn create_joint(&mut self, desc: &JointDesc) -> Option<JointHandle> {
        logged("create_joint", self.try_create_joint(desc))
    }

    fn try_create_joint(&mut self, desc: &JointDesc) -> Result<JointHandle, PhysicsError> {
        desc.validate()?;
        let child_pose = self
            .space
            .body_pose(desc.child)
            .ok_or(PhysicsError::BodyNotFound(desc.child.index()))?;
        let parent_pose = match desc.parent {
            Some(parent) => self
                .space
                .body_pose(parent)
                .ok_or(PhysicsError::BodyNotFound(parent.index()))?,
            None => (Vec3::ZERO, Quat::IDENTITY),
        };

        let backend_joint = desc.backend_joint(parent_pose, child_pose);
        let backend = self
            .space
            .insert_joint(desc.parent, desc.child, backend_joint)
            .ok_or(PhysicsError::BodyNotFound(desc.child.index()))?;
        let handle = self
            .joints
            .insert(PhysicsJoint::new(desc, backend, parent_pose, child_pose));

        for body in std::iter::once(desc.child).chain(desc.parent) {
            if let Some(body) = self.space.body_mut(body) {
                body.attach_joint(handle);
            }
        }
        debug!("Joint '{}' ({:?}) created", desc.name, desc.kind);
        Ok(handle)
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) {
        if !self.remove_joint(handle, false) {
            warn!("destroy_joint: {}", PhysicsError::JointNotFound(handle.index()));
        }
    }

    /// Remove a joint with its controllers and detach it from its bodies
    fn remove_joint(&mut self, handle: JointHandle, broken: bool) -> bool {
        let Some(mut joint) = self.joints.remove(handle) else {
            return false;
        };
        joint.stop_sounds(self.sound_player.as_mut());
        self.space.remove_joint(joint.backend);
        for controller in joint.take_controllers() {
            self.controllers.remove(controller);
        }
        for body in std::iter::once(joint.child()).chain(joint.parent()) {
            if let Some(body) = self.space.body_mut(body) {
                body.detach_joint(handle);
            }
        }
        if broken {
            info!("Joint '{}' broke", joint.name());
            self.events.push(PhysicsEvent::JointBroken {
                joint: handle,
                name: joint.name().to_string(),
                child: joint.child(),
                parent: joint.parent(),
            });
        }
        true
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&PhysicsJoint> {
        self.joints.get(handle)
    }

    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut PhysicsJoint> {
        self.joints.get_mut(handle)
    }

    pub fn joint_by_name(&self, name: &str) -> Option<JointHandle> {
        self.joints
            .iter()
            .find(|(_, joint)| joint.name() == name)
            .map(|(handle, _)| handle)
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    fn joint_poses(&self, joint: &PhysicsJoint) -> Option<((Vec3, Quat), (Vec3, Quat))> {
        let child = self.space.body_pose(joint.child())?;
        let parent = match joint.parent() {
            Some(parent) => self.space.body_pose(parent)?,
            None => (Vec3::ZERO, Quat::IDENTITY),
        };
        Some((parent, child))
    }

    /// Hinge angle / ball swing (radians) or slider distance (meters); 0 for unknown joints
    pub fn joint_value(&self, handle: JointHandle) -> f32 {
        self.joints
            .get(handle)
            .and_then(|joint| {
                let (parent, child) = self.joint_poses(joint)?;
                Some(joint.measure(parent, child))
            })
            .unwrap_or(0.0)
    }

    /// Constraint force over the last step
    pub fn joint_force(&self, handle: JointHandle) -> f32 {
        self.joints
            .get(handle)
            .map(|joint| self.space.joint_force(joint.backend))
            .unwrap_or(0.0)
    }

    /// Break a breakable joint; it is removed during the next step
    pub fn break_joint(&mut self, handle: JointHandle) {
        match self.joints.get_mut(handle) {
            Some(joint) => joint.break_joint(),
            None => warn!("break_joint: {}", PhysicsError::JointNotFound(handle.index())),
        }
    }

    pub fn set_joint_limit_handler(&mut self, handle: JointHandle, handler: LimitHandler) {
        match self.joints.get_mut(handle) {
            Some(joint) => joint.set_limit_handler(Some(handler)),
            None => warn!(
                "set_joint_limit_handler: {}",
                PhysicsError::JointNotFound(handle.index())
            ),
        }
    }

    // --- Controllers ---

    /// Create a controller on a joint, targeting the joint's child body
    pub fn create_controller(
        &mut self,
        joint: JointHandle,
        desc: &ControllerDesc,
    ) -> Option<ControllerHandle> {
        logged("create_controller", self.try_create_controller(joint, desc))
    }

    fn try_create_controller(
        &mut self,
        joint_handle: JointHandle,
        desc: &ControllerDesc,
    ) -> Result<ControllerHandle, PhysicsError> {
        desc.validate()?;
        let joint = self
            .joints
            .get_mut(joint_handle)
            .ok_or(PhysicsError::JointNotFound(joint_handle.index()))?;
        let controller = PhysicsController::new(
            desc,
            joint_handle,
            joint.child(),
            self.config.controller_input_space,
        );
        let handle = self.controllers.insert(controller);
        joint.add_controller(&desc.name, handle);
        debug!("Controller '{}' added to joint '{}'", desc.name, joint.name());
        Ok(handle)
    }

    pub fn destroy_controller(&mut self, handle: ControllerHandle) {
        let Some(controller) = self.controllers.remove(handle) else {
            warn!(
                "destroy_controller: {}",
                PhysicsError::ControllerNotFound(handle.index())
            );
            return;
        };
        if let Some(joint) = self.joints.get_mut(controller.joint()) {
            joint.remove_controller(handle);
        }
    }

    pub fn controller(&self, handle: ControllerHandle) -> Option<&PhysicsController> {
        self.controllers.get(handle)
    }

    pub fn controller_mut(&mut self, handle: ControllerHandle) -> Option<&mut PhysicsController> {
        self.controllers.get_mut(handle)
    }

    /// Activate exactly one named controller on a joint
    pub fn change_controller(&mut self, joint: JointHandle, name: &str) -> bool {
        match self.joints.get(joint) {
            Some(joint) => joint.change_controller(name, &mut self.controllers),
            None => {
                warn!("change_controller: {}", PhysicsError::JointNotFound(joint.index()));
                false
            }
        }
    }

    // --- Characters ---

    pub fn create_character(
        &mut self,
        name: &str,
        config: CharacterConfig,
        position: Vec3,
    ) -> Option<CharacterHandle> {
        logged(
            "create_character",
            self.try_create_character(name, config, position),
        )
    }

    fn try_create_character(
        &mut self,
        name: &str,
        config: CharacterConfig,
        position: Vec3,
    ) -> Result<CharacterHandle, PhysicsError> {
        config.validate()?;
        let shape = self.space.add_shape(character_shape(config.shape, config.size));
        let desc = BodyDesc::new(name, shape)
            .mass(config.mass)
            .position(position)
            .can_sleep(false)
            .gravity(false)
            .collide_character(config.collide_character);
        let body = match self.space.create_body(&desc, BodyKind::Kinematic) {
            Ok(body) => body,
            Err(e) => {
                self.space.release_shape(shape);
                return Err(e);
            }
        };

        let handle = self
            .characters
            .insert(CharacterBody::new(name, config, position, body, shape));
        if let Some(body) = self.space.body_mut(body) {
            body.set_character(Some(handle));
        }
        info!("Character '{}' created at {:?}", name, position);
        Ok(handle)
    }

    /// Destroy a character and all of its bodies
    pub fn destroy_character(&mut self, handle: CharacterHandle) {
        let Some(character) = self.characters.remove(handle) else {
            warn!(
                "destroy_character: {}",
                PhysicsError::CharacterNotFound(handle.index())
            );
            return;
        };
        for body in character.bodies() {
            self.remove_body_internal(body);
        }
        debug!("Character '{}' destroyed", character.name());
    }

    pub fn character(&self, handle: CharacterHandle) -> Option<&CharacterBody> {
        self.characters.get(handle)
    }

    /// Mutable access for movement input (`move_dir`, `set_velocity`, yaw/pitch, ...)
    pub fn character_mut(&mut self, handle: CharacterHandle) -> Option<&mut CharacterBody> {
        self.characters.get_mut(handle)
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    /// Teleport a character
    pub fn set_character_position(&mut self, handle: CharacterHandle, position: Vec3) {
        match self.characters.get_mut(handle) {
            Some(character) => character.set_position(&mut self.space, position),
            None => warn!(
                "set_character_position: {}",
                PhysicsError::CharacterNotFound(handle.index())
            ),
        }
    }

    /// Add an alternate collision volume (crouching, ...). Returns its index.
    pub fn add_character_extra_size(
        &mut self,
        handle: CharacterHandle,
        size: Vec3,
    ) -> Option<usize> {
        logged(
            "add_character_extra_size",
            self.try_add_extra_size(handle, size),
        )
    }

    fn try_add_extra_size(
        &mut self,
        handle: CharacterHandle,
        size: Vec3,
    ) -> Result<usize, PhysicsError> {
        let character = self
            .characters
            .get(handle)
            .ok_or(PhysicsError::CharacterNotFound(handle.index()))?;
        let mut config = character.config().clone();
        config.size = size;
        config.validate()?;

        let shape = self.space.add_shape(character_shape(config.shape, size));
        let position = character.feet_position() + Vec3::Y * size.y * 0.5;
        let name = format!("{}_size{}", character.name(), character.size_count());
        let desc = BodyDesc::new(&name, shape)
            .mass(config.mass)
            .position(position)
            .can_sleep(false)
            .gravity(false)
            .collide_character(config.collide_character);
        let body = match self.space.create_body(&desc, BodyKind::Kinematic) {
            Ok(body) => body,
            Err(e) => {
                self.space.release_shape(shape);
                return Err(e);
            }
        };
        self.space.set_body_collide(body, false);
        if let Some(body) = self.space.body_mut(body) {
            body.set_character(Some(handle));
        }

        let character = self
            .characters
            .get_mut(handle)
            .ok_or(PhysicsError::CharacterNotFound(handle.index()))?;
        Ok(character.add_size(body, shape, size))
    }

    /// Switch to another collision volume, keeping the feet in place
    pub fn set_character_active_size(&mut self, handle: CharacterHandle, index: usize) -> bool {
        match self.characters.get_mut(handle) {
            Some(character) => character.set_active_size(&mut self.space, index),
            None => {
                warn!(
                    "set_character_active_size: {}",
                    PhysicsError::CharacterNotFound(handle.index())
                );
                false
            }
        }
    }

    /// Whether a size would fit at the character's feet (stand-up check)
    pub fn character_fits_size(&mut self, handle: CharacterHandle, index: usize) -> bool {
        match self.characters.get(handle) {
            Some(character) => character.fits_size(&mut self.space, index),
            None => false,
        }
    }

    // --- Queries ---

    /// Test a shape at a pose against the world; see [`PhysicsSpace::check_shape_world_collision`]
    pub fn check_shape_world_collision(
        &mut self,
        shape: ShapeHandle,
        position: Vec3,
        rotation: Quat,
        filter: &SweepFilter,
        callback: Option<&mut dyn SweepCallback>,
    ) -> SweepResult {
        self.space
            .check_shape_world_collision(shape, position, rotation, filter, callback)
    }

    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &SweepFilter,
    ) -> Option<RayHit> {
        self.space.cast_ray(origin, direction, max_distance, filter)
    }

    /// Events produced since the last drain
    pub fn drain_events(&mut self) -> Vec<PhysicsEvent> {
        self.events.drain()
    }

    pub fn debug_contacts(&self) -> &DebugContacts {
        &self.space.debug
    }

    pub fn set_debug_contacts(&mut self, enabled: bool) {
        self.config.debug_contacts = enabled;
        self.space.debug.set_enabled(enabled);
    }

    // --- Step ---

    /// Advance the world by `dt` seconds
    pub fn update(&mut self, dt: f32) {
        if dt <= 0.0 {
            debug!("Ignoring physics update with dt {}", dt);
            return;
        }

        self.space.debug.clear();
        self.update_controllers(dt);
        self.update_characters(dt);
        self.update_screws();

        self.space.update_before_simulate(dt);
        self.space.simulate(dt);
        self.space.apply_contacts(self.sound_player.as_mut());

        self.update_joints();
        self.space.update_after_simulate(dt, self.sound_player.as_mut());
    }

    fn update_controllers(&mut self, dt: f32) {
        for handle in self.controllers.handles() {
            let Some(controller) = self.controllers.get(handle) else {
                continue;
            };
            if !controller.is_active() || controller.is_paused() {
                continue;
            }
            let (joint_handle, body) = (controller.joint(), controller.body());
            let Some(joint) = self.joints.get(joint_handle) else {
                continue;
            };
            let Some((parent_pose, child_pose)) = self.joint_poses(joint) else {
                continue;
            };

            let value = joint.measure(parent_pose, child_pose);
            let sample = ControllerSample {
                joint_angle: if joint.kind().is_linear() { 0.0 } else { value },
                joint_distance: if joint.kind().is_linear() { value } else { 0.0 },
                linear_velocity: self.space.linear_velocity(body).unwrap_or(Vec3::ZERO),
                angular_velocity: self.space.angular_velocity(body).unwrap_or(Vec3::ZERO),
                body_rotation: child_pose.1,
                body_mass: self.space.body_mass(body),
            };

            let Some(controller) = self.controllers.get_mut(handle) else {
                continue;
            };
            let step = controller.update(&sample, dt);
            match step.output {
                Some((ControllerOutput::Force, force)) => self.space.add_force(body, force),
                Some((ControllerOutput::Torque, torque)) => self.space.add_torque(body, torque),
                None => {}
            }
            if step.finished {
                if let Some(joint) = self.joints.get(joint_handle) {
                    joint.finish_controller(
                        joint_handle,
                        handle,
                        &mut self.controllers,
                        &mut self.events,
                    );
                }
            }
        }
    }

    fn update_characters(&mut self, dt: f32) {
        let gravity = self.space.gravity();
        for handle in self.characters.handles() {
            if let Some(character) = self.characters.get_mut(handle) {
                character.update(handle, &mut self.space, gravity, dt, &mut self.events);
            }
        }
    }

    /// Couple each screw's spin to its current travel speed along the pin
    fn update_screws(&mut self) {
        for handle in self.joints.handles() {
            let Some(joint) = self.joints.get(handle) else {
                continue;
            };
            if joint.kind() != JointKind::Screw {
                continue;
            }
            let Some((parent_pose, _)) = self.joint_poses(joint) else {
                continue;
            };
            let parent_linear = joint
                .parent()
                .and_then(|parent| self.space.linear_velocity(parent))
                .unwrap_or(Vec3::ZERO);
            let relative = self.space.linear_velocity(joint.child()).unwrap_or(Vec3::ZERO) - parent_linear;
            if let Some(spin) = joint.screw_spin(parent_pose.1, relative) {
                let backend = joint.backend;
                self.space.drive_joint_spin(backend, spin, SCREW_COUPLING);
            }
        }
    }

    /// Post-step joint pass: pivots, move sounds, limits, sticky limits, breakage
    fn update_joints(&mut self) {
        for handle in self.joints.handles() {
            let Some(joint) = self.joints.get(handle) else {
                continue;
            };
            let Some((parent_pose, child_pose)) = self.joint_poses(joint) else {
                continue;
            };
            let child = joint.child();
            let value = joint.measure(parent_pose, child_pose);
            let tolerance = if joint.kind().is_linear() {
                self.config.limit_distance_tolerance
            } else {
                self.config.limit_angle_tolerance
            };

            let (parent_linear, parent_angular) = match joint.parent() {
                Some(parent) => (
                    self.space.linear_velocity(parent).unwrap_or(Vec3::ZERO),
                    self.space.angular_velocity(parent).unwrap_or(Vec3::ZERO),
                ),
                None => (Vec3::ZERO, Vec3::ZERO),
            };
            let motion = JointMotion {
                child_position: child_pose.0,
                child_rotation: child_pose.1,
                linear_velocity: self.space.linear_velocity(child).unwrap_or(Vec3::ZERO)
                    - parent_linear,
                angular_velocity: self.space.angular_velocity(child).unwrap_or(Vec3::ZERO)
                    - parent_angular,
                child_enabled: self.space.is_body_enabled(child),
            };
            let force = self.space.joint_force(joint.backend);

            let Some(joint) = self.joints.get_mut(handle) else {
                continue;
            };
            joint.on_physics_update(&motion, self.sound_player.as_mut());

            let speed = motion.linear_velocity.length();
            let mut ctx = LimitContext {
                controllers: &mut self.controllers,
                events: &mut self.events,
                player: self.sound_player.as_mut(),
            };
            match joint.limit_side(value, tolerance) {
                Some(LimitSide::Max) => joint.on_max_limit(handle, speed, &mut ctx),
                Some(LimitSide::Min) => joint.on_min_limit(handle, speed, &mut ctx),
                None => joint.on_no_limit(),
            }

            let sticking = joint.is_sticking(value);
            let broken = joint.check_breakage(force, self.sound_player.as_mut());

            if broken {
                self.remove_joint(handle, true);
            } else if sticking {
                self.space.set_linear_velocity(child, Vec3::ZERO);
                self.space.set_angular_velocity(child, Vec3::ZERO);
            }
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}
