// Character locomotion: direct position integration corrected by world sweeps

mod config;
mod output;
mod state;

pub use config::{CharacterConfig, CharacterShape, DirectionConfig};
pub use output::SmoothedOutput;
pub use state::{Attachment, GroundState, MoveDirection};

use glam::{Mat3, Quat, Vec3};
use log::debug;

use super::body::BodyHandle;
use super::collision::{ContactPoint, SweepCallback};
use super::events::{EventQueue, PhysicsEvent};
use super::handle::Handle;
use super::shape::ShapeHandle;
use super::space::{PhysicsSpace, SweepFilter};
use super::PhysicsError;
use crate::core::math::{decay_towards_zero, movement_basis};

/// Handle to a character owned by the physics world
pub type CharacterHandle = Handle<CharacterBody>;

/// Push smaller than this does not count as being blocked
const BLOCK_EPSILON: f32 = 1e-4;

/// Steps lower than this are treated as flat ground
const MIN_STEP_HEIGHT: f32 = 1e-3;

/// How far past the character's side the climb rays are cast
const CLIMB_RAY_REACH: f32 = 0.05;

const CLIMB_RAY_EPSILON: f32 = 0.01;

/// Extra height used when checking the stepped-up position is free
const CLIMB_CLEARANCE: f32 = 0.01;

/// Penetration tolerated by fit checks
const FIT_EPSILON: f32 = 1e-3;

/// Contacts whose push points up at least this much can carry the character
const ATTACH_NORMAL_Y: f32 = 0.5;

/// Bounds growth used when waking bodies around a moving character
const WAKE_MARGIN: f32 = 1.1;

/// Observer of character events
pub trait CharacterCallback {
    /// The character landed. `velocity` is the velocity before the landing.
    fn on_hit_ground(&mut self, _character: CharacterHandle, _velocity: Vec3) {}

    /// A contact was found while resolving vertical motion
    fn on_gravity_collide(
        &mut self,
        _character: CharacterHandle,
        _body: BodyHandle,
        _contact: &ContactPoint,
    ) {
    }
}

/// One collision volume of a character (standing, crouching, ...)
#[derive(Debug, Clone, Copy)]
struct SizeBody {
    body: BodyHandle,
    shape: ShapeHandle,
    size: Vec3,
}

pub struct CharacterBody {
    name: String,
    config: CharacterConfig,

    sizes: Vec<SizeBody>,
    active_size: usize,

    /// Authoritative position (body center)
    position: Vec3,
    last_position: Vec3,

    yaw: f32,
    pitch: f32,
    move_basis: Mat3,

    move_speed: [f32; 2],
    driven: [bool; 2],

    force: Vec3,
    velocity: Vec3,

    ground: GroundState,
    climbing: bool,
    attachment: Option<Attachment>,

    camera: Option<SmoothedOutput>,
    entity: Option<SmoothedOutput>,

    callbacks: Vec<Box<dyn CharacterCallback>>,
}

impl CharacterBody {
    pub(crate) fn new(
        name: &str,
        config: CharacterConfig,
        position: Vec3,
        body: BodyHandle,
        shape: ShapeHandle,
    ) -> Self {
        let size = config.size;
        Self {
            name: name.to_string(),
            config,
            sizes: vec![SizeBody { body, shape, size }],
            active_size: 0,
            position,
            last_position: position,
            yaw: 0.0,
            pitch: 0.0,
            move_basis: Mat3::IDENTITY,
            move_speed: [0.0; 2],
            driven: [false; 2],
            force: Vec3::ZERO,
            velocity: Vec3::ZERO,
            ground: GroundState::Airborne,
            climbing: false,
            attachment: None,
            camera: None,
            entity: None,
            callbacks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    /// Replace the tuning. The collision volume is built at creation, so a
    /// config changing shape, size or mass is refused along with invalid ones.
    pub fn set_config(&mut self, config: CharacterConfig) -> Result<(), PhysicsError> {
        config.validate()?;
        if config.shape != self.config.shape
            || config.size != self.config.size
            || config.mass != self.config.mass
        {
            return Err(PhysicsError::InvalidConfig(format!(
                "character '{}' cannot change shape, size or mass after creation",
                self.name
            )));
        }
        self.config = config;
        Ok(())
    }

    /// Body currently used for collision
    pub fn body(&self) -> BodyHandle {
        self.sizes[self.active_size].body
    }

    pub fn bodies(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.sizes.iter().map(|s| s.body)
    }

    fn shape(&self) -> ShapeHandle {
        self.sizes[self.active_size].shape
    }

    pub fn size(&self) -> Vec3 {
        self.sizes[self.active_size].size
    }

    pub fn active_size(&self) -> usize {
        self.active_size
    }

    pub fn size_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn feet_position(&self) -> Vec3 {
        self.position - Vec3::Y * self.size().y * 0.5
    }

    // --- Position & velocity ---

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn last_position(&self) -> Vec3 {
        self.last_position
    }

    /// Teleport; smoothing windows restart at the new position
    pub(crate) fn set_position(&mut self, space: &mut PhysicsSpace, position: Vec3) {
        self.position = position;
        self.last_position = position;
        self.attachment = None;
        if let Some(camera) = self.camera.as_mut() {
            camera.reset(position);
        }
        if let Some(entity) = self.entity.as_mut() {
            entity.reset(position);
        }
        self.sync_bodies(space);
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Overwrite the velocity (jumps, knockback)
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    pub fn force(&self) -> Vec3 {
        self.force
    }

    /// Accumulate a force for the next step
    pub fn add_force(&mut self, force: Vec3) {
        self.force += force;
    }

    pub fn set_force(&mut self, force: Vec3) {
        self.force = force;
    }

    // --- Movement input ---

    /// Accelerate along a direction; `mul` scales the acceleration (negative moves backwards)
    pub fn move_dir(&mut self, dir: MoveDirection, mul: f32, dt: f32) {
        let cfg = *self.config.direction_config(dir);
        let i = dir.index();
        let speed = self.move_speed[i] + cfg.acceleration * mul * dt;
        self.move_speed[i] = speed.max(-cfg.max_negative_speed).min(cfg.max_positive_speed);
        self.driven[i] = true;
    }

    pub fn move_speed(&self, dir: MoveDirection) -> f32 {
        self.move_speed[dir.index()]
    }

    pub fn set_move_speed(&mut self, dir: MoveDirection, speed: f32) {
        self.move_speed[dir.index()] = speed;
    }

    /// Zero move speeds and horizontal velocity
    pub fn stop_movement(&mut self) {
        self.move_speed = [0.0; 2];
        self.velocity.x = 0.0;
        self.velocity.z = 0.0;
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn add_yaw(&mut self, amount: f32) {
        self.set_yaw(self.yaw + amount);
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.yaw = yaw;
    }

    pub fn add_pitch(&mut self, amount: f32) {
        self.set_pitch(self.pitch + amount);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.max(self.config.min_pitch).min(self.config.max_pitch);
    }

    /// Movement basis from the last update (right, up, forward columns)
    pub fn move_basis(&self) -> Mat3 {
        self.move_basis
    }

    // --- State ---

    pub fn ground_state(&self) -> GroundState {
        self.ground
    }

    pub fn is_on_ground(&self) -> bool {
        self.ground.is_grounded()
    }

    /// Whether the last update raised the character onto a step
    pub fn is_climbing(&self) -> bool {
        self.climbing
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn attached_body(&self) -> Option<BodyHandle> {
        self.attachment.map(|a| a.body)
    }

    // --- Outputs ---

    /// Bind a camera output; `window` samples are averaged
    pub fn set_camera_output(&mut self, offset: Vec3, window: usize) {
        let mut output = SmoothedOutput::new(offset, window);
        output.reset(self.position);
        self.camera = Some(output);
    }

    pub fn set_entity_output(&mut self, offset: Vec3, window: usize) {
        let mut output = SmoothedOutput::new(offset, window);
        output.reset(self.position);
        self.entity = Some(output);
    }

    pub fn camera_position(&self) -> Option<Vec3> {
        self.camera.as_ref().map(|c| c.value())
    }

    /// Camera orientation from yaw and pitch
    pub fn camera_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    pub fn entity_position(&self) -> Option<Vec3> {
        self.entity.as_ref().map(|e| e.value())
    }

    /// Entity orientation (yaw only)
    pub fn entity_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw)
    }

    pub fn add_callback(&mut self, callback: Box<dyn CharacterCallback>) {
        self.callbacks.push(callback);
    }

    // --- Sizes ---

    pub(crate) fn add_size(&mut self, body: BodyHandle, shape: ShapeHandle, size: Vec3) -> usize {
        self.sizes.push(SizeBody { body, shape, size });
        self.sizes.len() - 1
    }

    /// Center position for a size index with the feet kept where they are
    fn position_for_size(&self, index: usize) -> Vec3 {
        let feet = self.feet_position();
        feet + Vec3::Y * self.sizes[index].size.y * 0.5
    }

    /// Whether the given size fits at the current feet position
    pub(crate) fn fits_size(&self, space: &mut PhysicsSpace, index: usize) -> bool {
        let Some(size) = self.sizes.get(index) else {
            return false;
        };
        let position = self.position_for_size(index);
        self.shape_fits(space, size.shape, position)
    }

    /// Switch the collision volume, keeping the feet in place
    pub(crate) fn set_active_size(&mut self, space: &mut PhysicsSpace, index: usize) -> bool {
        if index >= self.sizes.len() {
            return false;
        }
        if index == self.active_size {
            return true;
        }
        let position = self.position_for_size(index);
        space.set_body_collide(self.body(), false);
        self.active_size = index;
        space.set_body_collide(self.body(), true);
        self.position = position;
        self.last_position = position;
        self.sync_bodies(space);
        debug!("Character '{}' switched to size {}", self.name, index);
        true
    }

    // --- Step ---

    fn filter(&self) -> SweepFilter {
        SweepFilter {
            skip_body: Some(self.body()),
            skip_static: false,
            is_character: true,
            collide_character: self.config.collide_character,
        }
    }

    fn shape_fits(&self, space: &mut PhysicsSpace, shape: ShapeHandle, position: Vec3) -> bool {
        let result =
            space.check_shape_world_collision(shape, position, Quat::IDENTITY, &self.filter(), None);
        result.contacts.iter().all(|(_, c)| c.depth <= FIT_EPSILON)
    }

    /// Move every size body so the feet line up with the logical position
    fn sync_bodies(&self, space: &mut PhysicsSpace) {
        let feet = self.feet_position();
        for (i, size) in self.sizes.iter().enumerate() {
            let center = if i == self.active_size {
                self.position
            } else {
                feet + Vec3::Y * size.size.y * 0.5
            };
            space.set_body_position(size.body, center);
        }
    }

    fn wake_around(&self, space: &mut PhysicsSpace) {
        let Some((min, max)) = space.body_aabb(self.body()) else {
            return;
        };
        let center = (min + max) * 0.5;
        let half = (max - min) * 0.5 * WAKE_MARGIN;
        space.wake_bodies_in_box(center - half, center + half, Some(self.body()));
    }

    fn wake_head_slab(&self, space: &mut PhysicsSpace) {
        let size = self.size();
        let top = self.position.y + size.y * 0.5;
        let reach = Vec3::new(size.x, 0.0, size.z.max(size.x));
        let min = Vec3::new(self.position.x, top - 0.1, self.position.z) - reach;
        let max = Vec3::new(self.position.x, top + 0.5, self.position.z) + reach;
        space.wake_bodies_in_box(min, max, Some(self.body()));
    }

    /// Horizontal displacement requested by the move speeds this step
    fn desired_displacement(&self, dt: f32) -> Vec3 {
        let mut right = self.move_basis.x_axis;
        let mut forward = -self.move_basis.z_axis;
        if self.config.gravity_active {
            right = Vec3::new(right.x, 0.0, right.z).normalize_or_zero();
            forward = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
        }
        let displacement = (forward * self.move_speed[MoveDirection::Forward.index()]
            + right * self.move_speed[MoveDirection::Right.index()])
            * dt;
        displacement.clamp_length_max(self.config.max_move_per_step)
    }

    /// Push light dynamic bodies the character walks into
    fn push_bodies(&self, space: &mut PhysicsSpace, contacts: &[(BodyHandle, ContactPoint)]) {
        if self.config.max_push_mass <= 0.0 || self.config.push_force <= 0.0 {
            return;
        }
        let mut pushed: Vec<BodyHandle> = Vec::new();
        for (handle, contact) in contacts {
            if pushed.contains(handle) {
                continue;
            }
            let Some(body) = space.body(*handle) else {
                continue;
            };
            if body.is_static() || body.is_character() || body.mass() > self.config.max_push_mass {
                continue;
            }
            let dir = Vec3::new(-contact.normal.x, 0.0, -contact.normal.z).normalize_or_zero();
            if dir == Vec3::ZERO {
                continue;
            }
            space.add_force(*handle, dir * self.config.push_force);
            pushed.push(*handle);
        }
    }

    /// Height of a climbable step ahead, first matching ray wins
    fn find_step(&self, space: &PhysicsSpace, start: Vec3, desired: Vec3) -> Option<f32> {
        let dir = Vec3::new(desired.x, 0.0, desired.z).normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }

        let size = self.size();
        let half_height = size.y * 0.5;
        let reach = (size.x * 0.5 + CLIMB_RAY_REACH) * self.config.climb_forward_mul;
        let feet = start.y - half_height;

        let mut dirs = vec![dir];
        if self.config.accurate_climbing {
            let quarter = std::f32::consts::FRAC_PI_4;
            dirs.push(Quat::from_rotation_y(quarter) * dir);
            dirs.push(Quat::from_rotation_y(-quarter) * dir);
        }

        let filter = self.filter();
        for ray_dir in dirs {
            let origin = start + ray_dir * reach + Vec3::Y * CLIMB_RAY_EPSILON;
            let Some(hit) =
                space.cast_ray(origin, Vec3::NEG_Y, half_height + CLIMB_RAY_EPSILON, &filter)
            else {
                continue;
            };
            let step = hit.point.y - feet;
            if step > MIN_STEP_HEIGHT && step <= self.config.max_step_height {
                return Some(step);
            }
        }
        None
    }

    /// Velocity component recomputed from what the sweep allowed: it may only
    /// shrink and is zeroed when the achieved motion reverses it
    fn limit_to_achieved(requested: f32, achieved: f32) -> f32 {
        if requested == 0.0 || achieved == 0.0 || requested.signum() != achieved.signum() {
            0.0
        } else if achieved.abs() < requested.abs() {
            achieved
        } else {
            requested
        }
    }

    /// Advance the character one step
    pub(crate) fn update(
        &mut self,
        handle: CharacterHandle,
        space: &mut PhysicsSpace,
        world_gravity: Vec3,
        dt: f32,
        events: &mut EventQueue,
    ) {
        if dt <= 0.0 {
            return;
        }

        // Attachment is rebuilt from this step's vertical contacts
        let previous_attachment = self.attachment.take();
        let mut attach_candidates: Vec<BodyHandle> = Vec::new();
        self.climbing = false;

        self.move_basis = movement_basis(self.yaw, self.pitch);

        let friction = if self.ground.is_grounded() {
            self.config.ground_friction
        } else {
            self.config.air_friction
        } * dt;
        self.velocity.x = decay_towards_zero(self.velocity.x, friction);
        self.velocity.z = decay_towards_zero(self.velocity.z, friction);

        self.last_position = self.position;
        self.sync_bodies(space);

        let moving = self.move_speed.iter().any(|s| *s != 0.0) || self.velocity != Vec3::ZERO;
        if moving {
            self.wake_around(space);
        }

        for dir in MoveDirection::ALL {
            let i = dir.index();
            if !self.driven[i] {
                let decel = self.config.direction_config(dir).deceleration;
                self.move_speed[i] = decay_towards_zero(self.move_speed[i], decel * dt);
            }
            self.driven[i] = false;
        }

        let desired = self.desired_displacement(dt);
        let shape = self.shape();
        let filter = self.filter();

        // Move speed displacement and step climbing
        if self.config.test_collision {
            let start = self.position;
            let tentative = start + desired;
            let result =
                space.check_shape_world_collision(shape, tentative, Quat::IDENTITY, &filter, None);
            self.push_bodies(space, &result.contacts);

            let mut blocked = result.push.x.abs() > BLOCK_EPSILON || result.push.z.abs() > BLOCK_EPSILON;
            if !self.config.gravity_active {
                blocked |= result.push.y.abs() > BLOCK_EPSILON;
            }
            self.position = result.position;

            if blocked && self.config.max_step_height > 0.0 {
                if let Some(step) = self.find_step(space, start, desired) {
                    let lift = step + self.config.climb_height_add;
                    let raised = tentative + Vec3::Y * (lift + CLIMB_CLEARANCE);
                    if self.shape_fits(space, shape, raised) {
                        self.position.y += (self.config.climb_speed * dt).min(lift);
                        self.climbing = true;
                    }
                }
            }
        } else {
            self.position += desired;
        }

        if !self.config.gravity_active {
            self.finish_step(space);
            return;
        }

        // Forces and gravity
        if self.climbing {
            self.velocity.y = 0.0;
        } else {
            let gravity = self.config.custom_gravity.unwrap_or(world_gravity);
            self.velocity += (self.force / self.config.mass + gravity) * dt;
            self.velocity = self.velocity.clamp_length_max(self.config.max_gravity_speed);
        }
        self.force = Vec3::ZERO;

        // Horizontal velocity
        let horizontal = Vec3::new(self.velocity.x, 0.0, self.velocity.z) * dt;
        if horizontal != Vec3::ZERO {
            let from = self.position;
            if self.config.test_collision {
                let result = space.check_shape_world_collision(
                    shape,
                    from + horizontal,
                    Quat::IDENTITY,
                    &filter,
                    None,
                );
                self.push_bodies(space, &result.contacts);
                self.position = result.position;
            } else {
                self.position += horizontal;
            }
            let achieved = (self.position - from) / dt;
            self.velocity.x = Self::limit_to_achieved(self.velocity.x, achieved.x);
            self.velocity.z = Self::limit_to_achieved(self.velocity.z, achieved.z);
        }

        // Vertical velocity
        let old_velocity = self.velocity;
        let from = self.position;
        let mut pushed_up = false;
        if self.config.test_collision {
            let mut on_contact = |body: BodyHandle, contact: &ContactPoint| {
                if contact.normal.y > ATTACH_NORMAL_Y && !attach_candidates.contains(&body) {
                    attach_candidates.push(body);
                }
            };
            let result = space.check_shape_world_collision(
                shape,
                from + Vec3::Y * self.velocity.y * dt,
                Quat::IDENTITY,
                &filter,
                Some(&mut on_contact as &mut dyn SweepCallback),
            );

            for (body, contact) in &result.contacts {
                for callback in self.callbacks.iter_mut() {
                    callback.on_gravity_collide(handle, *body, contact);
                }
            }

            let mut resolved = result.position;
            let sticking = result.collided
                && old_velocity.y <= 0.0
                && -old_velocity.y < self.config.stick_speed;
            if sticking {
                resolved.x = from.x;
                resolved.z = from.z;
            }
            self.position = resolved;
            pushed_up = result.collided && result.push.y > 0.0;
        } else {
            self.position.y += self.velocity.y * dt;
        }
        let achieved_y = (self.position.y - from.y) / dt;
        self.velocity.y = Self::limit_to_achieved(old_velocity.y, achieved_y);

        // Ground state
        if !self.climbing {
            let grounded = pushed_up && old_velocity.y <= 0.0;
            if grounded && self.ground.is_airborne() {
                debug!("Character '{}' hit ground at {:?}", self.name, old_velocity);
                events.push(PhysicsEvent::HitGround {
                    character: handle,
                    velocity: old_velocity,
                });
                for callback in self.callbacks.iter_mut() {
                    callback.on_hit_ground(handle, old_velocity);
                }
            }
            self.ground = if grounded {
                GroundState::Grounded
            } else {
                GroundState::Airborne
            };
        }

        self.update_outputs();

        // Ride along with the supporting body
        let support = attach_candidates
            .into_iter()
            .find(|b| space.body(*b).is_some_and(|body| !body.is_static()));
        self.attachment = support.and_then(|body| {
            let now = space.body_position(body)?;
            match previous_attachment {
                Some(prev) if prev.body == body => {
                    self.position += now - prev.last_position;
                }
                _ => debug!("Character '{}' attached to {:?}", self.name, body),
            }
            Some(Attachment {
                body,
                last_position: now,
            })
        });

        if self.config.wake_head_slab {
            self.wake_head_slab(space);
        }

        self.sync_bodies(space);
    }

    fn update_outputs(&mut self) {
        if let Some(camera) = self.camera.as_mut() {
            camera.record(self.position);
        }
        if let Some(entity) = self.entity.as_mut() {
            entity.record(self.position);
        }
    }

    /// Early exit path for characters without gravity
    fn finish_step(&mut self, space: &mut PhysicsSpace) {
        self.force = Vec3::ZERO;
        self.update_outputs();
        if self.config.wake_head_slab {
            self.wake_head_slab(space);
        }
        self.sync_bodies(space);
    }
}

impl std::fmt::Debug for CharacterBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterBody")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("velocity", &self.velocity)
            .field("ground", &self.ground)
            .field("climbing", &self.climbing)
            .field("attachment", &self.attachment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn detached(config: CharacterConfig) -> CharacterBody {
        CharacterBody::new("player", config, Vec3::ZERO, Handle::new(0, 0), Handle::new(0, 0))
    }

    #[test]
    fn test_move_dir_respects_caps() {
        let mut character = detached(CharacterConfig::default());
        for _ in 0..120 {
            character.move_dir(MoveDirection::Forward, 1.0, 1.0 / 60.0);
        }
        assert_relative_eq!(character.move_speed(MoveDirection::Forward), 3.0);

        for _ in 0..240 {
            character.move_dir(MoveDirection::Forward, -1.0, 1.0 / 60.0);
        }
        assert_relative_eq!(character.move_speed(MoveDirection::Forward), -2.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let config = CharacterConfig {
            min_pitch: -0.5,
            max_pitch: 0.5,
            ..CharacterConfig::default()
        };
        let mut character = detached(config);
        character.add_pitch(2.0);
        assert_eq!(character.pitch(), 0.5);
        character.add_pitch(-5.0);
        assert_eq!(character.pitch(), -0.5);
    }

    #[test]
    fn test_set_config_refuses_invalid_tuning() {
        let mut character = detached(CharacterConfig::default());
        let inverted = CharacterConfig {
            min_pitch: 0.5,
            max_pitch: -0.5,
            ..CharacterConfig::default()
        };
        assert!(matches!(
            character.set_config(inverted),
            Err(PhysicsError::InvalidConfig(_))
        ));
        let resized = CharacterConfig::default().shape(CharacterShape::Box, Vec3::ONE);
        assert!(character.set_config(resized).is_err());
        assert_eq!(character.config(), &CharacterConfig::default());

        // Pitch and speeds still clamp against the kept config
        character.add_pitch(10.0);
        assert!(character.pitch() <= CharacterConfig::default().max_pitch);

        let slow = CharacterConfig::default().direction(
            MoveDirection::Forward,
            DirectionConfig {
                max_positive_speed: 1.0,
                ..DirectionConfig::default()
            },
        );
        assert!(character.set_config(slow).is_ok());
        for _ in 0..60 {
            character.move_dir(MoveDirection::Forward, 1.0, 1.0 / 60.0);
        }
        assert_relative_eq!(character.move_speed(MoveDirection::Forward), 1.0);
    }

    #[test]
    fn test_limit_to_achieved() {
        assert_eq!(CharacterBody::limit_to_achieved(2.0, 1.0), 1.0);
        assert_eq!(CharacterBody::limit_to_achieved(2.0, 3.0), 2.0);
        assert_eq!(CharacterBody::limit_to_achieved(-2.0, 0.5), 0.0);
        assert_eq!(CharacterBody::limit_to_achieved(0.0, 0.5), 0.0);
    }

    #[test]
    fn test_desired_displacement_is_clamped() {
        let config = CharacterConfig {
            max_move_per_step: 0.01,
            ..CharacterConfig::default()
        };
        let mut character = detached(config);
        character.set_move_speed(MoveDirection::Forward, 10.0);
        let d = character.desired_displacement(1.0);
        assert_relative_eq!(d.length(), 0.01, epsilon = 1e-6);
        // Forward is -Z at zero yaw
        assert!(d.z < 0.0);
    }

    #[test]
    fn test_stop_movement_keeps_vertical_velocity() {
        let mut character = detached(CharacterConfig::default());
        character.set_move_speed(MoveDirection::Right, 1.0);
        character.set_velocity(Vec3::new(1.0, 4.0, -1.0));
        character.stop_movement();
        assert_eq!(character.move_speed(MoveDirection::Right), 0.0);
        assert_eq!(character.velocity(), Vec3::new(0.0, 4.0, 0.0));
    }
}
