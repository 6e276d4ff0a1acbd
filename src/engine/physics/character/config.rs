// Character tuning: every locomotion constant a character is created with

use glam::Vec3;

use crate::engine::physics::PhysicsError;

use super::state::MoveDirection;

/// Collision volume used for a character body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharacterShape {
    Box,
    #[default]
    Cylinder,
    Capsule,
}

/// Per-direction speed limits and rates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionConfig {
    /// Cap when moving along the direction (m/s)
    pub max_positive_speed: f32,
    /// Cap when moving against the direction (m/s, positive number)
    pub max_negative_speed: f32,
    /// Speed gained per second while driven
    pub acceleration: f32,
    /// Speed lost per second while not driven
    pub deceleration: f32,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            max_positive_speed: 3.0,
            max_negative_speed: 2.0,
            acceleration: 6.0,
            deceleration: 8.0,
        }
    }
}

/// Character configuration.
///
/// Sizes are full extents: `size.x` is the width (diameter for round shapes),
/// `size.y` the height.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterConfig {
    pub shape: CharacterShape,
    pub size: Vec3,
    pub mass: f32,

    // Movement
    pub forward: DirectionConfig,
    pub right: DirectionConfig,
    /// Longest horizontal displacement allowed in one step
    pub max_move_per_step: f32,
    /// Horizontal velocity damping (m/s²) while grounded
    pub ground_friction: f32,
    /// Horizontal velocity damping (m/s²) while airborne
    pub air_friction: f32,

    // Gravity
    pub gravity_active: bool,
    /// Replaces world gravity when set
    pub custom_gravity: Option<Vec3>,
    pub max_gravity_speed: f32,
    /// Downward speed under which slope contacts do not slide the character
    pub stick_speed: f32,

    // Collision
    pub test_collision: bool,
    pub collide_character: bool,

    // Step climbing
    pub max_step_height: f32,
    /// Vertical climb speed (m/s)
    pub climb_speed: f32,
    /// Cast two extra rays at ±45° when looking for a step
    pub accurate_climbing: bool,
    /// Scales how far ahead of the body the step rays are cast
    pub climb_forward_mul: f32,
    /// Lift added on top of a detected step
    pub climb_height_add: f32,

    // Pushing
    /// Dynamic bodies at or below this mass are pushed
    pub max_push_mass: f32,
    pub push_force: f32,

    // View
    pub min_pitch: f32,
    pub max_pitch: f32,

    /// Wake sleeping bodies in a slab around the head every step
    pub wake_head_slab: bool,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            shape: CharacterShape::Cylinder,
            size: Vec3::new(0.6, 1.8, 0.6),
            mass: 60.0,
            forward: DirectionConfig::default(),
            right: DirectionConfig::default(),
            max_move_per_step: 0.3,
            ground_friction: 20.0,
            air_friction: 0.5,
            gravity_active: true,
            custom_gravity: None,
            max_gravity_speed: 30.0,
            stick_speed: 1.0,
            test_collision: true,
            collide_character: true,
            max_step_height: 0.3,
            climb_speed: 1.0,
            accurate_climbing: false,
            climb_forward_mul: 1.0,
            climb_height_add: 0.0,
            max_push_mass: 10.0,
            push_force: 50.0,
            min_pitch: -std::f32::consts::FRAC_PI_2 * 0.95,
            max_pitch: std::f32::consts::FRAC_PI_2 * 0.95,
            wake_head_slab: false,
        }
    }
}

impl CharacterConfig {
    pub fn shape(mut self, shape: CharacterShape, size: Vec3) -> Self {
        self.shape = shape;
        self.size = size;
        self
    }

    pub fn mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn direction(mut self, dir: MoveDirection, config: DirectionConfig) -> Self {
        *self.direction_mut(dir) = config;
        self
    }

    pub fn gravity(mut self, active: bool) -> Self {
        self.gravity_active = active;
        self
    }

    pub fn custom_gravity(mut self, gravity: Vec3) -> Self {
        self.custom_gravity = Some(gravity);
        self
    }

    pub fn step_climbing(mut self, max_height: f32, climb_speed: f32, accurate: bool) -> Self {
        self.max_step_height = max_height;
        self.climb_speed = climb_speed;
        self.accurate_climbing = accurate;
        self
    }

    pub fn climb_tuning(mut self, forward_mul: f32, height_add: f32) -> Self {
        self.climb_forward_mul = forward_mul;
        self.climb_height_add = height_add;
        self
    }

    pub fn push(mut self, max_mass: f32, force: f32) -> Self {
        self.max_push_mass = max_mass;
        self.push_force = force;
        self
    }

    pub fn test_collision(mut self, test: bool) -> Self {
        self.test_collision = test;
        self
    }

    pub fn direction_config(&self, dir: MoveDirection) -> &DirectionConfig {
        match dir {
            MoveDirection::Forward => &self.forward,
            MoveDirection::Right => &self.right,
        }
    }

    pub fn direction_mut(&mut self, dir: MoveDirection) -> &mut DirectionConfig {
        match dir {
            MoveDirection::Forward => &mut self.forward,
            MoveDirection::Right => &mut self.right,
        }
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.size.x <= 0.0 || self.size.y <= 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "character size must be positive".to_string(),
            ));
        }
        if self.shape == CharacterShape::Capsule && self.size.y < self.size.x {
            return Err(PhysicsError::InvalidConfig(
                "capsule character must be at least as tall as it is wide".to_string(),
            ));
        }
        if self.mass <= 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "character mass must be positive".to_string(),
            ));
        }
        if self.min_pitch > self.max_pitch {
            return Err(PhysicsError::InvalidConfig(
                "character min pitch is above max pitch".to_string(),
            ));
        }
        for dir in [&self.forward, &self.right] {
            if dir.max_positive_speed < 0.0 || dir.max_negative_speed < 0.0 {
                return Err(PhysicsError::InvalidConfig(
                    "character speed caps must not be negative".to_string(),
                ));
            }
        }
        if self.max_step_height < 0.0 || self.climb_speed < 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "character step climbing values must not be negative".to_string(),
            ));
        }
        if self.climb_forward_mul <= 0.0 || self.climb_height_add < 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "character climb reach must be positive and the lift not negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CharacterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_flat_capsule() {
        let config = CharacterConfig::default()
            .shape(CharacterShape::Capsule, Vec3::new(1.0, 0.5, 1.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_climb_tuning() {
        assert!(CharacterConfig::default().climb_tuning(1.75, 0.02).validate().is_ok());
        assert!(CharacterConfig::default().climb_tuning(0.0, 0.02).validate().is_err());
        assert!(CharacterConfig::default().climb_tuning(1.0, -0.1).validate().is_err());
    }

    #[test]
    fn test_direction_lookup() {
        let fast = DirectionConfig {
            max_positive_speed: 9.0,
            ..DirectionConfig::default()
        };
        let config = CharacterConfig::default().direction(MoveDirection::Right, fast);
        assert_eq!(config.direction_config(MoveDirection::Right).max_positive_speed, 9.0);
        assert_eq!(config.direction_config(MoveDirection::Forward).max_positive_speed, 3.0);
    }
}
