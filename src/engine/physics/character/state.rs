// Character locomotion state

use glam::Vec3;

use crate::engine::physics::body::BodyHandle;

/// Movement directions relative to the character's yaw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveDirection {
    Forward,
    Right,
}

impl MoveDirection {
    pub const ALL: [MoveDirection; 2] = [MoveDirection::Forward, MoveDirection::Right];

    pub fn index(self) -> usize {
        match self {
            MoveDirection::Forward => 0,
            MoveDirection::Right => 1,
        }
    }
}

/// Whether the character stands on something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GroundState {
    /// Initial state until the first ground check
    #[default]
    Airborne,
    Grounded,
}

impl GroundState {
    pub fn is_grounded(&self) -> bool {
        matches!(self, Self::Grounded)
    }

    pub fn is_airborne(&self) -> bool {
        matches!(self, Self::Airborne)
    }
}

/// Body the character rides on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    pub body: BodyHandle,
    /// Body position when the delta was last taken
    pub last_position: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_airborne() {
        let state = GroundState::default();
        assert!(state.is_airborne());
        assert!(!state.is_grounded());
    }

    #[test]
    fn test_direction_indices_are_distinct() {
        assert_ne!(MoveDirection::Forward.index(), MoveDirection::Right.index());
        assert_eq!(MoveDirection::ALL.len(), 2);
    }
}
