// Events produced during a world step, drained by the game after `PhysicsWorld::update`

use glam::Vec3;

use super::body::BodyHandle;
use super::character::CharacterHandle;
use super::controller::ControllerHandle;
use super::joint::JointHandle;

/// Which limit of a joint was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitSide {
    Min,
    Max,
}

/// Passed to a joint's limit handler on the has-collided edge
#[derive(Debug, Clone, PartialEq)]
pub struct LimitEvent {
    pub joint: JointHandle,
    pub joint_name: String,
    pub side: LimitSide,
    /// Relative speed of the child body when the limit was hit
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsEvent {
    /// A character landed after being airborne
    HitGround {
        character: CharacterHandle,
        /// Velocity right before the landing
        velocity: Vec3,
    },
    JointLimit(LimitEvent),
    /// Joint removed from the world after breaking
    JointBroken {
        joint: JointHandle,
        name: String,
        child: BodyHandle,
        parent: Option<BodyHandle>,
    },
    /// Controller reached its end condition and deactivated
    ControllerFinished {
        controller: ControllerHandle,
        joint: JointHandle,
        name: String,
        /// Successor activated in the same step, if it resolved
        next: Option<ControllerHandle>,
    },
}

/// FIFO of step events
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: Vec<PhysicsEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: PhysicsEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<PhysicsEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
