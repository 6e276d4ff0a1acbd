use glam::Vec3;
use rapier3d::prelude::*;
use std::collections::HashSet;

use super::body::BodyHandle;

/// Collision groups for filtering what objects can collide with each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionGroups {
    /// Dynamic and kinematic props - interacts with everything
    Default = 0b0000_0001,

    /// Static level geometry
    Static = 0b0000_0010,

    /// Character bodies
    Character = 0b0000_0100,
}

impl CollisionGroups {
    /// Convert to rapier's InteractionGroups
    ///
    /// `collide_character == false` keeps the body out of character contacts.
    pub fn to_interaction_groups(self, collide_character: bool) -> InteractionGroups {
        let memberships = Group::from_bits_truncate(self as u32);

        let mut filter = match self {
            // Static geometry never needs static-vs-static contacts
            CollisionGroups::Static => Group::from_bits_truncate(
                CollisionGroups::Default as u32 | CollisionGroups::Character as u32,
            ),
            CollisionGroups::Default | CollisionGroups::Character => Group::ALL,
        };

        if !collide_character {
            filter.remove(Group::from_bits_truncate(CollisionGroups::Character as u32));
        }

        InteractionGroups::new(memberships, filter)
    }

    /// Groups for a body that has collision switched off entirely
    pub fn disabled() -> InteractionGroups {
        InteractionGroups::none()
    }
}

/// One contact found by a world query.
///
/// `normal` points away from the other body, so `normal * depth` is the
/// translation that separates the query shape from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
}

impl ContactPoint {
    pub fn push(&self) -> Vec3 {
        self.normal * self.depth
    }
}

/// Fold contact pushes into one translation, keeping per axis the
/// largest-magnitude component seen. Components are not summed, so two
/// contacts pushing along the same axis do not double the correction.
pub fn fold_push<'a>(contacts: impl IntoIterator<Item = &'a ContactPoint>) -> Vec3 {
    let mut push = Vec3::ZERO;
    for contact in contacts {
        let p = contact.push();
        for axis in 0..3 {
            if p[axis].abs() > push[axis].abs() {
                push[axis] = p[axis];
            }
        }
    }
    push
}

/// Resolved contact between two bodies, reported after the backend step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollideData {
    /// World-space contact points
    pub points: Vec<Vec3>,
    /// Contact normal pointing from the first body towards the second
    pub normal: Vec3,
    /// Relative speed along the normal
    pub impact_speed: f32,
    /// Relative speed along the contact plane
    pub slide_speed: f32,
}

/// Observer of a body's contacts, registered with `PhysicsWorld::add_body_callback`
pub trait BodyCallback {
    /// Called every step while the two bodies' bounds overlap or are about to.
    /// Returning false drops contact resolution for the pair this step.
    fn on_begin_collision(&mut self, _body: BodyHandle, _other: BodyHandle) -> bool {
        true
    }

    /// Called after the backend resolved a contact involving `body`
    fn on_collide(&mut self, _body: BodyHandle, _other: BodyHandle, _data: &CollideData) {}
}

/// Observer of contacts found by a shape sweep
pub trait SweepCallback {
    fn on_contact(&mut self, body: BodyHandle, contact: &ContactPoint);
}

impl<F> SweepCallback for F
where
    F: FnMut(BodyHandle, &ContactPoint),
{
    fn on_contact(&mut self, body: BodyHandle, contact: &ContactPoint) {
        self(body, contact)
    }
}

/// Backend hook rejecting contact pairs vetoed by body callbacks
#[derive(Debug, Default)]
pub(crate) struct PairFilter {
    blocked: HashSet<(u128, u128)>,
}

impl PairFilter {
    fn key(a: u128, b: u128) -> (u128, u128) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn clear(&mut self) {
        self.blocked.clear();
    }

    pub fn block(&mut self, a: BodyHandle, b: BodyHandle) {
        self.blocked.insert(Self::key(a.to_bits(), b.to_bits()));
    }

    pub fn is_blocked(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.blocked.contains(&Self::key(a.to_bits(), b.to_bits()))
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

impl PhysicsHooks for PairFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let a = context.colliders[context.collider1].user_data;
        let b = context.colliders[context.collider2].user_data;
        if self.blocked.contains(&Self::key(a, b)) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}
