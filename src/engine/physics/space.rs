use glam::{Quat, Vec3};
use log::{debug, warn};
use rapier3d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier3d::parry::query;
use rapier3d::parry::shape::Shape as ParryShape;
use rapier3d::prelude::*;
use std::collections::HashMap;

use super::body::{BodyDesc, BodyHandle, PhysicsBody};
use super::collision::{fold_push, CollideData, CollisionGroups, ContactPoint, PairFilter, SweepCallback};
use super::debug::DebugContacts;
use super::handle::Arena;
use super::material::PhysicsMaterial;
use super::shape::{Shape, ShapeHandle, ShapeKind};
use super::sound::SoundPlayer;
use super::PhysicsError;
use crate::core::math::{
    from_isometry, from_point, from_rotation, from_vector, to_isometry, to_point, to_rotation,
    to_vector,
};

/// Bounds growth used when asking body callbacks about nearby pairs
const VETO_MARGIN: f32 = 0.05;

/// How the backend should move a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Static,
    Dynamic,
    /// Moved by position writes only (character bodies)
    Kinematic,
}

/// Exclusion rules for a world shape query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepFilter {
    /// Body to ignore, usually the one doing the query
    pub skip_body: Option<BodyHandle>,
    /// Ignore static geometry
    pub skip_static: bool,
    /// The query comes from a character; bodies that opt out of character contact are ignored
    pub is_character: bool,
    /// Consider other character bodies
    pub collide_character: bool,
}

impl Default for SweepFilter {
    fn default() -> Self {
        Self {
            skip_body: None,
            skip_static: false,
            is_character: false,
            collide_character: true,
        }
    }
}

impl SweepFilter {
    pub fn skipping(body: BodyHandle) -> Self {
        Self {
            skip_body: Some(body),
            ..Self::default()
        }
    }

    fn accepts(&self, handle: BodyHandle, body: &PhysicsBody) -> bool {
        if self.skip_body == Some(handle) || !body.collides() {
            return false;
        }
        if self.skip_static && body.is_static() {
            return false;
        }
        if body.is_character() && !self.collide_character {
            return false;
        }
        if self.is_character && !body.collides_with_characters() {
            return false;
        }
        true
    }
}

/// Outcome of a shape-vs-world query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepResult {
    /// Query position moved out of penetration
    pub position: Vec3,
    /// Whether any penetrating contact was found
    pub collided: bool,
    /// Translation applied to reach `position`
    pub push: Vec3,
    pub contacts: Vec<(BodyHandle, ContactPoint)>,
}

/// First body hit by a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub distance: f32,
    pub point: Vec3,
}

/// Backend state plus the bodies and shapes living in it.
///
/// Split from `PhysicsWorld` so characters and joints can borrow the space
/// while the world iterates over them.
pub struct PhysicsSpace {
    /// Gravity vector (default: -9.81 m/s² on the y axis)
    gravity: Vec3,

    /// Integration parameters for the physics simulation
    integration_parameters: IntegrationParameters,

    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,

    /// Fixed body standing in for "the world" as a joint parent
    world_anchor: RigidBodyHandle,

    pub(crate) bodies: Arena<PhysicsBody>,
    pub(crate) shapes: Arena<Shape>,
    materials: HashMap<String, PhysicsMaterial>,
    default_material: PhysicsMaterial,
    pair_filter: PairFilter,
    pub(crate) debug: DebugContacts,
}

impl PhysicsSpace {
    pub fn new(gravity: Vec3) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        // Fixed timestep of 1/60 seconds (60 FPS)
        integration_parameters.dt = 1.0 / 60.0;

        let mut rigid_body_set = RigidBodySet::new();
        let world_anchor = rigid_body_set.insert(RigidBodyBuilder::fixed().build());

        Self {
            gravity,
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            rigid_body_set,
            collider_set: ColliderSet::new(),
            world_anchor,
            bodies: Arena::new(),
            shapes: Arena::new(),
            materials: HashMap::new(),
            default_material: PhysicsMaterial::default(),
            pair_filter: PairFilter::default(),
            debug: DebugContacts::new(false),
        }
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    // --- Materials ---

    pub(crate) fn add_material(&mut self, material: PhysicsMaterial) {
        self.materials.insert(material.name.clone(), material);
    }

    pub fn material(&self, name: &str) -> Option<&PhysicsMaterial> {
        self.materials.get(name)
    }

    /// Material used by a body, falling back to the default one
    fn material_of<'a>(
        materials: &'a HashMap<String, PhysicsMaterial>,
        default: &'a PhysicsMaterial,
        body: &PhysicsBody,
    ) -> &'a PhysicsMaterial {
        materials.get(body.material()).unwrap_or(default)
    }

    pub(crate) fn set_body_material(
        &mut self,
        handle: BodyHandle,
        name: &str,
    ) -> Result<(), PhysicsError> {
        let material = self
            .materials
            .get(name)
            .ok_or_else(|| PhysicsError::MaterialNotFound(name.to_string()))?;
        let body = self
            .bodies
            .get_mut(handle)
            .ok_or(PhysicsError::BodyNotFound(handle.index()))?;
        body.set_material_name(name);
        if let Some(collider) = self.collider_set.get_mut(body.collider) {
            collider.set_friction(material.friction);
            collider.set_restitution(material.restitution);
        }
        Ok(())
    }

    // --- Shapes ---

    pub(crate) fn add_shape(&mut self, shape: Shape) -> ShapeHandle {
        self.shapes.insert(shape)
    }

    pub fn shape(&self, handle: ShapeHandle) -> Option<&Shape> {
        self.shapes.get(handle)
    }

    /// Register a compound built from existing shapes; each child gains a user
    pub(crate) fn add_compound_shape(
        &mut self,
        children: &[ShapeHandle],
        offset_position: Vec3,
        offset_rotation: Quat,
    ) -> Result<ShapeHandle, PhysicsError> {
        if children.is_empty() {
            return Err(PhysicsError::InvalidConfig(
                "compound shape needs at least one child".to_string(),
            ));
        }
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            let shape = self
                .shapes
                .get(*child)
                .ok_or(PhysicsError::ShapeNotFound(child.index()))?;
            // The backend only accepts convex or primitive parts
            if matches!(shape.kind(), ShapeKind::Compound { .. }) {
                return Err(PhysicsError::InvalidConfig(format!(
                    "compound shape cannot contain compound {:?}",
                    child
                )));
            }
            parts.push((*child, shape));
        }
        let compound = Shape::compound(parts, offset_position, offset_rotation);
        for child in children {
            if let Some(shape) = self.shapes.get_mut(*child) {
                shape.add_user();
            }
        }
        Ok(self.shapes.insert(compound))
    }

    /// Free a shape nothing uses any more
    pub(crate) fn destroy_shape(&mut self, handle: ShapeHandle) -> Result<(), PhysicsError> {
        let shape = self
            .shapes
            .get(handle)
            .ok_or(PhysicsError::ShapeNotFound(handle.index()))?;
        if shape.users() > 0 {
            return Err(PhysicsError::ShapeInUse(handle.index(), shape.users()));
        }
        self.release_shape(handle);
        Ok(())
    }

    /// Drop one user of a shape, freeing it (and its compound children) at zero
    pub(crate) fn release_shape(&mut self, handle: ShapeHandle) {
        let remaining = match self.shapes.get_mut(handle) {
            Some(shape) => shape.release_user(),
            None => return,
        };
        if remaining == 0 {
            if let Some(shape) = self.shapes.remove(handle) {
                debug!("Shape {:?} freed", handle);
                if let ShapeKind::Compound { children } = shape.kind() {
                    for child in children.clone() {
                        self.release_shape(child);
                    }
                }
            }
        }
    }

    // --- Bodies ---

    pub(crate) fn create_body(
        &mut self,
        desc: &BodyDesc,
        kind: BodyKind,
    ) -> Result<BodyHandle, PhysicsError> {
        let shape = self
            .shapes
            .get_mut(desc.shape)
            .ok_or(PhysicsError::ShapeNotFound(desc.shape.index()))?;
        shape.add_user();
        let shared = shape.shared().clone();
        let offset = shape.offset();

        let material = match &desc.material {
            Some(name) => match self.materials.get(name) {
                Some(material) => material,
                None => {
                    warn!("Material '{}' not found for body '{}'", name, desc.name);
                    &self.default_material
                }
            },
            None => &self.default_material,
        };
        let (friction, restitution) = (material.friction, material.restitution);

        let (body_type, group) = match kind {
            BodyKind::Static => (RigidBodyType::Fixed, CollisionGroups::Static),
            BodyKind::Dynamic => (RigidBodyType::Dynamic, CollisionGroups::Default),
            BodyKind::Kinematic => (
                RigidBodyType::KinematicPositionBased,
                CollisionGroups::Character,
            ),
        };

        let rigid_body = RigidBodyBuilder::new(body_type)
            .position(to_isometry(desc.position, desc.rotation))
            .linear_damping(desc.linear_damping)
            .angular_damping(desc.angular_damping)
            .gravity_scale(if desc.gravity { 1.0 } else { 0.0 })
            .can_sleep(desc.can_sleep && kind != BodyKind::Kinematic)
            .build();
        let rigid_body_handle = self.rigid_body_set.insert(rigid_body);

        let mut desc = desc.clone();
        if desc.material.as_ref().is_some_and(|m| !self.materials.contains_key(m)) {
            desc.material = None;
        }

        let collider_set = &mut self.collider_set;
        let rigid_body_set = &mut self.rigid_body_set;
        let handle = self.bodies.insert_with(|handle| {
            let mut builder = ColliderBuilder::new(shared)
                .position(offset)
                .friction(friction)
                .restitution(restitution)
                .collision_groups(group.to_interaction_groups(desc.collide_character))
                .user_data(handle.to_bits());
            if kind == BodyKind::Dynamic {
                builder = builder.mass(desc.mass);
            }
            let collider =
                collider_set.insert_with_parent(builder.build(), rigid_body_handle, rigid_body_set);
            PhysicsBody::new(&desc, rigid_body_handle, collider, group)
        });

        if let Some(rb) = self.rigid_body_set.get_mut(rigid_body_handle) {
            rb.user_data = handle.to_bits();
        }

        debug!("Created body '{}' ({:?}) as {:?}", desc.name, kind, handle);
        Ok(handle)
    }

    /// Remove a body from the backend. Joints must have been detached already.
    pub(crate) fn remove_body(
        &mut self,
        handle: BodyHandle,
        player: &mut dyn SoundPlayer,
    ) -> Option<PhysicsBody> {
        let mut body = self.bodies.remove(handle)?;
        body.stop_sounds(player);
        self.rigid_body_set.remove(
            body.rigid_body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true, // remove attached colliders
        );
        self.release_shape(body.shape());
        Some(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&PhysicsBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut PhysicsBody> {
        self.bodies.get_mut(handle)
    }

    fn rigid_body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies
            .get(handle)
            .and_then(|body| self.rigid_body_set.get(body.rigid_body))
    }

    fn rigid_body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        let rb = self.bodies.get(handle)?.rigid_body;
        self.rigid_body_set.get_mut(rb)
    }

    pub fn body_position(&self, handle: BodyHandle) -> Option<Vec3> {
        self.rigid_body(handle).map(|rb| from_vector(rb.translation()))
    }

    pub fn body_rotation(&self, handle: BodyHandle) -> Option<Quat> {
        self.rigid_body(handle).map(|rb| from_rotation(rb.rotation()))
    }

    /// Teleport a body. Kinematic bodies are moved through the next kinematic pose.
    pub fn set_body_position(&mut self, handle: BodyHandle, position: Vec3) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            if rb.is_kinematic() {
                rb.set_next_kinematic_translation(to_vector(position));
            } else {
                rb.set_translation(to_vector(position), true);
            }
        }
    }

    pub fn set_body_rotation(&mut self, handle: BodyHandle, rotation: Quat) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            if rb.is_kinematic() {
                rb.set_next_kinematic_rotation(to_rotation(rotation));
            } else {
                rb.set_rotation(to_rotation(rotation), true);
            }
        }
    }

    pub fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.rigid_body(handle).map(|rb| from_vector(rb.linvel()))
    }

    pub fn angular_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.rigid_body(handle).map(|rb| from_vector(rb.angvel()))
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            rb.set_linvel(to_vector(velocity), true);
        }
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            rb.set_angvel(to_vector(velocity), true);
        }
    }

    /// Velocity of the body material at a world point
    pub fn velocity_at_point(&self, handle: BodyHandle, point: Vec3) -> Option<Vec3> {
        self.rigid_body(handle)
            .map(|rb| from_vector(&rb.velocity_at_point(&to_point(point))))
    }

    /// Backend mass (0 for static and kinematic bodies)
    pub fn body_mass(&self, handle: BodyHandle) -> f32 {
        self.rigid_body(handle)
            .filter(|rb| rb.is_dynamic())
            .map(|rb| rb.mass())
            .unwrap_or(0.0)
    }

    /// Force applied during the next simulate; cleared afterwards
    pub fn add_force(&mut self, handle: BodyHandle, force: Vec3) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            if rb.is_dynamic() {
                rb.add_force(to_vector(force), true);
            }
        }
    }

    pub fn add_torque(&mut self, handle: BodyHandle, torque: Vec3) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            if rb.is_dynamic() {
                rb.add_torque(to_vector(torque), true);
            }
        }
    }

    pub fn add_impulse(&mut self, handle: BodyHandle, impulse: Vec3) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            if rb.is_dynamic() {
                rb.apply_impulse(to_vector(impulse), true);
            }
        }
    }

    pub fn wake_body(&mut self, handle: BodyHandle) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            rb.wake_up(true);
        }
    }

    pub fn sleep_body(&mut self, handle: BodyHandle) {
        if let Some(rb) = self.rigid_body_mut(handle) {
            rb.sleep();
        }
    }

    /// Awake bodies are "enabled"; static bodies always count as enabled
    pub fn is_body_enabled(&self, handle: BodyHandle) -> bool {
        self.rigid_body(handle)
            .map(|rb| rb.is_fixed() || !rb.is_sleeping())
            .unwrap_or(false)
    }

    /// Switch contact generation for a body on or off
    pub(crate) fn set_body_collide(&mut self, handle: BodyHandle, collide: bool) {
        let Some(body) = self.bodies.get_mut(handle) else {
            return;
        };
        body.set_collide(collide);
        let groups = if collide {
            body.group()
                .to_interaction_groups(body.collides_with_characters())
        } else {
            CollisionGroups::disabled()
        };
        if let Some(collider) = self.collider_set.get_mut(body.collider) {
            collider.set_collision_groups(groups);
        }
    }

    pub(crate) fn set_body_collide_character(&mut self, handle: BodyHandle, collide: bool) {
        let Some(body) = self.bodies.get_mut(handle) else {
            return;
        };
        body.set_collide_character(collide);
        if body.collides() {
            let groups = body.group().to_interaction_groups(collide);
            if let Some(collider) = self.collider_set.get_mut(body.collider) {
                collider.set_collision_groups(groups);
            }
        }
    }

    /// Enable the backend pair-filter hook for a body's collider
    pub(crate) fn enable_pair_filter(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle) else {
            return;
        };
        if let Some(collider) = self.collider_set.get_mut(body.collider) {
            collider.set_active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS);
        }
    }

    /// World pose of a body's collider. Kinematic bodies report the pose they
    /// were last told to move to.
    fn collider_pose(&self, body: &PhysicsBody) -> Option<Isometry<Real>> {
        let rb = self.rigid_body_set.get(body.rigid_body)?;
        let base = if rb.is_kinematic() {
            *rb.next_position()
        } else {
            *rb.position()
        };
        let local = self
            .collider_set
            .get(body.collider)
            .and_then(|c| c.position_wrt_parent().copied())
            .unwrap_or_else(Isometry::identity);
        Some(base * local)
    }

    fn collider_aabb(&self, body: &PhysicsBody) -> Option<(Aabb, Isometry<Real>)> {
        let pose = self.collider_pose(body)?;
        let collider = self.collider_set.get(body.collider)?;
        Some((collider.shape().compute_aabb(&pose), pose))
    }

    /// World-space bounds of a body
    pub fn body_aabb(&self, handle: BodyHandle) -> Option<(Vec3, Vec3)> {
        let body = self.bodies.get(handle)?;
        let (aabb, _) = self.collider_aabb(body)?;
        Some((from_point(&aabb.mins), from_point(&aabb.maxs)))
    }

    /// Broad phase: bodies whose bounds overlap the box
    pub fn bodies_in_box(&self, min: Vec3, max: Vec3) -> Vec<BodyHandle> {
        let query = Aabb::new(to_point(min), to_point(max));
        self.bodies
            .iter()
            .filter(|(_, body)| {
                self.collider_aabb(body)
                    .map(|(aabb, _)| aabb.intersects(&query))
                    .unwrap_or(false)
            })
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Wake sleeping dynamic bodies overlapping the box
    pub(crate) fn wake_bodies_in_box(&mut self, min: Vec3, max: Vec3, skip: Option<BodyHandle>) {
        for handle in self.bodies_in_box(min, max) {
            if Some(handle) == skip {
                continue;
            }
            if let Some(rb) = self.rigid_body_mut(handle) {
                if rb.is_dynamic() && rb.is_sleeping() {
                    rb.wake_up(true);
                }
            }
        }
    }

    // --- Queries ---

    /// Test a shape placed at a pose against the world.
    ///
    /// Every penetrating contact is reported to `callback`; the contacts are
    /// folded into one push with the per-axis maximum rule.
    pub fn check_shape_world_collision(
        &mut self,
        shape: ShapeHandle,
        position: Vec3,
        rotation: Quat,
        filter: &SweepFilter,
        callback: Option<&mut dyn SweepCallback>,
    ) -> SweepResult {
        let Some(shape) = self.shapes.get(shape) else {
            warn!("Sweep with unknown shape {:?}", shape);
            return SweepResult {
                position,
                ..SweepResult::default()
            };
        };
        let shared = shape.shared().clone();
        let pose = to_isometry(position, rotation) * shape.offset();
        self.sweep_pose(shared.as_ref(), &pose, position, filter, callback)
    }

    pub(crate) fn sweep_pose(
        &mut self,
        shape: &dyn ParryShape,
        pose: &Isometry<Real>,
        origin: Vec3,
        filter: &SweepFilter,
        mut callback: Option<&mut dyn SweepCallback>,
    ) -> SweepResult {
        let query_aabb = shape.compute_aabb(pose);
        let mut contacts = Vec::new();

        for (handle, body) in self.bodies.iter() {
            if !filter.accepts(handle, body) {
                continue;
            }
            let Some((aabb, other_pose)) = self.collider_aabb(body) else {
                continue;
            };
            if !aabb.intersects(&query_aabb) {
                continue;
            }
            let Some(collider) = self.collider_set.get(body.collider) else {
                continue;
            };

            let mut found = Vec::new();
            shape_contacts(pose, shape, &other_pose, collider.shape(), &mut found);
            contacts.extend(found.into_iter().map(|contact| (handle, contact)));
        }

        if let Some(callback) = callback.as_deref_mut() {
            for (handle, contact) in &contacts {
                callback.on_contact(*handle, contact);
            }
        }
        for (_, contact) in &contacts {
            self.debug
                .add_contact(contact.point, contact.normal, contact.depth);
        }

        let push = fold_push(contacts.iter().map(|(_, c)| c));
        SweepResult {
            position: origin + push,
            collided: !contacts.is_empty(),
            push,
            contacts,
        }
    }

    /// Cast a ray against body shapes, returning the closest hit
    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &SweepFilter,
    ) -> Option<RayHit> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }
        let ray = Ray::new(to_point(origin), to_vector(direction));
        let end = origin + direction * max_distance;
        let ray_aabb = Aabb::new(to_point(origin.min(end)), to_point(origin.max(end)));

        let mut best: Option<RayHit> = None;
        for (handle, body) in self.bodies.iter() {
            if !filter.accepts(handle, body) {
                continue;
            }
            let Some((aabb, pose)) = self.collider_aabb(body) else {
                continue;
            };
            if !aabb.intersects(&ray_aabb) {
                continue;
            }
            let Some(collider) = self.collider_set.get(body.collider) else {
                continue;
            };
            if let Some(toi) = collider.shape().cast_ray(&pose, &ray, max_distance, true) {
                if best.map_or(true, |hit| toi < hit.distance) {
                    best = Some(RayHit {
                        body: handle,
                        distance: toi,
                        point: origin + direction * toi,
                    });
                }
            }
        }
        best
    }

    // --- Joints ---

    /// Backend pose of the joint parent (world anchor for `None`)
    pub(crate) fn joint_parent_pose(&self, parent: Option<BodyHandle>) -> Option<Isometry<Real>> {
        match parent {
            Some(handle) => self.rigid_body(handle).map(|rb| *rb.position()),
            None => Some(Isometry::identity()),
        }
    }

    pub(crate) fn body_pose(&self, handle: BodyHandle) -> Option<(Vec3, Quat)> {
        self.rigid_body(handle).map(|rb| from_isometry(rb.position()))
    }

    pub(crate) fn insert_joint(
        &mut self,
        parent: Option<BodyHandle>,
        child: BodyHandle,
        joint: GenericJoint,
    ) -> Option<ImpulseJointHandle> {
        let parent_rb = match parent {
            Some(handle) => self.bodies.get(handle)?.rigid_body,
            None => self.world_anchor,
        };
        let child_rb = self.bodies.get(child)?.rigid_body;
        Some(
            self.impulse_joint_set
                .insert(parent_rb, child_rb, joint, true),
        )
    }

    pub(crate) fn remove_joint(&mut self, handle: ImpulseJointHandle) {
        self.impulse_joint_set.remove(handle, true);
    }

    /// Drive the joint's spin about its X axis (the pin) towards `velocity`
    pub(crate) fn drive_joint_spin(&mut self, handle: ImpulseJointHandle, velocity: f32, gain: f32) {
        if let Some(joint) = self.impulse_joint_set.get_mut(handle) {
            joint.data.set_motor_velocity(JointAxis::AngX, velocity, gain);
        }
    }

    /// Linear constraint force of a joint over the last step
    pub(crate) fn joint_force(&self, handle: ImpulseJointHandle) -> f32 {
        let dt = self.integration_parameters.dt.max(f32::EPSILON);
        self.impulse_joint_set
            .get(handle)
            .map(|joint| {
                let impulses = joint.impulses;
                Vec3::new(impulses[0], impulses[1], impulses[2]).length() / dt
            })
            .unwrap_or(0.0)
    }

    // --- Step ---

    /// Reset per-step body state and collect callback vetoes for overlapping pairs
    pub(crate) fn update_before_simulate(&mut self, dt: f32) {
        for (_, body) in self.bodies.iter_mut() {
            body.update_before_simulate(dt);
        }

        self.pair_filter.clear();
        let watchers: Vec<BodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.has_callbacks())
            .map(|(handle, _)| handle)
            .collect();

        for handle in watchers {
            let Some((min, max)) = self.body_aabb(handle) else {
                continue;
            };
            // Include this step's motion so a pair is vetoed before the backend
            // builds a speculative contact for it
            let travel = self.linear_velocity(handle).unwrap_or(Vec3::ZERO).abs() * dt
                + Vec3::splat(VETO_MARGIN);
            let (min, max) = (min - travel, max + travel);
            let others: Vec<BodyHandle> = self
                .bodies_in_box(min, max)
                .into_iter()
                .filter(|other| *other != handle)
                .collect();
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            let mut callbacks = std::mem::take(&mut body.callbacks);
            for other in others {
                let allowed = callbacks
                    .iter_mut()
                    .fold(true, |ok, cb| cb.on_begin_collision(handle, other) && ok);
                if !allowed {
                    self.pair_filter.block(handle, other);
                }
            }
            if let Some(body) = self.bodies.get_mut(handle) {
                body.callbacks = callbacks;
            }
        }
    }

    /// Run the backend step
    pub(crate) fn simulate(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        let gravity = to_vector(self.gravity);

        self.physics_pipeline.step(
            &gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &self.pair_filter,
            &(),
        );
    }

    /// Turn the backend's resolved contacts into body flags, sounds and callbacks
    pub(crate) fn apply_contacts(&mut self, player: &mut dyn SoundPlayer) {
        let mut resolved: Vec<(BodyHandle, BodyHandle, CollideData)> = Vec::new();

        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let (Some(c1), Some(c2)) = (
                self.collider_set.get(pair.collider1),
                self.collider_set.get(pair.collider2),
            ) else {
                continue;
            };
            let a = BodyHandle::from_bits(c1.user_data);
            let b = BodyHandle::from_bits(c2.user_data);
            let rb1 = c1.parent().and_then(|h| self.rigid_body_set.get(h));
            let rb2 = c2.parent().and_then(|h| self.rigid_body_set.get(h));

            let mut data = CollideData::default();
            for manifold in &pair.manifolds {
                let normal = manifold.data.normal;
                if manifold.data.solver_contacts.is_empty() {
                    continue;
                }
                data.normal = from_vector(&normal);
                for contact in &manifold.data.solver_contacts {
                    let v1 = rb1
                        .map(|rb| rb.velocity_at_point(&contact.point))
                        .unwrap_or_else(Vector::zeros);
                    let v2 = rb2
                        .map(|rb| rb.velocity_at_point(&contact.point))
                        .unwrap_or_else(Vector::zeros);
                    let relative = v1 - v2;
                    let normal_speed = relative.dot(&normal);
                    let tangential = relative - normal * normal_speed;
                    data.impact_speed = data.impact_speed.max(normal_speed.abs());
                    data.slide_speed = data.slide_speed.max(tangential.norm());
                    data.points.push(from_point(&contact.point));
                }
            }
            if !data.points.is_empty() {
                resolved.push((a, b, data));
            }
        }

        for (a, b, data) in resolved {
            let point = data.points[0];
            for (this, other, flip) in [(a, b, false), (b, a, true)] {
                let Some(body) = self.bodies.get_mut(this) else {
                    continue;
                };
                let material = Self::material_of(&self.materials, &self.default_material, body);
                body.on_contact(player, material, point, data.impact_speed, data.slide_speed);

                if body.has_callbacks() {
                    let mut view = data.clone();
                    if flip {
                        view.normal = -view.normal;
                    }
                    let mut callbacks = std::mem::take(&mut body.callbacks);
                    for callback in callbacks.iter_mut() {
                        callback.on_collide(this, other, &view);
                    }
                    body.callbacks = callbacks;
                }
            }
        }
    }

    /// Post-step body bookkeeping; clears user forces for the next step
    pub(crate) fn update_after_simulate(&mut self, _dt: f32, player: &mut dyn SoundPlayer) {
        for (_, body) in self.bodies.iter_mut() {
            let Some(rb) = self.rigid_body_set.get_mut(body.rigid_body) else {
                continue;
            };
            if !rb.is_dynamic() {
                continue;
            }
            let position = from_vector(rb.translation());
            let angular_speed = rb.angvel().norm();
            let material = Self::material_of(&self.materials, &self.default_material, body);
            if body.update_after_simulate(player, material, position, angular_speed) {
                rb.sleep();
            }
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }
}

/// Exact contacts between two shapes, splitting compounds into their parts
fn shape_contacts(
    pose1: &Isometry<Real>,
    shape1: &dyn ParryShape,
    pose2: &Isometry<Real>,
    shape2: &dyn ParryShape,
    out: &mut Vec<ContactPoint>,
) {
    if let Some(compound) = shape1.as_compound() {
        for (local, part) in compound.shapes() {
            shape_contacts(&(pose1 * local), part.as_ref(), pose2, shape2, out);
        }
        return;
    }
    if let Some(compound) = shape2.as_compound() {
        for (local, part) in compound.shapes() {
            shape_contacts(pose1, shape1, &(pose2 * local), part.as_ref(), out);
        }
        return;
    }

    match query::contact(pose1, shape1, pose2, shape2, 0.0) {
        Ok(Some(contact)) if contact.dist < 0.0 => out.push(ContactPoint {
            point: from_point(&contact.point1),
            normal: -from_vector(&contact.normal1.into_inner()),
            depth: -contact.dist,
        }),
        Ok(_) => {}
        Err(_) => debug!(
            "Unsupported shape pair {:?} / {:?}",
            shape1.shape_type(),
            shape2.shape_type()
        ),
    }
}
