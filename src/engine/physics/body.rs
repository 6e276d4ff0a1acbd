// Physics body bookkeeping: shape ownership, per-step contact flags, surface sounds

use glam::{Quat, Vec3};
use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};

use super::character::CharacterHandle;
use super::collision::{BodyCallback, CollisionGroups};
use super::handle::Handle;
use super::joint::JointHandle;
use super::material::PhysicsMaterial;
use super::shape::ShapeHandle;
use super::sound::{play_one_shot, LoopingSound, SoundPlayer};

/// Handle to a body owned by the physics world
pub type BodyHandle = Handle<PhysicsBody>;

/// Steps without sliding before an active scrape sound is faded out
pub const SCRAPE_GRACE_STEPS: u32 = 8;

/// Relative normal speed above which a contact counts as an impact
pub const IMPACT_SPEED_THRESHOLD: f32 = 0.5;

/// Relative tangential speed above which a contact counts as sliding
pub const SLIDE_SPEED_THRESHOLD: f32 = 0.1;

const SCRAPE_FADE_IN: f32 = 8.0;
const SCRAPE_FADE_OUT: f32 = 4.3;
const ROLL_FADE_IN: f32 = 4.0;
const ROLL_FADE_OUT: f32 = 2.0;

/// Description of a body to create
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub name: String,
    pub shape: ShapeHandle,
    /// 0 makes the body static
    pub mass: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub material: Option<String>,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub can_sleep: bool,
    pub gravity: bool,
    pub collide_character: bool,
}

impl BodyDesc {
    /// Create a new body description (static until a mass is given)
    pub fn new(name: &str, shape: ShapeHandle) -> Self {
        Self {
            name: name.to_string(),
            shape,
            mass: 0.0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            material: None,
            linear_damping: 0.1,
            angular_damping: 0.1,
            can_sleep: true,
            gravity: true,
            collide_character: true,
        }
    }

    /// Set the mass (0 = static)
    pub fn mass(mut self, mass: f32) -> Self {
        self.mass = mass.max(0.0);
        self
    }

    /// Set the initial position of the body
    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Set the initial rotation
    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn material(mut self, material: &str) -> Self {
        self.material = Some(material.to_string());
        self
    }

    pub fn damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Set whether the body can sleep when inactive
    pub fn can_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }

    /// Whether world gravity affects the body
    pub fn gravity(mut self, gravity: bool) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn collide_character(mut self, collide: bool) -> Self {
        self.collide_character = collide;
        self
    }

    pub fn is_static(&self) -> bool {
        self.mass <= 0.0
    }
}

/// Contact flags valid for the step that just ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactFlags {
    pub has_collision: bool,
    pub has_impact: bool,
    pub has_slide: bool,
}

/// A body in the physics world.
///
/// Backend state (pose, velocity) lives in the rapier sets; this struct keeps
/// everything the backend does not know about.
pub struct PhysicsBody {
    name: String,
    pub(crate) rigid_body: RigidBodyHandle,
    pub(crate) collider: ColliderHandle,
    shape: ShapeHandle,
    mass: f32,
    material: String,
    group: CollisionGroups,
    collide: bool,
    collide_character: bool,
    character: Option<CharacterHandle>,
    joints: Vec<JointHandle>,
    pub(crate) callbacks: Vec<Box<dyn BodyCallback>>,
    flags: ContactFlags,
    scrape: LoopingSound,
    steps_without_slide: u32,
    roll: LoopingSound,
    disable_after_simulation: bool,
}

impl PhysicsBody {
    pub(crate) fn new(
        desc: &BodyDesc,
        rigid_body: RigidBodyHandle,
        collider: ColliderHandle,
        group: CollisionGroups,
    ) -> Self {
        Self {
            name: desc.name.clone(),
            rigid_body,
            collider,
            shape: desc.shape,
            mass: desc.mass,
            material: desc.material.clone().unwrap_or_default(),
            group,
            collide: true,
            collide_character: desc.collide_character,
            character: None,
            joints: Vec::new(),
            callbacks: Vec::new(),
            flags: ContactFlags::default(),
            scrape: LoopingSound::default(),
            steps_without_slide: 0,
            roll: LoopingSound::default(),
            disable_after_simulation: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> ShapeHandle {
        self.shape
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn is_static(&self) -> bool {
        self.mass <= 0.0
    }

    /// Material name; empty means the world default
    pub fn material(&self) -> &str {
        &self.material
    }

    pub(crate) fn set_material_name(&mut self, material: &str) {
        self.material = material.to_string();
    }

    pub fn group(&self) -> CollisionGroups {
        self.group
    }

    pub fn collides(&self) -> bool {
        self.collide
    }

    pub(crate) fn set_collide(&mut self, collide: bool) {
        self.collide = collide;
    }

    pub fn collides_with_characters(&self) -> bool {
        self.collide_character
    }

    pub(crate) fn set_collide_character(&mut self, collide: bool) {
        self.collide_character = collide;
    }

    /// Character this body represents, if any
    pub fn character(&self) -> Option<CharacterHandle> {
        self.character
    }

    pub fn is_character(&self) -> bool {
        self.character.is_some()
    }

    pub(crate) fn set_character(&mut self, character: Option<CharacterHandle>) {
        self.character = character;
        if character.is_some() {
            self.group = CollisionGroups::Character;
        }
    }

    /// Joints that reference this body as parent or child
    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }

    pub(crate) fn attach_joint(&mut self, joint: JointHandle) {
        if !self.joints.contains(&joint) {
            self.joints.push(joint);
        }
    }

    pub(crate) fn detach_joint(&mut self, joint: JointHandle) {
        self.joints.retain(|j| *j != joint);
    }

    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    pub fn flags(&self) -> ContactFlags {
        self.flags
    }

    pub fn has_collision(&self) -> bool {
        self.flags.has_collision
    }

    pub fn has_impact(&self) -> bool {
        self.flags.has_impact
    }

    pub fn has_slide(&self) -> bool {
        self.flags.has_slide
    }

    pub fn scrape_sound_active(&self) -> bool {
        self.scrape.is_running()
    }

    pub fn roll_sound_active(&self) -> bool {
        self.roll.is_running()
    }

    /// Put the body to sleep once the current step has been simulated
    pub fn disable_after_simulation(&mut self) {
        self.disable_after_simulation = true;
    }

    pub fn pending_disable(&self) -> bool {
        self.disable_after_simulation
    }

    /// Reset transient flags before the backend step
    pub fn update_before_simulate(&mut self, _dt: f32) {
        self.flags = ContactFlags::default();
    }

    /// Record a resolved backend contact and drive impact/scrape sounds
    pub(crate) fn on_contact(
        &mut self,
        player: &mut dyn SoundPlayer,
        material: &PhysicsMaterial,
        position: Vec3,
        impact_speed: f32,
        slide_speed: f32,
    ) {
        self.flags.has_collision = true;

        if impact_speed >= IMPACT_SPEED_THRESHOLD && !self.flags.has_impact {
            self.flags.has_impact = true;
            if let Some(volume) = material.impact.volume(impact_speed) {
                play_one_shot(player, &self.name, &material.impact.sound, position, volume);
            }
        }

        if slide_speed >= SLIDE_SPEED_THRESHOLD {
            self.flags.has_slide = true;
            if let Some(volume) = material.scrape.volume(slide_speed) {
                self.scrape
                    .start(player, &self.name, &material.scrape.sound, SCRAPE_FADE_IN);
                self.scrape.update(player, position, volume, 1.0);
            }
        }
    }

    /// Post-step bookkeeping. Returns true when the body should be put to sleep now.
    pub(crate) fn update_after_simulate(
        &mut self,
        player: &mut dyn SoundPlayer,
        material: &PhysicsMaterial,
        position: Vec3,
        angular_speed: f32,
    ) -> bool {
        if self.scrape.is_running() {
            if self.flags.has_slide {
                self.steps_without_slide = 0;
            } else {
                self.steps_without_slide += 1;
                if self.steps_without_slide >= SCRAPE_GRACE_STEPS {
                    self.scrape.stop(player, SCRAPE_FADE_OUT);
                    self.steps_without_slide = 0;
                }
            }
        } else {
            self.steps_without_slide = 0;
        }

        let roll_volume = if self.flags.has_collision {
            material.roll.volume(angular_speed)
        } else {
            None
        };
        match roll_volume {
            Some(volume) => {
                self.roll
                    .start(player, &self.name, &material.roll.sound, ROLL_FADE_IN);
                self.roll.update(player, position, volume, 1.0);
            }
            None => self.roll.stop(player, ROLL_FADE_OUT),
        }

        std::mem::take(&mut self.disable_after_simulation)
    }

    /// Fade out every sound this body owns
    pub(crate) fn stop_sounds(&mut self, player: &mut dyn SoundPlayer) {
        self.scrape.stop(player, SCRAPE_FADE_OUT);
        self.roll.stop(player, ROLL_FADE_OUT);
    }
}

impl std::fmt::Debug for PhysicsBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsBody")
            .field("name", &self.name)
            .field("mass", &self.mass)
            .field("material", &self.material)
            .field("flags", &self.flags)
            .field("joints", &self.joints)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::material::SpeedBandSound;
    use crate::engine::physics::sound::SoundEntityId;

    #[derive(Default)]
    struct CountingPlayer {
        created: Vec<String>,
        faded_out: Vec<SoundEntityId>,
    }

    impl SoundPlayer for CountingPlayer {
        fn create_sound_entity(&mut self, _: &str, sound: &str, _: bool) -> Option<SoundEntityId> {
            self.created.push(sound.to_string());
            Some(SoundEntityId(self.created.len() as u64))
        }
        fn set_position(&mut self, _: SoundEntityId, _: Vec3) {}
        fn set_volume(&mut self, _: SoundEntityId, _: f32) {}
        fn set_speed(&mut self, _: SoundEntityId, _: f32) {}
        fn fade_in(&mut self, _: SoundEntityId, _: f32) {}
        fn fade_out(&mut self, id: SoundEntityId, _: f32) {
            self.faded_out.push(id);
        }
        fn is_playing(&self, _: SoundEntityId) -> bool {
            true
        }
    }

    fn test_body() -> PhysicsBody {
        let desc = BodyDesc::new("crate", Handle::new(0, 0)).mass(1.0);
        PhysicsBody::new(
            &desc,
            RigidBodyHandle::invalid(),
            ColliderHandle::invalid(),
            CollisionGroups::Default,
        )
    }

    fn scraping_material() -> PhysicsMaterial {
        PhysicsMaterial::new("stone").scrape_sound(SpeedBandSound::new("scrape", 0.1, 2.0))
    }

    #[test]
    fn test_body_desc_defaults() {
        let desc = BodyDesc::new("floor", Handle::new(0, 0));
        assert!(desc.is_static());
        assert!(!desc.mass(2.0).is_static());
    }

    #[test]
    fn test_flags_reset_before_simulate() {
        let mut body = test_body();
        let mut player = CountingPlayer::default();
        body.on_contact(&mut player, &PhysicsMaterial::default(), Vec3::ZERO, 1.0, 1.0);
        assert!(body.has_collision() && body.has_impact() && body.has_slide());

        body.update_before_simulate(1.0 / 60.0);
        assert_eq!(body.flags(), ContactFlags::default());
    }

    #[test]
    fn test_scrape_sound_survives_short_gaps() {
        let mut body = test_body();
        let material = scraping_material();
        let mut player = CountingPlayer::default();

        body.on_contact(&mut player, &material, Vec3::ZERO, 0.0, 1.0);
        body.update_after_simulate(&mut player, &material, Vec3::ZERO, 0.0);
        assert!(body.scrape_sound_active());

        // Seven quiet steps keep the sound alive
        for _ in 0..(SCRAPE_GRACE_STEPS - 1) {
            body.update_before_simulate(1.0 / 60.0);
            body.update_after_simulate(&mut player, &material, Vec3::ZERO, 0.0);
        }
        assert!(body.scrape_sound_active());

        // Sliding again resets the window without a second entity
        body.update_before_simulate(1.0 / 60.0);
        body.on_contact(&mut player, &material, Vec3::ZERO, 0.0, 1.0);
        body.update_after_simulate(&mut player, &material, Vec3::ZERO, 0.0);
        assert_eq!(player.created.len(), 1);

        for _ in 0..SCRAPE_GRACE_STEPS {
            body.update_before_simulate(1.0 / 60.0);
            body.update_after_simulate(&mut player, &material, Vec3::ZERO, 0.0);
        }
        assert!(!body.scrape_sound_active());
        assert_eq!(player.faded_out.len(), 1);
    }

    #[test]
    fn test_deferred_disable_is_one_shot() {
        let mut body = test_body();
        let mut player = CountingPlayer::default();
        let material = PhysicsMaterial::default();

        body.disable_after_simulation();
        assert!(body.update_after_simulate(&mut player, &material, Vec3::ZERO, 0.0));
        assert!(!body.update_after_simulate(&mut player, &material, Vec3::ZERO, 0.0));
    }

    #[test]
    fn test_joint_membership() {
        let mut body = test_body();
        let joint: JointHandle = Handle::new(3, 0);
        body.attach_joint(joint);
        body.attach_joint(joint);
        assert_eq!(body.joints().len(), 1);
        body.detach_joint(joint);
        assert!(body.joints().is_empty());
    }
}
