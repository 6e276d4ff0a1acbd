// Audio seam: the physics layer only starts, updates and fades named sound entities

use glam::Vec3;

/// Identifier of a live sound entity owned by the audio subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundEntityId(pub u64);

/// Narrow interface to the audio subsystem.
///
/// Mixing, streaming and resource loading live on the other side of this trait.
pub trait SoundPlayer {
    /// Create a sound entity playing `sound`. `None` if the sound could not be started.
    fn create_sound_entity(
        &mut self,
        name: &str,
        sound: &str,
        auto_remove: bool,
    ) -> Option<SoundEntityId>;

    fn set_position(&mut self, id: SoundEntityId, position: Vec3);

    fn set_volume(&mut self, id: SoundEntityId, volume: f32);

    /// Playback speed (frequency multiplier)
    fn set_speed(&mut self, id: SoundEntityId, speed: f32);

    fn fade_in(&mut self, id: SoundEntityId, speed: f32);

    /// Fade out and release the entity once silent
    fn fade_out(&mut self, id: SoundEntityId, speed: f32);

    fn is_playing(&self, id: SoundEntityId) -> bool;
}

/// Sound player that plays nothing
#[derive(Debug, Default)]
pub struct NullSoundPlayer;

impl SoundPlayer for NullSoundPlayer {
    fn create_sound_entity(&mut self, _: &str, _: &str, _: bool) -> Option<SoundEntityId> {
        None
    }

    fn set_position(&mut self, _: SoundEntityId, _: Vec3) {}

    fn set_volume(&mut self, _: SoundEntityId, _: f32) {}

    fn set_speed(&mut self, _: SoundEntityId, _: f32) {}

    fn fade_in(&mut self, _: SoundEntityId, _: f32) {}

    fn fade_out(&mut self, _: SoundEntityId, _: f32) {}

    fn is_playing(&self, _: SoundEntityId) -> bool {
        false
    }
}

/// One-shot sound at a position with a volume; skipped when `sound` is empty
pub(crate) fn play_one_shot(
    player: &mut dyn SoundPlayer,
    name: &str,
    sound: &str,
    position: Vec3,
    volume: f32,
) -> Option<SoundEntityId> {
    if sound.is_empty() {
        return None;
    }
    let id = player.create_sound_entity(name, sound, true)?;
    player.set_position(id, position);
    player.set_volume(id, volume);
    Some(id)
}

/// Looping sound driven by a speed band, shared by joint move sounds and body roll sounds
#[derive(Debug, Clone, Default)]
pub(crate) struct LoopingSound {
    entity: Option<SoundEntityId>,
}

impl LoopingSound {
    pub fn entity(&self) -> Option<SoundEntityId> {
        self.entity
    }

    pub fn is_running(&self) -> bool {
        self.entity.is_some()
    }

    /// Start the loop if it is not running yet
    pub fn start(
        &mut self,
        player: &mut dyn SoundPlayer,
        name: &str,
        sound: &str,
        fade_in_speed: f32,
    ) -> Option<SoundEntityId> {
        if self.entity.is_none() && !sound.is_empty() {
            self.entity = player.create_sound_entity(name, sound, false);
            if let Some(id) = self.entity {
                player.fade_in(id, fade_in_speed);
            }
        }
        self.entity
    }

    pub fn update(&self, player: &mut dyn SoundPlayer, position: Vec3, volume: f32, speed: f32) {
        if let Some(id) = self.entity {
            player.set_position(id, position);
            player.set_volume(id, volume);
            player.set_speed(id, speed);
        }
    }

    /// Fade out and forget the entity
    pub fn stop(&mut self, player: &mut dyn SoundPlayer, fade_speed: f32) {
        if let Some(id) = self.entity.take() {
            player.fade_out(id, fade_speed);
        }
    }
}
