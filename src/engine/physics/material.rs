// Surface materials: friction/restitution plus the sounds a surface makes

use super::PhysicsError;

/// Sound played while a value (speed) lies in a band
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedBandSound {
    /// Sound name handed to the audio subsystem; empty disables the effect
    pub sound: String,
    /// Below this speed the sound is silent
    pub min_speed: f32,
    /// At or above this speed the sound plays at full volume
    pub max_speed: f32,
}

impl SpeedBandSound {
    pub fn new(sound: &str, min_speed: f32, max_speed: f32) -> Self {
        Self {
            sound: sound.to_string(),
            min_speed,
            max_speed,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.sound.is_empty()
    }

    /// Volume in [0, 1] for `speed`, `None` below the band
    pub fn volume(&self, speed: f32) -> Option<f32> {
        if !self.is_enabled() || speed < self.min_speed {
            return None;
        }
        let range = self.max_speed - self.min_speed;
        if range <= f32::EPSILON {
            return Some(1.0);
        }
        Some(((speed - self.min_speed) / range).clamp(0.0, 1.0))
    }
}

/// Named physics material
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsMaterial {
    pub name: String,
    pub friction: f32,
    pub restitution: f32,
    /// Looping sound while sliding
    pub scrape: SpeedBandSound,
    /// Looping sound while rolling (angular speed band)
    pub roll: SpeedBandSound,
    /// One-shot sound on impact (normal speed band)
    pub impact: SpeedBandSound,
}

impl PhysicsMaterial {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn scrape_sound(mut self, sound: SpeedBandSound) -> Self {
        self.scrape = sound;
        self
    }

    pub fn roll_sound(mut self, sound: SpeedBandSound) -> Self {
        self.roll = sound;
        self
    }

    pub fn impact_sound(mut self, sound: SpeedBandSound) -> Self {
        self.impact = sound;
        self
    }

    /// Check the tunables are usable
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.friction < 0.0 || self.restitution < 0.0 {
            return Err(PhysicsError::InvalidConfig(format!(
                "material '{}' has negative friction or restitution",
                self.name
            )));
        }
        for band in [&self.scrape, &self.roll, &self.impact] {
            if band.is_enabled() && band.max_speed < band.min_speed {
                return Err(PhysicsError::InvalidConfig(format!(
                    "material '{}' sound '{}' has max speed below min speed",
                    self.name, band.sound
                )));
            }
        }
        Ok(())
    }
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            friction: 0.5,
            restitution: 0.0,
            scrape: SpeedBandSound::default(),
            roll: SpeedBandSound::default(),
            impact: SpeedBandSound::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_volume() {
        let band = SpeedBandSound::new("scrape", 1.0, 3.0);
        assert_eq!(band.volume(0.5), None);
        assert_relative_eq!(band.volume(2.0).unwrap(), 0.5);
        assert_relative_eq!(band.volume(10.0).unwrap(), 1.0);
    }

    #[test]
    fn test_disabled_band_is_silent() {
        let band = SpeedBandSound::default();
        assert_eq!(band.volume(100.0), None);
    }

    #[test]
    fn test_validate_rejects_inverted_band() {
        let material =
            PhysicsMaterial::new("metal").impact_sound(SpeedBandSound::new("clang", 5.0, 1.0));
        assert!(material.validate().is_err());
        assert!(PhysicsMaterial::new("wood").validate().is_ok());
    }
}
