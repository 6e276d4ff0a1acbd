/// Fixed timestep driver for the physics world
///
/// Frame time is banked and paid out in whole physics steps, so the world
/// always advances by the same `dt` however uneven the caller's frames are.
use std::time::Duration;

/// Physics step rate (60 steps per second)
pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0;
const STEP: Duration = Duration::from_micros(16_667);

/// Steps handed out for one frame at most; older backlog is dropped
const MAX_STEPS_PER_FRAME: u32 = 5;

pub struct GameLoop {
    /// Frame time not yet paid out as a step
    banked: Duration,
    steps_taken: u64,
}

impl GameLoop {
    pub fn new() -> Self {
        Self {
            banked: Duration::ZERO,
            steps_taken: 0,
        }
    }

    /// Bank one frame's duration and return how many physics steps to run
    pub fn advance(&mut self, frame_time: Duration) -> u32 {
        self.banked += frame_time;

        let mut steps = 0;
        while self.banked >= STEP && steps < MAX_STEPS_PER_FRAME {
            self.banked -= STEP;
            steps += 1;
        }
        if self.banked >= STEP {
            log::debug!("Physics fell behind, dropping {:?}", self.banked);
            self.banked = Duration::ZERO;
        }

        self.steps_taken += u64::from(steps);
        steps
    }

    pub fn fixed_timestep(&self) -> f32 {
        FIXED_TIMESTEP
    }

    /// Simulated time in seconds
    pub fn simulated_secs(&self) -> f32 {
        self.steps_taken as f32 * FIXED_TIMESTEP
    }

    pub fn update_count(&self) -> u64 {
        self.steps_taken
    }
}

impl Default for GameLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_frames_carry_over() {
        let mut game_loop = GameLoop::new();
        assert_eq!(game_loop.advance(Duration::from_millis(10)), 0);
        assert_eq!(game_loop.advance(Duration::from_millis(10)), 1);
        assert_eq!(game_loop.update_count(), 1);
    }

    #[test]
    fn test_long_frame_is_capped_and_backlog_dropped() {
        let mut game_loop = GameLoop::new();
        // 300ms would be 18 steps
        assert_eq!(game_loop.advance(Duration::from_millis(300)), MAX_STEPS_PER_FRAME);
        // Nothing left over for the next short frame
        assert_eq!(game_loop.advance(Duration::from_millis(1)), 0);
    }

    #[test]
    fn test_simulated_time_tracks_steps() {
        let mut game_loop = GameLoop::new();
        for _ in 0..60 {
            game_loop.advance(STEP);
        }
        assert_eq!(game_loop.update_count(), 60);
        assert!((game_loop.simulated_secs() - 1.0).abs() < 1e-4);
        assert!((game_loop.fixed_timestep() - 1.0 / 60.0).abs() < 1e-6);
    }
}
