// Smoothed transform outputs a character feeds to a camera or a visual entity

use glam::Vec3;
use std::collections::VecDeque;

/// Position output averaged over the last `window` recorded positions
#[derive(Debug, Clone)]
pub struct SmoothedOutput {
    /// Added to the character position before smoothing
    pub offset: Vec3,
    window: usize,
    history: VecDeque<Vec3>,
    value: Vec3,
}

impl SmoothedOutput {
    /// A window of 1 disables smoothing
    pub fn new(offset: Vec3, window: usize) -> Self {
        let window = window.max(1);
        Self {
            offset,
            window,
            history: VecDeque::with_capacity(window),
            value: Vec3::ZERO,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn value(&self) -> Vec3 {
        self.value
    }

    /// Record a character position and return the smoothed output
    pub fn record(&mut self, position: Vec3) -> Vec3 {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(position + self.offset);
        let sum: Vec3 = self.history.iter().copied().sum();
        self.value = sum / self.history.len() as f32;
        self.value
    }

    /// Drop the history so the output snaps to `position`
    pub fn reset(&mut self, position: Vec3) {
        self.history.clear();
        self.record(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_window_average() {
        let mut output = SmoothedOutput::new(Vec3::ZERO, 3);
        output.record(Vec3::ZERO);
        output.record(Vec3::X * 3.0);
        let value = output.record(Vec3::X * 6.0);
        assert_relative_eq!(value.x, 3.0);

        // Oldest sample leaves the window
        let value = output.record(Vec3::X * 9.0);
        assert_relative_eq!(value.x, 6.0);
    }

    #[test]
    fn test_offset_and_reset() {
        let mut output = SmoothedOutput::new(Vec3::Y, 4);
        output.record(Vec3::ZERO);
        output.reset(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(output.value(), Vec3::new(10.0, 1.0, 0.0));
    }
}
