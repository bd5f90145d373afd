use crate::types::MotionState;

/// Binary motion gate over the latest accel and gyro magnitudes.
/// No hysteresis and no history: the state is a pure function of the
/// two most recent readings and flips as soon as they do.
#[derive(Clone, Copy, Debug)]
pub struct MotionDetector {
    threshold: f64,
}

impl MotionDetector {
    pub fn new(threshold: f64) -> Self {
        MotionDetector { threshold }
    }

    /// Moving iff either magnitude strictly exceeds the threshold.
    /// Sitting exactly on the threshold still counts as stationary.
    pub fn classify(&self, accel: f64, gyro: f64) -> MotionState {
        if accel > self.threshold || gyro > self.threshold {
            MotionState::Moving
        } else {
            MotionState::Stationary
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        MotionDetector::new(0.5)
    }
}
