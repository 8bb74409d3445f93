//! Fused accelerometer/GPS motion classifier with transition hysteresis.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::MotionConfig;
use crate::types::{AccelSample, MotionState};

const GRAVITY: f64 = 9.81;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionResult {
    pub state: MotionState,
    pub magnitude: f64,
    pub gps_speed: f64,
    pub confidence: f64,
    pub state_changed: bool,
}

#[derive(Debug)]
struct DetectorState {
    reported: MotionState,
    candidate: MotionState,
    streak: u32,
}

impl Default for DetectorState {
    fn default() -> Self {
        Self {
            reported: MotionState::Unknown,
            candidate: MotionState::Unknown,
            streak: 0,
        }
    }
}

pub struct MotionDetector {
    config: MotionConfig,
    state: Mutex<DetectorState>,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DetectorState::default()),
        }
    }

    /// Classify one fused sample. The reported state only moves after
    /// `hysteresis_samples` consecutive identical classifications;
    /// `state_changed` flags the confirming sample.
    pub fn detect(&self, accel: AccelSample, gps_speed: f64) -> MotionResult {
        let magnitude =
            ((accel.x * accel.x + accel.y * accel.y + accel.z * accel.z).sqrt() - GRAVITY).abs();
        let raw = self.classify(magnitude, gps_speed);

        let mut state = self.state.lock();
        if raw == state.candidate {
            state.streak = state.streak.saturating_add(1);
        } else {
            state.candidate = raw;
            state.streak = 1;
        }

        let mut state_changed = false;
        if raw != state.reported && state.streak >= self.config.hysteresis_samples {
            state.reported = raw;
            state_changed = true;
        }

        let confidence =
            (state.streak as f64 / self.config.hysteresis_samples as f64).min(1.0);

        MotionResult {
            state: state.reported,
            magnitude,
            gps_speed,
            confidence,
            state_changed,
        }
    }

    pub fn last_state(&self) -> MotionState {
        self.state.lock().reported
    }

    pub fn reset(&self) {
        *self.state.lock() = DetectorState::default();
    }

    fn classify(&self, magnitude: f64, speed: f64) -> MotionState {
        let c = &self.config;
        if magnitude < c.stationary_magnitude_max && speed < c.stationary_speed_max {
            MotionState::Stationary
        } else if speed >= c.driving_speed_min {
            MotionState::Driving
        } else if speed > c.running_speed_max {
            // Faster than a run but below driving speed: vehicle crawl.
            MotionState::Transit
        } else if speed > c.walking_speed_max {
            MotionState::Running
        } else if magnitude >= c.walking_magnitude_min || speed >= c.stationary_speed_max {
            MotionState::Walking
        } else {
            MotionState::Unknown
        }
    }
}
