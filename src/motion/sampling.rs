//! Adaptive sampling governor: maps the confirmed motion state to sensor
//! duty cycles so drivers only reconfigure when the intervals actually move.

use parking_lot::Mutex;

use crate::config::{SamplingConfig, SensorIntervals};
use crate::types::MotionState;

pub struct SamplingGovernor {
    config: SamplingConfig,
    current: Mutex<SensorIntervals>,
}

impl SamplingGovernor {
    pub fn new(config: SamplingConfig) -> Self {
        let current = config.unknown;
        Self {
            config,
            current: Mutex::new(current),
        }
    }

    /// The interval row a state maps to. Transit shares the driving row.
    pub fn intervals_for_state(&self, state: MotionState) -> SensorIntervals {
        match state {
            MotionState::Stationary => self.config.stationary,
            MotionState::Walking => self.config.walking,
            MotionState::Running => self.config.running,
            MotionState::Driving | MotionState::Transit => self.config.driving,
            MotionState::Unknown => self.config.unknown,
        }
    }

    /// Adopt the intervals for `state`. Returns whether they changed, so
    /// callers reconfigure sensor drivers only on real transitions.
    pub fn update_for_state(&self, state: MotionState) -> bool {
        let next = self.intervals_for_state(state);
        let mut current = self.current.lock();
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    }

    pub fn current_intervals(&self) -> SensorIntervals {
        *self.current.lock()
    }

    /// The full configured table (the five configured rows).
    pub fn all_intervals(&self) -> SamplingConfig {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stationary_is_widest_driving_is_tightest() {
        let governor = SamplingGovernor::new(SamplingConfig::default());
        let stationary = governor.intervals_for_state(MotionState::Stationary);
        let driving = governor.intervals_for_state(MotionState::Driving);
        assert!(stationary.gps_interval_ms > driving.gps_interval_ms);
        assert_eq!(stationary.gps_interval_ms, 300_000);
        assert_eq!(driving.gps_interval_ms, 10_000);
    }

    #[test]
    fn transit_shares_driving_row() {
        let governor = SamplingGovernor::new(SamplingConfig::default());
        assert_eq!(
            governor.intervals_for_state(MotionState::Transit),
            governor.intervals_for_state(MotionState::Driving)
        );
    }

    #[test]
    fn update_reports_change_only_once() {
        let governor = SamplingGovernor::new(SamplingConfig::default());
        assert!(governor.update_for_state(MotionState::Walking));
        assert!(!governor.update_for_state(MotionState::Walking));
        assert_eq!(
            governor.current_intervals(),
            governor.intervals_for_state(MotionState::Walking)
        );
        assert!(governor.update_for_state(MotionState::Stationary));
    }

    #[test]
    fn starts_on_unknown_row() {
        let governor = SamplingGovernor::new(SamplingConfig::default());
        assert_eq!(
            governor.current_intervals(),
            governor.intervals_for_state(MotionState::Unknown)
        );
        assert!(!governor.update_for_state(MotionState::Unknown));
    }
}
