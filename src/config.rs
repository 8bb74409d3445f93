use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrayConfig {
    /// TTL for volatile keys (location, motion, wifi).
    pub volatile_ttl_ms: i64,
    /// TTL for device-state keys (battery, charging, network).
    pub device_ttl_ms: i64,
    /// TTL for stable keys (calendar).
    pub stable_ttl_ms: i64,
    /// TTL for keys outside the known tables.
    pub default_ttl_ms: i64,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            volatile_ttl_ms: 120_000,
            device_ttl_ms: 600_000,
            stable_ttl_ms: 3_600_000,
            default_ttl_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    pub stationary_magnitude_max: f64,
    pub stationary_speed_max: f64,
    /// Upper GPS speed (m/s) still considered walking.
    pub walking_speed_max: f64,
    /// Upper GPS speed still considered running; above this but below
    /// driving reads as transit.
    pub running_speed_max: f64,
    pub driving_speed_min: f64,
    pub walking_magnitude_min: f64,
    /// Consecutive identical classifications required before the reported
    /// state changes.
    pub hysteresis_samples: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            stationary_magnitude_max: 0.5,
            stationary_speed_max: 0.3,
            walking_speed_max: 2.0,
            running_speed_max: 5.0,
            driving_speed_min: 8.0,
            walking_magnitude_min: 0.8,
            hysteresis_samples: 3,
        }
    }
}

/// Duty-cycle intervals for one motion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorIntervals {
    pub gps_interval_ms: i64,
    pub wifi_interval_ms: i64,
    pub accel_interval_ns: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub stationary: SensorIntervals,
    pub walking: SensorIntervals,
    pub running: SensorIntervals,
    pub driving: SensorIntervals,
    pub unknown: SensorIntervals,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            stationary: SensorIntervals {
                gps_interval_ms: 300_000,
                wifi_interval_ms: 300_000,
                accel_interval_ns: 200_000_000,
            },
            walking: SensorIntervals {
                gps_interval_ms: 30_000,
                wifi_interval_ms: 60_000,
                accel_interval_ns: 100_000_000,
            },
            running: SensorIntervals {
                gps_interval_ms: 15_000,
                wifi_interval_ms: 30_000,
                accel_interval_ns: 50_000_000,
            },
            driving: SensorIntervals {
                gps_interval_ms: 10_000,
                wifi_interval_ms: 20_000,
                accel_interval_ns: 100_000_000,
            },
            unknown: SensorIntervals {
                gps_interval_ms: 60_000,
                wifi_interval_ms: 120_000,
                accel_interval_ns: 200_000_000,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub epsilon_meters: f64,
    pub min_samples: usize,
    /// Consecutive fixes closer than this are counted as one stay.
    pub max_stay_gap_ms: i64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            epsilon_meters: 50.0,
            min_samples: 10,
            max_stay_gap_ms: 3_600_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub gps_high_confidence_radius: f64,
    pub gps_decay_scale: f64,
    pub gps_min_confidence: f64,
    pub wifi_match_confidence: f64,
    pub wifi_no_match_confidence: f64,
    pub bt_match_confidence: f64,
    pub learning_min_observations: i32,
    pub learning_gps_accuracy_threshold: f64,
    /// GPS accuracy above this lets a strong non-GPS source boost the fused
    /// confidence.
    pub low_quality_gps_accuracy: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gps_high_confidence_radius: 50.0,
            gps_decay_scale: 200.0,
            gps_min_confidence: 0.05,
            wifi_match_confidence: 0.95,
            wifi_no_match_confidence: 0.1,
            bt_match_confidence: 0.8,
            learning_min_observations: 3,
            learning_gps_accuracy_threshold: 30.0,
            low_quality_gps_accuracy: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Rule sets at or below this size become leaves.
    pub max_leaf_rules: usize,
    /// Maximum number of split keys on any root-to-leaf path.
    pub max_split_depth: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_leaf_rules: 2,
            max_split_depth: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    pub alpha: f64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepConfig {
    /// A stationary run at least this long reads as a sleep episode.
    pub min_sleep_duration_ms: i64,
    /// How much motion history is kept for inference.
    pub history_window_ms: i64,
    /// Motion snapshots required before inference starts.
    pub min_history_samples: usize,
    /// Records needed for full confidence.
    pub confidence_days: f64,
    pub default_bedtime_hour: f64,
    pub reminder_lead_hours: f64,
    /// Below this confidence the default bedtime is used.
    pub min_pattern_confidence: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            min_sleep_duration_ms: 4 * 60 * 60 * 1000,
            history_window_ms: 24 * 60 * 60 * 1000,
            min_history_samples: 10,
            confidence_days: 7.0,
            default_bedtime_hour: 22.0,
            reminder_lead_hours: 1.0,
            min_pattern_confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub max_records: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self { max_records: 200 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    pub tray: TrayConfig,
    pub motion: MotionConfig,
    pub sampling: SamplingConfig,
    pub cluster: ClusterConfig,
    pub fusion: FusionConfig,
    pub tree: TreeConfig,
    pub bandit: BanditConfig,
    pub sleep: SleepConfig,
    pub training: TrainingConfig,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CONTEXT_BANDIT_ALPHA") {
            if let Ok(alpha) = val.parse::<f64>() {
                config.bandit.alpha = alpha;
            }
        }
        if let Ok(val) = std::env::var("CONTEXT_MAX_TRAINING_RECORDS") {
            if let Ok(max) = val.parse::<usize>() {
                config.training.max_records = max;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_duty_cycle_ordering() {
        let sampling = SamplingConfig::default();
        assert!(sampling.stationary.gps_interval_ms > sampling.walking.gps_interval_ms);
        assert!(sampling.walking.gps_interval_ms > sampling.running.gps_interval_ms);
        assert!(sampling.running.gps_interval_ms > sampling.driving.gps_interval_ms);
    }

    #[test]
    fn config_survives_json_round_trip() {
        let config = CoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cluster.min_samples, config.cluster.min_samples);
        assert_eq!(back.bandit.alpha, config.bandit.alpha);
    }
}
