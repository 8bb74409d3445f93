//! Multi-source location fusion: GPS distance plus learned WiFi/Bluetooth
//! signatures produce a calibrated in-place confidence per geofence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;

/// Signals accumulated for one geofence while GPS-confirmed inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedSignals {
    /// SSID → observation count.
    pub wifi_ssids: BTreeMap<String, i32>,
    /// Bluetooth device → observation count.
    pub bt_devices: BTreeMap<String, i32>,
    pub total_observations: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionResult {
    pub geofence_id: String,
    pub confidence: f64,
    pub gps_confidence: f64,
    pub wifi_confidence: f64,
    pub bt_confidence: f64,
    /// The dominant signal: "wifi" | "bt" | "gps" (ties break in that order).
    pub source: String,
}

pub struct LocationFusion {
    config: FusionConfig,
}

impl LocationFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn calculate_confidence(
        &self,
        geofence_id: &str,
        distance: f64,
        gps_accuracy: f64,
        current_wifi_ssid: &str,
        current_bt_devices: &[String],
        signals: &LearnedSignals,
    ) -> FusionResult {
        let gps_confidence = self.gps_confidence(distance);
        let wifi_confidence = self.wifi_confidence(current_wifi_ssid, signals);
        let bt_confidence = self.bt_confidence(current_bt_devices, signals);

        let mut confidence = gps_confidence.max(wifi_confidence).max(bt_confidence);

        // Poor GPS fixes defer to a strong learned signal.
        let gps_low_quality = gps_accuracy > self.config.low_quality_gps_accuracy;
        if gps_low_quality && (wifi_confidence > 0.5 || bt_confidence > 0.5) {
            let non_gps_max = wifi_confidence.max(bt_confidence);
            confidence = confidence.max((non_gps_max + 0.05).min(1.0));
        }

        let source = if wifi_confidence >= gps_confidence && wifi_confidence >= bt_confidence {
            "wifi"
        } else if bt_confidence >= gps_confidence && bt_confidence >= wifi_confidence {
            "bt"
        } else {
            "gps"
        };

        FusionResult {
            geofence_id: geofence_id.to_string(),
            confidence,
            gps_confidence,
            wifi_confidence,
            bt_confidence,
            source: source.to_string(),
        }
    }

    /// One result per (geofence id, distance) pair, in input order.
    pub fn calculate_all_confidences(
        &self,
        geofence_distances: &[(String, f64)],
        gps_accuracy: f64,
        current_wifi_ssid: &str,
        current_bt_devices: &[String],
        all_signals: &BTreeMap<String, LearnedSignals>,
    ) -> Vec<FusionResult> {
        let empty = LearnedSignals::default();
        geofence_distances
            .iter()
            .map(|(id, distance)| {
                let signals = all_signals.get(id).unwrap_or(&empty);
                self.calculate_confidence(
                    id,
                    *distance,
                    gps_accuracy,
                    current_wifi_ssid,
                    current_bt_devices,
                    signals,
                )
            })
            .collect()
    }

    /// The learning gate: only high-accuracy, externally verified in-place
    /// fixes may feed `learn_signal`.
    pub fn can_learn(&self, gps_accuracy: f64, verified_in_place: bool) -> bool {
        verified_in_place && gps_accuracy <= self.config.learning_gps_accuracy_threshold
    }

    pub fn learn_signal(
        signals: &mut LearnedSignals,
        wifi_ssid: &str,
        bt_devices: &[String],
    ) {
        if !wifi_ssid.is_empty() {
            *signals.wifi_ssids.entry(wifi_ssid.to_string()).or_insert(0) += 1;
        }
        for device in bt_devices {
            if !device.is_empty() {
                *signals.bt_devices.entry(device.clone()).or_insert(0) += 1;
            }
        }
        signals.total_observations += 1;
    }

    fn gps_confidence(&self, distance: f64) -> f64 {
        if distance < self.config.gps_high_confidence_radius {
            return 1.0;
        }
        if distance < self.config.gps_decay_scale * 3.0 {
            return (-distance / self.config.gps_decay_scale)
                .exp()
                .max(self.config.gps_min_confidence);
        }
        self.config.gps_min_confidence
    }

    fn wifi_confidence(&self, current_ssid: &str, signals: &LearnedSignals) -> f64 {
        if current_ssid.is_empty() {
            return 0.0;
        }
        if signals.total_observations < self.config.learning_min_observations {
            return 0.0;
        }

        if signals
            .wifi_ssids
            .get(current_ssid)
            .is_some_and(|&count| count >= self.config.learning_min_observations)
        {
            return self.config.wifi_match_confidence;
        }

        // Learned WiFi exists here but the current network is not it.
        if !signals.wifi_ssids.is_empty() {
            return self.config.wifi_no_match_confidence;
        }
        0.0
    }

    fn bt_confidence(&self, current_devices: &[String], signals: &LearnedSignals) -> f64 {
        if current_devices.is_empty() {
            return 0.0;
        }
        if signals.total_observations < self.config.learning_min_observations {
            return 0.0;
        }

        let matched = current_devices.iter().any(|device| {
            signals
                .bt_devices
                .get(device)
                .is_some_and(|&count| count >= self.config.learning_min_observations)
        });
        if matched {
            self.config.bt_match_confidence
        } else {
            0.0
        }
    }
}
