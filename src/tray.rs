//! Sensor data tray: a concurrency-safe, time-versioned, quality-decayed
//! key/value store that every downstream component reads through.

use std::collections::BTreeMap;

use chrono::{Datelike, Timelike};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::config::TrayConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{time_of_day_bucket, ContextSnapshot};

#[derive(Debug, Clone)]
struct TrayEntry {
    value: String,
    base_quality: f64,
    source: String,
    insert_time_ms: i64,
}

/// Result of a single-key read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrayReadResult {
    pub value: Option<String>,
    pub quality: f64,
    pub fresh: bool,
    pub age_ms: i64,
}

/// Diagnostic row for one stored key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrayStatus {
    pub key: String,
    pub value: String,
    pub age_ms: i64,
    pub ttl_ms: i64,
    pub fresh: bool,
    pub effective_quality: f64,
    pub source: String,
}

#[derive(Default)]
struct TrayState {
    entries: BTreeMap<String, TrayEntry>,
    ttl_overrides: BTreeMap<String, i64>,
}

pub struct SensorDataTray {
    config: TrayConfig,
    clock: SharedClock,
    state: Mutex<TrayState>,
}

impl SensorDataTray {
    pub fn new(config: TrayConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(TrayState::default()),
        }
    }

    /// Upsert a value. Quality is clamped to [0, 1].
    pub fn put(&self, key: &str, value: &str, base_quality: f64, source: &str) {
        let entry = TrayEntry {
            value: value.to_string(),
            base_quality: base_quality.clamp(0.0, 1.0),
            source: source.to_string(),
            insert_time_ms: self.clock.now_ms(),
        };
        self.state.lock().entries.insert(key.to_string(), entry);
    }

    /// Read one key. A stale entry still exposes its value with quality 0 so
    /// callers can degrade gracefully.
    pub fn get(&self, key: &str) -> TrayReadResult {
        let state = self.state.lock();
        let Some(entry) = state.entries.get(key) else {
            return TrayReadResult {
                value: None,
                quality: 0.0,
                fresh: false,
                age_ms: 0,
            };
        };

        let age_ms = (self.clock.now_ms() - entry.insert_time_ms).max(0);
        let ttl_ms = self.ttl_for(&state, key);
        let fresh = age_ms <= ttl_ms;
        let quality = Self::effective_quality(entry.base_quality, age_ms, ttl_ms);

        TrayReadResult {
            value: Some(entry.value.clone()),
            quality,
            fresh,
            age_ms,
        }
    }

    /// Override the freshness window for a key.
    pub fn set_ttl(&self, key: &str, ttl_ms: i64) -> CoreResult<()> {
        if ttl_ms < 0 {
            return Err(CoreError::invalid(format!("negative ttl for {key}: {ttl_ms}")));
        }
        self.state.lock().ttl_overrides.insert(key.to_string(), ttl_ms);
        Ok(())
    }

    /// Assemble a context snapshot in one critical section. Required fields
    /// fall back to last-known values (stale included) or defaults; time
    /// fields always come from the clock; optionals appear only when fresh.
    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.state.lock();
        let now_ms = self.clock.now_ms();
        let local = self.clock.local_datetime(now_ms);

        let hour = local.hour();
        let weekday = local.weekday().num_days_from_sunday();
        let is_weekend = weekday == 0 || weekday == 6;

        let last_known = |key: &str, default: &str| -> String {
            state
                .entries
                .get(key)
                .map(|e| e.value.clone())
                .unwrap_or_else(|| default.to_string())
        };
        let fresh_only = |key: &str| -> Option<String> {
            state.entries.get(key).and_then(|e| {
                let age = (now_ms - e.insert_time_ms).max(0);
                (age <= self.ttl_for(&state, key)).then(|| e.value.clone())
            })
        };

        ContextSnapshot {
            time_of_day: time_of_day_bucket(hour).to_string(),
            hour: hour.to_string(),
            day_of_week: weekday.to_string(),
            is_weekend: is_weekend.to_string(),
            motion_state: last_known("motionState", "unknown"),
            battery_level: last_known("batteryLevel", "100"),
            is_charging: last_known("isCharging", "false"),
            network_type: last_known("networkType", "unknown"),
            geofence: fresh_only("geofence"),
            wifi_ssid: fresh_only("wifiSsid"),
            wifi_lost_work: fresh_only("wifiLostWork"),
            latitude: fresh_only("latitude"),
            longitude: fresh_only("longitude"),
            step_count: fresh_only("stepCount"),
        }
    }

    /// Diagnostic dump of every key, in key order.
    pub fn status(&self) -> Vec<TrayStatus> {
        let state = self.state.lock();
        let now_ms = self.clock.now_ms();

        state
            .entries
            .iter()
            .map(|(key, entry)| {
                let age_ms = (now_ms - entry.insert_time_ms).max(0);
                let ttl_ms = self.ttl_for(&state, key);
                TrayStatus {
                    key: key.clone(),
                    value: entry.value.clone(),
                    age_ms,
                    ttl_ms,
                    fresh: age_ms <= ttl_ms,
                    effective_quality: Self::effective_quality(entry.base_quality, age_ms, ttl_ms),
                    source: entry.source.clone(),
                }
            })
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn ttl_for(&self, state: &TrayState, key: &str) -> i64 {
        if let Some(ttl) = state.ttl_overrides.get(key) {
            return *ttl;
        }
        match key {
            "latitude" | "longitude" | "motionState" | "geofence" | "wifiSsid"
            | "wifiLostWork" | "stepCount" => self.config.volatile_ttl_ms,
            "batteryLevel" | "isCharging" | "networkType" => self.config.device_ttl_ms,
            "calendar" => self.config.stable_ttl_ms,
            _ => self.config.default_ttl_ms,
        }
    }

    fn effective_quality(base: f64, age_ms: i64, ttl_ms: i64) -> f64 {
        if ttl_ms <= 0 {
            return 0.0;
        }
        let decay = 1.0 - age_ms as f64 / ttl_ms as f64;
        base * decay.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    fn tray_at(now_ms: i64) -> (SensorDataTray, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now_ms));
        let tray = SensorDataTray::new(TrayConfig::default(), clock.clone());
        (tray, clock)
    }

    #[test]
    fn quality_decays_linearly_with_age() {
        let (tray, clock) = tray_at(0);
        tray.set_ttl("motionState", 1000).unwrap();
        tray.put("motionState", "walking", 1.0, "sensor");

        clock.set(200);
        let read = tray.get("motionState");
        assert_eq!(read.value.as_deref(), Some("walking"));
        assert!((read.quality - 0.8).abs() < 1e-9);
        assert!(read.fresh);
        assert_eq!(read.age_ms, 200);

        clock.set(1200);
        let read = tray.get("motionState");
        assert_eq!(read.value.as_deref(), Some("walking"));
        assert_eq!(read.quality, 0.0);
        assert!(!read.fresh);
        assert_eq!(read.age_ms, 1200);
    }

    #[test]
    fn missing_key_reads_empty() {
        let (tray, _) = tray_at(0);
        let read = tray.get("nope");
        assert_eq!(read.value, None);
        assert_eq!(read.quality, 0.0);
        assert!(!read.fresh);
    }

    #[test]
    fn put_overwrites_and_resets_age() {
        let (tray, clock) = tray_at(0);
        tray.put("batteryLevel", "80", 1.0, "device");
        clock.set(5_000);
        tray.put("batteryLevel", "75", 1.0, "device");
        let read = tray.get("batteryLevel");
        assert_eq!(read.value.as_deref(), Some("75"));
        assert_eq!(read.age_ms, 0);
    }

    #[test]
    fn base_quality_is_clamped() {
        let (tray, _) = tray_at(0);
        tray.put("wifiSsid", "office", 3.0, "wifi");
        assert!((tray.get("wifiSsid").quality - 1.0).abs() < 1e-9);
    }

    #[test]
    fn negative_ttl_rejected() {
        let (tray, _) = tray_at(0);
        assert!(tray.set_ttl("x", -1).is_err());
    }

    #[test]
    fn snapshot_uses_last_known_and_hides_stale_optionals() {
        // 2021-06-05 (Saturday) 22:30 UTC.
        let base_ms = 1_622_932_200_000;
        let (tray, clock) = tray_at(base_ms);
        tray.put("motionState", "walking", 1.0, "sensor");
        tray.put("geofence", "home", 1.0, "fusion");

        let snap = tray.snapshot();
        assert_eq!(snap.hour, "22");
        assert_eq!(snap.time_of_day, "night");
        assert_eq!(snap.is_weekend, "true");
        assert_eq!(snap.motion_state, "walking");
        assert_eq!(snap.battery_level, "100");
        assert_eq!(snap.geofence.as_deref(), Some("home"));

        // Past the volatile TTL the optional drops out but the required
        // field keeps its last-known value.
        clock.advance(TrayConfig::default().volatile_ttl_ms + 1);
        let snap = tray.snapshot();
        assert_eq!(snap.motion_state, "walking");
        assert_eq!(snap.geofence, None);
    }

    #[test]
    fn status_reports_every_key() {
        let (tray, _) = tray_at(0);
        tray.put("batteryLevel", "90", 0.9, "device");
        tray.put("motionState", "running", 1.0, "sensor");

        let status = tray.status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].key, "batteryLevel");
        assert_eq!(status[0].source, "device");
        assert!(status.iter().all(|s| s.fresh));

        tray.clear();
        assert_eq!(tray.size(), 0);
    }
}
