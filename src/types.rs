#![allow(dead_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flat key→value view of the current context, consumed by the rule engine
/// and the bandit feature builder.
pub type ContextMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Stationary,
    Walking,
    Running,
    Driving,
    Transit,
    Unknown,
}

impl Default for MotionState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl MotionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stationary => "stationary",
            Self::Walking => "walking",
            Self::Running => "running",
            Self::Driving => "driving",
            Self::Transit => "transit",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "stationary" => Self::Stationary,
            "walking" => Self::Walking,
            "running" => Self::Running,
            "driving" => Self::Driving,
            "transit" => Self::Transit,
            _ => Self::Unknown,
        }
    }

    pub fn as_code(&self) -> i32 {
        match self {
            Self::Stationary => 0,
            Self::Walking => 1,
            Self::Running => 2,
            Self::Driving => 3,
            Self::Transit => 4,
            Self::Unknown => 5,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Stationary,
            1 => Self::Walking,
            2 => Self::Running,
            3 => Self::Driving,
            4 => Self::Transit,
            _ => Self::Unknown,
        }
    }
}

/// User feedback on a fired rule. Codes are part of the host contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Useful,
    Inaccurate,
    Dismiss,
    Adjust,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Useful => "useful",
            Self::Inaccurate => "inaccurate",
            Self::Dismiss => "dismiss",
            Self::Adjust => "adjust",
        }
    }

    pub fn as_code(&self) -> i32 {
        match self {
            Self::Useful => 0,
            Self::Inaccurate => 1,
            Self::Dismiss => 2,
            Self::Adjust => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Useful),
            1 => Some(Self::Inaccurate),
            2 => Some(Self::Dismiss),
            3 => Some(Self::Adjust),
            _ => None,
        }
    }
}

/// A single GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
    pub accuracy: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy,
        }
    }
}

/// A labeled place: center plus radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub category: String,
}

/// One accelerometer sample.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: i64,
}

/// Point-in-time projection of the data tray. Required fields always carry a
/// value (last-known or default); optionals are present iff a fresh entry
/// exists. Values stay stringly-typed, mirroring what the sensor drivers
/// push into the tray.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub time_of_day: String,
    pub hour: String,
    pub day_of_week: String,
    pub is_weekend: String,
    pub motion_state: String,
    pub battery_level: String,
    pub is_charging: String,
    pub network_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geofence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_lost_work: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_count: Option<String>,
}

impl ContextSnapshot {
    /// Flatten into the key→value map the rule engine and bandit consume.
    pub fn to_map(&self) -> ContextMap {
        let mut map = ContextMap::new();
        map.insert("timeOfDay".into(), self.time_of_day.clone());
        map.insert("hour".into(), self.hour.clone());
        map.insert("dayOfWeek".into(), self.day_of_week.clone());
        map.insert("isWeekend".into(), self.is_weekend.clone());
        map.insert("motionState".into(), self.motion_state.clone());
        map.insert("batteryLevel".into(), self.battery_level.clone());
        map.insert("isCharging".into(), self.is_charging.clone());
        map.insert("networkType".into(), self.network_type.clone());

        let optionals = [
            ("geofence", &self.geofence),
            ("wifiSsid", &self.wifi_ssid),
            ("wifiLostWork", &self.wifi_lost_work),
            ("latitude", &self.latitude),
            ("longitude", &self.longitude),
            ("stepCount", &self.step_count),
        ];
        for (key, value) in optionals {
            if let Some(v) = value {
                map.insert(key.into(), v.clone());
            }
        }
        map
    }
}

/// Time-of-day bucket used in snapshots and training records.
pub fn time_of_day_bucket(hour: u32) -> &'static str {
    match hour {
        6..=11 => "morning",
        12..=17 => "afternoon",
        18..=21 => "evening",
        _ => "night",
    }
}
