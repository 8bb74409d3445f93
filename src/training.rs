//! Training data sync buffer: a bounded, synced-flagged record log that
//! collects rule matches, feedback, state transitions and geofence features
//! for an external upload collaborator.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::SharedClock;
use crate::config::TrainingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingDataType {
    RuleMatch,
    UserFeedback,
    StateTransition,
    GeofenceFeature,
}

// Persisted as the stable integer code, not the variant name.
impl Serialize for TrainingDataType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_code())
    }
}

impl<'de> Deserialize<'de> for TrainingDataType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        Ok(Self::from_code(code))
    }
}

impl TrainingDataType {
    pub fn as_code(&self) -> i32 {
        match self {
            Self::RuleMatch => 0,
            Self::UserFeedback => 1,
            Self::StateTransition => 2,
            Self::GeofenceFeature => 3,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::UserFeedback,
            2 => Self::StateTransition,
            3 => Self::GeofenceFeature,
            _ => Self::RuleMatch,
        }
    }

    /// Wire name used in the pending export.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::RuleMatch => "rule_match",
            Self::UserFeedback => "user_feedback",
            Self::StateTransition => "state_transition",
            Self::GeofenceFeature => "geofence_feature",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: TrainingDataType,
    pub timestamp: i64,
    pub synced: bool,
    pub string_data: BTreeMap<String, String>,
    pub numeric_data: BTreeMap<String, f64>,
    pub bool_data: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatchData {
    pub rule_id: String,
    pub action: String,
    pub confidence: f64,
    pub time_of_day: String,
    pub hour: i32,
    pub motion_state: String,
    pub prev_motion_state: String,
    pub prev_activity_state: String,
    pub activity_duration: i64,
    pub geofence: String,
    pub wifi_ssid: String,
    pub battery_level: i32,
    pub is_charging: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFeedbackData {
    pub rule_id: String,
    pub feedback_type: String,
    pub original_value: String,
    pub adjusted_value: String,
    pub time_of_day: String,
    pub hour: i32,
    pub motion_state: String,
    pub prev_activity_state: String,
    pub activity_duration: i64,
    pub geofence: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransitionData {
    pub prev_state: String,
    pub new_state: String,
    pub duration: i64,
    pub time_of_day: String,
    pub hour: i32,
    pub geofence: String,
    pub wifi_ssid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceFeatureData {
    pub geofence_id: String,
    pub geofence_name: String,
    pub wifi_ssid: String,
    pub time_of_day: String,
    pub hour: i32,
    pub duration: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub pending_count: i32,
    pub synced_count: i32,
    pub last_sync_time: i64,
    pub total_records: i64,
}

struct BufferState {
    device_id: String,
    records: Vec<TrainingRecord>,
    last_sync_time: i64,
    max_records: usize,
    seq: u64,
}

pub struct TrainingDataBuffer {
    clock: SharedClock,
    state: Mutex<BufferState>,
}

impl TrainingDataBuffer {
    pub fn new(config: TrainingConfig, clock: SharedClock) -> Self {
        Self {
            clock,
            state: Mutex::new(BufferState {
                device_id: String::new(),
                records: Vec::new(),
                last_sync_time: 0,
                max_records: config.max_records,
                seq: 0,
            }),
        }
    }

    pub fn init(&self, device_id: &str) {
        self.state.lock().device_id = device_id.to_string();
    }

    pub fn device_id(&self) -> String {
        self.state.lock().device_id.clone()
    }

    pub fn record_rule_match(&self, data: &RuleMatchData) {
        let mut string_data = BTreeMap::new();
        string_data.insert("ruleId".into(), data.rule_id.clone());
        string_data.insert("action".into(), data.action.clone());
        string_data.insert("timeOfDay".into(), data.time_of_day.clone());
        string_data.insert("motionState".into(), data.motion_state.clone());
        string_data.insert("prevMotionState".into(), data.prev_motion_state.clone());
        string_data.insert("prevActivityState".into(), data.prev_activity_state.clone());
        string_data.insert("geofence".into(), data.geofence.clone());
        string_data.insert("wifiSsid".into(), data.wifi_ssid.clone());

        let mut numeric_data = BTreeMap::new();
        numeric_data.insert("confidence".into(), data.confidence);
        numeric_data.insert("hour".into(), data.hour as f64);
        numeric_data.insert("activityDuration".into(), data.activity_duration as f64);
        numeric_data.insert("batteryLevel".into(), data.battery_level as f64);

        let mut bool_data = BTreeMap::new();
        bool_data.insert("isCharging".into(), data.is_charging);

        self.push_record(
            "rm",
            TrainingDataType::RuleMatch,
            string_data,
            numeric_data,
            bool_data,
        );
    }

    pub fn record_feedback(&self, data: &UserFeedbackData) {
        let mut string_data = BTreeMap::new();
        string_data.insert("ruleId".into(), data.rule_id.clone());
        string_data.insert("feedbackType".into(), data.feedback_type.clone());
        string_data.insert("originalValue".into(), data.original_value.clone());
        string_data.insert("adjustedValue".into(), data.adjusted_value.clone());
        string_data.insert("timeOfDay".into(), data.time_of_day.clone());
        string_data.insert("motionState".into(), data.motion_state.clone());
        string_data.insert("prevActivityState".into(), data.prev_activity_state.clone());
        string_data.insert("geofence".into(), data.geofence.clone());

        let mut numeric_data = BTreeMap::new();
        numeric_data.insert("hour".into(), data.hour as f64);
        numeric_data.insert("activityDuration".into(), data.activity_duration as f64);

        self.push_record(
            "fb",
            TrainingDataType::UserFeedback,
            string_data,
            numeric_data,
            BTreeMap::new(),
        );
    }

    pub fn record_state_transition(&self, data: &StateTransitionData) {
        let mut string_data = BTreeMap::new();
        string_data.insert("prevState".into(), data.prev_state.clone());
        string_data.insert("newState".into(), data.new_state.clone());
        string_data.insert("timeOfDay".into(), data.time_of_day.clone());
        string_data.insert("geofence".into(), data.geofence.clone());
        string_data.insert("wifiSsid".into(), data.wifi_ssid.clone());

        let mut numeric_data = BTreeMap::new();
        numeric_data.insert("duration".into(), data.duration as f64);
        numeric_data.insert("hour".into(), data.hour as f64);

        self.push_record(
            "st",
            TrainingDataType::StateTransition,
            string_data,
            numeric_data,
            BTreeMap::new(),
        );
    }

    pub fn record_geofence_feature(&self, data: &GeofenceFeatureData) {
        let mut string_data = BTreeMap::new();
        string_data.insert("geofenceId".into(), data.geofence_id.clone());
        string_data.insert("geofenceName".into(), data.geofence_name.clone());
        string_data.insert("wifiSsid".into(), data.wifi_ssid.clone());
        string_data.insert("timeOfDay".into(), data.time_of_day.clone());

        let mut numeric_data = BTreeMap::new();
        numeric_data.insert("hour".into(), data.hour as f64);
        numeric_data.insert("duration".into(), data.duration as f64);

        self.push_record(
            "gf",
            TrainingDataType::GeofenceFeature,
            string_data,
            numeric_data,
            BTreeMap::new(),
        );
    }

    /// `{deviceId, timestamp, records:[{id, type:<wire name>, timestamp,
    /// data:{…all fields flattened…}}]}` — unsynced records only.
    pub fn export_pending_as_json(&self) -> String {
        let state = self.state.lock();

        let records: Vec<Value> = state
            .records
            .iter()
            .filter(|r| !r.synced)
            .map(|r| {
                let mut data = serde_json::Map::new();
                for (k, v) in &r.string_data {
                    data.insert(k.clone(), Value::String(v.clone()));
                }
                for (k, v) in &r.numeric_data {
                    data.insert(k.clone(), json!(v));
                }
                for (k, v) in &r.bool_data {
                    data.insert(k.clone(), Value::Bool(*v));
                }
                json!({
                    "id": r.id,
                    "type": r.record_type.wire_name(),
                    "timestamp": r.timestamp,
                    "data": data,
                })
            })
            .collect();

        json!({
            "deviceId": state.device_id,
            "timestamp": self.clock.now_ms(),
            "records": records,
        })
        .to_string()
    }

    pub fn mark_as_synced(&self, ids: &[String]) {
        let mut state = self.state.lock();
        for record in state.records.iter_mut() {
            if ids.contains(&record.id) {
                record.synced = true;
            }
        }
        state.last_sync_time = self.clock.now_ms();
    }

    pub fn cleanup_synced(&self) {
        self.state.lock().records.retain(|r| !r.synced);
    }

    pub fn stats(&self) -> SyncStats {
        let state = self.state.lock();
        let synced = state.records.iter().filter(|r| r.synced).count() as i32;
        SyncStats {
            pending_count: state.records.len() as i32 - synced,
            synced_count: synced,
            last_sync_time: state.last_sync_time,
            total_records: state.records.len() as i64,
        }
    }

    /// Persist the whole buffer, synced flags included.
    pub fn serialize(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Persist<'a> {
            device_id: &'a str,
            last_sync_time: i64,
            max_records: usize,
            records: &'a [TrainingRecord],
        }

        let state = self.state.lock();
        serde_json::to_string(&Persist {
            device_id: &state.device_id,
            last_sync_time: state.last_sync_time,
            max_records: state.max_records,
            records: &state.records,
        })
        .unwrap_or_else(|_| "{}".to_string())
    }

    /// Restore a persisted buffer. Unknown keys are ignored; malformed
    /// fields fall back to defaults. Returns whether the top-level
    /// structure parsed as an object.
    pub fn deserialize(&self, json: &str) -> bool {
        let Ok(Value::Object(root)) = serde_json::from_str::<Value>(json) else {
            return false;
        };

        let mut state = self.state.lock();
        if let Some(device_id) = root.get("deviceId").and_then(Value::as_str) {
            state.device_id = device_id.to_string();
        }
        if let Some(ts) = root.get("lastSyncTime").and_then(Value::as_i64) {
            state.last_sync_time = ts;
        }
        if let Some(max) = root.get("maxRecords").and_then(Value::as_u64) {
            state.max_records = max as usize;
        }

        state.records.clear();
        let Some(records) = root.get("records").and_then(Value::as_array) else {
            return true;
        };

        for value in records {
            let Some(obj) = value.as_object() else {
                continue;
            };

            let mut record = TrainingRecord {
                id: String::new(),
                record_type: TrainingDataType::RuleMatch,
                timestamp: 0,
                synced: false,
                string_data: BTreeMap::new(),
                numeric_data: BTreeMap::new(),
                bool_data: BTreeMap::new(),
            };

            if let Some(id) = obj.get("id").and_then(Value::as_str) {
                record.id = id.to_string();
            }
            if let Some(code) = obj.get("type").and_then(Value::as_i64) {
                record.record_type = TrainingDataType::from_code(code as i32);
            }
            if let Some(ts) = obj.get("timestamp").and_then(Value::as_i64) {
                record.timestamp = ts;
            }
            if let Some(synced) = obj.get("synced").and_then(Value::as_bool) {
                record.synced = synced;
            }
            if let Some(map) = obj.get("stringData").and_then(Value::as_object) {
                for (k, v) in map {
                    if let Some(s) = v.as_str() {
                        record.string_data.insert(k.clone(), s.to_string());
                    }
                }
            }
            if let Some(map) = obj.get("numericData").and_then(Value::as_object) {
                for (k, v) in map {
                    if let Some(n) = v.as_f64() {
                        record.numeric_data.insert(k.clone(), n);
                    }
                }
            }
            if let Some(map) = obj.get("boolData").and_then(Value::as_object) {
                for (k, v) in map {
                    if let Some(b) = v.as_bool() {
                        record.bool_data.insert(k.clone(), b);
                    }
                }
            }

            state.records.push(record);
        }

        tracing::debug!(records = state.records.len(), "training buffer restored");
        true
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.last_sync_time = 0;
    }

    pub fn set_max_records(&self, max_records: usize) {
        self.state.lock().max_records = max_records;
    }

    fn push_record(
        &self,
        prefix: &str,
        record_type: TrainingDataType,
        string_data: BTreeMap<String, String>,
        numeric_data: BTreeMap<String, f64>,
        bool_data: BTreeMap<String, bool>,
    ) {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.seq += 1;
        let record = TrainingRecord {
            id: format!("{prefix}_{now}_{}", state.seq),
            record_type,
            timestamp: now,
            synced: false,
            string_data,
            numeric_data,
            bool_data,
        };
        state.records.push(record);
        Self::prune_if_needed(&mut state);
    }

    /// Over the bound, synced records go first (oldest first); if the
    /// buffer is still over, the oldest records go regardless.
    fn prune_if_needed(state: &mut BufferState) {
        if state.records.len() <= state.max_records {
            return;
        }

        let mut over = state.records.len() - state.max_records;
        state.records.retain(|r| {
            if over > 0 && r.synced {
                over -= 1;
                false
            } else {
                true
            }
        });

        if state.records.len() > state.max_records {
            let excess = state.records.len() - state.max_records;
            state.records.drain(0..excess);
        }
    }
}
