//! Feedback learner: folds user responses on fired rules into per-rule
//! preferences that bias future rule parameters.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::{CoreError, CoreResult};
use crate::types::FeedbackType;

/// Where and when the feedback happened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackContext {
    pub rule_id: String,
    pub rule_name: String,
    pub feedback_time: i64,
    pub hour: i32,
    pub minute: i32,
    pub time_of_day: String,
    pub is_weekend: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub geofence: String,
    pub wifi_ssid: String,
    pub motion_state: String,
    pub activity_context: String,
    pub payload: String,
}

/// A user-supplied parameter correction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentValue {
    pub key: String,
    pub original_value: f64,
    pub adjusted_value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub context: FeedbackContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<AdjustmentValue>,
    pub timestamp: i64,
}

/// Learned preference for one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePreference {
    pub rule_id: String,
    pub preferred_hour: f64,
    pub preferred_minute: f64,
    pub hour_adjustment: f64,
    pub confidence: f64,
    pub useful_count: i32,
    pub inaccurate_count: i32,
    pub dismiss_count: i32,
    pub adjust_count: i32,
    pub last_feedback_time: i64,
}

impl RulePreference {
    fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            preferred_hour: -1.0,
            preferred_minute: -1.0,
            hour_adjustment: 0.0,
            confidence: 0.0,
            useful_count: 0,
            inaccurate_count: 0,
            dismiss_count: 0,
            adjust_count: 0,
            last_feedback_time: 0,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreferenceExport {
    preferred_hour: f64,
    preferred_minute: f64,
    hour_adjustment: f64,
    confidence: f64,
    useful_count: i32,
    inaccurate_count: i32,
}

#[derive(Default)]
struct LearnerState {
    records: Vec<FeedbackRecord>,
    preferences: BTreeMap<String, RulePreference>,
    seq: u64,
}

pub struct FeedbackLearner {
    clock: SharedClock,
    state: Mutex<LearnerState>,
}

impl FeedbackLearner {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            state: Mutex::new(LearnerState::default()),
        }
    }

    /// Record a useful / inaccurate / dismiss response. Adjustments go
    /// through `record_adjustment`.
    pub fn record_simple_feedback(
        &self,
        rule_id: &str,
        feedback_type: FeedbackType,
        context: FeedbackContext,
    ) -> CoreResult<()> {
        if feedback_type == FeedbackType::Adjust {
            return Err(CoreError::invalid(
                "adjust feedback requires an adjustment value",
            ));
        }
        self.record(rule_id, feedback_type, context, None);
        Ok(())
    }

    pub fn record_adjustment(
        &self,
        rule_id: &str,
        context: FeedbackContext,
        adjustment: AdjustmentValue,
    ) {
        self.record(rule_id, FeedbackType::Adjust, context, Some(adjustment));
    }

    fn record(
        &self,
        rule_id: &str,
        feedback_type: FeedbackType,
        mut context: FeedbackContext,
        adjustment: Option<AdjustmentValue>,
    ) {
        let now = self.clock.now_ms();
        context.rule_id = rule_id.to_string();

        let mut state = self.state.lock();
        state.seq += 1;
        let record = FeedbackRecord {
            id: format!("fb_{now}_{}", state.seq),
            feedback_type,
            context,
            adjustment,
            timestamp: now,
        };

        Self::apply(&mut state, &record);
        state.records.push(record);
    }

    fn apply(state: &mut LearnerState, record: &FeedbackRecord) {
        let rule_id = record.context.rule_id.clone();
        let pref = state
            .preferences
            .entry(rule_id.clone())
            .or_insert_with(|| RulePreference::new(&rule_id));

        match record.feedback_type {
            FeedbackType::Useful => pref.useful_count += 1,
            FeedbackType::Inaccurate => pref.inaccurate_count += 1,
            FeedbackType::Dismiss => pref.dismiss_count += 1,
            FeedbackType::Adjust => {
                pref.adjust_count += 1;
                if let Some(adj) = &record.adjustment {
                    if adj.key == "hour" {
                        pref.preferred_hour = adj.adjusted_value;
                        pref.hour_adjustment = adj.adjusted_value - adj.original_value;
                    } else if adj.key == "minute" {
                        pref.preferred_minute = adj.adjusted_value;
                    }
                }
            }
        }

        pref.last_feedback_time = record.timestamp;

        // Dismissals carry no signal about correctness.
        let total = pref.useful_count + pref.inaccurate_count + pref.adjust_count;
        if total > 0 {
            pref.confidence = (total as f64 / 5.0).min(1.0);
        }
    }

    pub fn preference(&self, rule_id: &str) -> Option<RulePreference> {
        self.state.lock().preferences.get(rule_id).cloned()
    }

    /// The hour the user actually wants, once the preference is confident
    /// enough; otherwise the rule's original hour.
    pub fn adjusted_hour(&self, rule_id: &str, original_hour: f64) -> f64 {
        match self.state.lock().preferences.get(rule_id) {
            Some(pref) if pref.confidence > 0.5 => pref.preferred_hour,
            _ => original_hour,
        }
    }

    pub fn all_preferences(&self) -> BTreeMap<String, RulePreference> {
        self.state.lock().preferences.clone()
    }

    pub fn clear_preference(&self, rule_id: &str) {
        self.state.lock().preferences.remove(rule_id);
    }

    /// `{"<ruleId>": {preferredHour, preferredMinute, hourAdjustment,
    /// confidence, usefulCount, inaccurateCount}, …}`.
    pub fn export_preferences(&self) -> String {
        let state = self.state.lock();
        let out: BTreeMap<&str, PreferenceExport> = state
            .preferences
            .iter()
            .map(|(id, p)| {
                (
                    id.as_str(),
                    PreferenceExport {
                        preferred_hour: p.preferred_hour,
                        preferred_minute: p.preferred_minute,
                        hour_adjustment: p.hour_adjustment,
                        confidence: p.confidence,
                        useful_count: p.useful_count,
                        inaccurate_count: p.inaccurate_count,
                    },
                )
            })
            .collect();
        serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    fn learner() -> (FeedbackLearner, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (FeedbackLearner::new(clock.clone()), clock)
    }

    #[test]
    fn counters_accumulate_per_rule() {
        let (l, _) = learner();
        l.record_simple_feedback("r1", FeedbackType::Useful, FeedbackContext::default())
            .unwrap();
        l.record_simple_feedback("r1", FeedbackType::Useful, FeedbackContext::default())
            .unwrap();
        l.record_simple_feedback("r1", FeedbackType::Dismiss, FeedbackContext::default())
            .unwrap();
        l.record_simple_feedback("r2", FeedbackType::Inaccurate, FeedbackContext::default())
            .unwrap();

        let p1 = l.preference("r1").unwrap();
        assert_eq!(p1.useful_count, 2);
        assert_eq!(p1.dismiss_count, 1);
        assert_eq!(p1.inaccurate_count, 0);

        let p2 = l.preference("r2").unwrap();
        assert_eq!(p2.inaccurate_count, 1);
        assert!(l.preference("r3").is_none());
    }

    #[test]
    fn confidence_ignores_dismissals() {
        let (l, _) = learner();
        for _ in 0..4 {
            l.record_simple_feedback("r1", FeedbackType::Dismiss, FeedbackContext::default())
                .unwrap();
        }
        assert_eq!(l.preference("r1").unwrap().confidence, 0.0);

        for _ in 0..5 {
            l.record_simple_feedback("r1", FeedbackType::Useful, FeedbackContext::default())
                .unwrap();
        }
        assert_eq!(l.preference("r1").unwrap().confidence, 1.0);
    }

    #[test]
    fn adjustment_moves_preferred_hour() {
        let (l, _) = learner();
        l.record_adjustment(
            "bedtime",
            FeedbackContext::default(),
            AdjustmentValue {
                key: "hour".into(),
                original_value: 22.0,
                adjusted_value: 23.0,
                unit: "hour".into(),
            },
        );

        let pref = l.preference("bedtime").unwrap();
        assert_eq!(pref.preferred_hour, 23.0);
        assert_eq!(pref.hour_adjustment, 1.0);
        assert_eq!(pref.adjust_count, 1);

        l.record_adjustment(
            "bedtime",
            FeedbackContext::default(),
            AdjustmentValue {
                key: "minute".into(),
                original_value: 0.0,
                adjusted_value: 30.0,
                unit: "minute".into(),
            },
        );
        assert_eq!(l.preference("bedtime").unwrap().preferred_minute, 30.0);
    }

    #[test]
    fn adjusted_hour_needs_confidence() {
        let (l, _) = learner();
        l.record_adjustment(
            "r1",
            FeedbackContext::default(),
            AdjustmentValue {
                key: "hour".into(),
                original_value: 22.0,
                adjusted_value: 21.0,
                unit: "hour".into(),
            },
        );
        // One adjustment: confidence 0.2, not enough.
        assert_eq!(l.adjusted_hour("r1", 22.0), 22.0);

        for _ in 0..2 {
            l.record_simple_feedback("r1", FeedbackType::Useful, FeedbackContext::default())
                .unwrap();
        }
        // confidence 0.6 > 0.5 → preferred hour wins.
        assert_eq!(l.adjusted_hour("r1", 22.0), 21.0);
        assert_eq!(l.adjusted_hour("unseen", 8.0), 8.0);
    }

    #[test]
    fn simple_feedback_rejects_adjust_type() {
        let (l, _) = learner();
        assert!(l
            .record_simple_feedback("r1", FeedbackType::Adjust, FeedbackContext::default())
            .is_err());
        assert!(l.preference("r1").is_none());
    }

    #[test]
    fn export_shape() {
        let (l, _) = learner();
        l.record_adjustment(
            "r1",
            FeedbackContext::default(),
            AdjustmentValue {
                key: "hour".into(),
                original_value: 8.0,
                adjusted_value: 9.0,
                unit: "hour".into(),
            },
        );

        let v: serde_json::Value = serde_json::from_str(&l.export_preferences()).unwrap();
        assert_eq!(v["r1"]["preferredHour"].as_f64(), Some(9.0));
        assert_eq!(v["r1"]["hourAdjustment"].as_f64(), Some(1.0));
        assert_eq!(v["r1"]["usefulCount"].as_i64(), Some(0));
        assert!(v["r1"].get("dismissCount").is_none());
    }

    #[test]
    fn clear_preference_removes_rule() {
        let (l, _) = learner();
        l.record_simple_feedback("r1", FeedbackType::Useful, FeedbackContext::default())
            .unwrap();
        l.clear_preference("r1");
        assert!(l.preference("r1").is_none());
    }

    #[test]
    fn last_feedback_time_tracks_clock() {
        let (l, clock) = learner();
        l.record_simple_feedback("r1", FeedbackType::Useful, FeedbackContext::default())
            .unwrap();
        clock.advance(5_000);
        l.record_simple_feedback("r1", FeedbackType::Useful, FeedbackContext::default())
            .unwrap();
        assert_eq!(l.preference("r1").unwrap().last_feedback_time, 1_005_000);
    }
}
