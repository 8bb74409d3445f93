//! Long-lived owner of every core component. The host constructs one
//! `Context` at startup and drives it from sensor callbacks and UI events;
//! each component keeps its own internal lock, so all methods take `&self`.

use chrono::Timelike;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bandit::LinUcb;
use crate::clock::{SharedClock, SystemClock};
use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::fusion::LocationFusion;
use crate::learners::feedback::{AdjustmentValue, FeedbackContext, FeedbackLearner};
use crate::learners::sleep::{MotionSnapshot, SleepPatternLearner};
use crate::motion::detector::{MotionDetector, MotionResult};
use crate::motion::sampling::SamplingGovernor;
use crate::places::dbscan::PlaceDiscovery;
use crate::places::signals::PlaceSignalLearner;
use crate::rules::{RuleEngine, RuleMatch};
use crate::training::{StateTransitionData, TrainingDataBuffer, UserFeedbackData};
use crate::tray::SensorDataTray;
use crate::types::{time_of_day_bucket, AccelSample, ContextSnapshot, FeedbackType};
use crate::voiceprint::VoiceprintVerifier;

/// Outcome of one recommendation pass: every fired rule, plus the one the
/// bandit picked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub matches: Vec<RuleMatch>,
    pub chosen: Option<RuleMatch>,
}

pub struct Context {
    clock: SharedClock,
    tray: SensorDataTray,
    motion: MotionDetector,
    sampling: SamplingGovernor,
    places: PlaceDiscovery,
    place_signals: PlaceSignalLearner,
    fusion: LocationFusion,
    rules: RuleEngine,
    bandit: LinUcb,
    feedback: FeedbackLearner,
    sleep: SleepPatternLearner,
    voiceprint: VoiceprintVerifier,
    training: TrainingDataBuffer,
    last_transition_ms: Mutex<i64>,
}

impl Context {
    pub fn new(config: CoreConfig, clock: SharedClock) -> Self {
        Self {
            tray: SensorDataTray::new(config.tray.clone(), clock.clone()),
            motion: MotionDetector::new(config.motion.clone()),
            sampling: SamplingGovernor::new(config.sampling.clone()),
            places: PlaceDiscovery::new(config.cluster.clone()),
            place_signals: PlaceSignalLearner::new(),
            fusion: LocationFusion::new(config.fusion.clone()),
            rules: RuleEngine::new(config.tree.clone()),
            bandit: LinUcb::new(config.bandit.clone()),
            feedback: FeedbackLearner::new(clock.clone()),
            sleep: SleepPatternLearner::new(config.sleep.clone(), clock.clone()),
            voiceprint: VoiceprintVerifier::new(),
            training: TrainingDataBuffer::new(config.training.clone(), clock.clone()),
            last_transition_ms: Mutex::new(clock.now_ms()),
            clock,
        }
    }

    pub fn with_system_clock(config: CoreConfig) -> Self {
        Self::new(config, SystemClock::shared())
    }

    pub fn tray(&self) -> &SensorDataTray {
        &self.tray
    }

    pub fn motion(&self) -> &MotionDetector {
        &self.motion
    }

    pub fn sampling(&self) -> &SamplingGovernor {
        &self.sampling
    }

    pub fn places(&self) -> &PlaceDiscovery {
        &self.places
    }

    pub fn place_signals(&self) -> &PlaceSignalLearner {
        &self.place_signals
    }

    pub fn fusion(&self) -> &LocationFusion {
        &self.fusion
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn bandit(&self) -> &LinUcb {
        &self.bandit
    }

    pub fn feedback_learner(&self) -> &FeedbackLearner {
        &self.feedback
    }

    pub fn sleep(&self) -> &SleepPatternLearner {
        &self.sleep
    }

    pub fn voiceprint(&self) -> &VoiceprintVerifier {
        &self.voiceprint
    }

    pub fn training(&self) -> &TrainingDataBuffer {
        &self.training
    }

    /// Sensor callback path: classify the fused sample, refresh the tray,
    /// retune sampling on confirmed transitions and log the transition for
    /// training.
    pub fn ingest_motion_sample(&self, accel: AccelSample, gps_speed: f64) -> MotionResult {
        let prev_state = self.motion.last_state();
        let result = self.motion.detect(accel, gps_speed);

        self.tray.put(
            "motionState",
            result.state.as_str(),
            result.confidence,
            "motion",
        );

        if result.state_changed {
            let now = self.clock.now_ms();
            let local = self.clock.local_datetime(now);
            let duration = {
                let mut last = self.last_transition_ms.lock();
                let elapsed = now - *last;
                *last = now;
                elapsed
            };

            let changed = self.sampling.update_for_state(result.state);
            tracing::info!(
                from = prev_state.as_str(),
                to = result.state.as_str(),
                intervals_changed = changed,
                "motion state transition"
            );

            self.training.record_state_transition(&StateTransitionData {
                prev_state: prev_state.as_str().to_string(),
                new_state: result.state.as_str().to_string(),
                duration,
                time_of_day: time_of_day_bucket(local.hour()).to_string(),
                hour: local.hour() as i32,
                geofence: self.tray.get("geofence").value.unwrap_or_default(),
                wifi_ssid: self.tray.get("wifiSsid").value.unwrap_or_default(),
            });

            self.sleep.record_motion_change(MotionSnapshot {
                state: result.state.as_str().to_string(),
                timestamp: now,
                geofence: self.tray.get("geofence").value.unwrap_or_default(),
                ..Default::default()
            });
        }

        result
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.tray.snapshot()
    }

    /// One decision pass: evaluate rules against the current snapshot, then
    /// let the bandit pick among the fired actions.
    pub fn recommend(&self) -> Recommendation {
        let ctx = self.tray.snapshot().to_map();
        let matches = self.rules.evaluate(&ctx);

        let action_ids: Vec<String> = matches.iter().map(|m| m.rule_id.clone()).collect();
        let chosen = self
            .bandit
            .select(&action_ids, &ctx)
            .map(|idx| matches[idx].clone());

        Recommendation { matches, chosen }
    }

    /// Reward the arm behind a delivered action under the current context.
    pub fn reward(&self, action_id: &str, reward: f64) {
        let ctx = self.tray.snapshot().to_map();
        self.bandit.update(action_id, reward, &ctx);
    }

    /// User feedback path: update the per-rule preference and append a
    /// training record.
    pub fn record_feedback(&self, rule_id: &str, feedback_type: FeedbackType) -> CoreResult<()> {
        let (context, hour) = self.feedback_context(rule_id);
        self.feedback
            .record_simple_feedback(rule_id, feedback_type, context)?;

        self.training.record_feedback(&UserFeedbackData {
            rule_id: rule_id.to_string(),
            feedback_type: feedback_type.as_str().to_string(),
            hour,
            time_of_day: time_of_day_bucket(hour as u32).to_string(),
            motion_state: self.motion.last_state().as_str().to_string(),
            geofence: self.tray.get("geofence").value.unwrap_or_default(),
            ..Default::default()
        });
        Ok(())
    }

    /// Feedback with a user-supplied correction (e.g. the preferred hour).
    pub fn record_adjustment(&self, rule_id: &str, adjustment: AdjustmentValue) {
        let (context, hour) = self.feedback_context(rule_id);
        self.training.record_feedback(&UserFeedbackData {
            rule_id: rule_id.to_string(),
            feedback_type: FeedbackType::Adjust.as_str().to_string(),
            original_value: adjustment.original_value.to_string(),
            adjusted_value: adjustment.adjusted_value.to_string(),
            hour,
            time_of_day: time_of_day_bucket(hour as u32).to_string(),
            motion_state: self.motion.last_state().as_str().to_string(),
            geofence: self.tray.get("geofence").value.unwrap_or_default(),
            ..Default::default()
        });
        self.feedback.record_adjustment(rule_id, context, adjustment);
    }

    fn feedback_context(&self, rule_id: &str) -> (FeedbackContext, i32) {
        let now = self.clock.now_ms();
        let local = self.clock.local_datetime(now);
        let snap = self.tray.snapshot();

        let context = FeedbackContext {
            rule_id: rule_id.to_string(),
            feedback_time: now,
            hour: local.hour() as i32,
            minute: local.minute() as i32,
            time_of_day: snap.time_of_day.clone(),
            is_weekend: snap.is_weekend == "true",
            geofence: snap.geofence.clone().unwrap_or_default(),
            wifi_ssid: snap.wifi_ssid.clone().unwrap_or_default(),
            motion_state: snap.motion_state.clone(),
            ..Default::default()
        };
        (context, local.hour() as i32)
    }
}
