//! Sleep pattern learner: infers sleep episodes from long stationary runs
//! in the motion history and blends in wearable-sourced records.

use std::collections::VecDeque;

use chrono::Timelike;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::config::SleepConfig;

/// One motion-state observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionSnapshot {
    pub state: String,
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub geofence: String,
}

/// One night of sleep, inferred or reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepRecord {
    /// Local date of the bedtime, `YYYY-MM-DD`.
    pub date: String,
    pub bedtime: i64,
    pub wake_time: i64,
    pub duration_ms: i64,
    /// "wearable" | "inferred" | "manual".
    pub source: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepDayPattern {
    pub bedtime: f64,
    pub wake_time: f64,
    pub sample_count: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepPattern {
    pub typical_bedtime: f64,
    pub typical_wake_time: f64,
    pub sleep_duration_hours: f64,
    pub weekdays: SleepDayPattern,
    pub weekends: SleepDayPattern,
    pub last_updated: i64,
    pub confidence: f64,
}

#[derive(Default)]
struct SleepState {
    pattern: SleepPattern,
    records: Vec<SleepRecord>,
    motion_history: VecDeque<MotionSnapshot>,
    /// End timestamp of the last inferred episode, so a stationary run is
    /// only recorded once.
    last_inferred_end: i64,
}

pub struct SleepPatternLearner {
    config: SleepConfig,
    clock: SharedClock,
    state: Mutex<SleepState>,
}

impl SleepPatternLearner {
    pub fn new(config: SleepConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(SleepState::default()),
        }
    }

    /// Feed one motion-state change; long stationary runs become inferred
    /// sleep episodes.
    pub fn record_motion_change(&self, snapshot: MotionSnapshot) {
        let mut state = self.state.lock();
        let cutoff = snapshot.timestamp - self.config.history_window_ms;
        state.motion_history.push_back(snapshot);

        while state.motion_history.len() > 2
            && state
                .motion_history
                .front()
                .is_some_and(|s| s.timestamp < cutoff)
        {
            state.motion_history.pop_front();
        }

        self.detect_sleep(&mut state);
    }

    /// Wearable records are trusted as-is.
    pub fn record_from_wearable(&self, record: SleepRecord) {
        let mut state = self.state.lock();
        state.records.push(record);
        self.update_pattern(&mut state);
    }

    pub fn pattern(&self) -> SleepPattern {
        self.state.lock().pattern.clone()
    }

    /// Reminder time one lead interval before the typical bedtime; the
    /// default bedtime applies while confidence is low.
    pub fn recommended_bedtime_reminder(&self) -> f64 {
        let state = self.state.lock();
        if state.pattern.confidence < self.config.min_pattern_confidence {
            return self.config.default_bedtime_hour;
        }
        let mut reminder = state.pattern.typical_bedtime - self.config.reminder_lead_hours;
        if reminder < 0.0 {
            reminder += 24.0;
        }
        reminder
    }

    /// Whether `current_hour:current_minute` is within `margin_minutes` of
    /// the (typical or default) bedtime, with midnight wrap-around.
    pub fn is_near_bedtime(&self, current_hour: u32, current_minute: u32, margin_minutes: u32) -> bool {
        let state = self.state.lock();
        let current = current_hour as f64 + current_minute as f64 / 60.0;
        let bedtime = if state.pattern.confidence >= self.config.min_pattern_confidence {
            state.pattern.typical_bedtime
        } else {
            self.config.default_bedtime_hour
        };

        let mut diff = (current - bedtime).abs();
        if diff > 12.0 {
            diff = 24.0 - diff;
        }
        diff * 60.0 <= margin_minutes as f64
    }

    pub fn clear(&self) {
        *self.state.lock() = SleepState::default();
    }

    fn detect_sleep(&self, state: &mut SleepState) {
        if state.motion_history.len() < self.config.min_history_samples {
            return;
        }

        let mut episodes: Vec<(i64, i64)> = Vec::new();
        let mut run_start = 0i64;
        let mut run_end = 0i64;
        let mut in_run = false;

        for snap in &state.motion_history {
            if snap.state == "stationary" {
                if !in_run {
                    run_start = snap.timestamp;
                    in_run = true;
                }
                run_end = snap.timestamp;
            } else if in_run {
                let duration = run_end - run_start;
                if duration > self.config.min_sleep_duration_ms && run_end > state.last_inferred_end
                {
                    episodes.push((run_start, run_end));
                }
                in_run = false;
            }
        }

        for (start, end) in episodes {
            state.last_inferred_end = end;
            let date = self
                .clock
                .local_datetime(start)
                .format("%Y-%m-%d")
                .to_string();
            state.records.push(SleepRecord {
                date,
                bedtime: start,
                wake_time: end,
                duration_ms: end - start,
                source: "inferred".to_string(),
            });
            tracing::debug!(start, end, "inferred sleep episode");
        }

        self.update_pattern(state);
    }

    fn local_hour(&self, ts_ms: i64) -> f64 {
        let local = self.clock.local_datetime(ts_ms);
        local.hour() as f64 + local.minute() as f64 / 60.0 + local.second() as f64 / 3600.0
    }

    fn update_pattern(&self, state: &mut SleepState) {
        use chrono::Datelike;

        let mut bedtime_sum = 0.0;
        let mut wake_sum = 0.0;
        let mut duration_sum = 0.0;
        let mut count = 0;

        let mut weekday = SleepDayPattern::default();
        let mut weekend = SleepDayPattern::default();

        for rec in &state.records {
            if rec.bedtime <= 0 || rec.wake_time <= 0 {
                continue;
            }
            let bed_hour = self.local_hour(rec.bedtime);
            let wake_hour = self.local_hour(rec.wake_time);

            bedtime_sum += bed_hour;
            wake_sum += wake_hour;
            duration_sum += rec.duration_ms as f64 / 3_600_000.0;
            count += 1;

            let dow = self
                .clock
                .local_datetime(rec.bedtime)
                .weekday()
                .num_days_from_sunday();
            let bucket = if dow == 0 || dow == 6 {
                &mut weekend
            } else {
                &mut weekday
            };
            bucket.bedtime += bed_hour;
            bucket.wake_time += wake_hour;
            bucket.sample_count += 1;
        }

        if count == 0 {
            return;
        }

        for bucket in [&mut weekday, &mut weekend] {
            if bucket.sample_count > 0 {
                bucket.bedtime /= bucket.sample_count as f64;
                bucket.wake_time /= bucket.sample_count as f64;
            }
        }

        state.pattern = SleepPattern {
            typical_bedtime: bedtime_sum / count as f64,
            typical_wake_time: wake_sum / count as f64,
            sleep_duration_hours: duration_sum / count as f64,
            weekdays: weekday,
            weekends: weekend,
            last_updated: self.clock.now_ms(),
            confidence: (count as f64 / self.config.confidence_days).min(1.0),
        };
    }
}
