//! LinUCB contextual bandit: one ridge-regression model per action arm,
//! selected by upper confidence bound over an 8-dimensional context
//! feature vector.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::config::BanditConfig;
use crate::types::ContextMap;

pub const LINUCB_DIM: usize = 8;

type Vec8 = [f64; LINUCB_DIM];
type Mat8 = [[f64; LINUCB_DIM]; LINUCB_DIM];

fn identity() -> Mat8 {
    let mut m = [[0.0; LINUCB_DIM]; LINUCB_DIM];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

fn mat_vec_mul(m: &Mat8, v: &Vec8) -> Vec8 {
    let mut result = [0.0; LINUCB_DIM];
    for i in 0..LINUCB_DIM {
        let mut sum = 0.0;
        for j in 0..LINUCB_DIM {
            sum += m[i][j] * v[j];
        }
        result[i] = sum;
    }
    result
}

fn dot(a: &Vec8, b: &Vec8) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Gauss–Jordan inverse with partial pivoting. `None` when a pivot column
/// collapses below 1e-12 (cannot happen with the ridge prior, but callers
/// must still survive it).
fn invert(src: &Mat8) -> Option<Mat8> {
    const D: usize = LINUCB_DIM;
    let mut aug = [[0.0f64; 2 * D]; D];
    for i in 0..D {
        for j in 0..D {
            aug[i][j] = src[i][j];
        }
        aug[i][D + i] = 1.0;
    }

    for col in 0..D {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..D {
            let v = aug[row][col].abs();
            if v > max_val {
                max_val = v;
                max_row = row;
            }
        }
        if max_val < 1e-12 {
            return None;
        }
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        for item in aug[col].iter_mut() {
            *item /= pivot;
        }

        for row in 0..D {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for j in 0..2 * D {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    let mut inv = [[0.0; D]; D];
    for i in 0..D {
        for j in 0..D {
            inv[i][j] = aug[i][D + j];
        }
    }
    Some(inv)
}

#[derive(Debug, Clone)]
struct Arm {
    a: Mat8,
    b: Vec8,
}

impl Default for Arm {
    fn default() -> Self {
        Self {
            a: identity(),
            b: [0.0; LINUCB_DIM],
        }
    }
}

struct BanditState {
    alpha: f64,
    arms: BTreeMap<String, Arm>,
}

pub struct LinUcb {
    state: Mutex<BanditState>,
}

impl LinUcb {
    pub fn new(config: BanditConfig) -> Self {
        Self {
            state: Mutex::new(BanditState {
                alpha: config.alpha,
                arms: BTreeMap::new(),
            }),
        }
    }

    /// Map a context to the fixed 8-dim feature vector:
    /// [sin(hour), cos(hour), battery/100, isCharging, isWeekend,
    /// stationary, walking/running, driving/transit]. Missing or
    /// unparseable values take neutral defaults.
    pub fn build_feature_vec(ctx: &ContextMap) -> Vec8 {
        let mut x = [0.0; LINUCB_DIM];

        let hour = ctx
            .get("hour")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(12.0);
        let angle = 2.0 * std::f64::consts::PI * hour / 24.0;
        x[0] = angle.sin();
        x[1] = angle.cos();

        let battery = ctx
            .get("batteryLevel")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(50.0);
        x[2] = battery / 100.0;

        x[3] = if ctx.get("isCharging").map(String::as_str) == Some("true") {
            1.0
        } else {
            0.0
        };
        x[4] = if ctx.get("isWeekend").map(String::as_str) == Some("true") {
            1.0
        } else {
            0.0
        };

        let motion = ctx
            .get("motionState")
            .map(String::as_str)
            .unwrap_or("stationary");
        x[5] = if motion == "stationary" { 1.0 } else { 0.0 };
        x[6] = if motion == "walking" || motion == "running" {
            1.0
        } else {
            0.0
        };
        x[7] = if motion == "driving" || motion == "transit" {
            1.0
        } else {
            0.0
        };

        x
    }

    /// Pick the arg-max UCB among the candidates; ties keep the earliest.
    /// `None` on an empty candidate list. Unknown arms lazily start from
    /// the ridge prior (A = I, b = 0).
    pub fn select(&self, action_ids: &[String], ctx: &ContextMap) -> Option<usize> {
        if action_ids.is_empty() {
            return None;
        }

        let mut state = self.state.lock();
        let alpha = state.alpha;
        let x = Self::build_feature_vec(ctx);

        let mut best_idx = 0;
        let mut best_ucb = f64::NEG_INFINITY;

        for (i, id) in action_ids.iter().enumerate() {
            let arm = state.arms.entry(id.clone()).or_default();

            let a_inv = invert(&arm.a).unwrap_or_else(|| {
                tracing::warn!(arm = %id, "singular design matrix, using identity fallback");
                identity()
            });

            let theta = mat_vec_mul(&a_inv, &arm.b);
            let exploit = dot(&theta, &x);
            let a_inv_x = mat_vec_mul(&a_inv, &x);
            let explore = alpha * dot(&x, &a_inv_x).max(0.0).sqrt();

            let ucb = exploit + explore;
            if ucb > best_ucb {
                best_ucb = ucb;
                best_idx = i;
            }
        }

        Some(best_idx)
    }

    /// Online ridge update: `A += x xᵀ`, `b += reward · x`.
    pub fn update(&self, action_id: &str, reward: f64, ctx: &ContextMap) {
        let x = Self::build_feature_vec(ctx);
        let mut state = self.state.lock();
        let arm = state.arms.entry(action_id.to_string()).or_default();

        for i in 0..LINUCB_DIM {
            for j in 0..LINUCB_DIM {
                arm.a[i][j] += x[i] * x[j];
            }
            arm.b[i] += reward * x[i];
        }
    }

    pub fn alpha(&self) -> f64 {
        self.state.lock().alpha
    }

    pub fn arm_count(&self) -> usize {
        self.state.lock().arms.len()
    }

    /// `{"alpha": <num>, "arms": {"<id>": {"A": [[…]×8], "b": [8]}}}`.
    pub fn export_json(&self) -> String {
        #[derive(Serialize)]
        struct ArmOut<'a> {
            #[serde(rename = "A")]
            a: &'a Mat8,
            b: &'a Vec8,
        }
        #[derive(Serialize)]
        struct Out<'a> {
            alpha: f64,
            arms: BTreeMap<&'a str, ArmOut<'a>>,
        }

        let state = self.state.lock();
        let out = Out {
            alpha: state.alpha,
            arms: state
                .arms
                .iter()
                .map(|(id, arm)| (id.as_str(), ArmOut { a: &arm.a, b: &arm.b }))
                .collect(),
        };
        serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
    }

    /// Restore from `export_json` output. Tolerant: unknown keys are
    /// ignored and malformed fields keep their prior defaults. Returns
    /// whether the top-level structure parsed.
    pub fn import_json(&self, json: &str) -> bool {
        let Ok(Value::Object(root)) = serde_json::from_str::<Value>(json) else {
            return false;
        };

        let mut state = self.state.lock();
        if let Some(alpha) = root.get("alpha").and_then(Value::as_f64) {
            state.alpha = alpha;
        }

        let Some(Value::Object(arms)) = root.get("arms") else {
            return true;
        };

        state.arms.clear();
        for (id, arm_value) in arms {
            let mut arm = Arm::default();

            if let Some(rows) = arm_value.get("A").and_then(Value::as_array) {
                for (i, row) in rows.iter().take(LINUCB_DIM).enumerate() {
                    if let Some(cols) = row.as_array() {
                        for (j, cell) in cols.iter().take(LINUCB_DIM).enumerate() {
                            if let Some(v) = cell.as_f64() {
                                arm.a[i][j] = v;
                            }
                        }
                    }
                }
            }
            if let Some(values) = arm_value.get("b").and_then(Value::as_array) {
                for (i, cell) in values.iter().take(LINUCB_DIM).enumerate() {
                    if let Some(v) = cell.as_f64() {
                        arm.b[i] = v;
                    }
                }
            }

            state.arms.insert(id.clone(), arm);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> ContextMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn bandit(alpha: f64) -> LinUcb {
        LinUcb::new(BanditConfig { alpha })
    }

    #[test]
    fn feature_vector_encodes_context() {
        let x = LinUcb::build_feature_vec(&ctx(&[
            ("hour", "6"),
            ("batteryLevel", "80"),
            ("isCharging", "true"),
            ("isWeekend", "false"),
            ("motionState", "walking"),
        ]));
        assert!((x[0] - 1.0).abs() < 1e-9); // sin(π/2)
        assert!(x[1].abs() < 1e-9); // cos(π/2)
        assert!((x[2] - 0.8).abs() < 1e-9);
        assert_eq!(x[3], 1.0);
        assert_eq!(x[4], 0.0);
        assert_eq!(x[5], 0.0);
        assert_eq!(x[6], 1.0);
        assert_eq!(x[7], 0.0);
    }

    #[test]
    fn feature_vector_defaults_for_missing_context() {
        let x = LinUcb::build_feature_vec(&ContextMap::new());
        // hour 12 → sin(π) ≈ 0, cos(π) = −1; battery 50; stationary.
        assert!(x[0].abs() < 1e-9);
        assert!((x[1] + 1.0).abs() < 1e-9);
        assert!((x[2] - 0.5).abs() < 1e-9);
        assert_eq!(x[5], 1.0);
    }

    #[test]
    fn empty_candidates_select_nothing() {
        assert_eq!(bandit(1.0).select(&[], &ContextMap::new()), None);
    }

    #[test]
    fn fresh_arms_tie_break_to_first() {
        let b = bandit(1.0);
        let actions = vec!["A".to_string(), "B".to_string()];
        assert_eq!(b.select(&actions, &ContextMap::new()), Some(0));
    }

    #[test]
    fn unrewarded_arm_loses_to_unexplored_arm() {
        let b = bandit(1.0);
        let actions = vec!["A".to_string(), "B".to_string()];
        let context = ctx(&[("hour", "10"), ("batteryLevel", "60")]);

        assert_eq!(b.select(&actions, &context), Some(0));
        for _ in 0..5 {
            b.update("A", 0.0, &context);
        }
        // A's uncertainty along x collapsed with zero payoff; B still
        // carries the full exploration bonus.
        assert_eq!(b.select(&actions, &context), Some(1));
    }

    #[test]
    fn rewarded_arm_is_exploited() {
        let b = bandit(0.1);
        let actions = vec!["quiet".to_string(), "remind".to_string()];
        let context = ctx(&[("hour", "22"), ("motionState", "stationary")]);

        for _ in 0..20 {
            b.update("remind", 1.0, &context);
            b.update("quiet", 0.0, &context);
        }
        assert_eq!(b.select(&actions, &context), Some(1));
    }

    #[test]
    fn update_adds_outer_product() {
        let b = bandit(1.0);
        let context = ctx(&[("hour", "0")]);
        let x = LinUcb::build_feature_vec(&context);
        b.update("A", 2.0, &context);

        let state = b.state.lock();
        let arm = state.arms.get("A").unwrap();
        for i in 0..LINUCB_DIM {
            for j in 0..LINUCB_DIM {
                let expected = if i == j { 1.0 } else { 0.0 } + x[i] * x[j];
                assert!((arm.a[i][j] - expected).abs() < 1e-12);
            }
            assert!((arm.b[i] - 2.0 * x[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn invert_recovers_identity() {
        let inv = invert(&identity()).unwrap();
        assert_eq!(inv, identity());

        let singular = [[0.0; LINUCB_DIM]; LINUCB_DIM];
        assert!(invert(&singular).is_none());
    }

    #[test]
    fn export_shape_is_stable() {
        let b = bandit(1.5);
        b.update("arm1", 1.0, &ctx(&[("hour", "3")]));
        let json = b.export_json();
        let v: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(v["alpha"].as_f64(), Some(1.5));
        let a = v["arms"]["arm1"]["A"].as_array().unwrap();
        assert_eq!(a.len(), LINUCB_DIM);
        assert_eq!(a[0].as_array().unwrap().len(), LINUCB_DIM);
        assert_eq!(v["arms"]["arm1"]["b"].as_array().unwrap().len(), LINUCB_DIM);
    }

    #[test]
    fn round_trip_preserves_selection_behavior() {
        let original = bandit(1.0);
        let actions = vec!["A".to_string(), "B".to_string()];
        let context = ctx(&[("hour", "9"), ("motionState", "walking")]);
        for _ in 0..5 {
            original.update("A", 0.0, &context);
            original.update("B", 1.0, &context);
        }

        let restored = bandit(9.9);
        assert!(restored.import_json(&original.export_json()));
        assert_eq!(restored.alpha(), 1.0);
        assert_eq!(
            restored.select(&actions, &context),
            original.select(&actions, &context)
        );
    }

    #[test]
    fn import_tolerates_malformed_fields() {
        let b = bandit(1.0);
        assert!(!b.import_json("not json"));
        assert!(!b.import_json("[1,2,3]"));

        // Extra keys, short rows and a junk cell are absorbed.
        let json = r#"{
            "alpha": 0.7,
            "extra": {"ignored": true},
            "arms": {
                "x": {"A": [[2.0, "bad"]], "b": [1.0], "junk": 1},
                "y": {}
            }
        }"#;
        assert!(b.import_json(json));
        assert_eq!(b.alpha(), 0.7);
        assert_eq!(b.arm_count(), 2);

        let state = b.state.lock();
        let arm = state.arms.get("x").unwrap();
        assert_eq!(arm.a[0][0], 2.0);
        assert_eq!(arm.a[0][1], 0.0); // junk cell kept the prior default
        assert_eq!(arm.a[1][1], 1.0); // missing row kept the identity
        assert_eq!(arm.b[0], 1.0);
    }
}
