#![allow(dead_code)]

pub mod tree;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::TreeConfig;
use crate::types::ContextMap;

pub use tree::TreeNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ConditionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub key: String,
    pub op: ConditionOp,
    pub value: String,
}

impl Condition {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: ConditionOp::Eq,
            value: value.into(),
        }
    }

    /// A condition on a missing key never matches. Ordering operators
    /// compare numerically and fail when either side does not parse.
    pub fn matches(&self, ctx: &ContextMap) -> bool {
        let Some(actual) = ctx.get(&self.key) else {
            return false;
        };
        match self.op {
            ConditionOp::Eq => actual == &self.value,
            ConditionOp::Neq => actual != &self.value,
            ConditionOp::Gt | ConditionOp::Gte | ConditionOp::Lt | ConditionOp::Lte => {
                let (Ok(lhs), Ok(rhs)) = (actual.parse::<f64>(), self.value.parse::<f64>())
                else {
                    return false;
                };
                match self.op {
                    ConditionOp::Gt => lhs > rhs,
                    ConditionOp::Gte => lhs >= rhs,
                    ConditionOp::Lt => lhs < rhs,
                    ConditionOp::Lte => lhs <= rhs,
                    _ => unreachable!(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub enabled: bool,
    pub conditions: Vec<Condition>,
    /// Opaque action payload handed back to the host on match.
    pub action: String,
}

impl Rule {
    pub fn matches(&self, ctx: &ContextMap) -> bool {
        self.conditions.iter().all(|c| c.matches(ctx))
    }
}

/// A fired rule: id plus its action payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    pub rule_id: String,
    pub action: String,
}

struct EngineState {
    rules: Vec<Rule>,
    tree: Vec<TreeNode>,
}

/// Evaluates the configured rule set against context snapshots. Rules are
/// compiled into a cost-aware decision tree on every mutation; the tree is
/// read-only between compilations.
pub struct RuleEngine {
    config: TreeConfig,
    state: Mutex<EngineState>,
}

impl RuleEngine {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState {
                rules: Vec::new(),
                tree: Vec::new(),
            }),
        }
    }

    /// Replace the whole rule set and recompile.
    pub fn set_rules(&self, rules: Vec<Rule>) {
        let mut state = self.state.lock();
        state.rules = rules;
        self.recompile(&mut state);
    }

    pub fn add_rule(&self, rule: Rule) {
        let mut state = self.state.lock();
        state.rules.push(rule);
        self.recompile(&mut state);
    }

    /// Remove by id. Returns whether a rule was removed.
    pub fn remove_rule(&self, rule_id: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.rules.len();
        state.rules.retain(|r| r.id != rule_id);
        let removed = state.rules.len() != before;
        if removed {
            self.recompile(&mut state);
        }
        removed
    }

    /// Enable or disable a rule. Returns whether the rule exists.
    pub fn set_enabled(&self, rule_id: &str, enabled: bool) -> bool {
        let mut state = self.state.lock();
        let Some(rule) = state.rules.iter_mut().find(|r| r.id == rule_id) else {
            return false;
        };
        rule.enabled = enabled;
        self.recompile(&mut state);
        true
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.state.lock().rules.clone()
    }

    /// Evaluate via the compiled tree.
    pub fn evaluate(&self, ctx: &ContextMap) -> Vec<RuleMatch> {
        let state = self.state.lock();
        tree::evaluate(&state.tree, &state.rules, ctx)
            .into_iter()
            .map(|idx| RuleMatch {
                rule_id: state.rules[idx].id.clone(),
                action: state.rules[idx].action.clone(),
            })
            .collect()
    }

    /// Reference evaluator: a flat pass over every enabled rule. Tree
    /// evaluation must always agree with this.
    pub fn evaluate_flat(&self, ctx: &ContextMap) -> Vec<RuleMatch> {
        let state = self.state.lock();
        state
            .rules
            .iter()
            .filter(|r| r.enabled && r.matches(ctx))
            .map(|r| RuleMatch {
                rule_id: r.id.clone(),
                action: r.action.clone(),
            })
            .collect()
    }

    /// Number of nodes in the compiled tree (diagnostics).
    pub fn tree_size(&self) -> usize {
        self.state.lock().tree.len()
    }

    /// Root split key of the compiled tree, if any (diagnostics).
    pub fn root_split_key(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .tree
            .first()
            .filter(|n| !n.split_key.is_empty())
            .map(|n| n.split_key.clone())
    }

    fn recompile(&self, state: &mut EngineState) {
        state.tree = tree::compile(&state.rules, &self.config);
        tracing::debug!(
            rules = state.rules.len(),
            nodes = state.tree.len(),
            "rule tree recompiled"
        );
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

    fn rule(id: &str, conditions: Vec<Condition>) -> Rule {
        Rule {
            id: id.to_string(),
            enabled: true,
            conditions,
            action: format!("action_{id}"),
        }
    }

    #[test]
    fn condition_ops() {
        let c = ctx(&[("batteryLevel", "35"), ("motionState", "walking")]);
        assert!(Condition::eq("motionState", "walking").matches(&c));
        assert!(!Condition::eq("motionState", "driving").matches(&c));
        assert!(!Condition::eq("missing", "x").matches(&c));

        let lt = Condition {
            key: "batteryLevel".into(),
            op: ConditionOp::Lt,
            value: "40".into(),
        };
        assert!(lt.matches(&c));

        let gt_non_numeric = Condition {
            key: "motionState".into(),
            op: ConditionOp::Gt,
            value: "10".into(),
        };
        assert!(!gt_non_numeric.matches(&c));

        let neq = Condition {
            key: "motionState".into(),
            op: ConditionOp::Neq,
            value: "driving".into(),
        };
        assert!(neq.matches(&c));
    }

    #[test]
    fn evaluate_matches_enabled_rules_only() {
        let engine = RuleEngine::new(TreeConfig::default());
        engine.set_rules(vec![
            rule("r1", vec![Condition::eq("hour", "22")]),
            Rule {
                enabled: false,
                ..rule("r2", vec![Condition::eq("hour", "22")])
            },
        ]);

        let matches = engine.evaluate(&ctx(&[("hour", "22")]));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule_id, "r1");
        assert_eq!(matches[0].action, "action_r1");
    }

    #[test]
    fn cheap_feature_is_split_first() {
        let engine = RuleEngine::new(TreeConfig::default());
        engine.set_rules(vec![
            rule(
                "r1",
                vec![Condition::eq("geofence", "home"), Condition::eq("hour", "22")],
            ),
            rule(
                "r2",
                vec![Condition::eq("hour", "22"), Condition::eq("batteryLevel", "low")],
            ),
            rule("r3", vec![Condition::eq("hour", "7")]),
        ]);

        assert_eq!(engine.root_split_key().as_deref(), Some("hour"));
    }

    #[test]
    fn tree_and_flat_agree_on_branching_rules() {
        let engine = RuleEngine::new(TreeConfig::default());
        engine.set_rules(vec![
            rule(
                "r1",
                vec![Condition::eq("geofence", "home"), Condition::eq("hour", "22")],
            ),
            rule(
                "r2",
                vec![Condition::eq("hour", "22"), Condition::eq("batteryLevel", "low")],
            ),
            rule("r3", vec![Condition::eq("hour", "7")]),
            rule("r4", vec![]),
        ]);

        for snapshot in [
            ctx(&[("hour", "22"), ("geofence", "home"), ("batteryLevel", "low")]),
            ctx(&[("hour", "22"), ("geofence", "work")]),
            ctx(&[("hour", "7")]),
            ctx(&[("hour", "12")]),
            ctx(&[]),
        ] {
            let mut tree: Vec<String> = engine
                .evaluate(&snapshot)
                .into_iter()
                .map(|m| m.rule_id)
                .collect();
            let mut flat: Vec<String> = engine
                .evaluate_flat(&snapshot)
                .into_iter()
                .map(|m| m.rule_id)
                .collect();
            tree.sort();
            flat.sort();
            assert_eq!(tree, flat, "mismatch for {snapshot:?}");
        }
    }

    #[test]
    fn mutation_recompiles_tree() {
        let engine = RuleEngine::new(TreeConfig::default());
        engine.set_rules(vec![
            rule("r1", vec![Condition::eq("hour", "9")]),
            rule("r2", vec![Condition::eq("hour", "10")]),
            rule("r3", vec![Condition::eq("hour", "11")]),
        ]);
        let nodes_before = engine.tree_size();
        assert!(nodes_before > 1);

        assert!(engine.remove_rule("r3"));
        assert!(!engine.remove_rule("r3"));
        assert!(engine.tree_size() < nodes_before);

        assert!(engine.set_enabled("r1", false));
        assert!(engine.evaluate(&ctx(&[("hour", "9")])).is_empty());
        assert!(engine.set_enabled("r1", true));
        assert_eq!(engine.evaluate(&ctx(&[("hour", "9")])).len(), 1);
    }

    #[test]
    fn non_eq_conditions_still_match_via_leaf_checks() {
        let engine = RuleEngine::new(TreeConfig::default());
        engine.set_rules(vec![
            rule(
                "low_battery",
                vec![Condition {
                    key: "batteryLevel".into(),
                    op: ConditionOp::Lt,
                    value: "20".into(),
                }],
            ),
            rule("night", vec![Condition::eq("timeOfDay", "night")]),
            rule("morning", vec![Condition::eq("timeOfDay", "morning")]),
        ]);

        let matches = engine.evaluate(&ctx(&[("batteryLevel", "15"), ("timeOfDay", "night")]));
        let ids: Vec<_> = matches.iter().map(|m| m.rule_id.as_str()).collect();
        assert!(ids.contains(&"low_battery"));
        assert!(ids.contains(&"night"));
    }
}
