//! Cost-aware decision-tree compiler for the rule engine.
//!
//! Flat rules compile into a tree whose interior nodes split on the feature
//! with the best coverage-per-cost score, cheap features first. Nodes live
//! in a single arena vector and reference each other by index; a parent's
//! slot is reserved before its children are built so indices stay stable
//! while the vector grows.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::TreeConfig;
use crate::types::ContextMap;

use super::{ConditionOp, Rule};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Empty string marks a leaf.
    pub split_key: String,
    /// (context value, child index) pairs, first-seen value order.
    pub branches: Vec<(String, usize)>,
    /// Child taken when no branch value matches.
    pub default_child: Option<usize>,
    /// Candidate rules checked flat at a leaf.
    pub rule_indices: Vec<usize>,
}

/// Acquisition cost per feature, cheaper first: time features are free,
/// device state is cached, motion needs a low-power sensor, location needs
/// GPS.
fn feature_cost(key: &str) -> u32 {
    match key {
        "timeOfDay" | "dayOfWeek" | "isWeekend" | "hour" | "minute" => 0,
        "batteryLevel" | "isCharging" | "networkType" => 1,
        "motionState" | "stepCount" => 2,
        "geofence" | "location" | "latitude" | "longitude" => 3,
        _ => 2,
    }
}

/// Best split key among the keys the remaining rules use, excluding keys
/// already split on. Score = coverage / (1 + cost); ties keep the
/// first-seen key.
fn pick_split_key(rules: &[Rule], indices: &[usize], used_keys: &HashSet<String>) -> String {
    let mut key_counts: Vec<(String, u32)> = Vec::new();
    for &idx in indices {
        for cond in &rules[idx].conditions {
            if used_keys.contains(&cond.key) {
                continue;
            }
            match key_counts.iter_mut().find(|(k, _)| *k == cond.key) {
                Some((_, count)) => *count += 1,
                None => key_counts.push((cond.key.clone(), 1)),
            }
        }
    }

    let mut best_key = String::new();
    let mut best_score = -1.0;
    for (key, count) in key_counts {
        let score = count as f64 / (1.0 + feature_cost(&key) as f64);
        if score > best_score {
            best_score = score;
            best_key = key;
        }
    }
    best_key
}

/// Compile enabled rules into a tree. An empty result means nothing to
/// evaluate.
pub fn compile(rules: &[Rule], config: &TreeConfig) -> Vec<TreeNode> {
    let mut tree = Vec::new();

    let enabled: Vec<usize> = rules
        .iter()
        .enumerate()
        .filter(|(_, r)| r.enabled)
        .map(|(i, _)| i)
        .collect();
    if enabled.is_empty() {
        return tree;
    }

    build(rules, config, &mut tree, enabled, &HashSet::new());
    tree
}

fn build(
    rules: &[Rule],
    config: &TreeConfig,
    tree: &mut Vec<TreeNode>,
    indices: Vec<usize>,
    used_keys: &HashSet<String>,
) -> usize {
    // Reserve this node's slot before recursing; children grow the vector.
    let node_idx = tree.len();
    tree.push(TreeNode::default());

    let split_key = pick_split_key(rules, &indices, used_keys);

    if split_key.is_empty()
        || indices.len() <= config.max_leaf_rules
        || used_keys.len() >= config.max_split_depth
    {
        tree[node_idx].rule_indices = indices;
        return node_idx;
    }

    // Group rules by their first eq-condition value on the split key; rules
    // without one match regardless of the branch taken.
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    let mut no_condition: Vec<usize> = Vec::new();

    for &idx in &indices {
        let eq_value = rules[idx]
            .conditions
            .iter()
            .find(|c| c.key == split_key && c.op == ConditionOp::Eq)
            .map(|c| c.value.clone());
        match eq_value {
            Some(value) => match groups.iter_mut().find(|(v, _)| *v == value) {
                Some((_, bucket)) => bucket.push(idx),
                None => groups.push((value, vec![idx])),
            },
            None => no_condition.push(idx),
        }
    }

    let mut child_used_keys = used_keys.clone();
    child_used_keys.insert(split_key.clone());
    tree[node_idx].split_key = split_key;

    for (value, mut bucket) in groups {
        bucket.extend(no_condition.iter().copied());
        let child_idx = build(rules, config, tree, bucket, &child_used_keys);
        tree[node_idx].branches.push((value, child_idx));
    }

    if !no_condition.is_empty() {
        let default_idx = build(rules, config, tree, no_condition, &child_used_keys);
        tree[node_idx].default_child = Some(default_idx);
    }

    node_idx
}

/// Walk the tree for a context; returns matched rule indices. Leaf
/// candidates are condition-checked flat, so non-eq operators stay correct.
pub fn evaluate(tree: &[TreeNode], rules: &[Rule], ctx: &ContextMap) -> Vec<usize> {
    let Some(mut node) = tree.first() else {
        return Vec::new();
    };

    loop {
        if node.split_key.is_empty() {
            return node
                .rule_indices
                .iter()
                .copied()
                .filter(|&idx| rules[idx].matches(ctx))
                .collect();
        }

        let branch = ctx.get(&node.split_key).and_then(|value| {
            node.branches
                .iter()
                .find(|(v, _)| v == value)
                .map(|(_, child)| *child)
        });

        match branch.or(node.default_child) {
            Some(child) => node = &tree[child],
            None => return Vec::new(),
        }
    }
}
