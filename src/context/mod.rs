//! Context Engine - clinical priority scoring
//!
//! Pure function from a transaction (type tag + payload) and an optional
//! mempool stats snapshot to a priority breakdown. The weighting follows the
//! clinical formula P = 0.45·criticality + 0.35·sensitivity + 0.10·resources
//! + 0.10·compliance, clamped to [0, 1].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mempool::MempoolStats;

const W_CRITICALITY: f64 = 0.45;
const W_SENSITIVITY: f64 = 0.35;
const W_RESOURCES: f64 = 0.10;
const W_COMPLIANCE: f64 = 0.10;

/// Criticality keywords, scanned against type + payload text in this order;
/// the first match wins.
const CRITICALITY_KEYWORDS: &[(&str, f64)] = &[
    ("cardiac arrest", 0.95),
    ("stroke", 0.93),
    ("sepsis", 0.90),
    ("trauma", 0.90),
    ("prescription", 0.65),
    ("lab", 0.50),
    ("diagnostic", 0.50),
    ("routine", 0.35),
    ("checkup", 0.35),
];
const CRITICALITY_DEFAULT: f64 = 0.40;

/// Temporal urgency keywords, payload text only.
const SENSITIVITY_KEYWORDS: &[(&str, f64)] = &[
    ("stat", 0.95),
    ("urgent", 0.80),
    ("routine", 0.40),
];
const SENSITIVITY_DEFAULT: f64 = 0.50;

/// Regulatory keywords, payload text only.
const COMPLIANCE_KEYWORDS: &[(&str, f64)] = &[
    ("controlled substance", 0.50),
    ("prescription", 0.30),
];
const COMPLIANCE_DEFAULT: f64 = 0.10;

const RESOURCES_DEFAULT: f64 = 0.50;

/// Per-dimension scores plus the weighted aggregate, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityBreakdown {
    pub criticality: f64,
    pub sensitivity: f64,
    pub resources: f64,
    pub compliance: f64,
    pub priority: f64,
}

/// Scores transactions; holds no state of its own.
#[derive(Debug, Default, Clone)]
pub struct ContextEngine;

impl ContextEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score a transaction. `stats` is the mempool snapshot read once by the
    /// caller for this request; `None` falls back to neutral resources.
    pub fn score(
        &self,
        record_type: &str,
        payload: &serde_json::Map<String, Value>,
        stats: Option<&MempoolStats>,
    ) -> PriorityBreakdown {
        let payload_text = flatten_leaves(payload);
        let full_text = format!("{} {}", record_type.to_lowercase(), payload_text);

        let criticality = scan(&full_text, CRITICALITY_KEYWORDS, CRITICALITY_DEFAULT);
        let sensitivity = scan(&payload_text, SENSITIVITY_KEYWORDS, SENSITIVITY_DEFAULT);
        let compliance = scan(&payload_text, COMPLIANCE_KEYWORDS, COMPLIANCE_DEFAULT);
        let resources = stats.map(resource_score).unwrap_or(RESOURCES_DEFAULT);

        let priority = clamp01(
            W_CRITICALITY * criticality
                + W_SENSITIVITY * sensitivity
                + W_RESOURCES * resources
                + W_COMPLIANCE * compliance,
        );

        PriorityBreakdown {
            criticality,
            sensitivity,
            resources,
            compliance,
            priority,
        }
    }
}

/// Network pressure score: more online validators push it up, a fuller
/// mempool pushes it down.
fn resource_score(stats: &MempoolStats) -> f64 {
    let utilization = if stats.total_capacity == 0 {
        0.0
    } else {
        stats.total_size as f64 / stats.total_capacity as f64
    };
    let availability = if stats.validators_total == 0 {
        1.0
    } else {
        stats.validators_online as f64 / stats.validators_total as f64
    };
    clamp01(0.20 + 0.60 * availability - 0.50 * utilization)
}

fn scan(text: &str, keywords: &[(&str, f64)], default: f64) -> f64 {
    for (keyword, score) in keywords {
        if text.contains(keyword) {
            return *score;
        }
    }
    default
}

/// Depth-first concatenation of every string/number/boolean value leaf,
/// lowercased. Keys are not part of the search text.
fn flatten_leaves(payload: &serde_json::Map<String, Value>) -> String {
    let mut out = String::new();
    for value in payload.values() {
        collect_leaf(value, &mut out);
    }
    out
}

fn collect_leaf(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => push_leaf(out, &s.to_lowercase()),
        Value::Number(n) => push_leaf(out, &n.to_string()),
        Value::Bool(b) => push_leaf(out, if *b { "true" } else { "false" }),
        Value::Array(items) => {
            for item in items {
                collect_leaf(item, out);
            }
        }
        Value::Object(map) => {
            for nested in map.values() {
                collect_leaf(nested, out);
            }
        }
        Value::Null => {}
    }
}

fn push_leaf(out: &mut String, leaf: &str) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(leaf);
}

pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
