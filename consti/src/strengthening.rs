//! Direction-aware heuristic for whether a change strengthens a rule.
//!
//! This is advisory. It recognises a handful of shapes (constraint lists,
//! numeric limits with a telling key name, `require_*` switches) and answers
//! [`Strengthening::Indeterminate`] for everything else. Indeterminate
//! results are never treated as passing; they go to the court.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strengthening {
    Strengthens,
    Weakens,
    Indeterminate,
}

impl Strengthening {
    /// Fold two assessments: any weakening wins, then any uncertainty.
    pub fn combine(self, other: Self) -> Self {
        use Strengthening::*;
        match (self, other) {
            (Weakens, _) | (_, Weakens) => Weakens,
            (Indeterminate, _) | (_, Indeterminate) => Indeterminate,
            _ => Strengthens,
        }
    }
}

enum Direction {
    HigherIsStronger,
    LowerIsStronger,
}

const HIGHER_IS_STRONGER: &[&str] = &[
    "min",
    "minimum",
    "threshold",
    "quorum",
    "floor",
    "delay",
    "period",
    "days",
    "majority",
    "supermajority",
];
const LOWER_IS_STRONGER: &[&str] = &["max", "maximum", "limit", "ceiling", "cap"];
const TRUE_IS_STRONGER: &[&str] = &["require", "requires", "required", "enforce", "enforced", "must"];

fn key_of(path: &str) -> String {
    path.rsplit('.').next().unwrap_or(path).to_ascii_lowercase()
}

fn numeric_direction(key: &str) -> Option<Direction> {
    let tokens: Vec<&str> = key.split(['_', '-']).collect();
    if tokens.iter().any(|t| LOWER_IS_STRONGER.contains(t)) {
        Some(Direction::LowerIsStronger)
    } else if tokens.iter().any(|t| HIGHER_IS_STRONGER.contains(t)) {
        Some(Direction::HigherIsStronger)
    } else {
        None
    }
}

fn true_is_stronger(key: &str) -> bool {
    key.split(['_', '-'])
        .next()
        .is_some_and(|t| TRUE_IS_STRONGER.contains(&t))
}

/// Assess changing the value at `path` from `old` to `new`.
pub fn assess(path: &str, old: &Value, new: &Value) -> Strengthening {
    use Strengthening::*;
    if old == new {
        return Indeterminate;
    }
    match (old, new) {
        (Value::Null, _) => Strengthens,
        (_, Value::Null) => Weakens,
        (Value::Array(a), Value::Array(b)) => assess_set(a, b),
        (Value::Number(a), Value::Number(b)) => {
            let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                return Indeterminate;
            };
            match numeric_direction(&key_of(path)) {
                Some(Direction::HigherIsStronger) if b > a => Strengthens,
                Some(Direction::HigherIsStronger) => Weakens,
                Some(Direction::LowerIsStronger) if b < a => Strengthens,
                Some(Direction::LowerIsStronger) => Weakens,
                None => Indeterminate,
            }
        }
        (Value::Bool(_), Value::Bool(b)) if true_is_stronger(&key_of(path)) => {
            if *b {
                Strengthens
            } else {
                Weakens
            }
        }
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            let mut result: Option<Strengthening> = None;
            for key in keys {
                let old_child = a.get(key).unwrap_or(&Value::Null);
                let new_child = b.get(key).unwrap_or(&Value::Null);
                if old_child == new_child {
                    continue;
                }
                let child = assess(&format!("{path}.{key}"), old_child, new_child);
                result = Some(result.map_or(child, |r| r.combine(child)));
            }
            result.unwrap_or(Indeterminate)
        }
        _ => Indeterminate,
    }
}

/// Arrays are constraint sets: dropping a member weakens, adding only strengthens.
fn assess_set(old: &[Value], new: &[Value]) -> Strengthening {
    let removed = old.iter().any(|v| !new.contains(v));
    let added = new.iter().any(|v| !old.contains(v));
    match (removed, added) {
        (true, _) => Strengthening::Weakens,
        (false, true) => Strengthening::Strengthens,
        (false, false) => Strengthening::Indeterminate,
    }
}
