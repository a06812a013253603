//! Axioms and invariants: the protected tables of the constitution.
//!
//! Axioms can never be changed by any process. Invariants may only be
//! strengthened. Both live in the content tree under `axioms` and
//! `invariants`; an invariant is an object with a `constraints` array.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::content::get_path;

/// The fixed axiom identifiers.
pub const AXIOM_IDS: [&str; 5] = [
    "human_agency",
    "right_to_exit",
    "transparency_of_rules",
    "no_hidden_coercion",
    "data_ownership",
];

pub const AXIOMS_ROOT: &str = "axioms";
pub const INVARIANTS_ROOT: &str = "invariants";
pub const GOVERNANCE_ROOT: &str = "governance";
pub const FEATURES_ROOT: &str = "features";

/// The governance switch the `right_to_exit` axiom depends on.
pub const EXIT_SETTING: &str = "governance.allow_exit";
const EXIT_KEY: &str = "allow_exit";
const EXIT_AXIOM: &str = "right_to_exit";

/// Whether `path` touches an axiom, and which one.
///
/// A path touches an axiom if it lies under the axiom table or if its first
/// segment is itself an axiom identifier. Touching the table root names
/// every axiom, reported as `"axioms"`.
pub fn axiom_touched(path: &str) -> Option<String> {
    let mut parts = path.split('.').map(str::trim);
    let first = parts.next()?;
    if first == AXIOMS_ROOT {
        return Some(parts.next().unwrap_or(AXIOMS_ROOT).to_string());
    }
    AXIOM_IDS
        .iter()
        .find(|id| **id == first)
        .map(|id| id.to_string())
}

/// The invariant a path falls under, if any.
pub fn invariant_touched(path: &str) -> Option<&str> {
    let mut parts = path.split('.').map(str::trim);
    if parts.next()? != INVARIANTS_ROOT {
        return None;
    }
    parts.next().filter(|s| !s.is_empty())
}

/// Whether `path` is the invariant table itself or anything inside it.
/// Writing the root replaces every invariant at once.
pub fn touches_invariant_table(path: &str) -> bool {
    path.split('.').next().map(str::trim) == Some(INVARIANTS_ROOT)
}

/// The axiom a write of `new_value` at `path` would void by leaving exit
/// anything other than explicitly allowed.
pub fn exit_axiom_voided(path: &str, new_value: &Value) -> Option<String> {
    let parts: Vec<&str> = path.split('.').map(str::trim).collect();
    let allowed = match parts.as_slice() {
        [GOVERNANCE_ROOT, EXIT_KEY] => new_value.as_bool(),
        [GOVERNANCE_ROOT] => new_value.get(EXIT_KEY).and_then(Value::as_bool),
        _ => return None,
    };
    (allowed != Some(true)).then(|| EXIT_AXIOM.to_string())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// A protection one content tree has and another gives up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "breach", rename_all = "snake_case")]
pub enum Breach {
    AxiomRemoved { axiom: String },
    AxiomAltered { axiom: String },
    ExitDisabled,
    InvariantRemoved { invariant: String },
    InvariantWeakened { invariant: String, removed: Vec<String> },
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AxiomRemoved { axiom } => write!(f, "axiom {axiom} removed"),
            Self::AxiomAltered { axiom } => write!(f, "axiom {axiom} altered"),
            Self::ExitDisabled => f.write_str("exit disabled"),
            Self::InvariantRemoved { invariant } => write!(f, "invariant {invariant} removed"),
            Self::InvariantWeakened { invariant, removed } => {
                write!(f, "invariant {invariant} lost {}", removed.join(", "))
            }
        }
    }
}

/// Axioms, invariants and the exit switch extracted from one content tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstitutionTables {
    pub axioms: BTreeMap<String, Value>,
    pub invariants: BTreeMap<String, Invariant>,
    pub exit_allowed: Option<bool>,
}

impl ConstitutionTables {
    /// Extract the tables. Malformed invariant entries are read as having no
    /// constraints, which makes any comparison against them fail safe.
    pub fn from_content(content: &Value) -> Self {
        let axioms = get_path(content, AXIOMS_ROOT)
            .and_then(Value::as_object)
            .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let invariants = get_path(content, INVARIANTS_ROOT)
            .and_then(Value::as_object)
            .map(|o| {
                o.iter()
                    .map(|(k, v)| {
                        let inv = serde_json::from_value(v.clone()).unwrap_or_default();
                        (k.clone(), inv)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            axioms,
            invariants,
            exit_allowed: exit_allowed(content),
        }
    }

    /// Everything `candidate` gives up relative to these tables: a removed
    /// or reworded axiom, exit switched off (or dropped where it was on), a
    /// removed invariant, or a canonical constraint missing from its
    /// invariant. Additions are never breaches.
    pub fn breaches(&self, candidate: &Value) -> Vec<Breach> {
        let theirs = Self::from_content(candidate);
        let mut found = Vec::new();
        for (axiom, text) in &self.axioms {
            match theirs.axioms.get(axiom) {
                None => found.push(Breach::AxiomRemoved { axiom: axiom.clone() }),
                Some(other) if other != text => found.push(Breach::AxiomAltered { axiom: axiom.clone() }),
                Some(_) => {}
            }
        }
        let exit_dropped = self.exit_allowed == Some(true) && theirs.exit_allowed.is_none();
        if theirs.exit_allowed == Some(false) || exit_dropped {
            found.push(Breach::ExitDisabled);
        }
        for (name, invariant) in &self.invariants {
            let Some(other) = theirs.invariants.get(name) else {
                found.push(Breach::InvariantRemoved { invariant: name.clone() });
                continue;
            };
            let removed: Vec<String> = invariant
                .constraints
                .iter()
                .filter(|c| !other.constraints.contains(c))
                .cloned()
                .collect();
            if !removed.is_empty() {
                found.push(Breach::InvariantWeakened {
                    invariant: name.clone(),
                    removed,
                });
            }
        }
        found
    }
}

/// Whether exit is allowed by a content tree's own governance settings.
/// `None` when the setting is absent.
pub fn exit_allowed(content: &Value) -> Option<bool> {
    get_path(content, "governance.allow_exit").and_then(Value::as_bool)
}

/// The constitution every lineage starts from unless another is supplied.
pub fn default_constitution() -> Value {
    json!({
        "axioms": {
            "human_agency": "Humans retain final authority over decisions that affect them.",
            "right_to_exit": "Every member may leave at any time and take their data.",
            "transparency_of_rules": "All rules in force are published and readable by members.",
            "no_hidden_coercion": "No mechanism may compel members through undisclosed means.",
            "data_ownership": "Members own the data they contribute."
        },
        "invariants": {
            "user_control": {
                "description": "Members control their own participation.",
                "constraints": ["can_export", "can_delete"]
            },
            "audit_trail": {
                "description": "Every enacted change is recorded and attributable.",
                "constraints": ["hash_chained", "append_only"]
            }
        },
        "governance": {
            "allow_exit": true,
            "min_voting_days": 3
        },
        "features": {}
    })
}
