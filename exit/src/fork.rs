//! Fork legitimacy.
//!
//! A fork is legitimate when it keeps every axiom word for word, lets members
//! exit, and keeps every canonical invariant constraint. Anything it adds on
//! top is noted but does not count against it.

use charter_consti::{Breach, ConstitutionTables};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Legitimacy {
    Legitimate,
    Conditional,
    Illegitimate,
}

impl fmt::Display for Legitimacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legitimate => "legitimate",
            Self::Conditional => "conditional",
            Self::Illegitimate => "illegitimate",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ForkIssue {
    MissingAxiom { axiom: String },
    AlteredAxiom { axiom: String },
    ExitDisabled,
    /// The fork does not say whether exit is allowed.
    ExitUnspecified,
    MissingInvariant { invariant: String },
    WeakenedInvariant { invariant: String, removed: Vec<String> },
    ExtraAxiom { axiom: String },
    ExtraInvariant { invariant: String },
}

impl ForkIssue {
    pub fn legitimacy(&self) -> Legitimacy {
        match self {
            Self::MissingAxiom { .. }
            | Self::AlteredAxiom { .. }
            | Self::ExitDisabled
            | Self::MissingInvariant { .. }
            | Self::WeakenedInvariant { .. } => Legitimacy::Illegitimate,
            Self::ExitUnspecified => Legitimacy::Conditional,
            Self::ExtraAxiom { .. } | Self::ExtraInvariant { .. } => Legitimacy::Legitimate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkAssessment {
    pub legitimacy: Legitimacy,
    pub issues: Vec<ForkIssue>,
}

pub struct ForkEvaluator {
    canonical: ConstitutionTables,
}

impl ForkEvaluator {
    pub fn new(canonical_content: &Value) -> Self {
        Self {
            canonical: ConstitutionTables::from_content(canonical_content),
        }
    }

    pub fn from_tables(canonical: ConstitutionTables) -> Self {
        Self { canonical }
    }

    pub fn evaluate(&self, candidate: &Value) -> ForkAssessment {
        let tables = ConstitutionTables::from_content(candidate);
        let mut issues: Vec<ForkIssue> = self
            .canonical
            .breaches(candidate)
            .into_iter()
            .filter_map(|breach| match breach {
                Breach::AxiomRemoved { axiom } => Some(ForkIssue::MissingAxiom { axiom }),
                Breach::AxiomAltered { axiom } => Some(ForkIssue::AlteredAxiom { axiom }),
                // Forks are judged on their own exit switch below.
                Breach::ExitDisabled => None,
                Breach::InvariantRemoved { invariant } => Some(ForkIssue::MissingInvariant { invariant }),
                Breach::InvariantWeakened { invariant, removed } => {
                    Some(ForkIssue::WeakenedInvariant { invariant, removed })
                }
            })
            .collect();

        match tables.exit_allowed {
            Some(true) => {}
            Some(false) => issues.push(ForkIssue::ExitDisabled),
            None => issues.push(ForkIssue::ExitUnspecified),
        }
        for axiom in tables.axioms.keys() {
            if !self.canonical.axioms.contains_key(axiom) {
                issues.push(ForkIssue::ExtraAxiom { axiom: axiom.clone() });
            }
        }
        for name in tables.invariants.keys() {
            if !self.canonical.invariants.contains_key(name) {
                issues.push(ForkIssue::ExtraInvariant { invariant: name.clone() });
            }
        }

        let legitimacy = issues
            .iter()
            .map(ForkIssue::legitimacy)
            .max()
            .unwrap_or(Legitimacy::Legitimate);
        ForkAssessment { legitimacy, issues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_consti::default_constitution;
    use serde_json::json;

    fn evaluator() -> ForkEvaluator {
        ForkEvaluator::new(&default_constitution())
    }

    #[test]
    fn identical_copy_is_legitimate() {
        let a = evaluator().evaluate(&default_constitution());
        assert_eq!(a.legitimacy, Legitimacy::Legitimate);
        assert!(a.issues.is_empty());
    }

    #[test]
    fn additions_stay_legitimate() {
        let mut c = default_constitution();
        c["invariants"]["user_control"]["constraints"] = json!(["can_export", "can_delete", "can_pause"]);
        c["invariants"]["local_rule"] = json!({"constraints": ["x"]});
        let a = evaluator().evaluate(&c);
        assert_eq!(a.legitimacy, Legitimacy::Legitimate);
        assert_eq!(a.issues, vec![ForkIssue::ExtraInvariant { invariant: "local_rule".into() }]);
    }

    #[test]
    fn altered_axiom_is_illegitimate() {
        let mut c = default_constitution();
        c["axioms"]["right_to_exit"] = json!("Members may leave with approval.");
        assert_eq!(evaluator().evaluate(&c).legitimacy, Legitimacy::Illegitimate);
    }

    #[test]
    fn missing_axiom_is_illegitimate() {
        let mut c = default_constitution();
        c["axioms"].as_object_mut().unwrap().remove("data_ownership");
        let a = evaluator().evaluate(&c);
        assert_eq!(a.legitimacy, Legitimacy::Illegitimate);
        assert!(a.issues.contains(&ForkIssue::MissingAxiom { axiom: "data_ownership".into() }));
    }

    #[test]
    fn disabled_exit_is_illegitimate() {
        let mut c = default_constitution();
        c["governance"]["allow_exit"] = json!(false);
        assert_eq!(evaluator().evaluate(&c).legitimacy, Legitimacy::Illegitimate);
    }

    #[test]
    fn unspecified_exit_is_conditional() {
        let mut c = default_constitution();
        c["governance"].as_object_mut().unwrap().remove("allow_exit");
        assert_eq!(evaluator().evaluate(&c).legitimacy, Legitimacy::Conditional);
    }

    #[test]
    fn dropped_constraint_is_weakening() {
        let mut c = default_constitution();
        c["invariants"]["audit_trail"]["constraints"] = json!(["append_only", "signed"]);
        let a = evaluator().evaluate(&c);
        assert_eq!(a.legitimacy, Legitimacy::Illegitimate);
        assert_eq!(
            a.issues,
            vec![ForkIssue::WeakenedInvariant {
                invariant: "audit_trail".into(),
                removed: vec!["hash_chained".into()],
            }]
        );
    }
}
