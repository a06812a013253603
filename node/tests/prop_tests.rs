use proptest::prelude::*;

use charter_consti::ValidationIssue;
use charter_node::{CharterConfig, LogFormat, NodeError};
use charter_types::{Chamber, ErrorClass, ProposalId};

fn issue() -> impl Strategy<Value = ValidationIssue> {
    prop_oneof![
        Just(ValidationIssue::NoChanges),
        Just(ValidationIssue::CourtRuledIncompatible),
        Just(ValidationIssue::MissingCourtRuling),
        Just(ValidationIssue::HashMismatch),
        prop_oneof![Just(Chamber::Users), Just(Chamber::Guardians)]
            .prop_map(|chamber| ValidationIssue::ChamberNotPassed { chamber }),
        "[a-z_]{1,12}".prop_map(|axiom| ValidationIssue::AxiomViolation {
            target: format!("axioms.{axiom}"),
            axiom,
        }),
    ]
}

proptest! {
    #[test]
    fn config_survives_toml(
        timeout in 1u64..600_000,
        reads in 1u32..10,
        writes in 1u32..10,
        lineage in "[a-z][a-z0-9-]{0,15}",
        max_concurrent in 1usize..256,
        term in 1u64..3650,
        json in any::<bool>(),
    ) {
        let config = CharterConfig {
            log_format: if json { LogFormat::Json } else { LogFormat::Human },
            store_timeout_ms: timeout,
            store_read_retries: reads,
            store_write_retries: writes,
            lineage,
            max_concurrent,
            justice_term_days: term,
            ..CharterConfig::default()
        };
        prop_assert!(config.validate().is_ok());
        let parsed = CharterConfig::from_toml_str(&config.to_toml_string()).unwrap();
        prop_assert_eq!(parsed, config);
    }

    /// A validation failure is a constitutional violation exactly when one
    /// of its issues is, and is never retried.
    #[test]
    fn validation_class_follows_issues(issues in prop::collection::vec(issue(), 1..6)) {
        let constitutional = issues.iter().any(ValidationIssue::is_constitutional);
        let err = NodeError::Validation { proposal: ProposalId::new("p"), issues };
        let expected = if constitutional {
            ErrorClass::ConstitutionalViolation
        } else {
            ErrorClass::Invalid
        };
        prop_assert_eq!(err.class(), expected);
        prop_assert!(!err.is_retryable());
    }
}
