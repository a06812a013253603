use proptest::prelude::*;
use serde_json::{json, Value};

use charter_ledger::migration::run;
use charter_ledger::{LedgerError, MigrationPlan, MigrationStep, StepAction, VersionBump, VersionManager};
use charter_types::Timestamp;

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    })
}

proptest! {
    /// Every version verifies right after it is created.
    #[test]
    fn fresh_versions_verify(contents in prop::collection::vec(tree(), 1..6)) {
        let m = VersionManager::new("main".into());
        m.create_genesis(contents[0].clone(), Timestamp::new(0)).unwrap();
        for (i, c) in contents.iter().enumerate().skip(1) {
            let v = m.create_version(c.clone(), None, "p", VersionBump::Patch, Timestamp::new(i as u64)).unwrap();
            prop_assert!(v.verify_integrity());
        }
        prop_assert!(m.verify_chain().is_ok());
    }

    /// A migration that fails at step k rolls back the k applied steps and
    /// leaves the content as it was.
    #[test]
    fn failed_migration_restores_content(n in 1usize..8, k in 0usize..8) {
        prop_assume!(k < n);
        let mut steps = Vec::new();
        for i in 0..n {
            let action = if i == k {
                StepAction::Remove { path: "features.does_not_exist".into() }
            } else {
                StepAction::Set { path: format!("features.f{i}"), value: json!(i) }
            };
            steps.push(MigrationStep::new(format!("s{i}"), action));
        }
        let start = json!({"features": {"keep": true}});
        match run(&MigrationPlan::new(steps), &start) {
            Err(LedgerError::MigrationFailed { index, rolled_back, .. }) => {
                prop_assert_eq!(index, k);
                prop_assert_eq!(rolled_back, k);
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
