use proptest::prelude::*;
use std::collections::BTreeMap;

use charter_governance::{
    tally, Delegation, DelegationGraph, GovernanceError, QuadraticWeighting, TallyRules, VoteChoice,
    VoteRecord,
};
use charter_types::{Chamber, MemberId, Timestamp};

fn rules() -> TallyRules {
    TallyRules {
        quorum: 0.2,
        threshold: 0.5,
        supermajority: 0.67,
        minority_protection_fraction: 0.1,
    }
}

fn choice() -> impl Strategy<Value = VoteChoice> {
    prop_oneof![
        Just(VoteChoice::For),
        Just(VoteChoice::Against),
        Just(VoteChoice::Abstain)
    ]
}

proptest! {
    /// sqrt dampening: 100x the stake gives 10x the power, anywhere inside
    /// the clamp range.
    #[test]
    fn quadratic_dampening(w in 0.01f64..100.0) {
        let q = QuadraticWeighting::new(0.1, 100.0);
        let ratio = q.power(100.0 * w) / q.power(w);
        prop_assert!((ratio - 10.0).abs() < 1e-9);
    }

    /// Power never leaves [floor, ceiling].
    #[test]
    fn quadratic_clamped(w in proptest::num::f64::ANY) {
        let q = QuadraticWeighting::new(0.1, 100.0);
        let p = q.power(w);
        prop_assert!((0.1..=100.0).contains(&p));
    }

    /// Tally depends only on the set of records, not on insertion order.
    #[test]
    fn tally_is_order_independent(
        ballots in prop::collection::vec((choice(), 0.1f64..50.0), 0..40),
        eligible in 40usize..100,
    ) {
        let records: Vec<VoteRecord> = ballots
            .iter()
            .enumerate()
            .map(|(i, (c, w))| VoteRecord {
                voter: MemberId::new(format!("v{i}")),
                choice: *c,
                weight: *w,
                effective_weight: w * w,
                chamber: Chamber::Users,
                cast_at: Timestamp::new(0),
                delegation_chain: vec![],
            })
            .collect();
        let forward: BTreeMap<MemberId, VoteRecord> =
            records.iter().map(|r| (r.voter.clone(), r.clone())).collect();
        let backward: BTreeMap<MemberId, VoteRecord> =
            records.iter().rev().map(|r| (r.voter.clone(), r.clone())).collect();
        let a = tally(&"s".into(), Chamber::Users, &forward, eligible, &rules());
        let b = tally(&"s".into(), Chamber::Users, &backward, eligible, &rules());
        prop_assert_eq!(a, b);
    }

    /// A delegation that would close a cycle is rejected and leaves the
    /// graph untouched.
    #[test]
    fn delegation_stays_acyclic(edges in prop::collection::vec((0u8..8, 0u8..8), 1..40)) {
        let mut graph = DelegationGraph::new(10);
        let now = Timestamp::new(0);
        for (a, b) in edges {
            let before = graph.delegations().count();
            let d = Delegation::new(format!("m{a}"), format!("m{b}"), 1.0, now);
            match graph.delegate(d, now) {
                Ok(()) => {}
                Err(GovernanceError::DelegationCycle { .. })
                | Err(GovernanceError::SelfDelegation)
                | Err(GovernanceError::DelegationCapExceeded { .. }) => {
                    prop_assert_eq!(graph.delegations().count(), before);
                }
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }
        // Following any member's edges never revisits a member.
        for start in 0..8u8 {
            let mut seen = std::collections::HashSet::new();
            let mut current = MemberId::new(format!("m{start}"));
            loop {
                prop_assert!(seen.insert(current.clone()));
                match graph.outgoing(&current, None, now).first() {
                    Some(d) => current = d.delegate.clone(),
                    None => break,
                }
            }
        }
    }
}
