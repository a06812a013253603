use proptest::prelude::*;

use charter_court::{CourtRuling, JusticeVote, Violation, ViolationKind};
use charter_types::{MemberId, Timestamp, Verdict};

fn verdict() -> impl Strategy<Value = Verdict> {
    prop_oneof![
        Just(Verdict::Compatible),
        Just(Verdict::Incompatible),
        Just(Verdict::Conditional),
        Just(Verdict::Abstain),
    ]
}

fn ruling_with(votes: &[Verdict]) -> CourtRuling {
    let mut ruling = CourtRuling::open("p".into(), Vec::new(), Timestamp::new(0));
    for (i, v) in votes.iter().enumerate() {
        let justice = MemberId::new(format!("j{i}"));
        ruling.votes.insert(
            justice.clone(),
            JusticeVote {
                justice,
                verdict: *v,
                reasoning: String::new(),
                violations: Vec::new(),
                cast_at: Timestamp::new(1),
            },
        );
    }
    ruling
}

proptest! {
    /// A blocking violation makes the ruling incompatible whatever the votes.
    #[test]
    fn blocking_always_incompatible(votes in prop::collection::vec(verdict(), 0..12)) {
        let mut ruling = ruling_with(&votes);
        ruling.automatic_findings.push(Violation::blocking(
            ViolationKind::InvariantWeakening,
            "invariants.audit_trail.constraints",
            "drops a constraint",
        ));
        prop_assert_eq!(ruling.decide(), Verdict::Incompatible);
    }

    /// A unanimous non-abstaining court gets its verdict.
    #[test]
    fn unanimity_is_respected(v in verdict(), n in 1usize..9) {
        prop_assume!(v != Verdict::Abstain);
        let ruling = ruling_with(&vec![v; n]);
        prop_assert_eq!(ruling.decide(), v);
    }

    /// The decided verdict is never Abstain.
    #[test]
    fn never_decides_abstain(votes in prop::collection::vec(verdict(), 0..12)) {
        prop_assert_ne!(ruling_with(&votes).decide(), Verdict::Abstain);
    }
}
