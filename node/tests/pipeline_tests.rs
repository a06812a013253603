//! Integration tests exercising the full amendment pipeline:
//! submission → bicameral vote → court review → timelock → enactment.
//!
//! These tests wire every component together through [`Charter`] against the
//! in-memory `NullStore` and a deterministic `NullClock`, so whole-pipeline
//! behaviour is checked, not just each component in isolation.

use serde_json::{json, Value};
use std::sync::Arc;

use charter_consti::{default_constitution, ChangeKind, ProposalChange, ProposalStatus, ValidationIssue};
use charter_court::{Violation, ViolationKind};
use charter_crypto::{keypair_from_seed, sign_message};
use charter_exit::{ExitError, ExitStatus, ExitType, ForkRecord, Legitimacy};
use charter_governance::VoteChoice;
use charter_ledger::{LedgerError, LineageHealth, SemVer, VersionMetadata, VersionRecord};
use charter_node::{Charter, CharterConfig, NodeError};
use charter_nullables::{NullClock, NullStore};
use charter_store::{ForkStore, MemberDataStore, ProposalStore, VersionStore};
use charter_timelock::{halt_message, TimelockStatus};
use charter_types::{Chamber, ErrorClass, ForkId, MemberId, ProposalId, Roster, Verdict};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const T0: u64 = 1_700_000_000;

struct Harness {
    charter: Arc<Charter<NullStore>>,
    store: Arc<NullStore>,
    clock: Arc<NullClock>,
}

fn user(i: usize) -> MemberId {
    MemberId::new(format!("user-{i}"))
}

fn guardian(i: usize) -> MemberId {
    MemberId::new(format!("guardian-{i}"))
}

async fn harness(users: usize, guardians: usize) -> Harness {
    harness_with(CharterConfig::default(), users, guardians).await
}

async fn harness_with(config: CharterConfig, users: usize, guardians: usize) -> Harness {
    charter_utils::init_tracing();
    let store = Arc::new(NullStore::new());
    let clock = Arc::new(NullClock::new(T0));
    let charter = Charter::open(config, Arc::clone(&store), clock.clone())
        .await
        .expect("open charter");
    charter
        .set_roster(Chamber::Users, Roster::uniform((0..users).map(user)))
        .await
        .unwrap();
    charter
        .set_roster(Chamber::Guardians, Roster::uniform((0..guardians).map(guardian)))
        .await
        .unwrap();
    charter.bootstrap(default_constitution()).await.expect("genesis");
    Harness {
        charter: Arc::new(charter),
        store,
        clock,
    }
}

fn add_can_pause() -> Vec<ProposalChange> {
    vec![ProposalChange::new(
        ChangeKind::InvariantModify,
        "invariants.user_control.constraints",
        json!(["can_export", "can_delete"]),
        json!(["can_export", "can_delete", "can_pause"]),
        "members should be able to step back without leaving",
    )]
}

async fn submit_can_pause(h: &Harness, title: &str) -> ProposalId {
    h.charter
        .submit(
            user(0),
            title,
            "Adds the ability to pause participation to user control.",
            "Pausing is a gentler alternative to a complete exit for members.",
            add_can_pause(),
        )
        .await
        .expect("submit")
        .proposal
        .id()
        .clone()
}

/// Cast `yes` For and `no` Against votes in one chamber.
async fn vote(h: &Harness, id: &ProposalId, chamber: Chamber, yes: usize, no: usize) {
    let member = match chamber {
        Chamber::Users => user,
        Chamber::Guardians => guardian,
    };
    for i in 0..yes + no {
        let choice = if i < yes { VoteChoice::For } else { VoteChoice::Against };
        h.charter
            .cast_vote(id, chamber, &member(i), choice)
            .await
            .expect("cast vote");
    }
}

/// Drive a proposal through voting and a compatible ruling.
async fn timelocked(h: &Harness, title: &str, users: usize, guardians: usize) -> ProposalId {
    let id = submit_can_pause(h, title).await;
    h.charter.open_voting(&id, None).await.unwrap();
    vote(h, &id, Chamber::Users, users, 0).await;
    vote(h, &id, Chamber::Guardians, guardians, 0).await;
    h.clock.advance_days(7);
    let result = h.charter.close_voting(&id).await.unwrap();
    assert!(result.both_passed);
    let justice = MemberId::new("justice-1");
    if h.charter.active_justices().unwrap().is_empty() {
        h.charter.appoint_justice(justice.clone(), None).unwrap();
    }
    h.charter
        .court_vote(&id, &justice, Verdict::Compatible, "strengthens user control", vec![], vec![])
        .await
        .unwrap();
    h.charter.finalize_ruling(&id).await.unwrap();
    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::Timelocked);
    id
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_strengthening_amendment_is_enacted() {
    let h = harness(150, 5).await;
    let genesis = h.charter.current_version().unwrap();

    let submission = h
        .charter
        .submit(
            user(0),
            "Add can_pause to user control",
            "Adds the ability to pause participation to user control.",
            "Pausing is a gentler alternative to a complete exit for members.",
            add_can_pause(),
        )
        .await
        .unwrap();
    assert!(submission.report.is_valid());
    let id = submission.proposal.id().clone();

    h.charter.open_voting(&id, None).await.unwrap();
    vote(&h, &id, Chamber::Users, 80, 20).await;
    vote(&h, &id, Chamber::Guardians, 4, 1).await;

    assert!(h.charter.close_voting(&id).await.is_err(), "window still open");
    h.clock.advance_days(7);
    let result = h.charter.close_voting(&id).await.unwrap();
    assert!(result.both_passed);
    assert!(result.users.minority_protection_triggered);
    assert_eq!(result.timelock_days, 7);
    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::CourtReview);

    let justice = MemberId::new("justice-1");
    h.charter.appoint_justice(justice.clone(), None).unwrap();
    h.charter
        .court_vote(&id, &justice, Verdict::Compatible, "strengthens an invariant", vec![], vec![])
        .await
        .unwrap();
    let ruling = h.charter.finalize_ruling(&id).await.unwrap();
    assert_eq!(ruling.verdict, Some(Verdict::Compatible));

    let timelock = h.charter.timelock(&id).unwrap();
    assert_eq!(timelock.duration_days, 7);
    assert_eq!(timelock.status(), TimelockStatus::Active);
    assert!(!h.charter.check_ready(&id).await.unwrap());
    assert!(matches!(
        h.charter.enact(&id).await,
        Err(NodeError::Validation { .. })
    ));

    h.clock.advance_days(7);
    assert!(h.charter.check_ready(&id).await.unwrap());
    let version = h.charter.enact(&id).await.unwrap();

    assert_eq!(version.parent_version, Some(genesis.version));
    assert_ne!(version.content_hash, genesis.content_hash);
    assert!(version.verify_integrity());
    assert_eq!(
        version.content["invariants"]["user_control"]["constraints"],
        json!(["can_export", "can_delete", "can_pause"])
    );
    assert_eq!(version.proposal.as_ref(), Some(&id));
    assert_eq!(h.charter.current_version().unwrap(), version);
    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::Enacted);
    assert_eq!(h.charter.timelock(&id).unwrap().status(), TimelockStatus::Executed);
    assert_eq!(h.charter.metrics().proposals_enacted.get(), 1);
    assert_eq!(h.charter.metrics().votes_cast.get(), 105);
    h.charter.verify_chain().unwrap();
}

#[tokio::test]
async fn test_blocking_court_finding_rejects_passed_proposal() {
    let h = harness(150, 5).await;
    let id = submit_can_pause(&h, "Add can_pause to user control").await;
    h.charter.open_voting(&id, None).await.unwrap();
    vote(&h, &id, Chamber::Users, 80, 20).await;
    vote(&h, &id, Chamber::Guardians, 4, 1).await;
    h.clock.advance_days(7);
    assert!(h.charter.close_voting(&id).await.unwrap().both_passed);

    let justice = MemberId::new("justice-1");
    h.charter.appoint_justice(justice.clone(), None).unwrap();
    h.charter
        .court_vote(
            &id,
            &justice,
            Verdict::Incompatible,
            "reaches into an axiom",
            vec![Violation::blocking(
                ViolationKind::AxiomModification,
                "axioms.right_to_exit",
                "changes the exit axiom",
            )],
            vec![],
        )
        .await
        .unwrap();
    let ruling = h.charter.finalize_ruling(&id).await.unwrap();
    assert_eq!(ruling.verdict, Some(Verdict::Incompatible));

    let proposal = h.charter.proposal(&id).unwrap();
    assert_eq!(proposal.status(), ProposalStatus::Rejected);
    assert!(proposal.vote_results().values().all(|v| v.passed));

    let err = h.charter.enact(&id).await.unwrap_err();
    assert!(err.issues().contains(&ValidationIssue::CourtRuledIncompatible));
    assert!(err.to_string().contains("court ruled incompatible"));
    assert!(h.charter.timelock(&id).is_err());
    assert_eq!(h.charter.versions().unwrap().len(), 1);
}

#[tokio::test]
async fn test_axiom_change_rejected_at_submission() {
    let h = harness(10, 3).await;
    let err = h
        .charter
        .submit(
            user(1),
            "Soften the exit axiom",
            "Allow governance to restrict leaving in emergencies.",
            "Emergencies sometimes need members to stay put for a while.",
            vec![ProposalChange::new(
                ChangeKind::GovernanceModify,
                "axioms.right_to_exit",
                json!("Every member may leave at any time and take their data."),
                json!("Members may leave when governance allows it."),
                "emergency powers",
            )],
        )
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ConstitutionalViolation);
    assert!(err.issues().iter().any(ValidationIssue::is_constitutional));

    let stored = h.charter.proposals().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status(), ProposalStatus::Rejected);
    assert_eq!(h.charter.metrics().proposals_rejected.get(), 1);
}

#[tokio::test]
async fn test_failed_vote_rejects_without_court() {
    let h = harness(20, 5).await;
    let id = submit_can_pause(&h, "Add can_pause to user control").await;
    h.charter.open_voting(&id, Some(3)).await.unwrap();
    vote(&h, &id, Chamber::Users, 15, 0).await;
    vote(&h, &id, Chamber::Guardians, 1, 4).await;
    h.clock.advance_days(3);
    let result = h.charter.close_voting(&id).await.unwrap();
    assert!(result.user_passed);
    assert!(!result.guardian_passed);
    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::Rejected);
    assert!(h.charter.ruling(&id).is_err());
    assert_eq!(h.charter.metrics().open_sessions.get(), 0);
}

#[tokio::test]
async fn test_withdraw_cancels_open_sessions() {
    let h = harness(10, 3).await;
    let id = submit_can_pause(&h, "Add can_pause to user control").await;
    h.charter.open_voting(&id, None).await.unwrap();
    assert_eq!(h.charter.metrics().open_sessions.get(), 2);

    let stranger = user(5);
    assert!(h.charter.withdraw(&id, &stranger).await.is_err());
    h.charter.withdraw(&id, &user(0)).await.unwrap();

    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::Withdrawn);
    assert_eq!(h.charter.metrics().open_sessions.get(), 0);
    assert!(h
        .charter
        .cast_vote(&id, Chamber::Users, &user(1), VoteChoice::For)
        .await
        .is_err());
}

#[tokio::test]
async fn test_changed_vote_counts_once() {
    let h = harness(10, 3).await;
    let id = submit_can_pause(&h, "Add can_pause to user control").await;
    h.charter.open_voting(&id, None).await.unwrap();
    h.charter
        .cast_vote(&id, Chamber::Users, &user(1), VoteChoice::Against)
        .await
        .unwrap();
    assert!(h
        .charter
        .cast_vote(&id, Chamber::Users, &user(1), VoteChoice::For)
        .await
        .is_err());
    h.charter
        .change_vote(&id, Chamber::Users, &user(1), VoteChoice::For)
        .await
        .unwrap();
    let session = h.charter.session(&id, Chamber::Users).unwrap();
    assert_eq!(session.votes().len(), 1);
    assert_eq!(session.votes()[&user(1)].choice, VoteChoice::For);
}

// ---------------------------------------------------------------------------
// Halts and exits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_halt_signatures_stop_enactment() {
    let h = harness(20, 5).await;
    let id = timelocked(&h, "Add can_pause to user control", 20, 5).await;

    let outsider = MemberId::new("outsider");
    assert!(matches!(
        h.charter.sign_halt(&id, outsider, None).await,
        Err(NodeError::NotAMember(_))
    ));

    // 25 eligible signers at a 10% fraction and a floor of three.
    let first = h.charter.sign_halt(&id, user(1), Some("rushed".into())).await.unwrap();
    assert_eq!(first.signatures, 1);
    assert!(!first.halted);
    let again = h.charter.sign_halt(&id, user(1), None).await.unwrap();
    assert_eq!(again.signatures, 1, "re-signing is idempotent");
    assert!(!h.charter.sign_halt(&id, guardian(0), None).await.unwrap().halted);
    let third = h.charter.sign_halt(&id, user(2), None).await.unwrap();
    assert_eq!(third.signatures, 3);
    assert!(third.halted);

    assert_eq!(h.charter.timelock(&id).unwrap().status(), TimelockStatus::Halted);
    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::Halted);
    assert_eq!(h.charter.metrics().halts.get(), 1);

    h.clock.advance_days(30);
    assert!(h.charter.enact(&id).await.is_err());
    assert_eq!(h.charter.versions().unwrap().len(), 1);
}

#[tokio::test]
async fn test_attested_halt_checks_registered_key() {
    let h = harness(20, 5).await;
    let id = timelocked(&h, "Add can_pause to user control", 20, 5).await;
    let keys = keypair_from_seed(&[7u8; 32]);
    let signer = guardian(2);

    let signature = sign_message(&halt_message(&id), &keys.private);
    assert!(matches!(
        h.charter
            .sign_halt_attested(&id, signer.clone(), signature.clone(), None)
            .await,
        Err(NodeError::UnknownHaltKey(_))
    ));

    h.charter.register_halt_key(signer.clone(), keys.public.clone()).unwrap();
    let forged = sign_message(b"something else", &keys.private);
    assert!(h
        .charter
        .sign_halt_attested(&id, signer.clone(), forged, None)
        .await
        .is_err());
    let outcome = h
        .charter
        .sign_halt_attested(&id, signer, signature, Some("key compromise".into()))
        .await
        .unwrap();
    assert_eq!(outcome.signatures, 1);
    let timelock = h.charter.timelock(&id).unwrap();
    assert!(timelock.halt_signatures().all(|s| s.attested));
}

#[tokio::test]
async fn test_replacing_invariant_table_is_rejected_at_submission() {
    let h = harness(5, 3).await;
    let err = h
        .charter
        .submit(
            user(0),
            "Tidy the invariant table",
            "Replaces the invariant table with a cleaner layout.",
            "The current table has grown hard to read for new members.",
            vec![ProposalChange::new(
                ChangeKind::FeatureModify,
                "invariants",
                json!({}),
                json!({}),
                "start from a clean table",
            )],
        )
        .await
        .unwrap_err();
    let NodeError::Validation { proposal, issues } = &err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert!(issues.contains(&ValidationIssue::InvariantWeakened {
        target: "invariants.user_control".into()
    }));
    assert_eq!(err.class(), ErrorClass::ConstitutionalViolation);
    assert_eq!(h.charter.proposal(proposal).unwrap().status(), ProposalStatus::Rejected);
}

#[tokio::test]
async fn test_disabling_exit_is_rejected_at_submission() {
    let h = harness(5, 3).await;
    for (target, old, new) in [
        ("governance.allow_exit", json!(true), json!(false)),
        ("governance", json!({"allow_exit": true, "min_voting_days": 3}), json!({"min_voting_days": 5})),
    ] {
        let err = h
            .charter
            .submit(
                user(0),
                format!("Change {target}"),
                "Adjusts how members may leave the community.",
                "Frequent departures make long-running projects hard to plan.",
                vec![ProposalChange::new(ChangeKind::GovernanceModify, target, old, new, "stability")],
            )
            .await
            .unwrap_err();
        assert!(
            matches!(&err, NodeError::Validation { issues, .. } if issues.iter().any(|i| matches!(
                i,
                ValidationIssue::AxiomViolation { axiom, .. } if axiom == "right_to_exit"
            ))),
            "{target}: {err:?}"
        );
    }
    assert_eq!(h.charter.current_version().unwrap().content["governance"]["allow_exit"], json!(true));
}

#[tokio::test]
async fn test_enactment_reassesses_registered_forks() {
    let h = harness(20, 5).await;
    let fork = h
        .charter
        .register_fork(ForkId::new("fork-stale"), "Stale copy", None, &default_constitution())
        .await
        .unwrap();
    assert_eq!(fork.assessment.legitimacy, Legitimacy::Legitimate);

    let id = timelocked(&h, "Add can_pause to user control", 20, 5).await;
    h.clock.advance_days(7);
    h.charter.enact(&id).await.unwrap();

    assert_eq!(h.charter.fork(&fork.id).unwrap().assessment.legitimacy, Legitimacy::Illegitimate);
    let stored: ForkRecord = serde_json::from_slice(&h.store.get_fork(&fork.id).unwrap()).unwrap();
    assert_eq!(stored.assessment.legitimacy, Legitimacy::Illegitimate);

    let err = h
        .charter
        .request_exit(user(1), ExitType::Migrate { destination: fork.id.clone() })
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Exit(ExitError::IllegitimateDestination(_))));
}

#[tokio::test]
async fn test_exit_completes_during_halt_and_frozen_lineage() {
    let h = harness(20, 5).await;
    let id = timelocked(&h, "Add can_pause to user control", 20, 5).await;
    for signer in [user(1), user(2), user(3)] {
        h.charter.sign_halt(&id, signer, None).await.unwrap();
    }
    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::Halted);

    let genesis = h.charter.current_version().unwrap();
    tamper(&h, &genesis.version.to_string());
    assert!(!h.charter.verify_stored_version(genesis.version).await.unwrap());
    assert_eq!(h.charter.lineage_health().unwrap(), LineageHealth::Frozen);

    let leaver = user(0);
    let request = h.charter.request_exit(leaver.clone(), ExitType::Complete).await.unwrap();
    let summary = h.charter.prepare_exit(&request.id).await.unwrap();
    assert_eq!(summary.proposals, 1);
    assert_eq!(summary.votes, 1);
    let done = h.charter.complete_exit(&request.id).await.unwrap();
    assert_eq!(done.status, ExitStatus::Completed);
    assert_eq!(done.erased, Some(summary.total));
    assert!(h.store.export_member(&leaver).unwrap().items.is_empty());
    assert_eq!(h.charter.metrics().exits_completed.get(), 1);

    let pauser = user(4);
    let pause = h.charter.request_exit(pauser.clone(), ExitType::Pause).await.unwrap();
    h.charter.prepare_exit(&pause.id).await.unwrap();
    h.charter.complete_exit(&pause.id).await.unwrap();
    assert!(h.charter.is_paused(&pauser).unwrap());
    assert!(h.charter.resume(&pauser).unwrap());
}

#[tokio::test]
async fn test_exit_cancel_only_by_requester() {
    let h = harness(5, 3).await;
    let request = h.charter.request_exit(user(1), ExitType::ExportOnly).await.unwrap();
    assert!(h.charter.cancel_exit(&request.id, &user(2)).await.is_err());
    let cancelled = h.charter.cancel_exit(&request.id, &user(1)).await.unwrap();
    assert_eq!(cancelled.status, ExitStatus::Cancelled);
    assert!(h.charter.complete_exit(&request.id).await.is_err());
}

#[tokio::test]
async fn test_migration_requires_legitimate_fork() {
    let h = harness(5, 3).await;
    let mut keeps = default_constitution();
    keeps["features"] = json!({"dark_mode": true});
    let good = h
        .charter
        .register_fork(ForkId::new("fork-good"), "Good fork", None, &keeps)
        .await
        .unwrap();
    assert_ne!(good.assessment.legitimacy, Legitimacy::Illegitimate);

    let mut drops_exit = default_constitution();
    drops_exit["axioms"]
        .as_object_mut()
        .unwrap()
        .remove("right_to_exit");
    drops_exit["governance"]["allow_exit"] = json!(false);
    let bad = h
        .charter
        .register_fork(ForkId::new("fork-bad"), "Bad fork", None, &drops_exit)
        .await
        .unwrap();
    assert_eq!(bad.assessment.legitimacy, Legitimacy::Illegitimate);

    assert!(h
        .charter
        .request_exit(user(1), ExitType::Migrate { destination: bad.id.clone() })
        .await
        .is_err());
    h.charter
        .request_exit(user(1), ExitType::Migrate { destination: good.id.clone() })
        .await
        .unwrap();

    let child = h
        .charter
        .register_fork(ForkId::new("fork-child"), "Child", Some(good.id.clone()), &keeps)
        .await
        .unwrap();
    assert_eq!(
        h.charter.fork_lineage(&child.id).unwrap(),
        vec![child.id.clone(), good.id.clone()]
    );
}

// ---------------------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------------------

/// Rewrite a stored version's content without touching its hashes.
fn tamper(h: &Harness, version: &str) {
    let lineage = h.charter.config().lineage_id();
    let stored = h.store.get_version(&lineage, version).unwrap();
    let mut record: Value = serde_json::from_slice(&stored).unwrap();
    record["content"]["features"] = json!({"backdoor": true});
    assert!(h
        .store
        .tamper_version(&lineage, version, &serde_json::to_vec(&record).unwrap()));
}

#[tokio::test]
async fn test_tampered_version_freezes_lineage() {
    let h = harness(5, 3).await;
    let genesis = h.charter.current_version().unwrap();
    assert!(h.charter.verify_stored_version(genesis.version).await.unwrap());

    tamper(&h, &genesis.version.to_string());
    assert!(!h.charter.verify_stored_version(genesis.version).await.unwrap());
    assert_eq!(h.charter.lineage_health().unwrap(), LineageHealth::Frozen);
    assert_eq!(h.charter.metrics().integrity_failures.get(), 1);

    let err = h.charter.rollback_to(genesis.version, None).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Integrity);

    h.charter
        .acknowledge_incident(MemberId::new("operator"), "restored from backup")
        .await
        .unwrap();
    assert_eq!(h.charter.lineage_health().unwrap(), LineageHealth::Healthy);
}

#[tokio::test]
async fn test_failed_enactment_write_blocks_lineage_until_resynced() {
    let h = harness(20, 5).await;
    let id = timelocked(&h, "Add can_pause to user control", 20, 5).await;
    h.clock.advance_days(7);
    let lineage = h.charter.config().lineage_id();

    h.store.fail_next_writes(2);
    assert!(h.charter.enact(&id).await.is_err());
    assert_eq!(h.charter.lineage_health().unwrap(), LineageHealth::Inconsistent);
    assert_eq!(h.charter.metrics().integrity_failures.get(), 1);
    assert_eq!(h.store.list_versions(&lineage).unwrap().len(), 1);
    let err = h.charter.rollback_to(SemVer::GENESIS, None).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Integrity);

    h.charter
        .acknowledge_incident(MemberId::new("operator"), "store back online")
        .await
        .unwrap();
    assert_eq!(h.charter.lineage_health().unwrap(), LineageHealth::Healthy);
    assert_eq!(h.store.list_versions(&lineage).unwrap().len(), 2);
    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::Enacted);
    let stored: Value = serde_json::from_slice(&h.store.get_proposal(&id).unwrap()).unwrap();
    assert_eq!(stored["status"], json!("enacted"));

    let reopened = Charter::open(CharterConfig::default(), Arc::clone(&h.store), h.clock.clone())
        .await
        .unwrap();
    assert_eq!(reopened.current_version().unwrap(), h.charter.current_version().unwrap());
    assert_eq!(reopened.lineage_health().unwrap(), LineageHealth::Healthy);
}

#[tokio::test]
async fn test_import_rejects_successor_that_drops_invariants() {
    let h = harness(5, 3).await;
    let genesis = h.charter.current_version().unwrap();
    let mut content = genesis.content.clone();
    content["invariants"] = json!({});
    let record = VersionRecord {
        metadata: VersionMetadata {
            version: "1.1.0".parse().unwrap(),
            content_hash: charter_crypto::hash_canonical(&content).unwrap(),
            created_at: genesis.created_at,
            parent_version: Some(genesis.version),
            proposal_id: None,
            change_summary: "drop invariants".into(),
        },
        content,
    };
    let err = h
        .charter
        .import_version(&record.to_json().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Ledger(LedgerError::ProtectionBreached { .. })));
    assert_eq!(err.class(), ErrorClass::ConstitutionalViolation);
    assert_eq!(h.charter.versions().unwrap().len(), 1);
    assert_eq!(h.charter.lineage_health().unwrap(), LineageHealth::Healthy);
}

#[tokio::test]
async fn test_export_import_round_trip_into_fresh_lineage() {
    let h = harness(5, 3).await;
    let genesis = h.charter.current_version().unwrap();
    let exported = h.charter.export_version(genesis.version).unwrap();

    let store = Arc::new(NullStore::new());
    let fresh = Charter::open(CharterConfig::default(), store, Arc::new(NullClock::new(T0)))
        .await
        .unwrap();
    let imported = fresh.import_version(&exported).await.unwrap();
    assert_eq!(imported.content_hash, genesis.content_hash);

    let mut forged: Value = serde_json::from_str(&exported).unwrap();
    forged["content"]["features"] = json!({"injected": true});
    let other = Charter::open(
        CharterConfig::default(),
        Arc::new(NullStore::new()),
        Arc::new(NullClock::new(T0)),
    )
    .await
    .unwrap();
    assert!(other.import_version(&forged.to_string()).await.is_err());
}

// ---------------------------------------------------------------------------
// Storage and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_transient_storage_failures_are_retried() {
    let h = harness(10, 3).await;
    let id = submit_can_pause(&h, "Add can_pause to user control").await;

    h.store.fail_next_reads(2);
    h.charter.open_voting(&id, None).await.unwrap();
    assert_eq!(h.charter.metrics().storage_timeouts.get(), 2);

    h.store.fail_next_writes_after_apply(1);
    h.charter
        .cast_vote(&id, Chamber::Users, &user(1), VoteChoice::For)
        .await
        .unwrap();
    assert_eq!(h.charter.metrics().storage_timeouts.get(), 3);
    assert_eq!(h.charter.session(&id, Chamber::Users).unwrap().votes().len(), 1);
}

#[tokio::test]
async fn test_persistent_storage_failure_surfaces_as_retryable() {
    let h = harness(10, 3).await;
    let id = submit_can_pause(&h, "Add can_pause to user control").await;
    h.store.fail_next_reads(10);
    let err = h.charter.open_voting(&id, None).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.charter.metrics().storage_timeouts.get(), 3);
    assert_eq!(h.charter.proposal(&id).unwrap().status(), ProposalStatus::Submitted);
    assert!(h.charter.session(&id, Chamber::Users).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_proposals_progress_independently() {
    let h = harness(10, 3).await;
    let mut handles = Vec::new();
    for n in 0..8 {
        let charter = Arc::clone(&h.charter);
        handles.push(tokio::spawn(async move {
            let id = charter
                .submit(
                    user(n % 10),
                    format!("Proposal number {n}"),
                    "Adds the ability to pause participation to user control.",
                    "Pausing is a gentler alternative to a complete exit for members.",
                    add_can_pause(),
                )
                .await
                .unwrap()
                .proposal
                .id()
                .clone();
            charter.open_voting(&id, None).await.unwrap();
            for i in 0..10 {
                charter
                    .cast_vote(&id, Chamber::Users, &user(i), VoteChoice::For)
                    .await
                    .unwrap();
            }
            id
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    for id in &ids {
        assert_eq!(h.charter.session(id, Chamber::Users).unwrap().votes().len(), 10);
    }
    assert_eq!(h.charter.metrics().votes_cast.get(), 80);
    assert_eq!(h.charter.metrics().open_sessions.get(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_votes_on_one_session_are_not_lost() {
    let h = harness(40, 3).await;
    let id = submit_can_pause(&h, "Add can_pause to user control").await;
    h.charter.open_voting(&id, None).await.unwrap();
    let mut handles = Vec::new();
    for i in 0..40 {
        let charter = Arc::clone(&h.charter);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            charter
                .cast_vote(&id, Chamber::Users, &user(i), VoteChoice::For)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(h.charter.session(&id, Chamber::Users).unwrap().votes().len(), 40);
}

#[tokio::test]
async fn test_reopen_restores_pipeline_state() {
    let h = harness(20, 5).await;
    let id = timelocked(&h, "Add can_pause to user control", 20, 5).await;

    let reopened = Charter::open(CharterConfig::default(), Arc::clone(&h.store), h.clock.clone())
        .await
        .unwrap();
    assert_eq!(reopened.proposal(&id).unwrap(), h.charter.proposal(&id).unwrap());
    assert_eq!(reopened.timelock(&id).unwrap(), h.charter.timelock(&id).unwrap());
    assert_eq!(reopened.current_version().unwrap(), h.charter.current_version().unwrap());
    assert_eq!(reopened.lineage_health().unwrap(), LineageHealth::Healthy);
    assert_eq!(reopened.metrics().active_timelocks.get(), 1);

    h.clock.advance_days(7);
    let version = reopened.enact(&id).await.unwrap();
    assert_eq!(version.parent_version, Some(h.charter.current_version().unwrap().version));
}
