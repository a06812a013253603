//! Prometheus metrics for the Charter engine.
//!
//! The [`CharterMetrics`] struct owns a dedicated [`Registry`]; an outer
//! surface can serve [`CharterMetrics::encode`] as the text exposition.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

/// Central collection of all engine-level Prometheus metrics.
pub struct CharterMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub proposals_submitted: IntCounter,
    /// Proposals rejected at validation, by vote, or by the court.
    pub proposals_rejected: IntCounter,
    pub proposals_enacted: IntCounter,
    pub votes_cast: IntCounter,
    /// Court rulings finalized.
    pub court_rulings: IntCounter,
    pub halts: IntCounter,
    /// Version or audit records that failed an integrity check.
    pub integrity_failures: IntCounter,
    /// Migrations that failed and were rolled back.
    pub migration_rollbacks: IntCounter,
    pub exits_completed: IntCounter,
    pub storage_timeouts: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Timelocks not yet executed, halted or cancelled.
    pub active_timelocks: IntGauge,
    /// Voting sessions opened and not yet finalized or cancelled.
    pub open_sessions: IntGauge,
}

impl CharterMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        // Counters
        let proposals_submitted = register_int_counter_with_registry!(
            Opts::new(
                "charter_proposals_submitted_total",
                "Total proposals submitted"
            ),
            registry
        )
        .expect("failed to register proposals_submitted counter");

        let proposals_rejected = register_int_counter_with_registry!(
            Opts::new(
                "charter_proposals_rejected_total",
                "Total proposals rejected by validation, vote or court"
            ),
            registry
        )
        .expect("failed to register proposals_rejected counter");

        let proposals_enacted = register_int_counter_with_registry!(
            Opts::new(
                "charter_proposals_enacted_total",
                "Total proposals enacted as new constitution versions"
            ),
            registry
        )
        .expect("failed to register proposals_enacted counter");

        let votes_cast = register_int_counter_with_registry!(
            Opts::new("charter_votes_cast_total", "Total chamber votes cast or changed"),
            registry
        )
        .expect("failed to register votes_cast counter");

        let court_rulings = register_int_counter_with_registry!(
            Opts::new("charter_court_rulings_total", "Total court rulings finalized"),
            registry
        )
        .expect("failed to register court_rulings counter");

        let halts = register_int_counter_with_registry!(
            Opts::new("charter_halts_total", "Total timelocks halted by signature"),
            registry
        )
        .expect("failed to register halts counter");

        let integrity_failures = register_int_counter_with_registry!(
            Opts::new(
                "charter_integrity_failures_total",
                "Total version or audit integrity check failures"
            ),
            registry
        )
        .expect("failed to register integrity_failures counter");

        let migration_rollbacks = register_int_counter_with_registry!(
            Opts::new(
                "charter_migration_rollbacks_total",
                "Total migrations that failed and were rolled back"
            ),
            registry
        )
        .expect("failed to register migration_rollbacks counter");

        let exits_completed = register_int_counter_with_registry!(
            Opts::new("charter_exits_completed_total", "Total exit requests completed"),
            registry
        )
        .expect("failed to register exits_completed counter");

        let storage_timeouts = register_int_counter_with_registry!(
            Opts::new(
                "charter_storage_timeouts_total",
                "Total storage calls that exceeded their deadline"
            ),
            registry
        )
        .expect("failed to register storage_timeouts counter");

        // Gauges
        let active_timelocks = register_int_gauge_with_registry!(
            Opts::new("charter_active_timelocks", "Timelocks still awaiting execution"),
            registry
        )
        .expect("failed to register active_timelocks gauge");

        let open_sessions = register_int_gauge_with_registry!(
            Opts::new("charter_open_sessions", "Voting sessions not yet finalized"),
            registry
        )
        .expect("failed to register open_sessions gauge");

        Self {
            registry,
            proposals_submitted,
            proposals_rejected,
            proposals_enacted,
            votes_cast,
            court_rulings,
            halts,
            integrity_failures,
            migration_rollbacks,
            exits_completed,
            storage_timeouts,
            active_timelocks,
            open_sessions,
        }
    }

    /// Encode every metric in the Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for CharterMetrics {
    fn default() -> Self {
        Self::new()
    }
}
