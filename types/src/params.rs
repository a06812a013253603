//! Governance parameters: every tunable threshold, ceiling and delay.
//!
//! None of these values has a derivation; they are policy. Every field is
//! serde-defaulted so a TOML `[governance]` table only needs to name the
//! values it overrides.

use serde::{Deserialize, Serialize};

use crate::{Category, Chamber};

/// What one chamber must reach for a proposal of a given category.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChamberRequirements {
    /// Minimum fraction of the roster that must vote.
    pub quorum: f64,
    /// Minimum for / (for + against) ratio.
    pub threshold: f64,
    /// Timelock this chamber asks for after approval.
    pub timelock_days: u64,
}

impl ChamberRequirements {
    pub const fn new(quorum: f64, threshold: f64, timelock_days: u64) -> Self {
        Self {
            quorum,
            threshold,
            timelock_days,
        }
    }
}

/// Requirements for both chambers of one category.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryRequirements {
    pub users: ChamberRequirements,
    pub guardians: ChamberRequirements,
}

impl CategoryRequirements {
    pub fn for_chamber(&self, chamber: Chamber) -> ChamberRequirements {
        match chamber {
            Chamber::Users => self.users,
            Chamber::Guardians => self.guardians,
        }
    }
}

/// All governance parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceParams {
    // ── Vote weighting ───────────────────────────────────────────────────
    /// Smallest vote power any eligible voter can have after sqrt dampening.
    pub quadratic_floor: f64,
    /// Largest vote power any single voter can have after sqrt dampening.
    pub quadratic_ceiling: f64,
    /// Maximum transitive delegation depth followed during resolution.
    pub delegation_max_depth: usize,

    // ── Thresholds ───────────────────────────────────────────────────────
    pub simple_majority: f64,
    pub supermajority: f64,
    /// If against-power reaches this fraction of all power cast, the chamber
    /// must clear the supermajority instead of its normal threshold.
    pub minority_protection_fraction: f64,

    // ── Per-category requirements ────────────────────────────────────────
    pub minor: CategoryRequirements,
    pub standard: CategoryRequirements,
    pub major: CategoryRequirements,
    pub constitutional: CategoryRequirements,
    /// Shortest timelock a fast-tracked minor proposal can get.
    pub fast_track_min_timelock_days: u64,

    // ── Court ────────────────────────────────────────────────────────────
    /// Fraction of active justices that must vote before a ruling can finalize.
    pub court_quorum_fraction: f64,
    /// Finalize automatic reviews that found a blocking violation without
    /// waiting for human justices.
    pub court_auto_finalize_blocking: bool,

    // ── Timelock ─────────────────────────────────────────────────────────
    /// Absolute minimum number of halt signatures.
    pub halt_min_signatures: usize,
    /// Minimum fraction of eligible signers that must sign a halt.
    pub halt_fraction: f64,
    /// Cap on cumulative approved extension days per timelock.
    pub max_extension_days: u64,

    // ── Proposals ────────────────────────────────────────────────────────
    pub min_title_len: usize,
    pub min_summary_len: usize,
    pub min_rationale_len: usize,
    pub default_voting_days: u64,
}

impl GovernanceParams {
    pub fn requirements(&self, category: Category) -> &CategoryRequirements {
        match category {
            Category::Minor => &self.minor,
            Category::Standard => &self.standard,
            Category::Major => &self.major,
            Category::Constitutional => &self.constitutional,
        }
    }

    /// Timelock for a category: the longer of the two chambers' demands.
    pub fn timelock_days(&self, category: Category) -> u64 {
        let req = self.requirements(category);
        req.users.timelock_days.max(req.guardians.timelock_days)
    }

    /// Check internal consistency. Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let unit = |name: &str, v: f64| -> Result<(), String> {
            if v.is_finite() && v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(format!("{name} must be in (0, 1], got {v}"))
            }
        };
        unit("simple_majority", self.simple_majority)?;
        unit("supermajority", self.supermajority)?;
        unit("minority_protection_fraction", self.minority_protection_fraction)?;
        unit("court_quorum_fraction", self.court_quorum_fraction)?;
        unit("halt_fraction", self.halt_fraction)?;
        if self.supermajority < self.simple_majority {
            return Err("supermajority must not be below simple_majority".to_string());
        }
        if !(self.quadratic_floor > 0.0) || self.quadratic_floor > self.quadratic_ceiling {
            return Err(format!(
                "quadratic floor {} must be positive and not exceed ceiling {}",
                self.quadratic_floor, self.quadratic_ceiling
            ));
        }
        for category in [
            Category::Minor,
            Category::Standard,
            Category::Major,
            Category::Constitutional,
        ] {
            let req = self.requirements(category);
            for chamber in Chamber::ALL {
                let c = req.for_chamber(chamber);
                unit(&format!("{category}.{chamber}.quorum"), c.quorum)?;
                unit(&format!("{category}.{chamber}.threshold"), c.threshold)?;
            }
        }
        if self.delegation_max_depth == 0 {
            return Err("delegation_max_depth must be at least 1".to_string());
        }
        if self.fast_track_min_timelock_days == 0 {
            return Err("fast-tracked proposals still need a timelock".to_string());
        }
        Ok(())
    }
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            quadratic_floor: 0.1,
            quadratic_ceiling: 100.0,
            delegation_max_depth: 10,

            simple_majority: 0.5,
            supermajority: 0.67,
            minority_protection_fraction: 0.10,

            minor: CategoryRequirements {
                users: ChamberRequirements::new(0.10, 0.5, 3),
                guardians: ChamberRequirements::new(0.30, 0.5, 2),
            },
            standard: CategoryRequirements {
                users: ChamberRequirements::new(0.20, 0.5, 7),
                guardians: ChamberRequirements::new(0.50, 0.6, 5),
            },
            major: CategoryRequirements {
                users: ChamberRequirements::new(0.30, 0.6, 14),
                guardians: ChamberRequirements::new(0.60, 0.67, 14),
            },
            constitutional: CategoryRequirements {
                users: ChamberRequirements::new(0.40, 0.75, 30),
                guardians: ChamberRequirements::new(0.75, 0.8, 30),
            },
            fast_track_min_timelock_days: 1,

            court_quorum_fraction: 0.6,
            court_auto_finalize_blocking: false,

            halt_min_signatures: 3,
            halt_fraction: 0.10,
            max_extension_days: 30,

            min_title_len: 5,
            min_summary_len: 20,
            min_rationale_len: 20,
            default_voting_days: 7,
        }
    }
}
