//! The version chain of one constitution lineage.
//!
//! History is append-only. Rollback creates a new version with old content.
//! An integrity failure freezes the lineage and a failed migration rollback
//! marks it inconsistent; either way writes stop until an operator
//! acknowledges the incident.

use charter_consti::ConstitutionTables;
use charter_types::{LineageId, MemberId, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::audit::{verify_audit_chain, AuditCursor, AuditEntry};
use crate::diff::{diff, VersionDiff};
use crate::error::LedgerError;
use crate::export::VersionRecord;
use crate::migration::{run, MigrationOutcome, MigrationPlan};
use crate::version::{ConstitutionVersion, SemVer, VersionBump};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageHealth {
    Healthy,
    /// An integrity check failed.
    Frozen,
    /// A migration rollback did not restore the prior content.
    Inconsistent,
}

impl fmt::Display for LineageHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Frozen => "frozen",
            Self::Inconsistent => "inconsistent",
        })
    }
}

struct LineageState {
    versions: Vec<ConstitutionVersion>,
    health: LineageHealth,
    audit: Vec<AuditEntry>,
    cursor: AuditCursor,
}

impl LineageState {
    fn current(&self) -> Option<&ConstitutionVersion> {
        self.versions.last()
    }

    fn find(&self, version: SemVer) -> Result<&ConstitutionVersion, LedgerError> {
        self.versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| LedgerError::VersionNotFound(version.to_string()))
    }

    fn audit(&mut self, action: &str, actor: Option<MemberId>, detail: Value, now: Timestamp) -> Result<(), LedgerError> {
        let entry = self.cursor.append(action, actor, detail, now)?;
        self.audit.push(entry);
        Ok(())
    }

    fn push(&mut self, mut version: ConstitutionVersion) -> ConstitutionVersion {
        if let Some(prev) = self.versions.last_mut() {
            prev.is_current = false;
        }
        version.is_current = true;
        self.versions.push(version.clone());
        version
    }
}

pub struct VersionManager {
    lineage: LineageId,
    state: Mutex<LineageState>,
}

impl VersionManager {
    pub fn new(lineage: LineageId) -> Self {
        Self {
            state: Mutex::new(LineageState {
                versions: Vec::new(),
                health: LineageHealth::Healthy,
                audit: Vec::new(),
                cursor: AuditCursor::genesis(lineage.clone()),
            }),
            lineage,
        }
    }

    /// Rebuild from stored history. Every version and the audit chain are
    /// checked; a lineage that fails comes back frozen.
    pub fn restore(lineage: LineageId, versions: Vec<ConstitutionVersion>, audit: Vec<AuditEntry>) -> Self {
        let check = verify_versions(&versions).and_then(|()| verify_audit_chain(&audit));
        let health = match &check {
            Ok(()) => LineageHealth::Healthy,
            Err(e) => {
                error!(target: "charter::alert", %lineage, error = %e, "lineage failed verification on restore");
                LineageHealth::Frozen
            }
        };
        info!(%lineage, versions = versions.len(), %health, "lineage restored");
        Self {
            state: Mutex::new(LineageState {
                cursor: AuditCursor::resume(lineage.clone(), &audit),
                versions,
                health,
                audit,
            }),
            lineage,
        }
    }

    pub fn lineage(&self) -> &LineageId {
        &self.lineage
    }

    fn lock(&self) -> Result<MutexGuard<'_, LineageState>, LedgerError> {
        Ok(self.state.lock()?)
    }

    fn writable(&self) -> Result<MutexGuard<'_, LineageState>, LedgerError> {
        let state = self.lock()?;
        if state.health != LineageHealth::Healthy {
            return Err(LedgerError::LineageBlocked {
                lineage: self.lineage.clone(),
                health: state.health,
            });
        }
        Ok(state)
    }

    pub fn health(&self) -> Result<LineageHealth, LedgerError> {
        Ok(self.lock()?.health)
    }

    /// The first version of the lineage. Only allowed once.
    pub fn create_genesis(&self, content: Value, now: Timestamp) -> Result<ConstitutionVersion, LedgerError> {
        let mut state = self.writable()?;
        if !state.versions.is_empty() {
            return Err(LedgerError::GenesisExists(self.lineage.clone()));
        }
        let version = ConstitutionVersion::build(SemVer::GENESIS, content, None, None, "genesis".into(), now)?;
        state.audit(
            "genesis",
            None,
            json!({"version": version.version, "content_hash": version.content_hash}),
            now,
        )?;
        info!(lineage = %self.lineage, version = %version.version, "genesis version created");
        Ok(state.push(version))
    }

    /// Append a version derived from the current one by `bump`.
    pub fn create_version(
        &self,
        content: Value,
        proposal: Option<ProposalId>,
        summary: impl Into<String>,
        bump: VersionBump,
        now: Timestamp,
    ) -> Result<ConstitutionVersion, LedgerError> {
        let mut state = self.writable()?;
        Self::append(&self.lineage, &mut state, content, proposal, summary.into(), bump, None, now)
    }

    #[allow(clippy::too_many_arguments)]
    fn append(
        lineage: &LineageId,
        state: &mut LineageState,
        content: Value,
        proposal: Option<ProposalId>,
        summary: String,
        bump: VersionBump,
        actor: Option<MemberId>,
        now: Timestamp,
    ) -> Result<ConstitutionVersion, LedgerError> {
        let parent = state
            .current()
            .ok_or_else(|| LedgerError::EmptyLineage(lineage.clone()))?;
        let next = parent.version.bump(bump);
        let version = ConstitutionVersion::build(next, content, Some(parent), proposal, summary, now)?;
        state.audit(
            "version_created",
            actor,
            json!({
                "version": version.version,
                "parent": version.parent_version,
                "proposal": version.proposal,
                "content_hash": version.content_hash,
            }),
            now,
        )?;
        info!(
            %lineage,
            version = %version.version,
            parent = ?version.parent_version.map(|v| v.to_string()),
            "version created"
        );
        Ok(state.push(version))
    }

    pub fn current(&self) -> Result<ConstitutionVersion, LedgerError> {
        self.lock()?
            .current()
            .cloned()
            .ok_or_else(|| LedgerError::EmptyLineage(self.lineage.clone()))
    }

    pub fn version(&self, version: SemVer) -> Result<ConstitutionVersion, LedgerError> {
        self.lock()?.find(version).cloned()
    }

    pub fn versions(&self) -> Result<Vec<ConstitutionVersion>, LedgerError> {
        Ok(self.lock()?.versions.clone())
    }

    pub fn diff(&self, from: SemVer, to: SemVer) -> Result<VersionDiff, LedgerError> {
        let state = self.lock()?;
        Ok(diff(&state.find(from)?.content, &state.find(to)?.content))
    }

    /// Recompute the hashes of a version record. A mismatch freezes the
    /// lineage and raises an operator alert.
    pub fn verify_integrity(&self, record: &ConstitutionVersion) -> Result<bool, LedgerError> {
        if record.verify_integrity() {
            return Ok(true);
        }
        self.freeze(&format!("version {} failed integrity check", record.version))?;
        Ok(false)
    }

    /// Verify every version and the links between them.
    pub fn verify_chain(&self) -> Result<(), LedgerError> {
        let result = verify_versions(&self.lock()?.versions);
        if let Err(e) = &result {
            self.freeze(&e.to_string())?;
        }
        result
    }

    fn freeze(&self, reason: &str) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        if state.health == LineageHealth::Healthy {
            state.health = LineageHealth::Frozen;
        }
        error!(target: "charter::alert", lineage = %self.lineage, %reason, "lineage frozen");
        Ok(())
    }

    /// Create a new version carrying the content of `target`.
    pub fn rollback_to(&self, target: SemVer, actor: Option<MemberId>, now: Timestamp) -> Result<ConstitutionVersion, LedgerError> {
        let mut state = self.writable()?;
        let content = state.find(target)?.content.clone();
        let version = Self::append(
            &self.lineage,
            &mut state,
            content,
            None,
            format!("rollback to {target}"),
            VersionBump::Minor,
            actor,
            now,
        )?;
        warn!(lineage = %self.lineage, %target, version = %version.version, "rolled back");
        Ok(version)
    }

    pub fn export(&self, version: SemVer) -> Result<VersionRecord, LedgerError> {
        Ok(VersionRecord::from_version(self.lock()?.find(version)?))
    }

    /// Append an exported record: as genesis of an empty lineage, or as the
    /// direct successor of the current version.
    pub fn import(&self, record: VersionRecord, now: Timestamp) -> Result<ConstitutionVersion, LedgerError> {
        record.verify()?;
        let mut state = self.writable()?;
        let meta = &record.metadata;
        let parent = state.current();
        let in_order = match parent {
            None => meta.parent_version.is_none(),
            Some(p) => meta.parent_version == Some(p.version) && meta.version > p.version,
        };
        if !in_order {
            return Err(LedgerError::ImportOutOfOrder {
                version: meta.version.to_string(),
                current: parent.map(|p| p.version.to_string()),
            });
        }
        let breaches = parent
            .map(|p| ConstitutionTables::from_content(&p.content).breaches(&record.content))
            .unwrap_or_default();
        if !breaches.is_empty() {
            let detail = json!({"version": meta.version, "breaches": breaches});
            state.audit("import_rejected", None, detail, now)?;
            warn!(lineage = %self.lineage, version = %meta.version, "import rejected: protected rules given up");
            return Err(LedgerError::ProtectionBreached {
                action: "import",
                breaches,
            });
        }
        let version = ConstitutionVersion::build(
            meta.version,
            record.content.clone(),
            parent,
            meta.proposal_id.clone(),
            meta.change_summary.clone(),
            meta.created_at,
        )?;
        state.audit(
            "version_imported",
            None,
            json!({"version": version.version, "content_hash": version.content_hash}),
            now,
        )?;
        info!(lineage = %self.lineage, version = %version.version, "version imported");
        Ok(state.push(version))
    }

    /// Run a migration against a copy of the current content.
    pub fn dry_run(&self, plan: &MigrationPlan) -> Result<MigrationOutcome, LedgerError> {
        let current = self.current()?;
        run(plan, &current.content)
    }

    /// Run a migration and, if every step succeeds, record the result as a
    /// new version. The lineage stays locked for the whole migration.
    pub fn execute_migration(
        &self,
        plan: &MigrationPlan,
        proposal: Option<ProposalId>,
        summary: impl Into<String>,
        bump: VersionBump,
        now: Timestamp,
    ) -> Result<ConstitutionVersion, LedgerError> {
        let mut state = self.writable()?;
        let current = state
            .current()
            .ok_or_else(|| LedgerError::EmptyLineage(self.lineage.clone()))?;
        let protected = ConstitutionTables::from_content(&current.content);
        let outcome = match run(plan, &current.content) {
            Ok(outcome) => outcome,
            Err(e @ LedgerError::RollbackFailed { .. }) => {
                state.health = LineageHealth::Inconsistent;
                error!(target: "charter::alert", lineage = %self.lineage, error = %e, "migration rollback failed");
                state.audit("migration_rollback_failed", None, json!({"error": e.to_string()}), now)?;
                return Err(e);
            }
            Err(e) => {
                state.audit("migration_failed", None, json!({"error": e.to_string()}), now)?;
                return Err(e);
            }
        };
        let breaches = protected.breaches(&outcome.content);
        if !breaches.is_empty() {
            state.audit("migration_rejected", None, json!({"proposal": proposal, "breaches": breaches}), now)?;
            warn!(lineage = %self.lineage, breaches = breaches.len(), "migration rejected: protected rules given up");
            return Err(LedgerError::ProtectionBreached {
                action: "migration",
                breaches,
            });
        }
        info!(
            lineage = %self.lineage,
            steps = outcome.steps_applied,
            changed_paths = outcome.diff.len(),
            "migration applied"
        );
        Self::append(&self.lineage, &mut state, outcome.content, proposal, summary.into(), bump, None, now)
    }

    /// Flag the lineage after its in-memory state and its durable copy have
    /// diverged. Writes stop until the incident is acknowledged.
    pub fn mark_inconsistent(&self, reason: &str, now: Timestamp) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        state.health = LineageHealth::Inconsistent;
        state.audit("marked_inconsistent", None, json!({"reason": reason}), now)?;
        error!(target: "charter::alert", lineage = %self.lineage, %reason, "lineage marked inconsistent");
        Ok(())
    }

    /// Clear a frozen or inconsistent state after an operator has dealt with it.
    pub fn acknowledge_incident(&self, by: MemberId, note: impl Into<String>, now: Timestamp) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        let previous = state.health;
        state.health = LineageHealth::Healthy;
        let note = note.into();
        state.audit("incident_acknowledged", Some(by.clone()), json!({"previous": previous, "note": note}), now)?;
        warn!(lineage = %self.lineage, %by, %previous, "incident acknowledged");
        Ok(())
    }

    pub fn audit_log(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(self.lock()?.audit.clone())
    }

    pub fn verify_audit(&self) -> Result<(), LedgerError> {
        verify_audit_chain(&self.lock()?.audit)
    }
}

fn verify_versions(versions: &[ConstitutionVersion]) -> Result<(), LedgerError> {
    let mut parent: Option<&ConstitutionVersion> = None;
    for v in versions {
        if !v.verify_integrity() {
            return Err(LedgerError::HashMismatch {
                version: v.version.to_string(),
            });
        }
        let broken = |reason: &str| LedgerError::ChainBroken {
            version: v.version.to_string(),
            reason: reason.to_string(),
        };
        match parent {
            None if v.parent_version.is_some() || !v.parent_chain_hash.is_zero() => {
                return Err(broken("first version has a parent"));
            }
            Some(p) if v.parent_version != Some(p.version) => return Err(broken("parent version mismatch")),
            Some(p) if v.parent_chain_hash != p.chain_hash => return Err(broken("parent chain hash mismatch")),
            Some(p) if v.version <= p.version => return Err(broken("version does not increase")),
            _ => {}
        }
        parent = Some(v);
    }
    Ok(())
}
