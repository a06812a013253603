//! Hash-chained audit log.
//!
//! Each entry commits to the previous entry's hash. The position in the
//! chain is an explicit [`AuditCursor`] owned by the caller, one per lineage.

use charter_crypto::{blake2b_256_multi, canonical_bytes};
use charter_types::{ContentHash, LineageId, MemberId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LedgerError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub lineage: LineageId,
    pub sequence: u64,
    pub action: String,
    pub actor: Option<MemberId>,
    pub detail: Value,
    pub at: Timestamp,
    pub prev_hash: ContentHash,
    pub hash: ContentHash,
}

impl AuditEntry {
    fn compute_hash(&self) -> Result<ContentHash, LedgerError> {
        let detail = canonical_bytes(&self.detail)?;
        let actor = self.actor.as_ref().map(MemberId::as_str).unwrap_or("");
        Ok(ContentHash::new(blake2b_256_multi(&[
            self.prev_hash.as_bytes(),
            self.lineage.as_str().as_bytes(),
            &self.sequence.to_le_bytes(),
            self.action.as_bytes(),
            actor.as_bytes(),
            &detail,
            &self.at.as_secs().to_le_bytes(),
        ])))
    }
}

/// Where the next audit entry of a lineage attaches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCursor {
    pub lineage: LineageId,
    pub next_sequence: u64,
    pub last_hash: ContentHash,
}

impl AuditCursor {
    pub fn genesis(lineage: LineageId) -> Self {
        Self {
            lineage,
            next_sequence: 0,
            last_hash: ContentHash::ZERO,
        }
    }

    /// Cursor positioned after the last of `entries`.
    pub fn resume(lineage: LineageId, entries: &[AuditEntry]) -> Self {
        match entries.last() {
            Some(last) => Self {
                lineage,
                next_sequence: last.sequence + 1,
                last_hash: last.hash,
            },
            None => Self::genesis(lineage),
        }
    }

    pub fn append(
        &mut self,
        action: impl Into<String>,
        actor: Option<MemberId>,
        detail: Value,
        at: Timestamp,
    ) -> Result<AuditEntry, LedgerError> {
        let mut entry = AuditEntry {
            lineage: self.lineage.clone(),
            sequence: self.next_sequence,
            action: action.into(),
            actor,
            detail,
            at,
            prev_hash: self.last_hash,
            hash: ContentHash::ZERO,
        };
        entry.hash = entry.compute_hash()?;
        self.next_sequence += 1;
        self.last_hash = entry.hash;
        Ok(entry)
    }
}

/// Check every entry's hash and its link to the one before.
pub fn verify_audit_chain(entries: &[AuditEntry]) -> Result<(), LedgerError> {
    let mut prev = ContentHash::ZERO;
    for (i, entry) in entries.iter().enumerate() {
        let intact = entry.sequence == i as u64
            && entry.prev_hash == prev
            && entry.compute_hash()? == entry.hash;
        if !intact {
            return Err(LedgerError::AuditChainBroken {
                sequence: entry.sequence,
            });
        }
        prev = entry.hash;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain(n: usize) -> Vec<AuditEntry> {
        let mut cursor = AuditCursor::genesis("main".into());
        (0..n)
            .map(|i| {
                cursor
                    .append("version_created", Some("alice".into()), json!({"i": i}), Timestamp::new(i as u64))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn appended_chain_verifies() {
        let entries = chain(5);
        verify_audit_chain(&entries).unwrap();
        assert_eq!(entries[3].prev_hash, entries[2].hash);
    }

    #[test]
    fn tampering_is_detected() {
        let mut entries = chain(4);
        entries[2].detail = json!({"i": 99});
        assert!(matches!(
            verify_audit_chain(&entries),
            Err(LedgerError::AuditChainBroken { sequence: 2 })
        ));
    }

    #[test]
    fn lineages_do_not_share_state() {
        let mut a = AuditCursor::genesis("a".into());
        let mut b = AuditCursor::genesis("b".into());
        let ea = a.append("x", None, json!(null), Timestamp::new(0)).unwrap();
        let eb = b.append("x", None, json!(null), Timestamp::new(0)).unwrap();
        assert_eq!(ea.sequence, eb.sequence);
        assert_ne!(ea.hash, eb.hash);
    }

    #[test]
    fn resume_continues_the_chain() {
        let mut entries = chain(3);
        let mut cursor = AuditCursor::resume("main".into(), &entries);
        entries.push(cursor.append("more", None, json!({}), Timestamp::new(9)).unwrap());
        verify_audit_chain(&entries).unwrap();
    }
}
