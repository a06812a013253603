//! Portable version records.
//!
//! ```json
//! {"metadata": {"version", "content_hash", "created_at", "parent_version",
//!               "proposal_id", "change_summary"},
//!  "content": { ... }}
//! ```

use charter_crypto::hash_canonical;
use charter_types::{ContentHash, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LedgerError;
use crate::version::{ConstitutionVersion, SemVer};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub version: SemVer,
    pub content_hash: ContentHash,
    pub created_at: Timestamp,
    pub parent_version: Option<SemVer>,
    pub proposal_id: Option<ProposalId>,
    #[serde(default)]
    pub change_summary: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub metadata: VersionMetadata,
    pub content: Value,
}

impl VersionRecord {
    pub fn from_version(version: &ConstitutionVersion) -> Self {
        Self {
            metadata: VersionMetadata {
                version: version.version,
                content_hash: version.content_hash,
                created_at: version.created_at,
                parent_version: version.parent_version,
                proposal_id: version.proposal.clone(),
                change_summary: version.change_summary.clone(),
            },
            content: version.content.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        serde_json::to_string_pretty(self).map_err(|e| LedgerError::MalformedRecord(e.to_string()))
    }

    /// Parse a record and check its content against the declared hash.
    pub fn parse(input: &str) -> Result<Self, LedgerError> {
        let record: Self =
            serde_json::from_str(input).map_err(|e| LedgerError::MalformedRecord(e.to_string()))?;
        record.verify()?;
        Ok(record)
    }

    pub fn verify(&self) -> Result<(), LedgerError> {
        if hash_canonical(&self.content)? != self.metadata.content_hash {
            return Err(LedgerError::HashMismatch {
                version: self.metadata.version.to_string(),
            });
        }
        Ok(())
    }
}
