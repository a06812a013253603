//! Constitution versions and semantic version numbers.

use charter_crypto::{blake2b_256_multi, hash_canonical};
use charter_types::{Category, ContentHash, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub const GENESIS: Self = Self {
        major: 1,
        minor: 0,
        patch: 0,
    };

    pub fn bump(self, bump: VersionBump) -> Self {
        match bump {
            VersionBump::Major => Self {
                major: self.major + 1,
                minor: 0,
                patch: 0,
            },
            VersionBump::Minor => Self {
                minor: self.minor + 1,
                patch: 0,
                ..self
            },
            VersionBump::Patch => Self {
                patch: self.patch + 1,
                ..self
            },
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidVersion(s.to_string());
        let mut parts = s.split('.');
        let mut next = || -> Result<u32, LedgerError> {
            parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())
        };
        let version = Self {
            major: next()?,
            minor: next()?,
            patch: next()?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl Serialize for SemVer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionBump {
    Major,
    Minor,
    Patch,
}

impl VersionBump {
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Constitutional | Category::Major => Self::Major,
            Category::Standard => Self::Minor,
            Category::Minor => Self::Patch,
        }
    }
}

/// One immutable snapshot of the constitution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstitutionVersion {
    pub version: SemVer,
    pub content: Value,
    pub content_hash: ContentHash,
    /// Links this version to its parent: `H(parent_chain ‖ content_hash ‖ version)`.
    pub chain_hash: ContentHash,
    pub parent_chain_hash: ContentHash,
    pub parent_version: Option<SemVer>,
    pub proposal: Option<ProposalId>,
    pub change_summary: String,
    pub created_at: Timestamp,
    pub is_current: bool,
}

pub fn chain_hash(parent: &ContentHash, content_hash: &ContentHash, version: SemVer) -> ContentHash {
    ContentHash::new(blake2b_256_multi(&[
        parent.as_bytes(),
        content_hash.as_bytes(),
        version.to_string().as_bytes(),
    ]))
}

impl ConstitutionVersion {
    pub(crate) fn build(
        version: SemVer,
        content: Value,
        parent: Option<&ConstitutionVersion>,
        proposal: Option<ProposalId>,
        change_summary: String,
        now: Timestamp,
    ) -> Result<Self, LedgerError> {
        let content_hash = hash_canonical(&content)?;
        let parent_chain_hash = parent.map(|p| p.chain_hash).unwrap_or(ContentHash::ZERO);
        Ok(Self {
            chain_hash: chain_hash(&parent_chain_hash, &content_hash, version),
            version,
            content,
            content_hash,
            parent_chain_hash,
            parent_version: parent.map(|p| p.version),
            proposal,
            change_summary,
            created_at: now,
            is_current: true,
        })
    }

    /// Recompute both hashes from the stored fields and compare.
    pub fn verify_integrity(&self) -> bool {
        let Ok(content_hash) = hash_canonical(&self.content) else {
            return false;
        };
        content_hash == self.content_hash
            && chain_hash(&self.parent_chain_hash, &content_hash, self.version) == self.chain_hash
    }
}
