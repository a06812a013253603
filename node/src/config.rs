//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use charter_store::RetryPolicy;
use charter_types::{GovernanceParams, LineageId, MemberId, PublicKey};
use charter_utils::LogFormat;

use crate::NodeError;

/// Configuration for a Charter engine.
///
/// Can be loaded from a TOML file via [`CharterConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so a
/// file only needs to name what it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharterConfig {
    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deadline for a single storage call, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Total attempts for a storage read, including the first.
    #[serde(default = "default_store_read_retries")]
    pub store_read_retries: u32,

    /// Total attempts for a storage write whose outcome was unknown.
    #[serde(default = "default_store_write_retries")]
    pub store_write_retries: u32,

    /// The constitution lineage this engine governs.
    #[serde(default = "default_lineage")]
    pub lineage: String,

    /// Upper bound on pipeline operations running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Term length for newly appointed justices.
    #[serde(default = "default_justice_term_days")]
    pub justice_term_days: u64,

    /// Hex-encoded Ed25519 keys for attested halt signatures, by member id.
    #[serde(default)]
    pub halt_keys: BTreeMap<String, String>,

    #[serde(default)]
    pub governance: GovernanceParams,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

fn default_store_read_retries() -> u32 {
    3
}

fn default_store_write_retries() -> u32 {
    2
}

fn default_lineage() -> String {
    "main".to_string()
}

fn default_max_concurrent() -> usize {
    16
}

fn default_justice_term_days() -> u64 {
    365
}

// ── Impl ───────────────────────────────────────────────────────────────

impl CharterConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("CharterConfig is always serializable to TOML")
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.governance.validate().map_err(NodeError::Config)?;
        if self.store_timeout_ms == 0 {
            return Err(NodeError::Config("store_timeout_ms must be positive".into()));
        }
        if self.store_read_retries == 0 || self.store_write_retries == 0 {
            return Err(NodeError::Config("storage retry counts include the first attempt and must be at least 1".into()));
        }
        if self.lineage.trim().is_empty() {
            return Err(NodeError::Config("lineage must not be empty".into()));
        }
        if self.max_concurrent == 0 {
            return Err(NodeError::Config("max_concurrent must be at least 1".into()));
        }
        if self.justice_term_days == 0 {
            return Err(NodeError::Config("justice_term_days must be positive".into()));
        }
        self.halt_keys()?;
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            read_attempts: self.store_read_retries,
            write_attempts: self.store_write_retries,
        }
    }

    /// Install the global subscriber with this config's format and level.
    pub fn init_logging(&self) -> bool {
        charter_utils::init_logging(self.log_format, &self.log_level)
    }

    pub fn lineage_id(&self) -> LineageId {
        LineageId::new(self.lineage.clone())
    }

    /// Decode the configured halt keys.
    pub fn halt_keys(&self) -> Result<HashMap<MemberId, PublicKey>, NodeError> {
        self.halt_keys
            .iter()
            .map(|(member, key)| {
                let bytes: [u8; 32] = hex::decode(key)
                    .map_err(|e| NodeError::Config(format!("halt key for {member}: {e}")))?
                    .try_into()
                    .map_err(|_| NodeError::Config(format!("halt key for {member} must be 32 bytes")))?;
                Ok((MemberId::new(member.clone()), PublicKey(bytes)))
            })
            .collect()
    }
}

impl Default for CharterConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            store_timeout_ms: default_store_timeout_ms(),
            store_read_retries: default_store_read_retries(),
            store_write_retries: default_store_write_retries(),
            lineage: default_lineage(),
            max_concurrent: default_max_concurrent(),
            justice_term_days: default_justice_term_days(),
            halt_keys: BTreeMap::new(),
            governance: GovernanceParams::default(),
        }
    }
}
