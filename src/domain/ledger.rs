//! Version ledger entries
//!
//! One immutable entry per mutating operation on a secret record. The ledger
//! carries who/why; the backend stays authoritative for which versions exist.

use super::id::{LedgerEntryId, SecretRecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity type column of the ledger (only secrets are versioned today)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntityType {
    Secret,
}

impl LedgerEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "SECRET",
        }
    }
}

impl FromStr for LedgerEntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SECRET" => Ok(Self::Secret),
            _ => Err(format!("Unknown ledger entity type: {}", s)),
        }
    }
}

/// Mutating operation recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerOperation {
    Create,
    Update,
    Revert,
}

impl LedgerOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Revert => "REVERT",
        }
    }
}

impl FromStr for LedgerOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "REVERT" => Ok(Self::Revert),
            _ => Err(format!("Unknown ledger operation: {}", s)),
        }
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human-authored metadata the backend does not store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerMetadata {
    pub actor_id: String,
    pub actor_name: String,
    /// Key names written by the operation
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverted_to_version: Option<String>,
}

/// One immutable ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub entity_type: LedgerEntityType,
    pub entity_id: SecretRecordId,
    pub version: String,
    pub from_version: Option<String>,
    pub operation: LedgerOperation,
    pub metadata: LedgerMetadata,
    pub created_at: DateTime<Utc>,
}

/// A break in the `from_version` chain of an entity's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainGap {
    pub entry_id: LedgerEntryId,
    pub expected_from: String,
    pub actual_from: Option<String>,
}

/// Find places where an entry's `from_version` does not match the previous
/// entry's `version`. Entries are given newest first, as the ledger returns
/// them. Gaps are diagnostics only; they never fail an operation.
pub fn chain_gaps(history: &[LedgerEntry]) -> Vec<ChainGap> {
    history
        .windows(2)
        .filter_map(|pair| {
            let (newer, older) = (&pair[0], &pair[1]);
            if newer.from_version.as_deref() == Some(older.version.as_str()) {
                None
            } else {
                Some(ChainGap {
                    entry_id: newer.id.clone(),
                    expected_from: older.version.clone(),
                    actual_from: newer.from_version.clone(),
                })
            }
        })
        .collect()
}
