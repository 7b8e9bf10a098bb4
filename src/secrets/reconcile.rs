//! Version reconciliation
//!
//! Combines the backend's version list (what exists) with the ledger (who did
//! what) into one displayable timeline. The backend is authoritative: every
//! backend version yields exactly one row whether or not the ledger knows it.
//! Ledger entries pointing at versions the backend no longer lists are kept as
//! `orphaned` for audit and are never offered as revert targets.

use crate::domain::{BackendVersion, LedgerEntry, SecretVersionList, VersionStage};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One backend version with its ledger annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRow {
    #[serde(flatten)]
    pub version: BackendVersion,
    pub ledger: Option<LedgerEntry>,
    /// Whether the version can be selected as a revert target
    pub revertible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedTimeline {
    pub backend_id: String,
    pub display_name: String,
    /// In backend order: CURRENT, PREVIOUS, then OLDER newest first
    pub rows: Vec<TimelineRow>,
    pub orphaned: Vec<LedgerEntry>,
}

impl CombinedTimeline {
    pub fn current(&self) -> Option<&TimelineRow> {
        self.rows.iter().find(|row| row.version.stage == VersionStage::Current)
    }

    pub fn revert_targets(&self) -> impl Iterator<Item = &TimelineRow> {
        self.rows.iter().filter(|row| row.revertible)
    }
}

/// Annotate each backend version with the newest ledger entry for it
pub fn reconcile(ledger: &[LedgerEntry], versions: &SecretVersionList) -> CombinedTimeline {
    let mut newest_by_version: HashMap<&str, &LedgerEntry> = HashMap::new();
    for entry in ledger {
        newest_by_version
            .entry(entry.version.as_str())
            .and_modify(|existing| {
                if entry.created_at > existing.created_at {
                    *existing = entry;
                }
            })
            .or_insert(entry);
    }

    let rows = versions
        .versions
        .iter()
        .map(|version| TimelineRow {
            version: version.clone(),
            ledger: newest_by_version.get(version.version_id.as_str()).map(|e| (*e).clone()),
            revertible: version.stage != VersionStage::Current,
        })
        .collect();

    let known: HashSet<&str> = versions.versions.iter().map(|v| v.version_id.as_str()).collect();
    let orphaned =
        ledger.iter().filter(|entry| !known.contains(entry.version.as_str())).cloned().collect();

    CombinedTimeline {
        backend_id: versions.backend_id.clone(),
        display_name: versions.display_name.clone(),
        rows,
        orphaned,
    }
}
