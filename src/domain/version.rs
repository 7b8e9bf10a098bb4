//! Backend-native version metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

/// Recency label the backend puts on a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStage {
    Current,
    Previous,
    Older,
}

impl VersionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "CURRENT",
            Self::Previous => "PREVIOUS",
            Self::Older => "OLDER",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Current => 0,
            Self::Previous => 1,
            Self::Older => 2,
        }
    }
}

impl fmt::Display for VersionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of a backend's version list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendVersion {
    pub version_id: String,
    pub stage: VersionStage,
    pub created_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Result of `list_versions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretVersionList {
    pub backend_id: String,
    pub display_name: String,
    pub versions: Vec<BackendVersion>,
}

impl SecretVersionList {
    pub fn current(&self) -> Option<&BackendVersion> {
        self.versions.iter().find(|v| v.stage == VersionStage::Current)
    }
}

/// Order versions CURRENT, PREVIOUS, then OLDER by `created_at` descending.
///
/// The sort is stable, so OLDER versions with equal or unknown timestamps keep
/// the order the backend returned them in. Unknown timestamps sort last.
pub fn sort_versions(versions: &mut [BackendVersion]) {
    versions.sort_by_key(|v| (v.stage.rank(), Reverse(v.created_at)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn version(id: &str, stage: VersionStage, minute: u32) -> BackendVersion {
        BackendVersion {
            version_id: id.to_string(),
            stage,
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()),
            last_accessed_at: None,
        }
    }

    #[test]
    fn test_sort_places_current_and_previous_first() {
        let mut versions = vec![
            version("v1", VersionStage::Older, 1),
            version("v4", VersionStage::Current, 4),
            version("v2", VersionStage::Older, 2),
            version("v3", VersionStage::Previous, 3),
        ];
        sort_versions(&mut versions);
        let ids: Vec<_> = versions.iter().map(|v| v.version_id.as_str()).collect();
        assert_eq!(ids, vec!["v4", "v3", "v2", "v1"]);
    }

    #[test]
    fn test_sort_older_by_created_desc_even_when_current_is_oldest() {
        // After a revert the CURRENT label can sit on any version.
        let mut versions = vec![
            version("v1", VersionStage::Current, 1),
            version("v2", VersionStage::Older, 2),
            version("v3", VersionStage::Older, 3),
        ];
        sort_versions(&mut versions);
        let ids: Vec<_> = versions.iter().map(|v| v.version_id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v3", "v2"]);
    }

    #[test]
    fn test_stage_serialization() {
        assert_eq!(serde_json::to_string(&VersionStage::Previous).unwrap(), "\"PREVIOUS\"");
    }
}
