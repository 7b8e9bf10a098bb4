//! Tag inheritance
//!
//! Every non-base tag inherits from the base tag of the same
//! application/environment. A base key whose value on the tag is absent,
//! `null` or `""` is shown with the base's value and reported in
//! `_overwrittenKeys`; a non-empty tag value wins. Keys only on the tag pass
//! through unchanged. The base tag itself is never merged.

use crate::domain::SecretKeyValues;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Caller-facing view of one tag's secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedSecretView {
    pub secret: SecretKeyValues,
    pub current_version_id: Option<String>,
    /// Keys whose displayed value came from the base rather than the tag
    #[serde(rename = "_overwrittenKeys")]
    pub overwritten_keys: BTreeSet<String>,
}

impl MergedSecretView {
    pub fn with_current_version(mut self, version_id: impl Into<String>) -> Self {
        self.current_version_id = Some(version_id.into());
        self
    }

    pub fn is_inherited(&self, key: &str) -> bool {
        self.overwritten_keys.contains(key)
    }
}

/// Merge a tag's key/values over the base's
pub fn merge(base: &SecretKeyValues, tag: &SecretKeyValues) -> MergedSecretView {
    let mut secret = tag.clone();
    let mut overwritten_keys = BTreeSet::new();

    for (key, base_value) in base.iter() {
        let tag_has_value = tag.get(key).is_some_and(|value| !value.is_empty());
        if !tag_has_value {
            secret.insert(key.clone(), base_value.clone());
            overwritten_keys.insert(key.clone());
        }
    }

    MergedSecretView { secret, current_version_id: None, overwritten_keys }
}

/// View of a tag with no inheritance source (the base tag, or a missing base)
pub fn unmerged(tag: &SecretKeyValues) -> MergedSecretView {
    MergedSecretView {
        secret: tag.clone(),
        current_version_id: None,
        overwritten_keys: BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SecretValue;
    use proptest::prelude::*;
    use serde_json::json;

    fn kv(value: serde_json::Value) -> SecretKeyValues {
        SecretKeyValues::from_json_value(value).unwrap()
    }

    fn keys(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_tag_value_inherits_from_base() {
        let merged = merge(&kv(json!({"A": "1", "B": "2"})), &kv(json!({"A": "", "B": "9"})));
        assert_eq!(merged.secret, kv(json!({"A": "1", "B": "9"})));
        assert_eq!(merged.overwritten_keys, keys(&["A"]));
    }

    #[test]
    fn test_tag_only_keys_pass_through() {
        let merged = merge(&kv(json!({"A": "1"})), &kv(json!({"A": "1", "C": "3"})));
        assert_eq!(merged.secret, kv(json!({"A": "1", "C": "3"})));
        assert!(merged.overwritten_keys.is_empty());
    }

    #[test]
    fn test_null_tag_value_inherits() {
        let merged = merge(&kv(json!({"A": "1"})), &kv(json!({"A": null})));
        assert_eq!(merged.secret.get("A"), Some(&SecretValue::text("1")));
        assert!(merged.is_inherited("A"));
    }

    #[test]
    fn test_empty_base_value_is_still_marked_inherited() {
        let merged = merge(&kv(json!({"A": ""})), &kv(json!({})));
        assert_eq!(merged.secret.get("A"), Some(&SecretValue::text("")));
        assert!(merged.is_inherited("A"));
    }

    #[test]
    fn test_tag_only_empty_value_is_not_inherited() {
        let merged = merge(&kv(json!({})), &kv(json!({"C": ""})));
        assert_eq!(merged.secret.get("C"), Some(&SecretValue::text("")));
        assert!(merged.overwritten_keys.is_empty());
    }

    #[test]
    fn test_unmerged_has_no_overwritten_keys() {
        let view = unmerged(&kv(json!({"A": "", "B": "2"})));
        assert_eq!(view.secret, kv(json!({"A": "", "B": "2"})));
        assert!(view.overwritten_keys.is_empty());
    }

    #[test]
    fn test_view_serialization_shape() {
        let view = merge(&kv(json!({"A": "1", "B": "2"})), &kv(json!({"A": "", "B": "9"})))
            .with_current_version("v7");
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(
            value,
            json!({
                "secret": {"A": "1", "B": "9"},
                "current_version_id": "v7",
                "_overwrittenKeys": ["A"]
            })
        );
    }

    fn value_strategy() -> impl Strategy<Value = SecretValue> {
        prop_oneof![
            Just(SecretValue::Null),
            Just(SecretValue::text("")),
            "[a-z0-9]{1,6}".prop_map(SecretValue::Text),
        ]
    }

    fn map_strategy() -> impl Strategy<Value = SecretKeyValues> {
        prop::collection::btree_map("[A-F]", value_strategy(), 0..6)
            .prop_map(|map| map.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_merge_contains_union_of_keys(base in map_strategy(), tag in map_strategy()) {
            let merged = merge(&base, &tag);
            let expected: BTreeSet<String> = base.keys().chain(tag.keys()).cloned().collect();
            let actual: BTreeSet<String> = merged.secret.keys().cloned().collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_base_keys_follow_inheritance_rule(base in map_strategy(), tag in map_strategy()) {
            let merged = merge(&base, &tag);
            for (key, base_value) in base.iter() {
                match tag.get(key) {
                    Some(tag_value) if !tag_value.is_empty() => {
                        prop_assert_eq!(merged.secret.get(key), Some(tag_value));
                        prop_assert!(!merged.overwritten_keys.contains(key));
                    }
                    _ => {
                        prop_assert_eq!(merged.secret.get(key), Some(base_value));
                        prop_assert!(merged.overwritten_keys.contains(key));
                    }
                }
            }
        }

        #[test]
        fn prop_overwritten_keys_are_base_keys(base in map_strategy(), tag in map_strategy()) {
            let merged = merge(&base, &tag);
            for key in &merged.overwritten_keys {
                prop_assert!(base.contains_key(key));
            }
        }

        #[test]
        fn prop_merge_with_empty_tag_inherits_everything(base in map_strategy()) {
            let merged = merge(&base, &SecretKeyValues::new());
            prop_assert_eq!(&merged.secret, &base);
            let all: BTreeSet<String> = base.keys().cloned().collect();
            prop_assert_eq!(merged.overwritten_keys, all);
        }
    }
}
