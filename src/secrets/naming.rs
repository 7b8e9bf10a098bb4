//! Secret naming
//!
//! Every tag secret lives in the backend under `{application}_{environment}_{tag}`.
//! The name is a durable contract: renaming orphans existing backend secrets.
//! Names are not sanitised here; callers validate the character set upstream.
//! Distinct triples can collide when names contain `_` (for example
//! `("a_b", "c", "d")` and `("a", "b_c", "d")`).

use crate::domain::BASE_TAG_NAME;

/// Resolve the backend secret name for a tag
pub fn resolve(application_name: &str, environment_name: &str, tag_name: &str) -> String {
    format!("{}_{}_{}", application_name, environment_name, tag_name)
}

/// Backend secret name of the base tag for an application/environment
pub fn base_name(application_name: &str, environment_name: &str) -> String {
    resolve(application_name, environment_name, BASE_TAG_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("payments", "staging", "base"), "payments_staging_base");
        assert_eq!(resolve("payments", "prod", "blue"), "payments_prod_blue");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("payments", "staging"), "payments_staging_base");
    }

    #[test]
    fn test_no_sanitisation() {
        assert_eq!(resolve("my app", "dev/1", "x"), "my app_dev/1_x");
    }

    #[test]
    fn test_separator_collision_is_not_mitigated() {
        assert_eq!(resolve("a_b", "c", "d"), resolve("a", "b_c", "d"));
    }
}
