//! Model name normalization.
//!
//! Rewrites Messages-style model ids into the ids the upstream accepts:
//! - "claude-sonnet-4-20250514" -> "claude-sonnet-4"
//! - "claude-sonnet-4-5-20250929" -> "claude-sonnet-4.5"
//! - "claude-opus-4-1[1m]" -> "claude-opus-4.1"

use std::collections::HashMap;
use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::debug;

static BRACKET_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]$").expect("bracket suffix pattern"));
static DATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d{8}$").expect("date suffix pattern"));
static MINOR_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*-\d+)-(\d+)$").expect("minor version pattern"));

/// Normalize a model name. Each rule applies at most once, in order:
///
/// 1. Strip a trailing `[...]` annotation.
/// 2. Strip a trailing `-YYYYMMDD` date.
/// 3. Rewrite a final `-<digits>-<digits>` as `-<digits>.<digits>`.
///
/// Names matching none of the rules pass through unchanged.
pub fn normalize_model_name(name: &str) -> String {
    let result = BRACKET_SUFFIX.replace(name, "");
    let result = DATE_SUFFIX.replace(&result, "");
    let result = MINOR_VERSION.replace(&result, "${1}.${2}");
    result.into_owned()
}

/// Normalize, then apply an exact-match alias if one is configured.
pub fn resolve_model(name: &str, aliases: &HashMap<String, String>) -> String {
    let normalized = normalize_model_name(name);
    match aliases.get(&normalized) {
        Some(alias) => {
            debug!(name, normalized = %normalized, resolved = %alias, "Model alias matched");
            alias.clone()
        }
        None => {
            if normalized != name {
                debug!(name, resolved = %normalized, "Model name normalized");
            }
            normalized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strip_date() {
        assert_eq!(normalize_model_name("claude-sonnet-4-20250514"), "claude-sonnet-4");
    }

    #[test]
    fn test_date_then_minor_version() {
        assert_eq!(
            normalize_model_name("claude-sonnet-4-5-20250929"),
            "claude-sonnet-4.5"
        );
        assert_eq!(normalize_model_name("claude-haiku-4-5"), "claude-haiku-4.5");
    }

    #[test]
    fn test_bracket_annotation() {
        assert_eq!(normalize_model_name("claude-opus-4-1[1m]"), "claude-opus-4.1");
        assert_eq!(
            normalize_model_name("claude-sonnet-4-20250514[beta]"),
            "claude-sonnet-4"
        );
    }

    #[test]
    fn test_only_last_pair_converted() {
        assert_eq!(normalize_model_name("model-1-2-3"), "model-1-2.3");
    }

    #[test]
    fn test_passthrough() {
        for name in ["gpt-4o", "gpt-4", "claude-3-5-sonnet", "o3-mini", "", "claude-sonnet-4.5"] {
            assert_eq!(normalize_model_name(name), name);
        }
    }

    #[test]
    fn test_bracket_only_at_end() {
        assert_eq!(normalize_model_name("a[x]-b"), "a[x]-b");
    }

    #[test]
    fn test_resolve_model_alias() {
        let mut aliases = HashMap::new();
        aliases.insert("claude-sonnet-4".to_string(), "claude-sonnet-4.5".to_string());
        assert_eq!(
            resolve_model("claude-sonnet-4-20250514", &aliases),
            "claude-sonnet-4.5"
        );
        assert_eq!(resolve_model("gpt-4o", &aliases), "gpt-4o");
    }

    fn family() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(-[a-z]{1,8}){0,2}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_bracket_and_date_stripped_then_dotted(
            base in family(),
            major in 1u32..100,
            minor in 0u32..100,
            date in 10_000_000u32..100_000_000,
            tag in "[a-z0-9]{0,6}",
        ) {
            let name = format!("{base}-{major}-{minor}-{date}[{tag}]");
            prop_assert_eq!(normalize_model_name(&name), format!("{base}-{major}.{minor}"));
        }

        #[test]
        fn prop_idempotent(
            base in family(),
            version in proptest::option::of((1u32..100, proptest::option::of(0u32..100))),
            date in proptest::option::of(10_000_000u32..100_000_000),
            tag in proptest::option::of("[a-z0-9]{1,6}"),
        ) {
            let mut name = base;
            if let Some((major, minor)) = version {
                name.push_str(&format!("-{major}"));
                if let Some(minor) = minor {
                    name.push_str(&format!("-{minor}"));
                }
            }
            if let Some(date) = date {
                name.push_str(&format!("-{date}"));
            }
            if let Some(tag) = tag {
                name.push_str(&format!("[{tag}]"));
            }
            let once = normalize_model_name(&name);
            prop_assert_eq!(normalize_model_name(&once), once.clone());
        }
    }
}
