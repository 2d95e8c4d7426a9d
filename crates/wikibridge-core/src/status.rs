//! Status-name normalization and issue-key detection.
//!
//! Issue trackers used behind this broker often carry localized workflow
//! status names. Callers speak generic English ("done", "in progress");
//! the synonym table expands those into the localized strings the tracker
//! actually knows. Unmatched names pass through verbatim so the mapping
//! never hides a status from the caller.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::CoreError;

/// Default pattern for tracker issue keys (e.g. `PROJ-123`).
pub const DEFAULT_ISSUE_KEY_PATTERN: &str = r"\b[A-Z][A-Z0-9]+-\d+\b";

/// Configurable mapping from generic English states to localized status
/// strings. Lookup is case-insensitive on the generic side.
#[derive(Debug, Clone, Default)]
pub struct StatusSynonyms {
    map: BTreeMap<String, Vec<String>>,
}

impl StatusSynonyms {
    /// Build from a configured table, lowercasing the generic keys.
    pub fn new(table: BTreeMap<String, Vec<String>>) -> Self {
        let map = table
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        Self { map }
    }

    /// Expand generic names into localized status strings.
    ///
    /// Matched names are replaced by all of their synonyms; unmatched names
    /// pass through verbatim. Duplicates are removed, first occurrence wins,
    /// so output order is a deterministic function of input order.
    pub fn normalize(&self, statuses: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for status in statuses {
            let key = status.trim().to_lowercase();
            match self.map.get(&key) {
                Some(localized) => out.extend(localized.iter().cloned()),
                None => out.push(status.trim().to_owned()),
            }
        }
        dedup_preserving_order(out)
    }
}

/// Extracts tracker issue keys from free-form text.
#[derive(Debug, Clone)]
pub struct IssueKeyMatcher {
    pattern: Regex,
}

impl IssueKeyMatcher {
    /// Compile the configured pattern.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigurationInvalid` when the pattern does not
    /// compile. Settings validation checks the pattern at load time, so
    /// this is unreachable for validated settings.
    pub fn new(pattern: &str) -> Result<Self, CoreError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            CoreError::ConfigurationInvalid(format!("issue key pattern does not compile: {e}"))
        })?;
        Ok(Self { pattern })
    }

    /// All distinct issue keys in `text`, in first-occurrence order.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let keys = self
            .pattern
            .find_iter(text)
            .map(|m| m.as_str().to_owned())
            .collect();
        dedup_preserving_order(keys)
    }
}

impl Default for IssueKeyMatcher {
    fn default() -> Self {
        // The default pattern is a compile-time constant and always valid.
        Self {
            pattern: Regex::new(DEFAULT_ISSUE_KEY_PATTERN).unwrap(),
        }
    }
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synonyms() -> StatusSynonyms {
        StatusSynonyms::new(BTreeMap::from([
            (
                "done".to_owned(),
                vec!["완료".to_owned(), "완료(개발)".to_owned()],
            ),
            ("in progress".to_owned(), vec!["진행중".to_owned()]),
        ]))
    }

    #[test]
    fn test_should_expand_generic_status_names() {
        let out = synonyms().normalize(&["Done".to_owned()]);
        assert_eq!(out, vec!["완료", "완료(개발)"]);
    }

    #[test]
    fn test_should_pass_through_unknown_status_verbatim() {
        let out = synonyms().normalize(&["검수중".to_owned()]);
        assert_eq!(out, vec!["검수중"]);
    }

    #[test]
    fn test_should_dedup_preserving_first_occurrence_order() {
        let out = synonyms().normalize(&[
            "done".to_owned(),
            "완료".to_owned(),
            "in progress".to_owned(),
        ]);
        assert_eq!(out, vec!["완료", "완료(개발)", "진행중"]);
    }

    #[test]
    fn test_should_extract_issue_keys_in_order() {
        let matcher = IssueKeyMatcher::default();
        let keys = matcher.extract("feat/PROJ-12 fixes PROJ-7 and PROJ-12 again");
        assert_eq!(keys, vec!["PROJ-12", "PROJ-7"]);
    }

    #[test]
    fn test_should_ignore_lowercase_words_with_dashes() {
        let matcher = IssueKeyMatcher::default();
        assert!(matcher.extract("feature-123 branch").is_empty());
    }

    #[test]
    fn test_should_reject_invalid_pattern() {
        assert!(matches!(
            IssueKeyMatcher::new("["),
            Err(CoreError::ConfigurationInvalid(_))
        ));
    }
}
