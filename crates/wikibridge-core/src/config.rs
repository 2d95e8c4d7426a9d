//! Configuration types for wikibridge-core.
//!
//! [`Settings`] is deserialized from a YAML file once at process start.
//! All fields have serde defaults so a missing file or partially filled
//! file still yields a valid configuration. Only the template layer is
//! hot-reloadable; everything else is fixed for the process lifetime.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::DEFAULT_ISSUE_KEY_PATTERN;

/// Process-wide configuration, deserialized from the config YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Named repositories searched when no explicit path is given.
    /// BTreeMap keeps iteration order deterministic.
    #[serde(default)]
    pub repositories: BTreeMap<String, PathBuf>,

    /// Wiki collaborator settings.
    #[serde(default)]
    pub wiki: WikiSettings,

    /// Issue-tracker collaborator settings.
    #[serde(default)]
    pub tracker: TrackerSettings,

    /// Diff assembly settings.
    #[serde(default)]
    pub diff: DiffSettings,

    /// Generation session settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// Optional template override file for the rendering layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,

    /// Generic status name to localized workflow-status strings.
    #[serde(default)]
    pub status_synonyms: BTreeMap<String, Vec<String>>,

    /// Regex for detecting issue keys in branch names and commit subjects.
    #[serde(default = "default_issue_key_pattern")]
    pub issue_key_pattern: String,
}

/// Wiki connection and page-addressing defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiSettings {
    /// Base URL of the wiki REST API. Empty means wiki tools are disabled.
    #[serde(default)]
    pub base_url: String,

    /// Space that holds generated pages.
    #[serde(default)]
    pub space_key: String,

    /// Default parent for issue-summary and branch-content pages.
    #[serde(default)]
    pub root_page_id: String,

    /// Account used for API calls; the password comes from the environment.
    #[serde(default)]
    pub username: String,
}

/// Issue-tracker connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSettings {
    /// Base URL of the tracker REST API. Empty disables issue enrichment.
    #[serde(default)]
    pub base_url: String,

    /// Account used for API calls; the password comes from the environment.
    #[serde(default)]
    pub username: String,
}

/// Diff prioritization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSettings {
    /// Character budget for assembled diff payloads.
    #[serde(default = "default_max_diff_chars")]
    pub max_chars: usize,

    /// Extra noise patterns excluded from diffs, on top of the built-ins.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            max_chars: default_max_diff_chars(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Upper bound for the session TTL (one week, in minutes).
pub const MAX_SESSION_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Generation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Minutes before a pending session expires.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

// ── Default value functions for serde ────────────────────────

fn default_max_diff_chars() -> usize {
    30_000
}

fn default_ttl_minutes() -> u64 {
    30
}

fn default_issue_key_pattern() -> String {
    DEFAULT_ISSUE_KEY_PATTERN.to_owned()
}

// ── Config loading ───────────────────────────────────────────

/// Load [`Settings`] from a YAML file.
///
/// A missing file yields defaults; a present but unparseable or invalid
/// file is an error (never silently defaulted).
///
/// # Errors
///
/// Returns `CoreError::Io` when the file exists but cannot be read,
/// `CoreError::Yaml` on parse failure, and `CoreError::ConfigurationInvalid`
/// when validation fails.
pub fn load_settings(config_path: &std::path::Path) -> Result<Settings, CoreError> {
    if !config_path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(config_path)?;
    let settings: Settings = serde_yaml::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    /// Validate cross-field constraints after deserialization.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigurationInvalid` naming the offending field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.session.ttl_minutes == 0 || self.session.ttl_minutes > MAX_SESSION_TTL_MINUTES {
            return Err(CoreError::ConfigurationInvalid(format!(
                "session.ttlMinutes must be between 1 and {MAX_SESSION_TTL_MINUTES}"
            )));
        }
        if self.diff.max_chars == 0 {
            return Err(CoreError::ConfigurationInvalid(
                "diff.maxChars must be at least 1".to_owned(),
            ));
        }
        regex::Regex::new(&self.issue_key_pattern).map_err(|e| {
            CoreError::ConfigurationInvalid(format!("issueKeyPattern does not compile: {e}"))
        })?;
        for (name, path) in &self.repositories {
            if name.trim().is_empty() {
                return Err(CoreError::ConfigurationInvalid(
                    "repositories contains an empty project name".to_owned(),
                ));
            }
            if path.as_os_str().is_empty() {
                return Err(CoreError::ConfigurationInvalid(format!(
                    "repository '{name}' has an empty path"
                )));
            }
        }
        for (generic, localized) in &self.status_synonyms {
            if generic.trim().is_empty() || localized.iter().any(|s| s.trim().is_empty()) {
                return Err(CoreError::ConfigurationInvalid(
                    "statusSynonyms contains an empty entry".to_owned(),
                ));
            }
        }
        Ok(())
    }
}
