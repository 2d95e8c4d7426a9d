//! Template types used by the engine: the on-disk YAML layout of the
//! override file and the reload report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result of a template reload, reported back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadSummary {
    /// Number of workflow templates now loaded.
    pub workflow_count: usize,

    /// Names of the loaded workflows, sorted.
    pub workflow_names: Vec<String>,
}

/// On-disk layout of the template YAML file.
///
/// Missing workflows fall back to the built-in defaults, so a file that
/// overrides only one body is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TemplateFile {
    #[serde(default)]
    pub workflows: BTreeMap<String, String>,
}
