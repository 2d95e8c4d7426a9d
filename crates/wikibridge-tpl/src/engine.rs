//! Hot-reloadable template engine.
//!
//! Holds one body template per workflow. Built-in defaults are compiled in;
//! a YAML file (when configured) overrides individual bodies and can be
//! re-read at runtime via [`TemplateEngine::reload`] without restarting the
//! process. Rendering is a pure function from a JSON context to markup.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use minijinja::Environment;
use tracing::{debug, info};

use crate::error::TplError;
use crate::template::{ReloadSummary, TemplateFile};

/// Built-in body for the issue-summary workflow.
const BUILTIN_ISSUE_SUMMARY: &str = include_str!("builtin/issue_summary.html.j2");

/// Built-in body for the branch-content workflow.
const BUILTIN_BRANCH_CONTENT: &str = include_str!("builtin/branch_content.html.j2");

/// Built-in body for the custom-page workflow.
const BUILTIN_CUSTOM_PAGE: &str = include_str!("builtin/custom_page.html.j2");

/// Renders workflow page bodies from Jinja2 templates.
///
/// Thread-safe: render takes a read lock, reload takes a write lock, so
/// in-flight renders always see a consistent template set.
#[derive(Debug)]
pub struct TemplateEngine {
    /// Optional YAML override file. `None` means built-ins only.
    path: Option<PathBuf>,
    /// Workflow name to template source.
    bodies: RwLock<BTreeMap<String, String>>,
}

impl TemplateEngine {
    /// Create an engine, loading overrides from `path` if it exists.
    ///
    /// # Errors
    ///
    /// Returns `TplError::Io`/`TplError::Yaml` when the override file exists
    /// but cannot be read or parsed, and `TplError::InvalidTemplateFile`
    /// when an override body fails to compile.
    pub fn new(path: Option<PathBuf>) -> Result<Self, TplError> {
        let bodies = load_bodies(path.as_deref())?;
        info!(
            workflows = bodies.len(),
            file = path.as_deref().map(|p| p.display().to_string()),
            "template engine initialized"
        );
        Ok(Self {
            path,
            bodies: RwLock::new(bodies),
        })
    }

    /// Re-read the override file and swap the template set.
    ///
    /// A failed reload leaves the previous set untouched.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`TemplateEngine::new`].
    pub fn reload(&self) -> Result<ReloadSummary, TplError> {
        let fresh = load_bodies(self.path.as_deref())?;
        let summary = ReloadSummary {
            workflow_count: fresh.len(),
            workflow_names: fresh.keys().cloned().collect(),
        };
        *self.bodies.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        info!(workflows = summary.workflow_count, "templates reloaded");
        Ok(summary)
    }

    /// Render the body template for `workflow` with the given context.
    ///
    /// No auto-escaping is applied: context values must arrive escaped
    /// (see `escape_html`), HTML fragments pass through verbatim.
    ///
    /// # Errors
    ///
    /// Returns `TplError::UnknownWorkflow` for an unregistered workflow name
    /// and `TplError::Render` when the template itself fails.
    pub fn render(&self, workflow: &str, vars: &serde_json::Value) -> Result<String, TplError> {
        let bodies = self.bodies.read().unwrap_or_else(|e| e.into_inner());
        let source = bodies
            .get(workflow)
            .ok_or_else(|| TplError::UnknownWorkflow(workflow.to_owned()))?;

        let env = Environment::new();
        let rendered = env.render_str(source, vars)?;
        debug!(workflow, chars = rendered.len(), "rendered workflow body");
        Ok(rendered)
    }

    /// Names of the currently loaded workflows, sorted.
    pub fn workflow_names(&self) -> Vec<String> {
        self.bodies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

/// Merge built-in bodies with overrides from the YAML file (if any).
fn load_bodies(path: Option<&std::path::Path>) -> Result<BTreeMap<String, String>, TplError> {
    let mut bodies = BTreeMap::from([
        ("issue_summary".to_owned(), BUILTIN_ISSUE_SUMMARY.to_owned()),
        ("branch_content".to_owned(), BUILTIN_BRANCH_CONTENT.to_owned()),
        ("custom_page".to_owned(), BUILTIN_CUSTOM_PAGE.to_owned()),
    ]);

    let Some(path) = path else {
        return Ok(bodies);
    };
    if !path.exists() {
        debug!(path = %path.display(), "template file missing, using built-ins");
        return Ok(bodies);
    }

    let content = std::fs::read_to_string(path)?;
    let file: TemplateFile = serde_yaml::from_str(&content)?;

    let env = Environment::new();
    for (name, source) in file.workflows {
        env.template_from_str(&source).map_err(|e| {
            TplError::InvalidTemplateFile(format!("workflow '{name}' does not compile: {e}"))
        })?;
        bodies.insert(name, source);
    }

    Ok(bodies)
}
