//! Local git command execution.
//!
//! All git commands run asynchronously via `tokio::process::Command` against
//! one working tree, bounded by a fixed timeout. Higher layers (base-branch
//! resolution, commit-range collection, repository location) are built on
//! the primitives here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::CoreError;

/// Hard limit for a single git invocation.
const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of one git invocation that was allowed to fail.
#[derive(Debug)]
pub(crate) struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Runs git commands against a single repository working tree.
#[derive(Debug, Clone)]
pub struct GitRunner {
    repo_path: PathBuf,
}

impl GitRunner {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Path of the working tree this runner operates on.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Run a git command, returning stdout/stderr and the exit status.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::GitOperationFailed` when the process cannot be
    /// spawned or exceeds the timeout. A non-zero exit status is NOT an
    /// error here; callers that require success use [`GitRunner::run_ok`].
    pub(crate) async fn run(&self, args: &[&str]) -> Result<GitOutput, CoreError> {
        let command_label = args.first().copied().unwrap_or("git").to_owned();
        debug!(args = ?args, repo = %self.repo_path.display(), "running git");

        let child = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output();

        let output = tokio::time::timeout(GIT_TIMEOUT, child)
            .await
            .map_err(|_| CoreError::GitOperationFailed {
                command: command_label.clone(),
                detail: format!("timed out after {}s", GIT_TIMEOUT.as_secs()),
            })?
            .map_err(|e| CoreError::GitOperationFailed {
                command: command_label,
                detail: e.to_string(),
            })?;

        Ok(GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_owned(),
            success: output.status.success(),
        })
    }

    /// Run a git command that must succeed; returns trimmed stdout.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::GitOperationFailed` carrying the command name and
    /// stderr on any failure.
    pub(crate) async fn run_ok(&self, args: &[&str]) -> Result<String, CoreError> {
        let command_label = args.first().copied().unwrap_or("git").to_owned();
        let output = self.run(args).await?;
        if !output.success {
            return Err(CoreError::GitOperationFailed {
                command: command_label,
                detail: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// Whether `name` resolves to a commit (branch, remote-tracking ref, tag).
    #[instrument(skip(self))]
    pub async fn ref_exists(&self, name: &str) -> Result<bool, CoreError> {
        let refspec = format!("{name}^{{commit}}");
        let output = self.run(&["rev-parse", "--verify", "--quiet", &refspec]).await?;
        Ok(output.success)
    }

    /// Merge base of two refs.
    #[instrument(skip(self))]
    pub async fn merge_base(&self, a: &str, b: &str) -> Result<String, CoreError> {
        self.run_ok(&["merge-base", a, b]).await
    }

    /// Name of the currently checked-out branch.
    #[instrument(skip(self))]
    pub async fn current_branch(&self) -> Result<String, CoreError> {
        self.run_ok(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    /// Number of merge commits reachable from `branch` but not `base`.
    #[instrument(skip(self))]
    pub async fn merge_commit_count(&self, base: &str, branch: &str) -> Result<u64, CoreError> {
        let range = format!("{base}..{branch}");
        let stdout = self
            .run_ok(&["rev-list", "--merges", "--count", &range])
            .await?;
        stdout
            .trim()
            .parse()
            .map_err(|e| CoreError::GitOperationFailed {
                command: "rev-list".to_owned(),
                detail: format!("unparseable merge count '{stdout}': {e}"),
            })
    }

    /// Unified diff between two commits.
    #[instrument(skip(self))]
    pub async fn diff(&self, from: &str, to: &str) -> Result<String, CoreError> {
        let output = self.run(&["diff", from, to]).await?;
        if !output.success {
            return Err(CoreError::GitOperationFailed {
                command: "diff".to_owned(),
                detail: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// `git diff --stat` between two commits.
    #[instrument(skip(self))]
    pub async fn diff_stat(&self, from: &str, to: &str) -> Result<String, CoreError> {
        self.run_ok(&["diff", "--stat", from, to]).await
    }

    /// `git diff --numstat` between two commits.
    #[instrument(skip(self))]
    pub async fn diff_numstat(&self, from: &str, to: &str) -> Result<String, CoreError> {
        self.run_ok(&["diff", "--numstat", from, to]).await
    }
}
