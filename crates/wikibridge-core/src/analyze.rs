//! Branch analysis pipeline.
//!
//! Glues the locator, the base-branch resolver, the commit-range
//! collector, and the diff prioritizer into the two read-only analysis
//! operations the tool surface exposes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument};

use crate::baseref::resolve_base_branch;
use crate::config::DiffSettings;
use crate::diffsel::{ExclusionRules, PrioritizedDiff, prioritize};
use crate::error::CoreError;
use crate::git::GitRunner;
use crate::locate::{RepoMatch, locate_repository};
use crate::range::{CommitRange, CommitRangeCollector};

/// Commit evidence for a branch, with the bounded diff on request.
#[derive(Debug, Clone, Serialize)]
pub struct BranchCommitReport {
    pub repository: RepoMatch,
    pub range: CommitRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<PrioritizedDiff>,
}

/// Full change analysis: commit range, human-readable stat, bounded diff.
#[derive(Debug, Clone, Serialize)]
pub struct BranchChangeReport {
    pub repository: RepoMatch,
    pub range: CommitRange,
    pub diff_stat: String,
    pub diff: PrioritizedDiff,
}

/// Read-only analysis over the configured repositories.
pub struct BranchAnalyzer {
    repositories: BTreeMap<String, PathBuf>,
    exclusion_rules: ExclusionRules,
    diff_budget: usize,
}

impl BranchAnalyzer {
    pub fn new(repositories: BTreeMap<String, PathBuf>, diff: &DiffSettings) -> Self {
        Self {
            repositories,
            exclusion_rules: ExclusionRules::with_extra(&diff.exclude_patterns),
            diff_budget: diff.max_chars,
        }
    }

    /// Commits unique to `branch`, optionally with the prioritized diff.
    ///
    /// # Errors
    ///
    /// Propagates locator, base-resolution, and git errors.
    #[instrument(skip(self))]
    pub async fn collect_commits(
        &self,
        branch: &str,
        explicit_path: Option<&Path>,
        include_diff: bool,
    ) -> Result<BranchCommitReport, CoreError> {
        let (repository, collector, base) = self.resolve(branch, explicit_path).await?;
        let range = collector.collect(branch, &base).await?;

        let diff = if include_diff {
            let raw = collector.unified_diff(branch, &base).await?;
            Some(prioritize(&raw, self.diff_budget, &self.exclusion_rules))
        } else {
            None
        };

        info!(
            branch,
            repo = repository.name.as_str(),
            commits = range.commits.len(),
            "branch commits collected"
        );
        Ok(BranchCommitReport {
            repository,
            range,
            diff,
        })
    }

    /// Full change analysis for `branch`: range, stat, bounded diff.
    ///
    /// # Errors
    ///
    /// Propagates locator, base-resolution, and git errors.
    #[instrument(skip(self))]
    pub async fn analyze_changes(
        &self,
        branch: &str,
        explicit_path: Option<&Path>,
    ) -> Result<BranchChangeReport, CoreError> {
        let (repository, collector, base) = self.resolve(branch, explicit_path).await?;
        let range = collector.collect(branch, &base).await?;
        let diff_stat = collector.diff_stat(branch, &base).await?;
        let raw = collector.unified_diff(branch, &base).await?;
        let diff = prioritize(&raw, self.diff_budget, &self.exclusion_rules);

        info!(
            branch,
            repo = repository.name.as_str(),
            files = range.stats.files_changed,
            diff_chars = diff.total_chars,
            "branch changes analyzed"
        );
        Ok(BranchChangeReport {
            repository,
            range,
            diff_stat,
            diff,
        })
    }

    async fn resolve(
        &self,
        branch: &str,
        explicit_path: Option<&Path>,
    ) -> Result<(RepoMatch, CommitRangeCollector, String), CoreError> {
        let repository = locate_repository(branch, &self.repositories, explicit_path).await?;
        let git = GitRunner::new(&repository.path);
        let base = resolve_base_branch(&git).await?;
        Ok((repository, CommitRangeCollector::new(git), base))
    }
}
