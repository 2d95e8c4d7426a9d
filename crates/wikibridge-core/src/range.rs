//! Commit-range collection for a feature branch.
//!
//! Computes the commit set unique to a branch relative to the merge base
//! with its integration branch. Using the merge base keeps commits that
//! landed on the base after divergence out of the set, and keeps the diff
//! anchored at the true fork point.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::CoreError;
use crate::git::GitRunner;

/// Field separator for the commit log format; unlikely in subjects.
const LOG_FIELD_SEP: char = '\u{1f}';

/// One commit unique to the analyzed branch.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-file change magnitude from `diff --numstat`.
#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub path: String,
    /// Zero for binary files (numstat reports `-`).
    pub insertions: u64,
    pub deletions: u64,
}

/// Aggregate change statistics between the merge base and the branch tip.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatSummary {
    pub files_changed: usize,
    pub insertions: u64,
    pub deletions: u64,
    pub files: Vec<FileChange>,
}

/// Result of analyzing one branch against its base.
#[derive(Debug, Clone, Serialize)]
pub struct CommitRange {
    pub branch_name: String,
    pub base_branch_name: String,
    pub repository_path: PathBuf,
    /// Newest first, merges excluded. The same order is used everywhere a
    /// commit-message summary is built from this range.
    pub commits: Vec<CommitInfo>,
    pub stats: StatSummary,
}

/// Collects commit ranges and diffs for one repository.
#[derive(Debug)]
pub struct CommitRangeCollector {
    git: GitRunner,
}

impl CommitRangeCollector {
    pub fn new(git: GitRunner) -> Self {
        Self { git }
    }

    pub fn git(&self) -> &GitRunner {
        &self.git
    }

    /// Collect the commits unique to `branch` relative to `base`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::BranchNotFound` when `branch` does not resolve
    /// and `CoreError::GitOperationFailed` for any other git failure; the
    /// latter is always surfaced since the caller cannot proceed without
    /// real history.
    #[instrument(skip(self))]
    pub async fn collect(&self, branch: &str, base: &str) -> Result<CommitRange, CoreError> {
        if !self.git.ref_exists(branch).await? {
            return Err(CoreError::BranchNotFound {
                branch: branch.to_owned(),
            });
        }

        let merge_base = self.git.merge_base(base, branch).await?;
        let range = format!("{merge_base}..{branch}");
        let format = format!("--format=%H{LOG_FIELD_SEP}%an{LOG_FIELD_SEP}%at{LOG_FIELD_SEP}%s");
        let log = self
            .git
            .run_ok(&["log", &range, "--no-merges", &format])
            .await?;
        let commits = parse_commit_log(&log)?;

        let numstat = self.git.diff_numstat(&merge_base, branch).await?;
        let stats = parse_numstat(&numstat);

        debug!(
            branch,
            base,
            commits = commits.len(),
            files = stats.files_changed,
            "commit range collected"
        );

        Ok(CommitRange {
            branch_name: branch.to_owned(),
            base_branch_name: base.to_owned(),
            repository_path: self.git.repo_path().to_path_buf(),
            commits,
            stats,
        })
    }

    /// Unified diff between the merge base of `base`/`branch` and the
    /// branch tip, for the prioritizer.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::GitOperationFailed` on any git failure.
    #[instrument(skip(self))]
    pub async fn unified_diff(&self, branch: &str, base: &str) -> Result<String, CoreError> {
        let merge_base = self.git.merge_base(base, branch).await?;
        self.git.diff(&merge_base, branch).await
    }

    /// Human-readable `diff --stat` between merge base and branch tip.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::GitOperationFailed` on any git failure.
    #[instrument(skip(self))]
    pub async fn diff_stat(&self, branch: &str, base: &str) -> Result<String, CoreError> {
        let merge_base = self.git.merge_base(base, branch).await?;
        self.git.diff_stat(&merge_base, branch).await
    }
}

fn parse_commit_log(log: &str) -> Result<Vec<CommitInfo>, CoreError> {
    let mut commits = Vec::new();
    for line in log.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.splitn(4, LOG_FIELD_SEP);
        let (sha, author, at, subject) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(sha), Some(author), Some(at), Some(subject)) => (sha, author, at, subject),
            _ => {
                return Err(CoreError::GitOperationFailed {
                    command: "log".to_owned(),
                    detail: format!("unparseable log line: {line}"),
                });
            }
        };
        let secs: i64 = at.parse().map_err(|e| CoreError::GitOperationFailed {
            command: "log".to_owned(),
            detail: format!("unparseable commit timestamp '{at}': {e}"),
        })?;
        commits.push(CommitInfo {
            sha: sha.to_owned(),
            author: author.to_owned(),
            subject: subject.to_owned(),
            timestamp: DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH),
        });
    }
    Ok(commits)
}

fn parse_numstat(numstat: &str) -> StatSummary {
    let mut stats = StatSummary::default();
    for line in numstat.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.splitn(3, '\t');
        let (Some(ins), Some(del), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        // numstat reports "-" for binary files.
        let insertions = ins.parse().unwrap_or(0);
        let deletions = del.parse().unwrap_or(0);
        stats.insertions += insertions;
        stats.deletions += deletions;
        stats.files.push(FileChange {
            path: path.to_owned(),
            insertions,
            deletions,
        });
    }
    stats.files_changed = stats.files.len();
    stats
}
