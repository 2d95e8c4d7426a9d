//! Integration ("base") branch resolution.
//!
//! The candidate order below is a hard-coded policy, not configuration:
//! teams that keep a `dev` integration branch expect it to win over `main`
//! even when both exist. Remote-tracking refs are consulted for the two
//! development-branch names so a freshly cloned repository without local
//! integration branches still resolves.

use tracing::{debug, instrument};

use crate::error::CoreError;
use crate::git::GitRunner;

/// Candidates tried in order; the first resolvable ref wins.
pub const BASE_BRANCH_CANDIDATES: [&str; 6] = [
    "dev",
    "origin/dev",
    "develop",
    "origin/develop",
    "main",
    "master",
];

/// Resolve the integration branch for a repository.
///
/// # Errors
///
/// Returns `CoreError::NoBaseBranchFound` when none of the candidates
/// resolve, and `CoreError::GitOperationFailed` when git itself fails.
#[instrument(skip(git), fields(repo = %git.repo_path().display()))]
pub async fn resolve_base_branch(git: &GitRunner) -> Result<String, CoreError> {
    for candidate in BASE_BRANCH_CANDIDATES {
        if git.ref_exists(candidate).await? {
            debug!(base = candidate, "base branch resolved");
            return Ok(candidate.to_owned());
        }
    }
    Err(CoreError::NoBaseBranchFound)
}
