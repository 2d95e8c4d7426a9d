//! Repository location for a branch name.
//!
//! Given a configured name→path table, finds the repository that contains
//! a branch. When several repositories match, a two-stage heuristic picks
//! one: first repositories whose unique commit range carries a merge
//! commit, then repositories where the branch is currently checked out.
//! The heuristic is best-effort: stale same-named branches in several
//! repositories can still misselect, which is why an explicit path always
//! short-circuits the search.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::baseref::resolve_base_branch;
use crate::error::CoreError;
use crate::git::GitRunner;

/// A located repository: configured name plus working-tree path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoMatch {
    pub name: String,
    pub path: PathBuf,
}

/// Locate the repository containing `branch`.
///
/// An explicit path wins outright (validated against the configured table
/// when one exists, so callers cannot point the broker at arbitrary
/// directories). Otherwise every configured repository is probed for a
/// local or `origin/` remote-tracking ref of that name.
///
/// # Errors
///
/// - `CoreError::ConfigurationMissing` when no explicit path and no table.
/// - `CoreError::ConfigurationInvalid` when the explicit path is outside the table.
/// - `CoreError::RepositoryNotFound` when no configured repository matched.
#[instrument(skip(repositories))]
pub async fn locate_repository(
    branch: &str,
    repositories: &BTreeMap<String, PathBuf>,
    explicit_path: Option<&Path>,
) -> Result<RepoMatch, CoreError> {
    if let Some(path) = explicit_path {
        return validate_explicit_path(path, repositories);
    }
    if repositories.is_empty() {
        return Err(CoreError::ConfigurationMissing(
            "no repositories configured and no explicit path given".to_owned(),
        ));
    }

    let mut matches: Vec<RepoMatch> = Vec::new();
    for (name, path) in repositories {
        let git = GitRunner::new(path);
        if branch_present(&git, branch).await? {
            debug!(repo = name.as_str(), "branch present");
            matches.push(RepoMatch {
                name: name.clone(),
                path: path.clone(),
            });
        }
    }

    match matches.len() {
        0 => Err(CoreError::RepositoryNotFound {
            branch: branch.to_owned(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Ok(disambiguate(branch, matches).await),
    }
}

/// True when `branch` exists locally or as an `origin/` tracking ref.
async fn branch_present(git: &GitRunner, branch: &str) -> Result<bool, CoreError> {
    if git.ref_exists(branch).await? {
        return Ok(true);
    }
    git.ref_exists(&format!("origin/{branch}")).await
}

fn validate_explicit_path(
    path: &Path,
    repositories: &BTreeMap<String, PathBuf>,
) -> Result<RepoMatch, CoreError> {
    if repositories.is_empty() {
        // No allowlist configured; trust the caller.
        return Ok(RepoMatch {
            name: "explicit".to_owned(),
            path: path.to_path_buf(),
        });
    }
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    for (name, allowed) in repositories {
        let allowed_resolved = allowed
            .canonicalize()
            .unwrap_or_else(|_| allowed.clone());
        if resolved == allowed_resolved || resolved.starts_with(&allowed_resolved) {
            return Ok(RepoMatch {
                name: name.clone(),
                path: resolved,
            });
        }
    }
    Err(CoreError::ConfigurationInvalid(format!(
        "path '{}' is not under any configured repository",
        path.display(),
    )))
}

/// Two-stage tie-break across repositories that all contain the branch.
///
/// Probe failures inside a candidate (missing base branch, git errors)
/// only remove that candidate from the stage, they never fail the locate:
/// at this point we know the branch exists somewhere.
async fn disambiguate(branch: &str, mut matches: Vec<RepoMatch>) -> RepoMatch {
    // Stage 1: a merge commit in the unique range suggests the branch
    // actually lived (and was integrated) in this repository.
    let mut merged: Vec<&RepoMatch> = Vec::new();
    for m in &matches {
        if has_merge_commit(&m.path, branch).await {
            merged.push(m);
        }
    }
    if let Some(first) = merged.first() {
        debug!(repo = first.name.as_str(), "tie-break: merge commit present");
        return (*first).clone();
    }

    // Stage 2: the branch being checked out marks the active repository.
    for m in &matches {
        let git = GitRunner::new(&m.path);
        match git.current_branch().await {
            Ok(current) if current == branch => {
                debug!(repo = m.name.as_str(), "tie-break: branch checked out");
                return m.clone();
            }
            Ok(_) => {}
            Err(e) => warn!(repo = m.name.as_str(), error = %e, "current-branch probe failed"),
        }
    }

    // Still ambiguous: fall back to table order.
    debug!(repo = matches[0].name.as_str(), "tie-break: table order");
    matches.swap_remove(0)
}

async fn has_merge_commit(path: &Path, branch: &str) -> bool {
    let git = GitRunner::new(path);
    let base = match resolve_base_branch(&git).await {
        Ok(base) => base,
        Err(e) => {
            warn!(repo = %path.display(), error = %e, "base resolution failed during tie-break");
            return false;
        }
    };
    match git.merge_commit_count(&base, branch).await {
        Ok(count) => count > 0,
        Err(e) => {
            warn!(repo = %path.display(), error = %e, "merge probe failed during tie-break");
            false
        }
    }
}
