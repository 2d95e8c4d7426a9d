//! Error taxonomy for the core engine.
//!
//! Each analysis-stage failure gets its own variant so callers can tell
//! apart "add a repository mapping", "fix the branch name", and "none of
//! the base-branch candidates exist" without string matching. Session and
//! approval failures are similarly distinguished because each implies a
//! different corrective action.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("no configured repository contains branch '{branch}'")]
    RepositoryNotFound { branch: String },

    #[error("branch '{branch}' does not resolve in the repository")]
    BranchNotFound { branch: String },

    #[error("none of the base branch candidates exist in the repository")]
    NoBaseBranchFound,

    #[error("git {command} failed: {detail}")]
    GitOperationFailed { command: String, detail: String },

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("session expired: {session_id}")]
    SessionExpired { session_id: String },

    #[error("approval token does not match")]
    InvalidApprovalToken,

    #[error("session already finalized (status: {status})")]
    AlreadyFinalized { status: String },

    #[error("a page titled '{title}' already exists")]
    DuplicatePage { title: String },

    /// Version conflict reported by the wiki. Retried internally by the
    /// upsert policy; surfaces only when wrapped elsewhere.
    #[error("page version conflict: {page_id}")]
    PageConflict { page_id: String },

    #[error("page '{title}' kept changing underneath us ({attempts} attempts)")]
    ConcurrentModificationExceeded { title: String, attempts: u32 },

    #[error("{system} authentication failed during {operation}: {detail}")]
    UpstreamAuthFailed {
        system: String,
        operation: String,
        detail: String,
    },

    #[error("{system} unavailable during {operation}: {detail}")]
    UpstreamUnavailable {
        system: String,
        operation: String,
        detail: String,
    },

    #[error("template error: {0}")]
    Template(#[from] wikibridge_tpl::TplError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
