//! Core engine for the wiki generation broker.
//!
//! Everything that decides lives here: repository location, base-branch
//! resolution, commit-range collection, diff prioritization, the
//! two-phase session workflow, and the page upsert policy. I/O with the
//! wiki and the issue tracker goes through the [`WikiClient`] and
//! [`IssueTracker`] traits; the server crate supplies the HTTP adapters.

mod analyze;
mod baseref;
mod config;
mod diffsel;
mod error;
mod git;
mod locate;
mod orchestrator;
mod ports;
mod range;
mod session;
mod status;
mod upsert;

pub use analyze::{BranchAnalyzer, BranchChangeReport, BranchCommitReport};
pub use baseref::{BASE_BRANCH_CANDIDATES, resolve_base_branch};
pub use config::{
    DiffSettings, SessionSettings, Settings, TrackerSettings, WikiSettings, load_settings,
};
pub use diffsel::{
    ExcludedFile, ExclusionReason, ExclusionRules, IncludedFile, PrioritizedDiff, PriorityTier,
    prioritize,
};
pub use error::CoreError;
pub use git::GitRunner;
pub use locate::{RepoMatch, locate_repository};
pub use orchestrator::{
    ApprovalReceipt, BranchContentRequest, CustomPageRequest, GenerationReceipt,
    IssueSummaryRequest, SessionStatusView, WikiGenerationOrchestrator,
};
pub use ports::{
    IssueDetail, IssueTracker, PageContent, PageSummary, ProjectMeta, SavedFilter,
    TransitionOutcome, WikiClient,
};
pub use range::{CommitInfo, CommitRange, CommitRangeCollector, FileChange, StatSummary};
pub use session::{
    GenerationSession, SessionStatus, SessionStore, SessionTicket, TargetIdentity, WorkflowKind,
};
pub use status::{IssueKeyMatcher, StatusSynonyms};
pub use upsert::{PageUpsertPolicy, UpsertOutcome};
