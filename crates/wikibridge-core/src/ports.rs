//! Collaborator traits for the wiki and the issue tracker.
//!
//! The core crate only speaks these traits; HTTP concerns (auth, retries
//! on the transport level, JSON shapes of a concrete vendor) live in the
//! server's adapters. Tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;

/// Page identity as returned by a title search.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Full page content with the version counter used for optimistic locking.
#[derive(Debug, Clone, Serialize)]
pub struct PageContent {
    pub id: String,
    pub title: String,
    /// Storage-format body.
    pub body: String,
    pub version: u64,
    pub url: String,
}

/// Issue fields used for page enrichment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueDetail {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub resolution_date: Option<String>,
    pub description: Option<String>,
    pub url: String,
}

/// Project metadata: the workflow statuses and issue types a project
/// actually uses, for status-name diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectMeta {
    pub key: String,
    pub name: String,
    pub statuses: Vec<String>,
    pub issue_types: Vec<String>,
}

/// Result of a workflow transition attempt.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub key: String,
    pub from_status: String,
    pub to_status: String,
}

/// A saved tracker search filter.
#[derive(Debug, Clone, Serialize)]
pub struct SavedFilter {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Wiki page operations needed by the upsert policy.
#[async_trait]
pub trait WikiClient: Send + Sync {
    /// Find a page by exact title within a space. `Ok(None)` means the
    /// title is free.
    async fn find_page(&self, space_key: &str, title: &str)
    -> Result<Option<PageSummary>, CoreError>;

    /// Fetch a page body and its current version.
    async fn get_page(&self, page_id: &str) -> Result<PageContent, CoreError>;

    /// Create a page under a parent. Fails with `CoreError::DuplicatePage`
    /// when the title already exists in the space.
    async fn create_page(
        &self,
        space_key: &str,
        parent_page_id: &str,
        title: &str,
        body: &str,
    ) -> Result<PageSummary, CoreError>;

    /// Replace a page body at an expected version. Fails with
    /// `CoreError::PageConflict` when someone else bumped the version.
    async fn update_page(
        &self,
        page_id: &str,
        title: &str,
        body: &str,
        expected_version: u64,
    ) -> Result<PageSummary, CoreError>;
}

/// Issue-tracker operations used for enrichment and workflow commands.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn get_issue(&self, key: &str) -> Result<IssueDetail, CoreError>;

    /// Search issues with a tracker-native query string.
    async fn search_issues(&self, query: &str, limit: u32) -> Result<Vec<IssueDetail>, CoreError>;

    async fn project_meta(&self, project_key: &str) -> Result<ProjectMeta, CoreError>;

    /// Move an issue to the named status, resolving the matching
    /// transition on the tracker side.
    async fn transition_issue(
        &self,
        key: &str,
        target_status: &str,
    ) -> Result<TransitionOutcome, CoreError>;

    /// Transition an issue to its terminal "complete" status, optionally
    /// setting a resolution comment.
    async fn complete_issue(
        &self,
        key: &str,
        comment: Option<&str>,
    ) -> Result<TransitionOutcome, CoreError>;

    /// Persist a named search filter for later reuse.
    async fn create_filter(
        &self,
        name: &str,
        query: &str,
        description: Option<&str>,
    ) -> Result<SavedFilter, CoreError>;
}
