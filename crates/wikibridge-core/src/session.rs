//! Two-phase generation sessions.
//!
//! Phase one renders a page preview and parks it here under a single-use
//! approval token; phase two consumes the token and publishes. The store
//! is the only place session state transitions happen, so the
//! WaitApproval → Upserting → Done/Failed machine (with Expired as a
//! sweep-side branch) cannot be bypassed by concurrent approvers.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::error::CoreError;

/// Which page workflow a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    IssueSummary,
    BranchContent,
    CustomPage,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IssueSummary => write!(f, "issue_summary"),
            Self::BranchContent => write!(f, "branch_content"),
            Self::CustomPage => write!(f, "custom_page"),
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Preview rendered, waiting for an approval call.
    WaitApproval,
    /// Token consumed, publish in flight.
    Upserting,
    Done,
    Expired,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitApproval => write!(f, "wait_approval"),
            Self::Upserting => write!(f, "upserting"),
            Self::Done => write!(f, "done"),
            Self::Expired => write!(f, "expired"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Where the approved page will land in the wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetIdentity {
    pub space_key: String,
    pub parent_page_id: String,
    pub title: String,
}

/// One parked generation, preview included.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSession {
    pub session_id: String,
    pub workflow: WorkflowKind,
    pub status: SessionStatus,
    pub target: TargetIdentity,
    /// Rendered storage-format body, published verbatim on approval.
    pub rendered_body: String,
    /// When set, publishing appends to an existing page of the same title
    /// instead of failing; the key labels the appended section.
    pub merge_key: Option<String>,
    /// Single-use; cleared the moment an approval claims the session.
    #[serde(skip_serializing)]
    pub approval_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Failure detail once the session reaches `Failed`.
    pub failure_detail: Option<String>,
}

impl GenerationSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::WaitApproval && now >= self.expires_at
    }
}

/// Handed back to the caller after session creation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTicket {
    pub session_id: String,
    pub approval_token: String,
    pub expires_at: DateTime<Utc>,
}

/// In-memory session store. Sessions are never deleted, only marked, so
/// status queries keep working after expiry or completion.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, GenerationSession>>,
}

impl SessionStore {
    pub fn new(settings: &SessionSettings) -> Self {
        // Settings validation bounds the TTL; an unvalidated value still
        // must not panic here, so out-of-range saturates.
        let ttl = i64::try_from(settings.ttl_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .unwrap_or(Duration::MAX);
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Park a rendered preview and mint its approval token.
    #[instrument(skip(self, rendered_body), fields(workflow = %workflow))]
    pub fn create(
        &self,
        workflow: WorkflowKind,
        target: TargetIdentity,
        rendered_body: String,
        merge_key: Option<String>,
    ) -> SessionTicket {
        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        let approval_token = Uuid::new_v4().to_string();
        let session = GenerationSession {
            session_id: session_id.clone(),
            workflow,
            status: SessionStatus::WaitApproval,
            target,
            rendered_body,
            merge_key,
            approval_token: Some(approval_token.clone()),
            created_at: now,
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            failure_detail: None,
        };
        let ticket = SessionTicket {
            session_id: session_id.clone(),
            approval_token,
            expires_at: session.expires_at,
        };
        self.lock().insert(session_id.clone(), session);
        info!(session_id = session_id.as_str(), "session created");
        ticket
    }

    /// Snapshot of a session, expiry applied lazily.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::SessionNotFound` for unknown ids.
    pub fn get(&self, session_id: &str) -> Result<GenerationSession, CoreError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::SessionNotFound {
                session_id: session_id.to_owned(),
            })?;
        expire_in_place(session, Utc::now());
        Ok(session.clone())
    }

    /// Atomically claim a session for publishing.
    ///
    /// Verifies the token, consumes it, and moves the session to
    /// `Upserting` in one step under the lock. A second approval with the
    /// same token therefore always fails, whichever error it hits first.
    ///
    /// # Errors
    ///
    /// - `CoreError::SessionNotFound` for an unknown id.
    /// - `CoreError::SessionExpired` when the TTL elapsed before approval.
    /// - `CoreError::AlreadyFinalized` when the session left `WaitApproval`.
    /// - `CoreError::InvalidApprovalToken` on token mismatch.
    #[instrument(skip(self, token))]
    pub fn begin_approval(
        &self,
        session_id: &str,
        token: &str,
    ) -> Result<GenerationSession, CoreError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::SessionNotFound {
                session_id: session_id.to_owned(),
            })?;
        expire_in_place(session, Utc::now());

        match session.status {
            SessionStatus::WaitApproval => {}
            SessionStatus::Expired => {
                return Err(CoreError::SessionExpired {
                    session_id: session_id.to_owned(),
                });
            }
            status => {
                return Err(CoreError::AlreadyFinalized {
                    status: status.to_string(),
                });
            }
        }
        if session.approval_token.as_deref() != Some(token) {
            warn!(session_id, "approval token mismatch");
            return Err(CoreError::InvalidApprovalToken);
        }

        session.approval_token = None;
        session.status = SessionStatus::Upserting;
        info!(session_id, "session claimed for upsert");
        Ok(session.clone())
    }

    /// Record the publish outcome for a claimed session.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::SessionNotFound` for unknown ids.
    #[instrument(skip(self, failure_detail))]
    pub fn finalize(
        &self,
        session_id: &str,
        succeeded: bool,
        failure_detail: Option<String>,
    ) -> Result<(), CoreError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::SessionNotFound {
                session_id: session_id.to_owned(),
            })?;
        session.status = if succeeded {
            SessionStatus::Done
        } else {
            SessionStatus::Failed
        };
        session.failure_detail = failure_detail;
        info!(session_id, status = %session.status, "session finalized");
        Ok(())
    }

    /// Mark every overdue `WaitApproval` session as expired. Returns the
    /// ids that flipped.
    pub fn sweep_expired(&self) -> Vec<String> {
        let now = Utc::now();
        let mut sessions = self.lock();
        let mut expired = Vec::new();
        for (id, session) in sessions.iter_mut() {
            if session.is_expired(now) {
                expire_in_place(session, now);
                expired.push(id.clone());
            }
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "sessions expired by sweep");
        }
        expired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, GenerationSession>> {
        // Session mutations cannot panic while the lock is held.
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn expire_in_place(session: &mut GenerationSession, now: DateTime<Utc>) {
    if session.is_expired(now) {
        session.status = SessionStatus::Expired;
        session.approval_token = None;
    }
}
