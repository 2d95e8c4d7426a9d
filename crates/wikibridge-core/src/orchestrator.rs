//! Two-phase page generation.
//!
//! Phase one (the `start_*` entry points) gathers evidence, renders the
//! page body exactly once, and parks it in a session; nothing touches the
//! wiki. Phase two ([`WikiGenerationOrchestrator::approve`]) claims the
//! session with its single-use token and publishes through the upsert
//! policy. Abandoned previews expire on their own.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use typed_builder::TypedBuilder;
use wikibridge_tpl::{TemplateEngine, escape_html, text_to_html};

use crate::analyze::BranchAnalyzer;
use crate::config::Settings;
use crate::error::CoreError;
use crate::ports::{IssueDetail, IssueTracker, WikiClient};
use crate::session::{
    GenerationSession, SessionStatus, SessionStore, TargetIdentity, WorkflowKind,
};
use crate::status::IssueKeyMatcher;
use crate::upsert::{PageUpsertPolicy, UpsertOutcome};

/// Commit list entries rendered into a page before truncation.
const MAX_COMMIT_LIST_ENTRIES: usize = 100;

/// Commit subjects folded into an automatic change summary.
const MAX_SUMMARY_SUBJECTS: usize = 5;

/// Issue keys enriched from the tracker per page.
const MAX_ENRICHED_ISSUES: usize = 5;

static SHA_PREFIX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[0-9a-f]{7,40}\s+").unwrap());

/// Issue-summary page request.
#[derive(Debug, Clone, TypedBuilder)]
pub struct IssueSummaryRequest {
    #[builder(setter(into))]
    pub issue_key: String,
    #[builder(setter(into))]
    pub issue_title: String,
    #[builder(default, setter(into, strip_option(fallback = assignee_opt)))]
    pub assignee: Option<String>,
    #[builder(default, setter(into, strip_option(fallback = resolution_date_opt)))]
    pub resolution_date: Option<String>,
    #[builder(default, setter(into, strip_option(fallback = priority_opt)))]
    pub priority: Option<String>,
    /// Pre-formatted commit lines. When absent, evidence is collected
    /// from the issue's conventional branch.
    #[builder(default, setter(strip_option(fallback = commit_list_opt)))]
    pub commit_list: Option<Vec<String>>,
    #[builder(default, setter(into, strip_option(fallback = change_summary_opt)))]
    pub change_summary: Option<String>,
    /// Restricts evidence collection to one configured repository.
    #[builder(default, setter(into, strip_option(fallback = project_name_opt)))]
    pub project_name: Option<String>,
}

/// Branch-content page request.
#[derive(Debug, Clone, TypedBuilder)]
pub struct BranchContentRequest {
    #[builder(setter(into))]
    pub page_title: String,
    /// Branch name (or other source label) shown on the page and used
    /// for evidence collection when no commit list is supplied.
    #[builder(setter(into))]
    pub input_value: String,
    #[builder(default, setter(strip_option(fallback = commit_list_opt)))]
    pub commit_list: Option<Vec<String>>,
    #[builder(default, setter(into, strip_option(fallback = base_date_opt)))]
    pub base_date: Option<String>,
    #[builder(default, setter(into, strip_option(fallback = change_summary_opt)))]
    pub change_summary: Option<String>,
    #[builder(default, setter(strip_option(fallback = issue_keys_opt)))]
    pub issue_keys: Option<Vec<String>>,
    #[builder(default, setter(into, strip_option(fallback = diff_stat_opt)))]
    pub diff_stat: Option<String>,
    #[builder(default, setter(into, strip_option(fallback = project_name_opt)))]
    pub project_name: Option<String>,
}

/// Custom page request. Content is plain text, converted to markup.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CustomPageRequest {
    #[builder(setter(into))]
    pub page_title: String,
    #[builder(setter(into))]
    pub content: String,
    #[builder(default, setter(into, strip_option(fallback = parent_page_id_opt)))]
    pub parent_page_id: Option<String>,
    #[builder(default, setter(into, strip_option(fallback = parent_page_title_opt)))]
    pub parent_page_title: Option<String>,
    #[builder(default, setter(into, strip_option(fallback = space_key_opt)))]
    pub space_key: Option<String>,
}

/// Returned by every `start_*` call; the caller shows the preview and
/// echoes the token back through `approve`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReceipt {
    pub session_id: String,
    pub approval_token: String,
    pub page_title: String,
    pub preview: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of an approved publish.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalReceipt {
    pub session_id: String,
    pub outcome: UpsertOutcome,
}

/// Inspectable session view. The approval token appears only while the
/// session still waits for approval.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusView {
    pub session_id: String,
    pub workflow: WorkflowKind,
    pub status: SessionStatus,
    pub page_title: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

impl From<GenerationSession> for SessionStatusView {
    fn from(session: GenerationSession) -> Self {
        Self {
            session_id: session.session_id,
            workflow: session.workflow,
            status: session.status,
            page_title: session.target.title,
            created_at: session.created_at,
            expires_at: session.expires_at,
            approval_token: session.approval_token,
            failure_detail: session.failure_detail,
        }
    }
}

/// Drives the generate → approve → publish workflow.
#[derive(TypedBuilder)]
pub struct WikiGenerationOrchestrator {
    settings: Settings,
    analyzer: BranchAnalyzer,
    engine: Arc<TemplateEngine>,
    sessions: Arc<SessionStore>,
    wiki: Arc<dyn WikiClient>,
    /// Optional so deployments without a tracker still generate pages.
    #[builder(default)]
    tracker: Option<Arc<dyn IssueTracker>>,
    #[builder(default)]
    key_matcher: IssueKeyMatcher,
}

impl WikiGenerationOrchestrator {
    /// Render an issue-summary preview and park it for approval.
    ///
    /// Without a caller-supplied commit list the conventional issue
    /// branch (`dev_<KEY>`) is analyzed; evidence failures degrade to an
    /// empty commit section rather than failing the preview. Tracker
    /// enrichment is likewise best-effort.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Template` when rendering fails.
    #[instrument(skip(self, request), fields(issue_key = request.issue_key.as_str()))]
    pub async fn start_issue_summary(
        &self,
        request: IssueSummaryRequest,
    ) -> Result<GenerationReceipt, CoreError> {
        let branch = format!("dev_{}", request.issue_key);

        let (commit_list, diff_stat) = match request.commit_list {
            Some(list) => (list, None),
            None => match self.collect_evidence(&branch, request.project_name.as_deref()).await {
                Ok(evidence) => evidence,
                Err(e) => {
                    warn!(branch = branch.as_str(), error = %e, "evidence collection failed");
                    (Vec::new(), None)
                }
            },
        };

        let issue = self.enrich_issues(&[request.issue_key.clone()]).await;
        let issue = issue.first();

        let change_summary = request
            .change_summary
            .unwrap_or_else(|| auto_summarize(&commit_list));

        // Scalar values must be escaped before they enter the storage-format
        // body; the *_html fields are built escaped.
        let context = json!({
            "issue_key": escape_html(&request.issue_key),
            "issue_title": escape_html(&request.issue_title),
            "assignee": escape_html(&request.assignee.or_else(|| issue.and_then(|i| i.assignee.clone())).unwrap_or_default()),
            "resolution_date": escape_html(&request.resolution_date.or_else(|| issue.and_then(|i| i.resolution_date.clone())).unwrap_or_default()),
            "priority": escape_html(&request.priority.or_else(|| issue.and_then(|i| i.priority.clone())).unwrap_or_default()),
            "branch_name": escape_html(&branch),
            "issue_status": escape_html(&issue.map(|i| i.status.clone()).unwrap_or_default()),
            "issue_url": escape_html(&issue.map(|i| i.url.clone()).unwrap_or_default()),
            "issue_description_html": issue
                .and_then(|i| i.description.as_deref())
                .map(text_to_html)
                .unwrap_or_default(),
            "commit_list_html": build_commit_list_html(&commit_list),
            "change_summary_html": text_to_html(&change_summary),
            "diff_stat": escape_html(&diff_stat.unwrap_or_default()),
        });

        let title = format!("[{}] {}", request.issue_key, request.issue_title);
        self.park(
            WorkflowKind::IssueSummary,
            title,
            None,
            "issue_summary",
            &context,
            Some(request.issue_key),
        )
    }

    /// Render a branch-content preview and park it for approval.
    ///
    /// # Errors
    ///
    /// Propagates analysis errors when evidence must be collected, and
    /// `CoreError::Template` when rendering fails.
    #[instrument(skip(self, request), fields(title = request.page_title.as_str()))]
    pub async fn start_branch_content(
        &self,
        request: BranchContentRequest,
    ) -> Result<GenerationReceipt, CoreError> {
        let (commit_list, mut diff_stat) = match request.commit_list {
            Some(list) => (list, None),
            // No commit list means the input value names a real branch, so
            // a failed analysis is a hard error here.
            None => {
                self.collect_evidence(&request.input_value, request.project_name.as_deref())
                    .await?
            }
        };
        if let Some(explicit) = request.diff_stat {
            diff_stat = Some(explicit);
        }

        let issue_keys = match request.issue_keys {
            Some(keys) => keys,
            None => {
                let mut text = request.input_value.clone();
                for line in &commit_list {
                    text.push('\n');
                    text.push_str(line);
                }
                self.key_matcher.extract(&text)
            }
        };
        let issues = self.enrich_issues(&issue_keys).await;

        let change_summary = request
            .change_summary
            .unwrap_or_else(|| auto_summarize(&commit_list));
        let base_date = request
            .base_date
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());

        let context = json!({
            "input_value": escape_html(&request.input_value),
            "base_date": escape_html(&base_date),
            "issues_table_html": build_issues_table_html(&issues),
            "issue_description_html": "",
            "commit_list_html": build_commit_list_html(&commit_list),
            "change_summary_html": text_to_html(&change_summary),
            "diff_stat": escape_html(&diff_stat.unwrap_or_default()),
        });

        self.park(
            WorkflowKind::BranchContent,
            request.page_title,
            None,
            "branch_content",
            &context,
            Some(request.input_value),
        )
    }

    /// Render a custom page preview and park it for approval.
    ///
    /// Custom pages never merge: approving against an occupied title
    /// fails with `DuplicatePage`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigurationInvalid` when neither parent id
    /// nor a resolvable parent title is given, and `CoreError::Template`
    /// when rendering fails.
    #[instrument(skip(self, request), fields(title = request.page_title.as_str()))]
    pub async fn start_custom_page(
        &self,
        request: CustomPageRequest,
    ) -> Result<GenerationReceipt, CoreError> {
        let space_key = request
            .space_key
            .unwrap_or_else(|| self.settings.wiki.space_key.clone());

        let parent_page_id = match (request.parent_page_id, request.parent_page_title) {
            (Some(id), _) => id,
            (None, Some(title)) => {
                let parent = self.wiki.find_page(&space_key, &title).await?.ok_or_else(|| {
                    CoreError::ConfigurationInvalid(format!(
                        "parent page '{title}' not found in space {space_key}"
                    ))
                })?;
                parent.id
            }
            (None, None) => {
                return Err(CoreError::ConfigurationInvalid(
                    "either parentPageId or parentPageTitle is required".to_owned(),
                ));
            }
        };

        let context = json!({ "content_html": text_to_html(&request.content) });
        self.park(
            WorkflowKind::CustomPage,
            request.page_title,
            Some((space_key, parent_page_id)),
            "custom_page",
            &context,
            None,
        )
    }

    /// Claim a parked session and publish it.
    ///
    /// # Errors
    ///
    /// Propagates claim errors (`SessionNotFound`, `SessionExpired`,
    /// `InvalidApprovalToken`, `AlreadyFinalized`) and publish errors;
    /// the session is finalized `Failed` before a publish error returns.
    #[instrument(skip(self, approval_token))]
    pub async fn approve(
        &self,
        session_id: &str,
        approval_token: &str,
    ) -> Result<ApprovalReceipt, CoreError> {
        let session = self.sessions.begin_approval(session_id, approval_token)?;

        let policy = PageUpsertPolicy::new(self.wiki.as_ref());
        let result = policy
            .upsert(
                &session.target,
                &session.rendered_body,
                session.merge_key.as_deref(),
            )
            .await;

        match result {
            Ok(outcome) => {
                self.sessions.finalize(session_id, true, None)?;
                info!(
                    session_id,
                    page_id = outcome.page().id.as_str(),
                    "generation published"
                );
                Ok(ApprovalReceipt {
                    session_id: session_id.to_owned(),
                    outcome,
                })
            }
            Err(e) => {
                self.sessions
                    .finalize(session_id, false, Some(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Inspect a session without mutating it (beyond lazy expiry).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::SessionNotFound` for unknown ids.
    pub fn get_status(&self, session_id: &str) -> Result<SessionStatusView, CoreError> {
        Ok(self.sessions.get(session_id)?.into())
    }

    /// Mark overdue sessions as expired; returns the flipped ids.
    pub fn sweep_expired_sessions(&self) -> Vec<String> {
        self.sessions.sweep_expired()
    }

    /// Render once, then create the session as the very last step.
    fn park(
        &self,
        workflow: WorkflowKind,
        title: String,
        placement: Option<(String, String)>,
        template: &str,
        context: &serde_json::Value,
        merge_key: Option<String>,
    ) -> Result<GenerationReceipt, CoreError> {
        let preview = self.engine.render(template, context)?;

        let (space_key, parent_page_id) = placement.unwrap_or_else(|| {
            (
                self.settings.wiki.space_key.clone(),
                self.settings.wiki.root_page_id.clone(),
            )
        });
        let target = TargetIdentity {
            space_key,
            parent_page_id,
            title: title.clone(),
        };

        let ticket = self
            .sessions
            .create(workflow, target, preview.clone(), merge_key);
        Ok(GenerationReceipt {
            session_id: ticket.session_id,
            approval_token: ticket.approval_token,
            page_title: title,
            preview,
            expires_at: ticket.expires_at,
        })
    }

    /// Analyze a branch into commit lines plus a diff stat.
    async fn collect_evidence(
        &self,
        branch: &str,
        project_name: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>), CoreError> {
        let explicit_path = match project_name {
            Some(name) => Some(
                self.settings
                    .repositories
                    .get(name)
                    .cloned()
                    .ok_or_else(|| {
                        CoreError::ConfigurationInvalid(format!(
                            "project '{name}' is not a configured repository"
                        ))
                    })?,
            ),
            None => None,
        };

        let report = self
            .analyzer
            .collect_commits(branch, explicit_path.as_deref(), false)
            .await?;

        let commit_list = report
            .range
            .commits
            .iter()
            .map(|c| {
                let short = c.sha.get(..7).unwrap_or(&c.sha);
                format!("{short} {}", c.subject)
            })
            .collect();
        let stats = &report.range.stats;
        let diff_stat = format!(
            "{} files changed, {} insertions(+), {} deletions(-)",
            stats.files_changed, stats.insertions, stats.deletions,
        );
        Ok((commit_list, Some(diff_stat)))
    }

    /// Fetch tracker details for the first few issue keys, concurrently.
    /// Failures are logged and skipped so a flaky tracker never blocks a
    /// preview.
    async fn enrich_issues(&self, keys: &[String]) -> Vec<IssueDetail> {
        let Some(tracker) = self.tracker.as_ref() else {
            return Vec::new();
        };
        let lookups = keys
            .iter()
            .take(MAX_ENRICHED_ISSUES)
            .map(|key| async move { (key, tracker.get_issue(key).await) });

        let mut issues = Vec::new();
        for (key, result) in futures::future::join_all(lookups).await {
            match result {
                Ok(issue) => issues.push(issue),
                Err(e) => warn!(key = key.as_str(), error = %e, "issue enrichment failed"),
            }
        }
        issues
    }
}

/// Commit lines as `<li>` items, escaped, capped at
/// [`MAX_COMMIT_LIST_ENTRIES`] with an overflow marker.
fn build_commit_list_html(commit_list: &[String]) -> String {
    let mut items: Vec<String> = commit_list
        .iter()
        .take(MAX_COMMIT_LIST_ENTRIES)
        .map(|line| format!("<li>{}</li>", escape_html(line)))
        .collect();
    if commit_list.len() > MAX_COMMIT_LIST_ENTRIES {
        items.push(format!(
            "<li>... and {} more commits</li>",
            commit_list.len() - MAX_COMMIT_LIST_ENTRIES,
        ));
    }
    items.join("\n")
}

/// Fallback change summary: the first few commit subjects, sha prefixes
/// stripped, as a bullet list.
fn auto_summarize(commit_list: &[String]) -> String {
    if commit_list.is_empty() {
        return "No commits collected.".to_owned();
    }
    commit_list
        .iter()
        .take(MAX_SUMMARY_SUBJECTS)
        .map(|line| format!("- {}", SHA_PREFIX.replace(line, "")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_issues_table_html(issues: &[IssueDetail]) -> String {
    issues
        .iter()
        .map(|issue| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&issue.key),
                escape_html(&issue.summary),
                escape_html(&issue.status),
                escape_html(issue.assignee.as_deref().unwrap_or("")),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffSettings;
    use crate::error::CoreError;
    use crate::ports::{
        PageContent, PageSummary, ProjectMeta, SavedFilter, TransitionOutcome,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct FakeWiki {
        pages: Mutex<Vec<PageContent>>,
    }

    impl FakeWiki {
        fn new() -> Self {
            Self {
                pages: Mutex::new(Vec::new()),
            }
        }

        fn with_page(title: &str) -> Self {
            let wiki = Self::new();
            wiki.pages.lock().expect("fake lock").push(PageContent {
                id: "existing".to_owned(),
                title: title.to_owned(),
                body: "<p>old</p>".to_owned(),
                version: 1,
                url: "https://wiki/existing".to_owned(),
            });
            wiki
        }

        fn page_count(&self) -> usize {
            self.pages.lock().expect("fake lock").len()
        }
    }

    #[async_trait]
    impl WikiClient for FakeWiki {
        async fn find_page(
            &self,
            _space_key: &str,
            title: &str,
        ) -> Result<Option<PageSummary>, CoreError> {
            Ok(self
                .pages
                .lock()
                .expect("fake lock")
                .iter()
                .find(|p| p.title == title)
                .map(|p| PageSummary {
                    id: p.id.clone(),
                    title: p.title.clone(),
                    url: p.url.clone(),
                }))
        }

        async fn get_page(&self, page_id: &str) -> Result<PageContent, CoreError> {
            self.pages
                .lock()
                .expect("fake lock")
                .iter()
                .find(|p| p.id == page_id)
                .cloned()
                .ok_or(CoreError::PageConflict {
                    page_id: page_id.to_owned(),
                })
        }

        async fn create_page(
            &self,
            _space_key: &str,
            _parent_page_id: &str,
            title: &str,
            body: &str,
        ) -> Result<PageSummary, CoreError> {
            let mut pages = self.pages.lock().expect("fake lock");
            if pages.iter().any(|p| p.title == title) {
                return Err(CoreError::DuplicatePage {
                    title: title.to_owned(),
                });
            }
            let page = PageContent {
                id: format!("p{}", pages.len() + 1),
                title: title.to_owned(),
                body: body.to_owned(),
                version: 1,
                url: format!("https://wiki/p{}", pages.len() + 1),
            };
            let summary = PageSummary {
                id: page.id.clone(),
                title: page.title.clone(),
                url: page.url.clone(),
            };
            pages.push(page);
            Ok(summary)
        }

        async fn update_page(
            &self,
            page_id: &str,
            _title: &str,
            body: &str,
            expected_version: u64,
        ) -> Result<PageSummary, CoreError> {
            let mut pages = self.pages.lock().expect("fake lock");
            let page = pages
                .iter_mut()
                .find(|p| p.id == page_id && p.version == expected_version)
                .ok_or(CoreError::PageConflict {
                    page_id: page_id.to_owned(),
                })?;
            page.body = body.to_owned();
            page.version += 1;
            Ok(PageSummary {
                id: page.id.clone(),
                title: page.title.clone(),
                url: page.url.clone(),
            })
        }
    }

    struct FakeTracker;

    #[async_trait]
    impl IssueTracker for FakeTracker {
        async fn get_issue(&self, key: &str) -> Result<IssueDetail, CoreError> {
            if key == "PROJ-404" {
                return Err(CoreError::UpstreamUnavailable {
                    system: "tracker".to_owned(),
                    operation: "get_issue".to_owned(),
                    detail: "boom".to_owned(),
                });
            }
            Ok(IssueDetail {
                key: key.to_owned(),
                summary: format!("summary of {key}"),
                status: "진행중".to_owned(),
                assignee: Some("kim".to_owned()),
                priority: Some("High".to_owned()),
                resolution_date: None,
                description: Some("first line\nsecond line".to_owned()),
                url: format!("https://tracker/{key}"),
            })
        }

        async fn search_issues(
            &self,
            _query: &str,
            _limit: u32,
        ) -> Result<Vec<IssueDetail>, CoreError> {
            Ok(Vec::new())
        }

        async fn project_meta(&self, _project_key: &str) -> Result<ProjectMeta, CoreError> {
            Ok(ProjectMeta::default())
        }

        async fn transition_issue(
            &self,
            key: &str,
            target_status: &str,
        ) -> Result<TransitionOutcome, CoreError> {
            Ok(TransitionOutcome {
                key: key.to_owned(),
                from_status: "진행중".to_owned(),
                to_status: target_status.to_owned(),
            })
        }

        async fn complete_issue(
            &self,
            key: &str,
            _comment: Option<&str>,
        ) -> Result<TransitionOutcome, CoreError> {
            Ok(TransitionOutcome {
                key: key.to_owned(),
                from_status: "진행중".to_owned(),
                to_status: "완료".to_owned(),
            })
        }

        async fn create_filter(
            &self,
            name: &str,
            _query: &str,
            _description: Option<&str>,
        ) -> Result<SavedFilter, CoreError> {
            Ok(SavedFilter {
                id: "f1".to_owned(),
                name: name.to_owned(),
                url: "https://tracker/filter/f1".to_owned(),
            })
        }
    }

    fn orchestrator(wiki: Arc<FakeWiki>) -> WikiGenerationOrchestrator {
        let mut settings = Settings::default();
        settings.wiki.space_key = "ENG".to_owned();
        settings.wiki.root_page_id = "1000".to_owned();

        WikiGenerationOrchestrator::builder()
            .analyzer(BranchAnalyzer::new(
                BTreeMap::new(),
                &DiffSettings::default(),
            ))
            .engine(Arc::new(
                TemplateEngine::new(None).expect("engine should build"),
            ))
            .sessions(Arc::new(SessionStore::new(&settings.session)))
            .wiki(wiki)
            .tracker(Some(Arc::new(FakeTracker)))
            .settings(settings)
            .build()
    }

    fn issue_request() -> IssueSummaryRequest {
        IssueSummaryRequest::builder()
            .issue_key("PROJ-42")
            .issue_title("fix login")
            .commit_list(vec!["abc1234 fix login redirect".to_owned()])
            .build()
    }

    #[tokio::test]
    async fn test_should_render_preview_without_touching_wiki() {
        let wiki = Arc::new(FakeWiki::new());
        let orch = orchestrator(wiki.clone());

        let receipt = orch
            .start_issue_summary(issue_request())
            .await
            .expect("preview should render");

        assert_eq!(receipt.page_title, "[PROJ-42] fix login");
        assert!(receipt.preview.contains("PROJ-42"));
        assert!(receipt.preview.contains("fix login redirect"));
        // Tracker enrichment filled the status row.
        assert!(receipt.preview.contains("진행중"));
        assert_eq!(wiki.page_count(), 0);
    }

    #[tokio::test]
    async fn test_should_publish_on_approval() {
        let wiki = Arc::new(FakeWiki::new());
        let orch = orchestrator(wiki.clone());

        let receipt = orch
            .start_issue_summary(issue_request())
            .await
            .expect("preview should render");
        let approval = orch
            .approve(&receipt.session_id, &receipt.approval_token)
            .await
            .expect("approval should publish");

        assert!(matches!(approval.outcome, UpsertOutcome::Created { .. }));
        assert_eq!(wiki.page_count(), 1);
        let status = orch.get_status(&receipt.session_id).expect("status");
        assert_eq!(status.status, SessionStatus::Done);
        assert!(status.approval_token.is_none());
    }

    #[tokio::test]
    async fn test_should_escape_markup_in_scalar_context_values() {
        let orch = orchestrator(Arc::new(FakeWiki::new()));
        let request = IssueSummaryRequest::builder()
            .issue_key("PROJ-42")
            .issue_title("<script>alert(1)</script> & fish")
            .commit_list(vec!["abc1234 tidy".to_owned()])
            .build();

        let receipt = orch
            .start_issue_summary(request)
            .await
            .expect("preview should render");

        assert!(!receipt.preview.contains("<script>"));
        assert!(
            receipt
                .preview
                .contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; fish")
        );
    }

    #[tokio::test]
    async fn test_should_render_identical_previews_in_distinct_sessions() {
        let orch = orchestrator(Arc::new(FakeWiki::new()));

        let first = orch
            .start_issue_summary(issue_request())
            .await
            .expect("first preview should render");
        let second = orch
            .start_issue_summary(issue_request())
            .await
            .expect("second preview should render");

        assert_eq!(first.preview, second.preview);
        assert_ne!(first.session_id, second.session_id);
        assert_ne!(first.approval_token, second.approval_token);
    }

    #[tokio::test]
    async fn test_should_reject_second_approval() {
        let wiki = Arc::new(FakeWiki::new());
        let orch = orchestrator(wiki.clone());

        let receipt = orch
            .start_issue_summary(issue_request())
            .await
            .expect("preview should render");
        orch.approve(&receipt.session_id, &receipt.approval_token)
            .await
            .expect("first approval should publish");

        let replay = orch
            .approve(&receipt.session_id, &receipt.approval_token)
            .await;
        assert!(matches!(replay, Err(CoreError::AlreadyFinalized { .. })));
        assert_eq!(wiki.page_count(), 1);
    }

    #[tokio::test]
    async fn test_should_append_on_reapproval_of_same_issue() {
        let wiki = Arc::new(FakeWiki::with_page("[PROJ-42] fix login"));
        let orch = orchestrator(wiki.clone());

        let receipt = orch
            .start_issue_summary(issue_request())
            .await
            .expect("preview should render");
        let approval = orch
            .approve(&receipt.session_id, &receipt.approval_token)
            .await
            .expect("approval should append");

        assert!(matches!(approval.outcome, UpsertOutcome::Appended { .. }));
        assert_eq!(wiki.page_count(), 1);
    }

    #[tokio::test]
    async fn test_should_fail_custom_page_on_occupied_title() {
        let wiki = Arc::new(FakeWiki::with_page("Release Notes"));
        let orch = orchestrator(wiki.clone());

        let receipt = orch
            .start_custom_page(
                CustomPageRequest::builder()
                    .page_title("Release Notes")
                    .content("hello")
                    .parent_page_id("1000")
                    .build(),
            )
            .await
            .expect("preview should render");
        let result = orch
            .approve(&receipt.session_id, &receipt.approval_token)
            .await;

        assert!(matches!(result, Err(CoreError::DuplicatePage { .. })));
        let status = orch.get_status(&receipt.session_id).expect("status");
        assert_eq!(status.status, SessionStatus::Failed);
        assert!(status.failure_detail.is_some());
    }

    #[tokio::test]
    async fn test_should_require_parent_for_custom_page() {
        let orch = orchestrator(Arc::new(FakeWiki::new()));
        let result = orch
            .start_custom_page(
                CustomPageRequest::builder()
                    .page_title("Orphan")
                    .content("hello")
                    .build(),
            )
            .await;
        assert!(matches!(result, Err(CoreError::ConfigurationInvalid(_))));
    }

    #[tokio::test]
    async fn test_should_resolve_parent_by_title() {
        let wiki = Arc::new(FakeWiki::with_page("Team Space Home"));
        let orch = orchestrator(wiki.clone());

        let receipt = orch
            .start_custom_page(
                CustomPageRequest::builder()
                    .page_title("Meeting Notes")
                    .content("- agreed on rollout\n- next sync friday")
                    .parent_page_title("Team Space Home")
                    .build(),
            )
            .await
            .expect("preview should render");
        assert!(receipt.preview.contains("<li>agreed on rollout</li>"));
    }

    #[tokio::test]
    async fn test_should_skip_failing_issue_enrichment() {
        let orch = orchestrator(Arc::new(FakeWiki::new()));
        let receipt = orch
            .start_branch_content(
                BranchContentRequest::builder()
                    .page_title("Weekly changes")
                    .input_value("release/2026-08")
                    .commit_list(vec![
                        "abc1234 PROJ-404 broken enrichment".to_owned(),
                        "def5678 PROJ-7 working enrichment".to_owned(),
                    ])
                    .build(),
            )
            .await
            .expect("preview should render despite enrichment failure");

        assert!(receipt.preview.contains("summary of PROJ-7"));
        assert!(!receipt.preview.contains("summary of PROJ-404"));
    }

    #[tokio::test]
    async fn test_should_build_auto_summary_from_commit_subjects() {
        let list: Vec<String> = (0..8)
            .map(|i| format!("abc000{i} subject {i}"))
            .collect();
        let summary = auto_summarize(&list);
        assert!(summary.starts_with("- subject 0"));
        assert_eq!(summary.lines().count(), 5);
        assert!(!summary.contains("abc000"));
    }

    #[test]
    fn test_should_cap_commit_list_html() {
        let list: Vec<String> = (0..150).map(|i| format!("commit {i}")).collect();
        let html = build_commit_list_html(&list);
        assert_eq!(html.matches("<li>").count(), MAX_COMMIT_LIST_ENTRIES + 1);
        assert!(html.contains("and 50 more commits"));
    }

    #[test]
    fn test_should_escape_commit_subjects() {
        let html = build_commit_list_html(&["fix <script> injection".to_owned()]);
        assert!(html.contains("&lt;script&gt;"));
    }
}
