//! HTTP adapters for the wiki and the issue tracker.
//!
//! Implements the core port traits against Confluence-style and
//! Jira-style REST APIs with basic auth. Passwords come from the
//! environment (`WIKIBRIDGE_WIKI_PASSWORD`, `WIKIBRIDGE_TRACKER_PASSWORD`)
//! so they never appear in the config file.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use wikibridge_core::{
    CoreError, IssueDetail, IssueTracker, PageContent, PageSummary, ProjectMeta, SavedFilter,
    TrackerSettings, TransitionOutcome, WikiClient, WikiSettings,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const WIKI_PASSWORD_ENV: &str = "WIKIBRIDGE_WIKI_PASSWORD";
pub const TRACKER_PASSWORD_ENV: &str = "WIKIBRIDGE_TRACKER_PASSWORD";

fn build_http_client() -> Result<reqwest::Client, CoreError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| CoreError::Other(anyhow::anyhow!("failed to build http client: {e}")))
}

/// Map a non-success response to the error taxonomy. Conflicts are
/// handled by the callers that can retry them.
fn map_status(system: &str, operation: &str, status: StatusCode, detail: &str) -> CoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CoreError::UpstreamAuthFailed {
            system: system.to_owned(),
            operation: operation.to_owned(),
            detail: format!("{status}: {detail}"),
        },
        _ => CoreError::UpstreamUnavailable {
            system: system.to_owned(),
            operation: operation.to_owned(),
            detail: format!("{status}: {detail}"),
        },
    }
}

fn map_transport(system: &str, operation: &str, error: reqwest::Error) -> CoreError {
    CoreError::UpstreamUnavailable {
        system: system.to_owned(),
        operation: operation.to_owned(),
        detail: error.to_string(),
    }
}

// ── Wiki ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WikiSearchResponse {
    results: Vec<WikiPageEnvelope>,
}

#[derive(Debug, Deserialize)]
struct WikiPageEnvelope {
    id: String,
    title: String,
    #[serde(default)]
    body: Option<WikiBody>,
    #[serde(default)]
    version: Option<WikiVersion>,
}

#[derive(Debug, Deserialize)]
struct WikiBody {
    storage: WikiStorage,
}

#[derive(Debug, Deserialize)]
struct WikiStorage {
    value: String,
}

#[derive(Debug, Deserialize)]
struct WikiVersion {
    number: u64,
}

/// [`WikiClient`] over a Confluence-style content REST API.
pub struct HttpWikiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: Option<String>,
}

impl HttpWikiClient {
    /// # Errors
    ///
    /// Returns `CoreError::Other` when the HTTP client cannot be built.
    pub fn new(settings: &WikiSettings) -> Result<Self, CoreError> {
        Ok(Self {
            http: build_http_client()?,
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            username: settings.username.clone(),
            password: std::env::var(WIKI_PASSWORD_ENV).ok(),
        })
    }

    fn require_configured(&self, operation: &str) -> Result<(), CoreError> {
        if self.base_url.is_empty() {
            return Err(CoreError::ConfigurationMissing(format!(
                "wiki.baseUrl is not configured (needed for {operation})"
            )));
        }
        Ok(())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.username, self.password.as_deref())
    }

    fn page_url(&self, id: &str) -> String {
        format!("{}/pages/{id}", self.base_url)
    }
}

#[async_trait]
impl WikiClient for HttpWikiClient {
    #[instrument(skip(self))]
    async fn find_page(
        &self,
        space_key: &str,
        title: &str,
    ) -> Result<Option<PageSummary>, CoreError> {
        self.require_configured("find_page")?;
        let response = self
            .request(reqwest::Method::GET, "/rest/api/content")
            .query(&[("spaceKey", space_key), ("title", title)])
            .send()
            .await
            .map_err(|e| map_transport("wiki", "find_page", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status("wiki", "find_page", status, &detail));
        }
        let found: WikiSearchResponse = response
            .json()
            .await
            .map_err(|e| map_transport("wiki", "find_page", e))?;

        Ok(found.results.into_iter().next().map(|page| PageSummary {
            url: self.page_url(&page.id),
            id: page.id,
            title: page.title,
        }))
    }

    #[instrument(skip(self))]
    async fn get_page(&self, page_id: &str) -> Result<PageContent, CoreError> {
        self.require_configured("get_page")?;
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/rest/api/content/{page_id}"),
            )
            .query(&[("expand", "body.storage,version")])
            .send()
            .await
            .map_err(|e| map_transport("wiki", "get_page", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status("wiki", "get_page", status, &detail));
        }
        let page: WikiPageEnvelope = response
            .json()
            .await
            .map_err(|e| map_transport("wiki", "get_page", e))?;

        Ok(PageContent {
            url: self.page_url(&page.id),
            body: page.body.map(|b| b.storage.value).unwrap_or_default(),
            version: page.version.map(|v| v.number).unwrap_or(1),
            id: page.id,
            title: page.title,
        })
    }

    #[instrument(skip(self, body))]
    async fn create_page(
        &self,
        space_key: &str,
        parent_page_id: &str,
        title: &str,
        body: &str,
    ) -> Result<PageSummary, CoreError> {
        self.require_configured("create_page")?;
        let payload = json!({
            "type": "page",
            "title": title,
            "space": { "key": space_key },
            "ancestors": [{ "id": parent_page_id }],
            "body": { "storage": { "value": body, "representation": "storage" } },
        });
        let response = self
            .request(reqwest::Method::POST, "/rest/api/content")
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport("wiki", "create_page", e))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(CoreError::DuplicatePage {
                title: title.to_owned(),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status("wiki", "create_page", status, &detail));
        }
        let page: WikiPageEnvelope = response
            .json()
            .await
            .map_err(|e| map_transport("wiki", "create_page", e))?;
        debug!(page_id = page.id.as_str(), "page created");

        Ok(PageSummary {
            url: self.page_url(&page.id),
            id: page.id,
            title: page.title,
        })
    }

    #[instrument(skip(self, body))]
    async fn update_page(
        &self,
        page_id: &str,
        title: &str,
        body: &str,
        expected_version: u64,
    ) -> Result<PageSummary, CoreError> {
        self.require_configured("update_page")?;
        let payload = json!({
            "type": "page",
            "title": title,
            "version": { "number": expected_version + 1 },
            "body": { "storage": { "value": body, "representation": "storage" } },
        });
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/rest/api/content/{page_id}"),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport("wiki", "update_page", e))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(CoreError::PageConflict {
                page_id: page_id.to_owned(),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status("wiki", "update_page", status, &detail));
        }
        let page: WikiPageEnvelope = response
            .json()
            .await
            .map_err(|e| map_transport("wiki", "update_page", e))?;

        Ok(PageSummary {
            url: self.page_url(&page.id),
            id: page.id,
            title: page.title,
        })
    }
}

// ── Tracker ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TrackerIssueEnvelope {
    key: String,
    fields: TrackerFields,
}

#[derive(Debug, Default, Deserialize)]
struct TrackerFields {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    status: Option<TrackerNamed>,
    #[serde(default)]
    assignee: Option<TrackerUser>,
    #[serde(default)]
    priority: Option<TrackerNamed>,
    #[serde(default, rename = "resolutiondate")]
    resolution_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackerNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackerUser {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct TrackerSearchResponse {
    issues: Vec<TrackerIssueEnvelope>,
}

#[derive(Debug, Deserialize)]
struct TrackerProject {
    key: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackerIssueTypeStatuses {
    name: String,
    statuses: Vec<TrackerNamed>,
}

#[derive(Debug, Deserialize)]
struct TrackerTransitionsResponse {
    transitions: Vec<TrackerTransition>,
}

#[derive(Debug, Deserialize)]
struct TrackerTransition {
    id: String,
    to: TrackerNamed,
}

#[derive(Debug, Deserialize)]
struct TrackerFilter {
    id: String,
    name: String,
    #[serde(rename = "viewUrl", default)]
    view_url: Option<String>,
}

/// [`IssueTracker`] over a Jira-style REST API.
pub struct HttpIssueTracker {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: Option<String>,
    /// Localized statuses that count as "complete", from the configured
    /// synonym table.
    completion_statuses: Vec<String>,
}

impl HttpIssueTracker {
    /// # Errors
    ///
    /// Returns `CoreError::Other` when the HTTP client cannot be built.
    pub fn new(
        settings: &TrackerSettings,
        completion_statuses: Vec<String>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            http: build_http_client()?,
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            username: settings.username.clone(),
            password: std::env::var(TRACKER_PASSWORD_ENV).ok(),
            completion_statuses,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.username, self.password.as_deref())
    }

    fn issue_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, CoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| map_transport("tracker", operation, e))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status("tracker", operation, status, &detail));
        }
        response
            .json()
            .await
            .map_err(|e| map_transport("tracker", operation, e))
    }

    fn to_detail(&self, issue: TrackerIssueEnvelope) -> IssueDetail {
        IssueDetail {
            url: self.issue_url(&issue.key),
            key: issue.key,
            summary: issue.fields.summary,
            status: issue.fields.status.map(|s| s.name).unwrap_or_default(),
            assignee: issue.fields.assignee.map(|a| a.display_name),
            priority: issue.fields.priority.map(|p| p.name),
            resolution_date: issue.fields.resolution_date,
            description: issue.fields.description,
        }
    }

    async fn run_transition(
        &self,
        key: &str,
        from_status: String,
        targets: &[String],
    ) -> Result<TransitionOutcome, CoreError> {
        let transitions: TrackerTransitionsResponse = self
            .fetch_json(
                "transition_issue",
                self.request(
                    reqwest::Method::GET,
                    &format!("/rest/api/2/issue/{key}/transitions"),
                ),
            )
            .await?;

        let transition = transitions
            .transitions
            .iter()
            .find(|t| targets.iter().any(|target| t.to.name == *target))
            .ok_or_else(|| {
                CoreError::Other(anyhow::anyhow!(
                    "issue {key} has no transition to any of {targets:?}"
                ))
            })?;

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/rest/api/2/issue/{key}/transitions"),
            )
            .json(&json!({ "transition": { "id": transition.id } }))
            .send()
            .await
            .map_err(|e| map_transport("tracker", "transition_issue", e))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status("tracker", "transition_issue", status, &detail));
        }

        Ok(TransitionOutcome {
            key: key.to_owned(),
            from_status,
            to_status: transition.to.name.clone(),
        })
    }
}

#[async_trait]
impl IssueTracker for HttpIssueTracker {
    #[instrument(skip(self))]
    async fn get_issue(&self, key: &str) -> Result<IssueDetail, CoreError> {
        let issue: TrackerIssueEnvelope = self
            .fetch_json(
                "get_issue",
                self.request(reqwest::Method::GET, &format!("/rest/api/2/issue/{key}")),
            )
            .await?;
        Ok(self.to_detail(issue))
    }

    #[instrument(skip(self))]
    async fn search_issues(&self, query: &str, limit: u32) -> Result<Vec<IssueDetail>, CoreError> {
        let found: TrackerSearchResponse = self
            .fetch_json(
                "search_issues",
                self.request(reqwest::Method::POST, "/rest/api/2/search")
                    .json(&json!({ "jql": query, "maxResults": limit })),
            )
            .await?;
        Ok(found
            .issues
            .into_iter()
            .map(|issue| self.to_detail(issue))
            .collect())
    }

    #[instrument(skip(self))]
    async fn project_meta(&self, project_key: &str) -> Result<ProjectMeta, CoreError> {
        let project: TrackerProject = self
            .fetch_json(
                "project_meta",
                self.request(
                    reqwest::Method::GET,
                    &format!("/rest/api/2/project/{project_key}"),
                ),
            )
            .await?;
        let per_type: Vec<TrackerIssueTypeStatuses> = self
            .fetch_json(
                "project_meta",
                self.request(
                    reqwest::Method::GET,
                    &format!("/rest/api/2/project/{project_key}/statuses"),
                ),
            )
            .await?;

        let mut statuses: Vec<String> = Vec::new();
        let mut issue_types: Vec<String> = Vec::new();
        for issue_type in per_type {
            issue_types.push(issue_type.name);
            for status in issue_type.statuses {
                if !statuses.contains(&status.name) {
                    statuses.push(status.name);
                }
            }
        }
        Ok(ProjectMeta {
            key: project.key,
            name: project.name,
            statuses,
            issue_types,
        })
    }

    #[instrument(skip(self))]
    async fn transition_issue(
        &self,
        key: &str,
        target_status: &str,
    ) -> Result<TransitionOutcome, CoreError> {
        let current = self.get_issue(key).await?;
        self.run_transition(key, current.status, &[target_status.to_owned()])
            .await
    }

    #[instrument(skip(self))]
    async fn complete_issue(
        &self,
        key: &str,
        comment: Option<&str>,
    ) -> Result<TransitionOutcome, CoreError> {
        if let Some(comment) = comment {
            let response = self
                .request(
                    reqwest::Method::POST,
                    &format!("/rest/api/2/issue/{key}/comment"),
                )
                .json(&json!({ "body": comment }))
                .send()
                .await
                .map_err(|e| map_transport("tracker", "complete_issue", e))?;
            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(map_status("tracker", "complete_issue", status, &detail));
            }
        }

        let current = self.get_issue(key).await?;
        self.run_transition(key, current.status, &self.completion_statuses)
            .await
    }

    #[instrument(skip(self))]
    async fn create_filter(
        &self,
        name: &str,
        query: &str,
        description: Option<&str>,
    ) -> Result<SavedFilter, CoreError> {
        let filter: TrackerFilter = self
            .fetch_json(
                "create_filter",
                self.request(reqwest::Method::POST, "/rest/api/2/filter").json(&json!({
                    "name": name,
                    "jql": query,
                    "description": description.unwrap_or_default(),
                })),
            )
            .await?;
        Ok(SavedFilter {
            url: filter
                .view_url
                .unwrap_or_else(|| format!("{}/issues/?filter={}", self.base_url, filter.id)),
            id: filter.id,
            name: filter.name,
        })
    }
}
