//! Tool dispatch.
//!
//! Eight operations addressed by name with JSON arguments. Every handler
//! returns Markdown meant to be relayed verbatim to the person driving
//! the conversation; generation handlers attach the approval instructions
//! and an explicit warning against auto-approving.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};
use wikibridge_core::{
    BranchAnalyzer, BranchContentRequest, CoreError, CustomPageRequest, GenerationReceipt,
    IssueSummaryRequest, PrioritizedDiff, UpsertOutcome, WikiGenerationOrchestrator,
};
use wikibridge_tpl::TemplateEngine;

/// Appended to every generation response.
const PREVIEW_WARNING: &str = "**Do not approve automatically.** Show this preview to the user \
and call `approve_wiki_generation` only after they confirm.";

/// Everything the dispatch needs, shared across requests.
pub struct AppContext {
    pub orchestrator: WikiGenerationOrchestrator,
    pub analyzer: BranchAnalyzer,
    pub engine: Arc<TemplateEngine>,
}

#[derive(Debug, Deserialize)]
struct CollectBranchCommitsArgs {
    branch_name: String,
    #[serde(default)]
    repository_path: Option<PathBuf>,
    #[serde(default)]
    include_diff: bool,
}

#[derive(Debug, Deserialize)]
struct AnalyzeBranchChangesArgs {
    branch_name: String,
    #[serde(default)]
    repository_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CreateIssuePageArgs {
    issue_key: String,
    issue_title: String,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    resolution_date: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    commit_list: Option<Vec<String>>,
    #[serde(default)]
    change_summary: Option<String>,
    #[serde(default)]
    project_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateContentPageArgs {
    page_title: String,
    commit_list: Vec<String>,
    #[serde(default)]
    input_value: Option<String>,
    #[serde(default)]
    base_date: Option<String>,
    #[serde(default)]
    change_summary: Option<String>,
    #[serde(default)]
    issue_keys: Option<Vec<String>>,
    #[serde(default)]
    diff_stat: Option<String>,
    #[serde(default)]
    project_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateCustomPageArgs {
    page_title: String,
    content: String,
    #[serde(default)]
    parent_page_id: Option<String>,
    #[serde(default)]
    parent_page_title: Option<String>,
    #[serde(default)]
    space_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApproveArgs {
    session_id: String,
    approval_token: String,
}

#[derive(Debug, Deserialize)]
struct StatusArgs {
    session_id: String,
}

/// Dispatch one tool call. Arguments are logged with secret-looking
/// values masked.
///
/// # Errors
///
/// Propagates handler errors; unknown tool names and malformed arguments
/// are reported as `CoreError::Other`.
#[instrument(skip(ctx, arguments))]
pub async fn dispatch(ctx: &AppContext, tool: &str, arguments: Value) -> Result<String, CoreError> {
    info!(tool, arguments = %mask_arguments(&arguments), "tool call");

    match tool {
        "collect_branch_commits" => collect_branch_commits(ctx, parse(tool, arguments)?).await,
        "analyze_branch_changes" => analyze_branch_changes(ctx, parse(tool, arguments)?).await,
        "create_wiki_issue_page" => create_wiki_issue_page(ctx, parse(tool, arguments)?).await,
        "create_wiki_page_with_content" => {
            create_wiki_page_with_content(ctx, parse(tool, arguments)?).await
        }
        "create_wiki_custom_page" => create_wiki_custom_page(ctx, parse(tool, arguments)?).await,
        "approve_wiki_generation" => approve_wiki_generation(ctx, parse(tool, arguments)?).await,
        "get_wiki_generation_status" => get_wiki_generation_status(ctx, parse(tool, arguments)?),
        "reload_wiki_templates" => reload_wiki_templates(ctx),
        _ => Err(CoreError::Other(anyhow::anyhow!("unknown tool: {tool}"))),
    }
}

fn parse<T: serde::de::DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, CoreError> {
    serde_json::from_value(arguments)
        .map_err(|e| CoreError::Other(anyhow::anyhow!("invalid arguments for {tool}: {e}")))
}

/// Replace values of secret-looking keys before they reach the logs.
fn mask_arguments(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let lowered = key.to_lowercase();
                    if lowered.contains("token")
                        || lowered.contains("password")
                        || lowered.contains("secret")
                    {
                        (key.clone(), Value::String("***".to_owned()))
                    } else {
                        (key.clone(), mask_arguments(inner))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_arguments).collect()),
        other => other.clone(),
    }
}

async fn collect_branch_commits(
    ctx: &AppContext,
    args: CollectBranchCommitsArgs,
) -> Result<String, CoreError> {
    let report = ctx
        .analyzer
        .collect_commits(
            &args.branch_name,
            args.repository_path.as_deref(),
            args.include_diff,
        )
        .await?;

    let mut out = format!(
        "## Commits on `{}`\n\nRepository: **{}** (base: `{}`)\n\n",
        args.branch_name, report.repository.name, report.range.base_branch_name,
    );
    if report.range.commits.is_empty() {
        out.push_str("No commits unique to this branch.\n");
    }
    for commit in &report.range.commits {
        let short = commit.sha.get(..7).unwrap_or(&commit.sha);
        let _ = writeln!(
            out,
            "- `{short}` {} ({}, {})",
            commit.subject,
            commit.author,
            commit.timestamp.format("%Y-%m-%d"),
        );
    }
    let stats = &report.range.stats;
    let _ = write!(
        out,
        "\n{} commits, {} files changed, +{} -{}\n",
        report.range.commits.len(),
        stats.files_changed,
        stats.insertions,
        stats.deletions,
    );
    if let Some(diff) = &report.diff {
        out.push('\n');
        out.push_str(&describe_diff(diff));
    }
    Ok(out)
}

async fn analyze_branch_changes(
    ctx: &AppContext,
    args: AnalyzeBranchChangesArgs,
) -> Result<String, CoreError> {
    let report = ctx
        .analyzer
        .analyze_changes(&args.branch_name, args.repository_path.as_deref())
        .await?;

    let mut out = format!(
        "## Changes on `{}`\n\nRepository: **{}** (base: `{}`), {} commits\n\n### Changed files\n```\n{}\n```\n\n",
        args.branch_name,
        report.repository.name,
        report.range.base_branch_name,
        report.range.commits.len(),
        report.diff_stat,
    );
    out.push_str(&describe_diff(&report.diff));
    if !report.diff.included_files.is_empty() {
        let _ = write!(
            out,
            "\n### Diff ({} of {} chars)\n```diff\n{}\n```\n",
            report.diff.total_chars,
            report.diff.original_chars,
            report.diff.assembled_text(),
        );
    }
    Ok(out)
}

fn describe_diff(diff: &PrioritizedDiff) -> String {
    let mut out = format!(
        "### Diff selection\n\n{} files included ({} of {} budget chars), {} excluded\n",
        diff.included_files.len(),
        diff.total_chars,
        diff.budget_chars,
        diff.excluded_files.len(),
    );
    for excluded in &diff.excluded_files {
        let _ = writeln!(out, "- excluded `{}`: {}", excluded.path, excluded.reason);
    }
    out
}

async fn create_wiki_issue_page(
    ctx: &AppContext,
    args: CreateIssuePageArgs,
) -> Result<String, CoreError> {
    let request = IssueSummaryRequest::builder()
        .issue_key(args.issue_key)
        .issue_title(args.issue_title)
        .assignee_opt(args.assignee)
        .resolution_date_opt(args.resolution_date)
        .priority_opt(args.priority)
        .commit_list_opt(args.commit_list)
        .change_summary_opt(args.change_summary)
        .project_name_opt(args.project_name)
        .build();

    let receipt = ctx.orchestrator.start_issue_summary(request).await?;
    Ok(describe_receipt(&receipt))
}

async fn create_wiki_page_with_content(
    ctx: &AppContext,
    args: CreateContentPageArgs,
) -> Result<String, CoreError> {
    let input_value = args.input_value.unwrap_or_else(|| args.page_title.clone());
    let request = BranchContentRequest::builder()
        .page_title(args.page_title)
        .input_value(input_value)
        .commit_list(args.commit_list)
        .base_date_opt(args.base_date)
        .change_summary_opt(args.change_summary)
        .issue_keys_opt(args.issue_keys)
        .diff_stat_opt(args.diff_stat)
        .project_name_opt(args.project_name)
        .build();

    let receipt = ctx.orchestrator.start_branch_content(request).await?;
    Ok(describe_receipt(&receipt))
}

async fn create_wiki_custom_page(
    ctx: &AppContext,
    args: CreateCustomPageArgs,
) -> Result<String, CoreError> {
    let request = CustomPageRequest::builder()
        .page_title(args.page_title)
        .content(args.content)
        .parent_page_id_opt(args.parent_page_id)
        .parent_page_title_opt(args.parent_page_title)
        .space_key_opt(args.space_key)
        .build();

    let receipt = ctx.orchestrator.start_custom_page(request).await?;
    Ok(describe_receipt(&receipt))
}

fn describe_receipt(receipt: &GenerationReceipt) -> String {
    format!(
        "## Preview: {}\n\n```html\n{}\n```\n\nSession `{}`, token `{}`, expires {}.\n\n{}",
        receipt.page_title,
        receipt.preview,
        receipt.session_id,
        receipt.approval_token,
        receipt.expires_at.format("%Y-%m-%d %H:%M UTC"),
        PREVIEW_WARNING,
    )
}

async fn approve_wiki_generation(ctx: &AppContext, args: ApproveArgs) -> Result<String, CoreError> {
    let approval = ctx
        .orchestrator
        .approve(&args.session_id, &args.approval_token)
        .await?;

    Ok(match &approval.outcome {
        UpsertOutcome::Created { page } => {
            format!("Page created: [{}]({})", page.title, page.url)
        }
        UpsertOutcome::Appended { page, attempts } => format!(
            "Content appended to existing page: [{}]({}) (attempt {attempts})",
            page.title, page.url,
        ),
    })
}

fn get_wiki_generation_status(ctx: &AppContext, args: StatusArgs) -> Result<String, CoreError> {
    let view = ctx.orchestrator.get_status(&args.session_id)?;
    let mut out = format!(
        "Session `{}` ({}): **{}**, page \"{}\", expires {}.\n",
        view.session_id,
        view.workflow,
        view.status,
        view.page_title,
        view.expires_at.format("%Y-%m-%d %H:%M UTC"),
    );
    if let Some(detail) = &view.failure_detail {
        let _ = writeln!(out, "Failure: {detail}");
    }
    Ok(out)
}

fn reload_wiki_templates(ctx: &AppContext) -> Result<String, CoreError> {
    let summary = ctx.engine.reload()?;
    Ok(format!(
        "Reloaded {} workflow templates: {}",
        summary.workflow_count,
        summary.workflow_names.join(", "),
    ))
}
