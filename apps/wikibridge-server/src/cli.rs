use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use wikibridge_core::{
    BranchAnalyzer, IssueKeyMatcher, IssueTracker, SessionStore, Settings, StatusSynonyms,
    WikiGenerationOrchestrator, load_settings,
};
use wikibridge_tpl::TemplateEngine;

use crate::adapters::{HttpIssueTracker, HttpWikiClient};
use crate::server;
use crate::tools::AppContext;

#[derive(Debug, Parser)]
#[command(
    name = "wikibridge",
    about = "Approval-gated wiki page generation from local git evidence"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve tool requests over stdio (one JSON request per line)
    Serve {
        /// Path to the configuration file
        #[arg(short, long, default_value = "wikibridge.yaml")]
        config: PathBuf,

        /// Directory for JSON log files (stderr-only when omitted)
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Load configuration and templates, report what would be served
    Check {
        /// Path to the configuration file
        #[arg(short, long, default_value = "wikibridge.yaml")]
        config: PathBuf,
    },
}

impl Cli {
    pub fn log_dir(&self) -> Option<PathBuf> {
        match &self.command {
            Commands::Serve { log_dir, .. } => log_dir.clone(),
            Commands::Check { .. } => None,
        }
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Serve { config, .. } => {
                let settings = load_settings(&config)
                    .with_context(|| format!("failed to load {}", config.display()))?;
                let ctx = build_context(settings)?;
                server::serve(Arc::new(ctx)).await
            }
            Commands::Check { config } => {
                let settings = load_settings(&config)
                    .with_context(|| format!("failed to load {}", config.display()))?;
                let engine = TemplateEngine::new(settings.template_path.clone())?;

                println!("configuration: ok ({})", config.display());
                println!("repositories: {}", settings.repositories.len());
                println!("workflows: {}", engine.workflow_names().join(", "));
                Ok(())
            }
        }
    }
}

/// Wire the engine, the session store, the adapters, and the
/// orchestrator from loaded settings.
fn build_context(settings: Settings) -> Result<AppContext> {
    let engine = Arc::new(TemplateEngine::new(settings.template_path.clone())?);
    let sessions = Arc::new(SessionStore::new(&settings.session));
    let analyzer = BranchAnalyzer::new(settings.repositories.clone(), &settings.diff);

    let wiki = Arc::new(HttpWikiClient::new(&settings.wiki)?);
    let synonyms = StatusSynonyms::new(settings.status_synonyms.clone());
    let completion_statuses = synonyms.normalize(&["done".to_owned()]);

    let tracker: Option<Arc<dyn IssueTracker>> = if settings.tracker.base_url.is_empty() {
        None
    } else {
        Some(Arc::new(HttpIssueTracker::new(
            &settings.tracker,
            completion_statuses,
        )?))
    };

    let orchestrator = WikiGenerationOrchestrator::builder()
        .analyzer(BranchAnalyzer::new(
            settings.repositories.clone(),
            &settings.diff,
        ))
        .engine(engine.clone())
        .sessions(sessions)
        .wiki(wiki)
        .tracker(tracker)
        .key_matcher(IssueKeyMatcher::new(&settings.issue_key_pattern)?)
        .settings(settings)
        .build();

    Ok(AppContext {
        orchestrator,
        analyzer,
        engine,
    })
}
