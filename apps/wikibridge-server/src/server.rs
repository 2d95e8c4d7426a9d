//! Stdio request loop.
//!
//! One JSON request per stdin line, one JSON response per stdout line.
//! Errors never kill the loop: malformed input and handler failures are
//! answered with `ok: false` and the loop reads on. A background task
//! sweeps expired sessions.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use crate::tools::{self, AppContext};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Option<Value>,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    ok: bool,
    content: String,
}

/// Serve requests until stdin closes.
///
/// # Errors
///
/// Returns an error only for stdin/stdout I/O failures.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let sweeper = tokio::spawn(sweep_loop(ctx.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("serving tool requests on stdio");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&ctx, &line).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    sweeper.abort();
    Ok(())
}

async fn handle_line(ctx: &AppContext, line: &str) -> ToolResponse {
    let request: ToolRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed request line");
            return ToolResponse {
                id: None,
                ok: false,
                content: format!("malformed request: {e}"),
            };
        }
    };

    match tools::dispatch(ctx, &request.tool, request.arguments).await {
        Ok(content) => ToolResponse {
            id: request.id,
            ok: true,
            content,
        },
        Err(e) => {
            error!(tool = request.tool.as_str(), error = %e, "tool call failed");
            ToolResponse {
                id: request.id,
                ok: false,
                content: e.to_string(),
            }
        }
    }
}

async fn sweep_loop(ctx: Arc<AppContext>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let expired = ctx.orchestrator.sweep_expired_sessions();
        if !expired.is_empty() {
            info!(count = expired.len(), "expired pending sessions");
        }
    }
}
