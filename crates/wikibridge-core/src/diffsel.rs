//! Diff prioritization and budgeting.
//!
//! Splits a raw unified diff into per-file hunks, drops noise files,
//! classifies the rest into priority tiers, and assembles a payload that
//! keeps the highest-value content under a character budget. Output is a
//! deterministic function of the diff, the budget, and the rule set.

use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

/// Substring patterns excluded from every diff regardless of budget:
/// dependency lockfiles, minified/bundled assets, generated API specs,
/// vendored code.
const DEFAULT_EXCLUDE_PATTERNS: [&str; 10] = [
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "go.sum",
    ".min.js",
    ".min.css",
    ".generated.",
    "openapi/",
    "vendor/",
];

/// Extensions treated as source code (high priority).
const SOURCE_EXTENSIONS: [&str; 22] = [
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "cc", "cpp", "h", "hpp", "cs",
    "rb", "php", "swift", "scala", "sql", "sh", "vue",
];

/// Extensions treated as configuration/style (medium priority).
const CONFIG_EXTENSIONS: [&str; 10] = [
    "json", "yaml", "yml", "toml", "ini", "css", "scss", "md", "svg", "conf",
];

/// Priority tier of an included file, high to low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

/// Why a file's hunk is absent from the assembled payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionReason {
    ExcludedByRule,
    BudgetExceeded,
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExcludedByRule => write!(f, "excluded-by-rule"),
            Self::BudgetExceeded => write!(f, "budget-exceeded"),
        }
    }
}

/// Noise patterns matched as substrings against the diff path.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    patterns: Vec<String>,
}

impl ExclusionRules {
    /// Built-in defaults plus configured extras.
    pub fn with_extra(extra: &[String]) -> Self {
        let mut patterns: Vec<String> =
            DEFAULT_EXCLUDE_PATTERNS.iter().map(|p| (*p).to_owned()).collect();
        patterns.extend(extra.iter().cloned());
        Self { patterns }
    }

    fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self::with_extra(&[])
    }
}

/// A file hunk that made it into the payload.
#[derive(Debug, Clone, Serialize)]
pub struct IncludedFile {
    pub path: String,
    pub tier: PriorityTier,
    pub hunk: String,
}

/// A file hunk that did not, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct ExcludedFile {
    pub path: String,
    pub reason: ExclusionReason,
}

/// Bounded diff payload. Invariant: `total_chars <= budget_chars`.
#[derive(Debug, Clone, Serialize)]
pub struct PrioritizedDiff {
    /// Tier order (high → low); original diff order within a tier.
    pub included_files: Vec<IncludedFile>,
    pub excluded_files: Vec<ExcludedFile>,
    pub total_chars: usize,
    pub budget_chars: usize,
    /// Size of the raw diff before exclusion and budgeting.
    pub original_chars: usize,
}

impl PrioritizedDiff {
    /// Concatenated hunks, in payload order.
    pub fn assembled_text(&self) -> String {
        self.included_files
            .iter()
            .map(|f| f.hunk.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Classify and budget a raw unified diff.
///
/// Rule-excluded files never count toward the budget. Within the kept
/// files, assembly walks tiers high → medium → low (original order within
/// each tier) and stops at the first file that would overflow the budget;
/// whole files are either fully in or fully out, never cut mid-hunk.
pub fn prioritize(raw_diff: &str, budget_chars: usize, rules: &ExclusionRules) -> PrioritizedDiff {
    let chunks = split_by_file(raw_diff);

    let mut excluded: Vec<ExcludedFile> = Vec::new();
    let mut tiers: [Vec<(String, String)>; 3] = [Vec::new(), Vec::new(), Vec::new()];

    for (path, chunk) in chunks {
        if rules.matches(&path) {
            excluded.push(ExcludedFile {
                path,
                reason: ExclusionReason::ExcludedByRule,
            });
            continue;
        }
        let tier = classify(&path);
        tiers[tier as usize].push((path, mask_sensitive(&chunk)));
    }

    let mut included: Vec<IncludedFile> = Vec::new();
    let mut total = 0usize;
    let mut over_budget = false;

    for (tier, files) in [
        (PriorityTier::High, &tiers[0]),
        (PriorityTier::Medium, &tiers[1]),
        (PriorityTier::Low, &tiers[2]),
    ] {
        for (path, hunk) in files {
            if over_budget || total + hunk.len() > budget_chars {
                over_budget = true;
                excluded.push(ExcludedFile {
                    path: path.clone(),
                    reason: ExclusionReason::BudgetExceeded,
                });
                continue;
            }
            total += hunk.len();
            included.push(IncludedFile {
                path: path.clone(),
                tier,
                hunk: hunk.clone(),
            });
        }
    }

    debug!(
        included = included.len(),
        excluded = excluded.len(),
        total,
        budget = budget_chars,
        "diff prioritized"
    );

    PrioritizedDiff {
        included_files: included,
        excluded_files: excluded,
        total_chars: total,
        budget_chars,
        original_chars: raw_diff.len(),
    }
}

fn classify(path: &str) -> PriorityTier {
    let extension = path.rsplit('.').next().unwrap_or("");
    if SOURCE_EXTENSIONS.contains(&extension) {
        PriorityTier::High
    } else if CONFIG_EXTENSIONS.contains(&extension) {
        PriorityTier::Medium
    } else {
        PriorityTier::Low
    }
}

/// Split a unified diff into `(path, chunk)` pairs on `diff --git` lines.
fn split_by_file(raw_diff: &str) -> Vec<(String, String)> {
    let mut chunks: Vec<(String, String)> = Vec::new();
    let mut current_path = String::new();
    let mut current = String::new();

    for line in raw_diff.split_inclusive('\n') {
        if line.starts_with("diff --git") {
            if !current.is_empty() {
                chunks.push((current_path.clone(), std::mem::take(&mut current)));
            }
            current_path = line
                .split_once(" b/")
                .map(|(_, rest)| rest.trim().to_owned())
                .unwrap_or_else(|| line.trim().to_owned());
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push((current_path, current));
    }
    chunks
}

static SENSITIVE_PATTERNS: LazyLock<Vec<(regex::Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            regex::Regex::new(
                r#"(?i)(api[_-]?key|api[_-]?secret|auth[_-]?token|access[_-]?token|secret[_-]?key|private[_-]?key)\s*[:=]\s*['"]?([^\s'"]{8,})"#,
            )
            .unwrap(),
            "$1=***MASKED***",
        ),
        (
            regex::Regex::new(r#"(?i)(password|passwd|pwd)\s*[:=]\s*['"]?([^\s'"]{4,})"#).unwrap(),
            "$1=***MASKED***",
        ),
        (
            regex::Regex::new(r"(?i)(Bearer\s+)([A-Za-z0-9\-._~+/]+=*)").unwrap(),
            "${1}***MASKED***",
        ),
    ]
});

/// Mask credential-looking values so they never reach the caller's context.
fn mask_sensitive(text: &str) -> String {
    let mut masked = text.to_owned();
    for (pattern, replacement) in SENSITIVE_PATTERNS.iter() {
        masked = pattern.replace_all(&masked, *replacement).into_owned();
    }
    masked
}
