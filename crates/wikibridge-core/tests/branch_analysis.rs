//! End-to-end analysis tests against real git repositories built in
//! temporary directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use wikibridge_core::{
    BranchAnalyzer, CoreError, DiffSettings, GitRunner, locate_repository, resolve_base_branch,
};

fn run_git(repo: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args([
            "-c",
            "user.email=dev@example.com",
            "-c",
            "user.name=dev",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(repo)
        .status()
        .expect("git should be runnable");
    assert!(status.success(), "git {args:?} failed in {repo:?}");
}

fn commit_file(repo: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(repo.join(name), content).expect("should write file");
    run_git(repo, &["add", "."]);
    run_git(repo, &["commit", "-q", "-m", message]);
}

/// Repo with a `dev` integration branch and a feature branch holding
/// `feature_commits` commits on top of the fork point; `dev` then moves
/// ahead by one commit.
fn build_repo(dir: &Path, feature_branch: &str, feature_commits: usize) {
    run_git(dir, &["init", "-q", "-b", "main"]);
    commit_file(dir, "README.md", "hello", "initial commit");
    run_git(dir, &["checkout", "-q", "-b", "dev"]);
    commit_file(dir, "base.rs", "fn base() {}", "base work on dev");

    run_git(dir, &["checkout", "-q", "-b", feature_branch]);
    for i in 0..feature_commits {
        commit_file(
            dir,
            &format!("feature_{i}.rs"),
            &format!("fn feature_{i}() {{}}"),
            &format!("feature commit {i}"),
        );
    }

    // Advance dev past the fork point; these commits must not appear in
    // the feature branch's unique range.
    run_git(dir, &["checkout", "-q", "dev"]);
    commit_file(dir, "later.rs", "fn later() {}", "later work on dev");
    run_git(dir, &["checkout", "-q", feature_branch]);
}

#[tokio::test]
async fn test_should_prefer_dev_over_main_as_base() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    build_repo(dir.path(), "dev_PROJ-1", 1);

    let git = GitRunner::new(dir.path());
    let base = resolve_base_branch(&git).await.expect("base should resolve");
    assert_eq!(base, "dev");
}

#[tokio::test]
async fn test_should_fall_back_to_main_when_no_dev_branch() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    run_git(dir.path(), &["init", "-q", "-b", "main"]);
    commit_file(dir.path(), "README.md", "hello", "initial commit");

    let git = GitRunner::new(dir.path());
    let base = resolve_base_branch(&git).await.expect("base should resolve");
    assert_eq!(base, "main");
}

#[tokio::test]
async fn test_should_collect_only_commits_unique_to_the_branch() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    build_repo(dir.path(), "dev_PROJ-1", 3);
    let repos = BTreeMap::from([("app".to_owned(), dir.path().to_path_buf())]);

    let analyzer = BranchAnalyzer::new(repos, &DiffSettings::default());
    let report = analyzer
        .collect_commits("dev_PROJ-1", None, false)
        .await
        .expect("analysis should succeed");

    assert_eq!(report.repository.name, "app");
    assert_eq!(report.range.base_branch_name, "dev");
    // 3 feature commits; neither the fork-point history nor dev's later
    // commit leak in.
    assert_eq!(report.range.commits.len(), 3);
    // Newest first.
    assert_eq!(report.range.commits[0].subject, "feature commit 2");
    assert_eq!(report.range.commits[2].subject, "feature commit 0");
    assert_eq!(report.range.stats.files_changed, 3);
    assert!(report.diff.is_none());
}

#[tokio::test]
async fn test_should_return_bounded_diff_on_request() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    build_repo(dir.path(), "dev_PROJ-2", 2);
    let repos = BTreeMap::from([("app".to_owned(), dir.path().to_path_buf())]);

    let analyzer = BranchAnalyzer::new(repos, &DiffSettings::default());
    let report = analyzer
        .collect_commits("dev_PROJ-2", None, true)
        .await
        .expect("analysis should succeed");

    let diff = report.diff.expect("diff should be included");
    assert!(diff.total_chars <= diff.budget_chars);
    assert!(diff.assembled_text().contains("fn feature_0() {}"));
}

#[tokio::test]
async fn test_should_exclude_lockfiles_from_analyzed_diff() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    build_repo(dir.path(), "dev_PROJ-3", 1);
    commit_file(
        dir.path(),
        "package-lock.json",
        "{\"lockfileVersion\": 3}",
        "add lockfile",
    );
    let repos = BTreeMap::from([("app".to_owned(), dir.path().to_path_buf())]);

    let analyzer = BranchAnalyzer::new(repos, &DiffSettings::default());
    let report = analyzer
        .analyze_changes("dev_PROJ-3", None)
        .await
        .expect("analysis should succeed");

    assert!(!report.diff.assembled_text().contains("lockfileVersion"));
    assert!(report
        .diff
        .excluded_files
        .iter()
        .any(|f| f.path == "package-lock.json"));
    assert!(report.diff_stat.contains("package-lock.json"));
}

#[tokio::test]
async fn test_should_locate_branch_across_configured_repositories() {
    let with_branch = tempfile::TempDir::new().expect("should create temp dir");
    build_repo(with_branch.path(), "dev_PROJ-9", 1);
    let without_branch = tempfile::TempDir::new().expect("should create temp dir");
    run_git(without_branch.path(), &["init", "-q", "-b", "main"]);
    commit_file(without_branch.path(), "README.md", "other", "initial commit");

    let repos = BTreeMap::from([
        ("alpha".to_owned(), without_branch.path().to_path_buf()),
        ("beta".to_owned(), with_branch.path().to_path_buf()),
    ]);

    let found = locate_repository("dev_PROJ-9", &repos, None)
        .await
        .expect("branch should be found");
    assert_eq!(found.name, "beta");
    assert_eq!(found.path, PathBuf::from(with_branch.path()));
}

#[tokio::test]
async fn test_should_report_missing_branch() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    build_repo(dir.path(), "dev_PROJ-1", 1);
    let repos = BTreeMap::from([("app".to_owned(), dir.path().to_path_buf())]);

    let analyzer = BranchAnalyzer::new(repos, &DiffSettings::default());
    let result = analyzer.collect_commits("dev_PROJ-999", None, false).await;
    assert!(matches!(result, Err(CoreError::RepositoryNotFound { .. })));
}
