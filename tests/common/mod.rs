//! Common test utilities and helpers for repomirror tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use repomirror::{ListingError, RepoListing, RepositoryRecord, Source};

/// Run the repomirror binary with `args`
pub fn repomirror(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repomirror"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute repomirror")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// True if a usable `git` is on PATH; end-to-end tests return early otherwise
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=repomirror", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("Failed to run git");
    assert!(
        status.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&status.stderr)
    );
}

/// Create a non-bare repository with `commits` empty commits at `path`
pub fn create_upstream(path: &Path, commits: usize) {
    std::fs::create_dir_all(path).expect("Failed to create upstream dir");
    git(path, &["init", "-q"]);
    for i in 0..commits {
        add_commit(path, &format!("commit {}", i));
    }
}

pub fn add_commit(path: &Path, message: &str) {
    git(path, &["commit", "-q", "--allow-empty", "-m", message]);
}

/// `file://` URL so clones go through the pack protocol
pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

pub fn record(id: u64, path_with_namespace: &str, url: &str) -> RepositoryRecord {
    RepositoryRecord {
        id,
        name: path_with_namespace
            .rsplit('/')
            .next()
            .unwrap_or(path_with_namespace)
            .to_string(),
        name_with_namespace: None,
        path: None,
        path_with_namespace: path_with_namespace.to_string(),
        http_url_to_repo: url.to_string(),
        created_at: Utc::now(),
    }
}

/// Serves the same records for every source in a single page
pub struct StaticListing {
    pub repos: Vec<RepositoryRecord>,
}

#[async_trait]
impl RepoListing for StaticListing {
    async fn list_page(
        &self,
        _source: &Source,
        page: u32,
    ) -> Result<Vec<RepositoryRecord>, ListingError> {
        Ok(if page == 1 {
            self.repos.clone()
        } else {
            Vec::new()
        })
    }
}

/// Write a YAML config into `dir` and return its path
pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("config.yml");
    std::fs::write(&path, content).expect("Failed to write test config");
    path
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
