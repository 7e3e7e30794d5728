//! End-to-end sync runs against real local git repositories

mod common;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use repomirror::{BatchRunner, GitCli, Outcome, Source, StateDb, SyncEngine};

use common::{create_upstream, file_url, record, StaticListing};

const THRESHOLD: u64 = 95 * 1024 * 1024;

fn runner(temp: &TempDir, repos: Vec<repomirror::RepositoryRecord>, threshold: u64) -> BatchRunner {
    let git = GitCli::new(95, Some(Duration::from_secs(60)));
    let engine = SyncEngine::new(Arc::new(git), temp.child("mirrors").path(), threshold);
    BatchRunner::new(
        engine,
        Arc::new(StaticListing { repos }),
        vec![Source::new("local.test")],
        2,
    )
}

#[tokio::test]
async fn test_mirror_then_update_then_preserve() {
    if !common::git_available() {
        eprintln!("git not found; skipping");
        return;
    }

    let temp = TempDir::new().unwrap();
    let upstream = temp.child("upstream/team/api");
    create_upstream(upstream.path(), 1);

    let runner = runner(
        &temp,
        vec![record(1, "team/api", &file_url(upstream.path()))],
        THRESHOLD,
    )
    .with_state(StateDb::open_in_memory().unwrap());

    let first = runner.run().await.unwrap();
    assert_eq!(first.stats[0].mirrored, 1);

    let mirror = temp.child("mirrors/local.test/team/api.git");
    mirror.child("HEAD").assert(predicate::path::is_file());
    mirror.child("refs/.gitkeep").assert(predicate::path::exists());

    common::add_commit(upstream.path(), "more work");
    let second = runner.run().await.unwrap();
    assert_eq!(second.stats[0].updated, 1);

    // Upstream disappears: the last good mirror must survive
    std::fs::remove_dir_all(upstream.path()).unwrap();
    let third = runner.run().await.unwrap();
    assert_eq!(third.stats[0].failed_update, 1);
    assert_eq!(third.failures.len(), 1);
    assert_eq!(third.failures[0].outcome, Outcome::FailedUpdate);
    mirror.child("HEAD").assert(predicate::path::is_file());
}

#[tokio::test]
async fn test_failed_clone_leaves_nothing_behind() {
    if !common::git_available() {
        eprintln!("git not found; skipping");
        return;
    }

    let temp = TempDir::new().unwrap();
    let missing = temp.child("upstream/team/gone");

    let runner = runner(
        &temp,
        vec![record(1, "team/gone", &file_url(missing.path()))],
        THRESHOLD,
    );

    let summary = runner.run().await.unwrap();
    assert_eq!(summary.stats[0].failed_mirror, 1);
    assert!(summary.failures[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("clone:"));
    temp.child("mirrors/local.test/team/gone.git")
        .assert(predicate::path::missing());
    // The destination root itself is still created
    temp.child("mirrors").assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_oversized_pack_is_repacked_after_clone() {
    if !common::git_available() {
        eprintln!("git not found; skipping");
        return;
    }

    let temp = TempDir::new().unwrap();
    let upstream = temp.child("upstream/team/big");
    create_upstream(upstream.path(), 3);

    // Any non-empty pack exceeds a zero threshold
    let runner = runner(
        &temp,
        vec![record(1, "team/big", &file_url(upstream.path()))],
        0,
    );

    let summary = runner.run().await.unwrap();
    assert_eq!(summary.stats[0].mirrored, 1, "failures: {:?}", summary.failures);
    temp.child("mirrors/local.test/team/big.git/objects/pack")
        .assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_filtered_and_mirrored_counts_sum() {
    if !common::git_available() {
        eprintln!("git not found; skipping");
        return;
    }

    let temp = TempDir::new().unwrap();
    let api = temp.child("upstream/team/api");
    let old = temp.child("upstream/team/archived/old");
    create_upstream(api.path(), 1);
    create_upstream(old.path(), 1);

    let repos = vec![
        record(1, "team/api", &file_url(api.path())),
        record(2, "team/archived/old", &file_url(old.path())),
        record(3, "team/missing", &file_url(&temp.path().join("nope"))),
    ];
    let git = GitCli::new(95, None);
    let engine = SyncEngine::new(Arc::new(git), temp.child("mirrors").path(), THRESHOLD);
    let source = Source {
        exclude: vec!["*/archived/*".to_string()],
        ..Source::new("local.test")
    };
    let runner = BatchRunner::new(engine, Arc::new(StaticListing { repos }), vec![source], 1);

    let summary = runner.run().await.unwrap();
    let stat = &summary.stats[0];
    assert_eq!(stat.repos, 3);
    assert_eq!(stat.skipped, 1);
    assert_eq!(stat.mirrored, 1);
    assert_eq!(stat.failed_mirror, 1);
    assert_eq!(stat.outcome_total(), stat.repos);
    assert_eq!(
        stat.to_string(),
        "Source [local.test] stats: repos:3 skipped:1 mirrored:1 updated:0 failed:0 failed_mirror:1 failed_update:0"
    );
}
