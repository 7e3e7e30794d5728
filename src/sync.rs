//! Sync Engine - per-repository mirror decisions and batch orchestration
//!
//! [`SyncEngine`] decides, for one remote repository, whether to skip it,
//! create a new mirror or update an existing one, and runs the matching
//! [`MirrorOps`] steps. A failed new mirror is rolled back so the next run
//! starts clean; a failed update leaves the last good mirror in place.
//!
//! [`BatchRunner`] walks every configured source, lists its repositories,
//! drives them through the engine and accumulates per-source statistics.

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::{Config, Source};
use crate::discovery::{GitLabListing, RepoListing, RepositoryRecord};
use crate::error::{InspectionError, ListingError, OperationError, StepError};
use crate::filter::should_skip;
use crate::git::{GitCli, MirrorOps};
use crate::inspect::{inspect_async, MirrorState};
use crate::state::{StateDb, SyncRecord};
use crate::stats::{Outcome, Stat, StatsAggregator};

/// What the engine intends to do with a repository, decided without mutation
#[derive(Debug)]
pub enum Plan {
    /// Filtered out by include/exclude patterns
    Skip,
    /// No local mirror yet
    NewMirror,
    /// Mirror exists; carries its current measurements
    ExistingMirror(MirrorState),
    /// Mirror path could not be inspected
    Fail(InspectionError),
}

/// Result of processing one repository
#[derive(Debug, Clone)]
pub struct RepoReport {
    pub path_with_namespace: String,
    pub remote_url: String,
    pub local_path: PathBuf,
    pub outcome: Outcome,
    /// Failing step and error text for failure outcomes
    pub error: Option<String>,
    /// Object store measurements taken during this run
    pub measured: Option<MirrorState>,
}

impl RepoReport {
    fn new(record: &RepositoryRecord, local_path: PathBuf) -> Self {
        Self {
            path_with_namespace: record.path_with_namespace.clone(),
            remote_url: record.http_url_to_repo.clone(),
            local_path,
            outcome: Outcome::Skipped,
            error: None,
            measured: None,
        }
    }
}

/// Per-repository decision engine
#[derive(Clone)]
pub struct SyncEngine {
    ops: Arc<dyn MirrorOps>,
    destination: PathBuf,
    repack_threshold_bytes: u64,
}

impl SyncEngine {
    pub fn new(
        ops: Arc<dyn MirrorOps>,
        destination: impl Into<PathBuf>,
        repack_threshold_bytes: u64,
    ) -> Self {
        Self {
            ops,
            destination: destination.into(),
            repack_threshold_bytes,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// `None` if the record's path has no usable segment
    pub fn local_path(&self, source: &Source, record: &RepositoryRecord) -> Option<PathBuf> {
        record.local_path(&self.destination, &source.domain)
    }

    /// Where a record is reported; the domain directory for unusable paths
    pub fn report_path(&self, source: &Source, record: &RepositoryRecord) -> PathBuf {
        self.local_path(source, record)
            .unwrap_or_else(|| self.destination.join(&source.domain))
    }

    /// Decide what to do with `record` without touching the filesystem
    pub async fn plan(&self, source: &Source, record: &RepositoryRecord) -> Plan {
        if should_skip(source, &record.http_url_to_repo) {
            return Plan::Skip;
        }
        let Some(local) = self.local_path(source, record) else {
            return Plan::Fail(InspectionError::new(
                self.destination.join(&source.domain),
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "path_with_namespace '{}' has no usable segment",
                        record.path_with_namespace
                    ),
                ),
            ));
        };
        match inspect_async(&local).await {
            Ok(MirrorState::Absent) => Plan::NewMirror,
            Ok(state) => Plan::ExistingMirror(state),
            Err(e) => Plan::Fail(e),
        }
    }

    /// Run the full decision for one repository; never returns an error
    pub async fn process(&self, source: &Source, record: &RepositoryRecord) -> RepoReport {
        let remote = record.http_url_to_repo.as_str();
        let local = self.report_path(source, record);
        let mut report = RepoReport::new(record, local.clone());

        match self.plan(source, record).await {
            Plan::Skip => {
                debug!("Skipping [{}] by filter", remote);
            }
            Plan::Fail(e) => {
                error!(
                    "Failed [{}] -> [{}]: inspect error: '{}'",
                    remote,
                    local.display(),
                    e
                );
                report.outcome = Outcome::Failed;
                report.error = Some(format!("inspect: {}", e));
            }
            Plan::NewMirror => {
                info!("Mirroring [{}] -> [{}]", remote, local.display());
                match self.new_mirror(remote, &local).await {
                    Ok(state) => {
                        info!("Successfully mirrored [{}] -> [{}]", remote, local.display());
                        report.outcome = Outcome::Mirrored;
                        report.measured = Some(state);
                    }
                    Err(e) => {
                        error!(
                            "Failed mirror [{}] -> [{}]: {} error: '{}'",
                            remote,
                            local.display(),
                            e.step(),
                            e
                        );
                        self.rollback(remote, &local).await;
                        report.outcome = Outcome::FailedMirror;
                        report.error = Some(format!("{}: {}", e.step(), e));
                    }
                }
            }
            Plan::ExistingMirror(state) => {
                info!("Updating [{}] -> [{}]", remote, local.display());
                report.measured = Some(state);
                match self.existing_mirror(&local).await {
                    Ok(()) => {
                        info!("Successfully updated [{}] -> [{}]", remote, local.display());
                        report.outcome = Outcome::Updated;
                    }
                    Err(e) => {
                        error!(
                            "Failed update [{}] -> [{}]: {} error: '{}'",
                            remote,
                            local.display(),
                            e.op,
                            e
                        );
                        report.outcome = Outcome::FailedUpdate;
                        report.error = Some(format!("{}: {}", e.op, e));
                    }
                }
            }
        }

        report
    }

    /// clone → disable gc → mark → measure → repack if oversized → update
    async fn new_mirror(&self, remote: &str, local: &Path) -> Result<MirrorState, StepError> {
        self.ops.clone_mirror(remote, local).await?;
        self.ops.disable_auto_gc(local).await?;
        self.ops.mark(local).await?;

        let state = inspect_async(local).await?;
        let largest = state.largest_pack_bytes().unwrap_or(0);
        if largest > self.repack_threshold_bytes {
            info!(
                "Should repack [{}]. objects largestsize={}",
                local.display(),
                largest
            );
            self.ops.repack(local).await?;
            info!("Repack [{}] finished.", local.display());
        }

        self.ops.update(local).await?;
        Ok(state)
    }

    /// disable gc → update; the mirror is never removed here
    async fn existing_mirror(&self, local: &Path) -> Result<(), OperationError> {
        self.ops.disable_auto_gc(local).await?;
        self.ops.update(local).await
    }

    async fn rollback(&self, remote: &str, local: &Path) {
        if let Err(e) = self.ops.remove(local).await {
            error!(
                "Failed to remove partial mirror [{}] -> [{}]: remove error: '{}'",
                remote,
                local.display(),
                e
            );
        }
    }
}

/// A repository and the engine's plan for it, for dry runs
#[derive(Debug)]
pub struct PlannedRepo {
    pub record: RepositoryRecord,
    pub local_path: PathBuf,
    pub plan: Plan,
}

/// Results from a complete batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub stats: Vec<Stat>,
    /// Reports for every repository that ended in a failure outcome
    pub failures: Vec<RepoReport>,
    pub duration: Duration,
}

impl BatchSummary {
    pub fn total_repositories(&self) -> usize {
        self.stats.iter().map(|s| s.repos).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.stats.iter().map(Stat::failures).sum()
    }
}

/// Drives every configured source through the sync engine
pub struct BatchRunner {
    engine: SyncEngine,
    listing: Arc<dyn RepoListing>,
    sources: Vec<Source>,
    max_parallel: usize,
    state: Option<StateDb>,
}

impl BatchRunner {
    pub fn new(
        engine: SyncEngine,
        listing: Arc<dyn RepoListing>,
        sources: Vec<Source>,
        max_parallel: usize,
    ) -> Self {
        Self {
            engine,
            listing,
            sources,
            max_parallel: max_parallel.max(1),
            state: None,
        }
    }

    /// Production wiring: git CLI, GitLab listing, manifest if enabled
    pub fn from_config(config: &Config) -> Result<Self> {
        let git = GitCli::new(
            config.sync.repack_threshold_mb,
            config.sync.timeout.map(Duration::from_secs),
        );
        let engine = SyncEngine::new(
            Arc::new(git),
            config.destination_path(),
            config.sync.repack_threshold_bytes(),
        );
        let mut runner = Self::new(
            engine,
            Arc::new(GitLabListing::new()),
            config.sources.clone(),
            config.sync.max_parallel,
        );

        if config.state.enabled {
            let db = StateDb::open_at(&config.state_db_path())
                .context("Failed to open mirror manifest")?;
            runner = runner.with_state(db);
        }

        Ok(runner)
    }

    pub fn with_state(mut self, db: StateDb) -> Self {
        self.state = Some(db);
        self
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Mirror every source; only a missing destination root aborts the batch
    pub async fn run(&self) -> Result<BatchSummary> {
        let start_time = Instant::now();
        let destination = self.engine.destination();

        tokio::fs::create_dir_all(destination)
            .await
            .with_context(|| {
                format!(
                    "Failed to create destination directory: {}",
                    destination.display()
                )
            })?;

        let mut stats = StatsAggregator::new();
        let mut failures = Vec::new();

        for source in &self.sources {
            let index = stats.begin(source);

            let repos = match self.listing.list_all(source).await {
                Ok(repos) => repos,
                Err(e) => {
                    error!("Failed to get source [{}] repos. error:'{}'", source, e);
                    stats.listing_failed(index, &e);
                    continue;
                }
            };
            info!("Found {} repos for source [{}]", repos.len(), source);

            // Permits are handed out in listing order, so one permit is sequential
            let semaphore = Semaphore::new(self.max_parallel);
            let mut pipelines = FuturesUnordered::new();
            let mut claimed: HashMap<PathBuf, &str> = HashMap::new();

            for record in &repos {
                if let Some(report) = self.claim_path(source, record, &mut claimed) {
                    self.absorb(source, index, report, &mut stats, &mut failures);
                    continue;
                }
                let semaphore = &semaphore;
                let engine = &self.engine;
                pipelines.push(async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire().await.ok();
                    engine.process(source, record).await
                });
            }

            while let Some(report) = pipelines.next().await {
                self.absorb(source, index, report, &mut stats, &mut failures);
            }
        }

        let stats = stats.into_report();
        for stat in &stats {
            info!("{}", stat);
            if let Some(e) = &stat.listing_error {
                warn!("Source [{}] was not processed: {}", stat.source, e);
            }
        }

        Ok(BatchSummary {
            stats,
            failures,
            duration: start_time.elapsed(),
        })
    }

    /// Reserve the record's mirror path for one pipeline
    ///
    /// Returns a `Failed` report when an earlier record of this source already
    /// maps to the same path. Filtered records never touch their path and are
    /// not claimed.
    fn claim_path<'a>(
        &self,
        source: &Source,
        record: &'a RepositoryRecord,
        claimed: &mut HashMap<PathBuf, &'a str>,
    ) -> Option<RepoReport> {
        if should_skip(source, &record.http_url_to_repo) {
            return None;
        }
        let local = self.engine.local_path(source, record)?;
        let owner: &str = match claimed.get(&local) {
            Some(owner) => *owner,
            None => {
                claimed.insert(local, &record.path_with_namespace);
                return None;
            }
        };

        error!(
            "Failed [{}] -> [{}]: local path already used by [{}]",
            record.http_url_to_repo,
            local.display(),
            owner
        );
        let mut report = RepoReport::new(record, local);
        report.outcome = Outcome::Failed;
        report.error = Some(format!("duplicate local path, already used by {}", owner));
        Some(report)
    }

    fn absorb(
        &self,
        source: &Source,
        index: usize,
        report: RepoReport,
        stats: &mut StatsAggregator,
        failures: &mut Vec<RepoReport>,
    ) {
        stats.record(index, report.outcome);
        self.record_manifest(source, &report);
        if report.outcome.is_failure() {
            failures.push(report);
        }
    }

    /// List one source and plan each repository without changing anything
    pub async fn plan_source(&self, source: &Source) -> Result<Vec<PlannedRepo>, ListingError> {
        let repos = self.listing.list_all(source).await?;
        let mut planned = Vec::with_capacity(repos.len());
        for record in repos {
            let plan = self.engine.plan(source, &record).await;
            planned.push(PlannedRepo {
                local_path: self.engine.report_path(source, &record),
                record,
                plan,
            });
        }
        Ok(planned)
    }

    fn record_manifest(&self, source: &Source, report: &RepoReport) {
        let Some(db) = &self.state else {
            return;
        };
        let measured = report.measured.as_ref();
        let record = SyncRecord {
            domain: &source.domain,
            path_with_namespace: &report.path_with_namespace,
            local_path: &report.local_path,
            remote_url: &report.remote_url,
            outcome: report.outcome,
            error: report.error.as_deref(),
            largest_pack_bytes: measured.and_then(MirrorState::largest_pack_bytes),
            object_count: measured.and_then(MirrorState::object_count),
        };
        if let Err(e) = db.record_sync(&record) {
            warn!(
                "Failed to record [{}] in manifest: {:#}",
                report.local_path.display(),
                e
            );
        }
    }
}
