//! repomirror - bare mirrors of every repository on your hosting accounts
//!
//! repomirror lists the repositories of each configured GitLab account and
//! keeps a bare `git clone --mirror` of every one of them under a single
//! destination directory, laid out as `<destination>/<domain>/<path>.git`.
//!
//! ## Core Features
//!
//! - **Discovery**: Paginated listing through the GitLab v4 projects API
//! - **Filtering**: Literal and glob include/exclude rules per source
//! - **Safe updates**: Failed new mirrors are rolled back, failed updates
//!   never touch the existing mirror
//! - **Pack hygiene**: Oversized packs are split right after the first clone
//! - **Manifest**: Optional SQLite record of each mirror's last sync
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`discovery`]: Repository listing
//! - [`filter`]: Include/exclude decisions
//! - [`inspect`]: Local mirror state
//! - [`git`]: Mirror maintenance operations
//! - [`sync`]: Decision engine and batch runner
//! - [`stats`]: Per-source outcome counters
//! - [`state`]: Mirror manifest

pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod git;
pub mod health;
pub mod inspect;
pub mod state;
pub mod stats;
pub mod sync;

pub use config::{Config, Source};
pub use discovery::{GitLabListing, RepoListing, RepositoryRecord};
pub use error::{InspectionError, ListingError, Operation, OperationError};
pub use git::{GitCli, MirrorOps};
pub use health::HealthCheck;
pub use inspect::MirrorState;
pub use state::StateDb;
pub use stats::{Outcome, Stat};
pub use sync::{BatchRunner, BatchSummary, Plan, SyncEngine};
