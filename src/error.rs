//! Error types for listing, inspection and maintenance operations
//!
//! Each error is scoped: a [`ListingError`] abandons one source, an
//! [`InspectionError`] or [`OperationError`] abandons one repository.
//! None of them ever stops the batch.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while fetching a page of repositories from a source
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode repository page from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure while examining a local mirror (anything other than "not found")
#[derive(Debug, Error)]
#[error("failed to inspect {}: {source}", path.display())]
pub struct InspectionError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl InspectionError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// The maintenance step an [`OperationError`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Clone,
    DisableAutoGc,
    Mark,
    Repack,
    Update,
    Remove,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Clone => "clone",
            Operation::DisableAutoGc => "disable-auto-gc",
            Operation::Mark => "mark",
            Operation::Repack => "repack",
            Operation::Update => "update",
            Operation::Remove => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A maintenance operation exited non-zero, could not be spawned, or timed out
#[derive(Debug, Error)]
#[error("{op} failed for {}: {reason}", path.display())]
pub struct OperationError {
    pub op: Operation,
    pub path: PathBuf,
    pub reason: String,
}

impl OperationError {
    pub fn new(op: Operation, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Any step of the new-mirror pipeline, which re-inspects after cloning
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Inspection(#[from] InspectionError),
}

impl StepError {
    /// Short name of the failing step, for log lines
    pub fn step(&self) -> &'static str {
        match self {
            StepError::Operation(e) => e.op.as_str(),
            StepError::Inspection(_) => "inspect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_display() {
        let err = OperationError::new(Operation::Update, "/srv/m/a.git", "exit status: 1");
        assert_eq!(err.to_string(), "update failed for /srv/m/a.git: exit status: 1");
    }

    #[test]
    fn test_step_error_names_failing_step() {
        let op: StepError = OperationError::new(Operation::Repack, "/x", "boom").into();
        assert_eq!(op.step(), "repack");

        let inspect: StepError =
            InspectionError::new("/x", io::Error::new(io::ErrorKind::Other, "eio")).into();
        assert_eq!(inspect.step(), "inspect");
    }
}
