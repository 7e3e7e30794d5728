use async_trait::async_trait;
use filetime::FileTime;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::error::{Operation, OperationError};

/// The maintenance steps the sync engine sequences for a mirror
///
/// Every step is idempotent except `clone`, which must only run against an
/// absent path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MirrorOps: Send + Sync {
    /// Create a bare mirror of `url` at `path`
    async fn clone_mirror(&self, url: &str, path: &Path) -> Result<(), OperationError>;

    /// Turn off automatic gc so only explicit repacks compact the mirror
    async fn disable_auto_gc(&self, path: &Path) -> Result<(), OperationError>;

    /// Touch the `.gitkeep` markers in `refs/` and `objects/`
    async fn mark(&self, path: &Path) -> Result<(), OperationError>;

    /// Consolidate packs under the configured maximum pack size
    async fn repack(&self, path: &Path) -> Result<(), OperationError>;

    /// Fetch every configured remote
    async fn update(&self, path: &Path) -> Result<(), OperationError>;

    /// Delete the mirror directory; a missing path is not an error
    async fn remove(&self, path: &Path) -> Result<(), OperationError>;
}

/// [`MirrorOps`] backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    max_pack_size_mb: u64,
    timeout: Option<Duration>,
}

impl GitCli {
    pub fn new(max_pack_size_mb: u64, timeout: Option<Duration>) -> Self {
        Self {
            program: "git".to_string(),
            max_pack_size_mb,
            timeout,
        }
    }

    /// Use a different git binary (e.g. an absolute path)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to git for `op` against `path`
    pub fn args_for(&self, op: Operation, path: &Path, url: Option<&str>) -> Vec<String> {
        let local = path.to_string_lossy().into_owned();
        match op {
            Operation::Clone => vec![
                "clone".into(),
                "--mirror".into(),
                url.unwrap_or_default().to_string(),
                local,
            ],
            Operation::DisableAutoGc => vec![
                "-C".into(),
                local,
                "config".into(),
                "--local".into(),
                "gc.auto".into(),
                "0".into(),
            ],
            Operation::Repack => vec![
                "-C".into(),
                local,
                "repack".into(),
                format!("--max-pack-size={}m", self.max_pack_size_mb),
                "-A".into(),
                "-d".into(),
            ],
            Operation::Update => vec!["-C".into(), local, "remote".into(), "update".into()],
            // Handled in-process, not by git
            Operation::Mark | Operation::Remove => Vec::new(),
        }
    }

    async fn run_git(
        &self,
        op: Operation,
        path: &Path,
        url: Option<&str>,
    ) -> Result<(), OperationError> {
        let args = self.args_for(op, path, url);
        debug!("Running {} {}", self.program, args.join(" "));

        let child = AsyncCommand::new(&self.program)
            .args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OperationError::new(op, path, format!("failed to execute git: {}", e))
            })?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    return Err(OperationError::new(
                        op,
                        path,
                        format!("timed out after {}s", limit.as_secs()),
                    ))
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| OperationError::new(op, path, format!("failed to wait for git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let reason = if stderr.is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, stderr)
            };
            return Err(OperationError::new(op, path, reason));
        }

        Ok(())
    }
}

#[async_trait]
impl MirrorOps for GitCli {
    async fn clone_mirror(&self, url: &str, path: &Path) -> Result<(), OperationError> {
        info!("Cloning mirror {} -> {}", url, path.display());
        self.run_git(Operation::Clone, path, Some(url)).await
    }

    async fn disable_auto_gc(&self, path: &Path) -> Result<(), OperationError> {
        self.run_git(Operation::DisableAutoGc, path, None).await
    }

    async fn mark(&self, path: &Path) -> Result<(), OperationError> {
        touch_markers(path).await
    }

    async fn repack(&self, path: &Path) -> Result<(), OperationError> {
        info!(
            "Repacking {} (max pack size {}m)",
            path.display(),
            self.max_pack_size_mb
        );
        self.run_git(Operation::Repack, path, None).await
    }

    async fn update(&self, path: &Path) -> Result<(), OperationError> {
        self.run_git(Operation::Update, path, None).await
    }

    async fn remove(&self, path: &Path) -> Result<(), OperationError> {
        remove_mirror(path).await
    }
}

/// Create or refresh `refs/.gitkeep` and `objects/.gitkeep`
pub async fn touch_markers(path: &Path) -> Result<(), OperationError> {
    for dir in ["refs", "objects"] {
        let marker = path.join(dir).join(".gitkeep");
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&marker)
            .await
            .map_err(|e| {
                OperationError::new(
                    Operation::Mark,
                    path,
                    format!("{}: {}", marker.display(), e),
                )
            })?;
        filetime::set_file_mtime(&marker, FileTime::now()).map_err(|e| {
            OperationError::new(
                Operation::Mark,
                path,
                format!("{}: {}", marker.display(), e),
            )
        })?;
    }
    Ok(())
}

/// Recursively delete `path`, treating an already-missing path as success
pub async fn remove_mirror(path: &Path) -> Result<(), OperationError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OperationError::new(Operation::Remove, path, e.to_string())),
    }
}
