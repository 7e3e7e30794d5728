//! System health checks for repomirror
//!
//! Preflight checks run by `repomirror doctor` to verify the system can
//! mirror before a sync is attempted.

use crate::Config;
use std::path::Path;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Destination directory status
    pub destination: CheckResult,
    /// At least one source configured
    pub sources: CheckResult,
    /// Token variables resolvable (warning only)
    pub tokens: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config) -> Self {
        Self {
            git: Self::check_git(),
            destination: Self::check_destination(config),
            sources: Self::check_sources(config),
            tokens: Self::check_tokens(config),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.destination.passed && self.sources.passed
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_warning)
            .collect()
    }

    fn check_git() -> CheckResult {
        match std::process::Command::new("git").arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                CheckResult::ok_with_details("Git installed", version.trim().to_string())
            }
            Ok(_) => CheckResult::error("Git command failed"),
            Err(_) => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// The destination is created on sync, so only an existing non-directory fails
    fn check_destination(config: &Config) -> CheckResult {
        let path = config.destination_path();
        if path.is_dir() {
            CheckResult::ok_with_details("Destination exists", path.display().to_string())
        } else if path.exists() {
            CheckResult::error_with_details(
                "Destination is not a directory",
                path.display().to_string(),
            )
        } else if nearest_existing_ancestor(&path).map_or(false, Path::is_dir) {
            CheckResult::ok_with_details(
                "Destination will be created on first sync",
                path.display().to_string(),
            )
        } else {
            CheckResult::error_with_details(
                "Destination cannot be created",
                format!("Run: mkdir -p {}", path.display()),
            )
        }
    }

    fn check_sources(config: &Config) -> CheckResult {
        if config.sources.is_empty() {
            return CheckResult::error_with_details(
                "No sources configured",
                "Add a `sources:` entry to the configuration file",
            );
        }
        let names: Vec<String> = config.sources.iter().map(|s| s.to_string()).collect();
        CheckResult::ok_with_details(
            format!("{} source(s) configured", names.len()),
            names.join("\n"),
        )
    }

    /// Unresolvable token variables are a warning: public projects still list
    fn check_tokens(config: &Config) -> CheckResult {
        let missing: Vec<String> = config
            .sources
            .iter()
            .filter(|s| s.token.is_none())
            .filter_map(|s| {
                let var = s.token_env.as_ref()?;
                match std::env::var(var) {
                    Ok(value) if !value.is_empty() => None,
                    _ => Some(format!("{} ({})", var, s)),
                }
            })
            .collect();

        if missing.is_empty() {
            CheckResult::ok("Tokens resolvable")
        } else {
            CheckResult::warning_with_details("Token variables not set", missing.join("\n"))
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Git Installation", &self.git),
            ("Destination", &self.destination),
            ("Sources", &self.sources),
            ("Tokens", &self.tokens),
        ]
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().skip(1).find(|p| p.exists())
}
