use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Main configuration structure for repomirror
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Root directory that holds `<domain>/<path_with_namespace>.git` mirrors
    pub destination: String,

    /// Hosting accounts to mirror, processed in this order
    #[serde(default)]
    pub sources: Vec<Source>,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Mirror manifest settings
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A remote hosting account to mirror
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Source {
    /// Host name, e.g. "gitlab.example.com"
    pub domain: String,

    /// Account name, only used for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Bearer token for the listing API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable to read the token from when `token` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Remote URLs to leave alone (literal or glob)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// If non-empty, only remote URLs matching one of these are mirrored
    #[serde(default)]
    pub include: Vec<String>,

    /// API base overriding `https://<domain>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Source {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Base URL the listing API lives under
    pub fn api_base(&self) -> String {
        match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.domain),
        }
    }

    /// Fill `token` from `token_env` if it was not given literally
    pub fn resolve_token(&mut self) -> Result<()> {
        if self.token.is_some() {
            return Ok(());
        }
        if let Some(var) = &self.token_env {
            let token = std::env::var(var)
                .with_context(|| format!("Token variable {} for source {} is not set", var, self))?;
            if token.is_empty() {
                bail!("Token variable {} for source {} is empty", var, self);
            }
            self.token = Some(token);
        }
        Ok(())
    }

    /// True if the source was selected by `--source`
    pub fn matches_name(&self, name: &str) -> bool {
        self.domain == name || self.to_string() == name
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(username) if !username.is_empty() => write!(f, "{}@{}", username, self.domain),
            _ => f.write_str(&self.domain),
        }
    }
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Repositories processed concurrently within one source
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Wall-clock limit for a single git operation in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Largest pack size (MiB) tolerated after an initial clone; also the
    /// `--max-pack-size` handed to `git repack`
    #[serde(default = "default_repack_threshold_mb")]
    pub repack_threshold_mb: u64,
}

impl SyncConfig {
    pub fn repack_threshold_bytes(&self) -> u64 {
        self.repack_threshold_mb.saturating_mul(1024 * 1024)
    }
}

/// Mirror manifest configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StateConfig {
    /// Record per-mirror sync history in SQLite
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database location (defaults to XDG data dir)
    #[serde(default)]
    pub path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact", "pretty", "full"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_max_parallel() -> usize {
    1
}
fn default_repack_threshold_mb() -> u64 {
    95
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            timeout: None,
            repack_threshold_mb: default_repack_threshold_mb(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repomirror").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.destination = shellexpand::full(&self.destination)
            .context("Failed to expand destination path")?
            .into_owned();

        if let Some(path) = &self.state.path {
            self.state.path = Some(
                shellexpand::full(path)
                    .context("Failed to expand state.path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Reject settings the sync engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            bail!("destination must not be empty");
        }
        for (i, source) in self.sources.iter().enumerate() {
            if source.domain.trim().is_empty() {
                bail!("sources[{}]: domain must not be empty", i);
            }
        }
        if self.sync.max_parallel == 0 {
            bail!("sync.max_parallel must be at least 1");
        }
        if self.sync.repack_threshold_mb == 0 {
            bail!("sync.repack_threshold_mb must be at least 1");
        }
        Ok(())
    }

    /// Resolve `token_env` for every source
    pub fn resolve_tokens(&mut self) -> Result<()> {
        for source in &mut self.sources {
            source.resolve_token()?;
        }
        Ok(())
    }

    pub fn destination_path(&self) -> PathBuf {
        PathBuf::from(&self.destination)
    }

    /// Location of the manifest database
    pub fn state_db_path(&self) -> PathBuf {
        if let Some(path) = &self.state.path {
            return PathBuf::from(path);
        }
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        data_dir.join("repomirror").join("state.db")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: "${HOME}/mirrors".to_string(),
            sources: Vec::new(),
            sync: SyncConfig::default(),
            state: StateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
